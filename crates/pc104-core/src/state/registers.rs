use std::fmt;

/// Number of general-purpose registers in a captured A32 context (`r0..r15`).
pub const GENERAL_REGISTER_COUNT: usize = 16;
/// Byte width of one A32 instruction.
pub const ARM_INSTRUCTION_BYTES: usize = 4;
/// `CPSR` bit selecting the Thumb instruction set.
pub const CPSR_THUMB: u32 = 1 << 5;

/// General-purpose register identifier (`r0..=r15`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct RegisterIndex(u8);

impl RegisterIndex {
    /// Stack pointer alias (`r13`).
    pub const SP: Self = Self(13);
    /// Link register alias (`r14`).
    pub const LR: Self = Self(14);
    /// Program counter alias (`r15`).
    pub const PC: Self = Self(15);

    /// Returns the register for `index`, or `None` above 15.
    #[must_use]
    pub const fn new(index: u8) -> Option<Self> {
        if (index as usize) < GENERAL_REGISTER_COUNT {
            Some(Self(index))
        } else {
            None
        }
    }

    /// Decodes a 4-bit register field; upper bits are ignored.
    #[must_use]
    pub const fn from_u4(bits: u8) -> Self {
        Self(bits & 0x0F)
    }

    /// Array index of this register (`0..=15`).
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for RegisterIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::SP => f.write_str("sp"),
            Self::LR => f.write_str("lr"),
            Self::PC => f.write_str("pc"),
            Self(index) => write!(f, "r{index}"),
        }
    }
}

/// Instruction-set state of the interrupted code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum EncodingMode {
    /// Fixed-width 32-bit A32 encoding.
    #[default]
    Arm,
    /// Compressed T32 encoding.
    Thumb,
}

impl EncodingMode {
    /// Derives the mode from a saved `CPSR` value.
    #[must_use]
    pub const fn from_cpsr(cpsr: u32) -> Self {
        if cpsr & CPSR_THUMB == 0 {
            Self::Arm
        } else {
            Self::Thumb
        }
    }
}

impl fmt::Display for EncodingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arm => f.write_str("arm"),
            Self::Thumb => f.write_str("thumb"),
        }
    }
}

/// Read/write access to the general registers of a captured CPU context.
pub trait RegisterContext {
    /// Reads a general-purpose register.
    fn get(&self, index: RegisterIndex) -> u32;

    /// Writes a general-purpose register.
    fn set(&mut self, index: RegisterIndex, value: u32);

    /// Address of the instruction that faulted.
    fn program_counter(&self) -> usize;

    /// Moves the resume address forward by `bytes`.
    fn advance_program_counter(&mut self, bytes: usize);
}

/// Everything the trap path needs from one fault: the register context
/// plus the fault address and the trapped instruction.
pub trait TrapFrame: RegisterContext {
    /// Data address whose access faulted.
    fn fault_address(&self) -> usize;

    /// Instruction set the faulting code was executing.
    fn encoding_mode(&self) -> EncodingMode;

    /// Instruction word at [`RegisterContext::program_counter`].
    fn instruction_word(&self) -> u32;
}

/// Owned snapshot of a trap frame.
///
/// Used to replay faults on the host and as the reference
/// [`TrapFrame`] implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CapturedContext {
    gpr: [u32; GENERAL_REGISTER_COUNT],
    cpsr: u32,
    fault_address: usize,
    instruction: u32,
}

impl CapturedContext {
    /// Captures an A32 fault at `pc` executing `instruction` against
    /// `fault_address`. All other registers start at zero.
    #[must_use]
    pub const fn new(pc: u32, fault_address: usize, instruction: u32) -> Self {
        let mut gpr = [0; GENERAL_REGISTER_COUNT];
        gpr[RegisterIndex::PC.index()] = pc;
        Self {
            gpr,
            cpsr: 0,
            fault_address,
            instruction,
        }
    }

    /// Sets a register, builder style.
    #[must_use]
    pub const fn with_register(mut self, index: RegisterIndex, value: u32) -> Self {
        self.gpr[index.index()] = value;
        self
    }

    /// Sets the saved `CPSR`, builder style.
    #[must_use]
    pub const fn with_cpsr(mut self, cpsr: u32) -> Self {
        self.cpsr = cpsr;
        self
    }

    /// Saved `CPSR`.
    #[must_use]
    pub const fn cpsr(&self) -> u32 {
        self.cpsr
    }
}

impl RegisterContext for CapturedContext {
    fn get(&self, index: RegisterIndex) -> u32 {
        self.gpr[index.index()]
    }

    fn set(&mut self, index: RegisterIndex, value: u32) {
        self.gpr[index.index()] = value;
    }

    fn program_counter(&self) -> usize {
        self.gpr[RegisterIndex::PC.index()] as usize
    }

    #[allow(clippy::cast_possible_truncation)]
    fn advance_program_counter(&mut self, bytes: usize) {
        let pc = &mut self.gpr[RegisterIndex::PC.index()];
        *pc = pc.wrapping_add(bytes as u32);
    }
}

impl TrapFrame for CapturedContext {
    fn fault_address(&self) -> usize {
        self.fault_address
    }

    fn encoding_mode(&self) -> EncodingMode {
        EncodingMode::from_cpsr(self.cpsr)
    }

    fn instruction_word(&self) -> u32 {
        self.instruction
    }
}
