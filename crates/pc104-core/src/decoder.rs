//! A32 load/store decoder for trapped bus-window accesses.
//!
//! Only the single-data-transfer (`LDR`, `LDRB`, `STR`, `STRB`) and
//! unsigned halfword-transfer (`LDRH`, `STRH`) encodings are recognised.
//! Everything else, including forms whose side effects cannot be replayed
//! from the captured context, decodes to `None`.

use std::fmt;

use crate::RegisterIndex;

const CONDITION_SHIFT: u32 = 28;
const CONDITION_UNCONDITIONAL: u32 = 0xF;

const SINGLE_TRANSFER_MASK: u32 = 0x0C00_0000;
const SINGLE_TRANSFER_PATTERN: u32 = 0x0400_0000;
const HALFWORD_TRANSFER_MASK: u32 = 0x0E00_00F0;
const HALFWORD_TRANSFER_PATTERN: u32 = 0x0000_00B0;

const BIT_REGISTER_OFFSET: u32 = 1 << 25;
const BIT_PRE_INDEX: u32 = 1 << 24;
const BIT_UP: u32 = 1 << 23;
const BIT_BYTE: u32 = 1 << 22;
const BIT_HALFWORD_IMMEDIATE: u32 = 1 << 22;
const BIT_WRITEBACK: u32 = 1 << 21;
const BIT_LOAD: u32 = 1 << 20;
const BIT_MEDIA: u32 = 1 << 4;
const HALFWORD_SBZ_MASK: u32 = 0x0000_0F00;

/// Data width of a decoded access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum AccessWidth {
    /// 8-bit.
    Byte,
    /// 16-bit.
    Halfword,
    /// 32-bit.
    Word,
}

impl AccessWidth {
    /// Number of bytes accessed.
    #[must_use]
    pub const fn bytes(self) -> usize {
        match self {
            Self::Byte => 1,
            Self::Halfword => 2,
            Self::Word => 4,
        }
    }
}

impl fmt::Display for AccessWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Byte => f.write_str("8-bit"),
            Self::Halfword => f.write_str("16-bit"),
            Self::Word => f.write_str("32-bit"),
        }
    }
}

/// Transfer direction relative to the register file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Direction {
    /// Bus to register.
    Load,
    /// Register to bus.
    Store,
}

/// The six access kinds the trap path can emulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
pub enum AccessKind {
    /// `LDRB`.
    LoadByte = 0,
    /// `LDRH`.
    LoadHalfword = 1,
    /// `LDR`.
    LoadWord = 2,
    /// `STRB`.
    StoreByte = 3,
    /// `STRH`.
    StoreHalfword = 4,
    /// `STR`.
    StoreWord = 5,
}

impl AccessKind {
    /// All kinds in bit order.
    pub const ALL: [Self; 6] = [
        Self::LoadByte,
        Self::LoadHalfword,
        Self::LoadWord,
        Self::StoreByte,
        Self::StoreHalfword,
        Self::StoreWord,
    ];

    /// Kind for a width/direction pair.
    #[must_use]
    pub const fn new(width: AccessWidth, direction: Direction) -> Self {
        match (direction, width) {
            (Direction::Load, AccessWidth::Byte) => Self::LoadByte,
            (Direction::Load, AccessWidth::Halfword) => Self::LoadHalfword,
            (Direction::Load, AccessWidth::Word) => Self::LoadWord,
            (Direction::Store, AccessWidth::Byte) => Self::StoreByte,
            (Direction::Store, AccessWidth::Halfword) => Self::StoreHalfword,
            (Direction::Store, AccessWidth::Word) => Self::StoreWord,
        }
    }

    /// Data width of this kind.
    #[must_use]
    pub const fn width(self) -> AccessWidth {
        match self {
            Self::LoadByte | Self::StoreByte => AccessWidth::Byte,
            Self::LoadHalfword | Self::StoreHalfword => AccessWidth::Halfword,
            Self::LoadWord | Self::StoreWord => AccessWidth::Word,
        }
    }

    /// Direction of this kind.
    #[must_use]
    pub const fn direction(self) -> Direction {
        match self {
            Self::LoadByte | Self::LoadHalfword | Self::LoadWord => Direction::Load,
            Self::StoreByte | Self::StoreHalfword | Self::StoreWord => Direction::Store,
        }
    }

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// Set of access kinds the decoder accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct EncodingSet(u8);

impl EncodingSet {
    /// Every supported kind.
    pub const ALL: Self = Self(0x3F);
    /// No kinds.
    pub const EMPTY: Self = Self(0);

    /// Returns `true` when `kind` is accepted.
    #[must_use]
    pub const fn contains(self, kind: AccessKind) -> bool {
        self.0 & kind.bit() != 0
    }

    /// Returns a copy that also accepts `kind`.
    #[must_use]
    pub const fn with(self, kind: AccessKind) -> Self {
        Self(self.0 | kind.bit())
    }

    /// Returns a copy that rejects `kind`.
    #[must_use]
    pub const fn without(self, kind: AccessKind) -> Self {
        Self(self.0 & !kind.bit())
    }

    /// Accepted kinds in bit order.
    pub fn iter(self) -> impl Iterator<Item = AccessKind> {
        AccessKind::ALL
            .into_iter()
            .filter(move |kind| self.contains(*kind))
    }
}

impl Default for EncodingSet {
    fn default() -> Self {
        Self::ALL
    }
}

impl FromIterator<AccessKind> for EncodingSet {
    fn from_iter<I: IntoIterator<Item = AccessKind>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, Self::with)
    }
}

/// Barrel-shifter operation applied to a register offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ShiftKind {
    /// Logical shift left.
    Lsl,
    /// Logical shift right; an encoded amount of 0 means 32.
    Lsr,
    /// Arithmetic shift right; an encoded amount of 0 means 32.
    Asr,
    /// Rotate right.
    Ror,
    /// Rotate right by one through carry (`ROR #0`).
    Rrx,
}

impl ShiftKind {
    /// Applies the shift with an immediate `amount` as encoded (`0..=31`).
    ///
    /// Returns `None` for [`ShiftKind::Rrx`], which depends on the carry
    /// flag.
    #[must_use]
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
    pub const fn apply(self, value: u32, amount: u8) -> Option<u32> {
        let amount = (amount & 0x1F) as u32;
        match self {
            Self::Lsl => Some(value << amount),
            Self::Lsr if amount == 0 => Some(0),
            Self::Lsr => Some(value >> amount),
            Self::Asr if amount == 0 => Some(((value as i32) >> 31) as u32),
            Self::Asr => Some(((value as i32) >> amount) as u32),
            Self::Ror => Some(value.rotate_right(amount)),
            Self::Rrx => None,
        }
    }
}

/// Offset operand of a load/store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Offset {
    /// Unsigned immediate.
    Immediate(u16),
    /// Shifted register.
    Register {
        /// Offset register.
        rm: RegisterIndex,
        /// Shift applied to `rm`.
        shift: ShiftKind,
        /// Encoded shift amount.
        amount: u8,
    },
}

impl Offset {
    /// Offset magnitude given the value held in `rm`.
    ///
    /// Returns `None` for RRX offsets.
    #[must_use]
    pub const fn magnitude(self, rm_value: u32) -> Option<u32> {
        match self {
            Self::Immediate(value) => Some(value as u32),
            Self::Register { shift, amount, .. } => shift.apply(rm_value, amount),
        }
    }
}

/// Indexing form of a load/store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Indexing {
    /// `[rn, offset]`: base untouched.
    Offset,
    /// `[rn, offset]!`: base receives the effective address.
    PreIndexed,
    /// `[rn], offset`: access at base, then base receives base ± offset.
    PostIndexed,
}

/// Address computation of a load/store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Addressing {
    /// Base register `rn`.
    pub base: RegisterIndex,
    /// Offset operand.
    pub offset: Offset,
    /// `true` when the offset is subtracted from the base.
    pub subtract: bool,
    /// Indexing form.
    pub indexing: Indexing,
}

impl Addressing {
    /// Returns `true` when the base register is updated.
    #[must_use]
    pub const fn writes_back(&self) -> bool {
        !matches!(self.indexing, Indexing::Offset)
    }
}

/// A classified load/store instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct DecodedAccess {
    /// Data width.
    pub width: AccessWidth,
    /// Load or store.
    pub direction: Direction,
    /// Destination (load) or source (store) register.
    pub register: RegisterIndex,
    /// Base/offset addressing.
    pub addressing: Addressing,
}

impl DecodedAccess {
    /// Access kind of this instruction.
    #[must_use]
    pub const fn kind(&self) -> AccessKind {
        AccessKind::new(self.width, self.direction)
    }
}

/// Stateless A32 load/store decoder filtered by an [`EncodingSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Decoder {
    encodings: EncodingSet,
}

impl Decoder {
    /// Creates a decoder that accepts `encodings`.
    #[must_use]
    pub const fn new(encodings: EncodingSet) -> Self {
        Self { encodings }
    }

    /// Accepted kinds.
    #[must_use]
    pub const fn encodings(&self) -> EncodingSet {
        self.encodings
    }

    /// Decodes a 32-bit A32 instruction word.
    ///
    /// Returns `None` when the word is not one of the six accepted
    /// load/store encodings or uses a form the trap path cannot replay.
    #[must_use]
    pub fn decode(&self, word: u32) -> Option<DecodedAccess> {
        decode_word(word).filter(|access| self.encodings.contains(access.kind()))
    }
}

/// Decodes `word` against the full six-kind set.
#[must_use]
pub fn decode_word(word: u32) -> Option<DecodedAccess> {
    decode_transfer(word).filter(has_replayable_registers)
}

/// Returns `true` when `word` is one of the six load/store shapes but names
/// registers whose side effects cannot be replayed (`pc` as transfer or
/// offset register, RRX with writeback, or a writeback base that is `pc` or
/// the transfer register).
#[must_use]
pub fn is_unreplayable_transfer(word: u32) -> bool {
    decode_transfer(word).is_some_and(|access| !has_replayable_registers(&access))
}

const fn decode_transfer(word: u32) -> Option<DecodedAccess> {
    if word >> CONDITION_SHIFT == CONDITION_UNCONDITIONAL {
        None
    } else if word & SINGLE_TRANSFER_MASK == SINGLE_TRANSFER_PATTERN {
        decode_single_transfer(word)
    } else if word & HALFWORD_TRANSFER_MASK == HALFWORD_TRANSFER_PATTERN {
        decode_halfword_transfer(word)
    } else {
        None
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn register_field(word: u32, shift: u32) -> RegisterIndex {
    RegisterIndex::from_u4(((word >> shift) & 0xF) as u8)
}

const fn indexing(word: u32) -> Indexing {
    if word & BIT_PRE_INDEX == 0 {
        Indexing::PostIndexed
    } else if word & BIT_WRITEBACK != 0 {
        Indexing::PreIndexed
    } else {
        Indexing::Offset
    }
}

const fn build(word: u32, width: AccessWidth, offset: Offset) -> DecodedAccess {
    let direction = if word & BIT_LOAD == 0 {
        Direction::Store
    } else {
        Direction::Load
    };
    DecodedAccess {
        width,
        direction,
        register: register_field(word, 12),
        addressing: Addressing {
            base: register_field(word, 16),
            offset,
            subtract: word & BIT_UP == 0,
            indexing: indexing(word),
        },
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn decode_single_transfer(word: u32) -> Option<DecodedAccess> {
    let offset = if word & BIT_REGISTER_OFFSET == 0 {
        Offset::Immediate((word & 0xFFF) as u16)
    } else {
        if word & BIT_MEDIA != 0 {
            return None;
        }
        let amount = ((word >> 7) & 0x1F) as u8;
        let shift = match (word >> 5) & 0x3 {
            0 => ShiftKind::Lsl,
            1 => ShiftKind::Lsr,
            2 => ShiftKind::Asr,
            _ if amount == 0 => ShiftKind::Rrx,
            _ => ShiftKind::Ror,
        };
        Offset::Register {
            rm: register_field(word, 0),
            shift,
            amount,
        }
    };
    let width = if word & BIT_BYTE == 0 {
        AccessWidth::Word
    } else {
        AccessWidth::Byte
    };
    Some(build(word, width, offset))
}

#[allow(clippy::cast_possible_truncation)]
const fn decode_halfword_transfer(word: u32) -> Option<DecodedAccess> {
    let offset = if word & BIT_HALFWORD_IMMEDIATE == 0 {
        if word & HALFWORD_SBZ_MASK != 0 {
            return None;
        }
        Offset::Register {
            rm: register_field(word, 0),
            shift: ShiftKind::Lsl,
            amount: 0,
        }
    } else {
        Offset::Immediate((((word >> 4) & 0xF0) | (word & 0xF)) as u16)
    };
    Some(build(word, AccessWidth::Halfword, offset))
}

fn has_replayable_registers(access: &DecodedAccess) -> bool {
    let addressing = access.addressing;
    if access.register == RegisterIndex::PC {
        return false;
    }
    if let Offset::Register { rm, shift, .. } = addressing.offset {
        if rm == RegisterIndex::PC {
            return false;
        }
        // The carry-in is not part of the replayed state.
        if shift == ShiftKind::Rrx && addressing.writes_back() {
            return false;
        }
    }
    if addressing.writes_back()
        && (addressing.base == RegisterIndex::PC || addressing.base == access.register)
    {
        return false;
    }
    true
}
