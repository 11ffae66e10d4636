//! Trap emulation pipeline: validate, translate, decode, dispatch, advance.
//!
//! Every check that can fail without touching the bus runs before the first
//! transfer, and the register context is only written after the transfer
//! succeeded. A failing emulation therefore leaves the captured context
//! exactly as the kernel delivered it.

use crate::{
    is_unreplayable_transfer, AccessWidth, BusAccess, BusTarget, BusWindow, DecodedAccess,
    Decoder, Direction, EncodingMode, Offset, RegisterContext, RegisterIndex, TrapError, TrapFrame,
    ARM_INSTRUCTION_BYTES,
};

/// Result of one successfully emulated access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Emulated {
    /// Decoded instruction.
    pub access: DecodedAccess,
    /// Bus space and local address accessed.
    pub target: BusTarget,
    /// Value loaded into, or stored from, the transfer register.
    pub value: u32,
}

/// Emulates the faulting access described by `frame` against `bus`.
///
/// On success the transfer register (and base register, for writeback
/// forms) hold their post-instruction values and the program counter points
/// at the next instruction.
///
/// # Errors
///
/// Returns a [`TrapError`] when the fault lies outside `window`, the
/// instruction cannot be decoded, the access is misaligned, or a bus
/// transfer fails. Only the bus case can happen after a transfer was issued.
pub fn emulate_access<B, F>(
    window: &BusWindow,
    decoder: &Decoder,
    bus: &mut B,
    frame: &mut F,
) -> Result<Emulated, TrapError>
where
    B: BusAccess + ?Sized,
    F: TrapFrame + ?Sized,
{
    let fault_address = frame.fault_address();
    let target = window
        .translate(fault_address)
        .ok_or(TrapError::OutsideWindow {
            address: fault_address,
        })?;

    let mode = frame.encoding_mode();
    if mode != EncodingMode::Arm {
        return Err(TrapError::UnsupportedMode { mode });
    }

    let word = frame.instruction_word();
    let access = decoder.decode(word).ok_or_else(|| decode_failure(word))?;

    validate_alignment(access.width, target)?;
    let writeback = writeback_value(&access, word, frame)?;

    let value = dispatch(bus, &access, target, frame)?;
    if let Some((base, updated)) = writeback {
        frame.set(base, updated);
    }
    frame.advance_program_counter(ARM_INSTRUCTION_BYTES);

    Ok(Emulated {
        access,
        target,
        value,
    })
}

fn decode_failure(word: u32) -> TrapError {
    if is_unreplayable_transfer(word) {
        TrapError::UnreplayableTransfer { word }
    } else {
        TrapError::UnsupportedEncoding { word }
    }
}

/// Rejects 16/32-bit accesses at odd bus addresses.
///
/// # Errors
///
/// Returns [`TrapError::Misaligned`] when a halfword or word access targets
/// an odd local address.
pub const fn validate_alignment(width: AccessWidth, target: BusTarget) -> Result<(), TrapError> {
    match width {
        AccessWidth::Byte => Ok(()),
        AccessWidth::Halfword | AccessWidth::Word if target.address & 1 == 0 => Ok(()),
        AccessWidth::Halfword | AccessWidth::Word => Err(TrapError::Misaligned {
            width,
            space: target.space,
            address: target.address,
        }),
    }
}

/// Base-register update owed by `access`, computed from pre-instruction
/// register values.
fn writeback_value<F>(
    access: &DecodedAccess,
    word: u32,
    frame: &F,
) -> Result<Option<(RegisterIndex, u32)>, TrapError>
where
    F: RegisterContext + ?Sized,
{
    let addressing = access.addressing;
    if !addressing.writes_back() {
        return Ok(None);
    }

    let rm_value = match addressing.offset {
        Offset::Immediate(_) => 0,
        Offset::Register { rm, .. } => frame.get(rm),
    };
    let magnitude = addressing
        .offset
        .magnitude(rm_value)
        .ok_or(TrapError::UnsupportedEncoding { word })?;
    let base = frame.get(addressing.base);
    let updated = if addressing.subtract {
        base.wrapping_sub(magnitude)
    } else {
        base.wrapping_add(magnitude)
    };
    Ok(Some((addressing.base, updated)))
}

#[allow(clippy::cast_possible_truncation)]
fn dispatch<B, F>(
    bus: &mut B,
    access: &DecodedAccess,
    target: BusTarget,
    frame: &mut F,
) -> Result<u32, TrapError>
where
    B: BusAccess + ?Sized,
    F: RegisterContext + ?Sized,
{
    let BusTarget { space, address } = target;
    match access.direction {
        Direction::Load => {
            let value = match access.width {
                AccessWidth::Byte => u32::from(bus.read8(space, address)?),
                AccessWidth::Halfword => u32::from(bus.read16(space, address)?),
                AccessWidth::Word => bus.read32(space, address)?,
            };
            frame.set(access.register, value);
            Ok(value)
        }
        Direction::Store => {
            let register = frame.get(access.register);
            let value = match access.width {
                AccessWidth::Byte => {
                    let byte = (register & 0xFF) as u8;
                    bus.write8(space, address, byte)?;
                    u32::from(byte)
                }
                AccessWidth::Halfword => {
                    let half = (register & 0xFFFF) as u16;
                    bus.write16(space, address, half)?;
                    u32::from(half)
                }
                AccessWidth::Word => {
                    bus.write32(space, address, register)?;
                    register
                }
            };
            Ok(value)
        }
    }
}
