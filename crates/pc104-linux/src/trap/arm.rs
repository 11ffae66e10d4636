//! A32 trap frame over the kernel's saved `mcontext_t` and the `SIGSEGV`
//! handler that replays bus window accesses.

use std::ffi::{c_int, c_void};
use std::{io, mem, ptr};

use pc104_core::{
    emulate_access, EncodingMode, RegisterContext, RegisterIndex, TrapError, TrapFrame,
};
use tracing::debug;

use super::terminate;
use crate::SetupError;

/// Register view over the `mcontext_t` the kernel saved for a fault.
///
/// Writes land in the saved context and take effect when the handler
/// returns.
#[derive(Debug)]
pub struct ArmTrapFrame<'a> {
    mcontext: &'a mut libc::mcontext_t,
    fault_address: usize,
}

impl<'a> ArmTrapFrame<'a> {
    /// Wraps a saved context together with the faulting data address.
    #[must_use]
    pub const fn new(mcontext: &'a mut libc::mcontext_t, fault_address: usize) -> Self {
        Self {
            mcontext,
            fault_address,
        }
    }

    const fn slot(&mut self, index: RegisterIndex) -> &mut libc::c_ulong {
        let m = &mut *self.mcontext;
        match index.index() {
            0 => &mut m.arm_r0,
            1 => &mut m.arm_r1,
            2 => &mut m.arm_r2,
            3 => &mut m.arm_r3,
            4 => &mut m.arm_r4,
            5 => &mut m.arm_r5,
            6 => &mut m.arm_r6,
            7 => &mut m.arm_r7,
            8 => &mut m.arm_r8,
            9 => &mut m.arm_r9,
            10 => &mut m.arm_r10,
            11 => &mut m.arm_fp,
            12 => &mut m.arm_ip,
            13 => &mut m.arm_sp,
            14 => &mut m.arm_lr,
            _ => &mut m.arm_pc,
        }
    }
}

impl RegisterContext for ArmTrapFrame<'_> {
    fn get(&self, index: RegisterIndex) -> u32 {
        let m = &*self.mcontext;
        match index.index() {
            0 => m.arm_r0,
            1 => m.arm_r1,
            2 => m.arm_r2,
            3 => m.arm_r3,
            4 => m.arm_r4,
            5 => m.arm_r5,
            6 => m.arm_r6,
            7 => m.arm_r7,
            8 => m.arm_r8,
            9 => m.arm_r9,
            10 => m.arm_r10,
            11 => m.arm_fp,
            12 => m.arm_ip,
            13 => m.arm_sp,
            14 => m.arm_lr,
            _ => m.arm_pc,
        }
    }

    fn set(&mut self, index: RegisterIndex, value: u32) {
        *self.slot(index) = value;
    }

    fn program_counter(&self) -> usize {
        self.mcontext.arm_pc as usize
    }

    #[allow(clippy::cast_possible_truncation)]
    fn advance_program_counter(&mut self, bytes: usize) {
        self.mcontext.arm_pc = self.mcontext.arm_pc.wrapping_add(bytes as u32);
    }
}

impl TrapFrame for ArmTrapFrame<'_> {
    fn fault_address(&self) -> usize {
        self.fault_address
    }

    fn encoding_mode(&self) -> EncodingMode {
        EncodingMode::from_cpsr(self.mcontext.arm_cpsr)
    }

    fn instruction_word(&self) -> u32 {
        let pc = self.program_counter() as *const u32;
        // SAFETY: the saved pc addresses the instruction that just executed,
        // which lives in mapped, readable text.
        unsafe { ptr::read_volatile(pc) }
    }
}

pub(super) fn install() -> Result<(), SetupError> {
    // SAFETY: an all-zero `sigaction` is a valid empty action; the fields
    // that matter are filled in below.
    let mut action: libc::sigaction = unsafe { mem::zeroed() };
    action.sa_sigaction = handle_fault as usize;
    action.sa_flags = libc::SA_SIGINFO;

    // SAFETY: `action` is a live, exclusively borrowed `sigaction`.
    let status = unsafe {
        libc::sigemptyset(&mut action.sa_mask);
        libc::sigaction(libc::SIGSEGV, &action, ptr::null_mut())
    };
    if status != 0 {
        return Err(SetupError::InstallHandler {
            source: io::Error::last_os_error(),
        });
    }
    debug!("installed SIGSEGV bus window handler");
    Ok(())
}

extern "C" fn handle_fault(_signal: c_int, info: *mut libc::siginfo_t, context: *mut c_void) {
    // SAFETY: with SA_SIGINFO the kernel passes a valid siginfo_t.
    let fault_address = unsafe { (*info).si_addr() } as usize;

    let Some(bridge) = crate::bridge::mapped() else {
        terminate(&TrapError::OutsideWindow {
            address: fault_address,
        });
    };

    // SAFETY: with SA_SIGINFO the third argument is the interrupted
    // thread's ucontext_t, exclusively ours until the handler returns.
    let ucontext = unsafe { &mut *context.cast::<libc::ucontext_t>() };
    let mut frame = ArmTrapFrame::new(&mut ucontext.uc_mcontext, fault_address);
    let mut bus = bridge.bus();

    if let Err(error) = emulate_access(bridge.window(), bridge.decoder(), &mut bus, &mut frame) {
        terminate(&error);
    }
}
