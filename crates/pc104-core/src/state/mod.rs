/// Captured register context and trap-frame contracts.
pub mod registers;

pub use registers::{
    CapturedContext, EncodingMode, RegisterContext, RegisterIndex, TrapFrame,
    ARM_INSTRUCTION_BYTES, CPSR_THUMB, GENERAL_REGISTER_COUNT,
};
