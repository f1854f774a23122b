pub mod buffer;
pub mod compile;
pub mod compile_error;
pub mod disasm;
pub mod normalize;
pub mod op;
pub mod params;
pub mod prepare;
pub mod stack_check;

pub use buffer::{Buffer, JumpLabel, JumpLabelKind};
pub use compile::{Emitter, compile_program};
pub use compile_error::CompileError;
pub use op::{BlastOp, ExtendedOp};
