//! Bytecode: code objects, their assembler, the instruction set and the VM executing them.

mod builder;
mod code;
pub mod op;
pub(crate) mod vm;

pub use builder::{CodeBuilder, Label};
pub use code::{CellVar, Code, CodeKind, CodeLoadError, Constant, ExceptionEntry, LocationEntry, Signature};
pub use op::Opcode;
pub use vm::Vm;
