//! Typed register IR: values and ops, the per-kernel container, shared
//! scalar semantics, lowering from the AST and the optimizer.

pub mod eval;
pub mod lower;
pub mod module;
pub mod op;
pub mod opt;
pub mod value;

pub use module::{ArgSlot, KernelIr};
pub use op::{BinOp, GlobalRef, IROp, PrintPart, Register, UnOp};
pub use value::{DataType, Value};
