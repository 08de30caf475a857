//! Reference executor: runs `KernelIr` against host storage.

pub mod err;
pub mod exec;
pub mod external;
pub mod field;
pub mod sink;
pub mod value;

pub use err::RuntimeError;
pub use exec::ExecState;
pub use external::{SparseMatrix, SparseMatrixBuilder};
pub use field::{Field, Layout, NdArray};
pub use sink::{BufferSink, PrintSink, StdoutSink};
pub use value::RuntimeArg;

use crate::ir::module::KernelIr;
use crate::ir::value::Value;

/// Executes one compiled kernel to completion.
pub fn run_kernel(
    ir: &KernelIr,
    args: &[RuntimeArg],
    sink: &dyn PrintSink,
    trace: bool,
) -> Result<Option<Value>, RuntimeError> {
    log::debug!("[vm] running {} with {} argument(s)", ir.name, args.len());
    ExecState::new(ir, args, sink, trace)?.run()
}
