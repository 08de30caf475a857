//! Diagnostics engine: diagnostic kinds, the `KernelSyntaxError` type and
//! the pre-lowering check for constructs kernels never accept.

pub mod err;
pub mod unsupported;

pub use err::{DiagnosticKind, KernelSyntaxError};
pub use unsupported::{check_body, check_compare_ops, check_static_assign_targets};
