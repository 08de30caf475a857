pub mod analyzers;
pub mod ast;
pub mod config;
pub mod error;
pub mod ir;
pub mod location;
pub mod program;
pub mod registry;
pub mod script;
pub mod vm;

pub use analyzers::DiagnosticKind;
pub use ast::RulesParser;
pub use config::CompileConfig;
pub use error::{Level, TilangErrorExt};
pub use ir::{DataType, KernelIr, Value};
pub use ir::lower::StaticValue;
pub use location::{Location, Span};
pub use program::{KernelArg, Program};
pub use script::Script;
pub use vm::{BufferSink, Field, Layout, NdArray, PrintSink, SparseMatrix, SparseMatrixBuilder, StdoutSink};

pub fn generate_error_report<E: TilangErrorExt + ?Sized>(error: &E) -> String {
    let level = error.level();
    let location = match error.location() {
        Some(loc) => loc.to_string(),
        None => "unknown location".to_string(),
    };
    let message = error.message();

    format!("TILANG | {} | {} | {}", level, location, message)
}

/// Parses `source` and lowers every kernel that takes no arguments, to
/// surface diagnostics without running anything.
pub fn check_source(script: &Script, config: CompileConfig) -> Result<Program, Box<dyn TilangErrorExt>> {
    let mut program = Program::from_script(script, config)?;
    for name in program.kernel_names() {
        if program.kernel_arity(&name) == Some(0) {
            program.compile(&name, &[])?;
        }
    }
    Ok(program)
}
