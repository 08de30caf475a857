//! file: core/src/ir/lower/mod.rs
//! description: AST -> IR lowering entry points.
//!
//! `lower_kernel` turns one kernel specialization (a registered kernel plus
//! the compile-time view of its arguments) into a `KernelIr`.
//! `lower_script_statement` evaluates one top-level script statement and
//! returns the globals it binds.

mod builtins;
mod inline;
mod lower_expr;
mod lower_stmt;
pub mod lowering_context;
pub mod operand;
pub mod scope;
pub mod static_eval;
pub mod static_value;

use std::collections::HashMap;

use crate::analyzers::{DiagnosticKind, KernelSyntaxError, check_body};
use crate::ast::{AstNode, BinaryOperator, CompareOperator};
use crate::config::CompileConfig;
use crate::error::Level;
use crate::ir::module::{ArgSlot, KernelIr};
use crate::ir::op::{BinOp, IROp};
use crate::ir::opt::optimize;
use crate::ir::value::DataType;
use crate::registry::{FunctionDescriptor, FunctionRole, ParamKind, Registry};
use crate::vm::field::Layout;
use crate::vm::sink::PrintSink;

pub use lowering_context::{LowerMode, LowerResult, LoweringContext};
pub use static_value::{Builtin, NdArrayRef, StaticMatrix, StaticValue};

use operand::{Binding, Var};

const ISSUER: &str = "tilang.lower";

pub(crate) fn to_bin_op(op: BinaryOperator) -> Option<BinOp> {
    Some(match op {
        BinaryOperator::Add => BinOp::Add,
        BinaryOperator::Sub => BinOp::Sub,
        BinaryOperator::Mul => BinOp::Mul,
        BinaryOperator::Div => BinOp::Div,
        BinaryOperator::FloorDiv => BinOp::FloorDiv,
        BinaryOperator::Mod => BinOp::Mod,
        BinaryOperator::Pow => BinOp::Pow,
        BinaryOperator::LShift => BinOp::Shl,
        BinaryOperator::RShift => BinOp::Shr,
        BinaryOperator::BitOr => BinOp::BitOr,
        BinaryOperator::BitXor => BinOp::BitXor,
        BinaryOperator::BitAnd => BinOp::BitAnd,
        BinaryOperator::MatMul => return None,
    })
}

pub(crate) fn cmp_bin_op(op: CompareOperator) -> Option<BinOp> {
    Some(match op {
        CompareOperator::Eq => BinOp::Eq,
        CompareOperator::NotEq => BinOp::Ne,
        CompareOperator::Lt => BinOp::Lt,
        CompareOperator::LtE => BinOp::Le,
        CompareOperator::Gt => BinOp::Gt,
        CompareOperator::GtE => BinOp::Ge,
        CompareOperator::In | CompareOperator::NotIn | CompareOperator::Is | CompareOperator::IsNot => {
            return None;
        }
    })
}

/// Compile-time view of one kernel argument. Together with the kernel name
/// it selects a specialization.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgSpec {
    Scalar,
    Template(StaticValue),
    NdArray {
        dtype: DataType,
        ndim: usize,
        element_shape: Vec<usize>,
        layout: Layout,
    },
    SparseBuilder,
}

impl ArgSpec {
    /// Stable text key used to cache specializations.
    pub fn cache_key(&self) -> String {
        match self {
            ArgSpec::Scalar => "scalar".to_string(),
            ArgSpec::Template(v) => format!("template:{}", v.cache_key()),
            ArgSpec::NdArray { dtype, ndim, element_shape, layout } => {
                format!("ndarray:{}:{}:{:?}:{:?}", dtype, ndim, element_shape, layout)
            }
            ArgSpec::SparseBuilder => "sparse_builder".to_string(),
        }
    }
}

fn kernel_error(desc: &FunctionDescriptor, kind: DiagnosticKind, message: String) -> KernelSyntaxError {
    KernelSyntaxError::with(
        kind,
        Level::Error,
        message,
        ISSUER.to_string(),
        desc.location.clone(),
        desc.span.clone(),
    )
}

/// Lowers the kernel `desc` specialized for `args`.
/// Header plus the statements of a kernel body, one per line.
fn ast_dump(desc: &FunctionDescriptor) -> String {
    let mut text = format!("===== AST of kernel {} =====\n", desc.name);
    for stmt in &desc.body {
        text.push_str(&stmt.to_string());
    }
    text
}

pub fn lower_kernel(
    desc: &FunctionDescriptor,
    args: &[ArgSpec],
    config: &CompileConfig,
    registry: &Registry,
    globals: &HashMap<String, StaticValue>,
) -> LowerResult<KernelIr> {
    if desc.role != FunctionRole::Kernel {
        return Err(Box::new(kernel_error(
            desc,
            DiagnosticKind::InvalidCall,
            format!("'{}' is a {}, not a kernel", desc.name, desc.role),
        )));
    }
    if args.len() != desc.params.len() {
        return Err(Box::new(kernel_error(
            desc,
            DiagnosticKind::InvalidCall,
            format!("Kernel '{}' takes {} argument(s) but {} were given", desc.name, desc.params.len(), args.len()),
        )));
    }
    check_body(&desc.body)?;

    if config.print_preprocessed_ir {
        log::info!("{}", ast_dump(desc));
    }

    let mut ctx = LoweringContext::new(&desc.name, LowerMode::Kernel, config, registry, globals);
    ctx.ir.ret = desc.ret;
    for (param, spec) in desc.params.iter().zip(args) {
        let binding = match (&param.kind, spec) {
            (ParamKind::Scalar(dtype), ArgSpec::Scalar) => {
                let index = ctx.ir.args.len();
                ctx.ir.args.push(ArgSlot::Scalar(*dtype));
                let dest = ctx.ir.alloc_reg();
                ctx.ir.emit_op(IROp::LArg { dest, index });
                let local = ctx.ir.alloc_local(*dtype);
                ctx.ir.emit_op(IROp::SLocal { src: dest, local_index: local });
                Binding::Runtime(Var::Scalar { local, dtype: *dtype })
            }
            (ParamKind::Template, ArgSpec::Template(value)) => Binding::Static(value.clone()),
            (
                ParamKind::ExternalArray { element_dim, layout: want_layout },
                ArgSpec::NdArray { dtype, ndim, element_shape, layout },
            ) => {
                if let Some(dim) = element_dim
                    && *dim != element_shape.len()
                {
                    return Err(Box::new(kernel_error(
                        desc,
                        DiagnosticKind::InvalidArgument,
                        format!(
                            "Argument '{}' expects element_dim={} but the array has element_dim={}",
                            param.name,
                            dim,
                            element_shape.len()
                        ),
                    )));
                }
                if let Some(want) = want_layout
                    && want != layout
                {
                    return Err(Box::new(kernel_error(
                        desc,
                        DiagnosticKind::InvalidArgument,
                        format!("Argument '{}' expects layout {:?} but the array uses {:?}", param.name, want, layout),
                    )));
                }
                let arg = ctx.ir.args.len();
                ctx.ir.args.push(ArgSlot::NdArray {
                    dtype: *dtype,
                    ndim: *ndim,
                    element_shape: element_shape.clone(),
                    layout: *layout,
                });
                Binding::Static(StaticValue::NdArray(NdArrayRef {
                    arg,
                    dtype: *dtype,
                    ndim: *ndim,
                    element_shape: element_shape.clone(),
                }))
            }
            (ParamKind::SparseMatrixBuilder, ArgSpec::SparseBuilder) => {
                let arg = ctx.ir.args.len();
                ctx.ir.args.push(ArgSlot::SparseBuilder);
                Binding::Static(StaticValue::SparseBuilder { arg })
            }
            (kind, spec) => {
                return Err(Box::new(kernel_error(
                    desc,
                    DiagnosticKind::InvalidArgument,
                    format!("Argument '{}' of kernel '{}' does not match {:?}: got {}", param.name, desc.name, kind, spec.cache_key()),
                )));
            }
        };
        ctx.bind(&param.name, binding);
    }

    ctx.lower_block(&desc.body)?;
    let mut ir = ctx.ir;
    ir.patch_unresolved_branches();
    if config.optimize {
        optimize(&mut ir);
    }
    if config.print_ir {
        log::info!("===== IR of kernel {} =====\n{}", desc.name, ir);
    }
    log::debug!(
        "[lower] kernel '{}' lowered to {} ops, {} locals, {} registers",
        desc.name,
        ir.len(),
        ir.locals.len(),
        ir.register_count()
    );
    Ok(ir)
}

/// Evaluates a top-level statement of a script at compile time and
/// returns the globals it binds or rebinds.
pub fn lower_script_statement(
    stmt: &AstNode,
    config: &CompileConfig,
    registry: &Registry,
    globals: &HashMap<String, StaticValue>,
    sink: &dyn PrintSink,
) -> LowerResult<HashMap<String, StaticValue>> {
    let mut ctx = LoweringContext::new("<script>", LowerMode::Script, config, registry, globals).with_script_sink(sink);
    ctx.lower_stmt(stmt)?;
    Ok(ctx.take_script_bindings())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AstNodeKind, generate_ast_from_source};
    use crate::script::Script;

    #[test]
    fn ast_dump_names_the_kernel() {
        let root = generate_ast_from_source(&Script::from_source("t.ti", "@kernel\ndef foo(x: i32):\n    y = x + 1\n"))
            .expect("parse");
        let AstNodeKind::Script { body } = root.kind else { panic!("no script") };
        let mut registry = Registry::new();
        let desc = registry.register(&body[0]).expect("register");
        let text = ast_dump(&desc);
        assert!(text.starts_with("===== AST of kernel foo =====\n"), "{}", text);
        assert!(text.len() > "===== AST of kernel foo =====\n".len());
    }
}
