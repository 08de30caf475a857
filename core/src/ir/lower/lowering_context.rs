//! file: core/src/ir/lower/lowering_context.rs
//! description: shared state and helpers for AST -> IR lowering.
//!
//! `LoweringContext` owns the `KernelIr` under construction and the frame
//! of the function currently being lowered. Inlined calls swap in a fresh
//! frame and restore the caller's afterwards, so every frame sees only its
//! own names plus the program globals.
//!
//! In `LowerMode::Script` the same machinery evaluates top-level statements
//! of a script: everything must stay static, and any attempt to emit a
//! runtime op is rejected.

use std::collections::HashMap;

use crate::analyzers::{DiagnosticKind, KernelSyntaxError};
use crate::ast::AstNode;
use crate::config::CompileConfig;
use crate::error::TilangErrorExt;
use crate::ir::module::KernelIr;
use crate::ir::op::{BinOp, IROp, Register};
use crate::ir::value::{DataType, Value};
use crate::registry::Registry;
use crate::vm::sink::PrintSink;

use super::operand::{Binding, Operand, Place, RtMatrix, Var};
use super::scope::{Frame, FrameRole};
use super::static_value::{Builtin, StaticMatrix, StaticValue};

pub type LowerResult<T> = Result<T, Box<dyn TilangErrorExt>>;

const ISSUER: &str = "tilang.lower";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LowerMode {
    Kernel,
    Script,
}

pub struct LoweringContext<'a> {
    pub config: &'a CompileConfig,
    pub registry: &'a Registry,
    pub globals: &'a HashMap<String, StaticValue>,
    pub ir: KernelIr,
    pub frame: Frame,
    pub mode: LowerMode,
    /// Number of inlined calls currently being lowered.
    pub inline_depth: usize,
    /// Receives `print` output of script-level statements.
    pub script_sink: Option<&'a dyn PrintSink>,
}

pub(crate) fn error(kind: DiagnosticKind, message: impl Into<String>, node: &AstNode) -> Box<dyn TilangErrorExt> {
    Box::new(KernelSyntaxError::at(kind, message, ISSUER, node))
}

impl<'a> LoweringContext<'a> {
    pub fn new(
        name: &str,
        mode: LowerMode,
        config: &'a CompileConfig,
        registry: &'a Registry,
        globals: &'a HashMap<String, StaticValue>,
    ) -> Self {
        let role = match mode {
            LowerMode::Kernel => FrameRole::Kernel,
            LowerMode::Script => FrameRole::Script,
        };
        LoweringContext {
            config,
            registry,
            globals,
            ir: KernelIr::new(name),
            frame: Frame::new(name, role),
            mode,
            inline_depth: 0,
            script_sink: None,
        }
    }

    pub fn with_script_sink(mut self, sink: &'a dyn PrintSink) -> Self {
        self.script_sink = Some(sink);
        self
    }

    // ------- emission -------

    pub fn emit(&mut self, op: IROp, node: &AstNode) -> LowerResult<usize> {
        if self.mode == LowerMode::Script {
            return Err(error(
                DiagnosticKind::UnsupportedConstruct,
                "Runtime operations are not allowed at script level",
                node,
            ));
        }
        Ok(self.ir.emit_op(op))
    }

    pub fn emit_branch(&mut self, op: IROp, label: &str, node: &AstNode) -> LowerResult<usize> {
        if self.mode == LowerMode::Script {
            return Err(error(
                DiagnosticKind::UnsupportedConstruct,
                "Runtime control flow is not allowed at script level",
                node,
            ));
        }
        Ok(self.ir.emit_branch(op, label))
    }

    pub fn emit_label(&mut self, name: &str, node: &AstNode) -> LowerResult<()> {
        self.emit(IROp::Label { name: name.to_string() }, node)?;
        Ok(())
    }

    pub fn const_reg(&mut self, value: Value, node: &AstNode) -> LowerResult<Register> {
        let dest = self.ir.alloc_reg();
        self.emit(IROp::LConst { dest, value }, node)?;
        Ok(dest)
    }

    /// Runtime type a static number takes when it becomes a value.
    pub fn static_dtype(&self, value: &StaticValue) -> Option<DataType> {
        match value {
            StaticValue::Int(_) | StaticValue::Bool(_) => Some(self.config.default_int),
            StaticValue::Float(_) => Some(self.config.default_float),
            _ => None,
        }
    }

    pub fn cast_reg(&mut self, reg: Register, from: DataType, to: DataType, node: &AstNode) -> LowerResult<Register> {
        if from == to {
            return Ok(reg);
        }
        let dest = self.ir.alloc_reg();
        self.emit(IROp::Cast { dest, src: reg, to }, node)?;
        Ok(dest)
    }

    pub fn binary_reg(
        &mut self,
        op: BinOp,
        (a, ta): (Register, DataType),
        (b, tb): (Register, DataType),
        dtype: DataType,
        node: &AstNode,
    ) -> LowerResult<Register> {
        let src1 = self.cast_reg(a, ta, dtype, node)?;
        let src2 = self.cast_reg(b, tb, dtype, node)?;
        let dest = self.ir.alloc_reg();
        self.emit(IROp::Binary { op, dest, src1, src2, dtype }, node)?;
        Ok(dest)
    }

    /// `reg != 0` as an i32 0/1 value.
    pub fn truth_reg(&mut self, reg: Register, dtype: DataType, node: &AstNode) -> LowerResult<Register> {
        let zero = self.const_reg(Value::zero(dtype), node)?;
        self.binary_reg(BinOp::Ne, (reg, dtype), (zero, dtype), dtype, node)
    }

    // ------- operands -------

    /// Forces `operand` into one register.
    pub fn scalar(&mut self, operand: Operand, node: &AstNode) -> LowerResult<(Register, DataType)> {
        match operand {
            Operand::Scalar { reg, dtype } => Ok((reg, dtype)),
            Operand::Static(value) => match (value.as_int(), &value, self.static_dtype(&value)) {
                (_, StaticValue::Float(f), Some(dtype)) => Ok((self.const_reg(Value::Float(*f).cast(dtype), node)?, dtype)),
                (Some(i), _, Some(dtype)) => Ok((self.const_reg(Value::Int(i).cast(dtype), node)?, dtype)),
                _ => Err(error(
                    DiagnosticKind::TypeMismatch,
                    format!("Expected a number, found static {}", value.type_name()),
                    node,
                )),
            },
            other => Err(error(
                DiagnosticKind::TypeMismatch,
                format!("Expected a scalar, found {}", other.describe()),
                node,
            )),
        }
    }

    /// Forces `operand` into a register matrix.
    pub fn matrix(&mut self, operand: Operand, node: &AstNode) -> LowerResult<RtMatrix> {
        match operand {
            Operand::Matrix(m) => Ok(m),
            Operand::Static(StaticValue::Matrix(m)) => self.materialize_matrix(&m, node),
            other => Err(error(
                DiagnosticKind::TypeMismatch,
                format!("Expected a matrix, found {}", other.describe()),
                node,
            )),
        }
    }

    pub fn materialize_matrix(&mut self, m: &StaticMatrix, node: &AstNode) -> LowerResult<RtMatrix> {
        let mut entries = Vec::with_capacity(m.entries.len());
        for entry in &m.entries {
            entries.push(self.scalar(Operand::Static(entry.clone()), node)?);
        }
        Ok(RtMatrix { rows: m.rows, cols: m.cols, entries, is_vector: m.is_vector })
    }

    // ------- variables and places -------

    /// Allocates fresh local slots holding a copy of `operand`.
    pub fn new_var(&mut self, operand: Operand, node: &AstNode) -> LowerResult<Var> {
        match operand {
            Operand::Matrix(_) | Operand::Static(StaticValue::Matrix(_)) => {
                let m = self.matrix(operand, node)?;
                let dtype = m.dtype();
                let mut locals = Vec::with_capacity(m.entries.len());
                for (reg, t) in m.entries {
                    let local = self.ir.alloc_local(dtype);
                    let src = self.cast_reg(reg, t, dtype, node)?;
                    self.emit(IROp::SLocal { src, local_index: local }, node)?;
                    locals.push(local);
                }
                Ok(Var::Matrix { rows: m.rows, cols: m.cols, locals, dtype, is_vector: m.is_vector })
            }
            other => {
                let (reg, dtype) = self.scalar(other, node)?;
                let local = self.ir.alloc_local(dtype);
                self.emit(IROp::SLocal { src: reg, local_index: local }, node)?;
                Ok(Var::Scalar { local, dtype })
            }
        }
    }

    pub fn load_var(&mut self, var: &Var, node: &AstNode) -> LowerResult<Operand> {
        self.load_place(&var.as_place(), node)
    }

    pub fn load_place(&mut self, place: &Place, node: &AstNode) -> LowerResult<Operand> {
        match place {
            Place::Local { local, dtype } => {
                let dest = self.ir.alloc_reg();
                self.emit(IROp::LLocal { dest, local_index: *local }, node)?;
                Ok(Operand::Scalar { reg: dest, dtype: *dtype })
            }
            Place::Global { target, indices, element, dtype } => {
                let dest = self.ir.alloc_reg();
                self.emit(
                    IROp::GLoad { dest, target: *target, indices: indices.clone(), element: *element },
                    node,
                )?;
                Ok(Operand::Scalar { reg: dest, dtype: *dtype })
            }
            Place::Matrix { rows, cols, entries, is_vector } => {
                let mut regs = Vec::with_capacity(entries.len());
                for entry in entries {
                    let loaded = self.load_place(entry, node)?;
                    regs.push(self.scalar(loaded, node)?);
                }
                Ok(Operand::Matrix(RtMatrix { rows: *rows, cols: *cols, entries: regs, is_vector: *is_vector }))
            }
            Place::Sparse { .. } => Err(error(
                DiagnosticKind::UnsupportedConstruct,
                "Sparse matrix builder elements can only be updated with +=",
                node,
            )),
        }
    }

    /// Stores `value` into `place`, casting to the place's type.
    pub fn store_place(&mut self, place: &Place, value: Operand, node: &AstNode) -> LowerResult<()> {
        match place {
            Place::Local { local, dtype } => {
                let (reg, from) = self.scalar(value, node)?;
                let src = self.cast_reg(reg, from, *dtype, node)?;
                self.emit(IROp::SLocal { src, local_index: *local }, node)?;
            }
            Place::Global { target, indices, element, dtype } => {
                let (reg, from) = self.scalar(value, node)?;
                let src = self.cast_reg(reg, from, *dtype, node)?;
                self.emit(
                    IROp::GStore { src, target: *target, indices: indices.clone(), element: *element },
                    node,
                )?;
            }
            Place::Matrix { rows, cols, entries, .. } => {
                let values: Vec<Operand> = match value {
                    Operand::Scalar { .. } | Operand::Static(StaticValue::Int(_) | StaticValue::Float(_)) => {
                        vec![value; entries.len()]
                    }
                    other => {
                        let m = self.matrix(other, node)?;
                        if (m.rows, m.cols) != (*rows, *cols) {
                            return Err(error(
                                DiagnosticKind::TypeMismatch,
                                format!("Cannot assign a {}x{} matrix to a {}x{} matrix", m.rows, m.cols, rows, cols),
                                node,
                            ));
                        }
                        m.entries.into_iter().map(|(reg, dtype)| Operand::Scalar { reg, dtype }).collect()
                    }
                };
                for (entry, v) in entries.iter().zip(values) {
                    self.store_place(entry, v, node)?;
                }
            }
            Place::Sparse { .. } => {
                return Err(error(
                    DiagnosticKind::UnsupportedConstruct,
                    "Sparse matrix builder elements can only be updated with +=",
                    node,
                ));
            }
        }
        Ok(())
    }

    // ------- names -------

    /// Resolves a name: frame bindings, then program globals, then
    /// registered functions, builtins and type names.
    pub fn lookup(&self, name: &str) -> Option<Binding> {
        if let Some(binding) = self.frame.table.lookup(name) {
            return Some(binding.clone());
        }
        if let Some(value) = self.globals.get(name) {
            return Some(Binding::Static(value.clone()));
        }
        if self.registry.contains(name) {
            return Some(Binding::Static(StaticValue::Function(name.to_string())));
        }
        if let Some(builtin) = Builtin::from_name(name) {
            return Some(Binding::Static(StaticValue::Builtin(builtin)));
        }
        DataType::from_name(name).map(|t| Binding::Static(StaticValue::DataType(t)))
    }

    pub fn bind(&mut self, name: &str, binding: Binding) {
        self.frame.table.insert(name, binding);
    }

    /// Bindings of the outermost scope of a script frame.
    pub fn take_script_bindings(&mut self) -> HashMap<String, StaticValue> {
        let mut out = HashMap::new();
        for (name, binding) in self.frame.table.exit_root() {
            if let Binding::Static(value) = binding {
                out.insert(name, value);
            }
        }
        out
    }
}
