use std::collections::HashMap;

use serde::Serialize;

use crate::ir::op::{IROp, Register};
use crate::ir::value::DataType;
use crate::vm::field::{Field, Layout};

/// Runtime argument slot of a compiled kernel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum ArgSlot {
    Scalar(DataType),
    NdArray {
        dtype: DataType,
        ndim: usize,
        element_shape: Vec<usize>,
        layout: Layout,
    },
    SparseBuilder,
}

/// Lowered form of one kernel specialization.
#[derive(Debug, Clone, Serialize)]
pub struct KernelIr {
    pub name: String,
    pub ops: Vec<IROp>,
    /// Type of every local slot, by index.
    pub locals: Vec<DataType>,
    pub args: Vec<ArgSlot>,
    pub ret: Option<DataType>,
    /// Fields referenced through `GlobalRef::Field`.
    #[serde(skip)]
    pub fields: Vec<Field>,
    next_reg: usize,
    next_label: usize,
    #[serde(skip)]
    labels: HashMap<String, usize>,
    #[serde(skip)]
    unresolved_branches: Vec<(usize, String)>,
}

impl KernelIr {
    pub fn new(name: &str) -> Self {
        KernelIr {
            name: name.to_string(),
            ops: Vec::new(),
            locals: Vec::new(),
            args: Vec::new(),
            ret: None,
            fields: Vec::new(),
            next_reg: 0,
            next_label: 0,
            labels: HashMap::new(),
            unresolved_branches: Vec::new(),
        }
    }

    pub fn alloc_reg(&mut self) -> Register {
        let r = self.next_reg;
        self.next_reg += 1;
        r
    }

    pub fn register_count(&self) -> usize {
        self.next_reg
    }

    pub fn alloc_local(&mut self, dtype: DataType) -> usize {
        self.locals.push(dtype);
        self.locals.len() - 1
    }

    /// Index of `field` in the field table, adding it on first use.
    pub fn intern_field(&mut self, field: &Field) -> usize {
        match self.fields.iter().position(|f| f.id() == field.id()) {
            Some(i) => i,
            None => {
                self.fields.push(field.clone());
                self.fields.len() - 1
            }
        }
    }

    pub fn new_label(&mut self, hint: &str) -> String {
        let name = format!("{}_{}", hint, self.next_label);
        self.next_label += 1;
        name
    }

    pub fn emit_op(&mut self, op: IROp) -> usize {
        let idx = self.ops.len();
        if let IROp::Label { name } = &op {
            self.labels.insert(name.clone(), idx);
        }
        self.ops.push(op);
        idx
    }

    /// Emits a `Jump`/`BrTrue`/`BrFalse` whose target is patched to the
    /// position of `label` by `patch_unresolved_branches`.
    pub fn emit_branch(&mut self, op: IROp, label: &str) -> usize {
        let idx = self.emit_op(op);
        self.unresolved_branches.push((idx, label.to_string()));
        idx
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Sets the `end` operand of the loop header at `header`.
    pub fn patch_loop_end(&mut self, header: usize, end_index: usize) {
        match self.ops.get_mut(header) {
            Some(IROp::StructFor { end, .. }) | Some(IROp::RangeFor { end, .. }) => *end = end_index,
            other => log::warn!("[ir] loop header expected at {}, found {:?}", header, other),
        }
    }

    /// Rewrites accesses to local slot `from` in `ops[start..]` to `to`.
    pub fn rename_local(&mut self, start: usize, from: usize, to: usize) {
        for op in self.ops.iter_mut().skip(start) {
            match op {
                IROp::LLocal { local_index, .. } | IROp::SLocal { local_index, .. } if *local_index == from => {
                    *local_index = to;
                }
                IROp::StructFor { index_locals, .. } => {
                    for l in index_locals.iter_mut().filter(|l| **l == from) {
                        *l = to;
                    }
                }
                IROp::RangeFor { local, .. } if *local == from => *local = to,
                _ => {}
            }
        }
    }

    pub fn patch_unresolved_branches(&mut self) {
        for (op_index, label_name) in self.unresolved_branches.drain(..) {
            let Some(&target_idx) = self.labels.get(&label_name) else {
                log::warn!("[ir] unresolved branch: label '{}' not found", label_name);
                continue;
            };
            match self.ops.get_mut(op_index) {
                Some(IROp::BrFalse { target, .. })
                | Some(IROp::BrTrue { target, .. })
                | Some(IROp::Jump { target }) => *target = target_idx,
                Some(other) => log::warn!("[ir] attempted to patch non-branch op at {}: {}", op_index, other),
                None => log::warn!("[ir] unresolved branch op_index out of range: {}", op_index),
            }
        }
    }
}

impl std::fmt::Display for KernelIr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let args: Vec<String> = self
            .args
            .iter()
            .map(|a| match a {
                ArgSlot::Scalar(t) => t.to_string(),
                ArgSlot::NdArray { dtype, ndim, element_shape, layout } => {
                    format!("ndarray<{}, {}d, {:?}, {:?}>", dtype, ndim, element_shape, layout)
                }
                ArgSlot::SparseBuilder => "sparse_builder".to_string(),
            })
            .collect();
        write!(f, "kernel {}({})", self.name, args.join(", "))?;
        if let Some(ret) = &self.ret {
            write!(f, " -> {}", ret)?;
        }
        writeln!(f)?;
        for (i, field) in self.fields.iter().enumerate() {
            writeln!(f, "  field{}: {} {:?}", i, field.dtype(), field.shape())?;
        }
        for (i, op) in self.ops.iter().enumerate() {
            writeln!(f, "{:04}: {}", i, op)?;
        }
        Ok(())
    }
}
