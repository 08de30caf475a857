//! file: core/src/ir/lower/operand.rs
//! description: results of lowering expressions and assignable places.

use crate::ir::op::{GlobalRef, Register};
use crate::ir::value::DataType;

use super::static_value::StaticValue;

/// Runtime matrix held in registers, row-major.
#[derive(Debug, Clone)]
pub struct RtMatrix {
    pub rows: usize,
    pub cols: usize,
    pub entries: Vec<(Register, DataType)>,
    pub is_vector: bool,
}

impl RtMatrix {
    pub fn dtype(&self) -> DataType {
        self.entries
            .iter()
            .map(|(_, t)| *t)
            .reduce(DataType::promote)
            .unwrap_or(DataType::I32)
    }
}

/// Value of a lowered expression.
#[derive(Debug, Clone)]
pub enum Operand {
    Static(StaticValue),
    Scalar { reg: Register, dtype: DataType },
    Matrix(RtMatrix),
    Tuple(Vec<Operand>),
}

impl Operand {
    pub fn as_static(&self) -> Option<&StaticValue> {
        match self {
            Operand::Static(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_static(&self) -> bool {
        match self {
            Operand::Static(_) => true,
            Operand::Tuple(items) => items.iter().all(Operand::is_static),
            _ => false,
        }
    }

    /// Folds a tuple of static operands into one static tuple.
    pub fn into_static(self) -> Option<StaticValue> {
        match self {
            Operand::Static(v) => Some(v),
            Operand::Tuple(items) => items
                .into_iter()
                .map(Operand::into_static)
                .collect::<Option<Vec<_>>>()
                .map(StaticValue::Tuple),
            _ => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Operand::Static(v) => format!("static {}", v.type_name()),
            Operand::Scalar { dtype, .. } => format!("{} value", dtype),
            Operand::Matrix(m) => format!("{}x{} matrix", m.rows, m.cols),
            Operand::Tuple(items) => format!("tuple of {}", items.len()),
        }
    }
}

/// Runtime variable stored in local slots.
#[derive(Debug, Clone, PartialEq)]
pub enum Var {
    Scalar { local: usize, dtype: DataType },
    Matrix { rows: usize, cols: usize, locals: Vec<usize>, dtype: DataType, is_vector: bool },
}

impl Var {
    pub fn dtype(&self) -> DataType {
        match self {
            Var::Scalar { dtype, .. } | Var::Matrix { dtype, .. } => *dtype,
        }
    }

    pub fn locals(&self) -> Vec<usize> {
        match self {
            Var::Scalar { local, .. } => vec![*local],
            Var::Matrix { locals, .. } => locals.clone(),
        }
    }

    /// Same dtype and shape; the condition for merging `if` arms.
    pub fn same_layout(&self, other: &Var) -> bool {
        match (self, other) {
            (Var::Scalar { dtype: a, .. }, Var::Scalar { dtype: b, .. }) => a == b,
            (
                Var::Matrix { rows: r1, cols: c1, dtype: a, .. },
                Var::Matrix { rows: r2, cols: c2, dtype: b, .. },
            ) => r1 == r2 && c1 == c2 && a == b,
            _ => false,
        }
    }

    pub fn as_place(&self) -> Place {
        match self {
            Var::Scalar { local, dtype } => Place::Local { local: *local, dtype: *dtype },
            Var::Matrix { rows, cols, locals, dtype, is_vector } => Place::Matrix {
                rows: *rows,
                cols: *cols,
                entries: locals.iter().map(|l| Place::Local { local: *l, dtype: *dtype }).collect(),
                is_vector: *is_vector,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Runtime(Var),
    Static(StaticValue),
}

/// Target of a store.
#[derive(Debug, Clone, PartialEq)]
pub enum Place {
    Local { local: usize, dtype: DataType },
    Global { target: GlobalRef, indices: Vec<Register>, element: usize, dtype: DataType },
    Matrix { rows: usize, cols: usize, entries: Vec<Place>, is_vector: bool },
    /// Element of a sparse-matrix builder; only `+=` is allowed.
    Sparse { arg: usize, row: Register, col: Register },
}
