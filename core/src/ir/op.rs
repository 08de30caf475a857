use serde::Serialize;

use super::value::{DataType, Value};

pub type Register = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Min,
    Max,
}

impl BinOp {
    pub fn is_comparison(&self) -> bool {
        matches!(self, BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge)
    }

    pub fn mnemonic(&self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::Div => "div",
            BinOp::FloorDiv => "floordiv",
            BinOp::Mod => "mod",
            BinOp::Pow => "pow",
            BinOp::Shl => "shl",
            BinOp::Shr => "shr",
            BinOp::BitAnd => "bit_and",
            BinOp::BitOr => "bit_or",
            BinOp::BitXor => "bit_xor",
            BinOp::Eq => "cmp_eq",
            BinOp::Ne => "cmp_ne",
            BinOp::Lt => "cmp_lt",
            BinOp::Le => "cmp_le",
            BinOp::Gt => "cmp_gt",
            BinOp::Ge => "cmp_ge",
            BinOp::Min => "min",
            BinOp::Max => "max",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum UnOp {
    Neg,
    Not,
    BitNot,
    Abs,
}

/// Global storage addressed by a load or store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum GlobalRef {
    /// Index into the kernel's field table.
    Field(usize),
    /// Index of an external-array kernel argument.
    Arg(usize),
}

impl std::fmt::Display for GlobalRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GlobalRef::Field(i) => write!(f, "field{}", i),
            GlobalRef::Arg(i) => write!(f, "arg{}", i),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PrintPart {
    Literal(String),
    Value { reg: Register, dtype: DataType },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum IROp {
    LConst { dest: Register, value: Value },
    LArg { dest: Register, index: usize },

    LLocal { dest: Register, local_index: usize },
    SLocal { src: Register, local_index: usize },

    Binary { op: BinOp, dest: Register, src1: Register, src2: Register, dtype: DataType },
    Unary { op: UnOp, dest: Register, src: Register, dtype: DataType },
    Cast { dest: Register, src: Register, to: DataType },
    Select { dest: Register, cond: Register, on_true: Register, on_false: Register },

    /// `element` is the flattened entry index inside a matrix-valued element.
    GLoad { dest: Register, target: GlobalRef, indices: Vec<Register>, element: usize },
    GStore { src: Register, target: GlobalRef, indices: Vec<Register>, element: usize },
    SparseAdd { arg: usize, row: Register, col: Register, src: Register },

    Label { name: String },
    Jump { target: usize },
    BrTrue { cond: Register, target: usize },
    BrFalse { cond: Register, target: usize },

    /// Runs the ops up to `end` (an `EndFor`) once per element index.
    StructFor { target: GlobalRef, index_locals: Vec<usize>, end: usize },
    /// Runs the ops up to `end` (an `EndFor`) for `local` in `begin..end_reg`.
    RangeFor { local: usize, begin: Register, end_reg: Register, end: usize },
    EndFor,

    Print { parts: Vec<PrintPart> },
    Ret { src: Register },
    Halt,
}

impl IROp {
    /// Register written by this op, if any.
    pub fn dest(&self) -> Option<Register> {
        match self {
            IROp::LConst { dest, .. }
            | IROp::LArg { dest, .. }
            | IROp::LLocal { dest, .. }
            | IROp::Binary { dest, .. }
            | IROp::Unary { dest, .. }
            | IROp::Cast { dest, .. }
            | IROp::Select { dest, .. }
            | IROp::GLoad { dest, .. } => Some(*dest),
            _ => None,
        }
    }
}

fn join_regs(regs: &[Register]) -> String {
    regs.iter().map(|r| format!("r{}", r)).collect::<Vec<_>>().join(", ")
}

impl std::fmt::Display for IROp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IROp::LConst { dest, value } => write!(f, "LConst r{} <- {}", dest, value),
            IROp::LArg { dest, index } => write!(f, "LArg r{} <- arg[{}]", dest, index),
            IROp::LLocal { dest, local_index } => write!(f, "LLocal r{} <- local[{}]", dest, local_index),
            IROp::SLocal { src, local_index } => write!(f, "SLocal local[{}] <- r{}", local_index, src),
            IROp::Binary { op, dest, src1, src2, dtype } => {
                write!(f, "{} r{} <- r{}, r{} : {}", op.mnemonic(), dest, src1, src2, dtype)
            }
            IROp::Unary { op, dest, src, dtype } => write!(f, "{:?} r{} <- r{} : {}", op, dest, src, dtype),
            IROp::Cast { dest, src, to } => write!(f, "Cast r{} <- r{} as {}", dest, src, to),
            IROp::Select { dest, cond, on_true, on_false } => {
                write!(f, "Select r{} <- r{} ? r{} : r{}", dest, cond, on_true, on_false)
            }
            IROp::GLoad { dest, target, indices, element } => {
                write!(f, "GLoad r{} <- {}[{}].{}", dest, target, join_regs(indices), element)
            }
            IROp::GStore { src, target, indices, element } => {
                write!(f, "GStore {}[{}].{} <- r{}", target, join_regs(indices), element, src)
            }
            IROp::SparseAdd { arg, row, col, src } => {
                write!(f, "SparseAdd arg{}[r{}, r{}] += r{}", arg, row, col, src)
            }
            IROp::Label { name } => write!(f, "Label {}", name),
            IROp::Jump { target } => write!(f, "Jump {}", target),
            IROp::BrTrue { cond, target } => write!(f, "BrTrue r{} -> {}", cond, target),
            IROp::BrFalse { cond, target } => write!(f, "BrFalse r{} -> {}", cond, target),
            IROp::StructFor { target, index_locals, end } => {
                let locals: Vec<String> = index_locals.iter().map(|l| format!("local[{}]", l)).collect();
                write!(f, "StructFor ({}) in {} until {}", locals.join(", "), target, end)
            }
            IROp::RangeFor { local, begin, end_reg, end } => {
                write!(f, "RangeFor local[{}] in r{}..r{} until {}", local, begin, end_reg, end)
            }
            IROp::EndFor => write!(f, "EndFor"),
            IROp::Print { parts } => {
                write!(f, "Print")?;
                for part in parts {
                    match part {
                        PrintPart::Literal(s) => write!(f, " {:?}", s)?,
                        PrintPart::Value { reg, dtype } => write!(f, " r{}:{}", reg, dtype)?,
                    }
                }
                Ok(())
            }
            IROp::Ret { src } => write!(f, "Ret r{}", src),
            IROp::Halt => write!(f, "Halt"),
        }
    }
}
