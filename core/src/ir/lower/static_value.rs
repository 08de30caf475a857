//! file: core/src/ir/lower/static_value.rs
//! description: compile-time values.
//!
//! A `StaticValue` is anything lowering knows before the kernel runs:
//! numbers and containers, ranges, annotations, handles to global storage
//! and references to callables. Static values never reach the IR except
//! as materialized constants.

use std::collections::HashMap;

use lazy_static::lazy_static;

use crate::ir::value::{DataType, render_float};
use crate::vm::field::{Field, Layout};

/// Builtin callables and namespaces resolved by bare name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Static,
    Range,
    NdRange,
    Matrix,
    Vector,
    Subscript,
    Cast,
    TiFloat,
    TiInt,
    Float,
    Int,
    Abs,
    Min,
    Max,
    Len,
    Field,
    AnyArr,
    Template,
    SparseMatrixBuilder,
    Print,
    /// The `Layout` namespace; `Layout.AOS` / `Layout.SOA`.
    Layout,
}

lazy_static! {
    static ref BUILTINS_BY_NAME: HashMap<&'static str, Builtin> =
        Builtin::ALL.iter().map(|b| (b.name(), *b)).collect();
}

impl Builtin {
    pub const ALL: [Builtin; 21] = [
        Builtin::Static,
        Builtin::Range,
        Builtin::NdRange,
        Builtin::Matrix,
        Builtin::Vector,
        Builtin::Subscript,
        Builtin::Cast,
        Builtin::TiFloat,
        Builtin::TiInt,
        Builtin::Float,
        Builtin::Int,
        Builtin::Abs,
        Builtin::Min,
        Builtin::Max,
        Builtin::Len,
        Builtin::Field,
        Builtin::AnyArr,
        Builtin::Template,
        Builtin::SparseMatrixBuilder,
        Builtin::Print,
        Builtin::Layout,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        BUILTINS_BY_NAME.get(name).copied()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Static => "static",
            Builtin::Range => "range",
            Builtin::NdRange => "ndrange",
            Builtin::Matrix => "Matrix",
            Builtin::Vector => "Vector",
            Builtin::Subscript => "subscript",
            Builtin::Cast => "cast",
            Builtin::TiFloat => "ti_float",
            Builtin::TiInt => "ti_int",
            Builtin::Float => "float",
            Builtin::Int => "int",
            Builtin::Abs => "abs",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Len => "len",
            Builtin::Field => "field",
            Builtin::AnyArr => "any_arr",
            Builtin::Template => "template",
            Builtin::SparseMatrixBuilder => "sparse_matrix_builder",
            Builtin::Print => "print",
            Builtin::Layout => "Layout",
        }
    }
}

/// Compile-time matrix; `entries` are numeric and row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticMatrix {
    pub rows: usize,
    pub cols: usize,
    pub entries: Vec<StaticValue>,
    pub is_vector: bool,
}

impl StaticMatrix {
    pub fn get(&self, row: usize, col: usize) -> Option<&StaticValue> {
        if row < self.rows && col < self.cols { self.entries.get(row * self.cols + col) } else { None }
    }
}

/// Compile-time view of an external-array kernel argument.
#[derive(Debug, Clone, PartialEq)]
pub struct NdArrayRef {
    pub arg: usize,
    pub dtype: DataType,
    pub ndim: usize,
    pub element_shape: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StaticValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Tuple(Vec<StaticValue>),
    List(Vec<StaticValue>),
    Range { start: i64, stop: i64, step: i64 },
    /// Per-dimension `(begin, end)` bounds.
    NdRange(Vec<(i64, i64)>),
    Matrix(StaticMatrix),
    DataType(DataType),
    Template,
    ArraySpec { element_dim: Option<usize>, layout: Option<Layout> },
    SparseBuilderSpec,
    Layout(Layout),
    Field(Field),
    NdArray(NdArrayRef),
    SparseBuilder { arg: usize },
    /// A registered kernel, `@func` or host function.
    Function(String),
    Builtin(Builtin),
}

impl StaticValue {
    pub fn is_numeric(&self) -> bool {
        matches!(self, StaticValue::Bool(_) | StaticValue::Int(_) | StaticValue::Float(_))
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            StaticValue::Int(i) => Some(*i),
            StaticValue::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StaticValue::Float(f) => Some(*f),
            other => other.as_int().map(|i| i as f64),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            StaticValue::None => "None",
            StaticValue::Bool(_) => "bool",
            StaticValue::Int(_) => "int",
            StaticValue::Float(_) => "float",
            StaticValue::Str(_) => "str",
            StaticValue::Tuple(_) => "tuple",
            StaticValue::List(_) => "list",
            StaticValue::Range { .. } => "range",
            StaticValue::NdRange(_) => "ndrange",
            StaticValue::Matrix(_) => "Matrix",
            StaticValue::DataType(_) => "dtype",
            StaticValue::Template => "template",
            StaticValue::ArraySpec { .. } => "any_arr",
            StaticValue::SparseBuilderSpec => "sparse_matrix_builder",
            StaticValue::Layout(_) => "Layout",
            StaticValue::Field(_) => "field",
            StaticValue::NdArray(_) => "ndarray",
            StaticValue::SparseBuilder { .. } => "SparseMatrixBuilder",
            StaticValue::Function(_) => "function",
            StaticValue::Builtin(_) => "builtin",
        }
    }

    /// Key distinguishing template arguments in the compile cache.
    pub fn cache_key(&self) -> String {
        match self {
            StaticValue::Int(i) => format!("i{}", i),
            StaticValue::Float(f) => format!("f{:x}", f.to_bits()),
            StaticValue::Bool(b) => format!("b{}", b),
            StaticValue::Str(s) => format!("s{:?}", s),
            StaticValue::Tuple(items) | StaticValue::List(items) => {
                let inner: Vec<String> = items.iter().map(|v| v.cache_key()).collect();
                format!("({})", inner.join(","))
            }
            StaticValue::Matrix(m) => {
                let inner: Vec<String> = m.entries.iter().map(|v| v.cache_key()).collect();
                format!("m{}x{}[{}]", m.rows, m.cols, inner.join(","))
            }
            StaticValue::Field(f) => format!("field#{}", f.id()),
            StaticValue::Function(name) => format!("fn:{}", name),
            other => format!("{:?}", other),
        }
    }

    /// Text of the value as `print` shows it.
    pub fn render(&self) -> String {
        match self {
            StaticValue::None => "None".to_string(),
            StaticValue::Bool(true) => "True".to_string(),
            StaticValue::Bool(false) => "False".to_string(),
            StaticValue::Int(i) => i.to_string(),
            StaticValue::Float(f) => render_float(*f, DataType::F64),
            StaticValue::Str(s) => s.clone(),
            StaticValue::Tuple(items) if items.len() == 1 => format!("({},)", items[0].render()),
            StaticValue::Tuple(items) => {
                let inner: Vec<String> = items.iter().map(|v| v.render()).collect();
                format!("({})", inner.join(", "))
            }
            StaticValue::List(items) => {
                let inner: Vec<String> = items.iter().map(|v| v.render()).collect();
                format!("[{}]", inner.join(", "))
            }
            StaticValue::Range { start, stop, step } if *step == 1 => format!("range({}, {})", start, stop),
            StaticValue::Range { start, stop, step } => format!("range({}, {}, {})", start, stop, step),
            StaticValue::Matrix(m) => render_matrix(m.rows, m.cols, m.is_vector, |i| m.entries[i].render()),
            StaticValue::DataType(t) => t.to_string(),
            StaticValue::Layout(l) => format!("Layout.{:?}", l),
            StaticValue::Field(f) => format!("<field {} {:?}>", f.dtype(), f.shape()),
            StaticValue::Function(name) => format!("<function {}>", name),
            StaticValue::Builtin(b) => format!("<builtin {}>", b.name()),
            other => format!("<{}>", other.type_name()),
        }
    }
}

/// `[a, b]` for vectors, `[[a, b], [c, d]]` for matrices.
pub(crate) fn render_matrix<F: Fn(usize) -> String>(rows: usize, cols: usize, is_vector: bool, entry: F) -> String {
    if is_vector {
        let inner: Vec<String> = (0..rows * cols).map(&entry).collect();
        return format!("[{}]", inner.join(", "));
    }
    let rendered: Vec<String> = (0..rows)
        .map(|r| {
            let row: Vec<String> = (0..cols).map(|c| entry(r * cols + c)).collect();
            format!("[{}]", row.join(", "))
        })
        .collect();
    format!("[{}]", rendered.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_like_host_values() {
        assert_eq!(StaticValue::Float(12.0).render(), "12.0");
        assert_eq!(StaticValue::Tuple(vec![StaticValue::Int(1)]).render(), "(1,)");
        assert_eq!(StaticValue::Bool(true).render(), "True");
        let m = StaticMatrix {
            rows: 2,
            cols: 2,
            entries: vec![StaticValue::Int(1), StaticValue::Int(0), StaticValue::Int(0), StaticValue::Int(1)],
            is_vector: false,
        };
        assert_eq!(StaticValue::Matrix(m).render(), "[[1, 0], [0, 1]]");
    }

    #[test]
    fn builtin_names_resolve_both_ways() {
        for builtin in Builtin::ALL {
            assert_eq!(Builtin::from_name(builtin.name()), Some(builtin));
        }
        assert_eq!(Builtin::from_name("ti"), None);
    }

    #[test]
    fn field_cache_key_uses_identity() {
        let a = Field::new(DataType::I32, &[2]);
        let b = Field::new(DataType::I32, &[2]);
        assert_ne!(StaticValue::Field(a.clone()).cache_key(), StaticValue::Field(b).cache_key());
        assert_eq!(StaticValue::Field(a.clone()).cache_key(), StaticValue::Field(a).cache_key());
    }
}
