use serde::{Deserialize, Serialize};

/// Primitive element types of kernel values, fields and arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    I32,
    I64,
    F32,
    F64,
}

impl DataType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "i32" => Some(DataType::I32),
            "i64" => Some(DataType::I64),
            "f32" => Some(DataType::F32),
            "f64" => Some(DataType::F64),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DataType::I32 => "i32",
            DataType::I64 => "i64",
            DataType::F32 => "f32",
            DataType::F64 => "f64",
        }
    }

    pub fn is_int(&self) -> bool {
        matches!(self, DataType::I32 | DataType::I64)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, DataType::F32 | DataType::F64)
    }

    /// Common type of a binary operation: floats win over ints, wider wins
    /// over narrower.
    pub fn promote(a: DataType, b: DataType) -> DataType {
        match (a.is_float(), b.is_float()) {
            (true, true) | (false, false) => {
                if a == DataType::F64 || b == DataType::F64 {
                    DataType::F64
                } else if a == DataType::I64 || b == DataType::I64 {
                    DataType::I64
                } else {
                    a
                }
            }
            (true, false) => a,
            (false, true) => b,
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A runtime scalar. Integers are carried as `i64` and floats as `f64`;
/// `cast` narrows them to the precision of a `DataType`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int(i64),
    Float(f64),
}

impl Value {
    pub fn zero(dtype: DataType) -> Value {
        if dtype.is_float() { Value::Float(0.0) } else { Value::Int(0) }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            Value::Int(i) => *i as f64,
            Value::Float(f) => *f,
        }
    }

    /// Float to int conversion truncates toward zero.
    pub fn as_i64(&self) -> i64 {
        match self {
            Value::Int(i) => *i,
            Value::Float(f) => *f as i64,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
        }
    }

    pub fn cast(&self, dtype: DataType) -> Value {
        match dtype {
            DataType::I32 => Value::Int(self.as_i64() as i32 as i64),
            DataType::I64 => Value::Int(self.as_i64()),
            DataType::F32 => Value::Float(self.as_f64() as f32 as f64),
            DataType::F64 => Value::Float(self.as_f64()),
        }
    }

    /// Text used by `print`: integers as-is, floats always with a fraction.
    pub fn render(&self, dtype: DataType) -> String {
        match self.cast(dtype) {
            Value::Int(i) => i.to_string(),
            Value::Float(f) => render_float(f, dtype),
        }
    }
}

pub(crate) fn render_float(f: f64, dtype: DataType) -> String {
    let text = if dtype == DataType::F32 {
        (f as f32).to_string()
    } else {
        f.to_string()
    };
    if f.is_finite() && !text.contains('.') && !text.contains('e') {
        format!("{}.0", text)
    } else {
        text
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", render_float(*x, DataType::F64)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotion_prefers_float_and_width() {
        assert_eq!(DataType::promote(DataType::I32, DataType::F32), DataType::F32);
        assert_eq!(DataType::promote(DataType::I64, DataType::I32), DataType::I64);
        assert_eq!(DataType::promote(DataType::F32, DataType::F64), DataType::F64);
    }

    #[test]
    fn cast_wraps_and_truncates() {
        assert_eq!(Value::Int(1 << 33).cast(DataType::I32), Value::Int(0));
        assert_eq!(Value::Float(-12.7).cast(DataType::I32), Value::Int(-12));
        assert_eq!(Value::Float(2.0).render(DataType::F32), "2.0");
    }
}
