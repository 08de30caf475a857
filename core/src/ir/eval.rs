//! file: core/src/ir/eval.rs
//! description: scalar semantics of IR operations.
//!
//! One implementation serves the executor, the constant folder and the
//! static evaluator, so a folded result is always the value the executor
//! would have produced.

use super::op::{BinOp, UnOp};
use super::value::{DataType, Value};

/// Applies `op` to operands of type `dtype`. Comparisons yield `Int(0|1)`;
/// every other result is narrowed to `dtype`.
pub fn eval_binary(op: BinOp, a: Value, b: Value, dtype: DataType) -> Result<Value, String> {
    let a = a.cast(dtype);
    let b = b.cast(dtype);
    if dtype.is_int() {
        let wide = dtype == DataType::I64;
        let r = int_binary(op, a.as_i64(), b.as_i64(), wide)?;
        Ok(if op.is_comparison() { Value::Int(r) } else { Value::Int(r).cast(dtype) })
    } else {
        let (x, y) = (a.as_f64(), b.as_f64());
        let r = match op {
            BinOp::Add => x + y,
            BinOp::Sub => x - y,
            BinOp::Mul => x * y,
            BinOp::Div => x / y,
            BinOp::FloorDiv => (x / y).floor(),
            BinOp::Mod => x - y * (x / y).floor(),
            BinOp::Pow => x.powf(y),
            BinOp::Min => x.min(y),
            BinOp::Max => x.max(y),
            BinOp::Eq => return Ok(Value::Int((x == y) as i64)),
            BinOp::Ne => return Ok(Value::Int((x != y) as i64)),
            BinOp::Lt => return Ok(Value::Int((x < y) as i64)),
            BinOp::Le => return Ok(Value::Int((x <= y) as i64)),
            BinOp::Gt => return Ok(Value::Int((x > y) as i64)),
            BinOp::Ge => return Ok(Value::Int((x >= y) as i64)),
            BinOp::Shl | BinOp::Shr | BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor => {
                return Err(format!("operator '{}' requires integer operands, got {}", op.mnemonic(), dtype));
            }
        };
        Ok(Value::Float(r).cast(dtype))
    }
}

fn int_binary(op: BinOp, a: i64, b: i64, wide: bool) -> Result<i64, String> {
    let r = match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::Div => {
            if b == 0 {
                return Err("integer division by zero".to_string());
            }
            a.wrapping_div(b)
        }
        BinOp::FloorDiv => floor_div(a, b)?,
        BinOp::Mod => floor_mod(a, b)?,
        BinOp::Pow => int_pow(a, b)?,
        BinOp::Shl if wide => a.wrapping_shl(b as u32),
        BinOp::Shl => (a as i32).wrapping_shl(b as u32) as i64,
        BinOp::Shr if wide => a.wrapping_shr(b as u32),
        BinOp::Shr => (a as i32).wrapping_shr(b as u32) as i64,
        BinOp::BitAnd => a & b,
        BinOp::BitOr => a | b,
        BinOp::BitXor => a ^ b,
        BinOp::Eq => (a == b) as i64,
        BinOp::Ne => (a != b) as i64,
        BinOp::Lt => (a < b) as i64,
        BinOp::Le => (a <= b) as i64,
        BinOp::Gt => (a > b) as i64,
        BinOp::Ge => (a >= b) as i64,
        BinOp::Min => a.min(b),
        BinOp::Max => a.max(b),
    };
    Ok(r)
}

/// Quotient rounded toward negative infinity.
pub fn floor_div(a: i64, b: i64) -> Result<i64, String> {
    if b == 0 {
        return Err("integer division by zero".to_string());
    }
    let q = a.wrapping_div(b);
    if a.wrapping_rem(b) != 0 && ((a < 0) != (b < 0)) { Ok(q - 1) } else { Ok(q) }
}

/// Remainder whose sign follows the divisor.
pub fn floor_mod(a: i64, b: i64) -> Result<i64, String> {
    if b == 0 {
        return Err("integer modulo by zero".to_string());
    }
    let r = a.wrapping_rem(b);
    if r != 0 && ((r < 0) != (b < 0)) { Ok(r + b) } else { Ok(r) }
}

/// Integer power. Negative exponents truncate `1 / a**-e` toward zero.
pub fn int_pow(base: i64, exp: i64) -> Result<i64, String> {
    if exp < 0 {
        return match base {
            0 => Err("zero cannot be raised to a negative power".to_string()),
            1 => Ok(1),
            -1 => Ok(if exp % 2 == 0 { 1 } else { -1 }),
            _ => Ok(0),
        };
    }
    let mut result: i64 = 1;
    let mut b = base;
    let mut e = exp;
    while e > 0 {
        if e & 1 == 1 {
            result = result.wrapping_mul(b);
        }
        b = b.wrapping_mul(b);
        e >>= 1;
    }
    Ok(result)
}

pub fn eval_unary(op: UnOp, v: Value, dtype: DataType) -> Result<Value, String> {
    let v = v.cast(dtype);
    let r = match (op, v) {
        (UnOp::Not, v) => return Ok(Value::Int(!v.is_truthy() as i64)),
        (UnOp::Neg, Value::Int(i)) => Value::Int(i.wrapping_neg()),
        (UnOp::Neg, Value::Float(f)) => Value::Float(-f),
        (UnOp::BitNot, Value::Int(i)) => Value::Int(!i),
        (UnOp::BitNot, Value::Float(_)) => {
            return Err(format!("operator '~' requires an integer operand, got {}", dtype));
        }
        (UnOp::Abs, Value::Int(i)) => Value::Int(i.wrapping_abs()),
        (UnOp::Abs, Value::Float(f)) => Value::Float(f.abs()),
    };
    Ok(r.cast(dtype))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_semantics_follow_the_divisor() {
        assert_eq!(floor_div(-7, 2), Ok(-4));
        assert_eq!(floor_mod(-7, 2), Ok(1));
        assert_eq!(floor_mod(7, -2), Ok(-1));
        assert!(floor_div(1, 0).is_err());
    }

    #[test]
    fn i32_arithmetic_wraps() {
        let r = eval_binary(BinOp::Mul, Value::Int(1 << 20), Value::Int(1 << 12), DataType::I32);
        assert_eq!(r, Ok(Value::Int(0)));
        let r = eval_binary(BinOp::Shl, Value::Int(37), Value::Int(3), DataType::I32);
        assert_eq!(r, Ok(Value::Int(296)));
    }

    #[test]
    fn int_pow_and_bitnot() {
        assert_eq!(int_pow(37, 3), Ok(50653));
        assert_eq!(int_pow(2, -1), Ok(0));
        assert_eq!(eval_unary(UnOp::BitNot, Value::Int(1234), DataType::I32), Ok(Value::Int(-1235)));
        assert_eq!(eval_unary(UnOp::Not, Value::Int(1234), DataType::I32), Ok(Value::Int(0)));
    }

    #[test]
    fn float_results_round_to_f32() {
        let r = eval_binary(BinOp::Div, Value::Float(37.0), Value::Float(3.0), DataType::F32);
        assert_eq!(r, Ok(Value::Float((37.0f32 / 3.0f32) as f64)));
        assert!(eval_binary(BinOp::BitAnd, Value::Float(1.0), Value::Float(1.0), DataType::F32).is_err());
    }
}
