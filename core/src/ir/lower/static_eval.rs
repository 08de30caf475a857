//! file: core/src/ir/lower/static_eval.rs
//! description: host semantics for compile-time values.
//!
//! These functions fold operations whose operands are all static. Numbers
//! follow host (Python-like) rules: ints are 64-bit, `/` always yields a
//! float, `//` and `%` floor toward negative infinity. Errors are plain
//! messages; the caller attaches the AST location.

use crate::ast::{BinaryOperator, CompareOperator, UnaryOperator};
use crate::ir::eval::{eval_binary, floor_div, floor_mod, int_pow};
use crate::ir::value::{DataType, Value};

use super::static_value::{StaticMatrix, StaticValue};
use super::to_bin_op;

pub fn truthy(value: &StaticValue) -> bool {
    match value {
        StaticValue::None => false,
        StaticValue::Bool(b) => *b,
        StaticValue::Int(i) => *i != 0,
        StaticValue::Float(f) => *f != 0.0,
        StaticValue::Str(s) => !s.is_empty(),
        StaticValue::Tuple(items) | StaticValue::List(items) => !items.is_empty(),
        StaticValue::Range { .. } | StaticValue::NdRange(_) => len(value).map(|n| n > 0).unwrap_or(false),
        _ => true,
    }
}

fn numeric_binary(op: BinaryOperator, a: &StaticValue, b: &StaticValue) -> Result<StaticValue, String> {
    if let (Some(x), Some(y)) = (a.as_int(), b.as_int()) {
        return match op {
            BinaryOperator::Div => {
                if y == 0 {
                    Err("division by zero".to_string())
                } else {
                    Ok(StaticValue::Float(x as f64 / y as f64))
                }
            }
            BinaryOperator::FloorDiv => floor_div(x, y).map(StaticValue::Int),
            BinaryOperator::Mod => floor_mod(x, y).map(StaticValue::Int),
            BinaryOperator::Pow if y < 0 => Ok(StaticValue::Float((x as f64).powf(y as f64))),
            BinaryOperator::Pow => int_pow(x, y).map(StaticValue::Int),
            _ => {
                let bin = to_bin_op(op).ok_or_else(|| unsupported(op, a, b))?;
                eval_binary(bin, Value::Int(x), Value::Int(y), DataType::I64)
                    .map(|v| StaticValue::Int(v.as_i64()))
            }
        };
    }
    let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) else {
        return Err(unsupported(op, a, b));
    };
    if op.is_bitwise() {
        return Err(format!("operator '{}' requires integer operands", op.symbol()));
    }
    if matches!(op, BinaryOperator::Div | BinaryOperator::FloorDiv | BinaryOperator::Mod) && y == 0.0 {
        return Err("float division by zero".to_string());
    }
    let bin = to_bin_op(op).ok_or_else(|| unsupported(op, a, b))?;
    eval_binary(bin, Value::Float(x), Value::Float(y), DataType::F64).map(|v| StaticValue::Float(v.as_f64()))
}

fn unsupported(op: BinaryOperator, a: &StaticValue, b: &StaticValue) -> String {
    format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op.symbol(),
        a.type_name(),
        b.type_name()
    )
}

pub fn binary(op: BinaryOperator, a: &StaticValue, b: &StaticValue) -> Result<StaticValue, String> {
    match (a, b) {
        (StaticValue::Matrix(m), StaticValue::Matrix(n)) if op == BinaryOperator::MatMul => matmul(m, n),
        (StaticValue::Matrix(m), StaticValue::Matrix(n)) => {
            if (m.rows, m.cols) != (n.rows, n.cols) {
                return Err(format!(
                    "matrix shapes {}x{} and {}x{} do not match for '{}'",
                    m.rows, m.cols, n.rows, n.cols, op.symbol()
                ));
            }
            let entries = m
                .entries
                .iter()
                .zip(&n.entries)
                .map(|(x, y)| numeric_binary(op, x, y))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(StaticValue::Matrix(StaticMatrix { entries, ..m.clone() }))
        }
        (StaticValue::Matrix(m), s) if s.is_numeric() && op != BinaryOperator::MatMul => {
            let entries = m.entries.iter().map(|x| numeric_binary(op, x, s)).collect::<Result<Vec<_>, _>>()?;
            Ok(StaticValue::Matrix(StaticMatrix { entries, ..m.clone() }))
        }
        (s, StaticValue::Matrix(m)) if s.is_numeric() && op != BinaryOperator::MatMul => {
            let entries = m.entries.iter().map(|x| numeric_binary(op, s, x)).collect::<Result<Vec<_>, _>>()?;
            Ok(StaticValue::Matrix(StaticMatrix { entries, ..m.clone() }))
        }
        (StaticValue::Str(x), StaticValue::Str(y)) if op == BinaryOperator::Add => Ok(StaticValue::Str(format!("{}{}", x, y))),
        (StaticValue::Str(x), StaticValue::Int(n)) if op == BinaryOperator::Mul => {
            Ok(StaticValue::Str(x.repeat((*n).max(0) as usize)))
        }
        (StaticValue::Tuple(x), StaticValue::Tuple(y)) if op == BinaryOperator::Add => {
            Ok(StaticValue::Tuple(x.iter().chain(y).cloned().collect()))
        }
        (StaticValue::List(x), StaticValue::List(y)) if op == BinaryOperator::Add => {
            Ok(StaticValue::List(x.iter().chain(y).cloned().collect()))
        }
        _ if a.is_numeric() && b.is_numeric() => numeric_binary(op, a, b),
        _ => Err(unsupported(op, a, b)),
    }
}

fn matmul(m: &StaticMatrix, n: &StaticMatrix) -> Result<StaticValue, String> {
    if m.cols != n.rows {
        return Err(format!("cannot multiply a {}x{} matrix by a {}x{} matrix", m.rows, m.cols, n.rows, n.cols));
    }
    let mut entries = Vec::with_capacity(m.rows * n.cols);
    for r in 0..m.rows {
        for c in 0..n.cols {
            let mut acc = StaticValue::Int(0);
            for k in 0..m.cols {
                let prod = numeric_binary(BinaryOperator::Mul, &m.entries[r * m.cols + k], &n.entries[k * n.cols + c])?;
                acc = numeric_binary(BinaryOperator::Add, &acc, &prod)?;
            }
            entries.push(acc);
        }
    }
    Ok(StaticValue::Matrix(StaticMatrix {
        rows: m.rows,
        cols: n.cols,
        entries,
        is_vector: n.is_vector,
    }))
}

pub fn unary(op: UnaryOperator, value: &StaticValue) -> Result<StaticValue, String> {
    match (op, value) {
        (UnaryOperator::Not, v) => Ok(StaticValue::Bool(!truthy(v))),
        (UnaryOperator::Plus, v) if v.is_numeric() => Ok(match v {
            StaticValue::Bool(b) => StaticValue::Int(*b as i64),
            other => other.clone(),
        }),
        (UnaryOperator::Minus, StaticValue::Float(f)) => Ok(StaticValue::Float(-f)),
        (UnaryOperator::Minus, v) if v.as_int().is_some() => Ok(StaticValue::Int(v.as_int().unwrap_or(0).wrapping_neg())),
        (UnaryOperator::Invert, v) if v.as_int().is_some() && !matches!(v, StaticValue::Float(_)) => {
            Ok(StaticValue::Int(!v.as_int().unwrap_or(0)))
        }
        (UnaryOperator::Minus | UnaryOperator::Plus, StaticValue::Matrix(m)) => {
            let entries = m.entries.iter().map(|e| unary(op, e)).collect::<Result<Vec<_>, _>>()?;
            Ok(StaticValue::Matrix(StaticMatrix { entries, ..m.clone() }))
        }
        (_, v) => Err(format!("bad operand type for unary operator: '{}'", v.type_name())),
    }
}

pub fn compare(op: CompareOperator, a: &StaticValue, b: &StaticValue) -> Result<bool, String> {
    if a.is_numeric() && b.is_numeric() {
        let ordering = match (a, b) {
            (StaticValue::Float(_), _) | (_, StaticValue::Float(_)) => {
                let (x, y) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
                x.partial_cmp(&y)
            }
            _ => Some(a.as_int().unwrap_or(0).cmp(&b.as_int().unwrap_or(0))),
        };
        return Ok(match (op, ordering) {
            (CompareOperator::Eq, o) => o == Some(std::cmp::Ordering::Equal),
            (CompareOperator::NotEq, o) => o != Some(std::cmp::Ordering::Equal),
            (_, None) => false,
            (CompareOperator::Lt, Some(o)) => o.is_lt(),
            (CompareOperator::LtE, Some(o)) => o.is_le(),
            (CompareOperator::Gt, Some(o)) => o.is_gt(),
            (CompareOperator::GtE, Some(o)) => o.is_ge(),
            (other, _) => return Err(format!("operator '{}' cannot be evaluated", other.symbol())),
        });
    }
    match (op, a, b) {
        (CompareOperator::Eq, _, _) => Ok(a == b),
        (CompareOperator::NotEq, _, _) => Ok(a != b),
        (_, StaticValue::Str(x), StaticValue::Str(y)) => Ok(match op {
            CompareOperator::Lt => x < y,
            CompareOperator::LtE => x <= y,
            CompareOperator::Gt => x > y,
            _ => x >= y,
        }),
        _ => Err(format!(
            "'{}' not supported between '{}' and '{}'",
            op.symbol(),
            a.type_name(),
            b.type_name()
        )),
    }
}

fn normalize_index(i: i64, len: usize) -> Option<usize> {
    let idx = if i < 0 { i + len as i64 } else { i };
    if idx >= 0 && (idx as usize) < len { Some(idx as usize) } else { None }
}

/// `value[indices...]` on a static container.
pub fn index(value: &StaticValue, indices: &[StaticValue]) -> Result<StaticValue, String> {
    let ints: Vec<i64> = indices
        .iter()
        .map(|i| i.as_int().ok_or_else(|| format!("indices must be integers, not '{}'", i.type_name())))
        .collect::<Result<_, _>>()?;
    let out_of_range = || format!("index {:?} out of range for {}", ints, value.type_name());
    match (value, ints.as_slice()) {
        (StaticValue::Tuple(items) | StaticValue::List(items), [i]) => {
            normalize_index(*i, items.len()).map(|k| items[k].clone()).ok_or_else(out_of_range)
        }
        (StaticValue::Tuple(_) | StaticValue::List(_), [first, rest @ ..]) => {
            let inner = index(value, &[StaticValue::Int(*first)])?;
            let rest: Vec<StaticValue> = rest.iter().map(|i| StaticValue::Int(*i)).collect();
            index(&inner, &rest)
        }
        (StaticValue::Matrix(m), [i]) if m.cols == 1 => {
            normalize_index(*i, m.rows).map(|k| m.entries[k].clone()).ok_or_else(out_of_range)
        }
        (StaticValue::Matrix(m), [i, j]) => {
            let (Some(r), Some(c)) = (normalize_index(*i, m.rows), normalize_index(*j, m.cols)) else {
                return Err(out_of_range());
            };
            Ok(m.entries[r * m.cols + c].clone())
        }
        (StaticValue::Str(s), [i]) => {
            let chars: Vec<char> = s.chars().collect();
            normalize_index(*i, chars.len()).map(|k| StaticValue::Str(chars[k].to_string())).ok_or_else(out_of_range)
        }
        (StaticValue::Range { .. }, [i]) => {
            let items = iterate(value)?;
            normalize_index(*i, items.len()).map(|k| items[k].clone()).ok_or_else(out_of_range)
        }
        _ => Err(format!("'{}' object cannot be indexed with {} index(es)", value.type_name(), ints.len())),
    }
}

/// Items produced by iterating a static value, as a static `for` unrolls them.
pub fn iterate(value: &StaticValue) -> Result<Vec<StaticValue>, String> {
    match value {
        StaticValue::Range { start, stop, step } => {
            if *step == 0 {
                return Err("range() arg 3 must not be zero".to_string());
            }
            let mut items = Vec::new();
            let mut i = *start;
            while (*step > 0 && i < *stop) || (*step < 0 && i > *stop) {
                items.push(StaticValue::Int(i));
                match i.checked_add(*step) {
                    Some(next) => i = next,
                    None => break,
                }
            }
            Ok(items)
        }
        StaticValue::NdRange(bounds) => {
            let mut items = vec![Vec::new()];
            for (begin, end) in bounds {
                let mut next = Vec::new();
                for prefix in &items {
                    for i in *begin..*end {
                        let mut tuple = prefix.clone();
                        tuple.push(StaticValue::Int(i));
                        next.push(tuple);
                    }
                }
                items = next;
            }
            Ok(items.into_iter().map(StaticValue::Tuple).collect())
        }
        StaticValue::Tuple(items) | StaticValue::List(items) => Ok(items.clone()),
        StaticValue::Matrix(m) if m.cols == 1 => Ok(m.entries.clone()),
        other => Err(format!("'{}' object is not iterable", other.type_name())),
    }
}

pub fn len(value: &StaticValue) -> Result<i64, String> {
    match value {
        StaticValue::Tuple(items) | StaticValue::List(items) => Ok(items.len() as i64),
        StaticValue::Str(s) => Ok(s.chars().count() as i64),
        StaticValue::Matrix(m) => Ok(m.rows as i64),
        StaticValue::Field(f) => Ok(f.shape().first().copied().unwrap_or(0) as i64),
        StaticValue::Range { start, stop, step } => range_len(*start, *stop, *step),
        StaticValue::NdRange(bounds) => bounds.iter().try_fold(1i64, |acc, (begin, end)| {
            let n = range_len(*begin, *end, 1)?;
            acc.checked_mul(n).ok_or_else(|| "ndrange() is too large".to_string())
        }),
        other => Err(format!("object of type '{}' has no len()", other.type_name())),
    }
}

/// Number of items in `range(start, stop, step)` without materializing it.
fn range_len(start: i64, stop: i64, step: i64) -> Result<i64, String> {
    if step == 0 {
        return Err("range() arg 3 must not be zero".to_string());
    }
    let (start, stop, step) = (start as i128, stop as i128, step as i128);
    let sign = step.signum();
    let n = ((stop - start + step - sign) / step).max(0);
    i64::try_from(n).map_err(|_| "range() is too large".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(i: i64) -> StaticValue {
        StaticValue::Int(i)
    }

    #[test]
    fn range_length_is_computed_without_iterating() {
        let huge = StaticValue::Range { start: 0, stop: 3_000_000_000, step: 1 };
        assert_eq!(len(&huge), Ok(3_000_000_000));
        assert!(truthy(&huge));
        assert_eq!(len(&StaticValue::Range { start: 10, stop: 0, step: -3 }), Ok(4));
        assert_eq!(len(&StaticValue::Range { start: 5, stop: 5, step: 1 }), Ok(0));
        assert!(!truthy(&StaticValue::Range { start: 3, stop: 0, step: 1 }));
        assert_eq!(len(&StaticValue::NdRange(vec![(0, 3), (1, 4)])), Ok(9));
    }

    #[test]
    fn iterating_up_to_the_integer_limit_stops_cleanly() {
        let tail = StaticValue::Range { start: i64::MAX - 2, stop: i64::MAX, step: 3 };
        assert_eq!(iterate(&tail), Ok(vec![int(i64::MAX - 2)]));
    }

    #[test]
    fn host_division_rules() {
        assert_eq!(binary(BinaryOperator::Div, &int(7), &int(2)), Ok(StaticValue::Float(3.5)));
        assert_eq!(binary(BinaryOperator::FloorDiv, &int(-7), &int(2)), Ok(int(-4)));
        assert_eq!(binary(BinaryOperator::Mod, &int(-7), &int(2)), Ok(int(1)));
        assert_eq!(binary(BinaryOperator::Pow, &int(2), &int(-1)), Ok(StaticValue::Float(0.5)));
        assert!(binary(BinaryOperator::Div, &int(1), &int(0)).is_err());
    }

    #[test]
    fn chained_ranges_and_ndranges_unroll() {
        let r = iterate(&StaticValue::Range { start: 0, stop: 3, step: 1 }).unwrap();
        assert_eq!(r, vec![int(0), int(1), int(2)]);
        let nd = iterate(&StaticValue::NdRange(vec![(0, 2), (0, 2)])).unwrap();
        assert_eq!(nd.len(), 4);
        assert_eq!(nd[1], StaticValue::Tuple(vec![int(0), int(1)]));
    }

    #[test]
    fn comparisons_and_truthiness() {
        assert_eq!(compare(CompareOperator::Lt, &int(1), &StaticValue::Float(1.5)), Ok(true));
        assert_eq!(compare(CompareOperator::Eq, &StaticValue::Str("a".into()), &StaticValue::Str("a".into())), Ok(true));
        assert!(!truthy(&StaticValue::List(vec![])));
        assert!(truthy(&int(2)));
    }

    #[test]
    fn static_matrix_product() {
        let m = StaticValue::Matrix(StaticMatrix {
            rows: 2,
            cols: 2,
            entries: vec![int(1), int(1), int(1), int(0)],
            is_vector: false,
        });
        let sq = binary(BinaryOperator::MatMul, &m, &m).unwrap();
        assert_eq!(index(&sq, &[int(0), int(0)]), Ok(int(2)));
        assert_eq!(index(&sq, &[int(1), int(0)]), Ok(int(1)));
    }
}
