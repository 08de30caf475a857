//! file: core/src/ir/opt/const_fold.rs
//! description: constant folding optimizer pass.
//!
//! Replaces arithmetic whose operands are known constants with `LConst`,
//! and forwards constants stored into locals until the next control-flow
//! boundary. Ops whose folding would fail (division by zero) are kept so
//! the executor reports the error.
//!
use crate::ir::eval::{eval_binary, eval_unary};
use crate::ir::module::KernelIr;
use crate::ir::op::IROp;
use crate::ir::value::Value;
use std::collections::HashMap;

/// Constant-fold simple, localizable IR ops.
pub(crate) fn constant_fold(ir: &mut KernelIr) -> usize {
    let mut const_map: HashMap<usize, Value> = HashMap::new();
    // local_index -> Value, valid until the next label or loop boundary
    let mut local_const_map: HashMap<usize, Value> = HashMap::new();
    let mut rewritten = 0usize;

    for op in ir.ops.iter_mut() {
        let folded = match &*op {
            IROp::LConst { dest, value } => {
                const_map.insert(*dest, *value);
                None
            }
            IROp::SLocal { src, local_index } => {
                match const_map.get(src) {
                    Some(v) => local_const_map.insert(*local_index, *v),
                    None => local_const_map.remove(local_index),
                };
                None
            }
            IROp::LLocal { dest, local_index } => {
                local_const_map.get(local_index).map(|v| IROp::LConst { dest: *dest, value: *v })
            }
            IROp::Binary { op: bin, dest, src1, src2, dtype } => {
                match (const_map.get(src1), const_map.get(src2)) {
                    (Some(a), Some(b)) => eval_binary(*bin, *a, *b, *dtype)
                        .ok()
                        .map(|value| IROp::LConst { dest: *dest, value }),
                    _ => None,
                }
            }
            IROp::Unary { op: un, dest, src, dtype } => const_map
                .get(src)
                .and_then(|v| eval_unary(*un, *v, *dtype).ok())
                .map(|value| IROp::LConst { dest: *dest, value }),
            IROp::Cast { dest, src, to } => {
                const_map.get(src).map(|v| IROp::LConst { dest: *dest, value: v.cast(*to) })
            }
            IROp::Label { .. }
            | IROp::StructFor { .. }
            | IROp::RangeFor { .. }
            | IROp::EndFor
            | IROp::Jump { .. }
            | IROp::BrTrue { .. }
            | IROp::BrFalse { .. } => {
                local_const_map.clear();
                None
            }
            _ => None,
        };

        match folded {
            Some(new_op) => {
                if let IROp::LConst { dest, value } = &new_op {
                    const_map.insert(*dest, *value);
                }
                *op = new_op;
                rewritten += 1;
            }
            None => {
                if let Some(dest) = op.dest() {
                    if !matches!(op, IROp::LConst { .. }) {
                        const_map.remove(&dest);
                    }
                }
            }
        }
    }

    rewritten
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::op::BinOp;
    use crate::ir::value::DataType;

    #[test]
    fn folds_through_locals_until_a_label() {
        let mut ir = KernelIr::new("k");
        ir.emit_op(IROp::LConst { dest: 0, value: Value::Int(37) });
        ir.emit_op(IROp::SLocal { src: 0, local_index: 0 });
        ir.emit_op(IROp::LLocal { dest: 1, local_index: 0 });
        ir.emit_op(IROp::LConst { dest: 2, value: Value::Int(3) });
        ir.emit_op(IROp::Binary { op: BinOp::FloorDiv, dest: 3, src1: 1, src2: 2, dtype: DataType::I32 });
        ir.emit_op(IROp::Label { name: "l".into() });
        ir.emit_op(IROp::LLocal { dest: 4, local_index: 0 });
        constant_fold(&mut ir);
        assert_eq!(ir.ops[4], IROp::LConst { dest: 3, value: Value::Int(12) });
        assert_eq!(ir.ops[6], IROp::LLocal { dest: 4, local_index: 0 });
    }

    #[test]
    fn division_by_zero_is_left_for_runtime() {
        let mut ir = KernelIr::new("k");
        ir.emit_op(IROp::LConst { dest: 0, value: Value::Int(1) });
        ir.emit_op(IROp::LConst { dest: 1, value: Value::Int(0) });
        ir.emit_op(IROp::Binary { op: BinOp::Mod, dest: 2, src1: 0, src2: 1, dtype: DataType::I32 });
        constant_fold(&mut ir);
        assert!(matches!(ir.ops[2], IROp::Binary { .. }));
    }
}
