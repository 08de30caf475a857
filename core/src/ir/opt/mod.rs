//! IR optimizer: constant folding over straight-line regions.
use crate::ir::module::KernelIr;

mod const_fold;

pub(crate) use const_fold::constant_fold;

/// Run optimization passes on the lowered IR in-place.
pub fn optimize(ir: &mut KernelIr) {
    let folded = constant_fold(ir);
    log::debug!("[opt] {}: constant_fold rewrote {} of {} ops", ir.name, folded, ir.len());
}
