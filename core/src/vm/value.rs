use crate::ir::module::ArgSlot;
use crate::ir::value::Value;
use crate::vm::external::SparseMatrixBuilder;
use crate::vm::field::NdArray;

/// A runtime argument of a compiled kernel, matching one `ArgSlot`.
#[derive(Debug, Clone)]
pub enum RuntimeArg {
    Scalar(Value),
    NdArray(NdArray),
    SparseBuilder(SparseMatrixBuilder),
}

impl RuntimeArg {
    pub(crate) fn matches(&self, slot: &ArgSlot) -> bool {
        match (self, slot) {
            (RuntimeArg::Scalar(_), ArgSlot::Scalar(_)) => true,
            (RuntimeArg::NdArray(a), ArgSlot::NdArray { dtype, ndim, element_shape, layout }) => {
                a.dtype() == *dtype
                    && a.ndim() == *ndim
                    && a.element_shape() == element_shape.as_slice()
                    && a.layout() == *layout
            }
            (RuntimeArg::SparseBuilder(_), ArgSlot::SparseBuilder) => true,
            _ => false,
        }
    }
}
