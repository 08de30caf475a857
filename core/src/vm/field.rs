//! file: core/src/vm/field.rs
//! description: host storage for fields and external arrays.
//!
//! Both containers keep their elements behind `Arc<RwLock<..>>`, so a
//! handle can be cloned into compiled kernels, bound as a global and read
//! back by the host while staying `Send + Sync`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::ir::value::{DataType, Value};
use crate::vm::err::RuntimeError;

static NEXT_FIELD_ID: AtomicUsize = AtomicUsize::new(1);

/// Element ordering of matrix-valued external arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Layout {
    /// Entries of one element are contiguous.
    AOS,
    /// Each entry position forms its own contiguous plane.
    SOA,
}

/// Row-major offset of `indices` within `shape`, or `None` when out of bounds.
pub(crate) fn linear_index(shape: &[usize], indices: &[i64]) -> Option<usize> {
    if shape.len() != indices.len() {
        return None;
    }
    let mut offset = 0usize;
    for (&extent, &i) in shape.iter().zip(indices) {
        if i < 0 || i as usize >= extent {
            return None;
        }
        offset = offset * extent + i as usize;
    }
    Some(offset)
}

/// Visits every index tuple of `shape` in row-major order.
pub(crate) fn for_each_index<F>(shape: &[usize], mut visit: F) -> Result<(), RuntimeError>
where
    F: FnMut(&[i64]) -> Result<bool, RuntimeError>,
{
    if shape.iter().any(|&e| e == 0) {
        return Ok(());
    }
    let mut index = vec![0i64; shape.len()];
    loop {
        if !visit(&index)? {
            return Ok(());
        }
        let mut dim = shape.len();
        loop {
            if dim == 0 {
                return Ok(());
            }
            dim -= 1;
            index[dim] += 1;
            if (index[dim] as usize) < shape[dim] {
                break;
            }
            index[dim] = 0;
        }
    }
}

fn out_of_bounds(what: &str, indices: &[i64], shape: &[usize]) -> RuntimeError {
    RuntimeError::new(
        format!("index {:?} is out of bounds for {} of shape {:?}", indices, what, shape),
        "tilang.vm.field",
    )
}

/// A dense global array of scalars.
#[derive(Clone)]
pub struct Field {
    id: usize,
    dtype: DataType,
    shape: Vec<usize>,
    data: Arc<RwLock<Vec<Value>>>,
}

impl Field {
    pub fn new(dtype: DataType, shape: &[usize]) -> Self {
        let len = shape.iter().product();
        Field {
            id: NEXT_FIELD_ID.fetch_add(1, Ordering::Relaxed),
            dtype,
            shape: shape.to_vec(),
            data: Arc::new(RwLock::new(vec![Value::zero(dtype); len])),
        }
    }

    /// Identity shared by every clone of this handle.
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, indices: &[i64]) -> Result<Value, RuntimeError> {
        let offset = linear_index(&self.shape, indices).ok_or_else(|| out_of_bounds("field", indices, &self.shape))?;
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        Ok(data[offset])
    }

    /// Stores `value` cast to the field's element type.
    pub fn set(&self, indices: &[i64], value: Value) -> Result<(), RuntimeError> {
        let offset = linear_index(&self.shape, indices).ok_or_else(|| out_of_bounds("field", indices, &self.shape))?;
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        data[offset] = value.cast(self.dtype);
        Ok(())
    }

    pub fn fill(&self, value: Value) {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        let value = value.cast(self.dtype);
        data.iter_mut().for_each(|v| *v = value);
    }

    /// Snapshot of all elements in row-major order.
    pub fn to_vec(&self) -> Vec<Value> {
        self.data.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl std::fmt::Debug for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Field#{}<{}, {:?}>", self.id, self.dtype, self.shape)
    }
}

impl PartialEq for Field {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// An external array passed to kernels by handle. Elements are scalars
/// (`element_shape` empty), vectors (`[n]`) or matrices (`[n, m]`).
#[derive(Clone)]
pub struct NdArray {
    dtype: DataType,
    shape: Vec<usize>,
    element_shape: Vec<usize>,
    layout: Layout,
    data: Arc<RwLock<Vec<Value>>>,
}

impl NdArray {
    pub fn new(dtype: DataType, shape: &[usize], element_shape: &[usize], layout: Layout) -> Self {
        let len = shape.iter().product::<usize>() * element_shape.iter().product::<usize>();
        NdArray {
            dtype,
            shape: shape.to_vec(),
            element_shape: element_shape.to_vec(),
            layout,
            data: Arc::new(RwLock::new(vec![Value::zero(dtype); len])),
        }
    }

    pub fn scalar(dtype: DataType, shape: &[usize]) -> Self {
        Self::new(dtype, shape, &[], Layout::AOS)
    }

    pub fn matrix(rows: usize, cols: usize, dtype: DataType, shape: &[usize], layout: Layout) -> Self {
        Self::new(dtype, shape, &[rows, cols], layout)
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn element_shape(&self) -> &[usize] {
        &self.element_shape
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn element_dim(&self) -> usize {
        self.element_shape.len()
    }

    /// Number of scalar entries per element.
    pub fn element_size(&self) -> usize {
        self.element_shape.iter().product()
    }

    /// Storage offset of entry `element` of the element at `indices`.
    pub fn offset(&self, indices: &[i64], element: usize) -> Result<usize, RuntimeError> {
        let lin = linear_index(&self.shape, indices).ok_or_else(|| out_of_bounds("ndarray", indices, &self.shape))?;
        let size = self.element_size();
        if element >= size {
            return Err(RuntimeError::new(
                format!("element entry {} is out of bounds for element shape {:?}", element, self.element_shape),
                "tilang.vm.field",
            ));
        }
        Ok(match self.layout {
            Layout::AOS => lin * size + element,
            Layout::SOA => element * self.shape.iter().product::<usize>() + lin,
        })
    }

    pub fn get(&self, indices: &[i64], element: usize) -> Result<Value, RuntimeError> {
        let offset = self.offset(indices, element)?;
        Ok(self.data.read().unwrap_or_else(PoisonError::into_inner)[offset])
    }

    pub fn set(&self, indices: &[i64], element: usize, value: Value) -> Result<(), RuntimeError> {
        let offset = self.offset(indices, element)?;
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        data[offset] = value.cast(self.dtype);
        Ok(())
    }

    /// Raw storage in layout order.
    pub fn to_vec(&self) -> Vec<Value> {
        self.data.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl std::fmt::Debug for NdArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "NdArray<{}, {:?}, element {:?}, {:?}>",
            self.dtype, self.shape, self.element_shape, self.layout
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_handles_share_storage() {
        let a = Field::new(DataType::I32, &[4]);
        let b = a.clone();
        b.set(&[2], Value::Float(3.7)).unwrap();
        assert_eq!(a.get(&[2]).unwrap(), Value::Int(3));
        assert_eq!(a, b);
        assert!(a.get(&[4]).is_err());
    }

    #[test]
    fn soa_and_aos_offsets_differ() {
        let aos = NdArray::matrix(2, 1, DataType::F32, &[3], Layout::AOS);
        let soa = NdArray::matrix(2, 1, DataType::F32, &[3], Layout::SOA);
        assert_eq!(aos.offset(&[1], 1).unwrap(), 3);
        assert_eq!(soa.offset(&[1], 1).unwrap(), 4);
    }

    #[test]
    fn index_walk_is_row_major() {
        let mut seen = Vec::new();
        for_each_index(&[2, 2], |i| {
            seen.push(i.to_vec());
            Ok(true)
        })
        .unwrap();
        assert_eq!(seen, vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]]);
    }
}
