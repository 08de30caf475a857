//! file: core/src/vm/external.rs
//! description: sparse-matrix triplet builder passed to kernels by handle.
//!
//! Kernels append `(row, col, value)` triplets through `+=` on builder
//! elements; `build` sums duplicates into a `SparseMatrix` the host can
//! query.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::vm::err::RuntimeError;

#[derive(Clone)]
pub struct SparseMatrixBuilder {
    rows: usize,
    cols: usize,
    max_num_triplets: usize,
    triplets: Arc<Mutex<Vec<(usize, usize, f64)>>>,
}

impl SparseMatrixBuilder {
    pub fn new(rows: usize, cols: usize, max_num_triplets: usize) -> Self {
        SparseMatrixBuilder {
            rows,
            cols,
            max_num_triplets,
            triplets: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn add(&self, row: i64, col: i64, value: f64) -> Result<(), RuntimeError> {
        if row < 0 || col < 0 || row as usize >= self.rows || col as usize >= self.cols {
            return Err(RuntimeError::new(
                format!("({}, {}) is outside the {}x{} sparse matrix", row, col, self.rows, self.cols),
                "tilang.vm.external.add",
            ));
        }
        let mut triplets = self.triplets.lock().unwrap_or_else(PoisonError::into_inner);
        if triplets.len() >= self.max_num_triplets {
            return Err(RuntimeError::new(
                format!("sparse matrix builder is full ({} triplets)", self.max_num_triplets),
                "tilang.vm.external.add",
            ));
        }
        triplets.push((row as usize, col as usize, value));
        Ok(())
    }

    pub fn num_triplets(&self) -> usize {
        self.triplets.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn build(&self) -> SparseMatrix {
        let triplets = self.triplets.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = BTreeMap::new();
        for &(r, c, v) in triplets.iter() {
            *entries.entry((r, c)).or_insert(0.0) += v;
        }
        log::debug!("[vm] built {}x{} sparse matrix from {} triplets", self.rows, self.cols, triplets.len());
        SparseMatrix {
            rows: self.rows,
            cols: self.cols,
            entries,
        }
    }
}

impl std::fmt::Debug for SparseMatrixBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SparseMatrixBuilder<{}x{}, max {}>", self.rows, self.cols, self.max_num_triplets)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SparseMatrix {
    rows: usize,
    cols: usize,
    entries: BTreeMap<(usize, usize), f64>,
}

impl SparseMatrix {
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.entries.get(&(row, col)).copied().unwrap_or(0.0)
    }

    pub fn nonzeros(&self) -> usize {
        self.entries.values().filter(|v| **v != 0.0).count()
    }
}

impl std::fmt::Display for SparseMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for r in 0..self.rows {
            let row: Vec<String> = (0..self.cols).map(|c| self.get(r, c).to_string()).collect();
            writeln!(f, "[{}]", row.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_are_summed() {
        let b = SparseMatrixBuilder::new(2, 2, 4);
        b.add(0, 1, 1.5).unwrap();
        b.add(0, 1, 2.0).unwrap();
        let m = b.build();
        assert_eq!(m.get(0, 1), 3.5);
        assert_eq!(m.get(1, 1), 0.0);
        assert_eq!(m.nonzeros(), 1);
    }

    #[test]
    fn capacity_and_bounds_are_enforced() {
        let b = SparseMatrixBuilder::new(2, 2, 1);
        assert!(b.add(2, 0, 1.0).is_err());
        b.add(1, 1, 1.0).unwrap();
        assert!(b.add(0, 0, 1.0).is_err());
    }
}
