//! Shared helpers for integration tests: in-memory storage and seeded
//! corpus builders.
#![allow(dead_code)]

use std::sync::Arc;

use object_store::memory::InMemory;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use cumulus::matrix::ColMajorMatrix;
use cumulus::storage::ArrayStore;

/// A fresh in-memory object store.
pub fn memory_store() -> ArrayStore {
    ArrayStore::new(Arc::new(InMemory::new()))
}

/// Build a column-major matrix from explicit columns.
pub fn matrix_from_cols(cols: &[&[f32]]) -> ColMajorMatrix<f32> {
    let rows = cols[0].len();
    let mut m = ColMajorMatrix::new(rows, cols.len());
    for (j, col) in cols.iter().enumerate() {
        m.col_mut(j).copy_from_slice(col);
    }
    m
}

/// A reproducible random matrix with entries in `[-1, 1)`.
pub fn random_matrix(rows: usize, cols: usize, seed: u64) -> ColMajorMatrix<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut m = ColMajorMatrix::new(rows, cols);
    for v in m.data_mut() {
        *v = rng.gen_range(-1.0..1.0);
    }
    m
}
