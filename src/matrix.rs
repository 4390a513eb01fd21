//! Dense column-major matrix storage.
//!
//! Feature vectors are columns: a `(D, N)` matrix holds `N` vectors of
//! dimension `D`, each contiguous in memory. Column access returns plain
//! slices, which is what the scoring kernels iterate over.

use crate::error::{CumulusError, Result};

/// An owned dense matrix with column-major cell order.
#[derive(Debug, Clone, PartialEq)]
pub struct ColMajorMatrix<T> {
    data: Vec<T>,
    num_rows: usize,
    num_cols: usize,
}

impl<T: Copy + Default> ColMajorMatrix<T> {
    /// Allocate a zero-initialized matrix of the given shape.
    pub fn new(num_rows: usize, num_cols: usize) -> Self {
        Self {
            data: vec![T::default(); num_rows * num_cols],
            num_rows,
            num_cols,
        }
    }

    /// Wrap an existing column-major buffer. The buffer length must equal
    /// `num_rows * num_cols`.
    pub fn from_data(data: Vec<T>, num_rows: usize, num_cols: usize) -> Result<Self> {
        if data.len() != num_rows * num_cols {
            return Err(CumulusError::ShapeMismatch {
                expected: num_rows * num_cols,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            num_rows,
            num_cols,
        })
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_cols(&self) -> usize {
        self.num_cols
    }

    /// Column `j` as a slice of length `num_rows`.
    pub fn col(&self, j: usize) -> &[T] {
        &self.data[j * self.num_rows..(j + 1) * self.num_rows]
    }

    /// Mutable column `j`.
    pub fn col_mut(&mut self, j: usize) -> &mut [T] {
        &mut self.data[j * self.num_rows..(j + 1) * self.num_rows]
    }

    /// Iterate over columns in order.
    pub fn columns(&self) -> impl Iterator<Item = &[T]> {
        self.data.chunks_exact(self.num_rows.max(1))
    }

    /// The underlying buffer in column-major order.
    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_zeroed() {
        let m = ColMajorMatrix::<f32>::new(3, 2);
        assert_eq!(m.num_rows(), 3);
        assert_eq!(m.num_cols(), 2);
        assert!(m.data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_column_access_is_column_major() {
        let m = ColMajorMatrix::from_data(vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], 3, 2).unwrap();
        assert_eq!(m.col(0), &[1.0, 2.0, 3.0]);
        assert_eq!(m.col(1), &[4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_col_mut_writes_through() {
        let mut m = ColMajorMatrix::<u64>::new(2, 2);
        m.col_mut(1).copy_from_slice(&[7, 8]);
        assert_eq!(m.data(), &[0, 0, 7, 8]);
    }

    #[test]
    fn test_columns_iterator() {
        let m = ColMajorMatrix::from_data(vec![1u8, 2, 3, 4], 2, 2).unwrap();
        let cols: Vec<&[u8]> = m.columns().collect();
        assert_eq!(cols, vec![&[1u8, 2][..], &[3u8, 4][..]]);
    }

    #[test]
    fn test_from_data_rejects_wrong_length() {
        let result = ColMajorMatrix::from_data(vec![0.0f32; 5], 2, 3);
        assert!(matches!(
            result,
            Err(CumulusError::ShapeMismatch {
                expected: 6,
                actual: 5
            })
        ));
    }
}
