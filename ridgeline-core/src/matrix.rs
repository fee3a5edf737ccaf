//! # Row-Major Matrix
//!
//! Dense storage for the feature matrix: every row has the same length and
//! rows are contiguous, so a row is a plain slice.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Dense row-major matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix<T> {
    data: Vec<T>,
    rows: usize,
    dim: usize,
}

impl<T: Copy> Matrix<T> {
    /// Wrap a flat buffer of `rows * dim` values
    pub fn from_flat(data: Vec<T>, rows: usize, dim: usize) -> Result<Self> {
        if rows.checked_mul(dim) != Some(data.len()) {
            return Err(Error::MalformedDataset {
                message: format!(
                    "buffer of {} values does not hold {} rows of dimension {}",
                    data.len(),
                    rows,
                    dim
                ),
            });
        }
        Ok(Self { data, rows, dim })
    }

    /// Build from individual rows; every row must share the first row's length
    pub fn from_rows(rows: &[Vec<T>]) -> Result<Self> {
        let dim = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * dim);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != dim {
                return Err(Error::MalformedDataset {
                    message: format!("row {} has dimension {}, expected {}", i, row.len(), dim),
                });
            }
            data.extend_from_slice(row);
        }
        Ok(Self { data, rows: rows.len(), dim })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Row `i`; panics when out of range like slice indexing
    #[inline]
    pub fn row(&self, i: usize) -> &[T] {
        let start = i * self.dim;
        &self.data[start..start + self.dim]
    }

    pub fn get_row(&self, i: usize) -> Option<&[T]> {
        (i < self.rows).then(|| self.row(i))
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[T]> + '_ {
        (0..self.rows).map(move |i| self.row(i))
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_flat(self) -> Vec<T> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_are_slices() {
        let m = Matrix::from_flat(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 3, 2).unwrap();
        assert_eq!(m.row(1), &[3.0, 4.0]);
        assert_eq!(m.iter_rows().count(), 3);
        assert!(m.get_row(3).is_none());
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let err = Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert!(matches!(err, Error::MalformedDataset { .. }));
    }

    #[test]
    fn test_bad_flat_length_rejected() {
        assert!(Matrix::from_flat(vec![1.0f32; 5], 2, 3).is_err());
    }
}
