// Compressed sparse row operator

use crate::core::multivec::MultiVec;
use crate::core::scalar::Scalar;
use crate::core::traits::{MatVec, Operator};
use crate::error::KError;
use faer::Mat;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Read-only CSR matrix.
#[derive(Debug, Clone)]
pub struct CsrMatrix<T> {
    nrows: usize,
    ncols: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<T>,
}

impl<T: Scalar> CsrMatrix<T> {
    /// Build a CSR from raw row-ptr, col-idx, and values.
    pub fn from_csr(
        nrows: usize,
        ncols: usize,
        row_ptr: Vec<usize>,
        col_idx: Vec<usize>,
        values: Vec<T>,
    ) -> Result<Self, KError> {
        if row_ptr.len() != nrows + 1 {
            return Err(KError::DimensionMismatch { expected: nrows + 1, found: row_ptr.len() });
        }
        if col_idx.len() != values.len() {
            return Err(KError::DimensionMismatch { expected: col_idx.len(), found: values.len() });
        }
        let nnz = row_ptr[nrows];
        if nnz != values.len() || row_ptr.windows(2).any(|w| w[0] > w[1]) {
            return Err(KError::DimensionMismatch { expected: nnz, found: values.len() });
        }
        if let Some(&bad) = col_idx.iter().find(|&&c| c >= ncols) {
            return Err(KError::DimensionMismatch { expected: ncols, found: bad + 1 });
        }
        Ok(Self { nrows, ncols, row_ptr, col_idx, values })
    }

    /// Keep the non-zeros of a dense matrix.
    pub fn from_dense(a: &Mat<T>) -> Self {
        let mut row_ptr = Vec::with_capacity(a.nrows() + 1);
        let mut col_idx = Vec::new();
        let mut values = Vec::new();
        row_ptr.push(0);
        for i in 0..a.nrows() {
            for j in 0..a.ncols() {
                let v = a[(i, j)];
                if v != T::zero() {
                    col_idx.push(j);
                    values.push(v);
                }
            }
            row_ptr.push(col_idx.len());
        }
        Self { nrows: a.nrows(), ncols: a.ncols(), row_ptr, col_idx, values }
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Diagonal entries; missing ones are zero.
    pub fn diagonal(&self) -> Vec<T> {
        (0..self.nrows.min(self.ncols))
            .map(|i| {
                let (start, end) = (self.row_ptr[i], self.row_ptr[i + 1]);
                self.col_idx[start..end]
                    .iter()
                    .position(|&c| c == i)
                    .map_or(T::zero(), |k| self.values[start + k])
            })
            .collect()
    }

    fn row_dot(&self, i: usize, x: &[T]) -> T {
        let (start, end) = (self.row_ptr[i], self.row_ptr[i + 1]);
        self.col_idx[start..end]
            .iter()
            .zip(&self.values[start..end])
            .fold(T::zero(), |acc, (&c, &v)| acc + v * x[c])
    }
}

impl<T: Scalar> MatVec<T> for CsrMatrix<T> {
    fn matvec(&self, x: &[T], y: &mut [T]) {
        assert_eq!(x.len(), self.ncols);
        assert_eq!(y.len(), self.nrows);
        #[cfg(feature = "rayon")]
        y.par_iter_mut().enumerate().for_each(|(i, yi)| *yi = self.row_dot(i, x));
        #[cfg(not(feature = "rayon"))]
        y.iter_mut().enumerate().for_each(|(i, yi)| *yi = self.row_dot(i, x));
    }
}

impl<T: Scalar> Operator<T> for CsrMatrix<T> {
    fn nrows(&self) -> usize {
        self.nrows
    }
    fn ncols(&self) -> usize {
        self.ncols
    }
    fn apply(&self, x: &MultiVec<T>, y: &mut MultiVec<T>) -> Result<(), KError> {
        if x.nrows() != self.ncols {
            return Err(KError::DimensionMismatch { expected: self.ncols, found: x.nrows() });
        }
        if y.nrows() != self.nrows || y.ncols() != x.ncols() {
            *y = MultiVec::zeros(self.nrows, x.ncols());
        }
        for j in 0..x.ncols() {
            self.matvec(x.col(j), y.col_mut(j));
        }
        Ok(())
    }
}

/// Symmetric positive definite 1-D Laplacian `tridiag(-1, 2, -1)` of size `n`.
pub fn laplacian_1d<T: Scalar>(n: usize) -> CsrMatrix<T> {
    let two = T::one() + T::one();
    let mut row_ptr = Vec::with_capacity(n + 1);
    let mut col_idx = Vec::with_capacity(3 * n);
    let mut values = Vec::with_capacity(3 * n);
    row_ptr.push(0);
    for i in 0..n {
        if i > 0 {
            col_idx.push(i - 1);
            values.push(-T::one());
        }
        col_idx.push(i);
        values.push(two);
        if i + 1 < n {
            col_idx.push(i + 1);
            values.push(-T::one());
        }
        row_ptr.push(col_idx.len());
    }
    CsrMatrix { nrows: n, ncols: n, row_ptr, col_idx, values }
}
