//! Operator implementations for faer dense matrices.
//!
//! Any type implementing [`MatVec`] is lifted to a block [`Operator`] through
//! [`MatVecOperator`]; `faer::Mat` implements both directly. The column loop
//! of a block product runs in parallel under the `rayon` feature.
//!
//! # References
//! - [faer crate documentation](https://docs.rs/faer)

use crate::core::multivec::MultiVec;
use crate::core::scalar::Scalar;
use crate::core::traits::{MatVec, Operator};
use crate::error::KError;
use faer::Mat;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Computes `y = A * x` for a dense matrix.
impl<T: Scalar> MatVec<T> for Mat<T> {
    fn matvec(&self, x: &[T], y: &mut [T]) {
        assert_eq!(self.nrows(), y.len(), "Output vector y has incorrect length");
        assert_eq!(self.ncols(), x.len(), "Input vector x has incorrect length");
        for yi in y.iter_mut() {
            *yi = T::zero();
        }
        // Column-oriented sweep matches faer's column-major storage.
        for j in 0..self.ncols() {
            let xj = x[j];
            for i in 0..self.nrows() {
                y[i] = y[i] + self[(i, j)] * xj;
            }
        }
    }
}

impl<T: Scalar> Operator<T> for Mat<T> {
    fn nrows(&self) -> usize {
        Mat::nrows(self)
    }
    fn ncols(&self) -> usize {
        Mat::ncols(self)
    }
    fn apply(&self, x: &MultiVec<T>, y: &mut MultiVec<T>) -> Result<(), KError> {
        apply_columns(self, Mat::nrows(self), Mat::ncols(self), x, y)
    }
}

/// Adapts any single-vector [`MatVec`] to a block [`Operator`].
pub struct MatVecOperator<M> {
    inner: M,
    nrows: usize,
    ncols: usize,
}

impl<M> MatVecOperator<M> {
    pub fn new(inner: M, nrows: usize, ncols: usize) -> Self {
        Self { inner, nrows, ncols }
    }

    pub fn inner(&self) -> &M {
        &self.inner
    }
}

impl<T: Scalar, M: MatVec<T> + Send + Sync> Operator<T> for MatVecOperator<M> {
    fn nrows(&self) -> usize {
        self.nrows
    }
    fn ncols(&self) -> usize {
        self.ncols
    }
    fn apply(&self, x: &MultiVec<T>, y: &mut MultiVec<T>) -> Result<(), KError> {
        apply_columns(&self.inner, self.nrows, self.ncols, x, y)
    }
}

fn apply_columns<T: Scalar, M: MatVec<T> + Sync + ?Sized>(
    a: &M,
    nrows: usize,
    ncols: usize,
    x: &MultiVec<T>,
    y: &mut MultiVec<T>,
) -> Result<(), KError> {
    if x.nrows() != ncols {
        return Err(KError::DimensionMismatch { expected: ncols, found: x.nrows() });
    }
    if y.nrows() != nrows || y.ncols() != x.ncols() {
        *y = MultiVec::zeros(nrows, x.ncols());
    }
    if nrows == 0 {
        return Ok(());
    }
    #[cfg(feature = "rayon")]
    y.as_mut_slice()
        .par_chunks_mut(nrows)
        .enumerate()
        .for_each(|(j, yj)| a.matvec(x.col(j), yj));
    #[cfg(not(feature = "rayon"))]
    y.as_mut_slice()
        .chunks_mut(nrows)
        .enumerate()
        .for_each(|(j, yj)| a.matvec(x.col(j), yj));
    Ok(())
}
