//! Core linear-algebra traits for blockcg.

use crate::core::multivec::MultiVec;
use crate::error::KError;

/// Linear operator applied to a block of vectors: Y ← A X.
pub trait Operator<T>: Send + Sync {
    /// Number of rows of `A`.
    fn nrows(&self) -> usize;
    /// Number of columns of `A`.
    fn ncols(&self) -> usize;
    /// Compute `y = A · x` column by column. `y` has the shape of `x`.
    fn apply(&self, x: &MultiVec<T>, y: &mut MultiVec<T>) -> Result<(), KError>;
}

/// Single-vector product: y ← A x.
pub trait MatVec<T> {
    fn matvec(&self, x: &[T], y: &mut [T]);
}
