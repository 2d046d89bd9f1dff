//! Preconditioners applied by the CG kernels.
//!
//! Construction of sophisticated preconditioners is left to the caller; the
//! crate ships the diagonal (Jacobi) scaling.

use crate::core::multivec::MultiVec;
use crate::error::KError;

/// A preconditioner M ≈ A⁻¹ applied to a block of vectors.
pub trait Preconditioner<T>: Send + Sync {
    /// Apply M⁻¹ to r, writing z = M⁻¹ r. `z` has the shape of `r`.
    fn apply(&self, r: &MultiVec<T>, z: &mut MultiVec<T>) -> Result<(), KError>;
}

pub mod jacobi;
pub use jacobi::Jacobi;
