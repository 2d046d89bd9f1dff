//! Classical Gram-Schmidt with the Daniel–Gragg–Kaufman–Stewart criterion:
//! a second sweep runs only when the first one removed enough of the column
//! that cancellation is suspected.

use super::{MatOrthoManager, accumulate, classical_pass, norm2};
use crate::config::OrthoType;
use crate::core::scalar::Scalar;
use crate::parallel::Comm;

#[derive(Debug, Clone)]
pub struct DgksOrtho<T> {
    dep_tol: T,
    sing_tol: T,
}

impl<T: Scalar> DgksOrtho<T> {
    pub fn new() -> Self {
        Self {
            dep_tol: T::one() / T::from_f64_lossy(2.0).sqrt(),
            sing_tol: T::epsilon() * T::from_f64_lossy(10.0),
        }
    }
}

impl<T: Scalar> Default for DgksOrtho<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Scalar> MatOrthoManager<T> for DgksOrtho<T> {
    fn kind(&self) -> OrthoType {
        OrthoType::Dgks
    }

    fn orthogonalize_column(&self, v: &mut [T], basis: &[&[T]], norm_before: T, comm: &dyn Comm) -> Vec<T> {
        if basis.is_empty() {
            return Vec::new();
        }
        let mut coeffs = classical_pass(v, basis, comm);
        let norm_after = norm2(v, comm);
        if norm_after < self.dep_tol * norm_before {
            let second = classical_pass(v, basis, comm);
            accumulate(&mut coeffs, &second);
        }
        coeffs
    }

    fn sing_tol(&self) -> T {
        self.sing_tol
    }

    fn dep_tol(&self) -> Option<T> {
        Some(self.dep_tol)
    }

    fn set_dep_tol(&mut self, tol: T) {
        self.dep_tol = tol;
    }
}
