// Jacobi preconditioner implementation

use crate::core::multivec::MultiVec;
use crate::core::scalar::Scalar;
use crate::core::traits::Operator;
use crate::error::KError;
use crate::preconditioner::Preconditioner;

/// Jacobi preconditioner: M⁻¹ = D⁻¹
pub struct Jacobi<T> {
    pub(crate) inv_diag: Vec<T>,
}

impl<T: Scalar> Jacobi<T> {
    /// From an explicit diagonal; zero entries are left unscaled.
    pub fn from_diagonal(diag: &[T]) -> Self {
        let inv_diag = diag
            .iter()
            .map(|&d| if d != T::zero() { T::one() / d } else { T::one() })
            .collect();
        Self { inv_diag }
    }

    /// Extract the diagonal of `a` by applying it to unit vectors.
    pub fn from_operator(a: &dyn Operator<T>) -> Result<Self, KError> {
        let n = a.nrows();
        let mut diag = vec![T::zero(); n];
        let mut e = MultiVec::zeros(a.ncols(), 1);
        let mut col = MultiVec::zeros(n, 1);
        for (i, d) in diag.iter_mut().enumerate().take(a.ncols()) {
            e.fill(T::zero());
            e.col_mut(0)[i] = T::one();
            a.apply(&e, &mut col)?;
            *d = col.col(0)[i];
        }
        Ok(Self::from_diagonal(&diag))
    }
}

impl<T: Scalar> Preconditioner<T> for Jacobi<T> {
    fn apply(&self, r: &MultiVec<T>, z: &mut MultiVec<T>) -> Result<(), KError> {
        if r.nrows() != self.inv_diag.len() {
            return Err(KError::DimensionMismatch { expected: self.inv_diag.len(), found: r.nrows() });
        }
        if z.nrows() != r.nrows() || z.ncols() != r.ncols() {
            *z = MultiVec::zeros(r.nrows(), r.ncols());
        }
        for j in 0..r.ncols() {
            for ((zi, &ri), &di) in z.col_mut(j).iter_mut().zip(r.col(j)).zip(&self.inv_diag) {
                *zi = di * ri;
            }
        }
        Ok(())
    }
}
