//! Scalar bound used throughout the crate.
//!
//! Generic code only relies on `num_traits::Float`. The small dense solves
//! needed by the block kernel are delegated to faer through the concrete
//! `f32`/`f64` implementations below, so faer's own trait hierarchy never
//! leaks into generic signatures.

use crate::error::KError;
use faer::linalg::solvers::{FullPivLu, Llt, SolveCore};
use faer::{Conj, Mat, Side};
use num_traits::{Float, FromPrimitive};
use std::fmt::{Debug, Display, LowerExp};

/// Real scalar type accepted by the solvers.
pub trait Scalar: Float + FromPrimitive + Debug + Display + LowerExp + Default + Send + Sync + 'static {
    /// Solve `A X = B` in place for a small symmetric positive definite `A`.
    ///
    /// Fails with [`KError::IndefiniteMatrix`] when the Cholesky factorization
    /// breaks down.
    fn solve_spd(a: &Mat<Self>, b: &mut Mat<Self>) -> Result<(), KError>;

    /// Solve `A X = B` in place with a full-pivot LU factorization.
    fn solve_general(a: &Mat<Self>, b: &mut Mat<Self>) -> Result<(), KError>;

    /// Lossy conversion used when packing values into reduction buffers.
    fn to_f64_lossy(self) -> f64 {
        self.to_f64().unwrap_or(f64::NAN)
    }

    /// Inverse of [`Scalar::to_f64_lossy`].
    fn from_f64_lossy(v: f64) -> Self {
        <Self as FromPrimitive>::from_f64(v).unwrap_or_else(Self::nan)
    }
}

macro_rules! impl_scalar {
    ($t:ty) => {
        impl Scalar for $t {
            fn solve_spd(a: &Mat<$t>, b: &mut Mat<$t>) -> Result<(), KError> {
                check_square(a, b)?;
                let llt = Llt::new(a.as_ref(), Side::Lower).map_err(|_| KError::IndefiniteMatrix)?;
                llt.solve_in_place_with_conj(Conj::No, b.as_mut());
                Ok(())
            }

            fn solve_general(a: &Mat<$t>, b: &mut Mat<$t>) -> Result<(), KError> {
                check_square(a, b)?;
                let lu = FullPivLu::new(a.as_ref());
                lu.solve_in_place_with_conj(Conj::No, b.as_mut());
                for j in 0..b.ncols() {
                    for i in 0..b.nrows() {
                        if !b[(i, j)].is_finite() {
                            return Err(KError::FactorError(format!(
                                "singular {}x{} coefficient matrix",
                                a.nrows(),
                                a.ncols()
                            )));
                        }
                    }
                }
                Ok(())
            }
        }
    };
}

impl_scalar!(f32);
impl_scalar!(f64);

fn check_square<T>(a: &Mat<T>, b: &Mat<T>) -> Result<(), KError> {
    if a.nrows() != a.ncols() {
        return Err(KError::DimensionMismatch { expected: a.nrows(), found: a.ncols() });
    }
    if b.nrows() != a.nrows() {
        return Err(KError::DimensionMismatch { expected: a.nrows(), found: b.nrows() });
    }
    Ok(())
}

/// Small dense matrix filled with zeros.
pub fn small_zeros<T: Scalar>(nrows: usize, ncols: usize) -> Mat<T> {
    Mat::from_fn(nrows, ncols, |_, _| T::zero())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spd_solve_matches_known_solution() {
        // [[4,1],[1,3]] x = [1,2]
        let a = Mat::from_fn(2, 2, |i, j| [[4.0, 1.0], [1.0, 3.0]][i][j]);
        let mut b = Mat::from_fn(2, 1, |i, _| [1.0, 2.0][i]);
        f64::solve_spd(&a, &mut b).unwrap();
        assert!((b[(0, 0)] - 0.09090909090909091).abs() < 1e-12);
        assert!((b[(1, 0)] - 0.6363636363636364).abs() < 1e-12);
    }

    #[test]
    fn spd_solve_rejects_indefinite() {
        let a = Mat::from_fn(2, 2, |i, j| [[1.0, 0.0], [0.0, -1.0]][i][j]);
        let mut b = Mat::from_fn(2, 1, |_, _| 1.0);
        assert!(matches!(f64::solve_spd(&a, &mut b), Err(KError::IndefiniteMatrix)));
    }

    #[test]
    fn general_solve_handles_nonsymmetric() {
        // [[2,1,1],[1,3,2],[1,0,0]] x = [4,5,6] -> [6,15,-23]
        let a = Mat::from_fn(3, 3, |i, j| [[2.0, 1.0, 1.0], [1.0, 3.0, 2.0], [1.0, 0.0, 0.0]][i][j]);
        let mut b = Mat::from_fn(3, 1, |i, _| [4.0, 5.0, 6.0][i]);
        f64::solve_general(&a, &mut b).unwrap();
        for (i, e) in [6.0, 15.0, -23.0].iter().enumerate() {
            assert!((b[(i, 0)] - e).abs() < 1e-10);
        }
    }
}
