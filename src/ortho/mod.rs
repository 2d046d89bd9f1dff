//! Orthogonalization of vector blocks.
//!
//! A [`MatOrthoManager`] removes from a block `X` its components along an
//! orthonormal basis `Q` (`project`) and orthonormalizes the columns of `X`
//! among themselves (`normalize`). The three recipes differ only in how one
//! column is cleaned against a set of basis columns; the block-level
//! algorithms are shared and live in this module.
//!
//! Every inner product goes through a [`Comm`] reduction.

use crate::config::OrthoType;
use crate::core::multivec::{MultiVec, local_dot, trans_mv};
use crate::core::scalar::{Scalar, small_zeros};
use crate::error::KError;
use crate::parallel::{Comm, reduce_sum};
use faer::Mat;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub mod dgks;
pub mod icgs;
pub mod imgs;

pub use dgks::DgksOrtho;
pub use icgs::IcgsOrtho;
pub use imgs::ImgsOrtho;

const REPLACEMENT_SEED: u64 = 0x0a7f_11e5;
const REPLACEMENT_ATTEMPTS: usize = 3;

pub trait MatOrthoManager<T: Scalar>: Send + Sync {
    fn kind(&self) -> OrthoType;

    /// Remove from `v` its components along `basis`; returns the accumulated
    /// coefficients `basisᵀ v`. `norm_before` is `‖v‖` on entry.
    fn orthogonalize_column(&self, v: &mut [T], basis: &[&[T]], norm_before: T, comm: &dyn Comm) -> Vec<T>;

    /// Relative norm below which a cleaned column counts as dependent.
    fn sing_tol(&self) -> T {
        T::epsilon() * T::from_f64_lossy(10.0)
    }

    /// Re-orthogonalization threshold, for recipes that have one.
    fn dep_tol(&self) -> Option<T> {
        None
    }

    fn set_dep_tol(&mut self, _tol: T) {}

    /// `X ← X − Q (QᵀX)`; returns `QᵀX`.
    fn project(&self, x: &mut MultiVec<T>, q: &MultiVec<T>, comm: &dyn Comm) -> Result<Mat<T>, KError> {
        project_block(self, x, q, comm)
    }

    /// Orthonormalize the columns of `X` in place; returns the numerical rank.
    fn normalize(&self, x: &mut MultiVec<T>, comm: &dyn Comm) -> Result<usize, KError> {
        normalize_block(self, x, None, comm)
    }

    /// Project against `Q`, then normalize within `X` keeping `X ⟂ Q`.
    fn project_and_normalize(&self, x: &mut MultiVec<T>, q: &MultiVec<T>, comm: &dyn Comm) -> Result<usize, KError> {
        project_block(self, x, q, comm)?;
        normalize_block(self, x, Some(q), comm)
    }

    /// Frobenius norm of `XᵀX − I`.
    fn orthonorm_error(&self, x: &MultiVec<T>, comm: &dyn Comm) -> Result<T, KError> {
        let g = trans_mv(x, x, comm)?;
        let mut err = T::zero();
        for j in 0..g.ncols() {
            for i in 0..g.nrows() {
                let e = if i == j { g[(i, j)] - T::one() } else { g[(i, j)] };
                err = err + e * e;
            }
        }
        Ok(err.sqrt())
    }
}

/// Build the orthogonalizer for `kind`. A positive `kappa` sets the DGKS
/// dependency threshold; it is ignored by the other recipes.
pub fn make_ortho_manager<T: Scalar>(kind: OrthoType, kappa: T) -> Box<dyn MatOrthoManager<T>> {
    match kind {
        OrthoType::Dgks => {
            let mut ortho = DgksOrtho::new();
            if kappa > T::zero() {
                ortho.set_dep_tol(kappa);
            }
            Box::new(ortho)
        }
        OrthoType::Icgs => Box::new(IcgsOrtho::new()),
        OrthoType::Imgs => Box::new(ImgsOrtho::new()),
    }
}

pub(crate) fn norm2<T: Scalar>(v: &[T], comm: &dyn Comm) -> T {
    let mut s = [local_dot(v, v)];
    reduce_sum(comm, &mut s);
    s[0].sqrt()
}

/// One classical Gram-Schmidt sweep: all coefficients in a single reduction.
pub(crate) fn classical_pass<T: Scalar>(v: &mut [T], basis: &[&[T]], comm: &dyn Comm) -> Vec<T> {
    let mut coeffs: Vec<T> = basis.iter().map(|b| local_dot(b, v)).collect();
    reduce_sum(comm, &mut coeffs);
    for (b, &c) in basis.iter().zip(&coeffs) {
        for (vi, &bi) in v.iter_mut().zip(b.iter()) {
            *vi = *vi - c * bi;
        }
    }
    coeffs
}

/// One modified Gram-Schmidt sweep: one reduction per basis column.
pub(crate) fn modified_pass<T: Scalar>(v: &mut [T], basis: &[&[T]], comm: &dyn Comm) -> Vec<T> {
    let mut coeffs = Vec::with_capacity(basis.len());
    for b in basis {
        let mut c = [local_dot(b, v)];
        reduce_sum(comm, &mut c);
        for (vi, &bi) in v.iter_mut().zip(b.iter()) {
            *vi = *vi - c[0] * bi;
        }
        coeffs.push(c[0]);
    }
    coeffs
}

pub(crate) fn accumulate<T: Scalar>(total: &mut [T], pass: &[T]) {
    for (t, &p) in total.iter_mut().zip(pass) {
        *t = *t + p;
    }
}

fn project_block<T: Scalar, O: MatOrthoManager<T> + ?Sized>(
    ortho: &O,
    x: &mut MultiVec<T>,
    q: &MultiVec<T>,
    comm: &dyn Comm,
) -> Result<Mat<T>, KError> {
    if x.nrows() != q.nrows() {
        return Err(KError::DimensionMismatch { expected: q.nrows(), found: x.nrows() });
    }
    let mut coeffs = small_zeros(q.ncols(), x.ncols());
    if q.ncols() == 0 {
        return Ok(coeffs);
    }
    let basis: Vec<&[T]> = (0..q.ncols()).map(|k| q.col(k)).collect();
    for j in 0..x.ncols() {
        let mut v = x.col(j).to_vec();
        let norm = norm2(&v, comm);
        let c = ortho.orthogonalize_column(&mut v, &basis, norm, comm);
        for (k, ck) in c.into_iter().enumerate() {
            coeffs[(k, j)] = ck;
        }
        x.set_col(j, &v);
    }
    Ok(coeffs)
}

/// Column-by-column orthonormalization of `x`, optionally keeping it
/// orthogonal to `q`. Dependent columns are replaced by random vectors
/// cleaned against everything before them and are not counted in the rank.
fn normalize_block<T: Scalar, O: MatOrthoManager<T> + ?Sized>(
    ortho: &O,
    x: &mut MultiVec<T>,
    q: Option<&MultiVec<T>>,
    comm: &dyn Comm,
) -> Result<usize, KError> {
    if let Some(q) = q {
        if q.nrows() != x.nrows() {
            return Err(KError::DimensionMismatch { expected: q.nrows(), found: x.nrows() });
        }
    }
    let sing_tol = ortho.sing_tol();
    let mut rank = 0;
    for j in 0..x.ncols() {
        let mut v = x.col(j).to_vec();
        let independent = {
            let mut basis: Vec<&[T]> = Vec::with_capacity(j + q.map_or(0, |q| q.ncols()));
            if let Some(q) = q {
                basis.extend((0..q.ncols()).map(|k| q.col(k)));
            }
            basis.extend((0..j).map(|k| x.col(k)));

            let before = norm2(&v, comm);
            ortho.orthogonalize_column(&mut v, &basis, before, comm);
            let after = norm2(&v, comm);
            if before > T::zero() && after > sing_tol * before {
                scale(&mut v, after);
                true
            } else {
                replace_dependent(ortho, &mut v, &basis, j, comm);
                false
            }
        };
        if independent {
            rank += 1;
        }
        x.set_col(j, &v);
    }
    Ok(rank)
}

fn scale<T: Scalar>(v: &mut [T], norm: T) {
    let inv = T::one() / norm;
    v.iter_mut().for_each(|vi| *vi = *vi * inv);
}

fn replace_dependent<T: Scalar, O: MatOrthoManager<T> + ?Sized>(
    ortho: &O,
    v: &mut [T],
    basis: &[&[T]],
    column: usize,
    comm: &dyn Comm,
) {
    let mut rng = StdRng::seed_from_u64(REPLACEMENT_SEED ^ column as u64);
    for _ in 0..REPLACEMENT_ATTEMPTS {
        for vi in v.iter_mut() {
            *vi = T::from_f64_lossy(rng.gen_range(-0.5..0.5));
        }
        let before = norm2(v, comm);
        ortho.orthogonalize_column(v, basis, before, comm);
        let after = norm2(v, comm);
        if after > ortho.sing_tol() * before {
            scale(v, after);
            return;
        }
    }
    v.iter_mut().for_each(|vi| *vi = T::zero());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::SerialComm;

    fn block() -> MultiVec<f64> {
        MultiVec::from_fn(6, 3, |i, j| ((i * 7 + j * 3) % 5) as f64 + if i == j { 2.0 } else { 0.0 })
    }

    #[test]
    fn every_kind_orthonormalizes() {
        let comm = SerialComm;
        for kind in [OrthoType::Dgks, OrthoType::Icgs, OrthoType::Imgs] {
            let ortho = make_ortho_manager::<f64>(kind, -1.0);
            assert_eq!(ortho.kind(), kind);
            let mut x = block();
            assert_eq!(ortho.normalize(&mut x, &comm).unwrap(), 3);
            assert!(ortho.orthonorm_error(&x, &comm).unwrap() < 1e-12);
        }
    }

    #[test]
    fn dependent_column_lowers_rank_but_stays_orthonormal() {
        let comm = SerialComm;
        for kind in [OrthoType::Dgks, OrthoType::Icgs, OrthoType::Imgs] {
            let ortho = make_ortho_manager::<f64>(kind, -1.0);
            let base = block();
            let mut x = MultiVec::from_fn(6, 3, |i, j| if j == 2 { base.get(i, 0) * 2.0 } else { base.get(i, j) });
            assert_eq!(ortho.normalize(&mut x, &comm).unwrap(), 2);
            assert!(ortho.orthonorm_error(&x, &comm).unwrap() < 1e-10);
        }
    }

    #[test]
    fn project_and_normalize_keeps_block_orthogonal_to_basis() {
        let comm = SerialComm;
        let ortho = make_ortho_manager::<f64>(OrthoType::Icgs, -1.0);
        let mut q = block().select(&[0]);
        ortho.normalize(&mut q, &comm).unwrap();
        let mut x = block().select(&[1, 2]);
        assert_eq!(ortho.project_and_normalize(&mut x, &q, &comm).unwrap(), 2);
        let cross = trans_mv(&q, &x, &comm).unwrap();
        assert!(cross[(0, 0)].abs() < 1e-12 && cross[(0, 1)].abs() < 1e-12);
    }

    #[test]
    fn kappa_only_reaches_dgks() {
        let dgks = make_ortho_manager::<f64>(OrthoType::Dgks, 0.5);
        assert_eq!(dgks.dep_tol(), Some(0.5));
        let default_dgks = make_ortho_manager::<f64>(OrthoType::Dgks, -1.0);
        assert!((default_dgks.dep_tol().unwrap() - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-15);
        assert_eq!(make_ortho_manager::<f64>(OrthoType::Imgs, 0.5).dep_tol(), None);
    }
}
