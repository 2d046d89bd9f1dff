//! Iterated modified Gram-Schmidt: two sweeps, one reduction per basis column.

use super::{MatOrthoManager, accumulate, modified_pass};
use crate::config::OrthoType;
use crate::core::scalar::Scalar;
use crate::parallel::Comm;
use std::marker::PhantomData;

#[derive(Debug, Clone, Default)]
pub struct ImgsOrtho<T> {
    _marker: PhantomData<T>,
}

impl<T: Scalar> ImgsOrtho<T> {
    pub fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<T: Scalar> MatOrthoManager<T> for ImgsOrtho<T> {
    fn kind(&self) -> OrthoType {
        OrthoType::Imgs
    }

    fn orthogonalize_column(&self, v: &mut [T], basis: &[&[T]], _norm_before: T, comm: &dyn Comm) -> Vec<T> {
        let mut coeffs = modified_pass(v, basis, comm);
        let second = modified_pass(v, basis, comm);
        accumulate(&mut coeffs, &second);
        coeffs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::testing::CountingComm;

    #[test]
    fn one_reduction_per_basis_column_per_sweep() {
        let ortho = ImgsOrtho::<f64>::new();
        let comm = CountingComm::default();
        let e0 = [1.0, 0.0, 0.0];
        let e1 = [0.0, 1.0, 0.0];
        let mut v = [2.0, 3.0, 4.0];
        let c = ortho.orthogonalize_column(&mut v, &[&e0, &e1], 0.0, &comm);
        assert_eq!(comm.rounds(), 4);
        assert_eq!(c, vec![2.0, 3.0]);
        assert_eq!(v, [0.0, 0.0, 4.0]);
    }
}
