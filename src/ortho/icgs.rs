//! Iterated classical Gram-Schmidt: two full sweeps, each a single reduction.

use super::{MatOrthoManager, accumulate, classical_pass};
use crate::config::OrthoType;
use crate::core::scalar::Scalar;
use crate::parallel::Comm;
use std::marker::PhantomData;

#[derive(Debug, Clone, Default)]
pub struct IcgsOrtho<T> {
    _marker: PhantomData<T>,
}

impl<T: Scalar> IcgsOrtho<T> {
    pub fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<T: Scalar> MatOrthoManager<T> for IcgsOrtho<T> {
    fn kind(&self) -> OrthoType {
        OrthoType::Icgs
    }

    fn orthogonalize_column(&self, v: &mut [T], basis: &[&[T]], _norm_before: T, comm: &dyn Comm) -> Vec<T> {
        if basis.is_empty() {
            return Vec::new();
        }
        let mut coeffs = classical_pass(v, basis, comm);
        let second = classical_pass(v, basis, comm);
        accumulate(&mut coeffs, &second);
        coeffs
    }
}
