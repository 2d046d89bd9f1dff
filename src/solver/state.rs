//! Recurrence state shared between the manager and the iteration kernels.
//!
//! The manager owns one `SolverState` for its whole lifetime. Before each
//! kernel initialization it checks that the state has the variant the kernel
//! expects and replaces it with a fresh one otherwise; kernels then overwrite
//! the contents in place.

use super::KernelKind;
use crate::core::multivec::MultiVec;
use crate::core::scalar::Scalar;
use crate::error::KError;
use faer::Mat;

/// Standard preconditioned CG.
#[derive(Debug, Clone)]
pub struct CgState<T> {
    pub r: MultiVec<T>,
    pub z: MultiVec<T>,
    pub p: MultiVec<T>,
    pub ap: MultiVec<T>,
    /// `rᵀz` of the current residual.
    pub rz: T,
    /// `‖r‖₂` fused into the `rᵀz` reduction, when folding.
    pub res_norm: Option<T>,
}

/// Chronopoulos–Gear single-reduction CG.
#[derive(Debug, Clone)]
pub struct SingleRedState<T> {
    pub r: MultiVec<T>,
    pub z: MultiVec<T>,
    /// `A z`.
    pub w: MultiVec<T>,
    pub p: MultiVec<T>,
    /// `A p`, maintained by recurrence.
    pub s: MultiVec<T>,
    /// `rᵀz`.
    pub gamma: T,
    pub alpha: T,
    pub res_norm: Option<T>,
}

/// Block CG with an orthonormal direction block.
#[derive(Debug, Clone)]
pub struct BlockState<T> {
    pub r: MultiVec<T>,
    pub z: MultiVec<T>,
    pub p: MultiVec<T>,
    /// After an iteration: `A · p_prev`.
    pub ap: MultiVec<T>,
    /// Direction block of the last completed iteration.
    pub p_prev: Option<MultiVec<T>>,
    /// `p_prevᵀ A p_prev`.
    pub ptap: Option<Mat<T>>,
}

#[derive(Debug, Clone)]
pub enum SolverState<T> {
    Cg(CgState<T>),
    SingleReduction(SingleRedState<T>),
    Block(BlockState<T>),
}

impl<T: Scalar> SolverState<T> {
    /// Empty state of the variant `kind` needs, for vectors of length `nrows`.
    pub fn fresh(kind: KernelKind, nrows: usize) -> Self {
        let empty = || MultiVec::zeros(nrows, 0);
        match kind {
            KernelKind::Cg => SolverState::Cg(CgState {
                r: empty(),
                z: empty(),
                p: empty(),
                ap: empty(),
                rz: T::zero(),
                res_norm: None,
            }),
            KernelKind::SingleReduction => SolverState::SingleReduction(SingleRedState {
                r: empty(),
                z: empty(),
                w: empty(),
                p: empty(),
                s: empty(),
                gamma: T::zero(),
                alpha: T::zero(),
                res_norm: None,
            }),
            KernelKind::Block => SolverState::Block(BlockState {
                r: empty(),
                z: empty(),
                p: empty(),
                ap: empty(),
                p_prev: None,
                ptap: None,
            }),
        }
    }

    pub fn kind(&self) -> KernelKind {
        match self {
            SolverState::Cg(_) => KernelKind::Cg,
            SolverState::SingleReduction(_) => KernelKind::SingleReduction,
            SolverState::Block(_) => KernelKind::Block,
        }
    }

    pub fn nrows(&self) -> usize {
        self.residuals().nrows()
    }

    pub fn is_compatible(&self, kind: KernelKind, nrows: usize) -> bool {
        self.kind() == kind && self.nrows() == nrows
    }

    /// Replace `self` by a fresh state unless it already fits. Returns whether it was replaced.
    pub fn ensure(&mut self, kind: KernelKind, nrows: usize) -> bool {
        if self.is_compatible(kind, nrows) {
            return false;
        }
        *self = Self::fresh(kind, nrows);
        true
    }

    /// Native residuals of the current columns.
    pub fn residuals(&self) -> &MultiVec<T> {
        match self {
            SolverState::Cg(s) => &s.r,
            SolverState::SingleReduction(s) => &s.r,
            SolverState::Block(s) => &s.r,
        }
    }

    /// Drop block direction history so the next initialization starts from scratch.
    pub fn forget_history(&mut self) {
        if let SolverState::Block(s) = self {
            s.p_prev = None;
            s.ptap = None;
        }
    }

    pub fn as_cg_mut(&mut self) -> Result<&mut CgState<T>, KError> {
        match self {
            SolverState::Cg(s) => Ok(s),
            other => Err(mismatch(KernelKind::Cg, other.kind())),
        }
    }

    pub fn as_single_red_mut(&mut self) -> Result<&mut SingleRedState<T>, KError> {
        match self {
            SolverState::SingleReduction(s) => Ok(s),
            other => Err(mismatch(KernelKind::SingleReduction, other.kind())),
        }
    }

    pub fn as_block_mut(&mut self) -> Result<&mut BlockState<T>, KError> {
        match self {
            SolverState::Block(s) => Ok(s),
            other => Err(mismatch(KernelKind::Block, other.kind())),
        }
    }
}

fn mismatch(expected: KernelKind, found: KernelKind) -> KError {
    KError::InternalConsistency(format!("{expected:?} kernel handed a {found:?} state"))
}
