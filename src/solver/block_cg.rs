//! Block preconditioned CG (O'Leary) with an orthonormal direction block.
//!
//! Per iteration, with `P` orthonormalized:
//!
//! ```text
//! α = (PᵀAP)⁻¹ PᵀR
//! X ← X + Pα,   R ← R − APα,   Z = M⁻¹R
//! β = −(PᵀAP)⁻¹ (AP)ᵀZ
//! P ← orth(Z + Pβ)
//! ```
//!
//! The last direction block and its `PᵀAP` are kept in the state. When the
//! manager re-initializes after dropping converged columns, the new
//! directions are made A-conjugate to that block instead of restarting.

use super::state::SolverState;
use super::{CgIteration, IterContext, IterateOutcome, KernelKind, any_non_finite, check_status};
use crate::core::multivec::{MultiVec, trans_mv};
use crate::core::scalar::Scalar;
use crate::error::KError;
use crate::status::Status;
use crate::utils::output::MsgType;
use faer::Mat;

#[derive(Debug, Clone)]
pub struct BlockCgIter {
    block_size: usize,
    assert_pd: bool,
    num_iters: usize,
}

impl BlockCgIter {
    pub fn new(block_size: usize, assert_pd: bool) -> Self {
        Self { block_size, assert_pd, num_iters: 0 }
    }

    /// `B ← (PᵀAP)⁻¹ B`.
    fn solve_small<T: Scalar>(&self, ptap: &Mat<T>, b: &mut Mat<T>) -> Result<(), KError> {
        if self.assert_pd { T::solve_spd(ptap, b) } else { T::solve_general(ptap, b) }
    }

    fn orthonormalize<T: Scalar>(&self, p: &mut MultiVec<T>, ctx: &IterContext<'_, T>) -> Result<(), KError> {
        let rank = ctx.ortho.normalize(p, ctx.comm)?;
        if rank != self.block_size {
            ctx.out.emit(
                MsgType::ORTHO_DETAILS,
                format_args!("block cg: direction block has rank {rank} of {}", self.block_size),
            );
            return Err(KError::OrthoFailure { rank, expected: self.block_size });
        }
        Ok(())
    }
}

fn mat_non_finite<T: Scalar>(m: &Mat<T>) -> bool {
    (0..m.ncols()).any(|j| any_non_finite((0..m.nrows()).map(|i| m[(i, j)])))
}

impl<T: Scalar> CgIteration<T> for BlockCgIter {
    fn kind(&self) -> KernelKind {
        KernelKind::Block
    }

    fn initialize(&mut self, state: &mut SolverState<T>, ctx: &mut IterContext<'_, T>, init_res: &MultiVec<T>) -> Result<(), KError> {
        if init_res.ncols() != self.block_size {
            return Err(KError::DimensionMismatch { expected: self.block_size, found: init_res.ncols() });
        }
        let s = state.as_block_mut()?;
        s.r.assign(init_res);
        ctx.problem.apply_left_prec(&s.r, &mut s.z)?;

        let mut p = s.z.clone();
        if !s.z.all_finite() {
            // Left for the status check at the head of `iterate` to report.
            s.p = p;
            s.ap = MultiVec::zeros(s.r.nrows(), self.block_size);
            return Ok(());
        }
        if let (Some(p_prev), Some(ptap)) = (&s.p_prev, &s.ptap) {
            if p_prev.nrows() == p.nrows() && s.ap.ncols() == p_prev.ncols() {
                let mut beta = trans_mv(&s.ap, &s.z, ctx.comm)?;
                // A non-finite history leaves P = Z; the next status check sees the rest.
                if !mat_non_finite(ptap) && !mat_non_finite(&beta) {
                    self.solve_small(ptap, &mut beta)?;
                    p.times_mat_add(-T::one(), p_prev, &beta, T::one())?;
                }
            }
        }
        self.orthonormalize(&mut p, ctx)?;
        s.p = p;
        s.ap = MultiVec::zeros(s.r.nrows(), self.block_size);
        Ok(())
    }

    fn iterate(&mut self, state: &mut SolverState<T>, ctx: &mut IterContext<'_, T>) -> Result<IterateOutcome, KError> {
        let s = state.as_block_mut()?;
        loop {
            match check_status(ctx, self.num_iters, &s.r, None) {
                Status::Passed => return Ok(IterateOutcome::StatusPassed),
                Status::NonFinite => return Ok(IterateOutcome::NumericalFailure),
                Status::Failed | Status::Undefined => {}
            }
            self.num_iters += 1;

            ctx.problem.apply_op(&s.p, &mut s.ap)?;
            let ptap = trans_mv(&s.p, &s.ap, ctx.comm)?;
            let mut alpha = trans_mv(&s.p, &s.r, ctx.comm)?;
            if mat_non_finite(&ptap) || mat_non_finite(&alpha) {
                ctx.out.emit(MsgType::DEBUG, format_args!("block cg: non-finite PᵀAP at iteration {}", self.num_iters));
                return Ok(IterateOutcome::NumericalFailure);
            }
            self.solve_small(&ptap, &mut alpha)?;
            if mat_non_finite(&alpha) {
                ctx.out.emit(MsgType::DEBUG, format_args!("block cg: non-finite alpha at iteration {}", self.num_iters));
                return Ok(IterateOutcome::NumericalFailure);
            }

            ctx.problem.cur_lhs_mut().times_mat_add(T::one(), &s.p, &alpha, T::one())?;
            s.r.times_mat_add(-T::one(), &s.ap, &alpha, T::one())?;
            ctx.problem.apply_left_prec(&s.r, &mut s.z)?;

            let mut beta = trans_mv(&s.ap, &s.z, ctx.comm)?;
            if mat_non_finite(&beta) {
                ctx.out.emit(MsgType::DEBUG, format_args!("block cg: non-finite (AP)ᵀZ at iteration {}", self.num_iters));
                return Ok(IterateOutcome::NumericalFailure);
            }
            self.solve_small(&ptap, &mut beta)?;
            if mat_non_finite(&beta) {
                ctx.out.emit(MsgType::DEBUG, format_args!("block cg: non-finite beta at iteration {}", self.num_iters));
                return Ok(IterateOutcome::NumericalFailure);
            }
            let mut p_new = s.z.clone();
            p_new.times_mat_add(-T::one(), &s.p, &beta, T::one())?;
            self.orthonormalize(&mut p_new, ctx)?;
            s.p_prev = Some(std::mem::replace(&mut s.p, p_new));
            s.ptap = Some(ptap);
        }
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn set_block_size(&mut self, block_size: usize) -> Result<(), KError> {
        if block_size == 0 {
            return Err(KError::InvalidParameter("block size must be strictly positive".into()));
        }
        self.block_size = block_size;
        Ok(())
    }

    fn num_iters(&self) -> usize {
        self.num_iters
    }

    fn reset_num_iters(&mut self) {
        self.num_iters = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::testing::Harness;

    /// Iterate, dropping converged columns, until none are left.
    fn solve_all(h: &mut Harness, k: &mut BlockCgIter) -> Vec<usize> {
        let mut sizes = vec![CgIteration::<f64>::block_size(k)];
        assert_eq!(h.run(k, KernelKind::Block), IterateOutcome::StatusPassed);
        loop {
            let left = h.deflate(k);
            if left == 0 {
                break;
            }
            sizes.push(left);
            assert_eq!(h.run_more(k), IterateOutcome::StatusPassed);
        }
        sizes
    }

    #[test]
    fn converges_on_every_column_of_a_block() {
        let mut h = Harness::laplacian(24, 3, 1e-9);
        let mut k = BlockCgIter::new(3, true);
        let sizes = solve_all(&mut h, &mut k);
        assert!(sizes.windows(2).all(|w| w[1] < w[0]));
        h.assert_solution_accurate(1e-6);
    }

    #[test]
    fn general_small_solves_without_positivity_assertion() {
        let mut h = Harness::laplacian(20, 2, 1e-9);
        let mut k = BlockCgIter::new(2, false);
        solve_all(&mut h, &mut k);
        h.assert_solution_accurate(1e-6);
    }

    #[test]
    fn dependent_right_hand_sides_fail_orthogonalization() {
        let base = Harness::laplacian(10, 1, 1e-9);
        let dup = base.problem.rhs().select(&[0, 0]);
        let mut h = Harness::with_rhs(10, dup, 1e-9);
        let mut k = BlockCgIter::new(2, true);
        assert!(matches!(
            h.try_run(&mut k, KernelKind::Block),
            Err(KError::OrthoFailure { rank: 1, expected: 2 })
        ));
    }

    #[test]
    fn non_finite_ptap_is_a_numerical_failure() {
        for assert_pd in [true, false] {
            let mut h = Harness::nan_after_start(8, 2);
            let mut k = BlockCgIter::new(2, assert_pd);
            assert_eq!(h.run(&mut k, KernelKind::Block), IterateOutcome::NumericalFailure);
            assert_eq!(CgIteration::<f64>::num_iters(&k), 1);
        }
    }

    #[test]
    fn initial_residual_width_must_match_block_size() {
        let mut h = Harness::laplacian(10, 2, 1e-9);
        let mut k = BlockCgIter::new(3, true);
        assert!(matches!(h.try_run(&mut k, KernelKind::Block), Err(KError::DimensionMismatch { .. })));
    }
}
