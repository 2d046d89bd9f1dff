//! Single-reduction CG (Chronopoulos and Gear).
//!
//! Keeps `w = Az` and `s = Ap` by recurrence so that `γ = rᵀz` and
//! `δ = zᵀAz` of the same residual can be reduced together:
//!
//! ```text
//! β = γₖ₊₁ / γₖ
//! α = γₖ₊₁ / (δₖ₊₁ − β γₖ₊₁ / αₖ)
//! p = z + β p,  s = w + β s
//! ```
//!
//! One fused reduction per iteration; folding adds `rᵀr` to the same buffer.

use super::state::{SingleRedState, SolverState};
use super::{CgIteration, IterContext, IterateOutcome, KernelKind, any_non_finite, check_status};
use crate::core::multivec::{MultiVec, local_dot};
use crate::core::scalar::Scalar;
use crate::error::KError;
use crate::parallel::{Comm, reduce_sum};
use crate::status::Status;
use crate::utils::output::MsgType;
use std::slice;

#[derive(Debug, Clone)]
pub struct CgSingleRedIter {
    assert_pd: bool,
    fold: bool,
    num_iters: usize,
}

impl CgSingleRedIter {
    pub fn new(assert_pd: bool, fold: bool) -> Self {
        Self { assert_pd, fold, num_iters: 0 }
    }

    /// `[rᵀz, zᵀw]` and optionally `‖r‖₂`, in one round.
    fn fused<T: Scalar>(&self, s: &SingleRedState<T>, comm: &dyn Comm) -> (T, T, Option<T>) {
        let (r, z, w) = (s.r.col(0), s.z.col(0), s.w.col(0));
        let mut buf = vec![local_dot(r, z), local_dot(z, w)];
        if self.fold {
            buf.push(local_dot(r, r));
        }
        reduce_sum(comm, &mut buf);
        (buf[0], buf[1], buf.get(2).map(|rr| rr.sqrt()))
    }
}

impl<T: Scalar> CgIteration<T> for CgSingleRedIter {
    fn kind(&self) -> KernelKind {
        KernelKind::SingleReduction
    }

    fn initialize(&mut self, state: &mut SolverState<T>, ctx: &mut IterContext<'_, T>, init_res: &MultiVec<T>) -> Result<(), KError> {
        if init_res.ncols() != 1 {
            return Err(KError::DimensionMismatch { expected: 1, found: init_res.ncols() });
        }
        let s = state.as_single_red_mut()?;
        s.r.assign(init_res);
        ctx.problem.apply_left_prec(&s.r, &mut s.z)?;
        ctx.problem.apply_op(&s.z, &mut s.w)?;
        s.p.assign(&s.z);
        s.s.assign(&s.w);

        let (gamma, delta, res_norm) = self.fused(s, ctx.comm);
        if self.assert_pd && delta <= T::zero() && gamma != T::zero() {
            return Err(KError::IndefiniteMatrix);
        }
        s.gamma = gamma;
        s.alpha = gamma / delta;
        s.res_norm = res_norm;
        Ok(())
    }

    fn iterate(&mut self, state: &mut SolverState<T>, ctx: &mut IterContext<'_, T>) -> Result<IterateOutcome, KError> {
        let s = state.as_single_red_mut()?;
        loop {
            match check_status(ctx, self.num_iters, &s.r, s.res_norm.as_ref().map(slice::from_ref)) {
                Status::Passed => return Ok(IterateOutcome::StatusPassed),
                Status::NonFinite => return Ok(IterateOutcome::NumericalFailure),
                Status::Failed | Status::Undefined => {}
            }
            self.num_iters += 1;
            if !s.alpha.is_finite() {
                ctx.out.emit(MsgType::DEBUG, format_args!("single-reduction cg: alpha = {}", s.alpha));
                return Ok(IterateOutcome::NumericalFailure);
            }

            ctx.problem.cur_lhs_mut().axpy(s.alpha, &s.p)?;
            s.r.axpy(-s.alpha, &s.s)?;
            ctx.problem.apply_left_prec(&s.r, &mut s.z)?;
            ctx.problem.apply_op(&s.z, &mut s.w)?;

            let (gamma, delta, res_norm) = self.fused(s, ctx.comm);
            let beta = gamma / s.gamma;
            let denom = delta - beta * gamma / s.alpha;
            if self.assert_pd && denom <= T::zero() && gamma != T::zero() {
                return Err(KError::IndefiniteMatrix);
            }
            let alpha = gamma / denom;
            if any_non_finite([beta, alpha]) && gamma != T::zero() {
                ctx.out.emit(MsgType::DEBUG, format_args!("single-reduction cg: beta = {beta}, alpha = {alpha}"));
                return Ok(IterateOutcome::NumericalFailure);
            }
            s.gamma = gamma;
            s.alpha = alpha;
            s.res_norm = res_norm;
            for (p, &z) in s.p.col_mut(0).iter_mut().zip(s.z.col(0)) {
                *p = z + beta * *p;
            }
            for (sv, &w) in s.s.col_mut(0).iter_mut().zip(s.w.col(0)) {
                *sv = w + beta * *sv;
            }
        }
    }

    fn block_size(&self) -> usize {
        1
    }

    fn set_block_size(&mut self, block_size: usize) -> Result<(), KError> {
        if block_size != 1 {
            return Err(KError::InvalidParameter(format!("single-reduction CG iterates one column, not {block_size}")));
        }
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
    use crate::solver::cg::CgIter;
    use crate::solver::testing::Harness;
    use approx::assert_relative_eq;

    #[test]
    fn matches_standard_cg() {
        let mut standard = Harness::laplacian(25, 1, 1e-10);
        let mut k = CgIter::new(true, false);
        standard.run(&mut k, KernelKind::Cg);

        let mut single = Harness::laplacian(25, 1, 1e-10);
        let mut k = CgSingleRedIter::new(true, false);
        assert_eq!(single.run(&mut k, KernelKind::SingleReduction), IterateOutcome::StatusPassed);

        for (a, b) in standard.problem.cur_lhs().col(0).iter().zip(single.problem.cur_lhs().col(0)) {
            assert_relative_eq!(a, b, max_relative = 1e-6);
        }
    }

    #[test]
    fn non_finite_alpha_is_a_numerical_failure() {
        let mut h = Harness::nan_after_start(8, 1);
        let mut k = CgSingleRedIter::new(true, false);
        assert_eq!(h.run(&mut k, KernelKind::SingleReduction), IterateOutcome::NumericalFailure);
    }

    #[test]
    fn one_fused_reduction_per_iteration() {
        let rounds = |fold: bool| {
            let mut h = Harness::laplacian(30, 1, 1e-10);
            let mut k = CgSingleRedIter::new(true, fold);
            h.run(&mut k, KernelKind::SingleReduction);
            h.rounds_per_iteration()
        };
        assert_eq!(rounds(false), 2);
        assert_eq!(rounds(true), 1);
    }
}
