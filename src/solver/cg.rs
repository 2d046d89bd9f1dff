//! Preconditioned Conjugate Gradient for a single right-hand side.
//!
//! Two reductions per iteration: `pᵀAp`, then `rᵀz` of the updated residual.
//! With folding, `rᵀr` rides along in the second one and the convergence
//! test reuses it instead of reducing a norm of its own.

use super::state::SolverState;
use super::{CgIteration, IterContext, IterateOutcome, KernelKind, check_status};
use crate::core::multivec::{MultiVec, local_dot};
use crate::core::scalar::Scalar;
use crate::error::KError;
use crate::parallel::{Comm, reduce_sum};
use crate::status::Status;
use crate::utils::output::MsgType;
use std::slice;

#[derive(Debug, Clone)]
pub struct CgIter {
    assert_pd: bool,
    fold: bool,
    num_iters: usize,
}

impl CgIter {
    pub fn new(assert_pd: bool, fold: bool) -> Self {
        Self { assert_pd, fold, num_iters: 0 }
    }
}

/// `rᵀz` and, when folding, `‖r‖₂`, in one round.
fn reduce_rz<T: Scalar>(r: &MultiVec<T>, z: &MultiVec<T>, fold: bool, comm: &dyn Comm) -> (T, Option<T>) {
    let mut buf = vec![local_dot(r.col(0), z.col(0))];
    if fold {
        buf.push(local_dot(r.col(0), r.col(0)));
    }
    reduce_sum(comm, &mut buf);
    (buf[0], buf.get(1).map(|rr| rr.sqrt()))
}

impl<T: Scalar> CgIteration<T> for CgIter {
    fn kind(&self) -> KernelKind {
        KernelKind::Cg
    }

    fn initialize(&mut self, state: &mut SolverState<T>, ctx: &mut IterContext<'_, T>, init_res: &MultiVec<T>) -> Result<(), KError> {
        if init_res.ncols() != 1 {
            return Err(KError::DimensionMismatch { expected: 1, found: init_res.ncols() });
        }
        let s = state.as_cg_mut()?;
        s.r.assign(init_res);
        ctx.problem.apply_left_prec(&s.r, &mut s.z)?;
        s.p.assign(&s.z);
        s.ap = MultiVec::zeros(s.r.nrows(), 1);
        let (rz, res_norm) = reduce_rz(&s.r, &s.z, self.fold, ctx.comm);
        s.rz = rz;
        s.res_norm = res_norm;
        Ok(())
    }

    fn iterate(&mut self, state: &mut SolverState<T>, ctx: &mut IterContext<'_, T>) -> Result<IterateOutcome, KError> {
        let s = state.as_cg_mut()?;
        loop {
            match check_status(ctx, self.num_iters, &s.r, s.res_norm.as_ref().map(slice::from_ref)) {
                Status::Passed => return Ok(IterateOutcome::StatusPassed),
                Status::NonFinite => return Ok(IterateOutcome::NumericalFailure),
                Status::Failed | Status::Undefined => {}
            }
            self.num_iters += 1;

            ctx.problem.apply_op(&s.p, &mut s.ap)?;
            let mut pap = [local_dot(s.p.col(0), s.ap.col(0))];
            reduce_sum(ctx.comm, &mut pap);
            let pap = pap[0];
            if self.assert_pd && pap <= T::zero() {
                return Err(KError::IndefiniteMatrix);
            }
            let alpha = s.rz / pap;
            if !alpha.is_finite() {
                ctx.out.emit(MsgType::DEBUG, format_args!("cg: alpha = {alpha} at iteration {}", self.num_iters));
                return Ok(IterateOutcome::NumericalFailure);
            }

            ctx.problem.cur_lhs_mut().axpy(alpha, &s.p)?;
            s.r.axpy(-alpha, &s.ap)?;
            ctx.problem.apply_left_prec(&s.r, &mut s.z)?;

            let (rz_new, res_norm) = reduce_rz(&s.r, &s.z, self.fold, ctx.comm);
            let beta = rz_new / s.rz;
            if !beta.is_finite() {
                ctx.out.emit(MsgType::DEBUG, format_args!("cg: beta = {beta} at iteration {}", self.num_iters));
                return Ok(IterateOutcome::NumericalFailure);
            }
            s.rz = rz_new;
            s.res_norm = res_norm;
            for (p, &z) in s.p.col_mut(0).iter_mut().zip(s.z.col(0)) {
                *p = z + beta * *p;
            }
        }
    }

    fn block_size(&self) -> usize {
        1
    }

    fn set_block_size(&mut self, block_size: usize) -> Result<(), KError> {
        if block_size != 1 {
            return Err(KError::InvalidParameter(format!("CG iterates one column, not {block_size}")));
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
    use crate::solver::testing::Harness;

    #[test]
    fn solves_small_spd_system() {
        // [[4,1],[1,3]] x = [1,2]
        let mut h = Harness::dense(&[[4.0, 1.0], [1.0, 3.0]], &[vec![1.0, 2.0]], 1e-12);
        let mut k = CgIter::new(true, false);
        let outcome = h.run(&mut k, KernelKind::Cg);
        assert_eq!(outcome, IterateOutcome::StatusPassed);
        let x = h.problem.cur_lhs().col(0).to_vec();
        assert!((x[0] - 0.09090909090909091).abs() < 1e-10);
        assert!((x[1] - 0.6363636363636364).abs() < 1e-10);
        assert!(CgIteration::<f64>::num_iters(&k) <= 2);
    }

    #[test]
    fn indefinite_operator_is_rejected() {
        let mut h = Harness::dense(&[[1.0, 0.0], [0.0, -1.0]], &[vec![0.0, 1.0]], 1e-12);
        let mut k = CgIter::new(true, false);
        assert!(matches!(h.try_run(&mut k, KernelKind::Cg), Err(KError::IndefiniteMatrix)));
    }

    #[test]
    fn non_finite_alpha_is_a_numerical_failure() {
        for fold in [false, true] {
            let mut h = Harness::nan_after_start(8, 1);
            let mut k = CgIter::new(true, fold);
            assert_eq!(h.run(&mut k, KernelKind::Cg), IterateOutcome::NumericalFailure);
            assert_eq!(CgIteration::<f64>::num_iters(&k), 1);
        }
    }

    #[test]
    fn folding_saves_one_reduction_per_iteration() {
        let rounds = |fold: bool| {
            let mut h = Harness::laplacian(30, 1, 1e-10);
            let mut k = CgIter::new(true, fold);
            h.run(&mut k, KernelKind::Cg);
            (h.rounds_per_iteration(), CgIteration::<f64>::num_iters(&k))
        };
        let (unfolded, n1) = rounds(false);
        let (folded, n2) = rounds(true);
        assert_eq!(n1, n2);
        assert_eq!(unfolded, 3);
        assert_eq!(folded, 2);
    }
}
