//! The linear problem `A X = B` seen by the solver manager.
//!
//! Besides the operator and the full solution / right-hand-side blocks, the
//! problem keeps an *active index set*: the original column indices the
//! manager is currently iterating on. `set_ls_index` copies those columns into
//! the current blocks the kernels read and update; `set_curr_ls` writes the
//! current solution columns back. Index `-1` marks an inert placeholder slot:
//! it receives a seeded random right-hand side so a padded block keeps full
//! rank, and nothing from it is ever written back.

use crate::core::multivec::MultiVec;
use crate::core::scalar::Scalar;
use crate::core::traits::Operator;
use crate::error::KError;
use crate::preconditioner::Preconditioner;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

const PLACEHOLDER_SEED: u64 = 0x5eed_b10c;

pub struct LinearProblem<T> {
    op: Arc<dyn Operator<T>>,
    left_prec: Option<Arc<dyn Preconditioner<T>>>,
    lhs: MultiVec<T>,
    rhs: MultiVec<T>,
    init_res: MultiVec<T>,
    init_prec_res: MultiVec<T>,
    ls_index: Vec<isize>,
    cur_lhs: MultiVec<T>,
    cur_rhs: MultiVec<T>,
    cur_init_res: MultiVec<T>,
    is_set: bool,
}

impl<T: Scalar> LinearProblem<T> {
    /// Wrap `A`, the initial guess `X` and the right-hand sides `B`.
    ///
    /// The problem is not ready until [`set_problem`](Self::set_problem) is called.
    pub fn new(op: Arc<dyn Operator<T>>, lhs: MultiVec<T>, rhs: MultiVec<T>) -> Result<Self, KError> {
        if op.nrows() != op.ncols() {
            return Err(KError::DimensionMismatch { expected: op.nrows(), found: op.ncols() });
        }
        if lhs.nrows() != op.ncols() {
            return Err(KError::DimensionMismatch { expected: op.ncols(), found: lhs.nrows() });
        }
        if rhs.nrows() != op.nrows() {
            return Err(KError::DimensionMismatch { expected: op.nrows(), found: rhs.nrows() });
        }
        if lhs.ncols() != rhs.ncols() {
            return Err(KError::DimensionMismatch { expected: rhs.ncols(), found: lhs.ncols() });
        }
        let n = op.nrows();
        Ok(Self {
            op,
            left_prec: None,
            lhs,
            rhs,
            init_res: MultiVec::zeros(n, 0),
            init_prec_res: MultiVec::zeros(n, 0),
            ls_index: Vec::new(),
            cur_lhs: MultiVec::zeros(n, 0),
            cur_rhs: MultiVec::zeros(n, 0),
            cur_init_res: MultiVec::zeros(n, 0),
            is_set: false,
        })
    }

    pub fn with_left_prec(mut self, pc: Arc<dyn Preconditioner<T>>) -> Self {
        self.left_prec = Some(pc);
        self.is_set = false;
        self
    }

    /// Compute the initial residuals `R0 = B - A X` and `M R0`; marks the problem ready.
    pub fn set_problem(&mut self) -> Result<(), KError> {
        let mut ax = MultiVec::zeros(self.rhs.nrows(), self.lhs.ncols());
        self.apply_op(&self.lhs, &mut ax)?;
        let mut r0 = self.rhs.clone();
        r0.axpy(-T::one(), &ax)?;
        let mut pr0 = MultiVec::zeros(r0.nrows(), r0.ncols());
        self.apply_left_prec(&r0, &mut pr0)?;
        self.init_res = r0;
        self.init_prec_res = pr0;
        self.ls_index.clear();
        self.cur_lhs = MultiVec::zeros(self.lhs.nrows(), 0);
        self.cur_rhs = MultiVec::zeros(self.rhs.nrows(), 0);
        self.cur_init_res = MultiVec::zeros(self.rhs.nrows(), 0);
        self.is_set = true;
        Ok(())
    }

    pub fn is_problem_set(&self) -> bool {
        self.is_set
    }

    pub fn operator(&self) -> &dyn Operator<T> {
        self.op.as_ref()
    }

    pub fn left_prec(&self) -> Option<&dyn Preconditioner<T>> {
        self.left_prec.as_deref()
    }

    pub fn rhs(&self) -> &MultiVec<T> {
        &self.rhs
    }

    pub fn lhs(&self) -> &MultiVec<T> {
        &self.lhs
    }

    pub fn lhs_mut(&mut self) -> &mut MultiVec<T> {
        &mut self.lhs
    }

    pub fn num_rhs(&self) -> usize {
        self.rhs.ncols()
    }

    /// Initial residual of every right-hand side.
    pub fn full_init_res(&self) -> &MultiVec<T> {
        &self.init_res
    }

    /// Left-preconditioned initial residual of every right-hand side.
    pub fn full_init_prec_res(&self) -> &MultiVec<T> {
        &self.init_prec_res
    }

    /// Narrow the current linear systems to the columns in `index`.
    pub fn set_ls_index(&mut self, index: &[isize]) -> Result<(), KError> {
        let num_rhs = self.num_rhs() as isize;
        for (k, &i) in index.iter().enumerate() {
            if i < -1 || i >= num_rhs {
                return Err(KError::InvalidParameter(format!(
                    "linear system index {i} outside [0, {num_rhs})"
                )));
            }
            if i >= 0 && index[..k].contains(&i) {
                return Err(KError::InvalidParameter(format!("duplicate linear system index {i}")));
            }
        }
        let n = self.rhs.nrows();
        let width = index.len();
        let mut cur_lhs = MultiVec::zeros(n, width);
        let mut cur_rhs = MultiVec::zeros(n, width);
        let mut cur_init_res = MultiVec::zeros(n, width);
        for (k, &i) in index.iter().enumerate() {
            if i >= 0 {
                let i = i as usize;
                cur_lhs.set_col(k, self.lhs.col(i));
                cur_rhs.set_col(k, self.rhs.col(i));
                cur_init_res.set_col(k, self.init_res.col(i));
            } else {
                // X = 0, so the residual of a placeholder is its right-hand side.
                let mut rng = StdRng::seed_from_u64(PLACEHOLDER_SEED ^ k as u64);
                for v in cur_rhs.col_mut(k).iter_mut() {
                    *v = T::from_f64_lossy(rng.gen_range(-1.0..1.0));
                }
                let placeholder = cur_rhs.col(k).to_vec();
                cur_init_res.set_col(k, &placeholder);
            }
        }
        self.ls_index = index.to_vec();
        self.cur_lhs = cur_lhs;
        self.cur_rhs = cur_rhs;
        self.cur_init_res = cur_init_res;
        Ok(())
    }

    pub fn ls_index(&self) -> &[isize] {
        &self.ls_index
    }

    /// Initial residual of the current linear systems.
    pub fn init_res_vec(&self) -> &MultiVec<T> {
        &self.cur_init_res
    }

    pub fn cur_lhs(&self) -> &MultiVec<T> {
        &self.cur_lhs
    }

    pub fn cur_lhs_mut(&mut self) -> &mut MultiVec<T> {
        &mut self.cur_lhs
    }

    pub fn cur_rhs(&self) -> &MultiVec<T> {
        &self.cur_rhs
    }

    /// Write the current solution columns back into `X`. Placeholders are dropped.
    pub fn set_curr_ls(&mut self) {
        for (k, &i) in self.ls_index.iter().enumerate() {
            if i >= 0 && k < self.cur_lhs.ncols() {
                self.lhs.set_col(i as usize, self.cur_lhs.col(k));
            }
        }
    }

    /// `y = A x`. An operator that hands back a block of the wrong shape is
    /// reported as [`KError::OperatorError`].
    pub fn apply_op(&self, x: &MultiVec<T>, y: &mut MultiVec<T>) -> Result<(), KError> {
        self.op.apply(x, y)?;
        check_output("operator", y, self.op.nrows(), x.ncols())
    }

    /// `z = M⁻¹ r`, or a copy of `r` without a left preconditioner.
    pub fn apply_left_prec(&self, r: &MultiVec<T>, z: &mut MultiVec<T>) -> Result<(), KError> {
        match &self.left_prec {
            Some(pc) => {
                pc.apply(r, z)?;
                check_output("preconditioner", z, r.nrows(), r.ncols())
            }
            None => {
                z.assign(r);
                Ok(())
            }
        }
    }
}

fn check_output<T: Scalar>(what: &str, y: &MultiVec<T>, nrows: usize, ncols: usize) -> Result<(), KError> {
    if y.nrows() != nrows || y.ncols() != ncols {
        return Err(KError::OperatorError(format!(
            "{what} returned a {}x{} block, expected {nrows}x{ncols}",
            y.nrows(),
            y.ncols()
        )));
    }
    Ok(())
}
