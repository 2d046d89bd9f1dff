//! CG iteration kernels and the block solver manager.
//!
//! Three kernels implement [`CgIteration`]: standard preconditioned CG, the
//! single-reduction (Chronopoulos–Gear) variant and O'Leary's block CG.
//! [`IterationKernel`] is the tagged variant the manager drives; which one is
//! used for a block is decided by [`select_kernel`].

use crate::config::SolverOptions;
use crate::core::multivec::MultiVec;
use crate::core::scalar::Scalar;
use crate::error::KError;
use crate::ortho::MatOrthoManager;
use crate::parallel::Comm;
use crate::problem::LinearProblem;
use crate::status::{CombinedStatusTest, IterationView, Status, StatusTest};
use crate::utils::output::OutputManager;

pub mod block_cg;
pub mod cg;
pub mod cg_single_red;
pub mod manager;
pub mod partition;
pub mod state;

pub use block_cg::BlockCgIter;
pub use cg::CgIter;
pub use cg_single_red::CgSingleRedIter;
pub use manager::{BlockCgSolMgr, OptionsDiff};
pub use state::SolverState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelKind {
    Cg,
    SingleReduction,
    Block,
}

/// Kernel for a block of `block_size` columns.
pub fn select_kernel(block_size: usize, use_single_reduction: bool) -> KernelKind {
    match (block_size, use_single_reduction) {
        (1, true) => KernelKind::SingleReduction,
        (1, false) => KernelKind::Cg,
        _ => KernelKind::Block,
    }
}

/// How `iterate` returned control to the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterateOutcome {
    /// The combined status test passed.
    StatusPassed,
    /// A recurrence coefficient or residual norm became NaN or infinite.
    NumericalFailure,
}

/// Everything a kernel borrows from the manager for one call.
pub struct IterContext<'a, T> {
    pub problem: &'a mut LinearProblem<T>,
    pub tests: &'a mut CombinedStatusTest<T>,
    pub ortho: &'a dyn MatOrthoManager<T>,
    pub comm: &'a dyn Comm,
    pub out: &'a OutputManager,
}

pub trait CgIteration<T: Scalar> {
    fn kind(&self) -> KernelKind;

    /// Seed `state` from the initial residual block of the current columns.
    fn initialize(&mut self, state: &mut SolverState<T>, ctx: &mut IterContext<'_, T>, init_res: &MultiVec<T>) -> Result<(), KError>;

    /// Iterate until the combined status test passes.
    fn iterate(&mut self, state: &mut SolverState<T>, ctx: &mut IterContext<'_, T>) -> Result<IterateOutcome, KError>;

    fn block_size(&self) -> usize;

    fn set_block_size(&mut self, block_size: usize) -> Result<(), KError>;

    fn num_iters(&self) -> usize;

    fn reset_num_iters(&mut self);
}

pub enum IterationKernel {
    Cg(CgIter),
    SingleReduction(CgSingleRedIter),
    Block(BlockCgIter),
}

impl IterationKernel {
    /// Build the kernel `select_kernel` picks for `block_size`.
    pub fn for_block<T: Scalar>(block_size: usize, options: &SolverOptions<T>) -> Self {
        let assert_pd = options.assert_positive_definiteness;
        let fold = options.fold_convergence_detection_into_allreduce;
        match select_kernel(block_size, options.use_single_reduction) {
            KernelKind::Cg => IterationKernel::Cg(CgIter::new(assert_pd, fold)),
            KernelKind::SingleReduction => IterationKernel::SingleReduction(CgSingleRedIter::new(assert_pd, fold)),
            KernelKind::Block => IterationKernel::Block(BlockCgIter::new(block_size, assert_pd)),
        }
    }

    fn as_dyn<T: Scalar>(&mut self) -> &mut dyn CgIteration<T> {
        match self {
            IterationKernel::Cg(k) => k,
            IterationKernel::SingleReduction(k) => k,
            IterationKernel::Block(k) => k,
        }
    }

    fn as_dyn_ref<T: Scalar>(&self) -> &dyn CgIteration<T> {
        match self {
            IterationKernel::Cg(k) => k,
            IterationKernel::SingleReduction(k) => k,
            IterationKernel::Block(k) => k,
        }
    }
}

impl<T: Scalar> CgIteration<T> for IterationKernel {
    fn kind(&self) -> KernelKind {
        match self {
            IterationKernel::Cg(_) => KernelKind::Cg,
            IterationKernel::SingleReduction(_) => KernelKind::SingleReduction,
            IterationKernel::Block(_) => KernelKind::Block,
        }
    }

    fn initialize(&mut self, state: &mut SolverState<T>, ctx: &mut IterContext<'_, T>, init_res: &MultiVec<T>) -> Result<(), KError> {
        self.as_dyn::<T>().initialize(state, ctx, init_res)
    }

    fn iterate(&mut self, state: &mut SolverState<T>, ctx: &mut IterContext<'_, T>) -> Result<IterateOutcome, KError> {
        self.as_dyn::<T>().iterate(state, ctx)
    }

    fn block_size(&self) -> usize {
        self.as_dyn_ref::<T>().block_size()
    }

    fn set_block_size(&mut self, block_size: usize) -> Result<(), KError> {
        self.as_dyn::<T>().set_block_size(block_size)
    }

    fn num_iters(&self) -> usize {
        self.as_dyn_ref::<T>().num_iters()
    }

    fn reset_num_iters(&mut self) {
        self.as_dyn::<T>().reset_num_iters()
    }
}

/// Run the combined status test on the kernel's current residuals.
pub(crate) fn check_status<T: Scalar>(
    ctx: &mut IterContext<'_, T>,
    num_iters: usize,
    residuals: &MultiVec<T>,
    residual_norms: Option<&[T]>,
) -> Status {
    let view = IterationView { num_iters, residuals, residual_norms, problem: &*ctx.problem, comm: ctx.comm };
    ctx.tests.check_status(&view)
}

/// True when any entry is NaN or infinite.
pub(crate) fn any_non_finite<T: Scalar>(vals: impl IntoIterator<Item = T>) -> bool {
    vals.into_iter().any(|v| !v.is_finite())
}


#[cfg(test)]
pub(crate) mod testing {
    //! Drives a single kernel outside the manager.

    use super::*;
    use crate::config::{NormType, OrthoType, ScaleType};
    use crate::core::traits::Operator;
    use crate::matrix::laplacian_1d;
    use crate::ortho::make_ortho_manager;
    use crate::parallel::testing::CountingComm;
    use crate::status::{ConvergenceTest, MaxItersTest};
    use crate::utils::output::{MsgType, OutputManager};
    use faer::Mat;
    use std::sync::Arc;

    pub struct Harness {
        pub problem: LinearProblem<f64>,
        pub tests: CombinedStatusTest<f64>,
        pub ortho: Box<dyn MatOrthoManager<f64>>,
        pub comm: CountingComm,
        pub out: OutputManager,
        state: Option<SolverState<f64>>,
        start_rounds: usize,
        iters: usize,
    }

    impl Harness {
        pub fn with_operator(op: Arc<dyn Operator<f64>>, b: MultiVec<f64>, tol: f64) -> Self {
            let x = MultiVec::zeros(b.nrows(), b.ncols());
            let m = b.ncols() as isize;
            let mut problem = LinearProblem::new(op, x, b).unwrap();
            problem.set_problem().unwrap();
            problem.set_ls_index(&(0..m).collect::<Vec<_>>()).unwrap();
            let out = OutputManager::new(MsgType::ERRORS, "test");
            let tests = CombinedStatusTest::new(
                MaxItersTest::new(500),
                ConvergenceTest::new(tol, NormType::TwoNorm, ScaleType::NormOfInitRes),
                out.clone(),
            );
            Self {
                problem,
                tests,
                ortho: make_ortho_manager(OrthoType::Icgs, -1.0),
                comm: CountingComm::default(),
                out,
                state: None,
                start_rounds: 0,
                iters: 0,
            }
        }

        pub fn dense<const N: usize>(a: &[[f64; N]; N], b: &[Vec<f64>], tol: f64) -> Self {
            let a = Mat::from_fn(N, N, |i, j| a[i][j]);
            Self::with_operator(Arc::new(a), MultiVec::from_columns(b).unwrap(), tol)
        }

        pub fn laplacian(n: usize, m: usize, tol: f64) -> Self {
            let b = MultiVec::from_fn(n, m, |i, j| ((i * 7 + j * 11) % 13) as f64 - 6.0);
            Self::with_rhs(n, b, tol)
        }

        pub fn with_rhs(n: usize, b: MultiVec<f64>, tol: f64) -> Self {
            Self::with_operator(Arc::new(laplacian_1d::<f64>(n)), b, tol)
        }

        pub fn try_run<K: CgIteration<f64>>(&mut self, k: &mut K, kind: KernelKind) -> Result<IterateOutcome, KError> {
            let mut state = SolverState::fresh(kind, self.problem.rhs().nrows());
            let init = self.problem.init_res_vec().clone();
            let mut ctx = IterContext {
                problem: &mut self.problem,
                tests: &mut self.tests,
                ortho: self.ortho.as_ref(),
                comm: &self.comm,
                out: &self.out,
            };
            k.initialize(&mut state, &mut ctx, &init)?;
            self.start_rounds = self.comm.rounds();
            let outcome = k.iterate(&mut state, &mut ctx)?;
            self.iters = k.num_iters();
            self.state = Some(state);
            Ok(outcome)
        }

        pub fn run<K: CgIteration<f64>>(&mut self, k: &mut K, kind: KernelKind) -> IterateOutcome {
            self.try_run(k, kind).unwrap()
        }

        pub fn run_more<K: CgIteration<f64>>(&mut self, k: &mut K) -> IterateOutcome {
            let mut state = self.state.take().unwrap();
            let mut ctx = IterContext {
                problem: &mut self.problem,
                tests: &mut self.tests,
                ortho: self.ortho.as_ref(),
                comm: &self.comm,
                out: &self.out,
            };
            let outcome = k.iterate(&mut state, &mut ctx).unwrap();
            self.iters = k.num_iters();
            self.state = Some(state);
            outcome
        }

        /// Drop the columns that passed at the last check and re-initialize
        /// on the rest. Returns the number of columns left.
        pub fn deflate<K: CgIteration<f64>>(&mut self, k: &mut K) -> usize {
            let conv = self.tests.conv_test().conv_indices().to_vec();
            let current = self.problem.ls_index().to_vec();
            let keep: Vec<usize> = (0..current.len()).filter(|&p| !conv.contains(&current[p])).collect();
            self.problem.set_curr_ls();
            if keep.is_empty() || keep.len() == current.len() {
                return keep.len();
            }
            let mut state = self.state.take().unwrap();
            let init = state.residuals().select(&keep);
            let idx: Vec<isize> = keep.iter().map(|&p| current[p]).collect();
            self.problem.set_ls_index(&idx).unwrap();
            k.set_block_size(keep.len()).unwrap();
            let mut ctx = IterContext {
                problem: &mut self.problem,
                tests: &mut self.tests,
                ortho: self.ortho.as_ref(),
                comm: &self.comm,
                out: &self.out,
            };
            k.initialize(&mut state, &mut ctx, &init).unwrap();
            self.state = Some(state);
            keep.len()
        }

        /// Reduction rounds per iteration of the last `run`, amortized.
        pub fn rounds_per_iteration(&self) -> usize {
            (self.comm.rounds() - self.start_rounds) / self.iters.max(1)
        }

        /// Every column of `X` satisfies `‖B − AX‖ ≤ tol ‖B‖`.
        pub fn assert_solution_accurate(&mut self, tol: f64) {
            self.problem.set_curr_ls();
            let x = self.problem.lhs().clone();
            let mut ax = MultiVec::zeros(x.nrows(), x.ncols());
            self.problem.apply_op(&x, &mut ax).unwrap();
            let b = self.problem.rhs();
            for j in 0..b.ncols() {
                let r: f64 = ax.col(j).iter().zip(b.col(j)).map(|(a, b)| (b - a) * (b - a)).sum::<f64>().sqrt();
                let bn: f64 = b.col(j).iter().map(|v| v * v).sum::<f64>().sqrt();
                assert!(r <= tol * bn, "column {j}: residual {r:e} vs rhs {bn:e}");
            }
        }

        /// Problem whose operator maps every non-zero column to NaN. With
        /// `X0 = 0` the initial residual is finite and the first product
        /// inside the recurrence is not.
        pub fn nan_after_start(n: usize, m: usize) -> Self {
            let b = MultiVec::from_fn(n, m, |i, j| 1.0 + (i * (j + 2)) as f64 / n as f64);
            Self::with_operator(Arc::new(NanOnNonzero(n)), b, 1e-9)
        }
    }

    pub struct NanOnNonzero(pub usize);

    impl Operator<f64> for NanOnNonzero {
        fn nrows(&self) -> usize {
            self.0
        }
        fn ncols(&self) -> usize {
            self.0
        }
        fn apply(&self, x: &MultiVec<f64>, y: &mut MultiVec<f64>) -> Result<(), KError> {
            *y = MultiVec::from_fn(self.0, x.ncols(), |_, j| {
                if x.col(j).iter().all(|&v| v == 0.0) { 0.0 } else { f64::NAN }
            });
            Ok(())
        }
    }
}
