//! Block CG solver manager.
//!
//! `BlockCgSolMgr` splits the right-hand sides into outer blocks, picks a
//! kernel per block and drives it until every column of the block has
//! converged or the iteration ceiling is hit. Columns that converge early are
//! dropped from the block (deflation) and the kernel continues on the rest
//! without reordering them.

use super::partition::BlockPartition;
use super::state::SolverState;
use super::{CgIteration, IterContext, IterateOutcome, IterationKernel};
use crate::config::{OrthoType, ParameterList, SolverOptions};
use crate::core::scalar::Scalar;
use crate::error::KError;
use crate::ortho::{MatOrthoManager, make_ortho_manager};
use crate::parallel::{Comm, SerialComm};
use crate::problem::LinearProblem;
use crate::status::{CombinedStatusTest, ConvergenceTest, MaxItersTest, Status, StatusTest};
use crate::utils::convergence::{BlockExit, BlockTrace, ReturnType, SolveReport};
use crate::utils::output::{MsgType, OutputManager};
use std::sync::Arc;
use std::time::Instant;

/// Which collaborators a configuration change touches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptionsDiff {
    /// Orthogonalization kind changed: build a new orthogonalizer.
    pub rebuild_ortho: bool,
    /// Only the DGKS constant changed to a positive value: set it in place.
    pub update_dep_tol: bool,
    /// Residual norm or scaling changed: build new convergence and combined tests.
    pub rebuild_conv_test: bool,
    /// Convergence tolerance changed: set it on the existing convergence test.
    pub update_tolerance: bool,
    /// "Show Maximum Residual Norm Only" changed: set it in place.
    pub update_show_max: bool,
    /// Iteration ceiling changed: set it on the existing maximum-iterations test.
    pub update_max_iters: bool,
    /// Verbosity, output frequency or label changed.
    pub update_output: bool,
}

impl OptionsDiff {
    pub fn between<T: Scalar>(old: &SolverOptions<T>, new: &SolverOptions<T>) -> Self {
        let rebuild_ortho = old.ortho_type != new.ortho_type;
        Self {
            rebuild_ortho,
            update_dep_tol: !rebuild_ortho
                && new.ortho_type == OrthoType::Dgks
                && old.ortho_kappa != new.ortho_kappa
                && new.ortho_kappa > T::zero(),
            rebuild_conv_test: old.res_norm != new.res_norm || old.res_scale != new.res_scale,
            update_tolerance: old.conv_tol != new.conv_tol,
            update_show_max: old.show_max_res_norm_only != new.show_max_res_norm_only,
            update_max_iters: old.max_iters != new.max_iters,
            update_output: old.verbosity != new.verbosity
                || old.output_frequency != new.output_frequency
                || old.label != new.label,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// What the manager does after `iterate` returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum InnerStep {
    BlockConverged,
    /// Keep the columns at these positions of the active set, in order.
    Deflate(Vec<usize>),
    MaxIterations,
    NumericalFailure,
}

/// Decide the next inner-loop step from the kernel outcome and the status tests.
pub(crate) fn classify(
    outcome: IterateOutcome,
    conv_passed: bool,
    conv_indices: &[isize],
    active: &[isize],
    max_passed: bool,
) -> Result<InnerStep, KError> {
    if outcome == IterateOutcome::NumericalFailure {
        return Ok(InnerStep::NumericalFailure);
    }
    if conv_passed {
        let keep: Vec<usize> = (0..active.len()).filter(|&k| !conv_indices.contains(&active[k])).collect();
        return Ok(if keep.is_empty() { InnerStep::BlockConverged } else { InnerStep::Deflate(keep) });
    }
    if max_passed {
        return Ok(InnerStep::MaxIterations);
    }
    Err(KError::InternalConsistency(
        "iterate() returned but neither the convergence test nor the iteration ceiling passed".into(),
    ))
}

fn logged(out: &OutputManager, call: &str, iters: usize, e: KError) -> KError {
    out.emit(MsgType::ERRORS, format_args!("error in {call} at iteration {iters}: {e}"));
    e
}

fn build_tests<T: Scalar>(options: &SolverOptions<T>, out: &OutputManager) -> CombinedStatusTest<T> {
    let mut conv = ConvergenceTest::new(options.conv_tol, options.res_norm, options.res_scale);
    conv.set_show_max_res_norm_only(options.show_max_res_norm_only);
    CombinedStatusTest::new(MaxItersTest::new(options.max_iters), conv, out.clone())
        .with_output_frequency(options.output_frequency)
}

pub struct BlockCgSolMgr<T: Scalar> {
    options: SolverOptions<T>,
    comm: Arc<dyn Comm>,
    out: OutputManager,
    ortho: Box<dyn MatOrthoManager<T>>,
    tests: CombinedStatusTest<T>,
    state: Option<SolverState<T>>,
    num_iters: usize,
    achieved_tol: T,
    last_report: Option<SolveReport<T>>,
}

impl<T: Scalar> BlockCgSolMgr<T> {
    pub fn new(options: SolverOptions<T>) -> Result<Self, KError> {
        options.validate()?;
        let out = OutputManager::new(options.verbosity, options.label.clone());
        let tests = build_tests(&options, &out);
        let ortho = make_ortho_manager(options.ortho_type, options.ortho_kappa);
        Ok(Self {
            options,
            comm: Arc::new(SerialComm),
            out,
            ortho,
            tests,
            state: None,
            num_iters: 0,
            achieved_tol: T::zero(),
            last_report: None,
        })
    }

    /// Manager configured from a parameter list.
    pub fn from_params(params: &ParameterList) -> Result<Self, KError> {
        Self::new(SolverOptions::from_params(params)?)
    }

    pub fn with_comm(mut self, comm: Arc<dyn Comm>) -> Self {
        self.comm = comm;
        self
    }

    pub fn options(&self) -> &SolverOptions<T> {
        &self.options
    }

    /// Switch to `new`, rebuilding only what the change affects.
    pub fn set_options(&mut self, new: SolverOptions<T>) -> Result<OptionsDiff, KError> {
        new.validate()?;
        let diff = OptionsDiff::between(&self.options, &new);
        if diff.update_output {
            self.out.set_verbosity(new.verbosity);
            self.out.set_label(new.label.clone());
            self.tests.set_output(self.out.clone());
            self.tests.set_output_frequency(new.output_frequency);
        }
        if diff.rebuild_ortho {
            self.ortho = make_ortho_manager(new.ortho_type, new.ortho_kappa);
        } else if diff.update_dep_tol {
            self.ortho.set_dep_tol(new.ortho_kappa);
        }
        if diff.rebuild_conv_test {
            self.tests = build_tests(&new, &self.out);
        } else {
            if diff.update_tolerance {
                self.tests.conv_test_mut().set_tolerance(new.conv_tol);
            }
            if diff.update_show_max {
                self.tests.conv_test_mut().set_show_max_res_norm_only(new.show_max_res_norm_only);
            }
            if diff.update_max_iters {
                self.tests.max_iters_test_mut().set_max_iters(new.max_iters);
            }
        }
        self.options = new;
        Ok(diff)
    }

    /// Apply the entries of `params` on top of the current options.
    pub fn set_parameters(&mut self, params: &ParameterList) -> Result<OptionsDiff, KError> {
        let new = self.options.apply_params(params)?;
        self.set_options(new)
    }

    pub fn ortho_manager(&self) -> &dyn MatOrthoManager<T> {
        self.ortho.as_ref()
    }

    pub fn status_test(&self) -> &CombinedStatusTest<T> {
        &self.tests
    }

    /// Iterations reported by the ceiling test at the end of the last solve.
    pub fn num_iters(&self) -> usize {
        self.num_iters
    }

    /// Worst relative residual of the last solve.
    pub fn achieved_tol(&self) -> T {
        self.achieved_tol
    }

    pub fn last_report(&self) -> Option<&SolveReport<T>> {
        self.last_report.as_ref()
    }

    pub fn description(&self) -> String {
        format!(
            "BlockCgSolMgr<{}>{{Ortho Type='{}', Block Size={}}}",
            std::any::type_name::<T>(),
            self.options.ortho_type,
            self.options.block_size
        )
    }

    /// Solve every right-hand side of `problem`, writing the solutions into its `X`.
    pub fn solve(&mut self, problem: &mut LinearProblem<T>) -> Result<ReturnType, KError> {
        if !problem.is_problem_set() {
            self.out.emit(MsgType::ERRORS, format_args!("linear problem is not ready, set_problem() has not been called"));
            return Err(KError::ProblemNotSet);
        }
        let started = Instant::now();
        let num_rhs = problem.num_rhs();
        self.tests.reset();
        self.num_iters = 0;
        self.achieved_tol = T::zero();
        self.last_report = None;

        let mut blocks = Vec::new();
        let mut converged = true;
        let partition = BlockPartition::new(num_rhs, self.options.block_size, self.options.adaptive_block_size);
        for indices in partition {
            let mut trace = BlockTrace::new(indices);
            let exit = self.solve_block(problem, &mut trace)?;
            trace.exit = exit;
            blocks.push(trace);
            match exit {
                BlockExit::Converged => {}
                BlockExit::MaxIterations => converged = false,
                BlockExit::NumericalFailure => {
                    problem.lhs_mut().fill(T::zero());
                    self.out.emit(MsgType::WARNINGS, format_args!("non-finite value detected, solution zeroed"));
                    self.num_iters = self.tests.max_iters_test().num_iters();
                    self.achieved_tol = T::one();
                    self.last_report = Some(SolveReport {
                        status: ReturnType::Unconverged,
                        iterations: self.num_iters,
                        achieved_tol: self.achieved_tol,
                        blocks,
                    });
                    return Ok(ReturnType::Unconverged);
                }
            }
        }

        if num_rhs > 0 {
            self.tests.print_summary();
        }
        self.out.emit(MsgType::TIMING_DETAILS, format_args!("solve time: {:?}", started.elapsed()));

        self.num_iters = self.tests.max_iters_test().num_iters();
        self.achieved_tol = self.tests.conv_test().max_test_value();
        let status = if converged { ReturnType::Converged } else { ReturnType::Unconverged };
        self.last_report = Some(SolveReport {
            status,
            iterations: self.num_iters,
            achieved_tol: self.achieved_tol,
            blocks,
        });
        Ok(status)
    }

    fn solve_block(&mut self, problem: &mut LinearProblem<T>, trace: &mut BlockTrace) -> Result<BlockExit, KError> {
        let Self { options, comm, out, ortho, tests, state, .. } = self;
        let out: &OutputManager = out;
        let nrows = problem.rhs().nrows();
        let width = trace.indices.len();

        problem.set_ls_index(&trace.indices)?;
        let mut kernel = IterationKernel::for_block(width, options);
        let kind = CgIteration::<T>::kind(&kernel);
        let state = state.get_or_insert_with(|| SolverState::fresh(kind, nrows));
        if state.ensure(kind, nrows) {
            out.emit(MsgType::DEBUG, format_args!("solver state re-created for {kind:?} kernel"));
        }
        state.forget_history();
        CgIteration::<T>::reset_num_iters(&mut kernel);
        tests.reset_num_calls();

        // Real columns are a prefix of the block; placeholders never converge
        // and are dropped at the first deflation.
        let mut active: Vec<isize> = trace.indices.iter().copied().filter(|&i| i >= 0).collect();
        trace.initializations.push(trace.indices.clone());
        let init = problem.init_res_vec().clone();
        kernel
            .initialize(
                state,
                &mut IterContext { problem: &mut *problem, tests: &mut *tests, ortho: ortho.as_ref(), comm: comm.as_ref(), out },
                &init,
            )
            .map_err(|e| logged(out, "initialize()", 0, e))?;

        let exit = loop {
            let outcome = kernel.iterate(
                state,
                &mut IterContext { problem: &mut *problem, tests: &mut *tests, ortho: ortho.as_ref(), comm: comm.as_ref(), out },
            );
            let iters = CgIteration::<T>::num_iters(&kernel);
            let outcome = outcome.map_err(|e| logged(out, "iterate()", iters, e))?;
            let step = classify(
                outcome,
                tests.conv_test().status() == Status::Passed,
                tests.conv_test().conv_indices(),
                &active,
                StatusTest::<T>::status(tests.max_iters_test()) == Status::Passed,
            )
            .map_err(|e| logged(out, "iterate()", iters, e))?;
            match step {
                InnerStep::BlockConverged => break BlockExit::Converged,
                InnerStep::MaxIterations => break BlockExit::MaxIterations,
                InnerStep::NumericalFailure => break BlockExit::NumericalFailure,
                InnerStep::Deflate(keep) => {
                    problem.set_curr_ls();
                    let init = state.residuals().select(&keep);
                    active = keep.iter().map(|&k| active[k]).collect();
                    out.emit(
                        MsgType::ITERATION_DETAILS,
                        format_args!("iteration {iters}: deflating to {} column(s) {:?}", active.len(), active),
                    );
                    problem.set_ls_index(&active).map_err(|e| logged(out, "set_ls_index()", iters, e))?;
                    CgIteration::<T>::set_block_size(&mut kernel, active.len()).map_err(|e| logged(out, "set_block_size()", iters, e))?;
                    kernel
                        .initialize(
                            state,
                            &mut IterContext {
                                problem: &mut *problem,
                                tests: &mut *tests,
                                ortho: ortho.as_ref(),
                                comm: comm.as_ref(),
                                out,
                            },
                            &init,
                        )
                        .map_err(|e| logged(out, "initialize()", iters, e))?;
                    trace.initializations.push(active.clone());
                }
            }
        };
        if exit != BlockExit::NumericalFailure {
            problem.set_curr_ls();
        }
        trace.iterations = CgIteration::<T>::num_iters(&kernel);
        Ok(exit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NormType, ScaleType};

    #[test]
    fn classify_covers_every_exit() {
        let active = [4, 5, 6];
        assert_eq!(
            classify(IterateOutcome::StatusPassed, true, &[5], &active, false).unwrap(),
            InnerStep::Deflate(vec![0, 2])
        );
        assert_eq!(
            classify(IterateOutcome::StatusPassed, true, &[6, 4, 5], &active, true).unwrap(),
            InnerStep::BlockConverged
        );
        assert_eq!(
            classify(IterateOutcome::StatusPassed, false, &[], &active, true).unwrap(),
            InnerStep::MaxIterations
        );
        assert_eq!(
            classify(IterateOutcome::NumericalFailure, false, &[], &active, false).unwrap(),
            InnerStep::NumericalFailure
        );
        assert!(matches!(
            classify(IterateOutcome::StatusPassed, false, &[], &active, false),
            Err(KError::InternalConsistency(_))
        ));
    }

    #[test]
    fn diff_rebuilds_only_dependent_collaborators() {
        let old = SolverOptions::<f64>::default();
        assert!(OptionsDiff::between(&old, &old).is_empty());

        let tol_only = old.clone().with_tol(1e-4);
        let d = OptionsDiff::between(&old, &tol_only);
        assert!(d.update_tolerance && !d.rebuild_conv_test && !d.rebuild_ortho);

        let scale = old.clone().with_res_scale(ScaleType::None);
        assert!(OptionsDiff::between(&old, &scale).rebuild_conv_test);
        let norm = old.clone().with_res_norm(NormType::InfNorm);
        assert!(OptionsDiff::between(&old, &norm).rebuild_conv_test);

        let dgks = old.clone().with_ortho(OrthoType::Dgks);
        let d = OptionsDiff::between(&old, &dgks);
        assert!(d.rebuild_ortho && !d.update_dep_tol);
        let kappa = dgks.clone().with_ortho_kappa(0.3);
        let d = OptionsDiff::between(&dgks, &kappa);
        assert!(d.update_dep_tol && !d.rebuild_ortho);
        let bad_kappa = dgks.clone().with_ortho_kappa(-2.0);
        assert!(OptionsDiff::between(&dgks, &bad_kappa).is_empty());
    }

    #[test]
    fn set_options_mutates_in_place_or_rebuilds() {
        let mut mgr = BlockCgSolMgr::<f64>::new(SolverOptions::default().with_ortho(OrthoType::Dgks)).unwrap();
        let diff = mgr.set_options(mgr.options().clone().with_ortho_kappa(0.25).with_max_iters(7)).unwrap();
        assert!(diff.update_dep_tol && diff.update_max_iters);
        assert_eq!(mgr.ortho_manager().dep_tol(), Some(0.25));
        assert_eq!(mgr.status_test().max_iters_test().max_iters(), 7);

        mgr.set_options(mgr.options().clone().with_ortho(OrthoType::Imgs)).unwrap();
        assert_eq!(mgr.ortho_manager().kind(), OrthoType::Imgs);

        mgr.set_options(mgr.options().clone().with_res_scale(ScaleType::None)).unwrap();
        assert_eq!(mgr.status_test().conv_test().scale_type(), ScaleType::None);
        assert_eq!(mgr.status_test().max_iters_test().max_iters(), 7);

        assert!(mgr.set_options(mgr.options().clone().with_block_size(0)).is_err());
        assert_eq!(mgr.options().block_size, 1);
    }

    #[test]
    fn description_names_ortho_and_block_size() {
        let mgr = BlockCgSolMgr::<f64>::new(SolverOptions::default().with_block_size(4)).unwrap();
        let d = mgr.description();
        assert!(d.contains("Ortho Type='ICGS'"));
        assert!(d.contains("Block Size=4"));
    }
}
