//! Stopping criteria checked by the iteration kernels.
//!
//! A kernel hands each test an [`IterationView`] of its current state; tests
//! return a [`Status`] and keep whatever they need for later reporting.

use crate::core::multivec::MultiVec;
use crate::core::scalar::Scalar;
use crate::parallel::Comm;
use crate::problem::LinearProblem;
use crate::utils::output::{MsgType, OutputManager};

pub mod combo;
pub mod max_iters;
pub mod res_norm;

pub use combo::CombinedStatusTest;
pub use max_iters::MaxItersTest;
pub use res_norm::ConvergenceTest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Not checked since the last reset.
    Undefined,
    Passed,
    Failed,
    /// A residual norm or test value was NaN or infinite.
    NonFinite,
}

/// What a kernel exposes to the status tests at a check.
pub struct IterationView<'a, T> {
    pub num_iters: usize,
    /// Native residuals of the current columns.
    pub residuals: &'a MultiVec<T>,
    /// Residual two-norms the kernel already reduced alongside its own dot products.
    pub residual_norms: Option<&'a [T]>,
    pub problem: &'a LinearProblem<T>,
    pub comm: &'a dyn Comm,
}

pub trait StatusTest<T: Scalar> {
    fn check_status(&mut self, view: &IterationView<'_, T>) -> Status;

    /// Result of the last check.
    fn status(&self) -> Status;

    /// Forget everything learned since construction.
    fn reset(&mut self);

    /// Report the last check as messages of class `kind`.
    fn print(&self, out: &OutputManager, kind: MsgType);
}
