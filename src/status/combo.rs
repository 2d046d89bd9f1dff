//! OR-combination of the iteration ceiling and the convergence test.

use super::{ConvergenceTest, IterationView, MaxItersTest, Status, StatusTest};
use crate::core::scalar::Scalar;
use crate::utils::output::{MsgType, OutputManager};

/// Passes when either sub-test passes; a non-finite convergence value wins
/// over everything else.
///
/// Also throttles status output: with an output frequency `f`, the
/// sub-tests are printed every `f` checks and whenever the combination passes.
#[derive(Debug, Clone)]
pub struct CombinedStatusTest<T> {
    max_iters: MaxItersTest,
    conv: ConvergenceTest<T>,
    status: Status,
    num_calls: usize,
    output_frequency: Option<usize>,
    out: OutputManager,
}

impl<T: Scalar> CombinedStatusTest<T> {
    pub fn new(max_iters: MaxItersTest, conv: ConvergenceTest<T>, out: OutputManager) -> Self {
        Self { max_iters, conv, status: Status::Undefined, num_calls: 0, output_frequency: None, out }
    }

    pub fn with_output_frequency(mut self, freq: Option<usize>) -> Self {
        self.output_frequency = freq;
        self
    }

    pub fn set_output_frequency(&mut self, freq: Option<usize>) {
        self.output_frequency = freq;
    }

    pub fn set_output(&mut self, out: OutputManager) {
        self.out = out;
    }

    pub fn max_iters_test(&self) -> &MaxItersTest {
        &self.max_iters
    }

    pub fn max_iters_test_mut(&mut self) -> &mut MaxItersTest {
        &mut self.max_iters
    }

    pub fn conv_test(&self) -> &ConvergenceTest<T> {
        &self.conv
    }

    pub fn conv_test_mut(&mut self) -> &mut ConvergenceTest<T> {
        &mut self.conv
    }

    pub fn num_calls(&self) -> usize {
        self.num_calls
    }

    pub fn reset_num_calls(&mut self) {
        self.num_calls = 0;
    }

    /// Final convergence summary, emitted as `FINAL_SUMMARY`.
    pub fn print_summary(&self) {
        self.print(&self.out, MsgType::FINAL_SUMMARY);
    }
}

impl<T: Scalar> StatusTest<T> for CombinedStatusTest<T> {
    fn check_status(&mut self, view: &IterationView<'_, T>) -> Status {
        self.num_calls += 1;
        let max_status = self.max_iters.check_status(view);
        let conv_status = self.conv.check_status(view);
        self.status = match (max_status, conv_status) {
            (_, Status::NonFinite) => Status::NonFinite,
            (Status::Passed, _) | (_, Status::Passed) => Status::Passed,
            _ => Status::Failed,
        };
        let due = self.output_frequency.is_some_and(|f| self.num_calls % f == 0);
        if due || (self.output_frequency.is_some() && self.status == Status::Passed) {
            self.print(&self.out, MsgType::STATUS_TEST_DETAILS);
        }
        self.status
    }

    fn status(&self) -> Status {
        self.status
    }

    fn reset(&mut self) {
        StatusTest::<T>::reset(&mut self.max_iters);
        self.conv.reset();
        self.status = Status::Undefined;
        self.num_calls = 0;
    }

    fn print(&self, out: &OutputManager, kind: MsgType) {
        if !out.is_enabled(kind) {
            return;
        }
        StatusTest::<T>::print(&self.max_iters, out, kind);
        self.conv.print(out, kind);
    }
}
