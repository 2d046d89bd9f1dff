use super::{IterationView, Status, StatusTest};
use crate::core::scalar::Scalar;
use crate::utils::output::{MsgType, OutputManager};

/// Passes once the kernel's iteration count reaches the ceiling.
#[derive(Debug, Clone)]
pub struct MaxItersTest {
    max_iters: usize,
    num_iters: usize,
    status: Status,
}

impl MaxItersTest {
    pub fn new(max_iters: usize) -> Self {
        Self { max_iters, num_iters: 0, status: Status::Undefined }
    }

    pub fn max_iters(&self) -> usize {
        self.max_iters
    }

    pub fn set_max_iters(&mut self, max_iters: usize) {
        self.max_iters = max_iters;
    }

    /// Iteration count seen at the last check.
    pub fn num_iters(&self) -> usize {
        self.num_iters
    }
}

impl<T: Scalar> StatusTest<T> for MaxItersTest {
    fn check_status(&mut self, view: &IterationView<'_, T>) -> Status {
        self.num_iters = view.num_iters;
        self.status = if self.num_iters >= self.max_iters { Status::Passed } else { Status::Failed };
        self.status
    }

    fn status(&self) -> Status {
        self.status
    }

    fn reset(&mut self) {
        self.num_iters = 0;
        self.status = Status::Undefined;
    }

    fn print(&self, out: &OutputManager, kind: MsgType) {
        out.emit(
            kind,
            format_args!("Number of Iterations = {} {} {}", self.num_iters, if self.num_iters < self.max_iters { "<" } else { "==" }, self.max_iters),
        );
    }
}
