//! Per-call convergence records.

/// Outcome of a `solve()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnType {
    Converged,
    Unconverged,
}

/// How a block left the inner loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockExit {
    /// Every active column passed the convergence test.
    Converged,
    /// The iteration ceiling was reached first.
    MaxIterations,
    /// A non-finite value stopped the whole call.
    NumericalFailure,
}

/// What happened to one outer block.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockTrace {
    /// Original column indices of the block, `-1` for placeholder slots.
    pub indices: Vec<isize>,
    /// Active original indices passed to each kernel initialization, in order.
    /// The first entry is the block start; each later one is a deflation step.
    pub initializations: Vec<Vec<isize>>,
    /// Kernel iterations spent on the block.
    pub iterations: usize,
    pub exit: BlockExit,
}

impl BlockTrace {
    pub(crate) fn new(indices: Vec<isize>) -> Self {
        Self { indices, initializations: Vec::new(), iterations: 0, exit: BlockExit::Converged }
    }

    /// Number of real (non-placeholder) columns in the block.
    pub fn num_real(&self) -> usize {
        self.indices.iter().filter(|&&i| i >= 0).count()
    }

    /// Number of deflation steps taken inside the block.
    pub fn deflations(&self) -> usize {
        self.initializations.len().saturating_sub(1)
    }

    /// Active-set size at each (re-)initialization.
    pub fn active_sizes(&self) -> Vec<usize> {
        self.initializations.iter().map(|init| init.len()).collect()
    }
}

/// Statistics of the last `solve()` call.
#[derive(Clone, Debug, PartialEq)]
pub struct SolveReport<T> {
    pub status: ReturnType,
    /// Iteration count reported by the maximum-iterations test.
    pub iterations: usize,
    /// Worst relative residual among all processed right-hand sides.
    pub achieved_tol: T,
    pub blocks: Vec<BlockTrace>,
}

impl<T> SolveReport<T> {
    pub fn converged(&self) -> bool {
        self.status == ReturnType::Converged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_counts_deflations_and_real_columns() {
        let mut trace = BlockTrace::new(vec![0, 1, 2, -1]);
        trace.initializations.push(vec![0, 1, 2, -1]);
        trace.initializations.push(vec![0, 2]);
        assert_eq!(trace.num_real(), 3);
        assert_eq!(trace.deflations(), 1);
        assert_eq!(trace.active_sizes(), vec![4, 2]);
    }
}
