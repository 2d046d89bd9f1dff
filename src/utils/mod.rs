//! Convergence records and output routing.

pub mod convergence;
pub mod output;

pub use convergence::{BlockExit, BlockTrace, ReturnType, SolveReport};
pub use output::{MsgType, OutputManager};
