//! blockcg: Block Conjugate Gradient solver manager over Faer
//!
//! Solves `A X = B` for symmetric positive definite `A` and many right-hand
//! sides. Right-hand sides are processed in blocks; columns that converge
//! early are deflated from the block while the rest keep iterating.

pub mod parallel;

pub mod config;
pub mod core;
pub mod error;
pub mod matrix;
pub mod ortho;
pub mod preconditioner;
pub mod problem;
pub mod solver;
pub mod status;
pub mod utils;

// Re-exports for convenience
pub use config::{NormType, OrthoType, ParamValue, ParameterList, ScaleType, SolverOptions, valid_parameters};
pub use core::{MatVec, MatVecOperator, MultiVec, Operator, Scalar};
pub use error::KError;
pub use matrix::{CsrMatrix, laplacian_1d};
pub use ortho::{MatOrthoManager, make_ortho_manager};
pub use parallel::{Comm, SerialComm};
pub use preconditioner::{Jacobi, Preconditioner};
pub use problem::LinearProblem;
pub use solver::{BlockCgSolMgr, OptionsDiff};
pub use status::{CombinedStatusTest, ConvergenceTest, MaxItersTest, Status, StatusTest};
pub use utils::{BlockExit, BlockTrace, MsgType, OutputManager, ReturnType, SolveReport};
