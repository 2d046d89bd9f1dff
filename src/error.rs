use thiserror::Error;

// Unified error type for blockcg

#[derive(Error, Debug)]
pub enum KError {
    #[error("linear problem is not ready: set_problem() has not been called")]
    ProblemNotSet,
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("factorization error: {0}")]
    FactorError(String),
    #[error("indefinite matrix detected (p^T A p <= 0)")]
    IndefiniteMatrix,
    #[error("orthogonalization failed: rank {rank} of {expected} direction vectors")]
    OrthoFailure { rank: usize, expected: usize },
    #[error("internal consistency failure: {0}")]
    InternalConsistency(String),
    #[error("operator error: {0}")]
    OperatorError(String),
}
