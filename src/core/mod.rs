//! Core building blocks: scalar bound, multivectors and operator traits.

pub mod multivec;
pub mod scalar;
pub mod traits;
pub mod wrappers;

pub use multivec::MultiVec;
pub use scalar::Scalar;
pub use traits::{MatVec, Operator};
pub use wrappers::MatVecOperator;
