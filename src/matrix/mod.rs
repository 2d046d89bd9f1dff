//! Matrix module: sparse operator storage. Dense operators are `faer::Mat`.

pub mod sparse;
pub use sparse::{CsrMatrix, laplacian_1d};
