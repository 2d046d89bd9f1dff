//! Solver configuration: typed options and the parameter-list front end.

pub mod options;
pub mod params;

pub use options::{NormType, OrthoType, ScaleType, SolverOptions};
pub use params::{ParamValue, ParameterList, VALID_PARAMETERS, valid_parameters};
