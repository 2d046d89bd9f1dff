//! String-keyed parameter lists validated against a fixed schema.

use super::options::{NormType, OrthoType, ScaleType, SolverOptions};
use crate::core::scalar::Scalar;
use crate::error::KError;
use crate::utils::output::MsgType;

/// A single parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Int(i64),
    Real(f64),
    Bool(bool),
    Str(String),
}

impl ParamValue {
    fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Int(_) => "int",
            ParamValue::Real(_) => "real",
            ParamValue::Bool(_) => "bool",
            ParamValue::Str(_) => "string",
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}
impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(v as i64)
    }
}
impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        ParamValue::Int(v as i64)
    }
}
impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Real(v)
    }
}
impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}
impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}
impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Str(v)
    }
}

/// Ordered list of named parameters; later entries override earlier ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterList {
    entries: Vec<(String, ParamValue)>,
}

impl ParameterList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: impl Into<ParamValue>) -> &mut Self {
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name.to_string(), value)),
        }
        self
    }

    pub fn with(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn is_parameter(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Accepted parameter names.
pub const VALID_PARAMETERS: &[&str] = &[
    "Block Size",
    "Adaptive Block Size",
    "Use Single Reduction",
    "Maximum Iterations",
    "Convergence Tolerance",
    "Orthogonalization",
    "Orthogonalization Constant",
    "Residual Norm",
    "Implicit Residual Scaling",
    "Show Maximum Residual Norm Only",
    "Assert Positive Definiteness",
    "Fold Convergence Detection Into Allreduce",
    "Verbosity",
    "Output Frequency",
    "Timer Label",
];

fn type_error(name: &str, expected: &str, found: &ParamValue) -> KError {
    KError::InvalidParameter(format!(
        "\"{name}\" expects a {expected} value, got {}",
        found.type_name()
    ))
}

fn as_int(name: &str, v: &ParamValue) -> Result<i64, KError> {
    match v {
        ParamValue::Int(i) => Ok(*i),
        other => Err(type_error(name, "int", other)),
    }
}

fn as_count(name: &str, v: &ParamValue) -> Result<usize, KError> {
    let i = as_int(name, v)?;
    usize::try_from(i).map_err(|_| KError::InvalidParameter(format!("\"{name}\" must be non-negative, got {i}")))
}

fn as_real(name: &str, v: &ParamValue) -> Result<f64, KError> {
    match v {
        ParamValue::Real(r) => Ok(*r),
        ParamValue::Int(i) => Ok(*i as f64),
        other => Err(type_error(name, "real", other)),
    }
}

fn as_bool(name: &str, v: &ParamValue) -> Result<bool, KError> {
    match v {
        ParamValue::Bool(b) => Ok(*b),
        other => Err(type_error(name, "bool", other)),
    }
}

fn as_str<'a>(name: &str, v: &'a ParamValue) -> Result<&'a str, KError> {
    match v {
        ParamValue::Str(s) => Ok(s.as_str()),
        other => Err(type_error(name, "string", other)),
    }
}

impl<T: Scalar> SolverOptions<T> {
    /// Overlay `params` on top of `self`, validating every entry.
    pub fn apply_params(&self, params: &ParameterList) -> Result<Self, KError> {
        let mut opts = self.clone();
        for (name, value) in params.iter() {
            match name {
                "Block Size" => opts.block_size = as_count(name, value)?,
                "Adaptive Block Size" => opts.adaptive_block_size = as_bool(name, value)?,
                "Use Single Reduction" => opts.use_single_reduction = as_bool(name, value)?,
                "Maximum Iterations" => opts.max_iters = as_count(name, value)?,
                "Convergence Tolerance" => opts.conv_tol = T::from_f64_lossy(as_real(name, value)?),
                "Orthogonalization" => opts.ortho_type = as_str(name, value)?.parse::<OrthoType>()?,
                "Orthogonalization Constant" => opts.ortho_kappa = T::from_f64_lossy(as_real(name, value)?),
                "Residual Norm" => opts.res_norm = as_str(name, value)?.parse::<NormType>()?,
                "Implicit Residual Scaling" => opts.res_scale = as_str(name, value)?.parse::<ScaleType>()?,
                "Show Maximum Residual Norm Only" => opts.show_max_res_norm_only = as_bool(name, value)?,
                "Assert Positive Definiteness" => opts.assert_positive_definiteness = as_bool(name, value)?,
                "Fold Convergence Detection Into Allreduce" => {
                    opts.fold_convergence_detection_into_allreduce = as_bool(name, value)?
                }
                "Verbosity" => {
                    let bits = as_int(name, value)?;
                    let bits = u32::try_from(bits)
                        .map_err(|_| KError::InvalidParameter(format!("\"Verbosity\" out of range: {bits}")))?;
                    opts.verbosity = MsgType::from_bits_truncate(bits);
                }
                "Output Frequency" => {
                    let freq = as_int(name, value)?;
                    opts.output_frequency = if freq < 0 { None } else { Some(freq as usize) };
                }
                "Timer Label" => opts.label = as_str(name, value)?.to_string(),
                unknown => {
                    return Err(KError::InvalidParameter(format!("unrecognized parameter \"{unknown}\"")));
                }
            }
        }
        opts.validate()?;
        Ok(opts)
    }

    /// Build options from defaults overlaid with `params`.
    pub fn from_params(params: &ParameterList) -> Result<Self, KError> {
        Self::default().apply_params(params)
    }

    /// The current options rendered as a parameter list.
    pub fn to_params(&self) -> ParameterList {
        ParameterList::new()
            .with("Block Size", self.block_size)
            .with("Adaptive Block Size", self.adaptive_block_size)
            .with("Use Single Reduction", self.use_single_reduction)
            .with("Maximum Iterations", self.max_iters)
            .with("Convergence Tolerance", self.conv_tol.to_f64_lossy())
            .with("Orthogonalization", self.ortho_type.name())
            .with("Orthogonalization Constant", self.ortho_kappa.to_f64_lossy())
            .with("Residual Norm", self.res_norm.name())
            .with("Implicit Residual Scaling", self.res_scale.name())
            .with("Show Maximum Residual Norm Only", self.show_max_res_norm_only)
            .with("Assert Positive Definiteness", self.assert_positive_definiteness)
            .with(
                "Fold Convergence Detection Into Allreduce",
                self.fold_convergence_detection_into_allreduce,
            )
            .with("Verbosity", self.verbosity.bits() as i64)
            .with("Output Frequency", self.output_frequency.map_or(-1, |f| f as i64))
            .with("Timer Label", self.label.as_str())
    }
}

/// Every accepted parameter with its default value.
pub fn valid_parameters<T: Scalar>() -> ParameterList {
    SolverOptions::<T>::default().to_params()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_lists_every_default() {
        let pl = valid_parameters::<f64>();
        assert_eq!(pl.len(), VALID_PARAMETERS.len());
        for name in VALID_PARAMETERS {
            assert!(pl.is_parameter(name), "missing {name}");
        }
    }

    #[test]
    fn parses_known_parameters() {
        let pl = ParameterList::new()
            .with("Block Size", 4)
            .with("Adaptive Block Size", false)
            .with("Convergence Tolerance", 1e-6)
            .with("Orthogonalization", "DGKS")
            .with("Orthogonalization Constant", 0.5)
            .with("Residual Norm", "InfNorm")
            .with("Implicit Residual Scaling", "None")
            .with("Output Frequency", -1);
        let opts = SolverOptions::<f64>::from_params(&pl).unwrap();
        assert_eq!(opts.block_size, 4);
        assert!(!opts.adaptive_block_size);
        assert_eq!(opts.conv_tol, 1e-6);
        assert_eq!(opts.ortho_type, OrthoType::Dgks);
        assert_eq!(opts.ortho_kappa, 0.5);
        assert_eq!(opts.res_norm, NormType::InfNorm);
        assert_eq!(opts.res_scale, ScaleType::None);
        assert_eq!(opts.output_frequency, None);
    }

    #[test]
    fn rejects_unknown_name_wrong_type_and_bad_range() {
        let unknown = ParameterList::new().with("Block Sise", 2);
        assert!(matches!(SolverOptions::<f64>::from_params(&unknown), Err(KError::InvalidParameter(_))));

        let wrong_type = ParameterList::new().with("Adaptive Block Size", 1);
        assert!(matches!(SolverOptions::<f64>::from_params(&wrong_type), Err(KError::InvalidParameter(_))));

        let zero = ParameterList::new().with("Block Size", 0);
        assert!(matches!(SolverOptions::<f64>::from_params(&zero), Err(KError::InvalidParameter(_))));

        let negative = ParameterList::new().with("Maximum Iterations", -5);
        assert!(SolverOptions::<f64>::from_params(&negative).is_err());
    }

    #[test]
    fn later_set_overrides_earlier() {
        let mut pl = ParameterList::new();
        pl.set("Block Size", 2).set("Block Size", 3);
        assert_eq!(pl.len(), 1);
        assert_eq!(pl.get("Block Size"), Some(&ParamValue::Int(3)));
    }
}
