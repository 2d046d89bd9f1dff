//! Solver-manager options.
//!
//! `SolverOptions` is the immutable configuration snapshot the manager works
//! from during a `solve()` call. It can be built directly with the `with_*`
//! builders or parsed from a [`ParameterList`](crate::config::params::ParameterList)
//! through [`SolverOptions::from_params`].

use crate::core::scalar::Scalar;
use crate::error::KError;
use crate::utils::output::MsgType;
use std::fmt;
use std::str::FromStr;

/// Norm used for the residual convergence check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormType {
    OneNorm,
    TwoNorm,
    InfNorm,
}

impl NormType {
    pub fn name(self) -> &'static str {
        match self {
            NormType::OneNorm => "OneNorm",
            NormType::TwoNorm => "TwoNorm",
            NormType::InfNorm => "InfNorm",
        }
    }
}

impl FromStr for NormType {
    type Err = KError;
    fn from_str(s: &str) -> Result<Self, KError> {
        match s {
            "OneNorm" => Ok(NormType::OneNorm),
            "TwoNorm" => Ok(NormType::TwoNorm),
            "InfNorm" => Ok(NormType::InfNorm),
            _ => Err(KError::InvalidParameter(format!("unknown residual norm \"{s}\""))),
        }
    }
}

/// Denominator used to turn a residual norm into a relative one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleType {
    /// Absolute residual norm.
    None,
    /// Norm of the initial residual `B - A X0`.
    NormOfInitRes,
    /// Norm of the left-preconditioned initial residual `M (B - A X0)`.
    NormOfPrecInitRes,
}

impl ScaleType {
    pub fn name(self) -> &'static str {
        match self {
            ScaleType::None => "None",
            ScaleType::NormOfInitRes => "Norm of Initial Residual",
            ScaleType::NormOfPrecInitRes => "Norm of Preconditioned Initial Residual",
        }
    }
}

impl FromStr for ScaleType {
    type Err = KError;
    fn from_str(s: &str) -> Result<Self, KError> {
        match s {
            "None" => Ok(ScaleType::None),
            "Norm of Initial Residual" => Ok(ScaleType::NormOfInitRes),
            "Norm of Preconditioned Initial Residual" => Ok(ScaleType::NormOfPrecInitRes),
            _ => Err(KError::InvalidParameter(format!("unknown residual scaling \"{s}\""))),
        }
    }
}

/// Orthogonalization recipe for the block kernel's direction vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrthoType {
    /// Classical Gram-Schmidt with DGKS conditional re-orthogonalization.
    Dgks,
    /// Iterated classical Gram-Schmidt.
    Icgs,
    /// Iterated modified Gram-Schmidt.
    Imgs,
}

impl OrthoType {
    pub fn name(self) -> &'static str {
        match self {
            OrthoType::Dgks => "DGKS",
            OrthoType::Icgs => "ICGS",
            OrthoType::Imgs => "IMGS",
        }
    }
}

impl FromStr for OrthoType {
    type Err = KError;
    fn from_str(s: &str) -> Result<Self, KError> {
        match s {
            "DGKS" => Ok(OrthoType::Dgks),
            "ICGS" => Ok(OrthoType::Icgs),
            "IMGS" => Ok(OrthoType::Imgs),
            _ => Err(KError::InvalidParameter(format!("unknown orthogonalization \"{s}\""))),
        }
    }
}

impl fmt::Display for OrthoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Configuration of a [`BlockCgSolMgr`](crate::solver::BlockCgSolMgr).
#[derive(Debug, Clone, PartialEq)]
pub struct SolverOptions<T> {
    /// Target number of right-hand sides iterated together (> 0).
    pub block_size: usize,
    /// Shrink the block to the number of remaining right-hand sides instead of padding.
    pub adaptive_block_size: bool,
    /// Use the single-reduction CG recurrence when the block size is one.
    pub use_single_reduction: bool,
    /// Iteration ceiling per block.
    pub max_iters: usize,
    /// Relative residual threshold.
    pub conv_tol: T,
    pub ortho_type: OrthoType,
    /// DGKS dependency threshold; values `<= 0` keep the DGKS default.
    pub ortho_kappa: T,
    pub res_norm: NormType,
    pub res_scale: ScaleType,
    /// Only report the worst column in convergence output.
    pub show_max_res_norm_only: bool,
    /// Fail with `IndefiniteMatrix` when `pᵀAp` is not positive.
    pub assert_positive_definiteness: bool,
    /// Fuse the residual two-norm into the kernel's existing reduction.
    pub fold_convergence_detection_into_allreduce: bool,
    pub verbosity: MsgType,
    /// Print convergence information every this many status checks.
    pub output_frequency: Option<usize>,
    /// Prefix for log messages.
    pub label: String,
}

impl<T: Scalar> Default for SolverOptions<T> {
    fn default() -> Self {
        Self {
            block_size: 1,
            adaptive_block_size: true,
            use_single_reduction: false,
            max_iters: 1000,
            conv_tol: T::from_f64_lossy(1e-8),
            ortho_type: OrthoType::Icgs,
            ortho_kappa: -T::one(),
            res_norm: NormType::TwoNorm,
            res_scale: ScaleType::NormOfInitRes,
            show_max_res_norm_only: false,
            assert_positive_definiteness: true,
            fold_convergence_detection_into_allreduce: false,
            verbosity: MsgType::ERRORS,
            output_frequency: None,
            label: "blockcg".to_string(),
        }
    }
}

impl<T: Scalar> SolverOptions<T> {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }
    pub fn with_adaptive_block_size(mut self, flag: bool) -> Self {
        self.adaptive_block_size = flag;
        self
    }
    pub fn with_single_reduction(mut self, flag: bool) -> Self {
        self.use_single_reduction = flag;
        self
    }
    pub fn with_max_iters(mut self, max_iters: usize) -> Self {
        self.max_iters = max_iters;
        self
    }
    pub fn with_tol(mut self, tol: T) -> Self {
        self.conv_tol = tol;
        self
    }
    pub fn with_ortho(mut self, kind: OrthoType) -> Self {
        self.ortho_type = kind;
        self
    }
    pub fn with_ortho_kappa(mut self, kappa: T) -> Self {
        self.ortho_kappa = kappa;
        self
    }
    pub fn with_res_norm(mut self, norm: NormType) -> Self {
        self.res_norm = norm;
        self
    }
    pub fn with_res_scale(mut self, scale: ScaleType) -> Self {
        self.res_scale = scale;
        self
    }
    pub fn with_show_max_res_norm_only(mut self, flag: bool) -> Self {
        self.show_max_res_norm_only = flag;
        self
    }
    pub fn with_assert_positive_definiteness(mut self, flag: bool) -> Self {
        self.assert_positive_definiteness = flag;
        self
    }
    pub fn with_fold_convergence_detection(mut self, flag: bool) -> Self {
        self.fold_convergence_detection_into_allreduce = flag;
        self
    }
    pub fn with_verbosity(mut self, verbosity: MsgType) -> Self {
        self.verbosity = verbosity;
        self
    }
    pub fn with_output_frequency(mut self, freq: Option<usize>) -> Self {
        self.output_frequency = freq;
        self
    }
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Check the invariants the manager relies on.
    pub fn validate(&self) -> Result<(), KError> {
        if self.block_size == 0 {
            return Err(KError::InvalidParameter("\"Block Size\" must be strictly positive".into()));
        }
        if !(self.conv_tol >= T::zero()) || !self.conv_tol.is_finite() {
            return Err(KError::InvalidParameter(format!(
                "\"Convergence Tolerance\" must be a finite non-negative value, got {}",
                self.conv_tol
            )));
        }
        if self.output_frequency == Some(0) {
            return Err(KError::InvalidParameter("\"Output Frequency\" must be positive or -1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let opts = SolverOptions::<f64>::default();
        opts.validate().unwrap();
        assert_eq!(opts.block_size, 1);
        assert!(opts.adaptive_block_size);
        assert_eq!(opts.ortho_type, OrthoType::Icgs);
        assert_eq!(opts.res_scale, ScaleType::NormOfInitRes);
    }

    #[test]
    fn zero_block_size_is_rejected() {
        let opts = SolverOptions::<f64>::default().with_block_size(0);
        assert!(matches!(opts.validate(), Err(KError::InvalidParameter(_))));
    }

    #[test]
    fn enum_names_round_trip_through_from_str() {
        for kind in [OrthoType::Dgks, OrthoType::Icgs, OrthoType::Imgs] {
            assert_eq!(kind.name().parse::<OrthoType>().unwrap(), kind);
        }
        for scale in [ScaleType::None, ScaleType::NormOfInitRes, ScaleType::NormOfPrecInitRes] {
            assert_eq!(scale.name().parse::<ScaleType>().unwrap(), scale);
        }
        assert!("Frobenius".parse::<NormType>().is_err());
    }
}
