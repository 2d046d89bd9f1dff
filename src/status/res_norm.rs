//! Native residual-norm convergence test.
//!
//! The test value of a column is its residual norm divided by a scale fixed
//! at the first check after construction or [`reset`](StatusTest::reset).
//! Scales and test values are indexed by original right-hand-side column, so
//! values of columns that left the active block stay available for the final
//! report.

use super::{IterationView, Status, StatusTest};
use crate::config::{NormType, ScaleType};
use crate::core::multivec::norms;
use crate::core::scalar::Scalar;
use crate::utils::output::{MsgType, OutputManager};

#[derive(Debug, Clone)]
pub struct ConvergenceTest<T> {
    tol: T,
    quorum: usize,
    norm: NormType,
    scale: ScaleType,
    show_max_res_norm_only: bool,
    scale_values: Vec<T>,
    res_values: Vec<T>,
    test_values: Vec<T>,
    cur_ls_idx: Vec<isize>,
    conv_indices: Vec<isize>,
    status: Status,
    first_call: bool,
}

impl<T: Scalar> ConvergenceTest<T> {
    pub fn new(tol: T, norm: NormType, scale: ScaleType) -> Self {
        Self {
            tol,
            quorum: 1,
            norm,
            scale,
            show_max_res_norm_only: false,
            scale_values: Vec::new(),
            res_values: Vec::new(),
            test_values: Vec::new(),
            cur_ls_idx: Vec::new(),
            conv_indices: Vec::new(),
            status: Status::Undefined,
            first_call: true,
        }
    }

    pub fn tolerance(&self) -> T {
        self.tol
    }

    pub fn set_tolerance(&mut self, tol: T) {
        self.tol = tol;
    }

    pub fn set_show_max_res_norm_only(&mut self, flag: bool) {
        self.show_max_res_norm_only = flag;
    }

    pub fn norm_type(&self) -> NormType {
        self.norm
    }

    pub fn scale_type(&self) -> ScaleType {
        self.scale
    }

    /// Original indices of the columns that passed at the last check.
    pub fn conv_indices(&self) -> &[isize] {
        &self.conv_indices
    }

    /// Latest test value of every right-hand side, by original index.
    pub fn test_values(&self) -> &[T] {
        &self.test_values
    }

    /// Latest residual norm of every right-hand side, by original index.
    pub fn res_values(&self) -> &[T] {
        &self.res_values
    }

    pub fn scale_values(&self) -> &[T] {
        &self.scale_values
    }

    /// Largest latest test value, zero when nothing was checked.
    pub fn max_test_value(&self) -> T {
        self.test_values.iter().fold(T::zero(), |acc, &v| if v > acc || v.is_nan() { v } else { acc })
    }

    fn setup_scales(&mut self, view: &IterationView<'_, T>) {
        let num_rhs = view.problem.num_rhs();
        self.scale_values = match self.scale {
            ScaleType::None => vec![T::one(); num_rhs],
            ScaleType::NormOfInitRes => norms(view.problem.full_init_res(), self.norm, view.comm),
            ScaleType::NormOfPrecInitRes => norms(view.problem.full_init_prec_res(), self.norm, view.comm),
        };
        self.res_values = vec![T::zero(); num_rhs];
        self.test_values = vec![T::zero(); num_rhs];
        self.first_call = false;
    }
}

impl<T: Scalar> StatusTest<T> for ConvergenceTest<T> {
    fn check_status(&mut self, view: &IterationView<'_, T>) -> Status {
        if self.first_call {
            self.setup_scales(view);
        }
        let res = match (self.norm, view.residual_norms) {
            (NormType::TwoNorm, Some(fused)) => fused.to_vec(),
            _ => norms(view.residuals, self.norm, view.comm),
        };
        self.cur_ls_idx = view.problem.ls_index().to_vec();
        self.conv_indices.clear();
        let mut non_finite = false;
        for (&idx, &r) in self.cur_ls_idx.iter().zip(&res) {
            if idx < 0 {
                continue;
            }
            let i = idx as usize;
            let s = self.scale_values[i];
            let value = if s != T::zero() { r / s } else { r };
            self.res_values[i] = r;
            self.test_values[i] = value;
            if !value.is_finite() {
                non_finite = true;
            } else if value <= self.tol {
                self.conv_indices.push(idx);
            }
        }
        self.status = if non_finite {
            Status::NonFinite
        } else if self.conv_indices.len() >= self.quorum {
            Status::Passed
        } else {
            Status::Failed
        };
        self.status
    }

    fn status(&self) -> Status {
        self.status
    }

    fn reset(&mut self) {
        self.status = Status::Undefined;
        self.conv_indices.clear();
        self.cur_ls_idx.clear();
        self.first_call = true;
    }

    fn print(&self, out: &OutputManager, kind: MsgType) {
        let label = match self.scale {
            ScaleType::None => "(Abs Res)",
            _ => "(Rel Res)",
        };
        let active = self.cur_ls_idx.iter().filter(|&&i| i >= 0).map(|&i| i as usize);
        if self.show_max_res_norm_only {
            let worst = active.map(|i| self.test_values[i]).fold(T::zero(), |acc, v| if v > acc { v } else { acc });
            out.emit(
                kind,
                format_args!("{} {}: max = {:e} (tol {:e})", self.norm.name(), label, worst, self.tol),
            );
        } else {
            for i in active {
                out.emit(
                    kind,
                    format_args!("{} {}: rhs {} = {:e} (tol {:e})", self.norm.name(), label, i, self.test_values[i], self.tol),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::multivec::MultiVec;
    use crate::parallel::SerialComm;
    use crate::problem::LinearProblem;
    use faer::Mat;
    use std::sync::Arc;

    fn problem() -> LinearProblem<f64> {
        // A = I, X0 = 0 -> R0 = B with column norms 2, 4, 0.
        let a = Mat::from_fn(2, 2, |i, j| if i == j { 1.0 } else { 0.0 });
        let b = MultiVec::from_columns(&[vec![2.0, 0.0], vec![0.0, 4.0], vec![0.0, 0.0]]).unwrap();
        let mut lp = LinearProblem::new(Arc::new(a), MultiVec::zeros(2, 3), b).unwrap();
        lp.set_problem().unwrap();
        lp
    }

    #[test]
    fn relative_values_and_quorum_of_one() {
        let mut lp = problem();
        lp.set_ls_index(&[0, 1]).unwrap();
        let r = MultiVec::from_columns(&[vec![2e-9, 0.0], vec![0.0, 1.0]]).unwrap();
        let comm = SerialComm;
        let mut test = ConvergenceTest::new(1e-8, NormType::TwoNorm, ScaleType::NormOfInitRes);
        let view = IterationView { num_iters: 3, residuals: &r, residual_norms: None, problem: &lp, comm: &comm };
        assert_eq!(test.check_status(&view), Status::Passed);
        assert_eq!(test.conv_indices(), &[0]);
        assert_eq!(test.test_values()[0], 1e-9);
        assert_eq!(test.test_values()[1], 0.25);
        assert_eq!(test.max_test_value(), 0.25);
    }

    #[test]
    fn zero_scale_uses_raw_norm_and_placeholders_are_skipped() {
        let mut lp = problem();
        lp.set_ls_index(&[2, -1]).unwrap();
        let r = MultiVec::from_columns(&[vec![0.5, 0.0], vec![f64::NAN, 0.0]]).unwrap();
        let comm = SerialComm;
        let mut test = ConvergenceTest::new(1e-8, NormType::TwoNorm, ScaleType::NormOfInitRes);
        let view = IterationView { num_iters: 0, residuals: &r, residual_norms: None, problem: &lp, comm: &comm };
        assert_eq!(test.check_status(&view), Status::Failed);
        assert_eq!(test.test_values()[2], 0.5);
    }

    #[test]
    fn non_finite_residual_is_reported() {
        let mut lp = problem();
        lp.set_ls_index(&[0, 1]).unwrap();
        let r = MultiVec::from_columns(&[vec![0.0, 0.0], vec![f64::NAN, 0.0]]).unwrap();
        let comm = SerialComm;
        let mut test = ConvergenceTest::new(1e-8, NormType::InfNorm, ScaleType::None);
        let view = IterationView { num_iters: 1, residuals: &r, residual_norms: None, problem: &lp, comm: &comm };
        assert_eq!(test.check_status(&view), Status::NonFinite);
    }

    #[test]
    fn fused_two_norms_replace_the_reduction() {
        let mut lp = problem();
        lp.set_ls_index(&[1]).unwrap();
        let r = MultiVec::from_columns(&[vec![0.0, 100.0]]).unwrap();
        let fused = [2.0];
        let comm = SerialComm;
        let mut test = ConvergenceTest::new(1e-8, NormType::TwoNorm, ScaleType::NormOfInitRes);
        let view = IterationView { num_iters: 1, residuals: &r, residual_norms: Some(&fused), problem: &lp, comm: &comm };
        test.check_status(&view);
        assert_eq!(test.test_values()[1], 0.5);
    }
}
