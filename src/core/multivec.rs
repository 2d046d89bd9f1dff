//! Dense column-major block of vectors.
//!
//! `MultiVec` is the unit every kernel works on: the solution block `X`, the
//! right-hand sides `B`, residuals and search directions. Small coefficient
//! matrices (`PᵀAP`, `α`, `β`) are `faer::Mat` values.
//!
//! Local kernels run column-parallel under the `rayon` feature. Global
//! inner products go through [`crate::parallel::Comm`], one reduction round
//! per call.

use crate::config::NormType;
use crate::core::scalar::{Scalar, small_zeros};
use crate::error::KError;
use crate::parallel::{Comm, reduce_max, reduce_sum};
use faer::Mat;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

#[derive(Clone, Debug, PartialEq)]
pub struct MultiVec<T> {
    nrows: usize,
    ncols: usize,
    data: Vec<T>,
}

impl<T: Scalar> MultiVec<T> {
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self { nrows, ncols, data: vec![T::zero(); nrows * ncols] }
    }

    pub fn from_fn(nrows: usize, ncols: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(nrows * ncols);
        for j in 0..ncols {
            for i in 0..nrows {
                data.push(f(i, j));
            }
        }
        Self { nrows, ncols, data }
    }

    /// Build from raw column-major storage.
    pub fn from_col_major(nrows: usize, ncols: usize, data: Vec<T>) -> Result<Self, KError> {
        if data.len() != nrows * ncols {
            return Err(KError::DimensionMismatch { expected: nrows * ncols, found: data.len() });
        }
        Ok(Self { nrows, ncols, data })
    }

    /// Build from a list of equally long columns.
    pub fn from_columns(cols: &[Vec<T>]) -> Result<Self, KError> {
        let nrows = cols.first().map_or(0, |c| c.len());
        let mut data = Vec::with_capacity(nrows * cols.len());
        for c in cols {
            if c.len() != nrows {
                return Err(KError::DimensionMismatch { expected: nrows, found: c.len() });
            }
            data.extend_from_slice(c);
        }
        Ok(Self { nrows, ncols: cols.len(), data })
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn col(&self, j: usize) -> &[T] {
        &self.data[j * self.nrows..(j + 1) * self.nrows]
    }

    pub fn col_mut(&mut self, j: usize) -> &mut [T] {
        &mut self.data[j * self.nrows..(j + 1) * self.nrows]
    }

    pub fn get(&self, i: usize, j: usize) -> T {
        self.data[j * self.nrows + i]
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Copy of the columns at `idx`, in that order.
    pub fn select(&self, idx: &[usize]) -> Self {
        let mut data = Vec::with_capacity(self.nrows * idx.len());
        for &j in idx {
            data.extend_from_slice(self.col(j));
        }
        Self { nrows: self.nrows, ncols: idx.len(), data }
    }

    pub fn set_col(&mut self, j: usize, src: &[T]) {
        self.col_mut(j).copy_from_slice(src);
    }

    pub fn fill(&mut self, value: T) {
        self.data.iter_mut().for_each(|v| *v = value);
    }

    /// Overwrite with `other`, adopting its shape.
    pub fn assign(&mut self, other: &MultiVec<T>) {
        self.nrows = other.nrows;
        self.ncols = other.ncols;
        self.data.clear();
        self.data.extend_from_slice(&other.data);
    }

    /// Change the number of columns in place; new columns are zero.
    pub fn resize_cols(&mut self, ncols: usize) {
        self.data.resize(self.nrows * ncols, T::zero());
        self.ncols = ncols;
    }

    pub fn all_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }

    fn check_same_shape(&self, other: &MultiVec<T>) -> Result<(), KError> {
        if self.nrows != other.nrows {
            return Err(KError::DimensionMismatch { expected: self.nrows, found: other.nrows });
        }
        if self.ncols != other.ncols {
            return Err(KError::DimensionMismatch { expected: self.ncols, found: other.ncols });
        }
        Ok(())
    }

    /// `self ← self + alpha · x`.
    pub fn axpy(&mut self, alpha: T, x: &MultiVec<T>) -> Result<(), KError> {
        self.check_same_shape(x)?;
        for (s, &xi) in self.data.iter_mut().zip(&x.data) {
            *s = *s + alpha * xi;
        }
        Ok(())
    }

    /// `self ← beta · self + alpha · A · B` with `B` a small `k × ncols` matrix.
    pub fn times_mat_add(&mut self, alpha: T, a: &MultiVec<T>, b: &Mat<T>, beta: T) -> Result<(), KError> {
        if a.nrows != self.nrows {
            return Err(KError::DimensionMismatch { expected: self.nrows, found: a.nrows });
        }
        if b.nrows() != a.ncols || b.ncols() != self.ncols {
            return Err(KError::DimensionMismatch { expected: a.ncols * self.ncols, found: b.nrows() * b.ncols() });
        }
        if self.nrows == 0 {
            return Ok(());
        }
        let update = |(j, out): (usize, &mut [T])| {
            for v in out.iter_mut() {
                *v = beta * *v;
            }
            for k in 0..a.ncols {
                let coeff = alpha * b[(k, j)];
                for (v, &ak) in out.iter_mut().zip(a.col(k)) {
                    *v = *v + coeff * ak;
                }
            }
        };
        let nrows = self.nrows;
        #[cfg(feature = "rayon")]
        self.data.par_chunks_mut(nrows).enumerate().for_each(update);
        #[cfg(not(feature = "rayon"))]
        self.data.chunks_mut(nrows).enumerate().for_each(update);
        Ok(())
    }
}

/// Local (unreduced) dot product of two slices.
pub fn local_dot<T: Scalar>(x: &[T], y: &[T]) -> T {
    debug_assert_eq!(x.len(), y.len(), "Vectors must have the same length");
    #[cfg(feature = "rayon")]
    {
        x.par_iter()
            .zip(y.par_iter())
            .map(|(xi, yi)| *xi * *yi)
            .reduce(|| T::zero(), |acc, v| acc + v)
    }
    #[cfg(not(feature = "rayon"))]
    {
        x.iter()
            .zip(y.iter())
            .map(|(xi, yi)| *xi * *yi)
            .fold(T::zero(), |acc, v| acc + v)
    }
}

/// Column-wise local dot products `aⱼ · bⱼ`.
pub fn local_dots<T: Scalar>(a: &MultiVec<T>, b: &MultiVec<T>) -> Vec<T> {
    (0..a.ncols().min(b.ncols())).map(|j| local_dot(a.col(j), b.col(j))).collect()
}

/// `AᵀB` as a small matrix, reduced in one round.
pub fn trans_mv<T: Scalar>(a: &MultiVec<T>, b: &MultiVec<T>, comm: &dyn Comm) -> Result<Mat<T>, KError> {
    if a.nrows() != b.nrows() {
        return Err(KError::DimensionMismatch { expected: a.nrows(), found: b.nrows() });
    }
    let (m, n) = (a.ncols(), b.ncols());
    let mut buf = Vec::with_capacity(m * n);
    for j in 0..n {
        for i in 0..m {
            buf.push(local_dot(a.col(i), b.col(j)));
        }
    }
    reduce_sum(comm, &mut buf);
    let mut out = small_zeros(m, n);
    for j in 0..n {
        for i in 0..m {
            out[(i, j)] = buf[j * m + i];
        }
    }
    Ok(out)
}

/// Column-wise dot products `aⱼ · bⱼ`, reduced in one round.
pub fn dots<T: Scalar>(a: &MultiVec<T>, b: &MultiVec<T>, comm: &dyn Comm) -> Result<Vec<T>, KError> {
    a.check_same_shape(b)?;
    let mut buf = local_dots(a, b);
    reduce_sum(comm, &mut buf);
    Ok(buf)
}

/// `max` that keeps NaN instead of dropping it like `Float::max`.
fn nan_max<T: Scalar>(a: T, b: T) -> T {
    if a.is_nan() || b.is_nan() { T::nan() } else { a.max(b) }
}

/// Column norms of `a`, reduced in one round.
pub fn norms<T: Scalar>(a: &MultiVec<T>, kind: NormType, comm: &dyn Comm) -> Vec<T> {
    let mut buf: Vec<T> = (0..a.ncols())
        .map(|j| {
            let col = a.col(j);
            match kind {
                NormType::OneNorm => col.iter().fold(T::zero(), |acc, v| acc + v.abs()),
                NormType::TwoNorm => local_dot(col, col),
                NormType::InfNorm => col.iter().fold(T::zero(), |acc, &v| nan_max(acc, v.abs())),
            }
        })
        .collect();
    match kind {
        NormType::OneNorm => reduce_sum(comm, &mut buf),
        NormType::TwoNorm => {
            reduce_sum(comm, &mut buf);
            buf.iter_mut().for_each(|v| *v = v.sqrt());
        }
        NormType::InfNorm => reduce_max(comm, &mut buf),
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::SerialComm;
    use crate::parallel::testing::CountingComm;

    fn sample() -> MultiVec<f64> {
        MultiVec::from_columns(&[vec![1.0, 2.0, 2.0], vec![3.0, 0.0, -4.0]]).unwrap()
    }

    #[test]
    fn select_keeps_requested_order() {
        let x = sample();
        let s = x.select(&[1, 0]);
        assert_eq!(s.col(0), &[3.0, 0.0, -4.0]);
        assert_eq!(s.col(1), &[1.0, 2.0, 2.0]);
    }

    #[test]
    fn norms_of_each_kind() {
        let x = sample();
        let comm = SerialComm;
        assert_eq!(norms(&x, NormType::OneNorm, &comm), vec![5.0, 7.0]);
        assert_eq!(norms(&x, NormType::TwoNorm, &comm), vec![3.0, 5.0]);
        assert_eq!(norms(&x, NormType::InfNorm, &comm), vec![2.0, 4.0]);
    }

    #[test]
    fn inf_norm_keeps_nan() {
        let x = MultiVec::from_columns(&[vec![f64::NAN, 1.0], vec![1.0, f64::NAN]]).unwrap();
        let n = norms(&x, NormType::InfNorm, &SerialComm);
        assert!(n[0].is_nan());
        assert!(n[1].is_nan());
    }

    #[test]
    fn trans_mv_is_single_round() {
        let x = sample();
        let comm = CountingComm::default();
        let g = trans_mv(&x, &x, &comm).unwrap();
        assert_eq!(comm.rounds(), 1);
        assert_eq!(g[(0, 0)], 9.0);
        assert_eq!(g[(0, 1)], -5.0);
        assert_eq!(g[(1, 0)], -5.0);
        assert_eq!(g[(1, 1)], 25.0);
    }

    #[test]
    fn times_mat_add_combines_columns() {
        let a = sample();
        let mut y = MultiVec::from_columns(&[vec![1.0, 1.0, 1.0]]).unwrap();
        // y = 2*y + a * [1, -1]^T
        let b = Mat::from_fn(2, 1, |i, _| if i == 0 { 1.0 } else { -1.0 });
        y.times_mat_add(1.0, &a, &b, 2.0).unwrap();
        assert_eq!(y.col(0), &[0.0, 4.0, 8.0]);
    }

    #[test]
    fn mismatched_shapes_are_reported() {
        let a = sample();
        let mut y = MultiVec::<f64>::zeros(2, 2);
        assert!(matches!(y.axpy(1.0, &a), Err(KError::DimensionMismatch { .. })));
        assert!(MultiVec::from_columns(&[vec![1.0], vec![1.0, 2.0]]).is_err());
    }
}
