//! Collective reductions.
//!
//! Every inner product in the solvers ends in exactly one call to
//! [`Comm::all_reduce_sum`] (or `all_reduce_max` for infinity norms). Kernels
//! that fuse several products pack them into one buffer, so the number of
//! calls is the number of communication rounds a distributed backend would
//! pay. The serial and shared-memory backends reduce in place.

use crate::core::scalar::Scalar;

pub trait Comm: Send + Sync {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;
    fn barrier(&self);
    /// Element-wise sum of `buf` across all participants, in place.
    fn all_reduce_sum(&self, buf: &mut [f64]);
    /// Element-wise maximum of `buf` across all participants, in place.
    /// A NaN from any participant must survive the reduction.
    fn all_reduce_max(&self, buf: &mut [f64]);
}

#[cfg(feature = "rayon")]
pub mod rayon_comm;
#[cfg(feature = "rayon")]
pub use rayon_comm::RayonComm;

/// Single-process communicator; every reduction is the identity.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialComm;

impl Comm for SerialComm {
    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn barrier(&self) {}
    fn all_reduce_sum(&self, _buf: &mut [f64]) {}
    fn all_reduce_max(&self, _buf: &mut [f64]) {}
}

/// Sum-reduce a batch of local partial results in a single round.
pub fn reduce_sum<T: Scalar>(comm: &dyn Comm, vals: &mut [T]) {
    if vals.is_empty() {
        return;
    }
    let mut buf: Vec<f64> = vals.iter().map(|v| v.to_f64_lossy()).collect();
    comm.all_reduce_sum(&mut buf);
    for (v, b) in vals.iter_mut().zip(buf) {
        *v = T::from_f64_lossy(b);
    }
}

/// Max-reduce a batch of local partial results in a single round.
pub fn reduce_max<T: Scalar>(comm: &dyn Comm, vals: &mut [T]) {
    if vals.is_empty() {
        return;
    }
    let mut buf: Vec<f64> = vals.iter().map(|v| v.to_f64_lossy()).collect();
    comm.all_reduce_max(&mut buf);
    for (v, b) in vals.iter_mut().zip(buf) {
        *v = T::from_f64_lossy(b);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Comm;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serial communicator that counts reduction rounds.
    #[derive(Default)]
    pub struct CountingComm {
        pub rounds: AtomicUsize,
    }

    impl CountingComm {
        pub fn rounds(&self) -> usize {
            self.rounds.load(Ordering::SeqCst)
        }
    }

    impl Comm for CountingComm {
        fn rank(&self) -> usize {
            0
        }
        fn size(&self) -> usize {
            1
        }
        fn barrier(&self) {}
        fn all_reduce_sum(&self, _buf: &mut [f64]) {
            self.rounds.fetch_add(1, Ordering::SeqCst);
        }
        fn all_reduce_max(&self, _buf: &mut [f64]) {
            self.rounds.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::CountingComm;
    use super::*;

    #[test]
    fn batched_reduction_is_one_round() {
        let comm = CountingComm::default();
        let mut vals = vec![1.0f64, 2.0, 3.0];
        reduce_sum(&comm, &mut vals);
        assert_eq!(vals, vec![1.0, 2.0, 3.0]);
        assert_eq!(comm.rounds(), 1);
        reduce_sum::<f64>(&comm, &mut []);
        assert_eq!(comm.rounds(), 1);
    }

    #[test]
    fn max_reduction_keeps_nan() {
        let mut vals = vec![f64::NAN, 2.0f64];
        reduce_max(&SerialComm, &mut vals);
        assert!(vals[0].is_nan());
        assert_eq!(vals[1], 2.0);
    }
}
