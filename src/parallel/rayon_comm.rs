// rayon-based shared-memory communicator

use super::Comm;

/// Shared-memory communicator.
///
/// All threads see the same vectors, so the local partial results already
/// are the global ones and reductions are the identity. Construction sizes
/// rayon's global pool to the number of logical cores.
pub struct RayonComm {
    threads: usize,
}

impl RayonComm {
    pub fn new() -> Self {
        // The global pool can only be built once per process.
        rayon::ThreadPoolBuilder::new()
            .num_threads(num_cpus::get())
            .build_global()
            .ok();
        RayonComm { threads: rayon::current_num_threads() }
    }
}

impl Default for RayonComm {
    fn default() -> Self {
        Self::new()
    }
}

impl Comm for RayonComm {
    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        self.threads
    }
    fn barrier(&self) {
        rayon::scope(|_| {});
    }
    fn all_reduce_sum(&self, _buf: &mut [f64]) {}
    fn all_reduce_max(&self, _buf: &mut [f64]) {}
}
