use crate::error::StriderError;
use crate::io::chunk::IO_ALIGN;
use crate::walk::MAX_HOPS;

/// Block-selection policy used by the scheduler to pick the next block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectPolicy {
    /// Block owning the most live walks (ties go to the lowest index).
    #[default]
    MaxWalks,
    /// Lowest-indexed block with any live walk. Mostly useful for tests
    /// and for workloads where deterministic sweep order matters more
    /// than I/O amortization.
    FirstNonEmpty,
}

/// Process-lifetime tuning parameters.
///
/// Constructed once, carried by [`crate::engine::Engine`] and passed by
/// reference to every subsystem.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Total number of vertices `V`; ids are dense in `[0, V)`.
    pub nvertices: u32,
    /// Initial walk count.
    pub nwalks: u64,
    /// Maximum hop count per walk.
    pub nsteps: u32,
    /// Global stop fraction: the run ends once at most
    /// `rbound * nwalks` walks remain live.
    pub rbound: f64,
    /// Per-block stop fraction: a block activation ends early once at
    /// most `rboundin * nwalks` walks remain homed in it.
    pub rboundin: f64,
    /// Restart probability per step.
    pub alpha: f32,
    /// Bytes per streaming chunk.
    pub chunk_bytes: usize,
    /// Ring capacity `R` (number of chunks).
    pub num_chunks: usize,
    /// Maximum outstanding asynchronous reads.
    pub io_depth: usize,
    /// Compute threads per block activation.
    pub exec_threads: usize,
    /// Partitioner: maximum bytes per block file.
    pub block_bytes: u64,
    /// Partitioner: maximum bytes per stage-A interval.
    pub interval_bytes: u64,
    /// RNG seed; fixed seeds give replayable runs (single-threaded).
    pub seed: u64,
    pub policy: SelectPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            nvertices: 0,
            nwalks: 0,
            nsteps: 0,
            rbound: 0.0,
            rboundin: 0.0,
            alpha: 0.15,
            chunk_bytes: 2 * 1024 * 1024,
            num_chunks: 8,
            io_depth: 4,
            exec_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            block_bytes: 40 * 1024 * 1024,
            interval_bytes: 40 * 1024 * 1024,
            seed: 0,
            policy: SelectPolicy::MaxWalks,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), StriderError> {
        if self.nvertices == 0 {
            return Err(StriderError::BadInput("nvertices must be positive".into()));
        }
        if self.nsteps > MAX_HOPS {
            return Err(StriderError::BadInput(format!(
                "nsteps {} exceeds the encodable hop limit of {MAX_HOPS}",
                self.nsteps
            )));
        }
        if self.chunk_bytes == 0 || self.chunk_bytes % IO_ALIGN != 0 {
            return Err(StriderError::BadInput(format!(
                "chunk_sz {} must be a positive multiple of {IO_ALIGN}",
                self.chunk_bytes
            )));
        }
        if self.num_chunks < 2 {
            return Err(StriderError::BadInput(
                "num_chunks must be at least 2".into(),
            ));
        }
        if self.io_depth == 0 || self.exec_threads == 0 {
            return Err(StriderError::BadInput(
                "io_depth and execthreads must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(StriderError::BadInput(format!(
                "alpha {} must lie in [0, 1]",
                self.alpha
            )));
        }
        for (name, frac) in [("rbound", self.rbound), ("rboundin", self.rboundin)] {
            if !(0.0..=1.0).contains(&frac) {
                return Err(StriderError::BadInput(format!(
                    "{name} {frac} must lie in [0, 1]"
                )));
            }
        }
        if self.block_bytes < 16 || self.interval_bytes < 16 {
            return Err(StriderError::BadInput(
                "block_sz and invl_sz are too small to hold a record".into(),
            ));
        }
        Ok(())
    }

    /// Absolute global stop threshold.
    pub fn stop_threshold(&self) -> u64 {
        (self.rbound * self.nwalks as f64).ceil() as u64
    }

    /// Absolute per-block stop threshold.
    pub fn block_stop_threshold(&self) -> u64 {
        (self.rboundin * self.nwalks as f64).ceil() as u64
    }
}
