use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::SelectPolicy;
use crate::error::StriderError;
use crate::graph::block_map::BlockMap;
use crate::graph::types::{BlockId, VertexId};
use crate::walk::Walk;

/// Owner of every live walk.
///
/// Walks are FIFO per vertex; `walks_per_block` mirrors queue totals
/// so the scheduler can pick its next block without touching the
/// queues. The mirror is exact between scheduler iterations (walks a
/// worker is currently stepping are counted in neither place).
pub struct WalkManager {
    queues: Vec<Mutex<VecDeque<Walk>>>,
    per_block: Vec<AtomicU64>,
    block_map: Arc<BlockMap>,
    seeded: AtomicU64,
    terminated: AtomicU64,
    stop_threshold: u64,
    policy: SelectPolicy,
}

impl WalkManager {
    pub fn new(
        block_map: Arc<BlockMap>,
        stop_threshold: u64,
        policy: SelectPolicy,
    ) -> Result<Self, StriderError> {
        let nv = block_map.nvertices() as usize;
        let mut queues = Vec::new();
        queues
            .try_reserve_exact(nv)
            .map_err(|_| StriderError::Oom("per-vertex walk queues"))?;
        queues.extend((0..nv).map(|_| Mutex::new(VecDeque::new())));
        let per_block = (0..block_map.nblocks()).map(|_| AtomicU64::new(0)).collect();
        Ok(Self {
            queues,
            per_block,
            block_map,
            seeded: AtomicU64::new(0),
            terminated: AtomicU64::new(0),
            stop_threshold,
            policy,
        })
    }

    pub fn block_map(&self) -> &Arc<BlockMap> {
        &self.block_map
    }

    /// Place walks with `hop = 0` on the given source vertices.
    pub fn seed(&self, sources: &[VertexId]) -> Result<(), StriderError> {
        for &s in sources {
            self.push(s, Walk::new(s, 0)?);
        }
        self.seeded.fetch_add(sources.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    pub fn push(&self, v: VertexId, walk: Walk) {
        self.queues[v as usize].lock().push_back(walk);
        self.per_block[self.block_map.block_of(v) as usize].fetch_add(1, Ordering::Relaxed);
    }

    pub fn pop(&self, v: VertexId) -> Option<Walk> {
        let walk = self.queues[v as usize].lock().pop_front()?;
        self.per_block[self.block_map.block_of(v) as usize].fetch_sub(1, Ordering::Relaxed);
        Some(walk)
    }

    /// A walk reached its hop limit and left the system.
    pub fn note_terminated(&self) {
        self.terminated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn walks_seeded(&self) -> u64 {
        self.seeded.load(Ordering::Relaxed)
    }

    pub fn walks_terminated(&self) -> u64 {
        self.terminated.load(Ordering::Relaxed)
    }

    pub fn walks_in_block(&self, k: BlockId) -> u64 {
        self.per_block[k as usize].load(Ordering::Relaxed)
    }

    pub fn queue_len(&self, v: VertexId) -> usize {
        self.queues[v as usize].lock().len()
    }

    /// True once at most `stop_threshold` walks remain. Short-circuits
    /// as soon as the partial sum passes the threshold.
    pub fn done(&self) -> bool {
        let mut sum = 0u64;
        for counter in &self.per_block {
            sum += counter.load(Ordering::Relaxed);
            if sum > self.stop_threshold {
                return false;
            }
        }
        true
    }

    /// The block the scheduler should activate next, or `None` when
    /// every block holds at most `min_walks` walks. Blocks at or below
    /// `min_walks` (the per-block stop threshold) are never worth
    /// activating. Ties go to the lowest-indexed block.
    pub fn hottest_block(&self, min_walks: u64) -> Option<BlockId> {
        match self.policy {
            SelectPolicy::MaxWalks => {
                let mut best: Option<(BlockId, u64)> = None;
                for (k, counter) in self.per_block.iter().enumerate() {
                    let count = counter.load(Ordering::Relaxed);
                    if count > min_walks && best.is_none_or(|(_, b)| count > b) {
                        best = Some((k as BlockId, count));
                    }
                }
                best.map(|(k, _)| k)
            }
            SelectPolicy::FirstNonEmpty => self
                .per_block
                .iter()
                .position(|c| c.load(Ordering::Relaxed) > min_walks)
                .map(|k| k as BlockId),
        }
    }
}
