//! Scheduler loop and compute pool.
//!
//! One coordinator thread runs the activation loop: pick the hottest
//! block, stream it through the chunk cache, dispatch each chunk to
//! the pooled workers, and re-evaluate. Workers shard the vertices of
//! a chunk by `v % execthreads`, so each vertex queue is drained by
//! exactly one thread per chunk; the per-chunk join is the memory
//! barrier between activations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::StriderError;
use crate::graph::beg_index::BegIndex;
use crate::graph::block_map::BlockMap;
use crate::graph::paths;
use crate::graph::record::RecordView;
use crate::graph::store::GraphStore;
use crate::graph::types::{BlockId, VertexId};
use crate::io::cache::{CacheShared, ChunkCache, ChunkHandle};
use crate::io::chunk::ChunkMeta;
use crate::output::Visits;
use crate::walk::kernel::{self, rng_stream};
use crate::walk::manager::WalkManager;
use crate::walk::Walk;

/// Summary of one scheduler run.
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub activations: u64,
    pub chunks: u64,
    pub walks_seeded: u64,
    pub walks_completed: u64,
    pub walks_live: u64,
    pub cancelled: bool,
}

/// Carry-over bytes of a record that straddles a chunk boundary:
/// everything seen of it so far, ending exactly at the next chunk's
/// first byte. Snapshotted per chunk so workers can read it freely.
struct Carry {
    vert: Option<VertexId>,
    bytes: Vec<u8>,
}

/// Everything a worker needs to process one chunk shard.
struct ChunkJob {
    cache: Arc<CacheShared>,
    slot: usize,
    meta: ChunkMeta,
    carry: Arc<Carry>,
    block: BlockId,
    index: Arc<BegIndex>,
    walks: Arc<WalkManager>,
    block_map: Arc<BlockMap>,
    visits: Arc<Visits>,
    rngs: Arc<Vec<Mutex<ChaCha8Rng>>>,
    alpha: f32,
    nvertices: VertexId,
    max_hops: u32,
    nshards: usize,
}

enum PoolTask {
    Chunk { job: Arc<ChunkJob>, shard: usize },
}

struct WorkerPool {
    task_tx: Option<flume::Sender<PoolTask>>,
    done_rx: flume::Receiver<Result<(), StriderError>>,
    threads: Vec<JoinHandle<()>>,
    size: usize,
}

impl WorkerPool {
    fn new(size: usize) -> Self {
        let (task_tx, task_rx) = flume::unbounded::<PoolTask>();
        let (done_tx, done_rx) = flume::unbounded();
        let threads = (0..size)
            .map(|i| {
                let task_rx = task_rx.clone();
                let done_tx = done_tx.clone();
                std::thread::Builder::new()
                    .name(format!("strider-worker-{i}"))
                    .spawn(move || {
                        while let Ok(PoolTask::Chunk { job, shard }) = task_rx.recv() {
                            let result = process_chunk_shard(&job, shard);
                            if done_tx.send(result).is_err() {
                                break;
                            }
                        }
                    })
                    .expect("spawn compute worker")
            })
            .collect();
        Self {
            task_tx: Some(task_tx),
            done_rx,
            threads,
            size,
        }
    }

    /// Fan a chunk out to every shard and join.
    fn run_chunk(&self, job: Arc<ChunkJob>) -> Result<(), StriderError> {
        let tx = self.task_tx.as_ref().expect("pool alive");
        for shard in 0..self.size {
            tx.send(PoolTask::Chunk {
                job: Arc::clone(&job),
                shard,
            })
            .expect("workers alive");
        }
        let mut first_err = None;
        for _ in 0..self.size {
            match self.done_rx.recv() {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    first_err.get_or_insert(err);
                }
                Err(_) => {
                    first_err.get_or_insert(StriderError::Oom("compute pool disconnected"));
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        drop(self.task_tx.take());
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

/// The run-time core: owns the graph, the walk multiset, the chunk
/// cache, and the compute pool.
pub struct Engine {
    cfg: EngineConfig,
    store: GraphStore,
    walks: Arc<WalkManager>,
    visits: Arc<Visits>,
    cache: ChunkCache,
    pool: WorkerPool,
    rngs: Arc<Vec<Mutex<ChaCha8Rng>>>,
    seed_rng: ChaCha8Rng,
    cancel: Arc<AtomicBool>,
    crc_checked: Vec<bool>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

impl Engine {
    pub fn new(cfg: EngineConfig, store: GraphStore) -> Result<Self, StriderError> {
        cfg.validate()?;
        if store.nvertices() != cfg.nvertices {
            return Err(StriderError::BadInput(format!(
                "nvertices {} does not match the partitioned graph ({})",
                cfg.nvertices,
                store.nvertices()
            )));
        }
        let walks = Arc::new(WalkManager::new(
            Arc::clone(store.block_map()),
            cfg.stop_threshold(),
            cfg.policy,
        )?);
        let visits = Arc::new(Visits::new(cfg.nvertices)?);
        let cancel = Arc::new(AtomicBool::new(false));
        let cache = ChunkCache::new(
            cfg.chunk_bytes,
            cfg.num_chunks,
            cfg.io_depth,
            Arc::clone(&cancel),
        );
        // Stream 0 seeds; streams 1..=T drive the compute shards.
        let rngs = Arc::new(
            (0..cfg.exec_threads)
                .map(|i| Mutex::new(rng_stream(cfg.seed, i as u64 + 1)))
                .collect::<Vec<_>>(),
        );
        let pool = WorkerPool::new(cfg.exec_threads);
        let nblocks = store.block_map().nblocks();
        Ok(Self {
            seed_rng: rng_stream(cfg.seed, 0),
            cfg,
            store,
            walks,
            visits,
            cache,
            pool,
            rngs,
            cancel,
            crc_checked: vec![false; nblocks],
        })
    }

    /// Flag checked at every scheduler iteration and `poll_ready`;
    /// setting it ends the run with partial visit counts.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn visits(&self) -> &Visits {
        &self.visits
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    /// Place the initial walks. `sources` are original vertex ids,
    /// assigned round-robin; with `None`, sources are drawn uniformly.
    pub fn seed_walks(&mut self, sources: Option<&[VertexId]>) -> Result<(), StriderError> {
        let mut seeds = Vec::new();
        seeds
            .try_reserve_exact(self.cfg.nwalks as usize)
            .map_err(|_| StriderError::Oom("walk seeds"))?;
        match sources {
            Some(orig) if !orig.is_empty() => {
                for i in 0..self.cfg.nwalks {
                    let v = orig[(i % orig.len() as u64) as usize];
                    seeds.push(self.store.to_internal(v)?);
                }
            }
            _ => {
                for _ in 0..self.cfg.nwalks {
                    seeds.push(self.seed_rng.gen_range(0..self.cfg.nvertices));
                }
            }
        }
        self.walks.seed(&seeds)
    }

    /// The scheduler loop: activate hottest blocks until the stop
    /// threshold is met or the caller cancels.
    pub fn run(&mut self) -> Result<RunStats, StriderError> {
        let mut stats = RunStats::default();
        let inner_stop = self.cfg.block_stop_threshold();

        while !self.walks.done() {
            if self.cancel.load(Ordering::Relaxed) {
                stats.cancelled = true;
                break;
            }
            let Some(block) = self.walks.hottest_block(inner_stop) else {
                break;
            };

            let (first, end) = self.store.block_map().range(block);
            let entry = &self.store.manifest().blocks[block as usize];
            let index = Arc::new(BegIndex::load(
                &paths::block_idx_path(self.store.dir(), block),
                first,
                end,
            )?);
            if index.file_size() != entry.bytes {
                return Err(StriderError::BadInput(format!(
                    "block {block}: index covers {} bytes but manifest says {}",
                    index.file_size(),
                    entry.bytes
                )));
            }

            debug!(
                block,
                walks = self.walks.walks_in_block(block),
                "activating block"
            );
            self.cache.open(
                block,
                paths::block_adj_path(self.store.dir(), block),
                entry.bytes,
                Arc::clone(&index),
            )?;
            let drained = self.drain_block(block, &index, inner_stop, &mut stats);
            let closed = self.cache.close();
            match drained {
                Ok(()) => closed?,
                Err(StriderError::Cancelled) => {
                    stats.cancelled = true;
                    break;
                }
                Err(err) => return Err(err),
            }
            stats.activations += 1;
        }

        stats.walks_seeded = self.walks.walks_seeded();
        stats.walks_completed = self.walks.walks_terminated();
        stats.walks_live = stats.walks_seeded - stats.walks_completed;
        info!(
            activations = stats.activations,
            chunks = stats.chunks,
            completed = stats.walks_completed,
            live = stats.walks_live,
            cancelled = stats.cancelled,
            "run finished"
        );
        Ok(stats)
    }

    /// Consume one activation's chunks in FIFO order.
    ///
    /// An unverified block's CRC accumulates chunk by chunk and is
    /// compared against the manifest when the final chunk arrives; an
    /// activation cut short by a stop threshold leaves the block
    /// unverified until a later activation streams it end to end.
    fn drain_block(
        &mut self,
        block: BlockId,
        index: &Arc<BegIndex>,
        inner_stop: u64,
        stats: &mut RunStats,
    ) -> Result<(), StriderError> {
        let mut carry = Carry {
            vert: None,
            bytes: Vec::new(),
        };
        let expect_crc = self.store.manifest().blocks[block as usize].crc32c;
        let mut crc = if self.crc_checked[block as usize] {
            None
        } else {
            Some((0u32, 0u64))
        };
        loop {
            if self.walks.walks_in_block(block) <= inner_stop {
                return Ok(());
            }
            let Some(chunk) = self.cache.poll_ready()? else {
                return Ok(());
            };
            stats.chunks += 1;

            let mut verified = false;
            if let Some((acc, next_off)) = crc.as_mut() {
                let meta = chunk.meta();
                debug_assert_eq!(meta.blk_beg_off, *next_off);
                *acc = crc32c::crc32c_append(*acc, chunk.bytes());
                *next_off += meta.load_sz as u64;
                if *next_off == index.file_size() {
                    if *acc != expect_crc {
                        self.cache.release(chunk);
                        return Err(StriderError::CrcMismatch(block));
                    }
                    verified = true;
                }
            }
            if verified {
                crc = None;
                self.crc_checked[block as usize] = true;
            }

            let result = self.run_one_chunk(block, index, &chunk, &mut carry);
            self.cache.release(chunk);
            result?;
        }
    }

    fn run_one_chunk(
        &self,
        block: BlockId,
        index: &Arc<BegIndex>,
        chunk: &ChunkHandle<'_>,
        carry: &mut Carry,
    ) -> Result<(), StriderError> {
        let meta = chunk.meta();
        let job = Arc::new(ChunkJob {
            cache: Arc::clone(self.cache.shared()),
            slot: chunk.slot,
            meta,
            carry: Arc::new(Carry {
                vert: carry.vert,
                bytes: std::mem::take(&mut carry.bytes),
            }),
            block,
            index: Arc::clone(index),
            walks: Arc::clone(&self.walks),
            block_map: Arc::clone(self.store.block_map()),
            visits: Arc::clone(&self.visits),
            rngs: Arc::clone(&self.rngs),
            alpha: self.cfg.alpha,
            nvertices: self.cfg.nvertices,
            max_hops: self.cfg.nsteps,
            nshards: self.cfg.exec_threads,
        });
        let ran = self.pool.run_chunk(Arc::clone(&job));

        // Roll the carry forward to cover the record left incomplete at
        // this chunk's end, before the buffer is recycled.
        let win_end = meta.blk_beg_off + meta.load_sz as u64;
        *carry = Carry {
            vert: None,
            bytes: Vec::new(),
        };
        if win_end < index.file_size() {
            let tail = index.vertex_at(win_end).expect("offset inside block");
            if index.beg(tail) < win_end {
                let mut bytes = if job.carry.vert == Some(tail) {
                    job.carry.bytes.clone()
                } else {
                    Vec::new()
                };
                let from = index.beg(tail).max(meta.blk_beg_off) - meta.blk_beg_off;
                bytes.extend_from_slice(&chunk.bytes()[from as usize..meta.load_sz]);
                *carry = Carry {
                    vert: Some(tail),
                    bytes,
                };
            }
        }
        ran
    }
}

/// Process one vertex shard of a READY chunk: for every vertex whose
/// record is completed by this chunk and belongs to the shard, drain
/// its walk queue, stepping each walk locally while its target record
/// stays inside the chunk.
fn process_chunk_shard(job: &ChunkJob, shard: usize) -> Result<(), StriderError> {
    let meta = job.meta;
    let bytes = job.cache.chunk(job.slot).bytes();
    let off = meta.blk_beg_off;
    let len = meta.load_sz as u64;
    let mut rng = job.rngs[shard].lock();

    for v in job.index.ending_in(off, len) {
        if v as usize % job.nshards != shard {
            continue;
        }
        let view = record_view(job, v, bytes, off);
        debug_assert_eq!(view.vertex_id(), v);
        while let Some(walk) = job.walks.pop(v) {
            step_walk(job, &mut rng, walk, v, view, bytes, off, len)?;
        }
    }
    Ok(())
}

/// The record for `v`, assembled from the carry buffer when its head
/// lies in earlier chunks.
fn record_view<'a>(
    job: &'a ChunkJob,
    v: VertexId,
    chunk_bytes: &'a [u8],
    off: u64,
) -> RecordView<'a> {
    let beg = job.index.beg(v);
    let end = job.index.end(v);
    if beg >= off {
        RecordView::contiguous(&chunk_bytes[(beg - off) as usize..(end - off) as usize])
    } else {
        debug_assert_eq!(job.carry.vert, Some(v));
        debug_assert_eq!(job.carry.bytes.len() as u64, off - beg);
        RecordView::split(&job.carry.bytes, &chunk_bytes[..(end - off) as usize])
    }
}

/// Step one walk until it terminates, or leaves the bytes this chunk
/// holds and is re-homed onto its target's queue.
#[allow(clippy::too_many_arguments)]
fn step_walk(
    job: &ChunkJob,
    rng: &mut ChaCha8Rng,
    mut walk: Walk,
    start: VertexId,
    start_view: RecordView<'_>,
    chunk_bytes: &[u8],
    off: u64,
    len: u64,
) -> Result<(), StriderError> {
    let mut cur = start;
    let mut view = start_view;
    loop {
        if walk.hop() == job.max_hops {
            job.visits.bump(cur);
            job.walks.note_terminated();
            return Ok(());
        }
        let next = kernel::choose_next(rng, job.alpha, &view, job.nvertices);
        walk = walk.advanced()?;
        // Cache hit: keep stepping while the target's record is fully
        // resident in this chunk.
        if job.block_map.block_of(next) == job.block && job.index.within(next, off, len) {
            let beg = (job.index.beg(next) - off) as usize;
            let end = (job.index.end(next) - off) as usize;
            view = RecordView::contiguous(&chunk_bytes[beg..end]);
            cur = next;
        } else {
            job.walks.push(next, walk);
            return Ok(());
        }
    }
}
