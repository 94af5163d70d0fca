#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};

use strider::graph::paths;
use strider::{partition, Engine, EngineConfig, GraphStore, PartitionParams, RunStats};

/// Write an edge list file with one `src dst` line per edge.
pub fn edges_file(dir: &Path, name: &str, edges: &[(u32, u32)]) -> PathBuf {
    let lines: Vec<String> = edges.iter().map(|(s, d)| format!("{s} {d}")).collect();
    raw_file(dir, name, &lines)
}

/// Write a file with arbitrary lines (for comment/garbage cases).
pub fn raw_file(dir: &Path, name: &str, lines: &[String]) -> PathBuf {
    let path = dir.join(name);
    let mut f = std::fs::File::create(&path).expect("create edge list");
    for line in lines {
        writeln!(f, "{line}").expect("write edge list");
    }
    path
}

/// Test defaults: deterministic single-threaded execution, pure walks
/// (`alpha = 0`), small chunks so even tiny graphs stream.
pub fn base_cfg(nvertices: u32, nwalks: u64, nsteps: u32) -> EngineConfig {
    EngineConfig {
        nvertices,
        nwalks,
        nsteps,
        alpha: 0.0,
        chunk_bytes: 512,
        num_chunks: 4,
        io_depth: 2,
        exec_threads: 1,
        seed: 0,
        ..EngineConfig::default()
    }
}

pub fn partition_params(cfg: &EngineConfig) -> PartitionParams {
    PartitionParams {
        nvertices: cfg.nvertices,
        block_bytes: cfg.block_bytes,
        interval_bytes: cfg.interval_bytes,
        chunk_bytes: cfg.chunk_bytes as u64,
    }
}

/// Partition (if needed), seed, run; returns visit counts in original
/// vertex id order plus the run stats.
pub fn run_engine(
    input: &Path,
    cfg: &EngineConfig,
    sources: Option<&[u32]>,
) -> (Vec<u32>, RunStats) {
    if !paths::manifest_path(&paths::block_dir(input)).is_file() {
        partition(input, &partition_params(cfg)).expect("partition");
    }
    let store = GraphStore::open(input).expect("open store");
    let mut engine = Engine::new(cfg.clone(), store).expect("engine");
    engine.seed_walks(sources).expect("seed");
    let stats = engine.run().expect("run");
    let counts = engine.visits().in_original_order(engine.store().order());
    (counts, stats)
}

/// Decode `block_<k>.adj` into `(vertex_id, neighbors)` records.
pub fn read_block_records(block_dir: &Path, k: u32) -> Vec<(u32, Vec<u32>)> {
    let bytes = std::fs::read(paths::block_adj_path(block_dir, k)).expect("read block");
    let mut records = Vec::new();
    let mut off = 0usize;
    while off < bytes.len() {
        let vid = u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap());
        let deg = u32::from_le_bytes(bytes[off + 4..off + 8].try_into().unwrap()) as usize;
        off += 8;
        let mut neighbors = Vec::with_capacity(deg);
        for _ in 0..deg {
            neighbors.push(u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap()));
            off += 4;
        }
        records.push((vid, neighbors));
    }
    records
}

/// Read `order.u32` as a vector of original ids.
pub fn read_order(block_dir: &Path) -> Vec<u32> {
    let bytes = std::fs::read(paths::order_path(block_dir)).expect("read order");
    bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
        .collect()
}
