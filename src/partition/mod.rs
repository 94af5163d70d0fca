//! Offline partitioner: edge list in, adjacency blocks out.
//!
//! Stage A ([`interval::build_intervals`]) streams the edge list into
//! RAM-sized interval files; stage B BFS-orders the vertices
//! ([`bfs::bfs_order`]) and streams them into block files bounded by
//! `block_bytes`, producing `block_of.u8`, `order.u32`, one `.idx`
//! begin-position sidecar per block, and `manifest.toml`.

pub mod bfs;
pub mod edge_list;
pub mod interval;

use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::info;
use zerocopy::byteorder::little_endian::U32;
use zerocopy::IntoBytes;

use crate::error::StriderError;
use crate::graph::manifest::{BlockEntry, Manifest};
use crate::graph::paths;
use crate::graph::record::{record_bytes, RecordHeader};
use crate::graph::types::{VertexId, MAX_BLOCKS};
use crate::partition::interval::IntervalCache;

#[derive(Debug, Clone)]
pub struct PartitionParams {
    pub nvertices: VertexId,
    pub block_bytes: u64,
    pub interval_bytes: u64,
    /// Recorded in the manifest as the suggested streaming chunk size.
    pub chunk_bytes: u64,
}

struct BlockWriter {
    writer: BufWriter<std::fs::File>,
    index: u32,
    first: VertexId,
    offs: Vec<u64>,
    written: u64,
    crc: u32,
}

/// Partition `input` into `<input>_block/`. One-shot and offline;
/// deterministic for a given input and parameter set.
pub fn partition(input: &Path, params: &PartitionParams) -> Result<Manifest, StriderError> {
    if params.nvertices == 0 {
        return Err(StriderError::BadInput("nvertices must be positive".into()));
    }

    info!(input = %input.display(), nvertices = params.nvertices, "partitioning");
    let intervals = interval::build_intervals(input, params.nvertices, params.interval_bytes)?;
    info!(intervals = intervals.len(), "stage A complete");
    let order = bfs::bfs_order(&intervals, params.nvertices)?;

    // rank[original id] = emission rank = the id used on disk.
    let mut rank = Vec::new();
    rank.try_reserve_exact(order.len())
        .map_err(|_| StriderError::Oom("vertex rank"))?;
    rank.resize(order.len(), 0u32);
    for (new_id, &orig) in order.iter().enumerate() {
        rank[orig as usize] = new_id as u32;
    }

    let dir = paths::block_dir(input);
    std::fs::create_dir_all(&dir).map_err(|e| StriderError::io(&dir, e))?;

    let mut block_of = Vec::new();
    block_of
        .try_reserve_exact(order.len())
        .map_err(|_| StriderError::Oom("block_of map"))?;

    let mut cache = IntervalCache::new(&intervals);
    let mut entries: Vec<BlockEntry> = Vec::new();
    let mut block: Option<BlockWriter> = None;
    let mut record: Vec<u8> = Vec::new();

    for (new_id, &orig) in order.iter().enumerate() {
        let new_id = new_id as u32;
        let (degree, neighbor_bytes) = cache.record(orig)?;
        let rec_bytes = record_bytes(degree as u64);
        if rec_bytes > params.block_bytes {
            return Err(StriderError::BlockTooSmall {
                vertex: orig,
                record_bytes: rec_bytes,
                block_bytes: params.block_bytes,
            });
        }

        record.clear();
        let header = RecordHeader {
            vertex_id: U32::new(new_id),
            out_degree: U32::new(degree),
        };
        record.extend_from_slice(header.as_bytes());
        for i in 0..degree as usize {
            let raw = &neighbor_bytes[4 * i..4 * i + 4];
            let to = u32::from_le_bytes(raw.try_into().unwrap());
            record.extend_from_slice(&rank[to as usize].to_le_bytes());
        }

        if block
            .as_ref()
            .is_some_and(|b| b.written + rec_bytes > params.block_bytes)
        {
            close_block(&dir, block.take().unwrap(), new_id, &mut entries)?;
        }
        if block.is_none() {
            let index = entries.len() as u32;
            if index as usize >= MAX_BLOCKS {
                return Err(StriderError::BadInput(format!(
                    "graph needs more than {MAX_BLOCKS} blocks; raise block_sz"
                )));
            }
            let path = paths::block_adj_path(&dir, index);
            let file = std::fs::File::create(&path).map_err(|e| StriderError::io(&path, e))?;
            block = Some(BlockWriter {
                writer: BufWriter::new(file),
                index,
                first: new_id,
                offs: vec![0],
                written: 0,
                crc: 0,
            });
        }

        let b = block.as_mut().unwrap();
        b.writer
            .write_all(&record)
            .map_err(|e| StriderError::io(paths::block_adj_path(&dir, b.index), e))?;
        b.crc = crc32c::crc32c_append(b.crc, &record);
        b.written += rec_bytes;
        b.offs.push(b.written);
        block_of.push(b.index as u8);
    }
    if let Some(b) = block.take() {
        let end = order.len() as u32;
        close_block(&dir, b, end, &mut entries)?;
    }

    let block_of_path = paths::block_of_path(&dir);
    std::fs::write(&block_of_path, &block_of).map_err(|e| StriderError::io(&block_of_path, e))?;

    let order_path = paths::order_path(&dir);
    let mut order_bytes = Vec::with_capacity(order.len() * 4);
    for &orig in &order {
        order_bytes.extend_from_slice(&orig.to_le_bytes());
    }
    std::fs::write(&order_path, order_bytes).map_err(|e| StriderError::io(&order_path, e))?;

    let manifest = Manifest {
        nvertices: params.nvertices,
        nblocks: entries.len() as u32,
        chunk_bytes: params.chunk_bytes,
        block_bytes: params.block_bytes,
        blocks: entries,
    };
    manifest.store(&paths::manifest_path(&dir))?;

    // The intervals were only scaffolding.
    let invl_dir = paths::interval_dir(input);
    std::fs::remove_dir_all(&invl_dir).map_err(|e| StriderError::io(&invl_dir, e))?;

    info!(blocks = manifest.nblocks, dir = %dir.display(), "partition complete");
    Ok(manifest)
}

fn close_block(
    dir: &Path,
    mut block: BlockWriter,
    end: VertexId,
    entries: &mut Vec<BlockEntry>,
) -> Result<(), StriderError> {
    let adj_path = paths::block_adj_path(dir, block.index);
    block
        .writer
        .flush()
        .map_err(|e| StriderError::io(&adj_path, e))?;

    let idx_path = paths::block_idx_path(dir, block.index);
    let mut idx_bytes = Vec::with_capacity(block.offs.len() * 8);
    for &off in &block.offs {
        idx_bytes.extend_from_slice(&off.to_le_bytes());
    }
    std::fs::write(&idx_path, idx_bytes).map_err(|e| StriderError::io(&idx_path, e))?;

    entries.push(BlockEntry {
        index: block.index,
        first_vertex: block.first,
        end_vertex: end,
        bytes: block.written,
        crc32c: block.crc,
    });
    Ok(())
}
