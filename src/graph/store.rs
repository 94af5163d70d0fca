use std::path::{Path, PathBuf};
use std::sync::Arc;

use zerocopy::byteorder::little_endian::U32;
use zerocopy::FromBytes;

use crate::error::StriderError;
use crate::graph::block_map::BlockMap;
use crate::graph::manifest::Manifest;
use crate::graph::paths;
use crate::graph::types::VertexId;

/// A partitioned graph on disk, opened read-only for a run.
///
/// Internally the engine works in BFS-rank vertex ids (the order the
/// partitioner emitted records in); `order` and `rank` translate to
/// and from the edge list's original ids at the API boundary.
pub struct GraphStore {
    dir: PathBuf,
    manifest: Manifest,
    block_map: Arc<BlockMap>,
    /// Internal id -> original id.
    order: Vec<VertexId>,
    /// Original id -> internal id.
    rank: Vec<VertexId>,
}

impl GraphStore {
    /// Open the block directory for `input` (either the edge-list path
    /// the graph was partitioned from, or the block directory itself).
    pub fn open(input: &Path) -> Result<Self, StriderError> {
        let dir = resolve_block_dir(input);
        let manifest = Manifest::load(&paths::manifest_path(&dir))?;
        for (k, entry) in manifest.blocks.iter().enumerate() {
            if entry.index != k as u32 {
                return Err(StriderError::BadInput(format!(
                    "manifest block entry {k} carries index {}",
                    entry.index
                )));
            }
        }
        let block_map = Arc::new(BlockMap::load(&paths::block_of_path(&dir), &manifest)?);

        let order_path = paths::order_path(&dir);
        let raw = std::fs::read(&order_path).map_err(|e| StriderError::io(&order_path, e))?;
        let entries = <[U32]>::ref_from_bytes(&raw[..]).map_err(|_| {
            StriderError::BadInput(format!("{}: truncated", order_path.display()))
        })?;
        if entries.len() != manifest.nvertices as usize {
            return Err(StriderError::BadInput(format!(
                "{}: expected {} entries, found {}",
                order_path.display(),
                manifest.nvertices,
                entries.len()
            )));
        }
        let mut order = Vec::new();
        order
            .try_reserve_exact(entries.len())
            .map_err(|_| StriderError::Oom("vertex order"))?;
        order.extend(entries.iter().map(|e| e.get()));

        let mut rank = Vec::new();
        rank.try_reserve_exact(order.len())
            .map_err(|_| StriderError::Oom("vertex rank"))?;
        rank.resize(order.len(), u32::MAX);
        for (internal, &orig) in order.iter().enumerate() {
            let slot = rank
                .get_mut(orig as usize)
                .ok_or_else(|| StriderError::BadInput(format!("order entry {orig} out of range")))?;
            if *slot != u32::MAX {
                return Err(StriderError::BadInput(format!(
                    "order maps original id {orig} twice"
                )));
            }
            *slot = internal as u32;
        }

        Ok(Self {
            dir,
            manifest,
            block_map,
            order,
            rank,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn block_map(&self) -> &Arc<BlockMap> {
        &self.block_map
    }

    pub fn nvertices(&self) -> u32 {
        self.manifest.nvertices
    }

    /// Internal id of an original vertex id.
    pub fn to_internal(&self, orig: VertexId) -> Result<VertexId, StriderError> {
        self.rank
            .get(orig as usize)
            .copied()
            .filter(|&r| r != u32::MAX)
            .ok_or_else(|| StriderError::BadInput(format!("vertex {orig} out of range")))
    }

    /// Original id of an internal vertex id.
    pub fn to_original(&self, internal: VertexId) -> VertexId {
        self.order[internal as usize]
    }

    pub fn order(&self) -> &[VertexId] {
        &self.order
    }
}

/// `input` may name the edge list or the block directory itself.
fn resolve_block_dir(input: &Path) -> PathBuf {
    if input.is_dir() && paths::manifest_path(input).is_file() {
        input.to_path_buf()
    } else {
        paths::block_dir(input)
    }
}
