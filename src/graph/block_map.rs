use std::path::Path;

use crate::error::StriderError;
use crate::graph::manifest::Manifest;
use crate::graph::types::{BlockId, VertexId};

/// Dense vertex-to-block map plus the per-block vertex ranges.
///
/// Read-only at run time and freely shared across threads.
pub struct BlockMap {
    block_of: Vec<u8>,
    /// Half-open `[first, end)` vertex range per block.
    ranges: Vec<(VertexId, VertexId)>,
}

impl BlockMap {
    pub fn load(block_of_path: &Path, manifest: &Manifest) -> Result<Self, StriderError> {
        let block_of =
            std::fs::read(block_of_path).map_err(|e| StriderError::io(block_of_path, e))?;
        if block_of.len() != manifest.nvertices as usize {
            return Err(StriderError::BadInput(format!(
                "{}: expected {} bytes, found {}",
                block_of_path.display(),
                manifest.nvertices,
                block_of.len()
            )));
        }
        let ranges = manifest
            .blocks
            .iter()
            .map(|b| (b.first_vertex, b.end_vertex))
            .collect();
        let map = Self { block_of, ranges };
        map.check(manifest)?;
        Ok(map)
    }

    /// Build directly from parts; used by the partitioner and by tests.
    pub fn from_parts(block_of: Vec<u8>, ranges: Vec<(VertexId, VertexId)>) -> Self {
        Self { block_of, ranges }
    }

    fn check(&self, manifest: &Manifest) -> Result<(), StriderError> {
        let mut expect_next = 0u32;
        for (k, &(first, end)) in self.ranges.iter().enumerate() {
            if first != expect_next || end < first {
                return Err(StriderError::BadInput(format!(
                    "block {k} range [{first}, {end}) does not tile [0, {})",
                    manifest.nvertices
                )));
            }
            expect_next = end;
        }
        if expect_next != manifest.nvertices {
            return Err(StriderError::BadInput(format!(
                "block ranges cover [0, {expect_next}) but V = {}",
                manifest.nvertices
            )));
        }
        for (v, &k) in self.block_of.iter().enumerate() {
            let (first, end) = *self
                .ranges
                .get(k as usize)
                .ok_or_else(|| StriderError::BadInput(format!("vertex {v}: block {k} unknown")))?;
            if (v as u32) < first || v as u32 >= end {
                return Err(StriderError::BadInput(format!(
                    "vertex {v} maps to block {k} but lies outside [{first}, {end})"
                )));
            }
        }
        Ok(())
    }

    pub fn block_of(&self, v: VertexId) -> BlockId {
        self.block_of[v as usize] as BlockId
    }

    pub fn nblocks(&self) -> usize {
        self.ranges.len()
    }

    pub fn nvertices(&self) -> u32 {
        self.block_of.len() as u32
    }

    pub fn range(&self, k: BlockId) -> (VertexId, VertexId) {
        self.ranges[k as usize]
    }
}
