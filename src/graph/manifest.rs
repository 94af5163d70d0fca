use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::StriderError;

/// Per-block entry in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockEntry {
    pub index: u32,
    /// First vertex id owned by the block.
    pub first_vertex: u32,
    /// One past the last vertex id owned by the block.
    pub end_vertex: u32,
    /// Size of `block_<k>.adj` in bytes.
    pub bytes: u64,
    /// CRC-32C of the block file, verified on first activation.
    pub crc32c: u32,
}

/// `manifest.toml`, written by the partitioner and read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub nvertices: u32,
    pub nblocks: u32,
    /// Suggested streaming chunk size recorded at partition time; the
    /// runtime may override it.
    pub chunk_bytes: u64,
    /// Block size bound the partitioner was run with.
    pub block_bytes: u64,
    pub blocks: Vec<BlockEntry>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self, StriderError> {
        let text =
            std::fs::read_to_string(path).map_err(|e| StriderError::io(path, e))?;
        let manifest: Manifest = toml::from_str(&text)
            .map_err(|e| StriderError::BadInput(format!("manifest {}: {e}", path.display())))?;
        if manifest.nblocks as usize != manifest.blocks.len() {
            return Err(StriderError::BadInput(format!(
                "manifest {}: nblocks {} disagrees with {} block entries",
                path.display(),
                manifest.nblocks,
                manifest.blocks.len()
            )));
        }
        Ok(manifest)
    }

    pub fn store(&self, path: &Path) -> Result<(), StriderError> {
        let text = toml::to_string(self)
            .map_err(|e| StriderError::BadInput(format!("manifest serialize: {e}")))?;
        std::fs::write(path, text).map_err(|e| StriderError::io(path, e))
    }
}
