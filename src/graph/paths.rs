//! On-disk layout of a partitioned graph.
//!
//! Everything derived from one input path `<file>`:
//!
//! ```text
//! <file>_invl/invl_<i>.bin    stage-A intervals (removed after stage B)
//! <file>_block/block_of.u8    owning block index, one byte per vertex
//! <file>_block/order.u32      BFS emission order: new id -> original id
//! <file>_block/block_<k>.adj  adjacency records
//! <file>_block/block_<k>.idx  cumulative record offsets
//! <file>_block/manifest.toml
//! ```

use std::path::{Path, PathBuf};

fn sibling(input: &Path, suffix: &str) -> PathBuf {
    let mut name = input.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    input.with_file_name(name)
}

pub fn interval_dir(input: &Path) -> PathBuf {
    sibling(input, "_invl")
}

pub fn interval_path(input: &Path, i: usize) -> PathBuf {
    interval_dir(input).join(format!("invl_{i}.bin"))
}

pub fn block_dir(input: &Path) -> PathBuf {
    sibling(input, "_block")
}

pub fn block_adj_path(dir: &Path, k: u32) -> PathBuf {
    dir.join(format!("block_{k}.adj"))
}

pub fn block_idx_path(dir: &Path, k: u32) -> PathBuf {
    dir.join(format!("block_{k}.idx"))
}

pub fn block_of_path(dir: &Path) -> PathBuf {
    dir.join("block_of.u8")
}

pub fn order_path(dir: &Path) -> PathBuf {
    dir.join("order.u32")
}

pub fn manifest_path(dir: &Path) -> PathBuf {
    dir.join("manifest.toml")
}
