use std::ops::Range;
use std::path::Path;

use zerocopy::byteorder::little_endian::U64;
use zerocopy::FromBytes;

use crate::error::StriderError;
use crate::graph::types::VertexId;

/// Block-wise begin-position index: for each vertex in a block's range,
/// the byte offset of its adjacency record within the block file. One
/// trailing entry equals the file size, so `[beg(v), end(v))` is always
/// well formed.
///
/// Loaded per activation from the `.idx` sidecar; shared read-only with
/// the cache's I/O thread and the compute workers.
pub struct BegIndex {
    first: VertexId,
    offs: Vec<u64>,
}

impl BegIndex {
    pub fn load(path: &Path, first: VertexId, end: VertexId) -> Result<Self, StriderError> {
        let raw = std::fs::read(path).map_err(|e| StriderError::io(path, e))?;
        let entries = <[U64]>::ref_from_bytes(&raw[..])
            .map_err(|_| StriderError::BadInput(format!("{}: truncated", path.display())))?;
        let expect = (end - first) as usize + 1;
        if entries.len() != expect {
            return Err(StriderError::BadInput(format!(
                "{}: expected {expect} offsets, found {}",
                path.display(),
                entries.len()
            )));
        }
        let offs: Vec<u64> = entries.iter().map(|e| e.get()).collect();
        if !offs.is_sorted() {
            return Err(StriderError::BadInput(format!(
                "{}: offsets not monotone",
                path.display()
            )));
        }
        Ok(Self { first, offs })
    }

    pub fn from_offsets(first: VertexId, offs: Vec<u64>) -> Self {
        Self { first, offs }
    }

    pub fn first_vertex(&self) -> VertexId {
        self.first
    }

    pub fn nrecords(&self) -> u32 {
        (self.offs.len() - 1) as u32
    }

    pub fn file_size(&self) -> u64 {
        *self.offs.last().unwrap()
    }

    /// Byte offset of `v`'s record within the block file.
    pub fn beg(&self, v: VertexId) -> u64 {
        self.offs[(v - self.first) as usize]
    }

    /// One past the last byte of `v`'s record.
    pub fn end(&self, v: VertexId) -> u64 {
        self.offs[(v - self.first) as usize + 1]
    }

    /// The vertex whose record contains byte `off`, if any.
    pub fn vertex_at(&self, off: u64) -> Option<VertexId> {
        if off >= self.file_size() {
            return None;
        }
        // Records are at least header-sized, so offsets are strictly
        // increasing and the containing record is unique.
        let i = self.offs.partition_point(|&o| o <= off);
        Some(self.first + i as u32 - 1)
    }

    /// Vertices whose records end inside the window `[off, off + len)`
    /// of the block file (the half-open upper bound is inclusive of the
    /// window end, since a record ending exactly at `off + len` is
    /// complete in this window).
    pub fn ending_in(&self, off: u64, len: u64) -> Range<VertexId> {
        let lo = self.offs[1..].partition_point(|&o| o <= off);
        let hi = self.offs[1..].partition_point(|&o| o <= off + len);
        self.first + lo as u32..self.first + hi as u32
    }

    /// True when `v`'s whole record lies inside `[off, off + len)`.
    pub fn within(&self, v: VertexId, off: u64, len: u64) -> bool {
        self.beg(v) >= off && self.end(v) <= off + len
    }
}
