use zerocopy::byteorder::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::graph::types::VertexId;

/// On-disk adjacency record header. The `out_degree` neighbor ids
/// (little-endian u32) follow immediately, packed, no padding.
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Clone, Copy)]
#[repr(C)]
pub struct RecordHeader {
    pub vertex_id: U32,
    pub out_degree: U32,
}

pub const RECORD_HEADER_BYTES: u64 = 8;

/// Total on-disk size of a record with the given out-degree.
pub fn record_bytes(out_degree: u64) -> u64 {
    RECORD_HEADER_BYTES + 4 * out_degree
}

/// A record's raw bytes, possibly split across a carry buffer and the
/// chunk that completes it. `head` holds the leading bytes (empty for
/// records wholly inside one chunk), `tail` the rest.
#[derive(Clone, Copy)]
pub struct RecordView<'a> {
    head: &'a [u8],
    tail: &'a [u8],
}

impl<'a> RecordView<'a> {
    pub fn contiguous(bytes: &'a [u8]) -> Self {
        Self {
            head: &[],
            tail: bytes,
        }
    }

    pub fn split(head: &'a [u8], tail: &'a [u8]) -> Self {
        Self { head, tail }
    }

    pub fn len(&self) -> usize {
        self.head.len() + self.tail.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_u32(&self, byte_off: usize) -> u32 {
        let mut raw = [0u8; 4];
        for (i, b) in raw.iter_mut().enumerate() {
            let pos = byte_off + i;
            *b = if pos < self.head.len() {
                self.head[pos]
            } else {
                self.tail[pos - self.head.len()]
            };
        }
        u32::from_le_bytes(raw)
    }

    pub fn vertex_id(&self) -> VertexId {
        self.read_u32(0)
    }

    pub fn out_degree(&self) -> u32 {
        self.read_u32(4)
    }

    /// The `i`-th neighbor id, `i < out_degree`.
    pub fn neighbor(&self, i: u32) -> VertexId {
        self.read_u32(RECORD_HEADER_BYTES as usize + 4 * i as usize)
    }
}
