use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU8, Ordering};

use aligned_vec::{AVec, ConstAlign};

use crate::graph::types::{BlockId, VertexId};

/// Alignment required for direct I/O (512 bytes covers all common
/// block devices). Chunk sizes are validated against it and window
/// reads are rounded up to it.
pub const IO_ALIGN: usize = 512;

/// A chunk's backing storage, aligned for `O_DIRECT` reads.
pub type AlignedBuf = AVec<u8, ConstAlign<IO_ALIGN>>;

pub fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Lifecycle of a chunk buffer. Transitions follow
/// `FREE -> LOADING -> READY -> EVICTED -> FREE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChunkState {
    Free = 0,
    Loading = 1,
    Ready = 2,
    Evicted = 3,
}

/// Metadata describing the bytes currently held by a chunk.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkMeta {
    pub block: BlockId,
    /// Byte offset of the window within the block file.
    pub blk_beg_off: u64,
    /// Bytes of the block actually covered; the tail window may be
    /// shorter than the buffer.
    pub load_sz: usize,
    /// The vertex whose record starts at or spans `blk_beg_off`.
    pub beg_vert: VertexId,
}

/// One reusable page-aligned buffer plus its metadata.
///
/// Access discipline: the I/O thread owns `buf` and `meta` exclusively
/// from the `free_q` pop until the slot lands in `load_q` (state
/// LOADING); the compute side then reads them exclusively until it
/// returns the slot to `free_q` (states READY/EVICTED). The ring
/// hand-off orders those accesses, so the unsynchronized cells are
/// never aliased mutably.
pub struct ChunkSlot {
    state: AtomicU8,
    meta: UnsafeCell<ChunkMeta>,
    buf: UnsafeCell<AlignedBuf>,
}

unsafe impl Sync for ChunkSlot {}

impl ChunkSlot {
    pub fn new(chunk_bytes: usize) -> Self {
        Self {
            state: AtomicU8::new(ChunkState::Free as u8),
            meta: UnsafeCell::new(ChunkMeta::default()),
            buf: UnsafeCell::new(AVec::from_iter(
                IO_ALIGN,
                std::iter::repeat_n(0u8, chunk_bytes),
            )),
        }
    }

    pub fn state(&self) -> ChunkState {
        match self.state.load(Ordering::Acquire) {
            0 => ChunkState::Free,
            1 => ChunkState::Loading,
            2 => ChunkState::Ready,
            _ => ChunkState::Evicted,
        }
    }

    pub fn set_state(&self, state: ChunkState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// I/O side: mutable view of the buffer. Caller must hold the slot
    /// exclusively (popped from `free_q`, not yet published).
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn buf_mut(&self) -> &mut AlignedBuf {
        unsafe { &mut *self.buf.get() }
    }

    /// I/O side: set the window metadata before publishing the slot.
    pub unsafe fn set_meta(&self, meta: ChunkMeta) {
        unsafe { *self.meta.get() = meta };
    }

    /// Compute side: metadata of a READY slot.
    pub fn meta(&self) -> ChunkMeta {
        debug_assert_eq!(self.state(), ChunkState::Ready);
        unsafe { *self.meta.get() }
    }

    /// Compute side: the loaded bytes of a READY slot.
    pub fn bytes(&self) -> &[u8] {
        debug_assert_eq!(self.state(), ChunkState::Ready);
        let meta = unsafe { *self.meta.get() };
        let buf = unsafe { &*self.buf.get() };
        &buf[..meta.load_sz]
    }
}

/// The sequential read windows covering a block file: `(offset,
/// real_len)` pairs in ascending offset order. `real_len` is the byte
/// count meaningful to the consumer; the I/O layer rounds its reads up
/// to the device alignment separately.
pub fn windows(file_size: u64, chunk_bytes: usize) -> impl Iterator<Item = (u64, usize)> {
    let chunk = chunk_bytes as u64;
    (0..file_size.div_ceil(chunk)).map(move |i| {
        let off = i * chunk;
        (off, (file_size - off).min(chunk) as usize)
    })
}
