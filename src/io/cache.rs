use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

use crate::error::StriderError;
use crate::graph::beg_index::BegIndex;
use crate::graph::types::BlockId;
use crate::io::chunk::{align_up, windows, ChunkMeta, ChunkSlot, ChunkState, IO_ALIGN};
use crate::io::platform::DirectFile;
use crate::io::ring::SpscRing;

/// State shared between the cache's I/O thread and the compute side.
///
/// The rings are SPSC by protocol: the I/O thread consumes `free_q`
/// and produces `load_q`; the scheduler thread does the opposite on
/// behalf of the compute pool. `load_q` preserves submission order, so
/// the consumer observes chunks in ascending byte offset.
pub struct CacheShared {
    slots: Box<[ChunkSlot]>,
    free_q: SpscRing,
    load_q: SpscRing,
    sleep: Mutex<()>,
    wake: Condvar,
    /// Set once the final window of the current block has been
    /// published (or the block was abandoned on fault/cancel).
    bsp_done: AtomicBool,
    /// Consumer-side request to abandon the rest of the current block.
    stop_block: AtomicBool,
    /// Slots abandoned with reads possibly still in flight after a
    /// failed submission wait; withheld from reuse for good.
    lost: AtomicUsize,
    fault: Mutex<Option<StriderError>>,
    cancel: Arc<AtomicBool>,
}

impl CacheShared {
    pub fn chunk(&self, slot: usize) -> &ChunkSlot {
        &self.slots[slot]
    }

    pub fn num_chunks(&self) -> usize {
        self.slots.len()
    }

    fn notify(&self) {
        let _guard = self.sleep.lock();
        self.wake.notify_all();
    }

    fn set_fault(&self, err: StriderError) {
        *self.fault.lock() = Some(err);
    }

    /// I/O side: blocking pop of a free chunk index. `Ok(None)` means
    /// the consumer closed the block early.
    fn pop_free(&self) -> Result<Option<usize>, StriderError> {
        loop {
            if self.stop_block.load(Ordering::Relaxed) {
                return Ok(None);
            }
            if let Some(slot) = self.free_q.pop() {
                return Ok(Some(slot));
            }
            if self.cancel.load(Ordering::Relaxed) {
                return Err(StriderError::Cancelled);
            }
            let mut guard = self.sleep.lock();
            if self.free_q.is_empty()
                && !self.cancel.load(Ordering::Relaxed)
                && !self.stop_block.load(Ordering::Relaxed)
            {
                self.wake.wait(&mut guard);
            }
        }
    }

    /// I/O side: publish a loaded slot to the consumer.
    fn publish(&self, slot: usize) {
        self.slots[slot].set_state(ChunkState::Ready);
        self.load_q
            .push(slot)
            .expect("load_q sized to hold every chunk");
        self.notify();
    }

    /// I/O side: withhold `n` slots whose reads were submitted but
    /// never confirmed complete. The kernel may still write into their
    /// buffers, so they are never handed back to `free_q`.
    fn quarantine(&self, n: usize) {
        self.lost.fetch_add(n, Ordering::SeqCst);
        self.notify();
    }

    /// Slots settled for good: free for reuse, or permanently
    /// withheld. The complement is what is still checked out or being
    /// loaded.
    fn accounted(&self) -> usize {
        self.free_q.len() + self.lost.load(Ordering::SeqCst)
    }

    /// Hand a slot back unloaded. Normally the consumer returns slots,
    /// but teardown paths (fault, cancel, early close) return them from
    /// the I/O thread too, so the producer end of `free_q` is
    /// serialized under the sleep lock.
    fn recycle(&self, slot: usize) {
        self.slots[slot].set_state(ChunkState::Free);
        let _guard = self.sleep.lock();
        self.free_q
            .push(slot)
            .expect("free_q sized to hold every chunk");
        self.wake.notify_all();
    }
}

struct OpenCmd {
    block: BlockId,
    path: PathBuf,
    file_size: u64,
    index: Arc<BegIndex>,
}

enum IoCmd {
    Open(OpenCmd),
    Shutdown,
}

/// Asynchronous prefetcher streaming one block at a time through a
/// bounded ring of reusable chunks.
///
/// Usage per block activation: `open`, then `poll_ready`/`release`
/// until `poll_ready` returns `None`, then `close`. Buffers are
/// allocated once here and reused for every block.
pub struct ChunkCache {
    shared: Arc<CacheShared>,
    cmd_tx: flume::Sender<IoCmd>,
    io_thread: Option<JoinHandle<()>>,
}

/// A READY chunk checked out by the compute side.
pub struct ChunkHandle<'a> {
    shared: &'a CacheShared,
    pub slot: usize,
}

impl std::fmt::Debug for ChunkHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkHandle").field("slot", &self.slot).finish()
    }
}

impl ChunkHandle<'_> {
    pub fn meta(&self) -> ChunkMeta {
        self.shared.chunk(self.slot).meta()
    }

    pub fn bytes(&self) -> &[u8] {
        self.shared.chunk(self.slot).bytes()
    }
}

impl ChunkCache {
    pub fn new(
        chunk_bytes: usize,
        num_chunks: usize,
        io_depth: usize,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        let slots: Box<[ChunkSlot]> = (0..num_chunks).map(|_| ChunkSlot::new(chunk_bytes)).collect();
        let free_q = SpscRing::new(num_chunks);
        for i in 0..num_chunks {
            free_q.push(i).expect("fresh ring");
        }
        let shared = Arc::new(CacheShared {
            slots,
            free_q,
            load_q: SpscRing::new(num_chunks),
            sleep: Mutex::new(()),
            wake: Condvar::new(),
            bsp_done: AtomicBool::new(true),
            stop_block: AtomicBool::new(false),
            lost: AtomicUsize::new(0),
            fault: Mutex::new(None),
            cancel,
        });

        let (cmd_tx, cmd_rx) = flume::unbounded();
        let io_shared = Arc::clone(&shared);
        let io_thread = std::thread::Builder::new()
            .name("strider-io".into())
            .spawn(move || io_loop(io_shared, cmd_rx, chunk_bytes, io_depth))
            .expect("spawn I/O thread");

        Self {
            shared,
            cmd_tx,
            io_thread: Some(io_thread),
        }
    }

    pub fn shared(&self) -> &Arc<CacheShared> {
        &self.shared
    }

    /// Position the cache on block `block` and start streaming it.
    pub fn open(
        &self,
        block: BlockId,
        path: PathBuf,
        file_size: u64,
        index: Arc<BegIndex>,
    ) -> Result<(), StriderError> {
        debug_assert_eq!(self.shared.accounted(), self.shared.num_chunks());
        debug_assert!(self.shared.load_q.is_empty());
        *self.shared.fault.lock() = None;
        self.shared.stop_block.store(false, Ordering::SeqCst);
        self.shared.bsp_done.store(false, Ordering::SeqCst);
        self.cmd_tx
            .send(IoCmd::Open(OpenCmd {
                block,
                path: path.clone(),
                file_size,
                index,
            }))
            .map_err(|_| {
                StriderError::io(
                    path,
                    std::io::Error::new(std::io::ErrorKind::BrokenPipe, "I/O thread gone"),
                )
            })
    }

    /// Blocking: the next chunk in ascending byte order, or `None` once
    /// the block is exhausted and every prior chunk has been handed out.
    pub fn poll_ready(&self) -> Result<Option<ChunkHandle<'_>>, StriderError> {
        loop {
            if let Some(slot) = self.shared.load_q.pop() {
                return Ok(Some(ChunkHandle {
                    shared: &self.shared,
                    slot,
                }));
            }
            if let Some(err) = self.shared.fault.lock().take() {
                return Err(err);
            }
            if self.shared.cancel.load(Ordering::Relaxed) {
                return Err(StriderError::Cancelled);
            }
            if self.shared.bsp_done.load(Ordering::SeqCst) {
                // One more look: the final publish may have raced the
                // empty check above.
                match self.shared.load_q.pop() {
                    Some(slot) => {
                        return Ok(Some(ChunkHandle {
                            shared: &self.shared,
                            slot,
                        }))
                    }
                    None => return Ok(None),
                }
            }
            let mut guard = self.shared.sleep.lock();
            if self.shared.load_q.is_empty()
                && !self.shared.bsp_done.load(Ordering::SeqCst)
                && !self.shared.cancel.load(Ordering::Relaxed)
                && self.shared.fault.lock().is_none()
            {
                self.shared.wake.wait(&mut guard);
            }
        }
    }

    /// Return a consumed chunk to the free ring.
    pub fn release(&self, handle: ChunkHandle<'_>) {
        let slot = handle.slot;
        self.shared.chunk(slot).set_state(ChunkState::Evicted);
        self.shared.recycle(slot);
    }

    /// Drain in-flight I/O and return every chunk to FREE. Windows not
    /// yet submitted are abandoned. Reports any fault the consumer has
    /// not already observed.
    pub fn close(&self) -> Result<(), StriderError> {
        self.shared.stop_block.store(true, Ordering::SeqCst);
        self.shared.notify();
        loop {
            while let Some(slot) = self.shared.load_q.pop() {
                self.shared.recycle(slot);
            }
            if self.shared.bsp_done.load(Ordering::SeqCst)
                && self.shared.accounted() == self.shared.num_chunks()
            {
                break;
            }
            let mut guard = self.shared.sleep.lock();
            if self.shared.load_q.is_empty()
                && !(self.shared.bsp_done.load(Ordering::SeqCst)
                    && self.shared.accounted() == self.shared.num_chunks())
            {
                self.shared.wake.wait(&mut guard);
            }
        }
        match self.shared.fault.lock().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Drop for ChunkCache {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(IoCmd::Shutdown);
        if let Some(handle) = self.io_thread.take() {
            let _ = handle.join();
        }
    }
}

// ---- I/O thread ----

/// The asynchronous backend, set up once per I/O thread. Kernels or
/// sandboxes without io_uring fall back to positional reads.
#[cfg(target_os = "linux")]
struct IoBackend {
    ring: Option<io_uring::IoUring>,
}

#[cfg(not(target_os = "linux"))]
struct IoBackend;

#[cfg(target_os = "linux")]
impl IoBackend {
    fn new(depth: usize) -> Self {
        let ring = match io_uring::IoUring::new(depth as u32) {
            Ok(ring) => Some(ring),
            Err(err) => {
                tracing::warn!(%err, "io_uring unavailable, using positional reads");
                None
            }
        };
        Self { ring }
    }

    fn stream(
        &mut self,
        shared: &CacheShared,
        file: &DirectFile,
        cmd: &OpenCmd,
        chunk_bytes: usize,
        io_depth: usize,
    ) -> Result<(), StriderError> {
        match self.ring.as_mut() {
            Some(ring) => uring_stream(shared, file, cmd, chunk_bytes, io_depth, ring),
            None => pread_stream(shared, file, cmd, chunk_bytes),
        }
    }
}

#[cfg(not(target_os = "linux"))]
impl IoBackend {
    fn new(_depth: usize) -> Self {
        Self
    }

    fn stream(
        &mut self,
        shared: &CacheShared,
        file: &DirectFile,
        cmd: &OpenCmd,
        chunk_bytes: usize,
        _io_depth: usize,
    ) -> Result<(), StriderError> {
        pread_stream(shared, file, cmd, chunk_bytes)
    }
}

fn io_loop(
    shared: Arc<CacheShared>,
    cmd_rx: flume::Receiver<IoCmd>,
    chunk_bytes: usize,
    io_depth: usize,
) {
    // Process-lifetime cache of opened block files.
    let mut files: HashMap<BlockId, DirectFile> = HashMap::new();
    // A local, so it drops before the `shared` parameter: the ring is
    // destroyed (cancelling any in-flight reads) before the chunk
    // buffers it targets can be freed.
    let mut backend = IoBackend::new(io_depth.min(shared.num_chunks()).max(1));

    while let Ok(cmd) = cmd_rx.recv() {
        let cmd = match cmd {
            IoCmd::Open(cmd) => cmd,
            IoCmd::Shutdown => break,
        };
        let streamed = open_cached(&mut files, &cmd)
            .and_then(|file| backend.stream(&shared, file, &cmd, chunk_bytes, io_depth));
        match streamed {
            Ok(()) | Err(StriderError::Cancelled) => {}
            Err(err) => {
                tracing::error!(block = cmd.block, %err, "block stream failed");
                shared.set_fault(err);
            }
        }
        shared.bsp_done.store(true, Ordering::SeqCst);
        shared.notify();
    }
}

fn open_cached<'a>(
    files: &'a mut HashMap<BlockId, DirectFile>,
    cmd: &OpenCmd,
) -> Result<&'a DirectFile, StriderError> {
    if !files.contains_key(&cmd.block) {
        files.insert(cmd.block, DirectFile::open(&cmd.path)?);
    }
    Ok(&files[&cmd.block])
}

/// Prepare a popped slot for the window at `off` and report the read
/// size (rounded up to the device alignment).
fn prepare_slot(
    shared: &CacheShared,
    slot: usize,
    cmd: &OpenCmd,
    off: u64,
    real_len: usize,
    chunk_bytes: usize,
) -> usize {
    let chunk = shared.chunk(slot);
    chunk.set_state(ChunkState::Loading);
    unsafe {
        chunk.set_meta(ChunkMeta {
            block: cmd.block,
            blk_beg_off: off,
            load_sz: real_len,
            beg_vert: cmd
                .index
                .vertex_at(off)
                .unwrap_or_else(|| cmd.index.first_vertex()),
        });
    }
    align_up(real_len, IO_ALIGN).min(chunk_bytes)
}

/// Sequential fallback: positional reads on the calling thread.
fn pread_stream(
    shared: &CacheShared,
    file: &DirectFile,
    cmd: &OpenCmd,
    chunk_bytes: usize,
) -> Result<(), StriderError> {
    for (off, real_len) in windows(cmd.file_size, chunk_bytes) {
        if shared.cancel.load(Ordering::Relaxed) {
            return Err(StriderError::Cancelled);
        }
        let Some(slot) = shared.pop_free()? else {
            return Ok(()); // block closed early
        };
        let read_len = prepare_slot(shared, slot, cmd, off, real_len, chunk_bytes);
        let buf = unsafe { shared.chunk(slot).buf_mut() };
        let res = file
            .pread_full(&mut buf[..read_len], off)
            .map_err(|e| StriderError::io(&cmd.path, e));
        match res {
            Ok(got) if got >= real_len => shared.publish(slot),
            Ok(_) => {
                shared.recycle(slot);
                return Err(StriderError::io(
                    &cmd.path,
                    std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short block read"),
                ));
            }
            Err(err) => {
                shared.recycle(slot);
                return Err(err);
            }
        }
    }
    Ok(())
}

/// io_uring producer: up to `io_depth` outstanding reads, published to
/// `load_q` strictly in submission order via a small reorder window.
#[cfg(target_os = "linux")]
fn uring_stream(
    shared: &CacheShared,
    file: &DirectFile,
    cmd: &OpenCmd,
    chunk_bytes: usize,
    io_depth: usize,
    ring: &mut io_uring::IoUring,
) -> Result<(), StriderError> {
    use std::collections::VecDeque;

    use io_uring::{opcode, types};

    struct Pending {
        slot: usize,
        off: u64,
        real_len: usize,
        read_len: usize,
        done: bool,
    }

    let fd = file.raw_fd();
    let depth = io_depth.min(shared.num_chunks()).max(1);

    let mut wins = windows(cmd.file_size, chunk_bytes);
    let mut next = wins.next();
    let mut pending: VecDeque<Pending> = VecDeque::with_capacity(depth);
    let mut fault: Option<StriderError> = None;
    let mut cancelled = false;
    let mut aborted = false;

    loop {
        if shared.cancel.load(Ordering::Relaxed) {
            cancelled = true;
        }
        if shared.stop_block.load(Ordering::Relaxed) {
            aborted = true;
        }
        let stopping = fault.is_some() || cancelled || aborted;
        if stopping {
            next = None;
        }

        // ---- Submit phase ----
        while next.is_some() && pending.len() < depth {
            // Block for a free chunk only when nothing is in flight;
            // otherwise prefer harvesting completions below.
            let slot = if pending.is_empty() {
                match shared.pop_free() {
                    Ok(Some(slot)) => slot,
                    Ok(None) => {
                        aborted = true;
                        break;
                    }
                    Err(StriderError::Cancelled) => {
                        cancelled = true;
                        break;
                    }
                    Err(err) => {
                        fault = Some(err);
                        break;
                    }
                }
            } else {
                match shared.free_q.pop() {
                    Some(slot) => slot,
                    None => break,
                }
            };
            let (off, real_len) = next.take().unwrap();
            next = wins.next();

            let read_len = prepare_slot(shared, slot, cmd, off, real_len, chunk_bytes);
            let buf = unsafe { shared.chunk(slot).buf_mut() };
            let sqe = opcode::Read::new(types::Fd(fd), buf.as_mut_ptr(), read_len as u32)
                .offset(off)
                .build()
                .user_data(slot as u64);
            // The SQ holds `depth` entries and at most `depth` are ever
            // queued, so the push cannot fail.
            unsafe {
                ring.submission().push(&sqe).expect("submission queue sized to depth");
            }
            pending.push_back(Pending {
                slot,
                off,
                real_len,
                read_len,
                done: false,
            });
        }

        if pending.is_empty() {
            break;
        }

        // ---- Wait & harvest ----
        loop {
            match ring.submit_and_wait(1) {
                Ok(_) => break,
                Err(e) if e.raw_os_error() == Some(libc::EINTR) => continue,
                Err(e) if e.raw_os_error() == Some(libc::EAGAIN) => {
                    std::thread::yield_now();
                    continue;
                }
                Err(e) => {
                    // The in-flight reads were never cancelled and may
                    // still land in these buffers, so the slots must
                    // not be recycled for reuse. Quarantine them and
                    // drop the block stream with the fault.
                    fault.get_or_insert(StriderError::io(&cmd.path, e));
                    shared.quarantine(pending.len());
                    pending.clear();
                    break;
                }
            }
        }

        for cqe in ring.completion() {
            let slot = cqe.user_data() as usize;
            // Completions from a previously abandoned block can still
            // surface on the shared ring; they are no longer tracked.
            let Some(entry) = pending.iter_mut().find(|p| p.slot == slot && !p.done) else {
                continue;
            };
            let result = cqe.result();
            // Negative results and short reads (possible only at end of
            // file) are finished synchronously; a retry that still
            // cannot make progress surfaces as a fault.
            let got = if result < 0 { 0 } else { result as usize };
            if got < entry.real_len && fault.is_none() && !cancelled && !aborted {
                let buf = unsafe { shared.chunk(slot).buf_mut() };
                let rest = &mut buf[got..entry.read_len];
                match file.pread_full(rest, entry.off + got as u64) {
                    Ok(more) if got + more >= entry.real_len => {}
                    Ok(_) => {
                        fault = Some(StriderError::io(
                            &cmd.path,
                            std::io::Error::new(
                                std::io::ErrorKind::UnexpectedEof,
                                "short block read",
                            ),
                        ));
                    }
                    Err(e) => fault = Some(StriderError::io(&cmd.path, e)),
                }
            }
            entry.done = true;
        }

        // ---- Publish in submission order ----
        while pending.front().is_some_and(|p| p.done) {
            let p = pending.pop_front().unwrap();
            if fault.is_none() && !cancelled && !aborted {
                shared.publish(p.slot);
            } else {
                shared.recycle(p.slot);
            }
        }
    }

    match fault {
        Some(err) => Err(err),
        None if cancelled => Err(StriderError::Cancelled),
        None => Ok(()),
    }
}
