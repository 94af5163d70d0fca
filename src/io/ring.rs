use std::sync::atomic::{AtomicUsize, Ordering};

/// Fixed-capacity single-producer/single-consumer queue of chunk slot
/// indices. Head and tail are monotonically increasing; the slot array
/// is addressed modulo the capacity.
///
/// Each side is a single thread by protocol: the I/O thread consumes
/// `free_q` and produces `load_q`; the scheduler thread does the
/// opposite, on behalf of the compute pool.
pub struct SpscRing {
    slots: Box<[AtomicUsize]>,
    head: AtomicUsize,
    tail: AtomicUsize,
}

impl SpscRing {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0);
        Self {
            slots: (0..capacity).map(|_| AtomicUsize::new(0)).collect(),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.tail.load(Ordering::Acquire) - self.head.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Producer side. Fails when the ring is full.
    pub fn push(&self, value: usize) -> Result<(), usize> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        if tail - head == self.slots.len() {
            return Err(value);
        }
        self.slots[tail % self.slots.len()].store(value, Ordering::Relaxed);
        self.tail.store(tail + 1, Ordering::Release);
        Ok(())
    }

    /// Consumer side. `None` when the ring is empty.
    pub fn pop(&self) -> Option<usize> {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        if head == tail {
            return None;
        }
        let value = self.slots[head % self.slots.len()].load(Ordering::Relaxed);
        self.head.store(head + 1, Ordering::Release);
        Some(value)
    }
}
