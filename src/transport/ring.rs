//! Single-producer/single-consumer ring buffers.
//!
//! Indices are stored masked into `[0, size)` and masked again on load, since
//! a shared-memory peer can write anything there. The buffer is empty when
//! `write == read` and full when advancing `write` would make them equal, so
//! a ring of `size` slots holds at most `size - 1` elements.
//!
//! Ordering: the producer stores the slot, then releases `write`; the
//! consumer acquires `write` before loading slots and releases `read` after,
//! which the producer acquires before its full check.
//!
//! The same algorithm drives both the in-process [`RingBuffer`] and the
//! shared-memory rings in [`super::shm`].

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use serde::Serialize;

/// Cache-line padded index.
#[repr(C, align(64))]
pub(crate) struct PaddedIndex {
    value: AtomicU32,
}

impl PaddedIndex {
    const fn new() -> Self {
        Self {
            value: AtomicU32::new(0),
        }
    }
}

/// Write and read positions, each on its own cache line.
#[repr(C)]
pub(crate) struct RingIndices {
    write: PaddedIndex,
    read: PaddedIndex,
}

impl RingIndices {
    pub(crate) const fn new() -> Self {
        Self {
            write: PaddedIndex::new(),
            read: PaddedIndex::new(),
        }
    }

    pub(crate) fn available(&self, size: usize) -> usize {
        let w = self.write.value.load(Ordering::Acquire) as usize;
        let r = self.read.value.load(Ordering::Acquire) as usize;
        w.wrapping_sub(r) & (size - 1)
    }

    pub(crate) fn space(&self, size: usize) -> usize {
        size - 1 - self.available(size)
    }

    /// Only valid while neither side is active.
    pub(crate) fn clear(&self) {
        self.write.value.store(0, Ordering::Release);
        self.read.value.store(0, Ordering::Release);
    }
}

/// Element storage behind a ring. `size()` must be a power of two.
pub(crate) trait Slots<T: Copy> {
    fn size(&self) -> usize;

    /// # Safety
    /// Caller is the single producer and slot `index` is not readable.
    unsafe fn store(&self, index: usize, value: T);

    /// # Safety
    /// Caller is the single consumer and slot `index` has been published.
    unsafe fn load(&self, index: usize) -> T;
}

/// Result of one `write`/`read` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Transfer {
    pub count: usize,
    /// Write hit a full ring, or read ran dry after a partial read.
    pub contention: bool,
}

/// # Safety
/// At most one thread may act as producer on `indices`/`slots` at a time.
pub(crate) unsafe fn produce<T: Copy, S: Slots<T> + ?Sized>(
    indices: &RingIndices,
    slots: &S,
    data: &[T],
) -> Transfer {
    let mask = slots.size() - 1;
    let mut w = indices.write.value.load(Ordering::Relaxed) as usize & mask;
    let r = indices.read.value.load(Ordering::Acquire) as usize & mask;

    let mut count = 0;
    let mut contention = false;
    for &value in data {
        let next = (w + 1) & mask;
        if next == r {
            contention = true;
            break;
        }
        // SAFETY: slot `w` is outside the published region until the
        // release store below.
        unsafe { slots.store(w, value) };
        w = next;
        count += 1;
    }

    if count > 0 {
        indices.write.value.store(w as u32, Ordering::Release);
    }
    Transfer { count, contention }
}

/// # Safety
/// At most one thread may act as consumer on `indices`/`slots` at a time.
pub(crate) unsafe fn consume<T: Copy, S: Slots<T> + ?Sized>(
    indices: &RingIndices,
    slots: &S,
    out: &mut [T],
) -> Transfer {
    let mask = slots.size() - 1;
    let mut r = indices.read.value.load(Ordering::Relaxed) as usize & mask;
    let w = indices.write.value.load(Ordering::Acquire) as usize & mask;

    let mut count = 0;
    for slot in out.iter_mut() {
        if r == w {
            break;
        }
        // SAFETY: slot `r` was published by the acquire load of `write`.
        *slot = unsafe { slots.load(r) };
        r = (r + 1) & mask;
        count += 1;
    }

    if count > 0 {
        indices.read.value.store(r as u32, Ordering::Release);
    }
    Transfer {
        count,
        contention: count > 0 && count < out.len(),
    }
}

/// Counter snapshot for one ring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RingStats {
    pub overruns: u64,
    pub underruns: u64,
    pub written: u64,
    pub read: u64,
}

#[derive(Default)]
struct Counters {
    overruns: AtomicU64,
    underruns: AtomicU64,
    written: AtomicU64,
    read: AtomicU64,
}

impl Counters {
    fn record_write(&self, t: Transfer) {
        self.written.fetch_add(t.count as u64, Ordering::Relaxed);
        if t.contention {
            self.overruns.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_read(&self, t: Transfer) {
        self.read.fetch_add(t.count as u64, Ordering::Relaxed);
        if t.contention {
            self.underruns.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn snapshot(&self) -> RingStats {
        RingStats {
            overruns: self.overruns.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            read: self.read.load(Ordering::Relaxed),
        }
    }
}

struct LocalSlots<T> {
    cells: Box<[UnsafeCell<MaybeUninit<T>>]>,
}

impl<T: Copy> Slots<T> for LocalSlots<T> {
    fn size(&self) -> usize {
        self.cells.len()
    }

    unsafe fn store(&self, index: usize, value: T) {
        // SAFETY: exclusive producer access to this slot, see `Slots`.
        unsafe { (*self.cells[index].get()).write(value) };
    }

    unsafe fn load(&self, index: usize) -> T {
        // SAFETY: the slot was initialised before being published.
        unsafe { (*self.cells[index].get()).assume_init() }
    }
}

struct Shared<T> {
    indices: RingIndices,
    slots: LocalSlots<T>,
    counters: Counters,
}

// SAFETY: slots are only touched through `produce`/`consume`, and the public
// handles guarantee a single producer and a single consumer.
unsafe impl<T: Send> Sync for Shared<T> {}

impl<T: Copy> Shared<T> {
    fn new(size: usize) -> Self {
        let size = size.max(2).next_power_of_two();
        let cells: Vec<UnsafeCell<MaybeUninit<T>>> =
            (0..size).map(|_| UnsafeCell::new(MaybeUninit::uninit())).collect();
        Self {
            indices: RingIndices::new(),
            slots: LocalSlots {
                cells: cells.into_boxed_slice(),
            },
            counters: Counters::default(),
        }
    }

    fn size(&self) -> usize {
        self.slots.size()
    }

    fn write(&self, data: &[T]) -> usize {
        // SAFETY: callers hold the unique producer role.
        let t = unsafe { produce(&self.indices, &self.slots, data) };
        self.counters.record_write(t);
        t.count
    }

    fn read(&self, out: &mut [T]) -> usize {
        // SAFETY: callers hold the unique consumer role.
        let t = unsafe { consume(&self.indices, &self.slots, out) };
        self.counters.record_read(t);
        t.count
    }
}

/// Ring owned by one value that plays both producer and consumer.
///
/// Used where the two ends live on the same thread or behind a lock. Call
/// [`split`](Self::split) to hand the ends to different threads.
pub struct RingBuffer<T: Copy> {
    shared: Shared<T>,
}

impl<T: Copy> RingBuffer<T> {
    /// `size` is rounded up to a power of two; capacity is one less.
    pub fn new(size: usize) -> Self {
        Self {
            shared: Shared::new(size),
        }
    }

    pub fn capacity(&self) -> usize {
        self.shared.size() - 1
    }

    pub fn available(&self) -> usize {
        self.shared.indices.available(self.shared.size())
    }

    pub fn space(&self) -> usize {
        self.shared.indices.space(self.shared.size())
    }

    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }

    /// Append as much of `data` as fits and return how much that was. A
    /// short write counts one overrun.
    pub fn write(&mut self, data: &[T]) -> usize {
        self.shared.write(data)
    }

    /// Take up to `out.len()` elements. A read that finds some data but not
    /// enough counts one underrun; a read of an empty ring does not.
    pub fn read(&mut self, out: &mut [T]) -> usize {
        self.shared.read(out)
    }

    /// Drop everything buffered. Counters are kept.
    pub fn clear(&mut self) {
        self.shared.indices.clear();
    }

    pub fn stats(&self) -> RingStats {
        self.shared.counters.snapshot()
    }

    pub fn split(self) -> (Producer<T>, Consumer<T>) {
        let shared = Arc::new(self.shared);
        (
            Producer {
                shared: Arc::clone(&shared),
            },
            Consumer { shared },
        )
    }
}

/// New ring already split into its two ends.
pub fn spsc<T: Copy>(size: usize) -> (Producer<T>, Consumer<T>) {
    RingBuffer::new(size).split()
}

/// Writing end of a split ring
pub struct Producer<T: Copy> {
    shared: Arc<Shared<T>>,
}

impl<T: Copy> Producer<T> {
    pub fn write(&mut self, data: &[T]) -> usize {
        self.shared.write(data)
    }

    pub fn space(&self) -> usize {
        self.shared.indices.space(self.shared.size())
    }

    pub fn capacity(&self) -> usize {
        self.shared.size() - 1
    }

    pub fn stats(&self) -> RingStats {
        self.shared.counters.snapshot()
    }
}

/// Reading end of a split ring
pub struct Consumer<T: Copy> {
    shared: Arc<Shared<T>>,
}

impl<T: Copy> Consumer<T> {
    pub fn read(&mut self, out: &mut [T]) -> usize {
        self.shared.read(out)
    }

    pub fn available(&self) -> usize {
        self.shared.indices.available(self.shared.size())
    }

    pub fn stats(&self) -> RingStats {
        self.shared.counters.snapshot()
    }
}
