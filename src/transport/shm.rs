//! Shared-memory link between the modem and its host.
//!
//! The region holds two SPSC rings of Q15 samples (RX: modem to host, TX:
//! host to modem), a statistics block and a status block. Every field is an
//! atomic, so an all-zero mapping is a valid empty region and a misbehaving
//! peer can corrupt data but never cause undefined behaviour on this side.
//!
//! Neither side should trust the rings until [`SharedMemoryIpc::wait_for_other_side`]
//! has returned `true`; calling the ring operations earlier is safe but may
//! see stale or empty data.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI16, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

use super::ring::{RingIndices, Slots, Transfer, consume, produce};
use crate::constants::{SHM_POLL_INTERVAL_MS, SHM_RING_SIZE};
use crate::error::Result;
use crate::fixed_point::Q15;

const _: () = assert!(SHM_RING_SIZE.is_power_of_two());

#[repr(C)]
struct SampleSlots([AtomicI16; SHM_RING_SIZE]);

impl Slots<Q15> for SampleSlots {
    fn size(&self) -> usize {
        SHM_RING_SIZE
    }

    unsafe fn store(&self, index: usize, value: Q15) {
        self.0[index].store(value, Ordering::Relaxed);
    }

    unsafe fn load(&self, index: usize) -> Q15 {
        self.0[index].load(Ordering::Relaxed)
    }
}

#[repr(C)]
struct SharedRing {
    indices: RingIndices,
    slots: SampleSlots,
}

impl SharedRing {
    fn write(&self, data: &[Q15]) -> Transfer {
        // SAFETY: slots are atomics, so a second producer could only garble
        // data, not cause a data race.
        unsafe { produce(&self.indices, &self.slots, data) }
    }

    fn read(&self, out: &mut [Q15]) -> Transfer {
        // SAFETY: as for `write`.
        unsafe { consume(&self.indices, &self.slots, out) }
    }

    fn available(&self) -> usize {
        self.indices.available(SHM_RING_SIZE)
    }

    fn space(&self) -> usize {
        self.indices.space(SHM_RING_SIZE)
    }
}

#[repr(C, align(64))]
struct SharedStats {
    rx_overruns: AtomicU64,
    rx_underruns: AtomicU64,
    tx_overruns: AtomicU64,
    tx_underruns: AtomicU64,
    rx_samples: AtomicU64,
    tx_samples: AtomicU64,
}

#[repr(C, align(64))]
struct SharedStatus {
    modem_status: AtomicU32,
    host_status: AtomicU32,
    modem_ready: AtomicBool,
    host_ready: AtomicBool,
}

/// Fixed layout of the shared segment
#[repr(C)]
pub struct SharedRegion {
    rx: SharedRing,
    tx: SharedRing,
    stats: SharedStats,
    status: SharedStatus,
}

impl SharedRegion {
    pub const SIZE: usize = std::mem::size_of::<SharedRegion>();

    fn new_boxed() -> Box<Self> {
        // SAFETY: every field is an atomic integer or bool, for which all
        // zero bits is a valid value.
        unsafe { Box::<Self>::new_zeroed().assume_init() }
    }
}

/// Which end of the link this process is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Creates the segment, produces RX, consumes TX
    Modem,
    /// Opens the segment, produces TX, consumes RX
    Host,
}

/// Counter snapshot of the shared statistics block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IpcStats {
    pub rx_overruns: u64,
    pub rx_underruns: u64,
    pub tx_overruns: u64,
    pub tx_underruns: u64,
    pub rx_samples: u64,
    pub tx_samples: u64,
    pub rx_available: usize,
    pub tx_available: usize,
}

enum Backing {
    Heap(Arc<SharedRegion>),
    #[cfg(unix)]
    Mapped(mapped::Mapping),
}

/// One side of the shared-memory link.
pub struct SharedMemoryIpc {
    backing: Backing,
    role: Role,
}

impl SharedMemoryIpc {
    /// Create (as modem) or open (as host) the named POSIX segment.
    #[cfg(unix)]
    pub fn attach(name: &str, role: Role) -> Result<Self> {
        let mapping = match role {
            Role::Modem => mapped::Mapping::create(name)?,
            Role::Host => mapped::Mapping::open(name)?,
        };
        log::info!(
            "Shared memory {} attached as {:?} ({} bytes)",
            name,
            role,
            SharedRegion::SIZE
        );
        Ok(Self {
            backing: Backing::Mapped(mapping),
            role,
        })
    }

    #[cfg(not(unix))]
    pub fn attach(name: &str, _role: Role) -> Result<Self> {
        Err(crate::error::ModemError::SharedMemory(format!(
            "POSIX shared memory is not available on this platform ({})",
            name
        )))
    }

    /// Both ends of a heap-backed region, for running modem and host in one
    /// process.
    pub fn in_process_pair() -> (Self, Self) {
        let region: Arc<SharedRegion> = Arc::from(SharedRegion::new_boxed());
        (
            Self {
                backing: Backing::Heap(Arc::clone(&region)),
                role: Role::Modem,
            },
            Self {
                backing: Backing::Heap(region),
                role: Role::Host,
            },
        )
    }

    pub fn role(&self) -> Role {
        self.role
    }

    fn region(&self) -> &SharedRegion {
        match &self.backing {
            Backing::Heap(region) => region,
            #[cfg(unix)]
            Backing::Mapped(mapping) => mapping.region(),
        }
    }

    fn own_ready(&self) -> &AtomicBool {
        let status = &self.region().status;
        match self.role {
            Role::Modem => &status.modem_ready,
            Role::Host => &status.host_ready,
        }
    }

    fn peer_ready(&self) -> &AtomicBool {
        let status = &self.region().status;
        match self.role {
            Role::Modem => &status.host_ready,
            Role::Host => &status.modem_ready,
        }
    }

    /// Announce that this side is attached and ready.
    pub fn set_ready(&self) {
        self.own_ready().store(true, Ordering::Release);
    }

    /// Withdraw readiness, e.g. before detaching.
    pub fn clear_ready(&self) {
        self.own_ready().store(false, Ordering::Release);
    }

    pub fn is_other_side_ready(&self) -> bool {
        self.peer_ready().load(Ordering::Acquire)
    }

    /// Poll every 10 ms until the peer is ready. `timeout_ms == 0` waits
    /// forever. Returns whether the peer became ready.
    pub fn wait_for_other_side(&self, timeout_ms: u32) -> bool {
        let deadline =
            (timeout_ms > 0).then(|| Instant::now() + Duration::from_millis(timeout_ms as u64));
        loop {
            if self.is_other_side_ready() {
                log::debug!("{:?} side sees peer ready", self.role);
                return true;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return false;
            }
            std::thread::sleep(Duration::from_millis(SHM_POLL_INTERVAL_MS));
        }
    }

    /// Ring operations need `&mut self`, so each direction has one writer
    /// and one reader per handle. Calls from the wrong side move nothing.
    fn acts_as(&self, role: Role) -> bool {
        if self.role != role {
            log::warn!("{:?} side used a {:?} ring operation", self.role, role);
            return false;
        }
        true
    }

    /// Modem side: publish received audio for the host.
    pub fn write_rx(&mut self, samples: &[Q15]) -> usize {
        if !self.acts_as(Role::Modem) {
            return 0;
        }
        let region = self.region();
        let t = region.rx.write(samples);
        region.stats.rx_samples.fetch_add(t.count as u64, Ordering::Relaxed);
        if t.contention {
            region.stats.rx_overruns.fetch_add(1, Ordering::Relaxed);
        }
        t.count
    }

    /// Modem side: publish one whole frame or nothing. A frame that does not
    /// fit is dropped and counted as an overrun, keeping the host aligned on
    /// frame boundaries.
    pub fn write_rx_frame(&mut self, frame: &[Q15]) -> bool {
        if !self.acts_as(Role::Modem) {
            return false;
        }
        if self.rx_space() < frame.len() {
            self.region().stats.rx_overruns.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        self.write_rx(frame) == frame.len()
    }

    /// Host side: take received audio.
    pub fn read_rx(&mut self, out: &mut [Q15]) -> usize {
        if !self.acts_as(Role::Host) {
            return 0;
        }
        let region = self.region();
        let t = region.rx.read(out);
        if t.contention {
            region.stats.rx_underruns.fetch_add(1, Ordering::Relaxed);
        }
        t.count
    }

    /// Host side: queue audio to transmit.
    pub fn write_tx(&mut self, samples: &[Q15]) -> usize {
        if !self.acts_as(Role::Host) {
            return 0;
        }
        let region = self.region();
        let t = region.tx.write(samples);
        if t.contention {
            region.stats.tx_overruns.fetch_add(1, Ordering::Relaxed);
        }
        t.count
    }

    /// Modem side: take audio to transmit.
    pub fn read_tx(&mut self, out: &mut [Q15]) -> usize {
        if !self.acts_as(Role::Modem) {
            return 0;
        }
        let region = self.region();
        let t = region.tx.read(out);
        region.stats.tx_samples.fetch_add(t.count as u64, Ordering::Relaxed);
        if t.contention {
            region.stats.tx_underruns.fetch_add(1, Ordering::Relaxed);
        }
        t.count
    }

    pub fn rx_available(&self) -> usize {
        self.region().rx.available()
    }

    pub fn rx_space(&self) -> usize {
        self.region().rx.space()
    }

    pub fn tx_available(&self) -> usize {
        self.region().tx.available()
    }

    pub fn tx_space(&self) -> usize {
        self.region().tx.space()
    }

    pub fn stats(&self) -> IpcStats {
        let region = self.region();
        let s = &region.stats;
        IpcStats {
            rx_overruns: s.rx_overruns.load(Ordering::Relaxed),
            rx_underruns: s.rx_underruns.load(Ordering::Relaxed),
            tx_overruns: s.tx_overruns.load(Ordering::Relaxed),
            tx_underruns: s.tx_underruns.load(Ordering::Relaxed),
            rx_samples: s.rx_samples.load(Ordering::Relaxed),
            tx_samples: s.tx_samples.load(Ordering::Relaxed),
            rx_available: region.rx.available(),
            tx_available: region.tx.available(),
        }
    }

    pub fn reset_stats(&self) {
        let s = &self.region().stats;
        for counter in [
            &s.rx_overruns,
            &s.rx_underruns,
            &s.tx_overruns,
            &s.tx_underruns,
            &s.rx_samples,
            &s.tx_samples,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Publish this side's opaque status word.
    pub fn set_status(&self, status: u32) {
        let s = &self.region().status;
        match self.role {
            Role::Modem => s.modem_status.store(status, Ordering::Release),
            Role::Host => s.host_status.store(status, Ordering::Release),
        }
    }

    pub fn peer_status(&self) -> u32 {
        let s = &self.region().status;
        match self.role {
            Role::Modem => s.host_status.load(Ordering::Acquire),
            Role::Host => s.modem_status.load(Ordering::Acquire),
        }
    }
}

impl Drop for SharedMemoryIpc {
    fn drop(&mut self) {
        self.clear_ready();
    }
}

#[cfg(unix)]
mod mapped {
    use std::fs::File;
    use std::num::NonZeroUsize;
    use std::os::fd::OwnedFd;
    use std::ptr::NonNull;

    use nix::fcntl::OFlag;
    use nix::sys::mman::{MapFlags, ProtFlags, mmap, shm_open, shm_unlink};
    use nix::sys::stat::Mode;

    use super::SharedRegion;
    use crate::error::{ModemError, Result};

    /// A mapped POSIX shared-memory object holding one `SharedRegion`.
    pub(super) struct Mapping {
        ptr: NonNull<SharedRegion>,
        _file: File,
        /// Set on the creating side, which unlinks the name on drop
        owned_name: Option<String>,
    }

    // SAFETY: the region only contains atomics and the mapping lives until
    // drop, so it may be shared and moved across threads.
    unsafe impl Send for Mapping {}
    unsafe impl Sync for Mapping {}

    fn shm_error(what: &str, name: &str, e: impl std::fmt::Display) -> ModemError {
        ModemError::SharedMemory(format!("{} {}: {}", what, name, e))
    }

    impl Mapping {
        pub(super) fn create(name: &str) -> Result<Self> {
            // A segment left behind by a crashed run would be mapped with
            // stale indices.
            if shm_unlink(name).is_ok() {
                log::warn!("Removed stale shared memory segment {}", name);
            }

            let fd = shm_open(
                name,
                OFlag::O_RDWR | OFlag::O_CREAT | OFlag::O_EXCL,
                Mode::S_IRUSR | Mode::S_IWUSR,
            )
            .map_err(|e| shm_error("shm_open", name, e))?;

            nix::unistd::ftruncate(&fd, SharedRegion::SIZE as libc::off_t)
                .map_err(|e| shm_error("ftruncate", name, e))?;

            let mapping = Self::map(fd, name, Some(name.to_string()))?;
            // SAFETY: freshly mapped and not yet visible to a peer that has
            // passed the handshake.
            unsafe {
                mapping
                    .ptr
                    .as_ptr()
                    .cast::<u8>()
                    .write_bytes(0, SharedRegion::SIZE)
            };
            Ok(mapping)
        }

        pub(super) fn open(name: &str) -> Result<Self> {
            let fd = shm_open(name, OFlag::O_RDWR, Mode::empty())
                .map_err(|e| shm_error("shm_open", name, e))?;
            Self::map(fd, name, None)
        }

        fn map(fd: OwnedFd, name: &str, owned_name: Option<String>) -> Result<Self> {
            let file = File::from(fd);
            let len = file.metadata()?.len() as usize;
            if len < SharedRegion::SIZE {
                return Err(ModemError::SharedMemory(format!(
                    "segment {} is {} bytes, expected {}",
                    name,
                    len,
                    SharedRegion::SIZE
                )));
            }

            let size = NonZeroUsize::new(SharedRegion::SIZE)
                .ok_or_else(|| shm_error("mmap", name, "zero-sized region"))?;
            // SAFETY: mapping a shared file of at least `size` bytes; the
            // pointer is page aligned, which satisfies `SharedRegion`.
            let ptr = unsafe {
                mmap(
                    None,
                    size,
                    ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                    MapFlags::MAP_SHARED,
                    &file,
                    0,
                )
            }
            .map_err(|e| shm_error("mmap", name, e))?;

            Ok(Self {
                ptr: ptr.cast(),
                _file: file,
                owned_name,
            })
        }

        pub(super) fn region(&self) -> &SharedRegion {
            // SAFETY: valid for the life of `self`; all-zero or peer-written
            // atomics are valid values.
            unsafe { self.ptr.as_ref() }
        }
    }

    impl Drop for Mapping {
        fn drop(&mut self) {
            // SAFETY: unmapping exactly what `map` mapped; no references into
            // the region outlive `self`.
            unsafe {
                libc::munmap(self.ptr.as_ptr().cast(), SharedRegion::SIZE);
            }
            if let Some(name) = &self.owned_name {
                if let Err(e) = shm_unlink(name.as_str()) {
                    log::warn!("shm_unlink {}: {}", name, e);
                }
            }
        }
    }
}
