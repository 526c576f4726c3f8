//! Ring buffer laid out in a named shared-memory segment.
//!
//! Same slot-gated MPMC protocol as the heap ring, with every piece of
//! synchronization state living inside the mapping so it works across
//! address spaces:
//!
//! ```text
//! offset 0 : Header   magic, version, capacity, policy, element_size,
//!                     then head / tail / shadow_tail / notify handle,
//!                     each on its own cache line
//! offset H : SlotStatus[capacity]   64 bytes each
//! offset S : T[capacity]            raw element bytes
//! ```
//!
//! Exactly one process creates the segment and unlinks it on drop; other
//! processes attach after validating magic, version, and element size.

use std::marker::PhantomData;
use std::sync::atomic::{ AtomicBool, AtomicU64, Ordering };
use std::time::{ Duration, Instant };

use static_assertions::const_assert_eq;

use crate::constants::{
    CACHE_LINE_SIZE,
    SHADOW_TAIL_PUBLISH_INTERVAL,
    SHARED_RING_MAGIC,
    SHARED_RING_VERSION,
};
use crate::error::{ PlumeError, Result };
use crate::metrics::RingMetrics;
use crate::ring::notify::Notifier;
use crate::ring::shm::SharedSegment;
use crate::ring::slot::SlotStatus;
use crate::ring::{ PushResult, QueueFullPolicy, RingConfig };

#[repr(C)]
struct SharedHeader {
    // Cache line 0: segment identity.
    magic: u64,
    version: u32,
    capacity: u32,
    policy: u32,
    element_size: u32,
    _pad0: [u8; 40],
    // One cursor per cache line.
    head: AtomicU64,
    _pad1: [u8; 56],
    tail: AtomicU64,
    _pad2: [u8; 56],
    shadow_tail: AtomicU64,
    _pad3: [u8; 56],
    // Notification handle (eventfd number, -1 when unavailable).
    notify_info: i32,
    _pad4: [u8; 60],
}

const_assert_eq!(std::mem::size_of::<SharedHeader>(), 5 * CACHE_LINE_SIZE);

const HEADER_SIZE: usize = std::mem::size_of::<SharedHeader>();

fn align_up(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) & !(alignment - 1)
}

#[derive(Debug)]
pub struct SharedRingBuffer<T> {
    segment: SharedSegment,
    capacity: u64,
    mask: u64,
    policy: QueueFullPolicy,
    notifier: Notifier,
    closed: AtomicBool,
    metrics: RingMetrics,
    _marker: PhantomData<T>,
}

// SAFETY: all shared mutable state sits behind the slot state machine and the
// header atomics inside the mapping; the handle-local fields are atomics or
// immutable after construction.
unsafe impl<T: Send> Send for SharedRingBuffer<T> {}
unsafe impl<T: Send> Sync for SharedRingBuffer<T> {}

impl<T: Copy + Default> SharedRingBuffer<T> {
    /// Bytes a segment needs for `capacity` slots of `T`.
    pub fn required_size(capacity: usize) -> usize {
        align_up(
            HEADER_SIZE +
                capacity * std::mem::size_of::<SlotStatus>() +
                capacity * std::mem::size_of::<T>(),
            CACHE_LINE_SIZE
        )
    }

    /// Create the segment and become its owner. The segment name must begin
    /// with `/` per POSIX shared-memory naming rules.
    pub fn create(name: &str, config: RingConfig) -> Result<Self> {
        if config.capacity == 0 || !config.capacity.is_power_of_two() {
            return Err(PlumeError::capacity("ring capacity must be a nonzero power of 2"));
        }
        let capacity = config.capacity;

        let segment = SharedSegment::create(name, Self::required_size(capacity))?;
        let notifier = Notifier::new()?;

        let header = unsafe { &mut *(segment.as_mut_ptr() as *mut SharedHeader) };
        header.version = SHARED_RING_VERSION;
        header.capacity = capacity as u32;
        header.policy = config.policy as u32;
        header.element_size = std::mem::size_of::<T>() as u32;
        header.head = AtomicU64::new(0);
        header.tail = AtomicU64::new(0);
        header.shadow_tail = AtomicU64::new(0);
        header.notify_info = notifier.shared_handle();

        let ring = Self {
            segment,
            capacity: capacity as u64,
            mask: (capacity as u64) - 1,
            policy: config.policy,
            notifier,
            closed: AtomicBool::new(false),
            metrics: RingMetrics::new(),
            _marker: PhantomData,
        };

        for i in 0..capacity {
            ring.status(i as u64).init(i as u64);
        }

        // Magic goes last so a concurrent attacher never validates a
        // half-initialized header.
        std::sync::atomic::fence(Ordering::Release);
        unsafe {
            (*(ring.segment.as_mut_ptr() as *mut SharedHeader)).magic = SHARED_RING_MAGIC;
        }

        Ok(ring)
    }

    /// Attach to an existing segment created by another handle or process.
    pub fn attach(name: &str) -> Result<Self> {
        let segment = SharedSegment::attach(name)?;
        if segment.len() < HEADER_SIZE {
            return Err(PlumeError::capacity("shared segment smaller than its header"));
        }

        let header = unsafe { &*(segment.as_ptr() as *const SharedHeader) };
        if header.magic != SHARED_RING_MAGIC {
            return Err(PlumeError::InvalidFormat);
        }
        if header.version != SHARED_RING_VERSION {
            return Err(PlumeError::VersionMismatch {
                expected: SHARED_RING_VERSION,
                found: header.version,
            });
        }
        if header.element_size as usize != std::mem::size_of::<T>() {
            return Err(
                PlumeError::capacity(
                    format!(
                        "element size mismatch: segment has {}, expected {}",
                        header.element_size,
                        std::mem::size_of::<T>()
                    )
                )
            );
        }

        let capacity = header.capacity as usize;
        if capacity == 0 || !capacity.is_power_of_two() {
            return Err(PlumeError::InvalidFormat);
        }
        if segment.len() < Self::required_size(capacity) {
            return Err(PlumeError::capacity("shared segment smaller than its declared capacity"));
        }

        let policy = QueueFullPolicy::from_u32(header.policy).ok_or(PlumeError::InvalidFormat)?;
        let notifier = Notifier::from_shared_fd(header.notify_info);

        Ok(Self {
            segment,
            capacity: capacity as u64,
            mask: (capacity as u64) - 1,
            policy,
            notifier,
            closed: AtomicBool::new(false),
            metrics: RingMetrics::new(),
            _marker: PhantomData,
        })
    }

    pub fn is_owner(&self) -> bool {
        self.segment.is_owner()
    }

    pub fn name(&self) -> &str {
        self.segment.name()
    }

    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    pub fn policy(&self) -> QueueFullPolicy {
        self.policy
    }

    pub fn metrics(&self) -> &RingMetrics {
        &self.metrics
    }

    fn header(&self) -> &SharedHeader {
        // SAFETY: the mapping outlives self and the header was validated (or
        // written) during construction.
        unsafe { &*(self.segment.as_ptr() as *const SharedHeader) }
    }

    fn status(&self, pos: u64) -> &SlotStatus {
        let idx = (pos & self.mask) as usize;
        // SAFETY: idx < capacity and the status region was sized for capacity
        // entries at construction.
        unsafe {
            let base = self.segment.as_ptr().add(HEADER_SIZE) as *const SlotStatus;
            &*base.add(idx)
        }
    }

    fn slot_ptr(&self, pos: u64) -> *mut T {
        let idx = (pos & self.mask) as usize;
        let offset = HEADER_SIZE + (self.capacity as usize) * std::mem::size_of::<SlotStatus>();
        // SAFETY: idx < capacity and the element region was sized for capacity
        // entries at construction.
        unsafe { (self.segment.as_mut_ptr().add(offset) as *mut T).add(idx) }
    }

    pub fn size(&self) -> usize {
        let header = self.header();
        let head = header.head.load(Ordering::Acquire);
        let tail = header.tail.load(Ordering::Acquire);
        head.saturating_sub(tail).min(self.capacity) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn is_full(&self) -> bool {
        let header = self.header();
        let head = header.head.load(Ordering::Relaxed);
        head.wrapping_sub(header.shadow_tail.load(Ordering::Acquire)) >= self.capacity
    }

    // =========================================================================
    // Producer side
    // =========================================================================

    pub fn try_push(&self, entry: T) -> PushResult {
        if self.closed.load(Ordering::Acquire) {
            return PushResult::Full;
        }
        match self.policy {
            QueueFullPolicy::DropNewest =>
                match self.try_claim() {
                    Some(pos) => {
                        self.write_and_publish(pos, entry);
                        PushResult::Ok(pos)
                    }
                    None => {
                        self.metrics.record_dropped_newest();
                        PushResult::DroppedNewest
                    }
                }
            QueueFullPolicy::DropOldest => {
                if let Some(pos) = self.try_claim() {
                    self.write_and_publish(pos, entry);
                    return PushResult::Ok(pos);
                }
                self.discard_oldest();
                match self.try_claim() {
                    Some(pos) => {
                        self.write_and_publish(pos, entry);
                        PushResult::DroppedOldest(pos)
                    }
                    None => PushResult::Full,
                }
            }
            QueueFullPolicy::Block => {
                loop {
                    if self.closed.load(Ordering::Acquire) {
                        return PushResult::Full;
                    }
                    if let Some(pos) = self.try_claim() {
                        self.write_and_publish(pos, entry);
                        return PushResult::Ok(pos);
                    }
                    // Cross-process backpressure: no shared wakeup for
                    // producers, so yield and retry on a short cadence.
                    std::thread::sleep(Duration::from_micros(100));
                }
            }
        }
    }

    fn try_claim(&self) -> Option<u64> {
        let header = self.header();
        loop {
            let pos = header.head.load(Ordering::Relaxed);

            // Shadow-tail bound first; the authoritative tail only on the
            // full path, and the slot sequence always gates the claim.
            if pos.wrapping_sub(header.shadow_tail.load(Ordering::Acquire)) >= self.capacity {
                if pos.wrapping_sub(header.tail.load(Ordering::Acquire)) >= self.capacity {
                    return None;
                }
            }

            let slot = self.status(pos);
            let seq = slot.sequence();
            if seq == pos {
                if
                    header.head
                        .compare_exchange_weak(pos, pos + 1, Ordering::AcqRel, Ordering::Relaxed)
                        .is_ok()
                {
                    return Some(pos);
                }
                std::hint::spin_loop();
            } else if seq < pos {
                return None;
            } else {
                std::hint::spin_loop();
            }
        }
    }

    fn write_and_publish(&self, pos: u64, entry: T) {
        let slot = self.status(pos);
        let writable = slot.begin_write(pos);
        debug_assert!(writable, "claimed slot must accept the Writing transition");

        // SAFETY: the head CAS granted exclusive ownership of this slot for
        // generation `pos` across every attached process.
        unsafe {
            std::ptr::write_volatile(self.slot_ptr(pos), entry);
        }
        slot.publish(pos);
        self.metrics.record_push();
        self.notifier.signal();
    }

    fn discard_oldest(&self) {
        let mut scratch = T::default();
        if self.pop_impl(&mut scratch, false).is_some() {
            self.metrics.record_dropped_oldest();
        }
    }

    // =========================================================================
    // Consumer side
    // =========================================================================

    pub fn try_pop(&self, out: &mut T) -> bool {
        self.pop_impl(out, true).is_some()
    }

    pub fn try_pop_seq(&self, out: &mut T) -> Option<u64> {
        self.pop_impl(out, true)
    }

    fn pop_impl(&self, out: &mut T, count: bool) -> Option<u64> {
        let header = self.header();
        loop {
            let pos = header.tail.load(Ordering::Relaxed);
            let slot = self.status(pos);
            let seq = slot.sequence();
            if seq == pos + 1 {
                if
                    header.tail
                        .compare_exchange_weak(pos, pos + 1, Ordering::AcqRel, Ordering::Relaxed)
                        .is_ok()
                {
                    let readable = slot.begin_read(pos);
                    debug_assert!(readable, "claimed slot must accept the Reading transition");

                    // SAFETY: the tail CAS granted exclusive read ownership of
                    // this slot for generation `pos`.
                    unsafe {
                        *out = std::ptr::read_volatile(self.slot_ptr(pos));
                    }
                    slot.release(pos, self.capacity);
                    if count {
                        self.metrics.record_pop();
                    }
                    if (pos + 1) % SHADOW_TAIL_PUBLISH_INTERVAL == 0 {
                        header.shadow_tail.store(pos + 1, Ordering::Release);
                    }
                    return Some(pos);
                }
                std::hint::spin_loop();
            } else if seq <= pos {
                header.shadow_tail.store(pos, Ordering::Release);
                return None;
            } else {
                std::hint::spin_loop();
            }
        }
    }

    pub fn notify_consumer(&self) {
        self.notifier.signal_now();
    }

    /// Two-stage consumer wait, as on the heap ring.
    pub fn wait_for_data(&self, poll_interval: Duration, max_wait: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < poll_interval {
            if !self.is_empty() || self.closed.load(Ordering::Acquire) {
                return true;
            }
            std::hint::spin_loop();
            std::thread::yield_now();
        }
        if !self.is_empty() || self.closed.load(Ordering::Acquire) {
            return true;
        }
        self.notifier.wait(max_wait);
        !self.is_empty()
    }

    /// Stop this handle: refuse further pushes and wake local waiters. The
    /// segment itself lives until the owner drops.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notifier.close();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
