//! Heap-allocated lock-free MPMC ring buffer.
//!
//! Capacity is a power of two. The head (producer) and tail (consumer)
//! cursors live on their own cache lines; each slot is gated by a
//! [`SlotStatus`] word, so multiple producers and consumers coordinate
//! without locks. Producers claim a position by CAS on the head, write the
//! payload, and publish through the slot; consumers mirror the protocol on
//! the tail.
//!
//! Two optional features from the configuration:
//! - **Shadow tail**: the consumer periodically copies its cursor to a
//!   separate cache line that producers read for the "is the ring full?"
//!   check, keeping them off the contended authoritative tail. The slot
//!   sequence still authoritatively gates every write.
//! - **Wait-for-completion**: a parallel per-slot completion array lets a
//!   producer block until its record has been fully processed downstream.

use std::cell::UnsafeCell;
use std::sync::atomic::{ AtomicBool, AtomicU64, Ordering };
use std::time::{ Duration, Instant };

use crossbeam::utils::CachePadded;

use crate::constants::{ PRODUCER_SPIN_LIMIT, SHADOW_TAIL_PUBLISH_INTERVAL };
use crate::error::Result;
use crate::metrics::RingMetrics;
use crate::ring::notify::Notifier;
use crate::ring::slot::SlotStatus;
use crate::ring::{ PushResult, QueueFullPolicy, RingConfig };

pub struct HeapRingBuffer<T> {
    buffer: Box<[UnsafeCell<T>]>,
    status: Box<[SlotStatus]>,
    /// Per-slot "processed through the pipeline" watermark, present when WFC
    /// is enabled. Holds `seq + 1` once the record at `seq` completed.
    completion: Option<Box<[CachePadded<AtomicU64>]>>,
    capacity: u64,
    mask: u64,
    policy: QueueFullPolicy,
    shadow_enabled: bool,
    head: CachePadded<AtomicU64>,
    tail: CachePadded<AtomicU64>,
    shadow_tail: CachePadded<AtomicU64>,
    closed: AtomicBool,
    /// Wakes the consumer when data arrives.
    data_notifier: Notifier,
    /// Wakes blocked producers when a slot drains.
    space_notifier: Notifier,
    metrics: RingMetrics,
}

// SAFETY: slots are only ever mutated by the single role that holds them in
// the Writing/Reading state; the slot state machine plus the cursor CASes
// enforce exclusive access, and all cross-thread publication goes through
// release/acquire on the slot sequence.
unsafe impl<T: Send> Send for HeapRingBuffer<T> {}
unsafe impl<T: Send> Sync for HeapRingBuffer<T> {}

impl<T: Copy + Default> HeapRingBuffer<T> {
    pub fn new(config: RingConfig) -> Result<Self> {
        if config.capacity == 0 || !config.capacity.is_power_of_two() {
            return Err(crate::error::PlumeError::capacity(
                "ring capacity must be a nonzero power of 2",
            ));
        }

        let capacity = config.capacity as u64;
        let buffer: Box<[UnsafeCell<T>]> = (0..config.capacity)
            .map(|_| UnsafeCell::new(T::default()))
            .collect();
        let status: Box<[SlotStatus]> = (0..config.capacity)
            .map(|i| SlotStatus::new(i as u64))
            .collect();
        let completion = if config.wfc_enabled {
            Some(
                (0..config.capacity)
                    .map(|_| CachePadded::new(AtomicU64::new(0)))
                    .collect()
            )
        } else {
            None
        };

        Ok(Self {
            buffer,
            status,
            completion,
            capacity,
            mask: capacity - 1,
            policy: config.policy,
            shadow_enabled: config.shadow_tail_enabled,
            head: CachePadded::new(AtomicU64::new(0)),
            tail: CachePadded::new(AtomicU64::new(0)),
            shadow_tail: CachePadded::new(AtomicU64::new(0)),
            closed: AtomicBool::new(false),
            data_notifier: Notifier::new()?,
            space_notifier: Notifier::new()?,
            metrics: RingMetrics::new(),
        })
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

    /// Approximate number of occupied slots.
    pub fn size(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        head.saturating_sub(tail).min(self.capacity) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn is_full(&self) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        head.wrapping_sub(self.producer_visible_tail()) >= self.capacity
    }

    /// The tail bound producers use for fullness checks: the shadow copy when
    /// enabled, the authoritative cursor otherwise.
    fn producer_visible_tail(&self) -> u64 {
        if self.shadow_enabled {
            self.shadow_tail.load(Ordering::Acquire)
        } else {
            self.tail.load(Ordering::Acquire)
        }
    }

    // =========================================================================
    // Producer side
    // =========================================================================

    pub fn try_push(&self, entry: T) -> PushResult {
        if self.closed.load(Ordering::Acquire) {
            return PushResult::Full;
        }
        match self.policy {
            QueueFullPolicy::DropNewest => self.push_drop_newest(entry),
            QueueFullPolicy::DropOldest => self.push_drop_oldest(entry),
            QueueFullPolicy::Block => self.push_blocking(entry),
        }
    }

    fn push_drop_newest(&self, entry: T) -> PushResult {
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
    }

    fn push_drop_oldest(&self, entry: T) -> PushResult {
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

    fn push_blocking(&self, entry: T) -> PushResult {
        loop {
            if self.closed.load(Ordering::Acquire) {
                return PushResult::Full;
            }
            if let Some(pos) = self.try_claim() {
                self.write_and_publish(pos, entry);
                return PushResult::Ok(pos);
            }

            // Spin briefly, then park on the space notifier; the pop path
            // signals it whenever a slot drains.
            let mut spins = 0u32;
            while spins < PRODUCER_SPIN_LIMIT && self.is_full() {
                std::hint::spin_loop();
                if spins % 16 == 15 {
                    std::thread::yield_now();
                }
                spins += 1;
            }
            if self.is_full() && !self.closed.load(Ordering::Acquire) {
                self.space_notifier.wait(Duration::from_millis(1));
            }
        }
    }

    /// Claim the next head position, or `None` when the ring is full.
    fn try_claim(&self) -> Option<u64> {
        loop {
            let pos = self.head.load(Ordering::Relaxed);

            // Shadow-tail heuristic: a cheap bound check before touching the
            // slot's cache line. The slot sequence below stays authoritative.
            if pos.wrapping_sub(self.producer_visible_tail()) >= self.capacity {
                if pos.wrapping_sub(self.tail.load(Ordering::Acquire)) >= self.capacity {
                    return None;
                }
            }

            let slot = &self.status[(pos & self.mask) as usize];
            let seq = slot.sequence();
            if seq == pos {
                if
                    self.head
                        .compare_exchange_weak(pos, pos + 1, Ordering::AcqRel, Ordering::Relaxed)
                        .is_ok()
                {
                    return Some(pos);
                }
                // Another producer won this position.
                std::hint::spin_loop();
            } else if seq < pos {
                // Slot not yet released from the previous lap.
                return None;
            } else {
                // Stale head read; reload.
                std::hint::spin_loop();
            }
        }
    }

    fn write_and_publish(&self, pos: u64, entry: T) {
        let idx = (pos & self.mask) as usize;
        let slot = &self.status[idx];
        let writable = slot.begin_write(pos);
        debug_assert!(writable, "claimed slot must accept the Writing transition");

        // SAFETY: the head CAS granted this thread exclusive ownership of the
        // slot for generation `pos`; no other thread touches it until the
        // publish below.
        unsafe {
            *self.buffer[idx].get() = entry;
        }
        slot.publish(pos);
        self.metrics.record_push();
        self.data_notifier.signal();
    }

    /// Advance the consumer cursor past the oldest ready record, discarding
    /// it. Runs on the producer thread under `DropOldest`.
    fn discard_oldest(&self) {
        let mut scratch = T::default();
        if let Some(seq) = self.pop_impl(&mut scratch, false) {
            self.metrics.record_dropped_oldest();
            // Release anyone waiting for the discarded record.
            self.complete(seq);
        }
    }

    // =========================================================================
    // Consumer side
    // =========================================================================

    pub fn try_pop(&self, out: &mut T) -> bool {
        self.try_pop_seq(out).is_some()
    }

    /// Pop one record and return its sequence (needed to report WFC
    /// completion once the record has been fully processed).
    pub fn try_pop_seq(&self, out: &mut T) -> Option<u64> {
        self.pop_impl(out, true)
    }

    fn pop_impl(&self, out: &mut T, count: bool) -> Option<u64> {
        loop {
            let pos = self.tail.load(Ordering::Relaxed);
            let slot = &self.status[(pos & self.mask) as usize];
            let seq = slot.sequence();
            if seq == pos + 1 {
                if
                    self.tail
                        .compare_exchange_weak(pos, pos + 1, Ordering::AcqRel, Ordering::Relaxed)
                        .is_ok()
                {
                    let readable = slot.begin_read(pos);
                    debug_assert!(readable, "claimed slot must accept the Reading transition");

                    // SAFETY: the tail CAS granted exclusive read ownership of
                    // this slot for generation `pos`.
                    unsafe {
                        *out = *self.buffer[(pos & self.mask) as usize].get();
                    }
                    slot.release(pos, self.capacity);
                    if count {
                        self.metrics.record_pop();
                    }
                    self.maybe_publish_shadow(pos + 1);
                    self.space_notifier.signal();
                    return Some(pos);
                }
                std::hint::spin_loop();
            } else if seq <= pos {
                // Empty (or a producer is mid-write); publish our progress so
                // producers see an up-to-date bound while we idle.
                if self.shadow_enabled {
                    self.shadow_tail.store(pos, Ordering::Release);
                }
                return None;
            } else {
                std::hint::spin_loop();
            }
        }
    }

    fn maybe_publish_shadow(&self, next_tail: u64) {
        if self.shadow_enabled && next_tail % SHADOW_TAIL_PUBLISH_INTERVAL == 0 {
            self.shadow_tail.store(next_tail, Ordering::Release);
        }
    }

    /// Wake a consumer blocked in [`HeapRingBuffer::wait_for_data`].
    pub fn notify_consumer(&self) {
        self.data_notifier.signal_now();
    }

    /// Adaptive consumer wait: spin-yield for `poll_interval`, then block on
    /// the notifier for up to `max_wait`. Returns `true` when data is likely
    /// available.
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
        self.data_notifier.wait(max_wait);
        !self.is_empty()
    }

    // =========================================================================
    // Wait-for-completion
    // =========================================================================

    /// Record that the entry published at `seq` has been fully processed.
    pub fn complete(&self, seq: u64) {
        if let Some(completion) = &self.completion {
            completion[(seq & self.mask) as usize].fetch_max(seq + 1, Ordering::AcqRel);
            self.metrics.record_wfc_completed();
        }
    }

    /// Block until the entry published at `seq` completes. Returns `false`
    /// when the ring shut down before completion (the record was abandoned).
    pub fn wait_completed(&self, seq: u64) -> bool {
        let Some(completion) = &self.completion else {
            return true;
        };
        let cell = &completion[(seq & self.mask) as usize];
        let mut spins = 0u32;
        loop {
            if cell.load(Ordering::Acquire) >= seq + 1 {
                return true;
            }
            if self.closed.load(Ordering::Acquire) && cell.load(Ordering::Acquire) < seq + 1 {
                return false;
            }
            std::hint::spin_loop();
            spins = spins.wrapping_add(1);
            if spins % 64 == 0 {
                std::thread::yield_now();
            }
        }
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Refuse further pushes and wake every waiter. Draining what remains is
    /// the consumer's job.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.data_notifier.close();
        self.space_notifier.close();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
