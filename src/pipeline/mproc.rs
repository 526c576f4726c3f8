//! Producer-side multi-process pipeline.
//!
//! Drains the process-local heap ring, rewrites each snapshot's borrowed
//! string views into inline copies (pointers do not survive the address-space
//! boundary), stamps the producing process id, and pushes into the shared
//! ring. Producers stay fast by publishing into the local ring; the
//! conversion cost is amortized here, and shared-memory contention is limited
//! to one writer per process.

use std::sync::Arc;
use std::sync::atomic::{ AtomicBool, Ordering };
use std::thread::JoinHandle;
use std::time::Duration;

use crate::entry::LogEntry;
use crate::names::current_process_id;
use crate::ring::{ HeapRingBuffer, SharedRingBuffer };

struct MprocState {
    local: Arc<HeapRingBuffer<LogEntry>>,
    shared: Arc<SharedRingBuffer<LogEntry>>,
    running: AtomicBool,
    /// True while inside a drain pass, so `flush` can observe full quiescence.
    busy: AtomicBool,
    poll_interval: Duration,
    poll_timeout: Duration,
    process_id: u32,
}

impl MprocState {
    fn run(&self) {
        while self.running.load(Ordering::Acquire) {
            self.busy.store(true, Ordering::Release);
            let moved = self.drain();
            self.busy.store(false, Ordering::Release);
            if !moved && self.running.load(Ordering::Relaxed) {
                self.local.wait_for_data(self.poll_interval, self.poll_timeout);
            }
        }
        self.busy.store(true, Ordering::Release);
        self.drain();
        self.busy.store(false, Ordering::Release);
    }

    fn drain(&self) -> bool {
        let mut entry = LogEntry::new();
        let mut any = false;
        while let Some(seq) = self.local.try_pop_seq(&mut entry) {
            self.forward(&mut entry, seq);
            any = true;
        }
        any
    }

    fn forward(&self, entry: &mut LogEntry, local_seq: u64) {
        entry.snapshot.convert_borrowed_to_inline();
        entry.process_id = self.process_id;

        // The shared ring applies the segment's own full-queue policy.
        let result = self.shared.try_push(*entry);
        if result.is_published() {
            self.shared.notify_consumer();
        }

        // A WFC producer in this process unblocks once its record has been
        // handed to the shared ring; the consumer process owns the sink.
        if entry.is_wfc() {
            self.local.complete(local_seq);
        }
    }
}

pub struct MprocPipeline {
    state: Arc<MprocState>,
    handle: Option<JoinHandle<()>>,
}

impl MprocPipeline {
    pub fn new(
        local: Arc<HeapRingBuffer<LogEntry>>,
        shared: Arc<SharedRingBuffer<LogEntry>>,
        poll_interval: Duration,
        poll_timeout: Duration
    ) -> Self {
        Self {
            state: Arc::new(MprocState {
                local,
                shared,
                running: AtomicBool::new(false),
                busy: AtomicBool::new(false),
                poll_interval,
                poll_timeout,
                process_id: current_process_id(),
            }),
            handle: None,
        }
    }

    pub fn start(&mut self) {
        if self.state.running.swap(true, Ordering::AcqRel) {
            return;
        }
        let state = Arc::clone(&self.state);
        self.handle = Some(
            std::thread::Builder
                ::new()
                .name("plume-mproc".into())
                .spawn(move || state.run())
                .expect("spawning the mproc pipeline thread")
        );
    }

    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::Acquire)
    }

    pub fn stop(&mut self) {
        if !self.state.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.state.local.notify_consumer();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    /// Busy-poll until the local ring has been fully forwarded.
    pub fn flush(&self) {
        while
            self.is_running() &&
            (!self.state.local.is_empty() || self.state.busy.load(Ordering::Acquire))
        {
            std::thread::yield_now();
        }
        if !self.is_running() {
            let mut entry = LogEntry::new();
            while let Some(seq) = self.state.local.try_pop_seq(&mut entry) {
                self.state.forward(&mut entry, seq);
            }
        }
    }
}

impl Drop for MprocPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}
