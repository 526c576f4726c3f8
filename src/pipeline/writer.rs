//! Writer pipeline: ring buffer → formatter → sinks.
//!
//! One consumer thread per logger. The loop pops in a tight inner loop until
//! the ring is empty, then falls back to the two-stage `wait_for_data`. On
//! shutdown it drains everything that remains and flushes the sinks before
//! exiting. Sink failures and formatter panics are reported to the error
//! sink and never stop the drain.

use std::panic::{ self, AssertUnwindSafe };
use std::sync::Arc;
use std::sync::atomic::{ AtomicBool, Ordering };
use std::thread::JoinHandle;
use std::time::Duration;

use crate::entry::LogEntry;
use crate::error::PlumeError;
use crate::format::{ Formatter, NameResolver };
use crate::ring::{ HeapRingBuffer, SharedRingBuffer };
use crate::sink::{ self, Sink };

/// The ring a writer drains: process-local (async mode) or shared
/// (multi-process consumer).
#[derive(Clone)]
pub enum RingSource {
    Heap(Arc<HeapRingBuffer<LogEntry>>),
    Shared(Arc<SharedRingBuffer<LogEntry>>),
}

impl RingSource {
    fn try_pop_seq(&self, out: &mut LogEntry) -> Option<u64> {
        match self {
            RingSource::Heap(ring) => ring.try_pop_seq(out),
            RingSource::Shared(ring) => ring.try_pop_seq(out),
        }
    }

    fn wait_for_data(&self, poll_interval: Duration, max_wait: Duration) -> bool {
        match self {
            RingSource::Heap(ring) => ring.wait_for_data(poll_interval, max_wait),
            RingSource::Shared(ring) => ring.wait_for_data(poll_interval, max_wait),
        }
    }

    fn notify_consumer(&self) {
        match self {
            RingSource::Heap(ring) => ring.notify_consumer(),
            RingSource::Shared(ring) => ring.notify_consumer(),
        }
    }

    fn complete(&self, seq: u64) {
        if let RingSource::Heap(ring) = self {
            ring.complete(seq);
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            RingSource::Heap(ring) => ring.is_empty(),
            RingSource::Shared(ring) => ring.is_empty(),
        }
    }
}

struct WriterState {
    source: RingSource,
    formatter: Arc<dyn Formatter>,
    sinks: Vec<Arc<dyn Sink>>,
    names: Arc<dyn NameResolver>,
    running: AtomicBool,
    /// True while the worker is inside a drain pass; lets `flush` observe
    /// "ring empty AND nothing mid-write".
    busy: AtomicBool,
    poll_interval: Duration,
    poll_timeout: Duration,
}

impl WriterState {
    fn run(&self) {
        while self.running.load(Ordering::Acquire) {
            self.busy.store(true, Ordering::Release);
            let drained = self.drain();
            self.busy.store(false, Ordering::Release);
            if !drained && self.running.load(Ordering::Relaxed) {
                self.source.wait_for_data(self.poll_interval, self.poll_timeout);
            }
        }
        // Shutdown: drain what remains, then flush.
        self.busy.store(true, Ordering::Release);
        self.drain();
        self.flush_sinks();
        self.busy.store(false, Ordering::Release);
    }

    /// Pop until empty; returns whether anything was processed.
    fn drain(&self) -> bool {
        let mut entry = LogEntry::new();
        let mut any = false;
        while let Some(seq) = self.source.try_pop_seq(&mut entry) {
            self.process(&entry, seq);
            any = true;
        }
        any
    }

    fn process(&self, entry: &LogEntry, seq: u64) {
        let line = panic::catch_unwind(
            AssertUnwindSafe(|| self.formatter.format_entry(entry, self.names.as_ref()))
        );

        match line {
            Ok(line) => {
                for s in &self.sinks {
                    if let Err(e) = s.write(&line) {
                        sink::report_error("sink write failed", &e);
                    }
                }
            }
            Err(_) => {
                sink::report_error(
                    "formatter panicked",
                    &PlumeError::sink("entry dropped after formatter panic")
                );
            }
        }

        if entry.is_wfc() {
            self.source.complete(seq);
        }
    }

    fn flush_sinks(&self) {
        for s in &self.sinks {
            if let Err(e) = s.flush() {
                sink::report_error("sink flush failed", &e);
            }
        }
    }
}

pub struct WriterPipeline {
    state: Arc<WriterState>,
    handle: Option<JoinHandle<()>>,
}

impl WriterPipeline {
    pub fn new(
        source: RingSource,
        formatter: Arc<dyn Formatter>,
        sinks: Vec<Arc<dyn Sink>>,
        names: Arc<dyn NameResolver>,
        poll_interval: Duration,
        poll_timeout: Duration
    ) -> Self {
        Self {
            state: Arc::new(WriterState {
                source,
                formatter,
                sinks,
                names,
                running: AtomicBool::new(false),
                busy: AtomicBool::new(false),
                poll_interval,
                poll_timeout,
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
                .name("plume-writer".into())
                .spawn(move || state.run())
                .expect("spawning the writer thread")
        );
    }

    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::Acquire)
    }

    /// Stop the thread; it drains the ring and flushes sinks on the way out.
    pub fn stop(&mut self) {
        if !self.state.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.state.source.notify_consumer();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    /// Busy-poll until the ring is quiescent (empty, with no entry mid-write
    /// in the worker), then flush the sinks.
    pub fn flush(&self) {
        while
            self.is_running() &&
            (!self.state.source.is_empty() || self.state.busy.load(Ordering::Acquire))
        {
            std::thread::yield_now();
        }
        if !self.is_running() {
            // Worker gone: drain on the caller.
            let mut entry = LogEntry::new();
            while let Some(seq) = self.state.source.try_pop_seq(&mut entry) {
                self.state.process(&entry, seq);
            }
        }
        self.state.flush_sinks();
    }
}

impl Drop for WriterPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}
