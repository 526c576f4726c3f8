//! Logger façade: the surface the transport core exposes.
//!
//! A [`Logger`] owns its ring buffer(s) and worker thread(s) for the
//! configured mode:
//!
//! - **Sync**: format and sink on the calling thread.
//! - **Async**: producers snapshot into a heap ring; one writer thread drains
//!   it into the sinks.
//! - **MProc**: producers snapshot into a local heap ring; a pipeline thread
//!   converts and forwards into the shared ring; the owning process runs the
//!   consumer that formats with names from the shared registry.

use std::sync::Arc;
use std::sync::atomic::{ AtomicBool, AtomicU8, Ordering };
use std::time::Duration;

use once_cell::sync::OnceCell;
use parking_lot::{ Mutex, RwLock };
use serde::{ Deserialize, Serialize };

use crate::constants::{
    DEFAULT_NAME_REGISTRY_CAPACITY,
    DEFAULT_POLL_INTERVAL_US,
    DEFAULT_POLL_TIMEOUT_MS,
    DEFAULT_RING_CAPACITY,
};
use crate::entry::{ now_nanos, LogEntry };
use crate::error::{ PlumeError, Result };
use crate::format::{ Formatter, FullFormatter, MetadataNeeds, NameResolver };
use crate::level::Level;
use crate::metrics::MetricsSnapshot;
use crate::names::{ current_process_id, current_thread_id, FixedName, ThreadModuleTable };
use crate::pipeline::{ MprocPipeline, RingSource, WriterPipeline };
use crate::registry::NameRegistry;
use crate::ring::{ HeapRingBuffer, PushResult, QueueFullPolicy, RingConfig, SharedRingBuffer };
use crate::sink::{ ConsoleSink, Sink };
use crate::snapshot::{ Arg, Snapshot };

/// Operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// Format and write on the caller.
    Sync,
    /// Background writer thread in this process.
    Async,
    /// Cross-process aggregation through shared memory.
    MProc,
}

/// Role within an MProc deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MprocRole {
    /// Creates the shared segments and runs the consumer.
    Owner,
    /// Attaches to existing segments and only produces.
    Producer,
}

/// Logger configuration surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerConfig {
    pub mode: Mode,
    pub level: Level,
    /// Ring capacity; positive power of two.
    pub capacity: usize,
    pub queue_full_policy: QueueFullPolicy,
    pub shadow_tail_enabled: bool,
    pub wfc_enabled: bool,
    /// MProc only; must begin with `/` (POSIX shared-memory namespace).
    pub shared_memory_name: Option<String>,
    pub mproc_role: MprocRole,
    pub name_registry_capacity: usize,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Sync,
            level: Level::Info,
            capacity: DEFAULT_RING_CAPACITY,
            queue_full_policy: QueueFullPolicy::DropNewest,
            shadow_tail_enabled: true,
            wfc_enabled: false,
            shared_memory_name: None,
            mproc_role: MprocRole::Owner,
            name_registry_capacity: DEFAULT_NAME_REGISTRY_CAPACITY,
            poll_interval: Duration::from_micros(DEFAULT_POLL_INTERVAL_US),
            poll_timeout: Duration::from_millis(DEFAULT_POLL_TIMEOUT_MS),
        }
    }
}

impl LoggerConfig {
    pub fn sync() -> Self {
        Self::default()
    }

    pub fn async_mode() -> Self {
        Self {
            mode: Mode::Async,
            ..Self::default()
        }
    }

    pub fn mproc(shared_memory_name: impl Into<String>, role: MprocRole) -> Self {
        Self {
            mode: Mode::MProc,
            shared_memory_name: Some(shared_memory_name.into()),
            mproc_role: role,
            ..Self::default()
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_policy(mut self, policy: QueueFullPolicy) -> Self {
        self.queue_full_policy = policy;
        self
    }

    pub fn with_wfc(mut self, enabled: bool) -> Self {
        self.wfc_enabled = enabled;
        self
    }

    pub fn with_shadow_tail(mut self, enabled: bool) -> Self {
        self.shadow_tail_enabled = enabled;
        self
    }

    /// Apply `PLUME_LEVEL` and `PLUME_SHM_NAME` environment overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(level) = std::env::var("PLUME_LEVEL") {
            let level = match level.to_ascii_lowercase().as_str() {
                "trace" => Some(Level::Trace),
                "debug" => Some(Level::Debug),
                "info" => Some(Level::Info),
                "warn" => Some(Level::Warn),
                "error" => Some(Level::Error),
                "critical" => Some(Level::Critical),
                "off" => Some(Level::Off),
                _ => None,
            };
            if let Some(level) = level {
                self.level = level;
            }
        }
        if let Ok(name) = std::env::var("PLUME_SHM_NAME") {
            if !name.is_empty() {
                self.shared_memory_name = Some(name);
            }
        }
        self
    }

    fn validate(&self) -> Result<()> {
        if self.capacity == 0 || !self.capacity.is_power_of_two() {
            return Err(PlumeError::capacity("logger capacity must be a nonzero power of 2"));
        }
        if self.mode == Mode::MProc {
            match &self.shared_memory_name {
                None => {
                    return Err(PlumeError::config("MProc mode requires shared_memory_name"));
                }
                Some(name) if !name.starts_with('/') => {
                    return Err(PlumeError::config("shared memory name must begin with '/'"));
                }
                _ => {}
            }
            if self.name_registry_capacity == 0 {
                return Err(PlumeError::capacity("name registry capacity must be positive"));
            }
        }
        Ok(())
    }

    fn ring_config(&self) -> RingConfig {
        RingConfig {
            capacity: self.capacity,
            policy: self.queue_full_policy,
            shadow_tail_enabled: self.shadow_tail_enabled,
            wfc_enabled: self.wfc_enabled,
        }
    }
}

/// Resolver backed by this process's name tables.
struct LocalNames {
    process_name: Arc<RwLock<FixedName>>,
    modules: Arc<ThreadModuleTable>,
}

impl NameResolver for LocalNames {
    fn process_name(&self, pid: u32) -> String {
        let name = self.process_name.read();
        if name.is_empty() {
            pid.to_string()
        } else {
            name.view().to_string()
        }
    }

    fn thread_module(&self, tid: u32) -> String {
        self.modules.get(tid).to_string()
    }
}

/// Resolver backed by the shared-memory registry (MProc consumer).
struct RegistryNames {
    registry: Arc<NameRegistry>,
}

impl NameResolver for RegistryNames {
    fn process_name(&self, pid: u32) -> String {
        self.registry.process_name(pid)
    }

    fn thread_module(&self, tid: u32) -> String {
        self.registry.thread_module(tid)
    }
}

pub struct Logger {
    mode: Mode,
    level: AtomicU8,
    needs: MetadataNeeds,
    process_id: u32,
    process_name: Arc<RwLock<FixedName>>,
    modules: Arc<ThreadModuleTable>,
    registry: Option<Arc<NameRegistry>>,
    local_ring: Option<Arc<HeapRingBuffer<LogEntry>>>,
    shared_ring: Option<Arc<SharedRingBuffer<LogEntry>>>,
    writer: Mutex<Option<WriterPipeline>>,
    mproc: Mutex<Option<MprocPipeline>>,
    formatter: Arc<dyn Formatter>,
    sinks: Vec<Arc<dyn Sink>>,
    resolver: Arc<dyn NameResolver>,
    shutdown: AtomicBool,
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger").finish_non_exhaustive()
    }
}

impl Logger {
    /// Logger with the default formatter and a stdout console sink.
    pub fn new(config: LoggerConfig) -> Result<Self> {
        Self::with_output(config, Arc::new(FullFormatter), vec![Arc::new(ConsoleSink::stdout())])
    }

    /// Logger with explicit formatter and sinks.
    pub fn with_output(
        config: LoggerConfig,
        formatter: Arc<dyn Formatter>,
        sinks: Vec<Arc<dyn Sink>>
    ) -> Result<Self> {
        config.validate()?;

        let needs = formatter.needs();
        let process_name = Arc::new(RwLock::new(FixedName::new()));
        let modules = Arc::new(ThreadModuleTable::new());
        let resolver: Arc<dyn NameResolver> = Arc::new(LocalNames {
            process_name: Arc::clone(&process_name),
            modules: Arc::clone(&modules),
        });

        let mut logger = Self {
            mode: config.mode,
            level: AtomicU8::new(config.level as u8),
            needs,
            process_id: current_process_id(),
            process_name,
            modules,
            registry: None,
            local_ring: None,
            shared_ring: None,
            writer: Mutex::new(None),
            mproc: Mutex::new(None),
            formatter,
            sinks,
            resolver,
            shutdown: AtomicBool::new(false),
        };

        match config.mode {
            Mode::Sync => {}
            Mode::Async => logger.init_async(&config)?,
            Mode::MProc => logger.init_mproc(&config)?,
        }

        Ok(logger)
    }

    fn init_async(&mut self, config: &LoggerConfig) -> Result<()> {
        let ring = Arc::new(HeapRingBuffer::new(config.ring_config())?);
        let mut writer = WriterPipeline::new(
            RingSource::Heap(Arc::clone(&ring)),
            Arc::clone(&self.formatter),
            self.sinks.clone(),
            Arc::clone(&self.resolver),
            config.poll_interval,
            config.poll_timeout
        );
        writer.start();
        self.local_ring = Some(ring);
        *self.writer.get_mut() = Some(writer);
        Ok(())
    }

    fn init_mproc(&mut self, config: &LoggerConfig) -> Result<()> {
        let shm_name = config.shared_memory_name
            .as_deref()
            .ok_or_else(|| PlumeError::config("MProc mode requires shared_memory_name"))?;
        let registry_name = NameRegistry::segment_name(shm_name);

        let (shared, registry) = match config.mproc_role {
            MprocRole::Owner => {
                let shared = Arc::new(
                    SharedRingBuffer::<LogEntry>::create(shm_name, config.ring_config())?
                );
                let registry = Arc::new(
                    NameRegistry::create(&registry_name, config.name_registry_capacity)?
                );
                (shared, registry)
            }
            MprocRole::Producer => {
                let shared = Arc::new(SharedRingBuffer::<LogEntry>::attach(shm_name)?);
                let registry = Arc::new(NameRegistry::attach(&registry_name)?);
                (shared, registry)
            }
        };

        // Every process produces through a local ring + conversion pipeline.
        let local = Arc::new(HeapRingBuffer::new(config.ring_config())?);
        let mut pipeline = MprocPipeline::new(
            Arc::clone(&local),
            Arc::clone(&shared),
            config.poll_interval,
            config.poll_timeout
        );
        pipeline.start();

        // The owner also runs the consumer, formatting with registry names.
        if config.mproc_role == MprocRole::Owner {
            let resolver: Arc<dyn NameResolver> = Arc::new(RegistryNames {
                registry: Arc::clone(&registry),
            });
            let mut writer = WriterPipeline::new(
                RingSource::Shared(Arc::clone(&shared)),
                Arc::clone(&self.formatter),
                self.sinks.clone(),
                resolver,
                config.poll_interval,
                config.poll_timeout
            );
            writer.start();
            *self.writer.get_mut() = Some(writer);
        }

        self.registry = Some(registry);
        self.local_ring = Some(local);
        self.shared_ring = Some(shared);
        *self.mproc.get_mut() = Some(pipeline);
        Ok(())
    }

    // =========================================================================
    // Producer API
    // =========================================================================

    pub fn level(&self) -> Level {
        Level::from_u8(self.level.load(Ordering::Relaxed))
    }

    pub fn set_level(&self, level: Level) {
        self.level.store(level as u8, Ordering::Relaxed);
    }

    pub fn enabled(&self, level: Level) -> bool {
        level.enabled_at(self.level()) && !self.shutdown.load(Ordering::Acquire)
    }

    /// Capture `template` plus `args` and enqueue at `level`.
    pub fn log(&self, level: Level, template: &'static str, args: &[Arg<'_>]) -> PushResult {
        if !self.enabled(level) {
            return PushResult::DroppedNewest;
        }
        self.push(level, self.capture(template, args))
    }

    /// Like [`Logger::log`] but returns only after the record has been
    /// formatted and written by the sink (wait-for-completion).
    pub fn log_wfc(&self, level: Level, template: &'static str, args: &[Arg<'_>]) -> PushResult {
        if !self.enabled(level) {
            return PushResult::DroppedNewest;
        }
        self.push_wfc(level, self.capture(template, args))
    }

    /// Build the binary snapshot for a call: the template is captured
    /// zero-copy as the first record, arguments follow.
    pub fn capture(&self, template: &'static str, args: &[Arg<'_>]) -> Snapshot {
        let mut snapshot = Snapshot::new();
        snapshot.capture_view(template);
        if !snapshot.capture_many(args) {
            if let Some(ring) = &self.local_ring {
                ring.metrics().record_snapshot_overflow();
            }
        }
        snapshot
    }

    /// Enqueue a pre-captured snapshot (the template rides along as the
    /// snapshot's first record).
    pub fn push(&self, level: Level, snapshot: Snapshot) -> PushResult {
        if self.shutdown.load(Ordering::Acquire) {
            // Post-shutdown records are silently dropped.
            return PushResult::Full;
        }
        let entry = self.make_entry(level, snapshot);
        match self.mode {
            Mode::Sync => self.write_sync(&entry),
            Mode::Async | Mode::MProc => {
                match &self.local_ring {
                    Some(ring) => ring.try_push(entry),
                    None => PushResult::Full,
                }
            }
        }
    }

    /// Enqueue and block until the record has traversed the pipeline and the
    /// sink write finished.
    pub fn push_wfc(&self, level: Level, snapshot: Snapshot) -> PushResult {
        if self.shutdown.load(Ordering::Acquire) {
            return PushResult::Full;
        }
        let mut entry = self.make_entry(level, snapshot);
        entry.set_wfc(true);
        match self.mode {
            // A synchronous write is durable by the time it returns.
            Mode::Sync => self.write_sync(&entry),
            Mode::Async | Mode::MProc => {
                let Some(ring) = &self.local_ring else {
                    return PushResult::Full;
                };
                let result = ring.try_push(entry);
                if let Some(seq) = result.sequence() {
                    ring.wait_completed(seq);
                }
                result
            }
        }
    }

    fn make_entry(&self, level: Level, snapshot: Snapshot) -> LogEntry {
        let mut entry = LogEntry::with_snapshot(level, snapshot);
        if self.needs.timestamp {
            entry.timestamp = now_nanos();
        }
        if self.needs.thread_id {
            entry.thread_id = current_thread_id();
        }
        if self.needs.process_id {
            entry.process_id = self.process_id;
        }
        entry
    }

    fn write_sync(&self, entry: &LogEntry) -> PushResult {
        let line = self.formatter.format_entry(entry, self.resolver.as_ref());
        for s in &self.sinks {
            if let Err(e) = s.write(&line) {
                crate::sink::report_error("sink write failed", &e);
            }
        }
        PushResult::Ok(0)
    }

    // =========================================================================
    // Names
    // =========================================================================

    /// Set this process's display name; in MProc mode it is also published
    /// to the shared registry.
    pub fn set_process_name(&self, name: &str) {
        self.process_name.write().assign(name);
        if let Some(registry) = &self.registry {
            registry.set_process_name(self.process_id, name);
        }
    }

    /// Set the calling thread's module name.
    pub fn set_thread_module(&self, name: &str) {
        let tid = current_thread_id();
        self.modules.register(tid, name);
        if let Some(registry) = &self.registry {
            registry.set_thread_module(tid, name);
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Block until local rings drain and all sinks flush.
    pub fn flush(&self) {
        if let Some(pipeline) = self.mproc.lock().as_ref() {
            pipeline.flush();
        }
        match self.writer.lock().as_ref() {
            Some(writer) => writer.flush(),
            None => {
                for s in &self.sinks {
                    if let Err(e) = s.flush() {
                        crate::sink::report_error("sink flush failed", &e);
                    }
                }
            }
        }
    }

    /// Stop pipelines, drain, flush, and release resources. Records pushed
    /// after shutdown are silently dropped.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }

        // Producer-side bridge first so local records reach the shared ring,
        // then the writer (drains + flushes on stop), then the rings.
        if let Some(mut pipeline) = self.mproc.lock().take() {
            pipeline.stop();
        }
        if let Some(mut writer) = self.writer.lock().take() {
            writer.stop();
        }
        if let Some(ring) = &self.local_ring {
            ring.close();
        }
        if let Some(shared) = &self.shared_ring {
            shared.close();
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Transport counters for the local ring (zeroes in sync mode).
    pub fn metrics(&self) -> MetricsSnapshot {
        self.local_ring
            .as_ref()
            .map(|r| r.metrics().snapshot())
            .unwrap_or_default()
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// =============================================================================
// Process-wide default logger
// =============================================================================

static DEFAULT_LOGGER: OnceCell<Arc<Logger>> = OnceCell::new();

/// Install the process-wide default logger used by the logging macros when no
/// explicit logger is given. Only the first call takes effect; returns `false`
/// if a default was already set.
pub fn init_default(logger: Arc<Logger>) -> bool {
    DEFAULT_LOGGER.set(logger).is_ok()
}

/// The process-wide default logger, if one was installed.
pub fn default_logger() -> Option<&'static Arc<Logger>> {
    DEFAULT_LOGGER.get()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::MessageFormatter;
    use parking_lot::Mutex as PlMutex;

    struct VecSink {
        lines: PlMutex<Vec<String>>,
    }

    impl VecSink {
        fn new() -> Arc<Self> {
            Arc::new(Self { lines: PlMutex::new(Vec::new()) })
        }

        fn lines(&self) -> Vec<String> {
            self.lines.lock().clone()
        }
    }

    impl Sink for VecSink {
        fn write(&self, line: &str) -> Result<()> {
            self.lines.lock().push(line.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_sync_logger_writes_on_caller() {
        let sink = VecSink::new();
        let logger = Logger::with_output(
            LoggerConfig::sync(),
            Arc::new(MessageFormatter),
            vec![Arc::clone(&sink) as Arc<dyn Sink>]
        ).unwrap();

        logger.log(Level::Info, "value is {}", &[Arg::I32(7)]);
        assert_eq!(sink.lines(), vec!["value is 7"]);
    }

    #[test]
    fn test_level_filtering() {
        let sink = VecSink::new();
        let logger = Logger::with_output(
            LoggerConfig::sync().with_level(Level::Warn),
            Arc::new(MessageFormatter),
            vec![Arc::clone(&sink) as Arc<dyn Sink>]
        ).unwrap();

        logger.log(Level::Debug, "hidden", &[]);
        logger.log(Level::Error, "visible", &[]);
        assert_eq!(sink.lines(), vec!["visible"]);

        logger.set_level(Level::Trace);
        logger.log(Level::Debug, "now visible", &[]);
        assert_eq!(sink.lines().len(), 2);
    }

    #[test]
    fn test_async_logger_end_to_end() {
        let sink = VecSink::new();
        let logger = Logger::with_output(
            LoggerConfig::async_mode().with_capacity(64),
            Arc::new(MessageFormatter),
            vec![Arc::clone(&sink) as Arc<dyn Sink>]
        ).unwrap();

        for i in 0..10i32 {
            assert!(logger.log(Level::Info, "msg {}", &[Arg::I32(i)]).is_published());
        }
        logger.flush();
        let lines = sink.lines();
        assert_eq!(lines.len(), 10);
        assert_eq!(lines[0], "msg 0");
        assert_eq!(lines[9], "msg 9");
    }

    #[test]
    fn test_shutdown_then_push_is_dropped() {
        let sink = VecSink::new();
        let logger = Logger::with_output(
            LoggerConfig::async_mode(),
            Arc::new(MessageFormatter),
            vec![Arc::clone(&sink) as Arc<dyn Sink>]
        ).unwrap();

        logger.log(Level::Info, "before", &[]);
        logger.shutdown();
        assert!(logger.is_shut_down());

        let result = logger.log(Level::Info, "after", &[]);
        assert!(!result.is_published());
        assert_eq!(sink.lines(), vec!["before"]);
    }

    #[test]
    fn test_wfc_observes_sink_write() {
        let sink = VecSink::new();
        let logger = Logger::with_output(
            LoggerConfig::async_mode().with_wfc(true),
            Arc::new(MessageFormatter),
            vec![Arc::clone(&sink) as Arc<dyn Sink>]
        ).unwrap();

        let result = logger.log_wfc(Level::Critical, "critical {}", &[Arg::I32(0xdead)]);
        assert!(result.is_published());
        // The record must already be in the sink when log_wfc returns.
        assert_eq!(sink.lines(), vec!["critical 57005"]);
    }

    #[test]
    fn test_config_validation() {
        assert!(Logger::new(LoggerConfig::sync().with_capacity(100)).is_err());

        let bad_name = LoggerConfig::mproc("no-slash", MprocRole::Owner);
        assert!(matches!(Logger::new(bad_name), Err(PlumeError::InvalidConfig { .. })));

        let missing = LoggerConfig {
            mode: Mode::MProc,
            shared_memory_name: None,
            ..Default::default()
        };
        assert!(Logger::new(missing).is_err());
    }

    #[test]
    fn test_process_and_module_names_in_output() {
        let sink = VecSink::new();
        let logger = Logger::with_output(
            LoggerConfig::sync(),
            Arc::new(FullFormatter),
            vec![Arc::clone(&sink) as Arc<dyn Sink>]
        ).unwrap();

        logger.set_process_name("api-server");
        logger.set_thread_module("ingest");
        logger.log(Level::Info, "up", &[]);

        let line = &sink.lines()[0];
        assert!(line.contains("[api-server:ingest]"), "line was: {line}");
    }

    #[test]
    fn test_metrics_counts_drops() {
        let logger = Logger::with_output(
            LoggerConfig::async_mode().with_capacity(2),
            Arc::new(MessageFormatter),
            vec![Arc::new(crate::sink::NullSink)]
        ).unwrap();

        // Stop the writer so the ring actually fills.
        if let Some(mut writer) = logger.writer.lock().take() {
            writer.stop();
        }
        for _ in 0..10 {
            logger.log(Level::Info, "spam", &[]);
        }
        let metrics = logger.metrics();
        assert!(metrics.dropped_newest > 0);
        assert_eq!(metrics.pushed + metrics.dropped_newest, 10);
    }
}
