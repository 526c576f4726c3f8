//! Plume - high-throughput structured logging transport
//!
//! A producer emits a record with a severity, a format template, and typed
//! arguments; plume delivers formatted output to one or more sinks with
//! bounded latency through one of three modes behind a single API:
//!
//! - **Sync**: format and write on the caller.
//! - **Async**: zero-allocation binary capture into a lock-free ring buffer,
//!   drained by a background writer thread.
//! - **MProc**: cross-process aggregation through a shared-memory ring with a
//!   process/thread name registry.

pub mod constants;
pub mod entry;
pub mod error;
pub mod format;
pub mod level;
pub mod logger;
pub mod metrics;
pub mod names;
pub mod pipeline;
pub mod registry;
pub mod ring;
pub mod sink;
pub mod snapshot;

mod macros;

// Re-export main components
pub use entry::LogEntry;
pub use error::{ PlumeError, Result };
pub use format::{ CompactFormatter, Formatter, FullFormatter, MessageFormatter, MetadataNeeds };
pub use level::Level;
pub use logger::{ default_logger, init_default, Logger, LoggerConfig, Mode, MprocRole };
pub use metrics::MetricsSnapshot;
pub use names::FixedName;
pub use registry::NameRegistry;
pub use ring::{
    HeapRingBuffer,
    PushResult,
    QueueFullPolicy,
    RingConfig,
    SharedRingBuffer,
};
pub use sink::{ ConsoleSink, FileSink, NullSink, Sink, UdpSink };
pub use snapshot::{ Arg, Snapshot, ToArg, TypeTag };

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The process-wide default logger.
///
/// Precondition: [`init_default`] must have been called once at startup;
/// panics otherwise.
pub fn global() -> &'static std::sync::Arc<Logger> {
    default_logger().expect("plume::init_default was not called")
}
