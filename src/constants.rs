//! Plume layout and tuning constants
//!
//! This module contains the layout parameters and performance tuning values
//! used throughout the plume library.

/// Default ring buffer capacity (must be power of 2 for efficient modulo operations)
pub const DEFAULT_RING_CAPACITY: usize = 8192;

/// Cache line size for alignment optimizations (64 bytes on most modern CPUs)
pub const CACHE_LINE_SIZE: usize = 64;

/// Fixed capacity of a binary argument snapshot
pub const SNAPSHOT_CAPACITY: usize = 256;

/// Size of the snapshot argument-count header (little-endian u16)
pub const SNAPSHOT_HEADER_SIZE: usize = 2;

/// Serialized size of a log entry: 24-byte metadata header + snapshot buffer
pub const LOG_ENTRY_WIRE_SIZE: usize = 24 + SNAPSHOT_CAPACITY;

/// Maximum stored length of a fixed name (storage adds a NUL)
pub const FIXED_NAME_CAPACITY: usize = 15;

/// Maximum thread id supported by the direct-indexed lookup table
/// (Linux default pid_max)
pub const DIRECT_TABLE_MAX_TID: usize = 32768;

/// Entry count of the linear-probe lookup table
pub const ARRAY_TABLE_CAPACITY: usize = 256;

/// Default capacity of the shared-memory name registry
pub const DEFAULT_NAME_REGISTRY_CAPACITY: usize = 64;

/// Magic number identifying a plume shared ring buffer segment ("ONE_PLOG")
pub const SHARED_RING_MAGIC: u64 = 0x4F4E455F504C4F47;

/// Shared-memory layout version; bump on any layout change
pub const SHARED_RING_VERSION: u32 = 1;

/// Default consumer poll interval (tight spin phase)
pub const DEFAULT_POLL_INTERVAL_US: u64 = 1;

/// Default consumer poll timeout (blocking wait phase)
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 10;

/// How many pops between shadow-tail publications by the consumer
pub const SHADOW_TAIL_PUBLISH_INTERVAL: u64 = 64;

/// Spin iterations before a blocked producer falls back to the notifier
pub const PRODUCER_SPIN_LIMIT: u32 = 128;

/// Validate that the layout constants are consistent with each other
pub fn validate_constants() -> Result<(), &'static str> {
    if !DEFAULT_RING_CAPACITY.is_power_of_two() {
        return Err("DEFAULT_RING_CAPACITY must be a power of 2");
    }
    if CACHE_LINE_SIZE == 0 || !CACHE_LINE_SIZE.is_power_of_two() {
        return Err("CACHE_LINE_SIZE must be a power of 2");
    }
    if SNAPSHOT_HEADER_SIZE >= SNAPSHOT_CAPACITY {
        return Err("snapshot header must leave room for records");
    }
    if LOG_ENTRY_WIRE_SIZE != 280 {
        return Err("log entry wire size must stay 280 bytes");
    }
    Ok(())
}
