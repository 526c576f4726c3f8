//! Log entry: the payload type carried by both ring buffers.

use std::time::{ SystemTime, UNIX_EPOCH };

use static_assertions::const_assert_eq;

use crate::constants::{ LOG_ENTRY_WIRE_SIZE, SNAPSHOT_CAPACITY };
use crate::level::Level;
use crate::snapshot::Snapshot;

/// Entry flag bit: producer waits for sink completion of this record.
pub const FLAG_WFC: u8 = 0b0000_0001;

/// A single log record: fixed size, no outboard allocation.
///
/// Wire format (little-endian, 280 bytes total): 8 B timestamp, 1 B level,
/// 1 B flags + 2 B padding, 4 B thread id, 4 B process id, 4 B reserved,
/// then the 256-byte snapshot buffer.
#[derive(Clone, Copy)]
#[repr(C)]
pub struct LogEntry {
    /// Nanoseconds since the Unix epoch, or 0 when the formatter does not
    /// need timestamps.
    pub timestamp: u64,
    pub level: Level,
    flags: u8,
    _pad: [u8; 2],
    pub thread_id: u32,
    pub process_id: u32,
    reserved: u32,
    pub snapshot: Snapshot,
}

const_assert_eq!(LOG_ENTRY_WIRE_SIZE, 280);

impl Default for LogEntry {
    fn default() -> Self {
        Self::new()
    }
}

impl LogEntry {
    pub fn new() -> Self {
        Self {
            timestamp: 0,
            level: Level::Info,
            flags: 0,
            _pad: [0; 2],
            thread_id: 0,
            process_id: 0,
            reserved: 0,
            snapshot: Snapshot::new(),
        }
    }

    pub fn with_snapshot(level: Level, snapshot: Snapshot) -> Self {
        Self {
            level,
            snapshot,
            ..Self::new()
        }
    }

    pub fn is_wfc(&self) -> bool {
        self.flags & FLAG_WFC != 0
    }

    pub fn set_wfc(&mut self, on: bool) {
        if on {
            self.flags |= FLAG_WFC;
        } else {
            self.flags &= !FLAG_WFC;
        }
    }

    /// Serialize into the fixed 280-byte wire layout.
    pub fn to_wire(&self, out: &mut [u8; LOG_ENTRY_WIRE_SIZE]) {
        out[0..8].copy_from_slice(&self.timestamp.to_le_bytes());
        out[8] = self.level as u8;
        out[9] = self.flags;
        out[10] = 0;
        out[11] = 0;
        out[12..16].copy_from_slice(&self.thread_id.to_le_bytes());
        out[16..20].copy_from_slice(&self.process_id.to_le_bytes());
        out[20..24].copy_from_slice(&self.reserved.to_le_bytes());
        self.snapshot.serialize_to(&mut out[24..24 + SNAPSHOT_CAPACITY]);
    }

    /// Reconstruct from the wire layout; snapshot truncation is tolerated.
    pub fn from_wire(data: &[u8; LOG_ENTRY_WIRE_SIZE]) -> Self {
        Self {
            timestamp: u64::from_le_bytes(data[0..8].try_into().unwrap()),
            level: Level::from_u8(data[8]),
            flags: data[9],
            _pad: [0; 2],
            thread_id: u32::from_le_bytes(data[12..16].try_into().unwrap()),
            process_id: u32::from_le_bytes(data[16..20].try_into().unwrap()),
            reserved: u32::from_le_bytes(data[20..24].try_into().unwrap()),
            snapshot: Snapshot::deserialize_from(&data[24..24 + SNAPSHOT_CAPACITY]),
        }
    }
}

/// Current wall-clock time in nanoseconds since the Unix epoch.
pub fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_roundtrip() {
        let mut snapshot = Snapshot::new();
        snapshot.capture_view("count = {}");
        snapshot.capture_i32(3);

        let mut entry = LogEntry::with_snapshot(Level::Warn, snapshot);
        entry.timestamp = 1_234_567_890;
        entry.thread_id = 42;
        entry.process_id = 99;
        entry.set_wfc(true);

        let mut wire = [0u8; LOG_ENTRY_WIRE_SIZE];
        entry.to_wire(&mut wire);
        let restored = LogEntry::from_wire(&wire);

        assert_eq!(restored.timestamp, 1_234_567_890);
        assert_eq!(restored.level, Level::Warn);
        assert_eq!(restored.thread_id, 42);
        assert_eq!(restored.process_id, 99);
        assert!(restored.is_wfc());
        assert_eq!(restored.snapshot, entry.snapshot);
    }

    #[test]
    fn test_wfc_flag_toggles() {
        let mut entry = LogEntry::new();
        assert!(!entry.is_wfc());
        entry.set_wfc(true);
        assert!(entry.is_wfc());
        entry.set_wfc(false);
        assert!(!entry.is_wfc());
    }

    #[test]
    fn test_now_nanos_monotonic_enough() {
        let a = now_nanos();
        let b = now_nanos();
        assert!(b >= a);
        assert!(a > 1_600_000_000_000_000_000); // after 2020
    }
}
