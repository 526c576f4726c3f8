//! Lock-free ring buffer transport
//!
//! The record-transport fabric: a bounded MPMC ring with a per-slot state
//! machine, realized over a heap allocation ([`heap::HeapRingBuffer`]) or a
//! named shared-memory segment ([`shared::SharedRingBuffer`]). Producers and
//! consumers synchronize exclusively through the slot `(state, sequence)`
//! words plus two cache-line padded cursors; the optional shadow tail lets
//! producers check fullness without contending on the consumer's cursor.

pub mod heap;
pub mod notify;
pub mod shared;
pub mod shm;
pub mod slot;

pub use heap::HeapRingBuffer;
pub use notify::Notifier;
pub use shared::SharedRingBuffer;
pub use slot::{ SlotState, SlotStatus };

use serde::{ Deserialize, Serialize };

use crate::constants::DEFAULT_RING_CAPACITY;
use crate::error::{ PlumeError, Result };

/// Behavior of `try_push` when the ring is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum QueueFullPolicy {
    /// Reject the incoming record; it is lost and counted.
    DropNewest = 0,
    /// Discard the oldest ready record to make room, then retry once.
    DropOldest = 1,
    /// Backpressure: spin, then wait on the notifier until space frees up or
    /// the ring shuts down.
    Block = 2,
}

impl QueueFullPolicy {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::DropNewest),
            1 => Some(Self::DropOldest),
            2 => Some(Self::Block),
            _ => None,
        }
    }
}

impl Default for QueueFullPolicy {
    fn default() -> Self {
        Self::DropNewest
    }
}

/// Outcome of a push attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushResult {
    /// Published at the contained sequence.
    Ok(u64),
    /// Ring full under `DropNewest`; the record was discarded.
    DroppedNewest,
    /// Ring full under `DropOldest`; the oldest record was discarded and the
    /// new one published at the contained sequence.
    DroppedOldest(u64),
    /// Ring full and no progress was possible (retry exhausted, or `Block`
    /// interrupted by shutdown).
    Full,
}

impl PushResult {
    /// Whether the pushed record made it into the ring.
    pub fn is_published(self) -> bool {
        matches!(self, PushResult::Ok(_) | PushResult::DroppedOldest(_))
    }

    pub fn sequence(self) -> Option<u64> {
        match self {
            PushResult::Ok(seq) | PushResult::DroppedOldest(seq) => Some(seq),
            _ => None,
        }
    }
}

/// Ring buffer construction parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RingConfig {
    /// Slot count; must be a power of two.
    pub capacity: usize,
    pub policy: QueueFullPolicy,
    /// Let producers read a consumer-published shadow copy of the tail
    /// instead of the authoritative cursor.
    pub shadow_tail_enabled: bool,
    /// Track per-slot completion so producers can wait for records to be
    /// fully sunk.
    pub wfc_enabled: bool,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_RING_CAPACITY,
            policy: QueueFullPolicy::default(),
            shadow_tail_enabled: true,
            wfc_enabled: false,
        }
    }
}

impl RingConfig {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 || !capacity.is_power_of_two() {
            return Err(PlumeError::capacity("ring capacity must be a nonzero power of 2"));
        }
        Ok(Self {
            capacity,
            ..Default::default()
        })
    }

    pub fn with_policy(mut self, policy: QueueFullPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_shadow_tail(mut self, enabled: bool) -> Self {
        self.shadow_tail_enabled = enabled;
        self
    }

    pub fn with_wfc(mut self, enabled: bool) -> Self {
        self.wfc_enabled = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_rejects_bad_capacity() {
        assert!(RingConfig::new(0).is_err());
        assert!(RingConfig::new(100).is_err());
        assert!(RingConfig::new(128).is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = RingConfig::new(64)
            .unwrap()
            .with_policy(QueueFullPolicy::Block)
            .with_shadow_tail(false)
            .with_wfc(true);
        assert_eq!(config.capacity, 64);
        assert_eq!(config.policy, QueueFullPolicy::Block);
        assert!(!config.shadow_tail_enabled);
        assert!(config.wfc_enabled);
    }

    #[test]
    fn test_policy_wire_roundtrip() {
        for policy in [
            QueueFullPolicy::DropNewest,
            QueueFullPolicy::DropOldest,
            QueueFullPolicy::Block,
        ] {
            assert_eq!(QueueFullPolicy::from_u32(policy as u32), Some(policy));
        }
        assert_eq!(QueueFullPolicy::from_u32(9), None);
    }

    #[test]
    fn test_push_result_accessors() {
        assert!(PushResult::Ok(3).is_published());
        assert!(PushResult::DroppedOldest(4).is_published());
        assert!(!PushResult::DroppedNewest.is_published());
        assert_eq!(PushResult::Ok(3).sequence(), Some(3));
        assert_eq!(PushResult::Full.sequence(), None);
    }
}
