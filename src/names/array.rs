//! Linear-probe thread-name table (portable).
//!
//! macOS and Windows thread ids are large opaque values, so direct indexing
//! is impractical. This variant keeps a bounded array of cache-line aligned
//! entries, claims slots by CAS on the count, and scans linearly on lookup.

use std::cell::UnsafeCell;
use std::sync::atomic::{ AtomicBool, AtomicU32, AtomicUsize, Ordering };

use crate::constants::{ ARRAY_TABLE_CAPACITY, FIXED_NAME_CAPACITY };
use crate::names::DEFAULT_MODULE_NAME;

#[repr(C, align(64))]
struct Entry {
    tid: AtomicU32,
    valid: AtomicBool,
    name: UnsafeCell<[u8; FIXED_NAME_CAPACITY + 1]>,
}

impl Entry {
    const fn new() -> Self {
        Self {
            tid: AtomicU32::new(0),
            valid: AtomicBool::new(false),
            name: UnsafeCell::new([0u8; FIXED_NAME_CAPACITY + 1]),
        }
    }
}

/// Thread-id to module-name map with O(n) linear-scan lookup and constant
/// memory.
pub struct ArrayMappingTable {
    entries: Box<[Entry]>,
    count: AtomicUsize,
}

// SAFETY: name bytes are published by the release store on `valid`; racing
// writers to the same id fall under the documented last-writer-wins contract.
unsafe impl Send for ArrayMappingTable {}
unsafe impl Sync for ArrayMappingTable {}

impl ArrayMappingTable {
    pub const CAPACITY: usize = ARRAY_TABLE_CAPACITY;

    pub fn new() -> Self {
        let entries = (0..ARRAY_TABLE_CAPACITY).map(|_| Entry::new()).collect();
        Self {
            entries,
            count: AtomicUsize::new(0),
        }
    }

    /// Register or update the module name for a thread id.
    ///
    /// An existing id is updated in place. A new id claims the next slot by
    /// CAS on the count; fails only when the table is full.
    pub fn register(&self, tid: u32, name: &str) -> bool {
        // Update in place if the id is already present.
        let count = self.count.load(Ordering::Acquire);
        for entry in self.entries.iter().take(count) {
            if entry.valid.load(Ordering::Acquire) && entry.tid.load(Ordering::Acquire) == tid {
                copy_name(&entry.name, name);
                return true;
            }
        }

        // Claim a fresh slot.
        let mut current = self.count.load(Ordering::Acquire);
        while current < ARRAY_TABLE_CAPACITY {
            match
                self.count.compare_exchange_weak(
                    current,
                    current + 1,
                    Ordering::AcqRel,
                    Ordering::Acquire
                )
            {
                Ok(_) => {
                    let entry = &self.entries[current];
                    entry.tid.store(tid, Ordering::Relaxed);
                    copy_name(&entry.name, name);
                    entry.valid.store(true, Ordering::Release);
                    return true;
                }
                Err(updated) => {
                    current = updated;
                }
            }
        }

        false
    }

    /// Linear-scan lookup; misses yield the default name.
    pub fn get(&self, tid: u32) -> &str {
        let count = self.count.load(Ordering::Acquire);
        for entry in self.entries.iter().take(count) {
            if entry.valid.load(Ordering::Acquire) && entry.tid.load(Ordering::Acquire) == tid {
                return read_name(&entry.name);
            }
        }
        DEFAULT_MODULE_NAME
    }

    pub fn is_registered(&self, tid: u32) -> bool {
        let count = self.count.load(Ordering::Acquire);
        self.entries
            .iter()
            .take(count)
            .any(|e| e.valid.load(Ordering::Acquire) && e.tid.load(Ordering::Acquire) == tid)
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub fn is_full(&self) -> bool {
        self.count() >= ARRAY_TABLE_CAPACITY
    }

    /// Zero the logical size first so lookups stop finding entries, then
    /// invalidate them.
    pub fn clear(&self) {
        let old_count = self.count.swap(0, Ordering::AcqRel);
        for entry in self.entries.iter().take(old_count) {
            entry.valid.store(false, Ordering::Relaxed);
        }
    }
}

impl Default for ArrayMappingTable {
    fn default() -> Self {
        Self::new()
    }
}

fn copy_name(dest: &UnsafeCell<[u8; FIXED_NAME_CAPACITY + 1]>, name: &str) {
    let len = name.len().min(FIXED_NAME_CAPACITY);
    let dest = dest.get() as *mut u8;
    unsafe {
        // SAFETY: dest points at FIXED_NAME_CAPACITY + 1 writable bytes inside
        // an entry this table owns.
        std::ptr::copy_nonoverlapping(name.as_ptr(), dest, len);
        std::ptr::write_bytes(dest.add(len), 0, FIXED_NAME_CAPACITY + 1 - len);
    }
}

fn read_name(cell: &UnsafeCell<[u8; FIXED_NAME_CAPACITY + 1]>) -> &str {
    // SAFETY: readers only reach this after an acquire load of `valid`.
    let raw = unsafe { &*cell.get() };
    let len = raw.iter().position(|&b| b == 0).unwrap_or(FIXED_NAME_CAPACITY);
    std::str::from_utf8(&raw[..len]).unwrap_or(DEFAULT_MODULE_NAME)
}
