//! Direct-indexed thread-name table (Linux).
//!
//! Linux thread ids are small integers bounded by `pid_max`, so the id can be
//! used directly as an array index for O(1) lookup. Each entry is cache-line
//! aligned; the atomic `valid` flag is the publication point between writer
//! and readers.

use std::cell::UnsafeCell;
use std::sync::atomic::{ AtomicBool, AtomicUsize, Ordering };

use crate::constants::{ DIRECT_TABLE_MAX_TID, FIXED_NAME_CAPACITY };
use crate::names::DEFAULT_MODULE_NAME;

#[repr(C, align(64))]
struct Entry {
    name: UnsafeCell<[u8; FIXED_NAME_CAPACITY + 1]>,
    valid: AtomicBool,
}

impl Entry {
    const fn new() -> Self {
        Self {
            name: UnsafeCell::new([0u8; FIXED_NAME_CAPACITY + 1]),
            valid: AtomicBool::new(false),
        }
    }
}

/// Thread-id to module-name map indexed directly by thread id.
pub struct DirectMappingTable {
    entries: Box<[Entry]>,
    count: AtomicUsize,
}

// SAFETY: name bytes are published by the release store on `valid`; racing
// writers to the same id fall under the documented last-writer-wins contract.
unsafe impl Send for DirectMappingTable {}
unsafe impl Sync for DirectMappingTable {}

impl DirectMappingTable {
    pub const MAX_TID: usize = DIRECT_TABLE_MAX_TID;

    pub fn new() -> Self {
        let entries = (0..DIRECT_TABLE_MAX_TID).map(|_| Entry::new()).collect();
        Self {
            entries,
            count: AtomicUsize::new(0),
        }
    }

    /// Register or update the module name for a thread id.
    ///
    /// Name bytes are written before the `valid` publish, so readers never
    /// observe a partially written new entry. Re-registering an id updates in
    /// place without growing the count; the last writer wins.
    pub fn register(&self, tid: u32, name: &str) -> bool {
        if tid as usize >= DIRECT_TABLE_MAX_TID {
            return false;
        }

        let entry = &self.entries[tid as usize];
        copy_name(&entry.name, name);

        let was_valid = entry.valid.swap(true, Ordering::AcqRel);
        if !was_valid {
            self.count.fetch_add(1, Ordering::Relaxed);
        }
        true
    }

    /// O(1) lookup; out-of-range or unregistered ids yield the default name.
    pub fn get(&self, tid: u32) -> &str {
        if tid as usize >= DIRECT_TABLE_MAX_TID {
            return DEFAULT_MODULE_NAME;
        }
        let entry = &self.entries[tid as usize];
        if !entry.valid.load(Ordering::Acquire) {
            return DEFAULT_MODULE_NAME;
        }
        read_name(&entry.name)
    }

    pub fn is_registered(&self, tid: u32) -> bool {
        (tid as usize) < DIRECT_TABLE_MAX_TID
            && self.entries[tid as usize].valid.load(Ordering::Acquire)
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub fn clear(&self) {
        for entry in self.entries.iter() {
            entry.valid.store(false, Ordering::Relaxed);
        }
        self.count.store(0, Ordering::Release);
    }
}

impl Default for DirectMappingTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Write `name` into the entry storage, truncated, remainder zeroed.
///
/// The name bytes are not atomic; the `valid` flag ordering makes the write
/// visible. Concurrent writers to the same id race byte-wise, which the
/// last-writer-wins contract permits.
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_register_and_get() {
        let table = DirectMappingTable::new();
        assert!(table.register(42, "net"));
        assert_eq!(table.get(42), "net");
        assert!(table.is_registered(42));
        assert_eq!(table.count(), 1);
    }

    #[test]
    fn test_unregistered_returns_default() {
        let table = DirectMappingTable::new();
        assert_eq!(table.get(7), DEFAULT_MODULE_NAME);
        assert!(!table.is_registered(7));
    }

    #[test]
    fn test_out_of_range() {
        let table = DirectMappingTable::new();
        assert!(!table.register(DirectMappingTable::MAX_TID as u32, "x"));
        assert_eq!(table.get(u32::MAX), DEFAULT_MODULE_NAME);
    }

    #[test]
    fn test_update_in_place_keeps_count() {
        let table = DirectMappingTable::new();
        table.register(5, "first");
        table.register(5, "second");
        assert_eq!(table.get(5), "second");
        assert_eq!(table.count(), 1);
    }

    #[test]
    fn test_clear() {
        let table = DirectMappingTable::new();
        table.register(1, "a");
        table.register(2, "b");
        table.clear();
        assert_eq!(table.count(), 0);
        assert_eq!(table.get(1), DEFAULT_MODULE_NAME);
    }

    #[test]
    fn test_name_truncation() {
        let table = DirectMappingTable::new();
        table.register(9, "a-very-long-module-name");
        assert_eq!(table.get(9), "a-very-long-mod");
    }

    #[test]
    fn test_concurrent_register_independent_ids() {
        let table = Arc::new(DirectMappingTable::new());
        let mut handles = Vec::new();
        for t in 0..8u32 {
            let table = Arc::clone(&table);
            handles.push(
                thread::spawn(move || {
                    for i in 0..100u32 {
                        let tid = t * 1000 + i;
                        table.register(tid, &format!("mod-{t}"));
                        assert_eq!(table.get(tid), format!("mod-{t}"));
                    }
                })
            );
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(table.count(), 800);
    }
}
