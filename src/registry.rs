//! Shared-memory process and thread name registry.
//!
//! A bounded table mapping producer ids to human-readable names, readable by
//! the consumer process when it formats records that crossed the shared ring.
//! Lives in its own segment (`<ring-name>.names`) owned by the same creator
//! as the ring. Writers update entries in place (last writer wins) and bump a
//! generation counter readers can use to invalidate caches; readers never
//! block.

use std::cell::UnsafeCell;
use std::sync::atomic::{ AtomicU32, AtomicU64, Ordering };

use static_assertions::const_assert_eq;

use crate::constants::{ CACHE_LINE_SIZE, FIXED_NAME_CAPACITY };
use crate::error::{ PlumeError, Result };
use crate::names::DEFAULT_MODULE_NAME;
use crate::ring::shm::SharedSegment;

/// Magic identifying a plume name-registry segment ("ONE_NAME")
const REGISTRY_MAGIC: u64 = 0x4F4E455F4E414D45;
const REGISTRY_VERSION: u32 = 1;

/// Slot states for the claim protocol.
const SLOT_FREE: u32 = 0;
const SLOT_BUILDING: u32 = 1;
const SLOT_VALID: u32 = 2;

#[repr(C, align(64))]
struct NameSlot {
    id: AtomicU32,
    state: AtomicU32,
    name: UnsafeCell<[u8; FIXED_NAME_CAPACITY + 1]>,
}

const_assert_eq!(std::mem::size_of::<NameSlot>(), CACHE_LINE_SIZE);

#[repr(C)]
struct RegistryHeader {
    magic: u64,
    version: u32,
    process_capacity: u32,
    thread_capacity: u32,
    _pad0: [u8; 44],
    generation: AtomicU64,
    _pad1: [u8; 56],
}

const_assert_eq!(std::mem::size_of::<RegistryHeader>(), 2 * CACHE_LINE_SIZE);

const HEADER_SIZE: usize = std::mem::size_of::<RegistryHeader>();

enum TableKind {
    Process,
    Thread,
}

#[derive(Debug)]
pub struct NameRegistry {
    segment: SharedSegment,
    process_capacity: usize,
    thread_capacity: usize,
}

// SAFETY: every shared mutation goes through the slot state protocol below;
// name bytes are published by the release store on the slot state.
unsafe impl Send for NameRegistry {}
unsafe impl Sync for NameRegistry {}

impl NameRegistry {
    /// Segment name derived from a ring segment name.
    pub fn segment_name(ring_name: &str) -> String {
        format!("{ring_name}.names")
    }

    fn required_size(capacity: usize) -> usize {
        HEADER_SIZE + 2 * capacity * std::mem::size_of::<NameSlot>()
    }

    /// Create the registry segment with `capacity` entries in each of the
    /// process and thread tables.
    pub fn create(name: &str, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(PlumeError::capacity("name registry capacity must be positive"));
        }
        let segment = SharedSegment::create(name, Self::required_size(capacity))?;

        let header = unsafe { &mut *(segment.as_mut_ptr() as *mut RegistryHeader) };
        header.version = REGISTRY_VERSION;
        header.process_capacity = capacity as u32;
        header.thread_capacity = capacity as u32;
        header.generation = AtomicU64::new(0);
        std::sync::atomic::fence(Ordering::Release);
        header.magic = REGISTRY_MAGIC;

        Ok(Self {
            segment,
            process_capacity: capacity,
            thread_capacity: capacity,
        })
    }

    /// Attach to an existing registry segment.
    pub fn attach(name: &str) -> Result<Self> {
        let segment = SharedSegment::attach(name)?;
        if segment.len() < HEADER_SIZE {
            return Err(PlumeError::capacity("registry segment smaller than its header"));
        }
        let header = unsafe { &*(segment.as_ptr() as *const RegistryHeader) };
        if header.magic != REGISTRY_MAGIC {
            return Err(PlumeError::InvalidFormat);
        }
        if header.version != REGISTRY_VERSION {
            return Err(PlumeError::VersionMismatch {
                expected: REGISTRY_VERSION,
                found: header.version,
            });
        }
        let process_capacity = header.process_capacity as usize;
        let thread_capacity = header.thread_capacity as usize;
        if segment.len() < HEADER_SIZE + (process_capacity + thread_capacity) * std::mem::size_of::<NameSlot>() {
            return Err(PlumeError::capacity("registry segment smaller than its declared tables"));
        }
        Ok(Self {
            segment,
            process_capacity,
            thread_capacity,
        })
    }

    pub fn is_owner(&self) -> bool {
        self.segment.is_owner()
    }

    fn header(&self) -> &RegistryHeader {
        unsafe { &*(self.segment.as_ptr() as *const RegistryHeader) }
    }

    fn table(&self, kind: TableKind) -> &[NameSlot] {
        let (offset, len) = match kind {
            TableKind::Process => (HEADER_SIZE, self.process_capacity),
            TableKind::Thread =>
                (
                    HEADER_SIZE + self.process_capacity * std::mem::size_of::<NameSlot>(),
                    self.thread_capacity,
                ),
        };
        // SAFETY: the segment was sized for both tables at creation and
        // validated on attach.
        unsafe {
            std::slice::from_raw_parts(self.segment.as_ptr().add(offset) as *const NameSlot, len)
        }
    }

    /// Generation counter; bumped after every successful update.
    pub fn generation(&self) -> u64 {
        self.header().generation.load(Ordering::Acquire)
    }

    pub fn set_process_name(&self, pid: u32, name: &str) -> bool {
        self.register(TableKind::Process, pid, name)
    }

    pub fn set_thread_module(&self, tid: u32, name: &str) -> bool {
        self.register(TableKind::Thread, tid, name)
    }

    /// Process name for `pid`; misses yield the decimal pid.
    pub fn process_name(&self, pid: u32) -> String {
        self.lookup(TableKind::Process, pid).unwrap_or_else(|| pid.to_string())
    }

    /// Thread module for `tid`; misses yield the default module name.
    pub fn thread_module(&self, tid: u32) -> String {
        self.lookup(TableKind::Thread, tid).unwrap_or_else(|| DEFAULT_MODULE_NAME.to_string())
    }

    fn register(&self, kind: TableKind, id: u32, name: &str) -> bool {
        let slots = self.table(kind);

        // Update in place when the id is already present.
        for slot in slots {
            if
                slot.state.load(Ordering::Acquire) == SLOT_VALID &&
                slot.id.load(Ordering::Acquire) == id
            {
                write_name(slot, name);
                self.bump_generation();
                return true;
            }
        }

        // Claim a free slot.
        for slot in slots {
            if
                slot.state
                    .compare_exchange(
                        SLOT_FREE,
                        SLOT_BUILDING,
                        Ordering::AcqRel,
                        Ordering::Relaxed
                    )
                    .is_ok()
            {
                slot.id.store(id, Ordering::Relaxed);
                write_name(slot, name);
                slot.state.store(SLOT_VALID, Ordering::Release);
                self.bump_generation();
                return true;
            }
        }

        false
    }

    fn lookup(&self, kind: TableKind, id: u32) -> Option<String> {
        let slots = self.table(kind);
        for slot in slots {
            if
                slot.state.load(Ordering::Acquire) == SLOT_VALID &&
                slot.id.load(Ordering::Acquire) == id
            {
                return Some(read_name(slot));
            }
        }
        None
    }

    fn bump_generation(&self) {
        self.header().generation.fetch_add(1, Ordering::AcqRel);
    }
}

fn write_name(slot: &NameSlot, name: &str) {
    let len = name.len().min(FIXED_NAME_CAPACITY);
    let dest = slot.name.get() as *mut u8;
    // SAFETY: dest points at FIXED_NAME_CAPACITY + 1 writable bytes inside the
    // mapped slot; concurrent writers race byte-wise under the documented
    // last-writer-wins contract.
    unsafe {
        std::ptr::copy_nonoverlapping(name.as_ptr(), dest, len);
        std::ptr::write_bytes(dest.add(len), 0, FIXED_NAME_CAPACITY + 1 - len);
    }
}

fn read_name(slot: &NameSlot) -> String {
    // SAFETY: readers only reach this after an acquire load of the slot state.
    let raw = unsafe { &*slot.name.get() };
    let len = raw
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(FIXED_NAME_CAPACITY);
    String::from_utf8_lossy(&raw[..len]).into_owned()
}
