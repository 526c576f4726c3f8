//! Process and thread name storage
//!
//! Fixed-capacity name values ([`FixedName`]) and the thread-id to
//! module-name lookup tables behind them. Two table layouts exist: a
//! direct-indexed array for Linux, where thread ids are small and bounded by
//! `pid_max`, and a bounded linear-probe array for platforms with large
//! opaque thread ids. [`ThreadModuleTable`] aliases the variant for the
//! current target.

pub mod array;
pub mod direct;
pub mod fixed_name;

pub use array::ArrayMappingTable;
pub use direct::DirectMappingTable;
pub use fixed_name::FixedName;

/// Name returned when a thread id has no registered module.
pub const DEFAULT_MODULE_NAME: &str = "main";

/// Platform-selected thread-module lookup table.
#[cfg(target_os = "linux")]
pub type ThreadModuleTable = DirectMappingTable;

/// Platform-selected thread-module lookup table.
#[cfg(not(target_os = "linux"))]
pub type ThreadModuleTable = ArrayMappingTable;

/// Current thread id as used for table keys and log entries.
#[cfg(target_os = "linux")]
pub fn current_thread_id() -> u32 {
    // SAFETY: gettid has no preconditions.
    (unsafe { libc::syscall(libc::SYS_gettid) }) as u32
}

/// Current thread id as used for table keys and log entries.
#[cfg(not(target_os = "linux"))]
pub fn current_thread_id() -> u32 {
    use std::sync::atomic::{ AtomicU32, Ordering };
    static NEXT: AtomicU32 = AtomicU32::new(1);
    thread_local! {
        static TID: u32 = NEXT.fetch_add(1, Ordering::Relaxed);
    }
    TID.with(|t| *t)
}

/// Current process id.
pub fn current_process_id() -> u32 {
    nix::unistd::getpid().as_raw() as u32
}
