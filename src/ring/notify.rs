//! Cross-platform "data available" wakeup primitive.
//!
//! Three operations: `signal`, `wait`, `close`. On Linux the backing object
//! is an `eventfd` in semaphore mode, which also crosses process boundaries
//! when the descriptor is inherited (fork-style multi-process deployments).
//! Elsewhere a mutex + condvar pair is used.
//!
//! Lost wakeups are tolerated by design: the slot state machine is the
//! source of truth and every waiter re-checks it after waking, so `wait` only
//! bounds how long a consumer naps when the ring looks empty.

use std::sync::atomic::{ AtomicBool, AtomicU32, Ordering };
use std::time::Duration;

use crate::error::{ PlumeError, Result };

#[derive(Debug)]
enum Backend {
    /// Linux eventfd; `owned` distinguishes creator (closes on drop) from an
    /// attacher that borrowed the descriptor number across a fork.
    #[cfg(target_os = "linux")]
    EventFd {
        fd: libc::c_int,
        owned: bool,
    },
    /// Portable fallback.
    #[cfg(not(target_os = "linux"))]
    Condvar {
        mutex: parking_lot::Mutex<bool>,
        condvar: parking_lot::Condvar,
    },
    /// Wakeups unavailable; `wait` degrades to a bounded sleep.
    Disabled,
}

#[derive(Debug)]
pub struct Notifier {
    backend: Backend,
    waiters: AtomicU32,
    closed: AtomicBool,
}

impl Notifier {
    /// Create a process-local notifier using the platform's best mechanism.
    pub fn new() -> Result<Self> {
        Ok(Self {
            backend: Self::platform_backend()?,
            waiters: AtomicU32::new(0),
            closed: AtomicBool::new(false),
        })
    }

    #[cfg(target_os = "linux")]
    fn platform_backend() -> Result<Backend> {
        // SAFETY: eventfd has no preconditions; the fd is checked below.
        let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_SEMAPHORE) };
        if fd < 0 {
            return Err(PlumeError::platform("eventfd", std::io::Error::last_os_error()));
        }
        Ok(Backend::EventFd { fd, owned: true })
    }

    #[cfg(not(target_os = "linux"))]
    fn platform_backend() -> Result<Backend> {
        Ok(Backend::Condvar {
            mutex: parking_lot::Mutex::new(false),
            condvar: parking_lot::Condvar::new(),
        })
    }

    /// Wrap a descriptor recorded in a shared-memory header.
    ///
    /// Valid when this process inherited the descriptor (fork); if the number
    /// does not name a live descriptor here, wakeups are disabled and waits
    /// fall back to bounded sleeps.
    #[cfg(target_os = "linux")]
    pub fn from_shared_fd(fd: i32) -> Self {
        // SAFETY: fcntl F_GETFD only queries the descriptor table.
        let alive = fd >= 0 && unsafe { libc::fcntl(fd, libc::F_GETFD) } >= 0;
        let backend = if alive {
            Backend::EventFd { fd, owned: false }
        } else {
            Backend::Disabled
        };
        Self {
            backend,
            waiters: AtomicU32::new(0),
            closed: AtomicBool::new(false),
        }
    }

    #[cfg(not(target_os = "linux"))]
    pub fn from_shared_fd(_fd: i32) -> Self {
        Self {
            backend: Backend::Disabled,
            waiters: AtomicU32::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Raw handle recorded in shared-memory headers (-1 when not applicable).
    pub fn shared_handle(&self) -> i32 {
        match &self.backend {
            #[cfg(target_os = "linux")]
            Backend::EventFd { fd, .. } => *fd,
            _ => -1,
        }
    }

    /// Wake at least one waiter. Cheap when nobody is waiting.
    pub fn signal(&self) {
        if self.waiters.load(Ordering::Acquire) == 0 {
            return;
        }
        self.signal_now();
    }

    /// Wake waiters unconditionally (used during shutdown).
    pub fn signal_now(&self) {
        match &self.backend {
            #[cfg(target_os = "linux")]
            Backend::EventFd { fd, .. } => {
                let one: u64 = 1;
                // SAFETY: fd is a live eventfd; writes of 8 bytes are the
                // defined protocol.
                unsafe {
                    libc::write(*fd, (&one as *const u64).cast(), 8);
                }
            }
            #[cfg(not(target_os = "linux"))]
            Backend::Condvar { mutex, condvar } => {
                let mut signaled = mutex.lock();
                *signaled = true;
                condvar.notify_all();
            }
            Backend::Disabled => {}
        }
    }

    /// Block until signaled or `timeout` elapses. Returns `true` when a
    /// signal was consumed.
    pub fn wait(&self, timeout: Duration) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        self.waiters.fetch_add(1, Ordering::AcqRel);
        let woken = self.wait_inner(timeout);
        self.waiters.fetch_sub(1, Ordering::AcqRel);
        woken
    }

    fn wait_inner(&self, timeout: Duration) -> bool {
        match &self.backend {
            #[cfg(target_os = "linux")]
            Backend::EventFd { fd, .. } => {
                let mut pollfd = libc::pollfd {
                    fd: *fd,
                    events: libc::POLLIN,
                    revents: 0,
                };
                let millis = timeout.as_millis().min(i32::MAX as u128) as i32;
                // SAFETY: pollfd points at a valid struct for the call.
                let ready = unsafe { libc::poll(&mut pollfd, 1, millis.max(1)) };
                if ready > 0 && pollfd.revents & libc::POLLIN != 0 {
                    let mut value: u64 = 0;
                    // SAFETY: reading 8 bytes from a readable eventfd.
                    unsafe {
                        libc::read(*fd, (&mut value as *mut u64).cast(), 8);
                    }
                    true
                } else {
                    false
                }
            }
            #[cfg(not(target_os = "linux"))]
            Backend::Condvar { mutex, condvar } => {
                let mut signaled = mutex.lock();
                if !*signaled {
                    condvar.wait_for(&mut signaled, timeout);
                }
                let woken = *signaled;
                *signaled = false;
                woken
            }
            Backend::Disabled => {
                std::thread::sleep(timeout.min(Duration::from_millis(1)));
                false
            }
        }
    }

    /// Mark closed and release every waiter.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.signal_now();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        #[cfg(target_os = "linux")]
        if let Backend::EventFd { fd, owned: true } = self.backend {
            // SAFETY: we created this descriptor and nothing else closes it.
            unsafe {
                libc::close(fd);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_wait_times_out_without_signal() {
        let notifier = Notifier::new().unwrap();
        let start = Instant::now();
        assert!(!notifier.wait(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn test_signal_wakes_waiter() {
        let notifier = Arc::new(Notifier::new().unwrap());
        let waiter = {
            let notifier = Arc::clone(&notifier);
            thread::spawn(move || notifier.wait(Duration::from_secs(5)))
        };

        // Give the waiter time to register, then wake it.
        thread::sleep(Duration::from_millis(20));
        notifier.signal();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_signal_without_waiters_is_noop() {
        let notifier = Notifier::new().unwrap();
        notifier.signal();
        // A later wait must not consume a stale token.
        assert!(!notifier.wait(Duration::from_millis(10)));
    }

    #[test]
    fn test_close_releases_waiters() {
        let notifier = Arc::new(Notifier::new().unwrap());
        let waiter = {
            let notifier = Arc::clone(&notifier);
            thread::spawn(move || {
                notifier.wait(Duration::from_secs(5));
            })
        };
        thread::sleep(Duration::from_millis(20));
        notifier.close();
        waiter.join().unwrap();
        assert!(notifier.is_closed());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_shared_fd_roundtrip() {
        let owner = Notifier::new().unwrap();
        let fd = owner.shared_handle();
        assert!(fd >= 0);

        let attached = Notifier::from_shared_fd(fd);
        let waiter = thread::spawn(move || attached.wait(Duration::from_secs(5)));
        thread::sleep(Duration::from_millis(20));
        owner.signal_now();
        assert!(waiter.join().unwrap());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_bad_shared_fd_degrades() {
        let notifier = Notifier::from_shared_fd(-1);
        assert!(!notifier.wait(Duration::from_millis(5)));
    }
}
