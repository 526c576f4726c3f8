//! Named shared-memory segments.
//!
//! Thin wrapper over `shm_open` + `mmap` with the owner/attacher split the
//! multi-process pipeline needs: exactly one process creates a segment and
//! unlinks it on drop; attachers map the existing object and only unmap.

use std::fs::File;

use memmap2::MmapMut;
use nix::fcntl::OFlag;
use nix::sys::stat::Mode;

use crate::error::{ PlumeError, Result };

#[derive(Debug)]
pub struct SharedSegment {
    map: MmapMut,
    name: String,
    is_owner: bool,
}

impl SharedSegment {
    /// Create (or recreate) a named segment of `len` bytes, zero-filled.
    ///
    /// The returned handle owns the name: dropping it unlinks the object.
    pub fn create(name: &str, len: usize) -> Result<Self> {
        let fd = nix::sys::mman
            ::shm_open(name, OFlag::O_CREAT | OFlag::O_RDWR, Mode::S_IRUSR | Mode::S_IWUSR)
            .map_err(|e| {
                PlumeError::platform("shm_open", std::io::Error::from_raw_os_error(e as i32))
            })?;
        let file = File::from(fd);
        file
            .set_len(len as u64)
            .map_err(|e| PlumeError::platform("ftruncate", e))?;

        let map = unsafe {
            // SAFETY: the mapping is backed by a freshly sized shm object that
            // this handle keeps alive.
            MmapMut::map_mut(&file)
        }.map_err(|e| PlumeError::platform("mmap", e))?;

        Ok(Self {
            map,
            name: name.to_string(),
            is_owner: true,
        })
    }

    /// Map an existing named segment. Dropping the handle only unmaps.
    pub fn attach(name: &str) -> Result<Self> {
        let fd = nix::sys::mman
            ::shm_open(name, OFlag::O_RDWR, Mode::empty())
            .map_err(|e| {
                if e == nix::errno::Errno::ENOENT {
                    PlumeError::NotFound { name: name.to_string() }
                } else {
                    PlumeError::platform("shm_open", std::io::Error::from_raw_os_error(e as i32))
                }
            })?;
        let file = File::from(fd);

        let map = unsafe {
            // SAFETY: the mapping is backed by the shm object held open by
            // `file` for the duration of the call; the segment owner keeps the
            // object alive for attachers.
            MmapMut::map_mut(&file)
        }.map_err(|e| PlumeError::platform("mmap", e))?;

        Ok(Self {
            map,
            name: name.to_string(),
            is_owner: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_owner(&self) -> bool {
        self.is_owner
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.len() == 0
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.map.as_ptr()
    }

    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.map.as_ptr() as *mut u8
    }
}

impl Drop for SharedSegment {
    fn drop(&mut self) {
        if self.is_owner {
            let _ = nix::sys::mman::shm_unlink(self.name.as_str());
        }
    }
}
