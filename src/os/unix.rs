//! Unix memory mapping via `libc`.

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use crate::error::{Error, ErrorCode, Result};

fn error_from_errno() -> Error {
    Error::with_message(
        ErrorCode::PathUnavailable,
        std::io::Error::last_os_error().to_string(),
    )
}

/// Owning handle for one shared file mapping.
#[derive(Debug)]
pub struct MmapBuffer {
    addr: *mut u8,
    size: usize,
    locked: bool,
}

// The mapping is plain memory owned by this handle; journal streams hand
// pages across threads but never share one handle concurrently.
unsafe impl Send for MmapBuffer {}

impl MmapBuffer {
    /// Map `size` bytes of `path` shared.
    ///
    /// When `is_writing`, the file is created if absent and sized exactly
    /// once while empty. When `lazy` is false the region is locked into
    /// memory best-effort.
    pub fn load(path: &Path, size: usize, is_writing: bool, lazy: bool) -> Result<MmapBuffer> {
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| Error::new(ErrorCode::PathUnavailable))?;

        let oflags = if is_writing {
            libc::O_RDWR | libc::O_CREAT
        } else {
            libc::O_RDONLY
        };
        let fd = unsafe { libc::open(c_path.as_ptr(), oflags, 0o644) };
        if fd < 0 {
            return Err(error_from_errno());
        }

        if is_writing {
            let mut stat: libc::stat = unsafe { std::mem::zeroed() };
            if unsafe { libc::fstat(fd, &mut stat) } != 0 {
                let err = error_from_errno();
                unsafe { libc::close(fd) };
                return Err(err);
            }
            if stat.st_size == 0 && unsafe { libc::ftruncate(fd, size as libc::off_t) } != 0 {
                let err = error_from_errno();
                unsafe { libc::close(fd) };
                return Err(err);
            }
        }

        let prot = if is_writing {
            libc::PROT_READ | libc::PROT_WRITE
        } else {
            libc::PROT_READ
        };
        let addr = unsafe { libc::mmap(std::ptr::null_mut(), size, prot, libc::MAP_SHARED, fd, 0) };
        let map_err = if addr == libc::MAP_FAILED {
            Some(error_from_errno())
        } else {
            None
        };
        // the descriptor is not needed once the mapping exists
        unsafe { libc::close(fd) };
        if let Some(err) = map_err {
            return Err(err);
        }

        let mut locked = false;
        if !lazy {
            locked = unsafe { libc::mlock(addr, size) } == 0;
            if !locked {
                tracing::warn!("mlock of {} failed, page stays demand-paged", path.display());
            }
        }

        Ok(MmapBuffer {
            addr: addr as *mut u8,
            size,
            locked,
        })
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.addr
    }

    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.addr
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

impl Drop for MmapBuffer {
    fn drop(&mut self) {
        unsafe {
            if self.locked {
                libc::munlock(self.addr as *const libc::c_void, self.size);
            }
            libc::munmap(self.addr as *mut libc::c_void, self.size);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_creates_and_sizes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buffer.bin");

        let buffer = MmapBuffer::load(&path, 64 * 1024, true, true).unwrap();
        assert_eq!(buffer.len(), 64 * 1024);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 64 * 1024);
        drop(buffer);
    }

    #[test]
    fn test_writes_are_visible_to_a_second_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buffer.bin");

        let writer = MmapBuffer::load(&path, 4096, true, true).unwrap();
        let reader = MmapBuffer::load(&path, 4096, false, true).unwrap();

        unsafe {
            std::ptr::write(writer.as_mut_ptr().add(100), 0xa5u8);
            assert_eq!(std::ptr::read(reader.as_ptr().add(100)), 0xa5u8);
        }
    }

    #[test]
    fn test_read_mapping_of_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.bin");
        assert!(MmapBuffer::load(&path, 4096, false, true).is_err());
    }
}
