//! Windows memory mapping via `windows-sys`.

use std::os::windows::ffi::OsStrExt;
use std::path::Path;

use windows_sys::Win32::Foundation::{
    CloseHandle, GetLastError, GENERIC_READ, GENERIC_WRITE, HANDLE, INVALID_HANDLE_VALUE,
};
use windows_sys::Win32::Storage::FileSystem::{
    CreateFileW, GetFileSizeEx, SetEndOfFile, SetFilePointerEx, FILE_ATTRIBUTE_NORMAL, FILE_BEGIN,
    FILE_SHARE_READ, FILE_SHARE_WRITE, OPEN_ALWAYS, OPEN_EXISTING,
};
use windows_sys::Win32::System::Memory::{
    CreateFileMappingW, MapViewOfFile, UnmapViewOfFile, FILE_MAP_READ, FILE_MAP_WRITE,
    MEMORY_MAPPED_VIEW_ADDRESS, PAGE_READONLY, PAGE_READWRITE,
};

use crate::error::{Error, ErrorCode, Result};

fn error_from_last() -> Error {
    Error::with_message(
        ErrorCode::PathUnavailable,
        format!("win32 error {}", unsafe { GetLastError() }),
    )
}

fn wide_path(path: &Path) -> Vec<u16> {
    path.as_os_str()
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}

/// Owning handle for one shared file mapping.
#[derive(Debug)]
pub struct MmapBuffer {
    addr: *mut u8,
    size: usize,
    file: HANDLE,
    mapping: HANDLE,
}

// The mapping is plain memory owned by this handle; journal streams hand
// pages across threads but never share one handle concurrently.
unsafe impl Send for MmapBuffer {}

impl MmapBuffer {
    /// Map `size` bytes of `path` shared.
    ///
    /// When `is_writing`, the file is created if absent and sized exactly
    /// once while empty. `lazy` has no effect here; views always demand-page.
    pub fn load(path: &Path, size: usize, is_writing: bool, _lazy: bool) -> Result<MmapBuffer> {
        let wide = wide_path(path);

        let (access, disposition) = if is_writing {
            (GENERIC_READ | GENERIC_WRITE, OPEN_ALWAYS)
        } else {
            (GENERIC_READ, OPEN_EXISTING)
        };

        let file = unsafe {
            CreateFileW(
                wide.as_ptr(),
                access,
                FILE_SHARE_READ | FILE_SHARE_WRITE,
                std::ptr::null(),
                disposition,
                FILE_ATTRIBUTE_NORMAL,
                0,
            )
        };
        if file == INVALID_HANDLE_VALUE {
            return Err(error_from_last());
        }

        if is_writing {
            let mut file_size: i64 = 0;
            if unsafe { GetFileSizeEx(file, &mut file_size) } == 0 {
                let err = error_from_last();
                unsafe { CloseHandle(file) };
                return Err(err);
            }
            if file_size == 0 {
                let ok = unsafe {
                    SetFilePointerEx(file, size as i64, std::ptr::null_mut(), FILE_BEGIN) != 0
                        && SetEndOfFile(file) != 0
                };
                if !ok {
                    let err = error_from_last();
                    unsafe { CloseHandle(file) };
                    return Err(err);
                }
            }
        }

        let protect = if is_writing {
            PAGE_READWRITE
        } else {
            PAGE_READONLY
        };
        let mapping = unsafe {
            CreateFileMappingW(
                file,
                std::ptr::null(),
                protect,
                (size as u64 >> 32) as u32,
                size as u32,
                std::ptr::null(),
            )
        };
        if mapping == 0 {
            let err = error_from_last();
            unsafe { CloseHandle(file) };
            return Err(err);
        }

        let desired = if is_writing {
            FILE_MAP_READ | FILE_MAP_WRITE
        } else {
            FILE_MAP_READ
        };
        let view = unsafe { MapViewOfFile(mapping, desired, 0, 0, size) };
        if view.Value.is_null() {
            let err = error_from_last();
            unsafe {
                CloseHandle(mapping);
                CloseHandle(file);
            }
            return Err(err);
        }

        Ok(MmapBuffer {
            addr: view.Value as *mut u8,
            size,
            file,
            mapping,
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
            UnmapViewOfFile(MEMORY_MAPPED_VIEW_ADDRESS {
                Value: self.addr as *mut core::ffi::c_void,
            });
            CloseHandle(self.mapping);
            CloseHandle(self.file);
        }
    }
}
