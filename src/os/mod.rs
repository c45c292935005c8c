//! OS abstraction layer: memory-mapped file buffers.
//!
//! `MmapBuffer` owns one shared mapping of a journal page file. The unix
//! implementation goes through `libc`, the windows one through
//! `windows-sys`; both expose the same surface:
//!
//! - `MmapBuffer::load(path, size, is_writing, lazy)` opens (and, when
//!   writing, creates and sizes) the file and maps it shared;
//! - `as_ptr` / `as_mut_ptr` / `len` expose the mapped region;
//! - dropping the buffer unmaps it and lets the OS flush dirty pages.

#[cfg(unix)]
mod unix;

#[cfg(windows)]
mod windows;

#[cfg(unix)]
pub use unix::MmapBuffer;

#[cfg(windows)]
pub use windows::MmapBuffer;
