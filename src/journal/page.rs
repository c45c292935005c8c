//! Fixed-size memory-mapped journal pages.
//!
//! Page header, little-endian, 24 bytes: `version`, `page_header_length`,
//! `page_size`, `frame_header_length` (all u32), `last_frame_position`
//! (u64). `last_frame_position` is monotonically non-decreasing and is
//! published with release semantics after the frame it points at.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::data::location::Location;
use crate::error::{Error, ErrorCode, Result};
use crate::journal::frame::{align_frame, Frame, FrameMut};
use crate::os::MmapBuffer;
use crate::types::{Layout, FRAME_HEADER_LENGTH, JOURNAL_VERSION, PAGE_HEADER_LENGTH, PAGE_SIZE};

const OFFSET_VERSION: usize = 0;
const OFFSET_PAGE_HEADER_LENGTH: usize = 4;
const OFFSET_PAGE_SIZE: usize = 8;
const OFFSET_FRAME_HEADER_LENGTH: usize = 12;
const OFFSET_LAST_FRAME_POSITION: usize = 16;

/// One memory-mapped fixed-size journal file.
#[derive(Debug)]
pub struct Page {
    location: Arc<Location>,
    dest_id: u32,
    page_id: u32,
    writing: bool,
    buffer: MmapBuffer,
}

impl Page {
    /// Path of the page file `<dest-hex8>.<page-id>.journal`.
    pub fn get_page_path(location: &Location, dest_id: u32, page_id: u32) -> Result<PathBuf> {
        let dir = location.locator.layout_dir(location, Layout::Journal)?;
        Ok(dir.join(format!("{:08x}.{}.journal", dest_id, page_id)))
    }

    /// Map the page, creating a zero-filled file of `PAGE_SIZE` bytes when
    /// `writing` and absent. A freshly created page gets its header
    /// written; an existing one is validated.
    pub fn load(
        location: &Arc<Location>,
        dest_id: u32,
        page_id: u32,
        writing: bool,
        lazy: bool,
    ) -> Result<Page> {
        let path = Self::get_page_path(location, dest_id, page_id)?;
        match std::fs::metadata(&path) {
            Ok(metadata) => {
                if metadata.len() != PAGE_SIZE as u64 {
                    return Err(Error::with_message(
                        ErrorCode::CorruptJournal,
                        format!(
                            "page {} is {} bytes, expected {}",
                            path.display(),
                            metadata.len(),
                            PAGE_SIZE
                        ),
                    ));
                }
            }
            Err(_) if writing => {}
            Err(err) => {
                return Err(Error::with_message(
                    ErrorCode::PathUnavailable,
                    format!("page {}: {}", path.display(), err),
                ));
            }
        }

        let buffer = MmapBuffer::load(&path, PAGE_SIZE as usize, writing, lazy)?;
        let page = Page {
            location: Arc::clone(location),
            dest_id,
            page_id,
            writing,
            buffer,
        };

        match page.version() {
            0 if writing => page.init_header(),
            // a zeroed page read before its writer initialized it is empty
            0 => {}
            JOURNAL_VERSION => page.validate_header(&path)?,
            version => {
                return Err(Error::with_message(
                    ErrorCode::VersionMismatch,
                    format!("page {} has version {}", path.display(), version),
                ));
            }
        }

        tracing::trace!(
            "loaded page {}/{:08x}.{} writing={}",
            page.location.uname,
            dest_id,
            page_id,
            writing
        );
        Ok(page)
    }

    fn init_header(&self) {
        let base = self.buffer.as_mut_ptr();
        unsafe {
            write_u32(base, OFFSET_VERSION, JOURNAL_VERSION);
            write_u32(base, OFFSET_PAGE_HEADER_LENGTH, PAGE_HEADER_LENGTH);
            write_u32(base, OFFSET_PAGE_SIZE, PAGE_SIZE);
            write_u32(base, OFFSET_FRAME_HEADER_LENGTH, FRAME_HEADER_LENGTH);
        }
        self.last_frame_position_atomic()
            .store((PAGE_HEADER_LENGTH as u64).to_le(), Ordering::Release);
    }

    fn validate_header(&self, path: &std::path::Path) -> Result<()> {
        let last = self.last_frame_position();
        if self.page_header_length() != PAGE_HEADER_LENGTH
            || self.page_size() != PAGE_SIZE
            || self.frame_header_length() != FRAME_HEADER_LENGTH
            || last < PAGE_HEADER_LENGTH as usize
            || last + FRAME_HEADER_LENGTH as usize > PAGE_SIZE as usize
        {
            return Err(Error::with_message(
                ErrorCode::CorruptJournal,
                format!("page {} header out of bounds", path.display()),
            ));
        }
        Ok(())
    }

    fn read_u32_at(&self, offset: usize) -> u32 {
        unsafe {
            u32::from_le_bytes(std::ptr::read_unaligned(
                self.buffer.as_ptr().add(offset) as *const [u8; 4]
            ))
        }
    }

    fn last_frame_position_atomic(&self) -> &AtomicU64 {
        unsafe { &*(self.buffer.as_ptr().add(OFFSET_LAST_FRAME_POSITION) as *const AtomicU64) }
    }

    pub fn location(&self) -> &Arc<Location> {
        &self.location
    }

    pub fn dest_id(&self) -> u32 {
        self.dest_id
    }

    pub fn page_id(&self) -> u32 {
        self.page_id
    }

    fn version(&self) -> u32 {
        self.read_u32_at(OFFSET_VERSION)
    }

    fn is_initialized(&self) -> bool {
        self.version() != 0
    }

    pub fn page_header_length(&self) -> u32 {
        self.read_u32_at(OFFSET_PAGE_HEADER_LENGTH)
    }

    pub fn page_size(&self) -> u32 {
        self.read_u32_at(OFFSET_PAGE_SIZE)
    }

    pub fn frame_header_length(&self) -> u32 {
        self.read_u32_at(OFFSET_FRAME_HEADER_LENGTH)
    }

    /// Offset of the first frame slot.
    pub fn first_frame_position(&self) -> usize {
        PAGE_HEADER_LENGTH as usize
    }

    /// Offset of the most recently committed frame's header.
    pub fn last_frame_position(&self) -> usize {
        u64::from_le(self.last_frame_position_atomic().load(Ordering::Acquire)) as usize
    }

    pub(crate) fn set_last_frame_position(&self, position: usize) {
        self.last_frame_position_atomic()
            .store((position as u64).to_le(), Ordering::Release);
    }

    /// View of the frame slot at `offset`.
    pub(crate) fn frame_at(&self, offset: usize) -> Frame<'_> {
        debug_assert!(offset + FRAME_HEADER_LENGTH as usize <= PAGE_SIZE as usize);
        unsafe { Frame::from_raw(self.buffer.as_ptr().add(offset)) }
    }

    /// Writable view of the frame slot at `offset` with `capacity` payload
    /// bytes reserved.
    pub(crate) fn frame_mut_at(&mut self, offset: usize, capacity: usize) -> FrameMut<'_> {
        debug_assert!(self.writing);
        debug_assert!(offset + FRAME_HEADER_LENGTH as usize + capacity <= PAGE_SIZE as usize);
        unsafe { FrameMut::from_raw(self.buffer.as_mut_ptr().add(offset), capacity) }
    }

    /// gen_time of the first committed frame, or `i64::MAX` while empty.
    pub fn begin_time(&self) -> i64 {
        if !self.is_initialized() {
            return i64::MAX;
        }
        let first = self.frame_at(self.first_frame_position());
        if first.has_data() {
            first.gen_time()
        } else {
            i64::MAX
        }
    }

    /// gen_time of the frame at `last_frame_position`, or `begin_time()`
    /// while empty.
    pub fn end_time(&self) -> i64 {
        if !self.is_initialized() {
            return self.begin_time();
        }
        let last = self.frame_at(self.last_frame_position());
        if last.has_data() {
            last.gen_time()
        } else {
            self.begin_time()
        }
    }

    /// True when `offset + header + payload` stays inside the page.
    pub(crate) fn can_fit(&self, offset: usize, payload: usize) -> bool {
        offset + FRAME_HEADER_LENGTH as usize + payload <= PAGE_SIZE as usize
    }

    /// True when not even a minimal frame fits after the last committed
    /// frame.
    pub fn is_full(&self) -> bool {
        if !self.is_initialized() {
            return false;
        }
        let last = self.last_frame_position();
        let frame = self.frame_at(last);
        let next = if frame.has_data() {
            align_frame(last + frame.frame_length() as usize)
        } else {
            last
        };
        !self.can_fit(next, 1)
    }

    /// Largest existing page id whose `begin_time <= time`, else the
    /// smallest existing id, else 1.
    pub fn find_page_id(location: &Arc<Location>, dest_id: u32, time: i64) -> Result<u32> {
        let page_ids = location.locator.list_page_id(location, dest_id)?;
        let mut result = match page_ids.first() {
            Some(&first) => first,
            None => return Ok(1),
        };
        for &page_id in &page_ids {
            let page = Page::load(location, dest_id, page_id, false, true)?;
            if page.begin_time() <= time {
                result = page_id;
            } else {
                break;
            }
        }
        Ok(result)
    }
}

unsafe fn write_u32(base: *mut u8, offset: usize, value: u32) {
    std::ptr::write_unaligned(base.add(offset) as *mut [u8; 4], value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::locator::Locator;
    use crate::types::{Category, Mode};
    use tempfile::tempdir;

    fn test_location(root: &std::path::Path) -> Arc<Location> {
        let locator = Arc::new(Locator::with_root(root));
        Location::new(Mode::Live, Category::System, "page", "page", locator)
    }

    #[test]
    fn test_load_initializes_header_once() {
        let dir = tempdir().unwrap();
        let location = test_location(dir.path());

        let page = Page::load(&location, 0, 1, true, true).unwrap();
        assert_eq!(page.page_size(), PAGE_SIZE);
        assert_eq!(page.page_header_length(), PAGE_HEADER_LENGTH);
        assert_eq!(page.frame_header_length(), FRAME_HEADER_LENGTH);
        assert_eq!(page.last_frame_position(), PAGE_HEADER_LENGTH as usize);
        assert_eq!(page.begin_time(), i64::MAX);
        assert_eq!(page.end_time(), i64::MAX);
        assert!(!page.is_full());
        drop(page);

        // reload read-only keeps the header
        let page = Page::load(&location, 0, 1, false, true).unwrap();
        assert_eq!(page.last_frame_position(), PAGE_HEADER_LENGTH as usize);
    }

    #[test]
    fn test_load_rejects_wrong_size() {
        let dir = tempdir().unwrap();
        let location = test_location(dir.path());
        let path = Page::get_page_path(&location, 0, 1).unwrap();
        std::fs::write(&path, b"short").unwrap();

        let err = Page::load(&location, 0, 1, true, true).unwrap_err();
        assert_eq!(err.code(), ErrorCode::CorruptJournal);
    }

    #[test]
    fn test_load_rejects_unknown_version() {
        let dir = tempdir().unwrap();
        let location = test_location(dir.path());

        Page::load(&location, 0, 1, true, true).unwrap();
        let path = Page::get_page_path(&location, 0, 1).unwrap();
        let mut file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        use std::io::{Seek, SeekFrom, Write};
        file.seek(SeekFrom::Start(0)).unwrap();
        file.write_all(&99u32.to_le_bytes()).unwrap();
        drop(file);

        let err = Page::load(&location, 0, 1, false, true).unwrap_err();
        assert_eq!(err.code(), ErrorCode::VersionMismatch);
    }

    #[test]
    fn test_missing_page_fails_read_mode_only() {
        let dir = tempdir().unwrap();
        let location = test_location(dir.path());

        let err = Page::load(&location, 0, 7, false, true).unwrap_err();
        assert_eq!(err.code(), ErrorCode::PathUnavailable);
        assert!(Page::load(&location, 0, 7, true, true).is_ok());
    }

    #[test]
    fn test_find_page_id_defaults_to_one() {
        let dir = tempdir().unwrap();
        let location = test_location(dir.path());
        assert_eq!(Page::find_page_id(&location, 0, 0).unwrap(), 1);
    }
}
