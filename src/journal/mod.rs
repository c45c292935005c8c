//! Journal engine: pages, frames, single-stream cursors, writers, readers
//! and the time-ordered assembler.

pub mod assemble;
pub mod frame;
pub mod page;
pub mod reader;
pub mod writer;

pub use assemble::{AssembleMode, Assembler, CopySink, Sink};
pub use frame::{Frame, FrameMut};
pub use page::Page;
pub use reader::Reader;
pub use writer::Writer;

use std::sync::Arc;

use crate::data::location::Location;
use crate::error::{Error, ErrorCode, Result};
use crate::types::MSG_PAGE_END;
use frame::align_frame;

/// Monotonically advancing cursor over the frames of one
/// `(location, dest_id)` stream.
///
/// A journal in write mode creates pages as it goes; read-mode journals
/// only observe what exists and re-probe the filesystem while a stream has
/// no pages yet.
#[derive(Debug)]
pub struct Journal {
    location: Arc<Location>,
    dest_id: u32,
    writing: bool,
    lazy: bool,
    page: Option<Page>,
    /// Byte offset of the cursor frame within the current page
    frame_position: usize,
    /// Join time, re-applied once a late stream shows up on disk
    seek_time: i64,
}

enum Step {
    Data,
    NoData,
    Roll,
    Corrupt(String),
}

impl Journal {
    pub(crate) fn new(location: Arc<Location>, dest_id: u32, writing: bool, lazy: bool) -> Journal {
        Journal {
            location,
            dest_id,
            writing,
            lazy,
            page: None,
            frame_position: 0,
            seek_time: 0,
        }
    }

    pub fn location(&self) -> &Arc<Location> {
        &self.location
    }

    pub fn dest_id(&self) -> u32 {
        self.dest_id
    }

    pub fn current_page(&self) -> Option<&Page> {
        self.page.as_ref()
    }

    pub(crate) fn page_mut(&mut self) -> Option<&mut Page> {
        self.page.as_mut()
    }

    pub(crate) fn frame_position(&self) -> usize {
        self.frame_position
    }

    pub(crate) fn advance_to(&mut self, position: usize) {
        self.frame_position = position;
    }

    /// Frame at the cursor. Only meaningful while `data_available()`.
    pub fn current_frame(&self) -> Frame<'_> {
        let page = self.page.as_ref().expect("journal has no page loaded");
        page.frame_at(self.frame_position)
    }

    pub(crate) fn load_page(&mut self, page_id: u32) -> Result<()> {
        let page = Page::load(&self.location, self.dest_id, page_id, self.writing, self.lazy)?;
        self.frame_position = page.first_frame_position();
        self.page = Some(page);
        Ok(())
    }

    /// True when a committed frame sits at the cursor. Rolls across page
    /// boundaries transparently; an in-progress frame is "no data yet",
    /// never an error.
    pub fn data_available(&mut self) -> Result<bool> {
        loop {
            if self.page.is_none() {
                let page_ids = self
                    .location
                    .locator
                    .list_page_id(&self.location, self.dest_id)?;
                if page_ids.is_empty() {
                    return Ok(false);
                }
                let time = self.seek_time;
                self.seek_to_time(time)?;
                if self.page.is_none() {
                    return Ok(false);
                }
                continue;
            }
            let step = self.step_at_cursor();
            match step {
                Step::Data => return Ok(true),
                Step::NoData => return Ok(false),
                Step::Corrupt(message) => {
                    return Err(Error::with_message(ErrorCode::CorruptJournal, message));
                }
                Step::Roll => {
                    if !self.roll_forward()? {
                        return Ok(false);
                    }
                }
            }
        }
    }

    fn step_at_cursor(&self) -> Step {
        let page = match self.page.as_ref() {
            Some(page) => page,
            None => return Step::NoData,
        };
        let position = self.frame_position;
        if !page.can_fit(position, 0) {
            // not even a header fits here; the writer moved on markerless
            return Step::Roll;
        }
        let frame = page.frame_at(position);
        if !frame.has_data() {
            return Step::NoData;
        }
        if frame.msg_type() == MSG_PAGE_END {
            return Step::Roll;
        }
        if frame.header_length() != page.frame_header_length() {
            return Step::Corrupt(format!(
                "frame at {} of page {} carries header length {}, page says {}",
                position,
                page.page_id(),
                frame.header_length(),
                page.frame_header_length()
            ));
        }
        Step::Data
    }

    /// Advance past the current frame, crossing pages at page-end.
    pub fn next(&mut self) -> Result<()> {
        let advance = match self.step_at_cursor() {
            Step::Data => {
                let frame_length = self.current_frame().frame_length() as usize;
                Some(align_frame(self.frame_position + frame_length))
            }
            Step::Roll => None,
            // nothing committed here yet; stay put
            Step::NoData | Step::Corrupt(_) => return Ok(()),
        };
        match advance {
            Some(position) => self.frame_position = position,
            None => {
                self.roll_forward()?;
            }
        }
        Ok(())
    }

    /// Move the cursor to the first frame with `gen_time >= time`.
    pub fn seek_to_time(&mut self, time: i64) -> Result<()> {
        if time == 0 {
            return self.seek_to_begin();
        }
        self.seek_time = time;
        let page_ids = self
            .location
            .locator
            .list_page_id(&self.location, self.dest_id)?;
        if page_ids.is_empty() {
            if self.writing {
                self.load_page(1)?;
            } else {
                self.page = None;
            }
            return Ok(());
        }
        check_contiguous(&page_ids)?;
        let page_id = Page::find_page_id(&self.location, self.dest_id, time)?;
        self.load_page(page_id)?;
        while self.data_available()? && self.current_frame().gen_time() < time {
            self.next()?;
        }
        Ok(())
    }

    /// Move the cursor to the first frame of the lowest-numbered page.
    pub fn seek_to_begin(&mut self) -> Result<()> {
        self.seek_time = 0;
        let page_ids = self
            .location
            .locator
            .list_page_id(&self.location, self.dest_id)?;
        match page_ids.first() {
            Some(&first) => {
                check_contiguous(&page_ids)?;
                self.load_page(first)
            }
            None if self.writing => self.load_page(1),
            None => {
                self.page = None;
                Ok(())
            }
        }
    }

    /// Position the cursor at the first open slot of the highest-numbered
    /// page, creating page 1 when the stream is brand new. Write mode only.
    pub(crate) fn seek_to_end(&mut self) -> Result<()> {
        debug_assert!(self.writing);
        let page_ids = self
            .location
            .locator
            .list_page_id(&self.location, self.dest_id)?;
        check_contiguous(&page_ids)?;
        let last = page_ids.last().copied().unwrap_or(1);
        self.load_page(last)?;
        loop {
            let next_page_id = match self.step_at_cursor() {
                Step::NoData => return Ok(()),
                Step::Data => {
                    let frame_length = self.current_frame().frame_length() as usize;
                    self.frame_position = align_frame(self.frame_position + frame_length);
                    continue;
                }
                Step::Roll => self.page.as_ref().map(|p| p.page_id() + 1),
                Step::Corrupt(message) => {
                    return Err(Error::with_message(ErrorCode::CorruptJournal, message));
                }
            };
            match next_page_id {
                // load_page creates the file in write mode
                Some(page_id) => self.load_page(page_id)?,
                None => return Ok(()),
            }
        }
    }

    /// Load page_id+1 if it exists on disk. A missing successor while even
    /// later pages exist is journal corruption.
    fn roll_forward(&mut self) -> Result<bool> {
        let next_id = match self.page.as_ref() {
            Some(page) => page.page_id() + 1,
            None => return Ok(false),
        };
        let path = Page::get_page_path(&self.location, self.dest_id, next_id)?;
        if !path.exists() {
            let page_ids = self
                .location
                .locator
                .list_page_id(&self.location, self.dest_id)?;
            if page_ids.iter().any(|&id| id > next_id) {
                return Err(Error::with_message(
                    ErrorCode::CorruptJournal,
                    format!(
                        "page {} of {}/{:08x} missing while later pages exist",
                        next_id, self.location.uname, self.dest_id
                    ),
                ));
            }
            return Ok(false);
        }
        self.load_page(next_id)?;
        Ok(true)
    }
}

fn check_contiguous(page_ids: &[u32]) -> Result<()> {
    for pair in page_ids.windows(2) {
        if pair[1] != pair[0] + 1 {
            return Err(Error::with_message(
                ErrorCode::CorruptJournal,
                format!("page ids not contiguous: {} then {}", pair[0], pair[1]),
            ));
        }
    }
    Ok(())
}
