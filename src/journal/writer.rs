//! Append-only frame producer.
//!
//! Exactly one writer owns a `(location, dest_id)` stream. Commit order is
//! what readers rely on: payload bytes, then the plain header fields, then
//! `msg_type` and `length` with release stores, then the page's
//! `last_frame_position`, then the publisher poke.

use std::sync::Arc;

use crate::data::location::Location;
use crate::error::{Error, ErrorCode, Result};
use crate::journal::frame::{align_frame, Frame, FrameMut};
use crate::journal::page::Page;
use crate::journal::Journal;
use crate::publisher::Publisher;
use crate::types::{FRAME_HEADER_LENGTH, MAX_FRAME_LENGTH, MSG_PAGE_END};
use crate::util::time;

/// Append-only frame producer for one stream.
pub struct Writer {
    journal: Journal,
    publisher: Arc<dyn Publisher>,
    frame_id_base: u32,
    /// Frames committed by this writer instance
    seq: u32,
    /// (msg_type, reserved payload bytes) of the frame opened and not yet
    /// closed
    open_frame_state: Option<(i32, usize)>,
}

impl Writer {
    pub fn new(
        location: &Arc<Location>,
        dest_id: u32,
        lazy: bool,
        publisher: Arc<dyn Publisher>,
    ) -> Result<Writer> {
        let mut journal = Journal::new(Arc::clone(location), dest_id, true, lazy);
        journal.seek_to_end()?;
        let frame_id_base = location.uid ^ time::nano_hashed(time::now_in_nano());
        Ok(Writer {
            journal,
            publisher,
            frame_id_base,
            seq: 0,
            open_frame_state: None,
        })
    }

    pub fn location(&self) -> &Arc<Location> {
        self.journal.location()
    }

    pub fn dest_id(&self) -> u32 {
        self.journal.dest_id()
    }

    /// Non-zero token identifying the next frame this writer emits.
    pub fn current_frame_uid(&self) -> u32 {
        let uid = self.frame_id_base ^ self.seq;
        if uid == 0 {
            self.frame_id_base | 1
        } else {
            uid
        }
    }

    /// Reserve a frame of up to `length_hint` payload bytes.
    ///
    /// The slot is published as uncommitted (`length = 0`, `msg_type = 0`)
    /// before anything else is written; `msg_type` stays held back until
    /// `close_frame`. Rolls to the next page when the current page is full
    /// or the hint does not fit.
    pub fn open_frame(
        &mut self,
        trigger_time: i64,
        msg_type: i32,
        length_hint: usize,
    ) -> Result<FrameMut<'_>> {
        if msg_type <= 0 {
            return Err(Error::with_message(
                ErrorCode::Misuse,
                format!("msg_type must be positive, got {}", msg_type),
            ));
        }
        if self.open_frame_state.is_some() {
            return Err(Error::with_message(
                ErrorCode::Misuse,
                "previous frame still open",
            ));
        }
        let reserved = FRAME_HEADER_LENGTH as usize + length_hint;
        if reserved > MAX_FRAME_LENGTH as usize {
            return Err(Error::with_message(
                ErrorCode::FrameOverflow,
                format!(
                    "frame of {} bytes exceeds the {} byte limit",
                    reserved, MAX_FRAME_LENGTH
                ),
            ));
        }

        let page = self.current_page();
        let must_roll =
            page.is_full() || !page.can_fit(self.journal.frame_position(), length_hint);
        if must_roll {
            self.close_page()?;
        }

        self.open_frame_state = Some((msg_type, length_hint));
        let source = self.journal.location().uid;
        let dest = self.journal.dest_id();
        let position = self.journal.frame_position();
        let page = self.journal.page_mut().expect("writer page loaded");
        let mut frame = page.frame_mut_at(position, length_hint);
        frame.clear();
        frame.set_header_length(FRAME_HEADER_LENGTH);
        frame.set_gen_time(time::now_in_nano());
        frame.set_trigger_time(trigger_time);
        frame.set_source(source);
        frame.set_dest(dest);
        Ok(frame)
    }

    /// Commit the open frame: stamp `gen_time = close_time`, publish
    /// `msg_type` then `length`, bump `last_frame_position`, poke the
    /// publisher. Returns the publisher's notify code (non-zero is logged,
    /// never fatal).
    pub fn close_frame(&mut self, data_length: usize, close_time: i64) -> Result<i32> {
        let (msg_type, capacity) = self.open_frame_state.take().ok_or_else(|| {
            Error::with_message(ErrorCode::Misuse, "close_frame without an open frame")
        })?;
        if data_length > capacity {
            return Err(Error::with_message(
                ErrorCode::FrameOverflow,
                format!(
                    "payload of {} bytes exceeds the {} reserved",
                    data_length, capacity
                ),
            ));
        }

        let position = self.journal.frame_position();
        let length = FRAME_HEADER_LENGTH as usize + data_length;
        {
            let page = self.journal.page_mut().expect("writer page loaded");
            let mut frame = page.frame_mut_at(position, capacity);
            frame.set_gen_time(close_time);
            frame.publish_msg_type(msg_type);
            frame.publish_length(length as u32);
            page.set_last_frame_position(position);
        }
        self.journal.advance_to(align_frame(position + length));
        self.seq = self.seq.wrapping_add(1);

        self.precreate_next_page();

        let rc = self.publisher.notify();
        if rc != 0 {
            tracing::warn!("publisher notify returned {}", rc);
        }
        Ok(rc)
    }

    /// Open, fill and commit one frame with `close_time = now`.
    pub fn write(&mut self, trigger_time: i64, msg_type: i32, data: &[u8]) -> Result<i32> {
        let mut frame = self.open_frame(trigger_time, msg_type, data.len())?;
        frame.copy_data(data);
        self.close_frame(data.len(), time::now_in_nano())
    }

    /// Re-emit a whole frame from another journal at the write cursor,
    /// preserving every header field except `source`/`dest`, which are
    /// re-stamped to this writer's identity.
    pub fn copy_frame(&mut self, source: &Frame<'_>) -> Result<i32> {
        if source.header_length() != FRAME_HEADER_LENGTH {
            return Err(Error::with_message(
                ErrorCode::VersionMismatch,
                format!(
                    "source frame header length {} differs from {}",
                    source.header_length(),
                    FRAME_HEADER_LENGTH
                ),
            ));
        }
        let data = source.data();
        let mut frame = self.open_frame(source.trigger_time(), source.msg_type(), data.len())?;
        frame.copy_data(data);
        self.close_frame(data.len(), source.gen_time())
    }

    fn current_page(&self) -> &Page {
        self.journal
            .current_page()
            .expect("writer page loaded")
    }

    /// Commit a page-end marker (when a header still fits) and move to
    /// page_id+1.
    fn close_page(&mut self) -> Result<()> {
        let source = self.journal.location().uid;
        let dest = self.journal.dest_id();
        let position = self.journal.frame_position();
        let next_page_id;
        {
            let page = self.journal.page_mut().expect("writer page loaded");
            next_page_id = page.page_id() + 1;
            if page.can_fit(position, 0) {
                let now = time::now_in_nano();
                let mut frame = page.frame_mut_at(position, 0);
                frame.clear();
                frame.set_header_length(FRAME_HEADER_LENGTH);
                frame.set_gen_time(now);
                frame.set_trigger_time(now);
                frame.set_source(source);
                frame.set_dest(dest);
                frame.publish_msg_type(MSG_PAGE_END);
                frame.publish_length(FRAME_HEADER_LENGTH);
                page.set_last_frame_position(position);
            }
        }
        tracing::debug!(
            "rolling {}/{:08x} to page {}",
            self.journal.location().uname,
            dest,
            next_page_id
        );
        self.journal.load_page(next_page_id)
    }

    /// Create the page_id+1 file early once the current page runs low, so
    /// rollover never waits on file creation and readers can discover the
    /// file before it is needed. Best-effort.
    fn precreate_next_page(&self) {
        let page = self.current_page();
        let position = self.journal.frame_position();
        if page.can_fit(
            position,
            (MAX_FRAME_LENGTH - FRAME_HEADER_LENGTH) as usize,
        ) {
            return;
        }
        let next_page_id = page.page_id() + 1;
        let location = self.journal.location();
        match Page::get_page_path(location, page.dest_id(), next_page_id) {
            Ok(path) if path.exists() => {}
            Ok(_) => {
                tracing::debug!(
                    "pre-creating page {} for {}/{:08x}",
                    next_page_id,
                    location.uname,
                    page.dest_id()
                );
                if let Err(err) = Page::load(location, page.dest_id(), next_page_id, true, true) {
                    tracing::warn!("pre-creating page {} failed: {}", next_page_id, err);
                }
            }
            Err(err) => {
                tracing::warn!("pre-creating page {} failed: {}", next_page_id, err);
            }
        }
    }
}
