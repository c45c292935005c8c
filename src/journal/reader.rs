//! Multi-journal consumer merging streams in gen_time order.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::data::location::Location;
use crate::error::Result;
use crate::journal::frame::Frame;
use crate::journal::page::Page;
use crate::journal::Journal;

/// Consumer over a set of joined journals.
///
/// The current frame is the globally oldest committed frame among the
/// joined streams. Journals are keyed by `(location_uid, dest_id)`; the
/// map's ascending iteration is what makes equal gen_times break ties
/// deterministically.
#[derive(Debug)]
pub struct Reader {
    lazy: bool,
    journals: BTreeMap<(u32, u32), Journal>,
    current: Option<(u32, u32)>,
}

impl Reader {
    pub fn new(lazy: bool) -> Reader {
        Reader {
            lazy,
            journals: BTreeMap::new(),
            current: None,
        }
    }

    /// Open `(location, dest_id)` and position it at the first frame with
    /// `gen_time >= from_time`. Joining an already joined channel is a
    /// no-op.
    pub fn join(&mut self, location: &Arc<Location>, dest_id: u32, from_time: i64) -> Result<()> {
        let key = (location.uid, dest_id);
        if self.journals.contains_key(&key) {
            return Ok(());
        }
        let mut journal = Journal::new(Arc::clone(location), dest_id, false, self.lazy);
        journal.seek_to_time(from_time)?;
        self.journals.insert(key, journal);
        self.current = None;
        Ok(())
    }

    /// Drop every journal of `location_uid`.
    pub fn disjoin(&mut self, location_uid: u32) {
        self.journals.retain(|key, _| key.0 != location_uid);
        self.current = None;
    }

    /// Drop exactly one journal.
    pub fn disjoin_channel(&mut self, location_uid: u32, dest_id: u32) {
        self.journals.remove(&(location_uid, dest_id));
        self.current = None;
    }

    /// Joined journals in key order.
    pub fn journals(&self) -> impl Iterator<Item = &Journal> {
        self.journals.values()
    }

    /// Re-select the journal holding the globally oldest committed frame.
    fn sort(&mut self) -> Result<()> {
        let mut min_time = i64::MAX;
        let mut current = None;
        for (key, journal) in self.journals.iter_mut() {
            if journal.data_available()? {
                let gen_time = journal.current_frame().gen_time();
                // strict < keeps the smallest key on gen_time ties
                if gen_time < min_time {
                    min_time = gen_time;
                    current = Some(*key);
                }
            }
        }
        self.current = current;
        Ok(())
    }

    pub fn data_available(&mut self) -> Result<bool> {
        self.sort()?;
        Ok(self.current.is_some())
    }

    /// Globally oldest frame. Only meaningful while `data_available()`.
    pub fn current_frame(&self) -> Frame<'_> {
        let key = self.current.expect("no data available");
        self.journals
            .get(&key)
            .expect("current journal joined")
            .current_frame()
    }

    /// Page holding the current frame.
    pub fn current_page(&self) -> &Page {
        let key = self.current.expect("no data available");
        self.journals
            .get(&key)
            .expect("current journal joined")
            .current_page()
            .expect("current journal has a page")
    }

    /// Advance the current journal one frame and re-select.
    pub fn next(&mut self) -> Result<()> {
        if let Some(key) = self.current {
            if let Some(journal) = self.journals.get_mut(&key) {
                journal.next()?;
            }
        }
        self.sort()
    }

    /// Re-seek every joined journal.
    pub fn seek_to_time(&mut self, time: i64) -> Result<()> {
        for journal in self.journals.values_mut() {
            journal.seek_to_time(time)?;
        }
        self.sort()
    }
}
