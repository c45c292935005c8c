//! Time-ordered assembly across storage roots, and frame sinks.

use std::collections::HashMap;
use std::ops::Add;
use std::sync::Arc;

use bitflags::bitflags;

use crate::data::location::Location;
use crate::data::locator::Locator;
use crate::error::{Error, ErrorCode, Result};
use crate::journal::frame::Frame;
use crate::journal::reader::Reader;
use crate::journal::writer::Writer;
use crate::publisher::{NoopPublisher, Publisher};

bitflags! {
    /// Channel selection when assembling from a single source location.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AssembleMode: u32 {
        /// Join exactly `(source, dest_id)`
        const CHANNEL = 1;
        /// Join every destination the source writes
        const WRITE = 1 << 1;
        /// Join `(loc, dest_id)` for every location on the root
        const READ = 1 << 2;
        /// Join `(loc, PUBLIC)` for every location
        const PUBLIC = 1 << 3;
        /// Join `(loc, SYNC)` for every location
        const SYNC = 1 << 4;
        /// Join every channel of every location; dominates the others
        const ALL = 1 << 5;
    }
}

/// Consumer of assembled frames, called in strict gen_time order.
pub trait Sink {
    fn put(&mut self, location: &Arc<Location>, dest_id: u32, frame: &Frame<'_>) -> Result<()>;
}

/// Sink re-emitting every frame under a target locator, creating
/// per-stream writers on demand.
pub struct CopySink {
    locator: Arc<Locator>,
    publisher: Arc<dyn Publisher>,
    writers: HashMap<u32, HashMap<u32, Writer>>,
}

impl CopySink {
    pub fn new(locator: Arc<Locator>) -> CopySink {
        CopySink::with_publisher(locator, Arc::new(NoopPublisher))
    }

    pub fn with_publisher(locator: Arc<Locator>, publisher: Arc<dyn Publisher>) -> CopySink {
        CopySink {
            locator,
            publisher,
            writers: HashMap::new(),
        }
    }
}

impl Sink for CopySink {
    fn put(&mut self, location: &Arc<Location>, dest_id: u32, frame: &Frame<'_>) -> Result<()> {
        let by_dest = self.writers.entry(location.uid).or_default();
        if !by_dest.contains_key(&dest_id) {
            let target = Location::new(
                location.mode,
                location.category,
                location.group.clone(),
                location.name.clone(),
                Arc::clone(&self.locator),
            );
            let writer = Writer::new(&target, dest_id, true, Arc::clone(&self.publisher))?;
            by_dest.insert(dest_id, writer);
        }
        by_dest
            .get_mut(&dest_id)
            .expect("writer just inserted")
            .copy_frame(frame)?;
        Ok(())
    }
}

/// Reader spanning multiple roots, draining frames in gen_time order.
///
/// Assemblers carry the four identity strings they were built from;
/// `merge` refuses to combine assemblers whose identities differ.
#[derive(Debug)]
pub struct Assembler {
    mode: String,
    category: String,
    group: String,
    name: String,
    from_time: i64,
    locators: Vec<Arc<Locator>>,
    readers: Vec<Reader>,
    current: Option<usize>,
}

impl Assembler {
    /// Assemble every stream matching the identity patterns under each
    /// locator.
    pub fn new(
        locators: &[Arc<Locator>],
        mode: &str,
        category: &str,
        group: &str,
        name: &str,
    ) -> Result<Assembler> {
        let mut assembler = Assembler {
            mode: mode.to_string(),
            category: category.to_string(),
            group: group.to_string(),
            name: name.to_string(),
            from_time: 0,
            locators: Vec::new(),
            readers: Vec::new(),
            current: None,
        };
        for locator in locators {
            let mut reader = Reader::new(true);
            for location in locator.list_locations(category, group, name, mode)? {
                for dest_id in locator.list_location_dest(&location)? {
                    reader.join(&location, dest_id, 0)?;
                }
            }
            assembler.locators.push(Arc::clone(locator));
            assembler.readers.push(reader);
        }
        assembler.sort()?;
        Ok(assembler)
    }

    /// Assemble the channels `assemble_mode` selects around `source`.
    pub fn from_source(
        source: &Arc<Location>,
        dest_id: u32,
        assemble_mode: AssembleMode,
        from_time: i64,
    ) -> Result<Assembler> {
        let locator = Arc::clone(&source.locator);
        let mut reader = Reader::new(true);

        if assemble_mode.contains(AssembleMode::CHANNEL) {
            reader.join(source, dest_id, from_time)?;
        }
        if assemble_mode.contains(AssembleMode::WRITE) {
            for dest in locator.list_location_dest(source)? {
                reader.join(source, dest, from_time)?;
            }
        }

        let read = assemble_mode.contains(AssembleMode::READ);
        let public = assemble_mode.contains(AssembleMode::PUBLIC);
        let sync = assemble_mode.contains(AssembleMode::SYNC);
        let all = assemble_mode.contains(AssembleMode::ALL);
        if read || public || sync || all {
            for location in locator.list_locations("*", "*", "*", "*")? {
                for dest in locator.list_location_dest(&location)? {
                    if all {
                        reader.join(&location, dest, from_time)?;
                    } else if read && dest == dest_id {
                        reader.join(&location, dest, from_time)?;
                    } else if public && dest == Location::PUBLIC {
                        reader.join(&location, dest, from_time)?;
                    } else if sync && dest == Location::SYNC {
                        reader.join(&location, dest, from_time)?;
                    }
                }
            }
        }

        let mut assembler = Assembler {
            mode: source.mode.name().to_string(),
            category: source.category.name().to_string(),
            group: source.group.clone(),
            name: source.name.clone(),
            from_time,
            locators: vec![locator],
            readers: vec![reader],
            current: None,
        };
        assembler.sort()?;
        Ok(assembler)
    }

    fn same_identity(&self, other: &Assembler) -> bool {
        self.mode == other.mode
            && self.category == other.category
            && self.group == other.group
            && self.name == other.name
    }

    /// The `+` of the set algebra: a new assembler over the union of
    /// roots. Fails with `IncompatibleAssemble` when the identity strings
    /// differ.
    pub fn merge(&self, other: &Assembler) -> Result<Assembler> {
        if !self.same_identity(other) {
            return Err(Error::with_message(
                ErrorCode::IncompatibleAssemble,
                format!(
                    "assemble incompatible: {}/{}/{}/{} vs {}/{}/{}/{}",
                    self.category, self.group, self.name, self.mode,
                    other.category, other.group, other.name, other.mode
                ),
            ));
        }
        let merged: Vec<Arc<Locator>> = self
            .locators
            .iter()
            .chain(other.locators.iter())
            .cloned()
            .collect();
        Assembler::new(&merged, &self.mode, &self.category, &self.group, &self.name)
    }

    /// The `+=` of the set algebra: join `other`'s channels in place.
    /// Channels of an already known root join the matching reader at
    /// `other.from_time`; new roots come in with their reader set.
    pub fn extend(&mut self, other: &Assembler) -> Result<()> {
        for (other_locator, other_reader) in other.locators.iter().zip(other.readers.iter()) {
            match self.locators.iter().position(|l| l == other_locator) {
                Some(index) => {
                    let reader = &mut self.readers[index];
                    for journal in other_reader.journals() {
                        reader.join(journal.location(), journal.dest_id(), other.from_time)?;
                    }
                }
                None => {
                    let mut reader = Reader::new(true);
                    for journal in other_reader.journals() {
                        reader.join(journal.location(), journal.dest_id(), other.from_time)?;
                    }
                    self.locators.push(Arc::clone(other_locator));
                    self.readers.push(reader);
                }
            }
        }
        self.sort()
    }

    /// The `-=` of the set algebra: drop `other`'s channels from matching
    /// roots.
    pub fn remove(&mut self, other: &Assembler) -> Result<()> {
        for (other_locator, other_reader) in other.locators.iter().zip(other.readers.iter()) {
            if let Some(index) = self.locators.iter().position(|l| l == other_locator) {
                let reader = &mut self.readers[index];
                for journal in other_reader.journals() {
                    reader.disjoin_channel(journal.location().uid, journal.dest_id());
                }
            }
        }
        self.sort()
    }

    /// Drop every channel of `location_uid` across all roots.
    pub fn disjoin(&mut self, location_uid: u32) -> Result<()> {
        for reader in &mut self.readers {
            reader.disjoin(location_uid);
        }
        self.sort()
    }

    /// Drop one channel across all roots.
    pub fn disjoin_channel(&mut self, location_uid: u32, dest_id: u32) -> Result<()> {
        for reader in &mut self.readers {
            reader.disjoin_channel(location_uid, dest_id);
        }
        self.sort()
    }

    /// Joined channels as (locator, location_uid, dest_id) triples.
    pub fn channels(&self) -> Vec<(Arc<Locator>, u32, u32)> {
        let mut out = Vec::new();
        for (locator, reader) in self.locators.iter().zip(self.readers.iter()) {
            for journal in reader.journals() {
                out.push((Arc::clone(locator), journal.location().uid, journal.dest_id()));
            }
        }
        out
    }

    fn sort(&mut self) -> Result<()> {
        // oldest gen_time wins; ties fall back to (location_uid, dest_id)
        let mut best: Option<(i64, (u32, u32), usize)> = None;
        for (index, reader) in self.readers.iter_mut().enumerate() {
            if reader.data_available()? {
                let gen_time = reader.current_frame().gen_time();
                let page = reader.current_page();
                let key = (page.location().uid, page.dest_id());
                if best.map_or(true, |(time, best_key, _)| (gen_time, key) < (time, best_key)) {
                    best = Some((gen_time, key, index));
                }
            }
        }
        self.current = best.map(|(_, _, index)| index);
        Ok(())
    }

    pub fn data_available(&mut self) -> Result<bool> {
        self.sort()?;
        Ok(self.current.is_some())
    }

    /// Globally oldest frame. Only meaningful while `data_available()`.
    pub fn current_frame(&self) -> Frame<'_> {
        self.readers[self.current.expect("no data available")].current_frame()
    }

    pub fn next(&mut self) -> Result<()> {
        if let Some(index) = self.current {
            self.readers[index].next()?;
        }
        self.sort()
    }

    pub fn seek_to_time(&mut self, time: i64) -> Result<()> {
        for reader in &mut self.readers {
            reader.seek_to_time(time)?;
        }
        self.sort()
    }

    /// The `>>` drain: feed the sink until no committed frame is left.
    pub fn drain_into(&mut self, sink: &mut dyn Sink) -> Result<()> {
        while self.data_available()? {
            let reader = &self.readers[self.current.expect("data available")];
            let page = reader.current_page();
            let location = Arc::clone(page.location());
            let dest_id = page.dest_id();
            sink.put(&location, dest_id, &reader.current_frame())?;
            self.next()?;
        }
        Ok(())
    }
}

impl Add<&Assembler> for &Assembler {
    type Output = Result<Assembler>;

    fn add(self, other: &Assembler) -> Result<Assembler> {
        self.merge(other)
    }
}
