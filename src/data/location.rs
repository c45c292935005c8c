//! Stream endpoint identity.

use std::fmt;
use std::sync::Arc;

use crate::data::locator::Locator;
use crate::types::{Category, Mode};
use crate::util::hash::hash_str_32;

/// Immutable identity of a stream endpoint.
///
/// A location is a value object: the canonical name and the uid derived
/// from it are stable across processes, and every journal file the
/// endpoint owns lives under paths the attached locator derives from it.
#[derive(Debug)]
pub struct Location {
    /// Locator resolving this identity to paths
    pub locator: Arc<Locator>,
    pub mode: Mode,
    pub category: Category,
    pub group: String,
    pub name: String,
    /// Canonical `"<category-int>/<group>/<name>/<mode-int>"` identity string
    pub uname: String,
    /// Stable 32-bit identity, `hash_str_32(uname, 0)`
    pub uid: u32,
}

impl Location {
    /// Broadcast destination id
    pub const PUBLIC: u32 = 0;
    /// Synchronization channel destination id
    pub const SYNC: u32 = 1;

    pub fn new(
        mode: Mode,
        category: Category,
        group: impl Into<String>,
        name: impl Into<String>,
        locator: Arc<Locator>,
    ) -> Arc<Location> {
        let group = group.into();
        let name = name.into();
        let uname = format!("{}/{}/{}/{}", category as i32, group, name, mode as i32);
        let uid = hash_str_32(&uname, 0);
        Arc::new(Location {
            locator,
            mode,
            category,
            group,
            name,
            uname,
            uid,
        })
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.category.name(),
            self.group,
            self.name,
            self.mode.name()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locator() -> Arc<Locator> {
        Arc::new(Locator::with_root("/tmp/journal-root"))
    }

    #[test]
    fn test_uname_uses_numeric_identity() {
        let location = Location::new(Mode::Live, Category::Md, "bin", "ctp", locator());
        assert_eq!(location.uname, "0/bin/ctp/0");
        assert_eq!(location.to_string(), "md/bin/ctp/live");
    }

    #[test]
    fn test_uid_is_stable_per_identity() {
        let a = Location::new(Mode::Live, Category::System, "test", "test", locator());
        let b = Location::new(Mode::Live, Category::System, "test", "test", locator());
        assert_eq!(a.uid, b.uid);
        assert_eq!(a.uid, hash_str_32(&a.uname, 0));

        let c = Location::new(Mode::Backtest, Category::System, "test", "test", locator());
        assert_ne!(a.uid, c.uid);
    }
}
