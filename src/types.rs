//! Core identifiers and on-disk constants for the journal engine.
//!
//! Everything a page or frame stores on disk is little-endian and the
//! header sizes below are part of the format contract.

// ============================================================================
// Numeric Type Aliases
// ============================================================================

/// Journal page number (1-indexed on disk)
pub type PageId = u32;

/// Hashed 32-bit identity of a location
pub type LocationUid = u32;

/// Destination routing tag (0 = PUBLIC, 1 = SYNC, others unicast uids)
pub type DestId = u32;

/// Nanoseconds since the Unix epoch
pub type Nanotime = i64;

// ============================================================================
// Size constants
// ============================================================================

pub const KB: usize = 1024;
pub const MB: usize = KB * KB;

/// On-disk format version; pages carrying any other non-zero version are
/// refused
pub const JOURNAL_VERSION: u32 = 3;

/// Size of every journal page file
pub const PAGE_SIZE: u32 = 128 * MB as u32;

/// Size of the page header
pub const PAGE_HEADER_LENGTH: u32 = 24;

/// Size of the frame header
pub const FRAME_HEADER_LENGTH: u32 = 36;

/// Largest frame (header + payload) a writer accepts
pub const MAX_FRAME_LENGTH: u32 = PAGE_SIZE / 8;

/// Message type of the frame a writer commits as the final frame of a page
/// it rolls away from; readers consume it and move to the next page
pub const MSG_PAGE_END: i32 = 10000;

// ============================================================================
// Identity enums
// ============================================================================

/// Run mode of a stream endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Mode {
    Live = 0,
    Data = 1,
    Replay = 2,
    Backtest = 3,
}

impl Mode {
    /// Directory-segment name
    pub fn name(self) -> &'static str {
        match self {
            Mode::Live => "live",
            Mode::Data => "data",
            Mode::Replay => "replay",
            Mode::Backtest => "backtest",
        }
    }

    /// Parse a directory-segment name
    pub fn from_name(name: &str) -> Option<Mode> {
        match name {
            "live" => Some(Mode::Live),
            "data" => Some(Mode::Data),
            "replay" => Some(Mode::Replay),
            "backtest" => Some(Mode::Backtest),
            _ => None,
        }
    }
}

/// Functional category of a stream endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Category {
    Md = 0,
    Td = 1,
    Strategy = 2,
    System = 3,
}

impl Category {
    /// Directory-segment name
    pub fn name(self) -> &'static str {
        match self {
            Category::Md => "md",
            Category::Td => "td",
            Category::Strategy => "strategy",
            Category::System => "system",
        }
    }

    /// Parse a directory-segment name
    pub fn from_name(name: &str) -> Option<Category> {
        match name {
            "md" => Some(Category::Md),
            "td" => Some(Category::Td),
            "strategy" => Some(Category::Strategy),
            "system" => Some(Category::System),
            _ => None,
        }
    }
}

/// Storage layout kept under a location directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Layout {
    Journal = 0,
    Sqlite = 1,
    Log = 2,
}

impl Layout {
    /// Directory-segment name
    pub fn name(self) -> &'static str {
        match self {
            Layout::Journal => "journal",
            Layout::Sqlite => "sqlite",
            Layout::Log => "log",
        }
    }

    /// File extension used by `layout_file`
    pub fn extension(self) -> &'static str {
        match self {
            Layout::Journal => "journal",
            Layout::Sqlite => "db",
            Layout::Log => "log",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_name_round_trip() {
        for mode in [Mode::Live, Mode::Data, Mode::Replay, Mode::Backtest] {
            assert_eq!(Mode::from_name(mode.name()), Some(mode));
        }
        assert_eq!(Mode::from_name("simulation"), None);
    }

    #[test]
    fn test_category_name_round_trip() {
        for category in [
            Category::Md,
            Category::Td,
            Category::Strategy,
            Category::System,
        ] {
            assert_eq!(Category::from_name(category.name()), Some(category));
        }
        assert_eq!(Category::from_name("journal"), None);
    }

    #[test]
    fn test_page_geometry() {
        // pages are a whole multiple of any common OS page size
        assert_eq!(PAGE_SIZE % (64 * KB as u32), 0);
        assert!(MAX_FRAME_LENGTH < PAGE_SIZE - PAGE_HEADER_LENGTH);
        assert_eq!(FRAME_HEADER_LENGTH % 4, 0);
        assert_eq!(PAGE_HEADER_LENGTH % 4, 0);
    }
}
