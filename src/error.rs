//! Error types and Result alias for the journal engine.

use std::fmt;

/// Failure categories surfaced by the journal engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Page or frame header invariants violated, or a page missing from a
    /// contiguous sequence
    CorruptJournal,
    /// Requested frame cannot fit in a page
    FrameOverflow,
    /// Page format version not understood
    VersionMismatch,
    /// Set algebra across assemblers with different identity strings
    IncompatibleAssemble,
    /// Filesystem refused to create, map or enumerate
    PathUnavailable,
    /// Non-zero return from the notification publisher
    Publisher,
    /// API used out of protocol (e.g. closing a frame that was never opened)
    Misuse,
}

impl ErrorCode {
    /// Short stable name for logs and messages
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::CorruptJournal => "corrupt journal",
            ErrorCode::FrameOverflow => "frame overflow",
            ErrorCode::VersionMismatch => "version mismatch",
            ErrorCode::IncompatibleAssemble => "incompatible assemble",
            ErrorCode::PathUnavailable => "path unavailable",
            ErrorCode::Publisher => "publisher failure",
            ErrorCode::Misuse => "misuse",
        }
    }
}

/// Error with a category and an optional detail message
#[derive(Debug)]
pub struct Error {
    code: ErrorCode,
    message: Option<String>,
}

impl Error {
    /// Create an error carrying only a category
    pub fn new(code: ErrorCode) -> Self {
        Error {
            code,
            message: None,
        }
    }

    /// Create an error with a detail message
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Error {
            code,
            message: Some(message.into()),
        }
    }

    /// Get the error category
    pub fn code(&self) -> ErrorCode {
        self.code
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.code.as_str(), message),
            None => f.write_str(self.code.as_str()),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::with_message(ErrorCode::PathUnavailable, err.to_string())
    }
}

/// Result type alias for journal operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_and_without_message() {
        let bare = Error::new(ErrorCode::FrameOverflow);
        assert_eq!(bare.to_string(), "frame overflow");

        let detailed = Error::with_message(ErrorCode::CorruptJournal, "page 3 missing");
        assert_eq!(detailed.to_string(), "corrupt journal: page 3 missing");
        assert_eq!(detailed.code(), ErrorCode::CorruptJournal);
    }

    #[test]
    fn test_io_error_maps_to_path_unavailable() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: Error = io.into();
        assert_eq!(err.code(), ErrorCode::PathUnavailable);
    }
}
