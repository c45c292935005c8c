//! Low-latency inter-process messaging over append-only memory-mapped
//! journals.
//!
//! Producers write timestamped, typed binary frames into per-stream
//! journal files laid out as fixed-size pages; consumers map the same
//! pages and observe frames in write order, and an [`Assembler`] merges
//! many streams into one globally time-ordered sequence. A [`Locator`]
//! names streams and resolves them to filesystem paths.
//!
//! The only cross-process synchronization is the mapped memory itself:
//! writers publish each frame's `length` and `msg_type` with release
//! stores, readers load them with acquire semantics and treat anything
//! else as "no data yet".

pub mod data;
pub mod error;
pub mod journal;
pub mod os;
pub mod publisher;
pub mod types;
pub mod util;

// Re-export the main public types
pub use data::location::Location;
pub use data::locator::Locator;
pub use error::{Error, ErrorCode, Result};
pub use journal::{
    AssembleMode, Assembler, CopySink, Frame, FrameMut, Journal, Page, Reader, Sink, Writer,
};
pub use publisher::{NoopPublisher, Publisher};
pub use types::{Category, Layout, Mode};
