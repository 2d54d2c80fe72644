//! Core types for the logvault archive
//!
//! This crate holds the leaf building blocks shared by the catalog and the
//! verification engine:
//! - [`frame`]: the fixed binary frame header embedded at the start of every
//!   message frame in a segment file
//! - [`segment`]: segment file naming and page/frame alignment layout
//! - [`clock`]: the epoch clock seam used for all archive timestamps
//!
//! Everything here is pure: no file I/O, no global state.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod frame;
pub mod segment;

pub use clock::{EpochClock, SystemEpochClock};
pub use frame::{
    align_frame_length, FrameError, FrameHeader, FRAME_ALIGNMENT, FRAME_HEADER_LENGTH,
};
pub use segment::{
    page_align_up, parse_segment_base_position, segment_file_name, SegmentNameError, PAGE_SIZE,
    SEGMENT_SUFFIX,
};

/// Sentinel for an unknown or still-open stream position.
pub const NULL_POSITION: i64 = -1;

/// Sentinel for an unset timestamp.
pub const NULL_TIMESTAMP: i64 = -1;
