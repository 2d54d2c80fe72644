//! Verification and repair for the logvault archive
//!
//! After a crash the catalog can no longer be trusted: segment files may end
//! mid-page, descriptors may point past the data that actually reached disk,
//! and stray files may shadow real segments. This crate reconstructs ground
//! truth from raw segment bytes:
//! - [`engine`]: per-recording verification — classify what is on disk,
//!   recompute the true stop position, optionally truncate a trailing
//!   partially-flushed page, and rewrite the catalog entry
//! - [`driver`]: batch orchestration across a whole catalog with
//!   per-recording outcome reporting
//!
//! Corruption is a normal, expected outcome recorded in the catalog, never a
//! process-fatal event: a batch pass always moves on to the next recording.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod driver;
pub mod engine;

pub use driver::{verify_all, verify_one, VerifyReport};
pub use engine::{
    verify_recording, RecordingOutcome, SegmentFault, VerifyError, VerifyOptions,
};
