//! # logvault
//!
//! Recording catalog and integrity verification for segmented, append-only
//! message logs.
//!
//! An archive directory holds one compact catalog file plus the segment
//! files of every recorded stream. This crate ties the pieces together:
//!
//! - [`logvault_core`] - frame header codec, segment naming, alignment
//!   constants, and the epoch clock seam
//! - [`logvault_catalog`] - the fixed-slot catalog store and recording
//!   descriptors
//! - [`logvault_verify`] - the verification and repair engine plus the
//!   batch driver
//!
//! ## Quick Start
//!
//! ```ignore
//! use logvault::prelude::*;
//! use std::sync::Arc;
//!
//! // Open the archive's catalog exclusively for writing.
//! let clock = Arc::new(SystemEpochClock);
//! let mut catalog = Catalog::open_writer(archive_dir, 1024, clock.clone())?;
//!
//! // Re-establish ground truth after a crash: scan every recording's most
//! // recent segment and repair descriptors in place.
//! let report = verify_all(
//!     &mut catalog,
//!     archive_dir,
//!     &VerifyOptions::last_segment_only(),
//!     clock.as_ref(),
//!     &mut |_| true,
//! )?;
//! println!("{}", report.summary());
//! ```
//!
//! Corruption is a recorded outcome, not an error: recordings that cannot be
//! trusted are marked invalid in the catalog with their best-known positions,
//! and the batch pass always runs to completion.

#![warn(missing_docs)]

pub mod prelude;

pub use logvault_catalog::{
    Catalog, CatalogEntry, CatalogError, NewRecording, RecordingDescriptor, Validity,
};
pub use logvault_core::{
    segment_file_name, EpochClock, FrameHeader, SystemEpochClock, NULL_POSITION, NULL_TIMESTAMP,
};
pub use logvault_verify::{
    verify_all, verify_one, RecordingOutcome, SegmentFault, VerifyError, VerifyOptions,
    VerifyReport,
};
