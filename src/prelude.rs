//! Convenient imports for logvault.
//!
//! Re-exports the types needed for the common open-verify-report loop:
//!
//! ```ignore
//! use logvault::prelude::*;
//!
//! let mut catalog = Catalog::open_writer(archive_dir, 1024, clock)?;
//! let report = verify_all(&mut catalog, archive_dir, &VerifyOptions::default(), ...)?;
//! ```

// Catalog access
pub use logvault_catalog::{Catalog, CatalogEntry, CatalogError, NewRecording};

// Descriptor types
pub use logvault_catalog::{RecordingDescriptor, Validity};

// Clock seam and sentinels
pub use logvault_core::{EpochClock, SystemEpochClock, NULL_POSITION, NULL_TIMESTAMP};

// Verification entry points
pub use logvault_verify::{
    verify_all, verify_one, RecordingOutcome, SegmentFault, VerifyError, VerifyOptions,
    VerifyReport,
};
