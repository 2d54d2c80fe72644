//! Recording catalog for the logvault archive
//!
//! The catalog is a single compact index file holding one fixed-layout
//! descriptor per recording:
//! - [`descriptor`]: the recording descriptor value type and its slot codec
//! - [`store`]: the catalog file itself (fixed-size header plus ordered
//!   fixed-size slots), opened exclusively by one writer at a time
//!
//! Entries are appended when a recording starts, mutated in place on
//! graceful stop and by the verification engine, and never reordered or
//! physically removed.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod descriptor;
pub mod error;
pub mod store;

pub use descriptor::{DescriptorError, RecordingDescriptor, Validity};
pub use error::CatalogError;
pub use store::{
    Catalog, CatalogEntry, NewRecording, CATALOG_FILE_NAME, CATALOG_HEADER_LENGTH,
    DEFAULT_ENTRY_LENGTH, ENTRY_HEADER_LENGTH,
};
