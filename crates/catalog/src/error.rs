//! Catalog error types

use crate::descriptor::DescriptorError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the catalog store.
///
/// Capacity exhaustion and mutation of a read-only catalog are caller
/// errors that abort the current operation; everything else is an I/O or
/// on-disk consistency failure.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Underlying file I/O failure.
    #[error("catalog I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Another process already holds the catalog lock.
    #[error("catalog at {path} is locked by another process")]
    AlreadyLocked {
        /// Path of the locked catalog file.
        path: PathBuf,
    },

    /// A mutation was attempted on a catalog opened read-only.
    #[error("catalog is open read-only")]
    ReadOnly,

    /// The append capacity fixed at creation has been exhausted.
    #[error("catalog is full: {max_entries} entries")]
    Full {
        /// Capacity the catalog was created with.
        max_entries: u32,
    },

    /// The catalog file header does not describe a usable catalog.
    #[error("bad catalog header: {reason}")]
    BadHeader {
        /// What failed to validate.
        reason: String,
    },

    /// A slot's stored descriptor could not be decoded.
    #[error("corrupt catalog entry for recording {recording_id}")]
    CorruptEntry {
        /// Recording whose slot failed to decode.
        recording_id: i64,
        /// The decode failure.
        #[source]
        source: DescriptorError,
    },

    /// The given recording id has no catalog entry.
    #[error("recording {recording_id} is not in the catalog")]
    UnknownRecording {
        /// The unmatched recording id.
        recording_id: i64,
    },

    /// The catalog was opened or created with unusable parameters.
    #[error("invalid catalog configuration: {reason}")]
    InvalidConfiguration {
        /// What failed to validate.
        reason: String,
    },

    /// A new or updated descriptor violates the recording invariants.
    #[error("invalid recording parameters: {reason}")]
    InvalidRecordingParams {
        /// The violated invariant.
        reason: String,
    },
}
