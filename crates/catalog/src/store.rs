//! The catalog store
//!
//! A single index file, `logvault.catalog`, holds every recording descriptor
//! for an archive directory:
//!
//! ```text
//! +--------------------------+
//! | global header (32 bytes) |  magic, version, entry length, max entries
//! +--------------------------+
//! | slot 0                   |  entry header (32 bytes) + descriptor body
//! +--------------------------+
//! | slot 1                   |
//! +--------------------------+
//! | ...                      |  max_entries slots, all entry_length bytes
//! +--------------------------+
//! ```
//!
//! Slot index equals `recording_id`; entries are appended in id order and
//! never moved, so random access is plain offset arithmetic over the mapped
//! file. The writer holds an exclusive advisory lock for the store's whole
//! lifetime; read-only opens take a shared lock and refuse mutation.

use crate::descriptor::{DescriptorError, RecordingDescriptor, Validity};
use crate::error::CatalogError;
use byteorder::{ByteOrder, LittleEndian};
use fs2::FileExt;
use logvault_core::{EpochClock, NULL_POSITION, NULL_TIMESTAMP};
use memmap2::{Mmap, MmapMut};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Name of the catalog file within an archive directory.
pub const CATALOG_FILE_NAME: &str = "logvault.catalog";

/// Length of the global catalog header.
pub const CATALOG_HEADER_LENGTH: usize = 32;

/// Length of the per-slot entry header preceding the descriptor body.
pub const ENTRY_HEADER_LENGTH: usize = 32;

/// Default slot size. Fixed at catalog creation.
pub const DEFAULT_ENTRY_LENGTH: u32 = 1024;

const CATALOG_MAGIC: [u8; 8] = *b"LVCATLOG";
const CATALOG_VERSION: u32 = 1;

const VERSION_OFFSET: usize = 8;
const ENTRY_LENGTH_OFFSET: usize = 12;
const MAX_ENTRIES_OFFSET: usize = 16;

const DESCRIPTOR_LENGTH_OFFSET: usize = 0;
const VALIDITY_OFFSET: usize = 4;

/// Parameters for a descriptor appended when a recording starts.
///
/// The catalog assigns the recording id and the start timestamp; stop
/// position and stop timestamp begin as sentinels.
#[derive(Debug, Clone)]
pub struct NewRecording {
    /// Stream byte offset where the recording begins.
    pub start_position: i64,
    /// Term identifier at stream start.
    pub initial_term_id: i32,
    /// Capacity of each segment file, a multiple of the term length.
    pub segment_file_length: i32,
    /// Term length, a power of two.
    pub term_buffer_length: i32,
    /// Maximum transmission unit of the recorded stream.
    pub mtu_length: i32,
    /// Session identity of the recorded stream.
    pub session_id: i32,
    /// Stream identity within the session.
    pub stream_id: i32,
    /// Channel URI stripped to the form used for matching.
    pub stripped_channel: String,
    /// Original channel URI, retained for audit.
    pub original_channel: String,
    /// Description of the stream's origin.
    pub source_identity: String,
}

impl NewRecording {
    fn validate(&self) -> Result<(), CatalogError> {
        let term = self.term_buffer_length;
        if term <= 0 || (term & (term - 1)) != 0 {
            return Err(CatalogError::InvalidRecordingParams {
                reason: format!("term buffer length {term} is not a power of two"),
            });
        }
        if self.segment_file_length <= 0 || self.segment_file_length % term != 0 {
            return Err(CatalogError::InvalidRecordingParams {
                reason: format!(
                    "segment file length {} is not a multiple of term buffer length {term}",
                    self.segment_file_length
                ),
            });
        }
        if self.mtu_length <= 0 || self.mtu_length > term {
            return Err(CatalogError::InvalidRecordingParams {
                reason: format!(
                    "mtu length {} exceeds term buffer length {term}",
                    self.mtu_length
                ),
            });
        }
        if self.start_position < 0 && self.start_position != NULL_POSITION {
            return Err(CatalogError::InvalidRecordingParams {
                reason: format!("start position {} is negative", self.start_position),
            });
        }
        Ok(())
    }
}

/// One decoded catalog slot: validity marker plus descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Whether the entry's segment content is trusted.
    pub validity: Validity,
    /// The recording descriptor.
    pub descriptor: RecordingDescriptor,
}

enum CatalogMmap {
    Writer(MmapMut),
    Reader(Mmap),
}

/// The catalog store over one archive directory.
///
/// Dropping the catalog flushes the mapping (writer mode) and releases the
/// advisory lock deterministically.
pub struct Catalog {
    path: PathBuf,
    file: File,
    mmap: CatalogMmap,
    entry_length: usize,
    max_entries: u32,
    next_recording_id: i64,
    clock: Arc<dyn EpochClock>,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("path", &self.path)
            .field("file", &self.file)
            .field("entry_length", &self.entry_length)
            .field("max_entries", &self.max_entries)
            .field("next_recording_id", &self.next_recording_id)
            .finish_non_exhaustive()
    }
}

impl Catalog {
    /// Open the archive's catalog for writing, creating it when absent.
    ///
    /// Takes an exclusive advisory lock held until the catalog is dropped.
    /// `max_entries` fixes the capacity at creation time and is ignored when
    /// the catalog already exists.
    pub fn open_writer(
        archive_dir: &Path,
        max_entries: u32,
        clock: Arc<dyn EpochClock>,
    ) -> Result<Catalog, CatalogError> {
        if max_entries == 0 {
            return Err(CatalogError::InvalidConfiguration {
                reason: "max entries must be positive".to_string(),
            });
        }
        std::fs::create_dir_all(archive_dir)?;
        let path = archive_dir.join(CATALOG_FILE_NAME);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        file.try_lock_exclusive()
            .map_err(|_| CatalogError::AlreadyLocked { path: path.clone() })?;

        let entry_length = DEFAULT_ENTRY_LENGTH as usize;
        if file.metadata()?.len() == 0 {
            let total = CATALOG_HEADER_LENGTH as u64
                + u64::from(max_entries) * entry_length as u64;
            file.set_len(total)?;

            let mut mmap = unsafe { MmapMut::map_mut(&file)? };
            mmap[..8].copy_from_slice(&CATALOG_MAGIC);
            LittleEndian::write_u32(&mut mmap[VERSION_OFFSET..], CATALOG_VERSION);
            LittleEndian::write_u32(&mut mmap[ENTRY_LENGTH_OFFSET..], entry_length as u32);
            LittleEndian::write_u32(&mut mmap[MAX_ENTRIES_OFFSET..], max_entries);
            mmap.flush()?;

            debug!(
                "created catalog at {} with capacity {max_entries}",
                path.display()
            );
            return Ok(Catalog {
                path,
                file,
                mmap: CatalogMmap::Writer(mmap),
                entry_length,
                max_entries,
                next_recording_id: 0,
                clock,
            });
        }

        let mmap = unsafe { MmapMut::map_mut(&file)? };
        let (entry_length, max_entries) = validate_header(&mmap, file.metadata()?.len())?;
        let next_recording_id = scan_next_recording_id(&mmap, entry_length, max_entries);

        debug!(
            "opened catalog at {} for writing: {next_recording_id} of {max_entries} entries used",
            path.display()
        );
        Ok(Catalog {
            path,
            file,
            mmap: CatalogMmap::Writer(mmap),
            entry_length,
            max_entries,
            next_recording_id,
            clock,
        })
    }

    /// Open an existing catalog read-only under a shared lock.
    ///
    /// Every mutation on the returned catalog fails with
    /// [`CatalogError::ReadOnly`].
    pub fn open_read_only(
        archive_dir: &Path,
        clock: Arc<dyn EpochClock>,
    ) -> Result<Catalog, CatalogError> {
        let path = archive_dir.join(CATALOG_FILE_NAME);
        let file = OpenOptions::new().read(true).open(&path)?;
        file.try_lock_shared()
            .map_err(|_| CatalogError::AlreadyLocked { path: path.clone() })?;

        let mmap = unsafe { Mmap::map(&file)? };
        let (entry_length, max_entries) = validate_header(&mmap, file.metadata()?.len())?;
        let next_recording_id = scan_next_recording_id(&mmap, entry_length, max_entries);

        debug!("opened catalog at {} read-only", path.display());
        Ok(Catalog {
            path,
            file,
            mmap: CatalogMmap::Reader(mmap),
            entry_length,
            max_entries,
            next_recording_id,
            clock,
        })
    }

    /// Append a descriptor for a recording that just started.
    ///
    /// Returns the assigned recording id. Fails with [`CatalogError::Full`]
    /// once the creation-time capacity is exhausted.
    pub fn add_new_recording(&mut self, new: NewRecording) -> Result<i64, CatalogError> {
        new.validate()?;
        if self.is_read_only() {
            return Err(CatalogError::ReadOnly);
        }
        if self.next_recording_id >= i64::from(self.max_entries) {
            return Err(CatalogError::Full {
                max_entries: self.max_entries,
            });
        }

        let recording_id = self.next_recording_id;
        let descriptor = RecordingDescriptor {
            recording_id,
            start_timestamp: self.clock.time_millis(),
            stop_timestamp: NULL_TIMESTAMP,
            start_position: new.start_position,
            stop_position: NULL_POSITION,
            initial_term_id: new.initial_term_id,
            segment_file_length: new.segment_file_length,
            term_buffer_length: new.term_buffer_length,
            mtu_length: new.mtu_length,
            session_id: new.session_id,
            stream_id: new.stream_id,
            stripped_channel: new.stripped_channel,
            original_channel: new.original_channel,
            source_identity: new.source_identity,
        };
        self.write_slot(recording_id, Validity::Valid, &descriptor)?;
        self.next_recording_id += 1;

        debug!(
            "added recording {recording_id} for stream {} session {}",
            descriptor.stream_id, descriptor.session_id
        );
        Ok(recording_id)
    }

    /// Decode one slot by recording id.
    pub fn entry(&self, recording_id: i64) -> Result<Option<CatalogEntry>, CatalogError> {
        if recording_id < 0 || recording_id >= self.next_recording_id {
            return Ok(None);
        }
        let slot = self.slot_bytes(recording_id);
        let descriptor_length =
            LittleEndian::read_u32(&slot[DESCRIPTOR_LENGTH_OFFSET..]) as usize;
        if descriptor_length == 0 {
            return Ok(None);
        }

        let corrupt = |source: DescriptorError| CatalogError::CorruptEntry {
            recording_id,
            source,
        };
        if descriptor_length > self.entry_length - ENTRY_HEADER_LENGTH {
            return Err(corrupt(DescriptorError::TooLarge {
                required: descriptor_length,
                available: self.entry_length - ENTRY_HEADER_LENGTH,
            }));
        }
        let validity = Validity::from_byte(slot[VALIDITY_OFFSET]).map_err(corrupt)?;
        let body = &slot[ENTRY_HEADER_LENGTH..ENTRY_HEADER_LENGTH + descriptor_length];
        let descriptor = RecordingDescriptor::read(body).map_err(corrupt)?;
        Ok(Some(CatalogEntry {
            validity,
            descriptor,
        }))
    }

    /// Visit one entry by recording id; returns whether the id exists.
    pub fn for_entry(
        &self,
        recording_id: i64,
        visitor: impl FnOnce(&CatalogEntry),
    ) -> Result<bool, CatalogError> {
        match self.entry(recording_id)? {
            Some(entry) => {
                visitor(&entry);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Rewrite one slot in place, validity marker and descriptor together.
    pub fn update_entry(
        &mut self,
        recording_id: i64,
        validity: Validity,
        descriptor: &RecordingDescriptor,
    ) -> Result<(), CatalogError> {
        if self.is_read_only() {
            return Err(CatalogError::ReadOnly);
        }
        if recording_id < 0 || recording_id >= self.next_recording_id {
            return Err(CatalogError::UnknownRecording { recording_id });
        }
        if descriptor.recording_id != recording_id {
            return Err(CatalogError::InvalidRecordingParams {
                reason: format!(
                    "descriptor carries recording id {} but slot {recording_id} was addressed",
                    descriptor.recording_id
                ),
            });
        }
        self.write_slot(recording_id, validity, descriptor)
    }

    /// Record a graceful stop for a recording, keeping its validity marker.
    ///
    /// This is the mutation the live recording path applies when a recording
    /// ends cleanly.
    pub fn recording_stopped(
        &mut self,
        recording_id: i64,
        stop_position: i64,
        stop_timestamp: i64,
    ) -> Result<(), CatalogError> {
        let entry = self
            .entry(recording_id)?
            .ok_or(CatalogError::UnknownRecording { recording_id })?;
        let mut descriptor = entry.descriptor;
        descriptor.stop_position = stop_position;
        descriptor.stop_timestamp = stop_timestamp;
        self.update_entry(recording_id, entry.validity, &descriptor)
    }

    /// Iterate entries in ascending recording-id order.
    pub fn entries(
        &self,
    ) -> impl Iterator<Item = Result<CatalogEntry, CatalogError>> + '_ {
        (0..self.next_recording_id).filter_map(move |id| self.entry(id).transpose())
    }

    /// Number of recordings in the catalog.
    pub fn count(&self) -> i64 {
        self.next_recording_id
    }

    /// Capacity fixed at catalog creation.
    pub fn max_entries(&self) -> u32 {
        self.max_entries
    }

    /// Whether this catalog was opened read-only.
    pub fn is_read_only(&self) -> bool {
        matches!(self.mmap, CatalogMmap::Reader(_))
    }

    /// Path of the backing catalog file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and close, releasing the mapping and the advisory lock.
    pub fn close(self) -> Result<(), CatalogError> {
        if let CatalogMmap::Writer(mmap) = &self.mmap {
            mmap.flush()?;
        }
        Ok(())
    }

    fn write_slot(
        &mut self,
        recording_id: i64,
        validity: Validity,
        descriptor: &RecordingDescriptor,
    ) -> Result<(), CatalogError> {
        let entry_length = self.entry_length;
        let slot = self.slot_bytes_mut(recording_id)?;
        let body_capacity = entry_length - ENTRY_HEADER_LENGTH;

        let mut body = vec![0u8; body_capacity];
        let descriptor_length = descriptor.write(&mut body).map_err(|source| {
            CatalogError::CorruptEntry {
                recording_id,
                source,
            }
        })?;

        slot[..ENTRY_HEADER_LENGTH].fill(0);
        LittleEndian::write_u32(
            &mut slot[DESCRIPTOR_LENGTH_OFFSET..],
            descriptor_length as u32,
        );
        slot[VALIDITY_OFFSET] = validity.as_byte();
        slot[ENTRY_HEADER_LENGTH..].copy_from_slice(&body);

        let offset = self.slot_offset(recording_id);
        if let CatalogMmap::Writer(mmap) = &self.mmap {
            mmap.flush_range(offset, self.entry_length)?;
        }
        Ok(())
    }

    fn slot_offset(&self, recording_id: i64) -> usize {
        CATALOG_HEADER_LENGTH + recording_id as usize * self.entry_length
    }

    fn slot_bytes(&self, recording_id: i64) -> &[u8] {
        let offset = self.slot_offset(recording_id);
        let bytes = match &self.mmap {
            CatalogMmap::Writer(mmap) => &mmap[..],
            CatalogMmap::Reader(mmap) => &mmap[..],
        };
        &bytes[offset..offset + self.entry_length]
    }

    fn slot_bytes_mut(&mut self, recording_id: i64) -> Result<&mut [u8], CatalogError> {
        let offset = self.slot_offset(recording_id);
        let entry_length = self.entry_length;
        match &mut self.mmap {
            CatalogMmap::Writer(mmap) => Ok(&mut mmap[offset..offset + entry_length]),
            CatalogMmap::Reader(_) => Err(CatalogError::ReadOnly),
        }
    }
}

impl Drop for Catalog {
    fn drop(&mut self) {
        if let CatalogMmap::Writer(mmap) = &self.mmap {
            let _ = mmap.flush();
        }
        let _ = FileExt::unlock(&self.file);
        debug!("closed catalog at {}", self.path.display());
    }
}

fn validate_header(bytes: &[u8], file_length: u64) -> Result<(usize, u32), CatalogError> {
    if bytes.len() < CATALOG_HEADER_LENGTH {
        return Err(CatalogError::BadHeader {
            reason: format!("file of {} bytes is smaller than the header", bytes.len()),
        });
    }
    if bytes[..8] != CATALOG_MAGIC {
        return Err(CatalogError::BadHeader {
            reason: "magic bytes do not match".to_string(),
        });
    }
    let version = LittleEndian::read_u32(&bytes[VERSION_OFFSET..]);
    if version != CATALOG_VERSION {
        return Err(CatalogError::BadHeader {
            reason: format!("unsupported version {version}"),
        });
    }
    let entry_length = LittleEndian::read_u32(&bytes[ENTRY_LENGTH_OFFSET..]) as usize;
    let max_entries = LittleEndian::read_u32(&bytes[MAX_ENTRIES_OFFSET..]);
    if entry_length <= ENTRY_HEADER_LENGTH {
        return Err(CatalogError::BadHeader {
            reason: format!("entry length {entry_length} leaves no room for a descriptor"),
        });
    }
    let expected = CATALOG_HEADER_LENGTH as u64 + u64::from(max_entries) * entry_length as u64;
    if file_length != expected {
        return Err(CatalogError::BadHeader {
            reason: format!("file length {file_length} does not match expected {expected}"),
        });
    }
    Ok((entry_length, max_entries))
}

fn scan_next_recording_id(bytes: &[u8], entry_length: usize, max_entries: u32) -> i64 {
    for id in 0..i64::from(max_entries) {
        let offset = CATALOG_HEADER_LENGTH + id as usize * entry_length;
        let descriptor_length = LittleEndian::read_u32(&bytes[offset..]);
        if descriptor_length == 0 {
            return id;
        }
    }
    i64::from(max_entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use logvault_core::SystemEpochClock;
    use tempfile::TempDir;

    fn new_recording(stream_id: i32) -> NewRecording {
        NewRecording {
            start_position: 0,
            initial_term_id: 0,
            segment_file_length: 131072,
            term_buffer_length: 65536,
            mtu_length: 1408,
            session_id: 1,
            stream_id,
            stripped_channel: "udp://localhost:40456".to_string(),
            original_channel: "udp://localhost:40456|alias=vault".to_string(),
            source_identity: "localhost:12345".to_string(),
        }
    }

    fn open_writer(dir: &Path) -> Catalog {
        Catalog::open_writer(dir, 16, Arc::new(SystemEpochClock)).unwrap()
    }

    #[test]
    fn ids_are_assigned_in_ascending_order() {
        let dir = TempDir::new().unwrap();
        let mut catalog = open_writer(dir.path());

        assert_eq!(catalog.add_new_recording(new_recording(1)).unwrap(), 0);
        assert_eq!(catalog.add_new_recording(new_recording(2)).unwrap(), 1);
        assert_eq!(catalog.add_new_recording(new_recording(3)).unwrap(), 2);
        assert_eq!(catalog.count(), 3);
    }

    #[test]
    fn new_entries_start_open_and_valid() {
        let dir = TempDir::new().unwrap();
        let mut catalog = open_writer(dir.path());
        let id = catalog.add_new_recording(new_recording(5)).unwrap();

        let entry = catalog.entry(id).unwrap().unwrap();
        assert_eq!(entry.validity, Validity::Valid);
        assert_eq!(entry.descriptor.stop_position, NULL_POSITION);
        assert_eq!(entry.descriptor.stop_timestamp, NULL_TIMESTAMP);
        assert_eq!(entry.descriptor.stream_id, 5);
        assert!(entry.descriptor.start_timestamp > 0);
    }

    #[test]
    fn rejects_non_power_of_two_term_length() {
        let dir = TempDir::new().unwrap();
        let mut catalog = open_writer(dir.path());

        let mut bad = new_recording(1);
        bad.term_buffer_length = 65537;
        let err = catalog.add_new_recording(bad).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidRecordingParams { .. }));
    }

    #[test]
    fn rejects_segment_length_not_multiple_of_term() {
        let dir = TempDir::new().unwrap();
        let mut catalog = open_writer(dir.path());

        let mut bad = new_recording(1);
        bad.segment_file_length = 65536 + 1024;
        let err = catalog.add_new_recording(bad).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidRecordingParams { .. }));
    }

    #[test]
    fn unknown_id_reads_as_none_and_fails_update() {
        let dir = TempDir::new().unwrap();
        let mut catalog = open_writer(dir.path());
        let id = catalog.add_new_recording(new_recording(1)).unwrap();

        assert!(catalog.entry(99).unwrap().is_none());
        assert!(catalog.entry(-1).unwrap().is_none());

        let descriptor = catalog.entry(id).unwrap().unwrap().descriptor;
        let mut foreign = descriptor.clone();
        foreign.recording_id = 99;
        let err = catalog
            .update_entry(99, Validity::Valid, &foreign)
            .unwrap_err();
        assert!(matches!(err, CatalogError::UnknownRecording { .. }));
    }

    #[test]
    fn update_rewrites_slot_in_place() {
        let dir = TempDir::new().unwrap();
        let mut catalog = open_writer(dir.path());
        let id = catalog.add_new_recording(new_recording(1)).unwrap();

        let mut descriptor = catalog.entry(id).unwrap().unwrap().descriptor;
        descriptor.stop_position = 8192;
        descriptor.stop_timestamp = 777;
        catalog
            .update_entry(id, Validity::Invalid, &descriptor)
            .unwrap();

        let entry = catalog.entry(id).unwrap().unwrap();
        assert_eq!(entry.validity, Validity::Invalid);
        assert_eq!(entry.descriptor.stop_position, 8192);
        assert_eq!(entry.descriptor.stop_timestamp, 777);
    }

    #[test]
    fn catalog_full_fails_append() {
        let dir = TempDir::new().unwrap();
        let mut catalog =
            Catalog::open_writer(dir.path(), 2, Arc::new(SystemEpochClock)).unwrap();

        catalog.add_new_recording(new_recording(1)).unwrap();
        catalog.add_new_recording(new_recording(2)).unwrap();
        let err = catalog.add_new_recording(new_recording(3)).unwrap_err();
        assert!(matches!(err, CatalogError::Full { max_entries: 2 }));
    }

    #[test]
    fn entries_iterate_in_id_order() {
        let dir = TempDir::new().unwrap();
        let mut catalog = open_writer(dir.path());
        for stream_id in 1..=4 {
            catalog.add_new_recording(new_recording(stream_id)).unwrap();
        }

        let ids: Vec<i64> = catalog
            .entries()
            .map(|entry| entry.unwrap().descriptor.recording_id)
            .collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }
}
