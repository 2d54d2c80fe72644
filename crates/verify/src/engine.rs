//! Per-recording verification and repair
//!
//! Given one recording descriptor and the archive directory, the engine
//! establishes the true valid extent of the recorded stream:
//!
//! 1. Resolve the recording's segment files by name. Anything that cannot be
//!    resolved (missing file, unparsable name, directory, zero length) marks
//!    the recording invalid with its recorded positions kept — nothing could
//!    be inspected, so nothing is recomputed.
//! 2. Scan frames sequentially, checking stream identity and term sequencing
//!    against the descriptor. A mismatching or malformed frame marks the
//!    recording invalid and pins the stop position at the last validated
//!    offset.
//! 3. A zero frame length or the end of written bytes terminates the scan
//!    cleanly; the recomputed stop position and a fresh stop timestamp are
//!    written back when they differ from the recorded ones.
//!
//! The last scanned segment is additionally subject to the page-straddle
//! policy: a trailing frame whose bytes cross a page boundary may have been
//! only partially flushed by a crashed writer, so a caller-supplied predicate
//! decides whether to distrust it and truncate the file back to a page
//! boundary.

use logvault_catalog::{Catalog, CatalogError, RecordingDescriptor, Validity};
use logvault_core::frame::{align_frame_length, FrameError, FrameHeader, FRAME_HEADER_LENGTH};
use logvault_core::segment::{
    page_align_up, parse_segment_base_position, SegmentNameError, PAGE_SIZE, SEGMENT_SUFFIX,
};
use logvault_core::EpochClock;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Scope of a verification pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyOptions {
    /// Re-scan every segment file of the recording (full audit) instead of
    /// only the most recent one (fast path that trusts history).
    pub validate_all_segments: bool,
}

impl VerifyOptions {
    /// Fast path: scan only the most recent segment of each recording.
    pub fn last_segment_only() -> VerifyOptions {
        VerifyOptions {
            validate_all_segments: false,
        }
    }

    /// Full audit: re-scan every segment file, oldest to newest.
    pub fn full_audit() -> VerifyOptions {
        VerifyOptions {
            validate_all_segments: true,
        }
    }
}

impl Default for VerifyOptions {
    fn default() -> Self {
        VerifyOptions::last_segment_only()
    }
}

/// Why a recording was marked invalid.
///
/// Faults are per-recording outcomes recorded in the catalog, not process
/// failures: a batch pass reports them and moves on.
#[derive(Debug, Error)]
pub enum SegmentFault {
    /// The segment expected to hold the recorded stop position is absent.
    #[error("no segment file found for the recorded stop position")]
    Missing,

    /// A segment file name for this recording cannot be parsed.
    #[error("unparsable segment file name: {0}")]
    NameInvalid(#[from] SegmentNameError),

    /// The segment path is a directory, not a regular file.
    #[error("segment path {path} is not a regular file")]
    NotRegularFile {
        /// The offending path.
        path: PathBuf,
    },

    /// The segment file holds no bytes.
    #[error("segment file {path} is empty")]
    Empty {
        /// The offending path.
        path: PathBuf,
    },

    /// A frame's identity or sequencing diverges from the descriptor.
    #[error("frame at position {position} does not belong to this recording: {reason}")]
    FrameMismatch {
        /// Absolute stream position of the offending frame.
        position: i64,
        /// Which field diverged and how.
        reason: String,
    },

    /// A frame header is malformed.
    #[error("corrupt frame header: {0}")]
    CorruptFrame(#[from] FrameError),
}

/// Result of verifying one recording.
#[derive(Debug)]
pub struct RecordingOutcome {
    /// The recording that was verified.
    pub recording_id: i64,
    /// Validity written back to the catalog.
    pub validity: Validity,
    /// Stop position now stored in the catalog.
    pub stop_position: i64,
    /// The fault that invalidated the recording, when there was one.
    pub fault: Option<SegmentFault>,
}

impl RecordingOutcome {
    /// Whether the recording verified clean.
    pub fn is_valid(&self) -> bool {
        self.validity.is_valid()
    }
}

impl fmt::Display for RecordingOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.fault {
            None => write!(
                f,
                "recording {}: valid, stop position {}",
                self.recording_id, self.stop_position
            ),
            Some(fault) => write!(
                f,
                "recording {}: invalid, stop position {} ({fault})",
                self.recording_id, self.stop_position
            ),
        }
    }
}

/// Errors that abort a verification request outright.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// The requested recording has no catalog entry.
    #[error("recording {recording_id} is not in the catalog")]
    RecordingNotFound {
        /// The unmatched recording id.
        recording_id: i64,
    },

    /// The catalog rejected a read or write.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Archive directory or segment file I/O failed.
    #[error("archive I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Verify one recording and rewrite its catalog entry.
///
/// `truncate_on_page_straddle` is consulted once per file whose trailing
/// frame straddles a page boundary; returning `true` truncates the file back
/// to the frame's start and zero-fills up to the next page boundary, while
/// `false` leaves the bytes untouched and trusts the declared frame.
///
/// Fails with [`VerifyError::RecordingNotFound`] for an unknown id; every
/// on-disk inconsistency is reported through the returned
/// [`RecordingOutcome`] instead.
pub fn verify_recording(
    catalog: &mut Catalog,
    archive_dir: &Path,
    recording_id: i64,
    options: &VerifyOptions,
    clock: &dyn EpochClock,
    truncate_on_page_straddle: &mut dyn FnMut(&Path) -> bool,
) -> Result<RecordingOutcome, VerifyError> {
    let entry = catalog
        .entry(recording_id)?
        .ok_or(VerifyError::RecordingNotFound { recording_id })?;
    let mut descriptor = entry.descriptor;

    let inspection = inspect_recording(
        archive_dir,
        &descriptor,
        options,
        truncate_on_page_straddle,
    )?;

    let (validity, fault) = match inspection {
        Inspection::Intact { computed_stop } => {
            if computed_stop != descriptor.stop_position {
                descriptor.stop_position = computed_stop;
                descriptor.stop_timestamp = clock.time_millis();
            }
            (Validity::Valid, None)
        }
        Inspection::Damaged {
            fault,
            computed_stop,
        } => {
            // Scan faults pin the stop at the last validated offset;
            // resolution faults inspected nothing and keep the recorded one.
            if let Some(stop) = computed_stop {
                if stop != descriptor.stop_position {
                    descriptor.stop_position = stop;
                    descriptor.stop_timestamp = clock.time_millis();
                }
            }
            (Validity::Invalid, Some(fault))
        }
    };

    catalog.update_entry(recording_id, validity, &descriptor)?;
    Ok(RecordingOutcome {
        recording_id,
        validity,
        stop_position: descriptor.stop_position,
        fault,
    })
}

enum Inspection {
    Intact {
        computed_stop: i64,
    },
    Damaged {
        fault: SegmentFault,
        computed_stop: Option<i64>,
    },
}

struct SegmentFile {
    base_position: i64,
    path: PathBuf,
}

fn inspect_recording(
    archive_dir: &Path,
    descriptor: &RecordingDescriptor,
    options: &VerifyOptions,
    truncate_on_page_straddle: &mut dyn FnMut(&Path) -> bool,
) -> Result<Inspection, VerifyError> {
    let segments = match list_segment_files(archive_dir, descriptor.recording_id)? {
        Ok(segments) => segments,
        Err(fault) => {
            return Ok(Inspection::Damaged {
                fault,
                computed_stop: None,
            })
        }
    };

    if segments.is_empty() {
        // A recording that never reached disk is empty, and an empty
        // recording is valid by definition. A recording with a recorded
        // extent but no bytes to back it is not.
        if descriptor.stop_position == logvault_core::NULL_POSITION
            || descriptor.stop_position == descriptor.start_position
        {
            return Ok(Inspection::Intact {
                computed_stop: descriptor.start_position,
            });
        }
        return Ok(Inspection::Damaged {
            fault: SegmentFault::Missing,
            computed_stop: None,
        });
    }

    if descriptor.start_position == descriptor.stop_position && segments.len() == 1 {
        let metadata = fs::metadata(&segments[0].path)?;
        if metadata.is_file() && metadata.len() == 0 {
            return Ok(Inspection::Intact {
                computed_stop: descriptor.stop_position,
            });
        }
    }

    let to_scan: Vec<&SegmentFile> = if options.validate_all_segments {
        segments.iter().collect()
    } else {
        segments.iter().rev().take(1).collect()
    };

    let mut computed_stop = descriptor.start_position;
    let segment_count = to_scan.len();
    for (index, segment) in to_scan.into_iter().enumerate() {
        let is_tail_segment = index + 1 == segment_count;

        let metadata = fs::metadata(&segment.path)?;
        if !metadata.is_file() {
            return Ok(Inspection::Damaged {
                fault: SegmentFault::NotRegularFile {
                    path: segment.path.clone(),
                },
                computed_stop: None,
            });
        }
        if metadata.len() == 0 {
            return Ok(Inspection::Damaged {
                fault: SegmentFault::Empty {
                    path: segment.path.clone(),
                },
                computed_stop: None,
            });
        }

        match scan_segment_frames(segment, descriptor)? {
            Scan::Fault {
                fault,
                last_valid_offset,
            } => {
                return Ok(Inspection::Damaged {
                    fault,
                    computed_stop: Some(segment.base_position + last_valid_offset as i64),
                });
            }
            Scan::EndOfData {
                last_frame_start,
                end_offset,
            } => {
                let stop_offset = if is_tail_segment {
                    resolve_page_straddle(
                        &segment.path,
                        last_frame_start,
                        end_offset,
                        truncate_on_page_straddle,
                    )?
                } else {
                    end_offset
                };
                computed_stop = segment.base_position + stop_offset as i64;
            }
        }
    }

    Ok(Inspection::Intact { computed_stop })
}

/// Collect and order the recording's segment files.
///
/// A single malformed name poisons the whole listing: the recording's
/// on-disk layout can no longer be trusted.
fn list_segment_files(
    archive_dir: &Path,
    recording_id: i64,
) -> Result<Result<Vec<SegmentFile>, SegmentFault>, VerifyError> {
    let prefix = format!("{recording_id}-");
    let mut segments = Vec::new();

    for dir_entry in fs::read_dir(archive_dir)? {
        let dir_entry = dir_entry?;
        let file_name = dir_entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        if !name.starts_with(&prefix) || !name.ends_with(SEGMENT_SUFFIX) {
            continue;
        }
        match parse_segment_base_position(recording_id, name) {
            Ok(base_position) => segments.push(SegmentFile {
                base_position,
                path: dir_entry.path(),
            }),
            Err(error) => return Ok(Err(SegmentFault::NameInvalid(error))),
        }
    }

    segments.sort_by_key(|segment| segment.base_position);
    Ok(Ok(segments))
}

enum Scan {
    /// The scan hit a zero frame or the end of written bytes.
    EndOfData {
        last_frame_start: u64,
        end_offset: u64,
    },
    /// The scan stopped at a frame that cannot be trusted.
    Fault {
        fault: SegmentFault,
        last_valid_offset: u64,
    },
}

fn scan_segment_frames(
    segment: &SegmentFile,
    descriptor: &RecordingDescriptor,
) -> Result<Scan, VerifyError> {
    let mut file = File::open(&segment.path)?;
    let file_length = file.metadata()?.len();
    let segment_length = descriptor.segment_file_length as u64;
    let readable = file_length.min(segment_length);

    let mut header_buf = [0u8; FRAME_HEADER_LENGTH];
    let mut offset: u64 = 0;
    let mut last_frame_start: u64 = 0;

    loop {
        if offset + FRAME_HEADER_LENGTH as u64 > readable {
            break;
        }
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut header_buf)?;

        let header = match FrameHeader::read(&header_buf, 0) {
            Ok(header) => header,
            Err(error) => {
                return Ok(Scan::Fault {
                    fault: SegmentFault::CorruptFrame(error),
                    last_valid_offset: offset,
                })
            }
        };
        if header.is_end_of_data() {
            break;
        }
        if let Err(error) = header.validate(offset, segment_length) {
            return Ok(Scan::Fault {
                fault: SegmentFault::CorruptFrame(error),
                last_valid_offset: offset,
            });
        }

        let position = segment.base_position + offset as i64;
        if let Some(fault) = check_frame_identity(&header, descriptor, position) {
            return Ok(Scan::Fault {
                fault,
                last_valid_offset: offset,
            });
        }

        last_frame_start = offset;
        offset += align_frame_length(header.frame_length);
    }

    Ok(Scan::EndOfData {
        last_frame_start,
        end_offset: offset,
    })
}

/// Check one frame's identity against the descriptor.
///
/// The expected term sequence is derived from the recording's initial term
/// id and the absolute stream position: every `term_buffer_length` bytes
/// advance the term id by one, and the term offset is the position within
/// the current term.
fn check_frame_identity(
    header: &FrameHeader,
    descriptor: &RecordingDescriptor,
    position: i64,
) -> Option<SegmentFault> {
    if header.stream_id != descriptor.stream_id {
        return Some(SegmentFault::FrameMismatch {
            position,
            reason: format!(
                "stream id {} does not match descriptor stream id {}",
                header.stream_id, descriptor.stream_id
            ),
        });
    }

    let term_length = i64::from(descriptor.term_buffer_length);
    let expected_term_id = descriptor
        .initial_term_id
        .wrapping_add((position / term_length) as i32);
    if header.term_id != expected_term_id {
        return Some(SegmentFault::FrameMismatch {
            position,
            reason: format!(
                "term id {} is out of sequence, expected {expected_term_id}",
                header.term_id
            ),
        });
    }

    let expected_term_offset = (position & (term_length - 1)) as i32;
    if header.term_offset != expected_term_offset {
        return Some(SegmentFault::FrameMismatch {
            position,
            reason: format!(
                "term offset {} does not match stream position, expected {expected_term_offset}",
                header.term_offset
            ),
        });
    }

    None
}

/// Apply the page-straddle policy to a cleanly scanned tail segment.
///
/// A trailing frame whose first and last bytes live on different pages may
/// have been only partially flushed by a crashed writer. When the caller's
/// predicate confirms, the frame is distrusted: the file is cut back to the
/// frame's start and zero-filled up to the next page boundary. Otherwise the
/// declared frame is trusted and counted; only the on-disk file length
/// distinguishes the two paths afterwards.
fn resolve_page_straddle(
    path: &Path,
    last_frame_start: u64,
    end_offset: u64,
    truncate_on_page_straddle: &mut dyn FnMut(&Path) -> bool,
) -> Result<u64, VerifyError> {
    if end_offset == 0 {
        return Ok(0);
    }
    let first_page = last_frame_start / PAGE_SIZE;
    let last_page = (end_offset - 1) / PAGE_SIZE;
    if first_page == last_page || !truncate_on_page_straddle(path) {
        return Ok(end_offset);
    }

    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(last_frame_start)?;
    file.set_len(page_align_up(last_frame_start))?;
    file.sync_all()?;
    debug!(
        "truncated {} to page boundary {} after straddling frame at {last_frame_start}",
        path.display(),
        page_align_up(last_frame_start)
    );
    Ok(last_frame_start)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor_for_checks() -> RecordingDescriptor {
        RecordingDescriptor {
            recording_id: 0,
            start_timestamp: 0,
            stop_timestamp: -1,
            start_position: 0,
            stop_position: -1,
            initial_term_id: 5,
            segment_file_length: 131072,
            term_buffer_length: 65536,
            mtu_length: 1408,
            session_id: 1,
            stream_id: 3,
            stripped_channel: String::new(),
            original_channel: String::new(),
            source_identity: String::new(),
        }
    }

    fn frame(stream_id: i32, term_id: i32, term_offset: i32) -> FrameHeader {
        FrameHeader {
            frame_length: 64,
            stream_id,
            term_id,
            term_offset,
            ..Default::default()
        }
    }

    #[test]
    fn frame_matching_descriptor_passes() {
        let descriptor = descriptor_for_checks();
        assert!(check_frame_identity(&frame(3, 5, 0), &descriptor, 0).is_none());
        // One term length into the stream: next term, offset wraps to zero.
        assert!(check_frame_identity(&frame(3, 6, 0), &descriptor, 65536).is_none());
        assert!(check_frame_identity(&frame(3, 7, 128), &descriptor, 131072 + 128).is_none());
    }

    #[test]
    fn wrong_stream_id_is_a_mismatch() {
        let descriptor = descriptor_for_checks();
        let fault = check_frame_identity(&frame(99, 5, 0), &descriptor, 0).unwrap();
        assert!(matches!(fault, SegmentFault::FrameMismatch { position: 0, .. }));
    }

    #[test]
    fn wrong_term_id_is_a_mismatch() {
        let descriptor = descriptor_for_checks();
        let fault = check_frame_identity(&frame(3, 9, 0), &descriptor, 0).unwrap();
        assert!(matches!(fault, SegmentFault::FrameMismatch { .. }));
    }

    #[test]
    fn wrong_term_offset_is_a_mismatch() {
        let descriptor = descriptor_for_checks();
        let fault = check_frame_identity(&frame(3, 5, 4096), &descriptor, 0).unwrap();
        assert!(matches!(fault, SegmentFault::FrameMismatch { .. }));
    }

    #[test]
    fn term_id_wraps_with_position() {
        let mut descriptor = descriptor_for_checks();
        descriptor.initial_term_id = i32::MAX;
        // One full term past the start wraps the term id around.
        assert!(check_frame_identity(&frame(3, i32::MIN, 0), &descriptor, 65536).is_none());
    }
}
