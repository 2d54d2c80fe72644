//! Recording descriptor and its slot codec
//!
//! One descriptor captures everything the archive knows about a recording:
//! position bounds, timestamps, term geometry, session/stream identity, and
//! channel metadata. Descriptors are persisted in fixed-size catalog slots;
//! the codec here writes the slot *body* (the validity flag lives in the slot
//! header, owned by the store).
//!
//! Slot body layout, little-endian:
//!
//! ```text
//! offset  field                type
//! 0       recording_id         i64
//! 8       start_timestamp      i64
//! 16      stop_timestamp       i64
//! 24      start_position       i64
//! 32      stop_position        i64
//! 40      initial_term_id      i32
//! 44      segment_file_length  i32
//! 48      term_buffer_length   i32
//! 52      mtu_length           i32
//! 56      session_id           i32
//! 60      stream_id            i32
//! 64      stripped_channel     u32 length + UTF-8 bytes
//! ..      original_channel     u32 length + UTF-8 bytes
//! ..      source_identity      u32 length + UTF-8 bytes
//! ```

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

/// Length of the fixed-field prefix of a descriptor body.
pub const DESCRIPTOR_FIXED_LENGTH: usize = 64;

const RECORDING_ID_OFFSET: usize = 0;
const START_TIMESTAMP_OFFSET: usize = 8;
const STOP_TIMESTAMP_OFFSET: usize = 16;
const START_POSITION_OFFSET: usize = 24;
const STOP_POSITION_OFFSET: usize = 32;
const INITIAL_TERM_ID_OFFSET: usize = 40;
const SEGMENT_FILE_LENGTH_OFFSET: usize = 44;
const TERM_BUFFER_LENGTH_OFFSET: usize = 48;
const MTU_LENGTH_OFFSET: usize = 52;
const SESSION_ID_OFFSET: usize = 56;
const STREAM_ID_OFFSET: usize = 60;

/// Errors raised by the descriptor slot codec.
#[derive(Debug, Error)]
pub enum DescriptorError {
    /// The encoded descriptor does not fit the slot body.
    #[error("descriptor needs {required} bytes but the slot body holds {available}")]
    TooLarge {
        /// Bytes the descriptor would occupy.
        required: usize,
        /// Bytes available in the slot body.
        available: usize,
    },

    /// The slot body ended before the descriptor did.
    #[error("descriptor body truncated while reading {field}")]
    Truncated {
        /// Field that ran past the end of the body.
        field: &'static str,
    },

    /// A string field held bytes that are not valid UTF-8.
    #[error("descriptor string field {field} is not valid UTF-8")]
    BadUtf8 {
        /// The offending field.
        field: &'static str,
    },

    /// The validity byte in the slot header is neither valid nor invalid.
    #[error("unrecognized validity marker {value:#04x}")]
    BadValidity {
        /// The unrecognized byte.
        value: u8,
    },
}

/// Whether a catalog entry's on-disk segment content is trusted.
///
/// An [`Invalid`](Validity::Invalid) descriptor's position fields reflect the
/// best-known partial truth, not a guarantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    /// Segment content diverged from the descriptor.
    Invalid,
    /// Segment content is consistent with the descriptor.
    Valid,
}

impl Validity {
    /// Decode the slot-header marker byte.
    pub fn from_byte(value: u8) -> Result<Validity, DescriptorError> {
        match value {
            0 => Ok(Validity::Invalid),
            1 => Ok(Validity::Valid),
            _ => Err(DescriptorError::BadValidity { value }),
        }
    }

    /// Encode as the slot-header marker byte.
    pub fn as_byte(self) -> u8 {
        match self {
            Validity::Invalid => 0,
            Validity::Valid => 1,
        }
    }

    /// Whether this marks a trusted entry.
    pub fn is_valid(self) -> bool {
        matches!(self, Validity::Valid)
    }
}

/// Full metadata record for one recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingDescriptor {
    /// Monotonically assigned identifier, stable for the descriptor's life.
    pub recording_id: i64,
    /// When the recording started, epoch millis.
    pub start_timestamp: i64,
    /// When the recording stopped, epoch millis, or `NULL_TIMESTAMP`.
    pub stop_timestamp: i64,
    /// Stream byte offset where the recording begins.
    pub start_position: i64,
    /// Stream byte offset where the recording ends, or `NULL_POSITION`
    /// while still open.
    pub stop_position: i64,
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

impl RecordingDescriptor {
    /// Bytes this descriptor occupies when encoded.
    pub fn encoded_length(&self) -> usize {
        DESCRIPTOR_FIXED_LENGTH
            + 4
            + self.stripped_channel.len()
            + 4
            + self.original_channel.len()
            + 4
            + self.source_identity.len()
    }

    /// Encode into a slot body, returning the encoded length.
    pub fn write(&self, body: &mut [u8]) -> Result<usize, DescriptorError> {
        let required = self.encoded_length();
        if required > body.len() {
            return Err(DescriptorError::TooLarge {
                required,
                available: body.len(),
            });
        }

        LittleEndian::write_i64(&mut body[RECORDING_ID_OFFSET..], self.recording_id);
        LittleEndian::write_i64(&mut body[START_TIMESTAMP_OFFSET..], self.start_timestamp);
        LittleEndian::write_i64(&mut body[STOP_TIMESTAMP_OFFSET..], self.stop_timestamp);
        LittleEndian::write_i64(&mut body[START_POSITION_OFFSET..], self.start_position);
        LittleEndian::write_i64(&mut body[STOP_POSITION_OFFSET..], self.stop_position);
        LittleEndian::write_i32(&mut body[INITIAL_TERM_ID_OFFSET..], self.initial_term_id);
        LittleEndian::write_i32(
            &mut body[SEGMENT_FILE_LENGTH_OFFSET..],
            self.segment_file_length,
        );
        LittleEndian::write_i32(
            &mut body[TERM_BUFFER_LENGTH_OFFSET..],
            self.term_buffer_length,
        );
        LittleEndian::write_i32(&mut body[MTU_LENGTH_OFFSET..], self.mtu_length);
        LittleEndian::write_i32(&mut body[SESSION_ID_OFFSET..], self.session_id);
        LittleEndian::write_i32(&mut body[STREAM_ID_OFFSET..], self.stream_id);

        let mut offset = DESCRIPTOR_FIXED_LENGTH;
        offset = write_string(body, offset, &self.stripped_channel);
        offset = write_string(body, offset, &self.original_channel);
        offset = write_string(body, offset, &self.source_identity);
        debug_assert_eq!(offset, required);

        Ok(required)
    }

    /// Decode from a slot body.
    pub fn read(body: &[u8]) -> Result<RecordingDescriptor, DescriptorError> {
        if body.len() < DESCRIPTOR_FIXED_LENGTH {
            return Err(DescriptorError::Truncated {
                field: "fixed fields",
            });
        }

        let mut offset = DESCRIPTOR_FIXED_LENGTH;
        let (stripped_channel, next) = read_string(body, offset, "stripped_channel")?;
        offset = next;
        let (original_channel, next) = read_string(body, offset, "original_channel")?;
        offset = next;
        let (source_identity, _) = read_string(body, offset, "source_identity")?;

        Ok(RecordingDescriptor {
            recording_id: LittleEndian::read_i64(&body[RECORDING_ID_OFFSET..]),
            start_timestamp: LittleEndian::read_i64(&body[START_TIMESTAMP_OFFSET..]),
            stop_timestamp: LittleEndian::read_i64(&body[STOP_TIMESTAMP_OFFSET..]),
            start_position: LittleEndian::read_i64(&body[START_POSITION_OFFSET..]),
            stop_position: LittleEndian::read_i64(&body[STOP_POSITION_OFFSET..]),
            initial_term_id: LittleEndian::read_i32(&body[INITIAL_TERM_ID_OFFSET..]),
            segment_file_length: LittleEndian::read_i32(&body[SEGMENT_FILE_LENGTH_OFFSET..]),
            term_buffer_length: LittleEndian::read_i32(&body[TERM_BUFFER_LENGTH_OFFSET..]),
            mtu_length: LittleEndian::read_i32(&body[MTU_LENGTH_OFFSET..]),
            session_id: LittleEndian::read_i32(&body[SESSION_ID_OFFSET..]),
            stream_id: LittleEndian::read_i32(&body[STREAM_ID_OFFSET..]),
            stripped_channel,
            original_channel,
            source_identity,
        })
    }
}

fn write_string(body: &mut [u8], offset: usize, value: &str) -> usize {
    LittleEndian::write_u32(&mut body[offset..], value.len() as u32);
    let start = offset + 4;
    body[start..start + value.len()].copy_from_slice(value.as_bytes());
    start + value.len()
}

fn read_string(
    body: &[u8],
    offset: usize,
    field: &'static str,
) -> Result<(String, usize), DescriptorError> {
    if body.len() < offset + 4 {
        return Err(DescriptorError::Truncated { field });
    }
    let len = LittleEndian::read_u32(&body[offset..]) as usize;
    let start = offset + 4;
    if body.len() < start + len {
        return Err(DescriptorError::Truncated { field });
    }
    let value = String::from_utf8(body[start..start + len].to_vec())
        .map_err(|_| DescriptorError::BadUtf8 { field })?;
    Ok((value, start + len))
}
