//! Frame header codec
//!
//! Every message frame in a segment file starts with a fixed 32-byte binary
//! header. The layout is wire-identical to what the live write path produces,
//! so verification can re-parse writer output byte for byte:
//!
//! ```text
//! offset  field         type
//! 0       frame_length  i32
//! 4       version       u8
//! 5       flags         u8
//! 6       frame_type    u16
//! 8       term_offset   i32
//! 12      session_id    i32
//! 16      stream_id     i32
//! 20      term_id       i32
//! 24      reserved      u64
//! ```
//!
//! All fields are little-endian. A `frame_length` of zero at a given offset
//! means "no frame written here" and marks the end of valid data within the
//! current page; it is not an error.

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

/// Size of the frame header in bytes.
pub const FRAME_HEADER_LENGTH: usize = 32;

/// Alignment boundary every frame start must respect.
pub const FRAME_ALIGNMENT: usize = 32;

const FRAME_LENGTH_OFFSET: usize = 0;
const VERSION_OFFSET: usize = 4;
const FLAGS_OFFSET: usize = 5;
const TYPE_OFFSET: usize = 6;
const TERM_OFFSET_OFFSET: usize = 8;
const SESSION_ID_OFFSET: usize = 12;
const STREAM_ID_OFFSET: usize = 16;
const TERM_ID_OFFSET: usize = 20;
const RESERVED_OFFSET: usize = 24;

/// Errors raised while decoding a frame header from a byte region.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The byte region is too short to hold a full header.
    #[error("byte region of {available} bytes at offset {offset} cannot hold a {FRAME_HEADER_LENGTH}-byte frame header")]
    TruncatedHeader {
        /// Offset of the attempted read.
        offset: u64,
        /// Bytes available from that offset.
        available: usize,
    },

    /// The decoded frame length is negative.
    #[error("frame at offset {offset} has negative length {frame_length}")]
    NegativeLength {
        /// Offset of the frame within the segment.
        offset: u64,
        /// The decoded frame length.
        frame_length: i32,
    },

    /// The decoded frame length is non-zero but smaller than the header.
    #[error("frame at offset {offset} declares length {frame_length}, smaller than the {FRAME_HEADER_LENGTH}-byte header")]
    LengthBelowHeader {
        /// Offset of the frame within the segment.
        offset: u64,
        /// The decoded frame length.
        frame_length: i32,
    },

    /// The frame would read past the end of the segment file.
    #[error("frame at offset {offset} with length {frame_length} extends past segment length {segment_length}")]
    LengthBeyondSegment {
        /// Offset of the frame within the segment.
        offset: u64,
        /// The decoded frame length.
        frame_length: i32,
        /// Configured segment file length.
        segment_length: u64,
    },
}

/// Decoded view of one frame header.
///
/// A plain value struct: decode produces it, encode consumes it, and no
/// aliasing view into the source bytes survives the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameHeader {
    /// Total frame length in bytes, header included. Zero means unwritten.
    pub frame_length: i32,
    /// Protocol version byte.
    pub version: u8,
    /// Frame flags (begin/end fragment markers and friends).
    pub flags: u8,
    /// Frame type discriminator.
    pub frame_type: u16,
    /// Byte offset of the frame within its term.
    pub term_offset: i32,
    /// Session the frame belongs to.
    pub session_id: i32,
    /// Stream the frame belongs to.
    pub stream_id: i32,
    /// Term the frame belongs to.
    pub term_id: i32,
    /// Reserved trailer value.
    pub reserved: u64,
}

impl FrameHeader {
    /// Decode the header found at `offset` within `buf`.
    ///
    /// This is a pure field decode; use [`FrameHeader::validate`] to apply
    /// the frame-length sanity rules against a segment length.
    pub fn read(buf: &[u8], offset: usize) -> Result<FrameHeader, FrameError> {
        let available = buf.len().saturating_sub(offset);
        if available < FRAME_HEADER_LENGTH {
            return Err(FrameError::TruncatedHeader {
                offset: offset as u64,
                available,
            });
        }
        let b = &buf[offset..offset + FRAME_HEADER_LENGTH];

        Ok(FrameHeader {
            frame_length: LittleEndian::read_i32(&b[FRAME_LENGTH_OFFSET..]),
            version: b[VERSION_OFFSET],
            flags: b[FLAGS_OFFSET],
            frame_type: LittleEndian::read_u16(&b[TYPE_OFFSET..]),
            term_offset: LittleEndian::read_i32(&b[TERM_OFFSET_OFFSET..]),
            session_id: LittleEndian::read_i32(&b[SESSION_ID_OFFSET..]),
            stream_id: LittleEndian::read_i32(&b[STREAM_ID_OFFSET..]),
            term_id: LittleEndian::read_i32(&b[TERM_ID_OFFSET..]),
            reserved: LittleEndian::read_u64(&b[RESERVED_OFFSET..]),
        })
    }

    /// Encode this header at `offset` within `buf`. Inverse of [`read`].
    ///
    /// [`read`]: FrameHeader::read
    pub fn write(&self, buf: &mut [u8], offset: usize) -> Result<(), FrameError> {
        let available = buf.len().saturating_sub(offset);
        if available < FRAME_HEADER_LENGTH {
            return Err(FrameError::TruncatedHeader {
                offset: offset as u64,
                available,
            });
        }
        let b = &mut buf[offset..offset + FRAME_HEADER_LENGTH];

        LittleEndian::write_i32(&mut b[FRAME_LENGTH_OFFSET..], self.frame_length);
        b[VERSION_OFFSET] = self.version;
        b[FLAGS_OFFSET] = self.flags;
        LittleEndian::write_u16(&mut b[TYPE_OFFSET..], self.frame_type);
        LittleEndian::write_i32(&mut b[TERM_OFFSET_OFFSET..], self.term_offset);
        LittleEndian::write_i32(&mut b[SESSION_ID_OFFSET..], self.session_id);
        LittleEndian::write_i32(&mut b[STREAM_ID_OFFSET..], self.stream_id);
        LittleEndian::write_i32(&mut b[TERM_ID_OFFSET..], self.term_id);
        LittleEndian::write_u64(&mut b[RESERVED_OFFSET..], self.reserved);
        Ok(())
    }

    /// Check the decoded frame length against the segment bounds.
    ///
    /// `frame_offset` is the frame's byte offset within the segment file and
    /// `segment_length` the configured segment file length. A zero length is
    /// accepted (end of written data).
    pub fn validate(&self, frame_offset: u64, segment_length: u64) -> Result<(), FrameError> {
        if self.frame_length < 0 {
            return Err(FrameError::NegativeLength {
                offset: frame_offset,
                frame_length: self.frame_length,
            });
        }
        if self.frame_length == 0 {
            return Ok(());
        }
        if (self.frame_length as usize) < FRAME_HEADER_LENGTH {
            return Err(FrameError::LengthBelowHeader {
                offset: frame_offset,
                frame_length: self.frame_length,
            });
        }
        if frame_offset + align_frame_length(self.frame_length) > segment_length {
            return Err(FrameError::LengthBeyondSegment {
                offset: frame_offset,
                frame_length: self.frame_length,
                segment_length,
            });
        }
        Ok(())
    }

    /// Whether this header marks unwritten space.
    pub fn is_end_of_data(&self) -> bool {
        self.frame_length == 0
    }
}

/// Round a frame length up to the next [`FRAME_ALIGNMENT`] boundary.
///
/// Frame starts are always aligned, so this is the distance from one frame
/// to the next. Callers must have validated the length as non-negative.
pub fn align_frame_length(frame_length: i32) -> u64 {
    let alignment = FRAME_ALIGNMENT as u64;
    (frame_length as u64 + alignment - 1) & !(alignment - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> FrameHeader {
        FrameHeader {
            frame_length: 256,
            version: 1,
            flags: 0xC0,
            frame_type: 1,
            term_offset: 4096,
            session_id: 7,
            stream_id: 1001,
            term_id: 42,
            reserved: 0,
        }
    }

    #[test]
    fn read_is_inverse_of_write() {
        let header = sample_header();
        let mut buf = [0u8; FRAME_HEADER_LENGTH];
        header.write(&mut buf, 0).unwrap();

        let decoded = FrameHeader::read(&buf, 0).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn read_at_offset_within_larger_region() {
        let header = sample_header();
        let mut buf = [0u8; 128];
        header.write(&mut buf, 64).unwrap();

        let decoded = FrameHeader::read(&buf, 64).unwrap();
        assert_eq!(decoded.frame_length, 256);
        assert_eq!(decoded.stream_id, 1001);
    }

    #[test]
    fn zero_filled_region_decodes_as_end_of_data() {
        let buf = [0u8; FRAME_HEADER_LENGTH];
        let decoded = FrameHeader::read(&buf, 0).unwrap();
        assert!(decoded.is_end_of_data());
        assert!(decoded.validate(0, 1024).is_ok());
    }

    #[test]
    fn read_rejects_short_region() {
        let buf = [0u8; FRAME_HEADER_LENGTH - 1];
        let err = FrameHeader::read(&buf, 0).unwrap_err();
        assert!(matches!(err, FrameError::TruncatedHeader { .. }));
    }

    #[test]
    fn validate_rejects_negative_length() {
        let header = FrameHeader {
            frame_length: -1,
            ..Default::default()
        };
        let err = header.validate(0, 1024).unwrap_err();
        assert!(matches!(err, FrameError::NegativeLength { .. }));
    }

    #[test]
    fn validate_rejects_length_below_header() {
        let header = FrameHeader {
            frame_length: FRAME_HEADER_LENGTH as i32 - 1,
            ..Default::default()
        };
        let err = header.validate(0, 1024).unwrap_err();
        assert!(matches!(err, FrameError::LengthBelowHeader { .. }));
    }

    #[test]
    fn validate_rejects_length_past_segment_end() {
        let header = FrameHeader {
            frame_length: 512,
            ..Default::default()
        };
        let err = header.validate(1024 - 256, 1024).unwrap_err();
        assert!(matches!(err, FrameError::LengthBeyondSegment { .. }));
    }

    #[test]
    fn validate_accepts_frame_ending_exactly_at_segment_end() {
        let header = FrameHeader {
            frame_length: 256,
            ..Default::default()
        };
        assert!(header.validate(1024 - 256, 1024).is_ok());
    }

    #[test]
    fn align_frame_length_rounds_up() {
        assert_eq!(align_frame_length(0), 0);
        assert_eq!(align_frame_length(1), 32);
        assert_eq!(align_frame_length(32), 32);
        assert_eq!(align_frame_length(33), 64);
        assert_eq!(align_frame_length(100), 128);
        assert_eq!(align_frame_length(65636), 65664);
    }
}
