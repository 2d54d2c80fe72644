//! Segment file naming and layout
//!
//! A recording's byte stream is persisted across fixed-size segment files.
//! Each segment is addressed purely by `(recording_id, base_position)` and
//! named `"{recording_id}-{base_position}.rec"`; no external index is needed
//! to locate it. The parser here is the strict inverse of the namer: a name
//! that does not match the convention is a corruption indicator, never a
//! silent default.

use thiserror::Error;

/// Suffix carried by every segment file name.
pub const SEGMENT_SUFFIX: &str = ".rec";

/// Memory-page alignment used for crash-safe truncation decisions.
///
/// Segment files are memory-mapped in page-sized units by the live writer,
/// so a crash mid-page leaves deterministic zero fill below this boundary.
pub const PAGE_SIZE: u64 = 4096;

/// Errors raised while parsing a segment file name.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SegmentNameError {
    /// The name does not carry the expected `{recording_id}-` prefix.
    #[error("segment file name '{name}' does not belong to recording {recording_id}")]
    WrongRecording {
        /// The offending file name.
        name: String,
        /// Recording the name was parsed for.
        recording_id: i64,
    },

    /// The name does not end with the segment suffix.
    #[error("segment file name '{name}' does not end with '{SEGMENT_SUFFIX}'")]
    MissingSuffix {
        /// The offending file name.
        name: String,
    },

    /// The base position component is absent.
    #[error("segment file name '{name}' has no base position component")]
    MissingPosition {
        /// The offending file name.
        name: String,
    },

    /// The base position component is not a valid number.
    #[error("segment file name '{name}' has a non-numeric base position '{position}'")]
    InvalidPosition {
        /// The offending file name.
        name: String,
        /// The unparsable position component.
        position: String,
    },

    /// The base position parsed to a negative value.
    #[error("segment file name '{name}' has negative base position {base_position}")]
    NegativePosition {
        /// The offending file name.
        name: String,
        /// The parsed negative position.
        base_position: i64,
    },
}

/// Derive the segment file name for a recording at a given base position.
pub fn segment_file_name(recording_id: i64, base_position: i64) -> String {
    format!("{recording_id}-{base_position}{SEGMENT_SUFFIX}")
}

/// Parse the base position out of a segment file name.
///
/// Strict inverse of [`segment_file_name`] for the given recording: the
/// prefix, the position component, and the suffix must all be present and
/// well formed, and the position must be non-negative.
pub fn parse_segment_base_position(
    recording_id: i64,
    file_name: &str,
) -> Result<i64, SegmentNameError> {
    let prefix = format!("{recording_id}-");
    let Some(rest) = file_name.strip_prefix(&prefix) else {
        return Err(SegmentNameError::WrongRecording {
            name: file_name.to_string(),
            recording_id,
        });
    };
    let Some(position) = rest.strip_suffix(SEGMENT_SUFFIX) else {
        return Err(SegmentNameError::MissingSuffix {
            name: file_name.to_string(),
        });
    };
    if position.is_empty() {
        return Err(SegmentNameError::MissingPosition {
            name: file_name.to_string(),
        });
    }
    let base_position: i64 =
        position
            .parse()
            .map_err(|_| SegmentNameError::InvalidPosition {
                name: file_name.to_string(),
                position: position.to_string(),
            })?;
    if base_position < 0 {
        return Err(SegmentNameError::NegativePosition {
            name: file_name.to_string(),
            base_position,
        });
    }
    Ok(base_position)
}

/// Round an offset up to the next [`PAGE_SIZE`] boundary.
pub fn page_align_up(offset: u64) -> u64 {
    (offset + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn name_carries_both_identifiers() {
        assert_eq!(segment_file_name(0, 0), "0-0.rec");
        assert_eq!(segment_file_name(42, 131072), "42-131072.rec");
    }

    #[test]
    fn parse_accepts_well_formed_names() {
        assert_eq!(parse_segment_base_position(42, "42-131072.rec").unwrap(), 131072);
        assert_eq!(parse_segment_base_position(0, "0-0.rec").unwrap(), 0);
    }

    #[test]
    fn parse_rejects_missing_position() {
        let err = parse_segment_base_position(2, "2-.rec").unwrap_err();
        assert!(matches!(err, SegmentNameError::MissingPosition { .. }));
    }

    #[test]
    fn parse_rejects_non_numeric_position() {
        let err = parse_segment_base_position(3, "3-somewhere.rec").unwrap_err();
        assert!(matches!(err, SegmentNameError::InvalidPosition { .. }));
    }

    #[test]
    fn parse_rejects_negative_position() {
        let err = parse_segment_base_position(4, "4--111.rec").unwrap_err();
        assert!(matches!(err, SegmentNameError::NegativePosition { .. }));
    }

    #[test]
    fn parse_rejects_foreign_recording() {
        let err = parse_segment_base_position(5, "6-0.rec").unwrap_err();
        assert!(matches!(err, SegmentNameError::WrongRecording { .. }));
    }

    #[test]
    fn parse_rejects_missing_suffix() {
        let err = parse_segment_base_position(5, "5-128").unwrap_err();
        assert!(matches!(err, SegmentNameError::MissingSuffix { .. }));
    }

    #[test]
    fn page_align_up_is_identity_on_boundaries() {
        assert_eq!(page_align_up(0), 0);
        assert_eq!(page_align_up(PAGE_SIZE), PAGE_SIZE);
        assert_eq!(page_align_up(1), PAGE_SIZE);
        assert_eq!(page_align_up(PAGE_SIZE + 1), 2 * PAGE_SIZE);
    }

    proptest! {
        #[test]
        fn naming_round_trips(recording_id in 0i64..1_000_000, base_position in 0i64..i64::MAX / 2) {
            let name = segment_file_name(recording_id, base_position);
            prop_assert_eq!(
                parse_segment_base_position(recording_id, &name).unwrap(),
                base_position
            );
        }

        #[test]
        fn arbitrary_position_component_never_parses_silently(garbage in "[a-zA-Z_ ]{1,12}") {
            let name = format!("7-{garbage}.rec");
            prop_assert!(parse_segment_base_position(7, &name).is_err());
        }
    }
}
