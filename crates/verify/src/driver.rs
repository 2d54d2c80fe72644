//! Batch verification driver
//!
//! Thin orchestration over the engine: iterate the catalog in ascending
//! recording-id order, verify each recording, emit one outcome line per
//! recording, and aggregate a report. Segment-level faults are recovered
//! locally — the driver always moves on to the next recording — while
//! catalog and I/O failures abort the pass.
//!
//! Exit-status semantics belong to the external tool layer; it can consult
//! [`VerifyReport::invalid_count`] for them.

use crate::engine::{verify_recording, RecordingOutcome, VerifyError, VerifyOptions};
use logvault_catalog::Catalog;
use logvault_core::EpochClock;
use std::path::Path;
use tracing::{info, warn};

/// Aggregated result of a batch verification pass.
#[derive(Debug, Default)]
pub struct VerifyReport {
    /// Per-recording outcomes in ascending recording-id order.
    pub outcomes: Vec<RecordingOutcome>,
}

impl VerifyReport {
    /// Recordings that verified clean.
    pub fn valid_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_valid()).count()
    }

    /// Recordings marked invalid.
    pub fn invalid_count(&self) -> usize {
        self.outcomes.len() - self.valid_count()
    }

    /// Whether every recording verified clean.
    pub fn is_fully_valid(&self) -> bool {
        self.invalid_count() == 0
    }

    /// Human-readable one-line summary.
    pub fn summary(&self) -> String {
        format!(
            "verification complete: {} recordings, {} valid, {} invalid",
            self.outcomes.len(),
            self.valid_count(),
            self.invalid_count()
        )
    }
}

/// Verify every recording in the catalog.
///
/// Applies the engine to each entry in ascending recording-id order with the
/// given scan scope and truncation predicate, logging one outcome line per
/// recording. Per-recording faults are captured in the report; only catalog
/// and I/O failures abort the pass.
pub fn verify_all(
    catalog: &mut Catalog,
    archive_dir: &Path,
    options: &VerifyOptions,
    clock: &dyn EpochClock,
    truncate_on_page_straddle: &mut dyn FnMut(&Path) -> bool,
) -> Result<VerifyReport, VerifyError> {
    let mut report = VerifyReport::default();

    for recording_id in 0..catalog.count() {
        let outcome = match verify_recording(
            catalog,
            archive_dir,
            recording_id,
            options,
            clock,
            truncate_on_page_straddle,
        ) {
            Ok(outcome) => outcome,
            // A gap in the id space is not a verification failure.
            Err(VerifyError::RecordingNotFound { .. }) => continue,
            Err(error) => return Err(error),
        };
        log_outcome(&outcome);
        report.outcomes.push(outcome);
    }

    info!("{}", report.summary());
    Ok(report)
}

/// Verify a single recording by id.
///
/// Fails with [`VerifyError::RecordingNotFound`] when the id has no catalog
/// entry.
pub fn verify_one(
    catalog: &mut Catalog,
    archive_dir: &Path,
    recording_id: i64,
    options: &VerifyOptions,
    clock: &dyn EpochClock,
    truncate_on_page_straddle: &mut dyn FnMut(&Path) -> bool,
) -> Result<RecordingOutcome, VerifyError> {
    let outcome = verify_recording(
        catalog,
        archive_dir,
        recording_id,
        options,
        clock,
        truncate_on_page_straddle,
    )?;
    log_outcome(&outcome);
    Ok(outcome)
}

fn log_outcome(outcome: &RecordingOutcome) {
    if outcome.is_valid() {
        info!("{outcome}");
    } else {
        warn!("{outcome}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logvault_catalog::Validity;

    fn outcome(recording_id: i64, validity: Validity) -> RecordingOutcome {
        RecordingOutcome {
            recording_id,
            validity,
            stop_position: 0,
            fault: None,
        }
    }

    #[test]
    fn report_counts_split_by_validity() {
        let report = VerifyReport {
            outcomes: vec![
                outcome(0, Validity::Valid),
                outcome(1, Validity::Invalid),
                outcome(2, Validity::Valid),
            ],
        };

        assert_eq!(report.valid_count(), 2);
        assert_eq!(report.invalid_count(), 1);
        assert!(!report.is_fully_valid());
    }

    #[test]
    fn report_summary_names_all_counts() {
        let report = VerifyReport {
            outcomes: vec![outcome(0, Validity::Valid), outcome(1, Validity::Invalid)],
        };

        let summary = report.summary();
        assert!(summary.contains("2 recordings"));
        assert!(summary.contains("1 valid"));
        assert!(summary.contains("1 invalid"));
    }

    #[test]
    fn empty_report_is_fully_valid() {
        let report = VerifyReport::default();
        assert!(report.is_fully_valid());
        assert_eq!(report.valid_count(), 0);
    }
}
