//! Epoch clock seam
//!
//! All archive timestamps flow through [`EpochClock`] so that verification
//! runs are deterministic under test and the wall clock stays a swappable
//! collaborator.

use std::time::{SystemTime, UNIX_EPOCH};

/// Source of epoch-relative timestamps in milliseconds.
pub trait EpochClock {
    /// Current time as milliseconds since the Unix epoch.
    fn time_millis(&self) -> i64;
}

/// Wall-clock implementation backed by [`SystemTime`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEpochClock;

impl EpochClock for SystemEpochClock {
    fn time_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_past_2020() {
        let clock = SystemEpochClock;
        assert!(clock.time_millis() > 1_577_836_800_000);
    }
}
