//! Window enumeration and re-entry decisions.
//!
//! The scheduler partitions the configured time range into contiguous,
//! non-overlapping, chronological windows and decides per (window, stage)
//! whether prior output can be reused.

use std::path::Path;

use chrono::{NaiveDateTime, TimeDelta};
use sl_common::{Error, Result, Window};
use sl_config::RunConfig;
use tracing::debug;

/// Enumerate half-open windows `[t, t + granularity)` covering
/// `[start, end)`.
///
/// Only full windows are emitted: a trailing span shorter than the
/// granularity is dropped, so a range shorter than one granularity unit
/// yields no windows at all. This truncation is deliberate policy, not an
/// off-by-one.
pub fn enumerate_windows(
    start: NaiveDateTime,
    end: NaiveDateTime,
    granularity: TimeDelta,
) -> Result<Vec<Window>> {
    if granularity <= TimeDelta::zero() {
        return Err(Error::InvalidTimeRange(format!(
            "granularity must be positive, got {granularity}"
        )));
    }
    if start >= end {
        return Err(Error::InvalidTimeRange(format!(
            "window range start {start} must precede end {end}"
        )));
    }

    let mut windows = Vec::new();
    let mut t = start;
    while t + granularity <= end {
        windows.push(Window::new(t, t + granularity));
        t += granularity;
    }
    Ok(windows)
}

/// Enumerate the run's windows from its configuration.
pub fn run_windows(config: &RunConfig) -> Result<Vec<Window>> {
    enumerate_windows(
        config.start_time,
        config.end_time,
        TimeDelta::days(config.window_days),
    )
}

/// Re-entry decision for one stage output.
///
/// True when the stage must (re)compute: either a rebuild is forced or the
/// expected output artifact does not exist yet. False means skip and reuse.
pub fn should_run(artifact: &Path, force: bool) -> bool {
    if force {
        return true;
    }
    let exists = artifact.exists();
    if exists {
        debug!(artifact = %artifact.display(), "output exists, skipping stage");
    }
    !exists
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_three_day_range_yields_three_windows() {
        let windows =
            enumerate_windows(day(2024, 1, 1), day(2024, 1, 4), TimeDelta::days(1)).unwrap();
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].id(), "20240101_20240102");
        assert_eq!(windows[1].id(), "20240102_20240103");
        assert_eq!(windows[2].id(), "20240103_20240104");
    }

    #[test]
    fn test_windows_are_contiguous_and_chronological() {
        let windows =
            enumerate_windows(day(2024, 2, 26), day(2024, 3, 3), TimeDelta::days(1)).unwrap();
        for pair in windows.windows(2) {
            assert_eq!(pair[0].end, pair[1].start, "gap-free");
            assert!(pair[0].start < pair[1].start);
        }
    }

    #[test]
    fn test_trailing_partial_window_dropped() {
        let start = day(2024, 1, 1);
        let end = start + TimeDelta::days(2) + TimeDelta::hours(12);
        let windows = enumerate_windows(start, end, TimeDelta::days(1)).unwrap();
        assert_eq!(windows.len(), 2);
    }

    #[test]
    fn test_sub_granularity_range_yields_zero_windows() {
        let start = day(2024, 1, 1);
        let end = start + TimeDelta::hours(6);
        let windows = enumerate_windows(start, end, TimeDelta::days(1)).unwrap();
        assert!(windows.is_empty());
    }

    #[test]
    fn test_reversed_range_is_an_error() {
        let err =
            enumerate_windows(day(2024, 1, 4), day(2024, 1, 1), TimeDelta::days(1)).unwrap_err();
        assert_eq!(err.code(), 11);
    }

    #[test]
    fn test_should_run_semantics() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.csv");
        assert!(should_run(&missing, false));

        let present = dir.path().join("present.csv");
        std::fs::write(&present, "x").unwrap();
        assert!(!should_run(&present, false));
        assert!(should_run(&present, true), "force overrides existence");
    }
}
