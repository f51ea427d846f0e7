//! Processing windows.
//!
//! A window is a half-open time span `[start, end)`. The window id names
//! every per-window artifact deterministically, so a re-entrant run can
//! discover prior output without any side channel.

use std::fmt;

use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};

/// Half-open processing window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Window {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Window {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        debug_assert!(start < end, "window start must precede end");
        Window { start, end }
    }

    /// Deterministic artifact key: `{start:%Y%m%d}_{end:%Y%m%d}`.
    pub fn id(&self) -> String {
        format!(
            "{}_{}",
            self.start.format("%Y%m%d"),
            self.end.format("%Y%m%d")
        )
    }

    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    /// Half-open containment check used when attributing rows to windows.
    pub fn contains(&self, t: NaiveDateTime) -> bool {
        self.start <= t && t < self.end
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
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
    fn test_id_format() {
        let w = Window::new(day(2024, 1, 1), day(2024, 1, 2));
        assert_eq!(w.id(), "20240101_20240102");
    }

    #[test]
    fn test_contains_is_half_open() {
        let w = Window::new(day(2024, 1, 1), day(2024, 1, 2));
        assert!(w.contains(day(2024, 1, 1)));
        assert!(!w.contains(day(2024, 1, 2)));
    }
}
