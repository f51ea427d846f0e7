//! Pick and catalog summary statistics.
//!
//! The visualize stage persists these as JSON instead of rendering plots;
//! downstream notebooks read the artifacts and do their own drawing.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sl_common::table::Phase;
use sl_common::Window;
use sl_config::PickerConfig;
use sl_geo::score_to_class;

use crate::catalog::WindowCatalog;

/// Per-window pick and event summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowStats {
    pub window: String,
    pub p_picks: usize,
    pub s_picks: usize,
    /// Pick counts per solver weight class, best first.
    pub picks_by_weight: [usize; 5],
    pub events: usize,
    pub assigned_picks: usize,
    pub unassigned_picks: usize,
}

impl WindowStats {
    pub fn compute(window: &Window, catalog: &WindowCatalog, picker: &PickerConfig) -> Self {
        let mut p_picks = 0;
        let mut s_picks = 0;
        let mut picks_by_weight = [0usize; 5];
        for pick in &catalog.picks {
            let min_weight = match pick.phase {
                Phase::P => {
                    p_picks += 1;
                    picker.min_p_probability
                }
                Phase::S => {
                    s_picks += 1;
                    picker.min_s_probability
                }
            };
            picks_by_weight[score_to_class(pick.score, min_weight).index() as usize] += 1;
        }

        let assigned: HashSet<i64> = catalog
            .assignments
            .iter()
            .map(|assignment| assignment.pick_index)
            .collect();

        WindowStats {
            window: window.id(),
            p_picks,
            s_picks,
            picks_by_weight,
            events: catalog.events.len(),
            assigned_picks: assigned.len(),
            unassigned_picks: catalog.picks.len().saturating_sub(assigned.len()),
        }
    }
}

/// Whole-run rollup across windows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub windows: usize,
    pub p_picks: usize,
    pub s_picks: usize,
    pub picks_by_weight: [usize; 5],
    pub events: usize,
    pub relocated: usize,
}

impl RunStats {
    pub fn aggregate(windows: &[WindowStats], relocated: usize) -> Self {
        let mut total = RunStats {
            windows: windows.len(),
            relocated,
            ..RunStats::default()
        };
        for stats in windows {
            total.p_picks += stats.p_picks;
            total.s_picks += stats.s_picks;
            total.events += stats.events;
            for (sum, n) in total.picks_by_weight.iter_mut().zip(stats.picks_by_weight) {
                *sum += n;
            }
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeDelta};
    use sl_common::{Assignment, Pick};

    fn window() -> Window {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        Window::new(start, start + TimeDelta::days(1))
    }

    fn picker() -> PickerConfig {
        PickerConfig {
            command: "phasepick".into(),
            min_p_probability: 0.3,
            min_s_probability: 0.3,
            chunk_files: 10,
        }
    }

    fn pick(phase: Phase, score: f64) -> Pick {
        Pick {
            station_id: "IR.KHMZ.".into(),
            phase,
            time: window().start + TimeDelta::seconds(5),
            score,
            amplitude: None,
        }
    }

    #[test]
    fn test_window_stats_counts() {
        let catalog = WindowCatalog {
            events: Vec::new(),
            assignments: vec![
                Assignment {
                    pick_index: 0,
                    event_index: 0,
                    score: 1.0,
                },
                // Same pick referenced twice still counts once.
                Assignment {
                    pick_index: 0,
                    event_index: 0,
                    score: 1.0,
                },
            ],
            picks: vec![
                pick(Phase::P, 1.0),
                pick(Phase::P, 0.2),
                pick(Phase::S, 0.6),
            ],
        };
        let stats = WindowStats::compute(&window(), &catalog, &picker());
        assert_eq!(stats.p_picks, 2);
        assert_eq!(stats.s_picks, 1);
        assert_eq!(stats.picks_by_weight[0], 1);
        assert_eq!(stats.picks_by_weight[4], 1, "below-floor score is worst class");
        assert_eq!(stats.assigned_picks, 1);
        assert_eq!(stats.unassigned_picks, 2);
    }

    #[test]
    fn test_empty_window_stats_are_zero() {
        let stats = WindowStats::compute(&window(), &WindowCatalog::default(), &picker());
        assert_eq!(stats.p_picks + stats.s_picks, 0);
        assert_eq!(stats.events, 0);
        assert_eq!(stats.unassigned_picks, 0);
    }

    #[test]
    fn test_run_rollup_sums_windows() {
        let catalog = WindowCatalog {
            events: Vec::new(),
            assignments: Vec::new(),
            picks: vec![pick(Phase::P, 0.9)],
        };
        let per_window = WindowStats::compute(&window(), &catalog, &picker());
        let total = RunStats::aggregate(&[per_window.clone(), per_window], 4);
        assert_eq!(total.windows, 2);
        assert_eq!(total.p_picks, 2);
        assert_eq!(total.relocated, 4);
    }
}
