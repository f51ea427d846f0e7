//! Catalog assembly.
//!
//! Per-window association output is local twice over: coordinates live in
//! the planar frame and event indices are unique only within their window.
//! This module back-projects events to geographic coordinates, re-keys
//! window catalogs into one global catalog, and builds the solver's view
//! of that catalog. Re-keying touches indices and aggregates only; the
//! physical quantities a solver or associator produced are never
//! recomputed here.

use sl_common::{Assignment, Error, Event, Hypocenter, Pick, Result, Window};
use sl_config::PickerConfig;
use sl_geo::{score_to_class, Projector};
use sl_common::table::Phase;

use crate::engine::{normalize_magnitude, RawEvent};
use crate::solver::{Arrival, SolverEvent};

/// One window's assembled catalog slice.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowCatalog {
    pub events: Vec<Event>,
    pub assignments: Vec<Assignment>,
    pub picks: Vec<Pick>,
}

/// Assemble one window's catalog from raw association output.
///
/// Events are back-projected to geographic coordinates and re-keyed to a
/// dense `0..n` index in time order; assignments follow the re-keying.
/// An assignment referencing an unknown pick or event means the engine
/// broke its contract.
pub fn assemble_window(
    window: &Window,
    raw_events: &[RawEvent],
    assignments: &[Assignment],
    picks: &[Pick],
    projector: &Projector,
) -> Result<WindowCatalog> {
    let mut ordered: Vec<&RawEvent> = raw_events.iter().collect();
    ordered.sort_by(|a, b| a.time.cmp(&b.time).then(a.event_index.cmp(&b.event_index)));

    let contract_breach = |detail: String| Error::MalformedArtifact {
        path: format!("catalog_{}", window.id()).into(),
        detail,
    };

    let mut events = Vec::with_capacity(ordered.len());
    for (index, raw) in ordered.iter().enumerate() {
        let (longitude, latitude) = projector.to_geo(raw.x_km, raw.y_km);
        events.push(Event {
            time: raw.time,
            magnitude: normalize_magnitude(raw.magnitude),
            longitude,
            latitude,
            depth_km: raw.z_km,
            sigma_time: raw.sigma_time,
            sigma_amp: raw.sigma_amp,
            cov_time_amp: raw.cov_time_amp,
            event_index: index as i64,
            score: raw.score,
        });
    }

    let mut rekeyed = Vec::with_capacity(assignments.len());
    for assignment in assignments {
        let position = ordered
            .iter()
            .position(|raw| raw.event_index == assignment.event_index)
            .ok_or_else(|| {
                contract_breach(format!(
                    "assignment references unknown event {}",
                    assignment.event_index
                ))
            })?;
        if assignment.pick_index < 0 || assignment.pick_index as usize >= picks.len() {
            return Err(contract_breach(format!(
                "assignment references pick {} of {}",
                assignment.pick_index,
                picks.len()
            )));
        }
        rekeyed.push(Assignment {
            pick_index: assignment.pick_index,
            event_index: position as i64,
            score: assignment.score,
        });
    }
    rekeyed.sort_by(|a, b| {
        a.event_index
            .cmp(&b.event_index)
            .then(a.pick_index.cmp(&b.pick_index))
    });

    Ok(WindowCatalog {
        events,
        assignments: rekeyed,
        picks: picks.to_vec(),
    })
}

/// Merge window catalogs, in window order, into one globally keyed catalog.
///
/// Each window's event and pick indices are shifted by the totals of the
/// windows before it, so merged assignments keep pointing at the same
/// picks and events they did per window.
pub fn merge_global(windows: &[WindowCatalog]) -> WindowCatalog {
    let mut merged = WindowCatalog::default();
    for slice in windows {
        let event_offset = merged.events.len() as i64;
        let pick_offset = merged.picks.len() as i64;

        merged.events.extend(slice.events.iter().map(|event| Event {
            event_index: event.event_index + event_offset,
            ..event.clone()
        }));
        merged
            .assignments
            .extend(slice.assignments.iter().map(|assignment| Assignment {
                pick_index: assignment.pick_index + pick_offset,
                event_index: assignment.event_index + event_offset,
                score: assignment.score,
            }));
        merged.picks.extend(slice.picks.iter().cloned());
    }
    merged
}

/// Check referential integrity of an assembled catalog.
pub fn validate_links(catalog: &WindowCatalog) -> Result<()> {
    let n_events = catalog.events.len() as i64;
    let n_picks = catalog.picks.len() as i64;
    for assignment in &catalog.assignments {
        if assignment.event_index < 0 || assignment.event_index >= n_events {
            return Err(Error::MalformedArtifact {
                path: "catalog".into(),
                detail: format!(
                    "assignment event {} out of range 0..{n_events}",
                    assignment.event_index
                ),
            });
        }
        if assignment.pick_index < 0 || assignment.pick_index >= n_picks {
            return Err(Error::MalformedArtifact {
                path: "catalog".into(),
                detail: format!(
                    "assignment pick {} out of range 0..{n_picks}",
                    assignment.pick_index
                ),
            });
        }
    }
    Ok(())
}

/// Build the solver's event view: each event with its assigned picks as
/// weighted arrivals, ordered by event index.
///
/// Pick scores quantize to solver weight classes against the per-phase
/// acceptance threshold the picker ran with.
pub fn solver_events(catalog: &WindowCatalog, picker: &PickerConfig) -> Vec<SolverEvent> {
    let mut events: Vec<SolverEvent> = catalog
        .events
        .iter()
        .map(|event| SolverEvent {
            event_index: event.event_index,
            time: event.time,
            arrivals: Vec::new(),
        })
        .collect();

    for assignment in &catalog.assignments {
        let Some(pick) = catalog.picks.get(assignment.pick_index as usize) else {
            continue;
        };
        let Some(event) = events
            .iter_mut()
            .find(|e| e.event_index == assignment.event_index)
        else {
            continue;
        };
        let min_weight = match pick.phase {
            Phase::P => picker.min_p_probability,
            Phase::S => picker.min_s_probability,
        };
        event.arrivals.push(Arrival {
            station_id: pick.station_id.clone(),
            phase: pick.phase,
            time: pick.time,
            weight: score_to_class(pick.score, min_weight),
        });
    }

    for event in &mut events {
        event
            .arrivals
            .sort_by(|a, b| a.time.cmp(&b.time).then(a.station_id.cmp(&b.station_id)));
    }
    events.sort_by_key(|event| event.event_index);
    events
}

/// Order merged relocation output by event id.
pub fn sort_hypocenters(mut hypocenters: Vec<Hypocenter>) -> Vec<Hypocenter> {
    hypocenters.sort_by_key(|h| h.event_index);
    hypocenters
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

    fn window() -> Window {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        Window::new(start, start + TimeDelta::days(1))
    }

    fn t(seconds: i64) -> NaiveDateTime {
        window().start + TimeDelta::seconds(seconds)
    }

    fn raw_event(index: i64, seconds: i64) -> RawEvent {
        RawEvent {
            time: t(seconds),
            x_km: 10.0,
            y_km: -5.0,
            z_km: 8.0,
            magnitude: Some(999.0),
            sigma_time: 0.2,
            sigma_amp: 0.0,
            cov_time_amp: 0.0,
            event_index: index,
            score: 21.0,
        }
    }

    fn pick(seconds: i64, phase: Phase, score: f64) -> Pick {
        Pick {
            station_id: "IR.KHMZ.".into(),
            phase,
            time: t(seconds),
            score,
            amplitude: None,
        }
    }

    fn picker() -> PickerConfig {
        PickerConfig {
            command: "phasepick".into(),
            min_p_probability: 0.3,
            min_s_probability: 0.3,
            chunk_files: 10,
        }
    }

    #[test]
    fn test_assemble_rekeys_in_time_order() {
        let projector = Projector::new(52.0, 36.0);
        // Associator handed back ids out of time order.
        let raw = vec![raw_event(5, 300), raw_event(2, 100)];
        let picks = vec![pick(99, Phase::P, 0.9), pick(301, Phase::S, 0.5)];
        let assignments = vec![
            Assignment {
                pick_index: 1,
                event_index: 5,
                score: 1.0,
            },
            Assignment {
                pick_index: 0,
                event_index: 2,
                score: 1.0,
            },
        ];
        let catalog =
            assemble_window(&window(), &raw, &assignments, &picks, &projector).unwrap();
        assert_eq!(catalog.events.len(), 2);
        assert_eq!(catalog.events[0].event_index, 0);
        assert!(catalog.events[0].time < catalog.events[1].time);
        // Pick 0 belonged to raw event 2, now event 0.
        assert_eq!(catalog.assignments[0].pick_index, 0);
        assert_eq!(catalog.assignments[0].event_index, 0);
        assert_eq!(catalog.assignments[1].event_index, 1);
        validate_links(&catalog).unwrap();
    }

    #[test]
    fn test_assemble_back_projects_and_drops_placeholder_magnitude() {
        let projector = Projector::new(52.0, 36.0);
        let catalog = assemble_window(
            &window(),
            &[raw_event(0, 10)],
            &[],
            &[],
            &projector,
        )
        .unwrap();
        let event = &catalog.events[0];
        assert!(event.magnitude.is_none(), "999 placeholder stripped");
        assert!((event.depth_km - 8.0).abs() < 1e-12);
        assert!(event.longitude > 52.0, "east of center");
        assert!(event.latitude < 36.0, "south of center");
    }

    #[test]
    fn test_assemble_rejects_dangling_assignment() {
        let projector = Projector::new(52.0, 36.0);
        let err = assemble_window(
            &window(),
            &[raw_event(0, 10)],
            &[Assignment {
                pick_index: 0,
                event_index: 7,
                score: 1.0,
            }],
            &[pick(10, Phase::P, 0.9)],
            &projector,
        )
        .unwrap_err();
        assert_eq!(err.code(), 21);
    }

    #[test]
    fn test_merge_global_offsets_indices() {
        let a = WindowCatalog {
            events: vec![Event {
                time: t(10),
                magnitude: None,
                longitude: 52.0,
                latitude: 36.0,
                depth_km: 10.0,
                sigma_time: 0.1,
                sigma_amp: 0.0,
                cov_time_amp: 0.0,
                event_index: 0,
                score: 9.0,
            }],
            assignments: vec![Assignment {
                pick_index: 0,
                event_index: 0,
                score: 1.0,
            }],
            picks: vec![pick(9, Phase::P, 0.8), pick(11, Phase::S, 0.6)],
        };
        let mut b = a.clone();
        b.events[0].time = t(86_000);

        let merged = merge_global(&[a, b]);
        assert_eq!(merged.events.len(), 2);
        assert_eq!(merged.events[1].event_index, 1);
        assert_eq!(merged.assignments[1].event_index, 1);
        assert_eq!(merged.assignments[1].pick_index, 2, "shifted by first window's picks");
        validate_links(&merged).unwrap();
    }

    #[test]
    fn test_merge_of_empty_windows_is_empty() {
        let merged = merge_global(&[WindowCatalog::default(), WindowCatalog::default()]);
        assert!(merged.events.is_empty());
        assert!(merged.assignments.is_empty());
    }

    #[test]
    fn test_solver_events_carry_weighted_arrivals() {
        let catalog = WindowCatalog {
            events: vec![Event {
                time: t(10),
                magnitude: None,
                longitude: 52.0,
                latitude: 36.0,
                depth_km: 10.0,
                sigma_time: 0.1,
                sigma_amp: 0.0,
                cov_time_amp: 0.0,
                event_index: 0,
                score: 9.0,
            }],
            assignments: vec![
                Assignment {
                    pick_index: 0,
                    event_index: 0,
                    score: 1.0,
                },
                Assignment {
                    pick_index: 1,
                    event_index: 0,
                    score: 1.0,
                },
            ],
            picks: vec![pick(9, Phase::P, 1.0), pick(12, Phase::S, 0.3)],
        };
        let events = solver_events(&catalog, &picker());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].arrivals.len(), 2);
        assert_eq!(events[0].arrivals[0].weight.index(), 0, "full confidence");
        assert_eq!(events[0].arrivals[1].weight.index(), 4, "at the acceptance floor");
    }

    #[test]
    fn test_unassigned_picks_never_reach_the_solver() {
        let catalog = WindowCatalog {
            events: Vec::new(),
            assignments: Vec::new(),
            picks: vec![pick(9, Phase::P, 1.0)],
        };
        assert!(solver_events(&catalog, &picker()).is_empty());
    }
}
