//! Picking and association engines.
//!
//! The pipeline does no signal processing itself; picking and association
//! are delegated behind these traits. Production runs use the
//! command-backed adapters in [`command`], exchanging tables through a
//! scratch directory. Tests substitute the `Static*` and `Noop*`
//! implementations below.

pub mod command;

use std::path::PathBuf;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sl_common::table::{RowError, TableRow};
use sl_common::{Assignment, Pick, Result, Station, Window};
use sl_config::AssociationSettings;

/// Magnitude sentinel written by engines that do not measure magnitude.
const MAGNITUDE_UNSET: f64 = 999.0;

/// An associated event in the local planar frame, before geographic
/// back-projection and catalog assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub time: NaiveDateTime,
    pub x_km: f64,
    pub y_km: f64,
    pub z_km: f64,
    pub magnitude: Option<f64>,
    pub sigma_time: f64,
    pub sigma_amp: f64,
    pub cov_time_amp: f64,
    /// Index local to the associator invocation that produced it.
    pub event_index: i64,
    pub score: f64,
}

impl TableRow for RawEvent {
    const COLUMNS: &'static [&'static str] = &[
        "time",
        "x_km",
        "y_km",
        "z_km",
        "magnitude",
        "sigma_time",
        "sigma_amp",
        "cov_time_amp",
        "event_index",
        "score",
    ];

    fn to_row(&self) -> String {
        format!(
            "{}\t{:.3}\t{:.3}\t{:.3}\t{}\t{:.3}\t{:.3}\t{:.3}\t{}\t{:.3}",
            self.time.format(sl_common::table::TIMESTAMP_FORMAT),
            self.x_km,
            self.y_km,
            self.z_km,
            match self.magnitude {
                Some(m) => format!("{m:.3}"),
                None => "nan".to_owned(),
            },
            self.sigma_time,
            self.sigma_amp,
            self.cov_time_amp,
            self.event_index,
            self.score,
        )
    }

    fn parse_row(fields: &[&str]) -> std::result::Result<Self, RowError> {
        if fields.len() != 10 {
            return Err(RowError(format!(
                "expected 10 columns, found {}",
                fields.len()
            )));
        }
        let float = |i: usize, name: &str| {
            fields[i]
                .trim()
                .parse::<f64>()
                .map_err(|_| RowError(format!("column `{name}`: invalid float `{}`", fields[i])))
        };
        let magnitude = float(4, "magnitude").map(|m| if m.is_nan() { None } else { Some(m) })?;
        Ok(RawEvent {
            time: NaiveDateTime::parse_from_str(
                fields[0].trim(),
                sl_common::table::TIMESTAMP_FORMAT,
            )
            .map_err(|_| RowError(format!("column `time`: invalid timestamp `{}`", fields[0])))?,
            x_km: float(1, "x_km")?,
            y_km: float(2, "y_km")?,
            z_km: float(3, "z_km")?,
            magnitude: normalize_magnitude(magnitude),
            sigma_time: float(5, "sigma_time")?,
            sigma_amp: float(6, "sigma_amp")?,
            cov_time_amp: float(7, "cov_time_amp")?,
            event_index: fields[8].trim().parse::<i64>().map_err(|_| {
                RowError(format!(
                    "column `event_index`: invalid integer `{}`",
                    fields[8]
                ))
            })?,
            score: float(9, "score")?,
        })
    }
}

/// Collapse the legacy "999" magnitude placeholder to absent.
pub fn normalize_magnitude(magnitude: Option<f64>) -> Option<f64> {
    magnitude.filter(|m| (*m - MAGNITUDE_UNSET).abs() > 1e-9)
}

/// Produces phase picks from one chunk of waveform files.
pub trait PickEngine: Send + Sync {
    fn pick(&self, window: &Window, files: &[PathBuf], stations: &[Station]) -> Result<Vec<Pick>>;
}

/// Groups picks into candidate events.
///
/// `pick_index` in the returned assignments refers to positions in the
/// `picks` slice as given; the caller owns any re-keying.
pub trait AssociationEngine: Send + Sync {
    fn associate(
        &self,
        window: &Window,
        picks: &[Pick],
        stations: &[Station],
        settings: &AssociationSettings,
    ) -> Result<(Vec<RawEvent>, Vec<Assignment>)>;
}

/// Pick engine that never picks anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPickEngine;

impl PickEngine for NoopPickEngine {
    fn pick(&self, _: &Window, _: &[PathBuf], _: &[Station]) -> Result<Vec<Pick>> {
        Ok(Vec::new())
    }
}

/// Pick engine that replays a fixed pick set, filtered to the window.
#[derive(Debug, Default, Clone)]
pub struct StaticPickEngine {
    pub picks: Vec<Pick>,
}

impl PickEngine for StaticPickEngine {
    fn pick(&self, window: &Window, files: &[PathBuf], _: &[Station]) -> Result<Vec<Pick>> {
        if files.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .picks
            .iter()
            .filter(|pick| window.contains(pick.time))
            .cloned()
            .collect())
    }
}

/// Associator that never forms events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAssociator;

impl AssociationEngine for NoopAssociator {
    fn associate(
        &self,
        _: &Window,
        _: &[Pick],
        _: &[Station],
        _: &AssociationSettings,
    ) -> Result<(Vec<RawEvent>, Vec<Assignment>)> {
        Ok((Vec::new(), Vec::new()))
    }
}

/// Associator that replays a fixed answer regardless of input.
#[derive(Debug, Default, Clone)]
pub struct StaticAssociator {
    pub events: Vec<RawEvent>,
    pub assignments: Vec<Assignment>,
}

impl AssociationEngine for StaticAssociator {
    fn associate(
        &self,
        _: &Window,
        _: &[Pick],
        _: &[Station],
        _: &AssociationSettings,
    ) -> Result<(Vec<RawEvent>, Vec<Assignment>)> {
        Ok((self.events.clone(), self.assignments.clone()))
    }
}
