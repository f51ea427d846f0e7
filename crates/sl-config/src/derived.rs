//! Stage-specific settings derived from the run configuration.
//!
//! Components that "apply" config-derived transforms return one of these
//! structs; the source `RunConfig` is never mutated after startup.

use serde::{Deserialize, Serialize};
use sl_common::Station;

use crate::model::{AssociatorMethod, RunConfig};
use crate::DEGREE_TO_KM;

/// Workers reserved for the operating system and the orchestrator itself.
const RESERVED_CORES: usize = 2;

/// Bounded worker-pool size: available cores minus a reserved margin.
pub fn worker_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(RESERVED_CORES))
        .unwrap_or(1)
        .max(1)
}

/// Settings handed to the association engine for one window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssociationSettings {
    pub method: AssociatorMethod,
    pub oversample_factor: Option<u32>,
    pub worker_threads: usize,
    /// Planar search bounds about the projection center, kilometers.
    pub x_bounds_km: (f64, f64),
    pub y_bounds_km: (f64, f64),
    pub z_bounds_km: (f64, f64),
    pub vp_km_s: f64,
    pub vs_km_s: f64,
    pub use_amplitude: bool,
}

impl AssociationSettings {
    /// Derive association settings from the run configuration.
    ///
    /// Planar bounds come from the geographic region limits relative to the
    /// projection center at the fixed degree-to-kilometer scale.
    pub fn derive(config: &RunConfig) -> Self {
        let r = &config.region;
        let c = &config.center;
        let x_bounds_km = (
            (r.min_longitude - c.longitude) * DEGREE_TO_KM,
            (r.max_longitude - c.longitude) * DEGREE_TO_KM,
        );
        let y_bounds_km = (
            (r.min_latitude - c.latitude) * DEGREE_TO_KM,
            (r.max_latitude - c.latitude) * DEGREE_TO_KM,
        );

        // Surface P velocity, S derived through the Vp/Vs ratio.
        let vp = config.velocity_model.vp_km_s[0];
        AssociationSettings {
            method: config.associator.method,
            oversample_factor: config.associator.method.oversample_factor(),
            worker_threads: worker_threads(),
            x_bounds_km,
            y_bounds_km,
            z_bounds_km: (r.min_depth_km, r.max_depth_km),
            vp_km_s: vp,
            vs_km_s: vp / config.velocity_model.vp_vs_ratio,
            use_amplitude: config.associator.use_amplitude,
        }
    }
}

/// Control-line settings for the external location solver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationSettings {
    pub trial_depth_km: f64,
    /// Distance up to which arrivals are weighted fully, kilometers.
    pub x_near_km: f64,
    /// Distance beyond which arrivals are ignored, kilometers.
    pub x_far_km: f64,
    pub vp_vs_ratio: f64,
}

impl LocationSettings {
    /// Derive the solver control line from the station geometry.
    ///
    /// `x_near` is the mean inter-station distance rounded to 5 km;
    /// `x_far` is 2.5 times that.
    pub fn derive(config: &RunConfig, stations: &[Station]) -> Self {
        let x_near_km = round_to(mean_interstation_km(stations), 5.0).max(5.0);
        LocationSettings {
            trial_depth_km: config.solver.trial_depth_km,
            x_near_km,
            x_far_km: 2.5 * x_near_km,
            vp_vs_ratio: config.velocity_model.vp_vs_ratio,
        }
    }
}

fn round_to(value: f64, base: f64) -> f64 {
    base * (value / base).round()
}

/// Mean of per-station mean distances to every other station, kilometers.
fn mean_interstation_km(stations: &[Station]) -> f64 {
    if stations.len() < 2 {
        return 0.0;
    }
    let n = stations.len() as f64;
    let mut total = 0.0;
    for a in stations {
        let mut sum = 0.0;
        for b in stations {
            let dx = a.longitude - b.longitude;
            let dy = a.latitude - b.latitude;
            sum += (dx * dx + dy * dy).sqrt();
        }
        total += sum / n;
    }
    total / n * DEGREE_TO_KM
}
