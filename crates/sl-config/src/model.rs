//! Run configuration types.
//!
//! One immutable `RunConfig` value is constructed at startup and passed by
//! reference to every component. Stage-specific transforms live in
//! `derived` and return new structs.

use std::path::PathBuf;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Complete run configuration, deserialized from `config.yml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Inclusive start of the processing range.
    pub start_time: NaiveDateTime,
    /// Exclusive end of the processing range.
    pub end_time: NaiveDateTime,

    /// Window granularity in days. Trailing partial windows are dropped.
    #[serde(default = "default_window_days")]
    pub window_days: i64,

    /// Read-only waveform/station archive root, keyed by window id.
    #[serde(default = "default_archive_root")]
    pub archive_root: PathBuf,

    /// Artifact tree root. Single writer per artifact, atomic replace.
    #[serde(default = "default_results_root")]
    pub results_root: PathBuf,

    /// Projection center for the session-scoped planar frame.
    pub center: Center,

    pub region: Region,

    /// Network codes admitted from the archive.
    pub networks: Vec<String>,

    pub picker: PickerConfig,
    pub associator: AssociatorConfig,
    pub velocity_model: VelocityModel,
    pub solver: SolverConfig,
}

fn default_window_days() -> i64 {
    1
}

fn default_archive_root() -> PathBuf {
    PathBuf::from("DB")
}

fn default_results_root() -> PathBuf {
    PathBuf::from("results")
}

/// Geographic projection center.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Center {
    pub longitude: f64,
    pub latitude: f64,
}

/// Area and depth of interest in geographic coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Region {
    pub min_longitude: f64,
    pub max_longitude: f64,
    pub min_latitude: f64,
    pub max_latitude: f64,
    #[serde(default)]
    pub min_depth_km: f64,
    pub max_depth_km: f64,
}

/// Picking-engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PickerConfig {
    /// External picking command; exchanged tables are the engine contract.
    pub command: String,
    pub min_p_probability: f64,
    pub min_s_probability: f64,
    /// Waveform files per chunk.
    #[serde(default = "default_waveform_chunk")]
    pub chunk_files: usize,
}

fn default_waveform_chunk() -> usize {
    10
}

/// Closed set of supported association methods.
///
/// Selection is a tagged enum rather than a method-name string; each
/// variant maps to the engine's oversampling factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociatorMethod {
    GammaGmm,
    GammaBgmm,
    PyOcto,
}

impl AssociatorMethod {
    /// Mixture-model oversampling factor; not meaningful for PyOcto.
    pub fn oversample_factor(self) -> Option<u32> {
        match self {
            AssociatorMethod::GammaGmm => Some(1),
            AssociatorMethod::GammaBgmm => Some(5),
            AssociatorMethod::PyOcto => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AssociatorMethod::GammaGmm => "gamma_gmm",
            AssociatorMethod::GammaBgmm => "gamma_bgmm",
            AssociatorMethod::PyOcto => "pyocto",
        }
    }
}

/// Association-engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssociatorConfig {
    pub command: String,
    pub method: AssociatorMethod,
    /// Drop picks without a measured amplitude before association.
    #[serde(default)]
    pub use_amplitude: bool,
}

/// 1-D layered velocity model shared by association and location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VelocityModel {
    /// Layer top depths in kilometers, ascending.
    pub depths_km: Vec<f64>,
    /// P-wave velocity per layer, km/s.
    pub vp_km_s: Vec<f64>,
    pub vp_vs_ratio: f64,
}

impl VelocityModel {
    /// Derived S-wave velocities.
    pub fn vs_km_s(&self) -> Vec<f64> {
        self.vp_km_s.iter().map(|v| v / self.vp_vs_ratio).collect()
    }
}

/// External location-solver configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Solver executable, looked up on PATH before each chunk.
    pub command: String,
    #[serde(default = "default_solver_timeout")]
    pub timeout_seconds: u64,
    /// Catalog rows per relocation chunk.
    #[serde(default = "default_catalog_chunk")]
    pub chunk_rows: usize,
    #[serde(default = "default_trial_depth")]
    pub trial_depth_km: f64,
}

fn default_solver_timeout() -> u64 {
    600
}

fn default_catalog_chunk() -> usize {
    10_000
}

fn default_trial_depth() -> f64 {
    10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_oversample_factors() {
        assert_eq!(AssociatorMethod::GammaGmm.oversample_factor(), Some(1));
        assert_eq!(AssociatorMethod::GammaBgmm.oversample_factor(), Some(5));
        assert_eq!(AssociatorMethod::PyOcto.oversample_factor(), None);
    }

    #[test]
    fn test_vs_derivation() {
        let model = VelocityModel {
            depths_km: vec![0.0, 10.0],
            vp_km_s: vec![6.0, 6.4],
            vp_vs_ratio: 1.75,
        };
        let vs = model.vs_km_s();
        assert!((vs[0] - 6.0 / 1.75).abs() < 1e-12);
        assert_eq!(vs.len(), 2);
    }
}
