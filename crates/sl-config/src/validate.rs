//! Semantic configuration validation.

use sl_common::{Error, Result};

use crate::model::RunConfig;

fn fail(detail: impl Into<String>) -> Error {
    Error::Config(detail.into())
}

/// Validate invariants that YAML typing cannot express.
pub fn validate(config: &RunConfig) -> Result<()> {
    if config.start_time >= config.end_time {
        return Err(Error::InvalidTimeRange(format!(
            "start_time {} must precede end_time {}",
            config.start_time, config.end_time
        )));
    }
    if config.window_days < 1 {
        return Err(fail(format!(
            "window_days must be >= 1, got {}",
            config.window_days
        )));
    }

    let c = &config.center;
    if !(-180.0..=180.0).contains(&c.longitude) || !(-90.0..=90.0).contains(&c.latitude) {
        return Err(fail(format!(
            "center ({}, {}) outside geographic bounds",
            c.longitude, c.latitude
        )));
    }

    let r = &config.region;
    if r.min_longitude >= r.max_longitude || r.min_latitude >= r.max_latitude {
        return Err(fail("region bounds must be ordered min < max"));
    }
    if r.min_depth_km >= r.max_depth_km {
        return Err(fail("region depth bounds must be ordered min < max"));
    }

    for (name, p) in [
        ("min_p_probability", config.picker.min_p_probability),
        ("min_s_probability", config.picker.min_s_probability),
    ] {
        if !(0.0..1.0).contains(&p) {
            return Err(fail(format!("{name} must be in [0, 1), got {p}")));
        }
    }
    if config.picker.chunk_files == 0 {
        return Err(fail("picker.chunk_files must be >= 1"));
    }
    if config.picker.command.trim().is_empty() {
        return Err(fail("picker.command must not be empty"));
    }
    if config.associator.command.trim().is_empty() {
        return Err(fail("associator.command must not be empty"));
    }

    if config.networks.is_empty() {
        return Err(fail("at least one network code is required"));
    }

    let vm = &config.velocity_model;
    if vm.depths_km.is_empty() || vm.depths_km.len() != vm.vp_km_s.len() {
        return Err(fail(format!(
            "velocity model needs matching depth/velocity layers, got {}/{}",
            vm.depths_km.len(),
            vm.vp_km_s.len()
        )));
    }
    if vm.depths_km.windows(2).any(|w| w[0] >= w[1]) {
        return Err(fail("velocity model depths must be strictly ascending"));
    }
    if vm.vp_vs_ratio <= 1.0 {
        return Err(fail(format!(
            "vp_vs_ratio must exceed 1.0, got {}",
            vm.vp_vs_ratio
        )));
    }

    if config.solver.command.trim().is_empty() {
        return Err(fail("solver.command must not be empty"));
    }
    if config.solver.chunk_rows == 0 {
        return Err(fail("solver.chunk_rows must be >= 1"));
    }
    if config.solver.timeout_seconds == 0 {
        return Err(fail("solver.timeout_seconds must be >= 1"));
    }

    Ok(())
}
