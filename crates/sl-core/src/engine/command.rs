//! Command-backed engine adapters.
//!
//! Each invocation gets a fresh scratch directory: inputs are written as
//! tables, the external tool runs with the scratch directory as its working
//! directory, and outputs are read back before the directory is dropped.
//! The tools never see the results tree, so a crashed engine cannot leave a
//! partial artifact behind.

use std::io::BufReader;
use std::path::{Path, PathBuf};

use sl_common::table::{self, TableRow};
use sl_common::{Assignment, Error, Pick, Result, Station, Window};
use sl_config::AssociationSettings;
use tracing::debug;

use crate::archive::ManifestEntry;
use crate::engine::{AssociationEngine, PickEngine, RawEvent};
use crate::process;

fn write_scratch_table<R: TableRow>(dir: &Path, name: &str, rows: &[R]) -> Result<PathBuf> {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path)?;
    table::write_table(&mut file, rows)?;
    Ok(path)
}

fn read_scratch_table<R: TableRow>(path: &Path) -> Result<Vec<R>> {
    let file = std::fs::File::open(path).map_err(|err| Error::MalformedArtifact {
        path: path.to_path_buf(),
        detail: format!("engine produced no output: {err}"),
    })?;
    table::read_table(BufReader::new(file)).map_err(|err| Error::MalformedArtifact {
        path: path.to_path_buf(),
        detail: err.to_string(),
    })
}

/// Phase picker driven through an external command.
///
/// Protocol: the command receives a waveform manifest and a station table
/// and must write a pick table to the path given by `--output`.
#[derive(Debug, Clone)]
pub struct CommandPickEngine {
    pub command: String,
    pub min_p_probability: f64,
    pub min_s_probability: f64,
}

impl PickEngine for CommandPickEngine {
    fn pick(&self, window: &Window, files: &[PathBuf], stations: &[Station]) -> Result<Vec<Pick>> {
        if files.is_empty() {
            return Ok(Vec::new());
        }
        let scratch = tempfile::tempdir()?;
        let manifest: Vec<ManifestEntry> = files
            .iter()
            .map(|path| ManifestEntry {
                file: path.display().to_string(),
            })
            .collect();
        write_scratch_table(scratch.path(), "manifest.csv", &manifest)?;
        write_scratch_table(scratch.path(), "stations.csv", stations)?;

        let output = scratch.path().join("picks.csv");
        let args = vec![
            "--manifest".to_owned(),
            "manifest.csv".to_owned(),
            "--stations".to_owned(),
            "stations.csv".to_owned(),
            "--output".to_owned(),
            "picks.csv".to_owned(),
            "--window".to_owned(),
            window.id(),
            "--min-p".to_owned(),
            format!("{}", self.min_p_probability),
            "--min-s".to_owned(),
            format!("{}", self.min_s_probability),
        ];
        process::run_command(&self.command, &args, scratch.path(), None, None)?;

        let picks: Vec<Pick> = read_scratch_table(&output)?;
        debug!(window = %window, files = files.len(), picks = picks.len(), "pick chunk done");
        Ok(picks)
    }
}

/// Associator driven through an external command.
///
/// Settings travel as JSON; picks and stations as tables. The command must
/// write an event table and an assignment table whose `pick_index` values
/// refer to row positions in the pick table it was given.
#[derive(Debug, Clone)]
pub struct CommandAssociator {
    pub command: String,
}

impl AssociationEngine for CommandAssociator {
    fn associate(
        &self,
        window: &Window,
        picks: &[Pick],
        stations: &[Station],
        settings: &AssociationSettings,
    ) -> Result<(Vec<RawEvent>, Vec<Assignment>)> {
        if picks.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }
        let scratch = tempfile::tempdir()?;
        write_scratch_table(scratch.path(), "picks.csv", picks)?;
        write_scratch_table(scratch.path(), "stations.csv", stations)?;
        let settings_path = scratch.path().join("settings.json");
        std::fs::write(&settings_path, serde_json::to_vec_pretty(settings)?)?;

        let args = vec![
            "--picks".to_owned(),
            "picks.csv".to_owned(),
            "--stations".to_owned(),
            "stations.csv".to_owned(),
            "--settings".to_owned(),
            "settings.json".to_owned(),
            "--events".to_owned(),
            "events.csv".to_owned(),
            "--assignments".to_owned(),
            "assignments.csv".to_owned(),
            "--window".to_owned(),
            window.id(),
        ];
        process::run_command(&self.command, &args, scratch.path(), None, None)?;

        let events: Vec<RawEvent> = read_scratch_table(&scratch.path().join("events.csv"))?;
        let assignments: Vec<Assignment> =
            read_scratch_table(&scratch.path().join("assignments.csv"))?;
        debug!(
            window = %window,
            picks = picks.len(),
            events = events.len(),
            "association done"
        );
        Ok((events, assignments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use sl_config::AssociatorMethod;

    fn window() -> Window {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        Window::new(start, start + chrono::TimeDelta::days(1))
    }

    #[test]
    fn test_empty_chunk_skips_process_launch() {
        let engine = CommandPickEngine {
            command: "definitely-not-a-real-picker".to_owned(),
            min_p_probability: 0.3,
            min_s_probability: 0.3,
        };
        // No files means no invocation, so the missing binary is never hit.
        let picks = engine.pick(&window(), &[], &[]).unwrap();
        assert!(picks.is_empty());
    }

    #[test]
    fn test_missing_picker_binary_reported() {
        let engine = CommandPickEngine {
            command: "definitely-not-a-real-picker".to_owned(),
            min_p_probability: 0.3,
            min_s_probability: 0.3,
        };
        let err = engine
            .pick(&window(), &[PathBuf::from("a.mseed")], &[])
            .unwrap_err();
        assert_eq!(err.code(), 30);
    }

    #[test]
    fn test_empty_pick_set_skips_associator() {
        let engine = CommandAssociator {
            command: "definitely-not-a-real-associator".to_owned(),
        };
        let settings = AssociationSettings {
            method: AssociatorMethod::GammaBgmm,
            oversample_factor: Some(5),
            worker_threads: 2,
            x_bounds_km: (-200.0, 200.0),
            y_bounds_km: (-200.0, 200.0),
            z_bounds_km: (0.0, 30.0),
            vp_km_s: 6.0,
            vs_km_s: 6.0 / 1.75,
            use_amplitude: false,
        };
        let (events, assignments) = engine.associate(&window(), &[], &[], &settings).unwrap();
        assert!(events.is_empty());
        assert!(assignments.is_empty());
    }
}
