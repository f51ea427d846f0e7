//! Hypocenter location solvers.
//!
//! A solver takes one chunk of catalog events with their arrivals and
//! returns relocated hypocenters. The production path shells out to a
//! legacy location code inside a scoped scratch directory; nothing is ever
//! run in (or written to) the results tree, and the scratch directory is
//! removed even when the solver fails.

pub mod phase_file;

use std::time::Duration;

use sl_common::{Hypocenter, Result, Station};
use sl_config::{LocationSettings, VelocityModel};
use tracing::debug;

pub use phase_file::{Arrival, SolverEvent};

use crate::process;

/// Relocates one chunk of events.
pub trait LocationSolver: Send + Sync {
    fn locate(
        &self,
        events: &[SolverEvent],
        stations: &[Station],
        model: &VelocityModel,
        settings: &LocationSettings,
    ) -> Result<Vec<Hypocenter>>;
}

/// Solver backed by an external location code.
///
/// The legacy convention: the solver reads an input file from stdin that
/// names the phase file and its two output files, all relative to the
/// working directory.
#[derive(Debug, Clone)]
pub struct CommandSolver {
    pub command: String,
    pub timeout: Duration,
}

const PHASE_FILE: &str = "phase.dat";
const PRINT_FILE: &str = "print.out";
const BULLETIN_FILE: &str = "solver.out";
const INPUT_FILE: &str = "input.dat";

impl LocationSolver for CommandSolver {
    fn locate(
        &self,
        events: &[SolverEvent],
        stations: &[Station],
        model: &VelocityModel,
        settings: &LocationSettings,
    ) -> Result<Vec<Hypocenter>> {
        if events.is_empty() {
            return Ok(Vec::new());
        }
        let scratch = tempfile::tempdir()?;

        let phase_path = scratch.path().join(PHASE_FILE);
        let mut phase = std::fs::File::create(&phase_path)?;
        phase_file::write_phase_file(&mut phase, stations, model, settings, events)?;
        drop(phase);

        let input_path = scratch.path().join(INPUT_FILE);
        std::fs::write(
            &input_path,
            format!("{PHASE_FILE}\n{PRINT_FILE}\n{BULLETIN_FILE}\n\n\n\n"),
        )?;

        process::run_command(
            &self.command,
            &[],
            scratch.path(),
            Some(&input_path),
            Some(self.timeout),
        )?;

        let bulletin_path = scratch.path().join(BULLETIN_FILE);
        let bulletin = std::fs::read_to_string(&bulletin_path).map_err(|err| {
            sl_common::Error::MalformedArtifact {
                path: bulletin_path.clone(),
                detail: format!("solver wrote no bulletin: {err}"),
            }
        })?;
        let hypocenters =
            phase_file::parse_bulletin(&bulletin, &bulletin_path.display().to_string(), events)?;
        debug!(events = events.len(), located = hypocenters.len(), "solver chunk done");
        Ok(hypocenters)
    }
}

/// Solver that answers from a fixed hypocenter set, matched by event id.
#[derive(Debug, Default, Clone)]
pub struct StaticSolver {
    pub hypocenters: Vec<Hypocenter>,
}

impl LocationSolver for StaticSolver {
    fn locate(
        &self,
        events: &[SolverEvent],
        _: &[Station],
        _: &VelocityModel,
        _: &LocationSettings,
    ) -> Result<Vec<Hypocenter>> {
        Ok(events
            .iter()
            .filter_map(|event| {
                self.hypocenters
                    .iter()
                    .find(|h| h.event_index == event.event_index)
                    .cloned()
            })
            .collect())
    }
}
