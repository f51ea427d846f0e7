//! Pipeline stage sequencing.
//!
//! Per-window stages (acquire, pick, associate) run strictly in order for
//! each window, with failure isolation between windows: one window going
//! bad never stops its siblings. The run-wide stages (locate, export,
//! visualize) consume whatever windows survived. Every stage checks its
//! output artifact before doing work, so an interrupted run resumes by
//! re-running the same command.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sl_common::{
    Assignment, Event, Hypocenter, Pick, Result, RunId, Station, Window, SCHEMA_VERSION,
};
use sl_config::{derived, AssociationSettings, LocationSettings, RunConfig};
use sl_geo::Projector;
use tracing::{error, info, warn};

use crate::archive::{Archive, ManifestEntry};
use crate::artifact::ArtifactStore;
use crate::catalog::{self, WindowCatalog};
use crate::chunk;
use crate::engine::command::{CommandAssociator, CommandPickEngine};
use crate::engine::{AssociationEngine, PickEngine};
use crate::export;
use crate::schedule;
use crate::solver::{CommandSolver, LocationSolver, SolverEvent};
use crate::stats::{RunStats, WindowStats};

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Acquire,
    Pick,
    Associate,
    Locate,
    Export,
    Visualize,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Acquire,
        Stage::Pick,
        Stage::Associate,
        Stage::Locate,
        Stage::Export,
        Stage::Visualize,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Stage::Acquire => "acquire",
            Stage::Pick => "pick",
            Stage::Associate => "associate",
            Stage::Locate => "locate",
            Stage::Export => "export",
            Stage::Visualize => "visualize",
        }
    }

    /// Whether the stage runs once per window (as opposed to once per run).
    pub fn per_window(self) -> bool {
        matches!(self, Stage::Acquire | Stage::Pick | Stage::Associate)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Lifecycle of one window through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowState {
    Pending,
    Acquired,
    Picked,
    Associated,
    Located,
    Exported,
    Visualized,
    Done,
    /// Inputs were absent or unreadable; the window was left out.
    Skipped,
    /// A stage failed outright; siblings were unaffected.
    Failed,
}

/// What a single stage invocation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Ran,
    /// Output already existed and `--force` was not given.
    SkippedExisting,
    /// Ran against empty input; wrote a zero-row artifact.
    SkippedNoData,
}

/// Final run summary, persisted as `run.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub schema_version: String,
    pub started_at: String,
    pub finished_at: String,
    pub windows: Vec<WindowReport>,
    pub relocated_events: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowReport {
    pub window: String,
    pub state: WindowState,
}

impl RunReport {
    pub fn failed_windows(&self) -> usize {
        self.windows
            .iter()
            .filter(|w| w.state == WindowState::Failed)
            .count()
    }

    pub fn skipped_windows(&self) -> usize {
        self.windows
            .iter()
            .filter(|w| w.state == WindowState::Skipped)
            .count()
    }
}

/// The orchestrator: owns the wiring between config, artifact tree,
/// archive, and the three engine seams.
pub struct Pipeline {
    config: RunConfig,
    store: ArtifactStore,
    archive: Archive,
    projector: Projector,
    pick_engine: Box<dyn PickEngine>,
    associator: Box<dyn AssociationEngine>,
    solver: Box<dyn LocationSolver>,
    force: bool,
}

impl Pipeline {
    /// Assemble a pipeline with explicit engine implementations.
    pub fn new(
        config: RunConfig,
        pick_engine: Box<dyn PickEngine>,
        associator: Box<dyn AssociationEngine>,
        solver: Box<dyn LocationSolver>,
        force: bool,
    ) -> Result<Self> {
        let store = ArtifactStore::new(&config.results_root);
        store.ensure_layout()?;
        let archive = Archive::new(&config.archive_root);
        let projector = Projector::new(config.center.longitude, config.center.latitude);
        Ok(Pipeline {
            config,
            store,
            archive,
            projector,
            pick_engine,
            associator,
            solver,
            force,
        })
    }

    /// Production wiring: every engine seam backed by its configured
    /// external command.
    pub fn from_config(config: RunConfig, force: bool) -> Result<Self> {
        let pick_engine = Box::new(CommandPickEngine {
            command: config.picker.command.clone(),
            min_p_probability: config.picker.min_p_probability,
            min_s_probability: config.picker.min_s_probability,
        });
        let associator = Box::new(CommandAssociator {
            command: config.associator.command.clone(),
        });
        let solver = Box::new(CommandSolver {
            command: config.solver.command.clone(),
            timeout: Duration::from_secs(config.solver.timeout_seconds),
        });
        Pipeline::new(config, pick_engine, associator, solver, force)
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn windows(&self) -> Result<Vec<Window>> {
        schedule::run_windows(&self.config)
    }

    /// Infer how far a window previously got from which artifacts exist.
    pub fn recover_state(&self, window: &Window) -> WindowState {
        let s = &self.store;
        if s.window_stats(window).exists() {
            WindowState::Done
        } else if s.xyzm().exists() {
            WindowState::Exported
        } else if s.relocated().exists() {
            WindowState::Located
        } else if s.catalog(window).exists() && s.assignments(window).exists() {
            WindowState::Associated
        } else if s.picks(window).exists() {
            WindowState::Picked
        } else if s.stations(window).exists() && s.manifest(window).exists() {
            WindowState::Acquired
        } else {
            WindowState::Pending
        }
    }

    /// Artifacts a forced re-run of `stage` must invalidate for `window`:
    /// the stage's own outputs plus everything downstream of them.
    fn invalidated_artifacts(&self, stage: Stage, window: &Window) -> Vec<PathBuf> {
        let s = &self.store;
        let mut paths = Vec::new();
        if stage <= Stage::Acquire {
            paths.push(s.stations(window));
            paths.push(s.manifest(window));
        }
        if stage <= Stage::Pick {
            paths.push(s.picks(window));
        }
        if stage <= Stage::Associate {
            paths.push(s.catalog(window));
            paths.push(s.assignments(window));
        }
        if stage <= Stage::Locate {
            paths.push(s.global_catalog());
            paths.push(s.global_assignments());
            paths.push(s.global_picks());
            paths.push(s.relocated());
        }
        if stage <= Stage::Export {
            paths.push(s.xyzm());
        }
        paths.push(s.window_stats(window));
        paths.push(s.run_stats());
        paths
    }

    // Per-window stages.

    /// Stage the window's station table and waveform manifest from the
    /// archive into the results tree.
    pub fn run_acquire(&self, window: &Window) -> Result<StageOutcome> {
        let stations_path = self.store.stations(window);
        let manifest_path = self.store.manifest(window);
        if self.force {
            self.store
                .delete(&self.invalidated_artifacts(Stage::Acquire, window))?;
        } else if !schedule::should_run(&stations_path, false)
            && !schedule::should_run(&manifest_path, false)
        {
            return Ok(StageOutcome::SkippedExisting);
        }

        let files = self.archive.waveforms(window)?;
        let stations =
            self.archive
                .stations(window, &self.config.networks, &self.projector)?;

        let manifest: Vec<ManifestEntry> = files
            .iter()
            .map(|path| ManifestEntry {
                file: path.display().to_string(),
            })
            .collect();
        self.store.write_table(&stations_path, &stations)?;
        self.store.write_table(&manifest_path, &manifest)?;
        info!(window = %window, files = files.len(), stations = stations.len(), "acquired");
        if files.is_empty() {
            return Ok(StageOutcome::SkippedNoData);
        }
        Ok(StageOutcome::Ran)
    }

    /// Run the pick engine over the window's waveforms in file chunks.
    pub fn run_pick(&self, window: &Window) -> Result<StageOutcome> {
        let picks_path = self.store.picks(window);
        if self.force {
            self.store
                .delete(&self.invalidated_artifacts(Stage::Pick, window))?;
        } else if !schedule::should_run(&picks_path, false) {
            return Ok(StageOutcome::SkippedExisting);
        }

        let manifest: Vec<ManifestEntry> =
            self.store.read_table(&self.store.manifest(window), window)?;
        let stations: Vec<Station> =
            self.store.read_table(&self.store.stations(window), window)?;

        let files: Vec<PathBuf> = manifest.iter().map(|m| PathBuf::from(&m.file)).collect();
        let chunks = chunk::split(&files, self.config.picker.chunk_files);
        let outcomes = chunk::run_chunks(chunks, derived::worker_threads(), |_, files| {
            self.pick_engine.pick(window, files, &stations)
        })?;
        let mut picks = chunk::merge(&window.id(), Stage::Pick.label(), outcomes)?;
        picks.sort_by(|a, b| a.time.cmp(&b.time).then(a.station_id.cmp(&b.station_id)));

        self.store.write_table(&picks_path, &picks)?;
        info!(window = %window, picks = picks.len(), "picked");
        if picks.is_empty() {
            return Ok(StageOutcome::SkippedNoData);
        }
        Ok(StageOutcome::Ran)
    }

    /// Associate the window's picks into candidate events and assemble
    /// the window catalog.
    pub fn run_associate(&self, window: &Window) -> Result<StageOutcome> {
        let catalog_path = self.store.catalog(window);
        let assignments_path = self.store.assignments(window);
        if self.force {
            self.store
                .delete(&self.invalidated_artifacts(Stage::Associate, window))?;
        } else if !schedule::should_run(&catalog_path, false)
            && !schedule::should_run(&assignments_path, false)
        {
            return Ok(StageOutcome::SkippedExisting);
        }

        let picks: Vec<Pick> = self.store.read_table(&self.store.picks(window), window)?;
        let stations: Vec<Station> =
            self.store.read_table(&self.store.stations(window), window)?;

        let settings = AssociationSettings::derive(&self.config);
        let (raw_events, raw_assignments) =
            self.associator
                .associate(window, &picks, &stations, &settings)?;
        let window_catalog = catalog::assemble_window(
            window,
            &raw_events,
            &raw_assignments,
            &picks,
            &self.projector,
        )?;
        catalog::validate_links(&window_catalog)?;

        self.store.write_table(&catalog_path, &window_catalog.events)?;
        self.store
            .write_table(&assignments_path, &window_catalog.assignments)?;
        info!(
            window = %window,
            events = window_catalog.events.len(),
            assignments = window_catalog.assignments.len(),
            "associated"
        );
        if window_catalog.events.is_empty() {
            return Ok(StageOutcome::SkippedNoData);
        }
        Ok(StageOutcome::Ran)
    }

    // Run-wide stages.

    /// Merge surviving window catalogs, re-key globally, and relocate in
    /// row-bounded chunks that never split an event.
    pub fn run_locate(&self) -> Result<StageOutcome> {
        let relocated_path = self.store.relocated();
        if self.force {
            // Per-window artifacts stay; only run-wide outputs rebuild.
            self.store.delete(&[
                self.store.global_catalog(),
                self.store.global_assignments(),
                self.store.global_picks(),
                relocated_path.clone(),
                self.store.xyzm(),
                self.store.run_stats(),
            ])?;
        } else if !schedule::should_run(&relocated_path, false) {
            return Ok(StageOutcome::SkippedExisting);
        }

        let mut slices = Vec::new();
        let mut stations: Vec<Station> = Vec::new();
        for window in self.windows()? {
            match self.read_window_catalog(&window) {
                Ok(slice) => {
                    let mut window_stations: Vec<Station> = self
                        .store
                        .read_table(&self.store.stations(&window), &window)?;
                    window_stations.retain(|s| !stations.iter().any(|known| known.id == s.id));
                    stations.append(&mut window_stations);
                    slices.push(slice);
                }
                Err(err) if err.skips_window() => {
                    warn!(window = %window, error = %err, "window left out of the merged catalog");
                }
                Err(err) => return Err(err),
            }
        }

        let merged = catalog::merge_global(&slices);
        catalog::validate_links(&merged)?;
        self.store
            .write_table(&self.store.global_catalog(), &merged.events)?;
        self.store
            .write_table(&self.store.global_assignments(), &merged.assignments)?;
        self.store
            .write_table(&self.store.global_picks(), &merged.picks)?;

        let events = catalog::solver_events(&merged, &self.config.picker);
        let located: Vec<SolverEvent> = events
            .into_iter()
            .filter(|event| !event.arrivals.is_empty())
            .collect();
        if located.is_empty() {
            self.store
                .write_table::<Hypocenter>(&relocated_path, &[])?;
            info!("no locatable events, wrote empty relocation table");
            return Ok(StageOutcome::SkippedNoData);
        }

        // Chunk on arrival rows, keeping each event whole.
        let rows: Vec<(i64, usize)> = located
            .iter()
            .enumerate()
            .flat_map(|(position, event)| {
                event
                    .arrivals
                    .iter()
                    .map(move |_| (event.event_index, position))
            })
            .collect();
        let row_chunks = chunk::split_grouped(&rows, self.config.solver.chunk_rows, |row| row.0);
        let chunks: Vec<Vec<SolverEvent>> = row_chunks
            .into_iter()
            .map(|rows| {
                let mut positions: Vec<usize> = rows.into_iter().map(|(_, p)| p).collect();
                positions.dedup();
                positions.into_iter().map(|p| located[p].clone()).collect()
            })
            .collect();

        let settings = LocationSettings::derive(&self.config, &stations);
        let model = self.config.velocity_model.clone();
        let outcomes = chunk::run_chunks(chunks, derived::worker_threads(), |_, events| {
            self.solver.locate(events, &stations, &model, &settings)
        })?;
        let merged_locations = chunk::merge("global", Stage::Locate.label(), outcomes)?;
        let hypocenters = catalog::sort_hypocenters(merged_locations);

        self.store.write_table(&relocated_path, &hypocenters)?;
        info!(relocated = hypocenters.len(), "located");
        Ok(StageOutcome::Ran)
    }

    /// Summarize the relocated catalog as the xyzm exchange table.
    pub fn run_export(&self) -> Result<StageOutcome> {
        let xyzm_path = self.store.xyzm();
        if self.force {
            self.store.delete(&[xyzm_path.clone()])?;
        } else if !schedule::should_run(&xyzm_path, false) {
            return Ok(StageOutcome::SkippedExisting);
        }

        let hypocenters: Vec<Hypocenter> =
            self.store.read_global_table(&self.store.relocated())?;
        export::write_xyzm(&xyzm_path, &hypocenters)?;
        info!(rows = hypocenters.len(), "exported xyzm");
        if hypocenters.is_empty() {
            return Ok(StageOutcome::SkippedNoData);
        }
        Ok(StageOutcome::Ran)
    }

    /// Persist per-window and run-wide summary statistics.
    pub fn run_visualize(&self) -> Result<StageOutcome> {
        let run_stats_path = self.store.run_stats();
        if self.force {
            for window in self.windows()? {
                self.store.delete(&[self.store.window_stats(&window)])?;
            }
            self.store.delete(&[run_stats_path.clone()])?;
        } else if !schedule::should_run(&run_stats_path, false) {
            return Ok(StageOutcome::SkippedExisting);
        }

        let mut all = Vec::new();
        for window in self.windows()? {
            match self.read_window_catalog(&window) {
                Ok(slice) => {
                    let stats = WindowStats::compute(&window, &slice, &self.config.picker);
                    self.store
                        .write_json(&self.store.window_stats(&window), &stats)?;
                    all.push(stats);
                }
                Err(err) if err.skips_window() => {
                    warn!(window = %window, error = %err, "no stats for skipped window");
                }
                Err(err) => return Err(err),
            }
        }

        let relocated: usize = match self
            .store
            .read_global_table::<Hypocenter>(&self.store.relocated())
        {
            Ok(rows) => rows.len(),
            Err(err) if err.skips_window() => 0,
            Err(err) => return Err(err),
        };
        let rollup = RunStats::aggregate(&all, relocated);
        self.store.write_json(&run_stats_path, &rollup)?;
        info!(windows = all.len(), relocated, "visualize stats written");
        Ok(StageOutcome::Ran)
    }

    fn read_window_catalog(&self, window: &Window) -> Result<WindowCatalog> {
        let events: Vec<Event> = self.store.read_table(&self.store.catalog(window), window)?;
        let assignments: Vec<Assignment> = self
            .store
            .read_table(&self.store.assignments(window), window)?;
        let picks: Vec<Pick> = self.store.read_table(&self.store.picks(window), window)?;
        Ok(WindowCatalog {
            events,
            assignments,
            picks,
        })
    }

    /// Run one per-window stage across every window with failure
    /// isolation, returning each window's resulting state.
    fn run_window_stage<F>(&self, stage: Stage, states: &mut [(Window, WindowState)], run: F)
    where
        F: Fn(&Window) -> Result<StageOutcome>,
    {
        for (window, state) in states.iter_mut() {
            if matches!(state, WindowState::Skipped | WindowState::Failed) {
                continue;
            }
            match run(window) {
                // A window with no waveform data at all terminates as
                // Skipped; later quiet stages (zero picks, zero events)
                // still count as progress.
                Ok(StageOutcome::SkippedNoData) if stage == Stage::Acquire => {
                    warn!(window = %window, stage = %stage, "no waveform data, window skipped");
                    *state = WindowState::Skipped;
                }
                Ok(_) => {
                    *state = match stage {
                        Stage::Acquire => WindowState::Acquired,
                        Stage::Pick => WindowState::Picked,
                        Stage::Associate => WindowState::Associated,
                        _ => *state,
                    };
                }
                Err(err) if err.skips_window() => {
                    warn!(window = %window, stage = %stage, error = %err, "window skipped");
                    *state = WindowState::Skipped;
                }
                Err(err) => {
                    error!(window = %window, stage = %stage, error = %err, "window failed");
                    *state = WindowState::Failed;
                }
            }
        }
    }

    /// Execute the full pipeline and persist the run summary.
    pub fn run_all(&self) -> Result<RunReport> {
        let started_at = Utc::now().to_rfc3339();
        let run_id = RunId::new();
        info!(run_id = %run_id, "run started");

        let mut states: Vec<(Window, WindowState)> = self
            .windows()?
            .into_iter()
            .map(|window| (window, WindowState::Pending))
            .collect();

        self.run_window_stage(Stage::Acquire, &mut states, |w| self.run_acquire(w));
        self.run_window_stage(Stage::Pick, &mut states, |w| self.run_pick(w));
        self.run_window_stage(Stage::Associate, &mut states, |w| self.run_associate(w));

        let survivors = states
            .iter()
            .filter(|(_, s)| *s == WindowState::Associated)
            .count();
        if survivors > 0 {
            let global_stages: [(Stage, WindowState, &dyn Fn() -> Result<StageOutcome>); 3] = [
                (Stage::Locate, WindowState::Located, &|| self.run_locate()),
                (Stage::Export, WindowState::Exported, &|| self.run_export()),
                (Stage::Visualize, WindowState::Visualized, &|| {
                    self.run_visualize()
                }),
            ];
            let mut completed = true;
            for (stage, reached, run) in global_stages {
                match run() {
                    Ok(_) => self.advance(&mut states, reached),
                    Err(err) if err.is_fatal() => return Err(err),
                    Err(err) => {
                        // A run-wide stage failure takes the surviving
                        // windows down together; completed per-window
                        // artifacts remain for the next attempt.
                        error!(stage = %stage, error = %err, "run-wide stage failed");
                        self.advance(&mut states, WindowState::Failed);
                        completed = false;
                        break;
                    }
                }
            }
            if completed {
                self.advance(&mut states, WindowState::Done);
            }
        } else {
            warn!("no window survived to association, skipping run-wide stages");
        }

        let relocated = match self
            .store
            .read_global_table::<Hypocenter>(&self.store.relocated())
        {
            Ok(rows) => rows.len(),
            Err(err) if err.skips_window() => 0,
            Err(err) => return Err(err),
        };

        let report = RunReport {
            run_id,
            schema_version: SCHEMA_VERSION.to_string(),
            started_at,
            finished_at: Utc::now().to_rfc3339(),
            windows: states
                .iter()
                .map(|(window, state)| WindowReport {
                    window: window.id(),
                    state: *state,
                })
                .collect(),
            relocated_events: relocated,
        };
        self.store.write_json(&self.store.run_summary(), &report)?;
        info!(
            windows = report.windows.len(),
            failed = report.failed_windows(),
            skipped = report.skipped_windows(),
            "run finished"
        );
        Ok(report)
    }

    fn advance(&self, states: &mut [(Window, WindowState)], to: WindowState) {
        for (_, state) in states.iter_mut() {
            if !matches!(state, WindowState::Skipped | WindowState::Failed) {
                *state = to;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_and_scope() {
        assert!(Stage::Acquire < Stage::Pick);
        assert!(Stage::Associate < Stage::Locate);
        assert!(Stage::Acquire.per_window());
        assert!(!Stage::Locate.per_window());
        assert_eq!(Stage::ALL.len(), 6);
    }

    #[test]
    fn test_stage_labels() {
        assert_eq!(Stage::Pick.to_string(), "pick");
        assert_eq!(Stage::Visualize.label(), "visualize");
    }
}
