//! `seisloc` command-line entry point.

use std::path::PathBuf;
use std::process::ExitCode as ProcessExit;

use clap::{Parser, Subcommand};
use sl_common::{Result, Window};
use sl_config::{load_config, DEFAULT_CONFIG_PATH};
use sl_core::exit_codes::ExitCode;
use sl_core::logging;
use sl_core::sequencer::Pipeline;
use tracing::{error, warn};

#[derive(Debug, Parser)]
#[command(
    name = "seisloc",
    version,
    about = "Windowed seismic catalog pipeline: pick, associate, locate, export"
)]
struct Cli {
    /// Run configuration file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH, env = "SEISLOC_CONFIG")]
    config: PathBuf,

    /// Recompute even when output artifacts already exist.
    #[arg(long, global = true)]
    force: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Stage per-window station tables and waveform manifests from the archive.
    Download,
    /// Run the phase picker over each window's waveforms.
    Pick,
    /// Group picks into candidate events and build window catalogs.
    Associate,
    /// Merge window catalogs and relocate events with the external solver.
    Locate,
    /// Write the relocated catalog summary (xyzm table).
    Export,
    /// Compute and persist pick/catalog summary statistics.
    Visualize,
    /// Execute the whole pipeline end to end.
    Run,
}

fn main() -> ProcessExit {
    logging::init();
    let cli = Cli::parse();

    let code = match execute(&cli) {
        Ok(code) => code,
        Err(err) => {
            error!(error = %err, code = err.code(), "seisloc failed");
            ExitCode::from_error(&err)
        }
    };
    ProcessExit::from(u8::try_from(code.as_i32()).unwrap_or(99))
}

fn execute(cli: &Cli) -> Result<ExitCode> {
    let config = load_config(&cli.config)?;
    let pipeline = Pipeline::from_config(config, cli.force)?;

    match cli.command {
        Command::Download => per_window(&pipeline, |p, w| p.run_acquire(w).map(|_| ())),
        Command::Pick => per_window(&pipeline, |p, w| p.run_pick(w).map(|_| ())),
        Command::Associate => per_window(&pipeline, |p, w| p.run_associate(w).map(|_| ())),
        Command::Locate => pipeline.run_locate().map(|_| ExitCode::Clean),
        Command::Export => pipeline.run_export().map(|_| ExitCode::Clean),
        Command::Visualize => pipeline.run_visualize().map(|_| ExitCode::Clean),
        Command::Run => {
            let report = pipeline.run_all()?;
            if report.failed_windows() > 0 {
                Ok(ExitCode::PartialFail)
            } else {
                Ok(ExitCode::Clean)
            }
        }
    }
}

/// Run one per-window stage over every window with failure isolation.
fn per_window<F>(pipeline: &Pipeline, run: F) -> Result<ExitCode>
where
    F: Fn(&Pipeline, &Window) -> Result<()>,
{
    let mut failed = 0usize;
    for window in pipeline.windows()? {
        match run(pipeline, &window) {
            Ok(()) => {}
            Err(err) if err.skips_window() => {
                warn!(window = %window, error = %err, "window skipped");
            }
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                error!(window = %window, error = %err, "window failed");
                failed += 1;
            }
        }
    }
    if failed > 0 {
        Ok(ExitCode::PartialFail)
    } else {
        Ok(ExitCode::Clean)
    }
}
