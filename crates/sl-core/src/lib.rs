//! Seisloc windowed pipeline orchestrator.
//!
//! Turns continuous waveform archives into a catalog of located events by
//! driving each processing window through
//! Acquire -> Pick -> Associate -> Locate -> Export -> Visualize, with
//! chunked fan-out for the heavy stages and idempotent, resumable execution
//! over an on-disk artifact tree.

pub mod archive;
pub mod artifact;
pub mod catalog;
pub mod chunk;
pub mod engine;
pub mod exit_codes;
pub mod export;
pub mod logging;
pub mod process;
pub mod schedule;
pub mod sequencer;
pub mod solver;
pub mod stats;

pub use artifact::ArtifactStore;
pub use sequencer::{Pipeline, Stage, StageOutcome, WindowState};
