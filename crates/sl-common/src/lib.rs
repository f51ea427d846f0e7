//! Seisloc common types, windows, and errors.
//!
//! This crate provides foundational types shared across sl-core modules:
//! - Processing windows with deterministic artifact naming
//! - Catalog row types (picks, events, assignments, stations, hypocenters)
//! - Tab-separated table codecs with canonical column order
//! - Run identity and the unified error type

pub mod error;
pub mod id;
pub mod table;
pub mod window;

pub use error::{Error, Result};
pub use id::RunId;
pub use table::{Assignment, Event, Hypocenter, Phase, Pick, Station};
pub use window::Window;

/// Current schema version for all persisted artifacts.
pub const SCHEMA_VERSION: &str = "1.0.0";
