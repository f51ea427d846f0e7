//! Seisloc configuration loading and validation.
//!
//! This crate provides:
//! - Typed Rust structs for the `config.yml` run configuration
//! - Fail-fast loading: any malformed or missing key aborts before the
//!   first window is touched
//! - Derived settings structs for the association and location stages;
//!   deriving never mutates the source configuration

pub mod derived;
pub mod load;
pub mod model;
pub mod validate;

pub use derived::{AssociationSettings, LocationSettings};
pub use load::{load_config, DEFAULT_CONFIG_PATH};
pub use model::{
    AssociatorConfig, AssociatorMethod, Center, PickerConfig, Region, RunConfig, SolverConfig,
    VelocityModel,
};
pub use validate::validate;

/// Kilometers per great-circle degree used for degree/km conversions.
pub const DEGREE_TO_KM: f64 = 111.194_924_747_777_79;
