//! Seisloc geodetic and pick-weight primitives.
//!
//! Pure numeric building blocks with no I/O:
//! - A stereographic projector between geographic and local planar frames
//! - The lossy quantization of continuous pick quality into ordinal weights

pub mod project;
pub mod weight;

pub use project::Projector;
pub use weight::{class_to_score, score_to_class, WeightClass};
