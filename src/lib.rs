//! Depth-window selection and statistical design profiles for CPT soundings.

pub mod analysis;
pub mod engine;
pub mod error;
pub mod model;
pub mod stats;
pub mod tables;
pub mod window;

pub use analysis::{ProfileKey, QueryReport, Settings};
pub use engine::{Model, ModelChoice, Profile};
pub use error::ProfileError;
pub use tables::Quantile;
