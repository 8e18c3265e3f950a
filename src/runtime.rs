//! Runtime support: configuration, progress observation, and telemetry.

pub mod config;
pub mod progress;
pub mod telemetry;
