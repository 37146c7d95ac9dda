//! # DLWP Common Library
//!
//! Shared code for the DLWP (Doppler Lidar Wind Profiler) workspace:
//! - Database initialization and row models
//! - Error types
//! - Configuration loading
//! - QC and solver parameter sets

pub mod config;
pub mod db;
pub mod error;
pub mod params;

pub use error::{Error, Result};
pub use params::{QcParams, SolveParams};
