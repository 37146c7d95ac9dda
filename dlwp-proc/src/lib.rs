//! # DLWP Processing Driver
//!
//! Batch drivers that connect the pure computation in `dlwp-core` to the
//! SQLite store: the QC tagging pass, the VAD wind-retrieval pass, and
//! run provenance tracking. Each pass is a synchronous entry point that
//! blocks until the batch completes and returns summary counters.

pub mod qc_pass;
pub mod run_tracker;
pub mod store;
pub mod wind_pass;

pub use qc_pass::{run_qc_pass, QcSummary};
pub use wind_pass::{run_wind_pass, WindSummary};
