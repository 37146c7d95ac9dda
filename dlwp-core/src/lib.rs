//! # DLWP Core
//!
//! Pure computation for the wind profiler: per-scan gate context
//! (azimuth canonicalization, robust outlier flags, coverage metrics),
//! the QC rule predicates, and the VAD least-squares wind solver.
//! No store access here; the batch drivers in `dlwp-proc` feed rows in
//! and carry verdicts and fits back out.

pub mod angles;
pub mod context;
pub mod rules;
pub mod solver;

pub use context::GateContext;
pub use rules::{bind_active_rules, ActiveRule, RowVerdict};
pub use solver::{solve_vad, SolveError, VadSolution};
