//! Typed row models for the observation, rule, fit, and run tables
//!
//! Nullable measurement columns are `Option` fields; null handling is a QC
//! rule concern, never a deserialization failure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One scan cycle's header row. Read-only to the processing core;
/// created and owned by ingestion.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ScanHeader {
    pub header_id: i64,
    pub num_gates: i64,
    pub num_rays_in_file: i64,
    pub range_gate_length_m: f64,
    pub instrument_spectral_width_ms: Option<f64>,
    pub start_time: Option<DateTime<Utc>>,
}

/// One measurement row per (header, ray, range gate)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GateObservation {
    pub header_id: i64,
    pub ray_idx: i64,
    pub range_gate_index: i64,
    pub doppler_ms: Option<f64>,
    pub intensity_snr_plus1: Option<f64>,
    pub beta_m_inv_sr_inv: Option<f64>,
    pub spectral_width_ms: Option<f64>,
    pub decimal_time_hours: Option<f64>,
    pub azimuth_deg: Option<f64>,
    pub elevation_deg: Option<f64>,
    pub pitch_deg: Option<f64>,
    pub roll_deg: Option<f64>,
    pub qc_selected: bool,
    pub qc_failed_rules_csv: Option<String>,
    pub qc_failed_rule_count: i64,
}

/// Explicit evaluation state derived from the persisted
/// (qc_selected, qc_failed_rule_count) pair. The (false, 0) pair is the
/// pre-evaluation sentinel; a genuine pass always sets qc_selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QcState {
    Unevaluated,
    Passed,
    Failed,
}

impl GateObservation {
    pub fn qc_state(&self) -> QcState {
        match (self.qc_selected, self.qc_failed_rule_count) {
            (true, _) => QcState::Passed,
            (false, 0) => QcState::Unevaluated,
            (false, _) => QcState::Failed,
        }
    }
}

/// One active-or-inactive QC rule definition. `def_name` maps to a
/// registered predicate identifier.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct QcRuleDefinition {
    pub rule_id: i64,
    pub def_name: String,
    pub is_active: bool,
    pub rule_order: i64,
    pub description: Option<String>,
}

/// One VAD fit per (header, range gate). Upserted in place on re-solve.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WindFitResult {
    pub header_id: i64,
    pub range_gate_index: i64,
    pub run_id: i64,
    pub rule_tag: Option<String>,
    pub u_ms: Option<f64>,
    pub v_ms: Option<f64>,
    pub w_ms: Option<f64>,
    pub speed_ms: Option<f64>,
    pub dir_deg: Option<f64>,
    pub r2: Option<f64>,
    pub rmse_ms: Option<f64>,
    pub cond_num: Option<f64>,
    pub a_rank: Option<i64>,
    pub svd_singular_values: Option<String>,
    pub warn_flags: Option<String>,
    pub status: String,
    pub n_total_rays: Option<i64>,
    pub n_selected_rays: Option<i64>,
    pub selected_ray_idx_csv: Option<String>,
    pub selected_azimuth_deg_csv: Option<String>,
    pub selected_elevation_deg_csv: Option<String>,
    pub az_span_deg: Option<f64>,
    pub code_version: Option<String>,
}

/// Fit status values persisted in `wind_fit.status`
pub const FIT_STATUS_OK: &str = "ok";
pub const FIT_STATUS_SOLVE_FAIL: &str = "solve_fail";

/// Provenance row for one wind-retrieval batch. A null `finished_at`
/// marks every fit stamped with this run id as provisional.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProcessingRun {
    pub run_id: i64,
    pub rule_tag: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}
