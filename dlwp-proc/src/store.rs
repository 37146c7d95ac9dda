//! Store queries for the QC and wind passes
//!
//! All SQL lives here; the pass drivers only see typed rows. Writes that
//! form one unit of work (one header's tags, one chunk's fits) run inside
//! a single transaction.

use dlwp_common::db::models::{
    GateObservation, QcRuleDefinition, ScanHeader, WindFitResult,
};
use dlwp_common::Result;
use sqlx::SqlitePool;

/// Snapshot of the active rule definitions, evaluation order
pub async fn fetch_active_rules(pool: &SqlitePool) -> Result<Vec<QcRuleDefinition>> {
    let rules = sqlx::query_as::<_, QcRuleDefinition>(
        "SELECT rule_id, def_name, is_active, rule_order, description
         FROM qc_rule WHERE is_active = 1
         ORDER BY rule_order, rule_id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rules)
}

/// Headers whose rows are still in the unevaluated sentinel state
/// (qc_selected = 0 AND qc_failed_rule_count = 0)
pub async fn fetch_pending_headers(pool: &SqlitePool, limit: i64) -> Result<Vec<i64>> {
    let ids = sqlx::query_scalar::<_, i64>(
        "SELECT DISTINCT header_id FROM gate_observation
         WHERE qc_selected = 0 AND qc_failed_rule_count = 0
         ORDER BY header_id LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

pub async fn fetch_header(pool: &SqlitePool, header_id: i64) -> Result<ScanHeader> {
    let header = sqlx::query_as::<_, ScanHeader>(
        "SELECT header_id, num_gates, num_rays_in_file, range_gate_length_m,
                instrument_spectral_width_ms, start_time
         FROM scan_header WHERE header_id = ?",
    )
    .bind(header_id)
    .fetch_one(pool)
    .await?;
    Ok(header)
}

pub async fn fetch_observations(
    pool: &SqlitePool,
    header_id: i64,
) -> Result<Vec<GateObservation>> {
    let rows = sqlx::query_as::<_, GateObservation>(
        "SELECT header_id, ray_idx, range_gate_index, doppler_ms,
                intensity_snr_plus1, beta_m_inv_sr_inv, spectral_width_ms,
                decimal_time_hours, azimuth_deg, elevation_deg, pitch_deg,
                roll_deg, qc_selected, qc_failed_rules_csv, qc_failed_rule_count
         FROM gate_observation WHERE header_id = ?
         ORDER BY range_gate_index, ray_idx",
    )
    .bind(header_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// One row's QC outcome, keyed within its header
pub struct RowTag {
    pub range_gate_index: i64,
    pub ray_idx: i64,
    pub selected: bool,
    pub failed_rules_csv: Option<String>,
    pub failed_rule_count: i64,
}

/// Persist one header's QC outcomes as a single transaction
pub async fn apply_row_tags(pool: &SqlitePool, header_id: i64, tags: &[RowTag]) -> Result<()> {
    let mut tx = pool.begin().await?;
    for tag in tags {
        sqlx::query(
            "UPDATE gate_observation
             SET qc_selected = ?, qc_failed_rules_csv = ?, qc_failed_rule_count = ?
             WHERE header_id = ? AND range_gate_index = ? AND ray_idx = ?",
        )
        .bind(tag.selected)
        .bind(&tag.failed_rules_csv)
        .bind(tag.failed_rule_count)
        .bind(header_id)
        .bind(tag.range_gate_index)
        .bind(tag.ray_idx)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// A (header, gate) pair with enough QC-selected rays to attempt a solve
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CandidateGate {
    pub header_id: i64,
    pub range_gate_index: i64,
    pub qualified_count: i64,
}

pub async fn fetch_candidate_gates(
    pool: &SqlitePool,
    min_selected: i64,
) -> Result<Vec<CandidateGate>> {
    let gates = sqlx::query_as::<_, CandidateGate>(
        "SELECT header_id, range_gate_index, COUNT(*) AS qualified_count
         FROM gate_observation WHERE qc_selected = 1
         GROUP BY header_id, range_gate_index
         HAVING qualified_count >= ?
         ORDER BY header_id, range_gate_index",
    )
    .bind(min_selected)
    .fetch_all(pool)
    .await?;
    Ok(gates)
}

/// One QC-selected ray as fed to the solver
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SelectedRay {
    pub ray_idx: i64,
    pub azimuth_deg: Option<f64>,
    pub elevation_deg: Option<f64>,
    pub doppler_ms: Option<f64>,
}

/// The gate's QC-selected rays, strongest SNR first, capped at `limit`
pub async fn fetch_selected_rays(
    pool: &SqlitePool,
    header_id: i64,
    range_gate_index: i64,
    limit: i64,
) -> Result<Vec<SelectedRay>> {
    let rays = sqlx::query_as::<_, SelectedRay>(
        "SELECT ray_idx, azimuth_deg, elevation_deg, doppler_ms
         FROM gate_observation
         WHERE header_id = ? AND range_gate_index = ? AND qc_selected = 1
         ORDER BY intensity_snr_plus1 DESC
         LIMIT ?",
    )
    .bind(header_id)
    .bind(range_gate_index)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rays)
}

/// Total rays recorded for the gate, selected or not
pub async fn count_gate_rays(
    pool: &SqlitePool,
    header_id: i64,
    range_gate_index: i64,
) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM gate_observation
         WHERE header_id = ? AND range_gate_index = ?",
    )
    .bind(header_id)
    .bind(range_gate_index)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Upsert one chunk's fits in a single transaction, keyed by
/// (header_id, range_gate_index). Reprocessing overwrites in place.
pub async fn upsert_wind_fits(pool: &SqlitePool, fits: &[WindFitResult]) -> Result<()> {
    let mut tx = pool.begin().await?;
    for fit in fits {
        sqlx::query(
            "INSERT INTO wind_fit (
                header_id, range_gate_index, run_id, rule_tag,
                u_ms, v_ms, w_ms, speed_ms, dir_deg, r2, rmse_ms,
                cond_num, a_rank, svd_singular_values, warn_flags, status,
                n_total_rays, n_selected_rays, selected_ray_idx_csv,
                selected_azimuth_deg_csv, selected_elevation_deg_csv,
                az_span_deg, code_version
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(header_id, range_gate_index) DO UPDATE SET
                run_id = excluded.run_id,
                rule_tag = excluded.rule_tag,
                u_ms = excluded.u_ms,
                v_ms = excluded.v_ms,
                w_ms = excluded.w_ms,
                speed_ms = excluded.speed_ms,
                dir_deg = excluded.dir_deg,
                r2 = excluded.r2,
                rmse_ms = excluded.rmse_ms,
                cond_num = excluded.cond_num,
                a_rank = excluded.a_rank,
                svd_singular_values = excluded.svd_singular_values,
                warn_flags = excluded.warn_flags,
                status = excluded.status,
                n_total_rays = excluded.n_total_rays,
                n_selected_rays = excluded.n_selected_rays,
                selected_ray_idx_csv = excluded.selected_ray_idx_csv,
                selected_azimuth_deg_csv = excluded.selected_azimuth_deg_csv,
                selected_elevation_deg_csv = excluded.selected_elevation_deg_csv,
                az_span_deg = excluded.az_span_deg,
                code_version = excluded.code_version",
        )
        .bind(fit.header_id)
        .bind(fit.range_gate_index)
        .bind(fit.run_id)
        .bind(&fit.rule_tag)
        .bind(fit.u_ms)
        .bind(fit.v_ms)
        .bind(fit.w_ms)
        .bind(fit.speed_ms)
        .bind(fit.dir_deg)
        .bind(fit.r2)
        .bind(fit.rmse_ms)
        .bind(fit.cond_num)
        .bind(fit.a_rank)
        .bind(&fit.svd_singular_values)
        .bind(&fit.warn_flags)
        .bind(&fit.status)
        .bind(fit.n_total_rays)
        .bind(fit.n_selected_rays)
        .bind(&fit.selected_ray_idx_csv)
        .bind(&fit.selected_azimuth_deg_csv)
        .bind(&fit.selected_elevation_deg_csv)
        .bind(fit.az_span_deg)
        .bind(&fit.code_version)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}
