//! VAD wind-retrieval pass
//!
//! Discovers (header, gate) pairs with enough QC-selected rays, solves
//! each through the VAD inversion, and upserts the fits in fixed-size
//! chunks. One chunk is one transaction; a failed chunk rolls back, is
//! logged, and the pass continues. Every fit row is stamped with the
//! current run id and rule tag.

use crate::run_tracker;
use crate::store::{self, CandidateGate, SelectedRay};
use dlwp_common::db::models::{WindFitResult, FIT_STATUS_OK, FIT_STATUS_SOLVE_FAIL};
use dlwp_common::{Result, SolveParams};
use dlwp_core::angles::circular_span_deg;
use dlwp_core::solver::{solve_vad, warning_flags};
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const CODE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Counters reported by one wind pass
#[derive(Debug, Default, Clone)]
pub struct WindSummary {
    pub gates_solved: u64,
    pub gates_failed: u64,
    pub chunks_failed: u64,
    pub cancelled: bool,
    pub run_id: i64,
}

/// Run one wind-retrieval batch over every solvable gate.
pub async fn run_wind_pass(
    pool: &SqlitePool,
    params: &SolveParams,
    cancel: &CancellationToken,
) -> Result<WindSummary> {
    let candidates = store::fetch_candidate_gates(pool, params.min_selected_to_solve).await?;

    let run = run_tracker::start_run(pool, &params.rule_tag).await?;
    let mut summary = WindSummary {
        run_id: run.run_id,
        ..Default::default()
    };

    if candidates.is_empty() {
        info!("no solvable gates found");
        run_tracker::finish_run(pool, run.run_id).await?;
        return Ok(summary);
    }
    info!(gates = candidates.len(), run_id = run.run_id, "starting wind pass");

    let chunk_size = params.chunk_size.max(1);
    let total_chunks = candidates.len().div_ceil(chunk_size);
    for (chunk_idx, chunk) in candidates.chunks(chunk_size).enumerate() {
        if cancel.is_cancelled() {
            warn!(
                remaining_chunks = total_chunks - chunk_idx,
                "wind pass cancelled"
            );
            summary.cancelled = true;
            break;
        }
        match process_chunk(pool, chunk, run.run_id, params).await {
            Ok((solved, failed)) => {
                summary.gates_solved += solved;
                summary.gates_failed += failed;
                info!(
                    chunk = chunk_idx + 1,
                    total_chunks, solved, failed, "chunk upserted"
                );
            }
            Err(e) => {
                summary.chunks_failed += 1;
                warn!(chunk = chunk_idx + 1, error = %e, "chunk skipped");
            }
        }
    }

    if !summary.cancelled {
        run_tracker::finish_run(pool, run.run_id).await?;
    }
    info!(
        gates_solved = summary.gates_solved,
        gates_failed = summary.gates_failed,
        chunks_failed = summary.chunks_failed,
        "wind pass complete"
    );
    Ok(summary)
}

/// Solve one chunk of candidate gates and upsert the fits in one
/// transaction. Returns (gates solved ok, gates recorded solve_fail).
async fn process_chunk(
    pool: &SqlitePool,
    chunk: &[CandidateGate],
    run_id: i64,
    params: &SolveParams,
) -> Result<(u64, u64)> {
    let mut fits = Vec::with_capacity(chunk.len());
    let (mut solved, mut failed) = (0u64, 0u64);

    for gate in chunk {
        let n_total =
            store::count_gate_rays(pool, gate.header_id, gate.range_gate_index).await?;
        let rays = store::fetch_selected_rays(
            pool,
            gate.header_id,
            gate.range_gate_index,
            params.max_selected,
        )
        .await?;
        if rays.is_empty() {
            continue;
        }

        let fit = solve_gate(gate, &rays, n_total, run_id, params);
        if fit.status == FIT_STATUS_OK {
            solved += 1;
        } else {
            failed += 1;
        }
        fits.push(fit);
    }

    store::upsert_wind_fits(pool, &fits).await?;
    Ok((solved, failed))
}

/// Build one gate's fit row: solve if the usable rays allow it, or record
/// a solve_fail result that keeps the provenance fields.
fn solve_gate(
    gate: &CandidateGate,
    rays: &[SelectedRay],
    n_total: i64,
    run_id: i64,
    params: &SolveParams,
) -> WindFitResult {
    // Rays with a null azimuth or velocity cannot enter the design
    // matrix; they only appear when the null-check rule is inactive
    let usable: Vec<&SelectedRay> = rays
        .iter()
        .filter(|r| r.azimuth_deg.is_some() && r.doppler_ms.is_some())
        .collect();

    let az: Vec<f64> = usable.iter().map(|r| r.azimuth_deg.unwrap_or(0.0)).collect();
    let vr: Vec<f64> = usable.iter().map(|r| r.doppler_ms.unwrap_or(0.0)).collect();
    let elevs: Vec<f64> = usable.iter().filter_map(|r| r.elevation_deg).collect();
    let mean_elev_rad = if elevs.is_empty() {
        0.0
    } else {
        (elevs.iter().sum::<f64>() / elevs.len() as f64).to_radians()
    };

    let ray_csv = usable
        .iter()
        .map(|r| r.ray_idx.to_string())
        .collect::<Vec<_>>()
        .join(",");
    let az_csv = az
        .iter()
        .map(|a| format!("{a:.2}"))
        .collect::<Vec<_>>()
        .join(",");
    let el_csv = if elevs.is_empty() {
        None
    } else {
        Some(
            elevs
                .iter()
                .map(|e| format!("{e:.2}"))
                .collect::<Vec<_>>()
                .join(","),
        )
    };
    let span_deg = (circular_span_deg(&az) * 1000.0).round() / 1000.0;

    let mut fit = WindFitResult {
        header_id: gate.header_id,
        range_gate_index: gate.range_gate_index,
        run_id,
        rule_tag: Some(params.rule_tag.clone()),
        u_ms: None,
        v_ms: None,
        w_ms: None,
        speed_ms: None,
        dir_deg: None,
        r2: None,
        rmse_ms: None,
        cond_num: None,
        a_rank: None,
        svd_singular_values: None,
        warn_flags: None,
        status: FIT_STATUS_SOLVE_FAIL.to_string(),
        n_total_rays: Some(n_total),
        n_selected_rays: Some(usable.len() as i64),
        selected_ray_idx_csv: Some(ray_csv),
        selected_azimuth_deg_csv: Some(az_csv),
        selected_elevation_deg_csv: el_csv,
        az_span_deg: Some(span_deg),
        code_version: Some(CODE_VERSION.to_string()),
    };

    match solve_vad(&az, &vr, mean_elev_rad) {
        Ok(sol) => {
            let flags = warning_flags(&sol, span_deg, params);
            fit.u_ms = Some(sol.u_ms);
            fit.v_ms = Some(sol.v_ms);
            fit.w_ms = Some(sol.w_ms);
            fit.speed_ms = Some(sol.speed_ms);
            fit.dir_deg = Some(sol.dir_deg);
            fit.r2 = Some(sol.r2);
            fit.rmse_ms = Some(sol.rmse_ms);
            fit.cond_num = Some(sol.cond_num);
            fit.a_rank = Some(sol.rank as i64);
            fit.svd_singular_values = Some(
                sol.singular_values
                    .iter()
                    .map(|s| format!("{s:.4}"))
                    .collect::<Vec<_>>()
                    .join(","),
            );
            fit.warn_flags = if flags.is_empty() {
                None
            } else {
                Some(flags.join(","))
            };
            fit.status = FIT_STATUS_OK.to_string();
        }
        Err(e) => {
            debug!(
                header_id = gate.header_id,
                range_gate_index = gate.range_gate_index,
                error = %e,
                "gate solve failed"
            );
        }
    }

    fit
}
