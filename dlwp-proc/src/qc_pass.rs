//! QC tagging pass
//!
//! One header is one atomic unit of work: fetch its rows, build the gate
//! context, evaluate every active rule against every row, and commit all
//! tags in one transaction. A failed unit rolls back, is logged, and the
//! pass moves on; partial progress survives.

use crate::store::{self, RowTag};
use dlwp_common::{QcParams, Result};
use dlwp_core::context::GateContext;
use dlwp_core::rules::{bind_active_rules, evaluate_row, ActiveRule};
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Counters reported by one QC pass
#[derive(Debug, Default, Clone)]
pub struct QcSummary {
    pub headers_processed: u64,
    pub headers_failed: u64,
    pub rows_passed: u64,
    pub rows_failed: u64,
    pub cancelled: bool,
}

/// Run one QC batch over every pending header.
///
/// Setup failures (unreachable store, no active rules, an active rule
/// with no registered predicate) abort before any row is touched.
/// Per-header failures are logged and skipped.
pub async fn run_qc_pass(
    pool: &SqlitePool,
    params: &QcParams,
    cancel: &CancellationToken,
) -> Result<QcSummary> {
    // Snapshot the active rule set once; concurrent edits to the rule
    // table do not affect a run in flight
    let defs = store::fetch_active_rules(pool).await?;
    let active = bind_active_rules(&defs)?;
    info!(rules = active.len(), "bound active QC rules");

    let pending = store::fetch_pending_headers(pool, params.header_fetch_limit).await?;
    if pending.is_empty() {
        info!("no pending headers");
        return Ok(QcSummary::default());
    }
    info!(headers = pending.len(), "starting QC pass");

    let mut summary = QcSummary::default();
    for (idx, header_id) in pending.iter().enumerate() {
        if cancel.is_cancelled() {
            warn!(remaining = pending.len() - idx, "QC pass cancelled");
            summary.cancelled = true;
            break;
        }
        match process_header(pool, *header_id, &active, params).await {
            Ok((passed, failed)) => {
                summary.headers_processed += 1;
                summary.rows_passed += passed;
                summary.rows_failed += failed;
                info!(
                    header_id,
                    passed,
                    failed,
                    unit = idx + 1,
                    total = pending.len(),
                    "header tagged"
                );
            }
            Err(e) => {
                summary.headers_failed += 1;
                warn!(header_id, error = %e, "header skipped");
            }
        }
    }

    info!(
        headers_processed = summary.headers_processed,
        headers_failed = summary.headers_failed,
        rows_passed = summary.rows_passed,
        rows_failed = summary.rows_failed,
        "QC pass complete"
    );
    Ok(summary)
}

/// Evaluate and persist one header. Returns (rows passed, rows failed).
async fn process_header(
    pool: &SqlitePool,
    header_id: i64,
    active: &[ActiveRule],
    params: &QcParams,
) -> Result<(u64, u64)> {
    let header = store::fetch_header(pool, header_id).await?;
    let rows = store::fetch_observations(pool, header_id).await?;
    let ctx = GateContext::build(&header, &rows, params);

    let mut tags = Vec::with_capacity(rows.len());
    let (mut passed, mut failed) = (0u64, 0u64);
    for row in &rows {
        let verdict = evaluate_row(row, &ctx, active, params);
        if verdict.selected {
            passed += 1;
        } else {
            failed += 1;
        }
        tags.push(RowTag {
            range_gate_index: row.range_gate_index,
            ray_idx: row.ray_idx,
            selected: verdict.selected,
            failed_rules_csv: verdict.failed_csv(),
            failed_rule_count: verdict.failed_count(),
        });
    }

    store::apply_row_tags(pool, header_id, &tags).await?;
    Ok((passed, failed))
}
