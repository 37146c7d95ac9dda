//! Run provenance for wind-retrieval batches
//!
//! A run row is created before the first chunk and finished after the
//! last. A row whose `finished_at` stays null marks every fit stamped
//! with that run id as provisional until a later run overwrites them.

use chrono::Utc;
use dlwp_common::db::models::ProcessingRun;
use dlwp_common::Result;
use sqlx::SqlitePool;
use tracing::info;

/// Open a new processing run. Run ids are UTC epoch milliseconds at
/// start, so back-to-back batches get distinct ids.
pub async fn start_run(pool: &SqlitePool, rule_tag: &str) -> Result<ProcessingRun> {
    let started_at = Utc::now();
    let run_id = started_at.timestamp_millis();
    sqlx::query("INSERT INTO proc_run (run_id, rule_tag, started_at) VALUES (?, ?, ?)")
        .bind(run_id)
        .bind(rule_tag)
        .bind(started_at)
        .execute(pool)
        .await?;
    info!(run_id, rule_tag, "started processing run");
    Ok(ProcessingRun {
        run_id,
        rule_tag: Some(rule_tag.to_string()),
        started_at,
        finished_at: None,
    })
}

/// Mark the run cleanly completed
pub async fn finish_run(pool: &SqlitePool, run_id: i64) -> Result<()> {
    sqlx::query("UPDATE proc_run SET finished_at = ? WHERE run_id = ?")
        .bind(Utc::now())
        .bind(run_id)
        .execute(pool)
        .await?;
    info!(run_id, "finished processing run");
    Ok(())
}
