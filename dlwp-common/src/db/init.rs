//! Database initialization
//!
//! Creates the SQLite database on first run, applies the schema
//! idempotently, and seeds the standard QC rule set so a fresh database is
//! immediately runnable.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize the database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let pool = connect(db_path).await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_scan_header_table(&pool).await?;
    create_gate_observation_table(&pool).await?;
    create_qc_rule_table(&pool).await?;
    create_wind_fit_table(&pool).await?;
    create_proc_run_table(&pool).await?;

    seed_standard_rules(&pool).await?;

    Ok(pool)
}

/// Open a pool against an existing database file (no schema changes)
pub async fn connect(db_path: &Path) -> Result<SqlitePool> {
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL allows a reader (console, plotting) alongside the batch writer
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    Ok(pool)
}

async fn create_scan_header_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scan_header (
            header_id INTEGER PRIMARY KEY,
            num_gates INTEGER NOT NULL,
            num_rays_in_file INTEGER NOT NULL,
            range_gate_length_m REAL NOT NULL,
            instrument_spectral_width_ms REAL,
            start_time TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_gate_observation_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS gate_observation (
            header_id INTEGER NOT NULL,
            ray_idx INTEGER NOT NULL,
            range_gate_index INTEGER NOT NULL,
            doppler_ms REAL,
            intensity_snr_plus1 REAL,
            beta_m_inv_sr_inv REAL,
            spectral_width_ms REAL,
            decimal_time_hours REAL,
            azimuth_deg REAL,
            elevation_deg REAL,
            pitch_deg REAL,
            roll_deg REAL,
            qc_selected INTEGER NOT NULL DEFAULT 0,
            qc_failed_rules_csv TEXT,
            qc_failed_rule_count INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (header_id, range_gate_index, ray_idx),
            FOREIGN KEY (header_id) REFERENCES scan_header(header_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // The QC pass scans for the unevaluated sentinel; the wind pass scans
    // for selected rows grouped by gate.
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_gate_obs_qc
         ON gate_observation (qc_selected, qc_failed_rule_count)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_qc_rule_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS qc_rule (
            rule_id INTEGER PRIMARY KEY,
            def_name TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            rule_order INTEGER NOT NULL,
            description TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_wind_fit_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS wind_fit (
            header_id INTEGER NOT NULL,
            range_gate_index INTEGER NOT NULL,
            run_id INTEGER NOT NULL,
            rule_tag TEXT,
            u_ms REAL,
            v_ms REAL,
            w_ms REAL,
            speed_ms REAL,
            dir_deg REAL,
            r2 REAL,
            rmse_ms REAL,
            cond_num REAL,
            a_rank INTEGER,
            svd_singular_values TEXT,
            warn_flags TEXT,
            status TEXT NOT NULL,
            n_total_rays INTEGER,
            n_selected_rays INTEGER,
            selected_ray_idx_csv TEXT,
            selected_azimuth_deg_csv TEXT,
            selected_elevation_deg_csv TEXT,
            az_span_deg REAL,
            code_version TEXT,
            PRIMARY KEY (header_id, range_gate_index)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_proc_run_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS proc_run (
            run_id INTEGER PRIMARY KEY,
            rule_tag TEXT,
            started_at TEXT NOT NULL,
            finished_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Seed the standard rule set, active and in reference order. Idempotent:
/// existing rows (including operator edits) are left alone.
async fn seed_standard_rules(pool: &SqlitePool) -> Result<()> {
    const STANDARD_RULES: [(i64, &str, &str); 11] = [
        (1, "check_nulls", "radial velocity, azimuth, elevation all present"),
        (2, "check_snr_min", "(intensity - 1) at or above the SNR floor"),
        (3, "check_spectral_width_max", "spectral width within K x instrument width"),
        (4, "check_pitch_roll_max", "platform tilt within bound"),
        (5, "check_elevation_range", "elevation inside accepted range"),
        (6, "check_azimuth_duplicate_guard", "azimuth not a merged duplicate"),
        (7, "check_velocity_bounds", "absolute radial velocity within bound"),
        (8, "check_gate_outlier_mad", "ray not a robust (MAD) outlier in its gate"),
        (9, "check_azimuth_coverage_gate", "gate has enough distinct azimuths and span"),
        (10, "check_vertical_consistency", "gate median agrees with neighbor gates"),
        (11, "check_gate_uniform_bin_fill", "enough coarse azimuth sectors populated"),
    ];

    for (rule_id, def_name, description) in STANDARD_RULES {
        sqlx::query(
            "INSERT OR IGNORE INTO qc_rule (rule_id, def_name, is_active, rule_order, description)
             VALUES (?, ?, 1, ?, ?)",
        )
        .bind(rule_id)
        .bind(def_name)
        .bind(rule_id)
        .bind(description)
        .execute(pool)
        .await?;
    }

    Ok(())
}
