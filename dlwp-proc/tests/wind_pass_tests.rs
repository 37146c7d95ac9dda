//! End-to-end wind pass tests against a temporary SQLite store

use dlwp_common::db::init_database;
use dlwp_common::SolveParams;
use dlwp_proc::run_wind_pass;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

async fn test_pool() -> (SqlitePool, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("dlwp.db")).await.unwrap();
    (pool, dir)
}

async fn insert_header(pool: &SqlitePool, header_id: i64) {
    sqlx::query(
        "INSERT INTO scan_header (header_id, num_gates, num_rays_in_file,
             range_gate_length_m, instrument_spectral_width_ms)
         VALUES (?, 4, 8, 30.0, 2.0)",
    )
    .bind(header_id)
    .execute(pool)
    .await
    .unwrap();
}

#[allow(clippy::too_many_arguments)]
async fn insert_selected_ray(
    pool: &SqlitePool,
    header_id: i64,
    gate: i64,
    ray: i64,
    vr: f64,
    az: f64,
    snr: f64,
    selected: bool,
) {
    sqlx::query(
        "INSERT INTO gate_observation (header_id, ray_idx, range_gate_index,
             doppler_ms, intensity_snr_plus1, spectral_width_ms,
             azimuth_deg, elevation_deg, pitch_deg, roll_deg,
             qc_selected, qc_failed_rule_count)
         VALUES (?, ?, ?, ?, ?, 1.0, ?, 75.0, 0.0, 0.0, ?, ?)",
    )
    .bind(header_id)
    .bind(ray)
    .bind(gate)
    .bind(vr)
    .bind(snr)
    .bind(az)
    .bind(selected)
    .bind(if selected { 0 } else { 1 })
    .execute(pool)
    .await
    .unwrap();
}

/// Radial velocity the instrument would record for a known wind
fn vr_forward(u: f64, v: f64, w: f64, az_deg: f64, elev_deg: f64) -> f64 {
    let theta = az_deg.to_radians();
    let phi = elev_deg.to_radians();
    u * theta.cos() * phi.cos() + v * theta.sin() * phi.cos() + w * phi.sin()
}

#[derive(Debug, sqlx::FromRow)]
struct FitRow {
    header_id: i64,
    range_gate_index: i64,
    run_id: i64,
    u_ms: Option<f64>,
    v_ms: Option<f64>,
    w_ms: Option<f64>,
    a_rank: Option<i64>,
    cond_num: Option<f64>,
    warn_flags: Option<String>,
    status: String,
    n_selected_rays: Option<i64>,
    selected_ray_idx_csv: Option<String>,
    az_span_deg: Option<f64>,
}

async fn fetch_fits(pool: &SqlitePool) -> Vec<FitRow> {
    sqlx::query_as(
        "SELECT header_id, range_gate_index, run_id, u_ms, v_ms, w_ms,
                a_rank, cond_num, warn_flags, status, n_selected_rays,
                selected_ray_idx_csv, az_span_deg
         FROM wind_fit ORDER BY header_id, range_gate_index",
    )
    .fetch_all(pool)
    .await
    .unwrap()
}

/// Quadrant scan built from u=5, v=3, w=0 at 75 degrees elevation is
/// recovered exactly, with full rank and full azimuth coverage.
#[tokio::test]
async fn test_recovers_synthetic_wind() {
    let (pool, _dir) = test_pool().await;
    insert_header(&pool, 1).await;
    for (ray, az) in [0.0_f64, 90.0, 180.0, 270.0].iter().enumerate() {
        let vr = vr_forward(5.0, 3.0, 0.0, *az, 75.0);
        insert_selected_ray(&pool, 1, 0, ray as i64, vr, *az, 1.5, true).await;
    }

    let summary = run_wind_pass(&pool, &SolveParams::default(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(summary.gates_solved, 1);
    assert_eq!(summary.gates_failed, 0);

    let fits = fetch_fits(&pool).await;
    assert_eq!(fits.len(), 1);
    let fit = &fits[0];
    assert_eq!((fit.header_id, fit.range_gate_index), (1, 0));
    assert_eq!(fit.status, "ok");
    assert!((fit.u_ms.unwrap() - 5.0).abs() < 1e-6);
    assert!((fit.v_ms.unwrap() - 3.0).abs() < 1e-6);
    assert!(fit.w_ms.unwrap().abs() < 1e-6);
    assert_eq!(fit.a_rank, Some(3));
    assert!(fit.cond_num.unwrap().is_finite());
    assert_eq!(fit.az_span_deg, Some(360.0));
    assert_eq!(fit.warn_flags, None);
    assert_eq!(fit.n_selected_rays, Some(4));

    // Clean completion closes the run
    let finished: Option<String> =
        sqlx::query_scalar("SELECT finished_at FROM proc_run WHERE run_id = ?")
            .bind(fits[0].run_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert!(finished.is_some(), "run left provisional after clean pass");
}

/// A gate with only two QC-selected rays never enters the candidate set
#[tokio::test]
async fn test_two_ray_gate_is_not_solvable() {
    let (pool, _dir) = test_pool().await;
    insert_header(&pool, 1).await;
    // Gate 0: solvable
    for (ray, az) in [0.0_f64, 120.0, 240.0].iter().enumerate() {
        let vr = vr_forward(2.0, 1.0, 0.0, *az, 75.0);
        insert_selected_ray(&pool, 1, 0, ray as i64, vr, *az, 1.5, true).await;
    }
    // Gate 1: only 2 selected rays, plus an unselected one
    insert_selected_ray(&pool, 1, 1, 0, 1.0, 0.0, 1.5, true).await;
    insert_selected_ray(&pool, 1, 1, 1, 1.0, 90.0, 1.5, true).await;
    insert_selected_ray(&pool, 1, 1, 2, 1.0, 180.0, 1.5, false).await;

    run_wind_pass(&pool, &SolveParams::default(), &CancellationToken::new())
        .await
        .unwrap();

    let fits = fetch_fits(&pool).await;
    assert_eq!(fits.len(), 1);
    assert_eq!(fits[0].range_gate_index, 0);
}

/// Rays are picked by descending SNR, capped at max_selected
#[tokio::test]
async fn test_ray_selection_prefers_high_snr() {
    let (pool, _dir) = test_pool().await;
    insert_header(&pool, 1).await;
    for ray in 0..8_i64 {
        let az = ray as f64 * 45.0;
        let vr = vr_forward(4.0, -1.0, 0.0, az, 75.0);
        // Rays 2 and 5 get the weakest SNR
        let snr = if ray == 2 || ray == 5 { 1.01 } else { 1.5 + ray as f64 * 0.01 };
        insert_selected_ray(&pool, 1, 0, ray, vr, az, snr, true).await;
    }

    run_wind_pass(&pool, &SolveParams::default(), &CancellationToken::new())
        .await
        .unwrap();

    let fits = fetch_fits(&pool).await;
    assert_eq!(fits[0].n_selected_rays, Some(6));
    let picked: Vec<&str> = fits[0]
        .selected_ray_idx_csv
        .as_deref()
        .unwrap()
        .split(',')
        .collect();
    assert_eq!(picked.len(), 6);
    assert!(!picked.contains(&"2"), "weak-SNR ray 2 selected: {picked:?}");
    assert!(!picked.contains(&"5"), "weak-SNR ray 5 selected: {picked:?}");
}

/// Re-running overwrites each (header, gate) fit in place
#[tokio::test]
async fn test_reprocessing_upserts_in_place() {
    let (pool, _dir) = test_pool().await;
    insert_header(&pool, 1).await;
    for (ray, az) in [0.0_f64, 90.0, 180.0, 270.0].iter().enumerate() {
        let vr = vr_forward(5.0, 3.0, 0.0, *az, 75.0);
        insert_selected_ray(&pool, 1, 0, ray as i64, vr, *az, 1.5, true).await;
    }

    let first = run_wind_pass(&pool, &SolveParams::default(), &CancellationToken::new())
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = run_wind_pass(&pool, &SolveParams::default(), &CancellationToken::new())
        .await
        .unwrap();
    assert_ne!(first.run_id, second.run_id);

    let fits = fetch_fits(&pool).await;
    assert_eq!(fits.len(), 1, "re-solve accumulated duplicate fits");
    assert_eq!(fits[0].run_id, second.run_id);
    assert!((fits[0].u_ms.unwrap() - 5.0).abs() < 1e-6);
}

/// A narrow scan solves but carries the LOWSPAN warning
#[tokio::test]
async fn test_narrow_span_is_flagged() {
    let (pool, _dir) = test_pool().await;
    insert_header(&pool, 1).await;
    for (ray, az) in [0.0_f64, 30.0, 60.0, 90.0].iter().enumerate() {
        let vr = vr_forward(5.0, 3.0, 0.0, *az, 75.0);
        insert_selected_ray(&pool, 1, 0, ray as i64, vr, *az, 1.5, true).await;
    }

    run_wind_pass(&pool, &SolveParams::default(), &CancellationToken::new())
        .await
        .unwrap();

    let fits = fetch_fits(&pool).await;
    assert_eq!(fits[0].status, "ok");
    assert_eq!(fits[0].az_span_deg, Some(90.0));
    let flags = fits[0].warn_flags.as_deref().unwrap();
    assert!(flags.contains("LOWSPAN"), "flags = {flags}");
}

/// A cancelled pass leaves its run row provisional (finished_at null)
#[tokio::test]
async fn test_cancelled_run_stays_provisional() {
    let (pool, _dir) = test_pool().await;
    insert_header(&pool, 1).await;
    for (ray, az) in [0.0_f64, 120.0, 240.0].iter().enumerate() {
        insert_selected_ray(&pool, 1, 0, ray as i64, 1.0, *az, 1.5, true).await;
    }

    let cancel = CancellationToken::new();
    cancel.cancel();
    let summary = run_wind_pass(&pool, &SolveParams::default(), &cancel)
        .await
        .unwrap();
    assert!(summary.cancelled);

    let finished: Option<String> =
        sqlx::query_scalar("SELECT finished_at FROM proc_run WHERE run_id = ?")
            .bind(summary.run_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert!(finished.is_none(), "cancelled run was marked finished");
    assert!(fetch_fits(&pool).await.is_empty());
}

/// An empty candidate set still completes its run cleanly
#[tokio::test]
async fn test_empty_batch_finishes_run() {
    let (pool, _dir) = test_pool().await;

    let summary = run_wind_pass(&pool, &SolveParams::default(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(summary.gates_solved, 0);

    let finished: Option<String> =
        sqlx::query_scalar("SELECT finished_at FROM proc_run WHERE run_id = ?")
            .bind(summary.run_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert!(finished.is_some());
}
