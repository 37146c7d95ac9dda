//! VAD (Velocity-Azimuth-Display) least-squares wind retrieval
//!
//! Inverts radial velocities sampled across azimuths at a single effective
//! elevation into (u, v, w) wind components:
//!
//!   vr = u * cos(az) * cos(elev) + v * sin(az) * cos(elev) + w * sin(elev)
//!
//! Ordinary least squares over the 3-column design matrix, solved through
//! the SVD so the singular values, rank, and condition number fall out as
//! solve-quality diagnostics.

use dlwp_common::SolveParams;
use nalgebra::{DMatrix, DVector, SVD};
use thiserror::Error;

pub const WARN_ILLCOND: &str = "ILLCOND";
pub const WARN_LOWRANK: &str = "LOWRANK";
pub const WARN_LOWSPAN: &str = "LOWSPAN";

/// Numerical failure of one gate's solve. Recorded as a `solve_fail` fit
/// row by the batch driver, never propagated out of the batch.
#[derive(Debug, Error)]
pub enum SolveError {
    #[error("SVD iteration did not converge")]
    NoConvergence,

    #[error("solution contains non-finite components")]
    NonFinite,

    #[error("need at least 3 rays, got {0}")]
    TooFewRays(usize),
}

/// One gate's wind estimate with numerical diagnostics
#[derive(Debug, Clone)]
pub struct VadSolution {
    pub u_ms: f64,
    pub v_ms: f64,
    pub w_ms: f64,
    pub speed_ms: f64,
    /// Meteorological direction: where the wind comes from, degrees
    /// clockwise from north
    pub dir_deg: f64,
    pub r2: f64,
    pub rmse_ms: f64,
    /// Singular values of the design matrix, descending
    pub singular_values: Vec<f64>,
    pub rank: usize,
    /// Ratio of largest to smallest singular value; infinite when the
    /// system is rank deficient below 2
    pub cond_num: f64,
}

/// Assemble the n x 3 VAD design matrix for one gate's selected rays
pub fn build_design_matrix(az_deg: &[f64], elev_rad: f64) -> DMatrix<f64> {
    let (sin_e, cos_e) = elev_rad.sin_cos();
    DMatrix::from_fn(az_deg.len(), 3, |i, j| {
        let theta = az_deg[i].to_radians();
        match j {
            0 => theta.cos() * cos_e,
            1 => theta.sin() * cos_e,
            _ => sin_e,
        }
    })
}

/// Solve one gate's overdetermined VAD system by ordinary least squares.
///
/// `mean_elev_rad` is the mean elevation across the selected rays;
/// elevation is treated as constant within one gate's ray set.
pub fn solve_vad(
    az_deg: &[f64],
    vr_ms: &[f64],
    mean_elev_rad: f64,
) -> Result<VadSolution, SolveError> {
    let n = az_deg.len();
    if n < 3 || vr_ms.len() != n {
        return Err(SolveError::TooFewRays(n.min(vr_ms.len())));
    }

    let a = build_design_matrix(az_deg, mean_elev_rad);
    let b = DVector::from_column_slice(vr_ms);

    let svd = SVD::try_new(a.clone(), true, true, f64::EPSILON, 0)
        .ok_or(SolveError::NoConvergence)?;

    let mut singular_values: Vec<f64> = svd.singular_values.iter().copied().collect();
    singular_values.sort_by(|x, y| y.total_cmp(x));
    let s_max = singular_values.first().copied().unwrap_or(0.0);
    let s_min = singular_values.last().copied().unwrap_or(0.0);

    // Rank tolerance matching the usual lstsq default: eps scaled by the
    // matrix's larger dimension and largest singular value
    let rank_eps = s_max * f64::EPSILON * n.max(3) as f64;
    let rank = svd.rank(rank_eps);

    let x = svd.solve(&b, rank_eps).map_err(|_| SolveError::NoConvergence)?;
    let (u, v, w) = (x[0], x[1], x[2]);
    if !(u.is_finite() && v.is_finite() && w.is_finite()) {
        return Err(SolveError::NonFinite);
    }

    let y_hat = &a * &x;
    let ss_res: f64 = b
        .iter()
        .zip(y_hat.iter())
        .map(|(y, f)| (y - f).powi(2))
        .sum();
    let mean_y = b.iter().sum::<f64>() / n as f64;
    let ss_tot: f64 = b.iter().map(|y| (y - mean_y).powi(2)).sum();
    let r2 = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 };
    let rmse_ms = (ss_res / (n.saturating_sub(3)).max(1) as f64).sqrt();

    let cond_num = if rank < 2 || s_min <= 0.0 {
        f64::INFINITY
    } else {
        s_max / s_min
    };

    let speed_ms = u.hypot(v);
    // Wind direction denotes origin, not travel: rotate the travel
    // bearing atan2(u, v) by 180 degrees
    let dir_deg = (u.atan2(v).to_degrees().rem_euclid(360.0) + 180.0).rem_euclid(360.0);

    Ok(VadSolution {
        u_ms: u,
        v_ms: v,
        w_ms: w,
        speed_ms,
        dir_deg,
        r2,
        rmse_ms,
        singular_values,
        rank,
        cond_num,
    })
}

/// Independent solve-quality flags for one fit
pub fn warning_flags(
    solution: &VadSolution,
    az_span_deg: f64,
    params: &SolveParams,
) -> Vec<&'static str> {
    let mut flags = Vec::new();
    if solution.cond_num > params.cond_max {
        flags.push(WARN_ILLCOND);
    }
    if solution.rank < params.rank_min {
        flags.push(WARN_LOWRANK);
    }
    if az_span_deg < params.az_span_min_deg {
        flags.push(WARN_LOWSPAN);
    }
    flags
}
