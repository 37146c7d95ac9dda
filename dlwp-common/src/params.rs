//! QC and solver parameter sets
//!
//! All thresholds used by the rule predicates and the VAD solver live here,
//! as typed structs with the reference defaults. Any field can be overridden
//! from the TOML config file; unspecified fields keep their defaults.

use serde::Deserialize;

/// Thresholds consumed by the QC context builder and rule predicates
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QcParams {
    /// Minimum SNR, applied to (intensity_snr_plus1 - 1).
    pub snr_min: f64,

    /// Spectral-width ceiling as a multiple of the instrument spectral width.
    pub k_spectral_width: f64,

    /// Maximum absolute pitch or roll in degrees.
    pub tilt_abs_max_deg: f64,

    /// Accepted elevation range in degrees.
    pub elev_min_deg: f64,
    pub elev_max_deg: f64,

    /// Angular tolerance for azimuth canonicalization and duplicate
    /// merging, in degrees. Azimuths within this distance of 0/360
    /// collapse to 0.
    pub az_dup_tol_deg: f64,

    /// Maximum absolute radial velocity in m/s.
    pub vr_abs_max_ms: f64,

    /// Outlier cut in scaled-MAD units.
    pub mad_k: f64,

    /// Floor applied to the raw MAD before scaling, m/s. Keeps
    /// near-constant gates from amplifying tiny deviations.
    pub mad_floor: f64,

    /// Minimum distinct canonical azimuths per gate.
    pub min_rays: usize,

    /// Minimum circular azimuth span per gate, degrees.
    pub min_span_deg: f64,

    /// Width of the coarse azimuth sectors for the bin-fill metric, degrees.
    pub bin_deg: f64,

    /// Minimum populated sectors per gate.
    pub min_nonempty_bins: usize,

    /// Maximum allowed deviation of a gate's median radial velocity from
    /// the mean of its neighbors' medians, m/s.
    pub vert_thr_ms: f64,

    /// Upper bound on pending headers fetched per QC pass.
    pub header_fetch_limit: i64,
}

impl Default for QcParams {
    fn default() -> Self {
        Self {
            snr_min: 0.015,
            k_spectral_width: 1.5,
            tilt_abs_max_deg: 2.0,
            elev_min_deg: 10.0,
            elev_max_deg: 89.9,
            az_dup_tol_deg: 0.1,
            vr_abs_max_ms: 60.0,
            mad_k: 3.5,
            mad_floor: 0.05,
            min_rays: 3,
            min_span_deg: 120.0,
            bin_deg: 10.0,
            min_nonempty_bins: 3,
            vert_thr_ms: 2.0,
            header_fetch_limit: 2000,
        }
    }
}

/// Thresholds consumed by the VAD wind pass
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SolveParams {
    /// Minimum QC-selected rays for a (header, gate) to enter the
    /// candidate set.
    pub min_selected_to_solve: i64,

    /// Maximum rays fed into one solve, picked by descending SNR.
    pub max_selected: i64,

    /// Candidate gates solved and upserted per store round trip.
    pub chunk_size: usize,

    /// Condition number above which the fit is flagged ILLCOND.
    pub cond_max: f64,

    /// Design-matrix rank below which the fit is flagged LOWRANK.
    pub rank_min: usize,

    /// Selected-azimuth circular span below which the fit is flagged
    /// LOWSPAN, degrees.
    pub az_span_min_deg: f64,

    /// Provenance tag stamped on proc_run and wind_fit rows.
    pub rule_tag: String,
}

impl Default for SolveParams {
    fn default() -> Self {
        Self {
            min_selected_to_solve: 3,
            max_selected: 6,
            chunk_size: 1000,
            cond_max: 1e6,
            rank_min: 3,
            az_span_min_deg: 120.0,
            rule_tag: "VAD_STANDARD".to_string(),
        }
    }
}
