//! Per-scan gate context for QC rule evaluation
//!
//! Built once from all observation rows of one scan header, then read by
//! every rule predicate during that header's evaluation pass. Immutable
//! after construction.

use crate::angles::{circular_distance, circular_span_deg, normalize_azimuth};
use dlwp_common::db::models::{GateObservation, ScanHeader};
use dlwp_common::QcParams;
use std::collections::{BTreeMap, HashMap};

/// Identifies one row within a header: (range_gate_index, ray_idx)
pub type RowKey = (i64, i64);

/// Normal-consistency factor relating MAD to the standard deviation
const MAD_SCALE: f64 = 1.4826;

#[derive(Debug, Clone, Copy)]
pub struct GateCoverage {
    /// Distinct canonical azimuths in the gate
    pub count: usize,
    /// Circular span of those azimuths, degrees
    pub span_deg: f64,
}

/// Derived statistics for one scan header
#[derive(Debug)]
pub struct GateContext {
    instrument_spectral_width_ms: Option<f64>,
    dup_az: HashMap<RowKey, bool>,
    mad_fail: HashMap<RowKey, bool>,
    coverage: HashMap<i64, GateCoverage>,
    nonempty_bins: HashMap<i64, usize>,
    vert_metric: HashMap<i64, Option<f64>>,
}

impl GateContext {
    pub fn build(header: &ScanHeader, rows: &[GateObservation], params: &QcParams) -> Self {
        // BTreeMap keeps gates in index order for the neighbor metric
        let mut by_gate: BTreeMap<i64, Vec<&GateObservation>> = BTreeMap::new();
        for r in rows {
            by_gate.entry(r.range_gate_index).or_default().push(r);
        }

        let mut dup_az = HashMap::new();
        let mut unique_canon: HashMap<i64, Vec<f64>> = HashMap::new();
        for (&gate, members) in &by_gate {
            let (dups, canon) = snap_azimuths(members, params.az_dup_tol_deg);
            dup_az.extend(dups);
            unique_canon.insert(gate, canon);
        }

        let mut mad_fail = HashMap::new();
        let mut gate_medians: HashMap<i64, Option<f64>> = HashMap::new();
        for (&gate, members) in &by_gate {
            let vrs: Vec<f64> = members.iter().filter_map(|r| r.doppler_ms).collect();
            let med = median(&vrs);
            gate_medians.insert(gate, med);
            let sigma = median_abs_deviation(&vrs, med)
                .unwrap_or(params.mad_floor)
                .max(params.mad_floor);
            if let Some(med) = med {
                for r in members {
                    let flagged = match r.doppler_ms {
                        Some(vr) => (vr - med).abs() / (MAD_SCALE * sigma) > params.mad_k,
                        None => true,
                    };
                    mad_fail.insert((gate, r.ray_idx), flagged);
                }
            }
        }

        let mut coverage = HashMap::new();
        let mut nonempty_bins = HashMap::new();
        for &gate in by_gate.keys() {
            let uniq = &unique_canon[&gate];
            coverage.insert(
                gate,
                GateCoverage {
                    count: uniq.len(),
                    span_deg: circular_span_deg(uniq),
                },
            );
            let mut sectors: Vec<i64> = uniq
                .iter()
                .map(|a| (a / params.bin_deg).floor() as i64)
                .collect();
            sectors.sort_unstable();
            sectors.dedup();
            nonempty_bins.insert(gate, sectors.len());
        }

        // Vertical consistency: gate median vs mean of its immediate
        // neighbors' medians, walking the sorted gate list
        let gates: Vec<i64> = by_gate.keys().copied().collect();
        let mut vert_metric = HashMap::new();
        for (idx, &gate) in gates.iter().enumerate() {
            let neighbors: Vec<f64> = [idx.checked_sub(1), idx.checked_add(1)]
                .into_iter()
                .flatten()
                .filter_map(|j| gates.get(j))
                .filter_map(|g| gate_medians[g])
                .collect();
            let metric = match (gate_medians[&gate], neighbors.is_empty()) {
                (Some(med), false) => {
                    let mean = neighbors.iter().sum::<f64>() / neighbors.len() as f64;
                    Some((med - mean).abs())
                }
                _ => None,
            };
            vert_metric.insert(gate, metric);
        }

        Self {
            instrument_spectral_width_ms: header.instrument_spectral_width_ms,
            dup_az,
            mad_fail,
            coverage,
            nonempty_bins,
            vert_metric,
        }
    }

    pub fn instrument_spectral_width_ms(&self) -> Option<f64> {
        self.instrument_spectral_width_ms
    }

    /// True when the row's azimuth was merged into another canonical value
    /// (or is null)
    pub fn is_duplicate_azimuth(&self, key: RowKey) -> bool {
        self.dup_az.get(&key).copied().unwrap_or(false)
    }

    /// True when the row failed the robust per-gate outlier test
    pub fn is_mad_outlier(&self, key: RowKey) -> bool {
        self.mad_fail.get(&key).copied().unwrap_or(false)
    }

    pub fn coverage(&self, gate: i64) -> GateCoverage {
        self.coverage
            .get(&gate)
            .copied()
            .unwrap_or(GateCoverage { count: 0, span_deg: 0.0 })
    }

    pub fn nonempty_bins(&self, gate: i64) -> usize {
        self.nonempty_bins.get(&gate).copied().unwrap_or(0)
    }

    /// None when the gate has no usable neighbor comparison
    pub fn vertical_metric(&self, gate: i64) -> Option<f64> {
        self.vert_metric.get(&gate).copied().flatten()
    }
}

/// Canonicalize one gate's azimuths: normalize into [0, 360), sort
/// ascending, merge values within the tolerance into the first-seen
/// canonical, and mark the merged members as duplicates. Null azimuths
/// are always duplicates. Returns per-row duplicate flags and the sorted
/// distinct canonical values.
fn snap_azimuths(
    members: &[&GateObservation],
    tol: f64,
) -> (HashMap<RowKey, bool>, Vec<f64>) {
    let mut keyed: Vec<(RowKey, Option<f64>)> = members
        .iter()
        .map(|r| {
            (
                (r.range_gate_index, r.ray_idx),
                r.azimuth_deg.map(|a| normalize_azimuth(a, tol)),
            )
        })
        .collect();
    keyed.sort_by(|a, b| match (a.1, b.1) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });

    let mut seen: Vec<f64> = Vec::new();
    let mut dups = HashMap::new();
    for (key, az) in keyed {
        match az {
            None => {
                dups.insert(key, true);
            }
            Some(az) => {
                let merged = seen.iter().any(|&c| circular_distance(az, c) <= tol);
                if !merged {
                    seen.push(az);
                }
                dups.insert(key, merged);
            }
        }
    }
    seen.sort_by(|a, b| a.total_cmp(b));
    (dups, seen)
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut v = values.to_vec();
    v.sort_by(|a, b| a.total_cmp(b));
    let mid = v.len() / 2;
    Some(if v.len() % 2 == 1 {
        v[mid]
    } else {
        0.5 * (v[mid - 1] + v[mid])
    })
}

fn median_abs_deviation(values: &[f64], med: Option<f64>) -> Option<f64> {
    let med = med?;
    let dev: Vec<f64> = values.iter().map(|v| (v - med).abs()).collect();
    median(&dev)
}
