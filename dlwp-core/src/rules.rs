//! QC rule predicates and evaluation
//!
//! Every predicate is a pure function of (row, context, params). The
//! registry is a fixed table compiled into the binary; which predicates
//! run, and in what order, is data supplied by the rule configuration
//! store and snapshotted once per run.

use crate::context::GateContext;
use dlwp_common::db::models::{GateObservation, QcRuleDefinition};
use dlwp_common::{Error, QcParams, Result};

/// Outcome of one predicate against one row
pub struct RuleOutcome {
    pub passed: bool,
    /// Short diagnostic for failures worth explaining in logs
    pub reason: Option<String>,
}

impl RuleOutcome {
    fn pass() -> Self {
        Self { passed: true, reason: None }
    }

    fn fail(reason: Option<String>) -> Self {
        Self { passed: false, reason }
    }
}

pub type RulePredicate = fn(&GateObservation, &GateContext, &QcParams) -> RuleOutcome;

/// The full predicate registry. Immutable and exhaustive; activation and
/// ordering live in the qc_rule table, not here.
const REGISTRY: &[(&str, RulePredicate)] = &[
    ("check_nulls", check_nulls),
    ("check_snr_min", check_snr_min),
    ("check_spectral_width_max", check_spectral_width_max),
    ("check_pitch_roll_max", check_pitch_roll_max),
    ("check_elevation_range", check_elevation_range),
    ("check_azimuth_duplicate_guard", check_azimuth_duplicate_guard),
    ("check_velocity_bounds", check_velocity_bounds),
    ("check_gate_outlier_mad", check_gate_outlier_mad),
    ("check_azimuth_coverage_gate", check_azimuth_coverage_gate),
    ("check_vertical_consistency", check_vertical_consistency),
    ("check_gate_uniform_bin_fill", check_gate_uniform_bin_fill),
];

fn lookup(def_name: &str) -> Option<RulePredicate> {
    REGISTRY
        .iter()
        .find(|(name, _)| *name == def_name)
        .map(|(_, f)| *f)
}

/// One active rule bound to its predicate, in evaluation order
pub struct ActiveRule {
    pub rule_id: i64,
    pub def_name: String,
    predicate: RulePredicate,
}

/// Bind the snapshotted active rule definitions to their predicates.
/// An active definition naming an unregistered predicate is a
/// configuration error and aborts the run before any row is evaluated.
pub fn bind_active_rules(defs: &[QcRuleDefinition]) -> Result<Vec<ActiveRule>> {
    let mut active: Vec<&QcRuleDefinition> = defs.iter().filter(|d| d.is_active).collect();
    if active.is_empty() {
        return Err(Error::NoActiveRules);
    }
    active.sort_by_key(|d| (d.rule_order, d.rule_id));
    active
        .into_iter()
        .map(|d| {
            let predicate = lookup(&d.def_name)
                .ok_or_else(|| Error::UnknownRule(d.def_name.clone()))?;
            Ok(ActiveRule {
                rule_id: d.rule_id,
                def_name: d.def_name.clone(),
                predicate,
            })
        })
        .collect()
}

/// Per-row evaluation result, ready to persist
pub struct RowVerdict {
    pub selected: bool,
    pub failed_rule_ids: Vec<i64>,
}

impl RowVerdict {
    /// Ordered, comma-delimited failed rule ids; None when the row passed
    pub fn failed_csv(&self) -> Option<String> {
        if self.failed_rule_ids.is_empty() {
            None
        } else {
            Some(
                self.failed_rule_ids
                    .iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(","),
            )
        }
    }

    pub fn failed_count(&self) -> i64 {
        self.failed_rule_ids.len() as i64
    }
}

/// Evaluate every active rule against one row. No short-circuit: the full
/// failure set is part of the diagnostic record.
pub fn evaluate_row(
    row: &GateObservation,
    ctx: &GateContext,
    active: &[ActiveRule],
    params: &QcParams,
) -> RowVerdict {
    let failed_rule_ids: Vec<i64> = active
        .iter()
        .filter(|rule| !(rule.predicate)(row, ctx, params).passed)
        .map(|rule| rule.rule_id)
        .collect();
    RowVerdict {
        selected: failed_rule_ids.is_empty(),
        failed_rule_ids,
    }
}

fn row_key(row: &GateObservation) -> (i64, i64) {
    (row.range_gate_index, row.ray_idx)
}

// ---- predicates ----

fn check_nulls(row: &GateObservation, _ctx: &GateContext, _p: &QcParams) -> RuleOutcome {
    for (name, value) in [
        ("doppler_ms", row.doppler_ms),
        ("azimuth_deg", row.azimuth_deg),
        ("elevation_deg", row.elevation_deg),
    ] {
        if value.is_none() {
            return RuleOutcome::fail(Some(format!("{name}=NULL")));
        }
    }
    RuleOutcome::pass()
}

fn check_snr_min(row: &GateObservation, _ctx: &GateContext, p: &QcParams) -> RuleOutcome {
    let snr = row.intensity_snr_plus1.unwrap_or(1.0) - 1.0;
    if snr >= p.snr_min {
        RuleOutcome::pass()
    } else {
        RuleOutcome::fail(Some(format!("snr={snr:.3}")))
    }
}

fn check_spectral_width_max(row: &GateObservation, ctx: &GateContext, p: &QcParams) -> RuleOutcome {
    let sw = row.spectral_width_ms.unwrap_or(0.0);
    let instr = ctx
        .instrument_spectral_width_ms()
        .filter(|w| *w > 0.0)
        .unwrap_or(1.0);
    let threshold = p.k_spectral_width * instr;
    if sw <= threshold {
        RuleOutcome::pass()
    } else {
        RuleOutcome::fail(Some(format!("sw={sw:.3}")))
    }
}

fn check_pitch_roll_max(row: &GateObservation, _ctx: &GateContext, p: &QcParams) -> RuleOutcome {
    let tilt = row
        .pitch_deg
        .unwrap_or(0.0)
        .abs()
        .max(row.roll_deg.unwrap_or(0.0).abs());
    if tilt <= p.tilt_abs_max_deg {
        RuleOutcome::pass()
    } else {
        RuleOutcome::fail(Some(format!("tilt={tilt:.2}")))
    }
}

fn check_elevation_range(row: &GateObservation, _ctx: &GateContext, p: &QcParams) -> RuleOutcome {
    match row.elevation_deg {
        Some(e) if (p.elev_min_deg..=p.elev_max_deg).contains(&e) => RuleOutcome::pass(),
        _ => RuleOutcome::fail(Some("elev_out".to_string())),
    }
}

fn check_azimuth_duplicate_guard(
    row: &GateObservation,
    ctx: &GateContext,
    _p: &QcParams,
) -> RuleOutcome {
    if ctx.is_duplicate_azimuth(row_key(row)) {
        RuleOutcome::fail(Some("dup_az".to_string()))
    } else {
        RuleOutcome::pass()
    }
}

fn check_velocity_bounds(row: &GateObservation, _ctx: &GateContext, p: &QcParams) -> RuleOutcome {
    match row.doppler_ms {
        Some(vr) if vr.abs() <= p.vr_abs_max_ms => RuleOutcome::pass(),
        _ => RuleOutcome::fail(Some("vr_out".to_string())),
    }
}

fn check_gate_outlier_mad(row: &GateObservation, ctx: &GateContext, _p: &QcParams) -> RuleOutcome {
    if ctx.is_mad_outlier(row_key(row)) {
        RuleOutcome::fail(None)
    } else {
        RuleOutcome::pass()
    }
}

fn check_azimuth_coverage_gate(
    row: &GateObservation,
    ctx: &GateContext,
    p: &QcParams,
) -> RuleOutcome {
    let cov = ctx.coverage(row.range_gate_index);
    if cov.count >= p.min_rays && cov.span_deg >= p.min_span_deg {
        RuleOutcome::pass()
    } else {
        RuleOutcome::fail(None)
    }
}

fn check_vertical_consistency(
    row: &GateObservation,
    ctx: &GateContext,
    p: &QcParams,
) -> RuleOutcome {
    // Undefined metric (no neighbor) is a pass, not a failure
    match ctx.vertical_metric(row.range_gate_index) {
        Some(v) if v > p.vert_thr_ms => RuleOutcome::fail(None),
        _ => RuleOutcome::pass(),
    }
}

fn check_gate_uniform_bin_fill(
    row: &GateObservation,
    ctx: &GateContext,
    p: &QcParams,
) -> RuleOutcome {
    if ctx.nonempty_bins(row.range_gate_index) >= p.min_nonempty_bins {
        RuleOutcome::pass()
    } else {
        RuleOutcome::fail(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dlwp_common::db::models::ScanHeader;

    fn header() -> ScanHeader {
        ScanHeader {
            header_id: 1,
            num_gates: 1,
            num_rays_in_file: 4,
            range_gate_length_m: 30.0,
            instrument_spectral_width_ms: Some(2.0),
            start_time: None,
        }
    }

    fn good_row(ray: i64, az: f64) -> GateObservation {
        GateObservation {
            header_id: 1,
            ray_idx: ray,
            range_gate_index: 0,
            doppler_ms: Some(2.0),
            intensity_snr_plus1: Some(1.1),
            beta_m_inv_sr_inv: None,
            spectral_width_ms: Some(1.0),
            decimal_time_hours: None,
            azimuth_deg: Some(az),
            elevation_deg: Some(75.0),
            pitch_deg: Some(0.1),
            roll_deg: Some(-0.1),
            qc_selected: false,
            qc_failed_rules_csv: None,
            qc_failed_rule_count: 0,
        }
    }

    fn defs() -> Vec<QcRuleDefinition> {
        [
            "check_nulls",
            "check_snr_min",
            "check_spectral_width_max",
            "check_pitch_roll_max",
            "check_elevation_range",
            "check_azimuth_duplicate_guard",
            "check_velocity_bounds",
            "check_gate_outlier_mad",
            "check_azimuth_coverage_gate",
            "check_vertical_consistency",
            "check_gate_uniform_bin_fill",
        ]
        .iter()
        .enumerate()
        .map(|(i, name)| QcRuleDefinition {
            rule_id: i as i64 + 1,
            def_name: name.to_string(),
            is_active: true,
            rule_order: i as i64 + 1,
            description: None,
        })
        .collect()
    }

    #[test]
    fn unknown_predicate_is_a_configuration_error() {
        let mut d = defs();
        d[3].def_name = "check_moon_phase".to_string();
        match bind_active_rules(&d) {
            Err(Error::UnknownRule(name)) => assert_eq!(name, "check_moon_phase"),
            Err(e) => panic!("expected UnknownRule, got {e}"),
            Ok(_) => panic!("expected UnknownRule, got Ok"),
        }
    }

    #[test]
    fn inactive_rules_are_skipped_and_order_respected() {
        let mut d = defs();
        d[0].is_active = false;
        d[1].rule_order = 99; // snr check moves to the back
        let active = bind_active_rules(&d).unwrap();
        assert_eq!(active.len(), 10);
        assert_eq!(active.last().unwrap().def_name, "check_snr_min");
    }

    #[test]
    fn no_active_rules_aborts() {
        let mut d = defs();
        for def in &mut d {
            def.is_active = false;
        }
        assert!(matches!(bind_active_rules(&d), Err(Error::NoActiveRules)));
    }

    #[test]
    fn clean_rows_pass_every_rule() {
        let rows: Vec<GateObservation> =
            (0..4).map(|i| good_row(i, i as f64 * 90.0)).collect();
        let ctx = GateContext::build(&header(), &rows, &QcParams::default());
        let active = bind_active_rules(&defs()).unwrap();
        for row in &rows {
            let verdict = evaluate_row(row, &ctx, &active, &QcParams::default());
            assert!(verdict.selected, "failed: {:?}", verdict.failed_rule_ids);
            assert_eq!(verdict.failed_csv(), None);
        }
    }

    #[test]
    fn null_velocity_fails_nulls_mad_and_bounds_without_short_circuit() {
        let mut rows: Vec<GateObservation> =
            (0..4).map(|i| good_row(i, i as f64 * 90.0)).collect();
        rows[2].doppler_ms = None;
        let ctx = GateContext::build(&header(), &rows, &QcParams::default());
        let active = bind_active_rules(&defs()).unwrap();
        let verdict = evaluate_row(&rows[2], &ctx, &active, &QcParams::default());
        assert!(!verdict.selected);
        // check_nulls (1), check_velocity_bounds (7), check_gate_outlier_mad (8)
        assert_eq!(verdict.failed_rule_ids, vec![1, 7, 8]);
        assert_eq!(verdict.failed_csv().as_deref(), Some("1,7,8"));
        assert_eq!(verdict.failed_count(), 3);
    }

    #[test]
    fn narrow_two_ray_gate_fails_coverage() {
        // 2 distinct azimuths spanning 40 degrees: below both minimums
        let rows = vec![good_row(0, 10.0), good_row(1, 50.0)];
        let ctx = GateContext::build(&header(), &rows, &QcParams::default());
        let active = bind_active_rules(&defs()).unwrap();
        let verdict = evaluate_row(&rows[0], &ctx, &active, &QcParams::default());
        assert!(verdict
            .failed_rule_ids
            .contains(&9), "coverage rule should fail: {:?}", verdict.failed_rule_ids);
    }

    #[test]
    fn excessive_tilt_fails_only_the_tilt_rule() {
        let mut rows: Vec<GateObservation> =
            (0..4).map(|i| good_row(i, i as f64 * 90.0)).collect();
        rows[0].roll_deg = Some(-3.5);
        let ctx = GateContext::build(&header(), &rows, &QcParams::default());
        let active = bind_active_rules(&defs()).unwrap();
        let verdict = evaluate_row(&rows[0], &ctx, &active, &QcParams::default());
        assert_eq!(verdict.failed_rule_ids, vec![4]);
    }
}
