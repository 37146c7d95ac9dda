//! Circular (azimuth) arithmetic helpers

/// Normalize an azimuth into [0, 360), collapsing values within `tol`
/// degrees of the 0/360 seam to exactly 0.
pub fn normalize_azimuth(az_deg: f64, tol: f64) -> f64 {
    let a = az_deg.rem_euclid(360.0);
    if (a - 360.0).abs() <= tol || a.abs() <= tol {
        0.0
    } else {
        a
    }
}

/// Shortest angular distance between two azimuths, degrees in [0, 180].
pub fn circular_distance(a_deg: f64, b_deg: f64) -> f64 {
    let d = (a_deg - b_deg).abs() % 360.0;
    d.min(360.0 - d)
}

/// Angular coverage of a set of azimuths: 360 minus the widest gap
/// between consecutive values on the circle. Zero or one azimuth covers
/// nothing.
pub fn circular_span_deg(az_deg: &[f64]) -> f64 {
    let n = az_deg.len();
    if n <= 1 {
        return 0.0;
    }
    let mut sorted: Vec<f64> = az_deg.iter().map(|a| a.rem_euclid(360.0)).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mut max_gap = 0.0_f64;
    for i in 0..n {
        let next = sorted[(i + 1) % n];
        let gap = (next - sorted[i]).rem_euclid(360.0);
        max_gap = max_gap.max(gap);
    }
    (360.0 - max_gap).clamp(0.0, 360.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_seam_values() {
        assert_eq!(normalize_azimuth(359.95, 0.1), 0.0);
        assert_eq!(normalize_azimuth(0.05, 0.1), 0.0);
        assert_eq!(normalize_azimuth(360.0, 0.1), 0.0);
        assert!((normalize_azimuth(-90.0, 0.1) - 270.0).abs() < 1e-12);
    }

    #[test]
    fn normalize_leaves_interior_values() {
        assert_eq!(normalize_azimuth(180.0, 0.1), 180.0);
        assert!((normalize_azimuth(0.2, 0.1) - 0.2).abs() < 1e-12);
    }

    #[test]
    fn distance_wraps_the_seam() {
        assert!((circular_distance(359.95, 0.05) - 0.1).abs() < 1e-9);
        assert_eq!(circular_distance(0.0, 180.0), 180.0);
    }

    #[test]
    fn span_of_degenerate_sets_is_zero() {
        assert_eq!(circular_span_deg(&[]), 0.0);
        assert_eq!(circular_span_deg(&[45.0]), 0.0);
    }

    #[test]
    fn span_of_quadrant_points_is_full_circle() {
        assert_eq!(circular_span_deg(&[0.0, 90.0, 180.0, 270.0]), 360.0);
    }

    #[test]
    fn span_of_narrow_pair_is_their_separation() {
        assert!((circular_span_deg(&[10.0, 50.0]) - 40.0).abs() < 1e-9);
    }

    #[test]
    fn span_handles_sets_straddling_north() {
        // 350 and 10 are 20 degrees apart across the seam
        assert!((circular_span_deg(&[350.0, 10.0]) - 20.0).abs() < 1e-9);
    }
}
