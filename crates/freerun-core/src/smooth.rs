//! Post-hoc trajectory smoothing for the regression path.
//!
//! Five ordered passes over a segment's raw per-day trajectory:
//! unwrap, low-confidence repair, jump repair, backward-drift bridging,
//! forecast extension. Pass order matters and is fixed.

use crate::anchor::Anchor;
use crate::constants::EPSILON;
use crate::fit::{LinearFit, gaussian, weighted_linear_fit};
use crate::registry::DayEstimate;
use crate::unwrap::{circular_distance, nearest_branch, wrap_hour};

/// Confidence below which a day's estimate is rebuilt from raw anchors.
const LOW_CONFIDENCE: f64 = 0.4;

/// Halo (days) around a low-confidence or jumpy day that also gets blended.
const HALO_DAYS: i64 = 5;

/// Gaussian sigma (days) for the repair blends.
const REPAIR_SIGMA: f64 = 3.0;

/// Repair blend reach (days).
const REPAIR_REACH: i64 = 7;

/// Midpoint jump (hours) between neighboring days that flags a repair.
const JUMP_THRESHOLD_H: f64 = 2.0;

/// Jump-smoothing pass cap.
const JUMP_MAX_PASSES: usize = 3;

/// Minimum length (days) of a backward-drift run worth bridging.
const BRIDGE_MIN_RUN: usize = 3;

/// Backward slack (hours) against the expected drift before a step counts
/// as backward.
const BRIDGE_SLACK_H: f64 = 0.5;

/// Max net forward rate (h/day) across a run for it to be bridged.
const BRIDGE_MAX_RATE: f64 = 3.0;

/// Run all five passes in order. `edge_slope` is the blended slope at the
/// last data day, reused for the forecast extension.
pub fn smooth_trajectory(
    days: &mut [DayEstimate],
    anchors: &[Anchor],
    values: &[f64],
    edge_slope: f64,
) {
    let n_data = days.iter().filter(|d| !d.is_forecast).count();
    if n_data == 0 {
        return;
    }

    unwrap_pass(days, n_data);

    let trend = global_trend(anchors, values, days, n_data);

    low_confidence_pass(days, anchors, values, &trend, n_data);
    jump_pass(days, &trend, n_data);
    bridge_pass(days, n_data);
    forecast_pass(days, n_data, edge_slope);
}

/// Pass 1: snap each stored midpoint to the branch nearest its
/// predecessor so the sequence carries no hidden 24 h jump.
fn unwrap_pass(days: &mut [DayEstimate], n_data: usize) {
    for i in 1..n_data {
        days[i].midpoint = nearest_branch(days[i].midpoint, days[i - 1].midpoint);
    }
}

/// The segment-wide anchor trend the repair passes measure residuals
/// against. Falls back to a flat line through the mean (or the raw
/// trajectory mean when there are no anchors at all).
fn global_trend(
    anchors: &[Anchor],
    values: &[f64],
    days: &[DayEstimate],
    n_data: usize,
) -> LinearFit {
    let points: Vec<(f64, f64, f64)> = anchors
        .iter()
        .zip(values)
        .map(|(a, &v)| (a.day as f64, v, a.weight))
        .collect();
    if let Some(fit) = weighted_linear_fit(&points) {
        return fit;
    }
    let mean = if !values.is_empty() {
        values.iter().sum::<f64>() / values.len() as f64
    } else {
        days[..n_data].iter().map(|d| d.midpoint).sum::<f64>() / n_data as f64
    };
    LinearFit {
        slope: 0.0,
        intercept: mean,
    }
}

/// Pass 2: rebuild low-confidence stretches from raw anchors.
///
/// Core days (confidence below the threshold) are fully overwritten by a
/// Gaussian-weighted residual-from-trend of nearby anchors; halo days
/// blend with a weight that fades to zero at the halo edge.
fn low_confidence_pass(
    days: &mut [DayEstimate],
    anchors: &[Anchor],
    values: &[f64],
    trend: &LinearFit,
    n_data: usize,
) {
    let core: Vec<i64> = days[..n_data]
        .iter()
        .filter(|d| d.confidence < LOW_CONFIDENCE)
        .map(|d| d.day)
        .collect();
    if core.is_empty() {
        return;
    }

    for i in 0..n_data {
        let day = days[i].day;
        let dist_to_core = core.iter().map(|&c| (c - day).abs()).min().unwrap_or(i64::MAX);
        if dist_to_core > HALO_DAYS {
            continue;
        }
        let blend = 1.0 - dist_to_core as f64 / HALO_DAYS as f64;

        let mut num = 0.0;
        let mut den = 0.0;
        for (a, &v) in anchors.iter().zip(values) {
            let dist = (a.day - day).abs();
            if dist > REPAIR_REACH {
                continue;
            }
            let g = a.weight * gaussian(dist as f64, REPAIR_SIGMA);
            num += g * (v - trend.value_at(a.day as f64));
            den += g;
        }
        if den <= EPSILON {
            continue;
        }
        let repaired = trend.value_at(day as f64) + num / den;
        // keep the repaired value on the trajectory's branch
        let repaired = nearest_branch(repaired, days[i].midpoint);
        days[i].midpoint = blend * repaired + (1.0 - blend) * days[i].midpoint;
    }
}

/// Pass 3: repair discontinuities. Days whose normalized midpoint jumps
/// more than the threshold to either neighbor (plus a halo) are replaced
/// by a Gaussian blend of neighboring smoothed values around the trend.
/// Up to three passes, stopping early once the trajectory is calm.
fn jump_pass(days: &mut [DayEstimate], trend: &LinearFit, n_data: usize) {
    for _ in 0..JUMP_MAX_PASSES {
        let snapshot: Vec<(i64, f64)> = days[..n_data].iter().map(|d| (d.day, d.midpoint)).collect();

        let mut flagged = vec![false; n_data];
        for i in 0..n_data {
            let jumpy = |j: usize| {
                circular_distance(wrap_hour(snapshot[i].1), wrap_hour(snapshot[j].1))
                    > JUMP_THRESHOLD_H
            };
            if (i > 0 && jumpy(i - 1)) || (i + 1 < n_data && jumpy(i + 1)) {
                flagged[i] = true;
            }
        }
        if flagged.iter().all(|f| !f) {
            return;
        }

        // halo expansion
        let expanded: Vec<bool> = (0..n_data)
            .map(|i| {
                let day = snapshot[i].0;
                flagged
                    .iter()
                    .enumerate()
                    .any(|(j, &f)| f && (snapshot[j].0 - day).abs() <= HALO_DAYS)
            })
            .collect();

        for i in 0..n_data {
            if !expanded[i] {
                continue;
            }
            let day = snapshot[i].0;
            let mut num = 0.0;
            let mut den = 0.0;
            for &(other_day, other_mid) in &snapshot {
                let dist = (other_day - day).abs();
                if dist == 0 || dist > REPAIR_REACH {
                    continue;
                }
                let g = gaussian(dist as f64, REPAIR_SIGMA);
                num += g * (other_mid - trend.value_at(other_day as f64));
                den += g;
            }
            if den <= EPSILON {
                continue;
            }
            days[i].midpoint = trend.value_at(day as f64) + num / den;
        }
    }
}

/// Pass 4: bridge runs where the phase walks backward against the
/// locally expected (non-negative) drift. Short reversals are usually
/// anchor noise; a run whose endpoints still advance at a plausible net
/// rate gets linearly interpolated.
fn bridge_pass(days: &mut [DayEstimate], n_data: usize) {
    let mut i = 0;
    while i + 1 < n_data {
        let expected = days[i].drift.max(0.0);
        let step = days[i + 1].midpoint - days[i].midpoint;
        if step >= expected - BRIDGE_SLACK_H {
            i += 1;
            continue;
        }

        // Phase fell behind at i+1; find where it catches back up to the
        // line continuing from day i at the expected rate.
        let a = i;
        let mut b = i + 1;
        while b < n_data {
            let lag = days[b].midpoint
                - (days[a].midpoint + expected * (days[b].day - days[a].day) as f64);
            if lag >= -BRIDGE_SLACK_H {
                break;
            }
            b += 1;
        }
        if b >= n_data {
            // never recovered; a sustained slowdown is not a dip
            break;
        }

        let interior = b - a - 1;
        let day_span = (days[b].day - days[a].day) as f64;
        let net_rate = (days[b].midpoint - days[a].midpoint) / day_span;
        if interior >= BRIDGE_MIN_RUN && net_rate <= BRIDGE_MAX_RATE {
            for k in a + 1..b {
                let t = (days[k].day - days[a].day) as f64 / day_span;
                days[k].midpoint = days[a].midpoint + t * (days[b].midpoint - days[a].midpoint);
            }
        }
        i = b;
    }
}

/// Pass 5: rewrite forecast midpoints from the smoothed edge.
fn forecast_pass(days: &mut [DayEstimate], n_data: usize, edge_slope: f64) {
    let edge_day = days[n_data - 1].day;
    let edge_mid = days[n_data - 1].midpoint;
    for est in days[n_data..].iter_mut() {
        est.midpoint = edge_mid + edge_slope * (est.day - edge_day) as f64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn estimate(day: i64, midpoint: f64, confidence: f64) -> DayEstimate {
        DayEstimate {
            day,
            midpoint,
            confidence,
            drift: 0.5,
            half_duration: 4.0,
            is_forecast: false,
            anchor_record: None,
        }
    }

    fn anchor(day: i64, midpoint: f64) -> Anchor {
        Anchor {
            day,
            midpoint: wrap_hour(midpoint),
            weight: 0.9,
            quality: 0.9,
            duration_h: 8.0,
            is_main_sleep: true,
            record_id: Uuid::new_v4(),
        }
    }

    fn line(n: i64, base: f64, slope: f64) -> (Vec<DayEstimate>, Vec<Anchor>, Vec<f64>) {
        let days: Vec<DayEstimate> = (0..n)
            .map(|d| estimate(d, base + slope * d as f64, 0.8))
            .collect();
        let anchors: Vec<Anchor> = (0..n).map(|d| anchor(d, base + slope * d as f64)).collect();
        let values: Vec<f64> = (0..n).map(|d| base + slope * d as f64).collect();
        (days, anchors, values)
    }

    #[test]
    fn test_clean_trajectory_untouched() {
        let (mut days, anchors, values) = line(30, 23.0, 0.5);
        let before: Vec<f64> = days.iter().map(|d| d.midpoint).collect();
        smooth_trajectory(&mut days, &anchors, &values, 0.5);
        for (d, b) in days.iter().zip(&before) {
            assert!(
                (d.midpoint - b).abs() < 0.2,
                "clean day {} moved: {} → {}",
                d.day,
                b,
                d.midpoint
            );
        }
    }

    #[test]
    fn test_unwrap_pass_removes_cycle_jump() {
        let (mut days, anchors, values) = line(10, 23.0, 0.5);
        // simulate a stored midpoint that slipped a cycle
        days[5].midpoint -= 24.0;
        smooth_trajectory(&mut days, &anchors, &values, 0.5);
        for w in days.windows(2) {
            assert!(
                (w[1].midpoint - w[0].midpoint).abs() < 12.0,
                "cycle jump survived between {} and {}",
                w[0].day,
                w[1].day
            );
        }
    }

    #[test]
    fn test_low_confidence_day_pulled_to_anchors() {
        let (mut days, anchors, values) = line(30, 23.0, 0.5);
        // day 15 got a wild low-confidence estimate
        days[15].midpoint += 6.0;
        days[15].confidence = 0.1;
        smooth_trajectory(&mut days, &anchors, &values, 0.5);
        let expected = 23.0 + 0.5 * 15.0;
        assert!(
            (days[15].midpoint - expected).abs() < 1.0,
            "low-confidence day should be rebuilt near {expected}, got {}",
            days[15].midpoint
        );
    }

    #[test]
    fn test_jump_pass_flattens_spike() {
        let (mut days, anchors, values) = line(30, 23.0, 0.5);
        days[12].midpoint += 5.0; // spike with high confidence
        smooth_trajectory(&mut days, &anchors, &values, 0.5);
        let expected = 23.0 + 0.5 * 12.0;
        assert!(
            (days[12].midpoint - expected).abs() < 1.5,
            "spike should be repaired near {expected}, got {}",
            days[12].midpoint
        );
    }

    #[test]
    fn test_bridge_pass_interpolates_reversal() {
        let (mut days, anchors, values) = line(20, 23.0, 0.5);
        // four-day backward excursion in the middle
        for (k, delta) in [(8, -1.5), (9, -3.0), (10, -2.5), (11, -1.0)] {
            days[k].midpoint += delta;
        }
        // neutralize the other passes' influence for a focused check
        for d in days.iter_mut() {
            d.confidence = 0.9;
        }
        smooth_trajectory(&mut days, &anchors, &values, 0.5);
        for k in 8..=11 {
            let expected = 23.0 + 0.5 * k as f64;
            assert!(
                (days[k].midpoint - expected).abs() < 1.6,
                "day {k} not bridged: {} vs {}",
                days[k].midpoint,
                expected
            );
        }
    }

    #[test]
    fn test_forecast_extends_from_smoothed_edge() {
        let (mut days, anchors, values) = line(20, 23.0, 0.5);
        let edge = days[19].midpoint;
        for k in 1..=5 {
            let mut f = estimate(19 + k, 0.0, 0.5);
            f.is_forecast = true;
            days.push(f);
        }
        smooth_trajectory(&mut days, &anchors, &values, 0.5);
        for k in 1..=5usize {
            let expected = edge + 0.5 * k as f64;
            assert!(
                (days[19 + k].midpoint - expected).abs() < 0.3,
                "forecast day {k}: {} vs {}",
                days[19 + k].midpoint,
                expected
            );
        }
    }

    #[test]
    fn test_empty_and_no_anchor_inputs() {
        let mut empty: Vec<DayEstimate> = Vec::new();
        smooth_trajectory(&mut empty, &[], &[], 0.5);

        let mut days = vec![estimate(0, 12.0, 0.0), estimate(1, 12.0, 0.0)];
        smooth_trajectory(&mut days, &[], &[], 0.0);
        assert!((days[0].midpoint - 12.0).abs() < 1e-9, "no anchors: unchanged");
    }
}
