//! 24-hour phase unwrapping.
//!
//! Midsleep clock hours are circular quantities: 23:30 and 0:30 are one
//! hour apart, not 23. The estimators need a continuous phase sequence,
//! so each anchor's midpoint must be lifted onto the right ±24 h·k
//! branch. A seed window (the most internally consistent stretch of the
//! segment) is resolved first by forward-difference unwrapping; the rest
//! of the anchors are resolved one at a time, expanding outward from the
//! seed.
//!
//! Expansion order is a contract, not an accident: left side first
//! (walking from the seed toward the start), then right side (toward the
//! end). Each snap reads previously resolved neighbors, so reordering
//! changes results.

use crate::anchor::Anchor;
use crate::constants::{
    CYCLE_HOURS, HALF_WINDOW_DAYS, UNWRAP_LOOKBACK_DAYS, WINDOW_SIGMA_DAYS,
};
use crate::fit::{gaussian, median_of, weighted_linear_fit};

/// Wrap an hour value into [0, 24).
pub fn wrap_hour(h: f64) -> f64 {
    h.rem_euclid(CYCLE_HOURS)
}

/// The branch `value + 24k` nearest to `target`.
pub fn nearest_branch(value: f64, target: f64) -> f64 {
    value + CYCLE_HOURS * ((target - value) / CYCLE_HOURS).round()
}

/// Circular distance between two clock hours, in [0, 12].
pub fn circular_distance(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(CYCLE_HOURS);
    d.min(CYCLE_HOURS - d)
}

/// Forward-difference unwrap: each element snaps to the branch nearest
/// its predecessor.
pub fn pairwise_unwrap(hours: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(hours.len());
    for &h in hours {
        match out.last() {
            Some(&prev) => out.push(nearest_branch(h, prev)),
            None => out.push(h),
        }
    }
    out
}

/// Minimum anchors for a candidate seed window.
const SEED_MIN_ANCHORS: usize = 4;

/// Slope range (h/day) a plausible seed trend stays inside.
const SEED_SLOPE_MIN: f64 = -0.5;
const SEED_SLOPE_MAX: f64 = 3.0;

/// Linear ramp width (h/day) of the slope penalty outside that range.
const SEED_SLOPE_RAMP: f64 = 1.0;

/// Agreement threshold (hours) between expansion candidates.
const EXPAND_AGREE_H: f64 = 1.0;

/// Max day distance for trusting the nearest resolved neighbor directly.
const EXPAND_NEIGHBOR_DAYS: i64 = 7;

/// Max pairwise jump (hours) for trusting the nearest neighbor's branch.
const EXPAND_NEIGHBOR_H: f64 = 6.0;

struct SeedWindow {
    lo: usize,
    hi: usize,
    values: Vec<f64>,
    score: f64,
}

/// Score one candidate window: consistency (low MAD), density, weight,
/// and a plausible slope. Returns None below the anchor minimum.
fn score_window(anchors: &[Anchor], lo: usize, hi: usize) -> Option<SeedWindow> {
    let count = hi - lo + 1;
    if count < SEED_MIN_ANCHORS {
        return None;
    }
    let window = &anchors[lo..=hi];
    let values = pairwise_unwrap(&window.iter().map(|a| a.midpoint).collect::<Vec<_>>());

    let points: Vec<(f64, f64, f64)> = window
        .iter()
        .zip(&values)
        .map(|(a, &v)| (a.day as f64, v, a.weight))
        .collect();
    let fit = weighted_linear_fit(&points)?;

    let abs_res: Vec<f64> = points
        .iter()
        .map(|&(x, y, _)| (y - fit.value_at(x)).abs())
        .collect();
    let mad = median_of(&abs_res);

    let covered = (window[window.len() - 1].day - window[0].day + 1) as f64;
    let density = (count as f64 / covered).min(1.0);
    let avg_weight = window.iter().map(|a| a.weight).sum::<f64>() / count as f64;

    let slope_penalty = if fit.slope < SEED_SLOPE_MIN {
        ((SEED_SLOPE_MIN - fit.slope) / SEED_SLOPE_RAMP).min(1.0)
    } else if fit.slope > SEED_SLOPE_MAX {
        ((fit.slope - SEED_SLOPE_MAX) / SEED_SLOPE_RAMP).min(1.0)
    } else {
        0.0
    };

    let score = 0.35 * (1.0 - (mad / 6.0).min(1.0))
        + 0.25 * density
        + 0.25 * avg_weight
        + 0.15 * (1.0 - slope_penalty);

    Some(SeedWindow {
        lo,
        hi,
        values,
        score,
    })
}

/// Find the most internally consistent sub-window to unwrap first.
///
/// Candidate centers are the anchor days themselves; each window spans
/// ±[`HALF_WINDOW_DAYS`]. Spans shorter than two half-windows, and
/// segments where no window reaches the anchor minimum, fall back to the
/// whole span.
fn find_seed(anchors: &[Anchor]) -> SeedWindow {
    let n = anchors.len();
    let span = anchors[n - 1].day - anchors[0].day;

    let whole = SeedWindow {
        lo: 0,
        hi: n - 1,
        values: pairwise_unwrap(&anchors.iter().map(|a| a.midpoint).collect::<Vec<_>>()),
        score: f64::NEG_INFINITY,
    };
    if (span as f64) < 2.0 * HALF_WINDOW_DAYS {
        return whole;
    }

    let mut best: Option<SeedWindow> = None;
    for center in 0..n {
        let center_day = anchors[center].day;
        let lo = anchors.partition_point(|a| (a.day as f64) < center_day as f64 - HALF_WINDOW_DAYS);
        let hi = anchors.partition_point(|a| (a.day as f64) <= center_day as f64 + HALF_WINDOW_DAYS);
        if hi == 0 {
            continue;
        }
        if let Some(candidate) = score_window(anchors, lo, hi - 1)
            && best.as_ref().is_none_or(|b| candidate.score > b.score)
        {
            best = Some(candidate);
        }
    }
    best.unwrap_or(whole)
}

/// Resolve every anchor midpoint into a continuous phase sequence.
///
/// Returns values aligned with `anchors`; each output is congruent to
/// its source midpoint mod 24 (only whole cycles are added or removed).
pub fn unwrap_anchors(anchors: &[Anchor]) -> Vec<f64> {
    match anchors.len() {
        0 => return Vec::new(),
        1 => return vec![anchors[0].midpoint],
        _ => {}
    }

    let seed = find_seed(anchors);

    let mut resolved: Vec<Option<f64>> = vec![None; anchors.len()];
    for (offset, &v) in seed.values.iter().enumerate() {
        resolved[seed.lo + offset] = Some(v);
    }

    // Left side first, then right: each step folds one more anchor into
    // the resolved set.
    for i in (0..seed.lo).rev() {
        let value = resolve_one(anchors, &resolved, i);
        resolved[i] = Some(value);
    }
    for i in seed.hi + 1..anchors.len() {
        let value = resolve_one(anchors, &resolved, i);
        resolved[i] = Some(value);
    }

    resolved
        .into_iter()
        .map(|v| v.unwrap_or(0.0))
        .collect()
}

/// Snap one anchor onto the branch nearest the local trend.
///
/// Two candidates: a Gaussian-weighted regression prediction from
/// resolved neighbors within the lookback, and the nearest resolved
/// neighbor's value. When they agree within an hour the regression wins;
/// a close, consistent neighbor wins otherwise; the regression is the
/// default.
fn resolve_one(anchors: &[Anchor], resolved: &[Option<f64>], i: usize) -> f64 {
    let day = anchors[i].day;
    let midpoint = anchors[i].midpoint;

    let mut nearest: Option<(i64, f64)> = None;
    let mut points: Vec<(f64, f64, f64)> = Vec::new();
    for (j, value) in resolved.iter().enumerate() {
        let Some(v) = value else { continue };
        let dist = (anchors[j].day - day).abs();
        if (dist as f64) <= UNWRAP_LOOKBACK_DAYS {
            let w = anchors[j].weight * gaussian(dist as f64, WINDOW_SIGMA_DAYS);
            points.push((anchors[j].day as f64, *v, w));
        }
        if nearest.is_none_or(|(best, _)| dist < best) {
            nearest = Some((dist, *v));
        }
    }

    // anchors.len() >= 2 and the seed is non-empty, so a neighbor exists
    let Some((neighbor_dist, neighbor_value)) = nearest else {
        return midpoint;
    };

    let prediction = weighted_linear_fit(&points)
        .map(|fit| fit.value_at(day as f64))
        .unwrap_or(neighbor_value);

    let from_regression = nearest_branch(midpoint, prediction);
    let from_neighbor = nearest_branch(midpoint, neighbor_value);

    if (from_regression - from_neighbor).abs() <= EXPAND_AGREE_H {
        from_regression
    } else if neighbor_dist <= EXPAND_NEIGHBOR_DAYS
        && (from_neighbor - neighbor_value).abs() <= EXPAND_NEIGHBOR_H
    {
        from_neighbor
    } else {
        from_regression
    }
}
