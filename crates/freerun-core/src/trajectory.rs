//! Sliding-window robust regression over unwrapped anchors.
//!
//! For every day in a segment, a Gaussian-weighted window of anchors is
//! fitted robustly; confidence blends data density, quality, and fit
//! tightness. A regional fallback slope keeps sparse windows honest
//! without washing out genuine regime changes.

use crate::analysis::Diagnostics;
use crate::anchor::{Anchor, extract_anchors};
use crate::constants::{FORECAST_DECAY, HALF_WINDOW_DAYS, PRIOR_PHASE, WINDOW_SIGMA_DAYS};
use crate::fit::{gaussian, median_of, robust_weighted_fit};
use crate::record::SleepRecord;
use crate::registry::{DayEstimate, PhaseEstimator, SegmentDiagnostics, SegmentResult};
use crate::smooth::smooth_trajectory;
use crate::unwrap::unwrap_anchors;

/// Regional fallback window half-width (days).
const REGIONAL_HALF_WINDOW: f64 = 60.0;

/// Expanding-window retry ladder.
const WINDOW_LADDER: [f64; 3] = [HALF_WINDOW_DAYS, 31.5, 60.0];

/// Points below which a window is considered too thin and retried wider.
const MIN_WINDOW_POINTS: usize = 6;

/// Blended-slope clamp for the regression path (h/day).
const SLOPE_MIN: f64 = -0.5;
const SLOPE_MAX: f64 = 2.0;

/// Slope difference (h/day) at which the regime-change boost starts, and
/// the ramp width to its full +0.4.
const REGIME_DIFF_MIN: f64 = 0.3;
const REGIME_DIFF_RAMP: f64 = 0.7;
const REGIME_BOOST_MAX: f64 = 0.4;

/// One window evaluation: a robust local fit plus the summary statistics
/// the confidence model reads.
#[derive(Clone, Copy, Debug)]
pub struct WindowFit {
    pub slope: f64,
    pub intercept: f64,
    pub points: usize,
    pub mean_quality: f64,
    pub residual_mad: f64,
    pub mean_duration: f64,
    /// Weighted mean anchor day of the window.
    pub mean_day: f64,
}

impl WindowFit {
    fn value_at(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Fit the anchors within `half_window` days of `day`, Gaussian-weighted
/// by distance on top of each anchor's own weight.
pub fn evaluate_window(
    anchors: &[Anchor],
    values: &[f64],
    day: i64,
    half_window: f64,
) -> Option<WindowFit> {
    let mut points: Vec<(f64, f64, f64)> = Vec::new();
    let mut quality_sum = 0.0;
    let mut duration_sum = 0.0;
    let mut day_sum = 0.0;
    let mut weight_sum = 0.0;

    for (a, &v) in anchors.iter().zip(values) {
        let dist = (a.day - day).abs() as f64;
        if dist > half_window {
            continue;
        }
        let w = a.weight * gaussian(dist, WINDOW_SIGMA_DAYS);
        points.push((a.day as f64, v, w));
        quality_sum += w * a.quality;
        duration_sum += w * a.duration_h;
        day_sum += w * a.day as f64;
        weight_sum += w;
    }
    if weight_sum <= 0.0 {
        return None;
    }

    let robust = robust_weighted_fit(&points)?;
    Some(WindowFit {
        slope: robust.slope,
        intercept: robust.intercept,
        points: robust.points_used,
        mean_quality: quality_sum / weight_sum,
        residual_mad: robust.residual_mad,
        mean_duration: duration_sum / weight_sum,
        mean_day: day_sum / weight_sum,
    })
}

/// Try the standard window first, then progressively wider ones until
/// enough points participate.
pub fn evaluate_window_expanding(anchors: &[Anchor], values: &[f64], day: i64) -> Option<WindowFit> {
    let mut last = None;
    for half in WINDOW_LADDER {
        match evaluate_window(anchors, values, day, half) {
            Some(fit) if fit.points >= MIN_WINDOW_POINTS => return Some(fit),
            Some(fit) => last = Some(fit),
            None => {}
        }
    }
    last
}

/// Median day spacing between consecutive anchors, floored at one day.
fn median_spacing(anchors: &[Anchor]) -> f64 {
    if anchors.len() < 2 {
        return 1.0;
    }
    let gaps: Vec<f64> = anchors
        .windows(2)
        .map(|w| (w[1].day - w[0].day) as f64)
        .collect();
    median_of(&gaps).max(1.0)
}

/// The windowed robust-regression estimator (`regression-v1`).
pub struct RegressionEstimator;

impl RegressionEstimator {
    fn estimate_day(
        anchors: &[Anchor],
        values: &[f64],
        day: i64,
        spacing: f64,
    ) -> (f64, f64, f64, f64, f64) {
        let Some(local) = evaluate_window_expanding(anchors, values, day) else {
            // single-anchor segments land here: flat line through the anchor
            let midpoint = values.first().copied().unwrap_or(PRIOR_PHASE);
            let confidence = anchors.first().map(|a| 0.3 * a.weight).unwrap_or(0.0);
            let half_duration = anchors.first().map(|a| a.duration_h / 2.0).unwrap_or(4.0);
            return (midpoint, confidence, 0.0, 0.0, half_duration);
        };
        let regional = evaluate_window(anchors, values, day, REGIONAL_HALF_WINDOW);

        let expected = (2.0 * HALF_WINDOW_DAYS / spacing).max(1.0);
        let mut confidence = 0.4 * (local.points as f64 / expected).min(1.0)
            + 0.3 * local.mean_quality
            + 0.3 * (1.0 - (local.residual_mad / 3.0).min(1.0));

        let fallback_slope = regional.map(|r| r.slope).unwrap_or(local.slope);

        // A local slope far from the regional trend is usually noise, but
        // with enough tight points it is a genuine regime change.
        let slope_diff = (local.slope - fallback_slope).abs();
        if slope_diff > REGIME_DIFF_MIN
            && local.points >= MIN_WINDOW_POINTS
            && local.residual_mad < 2.0
        {
            let ramp = ((slope_diff - REGIME_DIFF_MIN) / REGIME_DIFF_RAMP).min(1.0);
            confidence += REGIME_BOOST_MAX * ramp;
        }
        confidence = confidence.clamp(0.0, 1.0);

        let mut slope = confidence * local.slope + (1.0 - confidence) * fallback_slope;
        if !(SLOPE_MIN..=SLOPE_MAX).contains(&slope) {
            slope = fallback_slope.clamp(SLOPE_MIN, SLOPE_MAX);
        }

        let midpoint = local.value_at(local.mean_day) + slope * (day as f64 - local.mean_day);
        let drift = slope.max(0.0);
        let half_duration = local.mean_duration / 2.0;

        (midpoint, confidence, drift, slope, half_duration)
    }
}

impl PhaseEstimator for RegressionEstimator {
    fn id(&self) -> &'static str {
        "regression-v1"
    }

    fn neutral_diagnostics(&self) -> Diagnostics {
        Diagnostics::Regression {
            residual_mad: 0.0,
            r_squared: 0.0,
        }
    }

    fn analyze_segment(
        &self,
        records: &[SleepRecord],
        epoch_day: i64,
        forecast_days: u32,
    ) -> SegmentResult {
        let first_day = records
            .iter()
            .map(|r| r.date.day_number() - epoch_day)
            .min()
            .unwrap_or(0);
        let last_day = records
            .iter()
            .map(|r| r.date.day_number() - epoch_day)
            .max()
            .unwrap_or(0);

        let anchors = extract_anchors(records, epoch_day);
        let values = unwrap_anchors(&anchors);
        let spacing = median_spacing(&anchors);

        let anchor_at = |day: i64| anchors.iter().position(|a| a.day == day);

        let mut days: Vec<DayEstimate> = Vec::new();
        let mut edge_slope = 0.0;
        for day in first_day..=last_day {
            let (midpoint, confidence, drift, slope, half_duration) = if anchors.is_empty() {
                let mean_dur =
                    records.iter().map(|r| r.duration_h).sum::<f64>() / records.len().max(1) as f64;
                (PRIOR_PHASE, 0.0, 0.0, 0.0, mean_dur / 2.0)
            } else {
                Self::estimate_day(&anchors, &values, day, spacing)
            };
            if day == last_day {
                edge_slope = slope;
            }
            days.push(DayEstimate {
                day,
                midpoint,
                confidence,
                drift,
                half_duration,
                is_forecast: false,
                anchor_record: anchor_at(day).map(|i| anchors[i].record_id),
            });
        }

        // Forecast entries reuse the edge fit with decaying confidence;
        // the smoother rewrites their midpoints from the smoothed edge.
        if let Some(edge) = days.last().cloned() {
            for k in 1..=i64::from(forecast_days) {
                days.push(DayEstimate {
                    day: last_day + k,
                    midpoint: edge.midpoint + edge_slope * k as f64,
                    confidence: edge.confidence * (-FORECAST_DECAY * k as f64).exp(),
                    drift: edge.drift,
                    half_duration: edge.half_duration,
                    is_forecast: true,
                    anchor_record: None,
                });
            }
        }

        smooth_trajectory(&mut days, &anchors, &values, edge_slope);

        // Residuals vs the smoothed trajectory, for pooled diagnostics.
        let mut residuals = Vec::with_capacity(anchors.len());
        let mut observed = Vec::with_capacity(anchors.len());
        for (a, &v) in anchors.iter().zip(&values) {
            if let Some(est) = days.iter().find(|d| d.day == a.day) {
                // compare on a common branch: smoothing may have shifted cycles
                let aligned = crate::unwrap::nearest_branch(v, est.midpoint);
                residuals.push(aligned - est.midpoint);
                observed.push(aligned);
            }
        }

        SegmentResult {
            days,
            diagnostics: SegmentDiagnostics::Regression {
                residuals,
                observed,
            },
        }
    }
}
