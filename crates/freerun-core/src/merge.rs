//! Cross-segment merging into one calendar-ordered analysis.
//!
//! Segments are estimated independently; the merger stitches their day
//! sequences back together, fills the silence between them with gap
//! placeholders, and fits one global period across all segments by
//! bridging each segment's phase onto the previous one's branch.

use crate::analysis::{Analysis, CircadianDay, ConfidenceLabel, Diagnostics};
use crate::constants::{CYCLE_HOURS, EPSILON};
use crate::date::CivilDate;
use crate::fit::{median_of, weighted_linear_fit};
use crate::registry::{DayEstimate, SegmentDiagnostics, SegmentResult};
use crate::unwrap::{nearest_branch, pairwise_unwrap, wrap_hour};

/// Stitch per-segment results (in calendar order) into one analysis.
pub fn merge_segments(results: &[SegmentResult], epoch: CivilDate, algorithm: &str) -> Analysis {
    let mut days: Vec<CircadianDay> = Vec::new();
    let mut prev_last: Option<i64> = None;

    for result in results {
        if let (Some(prev), Some(first)) = (prev_last, result.days.first().map(|d| d.day)) {
            for day in prev + 1..first {
                days.push(gap_day(epoch.plus_days(day)));
            }
        }
        for est in &result.days {
            days.push(circadian_day(est, epoch));
        }
        if let Some(last) = result.days.last() {
            prev_last = Some(last.day);
        }
    }

    let (global_tau, global_daily_drift) = global_period(results);

    Analysis {
        algorithm: algorithm.to_string(),
        global_tau,
        global_daily_drift,
        days,
        diagnostics: aggregate_diagnostics(results),
    }
}

fn circadian_day(est: &DayEstimate, epoch: CivilDate) -> CircadianDay {
    let midpoint = wrap_hour(est.midpoint);
    let confidence = est.confidence.clamp(0.0, 1.0);
    CircadianDay {
        date: epoch.plus_days(est.day),
        night_start_hour: midpoint - est.half_duration,
        night_end_hour: midpoint + est.half_duration,
        confidence,
        confidence_label: ConfidenceLabel::from_score(confidence),
        local_tau: CYCLE_HOURS + est.drift,
        local_drift: est.drift,
        is_forecast: est.is_forecast,
        is_gap: false,
        anchor_record: est.anchor_record,
    }
}

/// Placeholder for a day inside a data gap: zero confidence, neutral τ.
fn gap_day(date: CivilDate) -> CircadianDay {
    CircadianDay {
        date,
        night_start_hour: 0.0,
        night_end_hour: 0.0,
        confidence: 0.0,
        confidence_label: ConfidenceLabel::None,
        local_tau: CYCLE_HOURS,
        local_drift: 0.0,
        is_forecast: false,
        is_gap: true,
        anchor_record: None,
    }
}

/// One global τ across all segments.
///
/// Each segment's non-forecast midpoints are unwrapped internally, then
/// the whole segment is shifted by whole cycles so its first midpoint
/// lands within 12 h of the previous segment's last. A confidence-
/// weighted regression over all bridged points gives the slope.
fn global_period(results: &[SegmentResult]) -> (f64, f64) {
    let mut points: Vec<(f64, f64, f64)> = Vec::new();
    let mut prev_last_mid: Option<f64> = None;

    for result in results {
        let data: Vec<&DayEstimate> = result.days.iter().filter(|d| !d.is_forecast).collect();
        if data.is_empty() {
            continue;
        }
        let mids = pairwise_unwrap(&data.iter().map(|d| d.midpoint).collect::<Vec<_>>());
        let shift = match prev_last_mid {
            Some(prev) => nearest_branch(mids[0], prev) - mids[0],
            None => 0.0,
        };
        for (d, m) in data.iter().zip(&mids) {
            points.push((d.day as f64, m + shift, d.confidence));
        }
        prev_last_mid = Some(mids[mids.len() - 1] + shift);
    }

    if points.len() < 2 {
        return (CYCLE_HOURS, 0.0);
    }
    match weighted_linear_fit(&points) {
        Some(fit) => (CYCLE_HOURS + fit.slope, fit.slope),
        None => (CYCLE_HOURS, 0.0),
    }
}

fn aggregate_diagnostics(results: &[SegmentResult]) -> Diagnostics {
    let mut residuals: Vec<f64> = Vec::new();
    let mut observed: Vec<f64> = Vec::new();
    let mut gated = 0usize;
    let mut innovations: Vec<f64> = Vec::new();
    let mut is_kalman = false;

    for result in results {
        match &result.diagnostics {
            SegmentDiagnostics::Regression {
                residuals: rs,
                observed: os,
            } => {
                residuals.extend_from_slice(rs);
                observed.extend_from_slice(os);
            }
            SegmentDiagnostics::Kalman {
                gated_outliers,
                innovations: is,
            } => {
                is_kalman = true;
                gated += gated_outliers;
                innovations.extend_from_slice(is);
            }
        }
    }

    if is_kalman {
        let mean_innovation = if innovations.is_empty() {
            0.0
        } else {
            innovations.iter().sum::<f64>() / innovations.len() as f64
        };
        Diagnostics::Kalman {
            gated_outliers: gated,
            mean_innovation,
        }
    } else {
        let abs_res: Vec<f64> = residuals.iter().map(|r| r.abs()).collect();
        let residual_mad = median_of(&abs_res);
        let r_squared = derived_r_squared(&residuals, &observed);
        Diagnostics::Regression {
            residual_mad,
            r_squared,
        }
    }
}

/// R² from pooled residuals against the spread of the observed phases.
fn derived_r_squared(residuals: &[f64], observed: &[f64]) -> f64 {
    if observed.len() < 2 {
        return 0.0;
    }
    let mean = observed.iter().sum::<f64>() / observed.len() as f64;
    let sst: f64 = observed.iter().map(|y| (y - mean) * (y - mean)).sum();
    if sst <= EPSILON {
        return 0.0;
    }
    let ssr: f64 = residuals.iter().map(|r| r * r).sum();
    (1.0 - ssr / sst).clamp(0.0, 1.0)
}
