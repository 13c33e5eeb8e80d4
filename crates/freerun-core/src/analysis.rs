//! Output types consumed by the rendering layer.
//!
//! The wire format uses camelCase field names and `YYYY-MM-DD` date
//! strings so the charting side (actogram, phase chart, periodogram) can
//! read the JSON directly.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::CYCLE_HOURS;
use crate::date::CivilDate;

/// Bucketed confidence for display.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLabel {
    High,
    Medium,
    Low,
    None,
}

impl ConfidenceLabel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.7 {
            ConfidenceLabel::High
        } else if score >= 0.4 {
            ConfidenceLabel::Medium
        } else if score >= 0.15 {
            ConfidenceLabel::Low
        } else {
            ConfidenceLabel::None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConfidenceLabel::High => "high",
            ConfidenceLabel::Medium => "medium",
            ConfidenceLabel::Low => "low",
            ConfidenceLabel::None => "none",
        }
    }
}

/// One calendar day of the result: the estimated circadian night window
/// plus local period statistics.
///
/// `night_start_hour` may be negative (a window starting the previous
/// evening); `night_end_hour >= night_start_hour` always holds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircadianDay {
    pub date: CivilDate,
    pub night_start_hour: f64,
    pub night_end_hour: f64,
    /// Confidence score in [0, 1].
    pub confidence: f64,
    pub confidence_label: ConfidenceLabel,
    /// Local period estimate in hours.
    pub local_tau: f64,
    /// Local daily drift in h/day (local_tau - 24).
    pub local_drift: f64,
    pub is_forecast: bool,
    pub is_gap: bool,
    /// The record anchoring this day, when one exists.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub anchor_record: Option<Uuid>,
}

/// Algorithm-specific quality summary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Diagnostics {
    #[serde(rename_all = "camelCase")]
    Regression { residual_mad: f64, r_squared: f64 },
    #[serde(rename_all = "camelCase")]
    Kalman {
        gated_outliers: usize,
        mean_innovation: f64,
    },
}

/// The aggregate result of one `analyze` call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub algorithm: String,
    /// Global period estimate in hours (24 = entrained).
    pub global_tau: f64,
    /// Global daily drift in h/day (global_tau - 24).
    pub global_daily_drift: f64,
    /// One entry per calendar day, oldest first, no omissions.
    pub days: Vec<CircadianDay>,
    pub diagnostics: Diagnostics,
}

impl Analysis {
    /// The neutral default for degenerate input: no days, τ = 24.
    pub fn neutral(algorithm: &str, diagnostics: Diagnostics) -> Self {
        Self {
            algorithm: algorithm.to_string(),
            global_tau: CYCLE_HOURS,
            global_daily_drift: 0.0,
            days: Vec::new(),
            diagnostics,
        }
    }
}

/// Serialize an analysis to pretty JSON for the chart layer.
pub fn export_json(analysis: &Analysis) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(analysis)
}
