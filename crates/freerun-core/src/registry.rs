//! Estimator registry and the shared analysis pipeline.
//!
//! Estimators are strategies behind the [`PhaseEstimator`] trait, looked
//! up by string id from a table populated once at process start. The
//! pipeline around them is common: sort, segment, estimate per segment
//! (forecasting only past the last one), merge.

use std::sync::OnceLock;

use uuid::Uuid;

use crate::analysis::{Analysis, Diagnostics};
use crate::date::CivilDate;
use crate::error::{EngineError, Result};
use crate::kalman::KalmanEstimator;
use crate::merge::merge_segments;
use crate::record::SleepRecord;
use crate::segment::split_segments;
use crate::trajectory::RegressionEstimator;

/// One day of a segment's estimated trajectory, in unwrapped phase hours.
#[derive(Clone, Debug)]
pub struct DayEstimate {
    /// Days since the global epoch.
    pub day: i64,
    /// Unwrapped midsleep hour (may exceed [0, 24)).
    pub midpoint: f64,
    pub confidence: f64,
    /// Local daily drift in h/day.
    pub drift: f64,
    /// Half of the estimated sleep duration, in hours.
    pub half_duration: f64,
    pub is_forecast: bool,
    pub anchor_record: Option<Uuid>,
}

/// Per-segment estimator output plus raw diagnostic material.
#[derive(Clone, Debug)]
pub struct SegmentResult {
    pub days: Vec<DayEstimate>,
    pub diagnostics: SegmentDiagnostics,
}

/// Raw per-segment diagnostics; the merger pools these across segments.
#[derive(Clone, Debug)]
pub enum SegmentDiagnostics {
    Regression {
        /// Anchor residuals against the smoothed trajectory.
        residuals: Vec<f64>,
        /// The unwrapped anchor phases those residuals refer to.
        observed: Vec<f64>,
    },
    Kalman {
        gated_outliers: usize,
        /// Absolute innovations of accepted updates.
        innovations: Vec<f64>,
    },
}

/// A pluggable phase estimator analyzing one segment at a time.
pub trait PhaseEstimator: Send + Sync {
    fn id(&self) -> &'static str;

    /// Estimate one segment. `epoch_day` anchors day numbers globally;
    /// `forecast_days` is non-zero only for the final segment.
    fn analyze_segment(
        &self,
        records: &[SleepRecord],
        epoch_day: i64,
        forecast_days: u32,
    ) -> SegmentResult;

    /// Diagnostics shape for an analysis with no data at all.
    fn neutral_diagnostics(&self) -> Diagnostics;
}

/// Lookup table of registered estimators.
pub struct EstimatorRegistry {
    estimators: Vec<Box<dyn PhaseEstimator>>,
}

impl EstimatorRegistry {
    /// The built-in estimators. New strategies plug in here.
    pub fn with_defaults() -> Self {
        Self {
            estimators: vec![Box::new(RegressionEstimator), Box::new(KalmanEstimator)],
        }
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.estimators.iter().map(|e| e.id()).collect()
    }

    pub fn get(&self, id: &str) -> Option<&dyn PhaseEstimator> {
        self.estimators
            .iter()
            .find(|e| e.id() == id)
            .map(|e| e.as_ref())
    }

    /// Run the full pipeline with the named estimator.
    ///
    /// Records may arrive in any order. An unknown id is an error; empty
    /// input is not (it yields the neutral analysis).
    pub fn analyze(
        &self,
        algorithm: &str,
        records: &[SleepRecord],
        forecast_days: u32,
    ) -> Result<Analysis> {
        let estimator = self.get(algorithm).ok_or_else(|| EngineError::UnknownAlgorithm {
            id: algorithm.to_string(),
            valid: self.ids(),
        })?;

        if records.is_empty() {
            return Ok(Analysis::neutral(algorithm, estimator.neutral_diagnostics()));
        }

        let segments = split_segments(records);
        let epoch_day = segments.iter().map(|s| s.first_day).min().unwrap_or(0);
        let epoch = CivilDate::from_day_number(epoch_day);

        let last = segments.len() - 1;
        let results: Vec<SegmentResult> = segments
            .iter()
            .enumerate()
            .map(|(i, seg)| {
                let fc = if i == last { forecast_days } else { 0 };
                estimator.analyze_segment(&seg.records, epoch_day, fc)
            })
            .collect();

        Ok(merge_segments(&results, epoch, algorithm))
    }
}

static REGISTRY: OnceLock<EstimatorRegistry> = OnceLock::new();

/// Process-wide registry, populated once on first use. Read-only after
/// that; safe to share across threads.
pub fn registry() -> &'static EstimatorRegistry {
    REGISTRY.get_or_init(EstimatorRegistry::with_defaults)
}

/// Run a full analysis with the process-wide registry.
pub fn analyze(algorithm: &str, records: &[SleepRecord], forecast_days: u32) -> Result<Analysis> {
    registry().analyze(algorithm, records, forecast_days)
}
