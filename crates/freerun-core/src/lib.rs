//! Circadian phase and period estimation from irregular sleep logs.
//!
//! Given a batch of sleep records, estimates every calendar day's
//! "circadian night" window, a confidence level, and local/global period
//! (τ) — built for non-24-hour sleep-wake patterns where bedtime drifts
//! relative to clock time, and robust to missing days, multi-week gaps,
//! naps, and outlier entries.
//!
//! Two interchangeable estimators are registered: a windowed
//! robust-regression trajectory fit (`regression-v1`) and a two-state
//! Kalman filter with RTS smoothing (`kalman-v1`).
//!
//! Zero I/O — pure math engine with no opinions about transport or
//! persistence. Deterministic: identical input yields identical output,
//! and calls share no mutable state.

pub mod analysis;
pub mod anchor;
pub mod constants;
pub mod date;
pub mod error;
pub mod fit;
pub mod kalman;
pub mod merge;
pub mod record;
pub mod registry;
pub mod segment;
pub mod smooth;
pub mod trajectory;
pub mod unwrap;

pub use analysis::{Analysis, CircadianDay, ConfidenceLabel, Diagnostics, export_json};
pub use anchor::{Anchor, anchor_weight, extract_anchors, measurement_noise};
pub use constants::GAP_THRESHOLD_DAYS;
pub use date::CivilDate;
pub use error::{EngineError, Result};
pub use kalman::KalmanEstimator;
pub use record::{SleepRecord, records_from_json};
pub use registry::{EstimatorRegistry, PhaseEstimator, analyze, registry};
pub use segment::{Segment, split_segments};
pub use trajectory::RegressionEstimator;
