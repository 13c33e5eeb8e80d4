/// Days of silence between records that force a new segment.
/// Shared contract with the record-splitting utility that pre-partitions
/// raw export files: both sides must agree on this boundary.
pub const GAP_THRESHOLD_DAYS: i64 = 14;

/// Hours per circadian cycle; also the neutral period estimate.
pub const CYCLE_HOURS: f64 = 24.0;

/// Minimum slept hours for a record to anchor a day.
pub const MIN_ANCHOR_DURATION_H: f64 = 2.0;

/// Minimum quality score for a record to anchor a day.
pub const MIN_ANCHOR_QUALITY: f64 = 0.1;

/// Minimum derived weight for a record to anchor a day.
pub const MIN_ANCHOR_WEIGHT: f64 = 0.05;

/// Weight multiplier for naps; keeps short daytime sleeps from steering
/// trend or unwrap decisions.
pub const NAP_FACTOR: f64 = 0.15;

/// Half-width (days) of the seed-search and local regression windows.
pub const HALF_WINDOW_DAYS: f64 = 21.0;

/// Gaussian sigma (days) for distance weighting in window fits.
pub const WINDOW_SIGMA_DAYS: f64 = 14.0;

/// Lookback limit (days) for resolved neighbors during unwrap expansion.
pub const UNWRAP_LOOKBACK_DAYS: f64 = 30.0;

/// Tukey biweight tuning constant.
pub const TUKEY_C: f64 = 4.685;

/// IRLS reweighting iteration cap.
pub const IRLS_MAX_ITER: usize = 5;

/// Minimum robust scale (hours); residual spread below this is noise.
pub const MIN_ROBUST_SCALE: f64 = 0.5;

/// Kalman process noise, phase component (h²/day²).
pub const PROCESS_NOISE_PHASE: f64 = 0.06;

/// Kalman process noise, drift component (h²/day²).
pub const PROCESS_NOISE_DRIFT: f64 = 0.003;

/// Base measurement noise (h²) before quality/duration scaling.
pub const R_BASE: f64 = 3.0;

/// Floor for the measurement-noise denominator.
pub const R_DENOM_FLOOR: f64 = 0.01;

/// Mahalanobis gate (standard deviations) for rejecting observations.
pub const GATE_SIGMA: f64 = 3.5;

/// Kalman drift clamp, lower bound (h/day).
pub const KALMAN_DRIFT_MIN: f64 = -1.5;

/// Kalman drift clamp, upper bound (h/day).
pub const KALMAN_DRIFT_MAX: f64 = 3.0;

/// Prior daily drift (h/day) when too few observations to fit one.
pub const PRIOR_DRIFT: f64 = 0.7;

/// Prior midsleep hour when a segment has no usable observation.
pub const PRIOR_PHASE: f64 = 12.0;

/// Confidence decay rate per day past the last observed day.
pub const FORECAST_DECAY: f64 = 0.1;

/// Numerical epsilon for near-zero comparisons.
pub const EPSILON: f64 = 1e-10;
