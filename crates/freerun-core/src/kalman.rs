//! Two-state Kalman filter with RTS smoothing (`kalman-v1`).
//!
//! State is [phase, drift] with transition phase += drift. One step per
//! calendar day; same-day observations are branch-snapped to the
//! prediction and Mahalanobis-gated before the scalar update. A standard
//! Rauch-Tung-Striebel backward pass then refines every day using what
//! came after it.

use crate::analysis::Diagnostics;
use crate::anchor::{Anchor, extract_anchors, measurement_noise};
use crate::constants::{
    EPSILON, FORECAST_DECAY, GATE_SIGMA, KALMAN_DRIFT_MAX, KALMAN_DRIFT_MIN, PRIOR_DRIFT,
    PRIOR_PHASE, PROCESS_NOISE_DRIFT, PROCESS_NOISE_PHASE,
};
use crate::fit::{gaussian, weighted_linear_fit};
use crate::record::SleepRecord;
use crate::registry::{DayEstimate, PhaseEstimator, SegmentDiagnostics, SegmentResult};
use crate::unwrap::{nearest_branch, pairwise_unwrap};

/// Observations used for the initial regression.
const INIT_MAX_OBS: usize = 7;

/// Initial covariance after a successful init regression.
const INIT_COV_FIT: (f64, f64) = (1.0, 0.09);
/// Initial covariance with a single observation.
const INIT_COV_SINGLE: (f64, f64) = (9.0, 1.0);
/// Initial covariance with no observations at all.
const INIT_COV_PRIOR: (f64, f64) = (36.0, 2.25);

/// Gaussian sigma / reach (days) for the local duration average.
const DURATION_SIGMA: f64 = 3.0;
const DURATION_REACH: i64 = 4;

/// Filter state: [phase, drift].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct State2 {
    pub phase: f64,
    pub drift: f64,
}

impl State2 {
    /// One-day transition: phase advances by the drift.
    pub fn predict(self) -> State2 {
        State2 {
            phase: self.phase + self.drift,
            drift: self.drift,
        }
    }
}

/// Symmetric 2×2 covariance stored as three numbers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Cov2 {
    pub p00: f64,
    pub p01: f64,
    pub p11: f64,
}

impl Cov2 {
    pub fn diagonal(p00: f64, p11: f64) -> Self {
        Self {
            p00,
            p01: 0.0,
            p11,
        }
    }

    /// F P Fᵀ + Q for F = [[1,1],[0,1]] and diagonal Q.
    pub fn predict(self, q_phase: f64, q_drift: f64) -> Cov2 {
        Cov2 {
            p00: self.p00 + 2.0 * self.p01 + self.p11 + q_phase,
            p01: self.p01 + self.p11,
            p11: self.p11 + q_drift,
        }
    }

    pub fn determinant(self) -> f64 {
        self.p00 * self.p11 - self.p01 * self.p01
    }

    /// Inverse as a general matrix; None when singular.
    fn inverse(self) -> Option<Mat2> {
        let det = self.determinant();
        if det.abs() <= EPSILON {
            return None;
        }
        Some(Mat2 {
            m00: self.p11 / det,
            m01: -self.p01 / det,
            m10: -self.p01 / det,
            m11: self.p00 / det,
        })
    }

    fn to_mat(self) -> Mat2 {
        Mat2 {
            m00: self.p00,
            m01: self.p01,
            m10: self.p01,
            m11: self.p11,
        }
    }

    pub fn phase_std(self) -> f64 {
        self.p00.max(0.0).sqrt()
    }
}

/// General 2×2 matrix for the RTS gain algebra.
#[derive(Clone, Copy, Debug)]
struct Mat2 {
    m00: f64,
    m01: f64,
    m10: f64,
    m11: f64,
}

impl Mat2 {
    fn mul(self, o: Mat2) -> Mat2 {
        Mat2 {
            m00: self.m00 * o.m00 + self.m01 * o.m10,
            m01: self.m00 * o.m01 + self.m01 * o.m11,
            m10: self.m10 * o.m00 + self.m11 * o.m10,
            m11: self.m10 * o.m01 + self.m11 * o.m11,
        }
    }

    fn transpose(self) -> Mat2 {
        Mat2 {
            m00: self.m00,
            m01: self.m10,
            m10: self.m01,
            m11: self.m11,
        }
    }

    /// Back to a covariance, averaging the off-diagonals.
    fn symmetrize(self) -> Cov2 {
        Cov2 {
            p00: self.m00,
            p01: (self.m01 + self.m10) / 2.0,
            p11: self.m11,
        }
    }
}

/// Scalar measurement update with H = [1, 0].
fn update(state: State2, cov: Cov2, z: f64, r: f64) -> (State2, Cov2, f64) {
    let s = cov.p00 + r;
    let innovation = z - state.phase;
    let k0 = cov.p00 / s;
    let k1 = cov.p01 / s;
    let next_state = State2 {
        phase: state.phase + k0 * innovation,
        drift: state.drift + k1 * innovation,
    };
    let next_cov = Cov2 {
        p00: (1.0 - k0) * cov.p00,
        p01: (1.0 - k0) * cov.p01,
        p11: cov.p11 - k1 * cov.p01,
    };
    (next_state, next_cov, innovation)
}

/// The state-space estimator (`kalman-v1`).
pub struct KalmanEstimator;

impl KalmanEstimator {
    /// Prior at the segment's first day from the first few observations.
    fn initial(anchors: &[Anchor], noises: &[f64], first_day: i64) -> (State2, Cov2) {
        let head = &anchors[..anchors.len().min(INIT_MAX_OBS)];
        match head.len() {
            0 => (
                State2 {
                    phase: PRIOR_PHASE,
                    drift: PRIOR_DRIFT,
                },
                Cov2::diagonal(INIT_COV_PRIOR.0, INIT_COV_PRIOR.1),
            ),
            1 => (
                State2 {
                    phase: head[0].midpoint - PRIOR_DRIFT * (head[0].day - first_day) as f64,
                    drift: PRIOR_DRIFT,
                },
                Cov2::diagonal(INIT_COV_SINGLE.0, INIT_COV_SINGLE.1),
            ),
            _ => {
                let values =
                    pairwise_unwrap(&head.iter().map(|a| a.midpoint).collect::<Vec<_>>());
                let points: Vec<(f64, f64, f64)> = head
                    .iter()
                    .zip(&values)
                    .zip(noises)
                    .map(|((a, &v), &r)| (a.day as f64, v, 1.0 / r))
                    .collect();
                match weighted_linear_fit(&points) {
                    Some(fit) => {
                        let drift = fit.slope.clamp(KALMAN_DRIFT_MIN, KALMAN_DRIFT_MAX);
                        (
                            State2 {
                                phase: fit.value_at(first_day as f64),
                                drift,
                            },
                            Cov2::diagonal(INIT_COV_FIT.0, INIT_COV_FIT.1),
                        )
                    }
                    None => (
                        State2 {
                            phase: values[0] - PRIOR_DRIFT * (head[0].day - first_day) as f64,
                            drift: PRIOR_DRIFT,
                        },
                        Cov2::diagonal(INIT_COV_SINGLE.0, INIT_COV_SINGLE.1),
                    ),
                }
            }
        }
    }
}

impl PhaseEstimator for KalmanEstimator {
    fn id(&self) -> &'static str {
        "kalman-v1"
    }

    fn neutral_diagnostics(&self) -> Diagnostics {
        Diagnostics::Kalman {
            gated_outliers: 0,
            mean_innovation: 0.0,
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
        let data_days = (last_day - first_day + 1) as usize;
        let total = data_days + forecast_days as usize;

        let anchors = extract_anchors(records, epoch_day);
        let noises: Vec<f64> = anchors
            .iter()
            .map(|a| {
                records
                    .iter()
                    .find(|r| r.id == a.record_id)
                    .map(measurement_noise)
                    .unwrap_or(crate::constants::R_BASE)
            })
            .collect();
        let obs_at = |day: i64| anchors.iter().position(|a| a.day == day);

        let (mut state, mut cov) = Self::initial(&anchors, &noises, first_day);

        let mut pred_states = Vec::with_capacity(total);
        let mut pred_covs = Vec::with_capacity(total);
        let mut filt_states = Vec::with_capacity(total);
        let mut filt_covs = Vec::with_capacity(total);
        let mut gated = 0usize;
        let mut innovations: Vec<f64> = Vec::new();

        for k in 0..total {
            let day = first_day + k as i64;
            if k > 0 {
                state = state.predict();
                cov = cov.predict(PROCESS_NOISE_PHASE, PROCESS_NOISE_DRIFT);
            }
            pred_states.push(state);
            pred_covs.push(cov);

            if let Some(idx) = obs_at(day) {
                let r = noises[idx];
                let z = nearest_branch(anchors[idx].midpoint, state.phase);
                let innovation = z - state.phase;
                let s = cov.p00 + r;
                if innovation * innovation / s > GATE_SIGMA * GATE_SIGMA {
                    gated += 1;
                } else {
                    let (next_state, next_cov, innovation) = update(state, cov, z, r);
                    state = next_state;
                    cov = next_cov;
                    innovations.push(innovation.abs());
                }
            }
            filt_states.push(state);
            filt_covs.push(cov);
        }

        // RTS backward pass. A singular predicted covariance leaves that
        // step's filtered estimate in place.
        let mut smooth_states = filt_states.clone();
        let mut smooth_covs = filt_covs.clone();
        for k in (0..total.saturating_sub(1)).rev() {
            let Some(pred_inv) = pred_covs[k + 1].inverse() else {
                continue;
            };
            let pf = filt_covs[k];
            // P_f Fᵀ for F = [[1,1],[0,1]]
            let pf_ft = Mat2 {
                m00: pf.p00 + pf.p01,
                m01: pf.p01,
                m10: pf.p01 + pf.p11,
                m11: pf.p11,
            };
            let c = pf_ft.mul(pred_inv);

            let dx_phase = smooth_states[k + 1].phase - pred_states[k + 1].phase;
            let dx_drift = smooth_states[k + 1].drift - pred_states[k + 1].drift;
            smooth_states[k] = State2 {
                phase: filt_states[k].phase + c.m00 * dx_phase + c.m01 * dx_drift,
                drift: filt_states[k].drift + c.m10 * dx_phase + c.m11 * dx_drift,
            };

            let dp = Mat2 {
                m00: smooth_covs[k + 1].p00 - pred_covs[k + 1].p00,
                m01: smooth_covs[k + 1].p01 - pred_covs[k + 1].p01,
                m10: smooth_covs[k + 1].p01 - pred_covs[k + 1].p01,
                m11: smooth_covs[k + 1].p11 - pred_covs[k + 1].p11,
            };
            let correction = c.mul(dp).mul(c.transpose()).symmetrize();
            smooth_covs[k] = Cov2 {
                p00: pf.p00 + correction.p00,
                p01: pf.p01 + correction.p01,
                p11: pf.p11 + correction.p11,
            };
        }

        let mean_duration = if anchors.is_empty() {
            records.iter().map(|r| r.duration_h).sum::<f64>() / records.len().max(1) as f64
        } else {
            anchors.iter().map(|a| a.duration_h).sum::<f64>() / anchors.len() as f64
        };
        let local_duration = |day: i64| {
            let mut num = 0.0;
            let mut den = 0.0;
            for a in &anchors {
                let dist = (a.day - day).abs();
                if dist > DURATION_REACH {
                    continue;
                }
                let g = gaussian(dist as f64, DURATION_SIGMA);
                num += g * a.duration_h;
                den += g;
            }
            if den <= EPSILON {
                mean_duration
            } else {
                num / den
            }
        };

        let days: Vec<DayEstimate> = (0..total)
            .map(|k| {
                let day = first_day + k as i64;
                let is_forecast = k >= data_days;
                let mut confidence = 1.0 / (1.0 + smooth_covs[k].phase_std());
                if is_forecast {
                    let past = (k - data_days + 1) as f64;
                    confidence *= (-FORECAST_DECAY * past).exp();
                }
                DayEstimate {
                    day,
                    midpoint: smooth_states[k].phase,
                    confidence: confidence.clamp(0.0, 1.0),
                    drift: smooth_states[k]
                        .drift
                        .clamp(KALMAN_DRIFT_MIN, KALMAN_DRIFT_MAX),
                    half_duration: local_duration(day) / 2.0,
                    is_forecast,
                    anchor_record: if is_forecast {
                        None
                    } else {
                        obs_at(day).map(|i| anchors[i].record_id)
                    },
                }
            })
            .collect();

        SegmentResult {
            days,
            diagnostics: SegmentDiagnostics::Kalman {
                gated_outliers: gated,
                innovations,
            },
        }
    }
}
