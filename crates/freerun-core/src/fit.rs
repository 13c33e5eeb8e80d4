//! Weighted and robust linear regression primitives.
//!
//! Everything downstream (unwrapping, the trajectory estimator, the
//! merger, Kalman initialization) fits lines through weighted points, so
//! the numerics live here once: plain weighted least squares, and an
//! IRLS variant with Tukey's biweight for outlier resistance.

use crate::constants::{EPSILON, IRLS_MAX_ITER, MIN_ROBUST_SCALE, TUKEY_C};

/// A fitted line `y = slope * x + intercept`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearFit {
    pub fn value_at(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Weighted least squares over `(x, y, w)` triples.
///
/// Returns None for fewer than two points, non-positive total weight, or
/// a degenerate design (all x equal).
pub fn weighted_linear_fit(points: &[(f64, f64, f64)]) -> Option<LinearFit> {
    if points.len() < 2 {
        return None;
    }
    let mut sw = 0.0;
    let mut sx = 0.0;
    let mut sy = 0.0;
    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for &(x, y, w) in points {
        if w <= 0.0 {
            continue;
        }
        sw += w;
        sx += w * x;
        sy += w * y;
        sxx += w * x * x;
        sxy += w * x * y;
    }
    if sw <= EPSILON {
        return None;
    }
    let det = sw * sxx - sx * sx;
    if det.abs() <= EPSILON {
        return None;
    }
    let slope = (sw * sxy - sx * sy) / det;
    let intercept = (sy - slope * sx) / sw;
    Some(LinearFit { slope, intercept })
}

/// Robust fit result with the diagnostics the window evaluator reports.
#[derive(Clone, Copy, Debug)]
pub struct RobustFit {
    pub slope: f64,
    pub intercept: f64,
    /// Points with non-zero weight in the final iteration.
    pub points_used: usize,
    /// Median absolute residual of the surviving points.
    pub residual_mad: f64,
}

impl RobustFit {
    pub fn value_at(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Weighted OLS followed by up to [`IRLS_MAX_ITER`] Tukey-biweight
/// reweighting rounds. Scale = max(MAD / 0.6745, [`MIN_ROBUST_SCALE`]).
pub fn robust_weighted_fit(points: &[(f64, f64, f64)]) -> Option<RobustFit> {
    let mut fit = weighted_linear_fit(points)?;

    let mut robust_weights = vec![1.0; points.len()];
    for _ in 0..IRLS_MAX_ITER {
        let residuals: Vec<f64> = points
            .iter()
            .map(|&(x, y, _)| y - fit.value_at(x))
            .collect();
        let abs_res: Vec<f64> = residuals.iter().map(|r| r.abs()).collect();
        let scale = (median_of(&abs_res) / 0.6745).max(MIN_ROBUST_SCALE);

        let mut changed = false;
        for (i, r) in residuals.iter().enumerate() {
            let u = r / (TUKEY_C * scale);
            let w = if u.abs() < 1.0 {
                let t = 1.0 - u * u;
                t * t
            } else {
                0.0
            };
            if (w - robust_weights[i]).abs() > EPSILON {
                changed = true;
            }
            robust_weights[i] = w;
        }

        let reweighted: Vec<(f64, f64, f64)> = points
            .iter()
            .zip(&robust_weights)
            .map(|(&(x, y, w), &rw)| (x, y, w * rw))
            .collect();
        match weighted_linear_fit(&reweighted) {
            Some(next) => fit = next,
            // all weight rejected; keep the last stable fit
            None => break,
        }
        if !changed {
            break;
        }
    }

    let surviving: Vec<f64> = points
        .iter()
        .zip(&robust_weights)
        .filter(|&(&(_, _, w), &rw)| w * rw > 0.0)
        .map(|(&(x, y, _), _)| (y - fit.value_at(x)).abs())
        .collect();

    Some(RobustFit {
        slope: fit.slope,
        intercept: fit.intercept,
        points_used: surviving.len(),
        residual_mad: median_of(&surviving),
    })
}

/// Median of a slice; 0 for an empty one.
pub fn median_of(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Unnormalized Gaussian kernel exp(-½ (dist/σ)²).
pub fn gaussian(dist: f64, sigma: f64) -> f64 {
    (-0.5 * (dist / sigma) * (dist / sigma)).exp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn uniform(points: &[(f64, f64)]) -> Vec<(f64, f64, f64)> {
        points.iter().map(|&(x, y)| (x, y, 1.0)).collect()
    }

    #[test]
    fn test_exact_line() {
        let pts = uniform(&[(0.0, 1.0), (1.0, 3.0), (2.0, 5.0)]);
        let fit = weighted_linear_fit(&pts).unwrap();
        assert_relative_eq!(fit.slope, 2.0, epsilon = 1e-12);
        assert_relative_eq!(fit.intercept, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_weights_pull_fit() {
        // Heavy weight on the flat pair, light on the outlier
        let pts = vec![(0.0, 0.0, 10.0), (1.0, 0.0, 10.0), (2.0, 10.0, 0.01)];
        let fit = weighted_linear_fit(&pts).unwrap();
        assert!(fit.slope.abs() < 0.2, "slope should stay near 0: {}", fit.slope);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert!(weighted_linear_fit(&[]).is_none());
        assert!(weighted_linear_fit(&[(1.0, 2.0, 1.0)]).is_none());
        // all x equal → singular design
        assert!(weighted_linear_fit(&uniform(&[(1.0, 2.0), (1.0, 3.0)])).is_none());
        // zero total weight
        assert!(weighted_linear_fit(&[(0.0, 1.0, 0.0), (1.0, 2.0, 0.0)]).is_none());
    }

    #[test]
    fn test_robust_rejects_outlier() {
        let mut pts: Vec<(f64, f64, f64)> = (0..20)
            .map(|i| (i as f64, 0.5 * i as f64, 1.0))
            .collect();
        pts.push((10.0, 50.0, 1.0)); // wild outlier

        let plain = weighted_linear_fit(&pts).unwrap();
        let robust = robust_weighted_fit(&pts).unwrap();

        assert!(
            (robust.slope - 0.5).abs() < (plain.slope - 0.5).abs(),
            "robust fit should beat OLS: robust {} vs plain {}",
            robust.slope,
            plain.slope
        );
        assert!((robust.slope - 0.5).abs() < 0.05, "slope {}", robust.slope);
        assert!(robust.points_used <= pts.len());
    }

    #[test]
    fn test_robust_clean_data_matches_ols() {
        let pts = uniform(&[(0.0, 1.0), (1.0, 2.1), (2.0, 2.9), (3.0, 4.0), (4.0, 5.05)]);
        let plain = weighted_linear_fit(&pts).unwrap();
        let robust = robust_weighted_fit(&pts).unwrap();
        assert_relative_eq!(robust.slope, plain.slope, epsilon = 0.05);
        assert_eq!(robust.points_used, pts.len());
    }

    #[test]
    fn test_robust_reports_mad() {
        let pts = uniform(&[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0), (3.0, 3.0)]);
        let robust = robust_weighted_fit(&pts).unwrap();
        assert!(robust.residual_mad < 1e-9, "exact line has zero MAD");
    }

    #[test]
    fn test_median() {
        assert_eq!(median_of(&[]), 0.0);
        assert_eq!(median_of(&[3.0]), 3.0);
        assert_eq!(median_of(&[1.0, 3.0]), 2.0);
        assert_eq!(median_of(&[5.0, 1.0, 3.0]), 3.0);
        assert_eq!(median_of(&[4.0, 1.0, 3.0, 2.0]), 2.5);
    }

    #[test]
    fn test_gaussian_kernel() {
        assert_relative_eq!(gaussian(0.0, 3.0), 1.0, epsilon = 1e-12);
        assert_relative_eq!(gaussian(3.0, 3.0), (-0.5f64).exp(), epsilon = 1e-12);
        assert!(gaussian(30.0, 3.0) < 1e-20);
    }
}
