/**
 * Per-track course model: a variational Bayesian Gaussian mixture over
 * `(heading change, speed, acceleration)` triples, one per associated
 * plot. The mixture predicts the next course and gates associations on
 * mature tracks; until enough history exists, a zero-lift linear
 * predictor is used instead.
 */
use std::collections::VecDeque;

use nalgebra::{Matrix3, Vector3};
use tracing::trace;

/// Samples retained on the track, for variance and blend decisions.
pub const HISTORY_CAP: usize = 20;
/// Samples the mixture is trained on.
const TRAIN_WINDOW: usize = 10;
const MAX_COMPONENTS: usize = 5;
/// Dirichlet concentration on the mixture weights.
const WEIGHT_CONCENTRATION_PRIOR: f64 = 1.0;
const COVARIANCE_FLOOR: f64 = 1e-6;
const EM_ITERATIONS: usize = 25;

/// Wrap a heading difference into [-180, 180].
pub fn normalize_heading_diff(mut diff: f64) -> f64 {
    while diff > 180.0 {
        diff -= 360.0;
    }
    while diff < -180.0 {
        diff += 360.0;
    }
    diff
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CourseSample {
    pub heading_deg: f64,
    pub speed_ms: f64,
    pub dt_s: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoursePrediction {
    pub heading_deg: f64,
    pub speed_ms: f64,
    /// `exp(log-likelihood)` of the latest feature under the mixture,
    /// clamped to (0, 1]. 0.1 while the linear fallback is in use.
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CourseModel {
    history: VecDeque<CourseSample>,
    mixture: Option<GaussianMixture>,
}

impl CourseModel {
    /// Record the course observed with a newly associated plot and
    /// retrain the mixture once three samples exist.
    pub fn observe(&mut self, heading_deg: f64, speed_ms: f64, dt_s: f64) {
        self.history.push_back(CourseSample {
            heading_deg,
            speed_ms,
            dt_s,
        });
        while self.history.len() > HISTORY_CAP {
            self.history.pop_front();
        }
        if self.history.len() >= 3 {
            self.mixture = GaussianMixture::fit(&self.features());
            if self.mixture.is_none() {
                trace!("course mixture training failed, keeping linear predictor");
            }
        }
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn is_trained(&self) -> bool {
        self.mixture.is_some()
    }

    /// `(heading change, speed, acceleration)` feature triples over the
    /// training window.
    fn features(&self) -> Vec<Vector3<f64>> {
        let start = self.history.len().saturating_sub(TRAIN_WINDOW);
        let window: Vec<&CourseSample> = self.history.iter().skip(start).collect();
        window
            .windows(2)
            .map(|pair| {
                let (prev, curr) = (pair[0], pair[1]);
                let acceleration = (curr.speed_ms - prev.speed_ms) / curr.dt_s.max(0.1);
                Vector3::new(
                    normalize_heading_diff(curr.heading_deg - prev.heading_deg),
                    curr.speed_ms,
                    acceleration,
                )
            })
            .collect()
    }

    fn latest_feature(&self) -> Option<Vector3<f64>> {
        let n = self.history.len();
        if n < 2 {
            return None;
        }
        let prev = self.history[n - 2];
        let curr = self.history[n - 1];
        let acceleration = (curr.speed_ms - prev.speed_ms) / curr.dt_s.max(0.1);
        Some(Vector3::new(
            normalize_heading_diff(curr.heading_deg - prev.heading_deg),
            curr.speed_ms,
            acceleration,
        ))
    }

    /// Predict the next course from the current kinematics.
    pub fn predict(&self, current_heading_deg: f64, current_speed_ms: f64) -> CoursePrediction {
        let Some(mixture) = &self.mixture else {
            return CoursePrediction {
                heading_deg: current_heading_deg,
                speed_ms: current_speed_ms,
                confidence: 0.1,
            };
        };

        let heading_change = mixture.weighted_mean(0);
        let speed = mixture.weighted_mean(1);
        let confidence = self
            .latest_feature()
            .map(|feature| mixture.log_likelihood(&feature).exp().min(1.0))
            .unwrap_or(0.1);

        CoursePrediction {
            heading_deg: (current_heading_deg + heading_change).rem_euclid(360.0),
            speed_ms: speed.max(0.1),
            confidence,
        }
    }

    /// Circular variance of the recorded headings,
    /// `1 − √((Σcos)² + (Σsin)²)/n`, in [0, 1].
    pub fn circular_variance(&self) -> f64 {
        let n = self.history.len();
        if n == 0 {
            return 0.0;
        }
        let (sum_cos, sum_sin) = self.history.iter().fold((0.0, 0.0), |(c, s), sample| {
            let rad = sample.heading_deg.to_radians();
            (c + rad.cos(), s + rad.sin())
        });
        1.0 - (sum_cos * sum_cos + sum_sin * sum_sin).sqrt() / n as f64
    }

    /// Angular tolerance used to gate course matches: three circular
    /// standard deviations, floored at 15°.
    pub fn tolerance_deg(&self) -> f64 {
        let sigma_deg = (2.0 * self.circular_variance()).sqrt().to_degrees();
        (3.0 * sigma_deg).max(15.0)
    }
}

/// A fitted full-covariance Gaussian mixture in feature space.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianMixture {
    weights: Vec<f64>,
    means: Vec<Vector3<f64>>,
    covariances: Vec<Matrix3<f64>>,
}

impl GaussianMixture {
    /// Variational EM with up to [`MAX_COMPONENTS`] components and a unit
    /// weight-concentration prior. Initialisation is deterministic
    /// (contiguous chunks of the features sorted by heading change) so
    /// that repeated runs over the same data produce the same mixture.
    pub fn fit(features: &[Vector3<f64>]) -> Option<Self> {
        let n = features.len();
        if n < 2 {
            return None;
        }
        let k = MAX_COMPONENTS.min(n);

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| features[a][0].total_cmp(&features[b][0]));

        let mut weights = vec![0.0; k];
        let mut means = vec![Vector3::zeros(); k];
        let mut covariances = vec![Matrix3::identity(); k];
        for (component, chunk) in order.chunks(n.div_ceil(k)).enumerate() {
            let count = chunk.len() as f64;
            let mean = chunk
                .iter()
                .fold(Vector3::zeros(), |acc, &i| acc + features[i])
                / count;
            let mut cov = Matrix3::identity() * COVARIANCE_FLOOR;
            for &i in chunk {
                let d = features[i] - mean;
                cov += d * d.transpose() / count;
            }
            weights[component] = count / n as f64;
            means[component] = mean;
            covariances[component] = cov + Matrix3::identity();
        }

        let mut mixture = GaussianMixture {
            weights,
            means,
            covariances,
        };

        let mut responsibilities = vec![vec![0.0; k]; n];
        for _ in 0..EM_ITERATIONS {
            // E step, in log space
            for (i, feature) in features.iter().enumerate() {
                let log_terms: Vec<f64> = (0..k)
                    .map(|c| {
                        mixture.weights[c].max(1e-12).ln()
                            + log_gaussian(feature, &mixture.means[c], &mixture.covariances[c])
                    })
                    .collect();
                let norm = log_sum_exp(&log_terms);
                for c in 0..k {
                    responsibilities[i][c] = (log_terms[c] - norm).exp();
                }
            }

            // M step with the Dirichlet prior on the weights
            for c in 0..k {
                let nk: f64 = responsibilities.iter().map(|r| r[c]).sum();
                let prior = WEIGHT_CONCENTRATION_PRIOR - 1.0;
                mixture.weights[c] =
                    (nk + prior).max(0.0) / (n as f64 + k as f64 * prior).max(1e-12);
                if nk < 1e-9 {
                    continue;
                }
                let mean = features
                    .iter()
                    .enumerate()
                    .fold(Vector3::zeros(), |acc, (i, f)| {
                        acc + f * responsibilities[i][c]
                    })
                    / nk;
                let mut cov = Matrix3::zeros();
                for (i, feature) in features.iter().enumerate() {
                    let d = feature - mean;
                    cov += d * d.transpose() * responsibilities[i][c];
                }
                mixture.means[c] = mean;
                mixture.covariances[c] = cov / nk + Matrix3::identity() * COVARIANCE_FLOOR;
            }

            let total: f64 = mixture.weights.iter().sum();
            if total > 0.0 {
                for w in &mut mixture.weights {
                    *w /= total;
                }
            }
        }

        // every covariance must still be invertible
        if mixture
            .covariances
            .iter()
            .any(|cov| cov.cholesky().is_none())
        {
            return None;
        }
        Some(mixture)
    }

    /// Mixture-weighted mean of one feature dimension.
    pub fn weighted_mean(&self, dimension: usize) -> f64 {
        self.weights
            .iter()
            .zip(&self.means)
            .map(|(w, mean)| w * mean[dimension])
            .sum()
    }

    /// Log-likelihood of one feature vector under the mixture.
    pub fn log_likelihood(&self, feature: &Vector3<f64>) -> f64 {
        let log_terms: Vec<f64> = self
            .weights
            .iter()
            .zip(self.means.iter().zip(&self.covariances))
            .map(|(w, (mean, cov))| w.max(1e-12).ln() + log_gaussian(feature, mean, cov))
            .collect();
        log_sum_exp(&log_terms)
    }
}

fn log_gaussian(x: &Vector3<f64>, mean: &Vector3<f64>, cov: &Matrix3<f64>) -> f64 {
    const LOG_2PI: f64 = 1.8378770664093453;
    let Some(chol) = cov.cholesky() else {
        return f64::NEG_INFINITY;
    };
    let d = x - mean;
    let solved = chol.solve(&d);
    let log_det: f64 = (0..3).map(|i| chol.l()[(i, i)].max(1e-300).ln() * 2.0).sum();
    -0.5 * (3.0 * LOG_2PI + log_det + d.dot(&solved))
}

fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn straight_line_model(n: usize) -> CourseModel {
        let mut model = CourseModel::default();
        for _ in 0..n {
            model.observe(90.0, 100.0, 1.0);
        }
        model
    }

    #[test]
    fn untrained_model_is_zero_lift() {
        let model = CourseModel::default();
        let prediction = model.predict(45.0, 80.0);
        assert_eq!(prediction.heading_deg, 45.0);
        assert_eq!(prediction.speed_ms, 80.0);
        assert_eq!(prediction.confidence, 0.1);
    }

    #[test]
    fn trains_after_three_samples() {
        let mut model = CourseModel::default();
        model.observe(90.0, 100.0, 1.0);
        model.observe(90.0, 100.0, 1.0);
        assert!(!model.is_trained());
        model.observe(90.0, 100.0, 1.0);
        assert!(model.is_trained());
    }

    #[test]
    fn straight_course_predicts_no_turn() {
        let model = straight_line_model(8);
        let prediction = model.predict(90.0, 100.0);
        assert!((prediction.heading_deg - 90.0).abs() < 2.0);
        assert!((prediction.speed_ms - 100.0).abs() < 5.0);
        assert!(prediction.confidence > 0.0 && prediction.confidence <= 1.0);
    }

    #[test]
    fn steady_turn_is_learned() {
        let mut model = CourseModel::default();
        for i in 0..10 {
            model.observe(90.0 + 3.0 * i as f64, 100.0, 1.0);
        }
        let prediction = model.predict(120.0, 100.0);
        // the mixture should carry the ~3°/update drift
        let lift = normalize_heading_diff(prediction.heading_deg - 120.0);
        assert!(lift > 1.0 && lift < 5.0, "lift was {lift}");
    }

    #[test]
    fn circular_variance_of_steady_course_is_low() {
        let model = straight_line_model(10);
        assert!(model.circular_variance() < 1e-9);
        assert_eq!(model.tolerance_deg(), 15.0);
    }

    #[test]
    fn erratic_course_widens_tolerance() {
        let mut model = CourseModel::default();
        for heading in [0.0, 120.0, 240.0, 10.0, 130.0, 250.0] {
            model.observe(heading, 50.0, 1.0);
        }
        assert!(model.circular_variance() > 0.5);
        assert!(model.tolerance_deg() > 15.0);
    }

    #[test]
    fn history_is_bounded() {
        let model = straight_line_model(100);
        assert_eq!(model.history_len(), HISTORY_CAP);
    }

    #[test]
    fn fit_is_deterministic() {
        let features: Vec<Vector3<f64>> = (0..8)
            .map(|i| Vector3::new(i as f64, 100.0 - i as f64, 0.5))
            .collect();
        let a = GaussianMixture::fit(&features).unwrap();
        let b = GaussianMixture::fit(&features).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn heading_wrap() {
        assert_eq!(normalize_heading_diff(350.0), -10.0);
        assert_eq!(normalize_heading_diff(-190.0), 170.0);
        assert_eq!(normalize_heading_diff(90.0), 90.0);
    }
}
