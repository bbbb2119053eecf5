use super::PropensityConfig;
use crate::regression::FittingError;
use crate::types::{Sample, EPSILON};

/// Multinomial logistic regression `features -> P(arm)`.
///
/// Inputs are standardized with the training mean/deviation; each class
/// carries `p` coefficients plus an unpenalized intercept (stored last).
#[derive(Debug, Clone)]
pub struct PropensityModel {
    /// k × (p + 1), row-major
    weights: Vec<f64>,
    mean: Vec<f64>,
    scale: Vec<f64>,
    n_classes: usize,
    feature_dim: usize,
    iterations: u32,
}

impl PropensityModel {
    /// Train on `(features, observed arm)` pairs by full-batch gradient
    /// descent on the mean cross-entropy plus `λ/2 ||W||²`.
    pub fn fit(samples: &[Sample], n_classes: usize, config: &PropensityConfig) -> Result<Self, FittingError> {
        if samples.is_empty() {
            return Err(FittingError::EmptyInput);
        }

        let learning_rate = config.learning_rate.unwrap_or(0.5);
        let regularization = config.regularization.unwrap_or(0.01);
        let max_iterations = config.max_iterations.unwrap_or(10_000);
        let convergence_threshold = config.convergence_threshold.unwrap_or(1e-9);

        let p = samples[0].features.len();
        for (row, s) in samples.iter().enumerate() {
            if s.features.len() != p {
                return Err(FittingError::DimensionMismatch {
                    row,
                    expected: p,
                    found: s.features.len(),
                });
            }
            if s.arm >= n_classes {
                return Err(FittingError::ArmOutOfRange {
                    row,
                    arm: s.arm,
                    arms: n_classes,
                });
            }
        }

        let n = samples.len() as f64;
        let mut mean = vec![0.0; p];
        for s in samples {
            for (m, &v) in mean.iter_mut().zip(&s.features) {
                *m += v / n;
            }
        }
        let mut scale = vec![0.0; p];
        for s in samples {
            for ((sd, &v), &m) in scale.iter_mut().zip(&s.features).zip(&mean) {
                *sd += (v - m) * (v - m) / n;
            }
        }
        scale.iter_mut().for_each(|sd| {
            let v = sd.sqrt();
            *sd = if v > EPSILON { v } else { 1.0 };
        });

        let d = p + 1;
        let mut model = Self {
            weights: vec![0.0; n_classes * d],
            mean,
            scale,
            n_classes,
            feature_dim: p,
            iterations: 0,
        };

        // one class: every probability is 1
        if n_classes < 2 {
            return Ok(model);
        }

        let inputs: Vec<Vec<f64>> = samples.iter().map(|s| model.standardize(&s.features)).collect();
        let mut prev_loss = f64::INFINITY;

        for iter in 0..max_iterations {
            let mut gradients = vec![0.0; n_classes * d];
            let mut loss = 0.0;

            for (z, s) in inputs.iter().zip(samples) {
                let probs = model.softmax(z);
                loss -= (probs[s.arm] + EPSILON).ln();

                for (class, &prob) in probs.iter().enumerate() {
                    let error = prob - if class == s.arm { 1.0 } else { 0.0 };
                    let row = &mut gradients[class * d..(class + 1) * d];
                    for (g, &zj) in row.iter_mut().zip(z.iter()) {
                        *g += error * zj;
                    }
                }
            }

            loss /= n;
            gradients.iter_mut().for_each(|g| *g /= n);

            // L2 on coefficients only
            for class in 0..n_classes {
                for j in 0..p {
                    let w = model.weights[class * d + j];
                    loss += (regularization / 2.0) * w * w;
                    gradients[class * d + j] += regularization * w;
                }
            }

            for (w, g) in model.weights.iter_mut().zip(gradients.iter()) {
                *w -= learning_rate * g;
            }
            model.iterations = iter + 1;

            if !loss.is_finite() {
                break;
            }
            if (prev_loss - loss).abs() < convergence_threshold {
                break;
            }
            prev_loss = loss;
        }

        tracing::debug!(
            iterations = model.iterations,
            loss = prev_loss,
            classes = n_classes,
            "propensity model fitted"
        );

        Ok(model)
    }

    /// Standardized features with the trailing bias term
    fn standardize(&self, features: &[f64]) -> Vec<f64> {
        let mut z: Vec<f64> = features
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(&v, (&m, &s))| (v - m) / s)
            .collect();
        z.push(1.0);
        z
    }

    fn softmax(&self, z: &[f64]) -> Vec<f64> {
        let d = self.feature_dim + 1;
        let logits: Vec<f64> = (0..self.n_classes)
            .map(|class| {
                self.weights[class * d..(class + 1) * d]
                    .iter()
                    .zip(z)
                    .map(|(w, x)| w * x)
                    .sum()
            })
            .collect();

        let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = logits.iter().map(|&l| (l - max).exp()).collect();
        let total: f64 = exps.iter().sum();
        exps.into_iter().map(|e| e / total).collect()
    }

    /// Probability of every arm for `features`
    pub fn predict_proba(&self, features: &[f64]) -> Vec<f64> {
        if self.n_classes == 1 {
            return vec![1.0];
        }
        self.softmax(&self.standardize(features))
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }
}
