use super::{mean, top_n_arms};
use crate::regression::{FittingError, LinearRegression};
use crate::types::*;

/// Single regression over features plus the arm id as one numeric covariate.
#[derive(Debug, Clone)]
pub struct SLearnerEstimator {
    model: LinearRegression,
    n_arms: usize,
}

impl SLearnerEstimator {
    pub fn fit(samples: &[Sample], n_arms: usize, ridge: f64) -> Result<Self, FittingError> {
        let rows: Vec<Vec<f64>> = samples
            .iter()
            .map(|s| Self::design_row(&s.features, s.arm))
            .collect();
        let targets: Vec<f64> = samples.iter().map(|s| s.outcome).collect();

        let model = LinearRegression::fit(&rows, &targets, ridge)?;
        Ok(Self { model, n_arms })
    }

    /// `[features ‖ arm]`
    pub fn design_row(features: &[f64], arm: usize) -> Vec<f64> {
        let mut row = Vec::with_capacity(features.len() + 1);
        row.extend_from_slice(features);
        row.push(arm as f64);
        row
    }

    /// Predicted outcome for `features` under `arm`. The observed arm goes
    /// through the same path as any counterfactual one.
    pub fn predict(&self, features: &[f64], arm: usize) -> f64 {
        self.model.predict(&Self::design_row(features, arm))
    }

    /// Predicted outcome under every arm
    pub fn counterfactuals(&self, features: &[f64]) -> Vec<f64> {
        (0..self.n_arms).map(|arm| self.predict(features, arm)).collect()
    }

    pub fn model(&self) -> &LinearRegression {
        &self.model
    }

    /// Population-mean counterfactual per arm and per-sample rankings.
    pub fn estimate(&self, samples: &[Sample], top_n: usize) -> EstimatorOutput {
        let mut per_arm = vec![Vec::with_capacity(samples.len()); self.n_arms];
        let mut rankings = Vec::with_capacity(samples.len());

        for sample in samples {
            let predictions = self.counterfactuals(&sample.features);
            for (column, &p) in per_arm.iter_mut().zip(predictions.iter()) {
                column.push(p);
            }
            rankings.push(top_n_arms(predictions.into_iter().enumerate().collect(), top_n));
        }

        EstimatorOutput {
            kind: EstimatorKind::SLearner,
            rewards: per_arm.iter().map(|column| mean(column)).collect(),
            rankings: Some(rankings),
            failures: Vec::new(),
        }
    }
}

/// Fit and evaluate; a failed fit marks every arm unavailable.
pub fn run_s_learner(samples: &[Sample], n_arms: usize, ridge: f64, top_n: usize) -> EstimatorOutput {
    match SLearnerEstimator::fit(samples, n_arms, ridge) {
        Ok(estimator) => estimator.estimate(samples, top_n),
        Err(err) => {
            tracing::warn!(error = %err, "s-learner fit failed");
            EstimatorOutput::unavailable(EstimatorKind::SLearner, n_arms, err.to_string())
        }
    }
}
