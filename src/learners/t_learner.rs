use super::{mean, top_n_arms};
use crate::regression::{FittingError, LinearRegression};
use crate::types::*;

/// One regression per arm, each fit only on the samples observed under it.
#[derive(Debug, Clone)]
pub struct TLearnerEstimator {
    models: Vec<Result<LinearRegression, FittingError>>,
}

impl TLearnerEstimator {
    pub fn fit(samples: &[Sample], n_arms: usize, ridge: f64) -> Self {
        let models = (0..n_arms)
            .map(|arm| {
                let group: Vec<&Sample> = samples.iter().filter(|s| s.arm == arm).collect();
                if group.is_empty() {
                    return Err(FittingError::EmptyArm { arm });
                }

                let rows: Vec<&[f64]> = group.iter().map(|s| s.features.as_slice()).collect();
                let targets: Vec<f64> = group.iter().map(|s| s.outcome).collect();
                LinearRegression::fit(&rows, &targets, ridge)
            })
            .collect();

        Self { models }
    }

    pub fn model(&self, arm: usize) -> Option<&LinearRegression> {
        self.models.get(arm).and_then(|m| m.as_ref().ok())
    }

    /// `None` when the arm's model could not be fit
    pub fn predict(&self, features: &[f64], arm: usize) -> Option<f64> {
        self.model(arm).map(|m| m.predict(features))
    }

    pub fn failures(&self) -> Vec<ArmFailure> {
        self.models
            .iter()
            .enumerate()
            .filter_map(|(arm, m)| {
                m.as_ref().err().map(|err| ArmFailure {
                    arm: Some(arm),
                    reason: err.to_string(),
                })
            })
            .collect()
    }

    /// Each arm's model predicts over the whole population; rankings cover
    /// the arms that have a model.
    pub fn estimate(&self, samples: &[Sample], top_n: usize) -> EstimatorOutput {
        let n_arms = self.models.len();
        let mut per_arm = vec![Vec::with_capacity(samples.len()); n_arms];
        let mut rankings = Vec::with_capacity(samples.len());

        for sample in samples {
            let mut candidates = Vec::with_capacity(n_arms);
            for (arm, column) in per_arm.iter_mut().enumerate() {
                if let Some(p) = self.predict(&sample.features, arm) {
                    column.push(p);
                    candidates.push((arm, p));
                }
            }
            rankings.push(top_n_arms(candidates, top_n));
        }

        let rewards = per_arm
            .iter()
            .enumerate()
            .map(|(arm, column)| self.model(arm).and_then(|_| mean(column)))
            .collect();

        EstimatorOutput {
            kind: EstimatorKind::TLearner,
            rewards,
            rankings: Some(rankings),
            failures: self.failures(),
        }
    }
}

pub fn run_t_learner(samples: &[Sample], n_arms: usize, ridge: f64, top_n: usize) -> EstimatorOutput {
    let estimator = TLearnerEstimator::fit(samples, n_arms, ridge);
    let output = estimator.estimate(samples, top_n);
    for failure in &output.failures {
        tracing::warn!(arm = ?failure.arm, reason = %failure.reason, "t-learner arm unavailable");
    }
    output
}
