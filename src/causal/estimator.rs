use super::*;
use crate::regression::FittingError;
use crate::types::*;

/// Inverse-propensity-weighted arm outcomes.
///
/// For arm `i`: `Σ_{T=i} w·y / Σ_{T=i} w` with `w = 1 / e_T(x)`, the
/// propensity of the arm the sample actually received.
#[derive(Debug, Clone)]
pub struct IpwEstimator {
    propensity: PropensityModel,
    n_arms: usize,
}

impl IpwEstimator {
    pub fn fit(samples: &[Sample], n_arms: usize, config: &PropensityConfig) -> Result<Self, FittingError> {
        let propensity = PropensityModel::fit(samples, n_arms, config)?;
        Ok(Self { propensity, n_arms })
    }

    pub fn propensity(&self) -> &PropensityModel {
        &self.propensity
    }

    /// Predicted propensity of each sample's own arm
    pub fn own_propensities(&self, samples: &[Sample]) -> Result<Vec<f64>, FittingError> {
        samples
            .iter()
            .enumerate()
            .map(|(row, s)| {
                let out_of_range = FittingError::ArmOutOfRange {
                    row,
                    arm: s.arm,
                    arms: self.n_arms,
                };
                if s.arm >= self.n_arms {
                    return Err(out_of_range);
                }
                self.propensity
                    .predict_proba(&s.features)
                    .get(s.arm)
                    .copied()
                    .ok_or(out_of_range)
            })
            .collect()
    }

    pub fn weights(&self, samples: &[Sample]) -> Result<Vec<f64>, FittingError> {
        Ok(self
            .own_propensities(samples)?
            .into_iter()
            .map(|e| 1.0 / e.max(MIN_PROPENSITY))
            .collect())
    }

    /// Weighted outcome mean per arm. Arms without samples, or whose weight
    /// sum is not a positive finite number, fail individually; a sample
    /// outside the arm range fails the whole call.
    pub fn estimate(&self, samples: &[Sample]) -> Result<(EstimatorOutput, Vec<IpwArmSummary>), FittingError> {
        let propensities = self.own_propensities(samples)?;

        let mut count = vec![0usize; self.n_arms];
        let mut sum_w = vec![0.0; self.n_arms];
        let mut sum_w2 = vec![0.0; self.n_arms];
        let mut sum_wy = vec![0.0; self.n_arms];
        let mut sum_e = vec![0.0; self.n_arms];

        // arms were range-checked by own_propensities
        for (s, &e) in samples.iter().zip(propensities.iter()) {
            let w = 1.0 / e.max(MIN_PROPENSITY);
            count[s.arm] += 1;
            sum_w[s.arm] += w;
            sum_w2[s.arm] += w * w;
            sum_wy[s.arm] += w * s.outcome;
            sum_e[s.arm] += e;
        }

        let mut rewards = Vec::with_capacity(self.n_arms);
        let mut summaries = Vec::with_capacity(self.n_arms);
        let mut failures = Vec::new();

        for arm in 0..self.n_arms {
            let result = if count[arm] == 0 {
                Err(FittingError::EmptyArm { arm })
            } else if !(sum_w[arm].is_finite() && sum_w[arm] > 0.0 && sum_wy[arm].is_finite()) {
                Err(FittingError::NonFiniteWeight { arm })
            } else {
                Ok(sum_wy[arm] / sum_w[arm])
            };

            let reward = match result {
                Ok(r) => Some(r),
                Err(err) => {
                    tracing::warn!(arm, error = %err, "ipw arm unavailable");
                    failures.push(ArmFailure {
                        arm: Some(arm),
                        reason: err.to_string(),
                    });
                    None
                }
            };

            rewards.push(reward);
            summaries.push(IpwArmSummary {
                arm,
                count: count[arm],
                weight_sum: sum_w[arm],
                effective_sample_size: if sum_w2[arm] > 0.0 {
                    sum_w[arm] * sum_w[arm] / sum_w2[arm]
                } else {
                    0.0
                },
                mean_propensity: if count[arm] > 0 {
                    sum_e[arm] / count[arm] as f64
                } else {
                    0.0
                },
                reward,
            });
        }

        let output = EstimatorOutput {
            kind: EstimatorKind::Ipw,
            rewards,
            rankings: None,
            failures,
        };

        Ok((output, summaries))
    }
}

/// Fit and evaluate; a failed propensity fit or an out-of-range arm marks
/// every arm unavailable.
pub fn run_ipw(
    samples: &[Sample],
    n_arms: usize,
    config: &PropensityConfig,
) -> (EstimatorOutput, Vec<IpwArmSummary>) {
    match IpwEstimator::fit(samples, n_arms, config).and_then(|estimator| estimator.estimate(samples)) {
        Ok(result) => result,
        Err(err) => {
            tracing::warn!(error = %err, "ipw estimation failed");
            (
                EstimatorOutput::unavailable(EstimatorKind::Ipw, n_arms, err.to_string()),
                Vec::new(),
            )
        }
    }
}
