use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::learners::top_n_arms;
use crate::matrix::*;
use crate::sanitize::{diagnose_model, needs_full_recompute};
use crate::types::*;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NumericalError {
    #[error("arm {arm} design matrix is singular: {source}")]
    SingularDesign {
        arm: usize,
        #[source]
        source: MatrixError,
    },
    #[error("arm {arm} produced a non-finite score")]
    NonFiniteScore { arm: usize },
    #[error("feature vector has {found} entries, expected {expected}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("arm {arm} out of range ({arms} arms)")]
    ArmOutOfRange { arm: usize, arms: usize },
}

/// UCB breakdown for one arm and one context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UCBStats {
    pub theta: Vec<f64>,
    pub exploitation: f64,
    pub confidence: f64,
    pub score: f64,
}

/// Ridge-regression statistic of one arm.
#[derive(Debug, Clone)]
pub struct ArmStatistic {
    /// Design matrix A = I + X^T X (d×d)
    a: Vec<f64>,
    /// Response vector b = X^T y (d)
    b: Vec<f64>,
    /// Cholesky factor L of A (lower triangular, d×d)
    l: Vec<f64>,
    d: usize,
    update_count: u32,
}

impl ArmStatistic {
    pub fn new(d: usize) -> Self {
        Self {
            a: identity(d, 1.0),
            b: vec![0.0; d],
            l: identity(d, 1.0),
            d,
            update_count: 0,
        }
    }

    /// `A += x x^T`, `b += reward * x`, keeping `L` in sync.
    ///
    /// The new `A` and `L` are built on copies; on error the statistic is
    /// left exactly as it was.
    fn update(&mut self, x: &[f64], reward: f64) -> Result<(), MatrixError> {
        let need_recompute = needs_full_recompute(self.update_count, &self.l, self.d);

        let mut a = self.a.clone();
        rank1_update_matrix(&mut a, x, self.d);

        let mut l = self.l.clone();
        if need_recompute || !cholesky_rank1_update(&mut l, x, self.d, MIN_RANK1_DIAG) {
            l = cholesky_decompose(&a, self.d)?;
        }

        vec_add_scaled(&mut self.b, x, reward);
        self.a = a;
        self.l = l;
        self.update_count += 1;
        Ok(())
    }

    /// θ = A^{-1} b, solved through the cached factor
    pub fn theta(&self) -> Vec<f64> {
        solve_cholesky(&self.l, &self.b, self.d)
    }

    fn ucb(&self, x: &[f64], alpha: f64) -> UCBStats {
        let theta = self.theta();
        let exploitation = dot_product(&theta, x);
        let confidence = compute_quadratic_form(&self.l, x, self.d).sqrt();

        UCBStats {
            score: exploitation + alpha * confidence,
            theta,
            exploitation,
            confidence,
        }
    }

    /// Same statistic computed from an explicit `A^{-1}` rebuilt on every call.
    fn ucb_by_inversion(&self, x: &[f64], alpha: f64) -> Result<UCBStats, MatrixError> {
        let a_inv = invert_spd(&self.a, self.d)?;
        let theta = mat_vec_mul(&a_inv, &self.b, self.d);
        let exploitation = dot_product(&theta, x);
        let quadratic = dot_product(&mat_vec_mul(&a_inv, x, self.d), x);
        let confidence = quadratic.max(0.0).sqrt();

        Ok(UCBStats {
            score: exploitation + alpha * confidence,
            theta,
            exploitation,
            confidence,
        })
    }

    pub fn design_matrix(&self) -> &[f64] {
        &self.a
    }

    pub fn response_vector(&self) -> &[f64] {
        &self.b
    }

    pub fn update_count(&self) -> u32 {
        self.update_count
    }

    pub fn diagnose(&self) -> DiagnosticResult {
        diagnose_model(&self.a, &self.l, self.d)
    }
}

/// Disjoint LinUCB over treatment-set arms.
#[derive(Debug, Clone)]
pub struct LinUCBBandit {
    arms: Vec<ArmStatistic>,
    alpha: f64,
    d: usize,
}

impl LinUCBBandit {
    pub fn new(feature_dim: usize, n_arms: usize, alpha: f64) -> Self {
        Self {
            arms: (0..n_arms).map(|_| ArmStatistic::new(feature_dim)).collect(),
            alpha: alpha.max(0.0),
            d: feature_dim,
        }
    }

    fn check_features(&self, features: &[f64]) -> Result<(), NumericalError> {
        if features.len() != self.d {
            return Err(NumericalError::DimensionMismatch {
                expected: self.d,
                found: features.len(),
            });
        }
        Ok(())
    }

    /// Fold one observation into `arm`'s statistic. Other arms are untouched.
    pub fn update(&mut self, features: &[f64], outcome: f64, arm: usize) -> Result<(), NumericalError> {
        self.check_features(features)?;
        let n_arms = self.arms.len();
        let stat = self
            .arms
            .get_mut(arm)
            .ok_or(NumericalError::ArmOutOfRange { arm, arms: n_arms })?;

        stat.update(features, outcome)
            .map_err(|source| NumericalError::SingularDesign { arm, source })
    }

    /// UCB breakdown for every arm.
    pub fn ucb_stats(&self, features: &[f64]) -> Result<Vec<UCBStats>, NumericalError> {
        self.check_features(features)?;
        self.arms
            .iter()
            .enumerate()
            .map(|(arm, stat)| {
                let stats = stat.ucb(features, self.alpha);
                if stats.score.is_finite() {
                    Ok(stats)
                } else {
                    Err(NumericalError::NonFiniteScore { arm })
                }
            })
            .collect()
    }

    /// `θ·x + α·sqrt(x^T A^{-1} x)` for every arm.
    pub fn score(&self, features: &[f64]) -> Result<Vec<f64>, NumericalError> {
        Ok(self
            .ucb_stats(features)?
            .into_iter()
            .map(|stats| stats.score)
            .collect())
    }

    /// [`score`](Self::score) with `A^{-1}` recomputed from scratch per arm.
    pub fn score_by_inversion(&self, features: &[f64]) -> Result<Vec<f64>, NumericalError> {
        self.check_features(features)?;
        self.arms
            .iter()
            .enumerate()
            .map(|(arm, stat)| {
                let stats = stat
                    .ucb_by_inversion(features, self.alpha)
                    .map_err(|source| NumericalError::SingularDesign { arm, source })?;
                if stats.score.is_finite() {
                    Ok(stats.score)
                } else {
                    Err(NumericalError::NonFiniteScore { arm })
                }
            })
            .collect()
    }

    /// Highest-scoring arm; ties go to the lowest index.
    pub fn choose_action(&self, features: &[f64]) -> Result<usize, NumericalError> {
        let scores = self.score(features)?;

        let mut best_idx = 0;
        let mut best_score = f64::NEG_INFINITY;
        for (idx, &score) in scores.iter().enumerate() {
            if score > best_score {
                best_score = score;
                best_idx = idx;
            }
        }

        Ok(best_idx)
    }

    pub fn arm(&self, arm: usize) -> Option<&ArmStatistic> {
        self.arms.get(arm)
    }

    pub fn n_arms(&self) -> usize {
        self.arms.len()
    }

    pub fn feature_dim(&self) -> usize {
        self.d
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn diagnose(&self) -> Vec<DiagnosticResult> {
        self.arms.iter().map(ArmStatistic::diagnose).collect()
    }
}

/// Offline replay: update once per sample in input order with the sample's
/// own arm and outcome, then score every sample against the final statistics.
///
/// Returns the per-arm mean score and each sample's top-`top_n` arms. The
/// result depends on sample order.
pub fn run_replay(
    samples: &[Sample],
    feature_dim: usize,
    n_arms: usize,
    alpha: f64,
    top_n: usize,
) -> Result<(LinUCBBandit, EstimatorOutput), NumericalError> {
    let mut bandit = LinUCBBandit::new(feature_dim, n_arms, alpha);

    for sample in samples {
        bandit.update(&sample.features, sample.outcome, sample.arm)?;
    }

    for (arm, diag) in bandit.diagnose().iter().enumerate() {
        if !diag.is_healthy {
            tracing::warn!(arm, detail = %diag.message, "bandit arm statistic is ill-conditioned");
        }
    }

    let mut sums = vec![0.0; n_arms];
    let mut rankings = Vec::with_capacity(samples.len());
    for sample in samples {
        let scores = bandit.score(&sample.features)?;
        for (sum, score) in sums.iter_mut().zip(scores.iter()) {
            *sum += score;
        }
        rankings.push(top_n_arms(scores.into_iter().enumerate().collect(), top_n));
    }

    let rewards = if samples.is_empty() {
        vec![None; n_arms]
    } else {
        sums.into_iter().map(|s| Some(s / samples.len() as f64)).collect()
    };

    let output = EstimatorOutput {
        kind: EstimatorKind::LinUcb,
        rewards,
        rankings: Some(rankings),
        failures: Vec::new(),
    };

    Ok((bandit, output))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario() -> Vec<Sample> {
        vec![
            Sample::new(vec![1.0], 0, 2.0),
            Sample::new(vec![2.0], 0, 4.0),
            Sample::new(vec![1.0], 1, 10.0),
            Sample::new(vec![2.0], 1, 8.0),
        ]
    }

    #[test]
    fn test_update_touches_only_target_arm() {
        let mut bandit = LinUCBBandit::new(2, 3, 0.1);
        bandit.update(&[1.0, 2.0], 5.0, 1).unwrap();

        let untouched = ArmStatistic::new(2);
        for arm in [0, 2] {
            assert_eq!(bandit.arm(arm).unwrap().design_matrix(), untouched.design_matrix());
            assert_eq!(bandit.arm(arm).unwrap().response_vector(), untouched.response_vector());
        }

        let updated = bandit.arm(1).unwrap();
        assert_eq!(updated.design_matrix(), &[2.0, 2.0, 2.0, 5.0]);
        assert_eq!(updated.response_vector(), &[5.0, 10.0]);
        assert_eq!(updated.update_count(), 1);
    }

    #[test]
    fn test_single_feature_scores() {
        // arm 0: A = 1 + 1 + 4 = 6, b = 2 + 8 = 10
        let mut bandit = LinUCBBandit::new(1, 2, 0.5);
        for s in scenario() {
            bandit.update(&s.features, s.outcome, s.arm).unwrap();
        }

        let scores = bandit.score(&[1.0]).unwrap();
        let expected0 = 10.0 / 6.0 + 0.5 * (1.0f64 / 6.0).sqrt();
        // arm 1: A = 6, b = 10 + 16 = 26
        let expected1 = 26.0 / 6.0 + 0.5 * (1.0f64 / 6.0).sqrt();
        assert!((scores[0] - expected0).abs() < 1e-12);
        assert!((scores[1] - expected1).abs() < 1e-12);
        assert_eq!(bandit.choose_action(&[1.0]).unwrap(), 1);
    }

    #[test]
    fn test_untrained_scores_are_pure_exploration() {
        let bandit = LinUCBBandit::new(2, 2, 2.0);
        let scores = bandit.score(&[3.0, 4.0]).unwrap();
        // θ = 0, x^T I x = 25
        assert!((scores[0] - 10.0).abs() < 1e-12);
        assert!((scores[1] - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_choose_action_tie_breaks_to_lowest_index() {
        let bandit = LinUCBBandit::new(2, 4, 0.1);
        assert_eq!(bandit.choose_action(&[1.0, 1.0]).unwrap(), 0);
    }

    #[test]
    fn test_incremental_matches_inversion() {
        let mut bandit = LinUCBBandit::new(3, 2, 0.3);
        for i in 0..250 {
            let t = i as f64;
            let x = [1.0, (t * 0.37).sin() * 3.0, (t * 0.11).cos() * 50.0];
            bandit.update(&x, t.sqrt(), i % 2).unwrap();
        }

        for x in [[1.0, 0.5, -20.0], [1.0, -2.0, 40.0], [0.0, 0.0, 1.0]] {
            let fast = bandit.score(&x).unwrap();
            let naive = bandit.score_by_inversion(&x).unwrap();
            for (f, n) in fast.iter().zip(naive.iter()) {
                assert!((f - n).abs() <= 1e-8 * n.abs().max(1.0), "{f} vs {n}");
            }
        }
    }

    #[test]
    fn test_dimension_and_arm_checks() {
        let mut bandit = LinUCBBandit::new(2, 2, 0.1);
        assert_eq!(
            bandit.update(&[1.0], 1.0, 0).unwrap_err(),
            NumericalError::DimensionMismatch {
                expected: 2,
                found: 1
            }
        );
        assert_eq!(
            bandit.update(&[1.0, 1.0], 1.0, 5).unwrap_err(),
            NumericalError::ArmOutOfRange { arm: 5, arms: 2 }
        );
        assert!(bandit.score(&[1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn test_non_finite_update_is_surfaced() {
        let mut bandit = LinUCBBandit::new(1, 1, 0.1);
        let err = bandit.update(&[f64::INFINITY], 1.0, 0).unwrap_err();
        assert!(matches!(err, NumericalError::SingularDesign { arm: 0, .. }));
    }

    #[test]
    fn test_failed_update_leaves_arm_unchanged() {
        let mut bandit = LinUCBBandit::new(2, 1, 0.1);
        bandit.update(&[1.0, 2.0], 3.0, 0).unwrap();
        let before = bandit.arm(0).unwrap().clone();

        let err = bandit.update(&[f64::NAN, 1.0], 1.0, 0).unwrap_err();
        assert!(matches!(err, NumericalError::SingularDesign { arm: 0, .. }));

        let after = bandit.arm(0).unwrap();
        assert_eq!(after.design_matrix(), before.design_matrix());
        assert_eq!(after.response_vector(), before.response_vector());
        assert_eq!(after.update_count(), 1);

        // the arm keeps working after the rejected observation
        bandit.update(&[0.5, -1.0], 2.0, 0).unwrap();
        assert_eq!(bandit.arm(0).unwrap().update_count(), 2);
        let fast = bandit.score(&[1.0, 1.0]).unwrap();
        let naive = bandit.score_by_inversion(&[1.0, 1.0]).unwrap();
        assert!(fast[0].is_finite());
        assert!((fast[0] - naive[0]).abs() < 1e-10);
    }

    #[test]
    fn test_replay_order_changes_statistics_only_by_rounding() {
        let ascending = vec![
            Sample::new(vec![1.0], 0, 0.1),
            Sample::new(vec![1.0], 0, 0.2),
            Sample::new(vec![1.0], 0, 0.3),
        ];
        let descending: Vec<Sample> = ascending.iter().rev().cloned().collect();

        let (forward, _) = run_replay(&ascending, 1, 1, 0.1, 1).unwrap();
        let (backward, _) = run_replay(&descending, 1, 1, 0.1, 1).unwrap();
        let b_fwd = forward.arm(0).unwrap().response_vector()[0];
        let b_bwd = backward.arm(0).unwrap().response_vector()[0];

        // (0.1 + 0.2) + 0.3 and (0.3 + 0.2) + 0.1 round differently
        assert_eq!(b_fwd, 0.6000000000000001);
        assert_eq!(b_bwd, 0.6);
        assert_ne!(b_fwd.to_bits(), b_bwd.to_bits());
        assert!((b_fwd - b_bwd).abs() < 1e-12);
        assert_eq!(
            forward.arm(0).unwrap().design_matrix(),
            backward.arm(0).unwrap().design_matrix()
        );

        let (again, _) = run_replay(&ascending, 1, 1, 0.1, 1).unwrap();
        assert_eq!(again.arm(0).unwrap().response_vector()[0].to_bits(), b_fwd.to_bits());
    }

    #[test]
    fn test_replay_is_deterministic_for_fixed_order() {
        let samples = scenario();
        let (_, first) = run_replay(&samples, 1, 2, 0.1, 10).unwrap();
        let (_, second) = run_replay(&samples, 1, 2, 0.1, 10).unwrap();

        let bits = |o: &EstimatorOutput| -> Vec<u64> {
            o.rewards.iter().map(|r| r.unwrap().to_bits()).collect()
        };
        assert_eq!(bits(&first), bits(&second));
        assert_eq!(first.rankings, second.rankings);
    }

    #[test]
    fn test_replay_rankings_and_means() {
        let samples = scenario();
        let (bandit, output) = run_replay(&samples, 1, 2, 0.1, 10).unwrap();

        assert_eq!(bandit.arm(0).unwrap().update_count(), 2);
        assert_eq!(bandit.arm(1).unwrap().update_count(), 2);

        let rankings = output.rankings.as_ref().unwrap();
        assert_eq!(rankings.len(), 4);
        // N exceeds the arm count: every ranking holds both arms, arm 1 first
        for ranking in rankings {
            assert_eq!(ranking, &vec![1, 0]);
        }

        let mean0: f64 = samples
            .iter()
            .map(|s| bandit.score(&s.features).unwrap()[0])
            .sum::<f64>()
            / 4.0;
        assert!((output.rewards[0].unwrap() - mean0).abs() < 1e-12);
        assert_eq!(output.match_rate(&samples), Some(1.0));
    }

    #[test]
    fn test_replay_with_top_one() {
        let samples = scenario();
        let (_, output) = run_replay(&samples, 1, 2, 0.1, 1).unwrap();
        // arm 1 always wins, so only the arm-1 samples match
        assert_eq!(output.match_rate(&samples), Some(0.5));
    }
}
