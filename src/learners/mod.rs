//! Regression meta-learners for per-arm counterfactual outcomes.
//!
//! - [`SLearnerEstimator`] - one model over `[features ‖ arm id]`
//! - [`TLearnerEstimator`] - one model per arm, fit on that arm's samples only

pub mod s_learner;
pub mod t_learner;

pub use s_learner::SLearnerEstimator;
pub use t_learner::TLearnerEstimator;

use crate::types::ActionRanking;

/// Best `n` arms by score, descending; equal scores rank the lower arm first.
pub fn top_n_arms(mut candidates: Vec<(usize, f64)>, n: usize) -> ActionRanking {
    candidates.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    candidates.truncate(n);
    candidates.into_iter().map(|(arm, _)| arm).collect()
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}
