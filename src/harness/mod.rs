//! End-to-end comparison run: exclusion, resolution, the four estimators
//! and the report table.

pub mod bundle;
pub mod report;

use std::path::Path;

use thiserror::Error;

pub use bundle::{BundleError, InputBundle};
pub use report::{ReportError, ReportRow};

use crate::causal::{run_ipw, IpwArmSummary};
use crate::config::{Config, EstimationSettings};
use crate::learners::s_learner::run_s_learner;
use crate::learners::t_learner::run_t_learner;
use crate::linucb::run_replay;
use crate::resolver::{IntegrityError, TreatmentSetResolver};
use crate::sanitize::{exclude_non_finite, ExclusionReport};
use crate::types::*;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Bundle(#[from] BundleError),
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
    #[error(transparent)]
    Report(#[from] ReportError),
}

pub struct ComparisonHarness {
    settings: EstimationSettings,
    agents: Vec<String>,
}

impl ComparisonHarness {
    pub fn new(settings: EstimationSettings, agents: Vec<String>) -> Self {
        Self { settings, agents }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.estimation.clone(), config.agents.clone())
    }

    pub fn settings(&self) -> &EstimationSettings {
        &self.settings
    }

    /// Drop incomplete rows, resolve treatment sets over the rest, then run
    /// every estimator. Only malformed treatment data aborts; estimator
    /// failures become unavailable cells.
    pub fn run(&self, bundle: &InputBundle) -> Result<ComparisonReport, HarnessError> {
        bundle.validate()?;
        let agents = bundle.agents.clone().unwrap_or_else(|| self.agents.clone());

        let (kept, exclusions) = exclude_non_finite(&bundle.features, &bundle.outcomes);
        if exclusions.excluded_count() > 0 {
            tracing::warn!(
                excluded = exclusions.excluded_count(),
                retained = kept.len(),
                "rows with missing values excluded"
            );
        }

        let treatments: Vec<Vec<u8>> = kept.iter().map(|&i| bundle.treatments[i].clone()).collect();
        let resolution = TreatmentSetResolver::new(agents)
            .resolve(&treatments)
            .map_err(|err| {
                let input_row = kept.get(err.row()).copied().unwrap_or(err.row());
                err.at_row(input_row)
            })?;

        tracing::info!(
            treatment_sets = resolution.catalogue.len(),
            samples = kept.len(),
            "treatment sets resolved"
        );

        let samples: Vec<Sample> = kept
            .iter()
            .zip(resolution.arms.iter())
            .map(|(&i, &arm)| Sample::new(bundle.features[i].clone(), arm, bundle.outcomes[i]))
            .collect();

        let mut report = self.compare(samples, resolution.catalogue.sets().to_vec());
        report.exclusions = exclusions;
        Ok(report)
    }

    /// Run the four estimators over already-resolved samples. Arms are the
    /// positions of `sets`.
    pub fn compare(&self, samples: Vec<Sample>, sets: Vec<TreatmentSet>) -> ComparisonReport {
        let n_arms = sets.len();
        let feature_dim = samples.first().map_or(0, |s| s.features.len());
        let settings = &self.settings;

        let linucb = match run_replay(&samples, feature_dim, n_arms, settings.alpha, settings.top_n) {
            Ok((_, output)) => output,
            Err(err) => {
                tracing::warn!(error = %err, "linucb replay failed");
                EstimatorOutput::unavailable(EstimatorKind::LinUcb, n_arms, err.to_string())
            }
        };
        let s_learner = run_s_learner(&samples, n_arms, settings.ridge, settings.top_n);
        let t_learner = run_t_learner(&samples, n_arms, settings.ridge, settings.top_n);
        let (ipw, ipw_arms) = run_ipw(&samples, n_arms, &settings.propensity);

        let outputs = vec![linucb, s_learner, t_learner, ipw];
        for output in &outputs {
            tracing::info!(
                estimator = %output.kind,
                failures = output.failures.len(),
                match_rate = ?output.match_rate(&samples),
                "estimator finished"
            );
        }

        let mut counts = vec![0usize; n_arms];
        for s in &samples {
            if let Some(count) = counts.get_mut(s.arm) {
                *count += 1;
            }
        }
        let total = samples.len();

        let rows = sets
            .iter()
            .enumerate()
            .map(|(arm, set)| {
                let reward = |kind: EstimatorKind| {
                    outputs
                        .iter()
                        .find(|o| o.kind == kind)
                        .and_then(|o| o.rewards.get(arm).copied().flatten())
                };
                ReportRow {
                    set: set.display_name(),
                    count: counts[arm],
                    frequency: if total > 0 {
                        counts[arm] as f64 / total as f64
                    } else {
                        0.0
                    },
                    bandits: reward(EstimatorKind::LinUcb),
                    s_learner: reward(EstimatorKind::SLearner),
                    t_learner: reward(EstimatorKind::TLearner),
                    ipw: reward(EstimatorKind::Ipw),
                }
            })
            .collect();

        ComparisonReport {
            exclusions: ExclusionReport {
                total_rows: total,
                excluded: Vec::new(),
            },
            sets,
            samples,
            settings: settings.clone(),
            outputs,
            ipw_arms,
            rows,
        }
    }
}

/// Everything a comparison run produced.
#[derive(Debug, Clone)]
pub struct ComparisonReport {
    pub sets: Vec<TreatmentSet>,
    /// Retained samples, arm-resolved, in input order
    pub samples: Vec<Sample>,
    pub exclusions: ExclusionReport,
    pub settings: EstimationSettings,
    /// One per estimator, in `EstimatorKind::ALL` order
    pub outputs: Vec<EstimatorOutput>,
    pub ipw_arms: Vec<IpwArmSummary>,
    pub rows: Vec<ReportRow>,
}

impl ComparisonReport {
    pub fn output(&self, kind: EstimatorKind) -> Option<&EstimatorOutput> {
        self.outputs.iter().find(|o| o.kind == kind)
    }

    /// Recommendation match rate per estimator; `None` where the estimator
    /// has no per-sample ranking.
    pub fn match_rates(&self) -> Vec<(EstimatorKind, Option<f64>)> {
        EstimatorKind::ALL
            .iter()
            .map(|&kind| (kind, self.output(kind).and_then(|o| o.match_rate(&self.samples))))
            .collect()
    }

    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<(), ReportError> {
        report::write_csv_file(&self.rows, path)
    }

    pub fn write_summary(&self, path: impl AsRef<Path>) -> Result<(), ReportError> {
        report::write_summary_file(self, path)
    }
}
