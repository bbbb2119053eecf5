use std::io::Write;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use super::ComparisonReport;
use crate::causal::IpwArmSummary;
use crate::config::EstimationSettings;
use crate::sanitize::ExclusionReport;
use crate::types::{ArmFailure, ArmReward, EstimatorKind};

/// Cell text for an arm an estimator could not score
pub const UNAVAILABLE: &str = "unavailable";

pub const CSV_HEADER: [&str; 7] = ["Set", "Count", "Frequency", "Bandits", "S_Learner", "T_Learner", "IPW"];

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write report: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to write csv report: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to serialize summary: {0}")]
    Json(#[from] serde_json::Error),
}

/// One line of the comparison table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub set: String,
    pub count: usize,
    /// Share of retained samples that received this set
    pub frequency: f64,
    pub bandits: ArmReward,
    pub s_learner: ArmReward,
    pub t_learner: ArmReward,
    pub ipw: ArmReward,
}

impl ReportRow {
    pub fn reward(&self, kind: EstimatorKind) -> ArmReward {
        match kind {
            EstimatorKind::LinUcb => self.bandits,
            EstimatorKind::SLearner => self.s_learner,
            EstimatorKind::TLearner => self.t_learner,
            EstimatorKind::Ipw => self.ipw,
        }
    }

    fn record(&self) -> Vec<String> {
        vec![
            self.set.clone(),
            self.count.to_string(),
            self.frequency.to_string(),
            format_cell(self.bandits),
            format_cell(self.s_learner),
            format_cell(self.t_learner),
            format_cell(self.ipw),
        ]
    }
}

fn format_cell(reward: ArmReward) -> String {
    match reward {
        Some(value) => value.to_string(),
        None => UNAVAILABLE.to_string(),
    }
}

pub fn write_csv<W: Write>(rows: &[ReportRow], writer: W) -> Result<(), ReportError> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(CSV_HEADER)?;
    for row in rows {
        csv.write_record(row.record())?;
    }
    csv.flush()?;
    Ok(())
}

pub fn write_csv_file(rows: &[ReportRow], path: impl AsRef<Path>) -> Result<(), ReportError> {
    let file = std::fs::File::create(path.as_ref())?;
    write_csv(rows, file)?;
    tracing::info!(path = %path.as_ref().display(), rows = rows.len(), "report written");
    Ok(())
}

#[derive(Debug, Serialize)]
struct MatchRate {
    estimator: EstimatorKind,
    rate: Option<f64>,
}

#[derive(Debug, Serialize)]
struct EstimatorFailure<'a> {
    estimator: EstimatorKind,
    #[serde(flatten)]
    failure: &'a ArmFailure,
}

#[derive(Debug, Serialize)]
struct Summary<'a> {
    total_rows: usize,
    retained_rows: usize,
    exclusions: &'a ExclusionReport,
    treatment_sets: usize,
    settings: &'a EstimationSettings,
    match_rates: Vec<MatchRate>,
    failures: Vec<EstimatorFailure<'a>>,
    ipw_arms: &'a [IpwArmSummary],
    rows: &'a [ReportRow],
}

pub fn write_summary<W: Write>(report: &ComparisonReport, writer: W) -> Result<(), ReportError> {
    let summary = Summary {
        total_rows: report.exclusions.total_rows,
        retained_rows: report.samples.len(),
        exclusions: &report.exclusions,
        treatment_sets: report.sets.len(),
        settings: &report.settings,
        match_rates: report
            .match_rates()
            .into_iter()
            .map(|(estimator, rate)| MatchRate { estimator, rate })
            .collect(),
        failures: report
            .outputs
            .iter()
            .flat_map(|output| {
                output.failures.iter().map(move |failure| EstimatorFailure {
                    estimator: output.kind,
                    failure,
                })
            })
            .collect(),
        ipw_arms: &report.ipw_arms,
        rows: &report.rows,
    };
    serde_json::to_writer_pretty(writer, &summary)?;
    Ok(())
}

pub fn write_summary_file(report: &ComparisonReport, path: impl AsRef<Path>) -> Result<(), ReportError> {
    let file = std::fs::File::create(path.as_ref())?;
    write_summary(report, std::io::BufWriter::new(file))?;
    tracing::info!(path = %path.as_ref().display(), "summary written");
    Ok(())
}
