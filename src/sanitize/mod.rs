use serde::Serialize;

use crate::types::{DiagnosticResult, EPSILON, MAX_FACTOR_CONDITION, MIN_RANK1_DIAG, RECOMPUTE_INTERVAL};

// ========== Row exclusion ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExclusionReason {
    /// First non-finite feature column of the row
    NonFiniteFeature { column: usize },
    NonFiniteOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExcludedRow {
    pub row: usize,
    pub reason: ExclusionReason,
}

/// Rows dropped before estimation, by input row index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExclusionReport {
    pub total_rows: usize,
    pub excluded: Vec<ExcludedRow>,
}

impl ExclusionReport {
    pub fn excluded_count(&self) -> usize {
        self.excluded.len()
    }

    pub fn kept_count(&self) -> usize {
        self.total_rows - self.excluded.len()
    }
}

/// Split input rows into the indices kept for estimation and a report of the
/// rows dropped because a feature or the outcome is not finite.
///
/// Rows are removed whole; nothing is imputed. `features` and `outcomes` are
/// expected to be aligned.
pub fn exclude_non_finite(features: &[Vec<f64>], outcomes: &[f64]) -> (Vec<usize>, ExclusionReport) {
    let total_rows = features.len().min(outcomes.len());
    let mut kept = Vec::with_capacity(total_rows);
    let mut excluded = Vec::new();

    for (row, (x, &y)) in features.iter().zip(outcomes.iter()).enumerate() {
        if let Some(column) = x.iter().position(|v| !v.is_finite()) {
            excluded.push(ExcludedRow {
                row,
                reason: ExclusionReason::NonFiniteFeature { column },
            });
        } else if !y.is_finite() {
            excluded.push(ExcludedRow {
                row,
                reason: ExclusionReason::NonFiniteOutcome,
            });
        } else {
            kept.push(row);
        }
    }

    (
        kept,
        ExclusionReport {
            total_rows,
            excluded,
        },
    )
}

// ========== Arm statistic health ==========

/// Whether an arm's Cholesky factor should be rebuilt from `A` before the
/// next rank-1 update.
pub fn needs_full_recompute(update_count: u32, l: &[f64], d: usize) -> bool {
    if update_count % RECOMPUTE_INTERVAL == 0 {
        return true;
    }

    for i in 0..d {
        let diag = l[i * d + i];
        if diag.is_nan() || diag.is_infinite() || diag < MIN_RANK1_DIAG {
            return true;
        }
    }

    let mut min_diag = f64::MAX;
    let mut max_diag = f64::MIN;
    for i in 0..d {
        let diag = l[i * d + i];
        if diag > 0.0 {
            min_diag = min_diag.min(diag);
            max_diag = max_diag.max(diag);
        }
    }

    min_diag > 0.0 && max_diag / min_diag > MAX_FACTOR_CONDITION
}

/// Diagnose an arm's design matrix `A` and its Cholesky factor `L`.
pub fn diagnose_model(a: &[f64], l: &[f64], d: usize) -> DiagnosticResult {
    let mut has_nan = false;
    let mut has_inf = false;
    let mut min_diagonal = f64::MAX;
    let mut max_diagonal = f64::MIN;

    for val in a.iter() {
        if val.is_nan() {
            has_nan = true;
        }
        if val.is_infinite() {
            has_inf = true;
        }
    }

    for i in 0..d {
        let diag = l[i * d + i];
        if diag.is_nan() {
            has_nan = true;
        }
        if diag.is_infinite() {
            has_inf = true;
        }
        if diag > 0.0 && diag.is_finite() {
            min_diagonal = min_diagonal.min(diag);
            max_diagonal = max_diagonal.max(diag);
        }
    }

    // diag(L) ratio squared approximates cond(A)
    let condition_number = if min_diagonal > EPSILON && min_diagonal != f64::MAX {
        (max_diagonal / min_diagonal).powi(2)
    } else {
        f64::MAX
    };

    let is_healthy = !has_nan && !has_inf && condition_number < 1e12;

    let message = if is_healthy {
        "Model is healthy".to_string()
    } else if has_nan {
        "Model contains NaN values".to_string()
    } else if has_inf {
        "Model contains infinite values".to_string()
    } else {
        format!("Model has high condition number: {:.2e}", condition_number)
    };

    DiagnosticResult {
        is_healthy,
        has_nan,
        has_inf,
        condition_number,
        min_diagonal: if min_diagonal == f64::MAX {
            0.0
        } else {
            min_diagonal
        },
        max_diagonal: if max_diagonal == f64::MIN {
            0.0
        } else {
            max_diagonal
        },
        message,
    }
}
