//! Least-squares regression with an unpenalized intercept.
//!
//! Columns are centered (raw units, no scaling) and the normal equations
//! `XcᵀXc w = Xcᵀyc` are solved for the minimum-norm least-squares `w`, the
//! same fit an SVD-based `lstsq` returns. Under-determined groups (fewer
//! samples than features) are common in the T-learner, so the solve goes
//! through a damped factor `XcᵀXc + λI` whose bias is then refined away.
//! `ridge = 0` disables damping and fails on rank-deficient data.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::matrix::{cholesky_decompose, dot_product, mat_vec_mul, solve_cholesky, vec_add_scaled, MatrixError};
use crate::types::EPSILON;

/// Cap on refinement sweeps of the damped solve
const MAX_REFINEMENT_STEPS: usize = 200;
/// Relative step size at which refinement stops
const REFINEMENT_TOLERANCE: f64 = 1e-13;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FittingError {
    #[error("arm {arm} has no observed samples")]
    EmptyArm { arm: usize },
    #[error("no training samples")]
    EmptyInput,
    #[error("row {row} has {found} features, expected {expected}")]
    DimensionMismatch {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("{targets} targets for {rows} rows")]
    TargetMismatch { rows: usize, targets: usize },
    #[error("normal equations are singular: {0}")]
    Singular(#[from] MatrixError),
    #[error("arm {arm} has a non-finite inverse-propensity weight sum")]
    NonFiniteWeight { arm: usize },
    #[error("row {row} is assigned arm {arm}, but only {arms} arms exist")]
    ArmOutOfRange { row: usize, arm: usize, arms: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRegression {
    coefficients: Vec<f64>,
    intercept: f64,
}

impl LinearRegression {
    pub fn fit<R: AsRef<[f64]>>(rows: &[R], targets: &[f64], ridge: f64) -> Result<Self, FittingError> {
        let n = rows.len();
        if n == 0 {
            return Err(FittingError::EmptyInput);
        }
        if targets.len() != n {
            return Err(FittingError::TargetMismatch {
                rows: n,
                targets: targets.len(),
            });
        }

        let p = rows[0].as_ref().len();
        for (row, x) in rows.iter().enumerate() {
            if x.as_ref().len() != p {
                return Err(FittingError::DimensionMismatch {
                    row,
                    expected: p,
                    found: x.as_ref().len(),
                });
            }
        }

        let nf = n as f64;
        let y_mean = targets.iter().sum::<f64>() / nf;

        let mut x_mean = vec![0.0; p];
        for x in rows {
            for (m, &v) in x_mean.iter_mut().zip(x.as_ref()) {
                *m += v;
            }
        }
        x_mean.iter_mut().for_each(|m| *m /= nf);

        // XcᵀXc and Xcᵀ(y - ȳ)
        let mut gram = vec![0.0; p * p];
        let mut rhs = vec![0.0; p];
        let mut xc = vec![0.0; p];
        for (x, &y) in rows.iter().zip(targets) {
            for ((c, &v), &m) in xc.iter_mut().zip(x.as_ref()).zip(&x_mean) {
                *c = v - m;
            }
            let yc = y - y_mean;
            for i in 0..p {
                rhs[i] += xc[i] * yc;
                for j in 0..p {
                    gram[i * p + j] += xc[i] * xc[j];
                }
            }
        }

        let coefficients = solve_min_norm(&gram, &rhs, p, ridge)?;

        let intercept = y_mean - dot_product(&coefficients, &x_mean);

        Ok(Self {
            coefficients,
            intercept,
        })
    }

    pub fn predict(&self, x: &[f64]) -> f64 {
        self.intercept + dot_product(&self.coefficients, x)
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }
}

/// Minimum-norm solution of `G w = r` for a centered Gram matrix `G`.
///
/// With `ridge > 0`, `G + λI` (`λ = ridge · mean(diag G)`) is factored once
/// and the Tikhonov bias is removed by iterated refinement
/// `w ← w + (G + λI)⁻¹ (r − G w)`. Started from zero the iterates stay in the
/// row space of `G`, so they converge to the least-squares solution of
/// smallest Euclidean norm.
fn solve_min_norm(gram: &[f64], rhs: &[f64], p: usize, ridge: f64) -> Result<Vec<f64>, MatrixError> {
    if p == 0 {
        return Ok(Vec::new());
    }
    if ridge <= 0.0 {
        let l = cholesky_decompose(gram, p)?;
        return Ok(solve_cholesky(&l, rhs, p));
    }

    let scale = (0..p).map(|i| gram[i * p + i]).sum::<f64>() / p as f64;
    // every column constant: nothing to explain
    if scale <= EPSILON {
        return Ok(vec![0.0; p]);
    }

    let mut damped = gram.to_vec();
    for i in 0..p {
        damped[i * p + i] += ridge * scale;
    }
    let l = cholesky_decompose(&damped, p)?;

    let mut w = vec![0.0; p];
    for _ in 0..MAX_REFINEMENT_STEPS {
        let gw = mat_vec_mul(gram, &w, p);
        let residual: Vec<f64> = rhs.iter().zip(&gw).map(|(r, g)| r - g).collect();
        let step = solve_cholesky(&l, &residual, p);
        vec_add_scaled(&mut w, &step, 1.0);

        let step_norm = dot_product(&step, &step).sqrt();
        if step_norm <= REFINEMENT_TOLERANCE * (1.0 + dot_product(&w, &w).sqrt()) {
            break;
        }
    }

    Ok(w)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_line() {
        let rows = vec![vec![1.0], vec![2.0]];
        let model = LinearRegression::fit(&rows, &[2.0, 4.0], 0.0).unwrap();

        assert!((model.coefficients()[0] - 2.0).abs() < 1e-12);
        assert!(model.intercept().abs() < 1e-12);
        assert!((model.predict(&[1.0]) - 2.0).abs() < 1e-12);
        assert!((model.predict(&[2.0]) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_recovers_plane() {
        // y = 3 + 2 x0 - 0.5 x1
        let rows: Vec<Vec<f64>> = (0..20)
            .map(|i| vec![i as f64, ((i * 7) % 5) as f64 * 10.0])
            .collect();
        let targets: Vec<f64> = rows.iter().map(|x| 3.0 + 2.0 * x[0] - 0.5 * x[1]).collect();

        let model = LinearRegression::fit(&rows, &targets, 0.0).unwrap();
        assert!((model.coefficients()[0] - 2.0).abs() < 1e-9);
        assert!((model.coefficients()[1] + 0.5).abs() < 1e-9);
        assert!((model.intercept() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_damped_solve_refines_to_exact_fit() {
        let rows = vec![vec![1.0], vec![2.0]];
        let model = LinearRegression::fit(&rows, &[2.0, 4.0], 1e-6).unwrap();
        assert!((model.coefficients()[0] - 2.0).abs() < 1e-9);
        assert!((model.predict(&[1.0]) - 2.0).abs() < 1e-9);
        assert!((model.predict(&[2.0]) - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_underdetermined_fit_is_minimum_norm_in_raw_units() {
        // two samples, two features: centered rows ±[5, 0.5]
        let rows = vec![vec![170.0, 1.0], vec![180.0, 2.0]];
        let model = LinearRegression::fit(&rows, &[100.0, 200.0], 1e-6).unwrap();

        // w = d · 50 / |d|², d = [5, 0.5]
        let w = model.coefficients();
        assert!((w[0] - 500.0 / 50.5).abs() < 1e-6, "{w:?}");
        assert!((w[1] - 50.0 / 50.5).abs() < 1e-6, "{w:?}");
        assert!((model.predict(&[170.0, 1.0]) - 100.0).abs() < 1e-6);
        assert!((model.predict(&[180.0, 2.0]) - 200.0).abs() < 1e-6);
        assert!((model.predict(&[170.0, 2.0]) - (150.0 - 2500.0 / 50.5 + 25.0 / 50.5)).abs() < 1e-6);
    }

    #[test]
    fn test_minimum_norm_ignores_ridge_size() {
        let rows = vec![vec![1.0, 3.0, -2.0], vec![4.0, 0.5, 1.0], vec![2.0, 2.0, 2.0]];
        let targets = [10.0, 4.0, 7.0];
        let a = LinearRegression::fit(&rows, &targets, 1e-6).unwrap();
        let b = LinearRegression::fit(&rows, &targets, 1e-3).unwrap();
        for (wa, wb) in a.coefficients().iter().zip(b.coefficients()) {
            assert!((wa - wb).abs() < 1e-8, "{wa} vs {wb}");
        }
        for (x, &y) in rows.iter().zip(targets.iter()) {
            assert!((a.predict(x) - y).abs() < 1e-8);
        }
    }

    #[test]
    fn test_single_sample_predicts_its_outcome() {
        let rows = vec![vec![170.0, 70.0, 3.2]];
        let model = LinearRegression::fit(&rows, &[120.0], 1e-6).unwrap();
        assert!(model.coefficients().iter().all(|&w| w == 0.0));
        assert!((model.predict(&[150.0, 90.0, 1.0]) - 120.0).abs() < 1e-12);
    }

    #[test]
    fn test_constant_column_without_ridge_is_singular() {
        let rows = vec![vec![1.0, 5.0], vec![2.0, 5.0], vec![3.0, 5.0]];
        let err = LinearRegression::fit(&rows, &[1.0, 2.0, 3.0], 0.0).unwrap_err();
        assert!(matches!(err, FittingError::Singular(_)));

        let model = LinearRegression::fit(&rows, &[1.0, 2.0, 3.0], 1e-6).unwrap();
        assert_eq!(model.coefficients()[1], 0.0);
    }

    #[test]
    fn test_input_validation() {
        let empty: Vec<Vec<f64>> = vec![];
        assert_eq!(
            LinearRegression::fit(&empty, &[], 0.0).unwrap_err(),
            FittingError::EmptyInput
        );

        let ragged = vec![vec![1.0], vec![1.0, 2.0]];
        assert_eq!(
            LinearRegression::fit(&ragged, &[1.0, 2.0], 0.0).unwrap_err(),
            FittingError::DimensionMismatch {
                row: 1,
                expected: 1,
                found: 2
            }
        );

        let rows = vec![vec![1.0]];
        assert_eq!(
            LinearRegression::fit(&rows, &[1.0, 2.0], 0.0).unwrap_err(),
            FittingError::TargetMismatch {
                rows: 1,
                targets: 2
            }
        );
    }
}
