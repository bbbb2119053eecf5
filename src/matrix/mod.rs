//! Dense row-major linear algebra on `Vec<f64>` buffers.
//!
//! Matrices are `d × d` slices indexed `a[i * d + j]`. Only the operations the
//! estimators need are provided: Cholesky factorization and its rank-1
//! update, triangular solves, and a few BLAS-1/2 style helpers.

use thiserror::Error;

use crate::types::{EPSILON, MIN_RANK1_DIAG};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatrixError {
    #[error("matrix is not positive definite (pivot {pivot} = {value:e})")]
    NotPositiveDefinite { pivot: usize, value: f64 },
    #[error("matrix contains non-finite entries")]
    NonFinite,
}

/// `scale · I` of size `d × d`
pub fn identity(d: usize, scale: f64) -> Vec<f64> {
    let mut a = vec![0.0; d * d];
    for i in 0..d {
        a[i * d + i] = scale;
    }
    a
}

/// Cholesky decomposition - factor a symmetric positive definite `A` as `L * L^T`.
///
/// Fails instead of patching the diagonal when a pivot is not strictly
/// positive, so a singular design surfaces to the caller.
pub fn cholesky_decompose(a: &[f64], d: usize) -> Result<Vec<f64>, MatrixError> {
    if a.iter().any(|v| !v.is_finite()) {
        return Err(MatrixError::NonFinite);
    }

    let mut l = vec![0.0; d * d];

    for i in 0..d {
        for j in 0..=i {
            let mut sum = a[i * d + j];

            for k in 0..j {
                sum -= l[i * d + k] * l[j * d + k];
            }

            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return Err(MatrixError::NotPositiveDefinite {
                        pivot: i,
                        value: sum,
                    });
                }
                l[i * d + i] = sum.sqrt();
            } else {
                l[i * d + j] = sum / l[j * d + j];
            }
        }
    }

    Ok(l)
}

/// Cholesky rank-1 update using Givens rotations:
/// `L_new * L_new^T = L * L^T + x * x^T`.
///
/// Returns `false` when the factor degrades and must be recomputed from `A`.
pub fn cholesky_rank1_update(l: &mut [f64], x: &[f64], d: usize, min_diag: f64) -> bool {
    let safe_min_diag = min_diag.max(MIN_RANK1_DIAG);
    let mut x_work = x.to_vec();

    for k in 0..d {
        let l_kk = l[k * d + k];
        let x_k = x_work[k];

        let r = (l_kk * l_kk + x_k * x_k).sqrt();

        if r < safe_min_diag {
            return false;
        }

        let c = l_kk / r;
        let s = x_k / r;

        l[k * d + k] = r;

        for i in (k + 1)..d {
            let l_ik = l[i * d + k];
            let x_i = x_work[i];

            l[i * d + k] = c * l_ik + s * x_i;
            x_work[i] = -s * l_ik + c * x_i;
        }
    }

    for i in 0..d {
        if l[i * d + i] < safe_min_diag || l[i * d + i].is_nan() {
            return false;
        }
    }

    true
}

/// Solve `A * x = b` given the Cholesky factor of `A`.
pub fn solve_cholesky(l: &[f64], b: &[f64], d: usize) -> Vec<f64> {
    // L * y = b
    let y = solve_triangular_lower(l, b, d);

    // L^T * x = y
    solve_triangular_upper_transpose(l, &y, d)
}

/// Forward substitution for `L * x = b`.
pub fn solve_triangular_lower(l: &[f64], b: &[f64], n: usize) -> Vec<f64> {
    let mut x = vec![0.0; n];

    for i in 0..n {
        let mut sum = b[i];
        for j in 0..i {
            sum -= l[i * n + j] * x[j];
        }

        let diag = l[i * n + i];
        if diag.abs() > EPSILON {
            x[i] = sum / diag;
        } else {
            x[i] = 0.0;
        }
    }

    x
}

/// Back substitution for `L^T * x = b`.
fn solve_triangular_upper_transpose(l: &[f64], b: &[f64], n: usize) -> Vec<f64> {
    let mut x = vec![0.0; n];

    for i in (0..n).rev() {
        let mut sum = b[i];
        for j in (i + 1)..n {
            // L^T[i,j] = L[j,i]
            sum -= l[j * n + i] * x[j];
        }

        let diag = l[i * n + i];
        if diag.abs() > EPSILON {
            x[i] = sum / diag;
        } else {
            x[i] = 0.0;
        }
    }

    x
}

/// `x^T * A^{-1} * x = ||L^{-1} * x||^2` for `A = L * L^T`.
pub fn compute_quadratic_form(l: &[f64], x: &[f64], d: usize) -> f64 {
    let z = solve_triangular_lower(l, x, d);
    z.iter().map(|&v| v * v).sum()
}

/// Explicit inverse of a symmetric positive definite matrix, column by column.
pub fn invert_spd(a: &[f64], d: usize) -> Result<Vec<f64>, MatrixError> {
    let l = cholesky_decompose(a, d)?;
    let mut inv = vec![0.0; d * d];
    let mut e = vec![0.0; d];

    for j in 0..d {
        e.iter_mut().for_each(|v| *v = 0.0);
        e[j] = 1.0;
        let col = solve_cholesky(&l, &e, d);
        for i in 0..d {
            inv[i * d + j] = col[i];
        }
    }

    Ok(inv)
}

/// Matrix-vector product (row-major)
pub fn mat_vec_mul(a: &[f64], x: &[f64], d: usize) -> Vec<f64> {
    let mut result = vec![0.0; d];
    for i in 0..d {
        for j in 0..d {
            result[i] += a[i * d + j] * x[j];
        }
    }
    result
}

pub fn dot_product(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(&x, &y)| x * y).sum()
}

/// Outer-product accumulate: `A += x * x^T`
pub fn rank1_update_matrix(a: &mut [f64], x: &[f64], d: usize) {
    for i in 0..d {
        for j in 0..d {
            a[i * d + j] += x[i] * x[j];
        }
    }
}

/// `a += scale * b`
pub fn vec_add_scaled(a: &mut [f64], b: &[f64], scale: f64) {
    for (ai, &bi) in a.iter_mut().zip(b.iter()) {
        *ai += scale * bi;
    }
}
