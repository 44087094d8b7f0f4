//! Ordinary least squares solver.
//!
//! Every model in this project is a small linear regression:
//!
//! ```text
//! minimize Σ (y_i - x_i^T β)^2
//! ```
//!
//! Implementation choices:
//! - We solve through an SVD of the design matrix. Rank-deficient designs are
//!   refused rather than given a minimum-norm solution.
//! - Standard errors come from `(XᵀX)⁻¹ = V Σ⁻² Vᵀ`, reusing the same SVD.

use nalgebra::{DMatrix, DVector};

/// Singular values below `RANK_TOL * max(σ)` count as zero.
const RANK_TOL: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OlsError {
    #[error("{n} observations cannot identify {p} coefficients")]
    Underdetermined { n: usize, p: usize },
    #[error("design matrix has rank {rank} < {p} columns")]
    RankDeficient { rank: usize, p: usize },
    #[error("least squares solve failed: {0}")]
    Numerical(String),
}

/// Solution of one least squares problem.
#[derive(Debug, Clone)]
pub struct OlsSolution {
    pub beta: Vec<f64>,
    pub std_errors: Vec<f64>,
    pub fitted: Vec<f64>,
    /// Residual sum of squares.
    pub rss: f64,
    pub n: usize,
    /// Residual degrees of freedom, `n - p`.
    pub df_resid: usize,
}

/// Solve a full-rank least squares problem using SVD.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Result<OlsSolution, OlsError> {
    let (n, p) = x.shape();
    if n != y.len() {
        return Err(OlsError::Numerical(format!(
            "design has {n} rows but response has {}",
            y.len()
        )));
    }
    if n <= p {
        return Err(OlsError::Underdetermined { n, p });
    }

    let svd = x.clone().svd(true, true);
    let sigma_max = svd.singular_values.max();
    if !(sigma_max.is_finite() && sigma_max > 0.0) {
        return Err(OlsError::RankDeficient { rank: 0, p });
    }
    let tol = sigma_max * RANK_TOL;
    let rank = svd.singular_values.iter().filter(|s| **s > tol).count();
    if rank < p {
        return Err(OlsError::RankDeficient { rank, p });
    }

    let beta = svd
        .solve(y, tol)
        .map_err(|e| OlsError::Numerical(e.to_string()))?;
    if beta.iter().any(|v| !v.is_finite()) {
        return Err(OlsError::Numerical("non-finite coefficient".to_string()));
    }

    let fitted = x * &beta;
    let rss = (y - &fitted).norm_squared();
    let df_resid = n - p;
    let sigma2 = rss / df_resid as f64;

    let v_t = svd
        .v_t
        .as_ref()
        .ok_or_else(|| OlsError::Numerical("SVD did not compute V".to_string()))?;
    let std_errors = (0..p)
        .map(|j| {
            let diag: f64 = (0..v_t.nrows())
                .map(|k| {
                    let s = svd.singular_values[k];
                    v_t[(k, j)] * v_t[(k, j)] / (s * s)
                })
                .sum();
            (sigma2 * diag).sqrt()
        })
        .collect();

    Ok(OlsSolution {
        beta: beta.iter().copied().collect(),
        std_errors,
        fitted: fitted.iter().copied().collect(),
        rss,
        n,
        df_resid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let sol = solve_least_squares(&x, &y).unwrap();
        assert!((sol.beta[0] - 2.0).abs() < 1e-10);
        assert!((sol.beta[1] - 3.0).abs() < 1e-10);
        assert!(sol.rss < 1e-20);
        assert_eq!(sol.df_resid, 1);
    }

    #[test]
    fn standard_errors_match_closed_form_for_simple_regression() {
        let xs = [0.0, 1.0, 2.0, 3.0, 4.0];
        let ys = [1.0, 2.9, 5.2, 6.8, 9.1];
        let mut data = Vec::new();
        for &xi in &xs {
            data.push(1.0);
            data.push(xi);
        }
        let x = DMatrix::from_row_slice(5, 2, &data);
        let y = DVector::from_row_slice(&ys);
        let sol = solve_least_squares(&x, &y).unwrap();

        let xbar = 2.0;
        let sxx: f64 = xs.iter().map(|v| (v - xbar) * (v - xbar)).sum();
        let sigma2 = sol.rss / 3.0;
        let se_slope = (sigma2 / sxx).sqrt();
        assert!((sol.std_errors[1] - se_slope).abs() < 1e-10);
    }

    #[test]
    fn duplicated_column_is_rank_deficient() {
        let x = DMatrix::from_row_slice(4, 2, &[1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0]);
        let y = DVector::from_row_slice(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(
            solve_least_squares(&x, &y).unwrap_err(),
            OlsError::RankDeficient { rank: 1, p: 2 }
        );
    }

    #[test]
    fn too_few_rows_is_underdetermined() {
        let x = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 1.0, 1.0]);
        let y = DVector::from_row_slice(&[1.0, 2.0]);
        assert!(matches!(
            solve_least_squares(&x, &y),
            Err(OlsError::Underdetermined { n: 2, p: 2 })
        ));
    }
}
