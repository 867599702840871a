//! Poisson regression with log link, fitted by iteratively reweighted least squares

use super::linalg::{self, Matrix};
use super::EstimatorError;

/// Linear predictors are clamped to this magnitude before exponentiation
const MAX_LINEAR_PREDICTOR: f64 = 30.0;

/// Relative eigenvalue below which a direction of the final information
/// matrix carries no information. Coefficients drifting towards a zero rate
/// shrink their weights, so such directions fall below this long before they
/// reach exact singularity.
const ESTIMABILITY_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy)]
pub struct FitOptions {
    pub max_iterations: usize,
    /// Absolute change in deviance that counts as converged
    pub tolerance: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PoissonFit {
    pub coefficients: Vec<f64>,
    pub deviance: f64,
    pub iterations: usize,
    pub rank: usize,
    /// Directions of coefficient space the data does not determine
    pub null_space: Vec<Vec<f64>>,
}

impl PoissonFit {
    /// Expected count for one regressor row
    pub fn predict(&self, row: &[f64]) -> f64 {
        linear_predictor(&self.coefficients, row).exp()
    }

    /// Whether the prediction for `row` is fixed by the data rather than by
    /// where the solver stopped
    pub fn is_estimable(&self, row: &[f64]) -> bool {
        linalg::projection_share(&self.null_space, row) <= ESTIMABILITY_TOLERANCE
    }

    /// Whether the linear predictor for `row` reaches the clamp
    pub fn saturates(&self, row: &[f64]) -> bool {
        dot(&self.coefficients, row).abs() >= MAX_LINEAR_PREDICTOR
    }
}

pub fn fit_poisson(x: &Matrix, y: &[f64], options: FitOptions) -> Result<PoissonFit, EstimatorError> {
    let n = y.len();
    if n == 0 || x.len() != n {
        return Err(EstimatorError::InsufficientData(
            "no observations to fit".to_string(),
        ));
    }
    let p = x[0].len();

    let mean = y.iter().sum::<f64>() / n as f64;
    let mut mu: Vec<f64> = y.iter().map(|yi| (yi + mean) / 2.0).collect();
    let mut eta: Vec<f64> = mu.iter().map(|m| m.ln()).collect();
    let mut deviance = poisson_deviance(y, &mu);

    for iteration in 1..=options.max_iterations {
        let xtwx = information_matrix(x, &mu);
        let mut xtwz = vec![0.0; p];
        for i in 0..n {
            let working = eta[i] + (y[i] - mu[i]) / mu[i];
            for j in 0..p {
                xtwz[j] += mu[i] * x[i][j] * working;
            }
        }

        let (coefficients, rank) = linalg::solve_symmetric(&xtwx, &xtwz);
        if coefficients.iter().any(|b| !b.is_finite()) {
            return Err(EstimatorError::NumericDivergence(format!(
                "non-finite coefficient at iteration {}",
                iteration
            )));
        }

        for i in 0..n {
            eta[i] = linear_predictor(&coefficients, &x[i]);
            mu[i] = eta[i].exp();
        }

        let updated = poisson_deviance(y, &mu);
        if !updated.is_finite() {
            return Err(EstimatorError::NumericDivergence(format!(
                "non-finite deviance at iteration {}",
                iteration
            )));
        }

        let change = (updated - deviance).abs();
        deviance = updated;
        if change < options.tolerance {
            let information = information_matrix(x, &mu);
            let null_space = linalg::null_space(&information, ESTIMABILITY_TOLERANCE);
            return Ok(PoissonFit {
                coefficients,
                deviance,
                iterations: iteration,
                rank,
                null_space,
            });
        }
    }

    Err(EstimatorError::NumericDivergence(format!(
        "no convergence after {} iterations (deviance {:.6})",
        options.max_iterations, deviance
    )))
}

/// X'WX with the Poisson weights `mu`
fn information_matrix(x: &Matrix, mu: &[f64]) -> Matrix {
    let p = x.first().map_or(0, Vec::len);
    let mut xtwx = vec![vec![0.0; p]; p];
    for (row, &weight) in x.iter().zip(mu) {
        for j in 0..p {
            let wx = weight * row[j];
            if wx == 0.0 {
                continue;
            }
            for k in 0..p {
                xtwx[j][k] += wx * row[k];
            }
        }
    }
    xtwx
}

fn dot(coefficients: &[f64], row: &[f64]) -> f64 {
    coefficients.iter().zip(row).map(|(b, x)| b * x).sum()
}

fn linear_predictor(coefficients: &[f64], row: &[f64]) -> f64 {
    dot(coefficients, row).clamp(-MAX_LINEAR_PREDICTOR, MAX_LINEAR_PREDICTOR)
}

fn poisson_deviance(y: &[f64], mu: &[f64]) -> f64 {
    2.0 * y
        .iter()
        .zip(mu)
        .map(|(&yi, &mi)| {
            let log_term = if yi > 0.0 { yi * (yi / mi).ln() } else { 0.0 };
            log_term - (yi - mi)
        })
        .sum::<f64>()
}
