//! Ordinary least squares baseline.

use crate::error::{AppError, Result};
use ndarray::{Array1, Array2, Axis};
use tracing::debug;

/// Relative ridge added to the normal equations before factorizing.
const BASE_RIDGE: f64 = 1e-10;
const MAX_RIDGE_ATTEMPTS: i32 = 8;

/// Linear regression with intercept, fitted by least squares
#[derive(Debug, Clone, Default)]
pub struct LinearRegression {
    pub coefficients: Option<Array1<f64>>,
    pub intercept: Option<f64>,
}

impl LinearRegression {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fit on centered data: solve (X'X + λI) β = X'y, then recover the
    /// intercept from the column means.
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(AppError::Model(format!(
                "dimension mismatch: {} rows but {} targets",
                x.nrows(),
                y.len()
            )));
        }
        if x.nrows() == 0 {
            return Err(AppError::Model(
                "cannot fit linear regression on zero rows".to_string(),
            ));
        }

        let x_mean = x
            .mean_axis(Axis(0))
            .ok_or_else(|| AppError::Model("empty feature matrix".to_string()))?;
        let y_mean = y.mean().unwrap_or(0.0);

        let xc = x - &x_mean;
        let yc = y - y_mean;

        let xtx = xc.t().dot(&xc);
        let xty = xc.t().dot(&yc);

        let beta = solve_normal_equations(&xtx, &xty)?;
        let intercept = y_mean - x_mean.dot(&beta);

        self.coefficients = Some(beta);
        self.intercept = Some(intercept);
        Ok(())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coefficients = self
            .coefficients
            .as_ref()
            .ok_or_else(|| AppError::Model("linear model has not been fitted".to_string()))?;
        let intercept = self.intercept.unwrap_or(0.0);

        if x.ncols() != coefficients.len() {
            return Err(AppError::Model(format!(
                "dimension mismatch: expected {} features, got {}",
                coefficients.len(),
                x.ncols()
            )));
        }

        Ok(x.dot(coefficients) + intercept)
    }
}

fn solve_normal_equations(xtx: &Array2<f64>, xty: &Array1<f64>) -> Result<Array1<f64>> {
    let n = xtx.nrows();
    if n == 0 {
        return Ok(Array1::zeros(0));
    }

    let scale = (xtx.diag().sum() / n as f64).max(1.0);

    for attempt in 0..MAX_RIDGE_ATTEMPTS {
        let ridge = BASE_RIDGE * scale * 100f64.powi(attempt);
        let mut a = xtx.clone();
        for i in 0..n {
            a[[i, i]] += ridge;
        }

        if let Some(beta) = cholesky_solve(&a, xty) {
            if attempt > 0 {
                debug!("Normal equations solved with ridge {:e}", ridge);
            }
            return Ok(beta);
        }
    }

    Err(AppError::Model(
        "normal equations are singular even after regularization".to_string(),
    ))
}

/// Solve A x = b for symmetric positive definite A.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));

    // A = L * L^T
    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }

            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 || !diag.is_finite() {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    // L z = b
    let mut z = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * z[j];
        }
        z[i] = (b[i] - sum) / l[[i, i]];
    }

    // L^T x = z
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * x[j];
        }
        x[i] = (z[i] - sum) / l[[i, i]];
    }

    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_recovers_exact_linear_relation() {
        let x = array![[1.0, 2.0], [2.0, 1.0], [3.0, 4.0], [4.0, 3.0], [5.0, 7.0]];
        let y: Array1<f64> = x.rows().into_iter().map(|r| 2.0 * r[0] - 3.0 * r[1] + 10.0).collect();

        let mut model = LinearRegression::new();
        model.fit(&x, &y).unwrap();

        let coef = model.coefficients.as_ref().unwrap();
        assert!((coef[0] - 2.0).abs() < 1e-6);
        assert!((coef[1] + 3.0).abs() < 1e-6);
        assert!((model.intercept.unwrap() - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_columns_get_zero_coefficient() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0], [4.0, 0.0]];
        let y = array![5.0, 8.0, 11.0, 14.0];

        let mut model = LinearRegression::new();
        model.fit(&x, &y).unwrap();

        let coef = model.coefficients.as_ref().unwrap();
        assert!((coef[0] - 3.0).abs() < 1e-6);
        assert!(coef[1].abs() < 1e-9);
        let pred = model.predict(&x).unwrap();
        for (p, t) in pred.iter().zip(y.iter()) {
            assert!((p - t).abs() < 1e-6);
        }
    }

    #[test]
    fn test_collinear_columns_still_fit() {
        // Second column duplicates the first
        let x = array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0], [4.0, 4.0]];
        let y = array![2.0, 4.0, 6.0, 8.0];

        let mut model = LinearRegression::new();
        model.fit(&x, &y).unwrap();
        let pred = model.predict(&x).unwrap();
        for (p, t) in pred.iter().zip(y.iter()) {
            assert!((p - t).abs() < 1e-4);
        }
    }

    #[test]
    fn test_predict_before_fit_fails() {
        let model = LinearRegression::new();
        assert!(model.predict(&array![[1.0]]).is_err());
    }
}
