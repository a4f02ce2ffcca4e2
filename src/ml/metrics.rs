//! Regression metrics for evaluating model performance

use ndarray::Array1;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct RegressionMetrics {
    /// Root Mean Squared Error
    pub rmse: f64,
    /// R-squared (coefficient of determination)
    pub r2: f64,
    /// Mean Absolute Error
    pub mae: f64,
    pub n_samples: usize,
}

impl RegressionMetrics {
    pub fn calculate(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Self {
        Self {
            rmse: Self::root_mean_squared_error(y_true, y_pred),
            r2: Self::r_squared(y_true, y_pred),
            mae: Self::mean_absolute_error(y_true, y_pred),
            n_samples: y_true.len(),
        }
    }

    /// Mean Squared Error: (1/n) * Σ(y_true - y_pred)²
    pub fn mean_squared_error(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
        if y_true.is_empty() {
            return 0.0;
        }
        let n = y_true.len() as f64;
        y_true
            .iter()
            .zip(y_pred.iter())
            .map(|(&t, &p)| (t - p).powi(2))
            .sum::<f64>()
            / n
    }

    pub fn root_mean_squared_error(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
        Self::mean_squared_error(y_true, y_pred).sqrt()
    }

    /// Mean Absolute Error: (1/n) * Σ|y_true - y_pred|
    pub fn mean_absolute_error(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
        if y_true.is_empty() {
            return 0.0;
        }
        let n = y_true.len() as f64;
        y_true
            .iter()
            .zip(y_pred.iter())
            .map(|(&t, &p)| (t - p).abs())
            .sum::<f64>()
            / n
    }

    /// R² = 1 - SS_res / SS_tot; a constant target scores 1 when predicted
    /// exactly and 0 otherwise
    pub fn r_squared(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
        let y_mean = y_true.mean().unwrap_or(0.0);

        let ss_res: f64 = y_true
            .iter()
            .zip(y_pred.iter())
            .map(|(&t, &p)| (t - p).powi(2))
            .sum();

        let ss_tot: f64 = y_true.iter().map(|&t| (t - y_mean).powi(2)).sum();

        if ss_tot < 1e-10 {
            return if ss_res < 1e-10 { 1.0 } else { 0.0 };
        }

        1.0 - ss_res / ss_tot
    }
}

impl fmt::Display for RegressionMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RMSE {:>10.4}  R² {:>8.4}  MAE {:>10.4}",
            self.rmse, self.r2, self.mae
        )
    }
}
