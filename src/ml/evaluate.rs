use super::metrics::RegressionMetrics;
use super::trainer::TrainedModels;
use crate::error::Result;
use crate::split::TrainTestSplit;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

#[derive(Debug, Clone)]
pub struct EvaluationReport {
    pub train_rows: usize,
    pub test_rows: usize,
    pub baseline: RegressionMetrics,
    pub ensemble: RegressionMetrics,
    pub top_features: Vec<FeatureImportance>,
}

/// Highest `k` importances, descending; ties keep column order.
pub fn rank_features(names: &[String], importances: &[f64], k: usize) -> Vec<FeatureImportance> {
    let mut ranked: Vec<FeatureImportance> = names
        .iter()
        .zip(importances)
        .map(|(name, &importance)| FeatureImportance {
            feature: name.clone(),
            importance,
        })
        .collect();

    // sort_by is stable
    ranked.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    ranked.truncate(k);
    ranked
}

pub struct Evaluator;

impl Evaluator {
    pub fn evaluate(
        models: &TrainedModels,
        split: &TrainTestSplit,
        top_k: usize,
    ) -> Result<EvaluationReport> {
        let test = &split.test;

        let baseline_pred = models.baseline.predict(&test.x)?;
        let ensemble_pred = models.ensemble.predict(&test.x)?;

        Ok(EvaluationReport {
            train_rows: split.train.n_samples(),
            test_rows: test.n_samples(),
            baseline: RegressionMetrics::calculate(&test.y, &baseline_pred),
            ensemble: RegressionMetrics::calculate(&test.y, &ensemble_pred),
            top_features: rank_features(
                &split.feature_names,
                models.ensemble.feature_importances(),
                top_k,
            ),
        })
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Model evaluation ({} train rows, {} test rows)",
            self.train_rows, self.test_rows
        )?;
        writeln!(f, "  Linear regression  {}", self.baseline)?;
        writeln!(f, "  Random forest      {}", self.ensemble)?;
        writeln!(f, "Top {} features (random forest):", self.top_features.len())?;
        for (rank, feature) in self.top_features.iter().enumerate() {
            writeln!(
                f,
                "  {}. {:<28} {:.4}",
                rank + 1,
                feature.feature,
                feature.importance
            )?;
        }
        Ok(())
    }
}
