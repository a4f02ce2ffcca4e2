use super::forest::{ForestConfig, RandomForest};
use super::linear::LinearRegression;
use crate::error::Result;
use crate::split::TrainTestSplit;
use std::time::Instant;
use tracing::info;

/// The two fitted regressors of one run.
#[derive(Debug, Clone)]
pub struct TrainedModels {
    pub baseline: LinearRegression,
    pub ensemble: RandomForest,
}

pub struct ModelTrainer {
    forest: ForestConfig,
}

impl ModelTrainer {
    pub fn new(forest: ForestConfig) -> Self {
        Self { forest }
    }

    pub fn train(&self, split: &TrainTestSplit) -> Result<TrainedModels> {
        let train = &split.train;

        let started = Instant::now();
        let mut baseline = LinearRegression::new();
        baseline.fit(&train.x, &train.y)?;
        info!(
            "Fitted linear baseline on {} rows x {} features in {:.2?}",
            train.n_samples(),
            train.x.ncols(),
            started.elapsed()
        );

        let started = Instant::now();
        let mut ensemble = RandomForest::new(self.forest.clone());
        ensemble.fit(&train.x, &train.y)?;
        info!(
            "Fitted random forest ({} trees, seed {}) in {:.2?}",
            ensemble.n_trees(),
            self.forest.seed,
            started.elapsed()
        );

        Ok(TrainedModels { baseline, ensemble })
    }
}
