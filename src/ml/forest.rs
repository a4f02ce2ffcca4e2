//! Bagged ensemble of regression trees

use super::tree::{RegressionTree, TreeConfig};
use crate::config::{default_seed, deserialize_seed};
use crate::error::{AppError, Result};
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::Deserialize;
use tracing::debug;

/// Forest configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ForestConfig {
    /// Number of trees in the forest
    #[serde(default = "default_n_trees")]
    pub n_trees: usize,
    /// Base seed; tree `i` uses `seed + i`
    #[serde(default = "default_seed", deserialize_with = "deserialize_seed")]
    pub seed: u64,
    /// Maximum depth of each tree (unlimited if absent)
    #[serde(default)]
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    #[serde(default = "default_min_samples_split")]
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    #[serde(default = "default_min_samples_leaf")]
    pub min_samples_leaf: usize,
    /// Features considered per split (all if absent)
    #[serde(default)]
    pub max_features: Option<usize>,
}

fn default_n_trees() -> usize {
    100
}

fn default_min_samples_split() -> usize {
    2
}

fn default_min_samples_leaf() -> usize {
    1
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: default_n_trees(),
            seed: default_seed(),
            max_depth: None,
            min_samples_split: default_min_samples_split(),
            min_samples_leaf: default_min_samples_leaf(),
            max_features: None,
        }
    }
}

impl ForestConfig {
    fn tree_config(&self) -> TreeConfig {
        TreeConfig {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            max_features: self.max_features,
        }
    }
}

/// Random forest regressor built from bootstrap samples
#[derive(Debug, Clone)]
pub struct RandomForest {
    config: ForestConfig,
    trees: Vec<RegressionTree>,
    feature_importances: Vec<f64>,
}

impl RandomForest {
    pub fn new(config: ForestConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            feature_importances: Vec::new(),
        }
    }

    /// Train the forest.
    ///
    /// Trees are built in parallel, but each owns a generator seeded from its
    /// index and the results are collected in index order, so the fitted
    /// forest does not depend on thread scheduling.
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let n = x.nrows();
        if n != y.len() {
            return Err(AppError::Model(format!(
                "dimension mismatch: {} rows but {} targets",
                n,
                y.len()
            )));
        }
        if n == 0 {
            return Err(AppError::Model(
                "cannot fit random forest on zero rows".to_string(),
            ));
        }
        if self.config.n_trees == 0 {
            return Err(AppError::Model("forest needs at least one tree".to_string()));
        }

        let targets = y.to_vec();
        let tree_config = self.config.tree_config();
        let base_seed = self.config.seed;

        self.trees = (0..self.config.n_trees)
            .into_par_iter()
            .map(|i| {
                let mut rng = ChaCha8Rng::seed_from_u64(base_seed.wrapping_add(i as u64));
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();

                let mut tree = RegressionTree::new(tree_config.clone());
                tree.fit(x, &targets, &bootstrap, &mut rng);
                tree
            })
            .collect();

        // Aggregate feature importances
        let mut importances = vec![0.0; x.ncols()];
        for tree in &self.trees {
            for (total, imp) in importances.iter_mut().zip(tree.feature_importances()) {
                *total += imp;
            }
        }
        let sum: f64 = importances.iter().sum();
        if sum > 0.0 {
            for imp in &mut importances {
                *imp /= sum;
            }
        }
        self.feature_importances = importances;

        debug!(
            "Fitted {} trees (max depth {})",
            self.trees.len(),
            self.trees.iter().map(|t| t.depth()).max().unwrap_or(0)
        );

        Ok(())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(AppError::Model("random forest has not been fitted".to_string()));
        }
        if x.ncols() != self.feature_importances.len() {
            return Err(AppError::Model(format!(
                "dimension mismatch: expected {} features, got {}",
                self.feature_importances.len(),
                x.ncols()
            )));
        }

        let predictions: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let row = x.row(i);
                self.trees.iter().map(|t| t.predict_one(row)).sum::<f64>()
                    / self.trees.len() as f64
            })
            .collect();

        Ok(Array1::from_vec(predictions))
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}
