pub mod evaluate;
pub mod forest;
pub mod linear;
pub mod metrics;
pub mod trainer;
pub mod tree;

pub use evaluate::{EvaluationReport, Evaluator, FeatureImportance};
pub use forest::{ForestConfig, RandomForest};
pub use linear::LinearRegression;
pub use metrics::RegressionMetrics;
pub use trainer::{ModelTrainer, TrainedModels};
