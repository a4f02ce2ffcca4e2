use crate::config::Config;
use crate::data::models::{MergedRecord, RawDatasets};
use crate::data::{DataLoader, DatasetStore};
use crate::error::{AppError, Result};
use crate::features::{FeatureEngineer, FeatureSchema, ProcessedDataset, SCALED_COLUMNS};
use crate::joiner::{JoinSummary, TimeSeriesJoiner};
use crate::ml::{EvaluationReport, Evaluator, ModelTrainer};
use crate::profile::TrafficProfile;
use crate::scaler::{ColumnScale, StandardScaler};
use crate::split::DatasetSplitter;
use std::fmt;
use tracing::{info, warn};

/// Everything the ETL half of a run produces.
#[derive(Debug, Clone)]
pub struct EtlOutput {
    pub merged: Vec<MergedRecord>,
    pub summary: JoinSummary,
    pub scaler: StandardScaler,
    pub dataset: ProcessedDataset,
}

#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub join: JoinSummary,
    pub processed_rows: usize,
    pub processed_columns: usize,
    pub schema_revision: u32,
    /// Fitted on the full dataset, before the split
    pub scaling: Vec<ColumnScale>,
    pub profile: TrafficProfile,
    pub evaluation: EvaluationReport,
}

pub struct Pipeline {
    config: Config,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn run(&self) -> Result<PipelineReport> {
        info!("Starting pipeline run");

        let raw = DataLoader::load_all(&self.config.data)?;
        let etl = self.process(&raw)?;
        let evaluation = self.model()?;

        info!("Pipeline run completed");

        Ok(PipelineReport {
            join: etl.summary,
            processed_rows: etl.dataset.len(),
            processed_columns: etl.dataset.schema.columns.len(),
            schema_revision: etl.dataset.schema.revision,
            scaling: etl.scaler.columns,
            profile: TrafficProfile::build(&etl.merged, &self.config.traffic_levels),
            evaluation,
        })
    }

    /// Join, engineer, scale and persist the processed dataset.
    pub fn process(&self, raw: &RawDatasets) -> Result<EtlOutput> {
        let (merged, summary) = TimeSeriesJoiner::join(raw)?;

        let schema = self.resolve_schema(&merged)?;
        let encoded = FeatureEngineer::new(&schema).encode(&merged)?;

        let scaler = StandardScaler::fit(&encoded, &SCALED_COLUMNS)?;
        let dataset = scaler.transform(&encoded);

        DatasetStore::write_processed(&self.config.output.processed, &dataset)?;
        DatasetStore::save_schema(&self.config.output.schema, &schema)?;

        Ok(EtlOutput {
            merged,
            summary,
            scaler,
            dataset,
        })
    }

    /// Read the persisted dataset back, split, fit and evaluate both models.
    pub fn model(&self) -> Result<EvaluationReport> {
        let schema = DatasetStore::load_schema(&self.config.output.schema)?;
        let dataset = DatasetStore::read_processed(&self.config.output.processed, &schema)?;

        let split = DatasetSplitter::split(
            &dataset,
            self.config.split.test_fraction,
            self.config.split.seed,
        )?;
        info!(
            "Split {} rows into {} train / {} test (seed {})",
            dataset.len(),
            split.train.n_samples(),
            split.test.n_samples(),
            self.config.split.seed
        );

        let models = ModelTrainer::new(self.config.forest.clone()).train(&split)?;
        let report = Evaluator::evaluate(&models, &split, self.config.report.top_features)?;

        info!(
            "Linear regression: RMSE {:.4}, R² {:.4}; random forest: RMSE {:.4}, R² {:.4}",
            report.baseline.rmse, report.baseline.r2, report.ensemble.rmse, report.ensemble.r2
        );

        Ok(report)
    }

    fn resolve_schema(&self, merged: &[MergedRecord]) -> Result<FeatureSchema> {
        let path = &self.config.output.schema;

        if self.config.schema.freeze {
            let schema = DatasetStore::load_schema_if_exists(path)?.ok_or_else(|| {
                AppError::Config(format!(
                    "schema.freeze is set but no schema exists at {}",
                    path.display()
                ))
            })?;
            info!(
                "Encoding against frozen schema revision {} ({} columns)",
                schema.revision,
                schema.columns.len()
            );
            return Ok(schema);
        }

        let mut schema = FeatureSchema::derive(merged)?;

        let previous = match DatasetStore::load_schema_if_exists(path) {
            Ok(previous) => previous,
            Err(e) => {
                warn!("Ignoring unreadable schema at {}: {}", path.display(), e);
                None
            }
        };

        if let Some(previous) = previous {
            if previous.columns == schema.columns {
                schema.revision = previous.revision;
            } else {
                schema.revision = previous.revision + 1;
                warn!(
                    "Feature schema changed ({} -> {} columns), revision {} -> {}",
                    previous.columns.len(),
                    schema.columns.len(),
                    previous.revision,
                    schema.revision
                );
            }
        }

        Ok(schema)
    }
}

impl fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Traffic pipeline report")?;
        writeln!(f, "=======================")?;
        writeln!(
            f,
            "Processed dataset: {} rows x {} columns (schema revision {})",
            self.processed_rows, self.processed_columns, self.schema_revision
        )?;
        writeln!(
            f,
            "Join: {} readings, {} without weather, {} GPS hours",
            self.join.rows, self.join.weather_unmatched, self.join.speed_hours
        )?;
        match self.join.speed_fill_value {
            Some(fill) => writeln!(
                f,
                "      {} rows had no GPS speed, filled with {:.3} km/h",
                self.join.speed_filled_rows, fill
            )?,
            None => writeln!(f, "      every reading had a GPS speed")?,
        }
        writeln!(
            f,
            "      {} event days covering {} readings",
            self.join.event_days, self.join.event_rows
        )?;
        writeln!(f, "Scaling (full dataset):")?;
        for scale in &self.scaling {
            writeln!(
                f,
                "  {:<14} mean {:>10.4}  std {:>10.4}",
                scale.column, scale.mean, scale.std
            )?;
        }
        writeln!(f)?;
        write!(f, "{}", self.profile)?;
        writeln!(f)?;
        write!(f, "{}", self.evaluation)
    }
}
