//! Persistence of the processed dataset and its feature schema.

use crate::data::loader::parse_timestamp;
use crate::error::{AppError, Result};
use crate::features::{FeatureSchema, ProcessedDataset, ProcessedRecord};
use std::path::Path;
use tracing::{debug, info};

/// `%.f` keeps sub-second precision and prints nothing for whole seconds.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

pub struct DatasetStore;

impl DatasetStore {
    pub fn write_processed(path: &Path, dataset: &ProcessedDataset) -> Result<()> {
        ensure_parent(path)?;
        let mut writer = csv::Writer::from_path(path)?;

        writer.write_record(&dataset.schema.columns)?;
        for record in &dataset.records {
            let mut row = Vec::with_capacity(dataset.schema.columns.len());
            row.push(record.timestamp.format(TIMESTAMP_FORMAT).to_string());
            row.push(record.vehicle_count.to_string());
            row.extend(record.features.iter().map(|v| v.to_string()));
            writer.write_record(&row)?;
        }
        writer.flush()?;

        info!(
            "Wrote processed dataset to {} ({} rows x {} columns)",
            path.display(),
            dataset.len(),
            dataset.schema.columns.len()
        );
        Ok(())
    }

    /// Read a processed dataset back, checking its header against `schema`.
    pub fn read_processed(path: &Path, schema: &FeatureSchema) -> Result<ProcessedDataset> {
        let mut reader = csv::Reader::from_path(path)?;

        let headers = reader.headers()?.clone();
        for (i, column) in schema.columns.iter().enumerate() {
            if headers.get(i) != Some(column.as_str()) {
                return Err(AppError::Schema {
                    dataset: "processed".to_string(),
                    column: column.clone(),
                });
            }
        }
        if headers.len() != schema.columns.len() {
            return Err(AppError::InvalidData(format!(
                "processed dataset has {} columns, schema expects {}",
                headers.len(),
                schema.columns.len()
            )));
        }

        let mut records = Vec::new();
        for row in reader.records() {
            let row = row?;
            let line = row.position().map(|p| p.line()).unwrap_or(0);
            let number = |i: usize| -> Result<f64> {
                let raw = row.get(i).unwrap_or("");
                raw.parse::<f64>().map_err(|e| {
                    AppError::Parse(format!(
                        "processed line {}, column '{}': invalid number '{}': {}",
                        line, schema.columns[i], raw, e
                    ))
                })
            };

            let raw_ts = row.get(0).unwrap_or("");
            let timestamp = parse_timestamp(raw_ts).ok_or_else(|| {
                AppError::Parse(format!(
                    "processed line {}: invalid timestamp '{}'",
                    line, raw_ts
                ))
            })?;

            records.push(ProcessedRecord {
                timestamp,
                vehicle_count: number(1)?,
                features: (2..schema.columns.len())
                    .map(|i| number(i))
                    .collect::<Result<Vec<_>>>()?,
            });
        }

        debug!("Read {} processed rows from {}", records.len(), path.display());
        Ok(ProcessedDataset {
            schema: schema.clone(),
            records,
        })
    }

    pub fn save_schema(path: &Path, schema: &FeatureSchema) -> Result<()> {
        ensure_parent(path)?;
        std::fs::write(path, serde_yaml::to_string(schema)?)?;
        debug!("Saved feature schema revision {} to {}", schema.revision, path.display());
        Ok(())
    }

    pub fn load_schema(path: &Path) -> Result<FeatureSchema> {
        let content = std::fs::read_to_string(path)?;
        let schema: FeatureSchema = serde_yaml::from_str(&content)?;
        schema.validate()?;
        Ok(schema)
    }

    /// `None` when no schema has been persisted yet.
    pub fn load_schema_if_exists(path: &Path) -> Result<Option<FeatureSchema>> {
        if !path.exists() {
            return Ok(None);
        }
        Self::load_schema(path).map(Some)
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::CategoricalField;
    use chrono::NaiveDateTime;
    use std::collections::BTreeSet;

    fn schema() -> FeatureSchema {
        let sensors: BTreeSet<String> = ["S1", "S2"].iter().map(|s| s.to_string()).collect();
        let conditions: BTreeSet<String> = ["Clear"].iter().map(|s| s.to_string()).collect();
        let events: BTreeSet<String> = ["Concert", "No Event"].iter().map(|s| s.to_string()).collect();
        FeatureSchema::from_fields(vec![
            CategoricalField::new("sensor_id", sensors),
            CategoricalField::new("weather_condition", conditions),
            CategoricalField::new("event_name", events),
        ])
        .unwrap()
    }

    #[test]
    fn test_processed_csv_keeps_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/processed_data.csv");
        let schema = schema();
        let dataset = ProcessedDataset {
            schema: schema.clone(),
            records: vec![ProcessedRecord {
                timestamp: NaiveDateTime::parse_from_str("2024-03-04 08:00:00", "%Y-%m-%d %H:%M:%S")
                    .unwrap(),
                vehicle_count: 17.0,
                features: vec![-0.25, 1.5, 0.0, 2.0, 8.0, 0.0, 0.0, 1.0, 0.0],
            }],
        };

        DatasetStore::write_processed(&path, &dataset).unwrap();
        let header = std::fs::read_to_string(&path).unwrap();
        assert!(header.starts_with(
            "timestamp,vehicle_count,temperature,rainfall_mm,avg_gps_speed,attendance,hour,day_of_week,is_weekend,sensor_id_S2,event_name_No_Event"
        ));

        let back = DatasetStore::read_processed(&path, &schema).unwrap();
        assert_eq!(back, dataset);
    }

    #[test]
    fn test_fractional_seconds_survive_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed_data.csv");
        let schema = schema();
        let timestamp =
            NaiveDateTime::parse_from_str("2024-03-04 08:15:30.250", "%Y-%m-%d %H:%M:%S%.f").unwrap();
        let dataset = ProcessedDataset {
            schema: schema.clone(),
            records: vec![ProcessedRecord {
                timestamp,
                vehicle_count: 3.0,
                features: vec![0.0; schema.feature_columns().len()],
            }],
        };

        DatasetStore::write_processed(&path, &dataset).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("2024-03-04 08:15:30.250"));

        let back = DatasetStore::read_processed(&path, &schema).unwrap();
        assert_eq!(back.records[0].timestamp, timestamp);
    }

    #[test]
    fn test_header_mismatch_is_schema_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed_data.csv");
        std::fs::write(&path, "timestamp,vehicle_count\n2024-03-04 08:00:00,1\n").unwrap();
        let err = DatasetStore::read_processed(&path, &schema()).unwrap_err();
        assert!(matches!(err, AppError::Schema { .. }));
    }

    #[test]
    fn test_schema_file_is_validated_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feature_schema.yaml");
        assert!(DatasetStore::load_schema_if_exists(&path).unwrap().is_none());

        let schema = schema();
        DatasetStore::save_schema(&path, &schema).unwrap();
        assert_eq!(DatasetStore::load_schema(&path).unwrap(), schema);

        let mut tampered = schema.clone();
        tampered.columns.push("sensor_id_S3".to_string());
        std::fs::write(&path, serde_yaml::to_string(&tampered).unwrap()).unwrap();
        assert!(DatasetStore::load_schema(&path).is_err());
    }
}
