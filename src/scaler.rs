//! Standardization of the continuous feature columns.
//!
//! The pipeline fits over the whole processed dataset before the train/test
//! split, so test-partition statistics leak into the scaling parameters.
//! `fit_rows` fits on a chosen subset for the leak-free variant.

use crate::error::{AppError, Result};
use crate::features::ProcessedDataset;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnScale {
    pub column: String,
    pub index: usize,
    pub mean: f64,
    pub std: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub columns: Vec<ColumnScale>,
}

impl StandardScaler {
    /// Fit over every row of the dataset.
    pub fn fit(dataset: &ProcessedDataset, columns: &[&str]) -> Result<Self> {
        let rows: Vec<usize> = (0..dataset.len()).collect();
        Self::fit_rows(dataset, columns, &rows)
    }

    /// Fit over the given row indices only.
    pub fn fit_rows(dataset: &ProcessedDataset, columns: &[&str], rows: &[usize]) -> Result<Self> {
        if rows.is_empty() {
            return Err(AppError::EmptyAggregate(
                "cannot fit scaler on zero rows".to_string(),
            ));
        }

        let columns = columns
            .iter()
            .map(|&column| {
                let index = dataset
                    .schema
                    .feature_index(column)
                    .ok_or_else(|| AppError::Schema {
                        dataset: "processed".to_string(),
                        column: column.to_string(),
                    })?;

                let values = rows
                    .iter()
                    .map(|&r| {
                        dataset
                            .records
                            .get(r)
                            .map(|rec| rec.features[index])
                            .ok_or_else(|| {
                                AppError::InvalidData(format!("row index {} out of range", r))
                            })
                    })
                    .collect::<Result<Vec<f64>>>()?;

                let (mean, std) = mean_std(&values);
                // Constant columns keep unit scale and only get centered
                let std = if std > f64::EPSILON { std } else { 1.0 };

                debug!("Scaler {}: mean={:.4} std={:.4}", column, mean, std);
                Ok(ColumnScale {
                    column: column.to_string(),
                    index,
                    mean,
                    std,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { columns })
    }

    pub fn transform(&self, dataset: &ProcessedDataset) -> ProcessedDataset {
        let mut scaled = dataset.clone();
        for record in &mut scaled.records {
            for scale in &self.columns {
                let value = &mut record.features[scale.index];
                *value = (*value - scale.mean) / scale.std;
            }
        }
        scaled
    }
}

/// Mean and population standard deviation.
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{FeatureSchema, ProcessedRecord, SCALED_COLUMNS, TARGET_COLUMN};
    use chrono::NaiveDateTime;

    fn dataset(rows: &[[f64; 4]]) -> ProcessedDataset {
        let schema = FeatureSchema::from_fields(vec![]).unwrap();
        let ts = NaiveDateTime::parse_from_str("2024-03-04 08:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        ProcessedDataset {
            schema,
            records: rows
                .iter()
                .enumerate()
                .map(|(i, r)| ProcessedRecord {
                    timestamp: ts,
                    vehicle_count: i as f64 * 10.0,
                    features: vec![r[0], r[1], r[2], r[3], 8.0, 0.0, 0.0],
                })
                .collect(),
        }
    }

    #[test]
    fn test_scaled_columns_have_zero_mean_unit_std() {
        let data = dataset(&[
            [1.0, 0.0, 30.0, 0.0],
            [5.0, 2.5, 42.0, 1000.0],
            [-3.0, 0.5, 18.0, 0.0],
            [11.0, 0.0, 55.0, 250.0],
        ]);
        let scaler = StandardScaler::fit(&data, &SCALED_COLUMNS).unwrap();
        let scaled = scaler.transform(&data);

        for column in SCALED_COLUMNS {
            let (mean, std) = mean_std(&scaled.column(column).unwrap());
            assert!(mean.abs() < 1e-6, "{} mean {}", column, mean);
            assert!((std - 1.0).abs() < 1e-6, "{} std {}", column, std);
        }
    }

    #[test]
    fn test_target_and_other_columns_untouched() {
        let data = dataset(&[[1.0, 0.0, 30.0, 0.0], [5.0, 2.5, 42.0, 1000.0]]);
        let scaled = StandardScaler::fit(&data, &SCALED_COLUMNS)
            .unwrap()
            .transform(&data);
        for (a, b) in data.records.iter().zip(&scaled.records) {
            assert_eq!(a.vehicle_count, b.vehicle_count);
            assert_eq!(a.features[4..], b.features[4..]);
        }
        assert_eq!(TARGET_COLUMN, "vehicle_count");
    }

    #[test]
    fn test_constant_column_is_centered_only() {
        let data = dataset(&[[1.0, 0.0, 30.0, 0.0], [5.0, 0.0, 42.0, 0.0]]);
        let scaler = StandardScaler::fit(&data, &["rainfall_mm"]).unwrap();
        assert_eq!(scaler.columns[0].std, 1.0);
        let scaled = scaler.transform(&data);
        assert!(scaled.column("rainfall_mm").unwrap().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_full_fit_leaks_test_rows_into_parameters() {
        let data = dataset(&[
            [1.0, 0.0, 30.0, 0.0],
            [3.0, 0.0, 30.0, 0.0],
            [100.0, 0.0, 30.0, 0.0],
        ]);
        let train = [0, 1];
        let full = StandardScaler::fit(&data, &["temperature"]).unwrap();
        let leak_free = StandardScaler::fit_rows(&data, &["temperature"], &train).unwrap();

        // The held-out outlier shifts the full-data mean
        assert!((leak_free.columns[0].mean - 2.0).abs() < 1e-12);
        assert!(full.columns[0].mean > 30.0);

        let scaled = leak_free.transform(&data);
        let train_values: Vec<f64> = train
            .iter()
            .map(|&i| scaled.records[i].features[0])
            .collect();
        let (mean, std) = mean_std(&train_values);
        assert!(mean.abs() < 1e-6);
        assert!((std - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_column_is_schema_error() {
        let data = dataset(&[[1.0, 0.0, 30.0, 0.0]]);
        let err = StandardScaler::fit(&data, &["humidity"]).unwrap_err();
        assert!(matches!(err, AppError::Schema { .. }));
    }
}
