//! Calendar features, categorical encoding and the persisted feature schema.

use crate::data::models::MergedRecord;
use crate::error::{AppError, Result};
use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info};

pub const SCHEMA_FORMAT_VERSION: u32 = 1;

pub const TIMESTAMP_COLUMN: &str = "timestamp";
pub const TARGET_COLUMN: &str = "vehicle_count";

/// Numeric columns standardized by the scaler.
pub const SCALED_COLUMNS: [&str; 4] = ["temperature", "rainfall_mm", "avg_gps_speed", "attendance"];
pub const CALENDAR_COLUMNS: [&str; 3] = ["hour", "day_of_week", "is_weekend"];
pub const CATEGORICAL_COLUMNS: [&str; 3] = ["sensor_id", "weather_condition", "event_name"];

/// Calendar fields of a timestamp. `day_of_week` counts from Monday = 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarFeatures {
    pub hour: u32,
    pub day_of_week: u32,
    pub is_weekend: bool,
}

pub fn calendar_features(ts: NaiveDateTime) -> CalendarFeatures {
    let day_of_week = ts.weekday().num_days_from_monday();
    CalendarFeatures {
        hour: ts.hour(),
        day_of_week,
        is_weekend: day_of_week >= 5,
    }
}

/// `{column}_{category}` with whitespace runs collapsed to `_`.
pub fn indicator_name(column: &str, category: &str) -> String {
    format!(
        "{}_{}",
        column,
        category.split_whitespace().collect::<Vec<_>>().join("_")
    )
}

/// Sorted category list of one field; the first entry is the reference level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoricalField {
    pub column: String,
    pub categories: Vec<String>,
}

impl CategoricalField {
    pub fn new(column: &str, categories: BTreeSet<String>) -> Self {
        Self {
            column: column.to_string(),
            categories: categories.into_iter().collect(),
        }
    }

    pub fn reference(&self) -> Option<&str> {
        self.categories.first().map(String::as_str)
    }

    pub fn indicator_columns(&self) -> Vec<String> {
        self.categories
            .iter()
            .skip(1)
            .map(|c| indicator_name(&self.column, c))
            .collect()
    }

    fn encode_into(&self, value: &str, out: &mut Vec<f64>) -> Result<()> {
        let position = self
            .categories
            .iter()
            .position(|c| c == value)
            .ok_or_else(|| AppError::UnknownCategory {
                column: self.column.clone(),
                value: value.to_string(),
            })?;

        out.extend((1..self.categories.len()).map(|i| if i == position { 1.0 } else { 0.0 }));
        Ok(())
    }
}

/// The column contract of the processed dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub format_version: u32,
    pub revision: u32,
    pub categorical: Vec<CategoricalField>,
    pub columns: Vec<String>,
}

impl FeatureSchema {
    /// Enumerate categories from the merged records.
    pub fn derive(records: &[MergedRecord]) -> Result<Self> {
        let mut sets: [BTreeSet<String>; 3] = Default::default();
        for record in records {
            for (set, column) in sets.iter_mut().zip(CATEGORICAL_COLUMNS) {
                set.insert(categorical_value(record, column).to_string());
            }
        }

        let fields = CATEGORICAL_COLUMNS
            .iter()
            .zip(sets)
            .map(|(column, set)| CategoricalField::new(column, set))
            .collect();

        let schema = Self::from_fields(fields)?;
        debug!(
            "Derived feature schema with {} columns ({} categorical fields)",
            schema.columns.len(),
            schema.categorical.len()
        );
        Ok(schema)
    }

    pub fn from_fields(categorical: Vec<CategoricalField>) -> Result<Self> {
        let columns = layout(&categorical);

        let mut seen = HashSet::new();
        if let Some(duplicate) = columns.iter().find(|c| !seen.insert(c.as_str())) {
            return Err(AppError::InvalidData(format!(
                "categories collapse onto duplicate column name '{}'",
                duplicate
            )));
        }

        Ok(Self {
            format_version: SCHEMA_FORMAT_VERSION,
            revision: 1,
            categorical,
            columns,
        })
    }

    /// Check a loaded schema is internally consistent.
    pub fn validate(&self) -> Result<()> {
        if self.format_version != SCHEMA_FORMAT_VERSION {
            return Err(AppError::InvalidData(format!(
                "unsupported schema format version {} (expected {})",
                self.format_version, SCHEMA_FORMAT_VERSION
            )));
        }

        let fields: Vec<&str> = self.categorical.iter().map(|f| f.column.as_str()).collect();
        if fields != CATEGORICAL_COLUMNS {
            return Err(AppError::InvalidData(format!(
                "schema categorical fields {:?} do not match {:?}",
                fields, CATEGORICAL_COLUMNS
            )));
        }

        for field in &self.categorical {
            if field.categories.windows(2).any(|w| w[0] >= w[1]) {
                return Err(AppError::InvalidData(format!(
                    "categories of '{}' are not sorted and unique",
                    field.column
                )));
            }
        }

        if self.columns != layout(&self.categorical) {
            return Err(AppError::InvalidData(
                "schema column list does not match its categories".to_string(),
            ));
        }

        Ok(())
    }

    /// Feature columns: everything except timestamp and target.
    pub fn feature_columns(&self) -> &[String] {
        &self.columns[2..]
    }

    pub fn feature_index(&self, column: &str) -> Option<usize> {
        self.feature_columns().iter().position(|c| c == column)
    }
}

fn layout(categorical: &[CategoricalField]) -> Vec<String> {
    let mut columns = vec![TIMESTAMP_COLUMN.to_string(), TARGET_COLUMN.to_string()];
    columns.extend(SCALED_COLUMNS.iter().map(|c| c.to_string()));
    columns.extend(CALENDAR_COLUMNS.iter().map(|c| c.to_string()));
    for field in categorical {
        columns.extend(field.indicator_columns());
    }
    columns
}

fn categorical_value<'r>(record: &'r MergedRecord, column: &str) -> &'r str {
    match column {
        "sensor_id" => &record.sensor_id,
        "weather_condition" => &record.weather_condition,
        _ => &record.event_name,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedRecord {
    pub timestamp: NaiveDateTime,
    pub vehicle_count: f64,
    /// Values in `schema.feature_columns()` order
    pub features: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedDataset {
    pub schema: FeatureSchema,
    pub records: Vec<ProcessedRecord>,
}

impl ProcessedDataset {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn feature_columns(&self) -> &[String] {
        self.schema.feature_columns()
    }

    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let index = self.schema.feature_index(name)?;
        Some(self.records.iter().map(|r| r.features[index]).collect())
    }
}

/// Turns merged records into feature vectors under a fixed schema.
pub struct FeatureEngineer<'s> {
    schema: &'s FeatureSchema,
}

impl<'s> FeatureEngineer<'s> {
    pub fn new(schema: &'s FeatureSchema) -> Self {
        Self { schema }
    }

    pub fn encode_record(&self, record: &MergedRecord) -> Result<ProcessedRecord> {
        let calendar = calendar_features(record.timestamp);

        let mut features = Vec::with_capacity(self.schema.feature_columns().len());
        features.extend([
            record.temperature,
            record.rainfall_mm,
            record.avg_gps_speed,
            f64::from(record.attendance),
            f64::from(calendar.hour),
            f64::from(calendar.day_of_week),
            if calendar.is_weekend { 1.0 } else { 0.0 },
        ]);

        for field in &self.schema.categorical {
            field.encode_into(categorical_value(record, &field.column), &mut features)?;
        }

        Ok(ProcessedRecord {
            timestamp: record.timestamp,
            vehicle_count: f64::from(record.vehicle_count),
            features,
        })
    }

    pub fn encode(&self, records: &[MergedRecord]) -> Result<ProcessedDataset> {
        let records = records
            .iter()
            .map(|r| self.encode_record(r))
            .collect::<Result<Vec<_>>>()?;

        info!(
            "Engineered features: {} rows x {} columns",
            records.len(),
            self.schema.columns.len()
        );

        Ok(ProcessedDataset {
            schema: self.schema.clone(),
            records,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ts: &str, sensor: &str, condition: &str, event: &str) -> MergedRecord {
        MergedRecord {
            timestamp: NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S").unwrap(),
            sensor_id: sensor.to_string(),
            vehicle_count: 10,
            temperature: 12.5,
            rainfall_mm: 0.0,
            weather_condition: condition.to_string(),
            avg_gps_speed: 35.0,
            event_name: event.to_string(),
            attendance: 0,
        }
    }

    #[test]
    fn test_calendar_features() {
        // 2024-03-02 is a Saturday
        let ts = NaiveDateTime::parse_from_str("2024-03-02 17:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let cal = calendar_features(ts);
        assert_eq!(cal.hour, 17);
        assert_eq!(cal.day_of_week, 5);
        assert!(cal.is_weekend);

        let monday = NaiveDateTime::parse_from_str("2024-03-04 00:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(calendar_features(monday).day_of_week, 0);
        assert!(!calendar_features(monday).is_weekend);
    }

    #[test]
    fn test_indicator_name_replaces_whitespace() {
        assert_eq!(indicator_name("event_name", "No Event"), "event_name_No_Event");
        assert_eq!(indicator_name("sensor_id", "S1"), "sensor_id_S1");
    }

    #[test]
    fn test_schema_drops_lexicographic_reference() {
        let records = vec![
            record("2024-03-04 08:00:00", "S2", "Rainy", "No Event"),
            record("2024-03-04 08:00:00", "S1", "Clear", "Concert"),
            record("2024-03-04 09:00:00", "S3", "Cloudy", "No Event"),
        ];
        let schema = FeatureSchema::derive(&records).unwrap();

        assert_eq!(schema.categorical[0].reference(), Some("S1"));
        let counts: Vec<usize> = schema
            .categorical
            .iter()
            .map(|f| f.indicator_columns().len())
            .collect();
        assert_eq!(counts, vec![2, 2, 1]);

        let tail: Vec<&str> = schema.columns[9..].iter().map(String::as_str).collect();
        assert_eq!(
            tail,
            vec![
                "sensor_id_S2",
                "sensor_id_S3",
                "weather_condition_Cloudy",
                "weather_condition_Rainy",
                "event_name_No_Event",
            ]
        );
        schema.validate().unwrap();
    }

    #[test]
    fn test_indicators_are_one_hot_minus_reference() {
        let records = vec![
            record("2024-03-04 08:00:00", "S1", "Clear", "No Event"),
            record("2024-03-04 08:00:00", "S2", "Cloudy", "No Event"),
            record("2024-03-04 08:00:00", "S3", "Rainy", "No Event"),
        ];
        let schema = FeatureSchema::derive(&records).unwrap();
        let dataset = FeatureEngineer::new(&schema).encode(&records).unwrap();

        let first = schema.feature_index("sensor_id_S2").unwrap();
        for (i, row) in dataset.records.iter().enumerate() {
            let indicators = &row.features[first..first + 2];
            assert!(indicators.iter().all(|v| *v == 0.0 || *v == 1.0));
            let sum: f64 = indicators.iter().sum();
            // Row 0 is the reference category S1
            assert_eq!(sum, if i == 0 { 0.0 } else { 1.0 });
        }
    }

    #[test]
    fn test_unknown_category_is_rejected() {
        let records = vec![record("2024-03-04 08:00:00", "S1", "Clear", "No Event")];
        let schema = FeatureSchema::derive(&records).unwrap();
        let unseen = record("2024-03-04 09:00:00", "S9", "Clear", "No Event");

        let err = FeatureEngineer::new(&schema).encode(&[unseen]).unwrap_err();
        match err {
            AppError::UnknownCategory { column, value } => {
                assert_eq!(column, "sensor_id");
                assert_eq!(value, "S9");
            }
            other => panic!("expected unknown category, got {:?}", other),
        }
    }

    #[test]
    fn test_colliding_category_names_are_rejected() {
        let records = vec![
            record("2024-03-04 08:00:00", "S1", "Clear", "No Event"),
            record("2024-03-04 08:00:00", "S1", "Clear", "Street Fair"),
            record("2024-03-04 08:00:00", "S1", "Clear", "Street  Fair"),
        ];
        assert!(matches!(
            FeatureSchema::derive(&records),
            Err(AppError::InvalidData(_))
        ));
    }

    #[test]
    fn test_validate_rejects_tampered_columns() {
        let records = vec![
            record("2024-03-04 08:00:00", "S1", "Clear", "No Event"),
            record("2024-03-04 08:00:00", "S2", "Clear", "No Event"),
        ];
        let mut schema = FeatureSchema::derive(&records).unwrap();
        schema.columns.pop();
        assert!(schema.validate().is_err());
    }
}
