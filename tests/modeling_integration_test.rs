use chrono::NaiveDate;
use std::collections::BTreeSet;
use traffic_pipeline::features::{CategoricalField, FeatureSchema, ProcessedDataset, ProcessedRecord};
use traffic_pipeline::ml::forest::ForestConfig;
use traffic_pipeline::ml::{Evaluator, ModelTrainer};
use traffic_pipeline::split::DatasetSplitter;

fn single_category_schema() -> FeatureSchema {
    let one = |v: &str| -> BTreeSet<String> { [v.to_string()].into_iter().collect() };
    FeatureSchema::from_fields(vec![
        CategoricalField::new("sensor_id", one("S1")),
        CategoricalField::new("weather_condition", one("Clear")),
        CategoricalField::new("event_name", one("No Event")),
    ])
    .unwrap()
}

/// `vehicle_count = 3 * temperature + 5`, every other feature constant
fn linear_dataset(n: usize) -> ProcessedDataset {
    let schema = single_category_schema();
    let width = schema.feature_columns().len();
    let start = NaiveDate::from_ymd_opt(2024, 3, 4)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();

    let records = (0..n)
        .map(|i| {
            let temperature = i as f64 * 0.5 - 10.0;
            let mut features = vec![0.0; width];
            features[0] = temperature;
            ProcessedRecord {
                timestamp: start + chrono::Duration::hours(i as i64),
                vehicle_count: 3.0 * temperature + 5.0,
                features,
            }
        })
        .collect();

    ProcessedDataset { schema, records }
}

fn small_forest() -> ForestConfig {
    ForestConfig {
        n_trees: 15,
        seed: 3,
        max_depth: Some(8),
        ..Default::default()
    }
}

/// Test that the baseline recovers an exactly linear target
#[test]
fn test_baseline_fits_degenerate_linear_data() {
    let dataset = linear_dataset(60);
    assert_eq!(dataset.feature_columns().len(), 7);

    let split = DatasetSplitter::split(&dataset, 0.2, 42).unwrap();
    let models = ModelTrainer::new(small_forest()).train(&split).unwrap();
    let report = Evaluator::evaluate(&models, &split, 3).unwrap();

    assert_eq!(report.test_rows, 12);
    assert_eq!(report.train_rows, 48);
    assert!(report.baseline.rmse < 1e-6, "rmse {}", report.baseline.rmse);
    assert!(report.baseline.r2 > 0.999_999, "r2 {}", report.baseline.r2);

    let coefficients = models.baseline.coefficients.as_ref().unwrap();
    assert!((coefficients[0] - 3.0).abs() < 1e-6);
    assert!((models.baseline.intercept.unwrap() - 5.0).abs() < 1e-6);

    // Only temperature varies, so it carries all of the forest's importance
    assert_eq!(report.top_features[0].feature, "temperature");
    assert!((report.top_features[0].importance - 1.0).abs() < 1e-9);
}

/// Test that the forest tracks a step function the baseline cannot
#[test]
fn test_forest_beats_baseline_on_step_target() {
    let mut dataset = linear_dataset(80);
    for record in &mut dataset.records {
        record.vehicle_count = if record.features[0] < 0.0 { 10.0 } else { 90.0 };
    }

    let split = DatasetSplitter::split(&dataset, 0.25, 11).unwrap();
    let models = ModelTrainer::new(small_forest()).train(&split).unwrap();
    let report = Evaluator::evaluate(&models, &split, 5).unwrap();

    assert!(report.ensemble.rmse < report.baseline.rmse);
    assert!(report.ensemble.r2 > 0.9);
}

/// Test that importances sum to one and training is deterministic
#[test]
fn test_forest_importances_are_normalized_and_reproducible() {
    let dataset = linear_dataset(50);
    let split = DatasetSplitter::split(&dataset, 0.2, 42).unwrap();

    let a = ModelTrainer::new(small_forest()).train(&split).unwrap();
    let b = ModelTrainer::new(small_forest()).train(&split).unwrap();

    let total: f64 = a.ensemble.feature_importances().iter().sum();
    assert!((total - 1.0).abs() < 1e-9);
    assert_eq!(a.ensemble.feature_importances(), b.ensemble.feature_importances());
    assert_eq!(
        a.ensemble.predict(&split.test.x).unwrap(),
        b.ensemble.predict(&split.test.x).unwrap()
    );
}
