//! Traffic level bands and per-sensor traffic summaries.

use crate::data::models::MergedRecord;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;

/// A labelled half-open range starting at `lower_bound`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrafficBand {
    pub lower_bound: f64,
    pub label: String,
}

impl TrafficBand {
    pub fn new(lower_bound: f64, label: &str) -> Self {
        Self {
            lower_bound,
            label: label.to_string(),
        }
    }
}

/// Label of the greatest lower bound not above `value`.
///
/// `bands` must be sorted by ascending lower bound; values below the first
/// bound fall into the first band. Returns `None` only for an empty band list.
pub fn classify(bands: &[TrafficBand], value: f64) -> Option<&str> {
    bands
        .iter()
        .rev()
        .find(|band| value >= band.lower_bound)
        .or_else(|| bands.first())
        .map(|band| band.label.as_str())
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensorSummary {
    pub sensor_id: String,
    pub records: usize,
    pub total_vehicles: u64,
    pub mean_vehicles: f64,
    /// Hours per band label, in band order
    pub levels: Vec<(String, usize)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrafficProfile {
    pub sensors: Vec<SensorSummary>,
    pub overall: Vec<(String, usize)>,
}

impl TrafficProfile {
    pub fn build(records: &[MergedRecord], bands: &[TrafficBand]) -> Self {
        let mut groups: BTreeMap<&str, Vec<u32>> = BTreeMap::new();
        for record in records {
            groups
                .entry(record.sensor_id.as_str())
                .or_default()
                .push(record.vehicle_count);
        }

        let sensors = groups
            .into_iter()
            .map(|(sensor_id, counts)| {
                let total: u64 = counts.iter().map(|&c| u64::from(c)).sum();
                SensorSummary {
                    sensor_id: sensor_id.to_string(),
                    records: counts.len(),
                    total_vehicles: total,
                    mean_vehicles: total as f64 / counts.len() as f64,
                    levels: level_counts(bands, counts.iter().map(|&c| f64::from(c))),
                }
            })
            .collect();

        let overall = level_counts(bands, records.iter().map(|r| f64::from(r.vehicle_count)));

        Self { sensors, overall }
    }
}

fn level_counts(bands: &[TrafficBand], values: impl Iterator<Item = f64>) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = bands.iter().map(|b| (b.label.clone(), 0)).collect();
    for value in values {
        if let Some(label) = classify(bands, value) {
            if let Some(slot) = counts.iter_mut().find(|(l, _)| l == label) {
                slot.1 += 1;
            }
        }
    }
    counts
}

impl fmt::Display for TrafficProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Traffic profile by sensor:")?;
        for sensor in &self.sensors {
            let levels: Vec<String> = sensor
                .levels
                .iter()
                .map(|(label, n)| format!("{}={}", label, n))
                .collect();
            writeln!(
                f,
                "  {:<12} hours {:>6}  total {:>9}  mean {:>8.2}  [{}]",
                sensor.sensor_id,
                sensor.records,
                sensor.total_vehicles,
                sensor.mean_vehicles,
                levels.join(", ")
            )?;
        }
        let overall: Vec<String> = self
            .overall
            .iter()
            .map(|(label, n)| format!("{}={}", label, n))
            .collect();
        writeln!(f, "  Overall traffic levels: {}", overall.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn bands() -> Vec<TrafficBand> {
        vec![
            TrafficBand::new(0.0, "Low"),
            TrafficBand::new(50.0, "Medium"),
            TrafficBand::new(100.0, "High"),
        ]
    }

    fn record(sensor: &str, count: u32) -> MergedRecord {
        MergedRecord {
            timestamp: NaiveDateTime::parse_from_str("2024-03-04 08:00:00", "%Y-%m-%d %H:%M:%S")
                .unwrap(),
            sensor_id: sensor.to_string(),
            vehicle_count: count,
            temperature: 10.0,
            rainfall_mm: 0.0,
            weather_condition: "Clear".to_string(),
            avg_gps_speed: 30.0,
            event_name: "No Event".to_string(),
            attendance: 0,
        }
    }

    #[test]
    fn test_classify_boundaries() {
        let bands = bands();
        assert_eq!(classify(&bands, 0.0), Some("Low"));
        assert_eq!(classify(&bands, 49.9), Some("Low"));
        assert_eq!(classify(&bands, 50.0), Some("Medium"));
        assert_eq!(classify(&bands, 100.0), Some("High"));
        assert_eq!(classify(&bands, 1e9), Some("High"));
    }

    #[test]
    fn test_classify_is_total() {
        let bands = vec![TrafficBand::new(10.0, "Quiet"), TrafficBand::new(20.0, "Busy")];
        assert_eq!(classify(&bands, -5.0), Some("Quiet"));
        assert_eq!(classify(&[], 5.0), None);
    }

    #[test]
    fn test_profile_groups_by_sensor() {
        let records = vec![
            record("S2", 120),
            record("S1", 10),
            record("S1", 70),
            record("S2", 30),
        ];
        let profile = TrafficProfile::build(&records, &bands());

        assert_eq!(profile.sensors.len(), 2);
        let s1 = &profile.sensors[0];
        assert_eq!(s1.sensor_id, "S1");
        assert_eq!(s1.records, 2);
        assert_eq!(s1.total_vehicles, 80);
        assert_eq!(s1.mean_vehicles, 40.0);
        assert_eq!(
            s1.levels,
            vec![("Low".to_string(), 1), ("Medium".to_string(), 1), ("High".to_string(), 0)]
        );
        assert_eq!(
            profile.overall,
            vec![("Low".to_string(), 2), ("Medium".to_string(), 1), ("High".to_string(), 1)]
        );
    }
}
