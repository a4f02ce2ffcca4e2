//! Aligns sensor, weather, GPS and event records onto the hourly grid.
//!
//! Every join is a left join anchored on the sensor readings, so the output
//! always has exactly one row per input reading, in input order.

use crate::data::models::{
    EventRecord, GpsPing, MergedRecord, RawDatasets, SensorReading, WeatherObservation,
};
use crate::error::{AppError, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

pub const NO_EVENT: &str = "No Event";
pub const UNKNOWN_CONDITION: &str = "Unknown";

/// City-wide mean GPS speed per hour bucket. Hours without pings are absent.
pub type HourlySpeed = BTreeMap<NaiveDateTime, f64>;

/// A sensor reading whose right-hand fields may still be missing.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialRecord {
    pub reading: SensorReading,
    pub temperature: Option<f64>,
    pub rainfall_mm: Option<f64>,
    pub weather_condition: Option<String>,
    pub avg_gps_speed: Option<f64>,
    pub event_name: Option<String>,
    pub attendance: Option<u32>,
}

impl PartialRecord {
    fn new(reading: SensorReading) -> Self {
        Self {
            reading,
            temperature: None,
            rainfall_mm: None,
            weather_condition: None,
            avg_gps_speed: None,
            event_name: None,
            attendance: None,
        }
    }
}

/// Counters describing what the joins had to fill in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JoinSummary {
    pub rows: usize,
    pub weather_unmatched: usize,
    pub speed_hours: usize,
    pub speed_filled_rows: usize,
    pub speed_fill_value: Option<f64>,
    pub event_days: usize,
    pub event_rows: usize,
}

/// Floor a timestamp to the start of its hour.
pub fn hour_bucket(ts: NaiveDateTime) -> NaiveDateTime {
    ts.date().and_time(NaiveTime::MIN) + TimeDelta::hours(i64::from(ts.hour()))
}

/// Mean speed over all vehicles per hour bucket.
pub fn aggregate_speed(pings: &[GpsPing]) -> HourlySpeed {
    let mut sums: BTreeMap<NaiveDateTime, (f64, usize)> = BTreeMap::new();
    for ping in pings {
        let entry = sums.entry(hour_bucket(ping.timestamp)).or_insert((0.0, 0));
        entry.0 += ping.speed_kmh;
        entry.1 += 1;
    }

    sums.into_iter()
        .map(|(hour, (sum, n))| (hour, sum / n as f64))
        .collect()
}

/// Mean of the non-missing hourly averages, used to fill GPS-less hours.
pub fn speed_fill_value(speeds: &HourlySpeed) -> Result<f64> {
    if speeds.is_empty() {
        return Err(AppError::EmptyAggregate(
            "no hourly GPS speed averages available to fill missing hours".to_string(),
        ));
    }
    Ok(speeds.values().sum::<f64>() / speeds.len() as f64)
}

pub fn join_sensor_weather(
    readings: &[SensorReading],
    weather: &[WeatherObservation],
) -> Vec<PartialRecord> {
    let mut by_timestamp: HashMap<NaiveDateTime, &WeatherObservation> = HashMap::new();
    let mut duplicates = 0;
    for obs in weather {
        if by_timestamp.contains_key(&obs.timestamp) {
            duplicates += 1;
        } else {
            by_timestamp.insert(obs.timestamp, obs);
        }
    }
    if duplicates > 0 {
        warn!(
            "Dropped {} duplicate weather observations (first per timestamp kept)",
            duplicates
        );
    }

    readings
        .iter()
        .map(|reading| {
            let mut row = PartialRecord::new(reading.clone());
            if let Some(obs) = by_timestamp.get(&reading.timestamp) {
                row.temperature = Some(obs.temperature);
                row.rainfall_mm = Some(obs.rainfall_mm);
                row.weather_condition = Some(obs.condition.clone());
            }
            row
        })
        .collect()
}

/// Attach the hourly speed and fill gaps with the global fallback.
///
/// Returns the fill value when at least one row needed it.
pub fn join_speed(rows: &mut [PartialRecord], speeds: &HourlySpeed) -> Result<Option<f64>> {
    let mut missing = 0;
    for row in rows.iter_mut() {
        row.avg_gps_speed = speeds.get(&hour_bucket(row.reading.timestamp)).copied();
        if row.avg_gps_speed.is_none() {
            missing += 1;
        }
    }

    if missing == 0 {
        return Ok(None);
    }

    let fill = speed_fill_value(speeds)?;
    for row in rows.iter_mut().filter(|r| r.avg_gps_speed.is_none()) {
        row.avg_gps_speed = Some(fill);
    }
    debug!("Filled {} rows without GPS speed with {:.3}", missing, fill);

    Ok(Some(fill))
}

/// Broadcast each day's event to every sensor; location is ignored.
pub fn join_events(rows: &mut [PartialRecord], events: &[EventRecord]) {
    let mut by_date: HashMap<NaiveDate, &EventRecord> = HashMap::new();
    let mut duplicates = 0;
    for event in events {
        if by_date.contains_key(&event.date) {
            duplicates += 1;
        } else {
            by_date.insert(event.date, event);
        }
    }
    if duplicates > 0 {
        warn!(
            "Dropped {} events sharing a date with an earlier event (first per date kept)",
            duplicates
        );
    }

    for row in rows.iter_mut() {
        match by_date.get(&row.reading.timestamp.date()) {
            Some(event) => {
                row.event_name = Some(event.name.clone());
                row.attendance = Some(event.attendance);
            }
            None => {
                row.event_name = Some(NO_EVENT.to_string());
                row.attendance = Some(0);
            }
        }
    }
}

/// Fill unmatched weather fields: numeric columns with their matched mean,
/// the condition with [`UNKNOWN_CONDITION`].
pub fn fill_weather(rows: &mut [PartialRecord]) -> Result<usize> {
    let unmatched = rows.iter().filter(|r| r.temperature.is_none()).count();
    if unmatched == 0 {
        return Ok(0);
    }

    let temperature = mean_of(rows.iter().filter_map(|r| r.temperature)).ok_or_else(|| {
        AppError::EmptyAggregate("no weather observation matched any sensor reading".to_string())
    })?;
    let rainfall = mean_of(rows.iter().filter_map(|r| r.rainfall_mm)).ok_or_else(|| {
        AppError::EmptyAggregate("no weather observation matched any sensor reading".to_string())
    })?;

    for row in rows.iter_mut() {
        row.temperature.get_or_insert(temperature);
        row.rainfall_mm.get_or_insert(rainfall);
        if row.weather_condition.is_none() {
            row.weather_condition = Some(UNKNOWN_CONDITION.to_string());
        }
    }

    Ok(unmatched)
}

fn mean_of(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

fn finalize(row: PartialRecord) -> Result<MergedRecord> {
    let missing = |field: &str| {
        AppError::InvalidData(format!(
            "merged record for sensor '{}' at {} is missing {}",
            row.reading.sensor_id, row.reading.timestamp, field
        ))
    };

    Ok(MergedRecord {
        temperature: row.temperature.ok_or_else(|| missing("temperature"))?,
        rainfall_mm: row.rainfall_mm.ok_or_else(|| missing("rainfall_mm"))?,
        weather_condition: row
            .weather_condition
            .clone()
            .ok_or_else(|| missing("weather_condition"))?,
        avg_gps_speed: row.avg_gps_speed.ok_or_else(|| missing("avg_gps_speed"))?,
        event_name: row.event_name.clone().ok_or_else(|| missing("event_name"))?,
        attendance: row.attendance.ok_or_else(|| missing("attendance"))?,
        timestamp: row.reading.timestamp,
        sensor_id: row.reading.sensor_id,
        vehicle_count: row.reading.vehicle_count,
    })
}

pub struct TimeSeriesJoiner;

impl TimeSeriesJoiner {
    pub fn join(raw: &RawDatasets) -> Result<(Vec<MergedRecord>, JoinSummary)> {
        let mut summary = JoinSummary {
            rows: raw.sensors.len(),
            ..Default::default()
        };

        let mut rows = join_sensor_weather(&raw.sensors, &raw.weather);

        let speeds = aggregate_speed(&raw.gps);
        summary.speed_hours = speeds.len();
        summary.speed_filled_rows = rows
            .iter()
            .filter(|r| !speeds.contains_key(&hour_bucket(r.reading.timestamp)))
            .count();
        summary.speed_fill_value = join_speed(&mut rows, &speeds)?;

        join_events(&mut rows, &raw.events);
        summary.event_rows = rows
            .iter()
            .filter(|r| r.event_name.as_deref() != Some(NO_EVENT))
            .count();
        summary.event_days = {
            let mut days: Vec<NaiveDate> = rows
                .iter()
                .filter(|r| r.event_name.as_deref() != Some(NO_EVENT))
                .map(|r| r.reading.timestamp.date())
                .collect();
            days.sort();
            days.dedup();
            days.len()
        };

        summary.weather_unmatched = fill_weather(&mut rows)?;

        let merged = rows.into_iter().map(finalize).collect::<Result<Vec<_>>>()?;

        info!(
            "Joined {} sensor readings: {} without weather, {} hours of GPS speed ({} rows filled), {} event days",
            merged.len(),
            summary.weather_unmatched,
            summary.speed_hours,
            summary.speed_filled_rows,
            summary.event_days
        );

        Ok((merged, summary))
    }
}
