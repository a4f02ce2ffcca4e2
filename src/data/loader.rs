use crate::config::DataConfig;
use crate::data::models::{EventRecord, GpsPing, RawDatasets, SensorReading, WeatherObservation};
use crate::error::{AppError, Result};
use chrono::{NaiveDate, NaiveDateTime};
use csv::StringRecord;
use std::path::Path;
use tracing::{debug, info};

pub const SENSOR_COLUMNS: [&str; 3] = ["timestamp", "sensor_id", "vehicle_count"];
pub const WEATHER_COLUMNS: [&str; 4] = ["timestamp", "temperature", "rainfall_mm", "weather_condition"];
pub const GPS_COLUMNS: [&str; 5] = ["timestamp", "vehicle_id", "lat", "lon", "speed_kmh"];
pub const EVENT_COLUMNS: [&str; 4] = ["date", "event_name", "location", "attendance"];

/// Alternative header spellings, matched after lowercasing.
const HEADER_ALIASES: [(&str, &str); 2] = [("latitude", "lat"), ("longitude", "lon")];

const TIMESTAMP_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"];
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Reads the four raw CSV datasets into typed collections.
///
/// Headers are checked before any row is read, ignoring case, so
/// `Timestamp,Sensor_ID,Vehicle_Count` matches; the first malformed value
/// aborts the whole file.
pub struct DataLoader;

impl DataLoader {
    pub fn load_all(paths: &DataConfig) -> Result<RawDatasets> {
        let datasets = RawDatasets {
            sensors: Self::parse_sensors(&read_file(&paths.sensors)?)?,
            weather: Self::parse_weather(&read_file(&paths.weather)?)?,
            gps: Self::parse_gps(&read_file(&paths.gps)?)?,
            events: Self::parse_events(&read_file(&paths.events)?)?,
        };

        info!(
            "Loaded raw datasets: {} sensor readings, {} weather observations, {} GPS pings, {} events",
            datasets.sensors.len(),
            datasets.weather.len(),
            datasets.gps.len(),
            datasets.events.len()
        );

        Ok(datasets)
    }

    pub fn parse_sensors(content: &str) -> Result<Vec<SensorReading>> {
        let table = Table::open("sensors", content, &SENSOR_COLUMNS)?;
        table.rows(|row| {
            Ok(SensorReading {
                timestamp: row.timestamp(0)?,
                sensor_id: row.text(1)?,
                vehicle_count: row.count(2)?,
            })
        })
    }

    pub fn parse_weather(content: &str) -> Result<Vec<WeatherObservation>> {
        let table = Table::open("weather", content, &WEATHER_COLUMNS)?;
        table.rows(|row| {
            Ok(WeatherObservation {
                timestamp: row.timestamp(0)?,
                temperature: row.float(1)?,
                rainfall_mm: row.non_negative(2)?,
                condition: row.text(3)?,
            })
        })
    }

    pub fn parse_gps(content: &str) -> Result<Vec<GpsPing>> {
        let table = Table::open("gps", content, &GPS_COLUMNS)?;
        table.rows(|row| {
            Ok(GpsPing {
                timestamp: row.timestamp(0)?,
                vehicle_id: row.text(1)?,
                lat: row.float(2)?,
                lon: row.float(3)?,
                speed_kmh: row.non_negative(4)?,
            })
        })
    }

    pub fn parse_events(content: &str) -> Result<Vec<EventRecord>> {
        let table = Table::open("events", content, &EVENT_COLUMNS)?;
        table.rows(|row| {
            Ok(EventRecord {
                date: row.date(0)?,
                name: row.text(1)?,
                location: row.raw(2).to_string(),
                attendance: row.count(3)?,
            })
        })
    }
}

fn read_file(path: &Path) -> Result<String> {
    debug!("Reading {}", path.display());
    std::fs::read_to_string(path).map_err(|e| {
        AppError::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    })
}

/// A parsed CSV body with the positions of the required columns resolved.
struct Table<'a> {
    dataset: &'static str,
    required: &'a [&'a str],
    positions: Vec<usize>,
    records: Vec<StringRecord>,
}

impl<'a> Table<'a> {
    fn open(dataset: &'static str, content: &str, required: &'a [&'a str]) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(false)
            .from_reader(content.as_bytes());

        let headers = reader.headers()?.clone();
        let positions = required
            .iter()
            .map(|column| {
                headers
                    .iter()
                    .position(|h| header_matches(h, column))
                    .ok_or_else(|| AppError::Schema {
                        dataset: dataset.to_string(),
                        column: column.to_string(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let records = reader
            .records()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::Parse(format!("{}: malformed CSV: {}", dataset, e)))?;

        Ok(Self {
            dataset,
            required,
            positions,
            records,
        })
    }

    fn rows<T, F>(&self, mut parse: F) -> Result<Vec<T>>
    where
        F: FnMut(&Row<'_>) -> Result<T>,
    {
        let parsed = self
            .records
            .iter()
            .map(|record| {
                parse(&Row {
                    table: self,
                    record,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!("Parsed {} rows from {}", parsed.len(), self.dataset);
        Ok(parsed)
    }
}

struct Row<'t> {
    table: &'t Table<'t>,
    record: &'t StringRecord,
}

impl Row<'_> {
    fn raw(&self, column: usize) -> &str {
        self.record
            .get(self.table.positions[column])
            .unwrap_or("")
    }

    fn error(&self, column: usize, message: String) -> AppError {
        let line = self.record.position().map(|p| p.line()).unwrap_or(0);
        AppError::Parse(format!(
            "{} line {}, column '{}': {}",
            self.table.dataset, line, self.table.required[column], message
        ))
    }

    fn text(&self, column: usize) -> Result<String> {
        let value = self.raw(column);
        if value.is_empty() {
            return Err(self.error(column, "empty value".to_string()));
        }
        Ok(value.to_string())
    }

    fn timestamp(&self, column: usize) -> Result<NaiveDateTime> {
        let value = self.raw(column);
        parse_timestamp(value)
            .ok_or_else(|| self.error(column, format!("invalid timestamp '{}'", value)))
    }

    fn date(&self, column: usize) -> Result<NaiveDate> {
        let value = self.raw(column);
        NaiveDate::parse_from_str(value, DATE_FORMAT)
            .map_err(|e| self.error(column, format!("invalid date '{}': {}", value, e)))
    }

    fn float(&self, column: usize) -> Result<f64> {
        let value = self.raw(column);
        let parsed = value
            .parse::<f64>()
            .map_err(|e| self.error(column, format!("invalid number '{}': {}", value, e)))?;
        if !parsed.is_finite() {
            return Err(self.error(column, format!("non-finite number '{}'", value)));
        }
        Ok(parsed)
    }

    fn non_negative(&self, column: usize) -> Result<f64> {
        let parsed = self.float(column)?;
        if parsed < 0.0 {
            return Err(self.error(column, format!("negative value {}", parsed)));
        }
        Ok(parsed)
    }

    fn count(&self, column: usize) -> Result<u32> {
        let value = self.raw(column);
        // Integral floats such as "12.0" are accepted
        match value.parse::<u32>() {
            Ok(n) => Ok(n),
            Err(_) => {
                let parsed = self.non_negative(column)?;
                if parsed.fract() != 0.0 || parsed > u32::MAX as f64 {
                    return Err(self.error(column, format!("invalid count '{}'", value)));
                }
                Ok(parsed as u32)
            }
        }
    }
}

fn header_matches(header: &str, column: &str) -> bool {
    let header = header.trim().to_ascii_lowercase();
    header == column
        || HEADER_ALIASES
            .iter()
            .any(|(alias, canonical)| *canonical == column && header == *alias)
}

pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
}
