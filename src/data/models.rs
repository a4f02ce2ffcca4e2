use chrono::{NaiveDate, NaiveDateTime};

#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub timestamp: NaiveDateTime,
    pub sensor_id: String,
    pub vehicle_count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeatherObservation {
    pub timestamp: NaiveDateTime,
    pub temperature: f64,
    pub rainfall_mm: f64,
    pub condition: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GpsPing {
    pub timestamp: NaiveDateTime,
    pub vehicle_id: String,
    pub lat: f64,
    pub lon: f64,
    pub speed_kmh: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub date: NaiveDate,
    pub name: String,
    pub location: String,
    pub attendance: u32,
}

/// The four raw datasets of one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct RawDatasets {
    pub sensors: Vec<SensorReading>,
    pub weather: Vec<WeatherObservation>,
    pub gps: Vec<GpsPing>,
    pub events: Vec<EventRecord>,
}

/// One sensor reading joined with its weather, city-wide speed and event.
///
/// Column-complete: every gap has been filled by the joiner.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRecord {
    pub timestamp: NaiveDateTime,
    pub sensor_id: String,
    pub vehicle_count: u32,

    pub temperature: f64,
    pub rainfall_mm: f64,
    pub weather_condition: String,

    pub avg_gps_speed: f64,

    pub event_name: String,
    pub attendance: u32,
}
