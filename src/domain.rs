use std::fmt;
use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::TempoError;

pub const DEFAULT_HALF_WIDTH_LAT: f64 = 5.0;
pub const DEFAULT_HALF_WIDTH_LON: f64 = 6.0;

static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("static date pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.4}, {:.4})", self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub half_width_lat: f64,
    pub half_width_lon: f64,
}

impl Default for Window {
    fn default() -> Self {
        Self {
            half_width_lat: DEFAULT_HALF_WIDTH_LAT,
            half_width_lon: DEFAULT_HALF_WIDTH_LON,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub center: GeoPoint,
    pub window: Window,
}

impl BoundingBox {
    pub fn new(center: GeoPoint, window: Window) -> Self {
        Self { center, window }
    }

    pub fn lat_bounds(&self) -> (f64, f64) {
        (
            self.center.latitude - self.window.half_width_lat,
            self.center.latitude + self.window.half_width_lat,
        )
    }

    pub fn lon_bounds(&self) -> (f64, f64) {
        (
            self.center.longitude - self.window.half_width_lon,
            self.center.longitude + self.window.half_width_lon,
        )
    }

    pub fn contains_lat(&self, latitude: f64) -> bool {
        let (low, high) = self.lat_bounds();
        low < latitude && latitude < high
    }

    pub fn contains_lon(&self, longitude: f64) -> bool {
        let (low, high) = self.lon_bounds();
        low < longitude && longitude < high
    }

    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        self.contains_lat(latitude) && self.contains_lon(longitude)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub place: String,
    pub start_date: String,
    pub end_date: String,
}

impl Query {
    pub fn new(
        place: impl Into<String>,
        start_date: impl Into<String>,
        end_date: impl Into<String>,
    ) -> Self {
        Self {
            place: place.into(),
            start_date: start_date.into(),
            end_date: end_date.into(),
        }
    }

    pub fn time_range(&self) -> Result<TimeRange, TempoError> {
        TimeRange::from_dates(&self.start_date, &self.end_date)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeRange {
    pub fn from_dates(start: &str, end: &str) -> Result<Self, TempoError> {
        let start = parse_date(start)?;
        let end = parse_date(end)?;
        let end_of_day = NaiveTime::from_hms_opt(23, 59, 59)
            .ok_or_else(|| TempoError::InvalidDate("23:59:59".to_string()))?;
        Ok(Self {
            start: start.and_time(NaiveTime::MIN),
            end: end.and_time(end_of_day),
        })
    }

    pub fn to_temporal_param(&self) -> String {
        format!(
            "{},{}",
            self.start.format("%Y-%m-%dT%H:%M:%SZ"),
            self.end.format("%Y-%m-%dT%H:%M:%SZ")
        )
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} .. {}",
            self.start.format("%Y-%m-%d %H:%M:%S"),
            self.end.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate, TempoError> {
    if !DATE_RE.is_match(value) {
        return Err(TempoError::InvalidDate(value.to_string()));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| TempoError::InvalidDate(value.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub latitude: f64,
    pub longitude: f64,
    pub no2_total_column: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub short_name: String,
    pub version: String,
}

impl Default for Collection {
    fn default() -> Self {
        Self {
            short_name: "TEMPO_NO2_L3".to_string(),
            version: "V03".to_string(),
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.short_name, self.version)
    }
}
