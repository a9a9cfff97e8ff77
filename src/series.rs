//! Time series of one spatial entity and their normalization.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// A single observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub t: DateTime<Utc>,
    pub v: f64,
}

/// Time series of one lake.
///
/// Points are sorted ascending by timestamp and every value is finite.
/// Unknown coordinates are stored as NaN and serialize as `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeries {
    pub id: String,
    pub label: String,
    pub lat: f64,
    pub lon: f64,
    pub points: Vec<Point>,
}

impl TimeSeries {
    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.v).collect()
    }

    pub fn years(&self) -> Vec<i32> {
        self.points.iter().map(|p| p.t.year()).collect()
    }

    /// Create a new series with the same identity but different points.
    pub fn with_points(&self, points: Vec<Point>) -> Self {
        Self {
            id: self.id.clone(),
            label: self.label.clone(),
            lat: self.lat,
            lon: self.lon,
            points,
        }
    }
}

/// Parse a timestamp written as a full instant, a date, a year-month or a bare year.
///
/// Partial dates resolve to the first instant of the period in UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(t.and_utc());
        }
    }
    for fmt in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return d.and_hms_opt(0, 0, 0).map(|t| t.and_utc());
        }
    }

    let (year, month) = match raw.split_once(['-', '/']) {
        Some((year, month)) => (year, month),
        None => (raw, "1"),
    };
    if year.len() != 4 || !year.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if month.is_empty() || month.len() > 2 || !month.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year: i32 = year.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, 1)?
        .and_hms_opt(0, 0, 0)
        .map(|t| t.and_utc())
}

/// January 1st (UTC midnight) of `year`.
pub fn year_start(year: i32) -> Option<DateTime<Utc>> {
    NaiveDate::from_ymd_opt(year, 1, 1)?
        .and_hms_opt(0, 0, 0)
        .map(|t| t.and_utc())
}

/// Coerce a JSON number or numeric string into a finite `f64`.
pub fn coerce_f64(value: Option<&Value>) -> Option<f64> {
    let num = match value? {
        Value::Number(num) => num.as_f64()?,
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            s.parse::<f64>().ok()?
        }
        _ => return None,
    };
    num.is_finite().then_some(num)
}

/// Validate an arbitrary candidate and turn it into a [`TimeSeries`].
///
/// Returns `None` when the candidate has neither a usable id nor label, or
/// when no valid point survives. Invalid points are dropped silently.
pub fn normalize(candidate: &Value) -> Option<TimeSeries> {
    let obj = candidate.as_object()?;

    let (id, label) = match (non_empty_str(obj, "id"), non_empty_str(obj, "label")) {
        (Some(id), Some(label)) => (id, label),
        (Some(id), None) => (id.clone(), id),
        (None, Some(label)) => (label.clone(), label),
        (None, None) => return None,
    };

    let mut points: Vec<Point> = obj
        .get("points")
        .and_then(Value::as_array)
        .map(|pts| pts.iter().filter_map(parse_point).collect())
        .unwrap_or_default();
    if points.is_empty() {
        return None;
    }
    points.sort_by_key(|p| p.t);

    Some(TimeSeries {
        id,
        label,
        lat: coerce_f64(obj.get("lat")).unwrap_or(f64::NAN),
        lon: coerce_f64(obj.get("lon")).unwrap_or(f64::NAN),
        points,
    })
}

fn non_empty_str(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_point(point: &Value) -> Option<Point> {
    let obj = point.as_object()?;
    let t = match obj.get("t")? {
        Value::String(s) => parse_timestamp(s)?,
        Value::Number(ms) => DateTime::from_timestamp_millis(ms.as_f64()? as i64)?,
        _ => return None,
    };
    let v = coerce_f64(obj.get("v"))?;
    Some(Point { t, v })
}
