use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Parse a JFR `startTime`-style value into UTC.
///
/// A trailing literal `Z` is read as `+00:00`. Strings without an offset are
/// taken as UTC; seconds may be omitted, and a bare date means midnight.
/// Anything else yields `None`.
pub fn parse_start_time(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let normalized = match s.strip_suffix('Z').or_else(|| s.strip_suffix('z')) {
        Some(head) => format!("{head}+00:00"),
        None => s.to_string(),
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(dt.with_timezone(&Utc));
    }
    let offset_fmts = [
        "%Y-%m-%dT%H:%M:%S%.f%:z",
        "%Y-%m-%dT%H:%M:%S%:z",
        "%Y-%m-%d %H:%M:%S%.f%:z",
        "%Y-%m-%d %H:%M:%S%:z",
        "%Y-%m-%dT%H:%M:%S%.f%z",
        "%Y-%m-%dT%H:%M:%S%z",
        "%Y-%m-%dT%H:%M%:z",
        "%Y-%m-%d %H:%M%:z",
    ];
    for f in offset_fmts.iter() {
        if let Ok(dt) = DateTime::parse_from_str(&normalized, f) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    let naive_fmts = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    for f in naive_fmts.iter() {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, f) {
            return Some(Utc.from_utc_datetime(&ndt));
        }
    }
    // date only: midnight UTC
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| Utc.from_utc_datetime(&ndt))
}

/// Same as [`parse_start_time`] but over a JSON value; non-strings are ignored.
pub fn parse_time_value(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::String(s) => parse_start_time(s),
        _ => None,
    }
}

static RE_ISO_SECONDS: Lazy<Regex> = Lazy::new(|| {
    // PT0.0153S, PT12S, PT1M3.5S
    Regex::new(r"^PT(?:(\d+(?:\.\d+)?)H)?(?:(\d+(?:\.\d+)?)M)?(?:(\d+(?:\.\d+)?)S)?$").unwrap()
});

/// Read a pause value in milliseconds.
///
/// Accepts JSON numbers, numeric strings and ISO-8601 `PT..S` durations.
/// Negative, non-finite and unparseable values yield `None`.
pub fn parse_pause_millis(v: &Value) -> Option<f64> {
    let ms = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => parse_pause_str(s.trim())?,
        _ => return None,
    };
    if ms.is_finite() && ms >= 0.0 {
        Some(ms)
    } else {
        None
    }
}

fn parse_pause_str(s: &str) -> Option<f64> {
    if let Ok(n) = s.parse::<f64>() {
        return Some(n);
    }
    let caps = RE_ISO_SECONDS.captures(s)?;
    if caps.get(1).is_none() && caps.get(2).is_none() && caps.get(3).is_none() {
        return None;
    }
    let part = |i: usize| -> f64 {
        caps.get(i)
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .unwrap_or(0.0)
    };
    let secs = part(1) * 3600.0 + part(2) * 60.0 + part(3);
    Some(secs * 1000.0)
}
