// Telemetry sample domain model and normalization of raw backend records
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A record exactly as the backend sent it
pub type RawRecord = Map<String, Value>;

/// Signals every machine panel knows about
pub const DEFAULT_SIGNALS: [&str; 7] = [
    "speed",
    "torque",
    "voltage",
    "current",
    "power",
    "temperature",
    "position",
];

/// A signal a panel charts, and the key it travels under on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalSpec {
    pub name: String,
    pub wire_key: String,
}

impl SignalSpec {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            wire_key: name.clone(),
            name,
        }
    }

    pub fn aliased(name: impl Into<String>, wire_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            wire_key: wire_key.into(),
        }
    }
}

pub fn default_signal_specs() -> Vec<SignalSpec> {
    DEFAULT_SIGNALS.iter().map(|s| SignalSpec::new(*s)).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub fields: BTreeMap<String, f64>,
}

impl Sample {
    pub fn new(id: i64, timestamp: DateTime<Utc>, fields: BTreeMap<String, f64>) -> Self {
        Self {
            id,
            timestamp,
            fields,
        }
    }

    /// Build a typed sample from a raw record.
    ///
    /// Returns `None` only when the record has no usable `id`; every other
    /// defect is absorbed (unparseable numbers become `0`, unparseable
    /// timestamps become the Unix epoch).
    pub fn normalize(record: &RawRecord, signals: &[SignalSpec]) -> Option<Self> {
        let id = record.get("id").and_then(parse_id)?;
        let timestamp = record
            .get("timestamp")
            .and_then(Value::as_str)
            .map(parse_timestamp)
            .unwrap_or(DateTime::UNIX_EPOCH);

        let fields = signals
            .iter()
            .map(|signal| {
                let value = record
                    .get(&signal.wire_key)
                    .map(normalize_value)
                    .unwrap_or(0.0);
                (signal.name.clone(), value)
            })
            .collect();

        Some(Self::new(id, timestamp, fields))
    }

    /// Value of a signal; unknown signals read as zero
    pub fn value(&self, signal: &str) -> f64 {
        self.fields.get(signal).copied().unwrap_or(0.0)
    }

    pub fn time_ms(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

/// Coerce a JSON value to a float. Anything that is not a finite number
/// (or a string holding one) reads as zero.
pub fn normalize_value(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// Parse a backend timestamp. Accepts RFC 3339 and the naive
/// `YYYY-MM-DD HH:MM:SS[.fff]` form, which is taken as UTC.
pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return ts.with_timezone(&Utc);
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
        .unwrap_or(DateTime::UNIX_EPOCH)
}

fn parse_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn record(value: Value) -> RawRecord {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_normalize_numeric_strings() {
        let raw = record(json!({
            "id": 42,
            "timestamp": "2025-03-01 10:15:30",
            "speed": "1500.5",
            "torque": 12,
            "position": " 101.25 "
        }));

        let sample = Sample::normalize(&raw, &default_signal_specs()).unwrap();

        assert_eq!(sample.id, 42);
        assert_eq!(
            sample.timestamp,
            Utc.with_ymd_and_hms(2025, 3, 1, 10, 15, 30).unwrap()
        );
        assert_eq!(sample.value("speed"), 1500.5);
        assert_eq!(sample.value("torque"), 12.0);
        assert_eq!(sample.value("position"), 101.25);
        assert_eq!(sample.fields.len(), DEFAULT_SIGNALS.len());
    }

    #[test]
    fn test_normalize_lenient_fields_become_zero() {
        let raw = record(json!({
            "id": "7",
            "timestamp": "2025-03-01T10:15:30Z",
            "speed": "n/a",
            "torque": null,
            "voltage": true,
            "current": "NaN"
        }));

        let sample = Sample::normalize(&raw, &default_signal_specs()).unwrap();

        assert_eq!(sample.id, 7);
        for signal in DEFAULT_SIGNALS {
            assert_eq!(sample.value(signal), 0.0, "{signal} should be zero");
        }
    }

    #[test]
    fn test_normalize_requires_id() {
        let raw = record(json!({ "timestamp": "2025-03-01T10:15:30Z", "speed": 1 }));
        assert!(Sample::normalize(&raw, &default_signal_specs()).is_none());

        let raw = record(json!({ "id": "abc" }));
        assert!(Sample::normalize(&raw, &default_signal_specs()).is_none());
    }

    #[test]
    fn test_normalize_aliased_signal() {
        let raw = record(json!({ "id": 3, "timestamp": "2025-03-01 10:15:30", "data": "4.75" }));
        let signals = vec![SignalSpec::aliased("voltage", "data")];

        let sample = Sample::normalize(&raw, &signals).unwrap();

        assert_eq!(sample.value("voltage"), 4.75);
        assert!(!sample.fields.contains_key("data"));
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2025, 3, 1, 10, 15, 30).unwrap();
        assert_eq!(parse_timestamp("2025-03-01T10:15:30Z"), expected);
        assert_eq!(parse_timestamp("2025-03-01T12:15:30+02:00"), expected);
        assert_eq!(parse_timestamp("2025-03-01 10:15:30"), expected);
        assert_eq!(
            parse_timestamp("2025-03-01 10:15:30.250").timestamp_millis(),
            expected.timestamp_millis() + 250
        );
        assert_eq!(parse_timestamp("yesterday"), DateTime::UNIX_EPOCH);
    }
}
