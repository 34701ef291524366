//! Data points and their line protocol encoding
//!
//! A [`MetricPoint`] is the unit handed to the point buffer and written to the
//! metrics backend. Points are validated once at construction and are
//! immutable afterwards, so every point that reaches a backend is encodable.
//!
//! ## Line Protocol
//!
//! ```text
//! measurement[,tag=value...] field=value[,field=value...] timestamp
//! ```
//!
//! - Integers carry an `i` suffix, unsigned integers a `u` suffix
//! - Strings are double-quoted with `"` and `\` escaped
//! - Measurement names escape `,` and space; tag keys, tag values and field
//!   keys additionally escape `=`

use std::collections::BTreeMap;
use std::fmt::{self, Write};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    UInteger(u64),
    Float(f64),
    Boolean(bool),
    String(String),
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::UInteger(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

/// Errors raised while building a point
#[derive(Debug, Clone, PartialEq)]
pub enum PointError {
    /// Measurement name is empty
    EmptyMeasurement,

    /// A point needs at least one field
    NoFields,

    /// Tag or field key is empty
    EmptyKey,

    /// Float field is NaN or infinite
    NonFiniteFloat(String),

    /// Value cannot be represented as a field
    ValueOutOfRange(String),
}

impl fmt::Display for PointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointError::EmptyMeasurement => write!(f, "measurement name must not be empty"),
            PointError::NoFields => write!(f, "point must have at least one field"),
            PointError::EmptyKey => write!(f, "tag and field keys must not be empty"),
            PointError::NonFiniteFloat(key) => {
                write!(f, "field {key} is not a finite float")
            }
            PointError::ValueOutOfRange(key) => {
                write!(f, "value of field {key} is out of range")
            }
        }
    }
}

impl std::error::Error for PointError {}

/// Timestamp precision used when encoding points
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Precision {
    #[default]
    #[serde(rename = "s")]
    Seconds,
    #[serde(rename = "ms")]
    Milliseconds,
    #[serde(rename = "us")]
    Microseconds,
    #[serde(rename = "ns")]
    Nanoseconds,
}

impl Precision {
    /// Value of the `precision` query parameter of the write API
    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::Seconds => "s",
            Precision::Milliseconds => "ms",
            Precision::Microseconds => "us",
            Precision::Nanoseconds => "ns",
        }
    }

    fn encode(&self, timestamp: &DateTime<Utc>) -> i64 {
        match self {
            Precision::Seconds => timestamp.timestamp(),
            Precision::Milliseconds => timestamp.timestamp_millis(),
            Precision::Microseconds => timestamp.timestamp_micros(),
            // Out of range past year 2262
            Precision::Nanoseconds => timestamp
                .timestamp_nanos_opt()
                .unwrap_or_else(|| timestamp.timestamp_micros().saturating_mul(1000)),
        }
    }
}

/// An immutable time-series data point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    measurement: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, FieldValue>,
    timestamp: DateTime<Utc>,
}

impl MetricPoint {
    /// Build and validate a point
    pub fn new(
        measurement: impl Into<String>,
        tags: BTreeMap<String, String>,
        fields: BTreeMap<String, FieldValue>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, PointError> {
        let measurement = measurement.into();
        if measurement.is_empty() {
            return Err(PointError::EmptyMeasurement);
        }

        if fields.is_empty() {
            return Err(PointError::NoFields);
        }

        if tags.keys().any(String::is_empty) || fields.keys().any(String::is_empty) {
            return Err(PointError::EmptyKey);
        }

        for (key, value) in &fields {
            if let FieldValue::Float(v) = value
                && !v.is_finite()
            {
                return Err(PointError::NonFiniteFloat(key.clone()));
            }
        }

        Ok(Self {
            measurement,
            tags,
            fields,
            timestamp,
        })
    }

    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Encode this point as a single line of line protocol (no trailing newline)
    pub fn to_line_protocol(&self, precision: Precision) -> String {
        let mut line = String::with_capacity(64);
        escape_into(&mut line, &self.measurement, &[',', ' ']);

        // Tags are sorted by key, which is what the server prefers
        for (key, value) in &self.tags {
            if value.is_empty() {
                continue;
            }
            line.push(',');
            escape_into(&mut line, key, &[',', '=', ' ']);
            line.push('=');
            escape_into(&mut line, value, &[',', '=', ' ']);
        }

        line.push(' ');
        for (i, (key, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                line.push(',');
            }
            escape_into(&mut line, key, &[',', '=', ' ']);
            line.push('=');
            write_field_value(&mut line, value);
        }

        let _ = write!(line, " {}", precision.encode(&self.timestamp));
        line
    }
}

/// Encode a batch, one point per line
pub fn encode_batch(points: &[MetricPoint], precision: Precision) -> String {
    points
        .iter()
        .map(|p| p.to_line_protocol(precision))
        .collect::<Vec<_>>()
        .join("\n")
}

fn escape_into(out: &mut String, raw: &str, special: &[char]) {
    for c in raw.chars() {
        if c == '\\' || special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
}

fn write_field_value(out: &mut String, value: &FieldValue) {
    match value {
        FieldValue::Integer(v) => {
            let _ = write!(out, "{v}i");
        }
        FieldValue::UInteger(v) => {
            let _ = write!(out, "{v}u");
        }
        FieldValue::Float(v) => {
            let _ = write!(out, "{v}");
        }
        FieldValue::Boolean(v) => {
            let _ = write!(out, "{v}");
        }
        FieldValue::String(v) => {
            out.push('"');
            escape_into(out, v, &['"']);
            out.push('"');
        }
    }
}
