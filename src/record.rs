//! Measurement records.
//!
//! A record is built fresh for every cycle: measurement name, timestamp,
//! tags and fields. The timestamp is fixed at construction, and a record
//! with no fields cannot be serialized for the store.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;

pub const DEFAULT_MEASUREMENT: &str = "sensor_data";

/// Timestamp layout used in logs and record dumps.
pub const RECORD_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A single field value.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Text(String),
}

impl FieldValue {
    /// Interpret a JSON value reported by a device. Only numbers qualify.
    pub fn from_json_number(value: &serde_json::Value) -> Option<Self> {
        let number = value.as_number()?;
        if let Some(i) = number.as_i64() {
            Some(FieldValue::Integer(i))
        } else {
            number.as_f64().map(FieldValue::Float)
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    fn write_line_protocol(&self, out: &mut String) {
        match self {
            FieldValue::Integer(i) => {
                let _ = write!(out, "{}i", i);
            }
            FieldValue::Float(f) => {
                let _ = write!(out, "{}", f);
            }
            FieldValue::Boolean(b) => {
                let _ = write!(out, "{}", b);
            }
            FieldValue::Text(s) => {
                out.push('"');
                for c in s.chars() {
                    if c == '"' || c == '\\' {
                        out.push('\\');
                    }
                    out.push(c);
                }
                out.push('"');
            }
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
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

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

/// One timestamped measurement destined for the time-series store.
#[derive(Clone, Debug, Serialize)]
pub struct MeasurementRecord {
    pub measurement: String,
    #[serde(serialize_with = "serialize_time")]
    pub time: DateTime<Utc>,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, FieldValue>,
}

fn serialize_time<S: serde::Serializer>(
    time: &DateTime<Utc>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(&time.format(RECORD_TIME_FORMAT))
}

impl MeasurementRecord {
    pub fn new(measurement: impl Into<String>, time: DateTime<Utc>) -> Self {
        Self {
            measurement: measurement.into(),
            time,
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn time_string(&self) -> String {
        self.time.format(RECORD_TIME_FORMAT).to_string()
    }

    /// Check the record can be forwarded.
    pub fn validate(&self) -> Result<()> {
        if self.measurement.is_empty() {
            return Err(anyhow!("measurement name must not be empty"));
        }
        if self.fields.is_empty() {
            return Err(anyhow!(
                "record {} at {} has no fields",
                self.measurement,
                self.time_string()
            ));
        }
        if self.fields.keys().any(|k| k.is_empty()) || self.tags.keys().any(|k| k.is_empty()) {
            return Err(anyhow!("tag and field keys must not be empty"));
        }
        Ok(())
    }

    /// InfluxDB line protocol with second precision.
    pub fn to_line_protocol(&self) -> Result<String> {
        self.validate()?;

        let mut line = String::new();
        escape_into(&mut line, &self.measurement, &[',', ' ']);
        for (key, value) in &self.tags {
            // Empty tag values are not representable; the store drops them too.
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
            value.write_line_protocol(&mut line);
        }
        let _ = write!(line, " {}", self.time.timestamp());
        Ok(line)
    }
}

fn escape_into(out: &mut String, value: &str, special: &[char]) {
    for c in value.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
}

/// Serialize a batch, one line per record.
pub fn to_line_protocol_batch(records: &[MeasurementRecord]) -> Result<String> {
    if records.is_empty() {
        return Err(anyhow!("nothing to write"));
    }
    let lines = records
        .iter()
        .map(MeasurementRecord::to_line_protocol)
        .collect::<Result<Vec<_>>>()?;
    Ok(lines.join("\n"))
}
