//! Environmental sensor readings.
//!
//! The monitored device reports a map of numbered data points. Three of them
//! are of interest: `"1"` temperature, `"2"` humidity and `"16"` light
//! intensity. A reading fails when the device cannot be reached or when any
//! of the three is absent or not numeric; nothing is defaulted.

pub mod tuya;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::record::{FieldValue, MeasurementRecord};

pub use tuya::{ProtocolVersion, TuyaConfig, TuyaDevice};

pub const TEMPERATURE_DP: &str = "1";
pub const HUMIDITY_DP: &str = "2";
pub const LIGHT_INTENSITY_DP: &str = "16";

/// Data point id to reported value.
pub type DataPoints = BTreeMap<String, serde_json::Value>;

/// A device that can answer a point-in-time status query.
pub trait DeviceStatus {
    fn status(&mut self) -> Result<DataPoints>;
}

impl<D: DeviceStatus + ?Sized> DeviceStatus for Box<D> {
    fn status(&mut self) -> Result<DataPoints> {
        (**self).status()
    }
}

/// One poll of the device.
#[derive(Clone, Debug, PartialEq)]
pub struct SensorReading {
    pub temperature: FieldValue,
    pub humidity: FieldValue,
    pub light_intensity: FieldValue,
}

impl SensorReading {
    pub fn from_data_points(dps: &DataPoints) -> Result<Self> {
        Ok(Self {
            temperature: data_point(dps, TEMPERATURE_DP, "temperature")?,
            humidity: data_point(dps, HUMIDITY_DP, "humidity")?,
            light_intensity: data_point(dps, LIGHT_INTENSITY_DP, "light_intensity")?,
        })
    }

    pub fn fields(&self) -> [(&'static str, &FieldValue); 3] {
        [
            ("temperature", &self.temperature),
            ("humidity", &self.humidity),
            ("light_intensity", &self.light_intensity),
        ]
    }

    /// Fresh record carrying the three readings as fields.
    pub fn to_record(&self, measurement: &str, time: DateTime<Utc>) -> MeasurementRecord {
        self.fields()
            .into_iter()
            .fold(MeasurementRecord::new(measurement, time), |record, (key, value)| {
                record.with_field(key, value.clone())
            })
    }
}

fn data_point(dps: &DataPoints, key: &str, name: &str) -> Result<FieldValue> {
    let value = dps
        .get(key)
        .ok_or_else(|| anyhow!("device status is missing data point {} ({})", key, name))?;
    FieldValue::from_json_number(value).ok_or_else(|| {
        anyhow!(
            "data point {} ({}) is not numeric: {}",
            key,
            name,
            value
        )
    })
}

/// Polls a device and extracts the environmental readings.
pub struct SensorReader<D> {
    device: D,
}

impl<D: DeviceStatus> SensorReader<D> {
    pub fn new(device: D) -> Self {
        Self { device }
    }

    pub fn read(&mut self) -> Result<SensorReading> {
        let dps = self.device.status()?;
        log::debug!("device data points: {:?}", dps);
        SensorReading::from_data_points(&dps)
    }
}
