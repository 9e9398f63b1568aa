//! Time-series store transport.
//!
//! `RecordSink` is the seam between the agent tasks and the store; the
//! production implementation is the InfluxDB 1.x HTTP writer.

pub mod influx;

use anyhow::Result;

use crate::record::MeasurementRecord;

pub use influx::{InfluxConfig, InfluxWriter};

/// Destination for measurement records.
///
/// A write either lands or returns an error; implementations do not retry
/// or buffer.
pub trait RecordSink {
    fn write(&self, records: &[MeasurementRecord]) -> Result<()>;
}

impl<S: RecordSink + ?Sized> RecordSink for &S {
    fn write(&self, records: &[MeasurementRecord]) -> Result<()> {
        (**self).write(records)
    }
}

impl<S: RecordSink + ?Sized> RecordSink for Box<S> {
    fn write(&self, records: &[MeasurementRecord]) -> Result<()> {
        (**self).write(records)
    }
}
