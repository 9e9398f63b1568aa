//! The agent's two periodic tasks.
//!
//! Each task owns its collaborators and builds a fresh record per run. A run
//! either completes or returns the first error; the scheduler logs it and
//! keeps going.

use anyhow::{Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};

use crate::colony::ColonyCounter;
use crate::config::AgentConfig;
use crate::ingest::{capture_frame, StreamConfig};
use crate::record::MeasurementRecord;
use crate::sensor::{DeviceStatus, SensorReader, TuyaDevice};
use crate::transport::{InfluxWriter, RecordSink};

pub const SENSOR_TASK: &str = "sensor";
pub const PICTURE_TASK: &str = "picture";

/// Reads the environmental sensor and forwards one record.
pub struct SensorTask<D, S> {
    reader: SensorReader<D>,
    sink: S,
    measurement: String,
}

impl<D: DeviceStatus, S: RecordSink> SensorTask<D, S> {
    pub fn new(device: D, sink: S, measurement: impl Into<String>) -> Self {
        Self {
            reader: SensorReader::new(device),
            sink,
            measurement: measurement.into(),
        }
    }

    pub fn run(&mut self) -> Result<MeasurementRecord> {
        let reading = self.reader.read().context("sensor read failed")?;
        let record = reading.to_record(&self.measurement, Utc::now());
        self.sink
            .write(std::slice::from_ref(&record))
            .context("sensor record write failed")?;
        log::info!(
            "sensor: temperature={:?} humidity={:?} light_intensity={:?}",
            reading.temperature,
            reading.humidity,
            reading.light_intensity
        );
        Ok(record)
    }
}

/// What one picture run produced.
#[derive(Clone, Debug)]
pub struct PictureOutcome {
    pub frame_path: PathBuf,
    pub count: Option<usize>,
}

/// Captures and saves a frame, optionally counting colonies in it.
pub struct PictureTask<S> {
    stream: StreamConfig,
    work_dir: PathBuf,
    counter: Option<ColonyCounter>,
    sink: S,
    measurement: String,
}

impl<S: RecordSink> PictureTask<S> {
    pub fn new(
        stream: StreamConfig,
        work_dir: impl Into<PathBuf>,
        sink: S,
        measurement: impl Into<String>,
    ) -> Self {
        Self {
            stream,
            work_dir: work_dir.into(),
            counter: None,
            sink,
            measurement: measurement.into(),
        }
    }

    /// Count colonies after every capture and record the count.
    pub fn with_counter(mut self, counter: ColonyCounter) -> Self {
        self.counter = Some(counter);
        self
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn run(&mut self) -> Result<PictureOutcome> {
        let frame = capture_frame(&self.stream)?;
        let frame_path = frame
            .save(&self.work_dir)
            .context("failed to save captured frame")?;
        log::info!("picture: saved {}", frame_path.display());

        let Some(counter) = &self.counter else {
            return Ok(PictureOutcome {
                frame_path,
                count: None,
            });
        };

        let counted = counter.count_image(&frame.stem(), frame.image())?;
        let record = MeasurementRecord::new(self.measurement.as_str(), Utc::now())
            .with_tag("file_name", frame_path.to_string_lossy())
            .with_field("counter", counted.count as i64);
        self.sink
            .write(std::slice::from_ref(&record))
            .context("colony count write failed")?;

        Ok(PictureOutcome {
            frame_path,
            count: Some(counted.count),
        })
    }
}

/// Tasks wired to the production device and store.
pub struct Agent {
    pub sensor: SensorTask<TuyaDevice, InfluxWriter>,
    pub picture: PictureTask<InfluxWriter>,
}

impl Agent {
    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        let writer = InfluxWriter::new(config.influx.clone())?;
        let device = TuyaDevice::new(config.device.clone())?;

        let sensor = SensorTask::new(device, writer.clone(), config.measurement.as_str());
        let mut picture = PictureTask::new(
            config.stream.clone(),
            config.work_dir.clone(),
            writer,
            config.measurement.as_str(),
        );
        if config.count_on_capture {
            picture = picture
                .with_counter(ColonyCounter::new(&config.work_dir).with_kernel(config.laplacian));
        }
        Ok(Self { sensor, picture })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FieldValue;
    use crate::sensor::DataPoints;
    use anyhow::anyhow;
    use std::cell::RefCell;
    use std::time::Duration;

    #[derive(Default)]
    struct MemorySink {
        records: RefCell<Vec<MeasurementRecord>>,
        fail: bool,
    }

    impl RecordSink for MemorySink {
        fn write(&self, records: &[MeasurementRecord]) -> Result<()> {
            if self.fail {
                return Err(anyhow!("store unreachable"));
            }
            for record in records {
                record.to_line_protocol()?;
            }
            self.records.borrow_mut().extend_from_slice(records);
            Ok(())
        }
    }

    struct FakeDevice(Option<DataPoints>);

    impl DeviceStatus for FakeDevice {
        fn status(&mut self) -> Result<DataPoints> {
            self.0.clone().ok_or_else(|| anyhow!("device timed out"))
        }
    }

    fn dps() -> DataPoints {
        [("1", 225), ("2", 40), ("16", 310)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), serde_json::json!(v)))
            .collect()
    }

    fn stub(colonies: u32) -> StreamConfig {
        StreamConfig {
            url: format!("stub://plate?colonies={}&width=160&height=120", colonies),
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn sensor_task_writes_fresh_record() -> Result<()> {
        let sink = MemorySink::default();
        let mut task = SensorTask::new(FakeDevice(Some(dps())), &sink, "sensor_data");
        task.run()?;
        task.run()?;

        let records = sink.records.borrow();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].fields.len(), 3);
        assert_eq!(records[0].fields["temperature"], FieldValue::Integer(225));
        assert!(records[0].tags.is_empty());
        Ok(())
    }

    #[test]
    fn sensor_failure_writes_nothing() {
        let sink = MemorySink::default();
        let mut task = SensorTask::new(FakeDevice(None), &sink, "sensor_data");
        let err = task.run().unwrap_err();
        assert!(format!("{:#}", err).contains("device timed out"));
        assert!(sink.records.borrow().is_empty());
    }

    #[test]
    fn store_failure_propagates() {
        let sink = MemorySink {
            fail: true,
            ..MemorySink::default()
        };
        let mut task = SensorTask::new(FakeDevice(Some(dps())), &sink, "sensor_data");
        assert!(task.run().is_err());
    }

    #[test]
    fn picture_without_counter_only_saves() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let sink = MemorySink::default();
        let mut task = PictureTask::new(stub(2), dir.path(), &sink, "sensor_data");
        let outcome = task.run()?;

        assert!(outcome.frame_path.exists());
        assert_eq!(outcome.count, None);
        assert!(sink.records.borrow().is_empty());
        let pngs = std::fs::read_dir(dir.path())?.count();
        assert_eq!(pngs, 1);
        Ok(())
    }

    #[test]
    fn picture_with_counter_records_count() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let sink = MemorySink::default();
        let mut task = PictureTask::new(stub(5), dir.path(), &sink, "sensor_data")
            .with_counter(ColonyCounter::new(dir.path()));
        let outcome = task.run()?;
        assert_eq!(outcome.count, Some(5));

        let records = sink.records.borrow();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].fields["counter"], FieldValue::Integer(5));
        assert_eq!(
            records[0].tags["file_name"],
            outcome.frame_path.to_string_lossy()
        );

        let stem = outcome
            .frame_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap()
            .to_string();
        for suffix in ["sharpened", "gray", "5"] {
            assert!(dir.path().join(format!("{}-{}.png", stem, suffix)).exists());
        }
        Ok(())
    }

    #[test]
    fn capture_failure_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let sink = MemorySink::default();
        let stream = StreamConfig {
            url: "stub://plate?colonies=lots".to_string(),
            timeout: Duration::from_secs(1),
        };
        let mut task = PictureTask::new(stream, dir.path(), &sink, "sensor_data");
        assert!(task.run().is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
