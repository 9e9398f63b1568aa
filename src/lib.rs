//! Colony Watch
//!
//! A small monitoring agent for a plate-growth experiment.
//!
//! # Architecture
//!
//! Two independent tasks run on fixed intervals in a single thread:
//!
//! 1. **Sensor**: query the Tuya device for temperature, humidity and light
//!    intensity, write one record to InfluxDB.
//! 2. **Picture**: grab one frame from the plate camera, save it as a
//!    timestamped PNG, optionally count colonies and write the count.
//!
//! # Module Structure
//!
//! - `colony`: colony counter (sharpen, grayscale, Otsu, outer contours)
//! - `ingest`: single-frame stream sources (stub, HTTP snapshot, file, RTSP)
//! - `frame`: captured frame and its timestamped file name
//! - `sensor`: device status queries and sensor readings
//! - `record`, `transport`: measurement records and the InfluxDB writer
//! - `schedule`, `agent`: interval scheduler and the two tasks
//! - `config`, `logging`: process configuration and logger setup

pub mod agent;
pub mod artifact;
pub mod colony;
pub mod config;
pub mod frame;
pub mod ingest;
pub mod logging;
pub mod record;
pub mod schedule;
pub mod sensor;
pub mod transport;

pub use agent::{Agent, PictureOutcome, PictureTask, SensorTask};
pub use colony::{ColonyCount, ColonyCounter, LaplacianKernel};
pub use config::AgentConfig;
pub use frame::CapturedFrame;
pub use ingest::{capture_frame, StreamConfig, StreamSource};
pub use record::{FieldValue, MeasurementRecord};
pub use schedule::Scheduler;
pub use sensor::{DeviceStatus, SensorReader, SensorReading, TuyaConfig, TuyaDevice};
pub use transport::{InfluxConfig, InfluxWriter, RecordSink};
