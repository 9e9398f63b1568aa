//! colonyd - colony watch agent
//!
//! This daemon:
//! 1. Polls the Tuya sensor and writes temperature, humidity and light
//!    intensity to InfluxDB
//! 2. Captures a still from the plate camera and saves it to the work dir
//! 3. Optionally counts colonies in each capture and records the count
//!
//! Configuration comes from the environment (see `AgentConfig::load`).

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use colony_watch::agent::{Agent, PICTURE_TASK, SENSOR_TASK};
use colony_watch::config::AgentConfig;
use colony_watch::logging::{init_logging, log_failure};
use colony_watch::schedule::Scheduler;

const TICK: Duration = Duration::from_secs(1);

fn main() -> Result<()> {
    let config = AgentConfig::load()?;
    init_logging(Some(&config.log_file))?;

    log::info!(
        "colonyd {} starting: sensor every {:?}, picture every {:?}, counting {}",
        env!("CARGO_PKG_VERSION"),
        config.schedule.sensor_interval,
        config.schedule.picture_interval,
        if config.count_on_capture { "on" } else { "off" }
    );

    log_failure(run(&config))
}

/// Everything after the logger is up, so setup failures land in the log.
fn run(config: &AgentConfig) -> Result<()> {
    let Agent {
        mut sensor,
        mut picture,
    } = Agent::from_config(config)?;

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
            .context("install shutdown handler")?;
    }

    let mut scheduler = Scheduler::new();
    scheduler.every(SENSOR_TASK, config.schedule.sensor_interval, || {
        sensor.run().map(|_| ())
    })?;
    scheduler.every(PICTURE_TASK, config.schedule.picture_interval, || {
        picture.run().map(|_| ())
    })?;

    // First observation right away, then on schedule.
    scheduler.run_all();
    while running.load(Ordering::SeqCst) {
        scheduler.run_pending(Instant::now());
        std::thread::sleep(TICK);
    }

    log::info!("shutdown signal received, colonyd stopping");
    Ok(())
}
