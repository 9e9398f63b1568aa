//! Process-wide logger setup.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// Timestamp layout of log lines.
pub const LOG_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Install `env_logger` (default filter `info`, `RUST_LOG` overrides).
///
/// Lines read `<timestamp> - <LEVEL> - <message>`. With a path they are
/// appended to that file, otherwise they go to stderr.
pub fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let mut builder = builder(log_file)?;
    builder
        .try_init()
        .context("logger already initialised")?;
    Ok(())
}

/// Log a failed `result` at error level with its context chain, then pass
/// it on unchanged.
pub fn log_failure<T>(result: Result<T>) -> Result<T> {
    result.map_err(|err| {
        log::error!("{:#}", err);
        err
    })
}

fn builder(log_file: Option<&Path>) -> Result<env_logger::Builder> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} - {} - {}",
            chrono::Local::now().format(LOG_TIME_FORMAT),
            record.level(),
            record.args()
        )
    });
    if let Some(path) = log_file {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create log directory {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    Ok(builder)
}
