//! Frame ingestion.
//!
//! One still frame per capture, chosen by the stream URL scheme:
//! - `stub://plate?colonies=N` synthetic plate (tests, demos)
//! - `http(s)://` snapshot endpoint returning a JPEG or PNG
//! - `file://` still image on disk
//! - `rtsp://` camera stream (feature: rtsp-gstreamer)
//!
//! The source is opened for the capture and released right after; no
//! connection is held between picture runs.

pub mod normalize;
pub mod snapshot;
pub mod stream;
pub mod synthetic;

use anyhow::{Context, Result};
use std::time::Duration;

use crate::frame::CapturedFrame;

pub use normalize::{normalize_to_rgb, PixelFormat};
pub use stream::StreamSource;

/// Where and how to grab frames.
#[derive(Clone, Debug)]
pub struct StreamConfig {
    pub url: String,
    /// Bound on a single frame read.
    pub timeout: Duration,
}

/// Open the stream, read exactly one frame, release the stream.
pub fn capture_frame(config: &StreamConfig) -> Result<CapturedFrame> {
    let mut source = StreamSource::open(config)?;
    let image = source
        .grab()
        .with_context(|| format!("no frame captured from {}", config.url))?;
    drop(source);
    Ok(CapturedFrame::now(image))
}
