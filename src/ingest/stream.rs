//! Single-frame stream source.
//!
//! The picture task needs one still per run, not a continuous feed, so a
//! `StreamSource` is opened, asked for one frame, and dropped. Dropping it
//! releases the underlying stream.

#[cfg(feature = "rtsp-gstreamer")]
use super::normalize::PixelFormat;
#[cfg(feature = "rtsp-gstreamer")]
use anyhow::Context;
use anyhow::{anyhow, Result};
use image::RgbImage;
use std::path::PathBuf;
use url::Url;

use super::snapshot::{fetch_snapshot, load_file};
use super::synthetic::PlateLayout;
use super::StreamConfig;

pub struct StreamSource {
    backend: StreamBackend,
    url: String,
}

enum StreamBackend {
    Synthetic(PlateLayout),
    Snapshot(StreamConfig),
    File(PathBuf),
    #[cfg(feature = "rtsp-gstreamer")]
    Gstreamer(GstreamerStream),
}

impl StreamSource {
    /// Pick a backend from the URL scheme and open it.
    pub fn open(config: &StreamConfig) -> Result<Self> {
        let url = Url::parse(&config.url)
            .map_err(|e| anyhow!("invalid stream url {:?}: {}", config.url, e))?;
        let backend = match url.scheme() {
            "stub" => StreamBackend::Synthetic(PlateLayout::from_url(&url)?),
            "http" | "https" => StreamBackend::Snapshot(config.clone()),
            "file" => StreamBackend::File(
                url.to_file_path()
                    .map_err(|_| anyhow!("invalid file url {:?}", config.url))?,
            ),
            "rtsp" | "rtsps" => open_rtsp(config)?,
            other => return Err(anyhow!("unsupported stream scheme {:?}", other)),
        };
        log::debug!("stream {} opened", config.url);
        Ok(Self {
            backend,
            url: config.url.clone(),
        })
    }

    /// Read the next frame.
    pub fn grab(&mut self) -> Result<RgbImage> {
        let image = match &mut self.backend {
            StreamBackend::Synthetic(plate) => plate.render()?,
            StreamBackend::Snapshot(config) => fetch_snapshot(&config.url, config.timeout)?,
            StreamBackend::File(path) => load_file(path)?,
            #[cfg(feature = "rtsp-gstreamer")]
            StreamBackend::Gstreamer(stream) => stream.grab()?,
        };
        if image.width() == 0 || image.height() == 0 {
            return Err(anyhow!("stream {} returned an empty frame", self.url));
        }
        Ok(image)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[cfg(feature = "rtsp-gstreamer")]
fn open_rtsp(config: &StreamConfig) -> Result<StreamBackend> {
    Ok(StreamBackend::Gstreamer(GstreamerStream::open(config)?))
}

#[cfg(not(feature = "rtsp-gstreamer"))]
fn open_rtsp(_config: &StreamConfig) -> Result<StreamBackend> {
    anyhow::bail!("RTSP requires the rtsp-gstreamer feature")
}

// ----------------------------------------------------------------------------
// RTSP via GStreamer
// ----------------------------------------------------------------------------

#[cfg(feature = "rtsp-gstreamer")]
struct GstreamerStream {
    pipeline: gstreamer::Pipeline,
    appsink: gstreamer_app::AppSink,
    timeout: std::time::Duration,
}

#[cfg(feature = "rtsp-gstreamer")]
impl GstreamerStream {
    fn open(config: &StreamConfig) -> Result<Self> {
        use gstreamer::prelude::*;

        gstreamer::init().context("initialize gstreamer")?;
        let description = format!(
            "rtspsrc location={} latency=0 ! decodebin ! videoconvert ! {} ! \
             appsink name=appsink sync=false max-buffers=1 drop=true",
            config.url,
            PixelFormat::raw_caps()
        );
        let pipeline = gstreamer::parse::launch(&description)
            .context("build RTSP pipeline")?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| anyhow!("RTSP pipeline is not a Pipeline"))?;
        let appsink = pipeline
            .by_name("appsink")
            .context("appsink element missing from pipeline")?
            .downcast::<gstreamer_app::AppSink>()
            .map_err(|_| anyhow!("appsink element has unexpected type"))?;

        pipeline
            .set_state(gstreamer::State::Playing)
            .context("set RTSP pipeline to Playing")?;
        log::info!("connected to {}", config.url);

        Ok(Self {
            pipeline,
            appsink,
            timeout: config.timeout,
        })
    }

    fn grab(&mut self) -> Result<RgbImage> {
        let timeout = gstreamer::ClockTime::from_mseconds(self.timeout.as_millis() as u64);
        let sample = self
            .appsink
            .try_pull_sample(timeout)
            .ok_or_else(|| anyhow!("no frame from RTSP stream within {:?}", self.timeout))?;
        sample_to_image(&sample)
    }
}

#[cfg(feature = "rtsp-gstreamer")]
impl Drop for GstreamerStream {
    fn drop(&mut self) {
        use gstreamer::prelude::*;

        if let Err(err) = self.pipeline.set_state(gstreamer::State::Null) {
            log::warn!("failed to stop RTSP pipeline: {}", err);
        }
    }
}

#[cfg(feature = "rtsp-gstreamer")]
fn sample_to_image(sample: &gstreamer::Sample) -> Result<RgbImage> {
    use super::normalize::normalize_to_rgb;

    let buffer = sample.buffer().context("RTSP sample missing buffer")?;
    let caps = sample.caps().context("RTSP sample missing caps")?;
    let info =
        gstreamer_video::VideoInfo::from_caps(caps).context("parse RTSP caps as video info")?;
    let format = PixelFormat::from_caps_name(&info.format().to_string())?;
    let map = buffer.map_readable().context("map RTSP buffer")?;
    normalize_to_rgb(
        map.as_slice(),
        info.width(),
        info.height(),
        info.stride()[0] as usize,
        format,
    )
}
