//! Captured frames.
//!
//! A `CapturedFrame` is one still image pulled from the stream together with
//! the local wall-clock time of the capture. The time names the PNG written
//! to the work directory, so two captures within the same second overwrite
//! each other.

use anyhow::Result;
use chrono::{DateTime, Local};
use image::RgbImage;
use std::path::{Path, PathBuf};

use crate::artifact::{write_png, ArtifactImage};

/// Layout of the saved frame's file stem.
pub const FRAME_NAME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

pub struct CapturedFrame {
    image: RgbImage,
    captured_at: DateTime<Local>,
}

impl CapturedFrame {
    pub fn new(image: RgbImage, captured_at: DateTime<Local>) -> Self {
        Self { image, captured_at }
    }

    /// Stamp `image` with the current local time.
    pub fn now(image: RgbImage) -> Self {
        Self::new(image, Local::now())
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    pub fn captured_at(&self) -> DateTime<Local> {
        self.captured_at
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// File stem derived from the capture time, e.g. `2024-03-01_12-30-00`.
    pub fn stem(&self) -> String {
        self.captured_at.format(FRAME_NAME_FORMAT).to_string()
    }

    /// Write the frame to `<dir>/<stem>.png`.
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        write_png(dir, &self.stem(), ArtifactImage::Rgb(&self.image))
    }
}

impl std::fmt::Debug for CapturedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturedFrame")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("captured_at", &self.captured_at)
            .finish()
    }
}
