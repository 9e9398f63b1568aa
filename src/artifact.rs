//! PNG artifact output.
//!
//! Every image the agent persists (captured frames and the counter's audit
//! images) goes through `write_png`, so a failed write always surfaces as an
//! error at the call site.

use anyhow::{anyhow, Context, Result};
use image::{ColorType, GrayImage, ImageFormat, RgbImage};
use std::path::{Path, PathBuf};

/// Borrowed image to persist.
#[derive(Clone, Copy)]
pub enum ArtifactImage<'a> {
    Rgb(&'a RgbImage),
    Gray(&'a GrayImage),
}

impl ArtifactImage<'_> {
    fn dimensions(&self) -> (u32, u32) {
        match self {
            ArtifactImage::Rgb(image) => image.dimensions(),
            ArtifactImage::Gray(image) => image.dimensions(),
        }
    }
}

/// Write `image` as `<dir>/<name>.png`, creating `dir` if needed.
pub fn write_png(dir: &Path, name: &str, image: ArtifactImage<'_>) -> Result<PathBuf> {
    if name.is_empty() || name.contains(|c: char| c == '/' || c == '\\') {
        return Err(anyhow!("invalid artifact name {:?}", name));
    }
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(anyhow!("refusing to write empty artifact {}", name));
    }

    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create artifact directory {}", dir.display()))?;
    let path = dir.join(format!("{}.png", name));

    let result = match image {
        ArtifactImage::Rgb(image) => image::save_buffer_with_format(
            &path,
            image.as_raw(),
            width,
            height,
            ColorType::Rgb8,
            ImageFormat::Png,
        ),
        ArtifactImage::Gray(image) => image::save_buffer_with_format(
            &path,
            image.as_raw(),
            width,
            height,
            ColorType::L8,
            ImageFormat::Png,
        ),
    };
    result.with_context(|| format!("failed to write artifact {}", path.display()))?;

    log::debug!("artifact written: {}", path.display());
    Ok(path)
}
