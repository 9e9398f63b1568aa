//! Colony counting.
//!
//! The counter runs a fixed, deterministic pipeline over a color image:
//!
//! 1. Laplacian sharpening (audit artifact only, see below)
//! 2. 8-bit grayscale conversion of the *original* image
//! 3. Otsu binary-inverse threshold
//! 4. Outer-border extraction
//! 5. Annotated contour image
//! 6. Count = number of outer borders
//!
//! The sharpened image is written for audit but the grayscale step reads the
//! unsharpened original. Counts recorded so far depend on that, so it stays.

pub mod contour;
pub mod filter;
pub mod threshold;

use anyhow::{anyhow, Context, Result};
use image::{GrayImage, RgbImage};
use std::path::{Path, PathBuf};

use crate::artifact::{write_png, ArtifactImage};

pub use contour::{draw_contours, find_external_contours, Contour};
pub use filter::{sharpen, FloatImage, LaplacianKernel, STRONG_LAPLACIAN, WEAK_LAPLACIAN};
pub use threshold::{otsu_binary_inv, otsu_level, to_gray, THRESHOLD_HINT, THRESHOLD_MAXVAL};

/// Intermediate images of one pipeline run.
#[derive(Clone, Debug)]
pub struct ColonyAnalysis {
    pub sharpened: RgbImage,
    pub gray: GrayImage,
    pub threshold: u8,
    pub binary: GrayImage,
    pub contours: Vec<Contour>,
}

impl ColonyAnalysis {
    /// Gray image with every contour drawn in.
    pub fn annotated(&self) -> GrayImage {
        let mut canvas = self.gray.clone();
        draw_contours(&mut canvas, &self.contours, 0, 2);
        canvas
    }
}

/// Run the pipeline without touching the filesystem.
pub fn analyze(image: &RgbImage, kernel: LaplacianKernel) -> Result<ColonyAnalysis> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(anyhow!("cannot count colonies in an empty image"));
    }

    let sharpened = sharpen(image, kernel).to_rgb8();
    // 8-bit input is already inside [0, 255]; the clip is the identity here.
    let gray = to_gray(image);
    let (threshold, binary) = otsu_binary_inv(&gray, THRESHOLD_HINT, THRESHOLD_MAXVAL);
    let contours = find_external_contours(&binary);

    Ok(ColonyAnalysis {
        sharpened,
        gray,
        threshold,
        binary,
        contours,
    })
}

/// Result of counting one image.
#[derive(Clone, Debug)]
pub struct ColonyCount {
    pub count: usize,
    pub threshold: u8,
    pub sharpened_path: PathBuf,
    pub gray_path: PathBuf,
    pub contours_path: PathBuf,
}

/// Counts colonies and writes the audit artifacts to `output_dir`.
#[derive(Clone, Debug)]
pub struct ColonyCounter {
    output_dir: PathBuf,
    kernel: LaplacianKernel,
}

impl ColonyCounter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            kernel: LaplacianKernel::default(),
        }
    }

    pub fn with_kernel(mut self, kernel: LaplacianKernel) -> Self {
        self.kernel = kernel;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Decode an image file and count it; artifacts are named after the file stem.
    pub fn count_file(&self, path: &Path) -> Result<ColonyCount> {
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .filter(|stem| !stem.is_empty())
            .ok_or_else(|| anyhow!("image path {} has no usable file name", path.display()))?;
        let image = image::open(path)
            .with_context(|| format!("failed to decode image {}", path.display()))?
            .to_rgb8();
        self.count_image(name, &image)
    }

    /// Count colonies in `image`, writing `<name>-sharpened.png`,
    /// `<name>-gray.png` and `<name>-<count>.png`.
    pub fn count_image(&self, name: &str, image: &RgbImage) -> Result<ColonyCount> {
        let analysis = analyze(image, self.kernel)?;

        let sharpened_path = write_png(
            &self.output_dir,
            &format!("{}-sharpened", name),
            ArtifactImage::Rgb(&analysis.sharpened),
        )?;
        let gray_path = write_png(
            &self.output_dir,
            &format!("{}-gray", name),
            ArtifactImage::Gray(&analysis.gray),
        )?;
        let annotated = analysis.annotated();
        let contours_path = write_png(
            &self.output_dir,
            &format!("{}-{}", name, analysis.contours.len()),
            ArtifactImage::Gray(&annotated),
        )?;

        // Count from a fresh extraction over the same binary image.
        let count = find_external_contours(&analysis.binary).len();

        log::info!(
            "{}: {} colonies (otsu threshold {})",
            name,
            count,
            analysis.threshold
        );

        Ok(ColonyCount {
            count,
            threshold: analysis.threshold,
            sharpened_path,
            gray_path,
            contours_path,
        })
    }
}
