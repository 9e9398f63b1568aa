//! Grayscale conversion and automatic (Otsu) thresholding.

use image::{GrayImage, Luma, RgbImage};

/// Lower-bound hint handed to the threshold step. The automatic method
/// replaces it with the variance-maximising cut.
pub const THRESHOLD_HINT: u8 = 5;

/// Value written for foreground pixels of the binary image.
pub const THRESHOLD_MAXVAL: u8 = 50;

const GRAY_SHIFT: u32 = 14;
const R_WEIGHT: u32 = 4899; // 0.299 << 14
const G_WEIGHT: u32 = 9617; // 0.587 << 14
const B_WEIGHT: u32 = 1868; // 0.114 << 14

/// Fixed-point luminance conversion; the weights sum to exactly 1 << 14.
pub fn to_gray(image: &RgbImage) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut gray = GrayImage::new(width, height);
    for (src, dst) in image.pixels().zip(gray.pixels_mut()) {
        let [r, g, b] = src.0;
        let y = (r as u32 * R_WEIGHT + g as u32 * G_WEIGHT + b as u32 * B_WEIGHT
            + (1 << (GRAY_SHIFT - 1)))
            >> GRAY_SHIFT;
        *dst = Luma([y as u8]);
    }
    gray
}

/// Otsu's threshold over the 256-bin histogram.
///
/// Returns the first level that maximises the between-class variance. Levels
/// where either class is empty are skipped, so a uniform image yields 0.
pub fn otsu_level(gray: &GrayImage) -> u8 {
    let mut histogram = [0u64; 256];
    for pixel in gray.pixels() {
        histogram[pixel.0[0] as usize] += 1;
    }
    let total = gray.width() as f64 * gray.height() as f64;
    if total == 0.0 {
        return 0;
    }

    let mu: f64 = histogram
        .iter()
        .enumerate()
        .map(|(level, count)| level as f64 * *count as f64)
        .sum::<f64>()
        / total;

    let epsilon = f32::EPSILON as f64;
    let mut q1 = 0.0f64;
    let mut mu1 = 0.0f64;
    let mut best_sigma = 0.0f64;
    let mut best_level = 0u8;

    for (level, count) in histogram.iter().enumerate() {
        let p = *count as f64 / total;
        mu1 *= q1;
        q1 += p;
        let q2 = 1.0 - q1;

        if q1.min(q2) < epsilon || q1.max(q2) > 1.0 - epsilon {
            continue;
        }

        mu1 = (mu1 + level as f64 * p) / q1;
        let mu2 = (mu - q1 * mu1) / q2;
        let diff = mu1 - mu2;
        let sigma = q1 * q2 * diff * diff;
        if sigma > best_sigma {
            best_sigma = sigma;
            best_level = level as u8;
        }
    }

    best_level
}

/// Binary-inverse threshold: `src > level ? 0 : maxval`.
pub fn threshold_binary_inv(gray: &GrayImage, level: u8, maxval: u8) -> GrayImage {
    let (width, height) = gray.dimensions();
    let mut out = GrayImage::new(width, height);
    for (src, dst) in gray.pixels().zip(out.pixels_mut()) {
        *dst = Luma([if src.0[0] > level { 0 } else { maxval }]);
    }
    out
}

/// Otsu selection followed by the binary-inverse threshold.
///
/// `_hint` is accepted for parity with the fixed call site; the automatic
/// method decides the actual cut.
pub fn otsu_binary_inv(gray: &GrayImage, _hint: u8, maxval: u8) -> (u8, GrayImage) {
    let level = otsu_level(gray);
    (level, threshold_binary_inv(gray, level, maxval))
}
