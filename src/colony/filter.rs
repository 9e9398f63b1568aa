//! Laplacian sharpening.

use image::RgbImage;
use serde::Deserialize;

/// 4-neighbour Laplacian.
pub const WEAK_LAPLACIAN: [[f32; 3]; 3] = [[0.0, 1.0, 0.0], [1.0, -4.0, 1.0], [0.0, 1.0, 0.0]];

/// 8-neighbour Laplacian.
pub const STRONG_LAPLACIAN: [[f32; 3]; 3] = [[1.0, 1.0, 1.0], [1.0, -8.0, 1.0], [1.0, 1.0, 1.0]];

/// Which Laplacian kernel the sharpening step uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaplacianKernel {
    #[default]
    Weak,
    Strong,
}

impl LaplacianKernel {
    pub fn weights(self) -> &'static [[f32; 3]; 3] {
        match self {
            LaplacianKernel::Weak => &WEAK_LAPLACIAN,
            LaplacianKernel::Strong => &STRONG_LAPLACIAN,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "weak" => Some(LaplacianKernel::Weak),
            "strong" => Some(LaplacianKernel::Strong),
            _ => None,
        }
    }
}

/// Float RGB buffer, row-major, 3 samples per pixel.
#[derive(Clone, Debug)]
pub struct FloatImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl FloatImage {
    pub fn get(&self, x: u32, y: u32, channel: usize) -> f32 {
        self.data[((y as usize * self.width as usize) + x as usize) * 3 + channel]
    }

    /// Saturating conversion back to 8 bits (round, then clamp).
    pub fn to_rgb8(&self) -> RgbImage {
        let pixels = self
            .data
            .iter()
            .map(|v| v.round().clamp(0.0, 255.0) as u8)
            .collect();
        RgbImage::from_raw(self.width, self.height, pixels)
            .unwrap_or_else(|| RgbImage::new(self.width, self.height))
    }
}

/// Mirror an out-of-range index without repeating the edge sample.
fn reflect_101(index: i64, len: i64) -> usize {
    if len == 1 {
        return 0;
    }
    let mut i = index;
    loop {
        if i < 0 {
            i = -i;
        } else if i >= len {
            i = 2 * (len - 1) - i;
        } else {
            return i as usize;
        }
    }
}

/// Correlate every channel with a 3x3 kernel in f32.
pub fn convolve3x3(image: &RgbImage, kernel: &[[f32; 3]; 3]) -> FloatImage {
    let (width, height) = image.dimensions();
    let w = width as i64;
    let h = height as i64;
    let src = image.as_raw();
    let mut data = vec![0.0f32; src.len()];

    for y in 0..h {
        for x in 0..w {
            let mut acc = [0.0f32; 3];
            for (ky, row) in kernel.iter().enumerate() {
                let sy = reflect_101(y + ky as i64 - 1, h);
                for (kx, weight) in row.iter().enumerate() {
                    if *weight == 0.0 {
                        continue;
                    }
                    let sx = reflect_101(x + kx as i64 - 1, w);
                    let offset = (sy * width as usize + sx) * 3;
                    for (c, sum) in acc.iter_mut().enumerate() {
                        *sum += weight * src[offset + c] as f32;
                    }
                }
            }
            let offset = ((y * w + x) * 3) as usize;
            data[offset..offset + 3].copy_from_slice(&acc);
        }
    }

    FloatImage {
        width,
        height,
        data,
    }
}

/// Subtract the Laplacian response from the original (unsharp masking).
pub fn sharpen(image: &RgbImage, kernel: LaplacianKernel) -> FloatImage {
    let mut response = convolve3x3(image, kernel.weights());
    for (out, original) in response.data.iter_mut().zip(image.as_raw()) {
        *out = *original as f32 - *out;
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn reflect_101_mirrors_without_edge_repeat() {
        assert_eq!(reflect_101(-1, 5), 1);
        assert_eq!(reflect_101(5, 5), 3);
        assert_eq!(reflect_101(2, 5), 2);
        assert_eq!(reflect_101(-1, 1), 0);
    }

    #[test]
    fn laplacian_of_flat_image_is_zero() {
        let image = RgbImage::from_pixel(6, 4, Rgb([90, 120, 30]));
        let response = convolve3x3(&image, &WEAK_LAPLACIAN);
        assert!(response.data.iter().all(|v| *v == 0.0));

        let sharp = sharpen(&image, LaplacianKernel::Strong);
        assert_eq!(sharp.to_rgb8(), image);
    }

    #[test]
    fn single_bright_pixel_is_boosted() {
        let mut image = RgbImage::from_pixel(5, 5, Rgb([10, 10, 10]));
        image.put_pixel(2, 2, Rgb([50, 50, 50]));

        let sharp = sharpen(&image, LaplacianKernel::Weak);
        // centre: 50 - (4*10 - 4*50) = 210; cardinal neighbour: 10 - (50 + 30 - 40) = -30
        assert_eq!(sharp.get(2, 2, 0), 210.0);
        assert_eq!(sharp.get(2, 1, 1), -30.0);
        assert_eq!(sharp.get(1, 1, 2), 10.0);
    }

    #[test]
    fn saturation_clamps_out_of_range() {
        let float = FloatImage {
            width: 1,
            height: 1,
            data: vec![-12.0, 127.6, 400.0],
        };
        assert_eq!(float.to_rgb8().get_pixel(0, 0), &Rgb([0, 128, 255]));
    }

    #[test]
    fn kernel_names_parse() {
        assert_eq!(LaplacianKernel::parse("Strong"), Some(LaplacianKernel::Strong));
        assert_eq!(LaplacianKernel::parse(" weak "), Some(LaplacianKernel::Weak));
        assert_eq!(LaplacianKernel::parse("sobel"), None);
    }
}
