use anyhow::{anyhow, Result};
use image::RgbImage;

/// Packed 8-bit pixel layouts a decoder may hand back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb24,
    Bgr24,
    Rgbx32,
}

impl PixelFormat {
    /// Every layout the stream backend accepts, in caps preference order.
    pub const ALL: [PixelFormat; 3] = [
        PixelFormat::Rgb24,
        PixelFormat::Bgr24,
        PixelFormat::Rgbx32,
    ];

    /// GStreamer raw video format name.
    pub fn caps_name(self) -> &'static str {
        match self {
            PixelFormat::Rgb24 => "RGB",
            PixelFormat::Bgr24 => "BGR",
            PixelFormat::Rgbx32 => "RGBx",
        }
    }

    pub fn from_caps_name(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|format| format.caps_name() == name)
            .ok_or_else(|| anyhow!("unsupported raw video format {:?}", name))
    }

    /// `video/x-raw` caps restricted to the supported layouts.
    pub fn raw_caps() -> String {
        let names: Vec<&str> = Self::ALL.iter().map(|f| f.caps_name()).collect();
        format!("video/x-raw,format=(string){{{}}}", names.join(","))
    }

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => 3,
            PixelFormat::Rgbx32 => 4,
        }
    }
}

/// Repack a decoder buffer with row stride `stride` into an RGB image.
pub fn normalize_to_rgb(
    pixels: &[u8],
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
) -> Result<RgbImage> {
    let bpp = format.bytes_per_pixel();
    let row_bytes = (width as usize)
        .checked_mul(bpp)
        .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
    if stride < row_bytes {
        return Err(anyhow!(
            "row stride {} is shorter than a {}-pixel row",
            stride,
            width
        ));
    }
    let needed = match height as usize {
        0 => 0,
        rows => stride
            .checked_mul(rows - 1)
            .and_then(|v| v.checked_add(row_bytes))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?,
    };
    if pixels.len() < needed {
        return Err(anyhow!(
            "frame buffer too short: expected at least {}, got {}",
            needed,
            pixels.len()
        ));
    }

    let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
    for row in 0..height as usize {
        let line = &pixels[row * stride..row * stride + row_bytes];
        for px in line.chunks_exact(bpp) {
            match format {
                PixelFormat::Rgb24 | PixelFormat::Rgbx32 => rgb.extend_from_slice(&px[..3]),
                PixelFormat::Bgr24 => rgb.extend_from_slice(&[px[2], px[1], px[0]]),
            }
        }
    }
    RgbImage::from_raw(width, height, rgb).ok_or_else(|| anyhow!("frame buffer size mismatch"))
}
