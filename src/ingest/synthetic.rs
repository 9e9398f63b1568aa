//! Synthetic petri-dish frames for `stub://` stream URLs.
//!
//! `stub://plate?colonies=5&width=320&height=240` renders a light agar
//! background with five dark, well separated discs laid out on a grid.
//! Every parameter is optional; the default plate has no colonies.

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};
use url::Url;

const DEFAULT_WIDTH: u32 = 320;
const DEFAULT_HEIGHT: u32 = 240;
const MIN_RADIUS: u32 = 2;
const AGAR: Rgb<u8> = Rgb([214, 198, 160]);
const COLONY: Rgb<u8> = Rgb([62, 48, 30]);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlateLayout {
    pub colonies: u32,
    pub width: u32,
    pub height: u32,
}

impl PlateLayout {
    pub fn from_url(url: &Url) -> Result<Self> {
        let mut layout = PlateLayout {
            colonies: 0,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        };
        for (key, value) in url.query_pairs() {
            let parsed: u32 = value
                .parse()
                .map_err(|_| anyhow!("stub parameter {} must be an integer, got {:?}", key, value))?;
            match &*key {
                "colonies" => layout.colonies = parsed,
                "width" => layout.width = parsed,
                "height" => layout.height = parsed,
                other => return Err(anyhow!("unknown stub parameter {:?}", other)),
            }
        }
        if layout.width == 0 || layout.height == 0 {
            return Err(anyhow!("stub frame must not be empty"));
        }
        Ok(layout)
    }

    /// Render the plate.
    pub fn render(&self) -> Result<RgbImage> {
        let mut image = RgbImage::from_pixel(self.width, self.height, AGAR);
        if self.colonies == 0 {
            return Ok(image);
        }

        let cols = (self.colonies as f64).sqrt().ceil() as u32;
        let rows = self.colonies.div_ceil(cols);
        let cell = (self.width / cols).min(self.height / rows);
        let radius = cell / 4;
        if radius < MIN_RADIUS {
            return Err(anyhow!(
                "{} colonies do not fit a {}x{} stub frame",
                self.colonies,
                self.width,
                self.height
            ));
        }

        for index in 0..self.colonies {
            let cx = (index % cols) * cell + cell / 2;
            let cy = (index / cols) * cell + cell / 2;
            fill_disc(&mut image, cx, cy, radius);
        }
        Ok(image)
    }
}

fn fill_disc(image: &mut RgbImage, cx: u32, cy: u32, radius: u32) {
    let r = radius as i64;
    for dy in -r..=r {
        for dx in -r..=r {
            if dx * dx + dy * dy > r * r {
                continue;
            }
            let x = cx as i64 + dx;
            let y = cy as i64 + dy;
            if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
                image.put_pixel(x as u32, y as u32, COLONY);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(url: &str) -> Result<PlateLayout> {
        PlateLayout::from_url(&Url::parse(url)?)
    }

    #[test]
    fn defaults_to_empty_plate() -> Result<()> {
        let plate = layout("stub://plate")?;
        assert_eq!(plate.colonies, 0);
        let image = plate.render()?;
        assert_eq!(image.dimensions(), (320, 240));
        assert!(image.pixels().all(|p| *p == AGAR));
        Ok(())
    }

    #[test]
    fn discs_stay_inside_the_frame() -> Result<()> {
        let image = layout("stub://plate?colonies=7&width=100&height=80")?.render()?;
        assert_eq!(image.dimensions(), (100, 80));
        // border rows and columns stay agar
        for x in 0..100 {
            assert_eq!(*image.get_pixel(x, 0), AGAR);
            assert_eq!(*image.get_pixel(x, 79), AGAR);
        }
        assert!(image.pixels().any(|p| *p == COLONY));
        Ok(())
    }

    #[test]
    fn bad_parameters_are_rejected() {
        assert!(layout("stub://plate?colonies=many").is_err());
        assert!(layout("stub://plate?depth=3").is_err());
        assert!(layout("stub://plate?width=0").is_err());
        assert!(layout("stub://plate?colonies=400&width=20&height=20")
            .and_then(|plate| plate.render())
            .is_err());
    }
}
