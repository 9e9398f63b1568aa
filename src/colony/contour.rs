//! Outer-border extraction (Suzuki–Abe border following) and drawing.
//!
//! Only outermost borders are retrieved: a new outer border is traced when
//! the last labelled border pixel to its left on the scan row is not a
//! positively labelled pixel, i.e. the region does not sit inside another
//! region's hole. Pixels are 8-connected. Boundaries are compressed to the
//! points where the chain direction changes.

use image::{GrayImage, Luma};

/// Label written onto traced border pixels.
const BORDER: i32 = 2;

/// 8-neighbourhood offsets in counter-clockwise order, starting east
/// (image rows grow downwards).
const NEIGHBOURS: [(i64, i64); 8] = [
    (1, 0),
    (1, -1),
    (0, -1),
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

const WEST: usize = 4;

/// One outer region boundary, in image coordinates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contour {
    points: Vec<(u32, u32)>,
}

impl Contour {
    pub fn points(&self) -> &[(u32, u32)] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Zero-padded label plane.
struct LabelPlane {
    width: usize,
    height: usize,
    cells: Vec<i32>,
}

impl LabelPlane {
    fn from_binary(binary: &GrayImage) -> Self {
        let width = binary.width() as usize + 2;
        let height = binary.height() as usize + 2;
        let mut cells = vec![0i32; width * height];
        for (x, y, pixel) in binary.enumerate_pixels() {
            if pixel.0[0] != 0 {
                cells[(y as usize + 1) * width + x as usize + 1] = 1;
            }
        }
        Self {
            width,
            height,
            cells,
        }
    }

    fn at(&self, x: usize, y: usize) -> i32 {
        self.cells[y * self.width + x]
    }

    fn set(&mut self, x: usize, y: usize, value: i32) {
        self.cells[y * self.width + x] = value;
    }

    fn step(&self, x: usize, y: usize, dir: usize) -> (usize, usize) {
        let (dx, dy) = NEIGHBOURS[dir % 8];
        ((x as i64 + dx) as usize, (y as i64 + dy) as usize)
    }

    /// Follow the outer border starting at `(x, y)`, whose west neighbour is
    /// background. Returns the visited border pixels in padded coordinates.
    fn follow_outer_border(&mut self, x: usize, y: usize) -> Vec<(usize, usize)> {
        // Clockwise search from the west neighbour for the first foreground pixel.
        let first = (0..8).map(|k| (WEST + 8 - k) % 8).find(|&dir| {
            let (nx, ny) = self.step(x, y, dir);
            self.at(nx, ny) != 0
        });
        let Some(first_dir) = first else {
            self.set(x, y, -BORDER);
            return vec![(x, y)];
        };

        let second = self.step(x, y, first_dir);
        let mut path = Vec::new();
        let mut current = (x, y);
        // Direction from `current` back to the previously visited pixel.
        let mut back_dir = first_dir;

        loop {
            path.push(current);

            let mut east_is_background = false;
            let mut next_dir = back_dir;
            for k in 1..=8 {
                let dir = (back_dir + k) % 8;
                let (nx, ny) = self.step(current.0, current.1, dir);
                if self.at(nx, ny) != 0 {
                    next_dir = dir;
                    break;
                }
                if dir == 0 {
                    east_is_background = true;
                }
            }

            if east_is_background {
                self.set(current.0, current.1, -BORDER);
            } else if self.at(current.0, current.1) == 1 {
                self.set(current.0, current.1, BORDER);
            }

            let next = self.step(current.0, current.1, next_dir);
            if next == (x, y) && current == second {
                break;
            }
            back_dir = (next_dir + 4) % 8;
            current = next;
        }

        path
    }
}

/// Keep only the points where the chain direction changes.
fn compress_chain(path: &[(usize, usize)]) -> Vec<(u32, u32)> {
    let unpad = |(x, y): (usize, usize)| ((x - 1) as u32, (y - 1) as u32);
    if path.len() < 3 {
        return path.iter().copied().map(unpad).collect();
    }

    let direction = |a: (usize, usize), b: (usize, usize)| {
        (b.0 as i64 - a.0 as i64, b.1 as i64 - a.1 as i64)
    };
    let n = path.len();
    let kept: Vec<(u32, u32)> = (0..n)
        .filter(|&k| {
            let prev = path[(k + n - 1) % n];
            let here = path[k];
            let next = path[(k + 1) % n];
            direction(prev, here) != direction(here, next)
        })
        .map(|k| unpad(path[k]))
        .collect();

    if kept.is_empty() {
        vec![unpad(path[0])]
    } else {
        kept
    }
}

/// Retrieve the outermost borders of the non-zero regions of `binary`.
pub fn find_external_contours(binary: &GrayImage) -> Vec<Contour> {
    let mut plane = LabelPlane::from_binary(binary);
    let mut contours = Vec::new();

    for y in 1..plane.height - 1 {
        let mut prev = 0i32;
        let mut lnbd = 0usize;
        for x in 1..plane.width - 1 {
            let p = plane.at(x, y);
            if p == prev {
                continue;
            }
            if prev == 0 && p == 1 && plane.at(lnbd, y) <= 0 {
                let path = plane.follow_outer_border(x, y);
                contours.push(Contour {
                    points: compress_chain(&path),
                });
                lnbd = x;
                prev = plane.at(x, y);
                continue;
            }
            prev = p;
            if p != 0 && p != 1 {
                lnbd = x;
            }
        }
    }

    contours
}

/// Draw every contour as a closed polyline of the given value and thickness.
pub fn draw_contours(canvas: &mut GrayImage, contours: &[Contour], value: u8, thickness: u32) {
    for contour in contours {
        let points = contour.points();
        match points.len() {
            0 => {}
            1 => stamp(canvas, points[0].0 as i64, points[0].1 as i64, value, thickness),
            n => {
                for k in 0..n {
                    draw_line(canvas, points[k], points[(k + 1) % n], value, thickness);
                }
            }
        }
    }
}

fn draw_line(canvas: &mut GrayImage, from: (u32, u32), to: (u32, u32), value: u8, thickness: u32) {
    let (mut x0, mut y0) = (from.0 as i64, from.1 as i64);
    let (x1, y1) = (to.0 as i64, to.1 as i64);
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        stamp(canvas, x0, y0, value, thickness);
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

fn stamp(canvas: &mut GrayImage, x: i64, y: i64, value: u8, thickness: u32) {
    let t = thickness.max(1) as i64;
    let lo = -(t / 2);
    let (width, height) = (canvas.width() as i64, canvas.height() as i64);
    for oy in lo..lo + t {
        for ox in lo..lo + t {
            let (px, py) = (x + ox, y + oy);
            if px >= 0 && py >= 0 && px < width && py < height {
                canvas.put_pixel(px as u32, py as u32, Luma([value]));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill_rect(image: &mut GrayImage, x0: u32, y0: u32, x1: u32, y1: u32) {
        for y in y0..=y1 {
            for x in x0..=x1 {
                image.put_pixel(x, y, Luma([50]));
            }
        }
    }

    #[test]
    fn empty_image_has_no_contours() {
        let binary = GrayImage::new(8, 8);
        assert!(find_external_contours(&binary).is_empty());
    }

    #[test]
    fn rectangle_compresses_to_corners() {
        let mut binary = GrayImage::new(10, 10);
        fill_rect(&mut binary, 2, 3, 6, 7);

        let contours = find_external_contours(&binary);
        assert_eq!(contours.len(), 1);
        let mut corners = contours[0].points().to_vec();
        corners.sort();
        assert_eq!(corners, vec![(2, 3), (2, 7), (6, 3), (6, 7)]);
    }

    #[test]
    fn single_pixel_is_one_contour() {
        let mut binary = GrayImage::new(5, 5);
        binary.put_pixel(2, 2, Luma([1]));
        let contours = find_external_contours(&binary);
        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0].points(), &[(2, 2)]);
    }

    #[test]
    fn diagonal_neighbours_join() {
        let mut binary = GrayImage::new(6, 6);
        binary.put_pixel(1, 1, Luma([1]));
        binary.put_pixel(2, 2, Luma([1]));
        binary.put_pixel(3, 3, Luma([1]));
        assert_eq!(find_external_contours(&binary).len(), 1);
    }

    #[test]
    fn separate_regions_on_one_row_are_counted() {
        let mut binary = GrayImage::new(20, 6);
        fill_rect(&mut binary, 1, 1, 4, 4);
        fill_rect(&mut binary, 7, 1, 9, 4);
        fill_rect(&mut binary, 12, 2, 18, 3);
        assert_eq!(find_external_contours(&binary).len(), 3);
    }

    #[test]
    fn region_inside_a_hole_is_not_external() {
        let mut binary = GrayImage::new(20, 20);
        fill_rect(&mut binary, 2, 2, 17, 17);
        // carve a hole, then put an island back inside it
        for y in 5..=14 {
            for x in 5..=14 {
                binary.put_pixel(x, y, Luma([0]));
            }
        }
        fill_rect(&mut binary, 8, 8, 11, 11);

        assert_eq!(find_external_contours(&binary).len(), 1);
    }

    #[test]
    fn regions_touching_the_image_edge_are_traced() {
        let mut binary = GrayImage::new(6, 6);
        fill_rect(&mut binary, 0, 0, 5, 1);
        fill_rect(&mut binary, 0, 4, 2, 5);
        assert_eq!(find_external_contours(&binary).len(), 2);
    }

    #[test]
    fn extraction_is_repeatable() {
        let mut binary = GrayImage::new(30, 30);
        fill_rect(&mut binary, 1, 1, 5, 9);
        fill_rect(&mut binary, 10, 12, 20, 14);
        binary.put_pixel(25, 25, Luma([50]));
        assert_eq!(
            find_external_contours(&binary),
            find_external_contours(&binary)
        );
    }

    #[test]
    fn drawing_marks_the_outline() {
        let mut binary = GrayImage::new(12, 12);
        fill_rect(&mut binary, 3, 3, 8, 8);
        let contours = find_external_contours(&binary);

        let mut canvas = GrayImage::from_pixel(12, 12, Luma([200]));
        draw_contours(&mut canvas, &contours, 0, 2);
        assert_eq!(canvas.get_pixel(3, 3).0[0], 0);
        assert_eq!(canvas.get_pixel(8, 5).0[0], 0);
        assert_eq!(canvas.get_pixel(5, 5).0[0], 200);
        assert_eq!(canvas.get_pixel(0, 11).0[0], 200);
    }
}
