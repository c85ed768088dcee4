// Bounding-box math, polygon rasterization and region masks

use image::{GrayImage, Luma};
use imageproc::drawing::draw_line_segment_mut;
use serde::{Deserialize, Serialize};

use crate::core::errors::{GeometryError, GeometryResult};

const MASK_ON: Luma<u8> = Luma([255]);

/// Axis-aligned box in pixel coordinates (max edges exclusive)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: i32,
    pub y_min: i32,
    pub x_max: i32,
    pub y_max: i32,
}

impl BoundingBox {
    pub fn new(x_min: i32, y_min: i32, x_max: i32, y_max: i32) -> Self {
        Self { x_min, y_min, x_max, y_max }
    }

    pub fn width(&self) -> i32 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> i32 {
        self.y_max - self.y_min
    }

    /// Signed product of the extents; malformed boxes yield zero or less
    pub fn area(&self) -> i64 {
        i64::from(self.width()) * i64::from(self.height())
    }

    pub fn intersection_area(&self, other: &BoundingBox) -> i64 {
        let x_overlap = (self.x_max.min(other.x_max) - self.x_min.max(other.x_min)).max(0);
        let y_overlap = (self.y_max.min(other.y_max) - self.y_min.max(other.y_min)).max(0);
        i64::from(x_overlap) * i64::from(y_overlap)
    }

    pub fn translate(&self, dx: i32, dy: i32) -> BoundingBox {
        BoundingBox::new(self.x_min + dx, self.y_min + dy, self.x_max + dx, self.y_max + dy)
    }

    /// Clamp every edge into `[0, width] x [0, height]`
    pub fn clip(&self, width: u32, height: u32) -> BoundingBox {
        let w = width as i32;
        let h = height as i32;
        BoundingBox::new(
            self.x_min.clamp(0, w),
            self.y_min.clamp(0, h),
            self.x_max.clamp(0, w),
            self.y_max.clamp(0, h),
        )
    }

    /// Corner vertices in clockwise order starting top-left
    pub fn vertices(&self) -> Vec<[i32; 2]> {
        vec![
            [self.x_min, self.y_min],
            [self.x_max, self.y_min],
            [self.x_max, self.y_max],
            [self.x_min, self.y_max],
        ]
    }
}

/// Overlap normalized by the smaller of the two areas, in percent.
///
/// A small box fully inside a large one scores 100. Zero or negative areas
/// score 0.
pub fn overlap_percent(a: &BoundingBox, a_area: i64, b: &BoundingBox, b_area: i64) -> f32 {
    let intersection = a.intersection_area(b);
    if intersection == 0 {
        return 0.0;
    }

    let smaller_area = a_area.min(b_area);
    if smaller_area <= 0 {
        return 0.0;
    }

    (intersection as f64 / smaller_area as f64 * 100.0) as f32
}

/// Ordered polygon vertices, filled with the even-odd rule
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Polygon {
    pub points: Vec<[f32; 2]>,
}

impl Polygon {
    pub fn new(points: Vec<[f32; 2]>) -> Self {
        Self { points }
    }

    pub fn from_bbox(bbox: &BoundingBox) -> Self {
        Self::new(
            bbox.vertices()
                .into_iter()
                .map(|[x, y]| [x as f32, y as f32])
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Integer crop bounds (floor/ceil) clipped to the image.
    ///
    /// Fails when the clipped extent is 1 pixel or less on either axis.
    pub fn pixel_bounds(&self, image_width: u32, image_height: u32) -> GeometryResult<BoundingBox> {
        if self.points.len() < 3 {
            return Err(GeometryError::DegeneratePolygon {
                points: self.points.len(),
            });
        }

        let (mut min_x, mut min_y) = (f32::INFINITY, f32::INFINITY);
        let (mut max_x, mut max_y) = (f32::NEG_INFINITY, f32::NEG_INFINITY);
        for &[x, y] in &self.points {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }

        if !(min_x.is_finite() && min_y.is_finite() && max_x.is_finite() && max_y.is_finite()) {
            return Err(GeometryError::DegeneratePolygon {
                points: self.points.len(),
            });
        }

        let bbox = BoundingBox::new(
            (min_x.floor() as i32).max(0),
            (min_y.floor() as i32).max(0),
            (max_x.ceil() as i32).min(image_width as i32),
            (max_y.ceil() as i32).min(image_height as i32),
        );

        if bbox.width() <= 1 || bbox.height() <= 1 {
            return Err(GeometryError::RegionTooSmall {
                width: bbox.width(),
                height: bbox.height(),
            });
        }

        Ok(bbox)
    }
}

/// Rasterize a polygon into a `width x height` mask (255 inside, 0 outside).
///
/// Pixel centers sit on integer coordinates. Interior spans use the even-odd
/// rule, and the outline itself is always drawn so boundary pixels count as
/// inside.
pub fn fill_polygon(points: &[[f32; 2]], width: u32, height: u32) -> GrayImage {
    let mut mask = GrayImage::new(width, height);
    if width == 0 || height == 0 || points.len() < 2 {
        return mask;
    }

    let n = points.len();
    let mut crossings: Vec<f32> = Vec::with_capacity(n);

    for y in 0..height {
        let yf = y as f32;
        crossings.clear();

        for i in 0..n {
            let [x0, y0] = points[i];
            let [x1, y1] = points[(i + 1) % n];
            if (y0 <= yf && yf < y1) || (y1 <= yf && yf < y0) {
                crossings.push(x0 + (yf - y0) * (x1 - x0) / (y1 - y0));
            }
        }

        crossings.sort_by(|a, b| a.total_cmp(b));

        for span in crossings.chunks_exact(2) {
            let end = span[1].floor();
            if end < 0.0 {
                continue;
            }
            let start = span[0].ceil().max(0.0) as u32;
            let end = (end as u32).min(width - 1);
            for x in start..=end {
                mask.put_pixel(x, y, MASK_ON);
            }
        }
    }

    for i in 0..n {
        let [x0, y0] = points[i];
        let [x1, y1] = points[(i + 1) % n];
        draw_line_segment_mut(&mut mask, (x0, y0), (x1, y1), MASK_ON);
    }

    mask
}

/// Rectangular crop of an image plus the polygon mask over it
#[derive(Debug, Clone)]
pub struct Region {
    /// Crop bounds in source-image coordinates
    pub bbox: BoundingBox,
    /// Same dimensions as the crop
    pub mask: GrayImage,
}

impl Region {
    /// Clip the polygon to the image, then rasterize it relative to its crop.
    pub fn from_polygon(polygon: &Polygon, image_width: u32, image_height: u32) -> GeometryResult<Self> {
        let bbox = polygon.pixel_bounds(image_width, image_height)?;
        let width = bbox.width() as u32;
        let height = bbox.height() as u32;

        let max_x = (width - 1) as f32;
        let max_y = (height - 1) as f32;
        let shifted: Vec<[f32; 2]> = polygon
            .points
            .iter()
            .map(|&[x, y]| {
                [
                    (x - bbox.x_min as f32).clamp(0.0, max_x),
                    (y - bbox.y_min as f32).clamp(0.0, max_y),
                ]
            })
            .collect();

        let mask = fill_polygon(&shifted, width, height);
        Ok(Self { bbox, mask })
    }

    pub fn width(&self) -> u32 {
        self.mask.width()
    }

    pub fn height(&self) -> u32 {
        self.mask.height()
    }

    pub fn mask_pixel_count(&self) -> usize {
        count_mask_pixels(&self.mask)
    }

    /// Error unless at least `min_pixels` mask pixels are set
    pub fn require_pixels(&self, min_pixels: usize) -> GeometryResult<usize> {
        let set = self.mask_pixel_count();
        if set < min_pixels {
            return Err(GeometryError::InsufficientMask {
                set,
                required: min_pixels,
            });
        }
        Ok(set)
    }
}

pub fn count_mask_pixels(mask: &GrayImage) -> usize {
    mask.as_raw().iter().filter(|&&v| v > 0).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersection_and_overlap() {
        let big = BoundingBox::new(0, 0, 100, 100);
        let small = BoundingBox::new(10, 10, 20, 20);
        assert_eq!(big.intersection_area(&small), 100);
        assert_eq!(overlap_percent(&big, big.area(), &small, small.area()), 100.0);

        let disjoint = BoundingBox::new(200, 200, 210, 210);
        assert_eq!(overlap_percent(&big, big.area(), &disjoint, disjoint.area()), 0.0);
    }

    #[test]
    fn test_zero_area_never_divides() {
        let a = BoundingBox::new(0, 0, 10, 10);
        let flat = BoundingBox::new(5, 5, 5, 9);
        assert_eq!(overlap_percent(&a, a.area(), &flat, flat.area()), 0.0);

        // Positive intersection but a bogus non-positive area on the record
        let b = BoundingBox::new(2, 2, 8, 8);
        assert_eq!(overlap_percent(&a, a.area(), &b, 0), 0.0);
    }

    #[test]
    fn test_clip() {
        let bbox = BoundingBox::new(-5, -3, 50, 40);
        assert_eq!(bbox.clip(30, 30), BoundingBox::new(0, 0, 30, 30));
    }

    #[test]
    fn test_rectangle_fills_whole_crop() {
        let polygon = Polygon::from_bbox(&BoundingBox::new(10, 10, 50, 30));
        let region = Region::from_polygon(&polygon, 100, 100).unwrap();
        assert_eq!(region.bbox, BoundingBox::new(10, 10, 50, 30));
        assert_eq!(region.width(), 40);
        assert_eq!(region.height(), 20);
        assert_eq!(region.mask_pixel_count(), 40 * 20);
    }

    #[test]
    fn test_triangle_covers_about_half() {
        let polygon = Polygon::new(vec![[0.0, 0.0], [40.0, 0.0], [0.0, 40.0]]);
        let region = Region::from_polygon(&polygon, 100, 100).unwrap();
        let count = region.mask_pixel_count();
        let total = (region.width() * region.height()) as usize;
        assert!(count > total * 4 / 10 && count < total * 7 / 10, "count={count}");
        assert_eq!(region.mask.get_pixel(0, 0)[0], 255);
        assert_eq!(region.mask.get_pixel(39, 39)[0], 0);
    }

    #[test]
    fn test_even_odd_leaves_hole() {
        // Self-overlapping outline: outer square traversed, then inner square
        let points = vec![
            [0.0, 0.0], [30.0, 0.0], [30.0, 30.0], [0.0, 30.0], [0.0, 0.0],
            [10.0, 10.0], [10.0, 20.0], [20.0, 20.0], [20.0, 10.0], [10.0, 10.0],
        ];
        let mask = fill_polygon(&points, 31, 31);
        assert_eq!(mask.get_pixel(5, 15)[0], 255);
        assert_eq!(mask.get_pixel(15, 15)[0], 0);
    }

    #[test]
    fn test_degenerate_polygons_rejected() {
        let line = Polygon::new(vec![[0.0, 0.0], [10.0, 10.0]]);
        assert!(matches!(
            Region::from_polygon(&line, 100, 100),
            Err(GeometryError::DegeneratePolygon { points: 2 })
        ));

        let sliver = Polygon::new(vec![[5.0, 5.0], [5.5, 40.0], [5.2, 20.0]]);
        assert!(matches!(
            Region::from_polygon(&sliver, 100, 100),
            Err(GeometryError::RegionTooSmall { .. })
        ));

        let outside = Polygon::from_bbox(&BoundingBox::new(200, 200, 220, 220));
        assert!(Region::from_polygon(&outside, 100, 100).is_err());
    }

    #[test]
    fn test_polygon_clipped_to_image() {
        let polygon = Polygon::from_bbox(&BoundingBox::new(-10, -10, 20, 20));
        let region = Region::from_polygon(&polygon, 100, 100).unwrap();
        assert_eq!(region.bbox, BoundingBox::new(0, 0, 20, 20));
        assert_eq!(region.mask_pixel_count(), 400);
    }

    #[test]
    fn test_require_pixels() {
        let polygon = Polygon::from_bbox(&BoundingBox::new(0, 0, 3, 3));
        let region = Region::from_polygon(&polygon, 10, 10).unwrap();
        assert_eq!(region.mask_pixel_count(), 9);
        assert!(region.require_pixels(15).is_err());
        assert_eq!(region.require_pixels(9).unwrap(), 9);
    }
}
