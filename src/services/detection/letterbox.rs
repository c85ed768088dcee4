// Letterbox padding for small pages fed to the region detector

use std::borrow::Cow;

use image::{imageops, Rgb, RgbImage};
use tracing::debug;

use crate::utils::geometry::{BoundingBox, Polygon};

/// Detector minimum input size on both axes
pub const MIN_DETECTOR_DIMENSION: u32 = 640;

const PAD_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Padded detector input plus the offsets needed to map results back
#[derive(Debug, Clone)]
pub struct Letterbox<'a> {
    pub image: Cow<'a, RgbImage>,
    pub pad_x: u32,
    pub pad_y: u32,
    pub original_width: u32,
    pub original_height: u32,
}

/// Center `image` on a white canvas of at least `min_dimension` per axis.
///
/// Never rescales. When both axes already meet the minimum the source image is
/// borrowed as-is with zero offsets.
pub fn letterbox(image: &RgbImage, min_dimension: u32) -> Letterbox<'_> {
    let (width, height) = image.dimensions();

    if width >= min_dimension && height >= min_dimension {
        return Letterbox {
            image: Cow::Borrowed(image),
            pad_x: 0,
            pad_y: 0,
            original_width: width,
            original_height: height,
        };
    }

    let target_width = width.max(min_dimension);
    let target_height = height.max(min_dimension);
    let pad_x = (target_width - width) / 2;
    let pad_y = (target_height - height) / 2;

    let mut canvas = RgbImage::from_pixel(target_width, target_height, PAD_COLOR);
    imageops::replace(&mut canvas, image, i64::from(pad_x), i64::from(pad_y));

    debug!(
        "Letterboxed {}x{} → {}x{} (pad_x={}, pad_y={})",
        width, height, target_width, target_height, pad_x, pad_y
    );

    Letterbox {
        image: Cow::Owned(canvas),
        pad_x,
        pad_y,
        original_width: width,
        original_height: height,
    }
}

impl<'a> Letterbox<'a> {
    pub fn is_padded(&self) -> bool {
        self.pad_x > 0 || self.pad_y > 0
    }

    /// Original-image point → detector-canvas point
    pub fn to_detector(&self, x: f32, y: f32) -> (f32, f32) {
        (x + self.pad_x as f32, y + self.pad_y as f32)
    }

    /// Detector-canvas point → original-image point, clipped to the image
    pub fn to_original(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.pad_x as f32).clamp(0.0, self.original_width as f32),
            (y - self.pad_y as f32).clamp(0.0, self.original_height as f32),
        )
    }

    /// Shift a detector box into original coordinates without clipping
    pub fn unpad_bbox(&self, bbox: &BoundingBox) -> BoundingBox {
        bbox.translate(-(self.pad_x as i32), -(self.pad_y as i32))
    }

    /// Shift a detector polygon into original coordinates, clipping every vertex
    pub fn unpad_polygon(&self, polygon: &Polygon) -> Polygon {
        Polygon::new(
            polygon
                .points
                .iter()
                .map(|&[x, y]| {
                    let (ox, oy) = self.to_original(x, y);
                    [ox, oy]
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_large_image_is_borrowed() {
        let img = RgbImage::new(800, 700);
        let lb = letterbox(&img, MIN_DETECTOR_DIMENSION);
        assert!(matches!(lb.image, Cow::Borrowed(_)));
        assert!(!lb.is_padded());
        assert_eq!(lb.to_original(12.0, 34.0), (12.0, 34.0));
    }

    #[test]
    fn test_small_image_centered_on_white() {
        let img = RgbImage::from_pixel(100, 700, Rgb([0, 0, 0]));
        let lb = letterbox(&img, MIN_DETECTOR_DIMENSION);

        assert_eq!(lb.image.dimensions(), (640, 700));
        assert_eq!((lb.pad_x, lb.pad_y), (270, 0));
        assert_eq!(lb.image.get_pixel(0, 0), &PAD_COLOR);
        assert_eq!(lb.image.get_pixel(270, 10), &Rgb([0, 0, 0]));
        assert_eq!(lb.image.get_pixel(369, 10), &Rgb([0, 0, 0]));
        assert_eq!(lb.image.get_pixel(370, 10), &PAD_COLOR);
    }

    #[test]
    fn test_round_trip() {
        let img = RgbImage::new(201, 99);
        let lb = letterbox(&img, MIN_DETECTOR_DIMENSION);
        assert_eq!((lb.pad_x, lb.pad_y), (219, 270));

        for &(x, y) in &[(0.0, 0.0), (10.5, 20.25), (201.0, 99.0), (150.0, 3.0)] {
            let (dx, dy) = lb.to_detector(x, y);
            let (ox, oy) = lb.to_original(dx, dy);
            assert!((ox - x).abs() < 1e-3 && (oy - y).abs() < 1e-3);
        }
    }

    #[test]
    fn test_unpad_clips_points() {
        let img = RgbImage::new(100, 100);
        let lb = letterbox(&img, MIN_DETECTOR_DIMENSION);
        assert_eq!(lb.to_original(0.0, 0.0), (0.0, 0.0));
        assert_eq!(lb.to_original(639.0, 639.0), (100.0, 100.0));

        let bbox = BoundingBox::new(260, 260, 300, 300);
        assert_eq!(lb.unpad_bbox(&bbox), BoundingBox::new(-10, -10, 30, 30));
    }
}
