// Per-pixel clustering weights: mask-edge de-emphasis and distance decay
// away from the presumed text strokes.

use image::{imageops, GrayImage, Luma, RgbImage};
use imageproc::distance_transform::{euclidean_squared_distance_transform, Norm};
use imageproc::morphology::erode;

use super::threshold::split_minority;

/// Masked pixels of a crop in row-major order, with their flat crop offsets
#[derive(Debug, Clone)]
pub struct MaskedPixels {
    pub pixels: Vec<[u8; 3]>,
    pub offsets: Vec<usize>,
}

impl MaskedPixels {
    pub fn collect(region: &RgbImage, mask: &GrayImage) -> Self {
        let capacity = mask.as_raw().iter().filter(|&&m| m > 0).count();
        let mut pixels = Vec::with_capacity(capacity);
        let mut offsets = Vec::with_capacity(capacity);

        for (offset, (pixel, m)) in region.pixels().zip(mask.as_raw().iter()).enumerate() {
            if *m > 0 {
                pixels.push(pixel.0);
                offsets.push(offset);
            }
        }

        Self { pixels, offsets }
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }
}

/// Weights for every masked pixel, renormalized so they sum to the pixel count.
///
/// Mask-boundary pixels (mask minus its 3x3 erosion) are scaled by
/// `edge_bias`. When an Otsu pass finds a text class, every pixel is further
/// scaled by `1 / (1 + d)`, `d` being the Euclidean distance to the nearest
/// text or unmasked pixel.
pub fn pixel_weights(region: &RgbImage, mask: &GrayImage, masked: &MaskedPixels, edge_bias: f32) -> Vec<f64> {
    let mut weights = vec![1.0f64; masked.len()];
    if masked.is_empty() {
        return weights;
    }

    let interior = erode(mask, Norm::LInf, 1);
    let interior = interior.as_raw();
    for (w, &offset) in weights.iter_mut().zip(masked.offsets.iter()) {
        if interior[offset] == 0 {
            *w *= f64::from(edge_bias);
        }
    }

    let gray = imageops::grayscale(region);
    if let Some(split) = split_minority(&gray, mask) {
        // Non-zero marks the pixels distances are measured to
        let mut seeds = GrayImage::new(mask.width(), mask.height());
        for (offset, (m, is_text)) in mask.as_raw().iter().zip(split.text.iter()).enumerate() {
            if *m == 0 || *is_text {
                let x = (offset as u32) % mask.width();
                let y = (offset as u32) / mask.width();
                seeds.put_pixel(x, y, Luma([255]));
            }
        }

        let squared = euclidean_squared_distance_transform(&seeds);
        let squared = squared.as_raw();
        for (w, &offset) in weights.iter_mut().zip(masked.offsets.iter()) {
            let distance = squared[offset].sqrt();
            if distance.is_finite() {
                *w *= 1.0 / (1.0 + distance);
            }
        }
    }

    let total: f64 = weights.iter().sum();
    if total > 0.0 {
        let scale = masked.len() as f64 / total;
        weights.iter_mut().for_each(|w| *w *= scale);
    }

    weights
}
