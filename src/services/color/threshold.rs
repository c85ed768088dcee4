// Masked Otsu binarization and the adaptive-threshold color fast path

use image::{imageops, GrayImage, RgbImage};
use imageproc::filter::gaussian_blur_f32;
use tracing::trace;

use crate::core::types::{rgb_distance, ColorCluster, ColorResult, ColorSource};

/// Two-class split of the masked pixels of a crop
#[derive(Debug, Clone)]
pub struct ThresholdSplit {
    pub threshold: u8,
    /// Row-major, crop-sized; true for masked pixels of the minority class
    pub text: Vec<bool>,
    pub text_count: usize,
    pub background_count: usize,
    /// Whether the minority class is the dark side of the threshold
    pub text_is_dark: bool,
}

impl ThresholdSplit {
    pub fn masked_total(&self) -> usize {
        self.text_count + self.background_count
    }
}

/// Otsu level over a 256-bin histogram; `None` when only one intensity occurs.
///
/// Pixels `<= level` form the dark class.
pub fn otsu_level(histogram: &[u64; 256]) -> Option<u8> {
    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return None;
    }

    let weighted_total: f64 = histogram
        .iter()
        .enumerate()
        .map(|(value, &count)| value as f64 * count as f64)
        .sum();

    let mut best: Option<(u8, f64)> = None;
    let mut dark_weight = 0u64;
    let mut dark_sum = 0.0f64;

    for (level, &count) in histogram.iter().enumerate() {
        dark_weight += count;
        dark_sum += level as f64 * count as f64;

        let light_weight = total - dark_weight;
        if dark_weight == 0 || light_weight == 0 {
            continue;
        }

        let dark_mean = dark_sum / dark_weight as f64;
        let light_mean = (weighted_total - dark_sum) / light_weight as f64;
        let between = dark_weight as f64 * light_weight as f64 * (dark_mean - light_mean).powi(2);

        if best.map_or(true, |(_, score)| between > score) {
            best = Some((level as u8, between));
        }
    }

    best.map(|(level, _)| level)
}

fn masked_histogram(gray: &GrayImage, mask: &GrayImage) -> [u64; 256] {
    let mut histogram = [0u64; 256];
    for (value, m) in gray.as_raw().iter().zip(mask.as_raw().iter()) {
        if *m > 0 {
            histogram[*value as usize] += 1;
        }
    }
    histogram
}

/// Binarize masked pixels with Otsu and label the smaller class as text.
///
/// Ties go to the dark class. Returns `None` unless both classes are present.
pub fn split_minority(gray: &GrayImage, mask: &GrayImage) -> Option<ThresholdSplit> {
    if gray.dimensions() != mask.dimensions() {
        return None;
    }

    let threshold = otsu_level(&masked_histogram(gray, mask))?;

    let (mut dark, mut light) = (0usize, 0usize);
    for (value, m) in gray.as_raw().iter().zip(mask.as_raw().iter()) {
        if *m > 0 {
            if *value <= threshold {
                dark += 1;
            } else {
                light += 1;
            }
        }
    }

    if dark == 0 || light == 0 {
        return None;
    }

    let text_is_dark = dark <= light;
    let text: Vec<bool> = gray
        .as_raw()
        .iter()
        .zip(mask.as_raw().iter())
        .map(|(value, m)| *m > 0 && ((*value <= threshold) == text_is_dark))
        .collect();

    let (text_count, background_count) = if text_is_dark { (dark, light) } else { (light, dark) };

    Some(ThresholdSplit {
        threshold,
        text,
        text_count,
        background_count,
        text_is_dark,
    })
}

fn channel_median(values: &mut [u8]) -> u8 {
    values.sort_unstable();
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        values[mid]
    } else {
        ((u16::from(values[mid - 1]) + u16::from(values[mid]) + 1) / 2) as u8
    }
}

fn median_rgb(pixels: &[[u8; 3]]) -> [u8; 3] {
    let mut out = [0u8; 3];
    let mut channel: Vec<u8> = Vec::with_capacity(pixels.len());
    for (c, slot) in out.iter_mut().enumerate() {
        channel.clear();
        channel.extend(pixels.iter().map(|p| p[c]));
        *slot = channel_median(&mut channel);
    }
    out
}

/// Blur, binarize and take per-class medians. Returns the split colors even
/// when contrast is low; callers decide acceptance.
pub fn threshold_colors(region: &RgbImage, mask: &GrayImage, blur_sigma: f32) -> Option<ColorResult> {
    let gray = imageops::grayscale(region);
    // gaussian_blur_f32 panics on sigma <= 0
    let blurred = if blur_sigma > 0.0 {
        gaussian_blur_f32(&gray, blur_sigma)
    } else {
        gray
    };
    let split = split_minority(&blurred, mask)?;

    let mut text_pixels = Vec::with_capacity(split.text_count);
    let mut background_pixels = Vec::with_capacity(split.background_count);
    for ((pixel, m), is_text) in region
        .pixels()
        .zip(mask.as_raw().iter())
        .zip(split.text.iter())
    {
        if *m == 0 {
            continue;
        }
        if *is_text {
            text_pixels.push(pixel.0);
        } else {
            background_pixels.push(pixel.0);
        }
    }

    let total = split.masked_total() as f64;
    let text_pct = (split.text_count as f64 / total * 100.0) as f32;
    let background_pct = (split.background_count as f64 / total * 100.0) as f32;

    trace!(
        "Otsu split at {}: text={} ({:.1}%, dark={}), background={}",
        split.threshold,
        split.text_count,
        text_pct,
        split.text_is_dark,
        split.background_count
    );

    Some(ColorResult {
        background: ColorCluster::new(median_rgb(&background_pixels), background_pct),
        foreground: ColorCluster::new(median_rgb(&text_pixels), text_pct),
        source: ColorSource::AdaptiveThreshold,
    })
}

/// Adaptive threshold fast path: accepted only when the two class colors are
/// at least `min_contrast` apart in RGB.
pub fn adaptive_threshold(
    region: &RgbImage,
    mask: &GrayImage,
    blur_sigma: f32,
    min_contrast: f32,
) -> Option<ColorResult> {
    let result = threshold_colors(region, mask, blur_sigma)?;
    let contrast = rgb_distance(result.background.rgb, result.foreground.rgb);

    if contrast >= min_contrast {
        Some(result)
    } else {
        trace!("Adaptive threshold rejected: contrast {:.1} < {:.1}", contrast, min_contrast);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    fn text_block() -> RgbImage {
        let mut img = RgbImage::from_pixel(40, 20, Rgb([255, 255, 255]));
        for y in 8..12 {
            for x in 5..35 {
                img.put_pixel(x, y, Rgb([0, 0, 0]));
            }
        }
        img
    }

    #[test]
    fn test_otsu_two_peaks() {
        let mut histogram = [0u64; 256];
        histogram[20] = 100;
        histogram[220] = 300;
        let level = otsu_level(&histogram).unwrap();
        assert!((20..220).contains(&level));
    }

    #[test]
    fn test_otsu_single_value() {
        let mut histogram = [0u64; 256];
        histogram[128] = 50;
        assert_eq!(otsu_level(&histogram), None);
    }

    #[test]
    fn test_minority_light_text() {
        // Light text on a dark background: the light class is the minority
        let mut gray = GrayImage::from_pixel(10, 10, Luma([10]));
        for x in 0..10 {
            gray.put_pixel(x, 5, Luma([240]));
        }
        let mask = GrayImage::from_pixel(10, 10, Luma([255]));

        let split = split_minority(&gray, &mask).unwrap();
        assert!(!split.text_is_dark);
        assert_eq!(split.text_count, 10);
        assert_eq!(split.background_count, 90);
        assert!(split.text[5 * 10 + 3]);
    }

    #[test]
    fn test_unmasked_pixels_ignored() {
        let mut gray = GrayImage::from_pixel(10, 10, Luma([200]));
        gray.put_pixel(0, 0, Luma([0]));
        let mut mask = GrayImage::from_pixel(10, 10, Luma([255]));
        mask.put_pixel(0, 0, Luma([0]));
        assert!(split_minority(&gray, &mask).is_none());
    }

    #[test]
    fn test_black_text_on_white() {
        let img = text_block();
        let mask = GrayImage::from_pixel(40, 20, Luma([255]));

        let result = adaptive_threshold(&img, &mask, 0.8, 30.0).unwrap();
        assert_eq!(result.source, ColorSource::AdaptiveThreshold);
        assert!(result.background.percentage > 70.0);
        assert!(result.foreground.percentage < 30.0);
        assert_eq!(result.background.rgb, [255, 255, 255]);
        assert!(result.foreground.brightness() < 60.0);
        assert!(result.background.distance(&result.foreground) > 30.0);
    }

    #[test]
    fn test_zero_sigma_skips_blur() {
        let img = text_block();
        let mask = GrayImage::from_pixel(40, 20, Luma([255]));

        let result = threshold_colors(&img, &mask, 0.0).unwrap();
        assert_eq!(result.background.rgb, [255, 255, 255]);
        assert_eq!(result.foreground.rgb, [0, 0, 0]);
    }

    #[test]
    fn test_low_contrast_rejected() {
        let mut img = RgbImage::from_pixel(20, 20, Rgb([120, 120, 120]));
        for x in 0..20 {
            img.put_pixel(x, 10, Rgb([130, 130, 130]));
        }
        let mask = GrayImage::from_pixel(20, 20, Luma([255]));
        assert!(adaptive_threshold(&img, &mask, 0.8, 30.0).is_none());
        assert!(threshold_colors(&img, &mask, 0.8).is_some());
    }
}
