// sRGB → CIE LAB (D65) conversion used for clustering distances

use palette::{IntoColor, Lab, LinSrgb, Srgb};
use rayon::prelude::*;

/// Pixel count above which conversion is split across the rayon pool
const PARALLEL_THRESHOLD: usize = 16_384;

pub fn rgb_to_lab(rgb: [u8; 3]) -> [f32; 3] {
    let linear: LinSrgb<f32> = Srgb::new(rgb[0], rgb[1], rgb[2])
        .into_format::<f32>()
        .into_linear();
    let lab: Lab = linear.into_color();
    [lab.l, lab.a, lab.b]
}

/// Clustering features: LAB when `lab_space`, raw RGB otherwise
pub fn to_features(pixels: &[[u8; 3]], lab_space: bool) -> Vec<[f32; 3]> {
    if !lab_space {
        return pixels.iter().map(|p| p.map(f32::from)).collect();
    }

    if pixels.len() >= PARALLEL_THRESHOLD {
        pixels.par_iter().map(|&p| rgb_to_lab(p)).collect()
    } else {
        pixels.iter().map(|&p| rgb_to_lab(p)).collect()
    }
}
