// Background/foreground choice over clustered colors

use std::cmp::Ordering;

use crate::core::types::{ColorCluster, SelectorMode};

const BRIGHT_MIN_PERCENTAGE: f32 = 12.0;
const BRIGHT_MIN_BRIGHTNESS: f32 = 200.0;
const BRIGHT_MAX_SATURATION: f32 = 45.0;

const DARK_TOP_BRIGHTNESS: f32 = 130.0;
const ALT_MIN_PERCENTAGE: f32 = 15.0;
const ALT_MIN_BRIGHTNESS_GAP: f32 = 60.0;

fn by_pair(a: (f32, f32), b: (f32, f32)) -> Ordering {
    a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1))
}

/// Pick (background, foreground) from clusters; `None` only for empty input.
pub fn choose_background_foreground(
    clusters: &[ColorCluster],
    mode: SelectorMode,
) -> Option<(ColorCluster, ColorCluster)> {
    match mode {
        SelectorMode::Contrast => select_by_contrast(clusters),
        SelectorMode::Frequency => select_by_frequency(clusters),
    }
}

/// Largest cluster is background, second largest foreground
pub fn select_by_frequency(clusters: &[ColorCluster]) -> Option<(ColorCluster, ColorCluster)> {
    let mut sorted = clusters.to_vec();
    sorted.sort_by(|a, b| b.percentage.total_cmp(&a.percentage));

    let background = *sorted.first()?;
    let foreground = sorted.get(1).copied().unwrap_or(background);
    Some((background, foreground))
}

/// Brightness/saturation heuristics for the background, max RGB distance for
/// the foreground.
///
/// Prefers a bright, unsaturated, sizeable cluster as background. Without one,
/// a dark dominant cluster is swapped for a clearly brighter alternative so
/// inverted panels keep light speech bubbles as background.
pub fn select_by_contrast(clusters: &[ColorCluster]) -> Option<(ColorCluster, ColorCluster)> {
    // First maximal percentage wins ties
    let top = clusters
        .iter()
        .enumerate()
        .fold(None::<(usize, &ColorCluster)>, |best, (idx, c)| match best {
            Some((_, b)) if b.percentage >= c.percentage => best,
            _ => Some((idx, c)),
        })?;

    let mut background_idx = top.0;

    let bright = clusters
        .iter()
        .enumerate()
        .filter(|(_, c)| {
            c.percentage >= BRIGHT_MIN_PERCENTAGE
                && c.brightness() >= BRIGHT_MIN_BRIGHTNESS
                && c.saturation() <= BRIGHT_MAX_SATURATION
        })
        .max_by(|(_, a), (_, b)| {
            by_pair((a.percentage, a.brightness()), (b.percentage, b.brightness()))
        });

    if let Some((idx, _)) = bright {
        background_idx = idx;
    } else if top.1.brightness() < DARK_TOP_BRIGHTNESS {
        let top_brightness = top.1.brightness();
        let alternative = clusters
            .iter()
            .enumerate()
            .filter(|(idx, c)| {
                *idx != top.0
                    && c.percentage >= ALT_MIN_PERCENTAGE
                    && (c.brightness() - top_brightness).abs() >= ALT_MIN_BRIGHTNESS_GAP
            })
            .max_by(|(_, a), (_, b)| {
                by_pair((a.brightness(), a.percentage), (b.brightness(), b.percentage))
            });

        if let Some((idx, _)) = alternative {
            background_idx = idx;
        }
    }

    let background = clusters[background_idx];

    let foreground = clusters
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != background_idx)
        .fold(None::<(f32, ColorCluster)>, |best, (_, c)| {
            let d = c.distance(&background);
            match best {
                Some((best_d, _)) if best_d >= d => best,
                _ => Some((d, *c)),
            }
        })
        .map(|(_, c)| c)
        .unwrap_or(background);

    Some((background, foreground))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(rgb: [u8; 3], pct: f32) -> ColorCluster {
        ColorCluster::new(rgb, pct)
    }

    #[test]
    fn test_empty_and_single() {
        assert!(select_by_contrast(&[]).is_none());
        let only = c([40, 40, 40], 100.0);
        assert_eq!(select_by_contrast(&[only]), Some((only, only)));
        assert_eq!(select_by_frequency(&[only]), Some((only, only)));
    }

    #[test]
    fn test_bright_candidate_beats_larger_dark() {
        let clusters = [
            c([20, 20, 30], 55.0),
            c([250, 250, 245], 30.0),
            c([120, 40, 40], 15.0),
        ];
        let (bg, fg) = select_by_contrast(&clusters).unwrap();
        assert_eq!(bg.rgb, [250, 250, 245]);
        assert_eq!(fg.rgb, [20, 20, 30]);
    }

    #[test]
    fn test_bright_candidates_ranked_by_percentage() {
        let clusters = [c([230, 230, 230], 40.0), c([255, 255, 255], 20.0), c([0, 0, 0], 40.0)];
        let (bg, fg) = select_by_contrast(&clusters).unwrap();
        assert_eq!(bg.rgb, [230, 230, 230]);
        assert_eq!(fg.rgb, [0, 0, 0]);
    }

    #[test]
    fn test_dark_top_switches_to_brighter_alternative() {
        // Saturated yellow is not a "bright" candidate, but is far brighter
        let clusters = [
            c([10, 10, 10], 60.0),
            c([240, 200, 30], 25.0),
            c([100, 100, 100], 15.0),
        ];
        let (bg, fg) = select_by_contrast(&clusters).unwrap();
        assert_eq!(bg.rgb, [240, 200, 30]);
        assert_eq!(fg.rgb, [10, 10, 10]);
    }

    #[test]
    fn test_mid_tone_top_kept() {
        let clusters = [c([150, 150, 150], 70.0), c([250, 100, 100], 30.0)];
        let (bg, fg) = select_by_contrast(&clusters).unwrap();
        assert_eq!(bg.rgb, [150, 150, 150]);
        assert_eq!(fg.rgb, [250, 100, 100]);
    }

    #[test]
    fn test_foreground_is_max_contrast_not_second_largest() {
        let clusters = [
            c([255, 255, 255], 70.0),
            c([200, 200, 200], 20.0),
            c([0, 0, 0], 10.0),
        ];
        let (bg, fg) = select_by_contrast(&clusters).unwrap();
        assert_eq!(bg.rgb, [255, 255, 255]);
        assert_eq!(fg.rgb, [0, 0, 0]);

        let (bg, fg) = select_by_frequency(&clusters).unwrap();
        assert_eq!(bg.rgb, [255, 255, 255]);
        assert_eq!(fg.rgb, [200, 200, 200]);
    }

    #[test]
    fn test_distinct_clusters_give_distinct_pair() {
        let clusters = [c([128, 0, 0], 50.0), c([0, 0, 128], 50.0)];
        let (bg, fg) = choose_background_foreground(&clusters, SelectorMode::Contrast).unwrap();
        assert_ne!(bg, fg);
        assert_eq!(bg.rgb, [128, 0, 0]);
    }
}
