// Post-detection filtering: label/confidence gate, letterbox unpadding,
// minimum-size gate, clipping and smaller-area overlap suppression.

pub mod letterbox;

pub use letterbox::{letterbox, Letterbox, MIN_DETECTOR_DIMENSION};

use tracing::{debug, trace};

use crate::core::config::DetectionConfig;
use crate::core::types::Detection;
use crate::utils::geometry::{overlap_percent, BoundingBox, Polygon};
use crate::utils::metrics::Metrics;

/// Anything with a box and a precomputed area can be deduplicated
pub trait Suppressible {
    fn bounds(&self) -> &BoundingBox;
    fn suppression_area(&self) -> i64;
}

impl Suppressible for Detection {
    fn bounds(&self) -> &BoundingBox {
        &self.bbox
    }

    fn suppression_area(&self) -> i64 {
        self.area
    }
}

impl Suppressible for BoundingBox {
    fn bounds(&self) -> &BoundingBox {
        self
    }

    fn suppression_area(&self) -> i64 {
        self.area()
    }
}

/// Indices (ascending) of the regions surviving overlap suppression.
///
/// Pairs are visited as `i < j` in input order. When a pair overlaps by more
/// than `overlap_allowed_percent` of the smaller area, the strictly smaller
/// region is removed; on an area tie the later one goes. A removed region is
/// skipped in every later comparison.
pub fn suppress_overlaps<T: Suppressible>(items: &[T], overlap_allowed_percent: f32) -> Vec<usize> {
    if items.is_empty() {
        debug!("Dedup: No regions to filter");
        return vec![];
    }

    trace!(
        "Dedup: Processing {} regions with overlap threshold={}%",
        items.len(),
        overlap_allowed_percent
    );

    let mut removed = vec![false; items.len()];
    let mut removed_count = 0;

    for i in 0..items.len() {
        if removed[i] {
            continue;
        }

        for j in (i + 1)..items.len() {
            if removed[j] {
                continue;
            }

            let (a, b) = (&items[i], &items[j]);
            let overlap = overlap_percent(
                a.bounds(),
                a.suppression_area(),
                b.bounds(),
                b.suppression_area(),
            );

            if overlap > overlap_allowed_percent {
                removed_count += 1;
                if a.suppression_area() < b.suppression_area() {
                    removed[i] = true;
                    trace!("Dedup: Removed region {} ({:.1}% inside region {})", i, overlap, j);
                    break;
                }
                removed[j] = true;
                trace!("Dedup: Removed region {} ({:.1}% inside region {})", j, overlap, i);
            }
        }
    }

    let keep: Vec<usize> = (0..items.len()).filter(|&i| !removed[i]).collect();
    debug!(
        "Dedup: Kept {}/{} regions (removed {})",
        keep.len(),
        items.len(),
        removed_count
    );
    keep
}

/// Drop redundant regions, preserving the input order of survivors
pub fn deduplicate<T: Suppressible>(items: Vec<T>, overlap_allowed_percent: f32) -> Vec<T> {
    let keep = suppress_overlaps(&items, overlap_allowed_percent);
    let mut keep = keep.into_iter().peekable();

    items
        .into_iter()
        .enumerate()
        .filter_map(|(idx, item)| {
            if keep.peek() == Some(&idx) {
                keep.next();
                Some(item)
            } else {
                None
            }
        })
        .collect()
}

/// Turns raw detector output into deduplicated text regions in page space
#[derive(Clone)]
pub struct DetectionFilter {
    config: DetectionConfig,
    metrics: Option<Metrics>,
}

impl DetectionFilter {
    pub fn new(config: DetectionConfig) -> Self {
        Self {
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Keep confident text detections, map them back through the letterbox,
    /// gate on minimum size (before clipping), clip to the page, then dedup.
    pub fn filter(&self, raw: Vec<Detection>, letterbox: &Letterbox<'_>) -> Vec<Detection> {
        let total = raw.len();
        let (width, height) = (letterbox.original_width, letterbox.original_height);

        if let Some(metrics) = &self.metrics {
            raw.iter().for_each(|det| metrics.record_detection(&det.label));
        }

        let labelled: Vec<Detection> = raw
            .into_iter()
            .filter(|det| {
                det.label == self.config.text_label
                    && det.confidence >= self.config.confidence_threshold
            })
            .collect();
        let labelled_count = labelled.len();

        let candidates: Vec<Detection> = labelled
            .into_iter()
            .filter_map(|det| {
                let unpadded = letterbox.unpad_bbox(&det.bbox);

                if unpadded.width() < self.config.min_region_width
                    || unpadded.height() < self.config.min_region_height
                {
                    trace!(
                        "Skipping small region {}x{} at ({}, {})",
                        unpadded.width(),
                        unpadded.height(),
                        unpadded.x_min,
                        unpadded.y_min
                    );
                    return None;
                }

                let bbox = unpadded.clip(width, height);
                let polygon = if det.polygon.len() >= 3 {
                    letterbox.unpad_polygon(&det.polygon)
                } else {
                    Polygon::from_bbox(&bbox)
                };

                Some(Detection::new(det.label, det.confidence, bbox, polygon))
            })
            .collect();

        debug!(
            "Filtered {}/{} detections (label='{}', conf>={:.2}, min size {}x{})",
            candidates.len(),
            total,
            self.config.text_label,
            self.config.confidence_threshold,
            self.config.min_region_width,
            self.config.min_region_height
        );

        let candidate_count = candidates.len();
        let kept = deduplicate(candidates, self.config.overlap_allowed_percent);

        if let Some(metrics) = &self.metrics {
            metrics.record_filtering(labelled_count - candidate_count, candidate_count - kept.len());
        }

        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn bbox(x0: i32, y0: i32, x1: i32, y1: i32) -> BoundingBox {
        BoundingBox::new(x0, y0, x1, y1)
    }

    #[test]
    fn test_contained_box_removed_regardless_of_order() {
        let big = bbox(0, 0, 100, 100);
        let small = bbox(10, 10, 30, 30);

        assert_eq!(deduplicate(vec![big, small], 50.0), vec![big]);
        assert_eq!(deduplicate(vec![small, big], 50.0), vec![big]);
        // Even a nearly-total allowance removes a fully contained box
        assert_eq!(deduplicate(vec![small, big], 99.9), vec![big]);
    }

    #[test]
    fn test_threshold_is_strict() {
        // Overlap of exactly 50% of the smaller box is allowed
        let a = bbox(0, 0, 20, 10);
        let b = bbox(10, 0, 30, 10);
        assert_eq!(deduplicate(vec![a, b], 50.0).len(), 2);
        assert_eq!(deduplicate(vec![a, b], 49.0).len(), 1);
    }

    #[test]
    fn test_equal_area_keeps_first() {
        let a = bbox(0, 0, 10, 10);
        let b = bbox(1, 1, 11, 11);
        assert_eq!(suppress_overlaps(&[a, b], 50.0), vec![0]);
    }

    #[test]
    fn test_removed_region_skipped_later() {
        // 0 falls to 1 and stops comparing; 1 then removes 2
        let tiny = bbox(0, 0, 10, 10);
        let large = bbox(0, 0, 100, 100);
        let medium = bbox(0, 0, 12, 12);
        let keep = suppress_overlaps(&[tiny, large, medium], 50.0);
        assert_eq!(keep, vec![1]);
    }

    #[test]
    fn test_zero_area_never_suppressed() {
        let flat = bbox(5, 5, 5, 50);
        let other = bbox(0, 0, 100, 100);
        assert_eq!(suppress_overlaps(&[flat, other], 10.0), vec![0, 1]);
    }

    #[test]
    fn test_idempotent_and_order_preserving() {
        let boxes = vec![
            bbox(0, 0, 50, 50),
            bbox(200, 200, 260, 240),
            bbox(5, 5, 20, 20),
            bbox(300, 0, 340, 90),
            bbox(210, 205, 250, 230),
            bbox(40, 40, 90, 90),
        ];
        let once = deduplicate(boxes, 50.0);
        let twice = deduplicate(once.clone(), 50.0);
        assert_eq!(once, twice);
        assert_eq!(
            once,
            vec![
                bbox(0, 0, 50, 50),
                bbox(200, 200, 260, 240),
                bbox(300, 0, 340, 90),
                bbox(40, 40, 90, 90),
            ]
        );
    }

    #[test]
    fn test_filter_pipeline() {
        let page = RgbImage::new(200, 100);
        let lb = letterbox(&page, MIN_DETECTOR_DIMENSION);
        let (px, py) = (lb.pad_x as i32, lb.pad_y as i32);

        let raw = vec![
            // kept, partially off the left edge
            Detection::from_bbox("text", 0.9, bbox(px - 5, py + 10, px + 40, py + 40)),
            // wrong label
            Detection::from_bbox("bubble", 0.9, bbox(px + 60, py + 10, px + 120, py + 60)),
            // low confidence
            Detection::from_bbox("text", 0.3, bbox(px + 60, py + 10, px + 120, py + 60)),
            // too small
            Detection::from_bbox("text", 0.9, bbox(px + 150, py + 10, px + 155, py + 60)),
            // contained in the next one
            Detection::from_bbox("text", 0.8, bbox(px + 110, py + 20, px + 130, py + 40)),
            Detection::from_bbox("text", 0.7, bbox(px + 100, py + 10, px + 180, py + 90)),
        ];

        let metrics = Metrics::new();
        let filter = DetectionFilter::new(DetectionConfig::default()).with_metrics(metrics.clone());
        let kept = filter.filter(raw, &lb);

        assert_eq!(kept.len(), 2);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.detections_by_label.get("text"), Some(&5));
        assert_eq!(snapshot.regions_too_small, 1);
        assert_eq!(snapshot.regions_suppressed, 1);
        assert_eq!(kept[0].bbox, bbox(0, 10, 40, 40));
        assert_eq!(kept[0].area, 40 * 30);
        assert_eq!(kept[0].polygon.points[0], [0.0, 10.0]);
        assert_eq!(kept[1].bbox, bbox(100, 10, 180, 90));
    }
}
