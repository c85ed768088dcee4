// Region-level color analysis: polygon → mask → threshold or clustering →
// background/foreground pair

use std::sync::Arc;
use std::time::Instant;

use image::{imageops, GrayImage, Luma, RgbImage};
use tracing::{debug, instrument, trace};

use super::selector::choose_background_foreground;
use super::threshold::{adaptive_threshold, threshold_colors};
use super::ColorExtractor;
use crate::core::types::{rgb_distance, ColorResult, ExtractionStrategy};
use crate::utils::geometry::{count_mask_pixels, Polygon, Region};

/// Clusters rounding to 0.0% are dropped before selection
const MIN_REPORTED_PERCENTAGE: f32 = 0.05;

/// Both strategies run side by side on one region
#[derive(Debug, Clone)]
pub struct StrategyComparison {
    /// Threshold split regardless of contrast
    pub adaptive: Option<ColorResult>,
    /// Whether the threshold split met the contrast floor
    pub adaptive_accepted: bool,
    pub clustering: Option<ColorResult>,
}

pub struct ColorAnalyzer {
    extractor: Arc<ColorExtractor>,
}

impl ColorAnalyzer {
    pub fn new(extractor: Arc<ColorExtractor>) -> Self {
        Self { extractor }
    }

    pub fn extractor(&self) -> &ColorExtractor {
        &self.extractor
    }

    /// Colors of a polygonal region of `image`; `None` when it cannot be analyzed
    #[instrument(skip_all, fields(points = polygon.len()))]
    pub fn analyze(&self, image: &RgbImage, polygon: &Polygon) -> Option<ColorResult> {
        let region = match Region::from_polygon(polygon, image.width(), image.height()) {
            Ok(region) => region,
            Err(e) => {
                debug!("Skipping color extraction: {}", e);
                self.extractor.metrics().record_extraction_skipped();
                return None;
            }
        };

        if let Err(e) = region.require_pixels(self.extractor.settings().min_pixels) {
            debug!("Skipping color extraction: {}", e);
            self.extractor.metrics().record_extraction_skipped();
            return None;
        }

        let crop = imageops::crop_imm(
            image,
            region.bbox.x_min as u32,
            region.bbox.y_min as u32,
            region.width(),
            region.height(),
        )
        .to_image();

        self.analyze_region(&crop, &region.mask)
    }

    /// Whole-image analysis with a full mask
    pub fn analyze_image(&self, image: &RgbImage) -> Option<ColorResult> {
        let mask = GrayImage::from_pixel(image.width(), image.height(), Luma([255]));
        self.analyze_region(image, &mask)
    }

    /// Run the configured strategy on an already cropped region
    pub fn analyze_region(&self, crop: &RgbImage, mask: &GrayImage) -> Option<ColorResult> {
        let settings = self.extractor.settings();
        if crop.dimensions() != mask.dimensions() || count_mask_pixels(mask) < settings.min_pixels {
            self.extractor.metrics().record_extraction_skipped();
            return None;
        }

        let started = Instant::now();

        if settings.strategy == ExtractionStrategy::AdaptiveThenClustering {
            if let Some(result) = adaptive_threshold(crop, mask, settings.blur_sigma, settings.min_contrast) {
                trace!("Adaptive threshold accepted in {:?}", started.elapsed());
                self.extractor.metrics().record_extraction(result.source, started.elapsed());
                return Some(result);
            }
        }

        let result = self.cluster_colors(crop, mask)?;
        self.extractor.metrics().record_extraction(result.source, started.elapsed());
        Some(result)
    }

    /// Clustering path only: k-means then background/foreground selection
    pub fn cluster_colors(&self, crop: &RgbImage, mask: &GrayImage) -> Option<ColorResult> {
        let (clusters, backend) = self.extractor.extract_with_backend(crop, mask)?;

        let clusters: Vec<_> = clusters
            .into_iter()
            .filter(|c| c.percentage >= MIN_REPORTED_PERCENTAGE)
            .collect();

        let Some((background, foreground)) =
            choose_background_foreground(&clusters, self.extractor.settings().selector)
        else {
            self.extractor.metrics().record_extraction_failed();
            return None;
        };

        trace!(
            "Selected background {} ({:.1}%), foreground {} ({:.1}%) on {}",
            background.hex(),
            background.percentage,
            foreground.hex(),
            foreground.percentage,
            backend
        );

        Some(ColorResult {
            background,
            foreground,
            source: backend.into(),
        })
    }

    /// Run both strategies independently on the same region
    pub fn compare(&self, crop: &RgbImage, mask: &GrayImage) -> StrategyComparison {
        let settings = self.extractor.settings();
        let adaptive = threshold_colors(crop, mask, settings.blur_sigma);
        let adaptive_accepted = adaptive
            .map(|r| rgb_distance(r.background.rgb, r.foreground.rgb) >= settings.min_contrast)
            .unwrap_or(false);

        StrategyComparison {
            adaptive,
            adaptive_accepted,
            clustering: self.cluster_colors(crop, mask),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ColorConfig;
    use crate::core::types::ColorSource;
    use crate::utils::geometry::BoundingBox;
    use image::Rgb;

    fn analyzer(config: ColorConfig) -> ColorAnalyzer {
        ColorAnalyzer::new(Arc::new(ColorExtractor::with_engine(config, None)))
    }

    fn seeded() -> ColorConfig {
        ColorConfig {
            seed: Some(11),
            ..ColorConfig::default()
        }
    }

    fn black_text_on_white() -> RgbImage {
        let mut img = RgbImage::from_pixel(40, 20, Rgb([255, 255, 255]));
        for y in 8..12 {
            for x in 5..35 {
                img.put_pixel(x, y, Rgb([0, 0, 0]));
            }
        }
        img
    }

    #[test]
    fn test_black_text_on_white_uses_fast_path() {
        let analyzer = analyzer(seeded());
        let result = analyzer.analyze_image(&black_text_on_white()).unwrap();

        assert_eq!(result.source, ColorSource::AdaptiveThreshold);
        assert!(result.background.percentage > 70.0);
        assert!(result.foreground.percentage < 30.0);
        assert_eq!(result.background.rgb, [255, 255, 255]);
    }

    #[test]
    fn test_non_positive_blur_sigma() {
        let analyzer = analyzer(ColorConfig {
            blur_sigma: 0.0,
            ..seeded()
        });
        let blank = RgbImage::from_pixel(20, 20, Rgb([255, 255, 255]));
        let _ = analyzer.analyze_image(&blank);

        let result = analyzer.analyze_image(&black_text_on_white()).unwrap();
        assert_eq!(result.background.rgb, [255, 255, 255]);
    }

    #[test]
    fn test_clustering_only_strategy() {
        let analyzer = analyzer(ColorConfig {
            strategy: ExtractionStrategy::ClusteringOnly,
            ..seeded()
        });
        let result = analyzer.analyze_image(&black_text_on_white()).unwrap();

        assert_eq!(result.source, ColorSource::KmeansCpu);
        assert_eq!(result.background.rgb, [255, 255, 255]);
        assert_eq!(result.foreground.rgb, [0, 0, 0]);
        assert_ne!(result.background, result.foreground);
    }

    #[test]
    fn test_low_contrast_falls_through_to_clustering() {
        let mut img = RgbImage::from_pixel(30, 30, Rgb([120, 120, 120]));
        for y in 12..16 {
            for x in 3..27 {
                img.put_pixel(x, y, Rgb([135, 130, 128]));
            }
        }
        let result = analyzer(seeded()).analyze_image(&img).unwrap();
        assert_eq!(result.source, ColorSource::KmeansCpu);
    }

    #[test]
    fn test_polygon_outside_image_skipped() {
        let analyzer = analyzer(seeded());
        let img = black_text_on_white();
        let polygon = Polygon::from_bbox(&BoundingBox::new(100, 100, 140, 140));
        assert!(analyzer.analyze(&img, &polygon).is_none());
        assert_eq!(analyzer.extractor().metrics().snapshot().extractions_skipped, 1);

        let tiny = Polygon::from_bbox(&BoundingBox::new(0, 0, 3, 3));
        assert!(analyzer.analyze(&img, &tiny).is_none());
    }

    #[test]
    fn test_polygon_crop() {
        let analyzer = analyzer(seeded());
        let mut page = RgbImage::from_pixel(100, 80, Rgb([30, 30, 30]));
        for y in 20..60 {
            for x in 30..70 {
                page.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        for y in 38..42 {
            for x in 35..65 {
                page.put_pixel(x, y, Rgb([0, 0, 0]));
            }
        }

        let polygon = Polygon::from_bbox(&BoundingBox::new(30, 20, 70, 60));
        let result = analyzer.analyze(&page, &polygon).unwrap();
        assert_eq!(result.background.rgb, [255, 255, 255]);
        assert!(result.foreground.brightness() < 60.0);
    }

    #[test]
    fn test_compare_runs_both() {
        let analyzer = analyzer(seeded());
        let img = black_text_on_white();
        let mask = GrayImage::from_pixel(40, 20, Luma([255]));
        let comparison = analyzer.compare(&img, &mask);

        assert!(comparison.adaptive_accepted);
        let adaptive = comparison.adaptive.unwrap();
        let clustering = comparison.clustering.unwrap();
        assert_eq!(adaptive.background.rgb, clustering.background.rgb);
        assert_eq!(clustering.source, ColorSource::KmeansCpu);
    }
}
