// Region pipeline: detector output → filtered regions → recognized text with
// color metadata

pub mod orientation;

pub use orientation::detect_text_orientation;

use std::sync::Arc;

use image::RgbImage;
use rayon::prelude::*;
use tracing::{debug, info, instrument, warn};

use crate::core::config::{ColorConfig, Config, DetectionConfig};
use crate::core::errors::{PipelineError, PipelineResult};
use crate::core::types::{Detection, PageResult, RecognizedText, TextObject};
use crate::services::color::{get_color_extractor, ColorAnalyzer, ColorExtractor};
use crate::services::detection::{letterbox, DetectionFilter, Letterbox};
use crate::utils::geometry::Polygon;
use crate::utils::image_ops::crop_to_bbox;
use crate::utils::metrics::Metrics;

/// External region detector (model inference lives outside this crate)
pub trait RegionDetector: Send + Sync {
    /// Detections in the coordinate space of `image` (the letterboxed canvas)
    fn detect(&self, image: &RgbImage) -> anyhow::Result<Vec<Detection>>;
}

/// External text recognizer run on each cropped region
pub trait TextRecognizer: Send + Sync {
    /// `Ok(None)` when the region holds no text
    fn recognize(&self, region: &RgbImage) -> anyhow::Result<Option<RecognizedText>>;
}

pub struct RegionPipeline {
    filter: DetectionFilter,
    analyzer: ColorAnalyzer,
    recognizer: Arc<dyn TextRecognizer>,
    detection: DetectionConfig,
    metrics: Metrics,
}

impl RegionPipeline {
    /// Build a pipeline around the process-wide color extractor
    pub fn new(config: &Config, recognizer: Arc<dyn TextRecognizer>) -> Self {
        let extractor = get_color_extractor(&config.color);
        Self::with_extractor(config.detection.clone(), extractor, recognizer)
    }

    /// Build with an explicit extractor (tests, custom engines)
    pub fn with_extractor(
        detection: DetectionConfig,
        extractor: Arc<ColorExtractor>,
        recognizer: Arc<dyn TextRecognizer>,
    ) -> Self {
        let metrics = extractor.metrics().clone();
        Self {
            filter: DetectionFilter::new(detection.clone()).with_metrics(metrics.clone()),
            analyzer: ColorAnalyzer::new(extractor),
            recognizer,
            detection,
            metrics,
        }
    }

    /// CPU-only pipeline with its own extractor
    pub fn cpu_only(detection: DetectionConfig, color: ColorConfig, recognizer: Arc<dyn TextRecognizer>) -> Self {
        let extractor = Arc::new(ColorExtractor::with_engine(color, None));
        Self::with_extractor(detection, extractor, recognizer)
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn analyzer(&self) -> &ColorAnalyzer {
        &self.analyzer
    }

    /// Pad a page for the detector
    pub fn prepare<'a>(&self, image: &'a RgbImage) -> Letterbox<'a> {
        letterbox(image, self.detection.min_detector_dimension)
    }

    /// Letterbox, detect, then process one page
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn run_page(&self, detector: &dyn RegionDetector, image: &RgbImage) -> PipelineResult<PageResult> {
        let padded = self.prepare(image);
        let raw = detector
            .detect(&padded.image)
            .map_err(|e| PipelineError::Detection(e.to_string()))?;
        debug!("Detector returned {} regions", raw.len());
        Ok(self.process(image, &padded, raw))
    }

    /// Process detector output for a page that was padded with `padded`
    pub fn process(&self, image: &RgbImage, padded: &Letterbox<'_>, raw: Vec<Detection>) -> PageResult {
        let detections = self.filter.filter(raw, padded);

        let texts: Vec<TextObject> = detections
            .par_iter()
            .enumerate()
            .filter_map(|(idx, det)| self.process_region(image, idx, det))
            .collect();

        self.metrics.record_page_processed();
        info!(
            "Page processed: {} regions kept, {} with text",
            detections.len(),
            texts.len()
        );

        PageResult {
            deduplicated_detections: detections,
            texts,
        }
    }

    fn process_region(&self, image: &RgbImage, idx: usize, det: &Detection) -> Option<TextObject> {
        let crop = crop_to_bbox(image, &det.bbox)?;

        let recognized = match self.recognizer.recognize(&crop) {
            Ok(Some(recognized)) if !recognized.text.trim().is_empty() => recognized,
            Ok(_) => return None,
            Err(e) => {
                let err = PipelineError::Recognition {
                    region_index: idx,
                    message: e.to_string(),
                };
                warn!("{}", err);
                self.metrics.record_recognizer_failure();
                return None;
            }
        };

        let polygon = if det.polygon.len() >= 3 {
            det.polygon.clone()
        } else {
            Polygon::from_bbox(&det.bbox)
        };
        let colors = self.analyzer.analyze(image, &polygon);

        let (width, height) = (det.bbox.width(), det.bbox.height());
        let mut text = TextObject {
            text: recognized.text,
            x: det.bbox.x_min,
            y: det.bbox.y_min,
            width,
            height,
            vertices: det.bbox.vertices(),
            confidence: recognized.confidence,
            background_color: None,
            foreground_color: None,
            color_source: None,
            text_orientation: Some(detect_text_orientation(
                width,
                height,
                self.detection.orientation_aspect_threshold,
            )),
        };
        text.attach_colors(colors.as_ref());

        Some(text)
    }

    /// Run a page on the blocking thread pool
    pub async fn run_page_async(
        self: Arc<Self>,
        detector: Arc<dyn RegionDetector>,
        image: RgbImage,
    ) -> PipelineResult<PageResult> {
        tokio::task::spawn_blocking(move || self.run_page(detector.as_ref(), &image))
            .await
            .map_err(|e| PipelineError::TaskJoinFailed(e.to_string()))?
    }
}
