// Color Extraction Service - dominant colors of masked image regions
// Weighted k-means on CPU (rayon) or GPU (candle, feature "gpu") with
// transparent CPU fallback.

pub mod analyzer;
pub mod gpu;
pub mod kmeans;
pub mod lab;
pub mod selector;
pub mod threshold;
pub mod weights;

pub use analyzer::{ColorAnalyzer, StrategyComparison};
pub use kmeans::{ClusterEngine, ClusterJob, CpuKmeans};
pub use selector::choose_background_foreground;
pub use threshold::adaptive_threshold;

use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::Arc;

use image::{GrayImage, RgbImage};
use ndarray::{Array1, Array2};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use tracing::{debug, info, trace, warn};

use crate::core::config::ColorConfig;
use crate::core::errors::ExtractionResult;
use crate::core::types::{Backend, ColorCluster, GpuPolicy};
use crate::utils::metrics::Metrics;

use self::weights::{pixel_weights, MaskedPixels};

/// Process-wide extractor, built on first use
static COLOR_EXTRACTOR: OnceCell<Arc<ColorExtractor>> = OnceCell::new();

/// Clusters plus the backend that actually produced them
pub type BackendClusters = (Vec<ColorCluster>, Backend);

/// Dominant-color extractor shared across requests
pub struct ColorExtractor {
    settings: ColorConfig,
    cpu: CpuKmeans,
    gpu: Option<Arc<dyn ClusterEngine>>,
    last_backend: Mutex<Backend>,
    metrics: Metrics,
}

impl ColorExtractor {
    /// Build an extractor, probing for a GPU engine unless the policy is `Never`
    pub fn new(config: ColorConfig) -> Self {
        let gpu = match config.use_gpu {
            GpuPolicy::Never => None,
            GpuPolicy::Auto | GpuPolicy::Force => gpu::detect_engine(config.gpu_device_ordinal),
        };
        Self::with_engine(config, gpu)
    }

    /// Build with an explicit GPU engine (or none)
    pub fn with_engine(config: ColorConfig, gpu: Option<Arc<dyn ClusterEngine>>) -> Self {
        let mut settings = config;
        settings.n_colors = settings.n_colors.max(1);
        settings.edge_bias = settings.edge_bias.clamp(0.05, 1.0);
        settings.max_iterations = settings.max_iterations.max(5);
        settings.min_pixels_for_gpu = settings.min_pixels_for_gpu.max(1);
        if settings.blur_sigma.is_nan() || settings.blur_sigma <= 0.0 {
            settings.blur_sigma = ColorConfig::default().blur_sigma;
        }

        Self {
            settings,
            cpu: CpuKmeans,
            gpu,
            last_backend: Mutex::new(Backend::Cpu),
            metrics: Metrics::new(),
        }
    }

    pub fn settings(&self) -> &ColorConfig {
        &self.settings
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn gpu_available(&self) -> bool {
        self.gpu.is_some()
    }

    pub fn gpu_device_name(&self) -> Option<String> {
        self.gpu.as_ref().and_then(|engine| engine.device_name())
    }

    pub fn last_backend_used(&self) -> Backend {
        *self.last_backend.lock()
    }

    /// Backend policy for a region of `pixel_count` masked pixels
    pub fn should_use_gpu(&self, pixel_count: usize) -> bool {
        if self.gpu.is_none() {
            return false;
        }

        match self.settings.use_gpu {
            GpuPolicy::Never => false,
            GpuPolicy::Force => true,
            GpuPolicy::Auto => pixel_count >= self.settings.min_pixels_for_gpu,
        }
    }

    /// Sample indices when `total` exceeds the backend's budget, `None` otherwise.
    ///
    /// With weights, draws without replacement proportionally to weight.
    pub fn select_sample_indices(
        &self,
        total: usize,
        use_gpu: bool,
        weights: Option<&[f64]>,
        rng: &mut StdRng,
    ) -> Option<Vec<usize>> {
        let limit = if use_gpu {
            self.settings.max_samples_gpu
        } else {
            self.settings.max_samples_cpu
        };

        if limit == 0 || total <= limit {
            return None;
        }

        if let Some(weights) = weights {
            match index::sample_weighted(rng, total, |i| weights[i], limit) {
                Ok(indices) => return Some(indices.into_vec()),
                Err(e) => debug!("Weighted sampling failed ({}), sampling uniformly", e),
            }
        }

        Some(index::sample(rng, total, limit).into_vec())
    }

    fn new_rng(&self) -> StdRng {
        match self.settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    /// Dominant colors of the masked pixels, sorted by percentage (descending).
    ///
    /// Empty when the mask is too small, dimensions disagree or clustering
    /// fails. Never returns an error.
    pub fn extract_colors(&self, region: &RgbImage, mask: &GrayImage) -> Vec<ColorCluster> {
        self.extract_with_backend(region, mask)
            .map(|(clusters, _)| clusters)
            .unwrap_or_default()
    }

    /// Same as `extract_colors`, also reporting which backend ran
    pub fn extract_with_backend(&self, region: &RgbImage, mask: &GrayImage) -> Option<BackendClusters> {
        if region.dimensions() != mask.dimensions() {
            warn!(
                "Region {:?} and mask {:?} dimensions differ, skipping color extraction",
                region.dimensions(),
                mask.dimensions()
            );
            return None;
        }

        let masked = MaskedPixels::collect(region, mask);
        if masked.len() < self.settings.min_pixels.max(1) {
            trace!("Mask covers {} pixels, below {}", masked.len(), self.settings.min_pixels);
            return None;
        }

        let weights = pixel_weights(region, mask, &masked, self.settings.edge_bias);
        let features = lab::to_features(&masked.pixels, self.settings.lab_space);
        let mut rng = self.new_rng();

        let use_gpu = self.should_use_gpu(masked.len());
        let sample = self.select_sample_indices(masked.len(), use_gpu, Some(&weights), &mut rng);

        let (sample_pixels, sample_features, sample_weights): (
            Cow<'_, [[u8; 3]]>,
            Cow<'_, [[f32; 3]]>,
            Cow<'_, [f64]>,
        ) = match &sample {
            Some(indices) => (
                indices.iter().map(|&i| masked.pixels[i]).collect(),
                indices.iter().map(|&i| features[i]).collect(),
                indices.iter().map(|&i| weights[i]).collect(),
            ),
            None => (
                Cow::Borrowed(&masked.pixels[..]),
                Cow::Borrowed(&features[..]),
                Cow::Borrowed(&weights[..]),
            ),
        };

        let distinct = sample_pixels.iter().collect::<HashSet<_>>().len();
        let k = self.settings.n_colors.min(distinct);
        if k == 0 {
            return None;
        }

        trace!(
            "Clustering {} pixels ({} sampled, {} distinct) into k={}",
            masked.len(),
            sample_features.len(),
            distinct,
            k
        );

        let job = ClusterJob {
            samples: &sample_features,
            weights: &sample_weights,
            k,
            max_iterations: self.settings.max_iterations,
        };

        if use_gpu {
            if let Some(engine) = self.gpu.as_deref() {
                match self.run_engine(engine, &job, &masked.pixels, &features, &weights, &mut rng) {
                    Ok(result) => return Some(result),
                    Err(e) => {
                        warn!("GPU clustering failed, falling back to CPU: {}", e);
                        self.metrics.record_gpu_fallback();
                    }
                }
            }
        }

        match self.run_engine(&self.cpu, &job, &masked.pixels, &features, &weights, &mut rng) {
            Ok(result) => Some(result),
            Err(e) => {
                warn!("Color clustering failed: {}", e);
                self.metrics.record_extraction_failed();
                None
            }
        }
    }

    fn run_engine(
        &self,
        engine: &dyn ClusterEngine,
        job: &ClusterJob<'_>,
        pixels: &[[u8; 3]],
        features: &[[f32; 3]],
        weights: &[f64],
        rng: &mut StdRng,
    ) -> ExtractionResult<BackendClusters> {
        let centroids = engine.fit(job, rng)?;
        let labels = engine.assign(features, &centroids)?;
        let backend = engine.backend();
        *self.last_backend.lock() = backend;
        Ok((aggregate(pixels, &labels, weights, centroids.len()), backend))
    }

    /// Human-readable backend line for diagnostics
    pub fn backend_status(&self) -> String {
        match (self.last_backend_used(), self.gpu_device_name()) {
            (Backend::Gpu, Some(name)) => format!("GPU ({})", name),
            (Backend::Gpu, None) => "GPU (CUDA)".to_string(),
            (Backend::Cpu, _) if !self.gpu_available() => "CPU (GPU backend not available)".to_string(),
            (Backend::Cpu, _) => "CPU".to_string(),
        }
    }
}

/// Weighted mean color and share of every non-empty cluster, largest first
pub fn aggregate(pixels: &[[u8; 3]], labels: &[usize], weights: &[f64], k: usize) -> Vec<ColorCluster> {
    if k == 0 {
        return Vec::new();
    }

    let mut counts = Array1::<f64>::zeros(k);
    let mut accum = Array2::<f64>::zeros((k, 3));

    for ((pixel, &label), &w) in pixels.iter().zip(labels).zip(weights) {
        if label >= k {
            continue;
        }
        counts[label] += w;
        for c in 0..3 {
            accum[[label, c]] += f64::from(pixel[c]) * w;
        }
    }

    let total = counts.sum();
    if total <= 0.0 {
        return Vec::new();
    }

    let mut order: Vec<usize> = (0..k).collect();
    order.sort_by(|&a, &b| counts[b].total_cmp(&counts[a]));

    order
        .into_iter()
        .filter(|&idx| counts[idx] > 0.0)
        .map(|idx| {
            let count = counts[idx].max(1e-8);
            let mut rgb = [0u8; 3];
            for (c, slot) in rgb.iter_mut().enumerate() {
                *slot = (accum[[idx, c]] / count).clamp(0.0, 255.0).round() as u8;
            }
            ColorCluster::new(rgb, (counts[idx] / total * 100.0) as f32)
        })
        .collect()
}

/// Get or initialize the global color extractor
pub fn get_color_extractor(config: &ColorConfig) -> Arc<ColorExtractor> {
    COLOR_EXTRACTOR
        .get_or_init(|| {
            let extractor = ColorExtractor::new(config.clone());
            info!("Color extractor initialized - {}", extractor.backend_status());
            Arc::new(extractor)
        })
        .clone()
}
