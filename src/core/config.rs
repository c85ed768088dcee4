use crate::core::errors::ConfigError;
use crate::core::types::{ExtractionStrategy, GpuPolicy, SelectorMode};
use std::env;
use std::str::FromStr;
use tracing::Level;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub log_level: Level,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { log_level: Level::INFO }
    }
}

/// Detector output filtering configuration
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    /// Images smaller than this (either axis) are letterboxed before detection
    pub min_detector_dimension: u32,
    pub min_region_width: i32,
    pub min_region_height: i32,
    /// Smaller-area-relative overlap above which the smaller region is dropped
    pub overlap_allowed_percent: f32,
    pub confidence_threshold: f32,
    /// Detector label that marks text regions
    pub text_label: String,
    pub orientation_aspect_threshold: f32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_detector_dimension: 640,
            min_region_width: 10,
            min_region_height: 10,
            overlap_allowed_percent: 50.0,
            confidence_threshold: 0.60,
            text_label: "text".to_string(),
            orientation_aspect_threshold: 1.2,
        }
    }
}

/// Color extraction configuration
#[derive(Debug, Clone)]
pub struct ColorConfig {
    pub n_colors: usize,
    pub lab_space: bool,
    pub use_gpu: GpuPolicy,
    /// Weight multiplier for mask-boundary pixels
    pub edge_bias: f32,
    pub max_iterations: usize,
    pub max_samples_gpu: usize,
    pub max_samples_cpu: usize,
    pub min_pixels_for_gpu: usize,
    /// Minimum RGB distance for the adaptive threshold result to be accepted
    pub min_contrast: f32,
    /// Minimum masked pixels required to attempt extraction
    pub min_pixels: usize,
    pub blur_sigma: f32,
    pub strategy: ExtractionStrategy,
    pub selector: SelectorMode,
    /// Fixed RNG seed for sampling and centroid init (None = entropy)
    pub seed: Option<u64>,
    pub gpu_device_ordinal: usize,
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            n_colors: 4,
            lab_space: true,
            use_gpu: GpuPolicy::Auto,
            edge_bias: 0.4,
            max_iterations: 20,
            max_samples_gpu: 150_000,
            max_samples_cpu: 40_000,
            min_pixels_for_gpu: 1_500,
            min_contrast: 30.0,
            min_pixels: 15,
            blur_sigma: 0.8,
            strategy: ExtractionStrategy::AdaptiveThenClustering,
            selector: SelectorMode::Contrast,
            seed: None,
            gpu_device_ordinal: 0,
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub detection: DetectionConfig,
    pub color: ColorConfig,
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_variant<T: FromStr<Err = ConfigError>>(key: &str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw.parse(),
        _ => Ok(default),
    }
}

impl Config {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let config = Self::load_from_env()?;
        config.validate()?;
        Ok(config)
    }

    fn load_from_env() -> Result<Self, ConfigError> {
        let log_level = env::var("LOG_LEVEL")
            .ok()
            .and_then(|s| match s.to_lowercase().as_str() {
                "trace" => Some(Level::TRACE),
                "debug" => Some(Level::DEBUG),
                "info" => Some(Level::INFO),
                "warn" | "warning" => Some(Level::WARN),
                "error" => Some(Level::ERROR),
                _ => None,
            })
            .unwrap_or(Level::INFO);

        let detection_defaults = DetectionConfig::default();
        let color_defaults = ColorConfig::default();

        Ok(Self {
            logging: LoggingConfig { log_level },
            detection: DetectionConfig {
                min_detector_dimension: env_parse("MIN_DETECTOR_DIMENSION")
                    .unwrap_or(detection_defaults.min_detector_dimension),
                min_region_width: env_parse("MIN_REGION_WIDTH")
                    .unwrap_or(detection_defaults.min_region_width),
                min_region_height: env_parse("MIN_REGION_HEIGHT")
                    .unwrap_or(detection_defaults.min_region_height),
                overlap_allowed_percent: env_parse("OVERLAP_ALLOWED_PERCENT")
                    .unwrap_or(detection_defaults.overlap_allowed_percent),
                confidence_threshold: env_parse("DETECTION_CONFIDENCE")
                    .unwrap_or(detection_defaults.confidence_threshold),
                text_label: env::var("TEXT_LABEL")
                    .ok()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .unwrap_or(detection_defaults.text_label),
                orientation_aspect_threshold: env_parse("ORIENTATION_ASPECT_THRESHOLD")
                    .unwrap_or(detection_defaults.orientation_aspect_threshold),
            },
            color: ColorConfig {
                n_colors: env_parse("COLOR_N_COLORS").unwrap_or(color_defaults.n_colors),
                lab_space: env_parse("COLOR_LAB_SPACE").unwrap_or(color_defaults.lab_space),
                use_gpu: env_variant("COLOR_USE_GPU", color_defaults.use_gpu)?,
                edge_bias: env_parse("COLOR_EDGE_BIAS").unwrap_or(color_defaults.edge_bias),
                max_iterations: env_parse("COLOR_MAX_ITERATIONS")
                    .unwrap_or(color_defaults.max_iterations),
                max_samples_gpu: env_parse("COLOR_MAX_SAMPLES_GPU")
                    .unwrap_or(color_defaults.max_samples_gpu),
                max_samples_cpu: env_parse("COLOR_MAX_SAMPLES_CPU")
                    .unwrap_or(color_defaults.max_samples_cpu),
                min_pixels_for_gpu: env_parse("COLOR_MIN_PIXELS_FOR_GPU")
                    .unwrap_or(color_defaults.min_pixels_for_gpu),
                min_contrast: env_parse("COLOR_MIN_CONTRAST")
                    .unwrap_or(color_defaults.min_contrast),
                min_pixels: env_parse("COLOR_MIN_PIXELS").unwrap_or(color_defaults.min_pixels),
                blur_sigma: env_parse("COLOR_BLUR_SIGMA").unwrap_or(color_defaults.blur_sigma),
                strategy: env_variant("COLOR_STRATEGY", color_defaults.strategy)?,
                selector: env_variant("COLOR_SELECTOR", color_defaults.selector)?,
                seed: env_parse("COLOR_SEED"),
                gpu_device_ordinal: env_parse("COLOR_GPU_DEVICE")
                    .unwrap_or(color_defaults.gpu_device_ordinal),
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let detection = &self.detection;

        if !(0.0..=100.0).contains(&detection.overlap_allowed_percent) {
            return Err(ConfigError::InvalidOverlapPercent(
                detection.overlap_allowed_percent,
            ));
        }

        if !(0.0..=1.0).contains(&detection.confidence_threshold) {
            return Err(ConfigError::InvalidConfidenceThreshold(
                detection.confidence_threshold,
            ));
        }

        if detection.min_detector_dimension == 0 {
            return Err(ConfigError::InvalidDetectionConfig(
                "min_detector_dimension must be > 0".to_string(),
            ));
        }

        if detection.min_region_width < 0 || detection.min_region_height < 0 {
            return Err(ConfigError::InvalidDetectionConfig(format!(
                "minimum region size must be non-negative, got {}x{}",
                detection.min_region_width, detection.min_region_height
            )));
        }

        if detection.orientation_aspect_threshold < 1.0 {
            return Err(ConfigError::InvalidDetectionConfig(format!(
                "orientation_aspect_threshold must be >= 1.0, got {}",
                detection.orientation_aspect_threshold
            )));
        }

        let color = &self.color;

        if color.n_colors == 0 {
            return Err(ConfigError::InvalidColorConfig(
                "n_colors must be > 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&color.edge_bias) {
            return Err(ConfigError::InvalidColorConfig(format!(
                "edge_bias must be between 0.0 and 1.0, got {}",
                color.edge_bias
            )));
        }

        if color.min_contrast < 0.0 {
            return Err(ConfigError::InvalidColorConfig(format!(
                "min_contrast must be >= 0, got {}",
                color.min_contrast
            )));
        }

        if color.blur_sigma <= 0.0 {
            return Err(ConfigError::InvalidColorConfig(format!(
                "blur_sigma must be > 0, got {}",
                color.blur_sigma
            )));
        }

        Ok(())
    }

    pub fn log_level(&self) -> Level {
        self.logging.log_level
    }

    pub fn min_detector_dimension(&self) -> u32 {
        self.detection.min_detector_dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.color.n_colors, 4);
        assert_eq!(config.color.max_iterations, 20);
        assert_eq!(config.min_detector_dimension(), 640);
    }

    #[test]
    fn test_rejects_out_of_range_overlap() {
        let mut config = Config::default();
        config.detection.overlap_allowed_percent = 120.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidOverlapPercent(_))
        ));
    }

    #[test]
    fn test_rejects_zero_colors() {
        let mut config = Config::default();
        config.color.n_colors = 0;
        assert!(config.validate().is_err());
    }
}
