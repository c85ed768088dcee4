// Shared data types for detection filtering and color extraction

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::errors::ConfigError;
use crate::utils::geometry::{BoundingBox, Polygon};

/// Detection produced by the external region detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
    pub polygon: Polygon,
    pub area: i64,
}

impl Detection {
    /// Build a detection whose area is derived from its bbox
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox, polygon: Polygon) -> Self {
        Self {
            label: label.into(),
            confidence,
            area: bbox.area(),
            bbox,
            polygon,
        }
    }

    /// Axis-aligned detection with a rectangular polygon
    pub fn from_bbox(label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        let polygon = Polygon::from_bbox(&bbox);
        Self::new(label, confidence, bbox, polygon)
    }
}

/// Weighted color centroid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorCluster {
    pub rgb: [u8; 3],
    /// Share of the (weighted) region, 0-100
    pub percentage: f32,
}

impl ColorCluster {
    pub fn new(rgb: [u8; 3], percentage: f32) -> Self {
        Self { rgb, percentage }
    }

    /// ITU-R BT.709 luma
    pub fn brightness(&self) -> f32 {
        let [r, g, b] = self.rgb.map(f32::from);
        0.2126 * r + 0.7152 * g + 0.0722 * b
    }

    /// Channel spread (max - min)
    pub fn saturation(&self) -> f32 {
        let max = *self.rgb.iter().max().unwrap_or(&0);
        let min = *self.rgb.iter().min().unwrap_or(&0);
        f32::from(max - min)
    }

    /// Euclidean distance in raw RGB
    pub fn distance(&self, other: &ColorCluster) -> f32 {
        rgb_distance(self.rgb, other.rgb)
    }

    pub fn hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.rgb[0], self.rgb[1], self.rgb[2])
    }
}

pub fn rgb_distance(a: [u8; 3], b: [u8; 3]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = f32::from(x) - f32::from(y);
            d * d
        })
        .sum::<f32>()
        .sqrt()
}

/// Which extraction path produced a color pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorSource {
    AdaptiveThreshold,
    KmeansCpu,
    KmeansGpu,
}

impl ColorSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColorSource::AdaptiveThreshold => "adaptive_threshold",
            ColorSource::KmeansCpu => "kmeans_cpu",
            ColorSource::KmeansGpu => "kmeans_gpu",
        }
    }
}

impl From<Backend> for ColorSource {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::Cpu => ColorSource::KmeansCpu,
            Backend::Gpu => ColorSource::KmeansGpu,
        }
    }
}

impl fmt::Display for ColorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final (background, foreground) pair for one region
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorResult {
    pub background: ColorCluster,
    pub foreground: ColorCluster,
    pub source: ColorSource,
}

/// Serialized color entry attached to text results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorInfo {
    pub rgb: [u8; 3],
    pub hex: String,
    pub percentage: f32,
}

impl From<&ColorCluster> for ColorInfo {
    fn from(cluster: &ColorCluster) -> Self {
        Self {
            rgb: cluster.rgb,
            hex: cluster.hex(),
            percentage: (cluster.percentage * 10.0).round() / 10.0,
        }
    }
}

/// Color metadata block (background, foreground, source tag)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorMetadata {
    pub background_color: ColorInfo,
    pub foreground_color: ColorInfo,
    pub color_source: String,
}

impl From<&ColorResult> for ColorMetadata {
    fn from(result: &ColorResult) -> Self {
        Self {
            background_color: ColorInfo::from(&result.background),
            foreground_color: ColorInfo::from(&result.foreground),
            color_source: result.source.as_str().to_string(),
        }
    }
}

/// Clustering execution backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Cpu,
    Gpu,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Cpu => "cpu",
            Backend::Gpu => "gpu",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// GPU selection policy for clustering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuPolicy {
    /// GPU only for regions of at least `min_pixels_for_gpu` masked pixels
    #[default]
    Auto,
    Force,
    Never,
}

impl FromStr for GpuPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" | "true" | "yes" => Ok(GpuPolicy::Auto),
            "force" => Ok(GpuPolicy::Force),
            "never" | "false" | "no" => Ok(GpuPolicy::Never),
            other => Err(ConfigError::UnknownVariant {
                key: "COLOR_USE_GPU",
                value: other.to_string(),
            }),
        }
    }
}

/// Which extraction strategies run for a region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    /// Adaptive threshold first, k-means when contrast is too low
    #[default]
    AdaptiveThenClustering,
    /// k-means only
    ClusteringOnly,
}

impl FromStr for ExtractionStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "adaptive" | "adaptive_then_clustering" => Ok(ExtractionStrategy::AdaptiveThenClustering),
            "clustering" | "kmeans" | "clustering_only" => Ok(ExtractionStrategy::ClusteringOnly),
            other => Err(ConfigError::UnknownVariant {
                key: "COLOR_STRATEGY",
                value: other.to_string(),
            }),
        }
    }
}

/// Background/foreground selection rule applied to clusters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorMode {
    /// Brightness/saturation heuristics, max-contrast foreground
    #[default]
    Contrast,
    /// Largest cluster is background, second largest is foreground
    Frequency,
}

impl FromStr for SelectorMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "contrast" => Ok(SelectorMode::Contrast),
            "frequency" | "legacy" => Ok(SelectorMode::Frequency),
            other => Err(ConfigError::UnknownVariant {
                key: "COLOR_SELECTOR",
                value: other.to_string(),
            }),
        }
    }
}

/// Reading direction guessed from region shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextOrientation {
    Horizontal,
    Vertical,
}

/// Output of the external recognizer for one region
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedText {
    pub text: String,
    pub confidence: Option<f32>,
}

/// OCR text object with optional color metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextObject {
    pub text: String,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub vertices: Vec<[i32; 2]>,
    pub confidence: Option<f32>,
    pub background_color: Option<ColorInfo>,
    pub foreground_color: Option<ColorInfo>,
    pub color_source: Option<String>,
    pub text_orientation: Option<TextOrientation>,
}

impl TextObject {
    /// Attach normalized color metadata; `None` leaves the object untouched
    pub fn attach_colors(&mut self, colors: Option<&ColorResult>) {
        if let Some(result) = colors {
            let metadata = ColorMetadata::from(result);
            self.background_color = Some(metadata.background_color);
            self.foreground_color = Some(metadata.foreground_color);
            self.color_source = Some(metadata.color_source);
        }
    }
}

/// Result of processing one page
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageResult {
    pub deduplicated_detections: Vec<Detection>,
    pub texts: Vec<TextObject>,
}
