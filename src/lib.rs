// Library exports for manga OCR region post-processing
//
// Detector output filtering (letterbox unpadding, size gate, overlap
// deduplication) and per-region foreground/background color extraction

// Core modules
pub mod core;
pub mod pipeline;
pub mod services;
pub mod utils;

// Re-export commonly used types and functions
pub use core::{
    config::{ColorConfig, Config, DetectionConfig},
    errors::{ColorError, ConfigError, GeometryError, PipelineError},
    types::{
        Backend, ColorCluster, ColorInfo, ColorResult, ColorSource, Detection, GpuPolicy,
        PageResult, RecognizedText, TextObject, TextOrientation,
    },
};

pub use pipeline::{RegionDetector, RegionPipeline, TextRecognizer};

pub use services::{
    choose_background_foreground, deduplicate, get_color_extractor, letterbox, ColorAnalyzer,
    ColorExtractor, DetectionFilter, Letterbox,
};

pub use utils::{BoundingBox, Metrics, Polygon, Region};
