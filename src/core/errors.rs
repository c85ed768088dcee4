// Error types for the region post-processing pipeline
//
// Every failure in this crate is recoverable at the page level:
// - Geometry errors skip color extraction for one region
// - Color errors degrade to "no color metadata"
// - Pipeline errors fail a single request

use thiserror::Error;

/// Region geometry errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeometryError {
    #[error("Polygon needs at least 3 points, got {points}")]
    DegeneratePolygon { points: usize },

    #[error("Region too small after clipping: {width}x{height}")]
    RegionTooSmall { width: i32, height: i32 },

    #[error("Mask covers {set} pixels, at least {required} required")]
    InsufficientMask { set: usize, required: usize },
}

/// Color extraction errors
#[derive(Debug, Error)]
pub enum ColorError {
    #[error("Clustering backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Clustering failed: {0}")]
    ClusteringFailure(String),

    #[error("GPU clustering failed: {0}")]
    Gpu(String),
}

/// Page-level pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Region detection failed: {0}")]
    Detection(String),

    #[error("Recognition failed for region {region_index}: {message}")]
    Recognition { region_index: usize, message: String },

    #[error("Task join failed: {0}")]
    TaskJoinFailed(String),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid detection config: {0}")]
    InvalidDetectionConfig(String),

    #[error("Invalid color config: {0}")]
    InvalidColorConfig(String),

    #[error("Overlap allowed percent must be in [0, 100], got {0}")]
    InvalidOverlapPercent(f32),

    #[error("Confidence threshold must be in [0.0, 1.0], got {0}")]
    InvalidConfidenceThreshold(f32),

    #[error("Unknown value '{value}' for {key}")]
    UnknownVariant { key: &'static str, value: String },
}

pub type GeometryResult<T> = Result<T, GeometryError>;
pub type ExtractionResult<T> = Result<T, ColorError>;
pub type PipelineResult<T> = Result<T, PipelineError>;
