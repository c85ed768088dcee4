pub mod config;
pub mod errors;
pub mod types;

// Re-export commonly used items for convenience
pub use config::{ColorConfig, Config, DetectionConfig};
pub use errors::{ColorError, ConfigError, GeometryError, PipelineError};
pub use types::{
    Backend, ColorCluster, ColorInfo, ColorResult, ColorSource, Detection, ExtractionStrategy,
    GpuPolicy, PageResult, RecognizedText, SelectorMode, TextObject, TextOrientation,
};
