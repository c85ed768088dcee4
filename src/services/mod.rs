pub mod color;
pub mod detection;

// Re-export commonly used services
pub use color::{choose_background_foreground, get_color_extractor, ColorAnalyzer, ColorExtractor};
pub use detection::{deduplicate, letterbox, DetectionFilter, Letterbox};
