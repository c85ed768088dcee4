pub mod geometry;
pub mod image_ops;
pub mod metrics;

// Re-export commonly used items
pub use geometry::{overlap_percent, BoundingBox, Polygon, Region};
pub use image_ops::{crop_to_bbox, load_rgb_from_memory_async, load_rgb_from_path_async};
pub use metrics::{Metrics, MetricsSnapshot};
