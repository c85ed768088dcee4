use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::types::ColorSource;

/// Most recent latency samples kept for avg/p95
const LATENCY_WINDOW: usize = 1024;

/// Metrics collector for region filtering and color extraction.
///
/// Cheap to clone; all clones share the same counters.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    // Detection filtering
    detections_by_label: DashMap<String, AtomicUsize>,
    regions_too_small: AtomicUsize,
    regions_suppressed: AtomicUsize,

    // Color extraction
    extractions_by_source: DashMap<ColorSource, AtomicUsize>,
    extractions_skipped: AtomicUsize,
    extractions_failed: AtomicUsize,
    gpu_fallbacks: AtomicUsize,
    extraction_latency_us: RwLock<VecDeque<u64>>,

    // Pages
    pages_processed: AtomicUsize,
    recognizer_failures: AtomicUsize,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                detections_by_label: DashMap::new(),
                regions_too_small: AtomicUsize::new(0),
                regions_suppressed: AtomicUsize::new(0),
                extractions_by_source: DashMap::new(),
                extractions_skipped: AtomicUsize::new(0),
                extractions_failed: AtomicUsize::new(0),
                gpu_fallbacks: AtomicUsize::new(0),
                extraction_latency_us: RwLock::new(VecDeque::with_capacity(LATENCY_WINDOW)),
                pages_processed: AtomicUsize::new(0),
                recognizer_failures: AtomicUsize::new(0),
                start_time: Instant::now(),
            }),
        }
    }

    // Detection Metrics
    pub fn record_detection(&self, label: &str) {
        self.inner
            .detections_by_label
            .entry(label.to_string())
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_filtering(&self, too_small: usize, suppressed: usize) {
        self.inner.regions_too_small.fetch_add(too_small, Ordering::Relaxed);
        self.inner.regions_suppressed.fetch_add(suppressed, Ordering::Relaxed);
    }

    // Color Metrics
    pub fn record_extraction(&self, source: ColorSource, duration: Duration) {
        self.inner
            .extractions_by_source
            .entry(source)
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::Relaxed);
        let mut latency = self.inner.extraction_latency_us.write();
        if latency.len() == LATENCY_WINDOW {
            latency.pop_front();
        }
        latency.push_back(duration.as_micros() as u64);
    }

    /// Region rejected before clustering (geometry or mask gate)
    pub fn record_extraction_skipped(&self) {
        self.inner.extractions_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Clustering ran but produced nothing usable
    pub fn record_extraction_failed(&self) {
        self.inner.extractions_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_gpu_fallback(&self) {
        self.inner.gpu_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    // Page Metrics
    pub fn record_page_processed(&self) {
        self.inner.pages_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_recognizer_failure(&self) {
        self.inner.recognizer_failures.fetch_add(1, Ordering::Relaxed);
    }

    // Get snapshot for reporting
    pub fn snapshot(&self) -> MetricsSnapshot {
        let latency: Vec<u64> = self.inner.extraction_latency_us.read().iter().copied().collect();
        let extraction_latency_avg_us = avg(&latency);
        let extraction_latency_p95_us = percentile(&latency, 0.95);

        let detections_by_label: BTreeMap<String, usize> = self
            .inner
            .detections_by_label
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect();

        let extractions_by_source: BTreeMap<String, usize> = self
            .inner
            .extractions_by_source
            .iter()
            .map(|entry| {
                (
                    entry.key().as_str().to_string(),
                    entry.value().load(Ordering::Relaxed),
                )
            })
            .collect();

        MetricsSnapshot {
            detections_by_label,
            regions_too_small: self.inner.regions_too_small.load(Ordering::Relaxed),
            regions_suppressed: self.inner.regions_suppressed.load(Ordering::Relaxed),
            extractions_by_source,
            extractions_skipped: self.inner.extractions_skipped.load(Ordering::Relaxed),
            extractions_failed: self.inner.extractions_failed.load(Ordering::Relaxed),
            gpu_fallbacks: self.inner.gpu_fallbacks.load(Ordering::Relaxed),
            extraction_latency_avg_us,
            extraction_latency_p95_us,
            pages_processed: self.inner.pages_processed.load(Ordering::Relaxed),
            recognizer_failures: self.inner.recognizer_failures.load(Ordering::Relaxed),
            uptime_seconds: self.inner.start_time.elapsed().as_secs(),
        }
    }

    /// Generate Prometheus-format metrics
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();

        let mut detections = String::new();
        for (label, count) in &snapshot.detections_by_label {
            detections.push_str(&format!("detections_total {{label=\"{}\"}} {}\n", label, count));
        }

        let mut extractions = String::new();
        for (source, count) in &snapshot.extractions_by_source {
            extractions.push_str(&format!(
                "color_extractions_total {{source=\"{}\"}} {}\n",
                source, count
            ));
        }

        format!(
            r#"# HELP detections_total Detector outputs seen per label
# TYPE detections_total counter
{}
# HELP regions_too_small_total Regions dropped by the minimum size gate
# TYPE regions_too_small_total counter
regions_too_small_total {{}} {}

# HELP regions_suppressed_total Regions removed by overlap deduplication
# TYPE regions_suppressed_total counter
regions_suppressed_total {{}} {}

# HELP color_extractions_total Successful color extractions per source
# TYPE color_extractions_total counter
{}
# HELP color_extractions_skipped_total Regions rejected before clustering
# TYPE color_extractions_skipped_total counter
color_extractions_skipped_total {{}} {}

# HELP color_extractions_failed_total Extractions that produced no colors
# TYPE color_extractions_failed_total counter
color_extractions_failed_total {{}} {}

# HELP gpu_fallbacks_total GPU clustering failures recovered on CPU
# TYPE gpu_fallbacks_total counter
gpu_fallbacks_total {{}} {}

# HELP color_extraction_latency_avg_us Average extraction latency in microseconds
# TYPE color_extraction_latency_avg_us gauge
color_extraction_latency_avg_us {{}} {}

# HELP pages_processed_total Pages run through the region pipeline
# TYPE pages_processed_total counter
pages_processed_total {{}} {}

# HELP recognizer_failures_total Regions skipped after a recognizer error
# TYPE recognizer_failures_total counter
recognizer_failures_total {{}} {}

# HELP uptime_seconds Uptime in seconds
# TYPE uptime_seconds counter
uptime_seconds {{}} {}
"#,
            detections,
            snapshot.regions_too_small,
            snapshot.regions_suppressed,
            extractions,
            snapshot.extractions_skipped,
            snapshot.extractions_failed,
            snapshot.gpu_fallbacks,
            snapshot.extraction_latency_avg_us,
            snapshot.pages_processed,
            snapshot.recognizer_failures,
            snapshot.uptime_seconds,
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub detections_by_label: BTreeMap<String, usize>,
    pub regions_too_small: usize,
    pub regions_suppressed: usize,
    pub extractions_by_source: BTreeMap<String, usize>,
    pub extractions_skipped: usize,
    pub extractions_failed: usize,
    pub gpu_fallbacks: usize,
    pub extraction_latency_avg_us: u64,
    pub extraction_latency_p95_us: u64,
    pub pages_processed: usize,
    pub recognizer_failures: usize,
    pub uptime_seconds: u64,
}

fn percentile(values: &[u64], p: f64) -> u64 {
    if values.is_empty() {
        return 0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let idx = ((values.len() as f64 - 1.0) * p) as usize;
    sorted[idx]
}

fn avg(values: &[u64]) -> u64 {
    if values.is_empty() {
        return 0;
    }
    values.iter().sum::<u64>() / values.len() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = Metrics::new();

        metrics.record_detection("text");
        metrics.record_detection("text");
        metrics.record_detection("bubble");
        metrics.record_filtering(2, 1);
        metrics.record_extraction(ColorSource::AdaptiveThreshold, Duration::from_micros(300));
        metrics.record_extraction(ColorSource::KmeansCpu, Duration::from_micros(900));
        metrics.record_gpu_fallback();
        metrics.record_extraction_skipped();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.detections_by_label.get("text"), Some(&2));
        assert_eq!(snapshot.detections_by_label.get("bubble"), Some(&1));
        assert_eq!(snapshot.regions_too_small, 2);
        assert_eq!(snapshot.regions_suppressed, 1);
        assert_eq!(snapshot.extractions_by_source.get("kmeans_cpu"), Some(&1));
        assert_eq!(snapshot.gpu_fallbacks, 1);
        assert_eq!(snapshot.extractions_skipped, 1);
        assert_eq!(snapshot.extraction_latency_avg_us, 600);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.record_extraction(ColorSource::KmeansGpu, Duration::from_micros(100));
        metrics.record_gpu_fallback();

        let prometheus = metrics.to_prometheus();
        assert!(prometheus.contains("color_extractions_total {source=\"kmeans_gpu\"} 1"));
        assert!(prometheus.contains("gpu_fallbacks_total {} 1"));
    }

    #[test]
    fn test_latency_window_keeps_recent_samples() {
        let metrics = Metrics::new();
        for _ in 0..100 {
            metrics.record_extraction(ColorSource::KmeansCpu, Duration::from_micros(50_000));
        }
        for _ in 0..LATENCY_WINDOW {
            metrics.record_extraction(ColorSource::KmeansCpu, Duration::from_micros(200));
        }

        let snapshot = metrics.snapshot();
        assert_eq!(metrics.inner.extraction_latency_us.read().len(), LATENCY_WINDOW);
        assert_eq!(snapshot.extraction_latency_avg_us, 200);
        assert_eq!(snapshot.extraction_latency_p95_us, 200);
        assert_eq!(
            snapshot.extractions_by_source.get("kmeans_cpu"),
            Some(&(100 + LATENCY_WINDOW))
        );
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = Metrics::new();
        let clone = metrics.clone();
        clone.record_page_processed();
        assert_eq!(metrics.snapshot().pages_processed, 1);
    }
}
