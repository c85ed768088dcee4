// Weighted Lloyd k-means behind a backend-agnostic engine trait

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::seq::index;
use rand::Rng;
use rayon::prelude::*;
use tracing::trace;

use crate::core::errors::{ColorError, ExtractionResult};
use crate::core::types::Backend;

/// Work handed to a clustering engine: sampled features and their weights
#[derive(Debug, Clone, Copy)]
pub struct ClusterJob<'a> {
    pub samples: &'a [[f32; 3]],
    pub weights: &'a [f64],
    pub k: usize,
    pub max_iterations: usize,
}

/// Clustering backend (CPU or GPU) with a uniform interface
pub trait ClusterEngine: Send + Sync {
    fn backend(&self) -> Backend;

    fn device_name(&self) -> Option<String> {
        None
    }

    /// Fit centroids on the job's samples
    fn fit(&self, job: &ClusterJob<'_>, rng: &mut StdRng) -> ExtractionResult<Vec<[f32; 3]>>;

    /// Nearest-centroid label for every feature (squared distance)
    fn assign(&self, features: &[[f32; 3]], centroids: &[[f32; 3]]) -> ExtractionResult<Vec<usize>>;
}

pub(crate) fn squared_distance(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    let d0 = a[0] - b[0];
    let d1 = a[1] - b[1];
    let d2 = a[2] - b[2];
    d0 * d0 + d1 * d1 + d2 * d2
}

pub(crate) fn nearest(point: &[f32; 3], centroids: &[[f32; 3]]) -> usize {
    let mut best = 0;
    let mut best_distance = f32::INFINITY;
    for (idx, centroid) in centroids.iter().enumerate() {
        let d = squared_distance(point, centroid);
        if d < best_distance {
            best_distance = d;
            best = idx;
        }
    }
    best
}

/// Up to `k` centroids drawn from distinct sample points
pub fn initial_centroids(samples: &[[f32; 3]], k: usize, rng: &mut StdRng) -> Vec<[f32; 3]> {
    let mut seen = HashSet::with_capacity(samples.len().min(4096));
    let distinct: Vec<[f32; 3]> = samples
        .iter()
        .filter(|p| seen.insert(p.map(f32::to_bits)))
        .copied()
        .collect();

    let k = k.min(distinct.len());
    if k == 0 {
        return Vec::new();
    }

    index::sample(rng, distinct.len(), k)
        .into_iter()
        .map(|i| distinct[i])
        .collect()
}

pub(crate) fn ensure_finite(centroids: &[[f32; 3]]) -> ExtractionResult<()> {
    if centroids.iter().flatten().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(ColorError::ClusteringFailure(
            "non-finite centroid after update".to_string(),
        ))
    }
}

/// Rayon-parallel CPU k-means
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuKmeans;

impl ClusterEngine for CpuKmeans {
    fn backend(&self) -> Backend {
        Backend::Cpu
    }

    fn fit(&self, job: &ClusterJob<'_>, rng: &mut StdRng) -> ExtractionResult<Vec<[f32; 3]>> {
        if job.samples.len() != job.weights.len() {
            return Err(ColorError::ClusteringFailure(format!(
                "{} samples but {} weights",
                job.samples.len(),
                job.weights.len()
            )));
        }

        let mut centroids = initial_centroids(job.samples, job.k, rng);
        let k = centroids.len();
        if k == 0 {
            return Ok(centroids);
        }

        let mut labels: Option<Vec<usize>> = None;

        for iteration in 0..job.max_iterations {
            let new_labels = self.assign(job.samples, &centroids)?;
            if labels.as_ref() == Some(&new_labels) {
                trace!("k-means converged after {} iterations", iteration);
                break;
            }

            let mut sums = vec![[0.0f64; 3]; k];
            let mut totals = vec![0.0f64; k];
            for ((point, &label), &w) in job.samples.iter().zip(new_labels.iter()).zip(job.weights) {
                totals[label] += w;
                for c in 0..3 {
                    sums[label][c] += f64::from(point[c]) * w;
                }
            }

            for (idx, centroid) in centroids.iter_mut().enumerate() {
                if totals[idx] > 0.0 {
                    *centroid = sums[idx].map(|s| (s / totals[idx]) as f32);
                } else {
                    *centroid = job.samples[rng.gen_range(0..job.samples.len())];
                }
            }

            labels = Some(new_labels);
        }

        ensure_finite(&centroids)?;
        Ok(centroids)
    }

    fn assign(&self, features: &[[f32; 3]], centroids: &[[f32; 3]]) -> ExtractionResult<Vec<usize>> {
        if centroids.is_empty() {
            return Err(ColorError::ClusteringFailure("no centroids to assign to".to_string()));
        }
        Ok(features.par_iter().map(|p| nearest(p, centroids)).collect())
    }
}
