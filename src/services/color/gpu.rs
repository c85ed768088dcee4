// CUDA k-means via candle (feature "gpu")

use std::sync::Arc;

use super::kmeans::ClusterEngine;

#[cfg(feature = "gpu")]
pub use cuda::CudaKmeans;

/// Probe for a usable GPU clustering engine
#[cfg(feature = "gpu")]
pub fn detect_engine(ordinal: usize) -> Option<Arc<dyn ClusterEngine>> {
    match CudaKmeans::new(ordinal) {
        Ok(engine) => {
            tracing::info!("✓ Color clustering: GPU ({})", engine.name());
            Some(Arc::new(engine))
        }
        Err(e) => {
            tracing::warn!("CUDA device {} unavailable, color clustering on CPU: {}", ordinal, e);
            None
        }
    }
}

#[cfg(not(feature = "gpu"))]
pub fn detect_engine(_ordinal: usize) -> Option<Arc<dyn ClusterEngine>> {
    tracing::debug!("Built without the gpu feature, color clustering on CPU");
    None
}

#[cfg(feature = "gpu")]
mod cuda {
    use candle_core::{DType, Device, Tensor};
    use rand::rngs::StdRng;
    use rand::Rng;
    use tracing::trace;

    use crate::core::errors::{ColorError, ExtractionResult};
    use crate::core::types::Backend;
    use crate::services::color::kmeans::{ensure_finite, initial_centroids, ClusterEngine, ClusterJob};

    fn gpu_err(e: candle_core::Error) -> ColorError {
        ColorError::Gpu(e.to_string())
    }

    fn flatten(points: &[[f32; 3]]) -> Vec<f32> {
        points.iter().flatten().copied().collect()
    }

    /// Lloyd iterations on a CUDA device. Tensors live only for one call.
    pub struct CudaKmeans {
        device: Device,
        name: String,
    }

    impl CudaKmeans {
        pub fn new(ordinal: usize) -> Result<Self, ColorError> {
            let device = Device::new_cuda(ordinal)
                .map_err(|e| ColorError::BackendUnavailable(e.to_string()))?;
            Ok(Self {
                device,
                name: format!("CUDA:{}", ordinal),
            })
        }

        pub fn name(&self) -> &str {
            &self.name
        }

        fn upload(&self, points: &[[f32; 3]]) -> ExtractionResult<Tensor> {
            Tensor::from_vec(flatten(points), (points.len(), 3), &self.device).map_err(gpu_err)
        }

        fn labels(&self, data: &Tensor, centroids: &Tensor) -> ExtractionResult<Tensor> {
            data.unsqueeze(1)
                .and_then(|d| d.broadcast_sub(&centroids.unsqueeze(0)?))
                .and_then(|d| d.sqr())
                .and_then(|d| d.sum(2))
                .and_then(|d| d.argmin(1))
                .map_err(gpu_err)
        }
    }

    impl ClusterEngine for CudaKmeans {
        fn backend(&self) -> Backend {
            Backend::Gpu
        }

        fn device_name(&self) -> Option<String> {
            Some(self.name.clone())
        }

        fn fit(&self, job: &ClusterJob<'_>, rng: &mut StdRng) -> ExtractionResult<Vec<[f32; 3]>> {
            let mut centroids = initial_centroids(job.samples, job.k, rng);
            let k = centroids.len();
            if k == 0 {
                return Ok(centroids);
            }

            let data = self.upload(job.samples)?;
            let weights: Vec<f32> = job.weights.iter().map(|&w| w as f32).collect();
            let weights = Tensor::from_vec(weights, job.samples.len(), &self.device).map_err(gpu_err)?;
            let weighted = data
                .broadcast_mul(&weights.unsqueeze(1).map_err(gpu_err)?)
                .map_err(gpu_err)?;

            let mut previous: Option<Vec<u32>> = None;

            for iteration in 0..job.max_iterations {
                let centroid_tensor = self.upload(&centroids)?;
                let labels = self.labels(&data, &centroid_tensor)?;
                let host_labels = labels.to_vec1::<u32>().map_err(gpu_err)?;
                if previous.as_ref() == Some(&host_labels) {
                    trace!("GPU k-means converged after {} iterations", iteration);
                    break;
                }

                let sums = Tensor::zeros((k, 3), DType::F32, &self.device)
                    .and_then(|t| t.index_add(&labels, &weighted, 0))
                    .and_then(|t| t.to_vec2::<f32>())
                    .map_err(gpu_err)?;
                let totals = Tensor::zeros(k, DType::F32, &self.device)
                    .and_then(|t| t.index_add(&labels, &weights, 0))
                    .and_then(|t| t.to_vec1::<f32>())
                    .map_err(gpu_err)?;

                for (idx, centroid) in centroids.iter_mut().enumerate() {
                    if totals[idx] > 0.0 {
                        for c in 0..3 {
                            centroid[c] = sums[idx][c] / totals[idx];
                        }
                    } else {
                        *centroid = job.samples[rng.gen_range(0..job.samples.len())];
                    }
                }

                previous = Some(host_labels);
            }

            ensure_finite(&centroids)?;
            Ok(centroids)
        }

        fn assign(&self, features: &[[f32; 3]], centroids: &[[f32; 3]]) -> ExtractionResult<Vec<usize>> {
            if centroids.is_empty() {
                return Err(ColorError::ClusteringFailure("no centroids to assign to".to_string()));
            }

            let data = self.upload(features)?;
            let centroid_tensor = self.upload(centroids)?;
            let labels = self
                .labels(&data, &centroid_tensor)?
                .to_vec1::<u32>()
                .map_err(gpu_err)?;
            Ok(labels.into_iter().map(|l| l as usize).collect())
        }
    }
}
