use std::path::Path;

use burn::{prelude::Backend, tensor::Tensor};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use super::rl_utils::{tensor2ndarray2, vec2tensor1};
use crate::{HrlError, Result};

/// Per-feature running mean/variance normaliser.
///
/// Statistics only move in [`RunningStandardScaler::observe`] (training mode);
/// [`RunningStandardScaler::normalize`] and [`RunningStandardScaler::inverse`]
/// never touch them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningStandardScaler {
    running_mean: Vec<f32>,
    running_variance: Vec<f32>,
    current_count: f64,
    epsilon: f32,
    clip_threshold: f32,
}

impl RunningStandardScaler {
    pub fn new(size: usize) -> Self {
        Self::with_params(size, 1e-8, 5.0)
    }

    pub fn with_params(size: usize, epsilon: f32, clip_threshold: f32) -> Self {
        Self {
            running_mean: vec![0.0; size],
            running_variance: vec![1.0; size],
            current_count: 1.0,
            epsilon,
            clip_threshold,
        }
    }

    pub fn size(&self) -> usize {
        self.running_mean.len()
    }

    pub fn mean(&self) -> &[f32] {
        &self.running_mean
    }

    pub fn variance(&self) -> &[f32] {
        &self.running_variance
    }

    pub fn count(&self) -> f64 {
        self.current_count
    }

    fn check_size(&self, cols: usize) -> Result<()> {
        if cols != self.size() {
            return Err(HrlError::ShapeMismatch {
                name: "preprocessor".to_string(),
                expected: vec![self.size()],
                actual: vec![cols],
            });
        }
        Ok(())
    }

    /// Folds a batch `(n, size)` into the running statistics.
    pub fn observe_array(&mut self, batch: &Array2<f32>) -> Result<()> {
        self.check_size(batch.ncols())?;
        let batch_count = batch.nrows();
        if batch_count == 0 {
            return Ok(());
        }
        let batch_mean = batch.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(self.size()));
        let batch_variance = if batch_count > 1 {
            batch.var_axis(Axis(0), 1.0)
        } else {
            Array1::zeros(self.size())
        };

        let count = self.current_count;
        let batch_count = batch_count as f64;
        let total = count + batch_count;
        for i in 0..self.size() {
            let delta = (batch_mean[i] - self.running_mean[i]) as f64;
            let m_a = self.running_variance[i] as f64 * count;
            let m_b = batch_variance[i] as f64 * batch_count;
            let m2 = m_a + m_b + delta * delta * count * batch_count / total;
            self.running_mean[i] += (delta * batch_count / total) as f32;
            self.running_variance[i] = (m2 / total) as f32;
        }
        self.current_count = total;
        Ok(())
    }

    pub fn observe<B: Backend>(&mut self, batch: &Tensor<B, 2>) -> Result<()> {
        self.observe_array(&tensor2ndarray2(batch)?)
    }

    fn stats<B: Backend>(&self, device: &B::Device) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let mean = vec2tensor1::<B, f32>(self.running_mean.clone(), device).unsqueeze::<2>();
        let std = vec2tensor1::<B, f32>(self.running_variance.clone(), device)
            .sqrt()
            .unsqueeze::<2>();
        (mean, std)
    }

    /// `clamp((x - mean) / (std + eps), ±clip)` without updating statistics.
    pub fn normalize<B: Backend>(&self, x: Tensor<B, 2>) -> Result<Tensor<B, 2>> {
        self.check_size(x.dims()[1])?;
        let (mean, std) = self.stats::<B>(&x.device());
        let shape = x.shape();
        Ok(((x - mean.expand(shape.clone())) / (std.expand(shape) + self.epsilon))
            .clamp(-self.clip_threshold, self.clip_threshold))
    }

    /// Training-mode call: update statistics with `x`, then normalize it.
    pub fn observe_and_normalize<B: Backend>(&mut self, x: Tensor<B, 2>) -> Result<Tensor<B, 2>> {
        self.observe(&x)?;
        self.normalize(x)
    }

    /// Maps normalised values back to the original scale.
    pub fn inverse<B: Backend>(&self, x: Tensor<B, 2>) -> Result<Tensor<B, 2>> {
        self.check_size(x.dims()[1])?;
        let (mean, std) = self.stats::<B>(&x.device());
        let shape = x.shape();
        Ok(x.clamp(-self.clip_threshold, self.clip_threshold) * std.expand(shape.clone())
            + mean.expand(shape))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
    }
}

/// Applies an optional preprocessor; absent preprocessors pass values through.
pub fn preprocess<B: Backend>(
    preprocessor: Option<&mut RunningStandardScaler>,
    x: Tensor<B, 2>,
    train: bool,
) -> Result<Tensor<B, 2>> {
    match preprocessor {
        Some(scaler) if train => scaler.observe_and_normalize(x),
        Some(scaler) => scaler.normalize(x),
        None => Ok(x),
    }
}

pub fn preprocess_inverse<B: Backend>(
    preprocessor: Option<&RunningStandardScaler>,
    x: Tensor<B, 2>,
) -> Result<Tensor<B, 2>> {
    match preprocessor {
        Some(scaler) => scaler.inverse(x),
        None => Ok(x),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl_algorithm::base::rl_utils::tensor2vec;
    use burn::backend::ndarray::{NdArray, NdArrayDevice};
    use ndarray::array;

    #[test]
    fn test_initial_statistics_are_identity() {
        let scaler = RunningStandardScaler::new(2);
        let x = Tensor::<NdArray, 2>::from_floats([[1.0, -2.0], [7.0, 0.5]], &NdArrayDevice::Cpu);
        let out = tensor2vec(&scaler.normalize(x).unwrap()).unwrap();
        assert!((out[0] - 1.0).abs() < 1e-5);
        assert!((out[2] - 5.0).abs() < 1e-6); // clipped
    }

    #[test]
    fn test_parallel_variance_update() {
        let mut scaler = RunningStandardScaler::new(1);
        scaler.observe_array(&array![[1.0], [3.0]]).unwrap();
        // mean: (0 * 1 + 2 * 2) / 3, var: (1 * 1 + 2 * 2 + 2^2 * 1 * 2 / 3) / 3
        assert!((scaler.mean()[0] - 4.0 / 3.0).abs() < 1e-6);
        assert!((scaler.variance()[0] - (5.0 + 8.0 / 3.0) / 3.0).abs() < 1e-5);
        assert_eq!(scaler.count(), 3.0);
    }

    #[test]
    fn test_normalize_does_not_mutate_and_inverse_round_trips() {
        let device = NdArrayDevice::Cpu;
        let mut scaler = RunningStandardScaler::new(2);
        let batch = Tensor::<NdArray, 2>::from_floats([[1.0, 10.0], [2.0, 12.0], [3.0, 14.0]], &device);
        let normalized = scaler.observe_and_normalize(batch.clone()).unwrap();
        let snapshot = scaler.clone();
        let again = scaler.normalize(batch.clone()).unwrap();
        assert_eq!(scaler, snapshot);
        assert_eq!(tensor2vec(&normalized).unwrap(), tensor2vec(&again).unwrap());

        let restored = scaler.inverse(again).unwrap();
        let diff = (restored - batch).abs().max().into_scalar();
        assert!(diff < 1e-4);
    }

    #[test]
    fn test_size_mismatch() {
        let scaler = RunningStandardScaler::new(3);
        let x = Tensor::<NdArray, 2>::zeros([2, 2], &NdArrayDevice::Cpu);
        assert!(scaler.normalize(x).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scaler.json");
        let mut scaler = RunningStandardScaler::new(2);
        scaler.observe_array(&array![[1.0, 2.0], [5.0, -2.0]]).unwrap();
        scaler.save(&path).unwrap();
        assert_eq!(RunningStandardScaler::load(&path).unwrap(), scaler);
    }

    #[test]
    fn test_optional_preprocessor_passes_through() {
        let x = Tensor::<NdArray, 2>::from_floats([[3.0]], &NdArrayDevice::Cpu);
        let out = preprocess::<NdArray>(None, x, true).unwrap();
        assert_eq!(out.into_scalar(), 3.0);
    }
}
