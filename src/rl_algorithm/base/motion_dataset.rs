use burn::{prelude::Backend, tensor::Tensor};
use ndarray::Array2;
use rand::{rngs::StdRng, SeedableRng};

use super::rl_utils::ndarray2tensor2;
use crate::burn_utils::randint;
use crate::{HrlError, Result};

/// Source of reference style observations, e.g. a motion-capture library.
pub trait ReferenceMotionProvider {
    fn style_dim(&self) -> usize;
    /// `n` style observations, `(n, style_dim)`.
    fn collect(&mut self, n: usize) -> Array2<f32>;
}

/// Read-only set of reference style observations; the discriminator's
/// positive samples.
pub struct MotionDataset<B: Backend> {
    states: Tensor<B, 2>,
    rng: StdRng,
}

impl<B: Backend> MotionDataset<B> {
    pub fn from_tensor(states: Tensor<B, 2>, seed: u64) -> Result<Self> {
        if states.dims()[0] == 0 {
            return Err(HrlError::Empty("motion dataset"));
        }
        Ok(Self {
            states,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    pub fn from_provider(
        provider: &mut dyn ReferenceMotionProvider,
        size: usize,
        device: &B::Device,
    ) -> Result<Self> {
        let observations = provider.collect(size);
        if observations.ncols() != provider.style_dim() {
            return Err(HrlError::ShapeMismatch {
                name: "reference motions".to_string(),
                expected: vec![size, provider.style_dim()],
                actual: observations.shape().to_vec(),
            });
        }
        log::info!("motion dataset collected {} reference observations", observations.nrows());
        Self::from_tensor(ndarray2tensor2(observations, device), rand::random::<u64>())
    }

    pub fn len(&self) -> usize {
        self.states.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn style_dim(&self) -> usize {
        self.states.dims()[1]
    }

    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// `mini_batches` batches of `batch_size` rows drawn with replacement.
    pub fn sample(&mut self, batch_size: usize, mini_batches: usize) -> Vec<Tensor<B, 2>> {
        let device = self.states.device();
        let len = self.len();
        (0..mini_batches)
            .map(|_| {
                let indices = randint::<B, _>(len, batch_size, &mut self.rng, &device);
                self.states.clone().select(0, indices)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::{NdArray, NdArrayDevice};

    struct Constant;

    impl ReferenceMotionProvider for Constant {
        fn style_dim(&self) -> usize {
            2
        }
        fn collect(&mut self, n: usize) -> Array2<f32> {
            Array2::from_elem((n, 2), 0.5)
        }
    }

    #[test]
    fn test_from_provider_and_sample() {
        let mut provider = Constant;
        let mut dataset =
            MotionDataset::<NdArray>::from_provider(&mut provider, 16, &NdArrayDevice::Cpu).unwrap();
        assert_eq!(dataset.len(), 16);
        assert_eq!(dataset.style_dim(), 2);
        let batches = dataset.sample(10, 4);
        assert_eq!(batches.len(), 4);
        assert_eq!(batches[0].dims(), [10, 2]);
        assert_eq!(batches[3].clone().mean().into_scalar(), 0.5);
    }

    #[test]
    fn test_reseed_repeats_samples() {
        let states = Tensor::<NdArray, 2>::from_floats([[0.0], [1.0], [2.0], [3.0], [4.0]], &NdArrayDevice::Cpu);
        let mut a = MotionDataset::from_tensor(states.clone(), 1).unwrap();
        let mut b = MotionDataset::from_tensor(states, 2).unwrap();
        a.reseed(7);
        b.reseed(7);
        let a = a.sample(6, 2);
        let b = b.sample(6, 2);
        for (x, y) in a.into_iter().zip(b) {
            assert_eq!(x.into_data().to_vec::<f32>().unwrap(), y.into_data().to_vec::<f32>().unwrap());
        }
    }

    #[test]
    fn test_empty_dataset_rejected() {
        let empty = Tensor::<NdArray, 2>::zeros([0, 3], &NdArrayDevice::Cpu);
        assert!(MotionDataset::from_tensor(empty, 0).is_err());
    }
}
