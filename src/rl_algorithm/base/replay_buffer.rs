use burn::{prelude::Backend, tensor::Tensor};
use rand::{rngs::StdRng, SeedableRng};

use crate::burn_utils::randint;
use crate::{HrlError, Result};

/// Bounded FIFO ring of style observations.
pub struct ReplayBuffer<B: Backend> {
    data: Tensor<B, 2>, // (capacity, dim)
    capacity: usize,
    cursor: usize,
    len: usize,
    rng: StdRng,
}

impl<B: Backend> ReplayBuffer<B> {
    pub fn new(capacity: usize, dim: usize, device: &B::Device) -> Self {
        Self::with_seed(capacity, dim, rand::random::<u64>(), device)
    }

    pub fn with_seed(capacity: usize, dim: usize, seed: u64, device: &B::Device) -> Self {
        Self {
            data: Tensor::zeros([capacity, dim], device),
            capacity,
            cursor: 0,
            len: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Appends rows, evicting the oldest ones once the ring is full.
    pub fn add_samples(&mut self, samples: Tensor<B, 2>) -> Result<()> {
        let [n, dim] = samples.dims();
        let [_, expected_dim] = self.data.dims();
        if dim != expected_dim {
            return Err(HrlError::ShapeMismatch {
                name: "replay_buffer".to_string(),
                expected: vec![n, expected_dim],
                actual: vec![n, dim],
            });
        }
        if self.capacity == 0 || n == 0 {
            return Ok(());
        }
        // only the newest `capacity` rows survive
        let samples = if n > self.capacity {
            samples.slice([n - self.capacity..n, 0..dim])
        } else {
            samples
        };
        let [n, _] = samples.dims();

        let first = n.min(self.capacity - self.cursor);
        self.data = self.data.clone().slice_assign(
            [self.cursor..self.cursor + first, 0..dim],
            samples.clone().slice([0..first, 0..dim]),
        );
        if first < n {
            self.data = self
                .data
                .clone()
                .slice_assign([0..n - first, 0..dim], samples.slice([first..n, 0..dim]));
        }
        self.cursor = (self.cursor + n) % self.capacity;
        self.len = (self.len + n).min(self.capacity);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Stored rows, in storage order.
    pub fn states(&self) -> Tensor<B, 2> {
        let [_, dim] = self.data.dims();
        self.data.clone().slice([0..self.len, 0..dim])
    }

    /// Draws `mini_batches` batches of `batch_size` rows uniformly with replacement.
    pub fn sample(&mut self, batch_size: usize, mini_batches: usize) -> Result<Vec<Tensor<B, 2>>> {
        if self.is_empty() {
            return Err(HrlError::Empty("replay buffer"));
        }
        let device = self.data.device();
        let stored = self.states();
        Ok((0..mini_batches)
            .map(|_| {
                let indices = randint::<B, _>(self.len, batch_size, &mut self.rng, &device);
                stored.clone().select(0, indices)
            })
            .collect())
    }
}
