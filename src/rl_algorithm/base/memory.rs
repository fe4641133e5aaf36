use std::collections::BTreeMap;

use burn::{
    prelude::Backend,
    tensor::{Bool, Tensor},
};
use rand::{rngs::StdRng, SeedableRng};

use crate::burn_utils::{randperm, split_indices, split_sizes};
use crate::{HrlError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorDtype {
    Float,
    Bool,
}

struct NamedBuffer<B: Backend> {
    data: Tensor<B, 3>, // (memory_size, num_envs, size)
    dtype: TensorDtype,
}

/// Rollout storage: every named buffer is `[memory_size, num_envs, size]` and
/// one timestep is written per [`Memory::add_samples`] call.
pub struct Memory<B: Backend> {
    buffers: BTreeMap<String, NamedBuffer<B>>,
    memory_size: usize,
    num_envs: usize,
    cursor: usize,
    filled: bool,
    sized: bool,
    rng: StdRng,
    device: B::Device,
}

impl<B: Backend> Memory<B> {
    pub fn new(memory_size: usize, num_envs: usize, device: &B::Device) -> Self {
        Self::with_seed(memory_size, num_envs, rand::random::<u64>(), device)
    }

    pub fn with_seed(memory_size: usize, num_envs: usize, seed: u64, device: &B::Device) -> Self {
        Self {
            buffers: BTreeMap::new(),
            memory_size,
            num_envs,
            cursor: 0,
            filled: false,
            sized: false,
            rng: StdRng::seed_from_u64(seed),
            device: device.clone(),
        }
    }

    pub fn create_tensor(&mut self, name: &str, size: usize, dtype: TensorDtype) -> Result<()> {
        if self.sized {
            return Err(HrlError::MemoryAlreadySized(name.to_string()));
        }
        if let Some(buffer) = self.buffers.get(name) {
            let [_, _, existing] = buffer.data.dims();
            if existing != size || buffer.dtype != dtype {
                return Err(HrlError::ShapeMismatch {
                    name: name.to_string(),
                    expected: vec![existing],
                    actual: vec![size],
                });
            }
            return Ok(());
        }
        let data = Tensor::zeros([self.memory_size, self.num_envs, size], &self.device);
        self.buffers.insert(name.to_string(), NamedBuffer { data, dtype });
        Ok(())
    }

    /// Writes one timestep (`[num_envs, size]` per name) at the cursor.
    /// Names that were never registered are skipped.
    pub fn add_samples(&mut self, samples: &[(&str, Tensor<B, 2>)]) -> Result<()> {
        self.sized = true;
        let t = self.cursor;
        for (name, value) in samples {
            let Some(buffer) = self.buffers.get_mut(*name) else {
                log::trace!("memory skips unregistered sample {}", name);
                continue;
            };
            let [_, num_envs, size] = buffer.data.dims();
            if value.dims() != [num_envs, size] {
                return Err(HrlError::ShapeMismatch {
                    name: name.to_string(),
                    expected: vec![num_envs, size],
                    actual: value.dims().to_vec(),
                });
            }
            let row = value.clone().unsqueeze_dim::<3>(0);
            buffer.data = buffer
                .data
                .clone()
                .slice_assign([t..t + 1, 0..num_envs, 0..size], row);
        }
        self.cursor += 1;
        if self.cursor >= self.memory_size {
            self.cursor = 0;
            self.filled = true;
        }
        Ok(())
    }

    fn buffer(&self, name: &str) -> Result<&NamedBuffer<B>> {
        self.buffers
            .get(name)
            .ok_or_else(|| HrlError::UnregisteredTensor(name.to_string()))
    }

    pub fn get_tensor_by_name(&self, name: &str) -> Result<Tensor<B, 3>> {
        Ok(self.buffer(name)?.data.clone())
    }

    pub fn get_bool_tensor_by_name(&self, name: &str) -> Result<Tensor<B, 3, Bool>> {
        Ok(self.buffer(name)?.data.clone().greater_elem(0.5))
    }

    pub fn set_tensor_by_name(&mut self, name: &str, value: Tensor<B, 3>) -> Result<()> {
        let buffer = self
            .buffers
            .get_mut(name)
            .ok_or_else(|| HrlError::UnregisteredTensor(name.to_string()))?;
        if value.dims() != buffer.data.dims() {
            return Err(HrlError::ShapeMismatch {
                name: name.to_string(),
                expected: buffer.data.dims().to_vec(),
                actual: value.dims().to_vec(),
            });
        }
        buffer.data = value;
        Ok(())
    }

    /// Flattens the rollout and splits one shared random permutation into
    /// `mini_batches` batches. Each batch holds one tensor per requested name,
    /// in the order the names were given.
    pub fn sample_all(&mut self, names: &[&str], mini_batches: usize) -> Result<Vec<Vec<Tensor<B, 2>>>> {
        if mini_batches == 0 {
            return Err(HrlError::InvalidArgument("mini_batches must be positive".to_string()));
        }
        let total = self.memory_size * self.num_envs;
        let flattened = names
            .iter()
            .map(|name| {
                let data = self.get_tensor_by_name(name)?;
                let [_, _, size] = data.dims();
                Ok(data.reshape([total, size]))
            })
            .collect::<Result<Vec<Tensor<B, 2>>>>()?;

        let indices = randperm::<B, _>(total, &mut self.rng, &self.device);
        let batches = split_indices(indices, &split_sizes(total, mini_batches))
            .into_iter()
            .map(|batch_indices| {
                flattened
                    .iter()
                    .map(|tensor| tensor.clone().select(0, batch_indices.clone()))
                    .collect()
            })
            .collect();
        Ok(batches)
    }

    /// Number of stored timesteps.
    pub fn len(&self) -> usize {
        if self.filled {
            self.memory_size
        } else {
            self.cursor
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn memory_size(&self) -> usize {
        self.memory_size
    }

    pub fn num_envs(&self) -> usize {
        self.num_envs
    }
}
