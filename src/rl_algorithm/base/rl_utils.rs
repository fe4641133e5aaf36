use burn::tensor::activation::sigmoid;
use burn::tensor::backend::Backend;
use burn::tensor::{Element, Tensor, TensorData};

use ndarray::{Array1, Array2};
use num_traits::{ToPrimitive, Zero};

use crate::{HrlError, Result};

/// Lower bound applied inside both style-reward links.
pub const STYLE_REWARD_EPS: f32 = 1e-4;

pub struct GAEOutput {
    pub advantages: Array2<f32>, // (T, N), not yet standardised
    pub returns: Array2<f32>,    // (T, N)
}

/// Generalised advantage estimation over a `[T, N]` rollout.
///
/// `next_values` must already be zeroed where the episode terminated.
/// `not_dones` gates how far the λ-weighted tail propagates back.
pub fn compute_gae(
    rewards: &Array2<f32>,
    values: &Array2<f32>,
    next_values: &Array2<f32>,
    not_dones: &Array2<f32>,
    discount: f32,
    td_lambda: f32,
) -> Result<GAEOutput> {
    let shape = rewards.shape().to_vec();
    for (name, other) in [("values", values), ("next_values", next_values), ("not_dones", not_dones)] {
        if other.shape() != shape.as_slice() {
            return Err(HrlError::ShapeMismatch {
                name: name.to_string(),
                expected: shape.clone(),
                actual: other.shape().to_vec(),
            });
        }
    }
    let (memory_size, num_envs) = rewards.dim();
    let mut advantages = Array2::<f32>::zeros((memory_size, num_envs));
    let mut running_advantage = Array1::<f32>::zeros(num_envs);

    for t in (0..memory_size).rev() {
        for n in 0..num_envs {
            running_advantage[n] = rewards[[t, n]] - values[[t, n]]
                + discount * (next_values[[t, n]] + td_lambda * not_dones[[t, n]] * running_advantage[n]);
            advantages[[t, n]] = running_advantage[n];
        }
    }
    let returns = &advantages + values;
    Ok(GAEOutput { advantages, returns })
}

/// `(x - mean) / (std + 1e-8)` over every element, with the unbiased std.
pub fn standardize(arr: &Array2<f32>) -> Array2<f32> {
    let n = arr.len();
    if n == 0 {
        return arr.clone();
    }
    let mean = arr.sum() / n as f32;
    let std = if n > 1 {
        (arr.mapv(|x| (x - mean).powi(2)).sum() / (n - 1) as f32).sqrt()
    } else {
        0.0
    };
    arr.mapv(|x| (x - mean) / (std + 1e-8))
}

/// Reward for looking like the reference motions, computed from discriminator logits.
pub fn style_reward<B: Backend, const D: usize>(
    logits: Tensor<B, D>,
    least_square_discriminator: bool,
    reward_scale: f32,
) -> Tensor<B, D> {
    let reward = if least_square_discriminator {
        // 1 - 0.25 (1 - l)^2
        (logits.neg() + 1.0)
            .powf_scalar(2.0)
            .mul_scalar(-0.25)
            .add_scalar(1.0)
            .clamp_min(STYLE_REWARD_EPS)
    } else {
        (sigmoid(logits).neg() + 1.0)
            .clamp_min(STYLE_REWARD_EPS)
            .log()
            .neg()
    };
    reward.mul_scalar(reward_scale)
}

pub fn combine_rewards(
    task_rewards: &Array2<f32>,
    style_rewards: &Array2<f32>,
    task_reward_weight: f32,
    style_reward_weight: f32,
) -> Array2<f32> {
    task_rewards * task_reward_weight + style_rewards * style_reward_weight
}

pub fn vec2tensor1<B: Backend, T: Element + Zero + ToPrimitive>(
    arr: Vec<T>,
    device: &B::Device,
) -> Tensor<B, 1> {
    let shape = [arr.len()];
    let tensor_data = TensorData::new(arr, shape);
    Tensor::<B, 1>::from_data(tensor_data, device)
}

pub fn ndarray2tensor2<B: Backend, T: Element + Zero + ToPrimitive>(
    arr: Array2<T>,
    device: &B::Device,
) -> Tensor<B, 2> {
    let shape = arr.shape().to_vec();
    let vec = arr.into_iter().collect::<Vec<T>>();
    let tensor_data = TensorData::new(vec, shape);
    Tensor::<B, 2>::from_data(tensor_data, device)
}

pub fn tensor2ndarray2<B: Backend>(tensor: &Tensor<B, 2>) -> Result<Array2<f32>> {
    let vec = tensor2vec(tensor)?;
    let shape: [usize; 2] = tensor.dims();
    Array2::from_shape_vec(shape, vec).map_err(|e| HrlError::TensorData(e.to_string()))
}

pub fn tensor2vec<B: Backend, const D: usize>(tensor: &Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .to_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| HrlError::TensorData(format!("{:?}", e)))
}

/// `[T, N, 1]` rollout buffer as a `[T, N]` host array.
pub fn rollout2ndarray<B: Backend>(tensor: &Tensor<B, 3>) -> Result<Array2<f32>> {
    let [memory_size, num_envs, size] = tensor.dims();
    if size != 1 {
        return Err(HrlError::ShapeMismatch {
            name: "rollout".to_string(),
            expected: vec![memory_size, num_envs, 1],
            actual: vec![memory_size, num_envs, size],
        });
    }
    tensor2ndarray2(&tensor.clone().reshape([memory_size, num_envs]))
}

pub fn ndarray2rollout<B: Backend>(arr: Array2<f32>, device: &B::Device) -> Tensor<B, 3> {
    let (memory_size, num_envs) = arr.dim();
    ndarray2tensor2::<B, f32>(arr, device).reshape([memory_size, num_envs, 1])
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::{NdArray, NdArrayDevice};
    use ndarray::array;

    fn column(values: &[f32]) -> Array2<f32> {
        Array2::from_shape_vec((values.len(), 1), values.to_vec()).unwrap()
    }

    #[test]
    fn test_gae_without_discount_is_td_error() {
        let rewards = array![[1.0, 2.0], [3.0, -1.0], [0.5, 0.0]];
        let values = array![[0.2, 0.4], [1.0, 1.5], [-0.3, 2.0]];
        let next_values = Array2::from_elem((3, 2), 10.0);
        let not_dones = Array2::from_elem((3, 2), 1.0);
        let out = compute_gae(&rewards, &values, &next_values, &not_dones, 0.0, 0.0).unwrap();
        let expected = &rewards - &values;
        assert!((&out.advantages - &expected).iter().all(|x| x.abs() < 1e-6));
        assert!((&out.returns - &rewards).iter().all(|x| x.abs() < 1e-6));
    }

    #[test]
    fn test_gae_constant_series() {
        // r = 1, v = v' = 0, all not done: adv_t = sum_k (γλ)^k over the remaining steps
        let (gamma, lambda) = (0.9f32, 0.8f32);
        let t_len = 5;
        let rewards = Array2::from_elem((t_len, 1), 1.0);
        let zeros = Array2::zeros((t_len, 1));
        let not_dones = Array2::from_elem((t_len, 1), 1.0);
        let out = compute_gae(&rewards, &zeros, &zeros, &not_dones, gamma, lambda).unwrap();
        for t in 0..t_len {
            let expected: f32 = (0..t_len - t).map(|k| (gamma * lambda).powi(k as i32)).sum();
            assert!((out.advantages[[t, 0]] - expected).abs() < 1e-5);
        }
    }

    #[test]
    fn test_gae_fixture() {
        let rewards = column(&[1.0, 1.0, 1.0, 1.0]);
        let values = column(&[0.0, 0.0, 0.0, 0.0]);
        let next_values = column(&[0.0, 0.0, 0.0, 1.0]);
        let not_dones = column(&[1.0, 1.0, 1.0, 1.0]);
        let out = compute_gae(&rewards, &values, &next_values, &not_dones, 0.99, 0.95).unwrap();
        let expected = [4.4805414, 3.7007351, 2.871595, 1.99];
        for (got, want) in out.advantages.iter().zip(expected) {
            assert!((got - want).abs() < 1e-5, "got {} want {}", got, want);
        }
    }

    #[test]
    fn test_gae_terminated_cuts_tail() {
        let rewards = column(&[1.0, 1.0]);
        let zeros = column(&[0.0, 0.0]);
        let not_dones = column(&[0.0, 1.0]);
        let out = compute_gae(&rewards, &zeros, &zeros, &not_dones, 0.99, 0.95).unwrap();
        assert!((out.advantages[[0, 0]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_gae_shape_mismatch() {
        let rewards = Array2::zeros((3, 1));
        let other = Array2::zeros((2, 1));
        assert!(compute_gae(&rewards, &other, &rewards, &rewards, 0.9, 0.9).is_err());
    }

    #[test]
    fn test_standardize() {
        let arr = array![[1.0, 2.0], [3.0, 10.0], [-4.0, 0.5]];
        let out = standardize(&arr);
        let n = out.len() as f32;
        let mean = out.sum() / n;
        let std = (out.mapv(|x| (x - mean).powi(2)).sum() / (n - 1.0)).sqrt();
        assert!(mean.abs() < 1e-5);
        assert!((std - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_style_reward_links() {
        let device = NdArrayDevice::Cpu;
        let logits = Tensor::<NdArray, 1>::from_floats([1.0, -1.0, 5.0], &device);
        let ls = tensor2vec(&style_reward(logits.clone(), true, 2.0)).unwrap();
        assert!((ls[0] - 2.0).abs() < 1e-6);
        assert!((ls[1] - 2.0 * STYLE_REWARD_EPS).abs() < 1e-6);
        assert!((ls[2] - 2.0 * STYLE_REWARD_EPS).abs() < 1e-6);

        let logistic = tensor2vec(&style_reward(logits, false, 1.0)).unwrap();
        let expected = -(1.0 - 1.0 / (1.0 + (-1.0f32).exp())).ln();
        assert!((logistic[0] - expected).abs() < 1e-5);
        assert!(logistic[2] > logistic[0] && logistic[0] > logistic[1]);
    }

    #[test]
    fn test_rollout_conversion() {
        let device = NdArrayDevice::Cpu;
        let arr = array![[1.0, 2.0], [3.0, 4.0]];
        let tensor = ndarray2rollout::<NdArray>(arr.clone(), &device);
        assert_eq!(tensor.dims(), [2, 2, 1]);
        assert_eq!(rollout2ndarray(&tensor).unwrap(), arr);
    }
}
