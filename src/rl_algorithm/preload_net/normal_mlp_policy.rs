use crate::burn_utils::distribution::Normal;
use crate::burn_utils::{build_mlp_by_dims, Sequence};
use crate::rl_algorithm::base::model::PolicyModel;
use burn::nn::Tanh;
use burn::{nn::Linear, nn::LinearConfig, prelude::*};

pub const MIN_LOG_STD: f32 = -20.0;
pub const MAX_LOG_STD: f32 = 2.0;

/// Gaussian policy with a tanh-squashed mean and a state-independent log std.
#[derive(Module, Debug)]
pub struct NormalMLPPolicy<B: Backend> {
    mean_net: Sequence<B>,
    logstd_linear: Linear<B>,
    tanh: Tanh,
}

impl<B: Backend> NormalMLPPolicy<B> {
    pub fn log_std(&self) -> Tensor<B, 1> {
        self.logstd_linear
            .weight
            .val()
            .flatten::<1>(0, 1)
            .clamp(MIN_LOG_STD, MAX_LOG_STD)
    }
}

impl<B: Backend> PolicyModel<B> for NormalMLPPolicy<B> {
    fn forward(&self, states: Tensor<B, 2>) -> Normal<B> {
        let mean = self.tanh.forward(self.mean_net.forward(states));
        Normal::new(mean, self.log_std().exp())
    }
}

#[derive(Config, Debug)]
pub struct NormalMLPPolicyConfig {
    pub observation_dim: usize,
    pub action_dim: usize,
    #[config(default = "vec![1024, 512]")]
    pub hidden_dims: Vec<usize>,
    #[config(default = "0.0")]
    pub initial_log_std: f32,
}

impl NormalMLPPolicyConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> NormalMLPPolicy<B> {
        let mean_net = build_mlp_by_dims(self.observation_dim, self.action_dim, &self.hidden_dims, device);
        let logstd_linear = LinearConfig::new(1, self.action_dim)
            .with_bias(false)
            .with_initializer(nn::Initializer::Constant {
                value: self.initial_log_std as f64,
            })
            .init::<B>(device);
        NormalMLPPolicy {
            mean_net,
            logstd_linear,
            tanh: Tanh::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::{NdArray, NdArrayDevice};

    #[test]
    fn test_forward() {
        let device = NdArrayDevice::Cpu;
        let policy = NormalMLPPolicyConfig::new(5, 3)
            .with_hidden_dims(vec![16])
            .with_initial_log_std(-1.0)
            .init::<NdArray>(&device);
        let dist = policy.forward(Tensor::ones([4, 5], &device));
        assert_eq!(dist.mode().dims(), [4, 3]);
        assert!(dist.mode().abs().max().into_scalar() <= 1.0);
        let scale = dist.scale().to_data().to_vec::<f32>().unwrap();
        for s in scale {
            assert!((s - (-1.0f32).exp()).abs() < 1e-6);
        }
    }
}
