use crate::burn_utils::{build_mlp_by_dims, Sequence};
use crate::rl_algorithm::base::model::ValueModel;
use burn::prelude::*;

#[derive(Module, Debug)]
pub struct MLPCritic<B: Backend> {
    net: Sequence<B>,
}

impl<B: Backend> ValueModel<B> for MLPCritic<B> {
    fn forward(&self, states: Tensor<B, 2>) -> Tensor<B, 2> {
        self.net.forward(states)
    }
}

#[derive(Config, Debug)]
pub struct MLPCriticConfig {
    pub observation_dim: usize,
    #[config(default = "vec![1024, 512]")]
    pub hidden_dims: Vec<usize>,
}

impl MLPCriticConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> MLPCritic<B> {
        MLPCritic {
            net: build_mlp_by_dims(self.observation_dim, 1, &self.hidden_dims, device),
        }
    }
}
