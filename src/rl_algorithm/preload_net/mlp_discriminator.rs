use crate::burn_utils::{build_mlp_by_dims, Sequence};
use crate::rl_algorithm::base::model::DiscriminatorModel;
use burn::prelude::*;

/// ReLU MLP emitting one style logit per observation.
#[derive(Module, Debug)]
pub struct MLPDiscriminator<B: Backend> {
    net: Sequence<B>,
}

impl<B: Backend> DiscriminatorModel<B> for MLPDiscriminator<B> {
    fn forward(&self, observations: Tensor<B, 2>) -> Tensor<B, 2> {
        self.net.forward(observations)
    }

    fn input_gradient(&self, observations: Tensor<B, 2>) -> Tensor<B, 2> {
        self.net.input_gradient(observations)
    }

    fn logit_weights(&self) -> Tensor<B, 1> {
        self.net.output_weights()
    }

    fn linear_weights(&self) -> Vec<Tensor<B, 1>> {
        self.net.linear_weights()
    }
}

#[derive(Config, Debug)]
pub struct MLPDiscriminatorConfig {
    pub observation_dim: usize,
    #[config(default = "vec![1024, 512]")]
    pub hidden_dims: Vec<usize>,
}

impl MLPDiscriminatorConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> MLPDiscriminator<B> {
        MLPDiscriminator {
            net: build_mlp_by_dims(self.observation_dim, 1, &self.hidden_dims, device),
        }
    }
}
