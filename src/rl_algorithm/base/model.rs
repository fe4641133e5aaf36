use std::path::Path;

use burn::module::Module;
use burn::prelude::*;

use super::EpochLogger;
use crate::burn_utils::distribution::Normal;
use crate::rl_algorithm::ase_hrl::{ActOutput, Transition, UpdateInfo};
use crate::Result;

/// High-level policy: states to a Gaussian over latent skill codes.
pub trait PolicyModel<B: Backend>: Module<B> {
    fn forward(&self, states: Tensor<B, 2>) -> Normal<B>;
}

/// State-value estimate, `[batch, 1]`.
pub trait ValueModel<B: Backend>: Module<B> {
    fn forward(&self, states: Tensor<B, 2>) -> Tensor<B, 2>;
}

/// Style discriminator producing one logit per observation.
pub trait DiscriminatorModel<B: Backend>: Module<B> {
    fn forward(&self, observations: Tensor<B, 2>) -> Tensor<B, 2>;

    /// `∂ sum(logits) / ∂ observations`, differentiable with respect to the parameters.
    fn input_gradient(&self, observations: Tensor<B, 2>) -> Tensor<B, 2>;

    /// Weights of the final logit layer.
    fn logit_weights(&self) -> Tensor<B, 1>;

    /// Weights of every linear layer.
    fn linear_weights(&self) -> Vec<Tensor<B, 1>>;
}

/// What a rollout runner needs from a hierarchical agent. Tensors live on
/// the non-differentiable backend `B`.
pub trait HierarchicalAgent<B: Backend> {
    fn device(&self) -> B::Device;
    fn act(&mut self, states: Tensor<B, 2>, deterministic: bool) -> Result<ActOutput<B>>;
    fn store_transition(&mut self, transition: Transition<B>) -> Result<()>;
    fn update_net(&mut self) -> Result<UpdateInfo>;
    fn logger_mut(&mut self) -> &mut EpochLogger;
    fn save_ckpt(&self, dir: &Path) -> Result<()>;
    fn load_ckpt(&mut self, dir: &Path) -> Result<()>;
}
