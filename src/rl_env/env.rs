use ndarray::{Array1, Array2, ArrayView2};

use crate::Result;

/// Result of one lock-step move of every environment.
#[derive(Debug, Clone)]
pub struct StepOutput {
    pub next_states: Array2<f32>,
    pub rewards: Array1<f32>,
    pub terminated: Array1<bool>,
    pub truncated: Array1<bool>,
    /// Episode ended by the task itself (failure or success), not by a time limit.
    pub terminate: Array1<bool>,
    pub style_observations: Array2<f32>,
}

/// Vectorised environment stepping all instances together. Finished
/// instances are reset inside [`HrlEnv::step`]; [`HrlEnv::observations`]
/// then returns their fresh initial states.
pub trait HrlEnv {
    fn num_envs(&self) -> usize;
    fn get_obs_dim(&self) -> usize;
    fn get_action_dim(&self) -> usize;
    fn get_style_dim(&self) -> usize;
    fn reset(&mut self) -> Array2<f32>;
    fn observations(&self) -> Array2<f32>;
    fn step(&mut self, actions: ArrayView2<f32>) -> Result<StepOutput>;
}
