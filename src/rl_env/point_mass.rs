//! A vectorised 2D point mass that should circle the origin at unit radius.
//! Small enough for tests and for running the trainer without a physics
//! simulator.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use ndarray_rand::rand::{rngs::StdRng, SeedableRng};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::Rng;

use super::config::EnvConfig;
use super::env::{HrlEnv, StepOutput};
use crate::rl_algorithm::base::motion_dataset::ReferenceMotionProvider;
use crate::{HrlError, Result};

const OBS_DIM: usize = 5; // position, velocity, distance to the unit circle
const ACTION_DIM: usize = 2;
const STYLE_DIM: usize = 4; // position, velocity

pub struct PointMassEnv {
    config: EnvConfig,
    position: Array2<f32>,
    velocity: Array2<f32>,
    steps: Array1<usize>,
    rng: StdRng,
}

impl PointMassEnv {
    pub fn new(config: EnvConfig) -> Self {
        let seed = config.seed.unwrap_or_else(rand::random::<u64>);
        let n = config.n_env;
        let mut env = Self {
            position: Array2::zeros((n, 2)),
            velocity: Array2::zeros((n, 2)),
            steps: Array1::zeros(n),
            rng: StdRng::seed_from_u64(seed),
            config,
        };
        env.reset();
        env
    }

    fn reset_env(&mut self, i: usize) {
        let position = Array1::random_using(2, Uniform::new(-0.5f32, 0.5), &mut self.rng);
        self.position.row_mut(i).assign(&position);
        self.velocity.row_mut(i).fill(0.0);
        self.steps[i] = 0;
    }

    fn style_observations(&self) -> Array2<f32> {
        ndarray::concatenate![Axis(1), self.position, self.velocity]
    }
}

fn radius_error(position: &Array2<f32>) -> Array1<f32> {
    position.map_axis(Axis(1), |p| (p[0] * p[0] + p[1] * p[1]).sqrt() - 1.0)
}

impl HrlEnv for PointMassEnv {
    fn num_envs(&self) -> usize {
        self.config.n_env
    }

    fn get_obs_dim(&self) -> usize {
        OBS_DIM
    }

    fn get_action_dim(&self) -> usize {
        ACTION_DIM
    }

    fn get_style_dim(&self) -> usize {
        STYLE_DIM
    }

    fn reset(&mut self) -> Array2<f32> {
        for i in 0..self.config.n_env {
            self.reset_env(i);
        }
        self.observations()
    }

    fn observations(&self) -> Array2<f32> {
        let error = radius_error(&self.position).insert_axis(Axis(1));
        ndarray::concatenate![Axis(1), self.position, self.velocity, error]
    }

    fn step(&mut self, actions: ArrayView2<f32>) -> Result<StepOutput> {
        let n = self.config.n_env;
        if actions.dim() != (n, ACTION_DIM) {
            return Err(HrlError::ShapeMismatch {
                name: "actions".to_string(),
                expected: vec![n, ACTION_DIM],
                actual: actions.shape().to_vec(),
            });
        }
        let dt = self.config.dt;
        let actions = actions.mapv(|a| a.clamp(-1.0, 1.0));
        self.velocity = &self.velocity + &(actions * dt);
        self.position = &self.position + &(&self.velocity * dt);
        self.steps += 1;

        let next_states = self.observations();
        let style_observations = self.style_observations();
        let error = radius_error(&self.position);
        let rewards = error.mapv(|e| (-e.abs()).exp());
        let distance = error.mapv(|e| e + 1.0);
        let terminated = distance.mapv(|d| d > self.config.position_limit);
        let truncated = self.steps.mapv(|t| t >= self.config.max_traj_length);
        let terminate = terminated.clone();

        for i in 0..n {
            if terminated[i] || truncated[i] {
                self.reset_env(i);
            }
        }
        log::trace!("point mass step, mean reward {:?}", rewards.mean());

        Ok(StepOutput {
            next_states,
            rewards,
            terminated,
            truncated,
            terminate,
            style_observations,
        })
    }
}

/// Reference motion: unit-speed travel around the unit circle.
pub struct CircleMotionProvider<R: Rng> {
    rng: R,
}

impl<R: Rng> CircleMotionProvider<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng> ReferenceMotionProvider for CircleMotionProvider<R> {
    fn style_dim(&self) -> usize {
        STYLE_DIM
    }

    fn collect(&mut self, n: usize) -> Array2<f32> {
        let mut observations = Array2::zeros((n, STYLE_DIM));
        for mut row in observations.rows_mut() {
            let theta: f32 = self.rng.random_range(0.0..std::f32::consts::TAU);
            let (sin, cos) = theta.sin_cos();
            row.assign(&ndarray::arr1(&[cos, sin, -sin, cos]));
        }
        observations
    }
}
