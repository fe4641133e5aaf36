use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::Instant;

use burn::config::Config;
use burn::prelude::Backend;
use chrono::Utc;
use chrono_tz::Asia::Shanghai;
use ndarray::Array2;

use crate::rl_algorithm::ase_hrl::{Transition, UpdateInfo};
use crate::rl_algorithm::base::config::TrainConfig;
use crate::rl_algorithm::base::model::HierarchicalAgent;
use crate::rl_algorithm::base::rl_utils::{ndarray2tensor2, tensor2ndarray2};
use crate::rl_env::env::{HrlEnv, StepOutput};
use crate::Result;

/// Drives an agent through rounds of `horizon` lock-step environment steps,
/// one optimisation pass per round.
pub struct OnPolicyRunner<E: HrlEnv, B: Backend> {
    env: E,
    config: TrainConfig,
    exp_name: String,
    exp_base_path: PathBuf,
    backend: PhantomData<B>,
}

#[derive(Debug, Clone, Copy)]
pub struct EvalInfo {
    pub mean_step_reward: f32,
    pub finished_episodes: usize,
}

fn transition<B: Backend>(states: Array2<f32>, step: StepOutput, device: &B::Device) -> Transition<B> {
    Transition {
        states: ndarray2tensor2(states, device),
        next_states: ndarray2tensor2(step.next_states, device),
        rewards: step.rewards.to_vec(),
        terminated: step.terminated.to_vec(),
        truncated: step.truncated.to_vec(),
        terminate: step.terminate.to_vec(),
        style_observations: ndarray2tensor2(step.style_observations, device),
    }
}

impl<E: HrlEnv, B: Backend> OnPolicyRunner<E, B> {
    pub fn new(env: E, config: TrainConfig, algo_name: &str) -> Result<Self> {
        let env_name = std::any::type_name::<E>().rsplit("::").next().unwrap_or("env");
        let exp_name = format!(
            "{}_{}_{}",
            algo_name,
            env_name,
            Utc::now().with_timezone(&Shanghai).format("%m-%d_%H-%M-%S")
        );
        let exp_base_path = Path::new(&config.ckpt_save_path).join(&exp_name);
        std::fs::create_dir_all(&exp_base_path)?;
        config.save(exp_base_path.join("config.json"))?;
        log::info!("experiment {} in {}", exp_name, exp_base_path.display());
        Ok(Self {
            env,
            config,
            exp_name,
            exp_base_path,
            backend: PhantomData,
        })
    }

    pub fn exp_name(&self) -> &str {
        &self.exp_name
    }

    pub fn exp_base_path(&self) -> &Path {
        &self.exp_base_path
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    /// Runs `train_iter` rounds and returns the statistics of the last one.
    pub fn train<A: HierarchicalAgent<B>>(&mut self, agent: &mut A) -> Result<UpdateInfo> {
        let logdir = Path::new(&self.config.log_dir).join(&self.exp_name);
        agent.logger_mut().init_writer(&logdir.to_string_lossy());
        if let Some(path) = &self.config.resume_from_ckpt_path {
            log::info!("resuming from {}", path);
            agent.load_ckpt(Path::new(path))?;
        }

        let device = agent.device();
        let horizon = self.config.agent.horizon;
        let mut update_info = UpdateInfo::default();
        let mut states = self.env.reset();
        for iter in 0..self.config.train_iter {
            let start = Instant::now();
            for _ in 0..horizon {
                let states_tensor = ndarray2tensor2::<B, f32>(states.clone(), &device);
                let actions = tensor2ndarray2(&agent.act(states_tensor, false)?.actions)?;
                let step = self.env.step(actions.view())?;
                agent.store_transition(transition(states, step, &device))?;
                states = self.env.observations();
            }
            let collect_time = start.elapsed().as_millis() as f32;

            let start = Instant::now();
            update_info = agent.update_net()?;
            let update_time = start.elapsed().as_millis() as f32;

            let logger = agent.logger_mut();
            logger.track(("Time", "Collect time (ms)"), collect_time);
            logger.track(("Time", "Update time (ms)"), update_time);
            logger.write(iter);

            let round = iter + 1;
            let interval = self.config.checkpoint_interval;
            if interval > 0 && round % interval == 0 {
                agent.save_ckpt(&self.exp_base_path.join(format!("iter{}", round)))?;
            }
        }
        Ok(update_info)
    }

    /// Runs the policy deterministically for `eval_steps` steps without storing anything.
    pub fn eval<A: HierarchicalAgent<B>>(&mut self, agent: &mut A) -> Result<EvalInfo> {
        let device = agent.device();
        let mut states = self.env.reset();
        let mut total_reward = 0.0;
        let mut finished_episodes = 0;
        for _ in 0..self.config.eval_steps {
            let states_tensor = ndarray2tensor2::<B, f32>(states, &device);
            let actions = tensor2ndarray2(&agent.act(states_tensor, true)?.actions)?;
            let step = self.env.step(actions.view())?;
            total_reward += step.rewards.mean().unwrap_or(0.0);
            finished_episodes += step
                .terminated
                .iter()
                .zip(step.truncated.iter())
                .filter(|(terminated, truncated)| **terminated || **truncated)
                .count();
            states = self.env.observations();
        }
        let info = EvalInfo {
            mean_step_reward: total_reward / self.config.eval_steps.max(1) as f32,
            finished_episodes,
        };
        log::info!(
            "eval: mean step reward={} finished episodes={}",
            info.mean_step_reward,
            info.finished_episodes
        );
        Ok(info)
    }
}
