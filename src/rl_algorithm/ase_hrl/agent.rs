use std::path::Path;
use std::sync::Arc;

use burn::grad_clipping::GradientClippingConfig;
use burn::module::AutodiffModule;
use burn::optim::AdamConfig;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::cast::ToElement;
use rand::{rngs::StdRng, SeedableRng};

use super::config::{AseHrlConfig, StyleRewardSource};
use super::llc::{FrozenLowLevelController, LowLevelController};
use super::losses;
use crate::burn_utils::check_nan_and_inf;
use crate::rl_algorithm::base::checkpoint::{match_modules, CheckpointReader, CheckpointWriter, ModuleKind};
use crate::rl_algorithm::base::memory::{Memory, TensorDtype};
use crate::rl_algorithm::base::model::{DiscriminatorModel, HierarchicalAgent, PolicyModel, ValueModel};
use crate::rl_algorithm::base::motion_dataset::MotionDataset;
use crate::rl_algorithm::base::network_trainer::NetworkTrainer;
use crate::rl_algorithm::base::preprocessor::{preprocess, preprocess_inverse, RunningStandardScaler};
use crate::rl_algorithm::base::replay_buffer::ReplayBuffer;
use crate::rl_algorithm::base::rl_utils::{
    combine_rewards, compute_gae, ndarray2rollout, rollout2ndarray, standardize, style_reward, vec2tensor1,
};
use crate::rl_algorithm::base::tracker::EpisodeTracker;
use crate::rl_algorithm::base::EpochLogger;
use crate::rl_algorithm::preload_net::mlp_critic::{MLPCritic, MLPCriticConfig};
use crate::rl_algorithm::preload_net::mlp_discriminator::{MLPDiscriminator, MLPDiscriminatorConfig};
use crate::rl_algorithm::preload_net::normal_mlp_policy::{NormalMLPPolicy, NormalMLPPolicyConfig};
use crate::{HrlError, Result};

type Inner<B> = <B as AutodiffBackend>::InnerBackend;

/// Rollout names sampled for every mini-batch, in this order.
const SAMPLED_TENSORS: [&str; 7] = [
    "states",
    "actions",
    "log_prob",
    "values",
    "returns",
    "advantages",
    "amp_states",
];

/// One vectorised environment step as seen by the agent.
pub struct Transition<B: Backend> {
    pub states: Tensor<B, 2>,
    pub next_states: Tensor<B, 2>,
    pub rewards: Vec<f32>,
    pub terminated: Vec<bool>,
    pub truncated: Vec<bool>,
    /// Episode ended by failure or success; next-state values are dropped.
    pub terminate: Vec<bool>,
    pub style_observations: Tensor<B, 2>,
}

pub struct ActOutput<B: Backend> {
    /// Primitive actions produced by the low-level controller.
    pub actions: Tensor<B, 2>,
    /// Latent skill codes chosen by the high-level policy.
    pub omega_actions: Tensor<B, 2>,
    pub log_prob: Option<Tensor<B, 2>>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateInfo {
    pub policy_loss: f32,
    pub value_loss: f32,
    pub entropy_loss: f32,
    pub discriminator_loss: f32,
    pub kl: f32,
    pub task_reward: f32,
    pub style_reward: f32,
    pub combined_reward: f32,
}

/// High-level ASE agent: chooses latent skills, lets the frozen low-level
/// controller act on them, and trains policy, value and discriminator.
pub struct AseHrlAgent<B, P, V, D, L>
where
    B: AutodiffBackend,
    P: PolicyModel<B> + AutodiffModule<B>,
    V: ValueModel<B> + AutodiffModule<B>,
    D: DiscriminatorModel<B> + AutodiffModule<B>,
    L: LowLevelController<Inner<B>>,
{
    config: AseHrlConfig,
    policy: NetworkTrainer<B, P>,
    value: NetworkTrainer<B, V>,
    discriminator: NetworkTrainer<B, D>,
    llc: Arc<L>,
    memory: Memory<Inner<B>>,
    replay_buffer: ReplayBuffer<Inner<B>>,
    motion_dataset: MotionDataset<Inner<B>>,
    state_preprocessor: Option<RunningStandardScaler>,
    value_preprocessor: Option<RunningStandardScaler>,
    amp_state_preprocessor: Option<RunningStandardScaler>,
    tracker: EpisodeTracker,
    logger: EpochLogger,
    current_omega_actions: Option<Tensor<Inner<B>, 2>>,
    current_log_prob: Option<Tensor<Inner<B>, 2>>,
    rng: StdRng,
    device: B::Device,
}

pub type DefaultAseHrlAgent<B> = AseHrlAgent<
    B,
    NormalMLPPolicy<B>,
    MLPCritic<B>,
    MLPDiscriminator<B>,
    FrozenLowLevelController<Inner<B>>,
>;

/// Builds the agent with the stock MLP networks described by `config`.
pub fn build_default_agent<B: AutodiffBackend>(
    config: AseHrlConfig,
    llc: Arc<FrozenLowLevelController<Inner<B>>>,
    motion_dataset: MotionDataset<Inner<B>>,
    num_envs: usize,
    state_dim: usize,
    device: &B::Device,
) -> Result<DefaultAseHrlAgent<B>> {
    let style_dim = motion_dataset.style_dim();
    let policy = NormalMLPPolicyConfig::new(state_dim, config.latent_dim)
        .with_hidden_dims(config.policy_hidden_dims.clone())
        .init::<B>(device);
    let value = MLPCriticConfig::new(state_dim)
        .with_hidden_dims(config.value_hidden_dims.clone())
        .init::<B>(device);
    let discriminator = MLPDiscriminatorConfig::new(style_dim)
        .with_hidden_dims(config.discriminator_hidden_dims.clone())
        .init::<B>(device);
    AseHrlAgent::new(
        config,
        policy,
        value,
        discriminator,
        llc,
        motion_dataset,
        num_envs,
        state_dim,
        device,
    )
}

fn column<B: Backend>(values: &[f32], device: &B::Device) -> Tensor<B, 2> {
    vec2tensor1::<B, f32>(values.to_vec(), device).unsqueeze_dim(1)
}

fn bool_column<B: Backend>(values: &[bool], device: &B::Device) -> Tensor<B, 2> {
    let values: Vec<f32> = values.iter().map(|v| *v as i32 as f32).collect();
    column(&values, device)
}

fn flatten_rollout<B: Backend>(tensor: Tensor<B, 3>) -> Tensor<B, 2> {
    let [memory_size, num_envs, size] = tensor.dims();
    tensor.reshape([memory_size * num_envs, size])
}

fn head<B: Backend>(tensor: Tensor<B, 2>, rows: usize) -> Tensor<B, 2> {
    let [n, dim] = tensor.dims();
    if rows == 0 || rows >= n {
        tensor
    } else {
        tensor.slice([0..rows, 0..dim])
    }
}

fn adam_config(config: &AseHrlConfig) -> AdamConfig {
    let grad_clipping = (config.grad_norm_clip > 0.0).then(|| GradientClippingConfig::Norm(config.grad_norm_clip));
    AdamConfig::new()
        .with_epsilon(config.adam_eps)
        .with_grad_clipping(grad_clipping)
}

impl<B, P, V, D, L> AseHrlAgent<B, P, V, D, L>
where
    B: AutodiffBackend,
    P: PolicyModel<B> + AutodiffModule<B>,
    P::InnerModule: PolicyModel<Inner<B>>,
    V: ValueModel<B> + AutodiffModule<B>,
    V::InnerModule: ValueModel<Inner<B>>,
    D: DiscriminatorModel<B> + AutodiffModule<B>,
    D::InnerModule: DiscriminatorModel<Inner<B>>,
    L: LowLevelController<Inner<B>>,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: AseHrlConfig,
        policy: P,
        value: V,
        discriminator: D,
        llc: Arc<L>,
        mut motion_dataset: MotionDataset<Inner<B>>,
        num_envs: usize,
        state_dim: usize,
        device: &B::Device,
    ) -> Result<Self> {
        if config.mini_batches == 0 || config.horizon == 0 || num_envs == 0 {
            return Err(HrlError::InvalidArgument(
                "horizon, mini_batches and num_envs must be positive".to_string(),
            ));
        }
        if config.horizon * num_envs < config.mini_batches {
            return Err(HrlError::InvalidArgument(format!(
                "rollout of {} samples cannot fill {} mini-batches",
                config.horizon * num_envs,
                config.mini_batches
            )));
        }
        let style_dim = motion_dataset.style_dim();
        let latent_dim = config.latent_dim;
        if llc.latent_dim() != latent_dim {
            return Err(HrlError::ShapeMismatch {
                name: "latent".to_string(),
                expected: vec![llc.latent_dim()],
                actual: vec![latent_dim],
            });
        }

        let seed = config.seed.unwrap_or_else(rand::random::<u64>);
        motion_dataset.reseed(seed.wrapping_add(3));
        let mut memory = Memory::with_seed(config.horizon, num_envs, seed, device);
        memory.create_tensor("states", state_dim, TensorDtype::Float)?;
        memory.create_tensor("actions", latent_dim, TensorDtype::Float)?;
        memory.create_tensor("rewards", 1, TensorDtype::Float)?;
        memory.create_tensor("next_states", state_dim, TensorDtype::Float)?;
        memory.create_tensor("terminated", 1, TensorDtype::Bool)?;
        memory.create_tensor("truncated", 1, TensorDtype::Bool)?;
        memory.create_tensor("log_prob", 1, TensorDtype::Float)?;
        memory.create_tensor("values", 1, TensorDtype::Float)?;
        memory.create_tensor("next_values", 1, TensorDtype::Float)?;
        memory.create_tensor("returns", 1, TensorDtype::Float)?;
        memory.create_tensor("advantages", 1, TensorDtype::Float)?;
        memory.create_tensor("amp_states", style_dim, TensorDtype::Float)?;

        let adam = adam_config(&config);
        let scheduler = config.lr_scheduler.as_ref();
        Ok(Self {
            policy: NetworkTrainer::new(policy, adam.clone(), config.lr_policy, scheduler),
            value: NetworkTrainer::new(value, adam.clone(), config.lr_value, scheduler),
            discriminator: NetworkTrainer::new(discriminator, adam, config.lr_discriminator, scheduler),
            llc,
            memory,
            replay_buffer: ReplayBuffer::with_seed(config.replay_buffer_size, style_dim, seed.wrapping_add(1), device),
            motion_dataset,
            state_preprocessor: config.state_preprocessor.then(|| RunningStandardScaler::new(state_dim)),
            value_preprocessor: config.value_preprocessor.then(|| RunningStandardScaler::new(1)),
            amp_state_preprocessor: config.amp_state_preprocessor.then(|| RunningStandardScaler::new(style_dim)),
            tracker: EpisodeTracker::new(num_envs),
            logger: EpochLogger::new(),
            current_omega_actions: None,
            current_log_prob: None,
            rng: StdRng::seed_from_u64(seed.wrapping_add(2)),
            device: device.clone(),
            config,
        })
    }

    pub fn config(&self) -> &AseHrlConfig {
        &self.config
    }

    pub fn logger_mut(&mut self) -> &mut EpochLogger {
        &mut self.logger
    }

    pub fn memory(&self) -> &Memory<Inner<B>> {
        &self.memory
    }

    pub fn replay_buffer(&self) -> &ReplayBuffer<Inner<B>> {
        &self.replay_buffer
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Picks latent skills for `states` and translates them into primitive
    /// actions through the low-level controller.
    pub fn act(&mut self, states: Tensor<Inner<B>, 2>, deterministic: bool) -> Result<ActOutput<Inner<B>>> {
        let normalized = preprocess(self.state_preprocessor.as_mut(), states.clone(), false)?;
        let dist = self.policy.net.valid().forward(normalized);
        let (omega_actions, log_prob) = if deterministic {
            (dist.mode(), None)
        } else {
            let omega_actions = dist.sample_with(&mut self.rng);
            let log_prob = dist.independent_log_prob(omega_actions.clone());
            self.current_omega_actions = Some(omega_actions.clone());
            self.current_log_prob = Some(log_prob.clone());
            (omega_actions, Some(log_prob))
        };
        let actions = self.llc_action(states, omega_actions.clone(), deterministic)?;
        Ok(ActOutput {
            actions,
            omega_actions,
            log_prob,
        })
    }

    fn llc_action(
        &mut self,
        states: Tensor<Inner<B>, 2>,
        omega_actions: Tensor<Inner<B>, 2>,
        deterministic: bool,
    ) -> Result<Tensor<Inner<B>, 2>> {
        let [batch_size, latent_dim] = omega_actions.dims();
        let norm = omega_actions
            .clone()
            .powf_scalar(2.0)
            .sum_dim(1)
            .sqrt()
            .clamp_min(1e-12)
            .expand([batch_size, latent_dim]);
        let z = omega_actions / norm;
        let input = self.llc.normalize_state(Tensor::cat(vec![states, z], 1))?;
        Ok(self.llc.act(input, deterministic, &mut self.rng))
    }

    fn predict_values(&mut self, states: Tensor<Inner<B>, 2>) -> Result<Tensor<Inner<B>, 2>> {
        let normalized = preprocess(self.state_preprocessor.as_mut(), states, false)?;
        let values = self.value.net.valid().forward(normalized);
        preprocess_inverse(self.value_preprocessor.as_ref(), values)
    }

    /// Records one environment step; must follow a stochastic [`Self::act`].
    pub fn store_transition(&mut self, transition: Transition<Inner<B>>) -> Result<()> {
        let (Some(omega_actions), Some(log_prob)) =
            (self.current_omega_actions.take(), self.current_log_prob.take())
        else {
            return Err(HrlError::MissingAction);
        };
        self.tracker.record(
            &transition.rewards,
            &transition.terminated,
            &transition.truncated,
            &mut self.logger,
        )?;

        let device = transition.states.device();
        let shaped: Vec<f32> = transition
            .rewards
            .iter()
            .map(|r| self.config.rewards_shaper.shape(*r))
            .collect();

        let values = self.predict_values(transition.states.clone())?;
        let next_values = self.predict_values(transition.next_states.clone())?;
        let keep: Vec<bool> = transition.terminate.iter().map(|t| !t).collect();
        let next_values = next_values * bool_column::<Inner<B>>(&keep, &device);

        self.memory.add_samples(&[
            ("states", transition.states),
            ("actions", omega_actions),
            ("rewards", column(&shaped, &device)),
            ("next_states", transition.next_states),
            ("terminated", bool_column(&transition.terminated, &device)),
            ("truncated", bool_column(&transition.truncated, &device)),
            ("log_prob", log_prob),
            ("values", values),
            ("next_values", next_values),
            ("amp_states", transition.style_observations),
        ])
    }

    fn style_logits(&self, amp_states: Tensor<Inner<B>, 2>) -> Result<Tensor<Inner<B>, 2>> {
        match self.config.style_reward_source {
            StyleRewardSource::LowLevelController => {
                Ok(self.llc.discriminator(self.llc.normalize_style(amp_states)?))
            }
            StyleRewardSource::Trained => {
                let normalized = match &self.amp_state_preprocessor {
                    Some(scaler) => scaler.normalize(amp_states)?,
                    None => amp_states,
                };
                Ok(self.discriminator.net.valid().forward(normalized))
            }
        }
    }

    /// Runs one full optimisation round over the stored rollout.
    pub fn update_net(&mut self) -> Result<UpdateInfo> {
        let memory_size = self.memory.memory_size();
        let num_envs = self.memory.num_envs();
        let total = memory_size * num_envs;

        // combined rewards
        let rewards = rollout2ndarray(&self.memory.get_tensor_by_name("rewards")?)?;
        let amp_states = flatten_rollout(self.memory.get_tensor_by_name("amp_states")?);
        let logits = self.style_logits(amp_states.clone())?.reshape([memory_size, num_envs, 1]);
        let style_rewards = rollout2ndarray(&style_reward(
            logits,
            self.config.least_square_discriminator,
            self.config.discriminator_reward_scale,
        ))?;
        let combined_rewards = combine_rewards(
            &rewards,
            &style_rewards,
            self.config.task_reward_weight,
            self.config.style_reward_weight,
        );

        // advantages
        let values = rollout2ndarray(&self.memory.get_tensor_by_name("values")?)?;
        let next_values = rollout2ndarray(&self.memory.get_tensor_by_name("next_values")?)?;
        let not_dones = rollout2ndarray(&self.memory.get_bool_tensor_by_name("terminated")?.bool_not().float())?;
        let gae = compute_gae(
            &combined_rewards,
            &values,
            &next_values,
            &not_dones,
            self.config.discount,
            self.config.td_lambda,
        )?;
        let advantages = standardize(&gae.advantages);
        if advantages.iter().any(|a| !a.is_finite()) {
            return Err(HrlError::NumericalFault("advantages".to_string()));
        }

        let device = self.memory.get_tensor_by_name("values")?.device();
        let values = preprocess(
            self.value_preprocessor.as_mut(),
            ndarray2rollout::<Inner<B>>(values, &device).reshape([total, 1]),
            true,
        )?;
        let returns = preprocess(
            self.value_preprocessor.as_mut(),
            ndarray2rollout::<Inner<B>>(gae.returns, &device).reshape([total, 1]),
            true,
        )?;
        self.memory
            .set_tensor_by_name("values", values.reshape([memory_size, num_envs, 1]))?;
        self.memory
            .set_tensor_by_name("returns", returns.reshape([memory_size, num_envs, 1]))?;
        self.memory
            .set_tensor_by_name("advantages", ndarray2rollout(advantages, &device))?;

        // mini-batches
        let mini_batches = self.config.mini_batches;
        let sampled_batches = self.memory.sample_all(&SAMPLED_TENSORS, mini_batches)?;
        let sampled_motion_batches = self.motion_dataset.sample(total, mini_batches);
        let sampled_replay_batches = if self.replay_buffer.is_empty() {
            sampled_batches.iter().map(|batch| batch[6].clone()).collect()
        } else {
            self.replay_buffer.sample(total, mini_batches)?
        };

        let mut info = UpdateInfo::default();
        for epoch in 0..self.config.learning_epochs {
            let mut epoch_kl = 0.0;
            for (i, batch) in sampled_batches.iter().enumerate() {
                let step = self.update_mini_batch(batch, &sampled_replay_batches[i], &sampled_motion_batches[i])?;
                info.policy_loss += step.policy_loss;
                info.value_loss += step.value_loss;
                info.entropy_loss += step.entropy_loss;
                info.discriminator_loss += step.discriminator_loss;
                epoch_kl += step.kl;
            }
            let epoch_kl = epoch_kl / sampled_batches.len() as f32;
            log::trace!("epoch {} kl={}", epoch, epoch_kl);
            info.kl = epoch_kl;
            self.policy.schedule_step(Some(epoch_kl));
            self.value.schedule_step(Some(epoch_kl));
            self.discriminator.schedule_step(Some(epoch_kl));
        }

        self.replay_buffer.add_samples(amp_states)?;

        let updates = (self.config.learning_epochs * mini_batches).max(1) as f32;
        info.policy_loss /= updates;
        info.value_loss /= updates;
        info.entropy_loss /= updates;
        info.discriminator_loss /= updates;
        info.task_reward = rewards.mean().unwrap_or(0.0);
        info.style_reward = style_rewards.mean().unwrap_or(0.0);
        info.combined_reward = combined_rewards.mean().unwrap_or(0.0);
        self.track_update(&info);
        Ok(info)
    }

    fn update_mini_batch(
        &mut self,
        batch: &[Tensor<Inner<B>, 2>],
        replay_states: &Tensor<Inner<B>, 2>,
        motion_states: &Tensor<Inner<B>, 2>,
    ) -> Result<UpdateInfo> {
        let [states, actions, old_log_prob, old_values, returns, advantages, amp_states] = batch else {
            return Err(HrlError::InvalidArgument("mini-batch layout".to_string()));
        };
        let states = preprocess(self.state_preprocessor.as_mut(), states.clone(), true)?;
        let states = Tensor::<B, 2>::from_inner(states);

        // policy
        let dist = self.policy.net.forward(states.clone());
        let log_prob_now = dist.independent_log_prob(Tensor::from_inner(actions.clone()));
        let kl = losses::approx_kl(log_prob_now.clone().inner(), old_log_prob.clone())
            .into_scalar()
            .to_f32();
        let entropy_loss = losses::entropy_loss(dist.entropy(), self.config.entropy_loss_scale);
        let policy_loss = losses::clipped_surrogate_loss(
            log_prob_now,
            Tensor::from_inner(old_log_prob.clone()),
            Tensor::from_inner(advantages.clone()),
            self.config.ratio_clip,
        );

        // value
        let predicted_values = self.value.net.forward(states);
        let value_clip = self.config.clip_predicted_values.then_some(self.config.value_clip);
        let value_loss = losses::value_loss(
            predicted_values,
            Tensor::from_inner(old_values.clone()),
            Tensor::from_inner(returns.clone()),
            value_clip,
            self.config.value_loss_scale,
        );

        // discriminator
        let rows = self.config.discriminator_batch_size;
        let amp_states = preprocess(self.amp_state_preprocessor.as_mut(), head(amp_states.clone(), rows), true)?;
        let replay_states = preprocess(
            self.amp_state_preprocessor.as_mut(),
            head(replay_states.clone(), rows),
            true,
        )?;
        let motion_states = preprocess(
            self.amp_state_preprocessor.as_mut(),
            head(motion_states.clone(), rows),
            true,
        )?;
        let discriminator_loss = self.discriminator_loss(
            Tensor::from_inner(amp_states),
            Tensor::from_inner(replay_states),
            Tensor::from_inner(motion_states),
        )?;

        let entropy_value = entropy_loss.clone().into_scalar().to_f32();
        let policy_value = self
            .policy
            .step(policy_loss + entropy_loss, "policy loss")?
            - entropy_value;
        let value_value = self.value.step(value_loss, "value loss")?;
        let discriminator_value = self.discriminator.step(discriminator_loss, "discriminator loss")?;

        Ok(UpdateInfo {
            policy_loss: policy_value,
            value_loss: value_value,
            entropy_loss: entropy_value,
            discriminator_loss: discriminator_value,
            kl,
            ..UpdateInfo::default()
        })
    }

    fn discriminator_loss(
        &self,
        amp_states: Tensor<B, 2>,
        replay_states: Tensor<B, 2>,
        motion_states: Tensor<B, 2>,
    ) -> Result<Tensor<B, 1>> {
        let net = &self.discriminator.net;
        let fake_logits = Tensor::cat(vec![net.forward(amp_states), net.forward(replay_states)], 0);
        let real_logits = net.forward(motion_states.clone());
        check_nan_and_inf(&fake_logits, "discriminator logits")?;

        let mut loss = if self.config.least_square_discriminator {
            losses::least_squares_discriminator_loss(fake_logits, real_logits)
        } else {
            losses::logistic_discriminator_loss(fake_logits, real_logits)
        };
        let c = &self.config;
        if c.discriminator_logit_regularization_scale != 0.0 {
            loss = loss
                + losses::logit_regularization(net.logit_weights())
                    .mul_scalar(c.discriminator_logit_regularization_scale);
        }
        if c.discriminator_gradient_penalty_scale != 0.0 {
            loss = loss
                + losses::gradient_penalty(net.input_gradient(motion_states))
                    .mul_scalar(c.discriminator_gradient_penalty_scale);
        }
        if c.discriminator_weight_decay_scale != 0.0 {
            loss = loss + losses::weight_decay(net.linear_weights()).mul_scalar(c.discriminator_weight_decay_scale);
        }
        Ok(loss.mul_scalar(c.discriminator_loss_scale))
    }

    fn track_update(&mut self, info: &UpdateInfo) {
        let logger = &mut self.logger;
        logger.track(("Info", "Combined rewards"), info.combined_reward);
        logger.track(("Info", "Style rewards"), info.style_reward);
        logger.track(("Info", "Task rewards"), info.task_reward);
        logger.track(("Loss", "Policy loss"), info.policy_loss);
        logger.track(("Loss", "Value loss"), info.value_loss);
        logger.track(("Loss", "Discriminator loss"), info.discriminator_loss);
        if self.config.entropy_loss_scale != 0.0 {
            logger.track(("Loss", "Entropy loss"), info.entropy_loss);
        }
        if self.policy.has_scheduler() {
            logger.track(("Learning", "Learning rate (policy)"), self.policy.lr() as f32);
            logger.track(("Learning", "Learning rate (value)"), self.value.lr() as f32);
            logger.track(("Learning", "Learning rate (discriminator)"), self.discriminator.lr() as f32);
        }
    }

    pub fn save_ckpt(&self, dir: impl AsRef<Path>) -> Result<()> {
        let mut writer = CheckpointWriter::create(dir)?;
        self.policy.save(&mut writer, "policy", "optimizer_policy")?;
        self.value.save(&mut writer, "value", "optimizer_value")?;
        self.discriminator
            .save(&mut writer, "discriminator", "optimizer_discriminator")?;
        self.policy.save_lr(&mut writer, "lr_policy")?;
        self.value.save_lr(&mut writer, "lr_value")?;
        self.discriminator.save_lr(&mut writer, "lr_discriminator")?;
        for (name, scaler) in [
            ("state_preprocessor", &self.state_preprocessor),
            ("value_preprocessor", &self.value_preprocessor),
            ("amp_state_preprocessor", &self.amp_state_preprocessor),
        ] {
            if let Some(scaler) = scaler {
                writer.save_preprocessor(name, scaler)?;
            }
        }
        let path = writer.finish()?;
        log::info!("saved checkpoint to {}", path.display());
        Ok(())
    }

    /// Restores every module the checkpoint and the agent have in common.
    pub fn load_ckpt(&mut self, dir: impl AsRef<Path>) -> Result<()> {
        let reader = CheckpointReader::open(dir)?;
        let mut live = vec![
            ("policy", ModuleKind::Network),
            ("value", ModuleKind::Network),
            ("discriminator", ModuleKind::Network),
            ("optimizer_policy", ModuleKind::Optimizer),
            ("optimizer_value", ModuleKind::Optimizer),
            ("optimizer_discriminator", ModuleKind::Optimizer),
            ("lr_policy", ModuleKind::Schedule),
            ("lr_value", ModuleKind::Schedule),
            ("lr_discriminator", ModuleKind::Schedule),
        ];
        for (name, present) in [
            ("state_preprocessor", self.state_preprocessor.is_some()),
            ("value_preprocessor", self.value_preprocessor.is_some()),
            ("amp_state_preprocessor", self.amp_state_preprocessor.is_some()),
        ] {
            if present {
                live.push((name, ModuleKind::Preprocessor));
            }
        }

        let device = self.device.clone();
        for name in match_modules(reader.manifest(), &live)? {
            match name.as_str() {
                "policy" => self.policy.load_net(&reader, &name, &device)?,
                "value" => self.value.load_net(&reader, &name, &device)?,
                "discriminator" => self.discriminator.load_net(&reader, &name, &device)?,
                "optimizer_policy" => self.policy.load_optimizer(&reader, &name, &device)?,
                "optimizer_value" => self.value.load_optimizer(&reader, &name, &device)?,
                "optimizer_discriminator" => self.discriminator.load_optimizer(&reader, &name, &device)?,
                "lr_policy" => self.policy.load_lr(&reader, &name)?,
                "lr_value" => self.value.load_lr(&reader, &name)?,
                "lr_discriminator" => self.discriminator.load_lr(&reader, &name)?,
                "state_preprocessor" => self.state_preprocessor = Some(reader.load_preprocessor(&name)?),
                "value_preprocessor" => self.value_preprocessor = Some(reader.load_preprocessor(&name)?),
                "amp_state_preprocessor" => {
                    self.amp_state_preprocessor = Some(reader.load_preprocessor(&name)?)
                }
                _ => return Err(HrlError::UnloadableModule(name)),
            }
        }
        log::info!("loaded checkpoint from {}", reader.path().display());
        Ok(())
    }
}

impl<B, P, V, D, L> HierarchicalAgent<Inner<B>> for AseHrlAgent<B, P, V, D, L>
where
    B: AutodiffBackend,
    P: PolicyModel<B> + AutodiffModule<B>,
    P::InnerModule: PolicyModel<Inner<B>>,
    V: ValueModel<B> + AutodiffModule<B>,
    V::InnerModule: ValueModel<Inner<B>>,
    D: DiscriminatorModel<B> + AutodiffModule<B>,
    D::InnerModule: DiscriminatorModel<Inner<B>>,
    L: LowLevelController<Inner<B>>,
{
    fn device(&self) -> <Inner<B> as Backend>::Device {
        self.device.clone()
    }

    fn act(&mut self, states: Tensor<Inner<B>, 2>, deterministic: bool) -> Result<ActOutput<Inner<B>>> {
        AseHrlAgent::act(self, states, deterministic)
    }

    fn store_transition(&mut self, transition: Transition<Inner<B>>) -> Result<()> {
        AseHrlAgent::store_transition(self, transition)
    }

    fn update_net(&mut self) -> Result<UpdateInfo> {
        AseHrlAgent::update_net(self)
    }

    fn logger_mut(&mut self) -> &mut EpochLogger {
        &mut self.logger
    }

    fn save_ckpt(&self, dir: &Path) -> Result<()> {
        AseHrlAgent::save_ckpt(self, dir)
    }

    fn load_ckpt(&mut self, dir: &Path) -> Result<()> {
        AseHrlAgent::load_ckpt(self, dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::burn_utils::distribution::Normal;
    use crate::rl_algorithm::ase_hrl::llc::LlcConfig;
    use crate::rl_algorithm::base::rl_utils::tensor2vec;
    use crate::rl_algorithm::base::scheduler::{KlAdaptiveConfig, LinearDecayConfig, LrSchedulerConfig};
    use burn::backend::ndarray::{NdArray, NdArrayDevice};
    use burn::backend::Autodiff;

    type TB = Autodiff<NdArray>;

    const NUM_ENVS: usize = 3;
    const STATE_DIM: usize = 4;
    const STYLE_DIM: usize = 5;
    const LATENT_DIM: usize = 2;
    const ACTION_DIM: usize = 3;

    fn test_config() -> AseHrlConfig {
        AseHrlConfig::new()
            .with_horizon(4)
            .with_learning_epochs(2)
            .with_mini_batches(2)
            .with_latent_dim(LATENT_DIM)
            .with_policy_hidden_dims(vec![16])
            .with_value_hidden_dims(vec![16])
            .with_discriminator_hidden_dims(vec![16])
            .with_replay_buffer_size(64)
            .with_seed(Some(11))
    }

    fn test_llc() -> Arc<FrozenLowLevelController<NdArray>> {
        let llc = LlcConfig::new(STATE_DIM, LATENT_DIM, ACTION_DIM, STYLE_DIM)
            .with_policy_hidden_dims(vec![8])
            .with_discriminator_hidden_dims(vec![8])
            .init::<NdArray>(&NdArrayDevice::Cpu);
        Arc::new(llc)
    }

    fn test_agent(config: AseHrlConfig) -> DefaultAseHrlAgent<TB> {
        test_agent_with_llc(config, test_llc())
    }

    fn test_agent_with_llc(
        config: AseHrlConfig,
        llc: Arc<FrozenLowLevelController<NdArray>>,
    ) -> DefaultAseHrlAgent<TB> {
        let device = NdArrayDevice::Cpu;
        let motion = Tensor::<NdArray, 2>::random(
            [32, STYLE_DIM],
            burn::tensor::Distribution::Normal(1.0, 0.5),
            &device,
        );
        let motion_dataset = MotionDataset::from_tensor(motion, 5).unwrap();
        build_default_agent::<TB>(config, llc, motion_dataset, NUM_ENVS, STATE_DIM, &device).unwrap()
    }

    fn policy_distribution(agent: &mut DefaultAseHrlAgent<TB>, states: Tensor<NdArray, 2>) -> Normal<NdArray> {
        let normalized = preprocess(agent.state_preprocessor.as_mut(), states, false).unwrap();
        agent.policy.net.valid().forward(normalized)
    }

    fn network_outputs(
        agent: &DefaultAseHrlAgent<TB>,
        states: &Tensor<NdArray, 2>,
        style: &Tensor<NdArray, 2>,
    ) -> [Vec<f32>; 3] {
        [
            tensor2vec(&agent.policy.net.valid().forward(states.clone()).mode()).unwrap(),
            tensor2vec(&agent.value.net.valid().forward(states.clone())).unwrap(),
            tensor2vec(&agent.discriminator.net.valid().forward(style.clone())).unwrap(),
        ]
    }

    /// Loss reaching into all three networks at once.
    fn joint_loss(
        agent: &DefaultAseHrlAgent<TB>,
        states: &Tensor<NdArray, 2>,
        style: &Tensor<NdArray, 2>,
    ) -> Tensor<TB, 1> {
        let states = Tensor::<TB, 2>::from_inner(states.clone());
        let style = Tensor::<TB, 2>::from_inner(style.clone());
        agent.policy.net.forward(states.clone()).mode().sum()
            + agent.value.net.forward(states).sum()
            + agent.discriminator.net.forward(style).sum()
    }

    fn random_states(rows: usize, dim: usize) -> Tensor<NdArray, 2> {
        Tensor::random([rows, dim], burn::tensor::Distribution::Normal(0.0, 1.0), &NdArrayDevice::Cpu)
    }

    fn rollout(agent: &mut DefaultAseHrlAgent<TB>, steps: usize) {
        let mut states = random_states(NUM_ENVS, STATE_DIM);
        for t in 0..steps {
            let out = agent.act(states.clone(), false).unwrap();
            assert_eq!(out.actions.dims(), [NUM_ENVS, ACTION_DIM]);
            assert_eq!(out.omega_actions.dims(), [NUM_ENVS, LATENT_DIM]);
            let next_states = random_states(NUM_ENVS, STATE_DIM);
            let done = t % 3 == 2;
            agent
                .store_transition(Transition {
                    states: states.clone(),
                    next_states: next_states.clone(),
                    rewards: vec![1.0, 0.5, -0.5],
                    terminated: vec![done, false, false],
                    truncated: vec![false, done, false],
                    terminate: vec![done, false, false],
                    style_observations: random_states(NUM_ENVS, STYLE_DIM),
                })
                .unwrap();
            states = next_states;
        }
    }

    #[test]
    fn test_store_requires_stochastic_act() {
        let mut agent = test_agent(test_config());
        let states = random_states(NUM_ENVS, STATE_DIM);
        let out = agent.act(states.clone(), true).unwrap();
        assert!(out.log_prob.is_none());
        let err = agent.store_transition(Transition {
            states: states.clone(),
            next_states: states,
            rewards: vec![0.0; NUM_ENVS],
            terminated: vec![false; NUM_ENVS],
            truncated: vec![false; NUM_ENVS],
            terminate: vec![false; NUM_ENVS],
            style_observations: random_states(NUM_ENVS, STYLE_DIM),
        });
        assert!(matches!(err, Err(HrlError::MissingAction)));
        assert!(agent.logger.tracked(("Reward", "Instantaneous reward (mean)")).is_none());

        // the rejected step must not count towards the episodes below
        rollout(&mut agent, 3);
        let lengths: Vec<usize> = agent.tracker.finished_timesteps().copied().collect();
        assert_eq!(lengths, vec![3, 3]);
    }

    #[test]
    fn test_terminated_next_values_are_zero() {
        let mut agent = test_agent(test_config());
        rollout(&mut agent, 3);
        let next_values = agent.memory().get_tensor_by_name("next_values").unwrap();
        // env 0 terminated at t = 2
        let cut = next_values.clone().slice([2..3, 0..1, 0..1]).into_scalar();
        assert_eq!(cut, 0.0);
        // env 1 was only truncated at t = 2: it keeps its bootstrap value
        let kept = next_values.slice([2..3, 1..2, 0..1]).into_scalar();
        assert_ne!(kept, 0.0);
        let not_dones = agent
            .memory()
            .get_bool_tensor_by_name("terminated")
            .unwrap()
            .bool_not()
            .float();
        assert_eq!(not_dones.clone().slice([2..3, 0..1, 0..1]).into_scalar(), 0.0);
        assert_eq!(not_dones.slice([2..3, 1..2, 0..1]).into_scalar(), 1.0);
        let rewards = agent.memory().get_tensor_by_name("rewards").unwrap();
        let shaped = rewards.slice([0..1, 0..1, 0..1]).into_scalar();
        assert!((shaped - 0.01).abs() < 1e-7);
    }

    #[test]
    fn test_update_round() {
        let mut agent = test_agent(test_config());
        rollout(&mut agent, 4);
        assert!(agent.replay_buffer().is_empty());
        let info = agent.update_net().unwrap();
        for value in [info.policy_loss, info.value_loss, info.discriminator_loss, info.kl] {
            assert!(value.is_finite());
        }
        assert_eq!(agent.replay_buffer().len(), 4 * NUM_ENVS);

        let advantages = tensor2vec(&agent.memory().get_tensor_by_name("advantages").unwrap()).unwrap();
        let mean = advantages.iter().sum::<f32>() / advantages.len() as f32;
        assert!(mean.abs() < 1e-4);

        let written = agent.logger_mut().write(0);
        assert!(written.contains_key("Loss / Discriminator loss"));
        assert!(written.contains_key("Reward / Total reward (mean)"));

        // second round samples the replay buffer instead of the rollout
        rollout(&mut agent, 4);
        agent.update_net().unwrap();
        assert_eq!(agent.replay_buffer().len(), 8 * NUM_ENVS);
    }

    #[test]
    fn test_update_with_trained_style_reward_and_logistic_loss() {
        let config = test_config()
            .with_style_reward_source(StyleRewardSource::Trained)
            .with_least_square_discriminator(false)
            .with_discriminator_batch_size(4)
            .with_entropy_loss_scale(0.01)
            .with_clip_predicted_values(true)
            .with_lr_scheduler(Some(LrSchedulerConfig::KlAdaptive(KlAdaptiveConfig::new())));
        let mut agent = test_agent(config);
        rollout(&mut agent, 4);
        let info = agent.update_net().unwrap();
        assert!(info.discriminator_loss.is_finite());
        let written = agent.logger_mut().write(1);
        assert!(written.contains_key("Learning / Learning rate (policy)"));
        assert!(written.contains_key("Loss / Entropy loss"));
    }

    #[test]
    fn test_checkpoint_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let llc = test_llc();
        let mut agent = test_agent_with_llc(test_config(), llc.clone());
        rollout(&mut agent, 4);
        agent.update_net().unwrap();
        agent.save_ckpt(dir.path().join("ckpt")).unwrap();

        let mut restored = test_agent_with_llc(test_config().with_seed(Some(99)), llc);
        restored.load_ckpt(dir.path().join("ckpt")).unwrap();

        let states = random_states(NUM_ENVS, STATE_DIM);
        let a = agent.act(states.clone(), true).unwrap();
        let b = restored.act(states.clone(), true).unwrap();
        assert_eq!(
            tensor2vec(&a.omega_actions).unwrap(),
            tensor2vec(&b.omega_actions).unwrap()
        );
        assert_eq!(tensor2vec(&a.actions).unwrap(), tensor2vec(&b.actions).unwrap());

        let a = policy_distribution(&mut agent, states.clone());
        let b = policy_distribution(&mut restored, states);
        assert_eq!(tensor2vec(&a.scale()).unwrap(), tensor2vec(&b.scale()).unwrap());
        let action = Tensor::<NdArray, 2>::ones([NUM_ENVS, LATENT_DIM], &NdArrayDevice::Cpu).mul_scalar(0.3);
        assert_eq!(
            tensor2vec(&a.independent_log_prob(action.clone())).unwrap(),
            tensor2vec(&b.independent_log_prob(action)).unwrap()
        );
    }

    #[test]
    fn test_checkpoint_keeps_scheduled_lr() {
        let dir = tempfile::tempdir().unwrap();
        let llc = test_llc();
        let config = test_config().with_lr_scheduler(Some(LrSchedulerConfig::LinearDecay(LinearDecayConfig::new(10))));
        let mut agent = test_agent_with_llc(config.clone(), llc.clone());
        rollout(&mut agent, 4);
        agent.update_net().unwrap();
        // two epochs of a ten step decay
        let expected = config.lr_policy * 0.8;
        assert!((agent.policy.lr() - expected).abs() < 1e-12);
        agent.save_ckpt(dir.path()).unwrap();

        let mut restored = test_agent_with_llc(config, llc);
        assert_ne!(restored.policy.lr(), agent.policy.lr());
        restored.load_ckpt(dir.path()).unwrap();
        assert_eq!(restored.policy.lr(), agent.policy.lr());
        assert_eq!(restored.value.lr(), agent.value.lr());
        assert_eq!(restored.discriminator.lr(), agent.discriminator.lr());

        agent.policy.schedule_step(None);
        restored.policy.schedule_step(None);
        assert_eq!(restored.policy.lr(), agent.policy.lr());
    }

    #[test]
    fn test_each_step_only_moves_its_own_network() {
        let mut agent = test_agent(test_config());
        let states = random_states(NUM_ENVS, STATE_DIM);
        let style = random_states(NUM_ENVS, STYLE_DIM);
        for stepped in 0..3 {
            let before = network_outputs(&agent, &states, &style);
            let loss = joint_loss(&agent, &states, &style);
            match stepped {
                0 => agent.policy.step(loss, "joint loss").unwrap(),
                1 => agent.value.step(loss, "joint loss").unwrap(),
                _ => agent.discriminator.step(loss, "joint loss").unwrap(),
            };
            let after = network_outputs(&agent, &states, &style);
            for net in 0..3 {
                if net == stepped {
                    assert_ne!(before[net], after[net], "network {} did not move", net);
                } else {
                    assert_eq!(before[net], after[net], "network {} moved with {}", net, stepped);
                }
            }
        }
    }

    #[test]
    fn test_seeded_agents_act_alike() {
        let llc = test_llc();
        let mut a = test_agent_with_llc(test_config(), llc.clone());
        // same weights and seed, so only the agent's rng drives sampling
        let motion = Tensor::<NdArray, 2>::zeros([32, STYLE_DIM], &NdArrayDevice::Cpu);
        let mut b: DefaultAseHrlAgent<TB> = AseHrlAgent::new(
            test_config(),
            a.policy.net.clone(),
            a.value.net.clone(),
            a.discriminator.net.clone(),
            llc,
            MotionDataset::from_tensor(motion, 5).unwrap(),
            NUM_ENVS,
            STATE_DIM,
            &NdArrayDevice::Cpu,
        )
        .unwrap();
        let states = random_states(NUM_ENVS, STATE_DIM);
        for _ in 0..2 {
            let x = a.act(states.clone(), false).unwrap();
            let y = b.act(states.clone(), false).unwrap();
            assert_eq!(tensor2vec(&x.omega_actions).unwrap(), tensor2vec(&y.omega_actions).unwrap());
            assert_eq!(tensor2vec(&x.actions).unwrap(), tensor2vec(&y.actions).unwrap());
        }
    }

    #[test]
    fn test_load_skips_modules_the_agent_lacks() {
        let dir = tempfile::tempdir().unwrap();
        let agent = test_agent(test_config());
        agent.save_ckpt(dir.path()).unwrap();

        let mut without_value_scaler = test_agent(test_config().with_value_preprocessor(false));
        without_value_scaler.load_ckpt(dir.path()).unwrap();
    }

    #[test]
    fn test_rejects_latent_mismatch() {
        let device = NdArrayDevice::Cpu;
        let llc = LlcConfig::new(STATE_DIM, LATENT_DIM + 1, ACTION_DIM, STYLE_DIM)
            .with_policy_hidden_dims(vec![8])
            .with_discriminator_hidden_dims(vec![8])
            .init::<NdArray>(&device);
        let motion_dataset = MotionDataset::from_tensor(random_states(8, STYLE_DIM), 0).unwrap();
        let result = build_default_agent::<TB>(
            test_config(),
            Arc::new(llc),
            motion_dataset,
            NUM_ENVS,
            STATE_DIM,
            &device,
        );
        assert!(result.is_err());
    }
}
