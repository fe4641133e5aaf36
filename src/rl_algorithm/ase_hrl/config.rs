use burn::config::Config;
use serde::{Deserialize, Serialize};

use crate::rl_algorithm::base::scheduler::LrSchedulerConfig;

/// Which discriminator scores rollouts for the style reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StyleRewardSource {
    /// The frozen discriminator shipped with the low-level controller.
    LowLevelController,
    /// The discriminator trained alongside the high-level policy.
    Trained,
}

/// Transformation applied to environment rewards before they are stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RewardShaper {
    Identity,
    Scale(f32),
}

impl RewardShaper {
    pub fn shape(&self, reward: f32) -> f32 {
        match self {
            RewardShaper::Identity => reward,
            RewardShaper::Scale(scale) => reward * scale,
        }
    }
}

#[derive(Config, Debug)]
pub struct AseHrlConfig {
    /// Rollout length per environment between two updates.
    #[config(default = "32")]
    pub horizon: usize,
    #[config(default = "0.99")]
    pub discount: f32,
    #[config(default = "0.95")]
    pub td_lambda: f32,
    #[config(default = "5")]
    pub learning_epochs: usize,
    #[config(default = "4")]
    pub mini_batches: usize,

    #[config(default = "5e-5")]
    pub lr_policy: f64,
    #[config(default = "5e-5")]
    pub lr_value: f64,
    #[config(default = "5e-5")]
    pub lr_discriminator: f64,
    pub lr_scheduler: Option<LrSchedulerConfig>,
    #[config(default = "1e-5")]
    pub adam_eps: f32,
    /// Gradient norm clip for every network; `0` disables clipping.
    #[config(default = "1.0")]
    pub grad_norm_clip: f32,

    #[config(default = "0.2")]
    pub ratio_clip: f32,
    #[config(default = "0.2")]
    pub value_clip: f32,
    #[config(default = "false")]
    pub clip_predicted_values: bool,

    #[config(default = "0.0")]
    pub entropy_loss_scale: f32,
    #[config(default = "2.5")]
    pub value_loss_scale: f32,
    #[config(default = "5.0")]
    pub discriminator_loss_scale: f32,
    #[config(default = "0.05")]
    pub discriminator_logit_regularization_scale: f32,
    #[config(default = "5.0")]
    pub discriminator_gradient_penalty_scale: f32,
    #[config(default = "1e-4")]
    pub discriminator_weight_decay_scale: f32,
    /// Truncates each discriminator input batch; `0` keeps whole mini-batches.
    #[config(default = "0")]
    pub discriminator_batch_size: usize,
    #[config(default = "true")]
    pub least_square_discriminator: bool,

    #[config(default = "2.0")]
    pub discriminator_reward_scale: f32,
    #[config(default = "0.5")]
    pub task_reward_weight: f32,
    #[config(default = "0.5")]
    pub style_reward_weight: f32,
    #[config(default = "StyleRewardSource::LowLevelController")]
    pub style_reward_source: StyleRewardSource,
    #[config(default = "RewardShaper::Scale(0.01)")]
    pub rewards_shaper: RewardShaper,

    #[config(default = "true")]
    pub state_preprocessor: bool,
    #[config(default = "true")]
    pub value_preprocessor: bool,
    #[config(default = "true")]
    pub amp_state_preprocessor: bool,

    #[config(default = "100000")]
    pub replay_buffer_size: usize,
    #[config(default = "200000")]
    pub motion_dataset_size: usize,

    #[config(default = "vec![1024, 512]")]
    pub policy_hidden_dims: Vec<usize>,
    #[config(default = "vec![1024, 512]")]
    pub value_hidden_dims: Vec<usize>,
    #[config(default = "vec![1024, 512]")]
    pub discriminator_hidden_dims: Vec<usize>,
    /// Latent skill dimension emitted by the high-level policy.
    #[config(default = "64")]
    pub latent_dim: usize,

    /// Explicit low-level controller checkpoint; the registry default is used when unset.
    pub llc_ckpt_path: Option<String>,
    #[config(default = "String::from(\"./model_zoo\")")]
    pub model_registry_dir: String,
    pub seed: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_json() {
        let config = AseHrlConfig::new()
            .with_horizon(8)
            .with_style_reward_source(StyleRewardSource::Trained);
        assert_eq!(config.mini_batches, 4);
        assert_eq!(config.rewards_shaper.shape(2.0), 0.02);
        assert!(config.llc_ckpt_path.is_none());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.json");
        config.save(&path).unwrap();
        let loaded = AseHrlConfig::load(&path).unwrap();
        assert_eq!(loaded.horizon, 8);
        assert_eq!(loaded.style_reward_source, StyleRewardSource::Trained);
    }
}
