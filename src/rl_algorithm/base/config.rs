use burn::config::Config;

use crate::{rl_algorithm::ase_hrl::AseHrlConfig, rl_env::config::EnvConfig};

#[derive(Config, Debug)]
pub struct TrainConfig {
    pub agent: AseHrlConfig,
    pub env: EnvConfig,
    /// Number of update rounds; each round collects `agent.horizon` steps.
    #[config(default = "10000")]
    pub train_iter: usize,
    /// Save a checkpoint every this many rounds, 0 disables.
    #[config(default = "100")]
    pub checkpoint_interval: usize,
    #[config(default = "\"./ckpt\".to_string()")]
    pub ckpt_save_path: String,
    pub resume_from_ckpt_path: Option<String>,
    #[config(default = "\"./logdir\".to_string()")]
    pub log_dir: String,
    #[config(default = "1000")]
    pub eval_steps: usize,
}
