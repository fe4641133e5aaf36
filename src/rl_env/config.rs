use burn::config::Config;

#[derive(Config, Debug)]
pub struct EnvConfig {
    #[config(default = "16")]
    pub n_env: usize,
    /// Episodes are truncated after this many steps.
    #[config(default = "200")]
    pub max_traj_length: usize,
    #[config(default = "0.05")]
    pub dt: f32,
    /// Distance from the origin at which an episode terminates as failed.
    #[config(default = "3.0")]
    pub position_limit: f32,
    pub seed: Option<u64>,
}
