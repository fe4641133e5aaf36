use std::path::Path;
use std::sync::Arc;

use ase_hrl::rl_algorithm::ase_hrl::{
    build_default_agent, model_zoo, AseHrlConfig, FrozenLowLevelController, LlcConfig, DEFAULT_LLC_NAME,
};
use ase_hrl::rl_algorithm::base::config::TrainConfig;
use ase_hrl::rl_algorithm::base::motion_dataset::MotionDataset;
use ase_hrl::rl_algorithm::on_policy_runner::OnPolicyRunner;
use ase_hrl::rl_env::config::EnvConfig;
use ase_hrl::rl_env::env::HrlEnv;
use ase_hrl::rl_env::point_mass::{CircleMotionProvider, PointMassEnv};
use ase_hrl::{HrlError, Result};
use burn::backend::ndarray::NdArrayDevice;
use burn::backend::{Autodiff, NdArray};
use burn::config::Config;
use rand::{rngs::StdRng, SeedableRng};

type MyBackend = NdArray;

/// Loads the frozen controller from an explicit path, the model registry,
/// or bootstraps an untrained one into the registry when nothing is there.
fn low_level_controller<E: HrlEnv>(
    config: &TrainConfig,
    env: &E,
    device: &NdArrayDevice,
) -> Result<FrozenLowLevelController<MyBackend>> {
    if let Some(path) = &config.agent.llc_ckpt_path {
        return FrozenLowLevelController::load(path, device);
    }
    match model_zoo(DEFAULT_LLC_NAME, &config.agent.model_registry_dir) {
        Ok(path) => FrozenLowLevelController::load(path, device),
        Err(HrlError::ModelNotFound { name, registry }) => {
            log::warn!("{} not found in {}, saving an untrained controller there", name, registry);
            let llc = LlcConfig::new(
                env.get_obs_dim(),
                config.agent.latent_dim,
                env.get_action_dim(),
                env.get_style_dim(),
            )
            .init::<MyBackend>(device);
            llc.save(Path::new(&registry).join(name))?;
            Ok(llc)
        }
        Err(e) => Err(e),
    }
}

pub fn train_network(config_path: Option<&str>) -> Result<()> {
    let config = match config_path {
        Some(path) => TrainConfig::load(path)
            .map_err(|e| HrlError::InvalidArgument(format!("train config {}: {:?}", path, e)))?,
        None => TrainConfig::new(AseHrlConfig::new(), EnvConfig::new()),
    };
    let device = NdArrayDevice::Cpu;
    let env = PointMassEnv::new(config.env.clone());
    log::info!(
        "ob_dim={}, action_dim={}, style_dim={}",
        env.get_obs_dim(),
        env.get_action_dim(),
        env.get_style_dim()
    );

    let llc = low_level_controller(&config, &env, &device)?;
    let seed = config.agent.seed.unwrap_or_else(rand::random::<u64>);
    let mut provider = CircleMotionProvider::new(StdRng::seed_from_u64(seed));
    let motion_dataset =
        MotionDataset::from_provider(&mut provider, config.agent.motion_dataset_size, &device)?;
    let mut agent = build_default_agent::<Autodiff<MyBackend>>(
        config.agent.clone(),
        Arc::new(llc),
        motion_dataset,
        env.num_envs(),
        env.get_obs_dim(),
        &device,
    )?;

    let mut runner = OnPolicyRunner::<_, MyBackend>::new(env, config, "ase_hrl")?;
    let info = runner.train(&mut agent)?;
    log::info!("last update: {:?}", info);
    runner.eval(&mut agent)?;
    Ok(())
}
