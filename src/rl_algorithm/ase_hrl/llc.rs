use std::path::{Path, PathBuf};

use burn::prelude::*;
use rand::rngs::StdRng;

use crate::rl_algorithm::base::checkpoint::{CheckpointReader, CheckpointWriter, MANIFEST_FILE};
use crate::rl_algorithm::base::model::{DiscriminatorModel, PolicyModel};
use crate::rl_algorithm::base::preprocessor::RunningStandardScaler;
use crate::rl_algorithm::preload_net::mlp_discriminator::{MLPDiscriminator, MLPDiscriminatorConfig};
use crate::rl_algorithm::preload_net::normal_mlp_policy::{NormalMLPPolicy, NormalMLPPolicyConfig};
use crate::HrlError;

pub const DEFAULT_LLC_NAME: &str = "HumanoidASEGetupSwordShield";
const LLC_CONFIG_FILE: &str = "llc_config.json";

/// Pretrained skill controller that turns latent codes into primitive actions.
/// Read-only for the whole run.
pub trait LowLevelController<B: Backend> {
    fn latent_dim(&self) -> usize;

    fn normalize_state(&self, state_plus_latent: Tensor<B, 2>) -> crate::Result<Tensor<B, 2>>;

    fn normalize_style(&self, style_observations: Tensor<B, 2>) -> crate::Result<Tensor<B, 2>>;

    /// Primitive actions for already normalised `state ‖ latent` rows.
    /// Stochastic actions draw their noise from `rng`.
    fn act(&self, normalized_state_plus_latent: Tensor<B, 2>, deterministic: bool, rng: &mut StdRng) -> Tensor<B, 2>;

    /// Style logits for already normalised style observations.
    fn discriminator(&self, normalized_style: Tensor<B, 2>) -> Tensor<B, 2>;
}

#[derive(Config, Debug)]
pub struct LlcConfig {
    pub state_dim: usize,
    pub latent_dim: usize,
    pub action_dim: usize,
    pub style_dim: usize,
    #[config(default = "vec![1024, 512]")]
    pub policy_hidden_dims: Vec<usize>,
    #[config(default = "vec![1024, 512]")]
    pub discriminator_hidden_dims: Vec<usize>,
}

pub struct FrozenLowLevelController<B: Backend> {
    config: LlcConfig,
    policy: NormalMLPPolicy<B>,
    discriminator: MLPDiscriminator<B>,
    state_preprocessor: Option<RunningStandardScaler>,
    style_preprocessor: Option<RunningStandardScaler>,
}

impl LlcConfig {
    /// Freshly initialised controller with identity preprocessors.
    pub fn init<B: Backend>(&self, device: &B::Device) -> FrozenLowLevelController<B> {
        FrozenLowLevelController {
            policy: NormalMLPPolicyConfig::new(self.state_dim + self.latent_dim, self.action_dim)
                .with_hidden_dims(self.policy_hidden_dims.clone())
                .init(device),
            discriminator: MLPDiscriminatorConfig::new(self.style_dim)
                .with_hidden_dims(self.discriminator_hidden_dims.clone())
                .init(device),
            state_preprocessor: Some(RunningStandardScaler::new(self.state_dim + self.latent_dim)),
            style_preprocessor: Some(RunningStandardScaler::new(self.style_dim)),
            config: self.clone(),
        }
    }
}

impl<B: Backend> FrozenLowLevelController<B> {
    pub fn config(&self) -> &LlcConfig {
        &self.config
    }

    pub fn load(dir: impl AsRef<Path>, device: &B::Device) -> crate::Result<Self> {
        let dir = dir.as_ref();
        let config = LlcConfig::load(dir.join(LLC_CONFIG_FILE))
            .map_err(|e| HrlError::InvalidArgument(format!("llc config: {:?}", e)))?;
        let mut llc = config.init::<B>(device);
        let reader = CheckpointReader::open(dir)?;
        llc.policy = reader.load_network("policy", llc.policy, device)?;
        llc.discriminator = reader.load_network("discriminator", llc.discriminator, device)?;
        let modules = &reader.manifest().modules;
        llc.state_preprocessor = if modules.contains_key("state_preprocessor") {
            Some(reader.load_preprocessor("state_preprocessor")?)
        } else {
            None
        };
        llc.style_preprocessor = if modules.contains_key("amp_state_preprocessor") {
            Some(reader.load_preprocessor("amp_state_preprocessor")?)
        } else {
            None
        };
        log::info!("low-level controller loaded from {}", dir.display());
        Ok(llc)
    }

    pub fn save(&self, dir: impl AsRef<Path>) -> crate::Result<PathBuf> {
        let mut writer = CheckpointWriter::create(dir.as_ref())?;
        writer.save_network::<B, _>("policy", &self.policy)?;
        writer.save_network::<B, _>("discriminator", &self.discriminator)?;
        if let Some(scaler) = &self.state_preprocessor {
            writer.save_preprocessor("state_preprocessor", scaler)?;
        }
        if let Some(scaler) = &self.style_preprocessor {
            writer.save_preprocessor("amp_state_preprocessor", scaler)?;
        }
        self.config.save(dir.as_ref().join(LLC_CONFIG_FILE))?;
        writer.finish()
    }
}

impl<B: Backend> LowLevelController<B> for FrozenLowLevelController<B> {
    fn latent_dim(&self) -> usize {
        self.config.latent_dim
    }

    fn normalize_state(&self, state_plus_latent: Tensor<B, 2>) -> crate::Result<Tensor<B, 2>> {
        match &self.state_preprocessor {
            Some(scaler) => scaler.normalize(state_plus_latent),
            None => Ok(state_plus_latent),
        }
    }

    fn normalize_style(&self, style_observations: Tensor<B, 2>) -> crate::Result<Tensor<B, 2>> {
        match &self.style_preprocessor {
            Some(scaler) => scaler.normalize(style_observations),
            None => Ok(style_observations),
        }
    }

    fn act(&self, normalized_state_plus_latent: Tensor<B, 2>, deterministic: bool, rng: &mut StdRng) -> Tensor<B, 2> {
        let dist = self.policy.forward(normalized_state_plus_latent);
        if deterministic {
            dist.mode()
        } else {
            dist.sample_with(rng)
        }
    }

    fn discriminator(&self, normalized_style: Tensor<B, 2>) -> Tensor<B, 2> {
        self.discriminator.forward(normalized_style)
    }
}

/// Resolves a pretrained artifact by name inside a registry directory.
pub fn model_zoo(name: &str, registry_dir: impl AsRef<Path>) -> crate::Result<PathBuf> {
    let path = registry_dir.as_ref().join(name);
    if path.join(MANIFEST_FILE).is_file() {
        Ok(path)
    } else {
        Err(HrlError::ModelNotFound {
            name: name.to_string(),
            registry: registry_dir.as_ref().display().to_string(),
        })
    }
}
