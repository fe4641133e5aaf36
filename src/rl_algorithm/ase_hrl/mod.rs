pub mod agent;
pub mod config;
pub mod llc;
pub mod losses;

pub use agent::{build_default_agent, ActOutput, AseHrlAgent, DefaultAseHrlAgent, Transition, UpdateInfo};
pub use config::{AseHrlConfig, RewardShaper, StyleRewardSource};
pub use llc::{model_zoo, FrozenLowLevelController, LlcConfig, LowLevelController, DEFAULT_LLC_NAME};
