pub mod burn_utils;
pub mod error;
pub mod rl_algorithm;
pub mod rl_env;

pub use error::{HrlError, Result};

pub type FType = f32;
pub type MyPrecisionSettings = burn::record::FullPrecisionSettings;
