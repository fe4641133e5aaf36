pub mod config;
pub mod env;
pub mod point_mass;
