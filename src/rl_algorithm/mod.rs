pub mod ase_hrl;
pub mod base;
pub mod on_policy_runner;
pub mod preload_net;
