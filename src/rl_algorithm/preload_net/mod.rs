pub mod mlp_critic;
pub mod mlp_discriminator;
pub mod normal_mlp_policy;
