//! Loss terms of one ASE-HRL mini-batch update. Every function is pure; the
//! optional discriminator regularisers are only called when their scale is
//! non-zero.

use burn::nn::loss::{MseLoss, Reduction};
use burn::prelude::*;

/// Clipped surrogate objective `-mean(min(ρA, clip(ρ, 1-ε, 1+ε)A))`.
pub fn clipped_surrogate_loss<B: Backend>(
    log_prob_now: Tensor<B, 2>,
    old_log_prob: Tensor<B, 2>,
    advantages: Tensor<B, 2>,
    ratio_clip: f32,
) -> Tensor<B, 1> {
    let ratio = (log_prob_now - old_log_prob).exp();
    let surrogate = advantages.clone() * ratio.clone();
    let surrogate_clipped = advantages * ratio.clamp(1.0 - ratio_clip, 1.0 + ratio_clip);
    surrogate.min_pair(surrogate_clipped).mean().neg()
}

pub fn entropy_loss<B: Backend>(entropy: Tensor<B, 1>, entropy_loss_scale: f32) -> Tensor<B, 1> {
    entropy.mean().mul_scalar(-entropy_loss_scale)
}

/// `scale * MSE(returns, v̂)`, with `v̂` kept within `old_values ± value_clip` when a clip is given.
pub fn value_loss<B: Backend>(
    predicted_values: Tensor<B, 2>,
    old_values: Tensor<B, 2>,
    returns: Tensor<B, 2>,
    value_clip: Option<f32>,
    value_loss_scale: f32,
) -> Tensor<B, 1> {
    let predicted_values = match value_clip {
        Some(clip) => old_values.clone() + (predicted_values - old_values).clamp(-clip, clip),
        None => predicted_values,
    };
    MseLoss::new()
        .forward(returns, predicted_values, Reduction::Mean)
        .mul_scalar(value_loss_scale)
}

/// Mean binary cross entropy on logits, computed in the numerically stable form
/// `max(x, 0) - x * y + ln(1 + exp(-|x|))`.
pub fn bce_with_logits<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
    let loss = logits.clone().clamp_min(0.0) - logits.clone() * targets + logits.abs().neg().exp().log1p();
    loss.mean()
}

/// `0.5 * (MSE(fake, -1) + MSE(real, 1))`.
pub fn least_squares_discriminator_loss<B: Backend>(
    fake_logits: Tensor<B, 2>,
    real_logits: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let fake_target = fake_logits.ones_like().neg();
    let real_target = real_logits.ones_like();
    let mse = MseLoss::new();
    (mse.forward(fake_logits, fake_target, Reduction::Mean)
        + mse.forward(real_logits, real_target, Reduction::Mean))
    .mul_scalar(0.5)
}

/// `0.5 * (BCE(fake, 0) + BCE(real, 1))`.
pub fn logistic_discriminator_loss<B: Backend>(
    fake_logits: Tensor<B, 2>,
    real_logits: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let fake_target = fake_logits.zeros_like();
    let real_target = real_logits.ones_like();
    (bce_with_logits(fake_logits, fake_target) + bce_with_logits(real_logits, real_target)).mul_scalar(0.5)
}

pub fn logit_regularization<B: Backend>(logit_weights: Tensor<B, 1>) -> Tensor<B, 1> {
    logit_weights.powf_scalar(2.0).sum()
}

/// Zero-centred gradient penalty: batch mean of `|∂logit/∂input|²`.
pub fn gradient_penalty<B: Backend>(input_gradient: Tensor<B, 2>) -> Tensor<B, 1> {
    input_gradient.powf_scalar(2.0).sum_dim(1).mean()
}

pub fn weight_decay<B: Backend>(weights: Vec<Tensor<B, 1>>) -> Tensor<B, 1> {
    Tensor::cat(weights, 0).powf_scalar(2.0).sum()
}

/// `mean((ρ - 1) - ln ρ)`, the low-variance estimator of KL(old || new).
pub fn approx_kl<B: Backend>(log_prob_now: Tensor<B, 2>, old_log_prob: Tensor<B, 2>) -> Tensor<B, 1> {
    let log_ratio = log_prob_now - old_log_prob;
    (log_ratio.clone().exp() - 1.0 - log_ratio).mean()
}
