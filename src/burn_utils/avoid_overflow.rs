use burn::tensor::{backend::Backend, Tensor};

use crate::{HrlError, Result};

/// Fails with [`HrlError::NumericalFault`] when `tensor` holds a NaN or an infinity.
pub fn check_nan_and_inf<B: Backend, const D: usize>(tensor: &Tensor<B, D>, what: &str) -> Result<()> {
    let is_nan = tensor.clone().is_nan().any().into_scalar();
    let is_inf = tensor
        .clone()
        .abs()
        .equal_elem(crate::FType::INFINITY)
        .any()
        .into_scalar();
    if is_nan || is_inf {
        return Err(HrlError::NumericalFault(format!("{} has nan or inf", what)));
    }
    Ok(())
}

pub fn check_finite(value: f32, what: &str) -> Result<()> {
    if !value.is_finite() {
        return Err(HrlError::NumericalFault(format!("{} = {}", what, value)));
    }
    Ok(())
}
