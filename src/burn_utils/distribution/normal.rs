use burn::tensor::{backend::Backend, Tensor, TensorData};
use rand::Rng;
use rand_distr::StandardNormal;

/// Diagonal Gaussian with a batch of means and one standard deviation per
/// action dimension shared by the whole batch.
#[derive(Debug, Clone)]
pub struct Normal<B: Backend> {
    loc: Tensor<B, 2>,   // (batch, dim)
    scale: Tensor<B, 1>, // (dim)
}

impl<B: Backend> Normal<B> {
    pub fn new(loc: Tensor<B, 2>, scale: Tensor<B, 1>) -> Self {
        Self { loc, scale }
    }

    pub fn mode(&self) -> Tensor<B, 2> {
        self.loc.clone()
    }

    pub fn scale(&self) -> Tensor<B, 1> {
        self.scale.clone()
    }

    pub fn sample_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Tensor<B, 2> {
        let shape = self.loc.shape();
        let noise = (0..shape.num_elements())
            .map(|_| rng.sample::<f32, _>(StandardNormal))
            .collect::<Vec<f32>>();
        let noise = Tensor::<B, 1>::from_data(TensorData::new(noise, [shape.num_elements()]), &self.loc.device())
            .reshape(shape.clone());
        // sampling never carries gradients back into the policy
        self.loc.clone().detach() + noise * self.scale.clone().detach().unsqueeze::<2>().expand(shape)
    }

    pub fn log_prob(&self, value: Tensor<B, 2>) -> Tensor<B, 2> {
        let pi = std::f32::consts::PI;
        let scale = self.scale.clone().unsqueeze::<2>().expand(value.shape());
        -((value - self.loc.clone()).powf_scalar(2.0) / (scale.clone().powf_scalar(2.0).mul_scalar(2.0)))
            - scale.log()
            - (2f32 * pi).sqrt().ln()
    }

    /// Joint log-density over the action dimensions, `[batch, 1]`.
    pub fn independent_log_prob(&self, value: Tensor<B, 2>) -> Tensor<B, 2> {
        self.log_prob(value).sum_dim(1)
    }

    /// Entropy of each action dimension, `[dim]`.
    pub fn entropy(&self) -> Tensor<B, 1> {
        let half_log_two_pi = 0.5 * (2f32 * std::f32::consts::PI).ln();
        self.scale.clone().log() + (0.5 + half_log_two_pi)
    }
}
