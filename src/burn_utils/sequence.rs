use burn::{
    nn::{Linear, LinearConfig},
    prelude::*,
    tensor::activation::relu,
};

/// Fully connected stack: `Linear -> ReLU` for every hidden layer, then a
/// linear output head.
#[derive(Module, Debug)]
pub struct Sequence<B: Backend> {
    hidden: Vec<Linear<B>>,
    output: Linear<B>,
}

impl<B: Backend> Sequence<B> {
    pub fn forward<const D: usize>(&self, input: Tensor<B, D>) -> Tensor<B, D> {
        let mut out = input;
        for linear in &self.hidden {
            out = relu(linear.forward(out));
        }
        self.output.forward(out)
    }

    /// Gradient of the summed outputs with respect to `input`, `[batch, input_dim]`.
    ///
    /// Built from the layer weights in the forward graph, so the result stays
    /// differentiable with respect to the parameters.
    pub fn input_gradient(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut masks = Vec::with_capacity(self.hidden.len());
        let mut out = input;
        for linear in &self.hidden {
            let pre_activation = linear.forward(out);
            masks.push(pre_activation.clone().greater_elem(0.0).float());
            out = relu(pre_activation);
        }

        let [batch_size, _] = out.dims();
        let output_weight = self.output.weight.val(); // (hidden, out)
        let [_, output_dim] = output_weight.dims();
        let mut grad = Tensor::<B, 2>::ones([batch_size, output_dim], &output_weight.device())
            .matmul(output_weight.transpose());
        for (linear, mask) in self.hidden.iter().zip(masks).rev() {
            grad = (grad * mask).matmul(linear.weight.val().transpose());
        }
        grad
    }

    /// Flattened weights of the output head.
    pub fn output_weights(&self) -> Tensor<B, 1> {
        self.output.weight.val().flatten(0, 1)
    }

    /// Flattened weights of every linear layer, output head included.
    pub fn linear_weights(&self) -> Vec<Tensor<B, 1>> {
        self.hidden
            .iter()
            .chain(std::iter::once(&self.output))
            .map(|linear| linear.weight.val().flatten(0, 1))
            .collect()
    }
}

pub fn build_mlp<B: Backend>(
    input_size: usize,
    output_size: usize,
    n_layers: usize,
    hidden_dim: usize,
    device: &B::Device,
) -> Sequence<B> {
    build_mlp_by_dims(input_size, output_size, &vec![hidden_dim; n_layers], device)
}

pub fn build_mlp_by_dims<B: Backend>(
    input_size: usize,
    output_size: usize,
    layer_dims: &[usize],
    device: &B::Device,
) -> Sequence<B> {
    let mut hidden = Vec::with_capacity(layer_dims.len());
    let mut in_size = input_size;
    for hidden_dim in layer_dims {
        hidden.push(LinearConfig::new(in_size, *hidden_dim).init(device));
        in_size = *hidden_dim;
    }
    Sequence {
        hidden,
        output: LinearConfig::new(in_size, output_size).init(device),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::{NdArray, NdArrayDevice};
    use burn::backend::Autodiff;

    type TestBackend = Autodiff<NdArray>;

    #[test]
    fn test_forward_shape() {
        let device = NdArrayDevice::Cpu;
        let seq = build_mlp_by_dims::<NdArray>(3, 2, &[8, 4], &device);
        let out = seq.forward(Tensor::<NdArray, 2>::ones([5, 3], &device));
        assert_eq!(out.dims(), [5, 2]);
        assert_eq!(seq.linear_weights().len(), 3);
        assert_eq!(seq.output_weights().dims(), [8]);
    }

    #[test]
    fn test_input_gradient_matches_autodiff() {
        let device = NdArrayDevice::Cpu;
        let seq = build_mlp::<TestBackend>(4, 1, 2, 16, &device);
        let input = Tensor::<NdArray, 2>::random(
            [6, 4],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );

        let x = Tensor::<TestBackend, 2>::from_inner(input.clone()).require_grad();
        let grads = seq.forward(x.clone()).sum().backward();
        let expected = x.grad(&grads).unwrap();

        let analytic = seq.input_gradient(Tensor::<TestBackend, 2>::from_inner(input));
        let diff = (analytic.inner() - expected).abs().max().into_scalar();
        assert!(diff < 1e-5, "diff={}", diff);
    }
}
