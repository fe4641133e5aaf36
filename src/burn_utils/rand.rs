use burn::prelude::Backend;
use burn::tensor::{Int, Tensor, TensorData};
use rand::seq::SliceRandom;
use rand::Rng;

/// Random permutation of `0..n` as an index tensor.
pub fn randperm<B: Backend, R: Rng + ?Sized>(
    n: usize,
    rng: &mut R,
    device: &B::Device,
) -> Tensor<B, 1, Int> {
    let mut indices: Vec<i64> = (0..n as i64).collect();
    indices.shuffle(rng);

    let shape = [indices.len()];
    Tensor::<B, 1, Int>::from_data(TensorData::new(indices, shape), device)
}

/// `n` indices drawn uniformly from `0..upper`, with replacement.
pub fn randint<B: Backend, R: Rng + ?Sized>(
    upper: usize,
    n: usize,
    rng: &mut R,
    device: &B::Device,
) -> Tensor<B, 1, Int> {
    let indices: Vec<i64> = (0..n).map(|_| rng.random_range(0..upper) as i64).collect();
    Tensor::<B, 1, Int>::from_data(TensorData::new(indices, [n]), device)
}

/// Sizes of `parts` near-equal chunks covering `total` items.
///
/// The first `total % parts` chunks carry one extra item.
pub fn split_sizes(total: usize, parts: usize) -> Vec<usize> {
    let base = total / parts;
    let extra = total % parts;
    (0..parts)
        .map(|i| if i < extra { base + 1 } else { base })
        .collect()
}

/// Splits an index tensor into consecutive chunks of the given sizes.
pub fn split_indices<B: Backend>(
    indices: Tensor<B, 1, Int>,
    sizes: &[usize],
) -> Vec<Tensor<B, 1, Int>> {
    let mut start = 0;
    sizes
        .iter()
        .map(|size| {
            let chunk = indices.clone().slice([start..start + size]);
            start += size;
            chunk
        })
        .collect()
}
