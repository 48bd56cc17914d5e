//! Bridging loaded samples into burn tensors.

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor, TensorData};

use crate::folder::FundusSample;
use crate::types::SampleTensor;

/// One CHW sample as a rank-3 tensor.
pub fn sample_to_tensor<B: Backend>(sample: &SampleTensor, device: &B::Device) -> Tensor<B, 3> {
    let data = TensorData::new(
        sample.data.clone(),
        [sample.channels, sample.height, sample.width],
    );
    Tensor::from_data(data, device)
}

/// A training batch: stacked NCHW images and their integer labels.
#[derive(Debug, Clone)]
pub struct FundusBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub labels: Tensor<B, 1, Int>,
}

/// Stacks loaded samples into a batch. All samples in one dataset share a
/// channel count and resolution, so stacking along a new leading axis is
/// always well-formed.
pub fn collate<B: Backend>(samples: &[FundusSample], device: &B::Device) -> FundusBatch<B> {
    let images = samples
        .iter()
        .map(|s| sample_to_tensor::<B>(&s.tensor, device).unsqueeze_dim(0))
        .collect::<Vec<_>>();
    let labels = samples.iter().map(|s| s.label as i64).collect::<Vec<_>>();
    let count = labels.len();
    FundusBatch {
        images: Tensor::cat(images, 0),
        labels: Tensor::from_data(TensorData::new(labels, [count]), device),
    }
}
