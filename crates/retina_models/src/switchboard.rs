//! Architecture selection from run-configuration flags.

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::inception_v3::{
    HeadKind, InceptionOutputs, InceptionV3, InceptionV3Config, StemKind,
};
use crate::inception_v4::{InceptionV4, InceptionV4Config};
use crate::ModelConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Architecture {
    #[default]
    InceptionV3,
    InceptionV4,
}

/// One resolved model choice: backbone, stem, head, and classifier width.
/// `build` validates the choice against the data pipeline's channel count
/// before constructing anything.
#[derive(Debug, Clone)]
pub struct ModelSelection {
    pub architecture: Architecture,
    pub stem: StemKind,
    pub head: HeadKind,
    pub aux_logits: bool,
    pub num_classes: usize,
}

impl ModelSelection {
    pub fn new(architecture: Architecture, num_classes: usize) -> Self {
        Self {
            architecture,
            stem: StemKind::Default,
            head: HeadKind::Pool,
            aux_logits: true,
            num_classes,
        }
    }

    pub fn with_stem(mut self, stem: StemKind) -> Self {
        self.stem = stem;
        self
    }

    pub fn with_head(mut self, head: HeadKind) -> Self {
        self.head = head;
        self
    }

    pub fn with_aux_logits(mut self, aux_logits: bool) -> Self {
        self.aux_logits = aux_logits;
        self
    }

    /// Builds the selected model, checking `source_channels` (what the data
    /// pipeline emits) against the stem. Stem and head variants exist for the
    /// v3 backbone only.
    pub fn build<B: Backend>(
        &self,
        source_channels: usize,
        device: &B::Device,
    ) -> Result<RetinaModel<B>, ModelConfigError> {
        match self.architecture {
            Architecture::InceptionV3 => {
                let cfg = InceptionV3Config::new(self.num_classes)
                    .with_stem(self.stem)
                    .with_head(self.head)
                    .with_aux_logits(self.aux_logits);
                cfg.check_source_channels(source_channels)?;
                Ok(RetinaModel::V3(InceptionV3::new(&cfg, device)))
            }
            Architecture::InceptionV4 => {
                if self.stem != StemKind::Default || self.head != HeadKind::Pool {
                    return Err(ModelConfigError::V4Customization);
                }
                if source_channels != 3 {
                    return Err(ModelConfigError::ChannelMismatch {
                        expected: 3,
                        declared: source_channels,
                    });
                }
                let cfg = InceptionV4Config::new(self.num_classes)
                    .with_aux_logits(self.aux_logits);
                Ok(RetinaModel::V4(InceptionV4::new(&cfg, device)))
            }
        }
    }
}

/// Either backbone behind one forward interface.
pub enum RetinaModel<B: Backend> {
    V3(InceptionV3<B>),
    V4(InceptionV4<B>),
}

impl<B: Backend> RetinaModel<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        match self {
            RetinaModel::V3(model) => model.forward(input),
            RetinaModel::V4(model) => model.forward(input),
        }
    }

    pub fn forward_training(&self, input: Tensor<B, 4>) -> InceptionOutputs<B> {
        match self {
            RetinaModel::V3(model) => model.forward_training(input),
            RetinaModel::V4(model) => model.forward_training(input),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn v4_rejects_custom_stems_and_heads() {
        let device = Default::default();
        let selection = ModelSelection::new(Architecture::InceptionV4, 2)
            .with_stem(StemKind::Heatmap);
        assert_eq!(
            selection.build::<B>(7, &device).err(),
            Some(ModelConfigError::V4Customization)
        );
        let selection =
            ModelSelection::new(Architecture::InceptionV4, 2).with_head(HeadKind::DeepV1);
        assert_eq!(
            selection.build::<B>(3, &device).err(),
            Some(ModelConfigError::V4Customization)
        );
    }

    #[test]
    fn channel_counts_are_checked_at_build() {
        let device = Default::default();
        let selection = ModelSelection::new(Architecture::InceptionV3, 2)
            .with_stem(StemKind::HeatmapV2);
        assert_eq!(
            selection.build::<B>(7, &device).err(),
            Some(ModelConfigError::ChannelMismatch {
                expected: 15,
                declared: 7
            })
        );
    }
}
