//! Inception-style classifiers for fundus imagery.
//!
//! Two backbones (Inception v3 and v4) plus the stem and head variants used
//! with heatmap-fused inputs: widened first convolutions for high-resolution
//! images, multi-channel stems for heatmap stacks, and deepened
//! convolutional heads.

pub mod conv;
pub mod inception_v3;
pub mod inception_v4;
pub mod switchboard;

use thiserror::Error;

pub use conv::{ConvBlock, ConvBlockConfig};
pub use inception_v3::{
    HeadKind, InceptionOutputs, InceptionV3, InceptionV3Config, StemFlags, StemKind,
};
pub use inception_v4::{InceptionV4, InceptionV4Config};
pub use switchboard::{Architecture, ModelSelection, RetinaModel};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelConfigError {
    #[error("stem expects {expected} input channels but the data pipeline produces {declared}")]
    ChannelMismatch { expected: usize, declared: usize },
    #[error("inception v4 supports only the default stem and pooled head")]
    V4Customization,
}
