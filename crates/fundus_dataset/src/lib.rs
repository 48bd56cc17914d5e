//! Fundus image dataset with precomputed lesion-heatmap fusion.
//!
//! A directory-structured image dataset (one subdirectory per disease stage)
//! whose samples can be enriched with spatial heatmaps for four lesion
//! categories. Heatmaps are stored sparsely as JSON bounding-box indices plus
//! `.npy` pixel patches, reconstructed and fused into the sample's channel
//! stack at load time.

pub mod folder;
pub mod fusion;
pub mod heatmap;
pub mod resolve;
pub mod types;

#[cfg(feature = "burn-runtime")]
pub mod batch;

pub use folder::{FolderConfig, FundusFolder, FundusSample};
pub use fusion::{FusionFlags, FusionPolicy};
pub use heatmap::{HeatmapStore, NpyPatchSource, PatchSource};
pub use resolve::FlipOp;
pub use types::{DatasetResult, FundusDatasetError, HeatmapEntry, LesionCategory, SampleTensor};
