//! Core types and error definitions for fundus_dataset.

use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

pub type DatasetResult<T> = Result<T, FundusDatasetError>;

#[derive(Debug, Error)]
pub enum FundusDatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json parse error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("image decode error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("npy read error at {path}: {source}")]
    Npy {
        path: PathBuf,
        #[source]
        source: ndarray_npy::ReadNpyError,
    },
    #[error("found 0 files in subfolders of {root} (accepted: {accepted})")]
    EmptyDataset { root: PathBuf, accepted: String },
    #[error("heatmap index missing: {path}")]
    MissingIndex { path: PathBuf },
    #[error("no heatmap entry for {filename} ({category:?}, stage {stage})")]
    UnknownImage {
        category: LesionCategory,
        stage: usize,
        filename: String,
    },
    #[error("patch {path} has shape {actual:?} but its bounding box implies {expected:?}")]
    PatchShapeMismatch {
        path: PathBuf,
        expected: (usize, usize),
        actual: (usize, usize),
    },
    #[error("heatmap shape {actual:?} does not match the image shape {expected:?}")]
    HeatmapShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },
    #[error("path {path} matches no known dataset directory layout")]
    UnresolvedRoot { path: String },
    #[error("more than one heatmap fusion flag is set")]
    ConflictingFusionPolicy,
    #[error("validation failed at {path}: {msg}")]
    Validation { path: PathBuf, msg: String },
    #[error("{0}")]
    Other(String),
}

/// Number of disease-severity stages; each stage owns one heatmap index per
/// lesion category.
pub const STAGE_COUNT: usize = 5;

/// The four lesion categories heatmaps are tracked for, in storage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LesionCategory {
    Hemorrhages,
    Microaneurysms,
    HardExudate,
    CottonWoolSpot,
}

impl LesionCategory {
    pub const ALL: [LesionCategory; 4] = [
        LesionCategory::Hemorrhages,
        LesionCategory::Microaneurysms,
        LesionCategory::HardExudate,
        LesionCategory::CottonWoolSpot,
    ];

    /// Directory name used in the on-disk heatmap layout.
    pub fn dir_name(self) -> &'static str {
        match self {
            LesionCategory::Hemorrhages => "Hemorrhages",
            LesionCategory::Microaneurysms => "Microaneurysms",
            LesionCategory::HardExudate => "Hard_Exudate",
            LesionCategory::CottonWoolSpot => "Cotton_Wool_Spot",
        }
    }

    pub fn index(self) -> usize {
        match self {
            LesionCategory::Hemorrhages => 0,
            LesionCategory::Microaneurysms => 1,
            LesionCategory::HardExudate => 2,
            LesionCategory::CottonWoolSpot => 3,
        }
    }
}

/// One `positive_heatmap.json` record: the original image's shape and the
/// sparse bounding boxes whose pixel data lives in `.npy` side files.
///
/// `bboxes` may be absent entirely, which means "no lesion" and yields an
/// all-zero reconstruction. Box tuples are `(x, y, w, h)`, column-first.
#[derive(Debug, Clone, Deserialize)]
pub struct HeatmapEntry {
    /// `[height, width]` of the original image.
    pub image_shape: [usize; 2],
    #[serde(default)]
    pub bboxes: Option<Vec<[f64; 4]>>,
}

impl HeatmapEntry {
    pub fn boxes(&self) -> &[[f64; 4]] {
        self.bboxes.as_deref().unwrap_or(&[])
    }
}

/// A loaded sample in CHW layout, normalized to [0, 1] before fusion.
///
/// The channel count is fixed by the dataset's fusion policy and never varies
/// sample-to-sample within one configuration.
#[derive(Debug, Clone)]
pub struct SampleTensor {
    /// CHW data, row-major within each channel.
    pub data: Vec<f32>,
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl SampleTensor {
    /// Pixels per channel.
    pub fn plane(&self) -> usize {
        self.height * self.width
    }

    pub fn channel(&self, c: usize) -> &[f32] {
        let plane = self.plane();
        &self.data[c * plane..(c + 1) * plane]
    }
}
