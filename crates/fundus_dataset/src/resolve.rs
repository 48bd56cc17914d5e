//! Path-derived metadata: disease stage, augmentation flips, and the
//! heatmap-root rewrite that maps an image tree onto its heatmap tree.

use ndarray::{Array2, Axis};

use crate::types::{DatasetResult, FundusDatasetError, STAGE_COUNT};

/// Axis flip(s) to undo an augmentation suffix.
///
/// Naming follows the augmented-filename convention: `_vflip` files are
/// restored by reversing columns and `_hflip` files by reversing rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipOp {
    None,
    Columns,
    Rows,
    Both,
}

impl FlipOp {
    pub fn apply(self, map: &mut Array2<f32>) {
        match self {
            FlipOp::None => {}
            FlipOp::Columns => map.invert_axis(Axis(1)),
            FlipOp::Rows => map.invert_axis(Axis(0)),
            FlipOp::Both => {
                map.invert_axis(Axis(0));
                map.invert_axis(Axis(1));
            }
        }
    }
}

/// Strips a recognized augmentation marker from `filename` and reports the
/// flip that realigns a stored heatmap with the augmented image.
///
/// Matching is by substring, first hit wins: `_vflip`, then `_hflip`, then
/// `_vhflip`. Unrecognized names pass through untouched with `FlipOp::None`.
pub fn resolve_flip(filename: &str) -> (String, FlipOp) {
    if filename.contains("_vflip") {
        (filename.replace("_vflip", ""), FlipOp::Columns)
    } else if filename.contains("_hflip") {
        (filename.replace("_hflip", ""), FlipOp::Rows)
    } else if filename.contains("_vhflip") {
        (filename.replace("_vhflip", ""), FlipOp::Both)
    } else {
        (filename.to_string(), FlipOp::None)
    }
}

/// Reads the disease stage out of a sample path by scanning for a `/N/`
/// segment, N in 0..5. Paths with no stage segment fall back to stage 0.
pub fn resolve_stage(path: &str) -> usize {
    for stage in 0..STAGE_COUNT {
        if path.contains(&format!("/{stage}/")) {
            return stage;
        }
    }
    0
}

/// Ordered split markers and the heatmap directory each one rewrites to.
/// Augmented markers come first so `/train_aug/` is not shadowed by `/train/`.
const ROOT_MARKERS: [(&str, &str); 4] = [
    ("/train_aug/", "/train_heatmap/"),
    ("/train/", "/train_heatmap/"),
    ("/val_aug/", "/val_heatmap/"),
    ("/val/", "/val_heatmap/"),
];

/// Rewrites a sample's directory onto its heatmap tree, e.g.
/// `data/train_aug/3` becomes `data/train_heatmap/3`.
pub fn resolve_heatmap_root(dir: &str) -> DatasetResult<String> {
    for (marker, replacement) in ROOT_MARKERS {
        if dir.contains(marker) {
            return Ok(dir.replace(marker, replacement));
        }
    }
    Err(FundusDatasetError::UnresolvedRoot {
        path: dir.to_string(),
    })
}
