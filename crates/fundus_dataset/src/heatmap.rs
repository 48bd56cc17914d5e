//! Heatmap index loading and sparse-patch reconstruction.
//!
//! Indices live one per (stage, lesion category) at
//! `<heatmap_index_root>/<stage>/<category>/positive_heatmap.json`, keyed by
//! original filename. Each entry's pixel data is stored as per-box `.npy`
//! patches next to the index; reconstruction paints them back into a zero
//! canvas at original resolution.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma};
use ndarray::{s, Array2};
use ndarray_npy::ReadNpyExt;

use crate::types::{
    DatasetResult, FundusDatasetError, HeatmapEntry, LesionCategory, STAGE_COUNT,
};

/// Reads box patches for reconstruction. Swappable so tests can feed
/// synthetic patches without touching disk.
pub trait PatchSource {
    fn load_patch(&self, path: &Path) -> DatasetResult<Array2<f32>>;
}

/// Loads `.npy` patch files. Tries `f32` first and falls back to `f64`,
/// since exporters differ on the dtype they write.
#[derive(Debug, Default, Clone)]
pub struct NpyPatchSource;

impl PatchSource for NpyPatchSource {
    fn load_patch(&self, path: &Path) -> DatasetResult<Array2<f32>> {
        let file = File::open(path).map_err(|source| FundusDatasetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let reader = BufReader::new(file);
        match Array2::<f32>::read_npy(reader) {
            Ok(patch) => Ok(patch),
            Err(_) => {
                let file = File::open(path).map_err(|source| FundusDatasetError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                let wide = Array2::<f64>::read_npy(BufReader::new(file)).map_err(|source| {
                    FundusDatasetError::Npy {
                        path: path.to_path_buf(),
                        source,
                    }
                })?;
                Ok(wide.mapv(|v| v as f32))
            }
        }
    }
}

/// All twenty heatmap indices for one dataset root, loaded eagerly so every
/// lookup afterwards is in-memory.
pub struct HeatmapStore {
    /// `indices[stage][category.index()]`.
    indices: Vec<[HashMap<String, HeatmapEntry>; 4]>,
}

impl HeatmapStore {
    /// Loads every `positive_heatmap.json` under `index_root`. A missing
    /// index file is a hard error; the caller's directory layout is wrong.
    pub fn load(index_root: &Path) -> DatasetResult<Self> {
        let mut indices = Vec::with_capacity(STAGE_COUNT);
        for stage in 0..STAGE_COUNT {
            let mut per_stage: [HashMap<String, HeatmapEntry>; 4] = Default::default();
            for category in LesionCategory::ALL {
                let path = index_root
                    .join(stage.to_string())
                    .join(category.dir_name())
                    .join("positive_heatmap.json");
                per_stage[category.index()] = Self::load_index(&path)?;
            }
            indices.push(per_stage);
        }
        Ok(Self { indices })
    }

    fn load_index(path: &Path) -> DatasetResult<HashMap<String, HeatmapEntry>> {
        let file = File::open(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                FundusDatasetError::MissingIndex {
                    path: path.to_path_buf(),
                }
            } else {
                FundusDatasetError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|source| FundusDatasetError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Looks up the entry for an (already augmentation-stripped) filename.
    pub fn lookup(
        &self,
        stage: usize,
        category: LesionCategory,
        filename: &str,
    ) -> DatasetResult<&HeatmapEntry> {
        self.indices[stage][category.index()]
            .get(filename)
            .ok_or_else(|| FundusDatasetError::UnknownImage {
                category,
                stage,
                filename: filename.to_string(),
            })
    }
}

/// Paints an entry's box patches into a zero canvas at the original image's
/// resolution. Boxes are `(x, y, w, h)` with x along columns; coordinates are
/// truncated to pixel indices. Overlapping boxes resolve last-write-wins in
/// index order.
pub fn reconstruct(
    entry: &HeatmapEntry,
    filename: &str,
    patch_dir: &Path,
    patches: &dyn PatchSource,
) -> DatasetResult<Array2<f32>> {
    let [height, width] = entry.image_shape;
    let mut canvas = Array2::<f32>::zeros((height, width));
    for (i, bbox) in entry.boxes().iter().enumerate() {
        let [x, y, w, h] = *bbox;
        let c0 = x.trunc() as usize;
        let r0 = y.trunc() as usize;
        let c1 = (x + w).trunc() as usize;
        let r1 = (y + h).trunc() as usize;
        if r1 > height || c1 > width {
            return Err(FundusDatasetError::Validation {
                path: patch_dir.join(patch_file_name(filename, i)),
                msg: format!(
                    "bounding box rows {r0}..{r1} cols {c0}..{c1} exceeds image shape {height}x{width}"
                ),
            });
        }
        let path = patch_dir.join(patch_file_name(filename, i));
        let patch = patches.load_patch(&path)?;
        let expected = (r1 - r0, c1 - c0);
        if patch.dim() != expected {
            return Err(FundusDatasetError::PatchShapeMismatch {
                path,
                expected,
                actual: patch.dim(),
            });
        }
        canvas.slice_mut(s![r0..r1, c0..c1]).assign(&patch);
    }
    Ok(canvas)
}

/// Patch file naming: `<original filename>_<box index>.npy`. The image
/// extension stays in the name, that is how the exporter writes them.
pub fn patch_file_name(filename: &str, box_index: usize) -> String {
    format!("{filename}_{box_index}.npy")
}

/// Resizes a reconstructed map to `size`x`size` with bilinear filtering.
pub fn resize_to(map: &Array2<f32>, size: u32) -> Array2<f32> {
    let (height, width) = map.dim();
    let buffer: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_fn(width as u32, height as u32, |x, y| {
            Luma([map[(y as usize, x as usize)]])
        });
    let resized = imageops::resize(&buffer, size, size, FilterType::Triangle);
    Array2::from_shape_fn((size as usize, size as usize), |(r, c)| {
        resized.get_pixel(c as u32, r as u32).0[0]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    struct FakePatches {
        responses: HashMap<String, Array2<f32>>,
    }

    impl FakePatches {
        fn new(entries: Vec<(&str, Array2<f32>)>) -> Self {
            Self {
                responses: entries
                    .into_iter()
                    .map(|(name, patch)| (name.to_string(), patch))
                    .collect(),
            }
        }
    }

    impl PatchSource for FakePatches {
        fn load_patch(&self, path: &Path) -> DatasetResult<Array2<f32>> {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.responses
                .get(&name)
                .cloned()
                .ok_or_else(|| FundusDatasetError::Other(format!("no fake patch for {name}")))
        }
    }

    fn entry(shape: [usize; 2], boxes: Vec<[f64; 4]>) -> HeatmapEntry {
        HeatmapEntry {
            image_shape: shape,
            bboxes: Some(boxes),
        }
    }

    #[test]
    fn patch_names_keep_the_full_image_filename() {
        assert_eq!(patch_file_name("img_001.jpeg", 0), "img_001.jpeg_0.npy");
        assert_eq!(patch_file_name("img_001.jpeg", 3), "img_001.jpeg_3.npy");
    }

    #[test]
    fn reconstruction_paints_boxes_into_zero_canvas() {
        let entry = entry([4, 4], vec![[1.0, 2.0, 2.0, 2.0]]);
        let patches = FakePatches::new(vec![("img.jpeg_0.npy", array![[0.5, 0.6], [0.7, 0.8]])]);
        let canvas = reconstruct(&entry, "img.jpeg", Path::new("p"), &patches).unwrap();
        assert_eq!(canvas.dim(), (4, 4));
        // Box at x=1 (column), y=2 (row), 2x2.
        assert_eq!(canvas[(2, 1)], 0.5);
        assert_eq!(canvas[(2, 2)], 0.6);
        assert_eq!(canvas[(3, 1)], 0.7);
        assert_eq!(canvas[(3, 2)], 0.8);
        assert_eq!(canvas[(0, 0)], 0.0);
        assert_eq!(canvas[(1, 3)], 0.0);
    }

    #[test]
    fn fractional_box_coordinates_truncate() {
        let entry = entry([4, 4], vec![[0.9, 0.9, 2.2, 2.2]]);
        // trunc(0.9)=0, trunc(0.9+2.2)=3: a 3x3 region anchored at (0, 0).
        let patches = FakePatches::new(vec![(
            "img.jpeg_0.npy",
            Array2::from_elem((3, 3), 1.0_f32),
        )]);
        let canvas = reconstruct(&entry, "img.jpeg", Path::new("p"), &patches).unwrap();
        assert_eq!(canvas[(0, 0)], 1.0);
        assert_eq!(canvas[(2, 2)], 1.0);
        assert_eq!(canvas[(3, 3)], 0.0);
    }

    #[test]
    fn overlapping_boxes_resolve_last_write_wins() {
        let entry = entry(
            [3, 3],
            vec![[0.0, 0.0, 2.0, 2.0], [1.0, 1.0, 2.0, 2.0]],
        );
        let patches = FakePatches::new(vec![
            ("img.jpeg_0.npy", Array2::from_elem((2, 2), 0.3_f32)),
            ("img.jpeg_1.npy", Array2::from_elem((2, 2), 0.9_f32)),
        ]);
        let canvas = reconstruct(&entry, "img.jpeg", Path::new("p"), &patches).unwrap();
        // (1, 1) is covered by both boxes; the second one wins.
        assert_eq!(canvas[(1, 1)], 0.9);
        assert_eq!(canvas[(0, 0)], 0.3);
        assert_eq!(canvas[(2, 2)], 0.9);
    }

    #[test]
    fn no_boxes_means_zero_map() {
        let entry = HeatmapEntry {
            image_shape: [3, 5],
            bboxes: None,
        };
        let patches = FakePatches::new(vec![]);
        let canvas = reconstruct(&entry, "img.jpeg", Path::new("p"), &patches).unwrap();
        assert_eq!(canvas.dim(), (3, 5));
        assert!(canvas.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn out_of_bounds_box_is_rejected() {
        let entry = entry([4, 4], vec![[3.0, 3.0, 2.0, 2.0]]);
        let patches = FakePatches::new(vec![]);
        let err = reconstruct(&entry, "img.jpeg", Path::new("p"), &patches).unwrap_err();
        assert!(matches!(err, FundusDatasetError::Validation { .. }));
    }

    #[test]
    fn patch_shape_mismatch_is_rejected() {
        let entry = entry([4, 4], vec![[0.0, 0.0, 2.0, 2.0]]);
        let patches = FakePatches::new(vec![("img.jpeg_0.npy", Array2::from_elem((3, 3), 1.0_f32))]);
        let err = reconstruct(&entry, "img.jpeg", Path::new("p"), &patches).unwrap_err();
        assert!(matches!(
            err,
            FundusDatasetError::PatchShapeMismatch { expected: (2, 2), actual: (3, 3), .. }
        ));
    }

    #[test]
    fn resize_preserves_constant_maps() {
        let map = Array2::from_elem((8, 6), 0.25_f32);
        let resized = resize_to(&map, 4);
        assert_eq!(resized.dim(), (4, 4));
        for &v in resized.iter() {
            assert!((v - 0.25).abs() < 1e-6);
        }
    }

    #[test]
    fn resize_handles_flipped_views() {
        // invert_axis produces non-contiguous arrays; resize must read them
        // through logical indexing, not a raw slice.
        let mut map = array![[1.0_f32, 0.0], [0.0, 0.0]];
        crate::resolve::FlipOp::Columns.apply(&mut map);
        let resized = resize_to(&map, 2);
        assert!(resized[(0, 1)] > resized[(0, 0)]);
        assert!(resized[(0, 1)] > resized[(1, 1)]);
    }
}
