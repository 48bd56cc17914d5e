//! Directory-structured fundus dataset with optional heatmap fusion.
//!
//! Expects the usual class-per-subdirectory layout, e.g.
//! `data/train_aug/<stage>/<image>`, with the heatmap tree alongside at
//! `data/train_heatmap/<stage>/<category>/`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Once;

use image::imageops::FilterType;
use ndarray::Array2;

use crate::fusion::{fuse, FusionFlags, FusionPolicy};
use crate::heatmap::{reconstruct, resize_to, HeatmapStore, NpyPatchSource, PatchSource};
use crate::resolve::{resolve_flip, resolve_heatmap_root, resolve_stage};
use crate::types::{DatasetResult, FundusDatasetError, LesionCategory, SampleTensor};

const DEFAULT_EXTENSIONS: [&str; 9] = [
    ".jpg", ".jpeg", ".png", ".ppm", ".bmp", ".pgm", ".tif", ".tiff", ".webp",
];

static FIRST_SAMPLE_DEBUG: Once = Once::new();

pub type SampleTransform = Box<dyn Fn(SampleTensor) -> SampleTensor + Send + Sync>;
pub type LabelTransform = Box<dyn Fn(usize) -> usize + Send + Sync>;
pub type ImageLoader = Box<dyn Fn(&Path, u32) -> DatasetResult<SampleTensor> + Send + Sync>;

enum FileFilter {
    Extensions(Vec<String>),
    Predicate(Box<dyn Fn(&Path) -> bool + Send + Sync>),
}

impl FileFilter {
    fn accepts(&self, path: &Path) -> bool {
        match self {
            FileFilter::Extensions(exts) => {
                let lower = path.to_string_lossy().to_lowercase();
                exts.iter().any(|ext| lower.ends_with(ext))
            }
            FileFilter::Predicate(pred) => pred(path),
        }
    }

    fn describe(&self) -> String {
        match self {
            FileFilter::Extensions(exts) => exts.join(", "),
            FileFilter::Predicate(_) => "custom validator".to_string(),
        }
    }
}

/// Construction-time knobs for [`FundusFolder`].
pub struct FolderConfig {
    pub root: PathBuf,
    /// Accepted file extensions, lowercase with leading dot. `None` means the
    /// standard image set.
    pub extensions: Option<Vec<String>>,
    /// Side length samples and heatmaps are resized to.
    pub input_size: u32,
    pub fusion: FusionFlags,
    /// Collapse the five stages into referable / non-referable labels.
    pub referable_collapse: bool,
}

impl FolderConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extensions: None,
            input_size: 2000,
            fusion: FusionFlags::default(),
            referable_collapse: false,
        }
    }

    pub fn with_input_size(mut self, size: u32) -> Self {
        self.input_size = size;
        self
    }

    pub fn with_fusion(mut self, fusion: FusionFlags) -> Self {
        self.fusion = fusion;
        self
    }

    pub fn with_referable_collapse(mut self, collapse: bool) -> Self {
        self.referable_collapse = collapse;
        self
    }
}

/// One dataset item: the fused tensor, its class index, and the file it came
/// from.
#[derive(Debug, Clone)]
pub struct FundusSample {
    pub tensor: SampleTensor,
    pub label: usize,
    pub path: PathBuf,
}

/// Image-folder dataset over a class-per-subdirectory tree, optionally fusing
/// reconstructed lesion heatmaps into each sample.
pub struct FundusFolder {
    root: PathBuf,
    input_size: u32,
    classes: Vec<String>,
    samples: Vec<(PathBuf, usize)>,
    fusion: Option<FusionPolicy>,
    heatmaps: Option<HeatmapStore>,
    patch_source: Box<dyn PatchSource + Send + Sync>,
    image_loader: ImageLoader,
    sample_transform: Option<SampleTransform>,
    label_transform: Option<LabelTransform>,
}

impl std::fmt::Debug for FundusFolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FundusFolder")
            .field("root", &self.root)
            .field("input_size", &self.input_size)
            .field("classes", &self.classes)
            .field("samples", &self.samples.len())
            .field("fusion", &self.fusion)
            .finish_non_exhaustive()
    }
}

impl FundusFolder {
    pub fn new(config: FolderConfig) -> DatasetResult<Self> {
        let filter = match &config.extensions {
            Some(exts) => FileFilter::Extensions(exts.clone()),
            None => FileFilter::Extensions(
                DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            ),
        };
        Self::build(config, filter)
    }

    /// Like [`FundusFolder::new`], but a predicate decides file membership
    /// instead of an extension list. `config.extensions` must stay `None`.
    pub fn with_validator(
        config: FolderConfig,
        is_valid: impl Fn(&Path) -> bool + Send + Sync + 'static,
    ) -> DatasetResult<Self> {
        if config.extensions.is_some() {
            return Err(FundusDatasetError::Other(
                "pass either an extension list or a validator, not both".to_string(),
            ));
        }
        Self::build(config, FileFilter::Predicate(Box::new(is_valid)))
    }

    fn build(config: FolderConfig, filter: FileFilter) -> DatasetResult<Self> {
        let (classes, class_to_idx) =
            find_classes(&config.root, config.referable_collapse)?;
        let samples = make_dataset(&config.root, &class_to_idx, &filter)?;
        let fusion = config.fusion.resolve()?;
        let heatmaps = match fusion {
            Some(_) => Some(HeatmapStore::load(Path::new(&heatmap_index_root(
                &config.root,
            )))?),
            None => None,
        };
        Ok(Self {
            root: config.root,
            input_size: config.input_size,
            classes,
            samples,
            fusion,
            heatmaps,
            patch_source: Box::new(NpyPatchSource),
            image_loader: Box::new(default_image_loader),
            sample_transform: None,
            label_transform: None,
        })
    }

    pub fn with_sample_transform(mut self, transform: SampleTransform) -> Self {
        self.sample_transform = Some(transform);
        self
    }

    pub fn with_label_transform(mut self, transform: LabelTransform) -> Self {
        self.label_transform = Some(transform);
        self
    }

    pub fn with_image_loader(mut self, loader: ImageLoader) -> Self {
        self.image_loader = loader;
        self
    }

    pub fn with_patch_source(
        mut self,
        source: impl PatchSource + Send + Sync + 'static,
    ) -> Self {
        self.patch_source = Box::new(source);
        self
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn fusion_policy(&self) -> Option<FusionPolicy> {
        self.fusion
    }

    /// Channels per sample under the active fusion policy.
    pub fn output_channels(&self) -> usize {
        self.fusion.map_or(3, FusionPolicy::output_channels)
    }

    /// Loads, resizes, and (if configured) heatmap-fuses sample `index`.
    pub fn get(&self, index: usize) -> DatasetResult<FundusSample> {
        let (path, raw_label) = &self.samples[index];
        let mut tensor = (self.image_loader)(path, self.input_size)?;
        if let Some(transform) = &self.sample_transform {
            tensor = transform(tensor);
        }
        if let Some(policy) = self.fusion {
            let maps = self.reconstruct_maps(path)?;
            tensor = fuse(policy, &tensor, &maps)?;
        }
        let mut label = *raw_label;
        if let Some(transform) = &self.label_transform {
            label = transform(label);
        }
        FIRST_SAMPLE_DEBUG.call_once(|| {
            eprintln!(
                "fundus_dataset: first sample {} -> {}x{}x{} label {}",
                path.display(),
                tensor.channels,
                tensor.height,
                tensor.width,
                label
            );
        });
        Ok(FundusSample {
            tensor,
            label,
            path: path.clone(),
        })
    }

    fn reconstruct_maps(&self, path: &Path) -> DatasetResult<[Array2<f32>; 4]> {
        let store = self.heatmaps.as_ref().ok_or_else(|| {
            FundusDatasetError::Other("fusion requested without a heatmap store".to_string())
        })?;
        let path_str = path.to_string_lossy();
        let dir = path
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        let sample_root = resolve_heatmap_root(&dir)?;
        let stage = resolve_stage(&path_str);
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let (stripped, flip) = resolve_flip(&filename);

        let mut maps: Vec<Array2<f32>> = Vec::with_capacity(4);
        for category in LesionCategory::ALL {
            let entry = store.lookup(stage, category, &stripped)?;
            let patch_dir = Path::new(&sample_root)
                .join(category.dir_name())
                .join("positive_heatmap_v2");
            let full = reconstruct(entry, &stripped, &patch_dir, self.patch_source.as_ref())?;
            let mut map = resize_to(&full, self.input_size);
            flip.apply(&mut map);
            maps.push(map);
        }
        // Four categories were just pushed.
        maps.try_into().map_err(|_| {
            FundusDatasetError::Other("lesion category count changed".to_string())
        })
    }
}

/// Maps a dataset root onto the heatmap tree next to it:
/// `data/train_aug` and `data/train` both index `data/train_heatmap`.
pub fn heatmap_index_root(root: &Path) -> String {
    let base = root.to_string_lossy().replace("_aug", "");
    format!("{base}_heatmap")
}

/// Class directories under `root`, sorted, plus the directory-to-label map.
/// With `referable_collapse`, stages 0-1 label 0 and stages 2-4 label 1 and
/// the class list shrinks to `["0", "1"]`.
pub fn find_classes(
    root: &Path,
    referable_collapse: bool,
) -> DatasetResult<(Vec<String>, HashMap<String, usize>)> {
    let mut dirs: Vec<String> = std::fs::read_dir(root)
        .map_err(|source| FundusDatasetError::Io {
            path: root.to_path_buf(),
            source,
        })?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    dirs.sort();

    if referable_collapse {
        let collapse: HashMap<String, usize> = [
            ("0", 0), ("1", 0), ("2", 1), ("3", 1), ("4", 1),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        let class_to_idx = dirs
            .iter()
            .filter_map(|d| collapse.get(d).map(|&v| (d.clone(), v)))
            .collect();
        return Ok((vec!["0".to_string(), "1".to_string()], class_to_idx));
    }

    let class_to_idx = dirs
        .iter()
        .enumerate()
        .map(|(i, d)| (d.clone(), i))
        .collect();
    Ok((dirs, class_to_idx))
}

/// Walks each class directory recursively (sorted, depth-first) and collects
/// accepted files with their labels.
fn make_dataset(
    root: &Path,
    class_to_idx: &HashMap<String, usize>,
    filter: &FileFilter,
) -> DatasetResult<Vec<(PathBuf, usize)>> {
    let mut classes: Vec<&String> = class_to_idx.keys().collect();
    classes.sort();
    let mut samples = Vec::new();
    for class in classes {
        let label = class_to_idx[class];
        let dir = root.join(class);
        if !dir.is_dir() {
            continue;
        }
        collect_files(&dir, label, filter, &mut samples)?;
    }
    if samples.is_empty() {
        return Err(FundusDatasetError::EmptyDataset {
            root: root.to_path_buf(),
            accepted: filter.describe(),
        });
    }
    Ok(samples)
}

fn collect_files(
    dir: &Path,
    label: usize,
    filter: &FileFilter,
    out: &mut Vec<(PathBuf, usize)>,
) -> DatasetResult<()> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|source| FundusDatasetError::Io {
            path: dir.to_path_buf(),
            source,
        })?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect();
    entries.sort();
    for entry in entries {
        if entry.is_dir() {
            collect_files(&entry, label, filter, out)?;
        } else if filter.accepts(&entry) {
            out.push((entry, label));
        }
    }
    Ok(())
}

/// Default loader: decode, resize to `size` square with bilinear filtering,
/// and lay out as CHW floats in [0, 1].
fn default_image_loader(path: &Path, size: u32) -> DatasetResult<SampleTensor> {
    let img = image::open(path).map_err(|source| FundusDatasetError::Image {
        path: path.to_path_buf(),
        source,
    })?;
    let rgb = image::imageops::resize(&img.to_rgb8(), size, size, FilterType::Triangle);
    let (width, height) = (rgb.width() as usize, rgb.height() as usize);
    let plane = width * height;
    let mut data = vec![0.0_f32; 3 * plane];
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let offset = y as usize * width + x as usize;
        for c in 0..3 {
            data[c * plane + offset] = pixel.0[c] as f32 / 255.0;
        }
    }
    Ok(SampleTensor {
        data,
        channels: 3,
        height,
        width,
    })
}
