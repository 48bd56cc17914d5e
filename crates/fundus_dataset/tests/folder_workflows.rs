//! End-to-end dataset workflows over synthetic on-disk trees.

use std::fs;
use std::path::Path;

use anyhow::Result;
use image::{Rgb, RgbImage};
use ndarray::Array2;
use ndarray_npy::WriteNpyExt;

use fundus_dataset::{
    FolderConfig, FundusDatasetError, FundusFolder, FusionFlags, LesionCategory,
};

const CATEGORIES: [&str; 4] = [
    "Hemorrhages",
    "Microaneurysms",
    "Hard_Exudate",
    "Cotton_Wool_Spot",
];

fn write_image(path: &Path, rgb: [u8; 3]) -> Result<()> {
    fs::create_dir_all(path.parent().unwrap())?;
    let img = RgbImage::from_pixel(8, 8, Rgb(rgb));
    img.save(path)?;
    Ok(())
}

/// Creates all twenty index files, empty except where `entries` provides a
/// JSON body for a (stage, category) pair.
fn write_heatmap_tree(root: &Path, entries: &[(usize, &str, &str)]) -> Result<()> {
    for stage in 0..5 {
        for category in CATEGORIES {
            let dir = root.join(stage.to_string()).join(category);
            fs::create_dir_all(dir.join("positive_heatmap_v2"))?;
            let body = entries
                .iter()
                .find(|(s, c, _)| *s == stage && *c == category)
                .map(|(_, _, body)| *body)
                .unwrap_or("{}");
            fs::write(dir.join("positive_heatmap.json"), body)?;
        }
    }
    Ok(())
}

fn write_patch(path: &Path, shape: (usize, usize), value: f32) -> Result<()> {
    let patch = Array2::<f32>::from_elem(shape, value);
    let file = fs::File::create(path)?;
    patch.write_npy(file)?;
    Ok(())
}

#[test]
fn plain_folder_enumerates_sorted_classes() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path().join("data/train");
    write_image(&root.join("0/a.png"), [10, 20, 30])?;
    write_image(&root.join("0/b.png"), [10, 20, 30])?;
    write_image(&root.join("2/c.png"), [10, 20, 30])?;

    let dataset = FundusFolder::new(FolderConfig::new(&root).with_input_size(8))?;
    assert_eq!(dataset.len(), 3);
    assert_eq!(dataset.classes(), ["0", "2"]);
    assert_eq!(dataset.output_channels(), 3);

    let first = dataset.get(0)?;
    assert_eq!(first.tensor.channels, 3);
    assert_eq!(first.tensor.height, 8);
    assert_eq!(first.tensor.width, 8);
    assert_eq!(first.label, 0);
    // "2" is the second sorted class directory.
    assert_eq!(dataset.get(2)?.label, 1);
    Ok(())
}

#[test]
fn empty_tree_is_rejected() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path().join("data/train");
    fs::create_dir_all(root.join("0"))?;
    fs::write(root.join("0/notes.txt"), "not an image")?;

    let err = FundusFolder::new(FolderConfig::new(&root)).unwrap_err();
    assert!(matches!(err, FundusDatasetError::EmptyDataset { .. }));
    Ok(())
}

#[test]
fn validator_replaces_extension_filter() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path().join("data/train");
    write_image(&root.join("0/keep.png"), [1, 2, 3])?;
    write_image(&root.join("0/skip.png"), [1, 2, 3])?;

    let dataset = FundusFolder::with_validator(
        FolderConfig::new(&root).with_input_size(8),
        |path| path.to_string_lossy().contains("keep"),
    )?;
    assert_eq!(dataset.len(), 1);
    Ok(())
}

#[test]
fn referable_collapse_merges_stage_labels() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path().join("data/val");
    for stage in 0..5 {
        write_image(&root.join(format!("{stage}/img.png")), [50, 50, 50])?;
    }

    let dataset = FundusFolder::new(
        FolderConfig::new(&root)
            .with_input_size(8)
            .with_referable_collapse(true),
    )?;
    assert_eq!(dataset.classes(), ["0", "1"]);
    let labels: Vec<usize> = (0..dataset.len())
        .map(|i| dataset.get(i).map(|s| s.label))
        .collect::<Result<_, _>>()?;
    assert_eq!(labels, [0, 0, 1, 1, 1]);
    Ok(())
}

#[test]
fn concat_fusion_appends_reconstructed_maps() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path().join("data/train_aug");
    write_image(&root.join("3/img.png"), [255, 0, 0])?;

    let heatmap_root = tmp.path().join("data/train_heatmap");
    write_heatmap_tree(
        &heatmap_root,
        &[
            (
                3,
                "Hemorrhages",
                r#"{"img.png": {"image_shape": [8, 8], "bboxes": [[2.0, 2.0, 4.0, 4.0]]}}"#,
            ),
            (3, "Microaneurysms", r#"{"img.png": {"image_shape": [8, 8]}}"#),
            (3, "Hard_Exudate", r#"{"img.png": {"image_shape": [8, 8]}}"#),
            (3, "Cotton_Wool_Spot", r#"{"img.png": {"image_shape": [8, 8]}}"#),
        ],
    )?;
    write_patch(
        &heatmap_root.join("3/Hemorrhages/positive_heatmap_v2/img.png_0.npy"),
        (4, 4),
        1.0,
    )?;

    let dataset = FundusFolder::new(
        FolderConfig::new(&root)
            .with_input_size(8)
            .with_fusion(FusionFlags {
                concat: true,
                ..Default::default()
            }),
    )?;
    assert_eq!(dataset.output_channels(), 7);

    let sample = dataset.get(0)?;
    assert_eq!(sample.tensor.channels, 7);
    // Hemorrhages map carries the painted box; the other three stay zero.
    let hemorrhages = sample.tensor.channel(3 + LesionCategory::Hemorrhages.index());
    assert!(hemorrhages.iter().any(|&v| v > 0.5));
    for category in [
        LesionCategory::Microaneurysms,
        LesionCategory::HardExudate,
        LesionCategory::CottonWoolSpot,
    ] {
        let map = sample.tensor.channel(3 + category.index());
        assert!(map.iter().all(|&v| v == 0.0));
    }
    // Center of the painted box survives resize.
    let center = hemorrhages[4 * 8 + 4];
    assert!(center > 0.9, "center value {center}");
    Ok(())
}

#[test]
fn augmented_filenames_look_up_original_and_flip() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path().join("data/train_aug");
    write_image(&root.join("0/img_vflip.png"), [0, 255, 0])?;

    let heatmap_root = tmp.path().join("data/train_heatmap");
    // Box hugging the left edge: columns 0..4.
    write_heatmap_tree(
        &heatmap_root,
        &[
            (
                0,
                "Hemorrhages",
                r#"{"img.png": {"image_shape": [8, 8], "bboxes": [[0.0, 0.0, 4.0, 8.0]]}}"#,
            ),
            (0, "Microaneurysms", r#"{"img.png": {"image_shape": [8, 8]}}"#),
            (0, "Hard_Exudate", r#"{"img.png": {"image_shape": [8, 8]}}"#),
            (0, "Cotton_Wool_Spot", r#"{"img.png": {"image_shape": [8, 8]}}"#),
        ],
    )?;
    write_patch(
        &heatmap_root.join("0/Hemorrhages/positive_heatmap_v2/img.png_0.npy"),
        (8, 4),
        1.0,
    )?;

    let dataset = FundusFolder::new(
        FolderConfig::new(&root)
            .with_input_size(8)
            .with_fusion(FusionFlags {
                concat: true,
                ..Default::default()
            }),
    )?;
    let sample = dataset.get(0)?;
    let map = sample.tensor.channel(3);
    // The column flip mirrors the left-edge box to the right edge.
    assert!(map[7] > 0.9);
    assert!(map[0] < 0.1);
    Ok(())
}

#[test]
fn missing_index_fails_construction() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path().join("data/train_aug");
    write_image(&root.join("0/img.png"), [1, 1, 1])?;

    let err = FundusFolder::new(FolderConfig::new(&root).with_fusion(FusionFlags {
        concat: true,
        ..Default::default()
    }))
    .unwrap_err();
    assert!(matches!(err, FundusDatasetError::MissingIndex { .. }));
    Ok(())
}

#[test]
fn unknown_image_fails_lookup() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path().join("data/train_aug");
    write_image(&root.join("0/unlisted.png"), [1, 1, 1])?;

    let heatmap_root = tmp.path().join("data/train_heatmap");
    write_heatmap_tree(&heatmap_root, &[])?;

    let dataset = FundusFolder::new(
        FolderConfig::new(&root)
            .with_input_size(8)
            .with_fusion(FusionFlags {
                weighted_average: true,
                ..Default::default()
            }),
    )?;
    let err = dataset.get(0).unwrap_err();
    assert!(matches!(err, FundusDatasetError::UnknownImage { .. }));
    Ok(())
}

#[test]
fn conflicting_fusion_flags_fail_construction() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = tmp.path().join("data/train");
    write_image(&root.join("0/img.png"), [1, 1, 1])?;

    let err = FundusFolder::new(FolderConfig::new(&root).with_fusion(FusionFlags {
        concat: true,
        weighted_average: true,
        ..Default::default()
    }))
    .unwrap_err();
    assert!(matches!(err, FundusDatasetError::ConflictingFusionPolicy));
    Ok(())
}
