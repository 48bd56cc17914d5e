//! Forward-pass shape checks on the ndarray backend.

use burn::tensor::Tensor;
use burn_ndarray::NdArray;

use fundus_dataset::FusionPolicy;
use retina_models::{
    Architecture, HeadKind, InceptionV3, InceptionV3Config, InceptionV4, InceptionV4Config,
    ModelSelection, StemKind,
};

type B = NdArray<f32>;

#[test]
fn v3_training_forward_emits_both_logit_pairs() {
    let device = Default::default();
    let model = InceptionV3::<B>::new(&InceptionV3Config::new(2), &device);
    let out = model.forward_training(Tensor::zeros([1, 3, 299, 299], &device));
    assert_eq!(out.logits.dims(), [1, 2]);
    let aux = out.aux_logits.expect("aux classifier configured");
    assert_eq!(aux.dims(), [1, 2]);
}

#[test]
fn v3_inference_forward_skips_aux() {
    let device = Default::default();
    let model = InceptionV3::<B>::new(&InceptionV3Config::new(2), &device);
    let out = model.forward_training(Tensor::zeros([1, 3, 299, 299], &device));
    assert!(out.aux_logits.is_some());
    let logits = model.forward(Tensor::zeros([1, 3, 299, 299], &device));
    assert_eq!(logits.dims(), [1, 2]);
}

#[test]
fn heatmap_stem_consumes_seven_channels() {
    let device = Default::default();
    let model = InceptionV3::<B>::new(
        &InceptionV3Config::new(2)
            .with_stem(StemKind::Heatmap)
            .with_aux_logits(false),
        &device,
    );
    let logits = model.forward(Tensor::zeros([1, 7, 75, 75], &device));
    assert_eq!(logits.dims(), [1, 2]);
}

#[test]
fn heatmap_v2_stem_with_deep_head() {
    let device = Default::default();
    let model = InceptionV3::<B>::new(
        &InceptionV3Config::new(2)
            .with_stem(StemKind::HeatmapV2)
            .with_head(HeadKind::DeepV2)
            .with_aux_logits(false),
        &device,
    );
    let logits = model.forward(Tensor::zeros([1, 15, 75, 75], &device));
    assert_eq!(logits.dims(), [1, 2]);
}

#[test]
fn wide_stem_strides_down_large_inputs() {
    let device = Default::default();
    let model = InceptionV3::<B>::new(
        &InceptionV3Config::new(2)
            .with_stem(StemKind::Wide)
            .with_aux_logits(false),
        &device,
    );
    let logits = model.forward(Tensor::zeros([1, 3, 185, 185], &device));
    assert_eq!(logits.dims(), [1, 2]);
}

#[test]
fn v4_training_forward_emits_both_logit_pairs() {
    let device = Default::default();
    let model = InceptionV4::<B>::new(&InceptionV4Config::new(2), &device);
    let out = model.forward_training(Tensor::zeros([1, 3, 299, 299], &device));
    assert_eq!(out.logits.dims(), [1, 2]);
    let aux = out.aux_logits.expect("aux classifier configured");
    assert_eq!(aux.dims(), [1, 2]);
}

#[test]
fn v4_feeds_the_stem_unrescaled_input() {
    // All v4 convolutions are bias-free and batch norm starts at identity
    // running stats, so a zero input stays zero up to the classifier and the
    // logits equal the final linear bias at any resolution. A rescale of the
    // input ahead of the stem (zero becomes -1) would make the logits
    // resolution-dependent through padding and pooling.
    let device = Default::default();
    let model = InceptionV4::<B>::new(&InceptionV4Config::new(2).with_aux_logits(false), &device);
    let small = model
        .forward(Tensor::zeros([1, 3, 75, 75], &device))
        .to_data()
        .to_vec::<f32>()
        .unwrap();
    let large = model
        .forward(Tensor::zeros([1, 3, 107, 107], &device))
        .to_data()
        .to_vec::<f32>()
        .unwrap();
    assert_eq!(small.len(), 2);
    for (a, b) in small.iter().zip(&large) {
        assert!((a - b).abs() < 1e-6, "logits diverge: {a} vs {b}");
    }
}

#[test]
fn switchboard_builds_matched_pipeline_and_model() {
    let device = Default::default();
    // Concat fusion emits 7 channels, which only the heatmap stem accepts.
    let channels = FusionPolicy::Concat.output_channels();
    let model = ModelSelection::new(Architecture::InceptionV3, 2)
        .with_stem(StemKind::Heatmap)
        .with_aux_logits(false)
        .build::<B>(channels, &device)
        .expect("channels line up");
    let logits = model.forward(Tensor::zeros([1, channels, 75, 75], &device));
    assert_eq!(logits.dims(), [1, 2]);
}

#[test]
fn product_fusion_pairs_with_heatmap_v2_stem() {
    let channels = FusionPolicy::ConcatProducts.output_channels();
    assert_eq!(channels, StemKind::HeatmapV2.in_channels());
    let channels = FusionPolicy::ConcatProducts4.output_channels();
    assert_eq!(channels, StemKind::HeatmapV2.in_channels());
    assert_eq!(
        FusionPolicy::WeightedAverage.output_channels(),
        StemKind::Default.in_channels()
    );
}
