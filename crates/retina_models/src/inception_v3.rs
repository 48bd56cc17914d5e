//! Inception v3 with swappable stems and heads.
//!
//! The first convolution is the variation point: widened large-kernel stems
//! trade stride for receptive field on high-resolution fundus images, and the
//! heatmap stems accept 7- or 15-channel fused inputs. The classifier head
//! can likewise be deepened with a stack of stride-2 convolutions.

use burn::module::Module;
use burn::nn::conv::Conv2d;
use burn::nn::pool::{
    AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, AvgPool2d, AvgPool2dConfig, MaxPool2d,
    MaxPool2dConfig,
};
use burn::nn::{BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig};
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::conv::{ConvBlock, ConvBlockConfig};
use crate::ModelConfigError;

/// Which first-convolution variant the network starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StemKind {
    /// 3x3 stride-2, the stock Inception v3 opening.
    #[default]
    Default,
    /// Single 15x15 stride-5 convolution.
    Wide,
    /// Three summed branches: 15x15, 31x31, 61x61, all stride 5.
    Wider,
    /// The `Wider` branches sharing one batch norm after the sum.
    Wider2,
    /// Three summed branches: 21x21, 41x41, 81x81, all stride 10.
    BiggerWider,
    /// 3x3 stride-2 over a 7-channel heatmap-concat input.
    Heatmap,
    /// 3x3 stride-2 over a 15-channel heatmap-product input.
    HeatmapV2,
}

/// Flag-style stem selection, mirroring training-config toggles. When several
/// flags are set the widest stem wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct StemFlags {
    pub wide: bool,
    pub wider: bool,
    pub wider2: bool,
    pub bigger_wider: bool,
    pub with_heatmap: bool,
    pub with_heatmap_v2: bool,
}

impl StemKind {
    pub fn from_flags(flags: StemFlags) -> Self {
        if flags.bigger_wider {
            StemKind::BiggerWider
        } else if flags.wider2 {
            StemKind::Wider2
        } else if flags.wider {
            StemKind::Wider
        } else if flags.wide {
            StemKind::Wide
        } else if flags.with_heatmap {
            StemKind::Heatmap
        } else if flags.with_heatmap_v2 {
            StemKind::HeatmapV2
        } else {
            StemKind::Default
        }
    }

    /// Channels the stem consumes; fixed by the fusion policy feeding it.
    pub fn in_channels(self) -> usize {
        match self {
            StemKind::Heatmap => 7,
            StemKind::HeatmapV2 => 15,
            _ => 3,
        }
    }
}

/// Classifier head variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeadKind {
    /// Global average pool, dropout, linear.
    #[default]
    Pool,
    /// Five stride-2 3x3 conv blocks before the pooled classifier.
    DeepV1,
    /// Six stride-2 3x3 conv blocks before the pooled classifier.
    DeepV2,
}

impl HeadKind {
    pub fn from_flags(deephead: bool, deephead_v2: bool) -> Self {
        if deephead_v2 {
            HeadKind::DeepV2
        } else if deephead {
            HeadKind::DeepV1
        } else {
            HeadKind::Pool
        }
    }

    fn conv_count(self) -> usize {
        match self {
            HeadKind::Pool => 0,
            HeadKind::DeepV1 => 5,
            HeadKind::DeepV2 => 6,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InceptionV3Config {
    pub num_classes: usize,
    pub stem: StemKind,
    pub head: HeadKind,
    pub aux_logits: bool,
    pub dropout: f64,
}

impl InceptionV3Config {
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            stem: StemKind::Default,
            head: HeadKind::Pool,
            aux_logits: true,
            dropout: 0.5,
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

    pub fn with_dropout(mut self, dropout: f64) -> Self {
        self.dropout = dropout;
        self
    }

    /// Fails when the data pipeline's channel count does not match what the
    /// configured stem consumes.
    pub fn check_source_channels(&self, declared: usize) -> Result<(), ModelConfigError> {
        let expected = self.stem.in_channels();
        if declared != expected {
            return Err(ModelConfigError::ChannelMismatch { expected, declared });
        }
        Ok(())
    }
}

/// Training-mode output pair. `aux_logits` is present only when the model was
/// built with an auxiliary classifier.
#[derive(Debug, Clone)]
pub struct InceptionOutputs<B: Backend> {
    pub logits: Tensor<B, 2>,
    pub aux_logits: Option<Tensor<B, 2>>,
}

/// Parallel convolutions sharing one batch norm after the sum.
#[derive(Module, Debug)]
struct SharedNormStem<B: Backend> {
    convs: Vec<Conv2d<B>>,
    norm: BatchNorm<B, 2>,
}

impl<B: Backend> SharedNormStem<B> {
    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut acc: Option<Tensor<B, 4>> = None;
        for conv in &self.convs {
            let y = conv.forward(x.clone());
            acc = Some(match acc {
                Some(a) => a + y,
                None => y,
            });
        }
        // convs is never empty.
        relu(self.norm.forward(acc.unwrap_or(x)))
    }
}

/// The opening convolution stage, producing 32 channels.
#[derive(Module, Debug)]
pub struct Stem<B: Backend> {
    branches: Vec<ConvBlock<B>>,
    shared: Option<SharedNormStem<B>>,
}

impl<B: Backend> Stem<B> {
    pub fn new(kind: StemKind, device: &B::Device) -> Self {
        let branch_cfgs: Vec<ConvBlockConfig> = match kind {
            StemKind::Default => vec![ConvBlockConfig::new(3, 32, [3, 3]).with_stride([2, 2])],
            StemKind::Wide => vec![ConvBlockConfig::new(3, 32, [15, 15])
                .with_stride([5, 5])
                .with_padding([7, 7])],
            StemKind::Wider | StemKind::Wider2 => vec![
                ConvBlockConfig::new(3, 32, [15, 15])
                    .with_stride([5, 5])
                    .with_padding([7, 7]),
                ConvBlockConfig::new(3, 32, [31, 31])
                    .with_stride([5, 5])
                    .with_padding([15, 15]),
                ConvBlockConfig::new(3, 32, [61, 61])
                    .with_stride([5, 5])
                    .with_padding([30, 30]),
            ],
            StemKind::BiggerWider => vec![
                ConvBlockConfig::new(3, 32, [21, 21])
                    .with_stride([10, 10])
                    .with_padding([10, 10]),
                ConvBlockConfig::new(3, 32, [41, 41])
                    .with_stride([10, 10])
                    .with_padding([20, 20]),
                ConvBlockConfig::new(3, 32, [81, 81])
                    .with_stride([10, 10])
                    .with_padding([40, 40]),
            ],
            StemKind::Heatmap => vec![ConvBlockConfig::new(7, 32, [3, 3]).with_stride([2, 2])],
            StemKind::HeatmapV2 => vec![ConvBlockConfig::new(15, 32, [3, 3]).with_stride([2, 2])],
        };
        if kind == StemKind::Wider2 {
            Self {
                branches: Vec::new(),
                shared: Some(SharedNormStem {
                    convs: branch_cfgs.iter().map(|c| c.init_conv(device)).collect(),
                    norm: BatchNormConfig::new(32).with_epsilon(1e-3).init(device),
                }),
            }
        } else {
            Self {
                branches: branch_cfgs
                    .iter()
                    .map(|c| ConvBlock::new(c, device))
                    .collect(),
                shared: None,
            }
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        if let Some(shared) = &self.shared {
            return shared.forward(x);
        }
        let mut acc: Option<Tensor<B, 4>> = None;
        for branch in &self.branches {
            let y = branch.forward(x.clone());
            acc = Some(match acc {
                Some(a) => a + y,
                None => y,
            });
        }
        // branches is never empty when shared is None.
        acc.unwrap_or(x)
    }
}

#[derive(Module, Debug)]
struct InceptionA<B: Backend> {
    branch1x1: ConvBlock<B>,
    branch5x5_1: ConvBlock<B>,
    branch5x5_2: ConvBlock<B>,
    branch3x3dbl_1: ConvBlock<B>,
    branch3x3dbl_2: ConvBlock<B>,
    branch3x3dbl_3: ConvBlock<B>,
    pool: AvgPool2d,
    branch_pool: ConvBlock<B>,
}

impl<B: Backend> InceptionA<B> {
    fn new(in_channels: usize, pool_features: usize, device: &B::Device) -> Self {
        Self {
            branch1x1: ConvBlock::new(&ConvBlockConfig::new(in_channels, 64, [1, 1]), device),
            branch5x5_1: ConvBlock::new(&ConvBlockConfig::new(in_channels, 48, [1, 1]), device),
            branch5x5_2: ConvBlock::new(
                &ConvBlockConfig::new(48, 64, [5, 5]).with_padding([2, 2]),
                device,
            ),
            branch3x3dbl_1: ConvBlock::new(&ConvBlockConfig::new(in_channels, 64, [1, 1]), device),
            branch3x3dbl_2: ConvBlock::new(
                &ConvBlockConfig::new(64, 96, [3, 3]).with_padding([1, 1]),
                device,
            ),
            branch3x3dbl_3: ConvBlock::new(
                &ConvBlockConfig::new(96, 96, [3, 3]).with_padding([1, 1]),
                device,
            ),
            pool: avg_pool_3x3_same(),
            branch_pool: ConvBlock::new(
                &ConvBlockConfig::new(in_channels, pool_features, [1, 1]),
                device,
            ),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let b1 = self.branch1x1.forward(x.clone());
        let b5 = self.branch5x5_2.forward(self.branch5x5_1.forward(x.clone()));
        let b3 = self.branch3x3dbl_3.forward(
            self.branch3x3dbl_2
                .forward(self.branch3x3dbl_1.forward(x.clone())),
        );
        let bp = self.branch_pool.forward(self.pool.forward(x));
        Tensor::cat(vec![b1, b5, b3, bp], 1)
    }
}

#[derive(Module, Debug)]
struct InceptionB<B: Backend> {
    branch3x3: ConvBlock<B>,
    branch3x3dbl_1: ConvBlock<B>,
    branch3x3dbl_2: ConvBlock<B>,
    branch3x3dbl_3: ConvBlock<B>,
    pool: MaxPool2d,
}

impl<B: Backend> InceptionB<B> {
    fn new(in_channels: usize, device: &B::Device) -> Self {
        Self {
            branch3x3: ConvBlock::new(
                &ConvBlockConfig::new(in_channels, 384, [3, 3]).with_stride([2, 2]),
                device,
            ),
            branch3x3dbl_1: ConvBlock::new(&ConvBlockConfig::new(in_channels, 64, [1, 1]), device),
            branch3x3dbl_2: ConvBlock::new(
                &ConvBlockConfig::new(64, 96, [3, 3]).with_padding([1, 1]),
                device,
            ),
            branch3x3dbl_3: ConvBlock::new(
                &ConvBlockConfig::new(96, 96, [3, 3]).with_stride([2, 2]),
                device,
            ),
            pool: max_pool_3x3_s2(),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let b3 = self.branch3x3.forward(x.clone());
        let bd = self.branch3x3dbl_3.forward(
            self.branch3x3dbl_2
                .forward(self.branch3x3dbl_1.forward(x.clone())),
        );
        let bp = self.pool.forward(x);
        Tensor::cat(vec![b3, bd, bp], 1)
    }
}

#[derive(Module, Debug)]
struct InceptionC<B: Backend> {
    branch1x1: ConvBlock<B>,
    branch7x7_1: ConvBlock<B>,
    branch7x7_2: ConvBlock<B>,
    branch7x7_3: ConvBlock<B>,
    branch7x7dbl_1: ConvBlock<B>,
    branch7x7dbl_2: ConvBlock<B>,
    branch7x7dbl_3: ConvBlock<B>,
    branch7x7dbl_4: ConvBlock<B>,
    branch7x7dbl_5: ConvBlock<B>,
    pool: AvgPool2d,
    branch_pool: ConvBlock<B>,
}

impl<B: Backend> InceptionC<B> {
    fn new(in_channels: usize, channels_7x7: usize, device: &B::Device) -> Self {
        let c7 = channels_7x7;
        Self {
            branch1x1: ConvBlock::new(&ConvBlockConfig::new(in_channels, 192, [1, 1]), device),
            branch7x7_1: ConvBlock::new(&ConvBlockConfig::new(in_channels, c7, [1, 1]), device),
            branch7x7_2: ConvBlock::new(
                &ConvBlockConfig::new(c7, c7, [1, 7]).with_padding([0, 3]),
                device,
            ),
            branch7x7_3: ConvBlock::new(
                &ConvBlockConfig::new(c7, 192, [7, 1]).with_padding([3, 0]),
                device,
            ),
            branch7x7dbl_1: ConvBlock::new(&ConvBlockConfig::new(in_channels, c7, [1, 1]), device),
            branch7x7dbl_2: ConvBlock::new(
                &ConvBlockConfig::new(c7, c7, [7, 1]).with_padding([3, 0]),
                device,
            ),
            branch7x7dbl_3: ConvBlock::new(
                &ConvBlockConfig::new(c7, c7, [1, 7]).with_padding([0, 3]),
                device,
            ),
            branch7x7dbl_4: ConvBlock::new(
                &ConvBlockConfig::new(c7, c7, [7, 1]).with_padding([3, 0]),
                device,
            ),
            branch7x7dbl_5: ConvBlock::new(
                &ConvBlockConfig::new(c7, 192, [1, 7]).with_padding([0, 3]),
                device,
            ),
            pool: avg_pool_3x3_same(),
            branch_pool: ConvBlock::new(&ConvBlockConfig::new(in_channels, 192, [1, 1]), device),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let b1 = self.branch1x1.forward(x.clone());
        let b7 = self
            .branch7x7_3
            .forward(self.branch7x7_2.forward(self.branch7x7_1.forward(x.clone())));
        let bd = self.branch7x7dbl_5.forward(
            self.branch7x7dbl_4.forward(
                self.branch7x7dbl_3
                    .forward(self.branch7x7dbl_2.forward(self.branch7x7dbl_1.forward(x.clone()))),
            ),
        );
        let bp = self.branch_pool.forward(self.pool.forward(x));
        Tensor::cat(vec![b1, b7, bd, bp], 1)
    }
}

#[derive(Module, Debug)]
struct InceptionD<B: Backend> {
    branch3x3_1: ConvBlock<B>,
    branch3x3_2: ConvBlock<B>,
    branch7x7x3_1: ConvBlock<B>,
    branch7x7x3_2: ConvBlock<B>,
    branch7x7x3_3: ConvBlock<B>,
    branch7x7x3_4: ConvBlock<B>,
    pool: MaxPool2d,
}

impl<B: Backend> InceptionD<B> {
    fn new(in_channels: usize, device: &B::Device) -> Self {
        Self {
            branch3x3_1: ConvBlock::new(&ConvBlockConfig::new(in_channels, 192, [1, 1]), device),
            branch3x3_2: ConvBlock::new(
                &ConvBlockConfig::new(192, 320, [3, 3]).with_stride([2, 2]),
                device,
            ),
            branch7x7x3_1: ConvBlock::new(&ConvBlockConfig::new(in_channels, 192, [1, 1]), device),
            branch7x7x3_2: ConvBlock::new(
                &ConvBlockConfig::new(192, 192, [1, 7]).with_padding([0, 3]),
                device,
            ),
            branch7x7x3_3: ConvBlock::new(
                &ConvBlockConfig::new(192, 192, [7, 1]).with_padding([3, 0]),
                device,
            ),
            branch7x7x3_4: ConvBlock::new(
                &ConvBlockConfig::new(192, 192, [3, 3]).with_stride([2, 2]),
                device,
            ),
            pool: max_pool_3x3_s2(),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let b3 = self.branch3x3_2.forward(self.branch3x3_1.forward(x.clone()));
        let b7 = self.branch7x7x3_4.forward(
            self.branch7x7x3_3
                .forward(self.branch7x7x3_2.forward(self.branch7x7x3_1.forward(x.clone()))),
        );
        let bp = self.pool.forward(x);
        Tensor::cat(vec![b3, b7, bp], 1)
    }
}

#[derive(Module, Debug)]
struct InceptionE<B: Backend> {
    branch1x1: ConvBlock<B>,
    branch3x3_1: ConvBlock<B>,
    branch3x3_2a: ConvBlock<B>,
    branch3x3_2b: ConvBlock<B>,
    branch3x3dbl_1: ConvBlock<B>,
    branch3x3dbl_2: ConvBlock<B>,
    branch3x3dbl_3a: ConvBlock<B>,
    branch3x3dbl_3b: ConvBlock<B>,
    pool: AvgPool2d,
    branch_pool: ConvBlock<B>,
}

impl<B: Backend> InceptionE<B> {
    fn new(in_channels: usize, device: &B::Device) -> Self {
        Self {
            branch1x1: ConvBlock::new(&ConvBlockConfig::new(in_channels, 320, [1, 1]), device),
            branch3x3_1: ConvBlock::new(&ConvBlockConfig::new(in_channels, 384, [1, 1]), device),
            branch3x3_2a: ConvBlock::new(
                &ConvBlockConfig::new(384, 384, [1, 3]).with_padding([0, 1]),
                device,
            ),
            branch3x3_2b: ConvBlock::new(
                &ConvBlockConfig::new(384, 384, [3, 1]).with_padding([1, 0]),
                device,
            ),
            branch3x3dbl_1: ConvBlock::new(&ConvBlockConfig::new(in_channels, 448, [1, 1]), device),
            branch3x3dbl_2: ConvBlock::new(
                &ConvBlockConfig::new(448, 384, [3, 3]).with_padding([1, 1]),
                device,
            ),
            branch3x3dbl_3a: ConvBlock::new(
                &ConvBlockConfig::new(384, 384, [1, 3]).with_padding([0, 1]),
                device,
            ),
            branch3x3dbl_3b: ConvBlock::new(
                &ConvBlockConfig::new(384, 384, [3, 1]).with_padding([1, 0]),
                device,
            ),
            pool: avg_pool_3x3_same(),
            branch_pool: ConvBlock::new(&ConvBlockConfig::new(in_channels, 192, [1, 1]), device),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let b1 = self.branch1x1.forward(x.clone());
        let b3 = self.branch3x3_1.forward(x.clone());
        let b3 = Tensor::cat(
            vec![
                self.branch3x3_2a.forward(b3.clone()),
                self.branch3x3_2b.forward(b3),
            ],
            1,
        );
        let bd = self
            .branch3x3dbl_2
            .forward(self.branch3x3dbl_1.forward(x.clone()));
        let bd = Tensor::cat(
            vec![
                self.branch3x3dbl_3a.forward(bd.clone()),
                self.branch3x3dbl_3b.forward(bd),
            ],
            1,
        );
        let bp = self.branch_pool.forward(self.pool.forward(x));
        Tensor::cat(vec![b1, b3, bd, bp], 1)
    }
}

/// Auxiliary classifier tapped from the 17x17 feature map during training.
/// Shared between both backbones, which tap it at different widths.
#[derive(Module, Debug)]
pub(crate) struct InceptionAux<B: Backend> {
    pool: AvgPool2d,
    conv0: ConvBlock<B>,
    conv1: ConvBlock<B>,
    final_pool: AdaptiveAvgPool2d,
    fc: Linear<B>,
}

impl<B: Backend> InceptionAux<B> {
    pub(crate) fn new(in_channels: usize, num_classes: usize, device: &B::Device) -> Self {
        Self {
            pool: AvgPool2dConfig::new([5, 5]).with_strides([3, 3]).init(),
            conv0: ConvBlock::new(&ConvBlockConfig::new(in_channels, 128, [1, 1]), device),
            conv1: ConvBlock::new(&ConvBlockConfig::new(128, 768, [5, 5]), device),
            final_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc: LinearConfig::new(768, num_classes).init(device),
        }
    }

    pub(crate) fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.pool.forward(x);
        let x = self.conv0.forward(x);
        let x = self.conv1.forward(x);
        let x = self.final_pool.forward(x);
        self.fc.forward(x.flatten(1, 3))
    }
}

#[derive(Module, Debug)]
struct Head<B: Backend> {
    deep: Vec<ConvBlock<B>>,
    pool: AdaptiveAvgPool2d,
    dropout: Dropout,
    fc: Linear<B>,
}

impl<B: Backend> Head<B> {
    fn new(kind: HeadKind, features: usize, num_classes: usize, dropout: f64, device: &B::Device) -> Self {
        let deep = (0..kind.conv_count())
            .map(|_| {
                ConvBlock::new(
                    &ConvBlockConfig::new(features, features, [3, 3])
                        .with_stride([2, 2])
                        .with_padding([1, 1]),
                    device,
                )
            })
            .collect();
        Self {
            deep,
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            dropout: DropoutConfig::new(dropout).init(),
            fc: LinearConfig::new(features, num_classes).init(device),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = x;
        for block in &self.deep {
            x = block.forward(x);
        }
        let x = self.pool.forward(x);
        let x = self.dropout.forward(x.flatten(1, 3));
        self.fc.forward(x)
    }
}

#[derive(Module, Debug)]
pub struct InceptionV3<B: Backend> {
    stem: Stem<B>,
    conv2a: ConvBlock<B>,
    conv2b: ConvBlock<B>,
    pool1: MaxPool2d,
    conv3b: ConvBlock<B>,
    conv4a: ConvBlock<B>,
    pool2: MaxPool2d,
    mixed_5b: InceptionA<B>,
    mixed_5c: InceptionA<B>,
    mixed_5d: InceptionA<B>,
    mixed_6a: InceptionB<B>,
    mixed_6b: InceptionC<B>,
    mixed_6c: InceptionC<B>,
    mixed_6d: InceptionC<B>,
    mixed_6e: InceptionC<B>,
    aux: Option<InceptionAux<B>>,
    mixed_7a: InceptionD<B>,
    mixed_7b: InceptionE<B>,
    mixed_7c: InceptionE<B>,
    head: Head<B>,
}

impl<B: Backend> InceptionV3<B> {
    pub fn new(cfg: &InceptionV3Config, device: &B::Device) -> Self {
        Self {
            stem: Stem::new(cfg.stem, device),
            conv2a: ConvBlock::new(&ConvBlockConfig::new(32, 32, [3, 3]), device),
            conv2b: ConvBlock::new(
                &ConvBlockConfig::new(32, 64, [3, 3]).with_padding([1, 1]),
                device,
            ),
            pool1: max_pool_3x3_s2(),
            conv3b: ConvBlock::new(&ConvBlockConfig::new(64, 80, [1, 1]), device),
            conv4a: ConvBlock::new(&ConvBlockConfig::new(80, 192, [3, 3]), device),
            pool2: max_pool_3x3_s2(),
            mixed_5b: InceptionA::new(192, 32, device),
            mixed_5c: InceptionA::new(256, 64, device),
            mixed_5d: InceptionA::new(288, 64, device),
            mixed_6a: InceptionB::new(288, device),
            mixed_6b: InceptionC::new(768, 128, device),
            mixed_6c: InceptionC::new(768, 160, device),
            mixed_6d: InceptionC::new(768, 160, device),
            mixed_6e: InceptionC::new(768, 192, device),
            aux: cfg
                .aux_logits
                .then(|| InceptionAux::new(768, cfg.num_classes, device)),
            mixed_7a: InceptionD::new(768, device),
            mixed_7b: InceptionE::new(1280, device),
            mixed_7c: InceptionE::new(2048, device),
            head: Head::new(cfg.head, 2048, cfg.num_classes, cfg.dropout, device),
        }
    }

    fn run(&self, input: Tensor<B, 4>, with_aux: bool) -> (Tensor<B, 4>, Option<Tensor<B, 2>>) {
        // Inputs arrive in [0, 1]; the network expects [-1, 1].
        let x = input.mul_scalar(2.0).sub_scalar(1.0);
        let x = self.stem.forward(x);
        let x = self.conv2a.forward(x);
        let x = self.conv2b.forward(x);
        let x = self.pool1.forward(x);
        let x = self.conv3b.forward(x);
        let x = self.conv4a.forward(x);
        let x = self.pool2.forward(x);
        let x = self.mixed_5b.forward(x);
        let x = self.mixed_5c.forward(x);
        let x = self.mixed_5d.forward(x);
        let x = self.mixed_6a.forward(x);
        let x = self.mixed_6b.forward(x);
        let x = self.mixed_6c.forward(x);
        let x = self.mixed_6d.forward(x);
        let x = self.mixed_6e.forward(x);
        let aux = if with_aux {
            self.aux.as_ref().map(|a| a.forward(x.clone()))
        } else {
            None
        };
        let x = self.mixed_7a.forward(x);
        let x = self.mixed_7b.forward(x);
        let x = self.mixed_7c.forward(x);
        (x, aux)
    }

    /// Inference forward: no auxiliary output.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let (features, _) = self.run(input, false);
        self.head.forward(features)
    }

    /// Training forward, with the auxiliary classifier when configured.
    pub fn forward_training(&self, input: Tensor<B, 4>) -> InceptionOutputs<B> {
        let (features, aux_logits) = self.run(input, true);
        InceptionOutputs {
            logits: self.head.forward(features),
            aux_logits,
        }
    }
}

fn avg_pool_3x3_same() -> AvgPool2d {
    AvgPool2dConfig::new([3, 3])
        .with_strides([1, 1])
        .with_padding(burn::nn::PaddingConfig2d::Explicit(1, 1))
        .init()
}

fn max_pool_3x3_s2() -> MaxPool2d {
    MaxPool2dConfig::new([3, 3]).with_strides([2, 2]).init()
}
