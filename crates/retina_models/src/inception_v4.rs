//! Inception v4, 3-channel inputs only.

use burn::module::Module;
use burn::nn::pool::{
    AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, AvgPool2d, AvgPool2dConfig, MaxPool2d,
    MaxPool2dConfig,
};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::conv::{ConvBlock, ConvBlockConfig};
use crate::inception_v3::{InceptionAux, InceptionOutputs};

#[derive(Debug, Clone)]
pub struct InceptionV4Config {
    pub num_classes: usize,
    pub aux_logits: bool,
    pub dropout: f64,
}

impl InceptionV4Config {
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            aux_logits: true,
            dropout: 0.5,
        }
    }

    pub fn with_aux_logits(mut self, aux_logits: bool) -> Self {
        self.aux_logits = aux_logits;
        self
    }

    pub fn with_dropout(mut self, dropout: f64) -> Self {
        self.dropout = dropout;
        self
    }
}

/// Stem stage: three plain convs, then the 3a/4a/5a mixed reductions,
/// 3 channels in and 384 out.
#[derive(Module, Debug)]
struct StemV4<B: Backend> {
    conv1: ConvBlock<B>,
    conv2: ConvBlock<B>,
    conv3: ConvBlock<B>,
    mixed_3a_pool: MaxPool2d,
    mixed_3a_conv: ConvBlock<B>,
    mixed_4a_b0_1: ConvBlock<B>,
    mixed_4a_b0_2: ConvBlock<B>,
    mixed_4a_b1_1: ConvBlock<B>,
    mixed_4a_b1_2: ConvBlock<B>,
    mixed_4a_b1_3: ConvBlock<B>,
    mixed_4a_b1_4: ConvBlock<B>,
    mixed_5a_conv: ConvBlock<B>,
    mixed_5a_pool: MaxPool2d,
}

impl<B: Backend> StemV4<B> {
    fn new(device: &B::Device) -> Self {
        Self {
            conv1: ConvBlock::new(
                &ConvBlockConfig::new(3, 32, [3, 3]).with_stride([2, 2]),
                device,
            ),
            conv2: ConvBlock::new(&ConvBlockConfig::new(32, 32, [3, 3]), device),
            conv3: ConvBlock::new(
                &ConvBlockConfig::new(32, 64, [3, 3]).with_padding([1, 1]),
                device,
            ),
            mixed_3a_pool: max_pool_3x3_s2(),
            mixed_3a_conv: ConvBlock::new(
                &ConvBlockConfig::new(64, 96, [3, 3]).with_stride([2, 2]),
                device,
            ),
            mixed_4a_b0_1: ConvBlock::new(&ConvBlockConfig::new(160, 64, [1, 1]), device),
            mixed_4a_b0_2: ConvBlock::new(&ConvBlockConfig::new(64, 96, [3, 3]), device),
            mixed_4a_b1_1: ConvBlock::new(&ConvBlockConfig::new(160, 64, [1, 1]), device),
            mixed_4a_b1_2: ConvBlock::new(
                &ConvBlockConfig::new(64, 64, [1, 7]).with_padding([0, 3]),
                device,
            ),
            mixed_4a_b1_3: ConvBlock::new(
                &ConvBlockConfig::new(64, 64, [7, 1]).with_padding([3, 0]),
                device,
            ),
            mixed_4a_b1_4: ConvBlock::new(&ConvBlockConfig::new(64, 96, [3, 3]), device),
            mixed_5a_conv: ConvBlock::new(
                &ConvBlockConfig::new(192, 192, [3, 3]).with_stride([2, 2]),
                device,
            ),
            mixed_5a_pool: max_pool_3x3_s2(),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv3.forward(self.conv2.forward(self.conv1.forward(x)));
        let x = Tensor::cat(
            vec![self.mixed_3a_pool.forward(x.clone()), self.mixed_3a_conv.forward(x)],
            1,
        );
        let b0 = self.mixed_4a_b0_2.forward(self.mixed_4a_b0_1.forward(x.clone()));
        let b1 = self.mixed_4a_b1_4.forward(
            self.mixed_4a_b1_3
                .forward(self.mixed_4a_b1_2.forward(self.mixed_4a_b1_1.forward(x))),
        );
        let x = Tensor::cat(vec![b0, b1], 1);
        Tensor::cat(
            vec![self.mixed_5a_conv.forward(x.clone()), self.mixed_5a_pool.forward(x)],
            1,
        )
    }
}

/// 384-in, 384-out mixed block at 35x35 scale.
#[derive(Module, Debug)]
struct BlockA<B: Backend> {
    b0: ConvBlock<B>,
    b1_1: ConvBlock<B>,
    b1_2: ConvBlock<B>,
    b2_1: ConvBlock<B>,
    b2_2: ConvBlock<B>,
    b2_3: ConvBlock<B>,
    pool: AvgPool2d,
    b3: ConvBlock<B>,
}

impl<B: Backend> BlockA<B> {
    fn new(device: &B::Device) -> Self {
        Self {
            b0: ConvBlock::new(&ConvBlockConfig::new(384, 96, [1, 1]), device),
            b1_1: ConvBlock::new(&ConvBlockConfig::new(384, 64, [1, 1]), device),
            b1_2: ConvBlock::new(
                &ConvBlockConfig::new(64, 96, [3, 3]).with_padding([1, 1]),
                device,
            ),
            b2_1: ConvBlock::new(&ConvBlockConfig::new(384, 64, [1, 1]), device),
            b2_2: ConvBlock::new(
                &ConvBlockConfig::new(64, 96, [3, 3]).with_padding([1, 1]),
                device,
            ),
            b2_3: ConvBlock::new(
                &ConvBlockConfig::new(96, 96, [3, 3]).with_padding([1, 1]),
                device,
            ),
            pool: avg_pool_3x3_same(),
            b3: ConvBlock::new(&ConvBlockConfig::new(384, 96, [1, 1]), device),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let b0 = self.b0.forward(x.clone());
        let b1 = self.b1_2.forward(self.b1_1.forward(x.clone()));
        let b2 = self.b2_3.forward(self.b2_2.forward(self.b2_1.forward(x.clone())));
        let b3 = self.b3.forward(self.pool.forward(x));
        Tensor::cat(vec![b0, b1, b2, b3], 1)
    }
}

/// 384 -> 1024 spatial reduction.
#[derive(Module, Debug)]
struct ReductionA<B: Backend> {
    b0: ConvBlock<B>,
    b1_1: ConvBlock<B>,
    b1_2: ConvBlock<B>,
    b1_3: ConvBlock<B>,
    pool: MaxPool2d,
}

impl<B: Backend> ReductionA<B> {
    fn new(device: &B::Device) -> Self {
        Self {
            b0: ConvBlock::new(
                &ConvBlockConfig::new(384, 384, [3, 3]).with_stride([2, 2]),
                device,
            ),
            b1_1: ConvBlock::new(&ConvBlockConfig::new(384, 192, [1, 1]), device),
            b1_2: ConvBlock::new(
                &ConvBlockConfig::new(192, 224, [3, 3]).with_padding([1, 1]),
                device,
            ),
            b1_3: ConvBlock::new(
                &ConvBlockConfig::new(224, 256, [3, 3]).with_stride([2, 2]),
                device,
            ),
            pool: max_pool_3x3_s2(),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let b0 = self.b0.forward(x.clone());
        let b1 = self.b1_3.forward(self.b1_2.forward(self.b1_1.forward(x.clone())));
        let b2 = self.pool.forward(x);
        Tensor::cat(vec![b0, b1, b2], 1)
    }
}

/// 1024-in, 1024-out mixed block at 17x17 scale.
#[derive(Module, Debug)]
struct BlockB<B: Backend> {
    b0: ConvBlock<B>,
    b1_1: ConvBlock<B>,
    b1_2: ConvBlock<B>,
    b1_3: ConvBlock<B>,
    b2_1: ConvBlock<B>,
    b2_2: ConvBlock<B>,
    b2_3: ConvBlock<B>,
    b2_4: ConvBlock<B>,
    b2_5: ConvBlock<B>,
    pool: AvgPool2d,
    b3: ConvBlock<B>,
}

impl<B: Backend> BlockB<B> {
    fn new(device: &B::Device) -> Self {
        Self {
            b0: ConvBlock::new(&ConvBlockConfig::new(1024, 384, [1, 1]), device),
            b1_1: ConvBlock::new(&ConvBlockConfig::new(1024, 192, [1, 1]), device),
            b1_2: ConvBlock::new(
                &ConvBlockConfig::new(192, 224, [1, 7]).with_padding([0, 3]),
                device,
            ),
            b1_3: ConvBlock::new(
                &ConvBlockConfig::new(224, 256, [7, 1]).with_padding([3, 0]),
                device,
            ),
            b2_1: ConvBlock::new(&ConvBlockConfig::new(1024, 192, [1, 1]), device),
            b2_2: ConvBlock::new(
                &ConvBlockConfig::new(192, 192, [7, 1]).with_padding([3, 0]),
                device,
            ),
            b2_3: ConvBlock::new(
                &ConvBlockConfig::new(192, 224, [1, 7]).with_padding([0, 3]),
                device,
            ),
            b2_4: ConvBlock::new(
                &ConvBlockConfig::new(224, 224, [7, 1]).with_padding([3, 0]),
                device,
            ),
            b2_5: ConvBlock::new(
                &ConvBlockConfig::new(224, 256, [1, 7]).with_padding([0, 3]),
                device,
            ),
            pool: avg_pool_3x3_same(),
            b3: ConvBlock::new(&ConvBlockConfig::new(1024, 128, [1, 1]), device),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let b0 = self.b0.forward(x.clone());
        let b1 = self.b1_3.forward(self.b1_2.forward(self.b1_1.forward(x.clone())));
        let b2 = self.b2_5.forward(
            self.b2_4
                .forward(self.b2_3.forward(self.b2_2.forward(self.b2_1.forward(x.clone())))),
        );
        let b3 = self.b3.forward(self.pool.forward(x));
        Tensor::cat(vec![b0, b1, b2, b3], 1)
    }
}

/// 1024 -> 1536 spatial reduction.
#[derive(Module, Debug)]
struct ReductionB<B: Backend> {
    b0_1: ConvBlock<B>,
    b0_2: ConvBlock<B>,
    b1_1: ConvBlock<B>,
    b1_2: ConvBlock<B>,
    b1_3: ConvBlock<B>,
    b1_4: ConvBlock<B>,
    pool: MaxPool2d,
}

impl<B: Backend> ReductionB<B> {
    fn new(device: &B::Device) -> Self {
        Self {
            b0_1: ConvBlock::new(&ConvBlockConfig::new(1024, 192, [1, 1]), device),
            b0_2: ConvBlock::new(
                &ConvBlockConfig::new(192, 192, [3, 3]).with_stride([2, 2]),
                device,
            ),
            b1_1: ConvBlock::new(&ConvBlockConfig::new(1024, 256, [1, 1]), device),
            b1_2: ConvBlock::new(
                &ConvBlockConfig::new(256, 256, [1, 7]).with_padding([0, 3]),
                device,
            ),
            b1_3: ConvBlock::new(
                &ConvBlockConfig::new(256, 320, [7, 1]).with_padding([3, 0]),
                device,
            ),
            b1_4: ConvBlock::new(
                &ConvBlockConfig::new(320, 320, [3, 3]).with_stride([2, 2]),
                device,
            ),
            pool: max_pool_3x3_s2(),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let b0 = self.b0_2.forward(self.b0_1.forward(x.clone()));
        let b1 = self.b1_4.forward(
            self.b1_3
                .forward(self.b1_2.forward(self.b1_1.forward(x.clone()))),
        );
        let b2 = self.pool.forward(x);
        Tensor::cat(vec![b0, b1, b2], 1)
    }
}

/// 1536-in, 1536-out mixed block at 8x8 scale.
#[derive(Module, Debug)]
struct BlockC<B: Backend> {
    b0: ConvBlock<B>,
    b1_1: ConvBlock<B>,
    b1_2a: ConvBlock<B>,
    b1_2b: ConvBlock<B>,
    b2_1: ConvBlock<B>,
    b2_2: ConvBlock<B>,
    b2_3: ConvBlock<B>,
    b2_4a: ConvBlock<B>,
    b2_4b: ConvBlock<B>,
    pool: AvgPool2d,
    b3: ConvBlock<B>,
}

impl<B: Backend> BlockC<B> {
    fn new(device: &B::Device) -> Self {
        Self {
            b0: ConvBlock::new(&ConvBlockConfig::new(1536, 256, [1, 1]), device),
            b1_1: ConvBlock::new(&ConvBlockConfig::new(1536, 384, [1, 1]), device),
            b1_2a: ConvBlock::new(
                &ConvBlockConfig::new(384, 256, [1, 3]).with_padding([0, 1]),
                device,
            ),
            b1_2b: ConvBlock::new(
                &ConvBlockConfig::new(384, 256, [3, 1]).with_padding([1, 0]),
                device,
            ),
            b2_1: ConvBlock::new(&ConvBlockConfig::new(1536, 384, [1, 1]), device),
            b2_2: ConvBlock::new(
                &ConvBlockConfig::new(384, 448, [3, 1]).with_padding([1, 0]),
                device,
            ),
            b2_3: ConvBlock::new(
                &ConvBlockConfig::new(448, 512, [1, 3]).with_padding([0, 1]),
                device,
            ),
            b2_4a: ConvBlock::new(
                &ConvBlockConfig::new(512, 256, [1, 3]).with_padding([0, 1]),
                device,
            ),
            b2_4b: ConvBlock::new(
                &ConvBlockConfig::new(512, 256, [3, 1]).with_padding([1, 0]),
                device,
            ),
            pool: avg_pool_3x3_same(),
            b3: ConvBlock::new(&ConvBlockConfig::new(1536, 256, [1, 1]), device),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let b0 = self.b0.forward(x.clone());
        let b1 = self.b1_1.forward(x.clone());
        let b1 = Tensor::cat(
            vec![self.b1_2a.forward(b1.clone()), self.b1_2b.forward(b1)],
            1,
        );
        let b2 = self.b2_3.forward(self.b2_2.forward(self.b2_1.forward(x.clone())));
        let b2 = Tensor::cat(
            vec![self.b2_4a.forward(b2.clone()), self.b2_4b.forward(b2)],
            1,
        );
        let b3 = self.b3.forward(self.pool.forward(x));
        Tensor::cat(vec![b0, b1, b2, b3], 1)
    }
}

#[derive(Module, Debug)]
pub struct InceptionV4<B: Backend> {
    stem: StemV4<B>,
    blocks_a: Vec<BlockA<B>>,
    reduction_a: ReductionA<B>,
    blocks_b: Vec<BlockB<B>>,
    aux: Option<InceptionAux<B>>,
    reduction_b: ReductionB<B>,
    blocks_c: Vec<BlockC<B>>,
    pool: AdaptiveAvgPool2d,
    dropout: Dropout,
    fc: Linear<B>,
}

impl<B: Backend> InceptionV4<B> {
    pub fn new(cfg: &InceptionV4Config, device: &B::Device) -> Self {
        Self {
            stem: StemV4::new(device),
            blocks_a: (0..4).map(|_| BlockA::new(device)).collect(),
            reduction_a: ReductionA::new(device),
            blocks_b: (0..7).map(|_| BlockB::new(device)).collect(),
            aux: cfg
                .aux_logits
                .then(|| InceptionAux::new(1024, cfg.num_classes, device)),
            reduction_b: ReductionB::new(device),
            blocks_c: (0..3).map(|_| BlockC::new(device)).collect(),
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            dropout: DropoutConfig::new(cfg.dropout).init(),
            fc: LinearConfig::new(1536, cfg.num_classes).init(device),
        }
    }

    fn run(&self, input: Tensor<B, 4>, with_aux: bool) -> (Tensor<B, 2>, Option<Tensor<B, 2>>) {
        // Unlike the v3 backbone, inputs reach the stem unrescaled.
        let mut x = self.stem.forward(input);
        for block in &self.blocks_a {
            x = block.forward(x);
        }
        x = self.reduction_a.forward(x);
        for block in &self.blocks_b {
            x = block.forward(x);
        }
        let aux = if with_aux {
            self.aux.as_ref().map(|a| a.forward(x.clone()))
        } else {
            None
        };
        x = self.reduction_b.forward(x);
        for block in &self.blocks_c {
            x = block.forward(x);
        }
        let x = self.pool.forward(x);
        let x = self.dropout.forward(x.flatten(1, 3));
        (self.fc.forward(x), aux)
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        self.run(input, false).0
    }

    pub fn forward_training(&self, input: Tensor<B, 4>) -> InceptionOutputs<B> {
        let (logits, aux_logits) = self.run(input, true);
        InceptionOutputs { logits, aux_logits }
    }
}

fn avg_pool_3x3_same() -> AvgPool2d {
    AvgPool2dConfig::new([3, 3])
        .with_strides([1, 1])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .init()
}

fn max_pool_3x3_s2() -> MaxPool2d {
    MaxPool2dConfig::new([3, 3]).with_strides([2, 2]).init()
}
