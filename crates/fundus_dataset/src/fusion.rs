//! Fusing per-lesion heatmaps into an image's channel stack.

use ndarray::Array2;

use crate::types::{DatasetResult, FundusDatasetError, SampleTensor};

/// How the four lesion heatmaps combine with the RGB image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusionPolicy {
    /// RGB plus the four raw maps: 7 channels.
    Concat,
    /// RGB plus each map multiplied into every color channel: 15 channels.
    ConcatProducts,
    /// `(I + I*H1 + I*H2 + I*H3 + I*H4) / 5`: 3 channels.
    WeightedAverage,
    /// Same stack as `ConcatProducts`, paired with the deeper stem variants.
    ConcatProducts4,
}

impl FusionPolicy {
    pub fn output_channels(self) -> usize {
        match self {
            FusionPolicy::Concat => 7,
            FusionPolicy::ConcatProducts => 15,
            FusionPolicy::WeightedAverage => 3,
            FusionPolicy::ConcatProducts4 => 15,
        }
    }
}

/// Flag-style fusion selection, mirroring how training configs toggle the
/// policies on and off. At most one flag may be set.
#[derive(Debug, Clone, Copy, Default)]
pub struct FusionFlags {
    pub concat: bool,
    pub concat_products: bool,
    pub weighted_average: bool,
    pub concat_products_4: bool,
}

impl FusionFlags {
    pub fn resolve(self) -> DatasetResult<Option<FusionPolicy>> {
        let set = [
            (self.concat, FusionPolicy::Concat),
            (self.concat_products, FusionPolicy::ConcatProducts),
            (self.weighted_average, FusionPolicy::WeightedAverage),
            (self.concat_products_4, FusionPolicy::ConcatProducts4),
        ];
        let mut chosen = None;
        for (flag, policy) in set {
            if flag {
                if chosen.is_some() {
                    return Err(FundusDatasetError::ConflictingFusionPolicy);
                }
                chosen = Some(policy);
            }
        }
        Ok(chosen)
    }
}

/// Combines a 3-channel image with four same-resolution heatmaps under
/// `policy`. Maps are indexed logically so flipped (non-contiguous) views
/// fuse correctly. Fails when a map's resolution disagrees with the image,
/// which happens when a sample transform changes the image size.
pub fn fuse(
    policy: FusionPolicy,
    image: &SampleTensor,
    maps: &[Array2<f32>; 4],
) -> DatasetResult<SampleTensor> {
    for map in maps {
        if map.dim() != (image.height, image.width) {
            return Err(FundusDatasetError::HeatmapShapeMismatch {
                expected: (image.height, image.width),
                actual: map.dim(),
            });
        }
    }
    let plane = image.plane();
    let channels = policy.output_channels();
    let mut data = Vec::with_capacity(channels * plane);
    match policy {
        FusionPolicy::Concat => {
            data.extend_from_slice(&image.data);
            for map in maps {
                data.extend(map.iter().copied());
            }
        }
        FusionPolicy::ConcatProducts | FusionPolicy::ConcatProducts4 => {
            data.extend_from_slice(&image.data);
            for map in maps {
                for c in 0..image.channels {
                    let channel = image.channel(c);
                    data.extend(map.iter().zip(channel).map(|(&m, &v)| m * v));
                }
            }
        }
        FusionPolicy::WeightedAverage => {
            for c in 0..image.channels {
                let channel = image.channel(c);
                let mut fused: Vec<f32> = channel.to_vec();
                for map in maps {
                    for (acc, (&m, &v)) in fused.iter_mut().zip(map.iter().zip(channel)) {
                        *acc += m * v;
                    }
                }
                data.extend(fused.into_iter().map(|v| v / 5.0));
            }
        }
    }
    Ok(SampleTensor {
        data,
        channels,
        height: image.height,
        width: image.width,
    })
}
