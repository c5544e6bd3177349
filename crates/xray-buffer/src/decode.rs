//! Turning raw network output into a valid geometric buffer, and the
//! inverse mapping used when feeding clean buffers back to the network.

use crate::{DepthRange, HIT_CHANNEL, XrayBuffer};
use burn::config::Config;
use burn::prelude::Backend;
use burn::tensor::Tensor;

/// Denormalization and artifact-suppression policy for raw predictions.
///
/// The raw buffer is in the network's `[-1, 1]` range. Depth is mapped back
/// to `[near, far]` metric units; values at the saturation boundaries are
/// treated as "no hit" and zeroed.
#[derive(Config, Debug)]
pub struct DecodePolicy {
    /// Near plane of the metric depth range.
    #[config(default = 0.6)]
    pub near: f64,
    /// Far plane of the metric depth range.
    #[config(default = 2.4)]
    pub far: f64,
    /// Drop depth samples that move closer to the camera than the previous
    /// frame's raw sample.
    #[config(default = true)]
    pub monotonic: bool,
    /// Interpret channel 7 as a hit mask and zero misses in every channel.
    #[config(default = false)]
    pub use_hit_mask: bool,
}

impl DecodePolicy {
    pub fn for_range(range: DepthRange) -> Self {
        Self::new().with_near(range.near).with_far(range.far)
    }

    pub fn range(&self) -> DepthRange {
        DepthRange {
            near: self.near,
            far: self.far,
        }
    }

    /// Decode a clamped raw prediction of shape `[F, C, H, W]` (C = 7 or 8)
    /// into a buffer with metric depth, unit normals and `[0, 1]` colors.
    pub fn decode<B: Backend>(&self, raw: Tensor<B, 4>) -> XrayBuffer<B> {
        let [frames, channels, _, _] = raw.dims();

        let depth = raw
            .clone()
            .slice([0..frames, 0..1])
            .mul_scalar(0.5)
            .add_scalar(0.5)
            .mul_scalar(self.far - self.near)
            .add_scalar(self.near);
        // Saturation at either normalization boundary means "no surface".
        let depth = depth
            .clone()
            .mask_fill(depth.clone().lower_equal_elem(self.near), 0.0);
        let mut depth = depth
            .clone()
            .mask_fill(depth.clone().greater_equal_elem(self.far), 0.0);

        let mut normals = normalize_normals(raw.clone().slice([0..frames, 1..4]));
        let mut colors = raw
            .clone()
            .slice([0..frames, 4..7])
            .mul_scalar(0.5)
            .add_scalar(0.5);

        if self.use_hit_mask && channels > HIT_CHANNEL {
            let hit = raw.slice([0..frames, HIT_CHANNEL..HIT_CHANNEL + 1]);
            let miss = hit.lower_equal_elem(0.0);
            depth = depth.mask_fill(miss.clone(), 0.0);
            let miss = miss.repeat_dim(1, 3);
            normals = normals.mask_fill(miss.clone(), 0.0);
            colors = colors.mask_fill(miss, 0.0);
        }

        if self.monotonic {
            depth = monotonic_filter(depth);
        }

        XrayBuffer::from_parts(depth, normals, colors)
    }
}

/// Zero out depth at frame k wherever it is closer to the camera than frame
/// k-1. Comparisons use an unmodified copy of the input sequence, so a frame
/// dropped by the filter still serves as the reference for its successor.
pub fn monotonic_filter<B: Backend>(depth: Tensor<B, 4>) -> Tensor<B, 4> {
    let [frames, _, _, _] = depth.dims();
    let reference = depth.clone();
    let mut filtered = depth;
    for k in 1..frames {
        let cur = reference.clone().slice([k..k + 1]);
        let prev = reference.clone().slice([k - 1..k]);
        let dropped = cur.clone().mask_fill(cur.lower(prev), 0.0);
        filtered = filtered.slice_assign([k..k + 1], dropped);
    }
    filtered
}

fn normalize_normals<B: Backend>(vec: Tensor<B, 4>) -> Tensor<B, 4> {
    let magnitudes =
        Tensor::clamp_min(Tensor::sum_dim(vec.clone().powi_scalar(2), 1).sqrt(), 1e-12);
    vec / magnitudes
}

/// Map a clean buffer into the network's `[-1, 1]` range, appending the hit
/// channel derived from positive depth. Used by the dataset loaders.
pub fn encode_network_range<B: Backend>(
    buffer: &XrayBuffer<B>,
    range: DepthRange,
) -> Tensor<B, 4> {
    let depth = buffer.depth();
    let hit = depth
        .clone()
        .greater_elem(0.0)
        .float()
        .mul_scalar(2.0)
        .sub_scalar(1.0);
    let depth = depth
        .sub_scalar(range.near)
        .div_scalar(range.span())
        .mul_scalar(2.0)
        .sub_scalar(1.0);
    let normals = normalize_normals(buffer.normals());
    let colors = buffer.colors().mul_scalar(2.0).sub_scalar(1.0);
    Tensor::cat(vec![depth, normals, colors, hit], 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use burn::backend::NdArray;
    use burn::tensor::TensorData;

    type TestBackend = NdArray;

    fn raw_with_depth(depths: &[f32], channels: usize) -> Tensor<TestBackend, 4> {
        let device = Default::default();
        let frames = depths.len();
        let mut data = vec![0.0f32; frames * channels];
        for (frame, &depth) in depths.iter().enumerate() {
            data[frame * channels] = depth;
            // Hit channel set to "hit" so it never interferes.
            if channels > HIT_CHANNEL {
                data[frame * channels + HIT_CHANNEL] = 1.0;
            }
        }
        Tensor::from_data(TensorData::new(data, [frames, channels, 1, 1]), &device)
    }

    fn depth_values(buffer: &XrayBuffer<TestBackend>) -> Vec<f32> {
        buffer.depth().into_data().into_vec().expect("readback")
    }

    #[test]
    fn denormalize_filters_boundaries() {
        let policy = DecodePolicy::new().with_monotonic(false);
        let decoded = policy.decode(raw_with_depth(&[-1.0, 1.0, 0.0], 7));
        let depths = depth_values(&decoded);
        assert_eq!(depths[0], 0.0, "lower boundary is a miss");
        assert_eq!(depths[1], 0.0, "upper boundary is a miss");
        assert_approx_eq!(depths[2], 1.5, 1e-6);
    }

    #[test]
    fn monotonic_filter_compares_prefilter_values() {
        let device = Default::default();
        let depth = Tensor::<TestBackend, 4>::from_data(
            TensorData::new(vec![1.0f32, 0.5, 2.0], [3, 1, 1, 1]),
            &device,
        );
        let filtered: Vec<f32> = monotonic_filter(depth)
            .into_data()
            .into_vec()
            .expect("readback");
        assert_eq!(filtered[0], 1.0);
        assert_eq!(filtered[1], 0.0, "0.5 < 1.0 moved closer, dropped");
        // 2.0 >= the *original* 0.5: the comparison must not see the zeroed
        // value of frame 1.
        assert_eq!(filtered[2], 2.0);
    }

    #[test]
    fn hit_mask_zeroes_all_channels() {
        let device = Default::default();
        // One pixel, mid-range depth, non-trivial normal/color, miss hit.
        let data = vec![0.0f32, 1.0, 0.0, 0.0, 0.5, 0.5, 0.5, -1.0];
        let raw = Tensor::<TestBackend, 4>::from_data(
            TensorData::new(data, [1, 8, 1, 1]),
            &device,
        );
        let policy = DecodePolicy::new()
            .with_monotonic(false)
            .with_use_hit_mask(true);
        let decoded = policy.decode(raw);
        assert_eq!(depth_values(&decoded), vec![0.0]);
        let normals: Vec<f32> = decoded.normals().into_data().into_vec().expect("readback");
        let colors: Vec<f32> = decoded.colors().into_data().into_vec().expect("readback");
        assert_eq!(normals, vec![0.0; 3]);
        assert_eq!(colors, vec![0.0; 3]);
    }

    #[test]
    fn decoded_normals_are_unit_length() {
        let device = Default::default();
        let mut data = vec![0.0f32; 7];
        data[0] = 0.0; // mid-range depth
        data[1] = 3.0;
        data[2] = 4.0;
        let raw = Tensor::<TestBackend, 4>::from_data(
            TensorData::new(data, [1, 7, 1, 1]),
            &device,
        );
        let decoded = DecodePolicy::new().with_monotonic(false).decode(raw);
        let normals: Vec<f32> = decoded.normals().into_data().into_vec().expect("readback");
        let norm = (normals[0] * normals[0] + normals[1] * normals[1] + normals[2] * normals[2])
            .sqrt();
        assert_approx_eq!(norm, 1.0, 1e-5);
        assert_approx_eq!(normals[0], 0.6, 1e-5);
        assert_approx_eq!(normals[1], 0.8, 1e-5);
    }

    #[test]
    fn encode_inverts_depth_mapping() {
        let device = Default::default();
        let range = DepthRange::OBJAVERSE;
        let mut data = vec![0.0f32; 7];
        data[0] = 1.5;
        data[1] = 1.0; // unit normal along x
        let buffer = XrayBuffer::<TestBackend>::from_tensor(Tensor::from_data(
            TensorData::new(data, [1, 7, 1, 1]),
            &device,
        ));
        let encoded = encode_network_range(&buffer, range);
        assert_eq!(encoded.dims(), [1, 8, 1, 1]);
        let values: Vec<f32> = encoded.into_data().into_vec().expect("readback");
        assert_approx_eq!(values[0], 0.0, 1e-6); // midpoint maps to 0
        assert_eq!(values[HIT_CHANNEL], 1.0); // positive depth is a hit
    }
}
