use burn::prelude::Backend;
use burn::tensor::Tensor;

pub mod archive;
pub mod decode;

pub use archive::ArchiveError;
pub use decode::{DecodePolicy, encode_network_range};

/// Number of frames stored in an on-disk buffer archive. Callers slice off
/// the first N frames they need.
pub const ARCHIVE_FRAMES: usize = 16;
/// Depth + normal (3) + color (3).
pub const BASE_CHANNELS: usize = 7;
/// Index of the optional binary hit channel.
pub const HIT_CHANNEL: usize = 7;
/// Spatial resolution of archived buffers.
pub const ARCHIVE_RESOLUTION: usize = 256;

/// Metric depth bounds the network output range is calibrated against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthRange {
    pub near: f64,
    pub far: f64,
}

impl DepthRange {
    pub const OBJAVERSE: Self = Self {
        near: 0.6,
        far: 2.4,
    };
    pub const SHAPENET: Self = Self {
        near: 0.5,
        far: 1.5,
    };

    /// The calibration follows the dataset family the data root points at.
    pub fn for_data_root(root: &str) -> Self {
        if root.to_lowercase().contains("shapenet") {
            Self::SHAPENET
        } else {
            Self::OBJAVERSE
        }
    }

    pub fn span(&self) -> f64 {
        self.far - self.near
    }
}

/// A multi-frame geometric buffer of shape `[F, C, H, W]`.
///
/// Channel 0 is metric depth where 0 encodes "no surface hit", channels 1-3
/// are a surface normal, channels 4-6 an RGB color in `[0, 1]`, and an
/// optional channel 7 carries a binary hit mask.
#[derive(Debug, Clone)]
pub struct XrayBuffer<B: Backend> {
    data: Tensor<B, 4>,
}

impl<B: Backend> XrayBuffer<B> {
    pub fn from_tensor(data: Tensor<B, 4>) -> Self {
        let [_, channels, _, _] = data.dims();
        assert!(
            channels == BASE_CHANNELS || channels == BASE_CHANNELS + 1,
            "xray buffer needs {BASE_CHANNELS} or {} channels, got {channels}",
            BASE_CHANNELS + 1
        );
        Self { data }
    }

    /// Reassemble a buffer from its post-processed channel groups.
    pub fn from_parts(
        depth: Tensor<B, 4>,
        normals: Tensor<B, 4>,
        colors: Tensor<B, 4>,
    ) -> Self {
        Self::from_tensor(Tensor::cat(vec![depth, normals, colors], 1))
    }

    /// `[frames, channels, height, width]`.
    pub fn dims(&self) -> [usize; 4] {
        self.data.dims()
    }

    pub fn num_frames(&self) -> usize {
        self.dims()[0]
    }

    pub fn resolution(&self) -> (usize, usize) {
        let [_, _, h, w] = self.dims();
        (w, h)
    }

    /// Keep only the first `count` frames.
    pub fn take_frames(self, count: usize) -> Self {
        let [frames, _, _, _] = self.data.dims();
        assert!(count <= frames, "cannot take {count} of {frames} frames");
        Self {
            data: self.data.slice([0..count]),
        }
    }

    /// Depth channel, `[F, 1, H, W]`.
    pub fn depth(&self) -> Tensor<B, 4> {
        let [frames, _, _, _] = self.data.dims();
        self.data.clone().slice([0..frames, 0..1])
    }

    /// Normal channels, `[F, 3, H, W]`.
    pub fn normals(&self) -> Tensor<B, 4> {
        let [frames, _, _, _] = self.data.dims();
        self.data.clone().slice([0..frames, 1..4])
    }

    /// Color channels, `[F, 3, H, W]`.
    pub fn colors(&self) -> Tensor<B, 4> {
        let [frames, _, _, _] = self.data.dims();
        self.data.clone().slice([0..frames, 4..7])
    }

    /// Hit mask channel if the buffer carries one, `[F, 1, H, W]`.
    pub fn hits(&self) -> Option<Tensor<B, 4>> {
        let [frames, channels, _, _] = self.data.dims();
        (channels > HIT_CHANNEL)
            .then(|| self.data.clone().slice([0..frames, HIT_CHANNEL..HIT_CHANNEL + 1]))
    }

    pub fn into_inner(self) -> Tensor<B, 4> {
        self.data
    }

    pub fn inner(&self) -> &Tensor<B, 4> {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::TensorData;

    type TestBackend = NdArray;

    #[test]
    fn depth_range_follows_dataset_family() {
        assert_eq!(
            DepthRange::for_data_root("Data/ShapeNetV2_Car"),
            DepthRange::SHAPENET
        );
        assert_eq!(
            DepthRange::for_data_root("Data/Objaverse_XRay"),
            DepthRange::OBJAVERSE
        );
    }

    #[test]
    fn buffer_splits_channels() {
        let device = Default::default();
        let data: Vec<f32> = (0..2 * 7 * 2 * 2).map(|v| v as f32).collect();
        let buffer = XrayBuffer::<TestBackend>::from_tensor(Tensor::from_data(
            TensorData::new(data, [2, 7, 2, 2]),
            &device,
        ));

        assert_eq!(buffer.depth().dims(), [2, 1, 2, 2]);
        assert_eq!(buffer.normals().dims(), [2, 3, 2, 2]);
        assert_eq!(buffer.colors().dims(), [2, 3, 2, 2]);
        assert!(buffer.hits().is_none());

        let first = buffer.take_frames(1);
        assert_eq!(first.num_frames(), 1);
    }
}
