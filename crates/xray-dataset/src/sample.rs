use crate::{DatasetError, LoadDatasetConfig, MASK_IOU_THRESHOLD, SampleSet};
use burn::prelude::Backend;
use burn::tensor::Tensor;
use burn::tensor::module::interpolate;
use burn::tensor::ops::{InterpolateMode, InterpolateOptions};
use image::DynamicImage;
use image::imageops::FilterType;
use std::path::PathBuf;
use tracing::trace_span;
use xray_buffer::decode::encode_network_range;
use xray_buffer::{DepthRange, XrayBuffer, archive};

/// One evaluation sample: the ground-truth buffer in the network's range at
/// full and quarter resolution, plus the conditioning image.
pub struct Sample<B: Backend> {
    /// `[F, 8, size, size]`, values in `[-1, 1]`.
    pub xray: Tensor<B, 4>,
    /// `[F, 8, size/4, size/4]`, values in `[-1, 1]`.
    pub xray_lr: Tensor<B, 4>,
    /// Conditioning image resized to twice the buffer resolution, RGB.
    pub image: DynamicImage,
    pub image_path: PathBuf,
    pub uid: String,
}

/// Loads and validates samples from a [`SampleSet`].
pub struct SampleLoader<B: Backend> {
    set: SampleSet,
    config: LoadDatasetConfig,
    range: DepthRange,
    device: B::Device,
}

impl<B: Backend> SampleLoader<B> {
    pub fn new(
        set: SampleSet,
        config: LoadDatasetConfig,
        range: DepthRange,
        device: B::Device,
    ) -> Self {
        assert!(
            config.size % 4 == 0,
            "buffer size must be divisible by 4 for the low-res branch"
        );
        Self {
            set,
            config,
            range,
            device,
        }
    }

    pub fn set(&self) -> &SampleSet {
        &self.set
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Load one sample. Fails on decode errors and on a conditioning image
    /// whose alpha mask disagrees with the buffer's visibility.
    pub fn load(&self, index: usize) -> Result<Sample<B>, DatasetError> {
        let _span = trace_span!("SampleLoader::load").entered();

        let buffer = archive::read_sparse::<B>(self.set.path(index), &self.device)?
            .take_frames(self.config.num_frames);

        let image_path = self.set.image_path(index);
        let image = image::open(&image_path)?;

        let iou = hit_mask_iou(&image, &buffer);
        if iou <= MASK_IOU_THRESHOLD {
            return Err(DatasetError::MaskMismatch { iou });
        }

        let encoded = encode_network_range(&buffer, self.range);
        let size = self.config.size;
        let xray = interpolate(
            encoded.clone(),
            [size, size],
            InterpolateOptions::new(InterpolateMode::Nearest),
        );
        let xray_lr = interpolate(
            encoded,
            [size / 4, size / 4],
            InterpolateOptions::new(InterpolateMode::Nearest),
        );

        let image = DynamicImage::ImageRgb8(
            image
                .resize_exact(2 * size as u32, 2 * size as u32, FilterType::Triangle)
                .to_rgb8(),
        );

        Ok(Sample {
            xray,
            xray_lr,
            image,
            image_path,
            uid: self.set.uid(index),
        })
    }

    /// Bounded skip-and-retry: try up to `max_skip` further indices (with
    /// wraparound) after an invalid sample, then fail the batch.
    pub fn next_valid(&self, start: usize) -> Result<(usize, Sample<B>), DatasetError> {
        let count = self.set.len();
        for offset in 0..=self.config.max_skip.min(count.saturating_sub(1)) {
            let index = (start + offset) % count;
            match self.load(index) {
                Ok(sample) => return Ok((index, sample)),
                Err(error) => log::warn!("Skipping sample {index}: {error}"),
            }
        }
        Err(DatasetError::NoValidSample {
            start,
            max_skip: self.config.max_skip,
        })
    }
}

/// Intersection-over-union between the image's thresholded alpha mask and
/// the first frame's hit mask, both at the buffer's native resolution.
pub fn hit_mask_iou<B: Backend>(image: &DynamicImage, buffer: &XrayBuffer<B>) -> f32 {
    let (width, height) = buffer.resolution();
    let alpha = image
        .resize_exact(width as u32, height as u32, FilterType::Triangle)
        .to_rgba8();

    let depth: Vec<f32> = buffer
        .depth()
        .slice([0..1])
        .into_data()
        .into_vec()
        .expect("Unreachable");

    let mut intersection = 0.0f32;
    let mut union = 0.0f32;
    for (pixel, d) in alpha.pixels().zip(&depth) {
        let masked = f32::from(pixel[3]) / 255.0 > 0.5;
        let hit = *d > 0.0;
        if masked && hit {
            intersection += 1.0;
        }
        if masked || hit {
            union += 1.0;
        }
    }
    if union == 0.0 {
        return 0.0;
    }
    intersection / union
}

/// Conditioning image as a `[3, H, W]` tensor in `[-1, 1]`, the range the
/// network's image encoder expects.
pub fn image_to_tensor<B: Backend>(image: &DynamicImage, device: &B::Device) -> Tensor<B, 3> {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    let mut chw = vec![0.0f32; 3 * (width * height) as usize];
    let pixels = (width * height) as usize;
    for (i, pixel) in rgb.pixels().enumerate() {
        for c in 0..3 {
            chw[c * pixels + i] = f32::from(pixel[c]) / 255.0 * 2.0 - 1.0;
        }
    }
    Tensor::from_data(
        burn::tensor::TensorData::new(chw, [3, height as usize, width as usize]),
        device,
    )
}
