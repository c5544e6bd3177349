use crate::accumulator::NanPolicy;
use clap::{Args, Parser, ValueEnum};
use glam::vec3;
use xray_buffer::{DecodePolicy, DepthRange};
use xray_geom::PointCloud;

/// Predicted clouds in the base evaluator are shifted from camera space
/// into the object frame by this much along z before scoring.
pub const DEPTH_SHIFT_Z: f32 = 1.5;

/// Which of the evaluation pipelines to run.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalVariant {
    /// Base video-diffusion evaluator: image in, buffer out.
    Diffusion,
    /// Super-resolution upsampler fed with the dataset's low-res buffer.
    Upsampler,
    /// Upsampler fed with the diffusion stage's persisted raw predictions.
    FullSr,
}

impl EvalVariant {
    pub fn decode_policy(&self, range: DepthRange) -> DecodePolicy {
        match self {
            // The base evaluator has no hit channel and relies on the
            // cross-frame consistency heuristic instead.
            Self::Diffusion => DecodePolicy::for_range(range),
            Self::Upsampler | Self::FullSr => DecodePolicy::for_range(range)
                .with_monotonic(false)
                .with_use_hit_mask(true),
        }
    }

    pub fn centering(&self) -> Centering {
        match self {
            Self::Diffusion => Centering::Shift(vec3(0.0, 0.0, DEPTH_SHIFT_Z)),
            Self::Upsampler | Self::FullSr => Centering::Centroid,
        }
    }

    /// Only the upsampler tolerates samples the loader rejects; the other
    /// evaluators treat one as fatal.
    pub fn skips_invalid_samples(&self) -> bool {
        matches!(self, Self::Upsampler)
    }

    /// The diffusion stage persists its raw low-res predictions so the
    /// full-sr stage can reload them.
    pub fn saves_raw_prediction(&self) -> bool {
        matches!(self, Self::Diffusion)
    }
}

/// Normalization applied to both point clouds before scoring. Owned by the
/// driver, not the projector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Centering {
    Shift(glam::Vec3),
    Centroid,
}

impl Centering {
    pub fn apply(&self, cloud: &mut PointCloud) {
        match self {
            Self::Shift(offset) => cloud.translate(*offset),
            Self::Centroid => cloud.center_on_centroid(),
        }
    }
}

#[derive(Clone, Args)]
pub struct EvalConfig {
    /// Experiment name under the output root.
    #[arg(long, help_heading = "Eval options", default_value = "Objaverse_XRay")]
    pub exp: String,

    /// Dataset root holding xrays/ and images/.
    #[arg(long, help_heading = "Eval options", default_value = "Data/Objaverse_XRay")]
    pub data_root: String,

    /// Root of experiment outputs and checkpoints.
    #[arg(long, help_heading = "Eval options", default_value = "Output")]
    pub output_root: String,

    /// Evaluation pipeline to run.
    #[arg(long, help_heading = "Eval options", value_enum, default_value_t = EvalVariant::Diffusion)]
    pub variant: EvalVariant,

    /// Override the dataset family's near plane (metric units).
    #[arg(long, help_heading = "Eval options")]
    pub near: Option<f64>,

    /// Override the dataset family's far plane (metric units).
    #[arg(long, help_heading = "Eval options")]
    pub far: Option<f64>,

    /// How NaN distances fold into the running mean.
    #[arg(long, help_heading = "Eval options", value_enum, default_value_t = NanPolicy::Skip)]
    pub nan_policy: NanPolicy,

    /// Cap on the number of evaluated samples.
    #[arg(long, help_heading = "Eval options", default_value = "500")]
    pub max_samples: usize,

    /// Random seed (upsampler input perturbation).
    #[arg(long, help_heading = "Eval options", default_value = "42")]
    pub seed: u64,

    /// Diffusion-stage experiment whose evaluate/ dir feeds the full-sr
    /// variant.
    #[arg(long, help_heading = "Eval options")]
    pub diffusion_exp: Option<String>,
}

impl EvalConfig {
    /// Near/far calibration: dataset-family default with explicit overrides.
    pub fn depth_range(&self) -> DepthRange {
        let mut range = DepthRange::for_data_root(&self.data_root);
        if let Some(near) = self.near {
            range.near = near;
        }
        if let Some(far) = self.far {
            range.far = far;
        }
        range
    }

    pub fn evaluate_dir(&self) -> std::path::PathBuf {
        std::path::PathBuf::from(&self.output_root)
            .join(&self.exp)
            .join("evaluate")
    }
}

#[derive(Parser, Clone)]
pub struct ProcessArgs {
    #[clap(flatten)]
    pub eval: EvalConfig,
    #[clap(flatten)]
    pub load: xray_dataset::LoadDatasetConfig,
}

impl Default for ProcessArgs {
    fn default() -> Self {
        Self::parse_from([""])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_range_overrides() {
        let mut args = ProcessArgs::default();
        args.eval.data_root = "Data/ShapeNetV2_Car".to_owned();
        assert_eq!(args.eval.depth_range(), DepthRange::SHAPENET);

        args.eval.near = Some(0.7);
        let range = args.eval.depth_range();
        assert_eq!(range.near, 0.7);
        assert_eq!(range.far, DepthRange::SHAPENET.far);
    }

    #[test]
    fn variant_policies() {
        let range = DepthRange::OBJAVERSE;
        let base = EvalVariant::Diffusion.decode_policy(range);
        assert!(base.monotonic && !base.use_hit_mask);

        let sr = EvalVariant::FullSr.decode_policy(range);
        assert!(!sr.monotonic && sr.use_hit_mask);

        assert_eq!(
            EvalVariant::Diffusion.centering(),
            Centering::Shift(vec3(0.0, 0.0, DEPTH_SHIFT_Z))
        );
        assert_eq!(EvalVariant::Upsampler.centering(), Centering::Centroid);
    }
}
