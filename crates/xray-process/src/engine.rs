use burn::prelude::*;
use std::path::PathBuf;
use xray_buffer::archive::{self, ArchiveError};

/// Conditioning handed to the model. The two evaluation stages feed it
/// differently, and the tag makes a mismatch a type error instead of a
/// silently wrong channel count.
pub enum ConditioningInput<B: Backend> {
    /// Base stage: a single RGB view, [3, h, w] in [-1, 1].
    ImageOnly { image: Tensor<B, 3> },
    /// Super-resolution stages: the view plus a low-res buffer upsampled
    /// to the working resolution, [frames, 8, size, size].
    ImageWithLowRes {
        image: Tensor<B, 3>,
        low_res: Tensor<B, 4>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no prediction available for sample {uid}")]
    MissingPrediction { uid: String },
    #[error("failed to load prediction: {0}")]
    Archive(#[from] ArchiveError),
    #[error("inference failed: {0}")]
    Inference(String),
}

/// Produces a raw network-range buffer, [frames, channels, size, size]
/// in [-1, 1], for a sample. The model behind it is opaque to the
/// evaluation pipeline.
pub trait InferenceEngine<B: Backend> {
    fn predict(
        &mut self,
        uid: &str,
        input: &ConditioningInput<B>,
    ) -> Result<Tensor<B, 4>, EngineError>;
}

/// An engine that replays predictions persisted by an earlier run, one
/// `<uid>.safetensors` per sample. Stands in for live inference in tests
/// and when re-scoring an existing run under different settings.
pub struct ReplayEngine<B: Backend> {
    dir: PathBuf,
    device: B::Device,
}

impl<B: Backend> ReplayEngine<B> {
    pub fn new(dir: impl Into<PathBuf>, device: B::Device) -> Self {
        Self {
            dir: dir.into(),
            device,
        }
    }
}

impl<B: Backend> InferenceEngine<B> for ReplayEngine<B> {
    fn predict(
        &mut self,
        uid: &str,
        _input: &ConditioningInput<B>,
    ) -> Result<Tensor<B, 4>, EngineError> {
        let path = self.dir.join(format!("{uid}.safetensors"));
        if !path.exists() {
            return Err(EngineError::MissingPrediction {
                uid: uid.to_owned(),
            });
        }
        Ok(archive::read_dense(&path, &self.device)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn replay_reads_back_saved_prediction() {
        let dir = std::env::temp_dir().join(format!("xray-replay-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();

        let device = Default::default();
        let raw = Tensor::<NdArray, 4>::ones([2, 8, 4, 4], &device) * 0.25;
        archive::write_dense(&dir.join("obj1.safetensors"), raw.clone()).unwrap();

        let mut engine = ReplayEngine::<NdArray>::new(&dir, device);
        let input = ConditioningInput::ImageOnly {
            image: Tensor::<NdArray, 3>::zeros([3, 8, 8], &device),
        };
        let out = engine.predict("obj1", &input).unwrap();
        assert_eq!(out.dims(), [2, 8, 4, 4]);
        // Predictions land on the device the engine was built with.
        assert_eq!(out.device(), device);

        let missing = engine.predict("obj2", &input);
        assert!(matches!(
            missing,
            Err(EngineError::MissingPrediction { .. })
        ));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
