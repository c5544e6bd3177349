pub mod config;
pub mod sample;

use std::path::{Path, PathBuf};
use thiserror::Error;

pub use config::{LoadDatasetConfig, Phase};
pub use sample::{Sample, SampleLoader, image_to_tensor};

/// Minimum intersection-over-union between the conditioning image's alpha
/// mask and the first frame's hit mask for a sample to count as consistent.
pub const MASK_IOU_THRESHOLD: f32 = 0.7;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("IO error while loading dataset.")]
    Io(#[from] std::io::Error),

    #[error("Error decoding conditioning image.")]
    Image(#[from] image::ImageError),

    #[error("Error decoding buffer archive.")]
    Archive(#[from] xray_buffer::ArchiveError),

    #[error(
        "Visibility mask disagrees with the image alpha \
         (IoU {iou:.3} < {MASK_IOU_THRESHOLD})"
    )]
    MaskMismatch { iou: f32 },

    #[error("No valid sample within {max_skip} indices of {start}.")]
    NoValidSample { start: usize, max_skip: usize },

    #[error("No buffer archives found under {0}.")]
    Empty(PathBuf),
}

/// The enumerated buffer archives of one dataset split, in deterministic
/// order.
#[derive(Debug, Clone)]
pub struct SampleSet {
    paths: Vec<PathBuf>,
}

impl SampleSet {
    /// Enumerate `*.safetensors` archives under `<root>/xrays`, sorted
    /// naturally, then apply the phase split.
    pub fn discover(root: &Path, phase: Phase, val_every: usize) -> Result<Self, DatasetError> {
        let xray_root = root.join("xrays");
        let mut paths = Vec::new();
        collect_archives(&xray_root, &mut paths)?;
        alphanumeric_sort::sort_path_slice(&mut paths);

        let paths = match phase {
            // The held-out samples are every 10th archive.
            Phase::Train => paths
                .into_iter()
                .enumerate()
                .filter(|(i, _)| i % 10 != 0)
                .map(|(_, p)| p)
                .collect(),
            Phase::Val => paths.into_iter().step_by(val_every.max(1)).collect(),
            Phase::Test => paths,
        };

        if paths.is_empty() {
            return Err(DatasetError::Empty(xray_root));
        }
        log::info!("Discovered {} samples under {xray_root:?}", paths.len());
        Ok(Self { paths })
    }

    pub fn from_paths(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn path(&self, index: usize) -> &Path {
        &self.paths[index]
    }

    /// Conditioning image path for an archive: `xrays` becomes `images` and
    /// the extension becomes `png`.
    pub fn image_path(&self, index: usize) -> PathBuf {
        use std::path::Component;
        let mut mapped: PathBuf = self.paths[index]
            .components()
            .map(|c| {
                if c.as_os_str() == "xrays" {
                    Component::Normal(std::ffi::OsStr::new("images"))
                } else {
                    c
                }
            })
            .collect();
        mapped.set_extension("png");
        mapped
    }

    /// Sample identifier: the archive's parent directory name.
    pub fn uid(&self, index: usize) -> String {
        let path = &self.paths[index];
        path.parent()
            .and_then(|p| p.file_name())
            .or_else(|| path.file_stem())
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| index.to_string())
    }
}

fn collect_archives(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_archives(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "safetensors") {
            out.push(path);
        }
    }
    Ok(())
}
