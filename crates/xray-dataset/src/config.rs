use clap::{Args, ValueEnum};

/// Which split of the archive list a loader sees.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Everything except the held-out samples.
    Train,
    /// Every nth sample.
    Val,
    /// The full archive list.
    Test,
}

#[derive(Clone, Debug, Args)]
pub struct LoadDatasetConfig {
    /// Number of frames to slice off the front of each archive.
    #[arg(long, help_heading = "Dataset Options", default_value = "8")]
    pub num_frames: usize,

    /// Spatial resolution buffers are resampled to.
    #[arg(long, help_heading = "Dataset Options", default_value = "256")]
    pub size: usize,

    /// Dataset split to evaluate.
    #[arg(long, help_heading = "Dataset Options", value_enum, default_value_t = Phase::Val)]
    pub phase: Phase,

    /// Keep every nth sample in the val split.
    #[arg(long, help_heading = "Dataset Options", default_value = "30")]
    pub val_every: usize,

    /// Max consecutive invalid samples to skip before failing the batch.
    #[arg(long, help_heading = "Dataset Options", default_value = "8")]
    pub max_skip: usize,
}
