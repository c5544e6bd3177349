use std::path::PathBuf;

/// Messages emitted by the evaluation stream, consumed by whatever
/// frontend drives it.
#[derive(Debug, Clone)]
pub enum EvalMessage {
    Start {
        total: usize,
        evaluate_dir: PathBuf,
    },
    /// A sample made it through decode, projection and scoring.
    SampleScored {
        index: usize,
        uid: String,
        distance: f64,
        running_mean: f64,
    },
    /// A sample was dropped, with the reason spelled out for the log.
    SampleSkipped {
        index: usize,
        uid: String,
        reason: String,
    },
    Done {
        mean: f64,
        scored: usize,
        seen: usize,
    },
}
