use clap::ValueEnum;

/// What a non-finite chamfer distance (usually an all-miss prediction)
/// does to the running statistics.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NanPolicy {
    /// Drop the sample from the mean but keep counting it as seen.
    Skip,
    /// Fold it in, poisoning the mean. Useful to make degenerate
    /// predictions impossible to miss.
    Propagate,
}

/// Running chamfer statistics over an evaluation run.
#[derive(Debug, Clone)]
pub struct EvalAccumulator {
    policy: NanPolicy,
    sum: f64,
    scored: usize,
    seen: usize,
    skipped_nan: usize,
}

impl EvalAccumulator {
    pub fn new(policy: NanPolicy) -> Self {
        Self {
            policy,
            sum: 0.0,
            scored: 0,
            seen: 0,
            skipped_nan: 0,
        }
    }

    pub fn push(&mut self, distance: f64) {
        self.seen += 1;
        if distance.is_nan() {
            match self.policy {
                NanPolicy::Skip => {
                    self.skipped_nan += 1;
                    return;
                }
                NanPolicy::Propagate => {}
            }
        }
        self.sum += distance;
        self.scored += 1;
    }

    /// Mean over scored samples. NaN while nothing has been scored, which
    /// matches the distance metric's own empty-set convention.
    pub fn mean(&self) -> f64 {
        self.sum / self.scored as f64
    }

    pub fn seen(&self) -> usize {
        self.seen
    }

    pub fn scored(&self) -> usize {
        self.scored
    }

    pub fn skipped_nan(&self) -> usize {
        self.skipped_nan
    }
}
