use std::path::{Path, PathBuf};

/// Finds the newest `checkpoint-N` directory under an experiment root,
/// where newest means the largest numeric suffix.
pub fn latest_checkpoint(exp_dir: &Path) -> std::io::Result<Option<PathBuf>> {
    let mut best: Option<(u64, PathBuf)> = None;

    for entry in std::fs::read_dir(exp_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(step) = name
            .to_str()
            .and_then(|n| n.strip_prefix("checkpoint-"))
            .and_then(|s| s.parse::<u64>().ok())
        else {
            continue;
        };
        if best.as_ref().is_none_or(|(b, _)| step > *b) {
            best = Some((step, entry.path()));
        }
    }

    Ok(best.map(|(_, path)| path))
}
