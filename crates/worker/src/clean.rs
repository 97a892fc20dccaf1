//! `reelsmith clean`: drop a finished base from disk and from the status
//! document.

use std::path::Path;

use anyhow::Context;
use reelsmith_core::stage::StageStatus;
use reelsmith_db::StatusStore;
use reelsmith_pipeline::ArtifactStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanOutcome {
    Removed,
    /// The base's video is not done and `force` was not given.
    Refused { video: StageStatus },
    UnknownBase,
}

/// Remove `base`'s artifacts, suggestion directory and status record.
pub async fn clean_base(
    store: &StatusStore,
    artifacts: &dyn ArtifactStore,
    suggestions_root: &Path,
    base: &str,
    force: bool,
) -> anyhow::Result<CleanOutcome> {
    let Some(record) = store.get(base).await? else {
        return Ok(CleanOutcome::UnknownBase);
    };
    if !record.video.is_done() && !force {
        return Ok(CleanOutcome::Refused {
            video: record.video,
        });
    }

    artifacts
        .remove_base(base)
        .await
        .with_context(|| format!("removing artifacts of {base}"))?;

    let suggestions = suggestions_root.join(base);
    match tokio::fs::remove_dir_all(&suggestions).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(e).with_context(|| format!("removing {}", suggestions.display()));
        }
    }

    store.remove(base).await?;
    tracing::info!(base, forced = force, "Base cleaned");
    Ok(CleanOutcome::Removed)
}
