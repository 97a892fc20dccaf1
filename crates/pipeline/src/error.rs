use reelsmith_core::session::SessionError;
use reelsmith_db::StoreError;

use crate::artifacts::ArtifactError;

/// Failure of one scene attempt. Never escapes the worker loop.
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("Progress update failed: {0}")]
    Store(#[from] StoreError),
}

/// Runner-level failures that stop processing of one base.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Status store error: {0}")]
    Store(#[from] StoreError),
}
