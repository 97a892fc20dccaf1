//! Capability traits for external generative sessions.
//!
//! A [`GenerativeSession`] is one live connection for one profile. It turns
//! a prompt into zero or more artifacts. A [`SessionLauncher`] opens
//! sessions by profile name. The pipeline only depends on these traits, so
//! the concrete backend (and the fakes used in tests) can be swapped
//! freely.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

/// One artifact returned by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedArtifact {
    /// Name reported by the backend, if any.
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

impl GeneratedArtifact {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            file_name: None,
            bytes,
        }
    }
}

/// Errors surfaced by a session or launcher.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The session could not be opened for the profile.
    #[error("Failed to open session for profile '{profile}': {reason}")]
    Open { profile: String, reason: String },

    /// The request or its response failed on the wire.
    #[error("Transport error: {0}")]
    Transport(String),

    /// No artifact arrived within the bounded wait.
    #[error("Timed out after {}s waiting for artifacts", .0.as_secs())]
    Timeout(Duration),

    /// The backend ran the request and reported a failure.
    #[error("Generation failed: {0}")]
    Failed(String),

    /// The backend answered with something unusable.
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// The backend finished without producing any artifact.
    #[error("Session returned no artifacts")]
    EmptyArtifacts,

    /// The session was already closed.
    #[error("Session is closed")]
    Closed,
}

/// A live session bound to one profile.
#[async_trait]
pub trait GenerativeSession: Send + Sync {
    /// Profile this session was opened for.
    fn profile(&self) -> &str;

    /// Submit `prompt` and wait for its artifacts.
    async fn generate(&self, prompt: &str) -> Result<Vec<GeneratedArtifact>, SessionError>;

    /// Release the session. Calling it twice is harmless.
    async fn close(&self) -> Result<(), SessionError>;
}

/// Opens sessions by profile name.
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn open(&self, profile: &str) -> Result<Arc<dyn GenerativeSession>, SessionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_display_uses_seconds() {
        let err = SessionError::Timeout(Duration::from_secs(90));
        assert_eq!(err.to_string(), "Timed out after 90s waiting for artifacts");
    }

    #[test]
    fn open_display_names_profile() {
        let err = SessionError::Open {
            profile: "alice".into(),
            reason: "refused".into(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to open session for profile 'alice': refused"
        );
    }
}
