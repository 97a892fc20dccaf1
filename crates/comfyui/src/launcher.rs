//! Opens [`ComfyUISession`]s by profile name.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reelsmith_core::session::{GenerativeSession, SessionError, SessionLauncher};
use tokio_util::sync::CancellationToken;

use crate::api::ComfyUIApi;
use crate::client::ComfyUIClient;
use crate::profile::ProfileConfig;
use crate::reconnect::{connect_with_backoff, ReconnectConfig};
use crate::session::ComfyUISession;
use crate::workflow::WorkflowTemplate;

pub struct ComfyUILauncher {
    profiles_root: PathBuf,
    request_timeout: Duration,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
}

impl ComfyUILauncher {
    /// * `request_timeout` - bound on each HTTP call and on the wait for a
    ///   prompt to finish.
    pub fn new(profiles_root: impl Into<PathBuf>, request_timeout: Duration) -> Self {
        Self {
            profiles_root: profiles_root.into(),
            request_timeout,
            reconnect: ReconnectConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Token that aborts connection attempts still in progress.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    async fn open_session(&self, name: &str) -> Result<ComfyUISession, String> {
        let profile = ProfileConfig::load(&self.profiles_root, name).map_err(|e| e.to_string())?;
        let workflow = WorkflowTemplate::from_file(&profile.workflow, &profile.prompt_placeholder)
            .map_err(|e| e.to_string())?;
        let api = ComfyUIApi::new(profile.api_url.clone(), self.request_timeout)
            .map_err(|e| e.to_string())?;

        let client = ComfyUIClient::new(name, profile.ws_url.clone());
        let connection = connect_with_backoff(&client, &self.reconnect, &self.cancel)
            .await
            .map_err(|e| e.to_string())?;

        Ok(ComfyUISession::start(
            name,
            api,
            connection,
            workflow,
            self.request_timeout,
        ))
    }
}

#[async_trait]
impl SessionLauncher for ComfyUILauncher {
    async fn open(&self, profile: &str) -> Result<Arc<dyn GenerativeSession>, SessionError> {
        match self.open_session(profile).await {
            Ok(session) => {
                tracing::info!(profile, "Session opened");
                Ok(Arc::new(session))
            }
            Err(reason) => Err(SessionError::Open {
                profile: profile.to_string(),
                reason,
            }),
        }
    }
}
