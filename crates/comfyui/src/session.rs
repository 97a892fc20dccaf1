//! [`GenerativeSession`] backed by one ComfyUI connection.
//!
//! Each `generate` call renders the profile's workflow with the prompt,
//! queues it under the session's client id, waits on the socket for the
//! prompt to finish, then downloads the images listed in its history.
//! Concurrent calls share the connection; outcomes are routed by prompt id.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reelsmith_core::session::{GeneratedArtifact, GenerativeSession, SessionError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::{history_images, ComfyUIApi, ComfyUIApiError};
use crate::client::ComfyUIConnection;
use crate::messages::PromptOutcome;
use crate::processor::{process_messages, CompletionRouter};
use crate::workflow::WorkflowTemplate;

pub struct ComfyUISession {
    profile: String,
    client_id: String,
    api: ComfyUIApi,
    workflow: WorkflowTemplate,
    router: Arc<CompletionRouter>,
    cancel: CancellationToken,
    reader: Mutex<Option<JoinHandle<()>>>,
    completion_wait: Duration,
}

impl ComfyUISession {
    /// Take ownership of `connection` and start reading its socket.
    pub fn start(
        profile: impl Into<String>,
        api: ComfyUIApi,
        connection: ComfyUIConnection,
        workflow: WorkflowTemplate,
        completion_wait: Duration,
    ) -> Self {
        let profile = profile.into();
        let router = Arc::new(CompletionRouter::new());
        let cancel = CancellationToken::new();

        let reader = tokio::spawn(process_messages(
            connection.ws_stream,
            profile.clone(),
            Arc::clone(&router),
            cancel.clone(),
        ));

        Self {
            profile,
            client_id: connection.client_id,
            api,
            workflow,
            router,
            cancel,
            reader: Mutex::new(Some(reader)),
            completion_wait,
        }
    }

    async fn wait_for_completion(&self, prompt_id: &str) -> Result<(), SessionError> {
        let rx = self.router.wait_for(prompt_id).await;
        match tokio::time::timeout(self.completion_wait, rx).await {
            Ok(Ok(PromptOutcome::Finished)) => Ok(()),
            Ok(Ok(PromptOutcome::Failed(reason))) => Err(SessionError::Failed(reason)),
            Ok(Err(_)) => Err(SessionError::Transport(
                "socket closed before the prompt finished".to_string(),
            )),
            Err(_) => {
                self.router.forget(prompt_id).await;
                if let Err(e) = self.api.cancel_execution(prompt_id).await {
                    tracing::debug!(
                        profile = %self.profile,
                        prompt_id,
                        error = %e,
                        "Failed to dequeue timed-out prompt",
                    );
                }
                Err(SessionError::Timeout(self.completion_wait))
            }
        }
    }
}

fn transport(e: ComfyUIApiError) -> SessionError {
    SessionError::Transport(e.to_string())
}

#[async_trait]
impl GenerativeSession for ComfyUISession {
    fn profile(&self) -> &str {
        &self.profile
    }

    async fn generate(&self, prompt: &str) -> Result<Vec<GeneratedArtifact>, SessionError> {
        if self.cancel.is_cancelled() || self.router.is_closed().await {
            return Err(SessionError::Closed);
        }

        let graph = self.workflow.render(prompt);
        let submitted = self
            .api
            .submit_workflow(&graph, &self.client_id)
            .await
            .map_err(transport)?;
        tracing::debug!(
            profile = %self.profile,
            prompt_id = %submitted.prompt_id,
            queue_position = submitted.number,
            "Workflow queued",
        );

        self.wait_for_completion(&submitted.prompt_id).await?;

        let history = self
            .api
            .get_history(&submitted.prompt_id)
            .await
            .map_err(transport)?;
        let images = history_images(&history, &submitted.prompt_id);
        if images.is_empty() {
            return Err(SessionError::EmptyArtifacts);
        }

        let mut artifacts = Vec::with_capacity(images.len());
        for image in images {
            let bytes = self.api.fetch_image(&image).await.map_err(transport)?;
            if bytes.is_empty() {
                return Err(SessionError::Malformed(format!(
                    "image '{}' has no content",
                    image.filename
                )));
            }
            artifacts.push(GeneratedArtifact {
                file_name: Some(image.filename),
                bytes,
            });
        }
        Ok(artifacts)
    }

    async fn close(&self) -> Result<(), SessionError> {
        self.cancel.cancel();
        if let Some(reader) = self.reader.lock().await.take() {
            if let Err(e) = reader.await {
                tracing::warn!(profile = %self.profile, error = %e, "Socket reader ended abnormally");
            }
            tracing::info!(profile = %self.profile, "ComfyUI session closed");
        }
        Ok(())
    }
}

impl Drop for ComfyUISession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
