//! WebSocket message processing loop.
//!
//! Reads frames from a profile's ComfyUI socket, parses them into
//! [`ComfyUIMessage`] values and hands terminal outcomes to whoever is
//! waiting on that prompt through the [`CompletionRouter`].

use std::collections::{HashMap, HashSet};

use futures::{SinkExt, StreamExt};
use tokio::sync::{oneshot, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::client::WsStream;
use crate::messages::{parse_message, ComfyUIMessage, PromptOutcome};

/// Routes prompt outcomes from the socket to waiting requests.
///
/// An outcome that arrives before anyone waits for it is buffered, so a
/// fast prompt cannot finish "between" submission and registration.
#[derive(Default)]
pub struct CompletionRouter {
    state: Mutex<RouterState>,
}

#[derive(Default)]
struct RouterState {
    waiters: HashMap<String, oneshot::Sender<PromptOutcome>>,
    finished: HashMap<String, PromptOutcome>,
    /// Prompts given up on; their late outcome is dropped on arrival.
    forgotten: HashSet<String>,
    closed: bool,
}

impl CompletionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in `prompt_id`.
    ///
    /// The receiver errors when the socket closes before an outcome
    /// arrives.
    pub async fn wait_for(&self, prompt_id: &str) -> oneshot::Receiver<PromptOutcome> {
        let (tx, rx) = oneshot::channel();
        let mut state = self.state.lock().await;
        if let Some(outcome) = state.finished.remove(prompt_id) {
            let _ = tx.send(outcome);
        } else if !state.closed {
            state.waiters.insert(prompt_id.to_string(), tx);
        }
        rx
    }

    /// Deliver an outcome for `prompt_id`.
    pub async fn resolve(&self, prompt_id: &str, outcome: PromptOutcome) {
        let mut state = self.state.lock().await;
        if state.forgotten.remove(prompt_id) {
            tracing::debug!(prompt_id, "Dropping outcome of abandoned prompt");
            return;
        }
        match state.waiters.remove(prompt_id) {
            Some(tx) => {
                let _ = tx.send(outcome);
            }
            None => {
                state.finished.insert(prompt_id.to_string(), outcome);
            }
        }
    }

    /// Drop any record of `prompt_id` (after a timeout). An outcome that
    /// arrives later is discarded instead of buffered.
    pub async fn forget(&self, prompt_id: &str) {
        let mut state = self.state.lock().await;
        state.waiters.remove(prompt_id);
        if state.finished.remove(prompt_id).is_none() {
            state.forgotten.insert(prompt_id.to_string());
        }
    }

    /// Fail every pending waiter and refuse new ones.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        state.closed = true;
        state.waiters.clear();
        state.forgotten.clear();
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }
}

/// Process frames until the socket closes, errors, or `cancel` fires.
///
/// The router is closed on exit so that pending requests fail fast.
pub async fn process_messages(
    mut ws_stream: WsStream,
    profile: String,
    router: std::sync::Arc<CompletionRouter>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = ws_stream.send(Message::Close(None)).await;
                tracing::debug!(profile = %profile, "ComfyUI socket closed by session");
                break;
            }
            next = ws_stream.next() => next,
        };

        match next {
            Some(Ok(Message::Text(text))) => {
                handle_text_message(&text, &profile, &router).await;
            }
            Some(Ok(Message::Binary(_))) => {
                tracing::trace!(profile = %profile, "Ignoring binary message (preview image)");
            }
            Some(Ok(Message::Close(frame))) => {
                tracing::info!(profile = %profile, ?frame, "ComfyUI WebSocket closed");
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::error!(profile = %profile, error = %e, "WebSocket receive error");
                break;
            }
            None => break,
        }
    }

    router.close().await;
}

/// Dispatch a single text frame.
pub async fn handle_text_message(text: &str, profile: &str, router: &CompletionRouter) {
    let msg = match parse_message(text) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::warn!(
                profile,
                error = %e,
                raw_message = %text,
                "Failed to parse ComfyUI message",
            );
            return;
        }
    };

    if let Some((prompt_id, outcome)) = msg.outcome() {
        match &outcome {
            PromptOutcome::Finished => {
                tracing::debug!(profile, prompt_id, "Execution completed");
            }
            PromptOutcome::Failed(reason) => {
                tracing::warn!(profile, prompt_id, error = %reason, "Execution failed");
            }
        }
        router.resolve(prompt_id, outcome).await;
        return;
    }

    match msg {
        ComfyUIMessage::ExecutionStart(data) => {
            tracing::debug!(profile, prompt_id = %data.prompt_id, "Execution started");
        }
        ComfyUIMessage::Progress(data) => {
            tracing::trace!(profile, value = data.value, max = data.max, "Generation progress");
        }
        _ => {}
    }
}
