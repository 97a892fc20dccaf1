//! Progress events published while a base is processed.
//!
//! [`EventBus`] wraps a `tokio::sync::broadcast` channel. The engine never
//! waits on subscribers; a lagging or absent subscriber only loses events.

use reelsmith_core::types::SceneId;
use serde::Serialize;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// PipelineEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    BaseStarted {
        base: String,
    },
    /// A profile's scenes are all stored already; no session is opened.
    ProfileComplete {
        base: String,
        profile: String,
    },
    /// A profile is left out of this base.
    ProfileSkipped {
        base: String,
        profile: String,
        reason: String,
    },
    /// Scenes still missing for a profile before the first round.
    PendingSummary {
        base: String,
        profile: String,
        pending: usize,
        /// First pending ids, capped.
        sample: Vec<SceneId>,
    },
    BatchStarted {
        base: String,
        profile: String,
        round: u32,
        total: usize,
    },
    /// One attempt finished, successfully or not.
    SceneAttempted {
        base: String,
        profile: String,
        round: u32,
        scene_id: SceneId,
        ok: bool,
    },
    BatchFinished {
        base: String,
        profile: String,
        round: u32,
        remaining: usize,
    },
    /// Failure tally lines for the base, one per profile.
    FailureReport {
        base: String,
        lines: Vec<String>,
    },
    BaseFinished {
        base: String,
        status: String,
        images_saved: SceneId,
    },
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

const DEFAULT_CAPACITY: usize = 1024;

pub struct EventBus {
    sender: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers; dropped when there are none.
    pub fn publish(&self, event: PipelineEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
