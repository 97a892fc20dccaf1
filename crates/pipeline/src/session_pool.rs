//! One open session per profile with pending work.
//!
//! Sessions are opened one after another with a stagger between opens. A
//! profile whose session fails to open is reported and left out; its
//! siblings proceed. Each session is closed as soon as its profile is
//! finished, and whatever is still open is closed at the end of the base.

use std::sync::Arc;
use std::time::Duration;

use reelsmith_core::session::{GenerativeSession, SessionLauncher};

use crate::events::{EventBus, PipelineEvent};

pub struct SessionPool {
    base: String,
    sessions: Vec<(String, Arc<dyn GenerativeSession>)>,
    /// Profiles whose session failed to open.
    skipped: Vec<String>,
}

impl SessionPool {
    /// Open a session for every profile in `profiles`, in order.
    pub async fn open(
        launcher: &dyn SessionLauncher,
        base: &str,
        profiles: &[String],
        stagger: Duration,
        events: &EventBus,
    ) -> Self {
        let mut pool = Self {
            base: base.to_string(),
            sessions: Vec::with_capacity(profiles.len()),
            skipped: Vec::new(),
        };

        for (index, profile) in profiles.iter().enumerate() {
            if index > 0 && !stagger.is_zero() {
                tokio::time::sleep(stagger).await;
            }
            match launcher.open(profile).await {
                Ok(session) => {
                    tracing::info!(base, profile = %profile, "Session ready");
                    pool.sessions.push((profile.clone(), session));
                }
                Err(e) => {
                    tracing::warn!(base, profile = %profile, error = %e, "Skipping profile");
                    events.publish(PipelineEvent::ProfileSkipped {
                        base: base.to_string(),
                        profile: profile.clone(),
                        reason: e.to_string(),
                    });
                    pool.skipped.push(profile.clone());
                }
            }
        }
        pool
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn get(&self, profile: &str) -> Option<Arc<dyn GenerativeSession>> {
        self.sessions
            .iter()
            .find(|(name, _)| name == profile)
            .map(|(_, session)| Arc::clone(session))
    }

    /// Profiles with an open session, in opening order.
    pub fn open_profiles(&self) -> Vec<String> {
        self.sessions.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    // ── Closing ──────────────────────────────────────────────────────

    /// Close one profile's session. Unknown or already closed is a no-op.
    pub async fn close(&mut self, profile: &str) {
        let Some(index) = self.sessions.iter().position(|(name, _)| name == profile) else {
            return;
        };
        let (name, session) = self.sessions.remove(index);
        if let Err(e) = session.close().await {
            tracing::warn!(base = %self.base, profile = %name, error = %e, "Session close failed");
        } else {
            tracing::info!(base = %self.base, profile = %name, "Session closed");
        }
    }

    pub async fn close_all(&mut self) {
        for profile in self.open_profiles() {
            self.close(&profile).await;
        }
    }
}
