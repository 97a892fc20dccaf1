//! Engine settings for one run.

use std::path::PathBuf;
use std::time::Duration;

/// Upper bound on concurrent workers sharing one session.
pub const MAX_WORKERS_PER_PROFILE: usize = 4;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root holding one suggestion directory per base.
    pub suggestions_root: PathBuf,
    /// Concurrent workers per session, `1..=MAX_WORKERS_PER_PROFILE`.
    pub workers_per_profile: usize,
    /// Bounded wait for one scene's artifacts.
    pub request_timeout: Duration,
    /// Delay between consecutive session opens.
    pub session_stagger: Duration,
    /// Style text prepended to every scene prompt. May be empty.
    pub style_pattern: String,
}

impl PipelineConfig {
    pub fn new(suggestions_root: impl Into<PathBuf>) -> Self {
        Self {
            suggestions_root: suggestions_root.into(),
            workers_per_profile: 2,
            request_timeout: Duration::from_secs(90),
            session_stagger: Duration::from_secs(1),
            style_pattern: String::new(),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers_per_profile = clamp_workers(workers);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_session_stagger(mut self, stagger: Duration) -> Self {
        self.session_stagger = stagger;
        self
    }

    pub fn with_style_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.style_pattern = pattern.into();
        self
    }

    /// The text actually submitted for a scene.
    pub fn compose_prompt(&self, scene_prompt: &str) -> String {
        let style = self.style_pattern.trim();
        if style.is_empty() {
            scene_prompt.to_string()
        } else {
            format!("{style} {scene_prompt}")
        }
    }
}

pub fn clamp_workers(workers: usize) -> usize {
    workers.clamp(1, MAX_WORKERS_PER_PROFILE)
}
