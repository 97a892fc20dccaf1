//! ComfyUI-backed generative sessions.
//!
//! Provides typed WebSocket message parsing, the HTTP API wrapper, profile
//! configuration, workflow templating and a [`GenerativeSession`]
//! implementation that submits one workflow per prompt and waits for its
//! images.
//!
//! [`GenerativeSession`]: reelsmith_core::session::GenerativeSession

pub mod api;
pub mod client;
pub mod launcher;
pub mod messages;
pub mod processor;
pub mod profile;
pub mod reconnect;
pub mod session;
pub mod workflow;

pub use launcher::ComfyUILauncher;
pub use profile::ProfileConfig;
pub use session::ComfyUISession;
