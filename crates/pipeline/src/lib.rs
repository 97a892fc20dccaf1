//! Scene-image scheduling engine.
//!
//! For each base: plan which profile handles which scenes, open one session
//! per profile that still has work, drain each profile's scenes with a
//! bounded worker pool, then offer retry rounds for whatever the artifact
//! store still reports missing. Progress and completion are written to the
//! status store as the run goes.

pub mod artifacts;
pub mod config;
pub mod error;
pub mod events;
pub mod plan;
pub mod queue;
pub mod retry;
pub mod runner;
pub mod session_pool;
pub mod worker_pool;

pub use artifacts::{ArtifactStore, DiskArtifactStore, MemoryArtifactStore};
pub use config::PipelineConfig;
pub use error::PipelineError;
pub use events::{EventBus, PipelineEvent};
pub use retry::{ApprovalGate, ApprovalRequest, RetryPolicy};
pub use runner::{run_base, BaseOutcome, RunContext};
