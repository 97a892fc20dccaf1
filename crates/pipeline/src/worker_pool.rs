//! Bounded worker pool draining one profile's scenes through its session.
//!
//! The producer enqueues every job, waits until all of them are processed,
//! then pushes one shutdown marker per worker. A failed attempt is recorded
//! in the failure tally and never stops its worker. What still needs work
//! afterwards is decided by the artifact probe, not by attempt results.

use std::sync::Arc;

use reelsmith_core::failure_tally::FailureTally;
use reelsmith_core::session::{GenerativeSession, SessionError};
use reelsmith_core::suggestions::SceneMap;
use reelsmith_core::types::SceneId;
use futures::future::join_all;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;

use crate::artifacts::split_complete;
use crate::error::SceneError;
use crate::events::PipelineEvent;
use crate::queue::{QueueItem, WorkQueue};
use crate::runner::RunContext;
use crate::session_pool::SessionPool;

/// Shared failure tally for one base.
pub type SharedTally = Arc<Mutex<FailureTally>>;

/// One scene to attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneJob {
    pub scene_id: SceneId,
    /// Scene prompt without the style pattern.
    pub prompt: String,
}

/// Build jobs for `ids`, taking prompts from `scenes`. Unknown ids are skipped.
pub fn jobs_for(scenes: &SceneMap, ids: &[SceneId]) -> Vec<SceneJob> {
    ids.iter()
        .filter_map(|id| {
            scenes.get(id).map(|prompt| SceneJob {
                scene_id: *id,
                prompt: prompt.clone(),
            })
        })
        .collect()
}

/// Result of draining one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub attempted: Vec<SceneId>,
    /// Attempts that returned an error.
    pub failed: Vec<SceneId>,
    /// Attempted ids the artifact probe still reports incomplete.
    pub remaining: Vec<SceneId>,
}

struct WorkerScope {
    ctx: RunContext,
    session: Arc<dyn GenerativeSession>,
    base: String,
    round: u32,
    tally: SharedTally,
    queue: WorkQueue<SceneJob>,
    failed: Mutex<Vec<SceneId>>,
}

/// Run one batch per profile concurrently.
///
/// A profile whose batch leaves nothing missing has its session closed
/// right away, while sibling batches are still running. Reports come back
/// in input order.
pub async fn run_round(
    ctx: &RunContext,
    pool: &mut SessionPool,
    base: &str,
    round: u32,
    batches: Vec<(String, Arc<dyn GenerativeSession>, Vec<SceneJob>)>,
    tally: &SharedTally,
) -> Vec<(String, BatchReport)> {
    let (finished_tx, mut finished_rx) = mpsc::unbounded_channel::<String>();

    let running = join_all(batches.into_iter().map(|(profile, session, jobs)| {
        let finished = finished_tx.clone();
        let tally = Arc::clone(tally);
        async move {
            let report = run_batch(ctx, session, base, round, jobs, tally).await;
            if report.remaining.is_empty() {
                let _ = finished.send(profile.clone());
            }
            (profile, report)
        }
    }));
    drop(finished_tx);

    let closing = async {
        while let Some(profile) = finished_rx.recv().await {
            pool.close(&profile).await;
        }
    };

    let (reports, ()) = tokio::join!(running, closing);
    reports
}

/// Attempt every job once with up to `workers_per_profile` concurrent workers.
pub async fn run_batch(
    ctx: &RunContext,
    session: Arc<dyn GenerativeSession>,
    base: &str,
    round: u32,
    jobs: Vec<SceneJob>,
    tally: SharedTally,
) -> BatchReport {
    let profile = session.profile().to_string();
    if jobs.is_empty() {
        return BatchReport::default();
    }

    let attempted: Vec<SceneId> = jobs.iter().map(|job| job.scene_id).collect();
    let workers = ctx.config.workers_per_profile.clamp(1, jobs.len());

    ctx.events.publish(PipelineEvent::BatchStarted {
        base: base.to_string(),
        profile: profile.clone(),
        round,
        total: jobs.len(),
    });
    tracing::info!(base, profile = %profile, round, scenes = jobs.len(), workers, "Batch started");

    let scope = Arc::new(WorkerScope {
        ctx: ctx.clone(),
        session,
        base: base.to_string(),
        round,
        tally,
        queue: WorkQueue::new(),
        failed: Mutex::new(Vec::new()),
    });
    for job in jobs {
        scope.queue.put(job);
    }

    let mut set = JoinSet::new();
    for worker in 0..workers {
        let scope = Arc::clone(&scope);
        set.spawn(async move { worker_loop(scope, worker).await });
    }

    scope.queue.join().await;
    for _ in 0..workers {
        scope.queue.put_shutdown();
    }
    while let Some(result) = set.join_next().await {
        if let Err(e) = result {
            tracing::error!(base, profile = %profile, error = %e, "Worker task aborted");
        }
    }

    let failed = std::mem::take(&mut *scope.failed.lock().await);
    let (_, remaining) =
        split_complete(ctx.artifacts.as_ref(), base, attempted.iter().copied()).await;

    ctx.events.publish(PipelineEvent::BatchFinished {
        base: base.to_string(),
        profile: profile.clone(),
        round,
        remaining: remaining.len(),
    });
    tracing::info!(
        base,
        profile = %profile,
        round,
        attempted = attempted.len(),
        failed = failed.len(),
        remaining = remaining.len(),
        "Batch finished",
    );

    BatchReport {
        attempted,
        failed,
        remaining,
    }
}

async fn worker_loop(scope: Arc<WorkerScope>, worker: usize) {
    let profile = scope.session.profile().to_string();
    loop {
        let job = match scope.queue.get().await {
            QueueItem::Shutdown => {
                scope.queue.task_done();
                break;
            }
            QueueItem::Task(job) => job,
        };

        let scene_id = job.scene_id;
        let ok = match attempt(&scope, &job).await {
            Ok(mark) => {
                tracing::debug!(base = %scope.base, profile = %profile, worker, scene_id, mark, "Scene stored");
                true
            }
            Err(e) => {
                if matches!(e, SceneError::Store(_)) {
                    tracing::error!(base = %scope.base, profile = %profile, scene_id, error = %e, "Progress not persisted");
                } else {
                    tracing::warn!(base = %scope.base, profile = %profile, scene_id, error = %e, "Scene attempt failed");
                }
                scope.tally.lock().await.record(&profile, scene_id);
                scope.failed.lock().await.push(scene_id);
                false
            }
        };

        scope.ctx.events.publish(PipelineEvent::SceneAttempted {
            base: scope.base.clone(),
            profile: profile.clone(),
            round: scope.round,
            scene_id,
            ok,
        });
        scope.queue.task_done();
    }
}

/// Submit, wait, store, then raise the high-water mark.
async fn attempt(scope: &WorkerScope, job: &SceneJob) -> Result<SceneId, SceneError> {
    let config = &scope.ctx.config;
    let prompt = config.compose_prompt(&job.prompt);

    let artifacts = tokio::time::timeout(config.request_timeout, scope.session.generate(&prompt))
        .await
        .map_err(|_| SessionError::Timeout(config.request_timeout))??;
    if artifacts.is_empty() {
        return Err(SessionError::EmptyArtifacts.into());
    }

    scope
        .ctx
        .artifacts
        .save(&scope.base, job.scene_id, &artifacts)
        .await?;
    let mark = scope
        .ctx
        .store
        .raise_high_water(&scope.base, job.scene_id)
        .await?;
    Ok(mark)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::time::Duration;

    use async_trait::async_trait;
    use reelsmith_core::session::GeneratedArtifact;
    use reelsmith_db::StatusStore;

    use super::*;
    use crate::artifacts::MemoryArtifactStore;
    use crate::config::PipelineConfig;
    use crate::events::EventBus;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    /// Fails every prompt containing one of `failing`, sleeps on `slow`.
    struct ScriptedSession {
        failing: HashSet<String>,
        slow: Option<String>,
        prompts: std::sync::Mutex<Vec<String>>,
    }

    impl ScriptedSession {
        fn new(failing: &[&str]) -> Self {
            Self {
                failing: failing.iter().map(|s| s.to_string()).collect(),
                slow: None,
                prompts: std::sync::Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl GenerativeSession for ScriptedSession {
        fn profile(&self) -> &str {
            "a"
        }

        async fn generate(&self, prompt: &str) -> Result<Vec<GeneratedArtifact>, SessionError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if self.slow.as_deref().is_some_and(|s| prompt.ends_with(s)) {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            if self.failing.iter().any(|f| prompt.ends_with(f.as_str())) {
                return Err(SessionError::Failed("rejected".into()));
            }
            if prompt.ends_with("empty") {
                return Ok(Vec::new());
            }
            Ok(vec![GeneratedArtifact::new(PNG.to_vec())])
        }

        async fn close(&self) -> Result<(), SessionError> {
            Ok(())
        }
    }

    fn context(dir: &std::path::Path, config: PipelineConfig) -> (RunContext, Arc<MemoryArtifactStore>) {
        let artifacts = Arc::new(MemoryArtifactStore::new(1));
        let ctx = RunContext {
            store: Arc::new(StatusStore::new(dir.join("status.json"))),
            artifacts: artifacts.clone(),
            events: Arc::new(EventBus::default()),
            config: Arc::new(config),
        };
        (ctx, artifacts)
    }

    fn jobs(names: &[(SceneId, &str)]) -> Vec<SceneJob> {
        names
            .iter()
            .map(|(id, prompt)| SceneJob {
                scene_id: *id,
                prompt: prompt.to_string(),
            })
            .collect()
    }

    // -- batches ------------------------------------------------------------

    #[tokio::test]
    async fn one_failure_does_not_stop_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, artifacts) = context(dir.path(), PipelineConfig::new("s").with_workers(2));
        let session = Arc::new(ScriptedSession::new(&["bad"]));
        let tally: SharedTally = Arc::default();

        let report = run_batch(
            &ctx,
            session.clone(),
            "ep1",
            0,
            jobs(&[(1, "one"), (2, "bad"), (3, "three"), (4, "four")]),
            tally.clone(),
        )
        .await;

        assert_eq!(report.attempted, vec![1, 2, 3, 4]);
        assert_eq!(report.failed, vec![2]);
        assert_eq!(report.remaining, vec![2]);
        assert_eq!(artifacts.complete_count("ep1").await, 3);
        assert_eq!(tally.lock().await.get("a").unwrap().sample, vec![2]);
        assert_eq!(session.prompts.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn empty_artifact_list_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _) = context(dir.path(), PipelineConfig::new("s"));
        let report = run_batch(
            &ctx,
            Arc::new(ScriptedSession::new(&[])),
            "ep1",
            0,
            jobs(&[(1, "empty")]),
            Arc::default(),
        )
        .await;
        assert_eq!(report.failed, vec![1]);
        assert_eq!(report.remaining, vec![1]);
    }

    #[tokio::test]
    async fn style_pattern_reaches_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _) = context(
            dir.path(),
            PipelineConfig::new("s").with_style_pattern("Ink sketch."),
        );
        let session = Arc::new(ScriptedSession::new(&[]));
        run_batch(&ctx, session.clone(), "ep1", 0, jobs(&[(1, "a door")]), Arc::default()).await;
        assert_eq!(*session.prompts.lock().unwrap(), vec!["Ink sketch. a door".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_scene_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _) = context(
            dir.path(),
            PipelineConfig::new("s").with_request_timeout(Duration::from_secs(1)),
        );
        let mut session = ScriptedSession::new(&[]);
        session.slow = Some("slow".into());

        let report = run_batch(
            &ctx,
            Arc::new(session),
            "ep1",
            0,
            jobs(&[(1, "slow"), (2, "fast")]),
            Arc::default(),
        )
        .await;
        assert_eq!(report.failed, vec![1]);
        assert_eq!(report.remaining, vec![1]);
    }

    #[tokio::test]
    async fn high_water_mark_tracks_largest_stored_id() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _) = context(dir.path(), PipelineConfig::new("s").with_workers(4));
        ctx.store.ensure("ep1").await.unwrap();

        run_batch(
            &ctx,
            Arc::new(ScriptedSession::new(&["bad"])),
            "ep1",
            0,
            jobs(&[(1, "one"), (2, "two"), (3, "three"), (4, "bad")]),
            Arc::default(),
        )
        .await;
        let record = ctx.store.get("ep1").await.unwrap().unwrap();
        assert_eq!(record.images_saved, 3);
    }

    #[tokio::test]
    async fn attempts_are_announced() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _) = context(dir.path(), PipelineConfig::new("s"));
        let mut rx = ctx.events.subscribe();

        run_batch(
            &ctx,
            Arc::new(ScriptedSession::new(&[])),
            "ep1",
            2,
            jobs(&[(7, "x")]),
            Arc::default(),
        )
        .await;

        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            seen.push(event);
        }
        assert!(seen.contains(&PipelineEvent::SceneAttempted {
            base: "ep1".into(),
            profile: "a".into(),
            round: 2,
            scene_id: 7,
            ok: true,
        }));
        assert!(matches!(seen.last(), Some(PipelineEvent::BatchFinished { remaining: 0, .. })));
    }

    #[test]
    fn jobs_skip_unknown_ids() {
        let scenes: SceneMap = [(1, "one".to_string()), (3, "three".to_string())].into();
        let built = jobs_for(&scenes, &[3, 2, 1]);
        assert_eq!(built.iter().map(|j| j.scene_id).collect::<Vec<_>>(), vec![3, 1]);
    }
}
