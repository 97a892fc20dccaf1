//! Processing of one base from plan to final status.

use std::collections::HashMap;
use std::sync::Arc;

use reelsmith_core::failure_tally::FailureTally;
use reelsmith_core::session::SessionLauncher;
use reelsmith_core::stage::{Stage, StageStatus};
use reelsmith_core::types::SceneId;
use reelsmith_db::StatusStore;
use tokio::sync::Mutex;

use crate::artifacts::{split_complete, ArtifactStore};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::events::{EventBus, PipelineEvent};
use crate::plan::{load_base_plan, BasePlan};
use crate::retry::{retry_until_settled, ApprovalGate};
use crate::session_pool::SessionPool;
use crate::worker_pool::{jobs_for, run_round, SharedTally};

/// Pending ids reported per profile before the first round.
const PENDING_SAMPLE: usize = 10;

/// Shared handles every component of a run works through.
#[derive(Clone)]
pub struct RunContext {
    pub store: Arc<StatusStore>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub events: Arc<EventBus>,
    pub config: Arc<PipelineConfig>,
}

/// How a base ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaseOutcome {
    /// Every planned scene is stored; images are `done`.
    Done { total: usize },
    /// Some scenes are still missing; images stay `in_progress`.
    Partial { missing: usize, high_water: SceneId },
    /// The base could not be planned; images hold `error:<reason>`.
    Failed(String),
}

/// Run image acquisition for `base` with the configured `profiles`.
///
/// Input problems end as [`BaseOutcome::Failed`]; only status store
/// failures are returned as errors.
pub async fn run_base(
    ctx: &RunContext,
    launcher: &dyn SessionLauncher,
    gate: &ApprovalGate,
    base: &str,
    profiles: &[String],
) -> Result<BaseOutcome, PipelineError> {
    ctx.store.ensure(base).await?;
    gate.forget(base).await;
    ctx.events.publish(PipelineEvent::BaseStarted {
        base: base.to_string(),
    });

    let plan = match load_base_plan(&ctx.config.suggestions_root, base, profiles).await {
        Ok(plan) => plan,
        Err(e) => {
            tracing::warn!(base, error = %e, "Cannot plan base");
            let reason = e.status_reason().to_string();
            let status = StageStatus::error(&reason);
            ctx.store.update(base, Stage::Images, status.clone(), None).await?;
            finish(ctx, base, &status, 0);
            return Ok(BaseOutcome::Failed(reason));
        }
    };
    for profile in &plan.missing {
        ctx.events.publish(PipelineEvent::ProfileSkipped {
            base: base.to_string(),
            profile: profile.clone(),
            reason: "no profile directory".to_string(),
        });
    }

    let pending = pending_by_profile(ctx, base, &plan).await;
    let max_id = plan
        .assignments
        .iter()
        .filter_map(|(_, scenes)| scenes.keys().next_back().copied())
        .max()
        .unwrap_or(0);

    if pending.is_empty() {
        tracing::info!(base, scenes = plan.total_scenes(), "Every scene already stored");
        return complete(ctx, base, plan.total_scenes(), max_id).await;
    }

    ctx.store
        .update(base, Stage::Images, StageStatus::InProgress, None)
        .await?;

    let pending_profiles: Vec<String> = pending.iter().map(|(p, _)| p.clone()).collect();
    let mut pool = SessionPool::open(
        launcher,
        base,
        &pending_profiles,
        ctx.config.session_stagger,
        &ctx.events,
    )
    .await;

    let scenes: HashMap<String, _> = plan.assignments.iter().cloned().collect();
    let tally: SharedTally = Arc::new(Mutex::new(FailureTally::default()));

    // First pass over every opened profile at once.
    let first_pass: Vec<_> = pending
        .iter()
        .filter_map(|(profile, ids)| {
            let session = pool.get(profile)?;
            let jobs = scenes
                .get(profile)
                .map(|map| jobs_for(map, ids))
                .unwrap_or_default();
            Some((profile.clone(), session, jobs))
        })
        .collect();
    let remaining: Vec<(String, Vec<SceneId>)> =
        run_round(ctx, &mut pool, base, 0, first_pass, &tally)
            .await
            .into_iter()
            .map(|(profile, report)| (profile, report.remaining))
            .collect();

    retry_until_settled(ctx, gate, &mut pool, base, &scenes, remaining, &tally).await;
    pool.close_all().await;

    report_failures(ctx, base, &tally).await;

    let all_ids = plan
        .assignments
        .iter()
        .flat_map(|(_, scenes)| scenes.keys().copied());
    let (stored, missing) = split_complete(ctx.artifacts.as_ref(), base, all_ids).await;

    if missing.is_empty() {
        return complete(ctx, base, plan.total_scenes(), max_id).await;
    }

    let stored_max = stored.iter().copied().max().unwrap_or(0);
    let record = ctx
        .store
        .update_with(base, |record| {
            record.images = StageStatus::InProgress;
            record.images_saved = record.images_saved.max(stored_max);
        })
        .await?;
    tracing::warn!(
        base,
        missing = missing.len(),
        high_water = record.images_saved,
        "Base left in progress",
    );
    finish(ctx, base, &record.images, record.images_saved);
    Ok(BaseOutcome::Partial {
        missing: missing.len(),
        high_water: record.images_saved,
    })
}

/// Ids per profile the artifact store does not have yet, in plan order.
async fn pending_by_profile(
    ctx: &RunContext,
    base: &str,
    plan: &BasePlan,
) -> Vec<(String, Vec<SceneId>)> {
    let mut pending = Vec::new();
    for (profile, scenes) in &plan.assignments {
        let (_, missing) =
            split_complete(ctx.artifacts.as_ref(), base, scenes.keys().copied()).await;
        if missing.is_empty() {
            tracing::info!(base, profile = %profile, "Profile already complete");
            ctx.events.publish(PipelineEvent::ProfileComplete {
                base: base.to_string(),
                profile: profile.clone(),
            });
            continue;
        }
        tracing::info!(
            base,
            profile = %profile,
            pending = missing.len(),
            first = ?&missing[..missing.len().min(PENDING_SAMPLE)],
            "Scenes pending",
        );
        ctx.events.publish(PipelineEvent::PendingSummary {
            base: base.to_string(),
            profile: profile.clone(),
            pending: missing.len(),
            sample: missing.iter().take(PENDING_SAMPLE).copied().collect(),
        });
        pending.push((profile.clone(), missing));
    }
    pending
}

async fn complete(
    ctx: &RunContext,
    base: &str,
    total: usize,
    max_id: SceneId,
) -> Result<BaseOutcome, PipelineError> {
    let record = ctx
        .store
        .update_with(base, |record| {
            record.images = StageStatus::Done;
            record.images_saved = max_id;
        })
        .await?;
    tracing::info!(base, scenes = total, images_saved = max_id, "Base finished");
    finish(ctx, base, &record.images, record.images_saved);
    Ok(BaseOutcome::Done { total })
}

async fn report_failures(ctx: &RunContext, base: &str, tally: &SharedTally) {
    let lines = {
        let mut tally = tally.lock().await;
        let lines = tally.report_lines();
        tally.clear();
        lines
    };
    if lines.is_empty() {
        return;
    }
    for line in &lines {
        tracing::warn!(base, "{line}");
    }
    ctx.events.publish(PipelineEvent::FailureReport {
        base: base.to_string(),
        lines,
    });
}

fn finish(ctx: &RunContext, base: &str, status: &StageStatus, images_saved: SceneId) {
    ctx.events.publish(PipelineEvent::BaseFinished {
        base: base.to_string(),
        status: status.to_string(),
        images_saved,
    });
}
