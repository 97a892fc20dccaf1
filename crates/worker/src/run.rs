//! `reelsmith run`: choose bases, profiles and a style pattern, then run
//! image acquisition base by base.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use indicatif::{MultiProgress, ProgressDrawTarget};
use reelsmith_comfyui::profile::list_profiles;
use reelsmith_comfyui::ComfyUILauncher;
use reelsmith_core::naming::validate_variant_count;
use reelsmith_core::session::SessionLauncher;
use reelsmith_db::StatusStore;
use reelsmith_pipeline::plan::candidate_bases;
use reelsmith_pipeline::retry::spawn_policy_responder;
use reelsmith_pipeline::{
    run_base, ApprovalGate, ArtifactStore, BaseOutcome, DiskArtifactStore, EventBus,
    PipelineConfig, RetryPolicy, RunContext,
};

use crate::cli::{RetryMode, RunArgs};
use crate::config::WorkerConfig;
use crate::progress::spawn_progress;
use crate::prompt::{choose_pattern, list_patterns, select, spawn_console_approver};

/// What happened to each selected base.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub outcomes: Vec<(String, BaseOutcome)>,
    /// Bases that stopped on a status store failure.
    pub failed: Vec<(String, String)>,
}

impl RunSummary {
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty() && self.failed.is_empty()
    }
}

/// Resolved choices for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    pub bases: Vec<String>,
    pub profiles: Vec<String>,
    pub pattern: Option<PathBuf>,
}

pub async fn run_command(config: &WorkerConfig, args: RunArgs) -> anyhow::Result<RunSummary> {
    let store = Arc::new(StatusStore::new(&config.manifest));
    let interactive = std::io::stdin().is_terminal();

    let Some(plan) = resolve_plan(config, &store, &args, interactive).await? else {
        return Ok(RunSummary::default());
    };

    let variants = match args.variants {
        Some(count) => {
            validate_variant_count(count)?;
            count
        }
        None => config.variants,
    };
    let workers = args.workers.unwrap_or(config.workers_per_profile);
    let style = match &plan.pattern {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading pattern {}", path.display()))?,
        None => String::new(),
    };

    let pipeline_config = PipelineConfig::new(&config.suggestions_root)
        .with_workers(workers)
        .with_request_timeout(config.request_timeout)
        .with_session_stagger(config.session_stagger)
        .with_style_pattern(style);
    let artifacts: Arc<dyn ArtifactStore> = Arc::new(DiskArtifactStore::new(
        &config.images_root,
        &config.artifact_extension,
        variants,
    ));
    let ctx = RunContext {
        store,
        artifacts,
        events: Arc::new(EventBus::default()),
        config: Arc::new(pipeline_config),
    };

    let progress = if interactive {
        MultiProgress::new()
    } else {
        MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
    };
    let renderer = spawn_progress(ctx.events.subscribe(), progress.clone());

    let (gate, requests) = ApprovalGate::channel(config.approval_timeout);
    let approver = match args.retry {
        RetryMode::Ask => spawn_console_approver(requests, progress.clone()),
        RetryMode::Always => spawn_policy_responder(
            requests,
            RetryPolicy::Always {
                max_rounds: args.max_rounds,
            },
        ),
        RetryMode::Never => spawn_policy_responder(requests, RetryPolicy::Never),
    };

    let launcher = ComfyUILauncher::new(&config.profiles_root, config.request_timeout);
    let summary = process_bases(&ctx, &launcher, &gate, &plan).await;

    launcher.cancel_token().cancel();
    drop(gate);
    let _ = approver.await;
    drop(ctx);
    let _ = renderer.await;
    Ok(summary)
}

/// Run every base in turn. A failing base never stops its siblings.
pub async fn process_bases(
    ctx: &RunContext,
    launcher: &dyn SessionLauncher,
    gate: &ApprovalGate,
    plan: &RunPlan,
) -> RunSummary {
    let mut summary = RunSummary::default();
    for base in &plan.bases {
        match run_base(ctx, launcher, gate, base, &plan.profiles).await {
            Ok(outcome) => {
                tracing::info!(base = %base, outcome = ?outcome, "Base processed");
                summary.outcomes.push((base.clone(), outcome));
            }
            Err(e) => {
                tracing::error!(base = %base, error = %e, "Base aborted");
                summary.failed.push((base.clone(), e.to_string()));
            }
        }
    }
    summary
}

/// Decide bases, profiles and pattern from flags, asking for whatever is
/// missing when `interactive`. `None` means the operator cancelled.
pub async fn resolve_plan(
    config: &WorkerConfig,
    store: &StatusStore,
    args: &RunArgs,
    interactive: bool,
) -> anyhow::Result<Option<RunPlan>> {
    let doc = store.load().await?;
    let candidates = candidate_bases(&doc, &config.suggestions_root).await?;

    let bases = if !args.bases.is_empty() {
        args.bases.clone()
    } else if args.all || !interactive {
        candidates
    } else {
        ask(|input, out| select("Bases ready for images:", &candidates, input, out))?
    };
    if bases.is_empty() {
        tracing::info!("No bases selected");
        return Ok(None);
    }
    for base in &bases {
        store.ensure(base).await?;
    }

    let available = list_profiles(&config.profiles_root)?;
    let profiles = if !args.profiles.is_empty() {
        let (known, unknown): (Vec<_>, Vec<_>) = args
            .profiles
            .iter()
            .cloned()
            .partition(|p| available.contains(p));
        for profile in unknown {
            tracing::warn!(profile = %profile, "Profile directory not found");
        }
        known
    } else if !interactive {
        available
    } else {
        ask(|input, out| select("Profiles:", &available, input, out))?
    };
    if profiles.is_empty() {
        anyhow::bail!("no profiles available under {}", config.profiles_root.display());
    }

    let pattern = if args.no_pattern {
        None
    } else if let Some(path) = &args.pattern {
        Some(path.clone())
    } else {
        let patterns = list_patterns(&config.patterns_dir)?;
        if interactive {
            ask(|input, out| choose_pattern(&patterns, input, out))?
        } else {
            patterns.into_iter().next()
        }
    };

    Ok(Some(RunPlan {
        bases,
        profiles,
        pattern,
    }))
}

fn ask<T>(
    prompt: impl FnOnce(&mut std::io::StdinLock<'static>, &mut std::io::Stderr) -> anyhow::Result<T>,
) -> anyhow::Result<T> {
    prompt(&mut std::io::stdin().lock(), &mut std::io::stderr())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    fn config(root: &Path) -> WorkerConfig {
        let mut config = WorkerConfig::from_lookup(|_| None).unwrap();
        config.manifest = root.join("manifest.json");
        config.suggestions_root = root.join("suggestions");
        config.profiles_root = root.join("profiles");
        config.patterns_dir = root.join("prompts");
        config
    }

    fn add_profile(root: &Path, name: &str) {
        let dir = root.join("profiles").join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("session.json"),
            r#"{"api_url":"http://127.0.0.1:8188","workflow":"wf.json"}"#,
        )
        .unwrap();
    }

    #[tokio::test]
    async fn headless_plan_takes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        std::fs::create_dir_all(dir.path().join("suggestions/ep1")).unwrap();
        add_profile(dir.path(), "b");
        add_profile(dir.path(), "a");
        std::fs::create_dir_all(dir.path().join("prompts")).unwrap();
        std::fs::write(dir.path().join("prompts/A_PATTERN.txt"), "Ink.").unwrap();

        let store = StatusStore::new(&config.manifest);
        let plan = resolve_plan(&config, &store, &RunArgs::default(), false)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(plan.bases, vec!["ep1"]);
        assert_eq!(plan.profiles, vec!["a", "b"]);
        assert_eq!(plan.pattern, Some(dir.path().join("prompts/A_PATTERN.txt")));
        assert!(store.get("ep1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn flags_narrow_the_plan() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        add_profile(dir.path(), "a");
        add_profile(dir.path(), "b");

        let args = RunArgs {
            bases: vec!["ep7".into()],
            profiles: vec!["b".into(), "ghost".into()],
            no_pattern: true,
            ..Default::default()
        };
        let store = StatusStore::new(&config.manifest);
        let plan = resolve_plan(&config, &store, &args, false).await.unwrap().unwrap();
        assert_eq!(plan.bases, vec!["ep7"]);
        assert_eq!(plan.profiles, vec!["b"]);
        assert_eq!(plan.pattern, None);
    }

    #[tokio::test]
    async fn nothing_to_do_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let store = StatusStore::new(&config.manifest);
        let plan = resolve_plan(&config, &store, &RunArgs::default(), false)
            .await
            .unwrap();
        assert!(plan.is_none());
    }

    #[tokio::test]
    async fn missing_profiles_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        std::fs::create_dir_all(dir.path().join("suggestions/ep1")).unwrap();
        let store = StatusStore::new(&config.manifest);
        let err = resolve_plan(&config, &store, &RunArgs::default(), false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no profiles"));
    }
}
