//! End-to-end runs of one base against fake sessions.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use reelsmith_core::session::{GeneratedArtifact, GenerativeSession, SessionError, SessionLauncher};
use reelsmith_core::stage::StageStatus;
use reelsmith_db::StatusStore;
use reelsmith_pipeline::retry::spawn_policy_responder;
use reelsmith_pipeline::{
    run_base, ApprovalGate, ArtifactStore, BaseOutcome, DiskArtifactStore, EventBus,
    MemoryArtifactStore, PipelineConfig, PipelineEvent, RetryPolicy, RunContext,
};

const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Behaviour {
    /// Prompts that fail on their first attempt only.
    fail_once: Mutex<HashSet<String>>,
    /// Prompts that always fail.
    fail_always: HashSet<String>,
    /// Every submitted prompt.
    calls: Mutex<Vec<String>>,
    /// Time each generate call takes, per profile.
    delays: HashMap<String, Duration>,
    /// Closed sessions with the time of closing.
    closed: Mutex<Vec<(String, tokio::time::Instant)>>,
}

struct FakeSession {
    profile: String,
    behaviour: Arc<Behaviour>,
}

#[async_trait]
impl GenerativeSession for FakeSession {
    fn profile(&self) -> &str {
        &self.profile
    }

    async fn generate(&self, prompt: &str) -> Result<Vec<GeneratedArtifact>, SessionError> {
        self.behaviour.calls.lock().unwrap().push(prompt.to_string());
        match self.behaviour.delays.get(&self.profile) {
            Some(delay) => tokio::time::sleep(*delay).await,
            None => tokio::task::yield_now().await,
        }
        if self.behaviour.fail_always.contains(prompt)
            || self.behaviour.fail_once.lock().unwrap().remove(prompt)
        {
            return Err(SessionError::Failed(format!("{prompt} rejected")));
        }
        Ok(vec![GeneratedArtifact::new(PNG.to_vec())])
    }

    async fn close(&self) -> Result<(), SessionError> {
        self.behaviour
            .closed
            .lock()
            .unwrap()
            .push((self.profile.clone(), tokio::time::Instant::now()));
        Ok(())
    }
}

struct FakeLauncher {
    behaviour: Arc<Behaviour>,
    broken: HashSet<String>,
    opened: Mutex<Vec<String>>,
}

impl FakeLauncher {
    fn new(behaviour: Behaviour) -> Self {
        Self {
            behaviour: Arc::new(behaviour),
            broken: HashSet::new(),
            opened: Mutex::new(Vec::new()),
        }
    }

    fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }

    fn calls(&self) -> Vec<String> {
        self.behaviour.calls.lock().unwrap().clone()
    }

    fn closed(&self) -> Vec<(String, tokio::time::Instant)> {
        self.behaviour.closed.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionLauncher for FakeLauncher {
    async fn open(&self, profile: &str) -> Result<Arc<dyn GenerativeSession>, SessionError> {
        if self.broken.contains(profile) {
            return Err(SessionError::Open {
                profile: profile.to_string(),
                reason: "login required".into(),
            });
        }
        self.opened.lock().unwrap().push(profile.to_string());
        Ok(Arc::new(FakeSession {
            profile: profile.to_string(),
            behaviour: Arc::clone(&self.behaviour),
        }))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn write_suggestions(root: &Path, base: &str, file: &str, ids: impl IntoIterator<Item = u32>) {
    let dir = root.join(base);
    std::fs::create_dir_all(&dir).unwrap();
    let text: String = ids
        .into_iter()
        .map(|id| format!("Scene {id}\nOriginal: line {id}\nSuggestion: prompt {id}\n\n"))
        .collect();
    std::fs::write(dir.join(file), text).unwrap();
}

fn context(root: &Path, artifacts: Arc<dyn ArtifactStore>) -> RunContext {
    let config = PipelineConfig::new(root.join("suggestions"))
        .with_workers(2)
        .with_session_stagger(Duration::ZERO)
        .with_request_timeout(Duration::from_secs(5));
    RunContext {
        store: Arc::new(StatusStore::new(root.join("manifest.json"))),
        artifacts,
        events: Arc::new(EventBus::default()),
        config: Arc::new(config),
    }
}

fn profiles(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn policy_gate(policy: RetryPolicy) -> ApprovalGate {
    let (gate, rx) = ApprovalGate::channel(None);
    spawn_policy_responder(rx, policy);
    gate
}

fn prompts(ids: &[u32]) -> HashSet<String> {
    ids.iter().map(|id| format!("prompt {id}")).collect()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn seven_scenes_two_profiles_with_one_retry() {
    let dir = tempfile::tempdir().unwrap();
    let suggestions = dir.path().join("suggestions");
    write_suggestions(&suggestions, "ep1", "ep1.txt", 1..=7);

    let images = dir.path().join("images");
    let ctx = context(dir.path(), Arc::new(DiskArtifactStore::new(&images, "png", 1)));
    let launcher = FakeLauncher::new(Behaviour {
        fail_once: Mutex::new(prompts(&[3])),
        ..Default::default()
    });
    let gate = policy_gate(RetryPolicy::Always { max_rounds: None });

    let outcome = run_base(&ctx, &launcher, &gate, "ep1", &profiles(&["a", "b"]))
        .await
        .unwrap();

    assert_eq!(outcome, BaseOutcome::Done { total: 7 });
    for id in 1..=7 {
        assert!(images.join(format!("ep1/_01/{id:03}.png")).is_file(), "scene {id}");
    }
    let record = ctx.store.get("ep1").await.unwrap().unwrap();
    assert_eq!(record.images, StageStatus::Done);
    assert_eq!(record.images_saved, 7);

    let calls = launcher.calls();
    assert_eq!(calls.len(), 8);
    assert_eq!(calls.iter().filter(|c| *c == "prompt 3").count(), 2);
    assert_eq!(launcher.opened(), profiles(&["a", "b"]));
}

#[tokio::test(start_paused = true)]
async fn finished_profile_closes_while_sibling_is_busy() {
    let dir = tempfile::tempdir().unwrap();
    let suggestions = dir.path().join("suggestions");
    write_suggestions(&suggestions, "ep1", "ep1.txt", 1..=4);

    let mut ctx = context(dir.path(), Arc::new(MemoryArtifactStore::new(1)));
    ctx.config = Arc::new(
        PipelineConfig::new(&suggestions)
            .with_workers(2)
            .with_session_stagger(Duration::ZERO)
            .with_request_timeout(Duration::from_secs(600)),
    );
    let launcher = FakeLauncher::new(Behaviour {
        delays: HashMap::from([("b".to_string(), Duration::from_secs(60))]),
        ..Default::default()
    });
    let gate = policy_gate(RetryPolicy::Never);

    let started = tokio::time::Instant::now();
    let outcome = run_base(&ctx, &launcher, &gate, "ep1", &profiles(&["a", "b"]))
        .await
        .unwrap();
    assert_eq!(outcome, BaseOutcome::Done { total: 4 });

    let closed = launcher.closed();
    let order: Vec<&str> = closed.iter().map(|(p, _)| p.as_str()).collect();
    assert_eq!(order, vec!["a", "b"]);
    assert!(closed[0].1.duration_since(started) < Duration::from_secs(60));
    assert!(closed[1].1.duration_since(started) >= Duration::from_secs(60));
}

#[tokio::test]
async fn second_run_enqueues_nothing() {
    let dir = tempfile::tempdir().unwrap();
    write_suggestions(&dir.path().join("suggestions"), "ep1", "ep1.txt", 1..=5);
    let artifacts = Arc::new(MemoryArtifactStore::new(1));
    let ctx = context(dir.path(), artifacts.clone());
    let gate = policy_gate(RetryPolicy::Never);

    let first = FakeLauncher::new(Behaviour::default());
    run_base(&ctx, &first, &gate, "ep1", &profiles(&["a", "b"]))
        .await
        .unwrap();
    assert_eq!(first.calls().len(), 5);

    let second = FakeLauncher::new(Behaviour::default());
    let outcome = run_base(&ctx, &second, &gate, "ep1", &profiles(&["a", "b"]))
        .await
        .unwrap();
    assert_eq!(outcome, BaseOutcome::Done { total: 5 });
    assert!(second.calls().is_empty());
    assert!(second.opened().is_empty());
    assert_eq!(
        ctx.store.get("ep1").await.unwrap().unwrap().images,
        StageStatus::Done
    );
}

#[tokio::test]
async fn declined_failures_leave_base_in_progress() {
    let dir = tempfile::tempdir().unwrap();
    write_suggestions(&dir.path().join("suggestions"), "ep1", "ep1__a.txt", 1..=4);
    let ctx = context(dir.path(), Arc::new(MemoryArtifactStore::new(1)));
    let mut events = ctx.events.subscribe();
    let launcher = FakeLauncher::new(Behaviour {
        fail_always: prompts(&[4]),
        ..Default::default()
    });
    let gate = policy_gate(RetryPolicy::Never);

    let outcome = run_base(&ctx, &launcher, &gate, "ep1", &profiles(&["a"]))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        BaseOutcome::Partial {
            missing: 1,
            high_water: 3
        }
    );
    let record = ctx.store.get("ep1").await.unwrap().unwrap();
    assert_eq!(record.images, StageStatus::InProgress);
    assert_eq!(record.images_saved, 3);

    let mut report = None;
    while let Ok(event) = events.try_recv() {
        if let PipelineEvent::FailureReport { lines, .. } = event {
            report = Some(lines);
        }
    }
    assert_eq!(report.unwrap(), vec!["profile a: 1 scenes (e.g. 004)".to_string()]);
}

#[tokio::test]
async fn capped_rounds_stop_persistent_failures() {
    let dir = tempfile::tempdir().unwrap();
    write_suggestions(&dir.path().join("suggestions"), "ep1", "ep1__a.txt", 1..=2);
    let ctx = context(dir.path(), Arc::new(MemoryArtifactStore::new(1)));
    let launcher = FakeLauncher::new(Behaviour {
        fail_always: prompts(&[2]),
        ..Default::default()
    });
    let gate = policy_gate(RetryPolicy::Always {
        max_rounds: Some(3),
    });

    let outcome = run_base(&ctx, &launcher, &gate, "ep1", &profiles(&["a"]))
        .await
        .unwrap();
    assert_matches!(outcome, BaseOutcome::Partial { missing: 1, .. });
    // First pass plus three retry rounds.
    assert_eq!(launcher.calls().iter().filter(|c| *c == "prompt 2").count(), 4);
}

#[tokio::test]
async fn complete_profiles_get_no_session() {
    let dir = tempfile::tempdir().unwrap();
    let suggestions = dir.path().join("suggestions");
    write_suggestions(&suggestions, "ep1", "ep1__a.txt", 1..=3);
    write_suggestions(&suggestions, "ep1", "ep1__b.txt", 4..=6);

    let artifacts = Arc::new(MemoryArtifactStore::new(1));
    for id in 4..=6 {
        artifacts.mark_complete("ep1", id).await;
    }
    let ctx = context(dir.path(), artifacts);
    let launcher = FakeLauncher::new(Behaviour::default());
    let gate = policy_gate(RetryPolicy::Never);

    let outcome = run_base(&ctx, &launcher, &gate, "ep1", &profiles(&["a", "b"]))
        .await
        .unwrap();
    assert_eq!(outcome, BaseOutcome::Done { total: 6 });
    assert_eq!(launcher.opened(), profiles(&["a"]));
    assert_eq!(launcher.calls().len(), 3);
}

#[tokio::test]
async fn broken_profile_is_skipped_for_the_base() {
    let dir = tempfile::tempdir().unwrap();
    write_suggestions(&dir.path().join("suggestions"), "ep1", "ep1.txt", 1..=6);
    let ctx = context(dir.path(), Arc::new(MemoryArtifactStore::new(1)));
    let mut launcher = FakeLauncher::new(Behaviour::default());
    launcher.broken.insert("b".to_string());
    let gate = policy_gate(RetryPolicy::Always { max_rounds: None });

    let outcome = run_base(&ctx, &launcher, &gate, "ep1", &profiles(&["a", "b"]))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        BaseOutcome::Partial {
            missing: 3,
            high_water: 3
        }
    );
    assert_eq!(launcher.calls().len(), 3);
}

#[tokio::test]
async fn unknown_profiles_mark_the_base_as_error() {
    let dir = tempfile::tempdir().unwrap();
    write_suggestions(&dir.path().join("suggestions"), "ep1", "ep1__zed.txt", 1..=2);
    let ctx = context(dir.path(), Arc::new(MemoryArtifactStore::new(1)));
    let launcher = FakeLauncher::new(Behaviour::default());
    let gate = policy_gate(RetryPolicy::Never);

    let outcome = run_base(&ctx, &launcher, &gate, "ep1", &profiles(&["a"]))
        .await
        .unwrap();

    assert_eq!(outcome, BaseOutcome::Failed("no matching profiles".into()));
    let record = ctx.store.get("ep1").await.unwrap().unwrap();
    assert_eq!(record.images, StageStatus::Error("no matching profiles".into()));
    assert!(launcher.opened().is_empty());
}

#[tokio::test]
async fn missing_suggestions_do_not_touch_siblings() {
    let dir = tempfile::tempdir().unwrap();
    write_suggestions(&dir.path().join("suggestions"), "ep2", "ep2.txt", 1..=1);
    let ctx = context(dir.path(), Arc::new(MemoryArtifactStore::new(1)));
    let launcher = FakeLauncher::new(Behaviour::default());
    let gate = policy_gate(RetryPolicy::Never);

    let first = run_base(&ctx, &launcher, &gate, "ep1", &profiles(&["a"]))
        .await
        .unwrap();
    let second = run_base(&ctx, &launcher, &gate, "ep2", &profiles(&["a"]))
        .await
        .unwrap();

    assert_matches!(first, BaseOutcome::Failed(_));
    assert_eq!(second, BaseOutcome::Done { total: 1 });
}
