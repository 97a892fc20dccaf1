//! Progress bars driven by pipeline events.
//!
//! One bar per running batch, advanced once per attempt whatever its
//! outcome. Lifecycle events are printed above the bars.

use std::collections::HashMap;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use reelsmith_core::naming::scene_label;
use reelsmith_pipeline::PipelineEvent;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

/// One-line description of a lifecycle event, if it deserves one.
pub fn describe(event: &PipelineEvent) -> Option<String> {
    match event {
        PipelineEvent::BaseStarted { base } => Some(format!("==> {base}")),
        PipelineEvent::ProfileComplete { base, profile } => {
            Some(format!("[{base}] profile {profile}: every scene already stored"))
        }
        PipelineEvent::ProfileSkipped {
            base,
            profile,
            reason,
        } => Some(format!("[{base}] profile {profile} skipped: {reason}")),
        PipelineEvent::PendingSummary {
            base,
            profile,
            pending,
            sample,
        } => {
            let ids = sample.iter().map(|id| scene_label(*id)).collect::<Vec<_>>();
            let more = if *pending > sample.len() { ", ..." } else { "" };
            Some(format!(
                "[{base}] profile {profile}: {pending} pending ({}{more})",
                ids.join(", ")
            ))
        }
        PipelineEvent::FailureReport { base, lines } => Some(
            lines
                .iter()
                .map(|line| format!("[{base}] {line}"))
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        PipelineEvent::BaseFinished {
            base,
            status,
            images_saved,
        } => Some(format!("[{base}] images {status} (up to {})", scene_label(*images_saved))),
        PipelineEvent::BatchStarted { .. }
        | PipelineEvent::SceneAttempted { .. }
        | PipelineEvent::BatchFinished { .. } => None,
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{prefix:>16} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
        .expect("template is compile-time constant")
        .progress_chars("=> ")
}

/// Render events from `events` into `progress` until the bus closes.
pub fn spawn_progress(
    mut events: broadcast::Receiver<PipelineEvent>,
    progress: MultiProgress,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut bars: HashMap<(String, String), ProgressBar> = HashMap::new();
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Progress display lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            match &event {
                PipelineEvent::BatchStarted {
                    base,
                    profile,
                    round,
                    total,
                } => {
                    let bar = progress.add(ProgressBar::new(*total as u64));
                    bar.set_style(bar_style());
                    bar.set_prefix(profile.clone());
                    bar.set_message(if *round == 0 {
                        base.clone()
                    } else {
                        format!("{base} retry {round}")
                    });
                    if let Some(old) = bars.insert((base.clone(), profile.clone()), bar) {
                        old.finish_and_clear();
                    }
                }
                PipelineEvent::SceneAttempted { base, profile, .. } => {
                    if let Some(bar) = bars.get(&(base.clone(), profile.clone())) {
                        bar.inc(1);
                    }
                }
                PipelineEvent::BatchFinished {
                    base,
                    profile,
                    remaining,
                    ..
                } => {
                    if let Some(bar) = bars.remove(&(base.clone(), profile.clone())) {
                        bar.finish_with_message(format!("{base}: {remaining} missing"));
                    }
                }
                other => {
                    if let Some(line) = describe(other) {
                        let _ = progress.println(line);
                    }
                }
            }
        }
        for bar in bars.into_values() {
            bar.finish_and_clear();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_summary_lists_sample() {
        let line = describe(&PipelineEvent::PendingSummary {
            base: "ep1".into(),
            profile: "a".into(),
            pending: 12,
            sample: vec![1, 2, 3],
        })
        .unwrap();
        assert_eq!(line, "[ep1] profile a: 12 pending (001, 002, 003, ...)");
    }

    #[test]
    fn batch_events_are_not_printed() {
        assert!(describe(&PipelineEvent::SceneAttempted {
            base: "ep1".into(),
            profile: "a".into(),
            round: 0,
            scene_id: 1,
            ok: true,
        })
        .is_none());
    }

    #[test]
    fn finished_base_shows_status() {
        let line = describe(&PipelineEvent::BaseFinished {
            base: "ep1".into(),
            status: "done".into(),
            images_saved: 7,
        })
        .unwrap();
        assert_eq!(line, "[ep1] images done (up to 007)");
    }

    #[tokio::test]
    async fn renderer_stops_when_bus_closes() {
        let (tx, rx) = broadcast::channel(8);
        let handle = spawn_progress(rx, MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden()));
        tx.send(PipelineEvent::BatchStarted {
            base: "ep1".into(),
            profile: "a".into(),
            round: 0,
            total: 2,
        })
        .unwrap();
        drop(tx);
        handle.await.unwrap();
    }
}
