//! Operator approval for retry rounds and the round loop itself.
//!
//! Approval requests travel over an mpsc channel and are answered through a
//! oneshot reply, so the same loop runs with a console approver or with a
//! headless [`RetryPolicy`]. Requests are asked one at a time: the gate
//! holds its decision lock for the whole exchange.

use std::collections::HashMap;
use std::time::Duration;

use reelsmith_core::decision::RetryDecision;
use reelsmith_core::suggestions::SceneMap;
use reelsmith_core::types::SceneId;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::artifacts::split_complete;
use crate::runner::RunContext;
use crate::session_pool::SessionPool;
use crate::worker_pool::{jobs_for, run_round, SharedTally};

// ---------------------------------------------------------------------------
// Approval channel
// ---------------------------------------------------------------------------

/// A question to the operator: retry these scenes on this profile?
#[derive(Debug)]
pub struct ApprovalRequest {
    pub base: String,
    pub profile: String,
    pub failed: Vec<SceneId>,
    /// Retry round this answer applies to, starting at 1.
    pub round: u32,
    /// Decision a blank answer repeats.
    pub previous: Option<RetryDecision>,
    reply: oneshot::Sender<Option<RetryDecision>>,
}

impl ApprovalRequest {
    /// Answer the request. `None` means no answer was given.
    pub fn respond(self, decision: Option<RetryDecision>) {
        let _ = self.reply.send(decision);
    }

    /// Resolves once the gate stopped waiting for this answer (timeout or
    /// shutdown).
    pub async fn abandoned(&mut self) {
        self.reply.closed().await
    }
}

/// Sends approval requests and remembers the last decision per base.
pub struct ApprovalGate {
    sender: mpsc::Sender<ApprovalRequest>,
    timeout: Option<Duration>,
    last: Mutex<HashMap<String, RetryDecision>>,
}

impl ApprovalGate {
    /// Create a gate and the receiving end approvers listen on.
    pub fn channel(timeout: Option<Duration>) -> (Self, mpsc::Receiver<ApprovalRequest>) {
        let (sender, receiver) = mpsc::channel(16);
        let gate = Self {
            sender,
            timeout,
            last: Mutex::new(HashMap::new()),
        };
        (gate, receiver)
    }

    /// Ask whether `profile` should retry `failed`.
    ///
    /// A closed channel, an expired timeout or an empty answer resolves to
    /// the last decision for `base`, or to decline when there is none.
    pub async fn ask(
        &self,
        base: &str,
        profile: &str,
        failed: &[SceneId],
        round: u32,
    ) -> RetryDecision {
        let mut last = self.last.lock().await;
        let previous = last.get(base).copied();

        let (reply, answer) = oneshot::channel();
        let request = ApprovalRequest {
            base: base.to_string(),
            profile: profile.to_string(),
            failed: failed.to_vec(),
            round,
            previous,
            reply,
        };

        let answered = if self.sender.send(request).await.is_err() {
            tracing::debug!(base, profile, "No approver listening");
            None
        } else {
            match self.timeout {
                Some(limit) => match tokio::time::timeout(limit, answer).await {
                    Ok(reply) => reply.ok().flatten(),
                    Err(_) => {
                        tracing::warn!(base, profile, timeout_secs = limit.as_secs(), "Approval timed out");
                        None
                    }
                },
                None => answer.await.ok().flatten(),
            }
        };

        let decision = answered.or(previous).unwrap_or(RetryDecision::Decline);
        last.insert(base.to_string(), decision);
        decision
    }

    /// Drop the remembered decision for `base`.
    pub async fn forget(&self, base: &str) {
        self.last.lock().await.remove(base);
    }
}

// ---------------------------------------------------------------------------
// Headless policies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Accept every request, optionally only up to a round number.
    Always { max_rounds: Option<u32> },
    Never,
}

impl RetryPolicy {
    pub fn decide(&self, request: &ApprovalRequest) -> RetryDecision {
        match self {
            RetryPolicy::Always { max_rounds } => match max_rounds {
                Some(max) if request.round > *max => RetryDecision::Decline,
                _ => RetryDecision::Accept,
            },
            RetryPolicy::Never => RetryDecision::Decline,
        }
    }
}

/// Answer every request on `requests` with `policy` until the gate is gone.
pub fn spawn_policy_responder(
    mut requests: mpsc::Receiver<ApprovalRequest>,
    policy: RetryPolicy,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(request) = requests.recv().await {
            let decision = policy.decide(&request);
            tracing::info!(
                base = %request.base,
                profile = %request.profile,
                round = request.round,
                failed = request.failed.len(),
                %decision,
                "Retry answered by policy",
            );
            request.respond(Some(decision));
        }
    })
}

// ---------------------------------------------------------------------------
// Round loop
// ---------------------------------------------------------------------------

/// Re-run failed scenes in rounds until nothing is missing or every
/// remaining profile is declined.
///
/// `remaining` lists failed ids per profile after the first pass. Profiles
/// leave the loop when their scenes are all stored (their session is closed
/// right away) or when the operator declines them. Returns what is still
/// missing, per declined profile.
pub async fn retry_until_settled(
    ctx: &RunContext,
    gate: &ApprovalGate,
    pool: &mut SessionPool,
    base: &str,
    scenes: &HashMap<String, SceneMap>,
    mut remaining: Vec<(String, Vec<SceneId>)>,
    tally: &SharedTally,
) -> Vec<(String, Vec<SceneId>)> {
    let mut settled = Vec::new();
    let mut round = 1;

    loop {
        let mut live = Vec::new();
        for (profile, ids) in remaining.drain(..) {
            let (_, missing) = split_complete(ctx.artifacts.as_ref(), base, ids).await;
            if missing.is_empty() {
                pool.close(&profile).await;
            } else {
                live.push((profile, missing));
            }
        }
        if live.is_empty() {
            break;
        }

        let mut accepted = Vec::new();
        for (profile, missing) in live {
            let session = match pool.get(&profile) {
                Some(session) => session,
                None => {
                    settled.push((profile, missing));
                    continue;
                }
            };
            let decision = gate.ask(base, &profile, &missing, round).await;
            tracing::info!(base, profile = %profile, round, failed = missing.len(), %decision, "Retry decision");
            if decision.is_accept() {
                accepted.push((profile, session, missing));
            } else {
                pool.close(&profile).await;
                settled.push((profile, missing));
            }
        }
        if accepted.is_empty() {
            break;
        }

        let batches = accepted
            .into_iter()
            .map(|(profile, session, missing)| {
                let jobs = scenes
                    .get(&profile)
                    .map(|map| jobs_for(map, &missing))
                    .unwrap_or_default();
                (profile, session, jobs)
            })
            .collect();
        remaining = run_round(ctx, pool, base, round, batches, tally)
            .await
            .into_iter()
            .map(|(profile, report)| (profile, report.remaining))
            .collect();
        round += 1;
    }

    settled
}
