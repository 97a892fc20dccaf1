//! Retry decisions and the answers that produce them.

use std::fmt;

/// Whether a batch of failed scenes should be attempted again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Accept,
    Decline,
}

impl RetryDecision {
    pub fn is_accept(self) -> bool {
        matches!(self, RetryDecision::Accept)
    }

    /// Short answer token, used as the "press enter to keep" hint.
    pub fn as_token(self) -> &'static str {
        match self {
            RetryDecision::Accept => "y",
            RetryDecision::Decline => "n",
        }
    }
}

impl fmt::Display for RetryDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryDecision::Accept => f.write_str("accept"),
            RetryDecision::Decline => f.write_str("decline"),
        }
    }
}

/// Interpret an operator answer.
///
/// Blank input repeats `previous` when there is one and declines
/// otherwise. Unrecognised words count as acceptance only when they start
/// with `y` or `s`.
pub fn interpret_answer(answer: &str, previous: Option<RetryDecision>) -> RetryDecision {
    let answer = answer.trim().to_lowercase();
    match answer.as_str() {
        "" => previous.unwrap_or(RetryDecision::Decline),
        "y" | "yes" | "s" | "sim" => RetryDecision::Accept,
        "n" | "no" | "nao" | "não" => RetryDecision::Decline,
        other if other.starts_with('y') || other.starts_with('s') => RetryDecision::Accept,
        _ => RetryDecision::Decline,
    }
}
