//! Pipeline stages and their status values.
//!
//! Every base carries one [`StageStatus`] per [`Stage`]. Statuses are
//! persisted as plain strings (`pending`, `in_progress`, `done`,
//! `error:<reason>`) so the status document stays human-editable.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// A named phase of the content pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    /// Source text is present in the inbox.
    Txt,
    /// Narration audio.
    Audio,
    /// Caption (SRT) generation.
    Srt,
    /// Scene prompt suggestions.
    Suggestions,
    /// Scene image acquisition.
    Images,
    /// Timeline assembly.
    Timeline,
    /// Final render.
    Video,
}

impl Stage {
    /// Every stage in pipeline order.
    pub const ALL: [Stage; 7] = [
        Stage::Txt,
        Stage::Audio,
        Stage::Srt,
        Stage::Suggestions,
        Stage::Images,
        Stage::Timeline,
        Stage::Video,
    ];

    /// Key used for this stage in the status document.
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Txt => "txt",
            Stage::Audio => "audio",
            Stage::Srt => "srt",
            Stage::Suggestions => "suggestions",
            Stage::Images => "images",
            Stage::Timeline => "timeline",
            Stage::Video => "video",
        }
    }

    /// Status a freshly ensured record starts with for this stage.
    ///
    /// The source text already exists when a base is first registered, so
    /// that stage starts `ready`; everything else starts `pending`.
    pub fn initial_status(self) -> StageStatus {
        match self {
            Stage::Txt => StageStatus::Ready,
            _ => StageStatus::Pending,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| crate::error::CoreError::Parse(format!("Unknown stage '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// StageStatus
// ---------------------------------------------------------------------------

/// Prefix used when persisting [`StageStatus::Error`].
pub const ERROR_PREFIX: &str = "error:";

/// Status of one stage of one base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum StageStatus {
    Pending,
    /// Satisfied by upstream data before any work ran.
    Ready,
    InProgress,
    Done,
    /// Failed with a human-readable reason.
    Error(String),
    /// A value written by some other tool; preserved verbatim on rewrite.
    Unknown(String),
}

impl StageStatus {
    /// Build an error status from any displayable reason.
    pub fn error(reason: impl fmt::Display) -> Self {
        StageStatus::Error(reason.to_string())
    }

    pub fn is_done(&self) -> bool {
        matches!(self, StageStatus::Done)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, StageStatus::Error(_))
    }
}

impl Default for StageStatus {
    fn default() -> Self {
        StageStatus::Pending
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::Pending => f.write_str("pending"),
            StageStatus::Ready => f.write_str("ready"),
            StageStatus::InProgress => f.write_str("in_progress"),
            StageStatus::Done => f.write_str("done"),
            StageStatus::Error(reason) => write!(f, "{ERROR_PREFIX}{reason}"),
            StageStatus::Unknown(raw) => f.write_str(raw),
        }
    }
}

impl From<String> for StageStatus {
    fn from(raw: String) -> Self {
        match raw.trim() {
            "pending" => StageStatus::Pending,
            "ready" => StageStatus::Ready,
            "in_progress" => StageStatus::InProgress,
            "done" => StageStatus::Done,
            other => match other.strip_prefix(ERROR_PREFIX) {
                Some(reason) => StageStatus::Error(reason.trim().to_string()),
                None => StageStatus::Unknown(raw),
            },
        }
    }
}

impl From<StageStatus> for String {
    fn from(status: StageStatus) -> Self {
        status.to_string()
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Forward transitions of a stage within one run.
///
/// The store does not enforce these (a retry may overwrite an error); the
/// runner uses them to log unexpected rewrites.
pub mod state_machine {
    use super::StageStatus;

    /// Check whether moving a stage from `from` to `to` is a forward step.
    pub fn can_transition(from: &StageStatus, to: &StageStatus) -> bool {
        use StageStatus::*;
        match (from, to) {
            (Pending | Ready, InProgress) => true,
            (Pending | Ready, Error(_)) => true,
            (InProgress, InProgress | Done | Error(_)) => true,
            _ => false,
        }
    }

    /// Validate a transition, returning a descriptive message for backward ones.
    pub fn validate_transition(from: &StageStatus, to: &StageStatus) -> Result<(), String> {
        if can_transition(from, to) {
            Ok(())
        } else {
            Err(format!("Unexpected stage transition: {from} -> {to}"))
        }
    }
}
