//! Parser for scene suggestion files.
//!
//! A suggestion file holds repeated blocks:
//!
//! ```text
//! Scene 12
//! Original: the narrated line
//! Suggestion: Show a lighthouse at dusk
//! ```
//!
//! Only the `Scene <id>` marker and the `Suggestion:` line matter; any
//! other line is ignored. A suggestion without a preceding valid marker is
//! dropped, and a marker without a suggestion produces nothing.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::types::SceneId;

/// Separator between base and profile in per-profile file stems.
pub const PROFILE_SEPARATOR: &str = "__";

/// File extension of suggestion files.
pub const SUGGESTION_EXTENSION: &str = "txt";

const SUGGESTION_PREFIX: &str = "Suggestion:";

static SCENE_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Scene\s+(\d+)\b").expect("valid regex"));

/// Ordered mapping from scene id to prompt text.
pub type SceneMap = BTreeMap<SceneId, String>;

/// Parse suggestion text into an ordered scene map.
///
/// A later block for the same id replaces an earlier one.
pub fn parse_suggestions(text: &str) -> SceneMap {
    let mut scenes = SceneMap::new();
    let mut current: Option<SceneId> = None;

    for line in text.lines() {
        if line.starts_with("Scene ") {
            current = SCENE_MARKER_RE
                .captures(line)
                .and_then(|caps| caps[1].parse::<SceneId>().ok())
                .filter(|id| *id > 0);
        } else if let Some(rest) = line.strip_prefix(SUGGESTION_PREFIX) {
            if let Some(id) = current.take() {
                scenes.insert(id, rest.trim().to_string());
            }
        }
    }

    scenes
}

/// What a file stem inside a base's suggestion directory refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuggestionFileKind {
    /// `<base>__<profile>`: scenes already assigned to one profile.
    Profile(String),
    /// `<base>`: every scene of the base, not yet partitioned.
    Combined,
}

/// Classify a suggestion file stem for `base`.
///
/// Returns `None` for stems that belong to neither form.
pub fn classify_stem(base: &str, stem: &str) -> Option<SuggestionFileKind> {
    if stem == base {
        return Some(SuggestionFileKind::Combined);
    }
    let profile = stem
        .strip_prefix(base)?
        .strip_prefix(PROFILE_SEPARATOR)?;
    if profile.is_empty() {
        None
    } else {
        Some(SuggestionFileKind::Profile(profile.to_string()))
    }
}

/// Format a per-profile suggestion file name.
pub fn profile_file_name(base: &str, profile: &str) -> String {
    format!("{base}{PROFILE_SEPARATOR}{profile}.{SUGGESTION_EXTENSION}")
}
