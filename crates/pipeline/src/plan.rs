//! Base discovery and scene assignment.
//!
//! A base's suggestion directory `{root}/{base}/` holds either per-profile
//! files `<base>__<profile>.txt`, each already scoped to one profile, or a
//! single combined `<base>.txt` whose scenes are split across the available
//! profiles with [`assign_ranges`]. Per-profile files win when both exist.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use reelsmith_core::partition::assign_ranges;
use reelsmith_core::suggestions::{
    classify_stem, parse_suggestions, SceneMap, SuggestionFileKind, SUGGESTION_EXTENSION,
};
use reelsmith_db::StatusDocument;

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("Suggestion directory {0} does not exist")]
    MissingSuggestions(PathBuf),

    #[error("No suggestion files in {0}")]
    NoSuggestionFiles(PathBuf),

    #[error("Suggestion files contain no scenes")]
    NoScenes,

    /// Every per-profile file names a profile that is not configured.
    #[error("No matching profiles (missing: {})", .0.join(", "))]
    NoMatchingProfiles(Vec<String>),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PlanError {
    /// Short reason stored as `error:<reason>` on the images stage.
    pub fn status_reason(&self) -> &'static str {
        match self {
            PlanError::MissingSuggestions(_) => "missing suggestions",
            PlanError::NoSuggestionFiles(_) => "no suggestion files",
            PlanError::NoScenes => "no scenes",
            PlanError::NoMatchingProfiles(_) => "no matching profiles",
            PlanError::Io { .. } => "suggestions unreadable",
        }
    }
}

/// Which profile handles which scenes of one base.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BasePlan {
    /// Non-empty assignments in profile order.
    pub assignments: Vec<(String, SceneMap)>,
    /// Profiles named by per-profile files but not configured.
    pub missing: Vec<String>,
}

impl BasePlan {
    pub fn total_scenes(&self) -> usize {
        self.assignments.iter().map(|(_, scenes)| scenes.len()).sum()
    }

    pub fn profiles(&self) -> impl Iterator<Item = &str> {
        self.assignments.iter().map(|(profile, _)| profile.as_str())
    }
}

// ---------------------------------------------------------------------------
// Candidate discovery
// ---------------------------------------------------------------------------

/// Bases that want image acquisition.
///
/// Records with finished suggestions and unfinished images come first, in
/// document order, followed by suggestion directories with no record yet in
/// name order. No name appears twice.
pub async fn candidate_bases(
    doc: &StatusDocument,
    suggestions_root: &Path,
) -> Result<Vec<String>, PlanError> {
    let mut candidates: Vec<String> = doc
        .iter()
        .filter(|(_, record)| record.wants_images())
        .map(|(base, _)| base.clone())
        .collect();

    for dir in list_subdirs(suggestions_root).await? {
        if !doc.contains_key(&dir) && !candidates.contains(&dir) {
            candidates.push(dir);
        }
    }
    Ok(candidates)
}

async fn list_subdirs(root: &Path) -> Result<Vec<String>, PlanError> {
    let io_err = |source| PlanError::Io {
        path: root.to_path_buf(),
        source,
    };
    let mut entries = match tokio::fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => return Err(io_err(source)),
    };

    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        if entry.file_type().await.map_err(io_err)?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Build the plan for `base` against the configured `profiles`.
pub async fn load_base_plan(
    suggestions_root: &Path,
    base: &str,
    profiles: &[String],
) -> Result<BasePlan, PlanError> {
    let dir = suggestions_root.join(base);
    if !tokio::fs::try_exists(&dir).await.unwrap_or(false) {
        return Err(PlanError::MissingSuggestions(dir));
    }

    let files = read_suggestion_files(&dir, base).await?;
    if files.per_profile.is_empty() && files.combined.is_none() {
        return Err(PlanError::NoSuggestionFiles(dir));
    }

    if !files.per_profile.is_empty() {
        plan_per_profile(base, files.per_profile, profiles)
    } else {
        let combined = files.combined.unwrap_or_default();
        plan_combined(base, combined, profiles)
    }
}

#[derive(Default)]
struct SuggestionFiles {
    per_profile: BTreeMap<String, SceneMap>,
    combined: Option<SceneMap>,
}

async fn read_suggestion_files(dir: &Path, base: &str) -> Result<SuggestionFiles, PlanError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| PlanError::Io { path, source }
    };
    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_err(dir))?;
    let mut files = SuggestionFiles::default();

    while let Some(entry) = entries.next_entry().await.map_err(io_err(dir))? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(SUGGESTION_EXTENSION) {
            continue;
        }
        let Some(kind) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|stem| classify_stem(base, stem))
        else {
            continue;
        };

        let text = tokio::fs::read_to_string(&path).await.map_err(io_err(&path))?;
        let scenes = parse_suggestions(&text);
        match kind {
            SuggestionFileKind::Profile(profile) => {
                files.per_profile.insert(profile, scenes);
            }
            SuggestionFileKind::Combined => files.combined = Some(scenes),
        }
    }
    Ok(files)
}

fn plan_per_profile(
    base: &str,
    per_profile: BTreeMap<String, SceneMap>,
    profiles: &[String],
) -> Result<BasePlan, PlanError> {
    let mut plan = BasePlan::default();
    let mut any_scenes = false;

    for (profile, scenes) in &per_profile {
        if !profiles.contains(profile) {
            tracing::warn!(base, profile = %profile, "Suggestion file names an unknown profile");
            plan.missing.push(profile.clone());
        }
        any_scenes |= !scenes.is_empty();
    }

    // Configured order, not file order.
    for profile in profiles {
        if let Some(scenes) = per_profile.get(profile) {
            if scenes.is_empty() {
                tracing::debug!(base, profile = %profile, "Profile has no parsed scenes");
            } else {
                plan.assignments.push((profile.clone(), scenes.clone()));
            }
        }
    }

    if !any_scenes {
        return Err(PlanError::NoScenes);
    }
    if plan.assignments.is_empty() {
        return Err(PlanError::NoMatchingProfiles(plan.missing));
    }
    Ok(plan)
}

fn plan_combined(base: &str, scenes: SceneMap, profiles: &[String]) -> Result<BasePlan, PlanError> {
    if scenes.is_empty() {
        return Err(PlanError::NoScenes);
    }
    if profiles.is_empty() {
        return Err(PlanError::NoMatchingProfiles(Vec::new()));
    }

    let ordered: Vec<_> = scenes.into_iter().collect();
    let total = ordered.len() as u32;
    let assignments = assign_ranges(total, profiles)
        .into_iter()
        .map(|(profile, range)| {
            let slice = &ordered[(range.start - 1) as usize..range.end as usize];
            (profile.clone(), slice.iter().cloned().collect::<SceneMap>())
        })
        .collect::<Vec<_>>();

    tracing::debug!(
        base,
        total,
        profiles = assignments.len(),
        "Split combined suggestions across profiles",
    );
    Ok(BasePlan {
        assignments,
        missing: Vec::new(),
    })
}
