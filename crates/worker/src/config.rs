use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use reelsmith_core::naming::clamp_variant_count;
use reelsmith_pipeline::config::clamp_workers;

/// Worker configuration loaded from environment variables.
///
/// All fields have defaults suitable for a local checkout. Command-line
/// flags override individual values for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    /// Status document path.
    pub manifest: PathBuf,
    /// Root holding one suggestion directory per base.
    pub suggestions_root: PathBuf,
    /// Root under which artifacts are written.
    pub images_root: PathBuf,
    /// Root holding one directory per profile.
    pub profiles_root: PathBuf,
    /// Directory scanned for `*_PATTERN*.txt` style files.
    pub patterns_dir: PathBuf,
    pub workers_per_profile: usize,
    pub variants: usize,
    pub artifact_extension: String,
    pub request_timeout: Duration,
    pub session_stagger: Duration,
    /// `None` waits for the operator indefinitely.
    pub approval_timeout: Option<Duration>,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                   |
    /// |-------------------------|---------------------------|
    /// | `REELSMITH_MANIFEST`    | `scripts/manifesto.json`  |
    /// | `REELSMITH_SUGGESTIONS` | `scripts/img_suggestions` |
    /// | `REELSMITH_IMAGES`      | `output/images`           |
    /// | `REELSMITH_PROFILES`    | `profiles`                |
    /// | `REELSMITH_PATTERNS`    | `prompts`                 |
    /// | `WORKERS_PER_PROFILE`   | `2`                       |
    /// | `IMAGE_VARIANTS`        | `1`                       |
    /// | `ARTIFACT_EXTENSION`    | `png`                     |
    /// | `REQUEST_TIMEOUT_SECS`  | `90`                      |
    /// | `SESSION_STAGGER_MS`    | `1000`                    |
    /// | `APPROVAL_TIMEOUT_SECS` | `0` (no timeout)          |
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let workers: usize = parse(&lookup, "WORKERS_PER_PROFILE", 2)?;
        let variants: usize = parse(&lookup, "IMAGE_VARIANTS", 1)?;
        let request_timeout_secs: u64 = parse(&lookup, "REQUEST_TIMEOUT_SECS", 90)?;
        let session_stagger_ms: u64 = parse(&lookup, "SESSION_STAGGER_MS", 1000)?;
        let approval_timeout_secs: u64 = parse(&lookup, "APPROVAL_TIMEOUT_SECS", 0)?;

        Ok(Self {
            manifest: text("REELSMITH_MANIFEST", "scripts/manifesto.json").into(),
            suggestions_root: text("REELSMITH_SUGGESTIONS", "scripts/img_suggestions").into(),
            images_root: text("REELSMITH_IMAGES", "output/images").into(),
            profiles_root: text("REELSMITH_PROFILES", "profiles").into(),
            patterns_dir: text("REELSMITH_PATTERNS", "prompts").into(),
            workers_per_profile: clamp_workers(workers),
            variants: clamp_variant_count(variants),
            artifact_extension: text("ARTIFACT_EXTENSION", "png"),
            request_timeout: Duration::from_secs(request_timeout_secs),
            session_stagger: Duration::from_millis(session_stagger_ms),
            approval_timeout: (approval_timeout_secs > 0)
                .then(|| Duration::from_secs(approval_timeout_secs)),
        })
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a valid number (got '{raw}')")),
        _ => Ok(default),
    }
}
