//! Profile configuration.
//!
//! A profile is a directory `<root>/<name>/` holding a `session.json`:
//!
//! ```json
//! {
//!   "api_url": "http://127.0.0.1:8188",
//!   "ws_url": "ws://127.0.0.1:8188",
//!   "workflow": "workflow_api.json",
//!   "prompt_placeholder": "{prompt}"
//! }
//! ```
//!
//! `ws_url` defaults to `api_url` with its scheme switched to `ws`/`wss`.
//! `workflow` is resolved relative to the profile directory.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// File name of a profile's configuration.
pub const PROFILE_FILE: &str = "session.json";

/// Placeholder replaced by the scene prompt when none is configured.
pub const DEFAULT_PROMPT_PLACEHOLDER: &str = "{prompt}";

#[derive(Debug, Clone, Deserialize)]
struct RawProfile {
    api_url: String,
    #[serde(default)]
    ws_url: Option<String>,
    workflow: PathBuf,
    #[serde(default)]
    prompt_placeholder: Option<String>,
}

/// Resolved configuration of one profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileConfig {
    pub name: String,
    pub dir: PathBuf,
    pub api_url: String,
    pub ws_url: String,
    /// Absolute (or root-relative) path of the workflow template.
    pub workflow: PathBuf,
    pub prompt_placeholder: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("Profile '{0}' not found")]
    NotFound(String),

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid profile file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid profile '{name}': {reason}")]
    Invalid { name: String, reason: String },
}

impl ProfileConfig {
    /// Load profile `name` from `root`.
    pub fn load(root: &Path, name: &str) -> Result<Self, ProfileError> {
        let dir = root.join(name);
        let path = dir.join(PROFILE_FILE);
        if !path.is_file() {
            return Err(ProfileError::NotFound(name.to_string()));
        }

        let raw = std::fs::read(&path).map_err(|source| ProfileError::Io {
            path: path.clone(),
            source,
        })?;
        let raw: RawProfile =
            serde_json::from_slice(&raw).map_err(|source| ProfileError::Json { path, source })?;

        let api_url = raw.api_url.trim().trim_end_matches('/').to_string();
        if !(api_url.starts_with("http://") || api_url.starts_with("https://")) {
            return Err(ProfileError::Invalid {
                name: name.to_string(),
                reason: format!("api_url must be http(s), got '{api_url}'"),
            });
        }
        let ws_url = match raw.ws_url {
            Some(url) => url.trim().trim_end_matches('/').to_string(),
            None => derive_ws_url(&api_url),
        };

        let prompt_placeholder = raw
            .prompt_placeholder
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_PROMPT_PLACEHOLDER.to_string());

        Ok(Self {
            name: name.to_string(),
            workflow: dir.join(raw.workflow),
            dir,
            api_url,
            ws_url,
            prompt_placeholder,
        })
    }
}

/// Switch an HTTP base URL to its WebSocket counterpart.
pub fn derive_ws_url(api_url: &str) -> String {
    if let Some(rest) = api_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = api_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        api_url.to_string()
    }
}

/// Names of all profiles under `root`, in directory-name order.
///
/// A directory counts as a profile when it holds a [`PROFILE_FILE`]. A
/// missing root yields no profiles.
pub fn list_profiles(root: &Path) -> Result<Vec<String>, ProfileError> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(ProfileError::Io {
                path: root.to_path_buf(),
                source,
            })
        }
    };

    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.path().join(PROFILE_FILE).is_file())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn write_profile(root: &Path, name: &str, body: &str) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(PROFILE_FILE), body).unwrap();
    }

    #[test]
    fn loads_with_defaults() {
        let root = tempfile::tempdir().unwrap();
        write_profile(
            root.path(),
            "alice",
            r#"{"api_url":"https://gpu.local:8188/","workflow":"wf.json"}"#,
        );

        let profile = ProfileConfig::load(root.path(), "alice").unwrap();
        assert_eq!(profile.api_url, "https://gpu.local:8188");
        assert_eq!(profile.ws_url, "wss://gpu.local:8188");
        assert_eq!(profile.workflow, root.path().join("alice").join("wf.json"));
        assert_eq!(profile.prompt_placeholder, "{prompt}");
    }

    #[test]
    fn explicit_ws_url_and_placeholder() {
        let root = tempfile::tempdir().unwrap();
        write_profile(
            root.path(),
            "bob",
            r#"{"api_url":"http://h:1","ws_url":"ws://other:2","workflow":"w.json","prompt_placeholder":"%%P%%"}"#,
        );
        let profile = ProfileConfig::load(root.path(), "bob").unwrap();
        assert_eq!(profile.ws_url, "ws://other:2");
        assert_eq!(profile.prompt_placeholder, "%%P%%");
    }

    #[test]
    fn missing_and_invalid_profiles() {
        let root = tempfile::tempdir().unwrap();
        assert_matches!(
            ProfileConfig::load(root.path(), "ghost"),
            Err(ProfileError::NotFound(_))
        );

        write_profile(root.path(), "bad", "{");
        assert_matches!(
            ProfileConfig::load(root.path(), "bad"),
            Err(ProfileError::Json { .. })
        );

        write_profile(root.path(), "ftp", r#"{"api_url":"ftp://x","workflow":"w"}"#);
        assert_matches!(
            ProfileConfig::load(root.path(), "ftp"),
            Err(ProfileError::Invalid { .. })
        );
    }

    #[test]
    fn lists_only_configured_directories_sorted() {
        let root = tempfile::tempdir().unwrap();
        write_profile(root.path(), "b", "{}");
        write_profile(root.path(), "a", "{}");
        std::fs::create_dir_all(root.path().join("empty")).unwrap();

        assert_eq!(list_profiles(root.path()).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn missing_root_lists_nothing() {
        let root = tempfile::tempdir().unwrap();
        assert!(list_profiles(&root.path().join("nope")).unwrap().is_empty());
    }
}
