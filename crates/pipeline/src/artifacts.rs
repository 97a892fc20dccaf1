//! Artifact storage and the completion probe.
//!
//! A scene is complete when every configured variant of it is stored. The
//! probe is the only authority on completion: the status store's counter
//! and the failure tally are informational.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::ImageFormat;
use reelsmith_core::naming::{active_suffixes, clamp_variant_count, scene_artifact_path};
use reelsmith_core::session::GeneratedArtifact;
use reelsmith_core::types::SceneId;
use tokio::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The bytes are not a PNG, JPEG or WebP image.
    #[error("Artifact {index} is not a supported image: {reason}")]
    InvalidImage { index: usize, reason: String },

    /// Fewer artifacts than configured variants came back.
    #[error("Expected {expected} variants, got {got}")]
    MissingVariants { expected: usize, got: usize },
}

/// Check that `bytes` look like a supported image.
pub fn validate_image(index: usize, bytes: &[u8]) -> Result<ImageFormat, ArtifactError> {
    let format = image::guess_format(bytes).map_err(|e| ArtifactError::InvalidImage {
        index,
        reason: e.to_string(),
    })?;
    match format {
        ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::WebP => Ok(format),
        other => Err(ArtifactError::InvalidImage {
            index,
            reason: format!("unsupported format {other:?}"),
        }),
    }
}

/// Validate the artifacts that will be kept for a scene.
///
/// Only the first `variants` artifacts are considered. A short list is
/// reported after validation so the caller can still store what arrived.
fn select_variants(
    artifacts: &[GeneratedArtifact],
    variants: usize,
) -> Result<&[GeneratedArtifact], ArtifactError> {
    let kept = &artifacts[..artifacts.len().min(variants)];
    for (index, artifact) in kept.iter().enumerate() {
        validate_image(index, &artifact.bytes)?;
    }
    Ok(kept)
}

/// Where scene artifacts live and how completion is probed.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Variants expected per scene.
    fn variants(&self) -> usize;

    /// Whether every expected variant of the scene is stored.
    async fn is_complete(&self, base: &str, scene_id: SceneId) -> bool;

    /// Store the first [`variants`](Self::variants) artifacts of a scene.
    ///
    /// Returns how many were stored. Fails with
    /// [`ArtifactError::MissingVariants`] after storing a short list.
    async fn save(
        &self,
        base: &str,
        scene_id: SceneId,
        artifacts: &[GeneratedArtifact],
    ) -> Result<usize, ArtifactError>;

    /// Remove every artifact of `base`.
    async fn remove_base(&self, base: &str) -> Result<(), ArtifactError>;
}

/// Partition `ids` into (complete, incomplete), keeping order.
pub async fn split_complete(
    store: &dyn ArtifactStore,
    base: &str,
    ids: impl IntoIterator<Item = SceneId>,
) -> (Vec<SceneId>, Vec<SceneId>) {
    let mut complete = Vec::new();
    let mut incomplete = Vec::new();
    for id in ids {
        if store.is_complete(base, id).await {
            complete.push(id);
        } else {
            incomplete.push(id);
        }
    }
    (complete, incomplete)
}

// ---------------------------------------------------------------------------
// Disk
// ---------------------------------------------------------------------------

/// Stores artifacts as `{root}/{base}/{suffix}/{scene:03}.{ext}`.
pub struct DiskArtifactStore {
    root: PathBuf,
    extension: String,
    variants: usize,
}

impl DiskArtifactStore {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>, variants: usize) -> Self {
        Self {
            root: root.into(),
            extension: extension.into().trim_start_matches('.').to_string(),
            variants: clamp_variant_count(variants),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Paths of every expected variant of one scene.
    pub fn expected_paths(&self, base: &str, scene_id: SceneId) -> Vec<PathBuf> {
        active_suffixes(self.variants)
            .iter()
            .map(|suffix| scene_artifact_path(&self.root, base, suffix, scene_id, &self.extension))
            .collect()
    }

    async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ArtifactError> {
        let io_err = |source| ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let mut tmp = path.as_os_str().to_os_string();
        tmp.push(".part");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, bytes).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, path).await.map_err(io_err)?;
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for DiskArtifactStore {
    fn variants(&self) -> usize {
        self.variants
    }

    async fn is_complete(&self, base: &str, scene_id: SceneId) -> bool {
        for path in self.expected_paths(base, scene_id) {
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return false;
            }
        }
        true
    }

    async fn save(
        &self,
        base: &str,
        scene_id: SceneId,
        artifacts: &[GeneratedArtifact],
    ) -> Result<usize, ArtifactError> {
        let kept = select_variants(artifacts, self.variants)?;
        let paths = self.expected_paths(base, scene_id);
        for (artifact, path) in kept.iter().zip(&paths) {
            Self::write_atomic(path, &artifact.bytes).await?;
        }
        if kept.len() < self.variants {
            return Err(ArtifactError::MissingVariants {
                expected: self.variants,
                got: kept.len(),
            });
        }
        Ok(kept.len())
    }

    async fn remove_base(&self, base: &str) -> Result<(), ArtifactError> {
        let dir = self.root.join(base);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ArtifactError::Io { path: dir, source }),
        }
    }
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

/// In-memory store: counts stored variants per scene.
pub struct MemoryArtifactStore {
    variants: usize,
    stored: Mutex<HashMap<(String, SceneId), usize>>,
}

impl MemoryArtifactStore {
    pub fn new(variants: usize) -> Self {
        Self {
            variants: clamp_variant_count(variants),
            stored: Mutex::new(HashMap::new()),
        }
    }

    /// Mark a scene complete without going through `save`.
    pub async fn mark_complete(&self, base: &str, scene_id: SceneId) {
        self.stored
            .lock()
            .await
            .insert((base.to_string(), scene_id), self.variants);
    }

    /// Number of scenes with every variant stored.
    pub async fn complete_count(&self, base: &str) -> usize {
        self.stored
            .lock()
            .await
            .iter()
            .filter(|((b, _), n)| b == base && **n >= self.variants)
            .count()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    fn variants(&self) -> usize {
        self.variants
    }

    async fn is_complete(&self, base: &str, scene_id: SceneId) -> bool {
        self.stored
            .lock()
            .await
            .get(&(base.to_string(), scene_id))
            .is_some_and(|n| *n >= self.variants)
    }

    async fn save(
        &self,
        base: &str,
        scene_id: SceneId,
        artifacts: &[GeneratedArtifact],
    ) -> Result<usize, ArtifactError> {
        let kept = select_variants(artifacts, self.variants)?.len();
        self.stored
            .lock()
            .await
            .insert((base.to_string(), scene_id), kept);
        if kept < self.variants {
            return Err(ArtifactError::MissingVariants {
                expected: self.variants,
                got: kept,
            });
        }
        Ok(kept)
    }

    async fn remove_base(&self, base: &str) -> Result<(), ArtifactError> {
        self.stored.lock().await.retain(|(b, _), _| b != base);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
    const JPEG: &[u8] = b"\xFF\xD8\xFF\xE0\0\x10JFIF";

    fn png() -> GeneratedArtifact {
        GeneratedArtifact::new(PNG.to_vec())
    }

    // -- validation ---------------------------------------------------------

    #[test]
    fn accepts_png_and_jpeg() {
        assert_eq!(validate_image(0, PNG).unwrap(), ImageFormat::Png);
        assert_eq!(validate_image(0, JPEG).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn rejects_non_images() {
        assert_matches!(
            validate_image(2, b"<html>error</html>"),
            Err(ArtifactError::InvalidImage { index: 2, .. })
        );
    }

    // -- disk ---------------------------------------------------------------

    #[tokio::test]
    async fn disk_layout_and_probe() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskArtifactStore::new(dir.path(), "png", 2);

        assert!(!store.is_complete("ep1", 3).await);
        let saved = store.save("ep1", 3, &[png(), png(), png()]).await.unwrap();
        assert_eq!(saved, 2);

        assert!(dir.path().join("ep1/_01/003.png").is_file());
        assert!(dir.path().join("ep1/_02/003.png").is_file());
        assert!(!dir.path().join("ep1/_03").exists());
        assert!(store.is_complete("ep1", 3).await);
        assert!(!store.is_complete("ep1", 4).await);
    }

    #[tokio::test]
    async fn disk_probe_needs_every_variant() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskArtifactStore::new(dir.path(), ".png", 2);

        let result = store.save("ep1", 1, &[png()]).await;
        assert_matches!(result, Err(ArtifactError::MissingVariants { expected: 2, got: 1 }));
        assert!(dir.path().join("ep1/_01/001.png").is_file());
        assert!(!store.is_complete("ep1", 1).await);
    }

    #[tokio::test]
    async fn disk_rejects_invalid_bytes_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskArtifactStore::new(dir.path(), "png", 1);

        let result = store
            .save("ep1", 1, &[GeneratedArtifact::new(b"nope".to_vec())])
            .await;
        assert_matches!(result, Err(ArtifactError::InvalidImage { .. }));
        assert!(!dir.path().join("ep1").exists());
    }

    #[tokio::test]
    async fn disk_remove_base() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskArtifactStore::new(dir.path(), "png", 1);
        store.save("ep1", 1, &[png()]).await.unwrap();

        store.remove_base("ep1").await.unwrap();
        assert!(!store.is_complete("ep1", 1).await);
        store.remove_base("never-existed").await.unwrap();
    }

    // -- memory -------------------------------------------------------------

    #[tokio::test]
    async fn memory_store_tracks_completion() {
        let store = MemoryArtifactStore::new(1);
        store.save("ep1", 2, &[png()]).await.unwrap();
        store.mark_complete("ep1", 5).await;

        let (done, missing) = split_complete(&store, "ep1", [1, 2, 5]).await;
        assert_eq!(done, vec![2, 5]);
        assert_eq!(missing, vec![1]);
        assert_eq!(store.complete_count("ep1").await, 2);

        store.remove_base("ep1").await.unwrap();
        assert_eq!(store.complete_count("ep1").await, 0);
    }
}
