//! JSON-file status store.
//!
//! Every mutation re-reads the document from disk, changes exactly one
//! base's record and writes the whole document back through a sibling temp
//! file followed by a rename. Mutations from one process are serialised by
//! an async writer lock, so concurrent profiles updating the same base
//! cannot lose each other's writes. Two processes against the same file are
//! not coordinated.

use std::path::{Path, PathBuf};

use reelsmith_core::stage::{state_machine, Stage, StageStatus};
use reelsmith_core::types::{now, SceneId};
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::models::status::{StatusDocument, StatusRecord};

/// Extra keys merged into a record alongside a stage update.
pub type ExtraFields = serde_json::Map<String, serde_json::Value>;

pub struct StatusStore {
    path: PathBuf,
    writer: Mutex<()>,
}

impl StatusStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Read the full document. A missing file is an empty document.
    pub async fn load(&self) -> Result<StatusDocument, StoreError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(StatusDocument::new());
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(StatusDocument::new());
        }
        serde_json::from_slice(&raw).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })
    }

    /// Read one base's record.
    pub async fn get(&self, base: &str) -> Result<Option<StatusRecord>, StoreError> {
        Ok(self.load().await?.remove(base))
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Insert `base` with initial statuses if it is not present yet.
    ///
    /// Returns the stored record and whether it was created.
    pub async fn ensure(&self, base: &str) -> Result<(StatusRecord, bool), StoreError> {
        let _guard = self.writer.lock().await;
        let mut doc = self.load().await?;
        if let Some(existing) = doc.get(base) {
            return Ok((existing.clone(), false));
        }

        let record = StatusRecord::initial(now());
        doc.insert(base.to_string(), record.clone());
        self.write(&doc).await?;
        tracing::info!(base, "Registered new base");
        Ok((record, true))
    }

    /// Set one stage's status, merge `extra` keys and stamp `last_update`.
    ///
    /// An absent base is created from an empty record. Backwards moves are
    /// applied but logged.
    pub async fn update(
        &self,
        base: &str,
        stage: Stage,
        status: StageStatus,
        extra: Option<ExtraFields>,
    ) -> Result<StatusRecord, StoreError> {
        let _guard = self.writer.lock().await;
        let mut doc = self.load().await?;
        let record = doc.entry(base.to_string()).or_default();

        let current = record.stage(stage);
        if *current != status {
            if let Err(reason) = state_machine::validate_transition(current, &status) {
                tracing::debug!(base, stage = %stage, "{reason}");
            }
        }
        record.set_stage(stage, status);

        if let Some(extra) = extra {
            *record = merge_extra(base, std::mem::take(record), extra)?;
        }
        record.last_update = Some(now());

        let updated = record.clone();
        self.write(&doc).await?;
        Ok(updated)
    }

    /// Apply `mutate` to one base's record under the writer lock.
    ///
    /// Fails with [`StoreError::UnknownBase`] when the base is absent.
    pub async fn update_with<F>(&self, base: &str, mutate: F) -> Result<StatusRecord, StoreError>
    where
        F: FnOnce(&mut StatusRecord),
    {
        let _guard = self.writer.lock().await;
        let mut doc = self.load().await?;
        let record = doc
            .get_mut(base)
            .ok_or_else(|| StoreError::UnknownBase(base.to_string()))?;
        mutate(record);
        record.last_update = Some(now());
        let updated = record.clone();
        self.write(&doc).await?;
        Ok(updated)
    }

    /// Raise the image high-water mark to `max(current, scene_id)` and mark
    /// images in progress. Returns the resulting mark.
    pub async fn raise_high_water(&self, base: &str, scene_id: SceneId) -> Result<SceneId, StoreError> {
        let _guard = self.writer.lock().await;
        let mut doc = self.load().await?;
        let record = doc.entry(base.to_string()).or_default();
        record.images_saved = record.images_saved.max(scene_id);
        record.images = StageStatus::InProgress;
        record.last_update = Some(now());
        let mark = record.images_saved;
        self.write(&doc).await?;
        Ok(mark)
    }

    /// Drop a base's record. Returns whether it existed.
    pub async fn remove(&self, base: &str) -> Result<bool, StoreError> {
        let _guard = self.writer.lock().await;
        let mut doc = self.load().await?;
        if doc.shift_remove(base).is_none() {
            return Ok(false);
        }
        self.write(&doc).await?;
        Ok(true)
    }

    // ── Private helpers ──────────────────────────────────────────────

    async fn write(&self, doc: &StatusDocument) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let body = serde_json::to_vec_pretty(doc).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;

        let tmp = self.temp_path();
        tokio::fs::write(&tmp, body).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// Merge `extra` into `record` through its JSON form so that known keys
/// land in their typed fields and unknown keys in `extra`.
fn merge_extra(
    base: &str,
    record: StatusRecord,
    extra: ExtraFields,
) -> Result<StatusRecord, StoreError> {
    let invalid = |reason: String| StoreError::InvalidMerge {
        base: base.to_string(),
        reason,
    };

    let mut value = serde_json::to_value(record).map_err(|e| invalid(e.to_string()))?;
    let object = value
        .as_object_mut()
        .ok_or_else(|| invalid("record is not an object".to_string()))?;
    for (key, v) in extra {
        object.insert(key, v);
    }
    serde_json::from_value(value).map_err(|e| invalid(e.to_string()))
}
