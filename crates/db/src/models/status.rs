//! Status record model.

use indexmap::IndexMap;
use reelsmith_core::stage::{Stage, StageStatus};
use reelsmith_core::types::{SceneId, Timestamp};
use serde::{Deserialize, Deserializer, Serialize};

/// Whole status document, keyed by base name in the order bases were
/// registered.
pub type StatusDocument = IndexMap<String, StatusRecord>;

/// Per-base record: one status per stage plus counters.
///
/// Keys this crate does not know about are kept in `extra` and written
/// back untouched. Counters are read leniently: other stages write them
/// too, and a null, fractional or out-of-range value must not make the
/// whole document unreadable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusRecord {
    pub txt: StageStatus,
    pub audio: StageStatus,
    pub srt: StageStatus,
    pub suggestions: StageStatus,
    pub images: StageStatus,
    pub timeline: StageStatus,
    pub video: StageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<Timestamp>,
    #[serde(deserialize_with = "lenient_count")]
    pub sentences: u32,
    #[serde(deserialize_with = "lenient_count")]
    pub scenes: u32,
    /// High-water mark of saved scene images.
    #[serde(deserialize_with = "lenient_count")]
    pub images_saved: SceneId,
    /// Signed: `-1` is a valid grouping written by the timeline stage.
    #[serde(deserialize_with = "lenient_signed")]
    pub group_size: i64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for StatusRecord {
    fn default() -> Self {
        Self {
            txt: StageStatus::Pending,
            audio: StageStatus::Pending,
            srt: StageStatus::Pending,
            suggestions: StageStatus::Pending,
            images: StageStatus::Pending,
            timeline: StageStatus::Pending,
            video: StageStatus::Pending,
            last_update: None,
            sentences: 0,
            scenes: 0,
            images_saved: 0,
            group_size: 0,
            extra: serde_json::Map::new(),
        }
    }
}

impl StatusRecord {
    /// A freshly discovered base: every stage at its initial status.
    pub fn initial(now: Timestamp) -> Self {
        let mut record = Self {
            last_update: Some(now),
            group_size: 1,
            ..Self::default()
        };
        for stage in Stage::ALL {
            record.set_stage(stage, stage.initial_status());
        }
        record
    }

    pub fn stage(&self, stage: Stage) -> &StageStatus {
        match stage {
            Stage::Txt => &self.txt,
            Stage::Audio => &self.audio,
            Stage::Srt => &self.srt,
            Stage::Suggestions => &self.suggestions,
            Stage::Images => &self.images,
            Stage::Timeline => &self.timeline,
            Stage::Video => &self.video,
        }
    }

    pub fn set_stage(&mut self, stage: Stage, status: StageStatus) {
        let slot = match stage {
            Stage::Txt => &mut self.txt,
            Stage::Audio => &mut self.audio,
            Stage::Srt => &mut self.srt,
            Stage::Suggestions => &mut self.suggestions,
            Stage::Images => &mut self.images,
            Stage::Timeline => &mut self.timeline,
            Stage::Video => &mut self.video,
        };
        *slot = status;
    }

    /// Ready for image acquisition: suggestions exist and images are not
    /// finished yet.
    pub fn wants_images(&self) -> bool {
        self.suggestions.is_done() && !self.images.is_done()
    }
}

// ---------------------------------------------------------------------------
// Lenient counters
// ---------------------------------------------------------------------------

/// Unsigned counter: negative, null or non-numeric values read as 0.
fn lenient_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(signed_from_value)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0))
}

fn lenient_signed<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(signed_from_value).unwrap_or(0))
}

/// Integers as-is, floats truncated, numeric strings parsed.
fn signed_from_value(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                .map(|f| f.trunc() as i64)
        }),
        serde_json::Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
        }
        _ => None,
    }
}
