//! Artifact naming convention.
//!
//! Generated images live at `{root}/{base}/{suffix}/{scene:03}.{ext}`,
//! one directory per output variant. The path depends only on the base,
//! the scene id and the variant, which is what makes disk probing a
//! reliable completion check.

use std::path::{Path, PathBuf};

use crate::error::CoreError;
use crate::types::SceneId;

/// Maximum number of output variants kept per scene.
pub const MAX_VARIANTS: usize = 4;

/// Directory suffixes for each variant slot, in order.
pub const VARIANT_SUFFIXES: [&str; MAX_VARIANTS] = ["_01", "_02", "_03", "_04"];

/// Validate a requested variant count (`1..=MAX_VARIANTS`).
pub fn validate_variant_count(count: usize) -> Result<(), CoreError> {
    if (1..=MAX_VARIANTS).contains(&count) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Variant count must be between 1 and {MAX_VARIANTS} (got {count})"
        )))
    }
}

/// Clamp a requested variant count into `1..=MAX_VARIANTS`.
pub fn clamp_variant_count(count: usize) -> usize {
    count.clamp(1, MAX_VARIANTS)
}

/// The suffixes in use for `count` variants.
pub fn active_suffixes(count: usize) -> &'static [&'static str] {
    &VARIANT_SUFFIXES[..clamp_variant_count(count)]
}

/// Zero-padded scene file name, e.g. `007.png`.
///
/// # Examples
///
/// ```
/// use reelsmith_core::naming::scene_file_name;
///
/// assert_eq!(scene_file_name(7, "png"), "007.png");
/// assert_eq!(scene_file_name(1234, "jpg"), "1234.jpg");
/// ```
pub fn scene_file_name(scene_id: SceneId, extension: &str) -> String {
    format!("{scene_id:03}.{extension}")
}

/// Zero-padded scene label used in reports, e.g. `007`.
pub fn scene_label(scene_id: SceneId) -> String {
    format!("{scene_id:03}")
}

/// Full path of one variant of one scene.
pub fn scene_artifact_path(
    root: &Path,
    base: &str,
    suffix: &str,
    scene_id: SceneId,
    extension: &str,
) -> PathBuf {
    root.join(base)
        .join(suffix)
        .join(scene_file_name(scene_id, extension))
}
