//! Contiguous partitioning of a base's scenes across session profiles.
//!
//! The first range absorbs the division remainder; every later range has
//! the same length. The result depends only on the inputs, so re-running a
//! partition after a restart reproduces the same assignment.

use std::ops::RangeInclusive;

use crate::types::SceneId;

/// An inclusive `[start, end]` interval of scene positions.
///
/// A range with `start > end` is a valid empty assignment (more profiles
/// than scenes) and is skipped downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneRange {
    pub start: SceneId,
    pub end: SceneId,
}

impl SceneRange {
    pub fn new(start: SceneId, end: SceneId) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    /// Number of scenes covered (0 for empty ranges).
    pub fn len(&self) -> u32 {
        if self.is_empty() {
            0
        } else {
            self.end - self.start + 1
        }
    }

    pub fn contains(&self, id: SceneId) -> bool {
        !self.is_empty() && (self.start..=self.end).contains(&id)
    }

    /// Iterate the covered scene positions in ascending order.
    pub fn iter(&self) -> RangeInclusive<SceneId> {
        self.start..=self.end
    }
}

/// Split `[1, total]` into `parts` contiguous ranges.
///
/// `base_chunk = total / parts`, `remainder = total % parts`; the first
/// range has `base_chunk + remainder` scenes and every subsequent range has
/// `base_chunk`. `parts == 0` is treated as one part.
pub fn partition_scenes(total: u32, parts: usize) -> Vec<SceneRange> {
    let parts = parts.max(1) as u32;
    if parts == 1 {
        return vec![SceneRange::new(1, total)];
    }

    let base_chunk = total / parts;
    let remainder = total % parts;

    let mut ranges = Vec::with_capacity(parts as usize);
    let mut end = base_chunk + remainder;
    ranges.push(SceneRange::new(1, end));
    for _ in 1..parts {
        let start = end + 1;
        end = start + base_chunk - 1;
        ranges.push(SceneRange::new(start, end));
    }
    ranges
}

/// Pair each profile (in caller order) with its range, dropping empty ones.
pub fn assign_ranges<'a, P>(total: u32, profiles: &'a [P]) -> Vec<(&'a P, SceneRange)> {
    profiles
        .iter()
        .zip(partition_scenes(total, profiles.len()))
        .filter(|(_, range)| !range.is_empty())
        .collect()
}
