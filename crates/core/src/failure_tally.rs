//! Per-profile failure counts for end-of-run reporting.
//!
//! The tally is informational only; what still needs work is always
//! re-derived from the artifacts on disk.

use std::collections::BTreeMap;

use crate::naming::scene_label;
use crate::types::SceneId;

/// Number of scene ids kept per profile for the report sample.
pub const DEFAULT_SAMPLE_CAP: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileFailures {
    pub total: usize,
    /// First failing scene ids, capped at the tally's sample size.
    pub sample: Vec<SceneId>,
}

/// Failure counts keyed by profile name.
#[derive(Debug, Clone)]
pub struct FailureTally {
    sample_cap: usize,
    profiles: BTreeMap<String, ProfileFailures>,
}

impl Default for FailureTally {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_CAP)
    }
}

impl FailureTally {
    pub fn new(sample_cap: usize) -> Self {
        Self {
            sample_cap,
            profiles: BTreeMap::new(),
        }
    }

    /// Record one failed attempt.
    pub fn record(&mut self, profile: &str, scene_id: SceneId) {
        let entry = self.profiles.entry(profile.to_string()).or_default();
        entry.total += 1;
        if entry.sample.len() < self.sample_cap {
            entry.sample.push(scene_id);
        }
    }

    /// Total failures across every profile.
    pub fn total(&self) -> usize {
        self.profiles.values().map(|p| p.total).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn get(&self, profile: &str) -> Option<&ProfileFailures> {
        self.profiles.get(profile)
    }

    /// Human-readable report lines, one per profile with failures.
    pub fn report_lines(&self) -> Vec<String> {
        self.profiles
            .iter()
            .filter(|(_, f)| f.total > 0)
            .map(|(profile, f)| {
                let sample = f
                    .sample
                    .iter()
                    .map(|id| scene_label(*id))
                    .collect::<Vec<_>>()
                    .join(", ");
                let more = if f.total > f.sample.len() { "..." } else { "" };
                format!("profile {profile}: {} scenes (e.g. {sample}{more})", f.total)
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.profiles.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_caps_sample() {
        let mut tally = FailureTally::new(2);
        for id in [3, 4, 9] {
            tally.record("a", id);
        }
        tally.record("b", 12);

        let a = tally.get("a").unwrap();
        assert_eq!(a.total, 3);
        assert_eq!(a.sample, vec![3, 4]);
        assert_eq!(tally.total(), 4);
    }

    #[test]
    fn report_marks_truncated_samples() {
        let mut tally = FailureTally::new(1);
        tally.record("a", 3);
        tally.record("a", 4);
        tally.record("b", 7);

        let lines = tally.report_lines();
        assert_eq!(lines[0], "profile a: 2 scenes (e.g. 003...)");
        assert_eq!(lines[1], "profile b: 1 scenes (e.g. 007)");
    }

    #[test]
    fn clear_resets() {
        let mut tally = FailureTally::default();
        tally.record("a", 1);
        tally.clear();
        assert!(tally.is_empty());
        assert!(tally.report_lines().is_empty());
    }
}
