/// Scene ids are 1-based and dense within a base.
pub type SceneId = u32;

/// Local wall-clock time, written without an offset
/// (`2024-05-01T13:45:10.250`) so other tools can read the document.
pub type Timestamp = chrono::NaiveDateTime;

/// Current local time truncated to milliseconds.
pub fn now() -> Timestamp {
    use chrono::{DurationRound, TimeDelta};

    let local = chrono::Local::now().naive_local();
    local
        .duration_trunc(TimeDelta::milliseconds(1))
        .unwrap_or(local)
}
