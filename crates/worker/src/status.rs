//! `reelsmith status` output.

use reelsmith_core::naming::scene_label;
use reelsmith_core::stage::Stage;
use reelsmith_db::{StatusDocument, StatusRecord};

/// One line per base, in document order.
pub fn render_status(doc: &StatusDocument) -> Vec<String> {
    doc.iter().map(|(base, record)| render_record(base, record)).collect()
}

fn render_record(base: &str, record: &StatusRecord) -> String {
    let stages = Stage::ALL
        .iter()
        .map(|stage| format!("{}={}", stage.as_str(), record.stage(*stage)))
        .collect::<Vec<_>>()
        .join(" ");
    let updated = record
        .last_update
        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{base}: {stages} images_saved={} updated={updated}",
        scene_label(record.images_saved)
    )
}
