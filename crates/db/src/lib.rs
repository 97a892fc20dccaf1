//! Persistence for the per-base status document.
//!
//! The document is a single JSON object keyed by base name. Every record
//! carries one status per pipeline stage plus a handful of counters.

pub mod error;
pub mod models;
pub mod store;

pub use error::StoreError;
pub use models::status::{StatusDocument, StatusRecord};
pub use store::StatusStore;
