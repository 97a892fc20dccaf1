//! Domain types and pure logic shared by every reelsmith crate.
//!
//! This crate has zero internal dependencies so the store, the session
//! client, the pipeline and the CLI can all build on it.

pub mod decision;
pub mod error;
pub mod failure_tally;
pub mod naming;
pub mod partition;
pub mod selection;
pub mod session;
pub mod stage;
pub mod suggestions;
pub mod types;
