//! Operator CLI for scene-image acquisition.
//!
//! Wires the environment configuration, the ComfyUI launcher and the
//! pipeline engine together, and owns everything that touches the terminal:
//! selection prompts, the console retry approver and progress bars.

pub mod clean;
pub mod cli;
pub mod config;
pub mod progress;
pub mod prompt;
pub mod run;
pub mod status;
