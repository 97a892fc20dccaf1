//! Workflow templating.
//!
//! A workflow is ComfyUI's API-format JSON. Every string value containing
//! the profile's placeholder gets the scene prompt substituted in; the
//! structure of the graph is never touched.

use std::path::Path;

use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Cannot read workflow {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Workflow has no '{0}' placeholder")]
    MissingPlaceholder(String),
}

/// A loaded workflow and the placeholder its prompt text replaces.
#[derive(Debug, Clone)]
pub struct WorkflowTemplate {
    graph: Value,
    placeholder: String,
}

impl WorkflowTemplate {
    /// Build a template, checking the placeholder occurs somewhere.
    pub fn new(graph: Value, placeholder: impl Into<String>) -> Result<Self, WorkflowError> {
        let placeholder = placeholder.into();
        if !contains_placeholder(&graph, &placeholder) {
            return Err(WorkflowError::MissingPlaceholder(placeholder));
        }
        Ok(Self { graph, placeholder })
    }

    pub fn from_file(path: &Path, placeholder: &str) -> Result<Self, WorkflowError> {
        let read_err = |reason: String| WorkflowError::Read {
            path: path.display().to_string(),
            reason,
        };
        let raw = std::fs::read(path).map_err(|e| read_err(e.to_string()))?;
        let graph = serde_json::from_slice(&raw).map_err(|e| read_err(e.to_string()))?;
        Self::new(graph, placeholder)
    }

    /// The workflow with `prompt` substituted.
    pub fn render(&self, prompt: &str) -> Value {
        let mut graph = self.graph.clone();
        substitute(&mut graph, &self.placeholder, prompt);
        graph
    }
}

fn contains_placeholder(value: &Value, placeholder: &str) -> bool {
    match value {
        Value::String(s) => s.contains(placeholder),
        Value::Array(items) => items.iter().any(|v| contains_placeholder(v, placeholder)),
        Value::Object(map) => map.values().any(|v| contains_placeholder(v, placeholder)),
        _ => false,
    }
}

fn substitute(value: &mut Value, placeholder: &str, prompt: &str) {
    match value {
        Value::String(s) if s.contains(placeholder) => {
            *s = s.replace(placeholder, prompt);
        }
        Value::Array(items) => items
            .iter_mut()
            .for_each(|v| substitute(v, placeholder, prompt)),
        Value::Object(map) => map
            .values_mut()
            .for_each(|v| substitute(v, placeholder, prompt)),
        _ => {}
    }
}
