//! ComfyUI WebSocket message types and parser.
//!
//! ComfyUI sends JSON frames shaped `{"type": "<kind>", "data": {...}}`.
//! Only the kinds that matter for prompt completion are typed; everything
//! else (queue status, previews, extension chatter) parses as
//! [`ComfyUIMessage::Other`].

use serde::Deserialize;

#[derive(Debug, Clone)]
pub enum ComfyUIMessage {
    /// A prompt has started executing.
    ExecutionStart(PromptRef),
    /// A node is executing, or the prompt finished when `node` is `None`.
    Executing(ExecutingData),
    /// Newer servers announce completion explicitly.
    ExecutionSuccess(PromptRef),
    /// Step-level progress inside a node.
    Progress(ProgressData),
    ExecutionError(ErrorData),
    /// The prompt was interrupted on the server.
    ExecutionInterrupted(PromptRef),
    /// Any other frame kind, by name.
    Other(String),
}

/// Envelope shared by every frame.
#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromptRef {
    pub prompt_id: String,
}

/// When `node` is `None`, execution of the prompt has completed.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutingData {
    pub node: Option<String>,
    /// Absent on the idle broadcast some servers send after a queue drains.
    #[serde(default)]
    pub prompt_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProgressData {
    pub value: i64,
    pub max: i64,
    #[serde(default)]
    pub prompt_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorData {
    pub prompt_id: String,
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub exception_message: String,
    #[serde(default)]
    pub exception_type: String,
}

/// How a prompt ended, as far as the WebSocket tells us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptOutcome {
    Finished,
    Failed(String),
}

impl ComfyUIMessage {
    /// The terminal outcome this message reports, with its prompt id.
    pub fn outcome(&self) -> Option<(&str, PromptOutcome)> {
        match self {
            ComfyUIMessage::Executing(ExecutingData {
                node: None,
                prompt_id: Some(id),
            }) => Some((id.as_str(), PromptOutcome::Finished)),
            ComfyUIMessage::ExecutionSuccess(data) => {
                Some((data.prompt_id.as_str(), PromptOutcome::Finished))
            }
            ComfyUIMessage::ExecutionError(data) => Some((
                data.prompt_id.as_str(),
                PromptOutcome::Failed(format!(
                    "{}: {}",
                    data.exception_type, data.exception_message
                )),
            )),
            ComfyUIMessage::ExecutionInterrupted(data) => Some((
                data.prompt_id.as_str(),
                PromptOutcome::Failed("interrupted".to_string()),
            )),
            _ => None,
        }
    }
}

/// Parse a ComfyUI WebSocket text frame.
///
/// Unknown `type` values parse as [`ComfyUIMessage::Other`]; only malformed
/// JSON or a known type with a bad payload is an error.
pub fn parse_message(text: &str) -> Result<ComfyUIMessage, serde_json::Error> {
    let raw: RawMessage = serde_json::from_str(text)?;
    let data = raw.data;
    Ok(match raw.kind.as_str() {
        "execution_start" => ComfyUIMessage::ExecutionStart(serde_json::from_value(data)?),
        "executing" => ComfyUIMessage::Executing(serde_json::from_value(data)?),
        "execution_success" => ComfyUIMessage::ExecutionSuccess(serde_json::from_value(data)?),
        "progress" => ComfyUIMessage::Progress(serde_json::from_value(data)?),
        "execution_error" => ComfyUIMessage::ExecutionError(serde_json::from_value(data)?),
        "execution_interrupted" => {
            ComfyUIMessage::ExecutionInterrupted(serde_json::from_value(data)?)
        }
        _ => ComfyUIMessage::Other(raw.kind),
    })
}
