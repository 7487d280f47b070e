//! Streaming-task dialect: event-addressed JSON envelopes, with binary
//! frames carrying raw synthesized output.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{DecodeError, Dialect, EventIdentifier};

pub const ACTION_RUN_TASK: &str = "run-task";
pub const STREAMING_MODE_OUT: &str = "out";

pub const TASK_STARTED_EVENT: &str = "task-started";
pub const TASK_FINISHED_EVENT: &str = "task-finished";
pub const TASK_FAILED_EVENT: &str = "task-failed";
pub const RESULT_GENERATED_EVENT: &str = "result-generated";

#[derive(Debug, Clone, Serialize)]
pub struct StreamingRequestHeader {
    pub task_id: String,
    pub action: String,
    pub streaming: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamingPayload {
    pub model: String,
    pub task_group: String,
    pub task: String,
    pub function: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Map<String, Value>>,
}

/// Outbound streaming-task envelope.
#[derive(Debug, Clone, Serialize)]
pub struct StreamingRequest {
    pub header: StreamingRequestHeader,
    pub payload: StreamingPayload,
}

impl StreamingRequest {
    /// A run-task request producing streamed output.
    pub fn run_task(task_id: &str, payload: StreamingPayload) -> Self {
        Self {
            header: StreamingRequestHeader {
                task_id: task_id.to_string(),
                action: ACTION_RUN_TASK.to_string(),
                streaming: STREAMING_MODE_OUT.to_string(),
            },
            payload,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamingResponseHeader {
    #[serde(default)]
    pub task_id: String,
    #[serde(default)]
    pub event: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamingResponsePayload {
    #[serde(default)]
    pub output: Value,
    #[serde(default)]
    pub usage: Value,
}

/// Inbound streaming-task envelope.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamingResponse {
    #[serde(default)]
    pub header: StreamingResponseHeader,
    #[serde(default)]
    pub payload: StreamingResponsePayload,
}

impl StreamingResponse {
    pub fn from_slice(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

/// Decoder for the streaming-task dialect.
pub struct StreamingTaskDialect;

impl Dialect for StreamingTaskDialect {
    fn decode(&self, data: &[u8]) -> Result<EventIdentifier, DecodeError> {
        let response = StreamingResponse::from_slice(data)?;
        if response.header.event.is_empty() {
            return Err(DecodeError::MissingIdentifier);
        }
        Ok(EventIdentifier::Event(response.header.event))
    }
}
