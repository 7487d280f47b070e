//! Classic dialect: namespace/name-addressed JSON envelopes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{DecodeError, Dialect, EventIdentifier, fresh_id};

/// Event name the gateway uses to report a failed task in this dialect.
pub const TASK_FAILED_NAME: &str = "TaskFailed";

const SDK_NAME: &str = "voicegate";
const SDK_LANGUAGE: &str = "rust";

/// Header shared by classic requests and responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassicHeader {
    #[serde(default)]
    pub message_id: String,
    #[serde(default)]
    pub task_id: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub appkey: String,
}

/// SDK self-identification embedded in every outbound request.
#[derive(Debug, Clone, Serialize)]
pub struct SdkInfo {
    pub name: String,
    pub version: String,
    pub language: String,
}

impl Default for SdkInfo {
    fn default() -> Self {
        Self {
            name: SDK_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            language: SDK_LANGUAGE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RequestContext {
    pub sdk: SdkInfo,
}

/// Outbound classic-dialect envelope.
#[derive(Debug, Clone, Serialize)]
pub struct ClassicRequest {
    pub header: ClassicHeader,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Map<String, Value>>,
    pub context: RequestContext,
}

impl ClassicRequest {
    /// A request with a fresh message id and the session's task id.
    pub fn new(
        namespace: &str,
        name: &str,
        task_id: &str,
        app_key: &str,
        payload: Option<Map<String, Value>>,
    ) -> Self {
        Self {
            header: ClassicHeader {
                message_id: fresh_id(),
                task_id: task_id.to_string(),
                namespace: namespace.to_string(),
                name: name.to_string(),
                appkey: app_key.to_string(),
            },
            payload,
            context: RequestContext::default(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Inbound classic-dialect envelope: mirrored header plus an open payload
/// map.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClassicResponse {
    #[serde(default)]
    pub header: ClassicHeader,
    #[serde(default)]
    pub payload: Map<String, Value>,
}

impl ClassicResponse {
    pub fn from_slice(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

/// Decoder for the classic dialect.
pub struct ClassicDialect;

impl Dialect for ClassicDialect {
    fn decode(&self, data: &[u8]) -> Result<EventIdentifier, DecodeError> {
        let response = ClassicResponse::from_slice(data)?;
        if response.header.name.is_empty() {
            return Err(DecodeError::MissingIdentifier);
        }
        let namespace = (!response.header.namespace.is_empty()).then_some(response.header.namespace);
        Ok(EventIdentifier::Classic {
            namespace,
            name: response.header.name,
        })
    }

    fn fallback_on_miss(&self) -> bool {
        true
    }
}
