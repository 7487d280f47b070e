//! The two wire-envelope families spoken by the gateway.
//!
//! A dialect turns raw inbound bytes into the identifier used for handler
//! lookup. Selecting a dialect is a configuration-time decision bound to the
//! session's protocol family, never a runtime auto-detect.

pub mod classic;
pub mod streaming;

pub use classic::ClassicDialect;
pub use streaming::StreamingTaskDialect;

use uuid::Uuid;

/// Wildcard namespace accepted by every classic-dialect table.
pub const DEFAULT_NAMESPACE: &str = "Default";

/// Errors produced while decoding an inbound text frame.
///
/// Decode failures are logged and the frame dropped; sporadic corruption
/// must not tear down a long-lived session.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame carries no event identifier")]
    MissingIdentifier,
}

/// The dispatch key derived from one decoded envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventIdentifier {
    /// Classic dialect: `(namespace, name)`, namespace absent when the
    /// header left it empty.
    Classic {
        namespace: Option<String>,
        name: String,
    },
    /// Streaming-task dialect: the `event` header field alone.
    Event(String),
}

impl EventIdentifier {
    /// The string used for handler-table lookup.
    pub fn key(&self) -> &str {
        match self {
            Self::Classic { name, .. } => name,
            Self::Event(event) => event,
        }
    }
}

/// Decoder capability the engine is parameterized over.
pub trait Dialect: Send + Sync {
    fn decode(&self, data: &[u8]) -> Result<EventIdentifier, DecodeError>;

    /// Whether an unroutable event may be redirected to the table's fallback
    /// entry. A per-dialect choice: the classic dialect allows it, the
    /// streaming-task dialect drops unroutable events outright.
    fn fallback_on_miss(&self) -> bool {
        false
    }
}

/// A fresh hyphen-less identifier for message and task ids.
pub fn fresh_id() -> String {
    Uuid::new_v4().simple().to_string()
}
