//! Engine-level error taxonomy.

use crate::transport::TransportError;

/// Errors surfaced by [`crate::Engine`] operations and frame dispatch.
///
/// `InvariantViolation` and `NamespaceMismatch` mark programming or protocol
/// errors that halt the affected session; they are returned as values so the
/// owning session can tear itself down without affecting unrelated sessions.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine is not connected")]
    NotConnected,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    #[error("protocol mismatch: expected namespace {expected}, got {got}")]
    NamespaceMismatch { expected: String, got: String },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to encode command: {0}")]
    Encode(#[from] serde_json::Error),
}

impl EngineError {
    /// Whether this error must halt the session that produced it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvariantViolation(_) | Self::NamespaceMismatch { .. }
        )
    }
}
