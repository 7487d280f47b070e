//! Client-side protocol engine for long-lived, bidirectional streaming
//! sessions against a remote speech gateway.
//!
//! The engine owns one WebSocket connection at a time, runs its receive loop
//! on a background task, and multiplexes decoded frames to the handlers a
//! session registered in its [`HandlerTable`]. Two wire dialects are
//! supported behind the [`Dialect`] seam: the classic namespace/name envelope
//! and the streaming-task event envelope. Asynchronous start/stop operations
//! signal completion through a [`CompletionGate`], which guarantees
//! exactly-once resolution no matter which of the racing call sites (success
//! event, failure event, explicit shutdown) gets there first.

pub mod config;
pub mod dialect;
pub mod engine;
pub mod error;
pub mod gate;
pub mod handler;
pub mod transport;

pub use config::{ConnectionConfig, Credential};
pub use dialect::{
    ClassicDialect, DEFAULT_NAMESPACE, DecodeError, Dialect, EventIdentifier,
    StreamingTaskDialect, fresh_id,
};
pub use engine::Engine;
pub use error::EngineError;
pub use gate::{CompletionGate, GateError, GateWaiter};
pub use handler::{Handler, HandlerEvent, HandlerTable};
pub use transport::{Frame, TransportError};
