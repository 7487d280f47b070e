//! Speech feature sessions built on the voicegate protocol engine.
//!
//! Three session types cover the gateway's streaming services: one-shot
//! [`recognizer::SpeechRecognizer`] and long-form
//! [`transcriber::SpeechTranscriber`] over the classic dialect, and
//! [`synthesizer::SpeechSynthesizer`] over the streaming-task dialect. The
//! [`token`] module performs the one-shot HTTP credential exchange and
//! [`audio`] loads PCM files in gateway-sized chunks.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};

pub mod audio;
pub mod recognizer;
pub mod synthesizer;
pub mod token;
pub mod transcriber;

pub use recognizer::{RecognitionParams, RecognizerCallbacks, SpeechRecognizer};
pub use synthesizer::{SpeechSynthesizer, SynthesisParams, SynthesizerCallbacks};
pub use token::{Token, TokenError, fetch_token};
pub use transcriber::{SpeechTranscriber, TranscriberCallbacks, TranscriptionParams};

pub(crate) type EventCallback = Arc<dyn Fn(&str) + Send + Sync>;
pub(crate) type DataCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;
pub(crate) type ClosedCallback = Arc<dyn Fn() + Send + Sync>;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Serializes a params struct into the open key/value map the wire
/// envelopes carry.
pub(crate) fn to_param_map<T: serde::Serialize>(
    value: &T,
) -> Result<Map<String, Value>, serde_json::Error> {
    serde_json::from_value(serde_json::to_value(value)?)
}
