//! One-shot speech recognition over the classic dialect: a single short
//! utterance per start/stop cycle.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use voicegate_engine::dialect::classic::{ClassicRequest, TASK_FAILED_NAME};
use voicegate_engine::{
    ClassicDialect, CompletionGate, ConnectionConfig, Engine, EngineError, GateWaiter,
    HandlerEvent, HandlerTable, fresh_id,
};

use crate::{ClosedCallback, EventCallback, lock};

pub const NAMESPACE: &str = "SpeechRecognizer";

pub const START_NAME: &str = "StartRecognition";
pub const STOP_NAME: &str = "StopRecognition";

pub const STARTED_EVENT: &str = "RecognitionStarted";
pub const RESULT_CHANGED_EVENT: &str = "RecognitionResultChanged";
pub const COMPLETED_EVENT: &str = "RecognitionCompleted";

/// Payload of the start command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionParams {
    pub format: String,
    pub sample_rate: u32,
    pub enable_intermediate_result: bool,
    pub enable_punctuation_prediction: bool,
    pub enable_inverse_text_normalization: bool,
}

impl Default for RecognitionParams {
    fn default() -> Self {
        Self {
            format: "pcm".to_string(),
            sample_rate: 16000,
            enable_intermediate_result: true,
            enable_punctuation_prediction: true,
            enable_inverse_text_normalization: true,
        }
    }
}

/// Observer callbacks for one recognizer instance. Closures capture whatever
/// context the caller needs.
#[derive(Clone, Default)]
pub struct RecognizerCallbacks {
    pub(crate) on_task_failed: Option<EventCallback>,
    pub(crate) on_started: Option<EventCallback>,
    pub(crate) on_result_changed: Option<EventCallback>,
    pub(crate) on_completed: Option<EventCallback>,
    pub(crate) on_close: Option<ClosedCallback>,
    pub(crate) on_unhandled: Option<EventCallback>,
}

impl RecognizerCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_task_failed(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_task_failed = Some(std::sync::Arc::new(callback));
        self
    }

    pub fn on_started(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_started = Some(std::sync::Arc::new(callback));
        self
    }

    pub fn on_result_changed(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_result_changed = Some(std::sync::Arc::new(callback));
        self
    }

    pub fn on_completed(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_completed = Some(std::sync::Arc::new(callback));
        self
    }

    pub fn on_close(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_close = Some(std::sync::Arc::new(callback));
        self
    }

    /// Receives events the gateway emits that this session has no named
    /// handler for.
    pub fn on_unhandled(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_unhandled = Some(std::sync::Arc::new(callback));
        self
    }
}

struct RecognizerState {
    task_id: Mutex<String>,
    start_param: Mutex<Map<String, Value>>,
    start_gate: CompletionGate,
    stop_gate: CompletionGate,
    callbacks: RecognizerCallbacks,
}

fn send_start_command(engine: &Engine<RecognizerState>, _event: HandlerEvent<'_>) {
    let state = engine.session();
    let request = ClassicRequest::new(
        NAMESPACE,
        START_NAME,
        &lock(&state.task_id),
        engine.config().app_key.as_deref().unwrap_or_default(),
        Some(lock(&state.start_param).clone()),
    );
    match request.to_json() {
        Ok(body) => {
            if let Err(err) = engine.cmd(body) {
                warn!(%err, "failed to send start command");
            }
        }
        Err(err) => warn!(%err, "failed to encode start command"),
    }
}

fn handler_table(with_fallback: bool) -> HandlerTable<RecognizerState> {
    let mut table = HandlerTable::for_namespace(NAMESPACE)
        .on_connected(send_start_command)
        .on_closed(|engine: &Engine<RecognizerState>, _event| {
            let state = engine.session();
            if let Some(callback) = &state.callbacks.on_close {
                callback();
            }
            if let Err(err) = engine.shutdown() {
                debug!(%err, "close handler found no live connection");
            }
        })
        .on(STARTED_EVENT, |engine: &Engine<RecognizerState>, event| {
            let state = engine.session();
            if let Some(callback) = &state.callbacks.on_started {
                callback(&event.text());
            }
            state.start_gate.resolve(true);
        })
        .on(RESULT_CHANGED_EVENT, |engine: &Engine<RecognizerState>, event| {
            if let Some(callback) = &engine.session().callbacks.on_result_changed {
                callback(&event.text());
            }
        })
        .on(COMPLETED_EVENT, |engine: &Engine<RecognizerState>, event| {
            let state = engine.session();
            if let Some(callback) = &state.callbacks.on_completed {
                callback(&event.text());
            }
            state.stop_gate.resolve(true);
        })
        .on(TASK_FAILED_NAME, |engine: &Engine<RecognizerState>, event| {
            let state = engine.session();
            if let Some(callback) = &state.callbacks.on_task_failed {
                callback(&event.text());
            }
            state.start_gate.resolve(false);
            state.stop_gate.resolve(false);
        });
    if with_fallback {
        table = table.on_fallback(|engine: &Engine<RecognizerState>, event| {
            if let Some(callback) = &engine.session().callbacks.on_unhandled {
                callback(&event.text());
            }
        });
    }
    table
}

/// A speech-recognition session. Each instance owns an independent engine
/// and an independent pair of completion gates.
pub struct SpeechRecognizer {
    engine: Engine<RecognizerState>,
}

impl SpeechRecognizer {
    pub fn new(config: ConnectionConfig, callbacks: RecognizerCallbacks) -> Self {
        let with_fallback = callbacks.on_unhandled.is_some();
        let state = RecognizerState {
            task_id: Mutex::new(String::new()),
            start_param: Mutex::new(Map::new()),
            start_gate: CompletionGate::new(),
            stop_gate: CompletionGate::new(),
            callbacks,
        };
        Self {
            engine: Engine::new(config, handler_table(with_fallback), ClassicDialect, state),
        }
    }

    /// Connects and issues the start command with a fresh task id.
    ///
    /// The returned waiter resolves `true` once the gateway acknowledges the
    /// start, `false` on task failure or shutdown.
    pub async fn start(
        &self,
        params: RecognitionParams,
        extra: Option<Map<String, Value>>,
    ) -> Result<GateWaiter, EngineError> {
        let mut start_param = crate::to_param_map(&params)?;
        if let Some(extra) = extra {
            start_param.extend(extra);
        }
        let state = self.engine.session();
        *lock(&state.start_param) = start_param;
        *lock(&state.task_id) = fresh_id();
        let waiter = state.start_gate.arm();
        self.engine.connect().await?;
        Ok(waiter)
    }

    /// Asks the gateway to finish the current task and deliver the final
    /// result.
    pub fn stop(&self) -> Result<GateWaiter, EngineError> {
        let state = self.engine.session();
        let request = ClassicRequest::new(
            NAMESPACE,
            STOP_NAME,
            &lock(&state.task_id),
            self.app_key(),
            None,
        );
        let body = request.to_json()?;
        let waiter = state.stop_gate.arm();
        self.engine.cmd(body)?;
        Ok(waiter)
    }

    pub fn send_audio(&self, data: Vec<u8>) -> Result<(), EngineError> {
        self.engine.send_raw_data(data)
    }

    /// Forcibly closes the session; any live start/stop gate resolves
    /// `false` exactly once.
    pub fn shutdown(&self) {
        if let Err(err) = self.engine.shutdown() {
            debug!(%err, "shutdown without live connection");
        }
        let state = self.engine.session();
        state.start_gate.resolve(false);
        state.stop_gate.resolve(false);
    }

    /// The task id minted by the most recent `start`.
    pub fn task_id(&self) -> String {
        lock(&self.engine.session().task_id).clone()
    }

    fn app_key(&self) -> &str {
        self.engine.config().app_key.as_deref().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params_match_gateway_expectations() {
        let params = RecognitionParams::default();
        assert_eq!(params.format, "pcm");
        assert_eq!(params.sample_rate, 16000);
        assert!(params.enable_intermediate_result);
        assert!(params.enable_punctuation_prediction);
        assert!(params.enable_inverse_text_normalization);
    }

    #[test]
    fn params_serialize_into_open_map_with_extras() {
        let mut map = crate::to_param_map(&RecognitionParams::default()).unwrap();
        let mut extra = Map::new();
        extra.insert("vocabulary_id".into(), Value::String("vocab-1".into()));
        map.extend(extra);

        assert_eq!(map["format"], "pcm");
        assert_eq!(map["sample_rate"], 16000);
        assert_eq!(map["vocabulary_id"], "vocab-1");
    }

    #[test]
    fn callbacks_builder_sets_slots() {
        let callbacks = RecognizerCallbacks::new()
            .on_started(|_| {})
            .on_close(|| {});
        assert!(callbacks.on_started.is_some());
        assert!(callbacks.on_close.is_some());
        assert!(callbacks.on_task_failed.is_none());
        assert!(callbacks.on_unhandled.is_none());
    }

    #[test]
    fn table_is_bound_to_the_recognizer_namespace() {
        assert_eq!(handler_table(false).namespace(), Some(NAMESPACE));
    }
}
