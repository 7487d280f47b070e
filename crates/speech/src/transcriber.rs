//! Long-form speech transcription over the classic dialect, with sentence
//! boundary events and a mid-task control channel.

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

pub const NAMESPACE: &str = "SpeechTranscriber";

pub const START_NAME: &str = "StartTranscription";
pub const STOP_NAME: &str = "StopTranscription";
pub const CONTROL_NAME: &str = "ControlTranscriber";

pub const STARTED_EVENT: &str = "TranscriptionStarted";
pub const SENTENCE_BEGIN_EVENT: &str = "SentenceBegin";
pub const SENTENCE_END_EVENT: &str = "SentenceEnd";
pub const RESULT_CHANGED_EVENT: &str = "TranscriptionResultChanged";
pub const COMPLETED_EVENT: &str = "TranscriptionCompleted";

/// Payload of the start command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionParams {
    pub format: String,
    pub sample_rate: u32,
    pub enable_intermediate_result: bool,
    pub enable_punctuation_prediction: bool,
    pub enable_inverse_text_normalization: bool,
    /// Silence, in milliseconds, after which the gateway closes the current
    /// sentence.
    pub max_sentence_silence: u32,
    pub enable_words: bool,
}

impl Default for TranscriptionParams {
    fn default() -> Self {
        Self {
            format: "pcm".to_string(),
            sample_rate: 16000,
            enable_intermediate_result: true,
            enable_punctuation_prediction: true,
            enable_inverse_text_normalization: true,
            max_sentence_silence: 800,
            enable_words: false,
        }
    }
}

/// Observer callbacks for one transcriber instance.
#[derive(Clone, Default)]
pub struct TranscriberCallbacks {
    pub(crate) on_task_failed: Option<EventCallback>,
    pub(crate) on_started: Option<EventCallback>,
    pub(crate) on_sentence_begin: Option<EventCallback>,
    pub(crate) on_sentence_end: Option<EventCallback>,
    pub(crate) on_result_changed: Option<EventCallback>,
    pub(crate) on_completed: Option<EventCallback>,
    pub(crate) on_close: Option<ClosedCallback>,
    pub(crate) on_unhandled: Option<EventCallback>,
}

impl TranscriberCallbacks {
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

    pub fn on_sentence_begin(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_sentence_begin = Some(std::sync::Arc::new(callback));
        self
    }

    pub fn on_sentence_end(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_sentence_end = Some(std::sync::Arc::new(callback));
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

    pub fn on_unhandled(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_unhandled = Some(std::sync::Arc::new(callback));
        self
    }
}

struct TranscriberState {
    task_id: Mutex<String>,
    start_param: Mutex<Map<String, Value>>,
    start_gate: CompletionGate,
    stop_gate: CompletionGate,
    callbacks: TranscriberCallbacks,
}

fn send_start_command(engine: &Engine<TranscriberState>, _event: HandlerEvent<'_>) {
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

fn handler_table(with_fallback: bool) -> HandlerTable<TranscriberState> {
    let mut table = HandlerTable::for_namespace(NAMESPACE)
        .on_connected(send_start_command)
        .on_closed(|engine: &Engine<TranscriberState>, _event| {
            let state = engine.session();
            if let Some(callback) = &state.callbacks.on_close {
                callback();
            }
            if let Err(err) = engine.shutdown() {
                debug!(%err, "close handler found no live connection");
            }
        })
        .on(STARTED_EVENT, |engine: &Engine<TranscriberState>, event| {
            let state = engine.session();
            if let Some(callback) = &state.callbacks.on_started {
                callback(&event.text());
            }
            state.start_gate.resolve(true);
        })
        .on(SENTENCE_BEGIN_EVENT, |engine: &Engine<TranscriberState>, event| {
            if let Some(callback) = &engine.session().callbacks.on_sentence_begin {
                callback(&event.text());
            }
        })
        .on(SENTENCE_END_EVENT, |engine: &Engine<TranscriberState>, event| {
            if let Some(callback) = &engine.session().callbacks.on_sentence_end {
                callback(&event.text());
            }
        })
        .on(RESULT_CHANGED_EVENT, |engine: &Engine<TranscriberState>, event| {
            if let Some(callback) = &engine.session().callbacks.on_result_changed {
                callback(&event.text());
            }
        })
        .on(COMPLETED_EVENT, |engine: &Engine<TranscriberState>, event| {
            let state = engine.session();
            if let Some(callback) = &state.callbacks.on_completed {
                callback(&event.text());
            }
            state.stop_gate.resolve(true);
        })
        .on(TASK_FAILED_NAME, |engine: &Engine<TranscriberState>, event| {
            let state = engine.session();
            if let Some(callback) = &state.callbacks.on_task_failed {
                callback(&event.text());
            }
            state.start_gate.resolve(false);
            state.stop_gate.resolve(false);
        });
    if with_fallback {
        table = table.on_fallback(|engine: &Engine<TranscriberState>, event| {
            if let Some(callback) = &engine.session().callbacks.on_unhandled {
                callback(&event.text());
            }
        });
    }
    table
}

/// A speech-transcription session for long-running audio streams.
pub struct SpeechTranscriber {
    engine: Engine<TranscriberState>,
}

impl SpeechTranscriber {
    pub fn new(config: ConnectionConfig, callbacks: TranscriberCallbacks) -> Self {
        let with_fallback = callbacks.on_unhandled.is_some();
        let state = TranscriberState {
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
    pub async fn start(
        &self,
        params: TranscriptionParams,
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

    /// Adjusts the running task, e.g. switching vocabularies mid-stream.
    pub fn control(&self, param: Map<String, Value>) -> Result<(), EngineError> {
        let state = self.engine.session();
        let request = ClassicRequest::new(
            NAMESPACE,
            CONTROL_NAME,
            &lock(&state.task_id),
            self.app_key(),
            Some(param),
        );
        self.engine.cmd(request.to_json()?)
    }

    /// Asks the gateway to finish the current task and flush pending
    /// sentences.
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
