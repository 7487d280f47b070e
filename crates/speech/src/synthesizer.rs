//! Speech synthesis over the streaming-task dialect. Text goes up in one
//! run-task request; audio comes back as raw binary frames.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use voicegate_engine::dialect::streaming::{
    RESULT_GENERATED_EVENT, StreamingPayload, StreamingRequest, TASK_FAILED_EVENT,
    TASK_FINISHED_EVENT, TASK_STARTED_EVENT,
};
use voicegate_engine::{
    CompletionGate, ConnectionConfig, Engine, EngineError, GateWaiter, HandlerEvent, HandlerTable,
    StreamingTaskDialect, fresh_id,
};

use crate::{ClosedCallback, DataCallback, EventCallback, lock};

pub const TASK_GROUP: &str = "audio";
pub const TASK: &str = "tts";
pub const FUNCTION: &str = "SpeechSynthesizer";

pub const PLAIN_TEXT_TYPE: &str = "PlainText";

/// Parameters of the synthesis task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisParams {
    pub text_type: String,
    pub format: String,
    pub sample_rate: u32,
    pub volume: u32,
    pub rate: f32,
    pub pitch: f32,
    pub phoneme_timestamp_enabled: bool,
    pub word_timestamp_enabled: bool,
}

impl Default for SynthesisParams {
    fn default() -> Self {
        Self {
            text_type: PLAIN_TEXT_TYPE.to_string(),
            format: "wav".to_string(),
            sample_rate: 16000,
            volume: 50,
            rate: 1.0,
            pitch: 1.0,
            phoneme_timestamp_enabled: false,
            word_timestamp_enabled: false,
        }
    }
}

/// Observer callbacks for one synthesizer instance.
#[derive(Clone, Default)]
pub struct SynthesizerCallbacks {
    pub(crate) on_started: Option<EventCallback>,
    pub(crate) on_task_failed: Option<EventCallback>,
    pub(crate) on_data: Option<DataCallback>,
    pub(crate) on_meta_info: Option<EventCallback>,
    pub(crate) on_completed: Option<EventCallback>,
    pub(crate) on_close: Option<ClosedCallback>,
}

impl SynthesizerCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invoked with the task id once the gateway starts the task.
    pub fn on_started(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_started = Some(std::sync::Arc::new(callback));
        self
    }

    pub fn on_task_failed(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_task_failed = Some(std::sync::Arc::new(callback));
        self
    }

    /// Receives each chunk of synthesized audio.
    pub fn on_data(mut self, callback: impl Fn(&[u8]) + Send + Sync + 'static) -> Self {
        self.on_data = Some(std::sync::Arc::new(callback));
        self
    }

    /// Receives timestamp/meta events emitted alongside the audio.
    pub fn on_meta_info(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_meta_info = Some(std::sync::Arc::new(callback));
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
}

struct SynthesizerState {
    task_id: Mutex<String>,
    model: Mutex<String>,
    start_param: Mutex<Map<String, Value>>,
    input_param: Mutex<Map<String, Value>>,
    complete_gate: CompletionGate,
    callbacks: SynthesizerCallbacks,
}

fn send_run_task_command(engine: &Engine<SynthesizerState>, _event: HandlerEvent<'_>) {
    let state = engine.session();
    let request = StreamingRequest::run_task(
        &lock(&state.task_id),
        StreamingPayload {
            model: lock(&state.model).clone(),
            task_group: TASK_GROUP.to_string(),
            task: TASK.to_string(),
            function: FUNCTION.to_string(),
            input: Some(lock(&state.input_param).clone()),
            parameters: Some(lock(&state.start_param).clone()),
        },
    );
    match request.to_json() {
        Ok(body) => {
            if let Err(err) = engine.cmd(body) {
                warn!(%err, "failed to send run-task command");
            }
        }
        Err(err) => warn!(%err, "failed to encode run-task command"),
    }
}

fn handler_table() -> HandlerTable<SynthesizerState> {
    HandlerTable::new()
        .on_connected(send_run_task_command)
        .on_closed(|engine: &Engine<SynthesizerState>, _event| {
            let state = engine.session();
            if let Some(callback) = &state.callbacks.on_close {
                callback();
            }
            if let Err(err) = engine.shutdown() {
                debug!(%err, "close handler found no live connection");
            }
        })
        .on_raw(|engine: &Engine<SynthesizerState>, event| {
            if let Some(callback) = &engine.session().callbacks.on_data {
                callback(event.payload);
            }
        })
        .on(TASK_STARTED_EVENT, |engine: &Engine<SynthesizerState>, _event| {
            let state = engine.session();
            if let Some(callback) = &state.callbacks.on_started {
                callback(&lock(&state.task_id));
            }
        })
        .on(RESULT_GENERATED_EVENT, |engine: &Engine<SynthesizerState>, event| {
            if let Some(callback) = &engine.session().callbacks.on_meta_info {
                callback(&event.text());
            }
        })
        .on(TASK_FINISHED_EVENT, |engine: &Engine<SynthesizerState>, event| {
            let state = engine.session();
            if let Some(callback) = &state.callbacks.on_completed {
                callback(&event.text());
            }
            state.complete_gate.resolve(true);
        })
        .on(TASK_FAILED_EVENT, |engine: &Engine<SynthesizerState>, event| {
            let state = engine.session();
            if let Some(callback) = &state.callbacks.on_task_failed {
                callback(&event.text());
            }
            state.complete_gate.resolve(false);
        })
}

/// A speech-synthesis session. One start produces one synthesized stream;
/// the completion gate resolves when the task finishes or fails.
pub struct SpeechSynthesizer {
    engine: Engine<SynthesizerState>,
}

impl SpeechSynthesizer {
    pub fn new(config: ConnectionConfig, callbacks: SynthesizerCallbacks) -> Self {
        let state = SynthesizerState {
            task_id: Mutex::new(String::new()),
            model: Mutex::new(String::new()),
            start_param: Mutex::new(Map::new()),
            input_param: Mutex::new(Map::new()),
            complete_gate: CompletionGate::new(),
            callbacks,
        };
        Self {
            engine: Engine::new(config, handler_table(), StreamingTaskDialect, state),
        }
    }

    /// Connects and issues a run-task request for `text` under the given
    /// voice model.
    pub async fn start(
        &self,
        model: &str,
        text: &str,
        params: SynthesisParams,
        extra: Option<Map<String, Value>>,
    ) -> Result<GateWaiter, EngineError> {
        if model.is_empty() {
            return Err(EngineError::Config("empty model".into()));
        }
        let mut start_param = crate::to_param_map(&params)?;
        if let Some(extra) = extra {
            start_param.extend(extra);
        }
        let mut input = Map::new();
        input.insert("text".into(), Value::String(text.to_string()));

        let state = self.engine.session();
        *lock(&state.model) = model.to_string();
        *lock(&state.start_param) = start_param;
        *lock(&state.input_param) = input;
        *lock(&state.task_id) = fresh_id();
        let waiter = state.complete_gate.arm();
        self.engine.connect().await?;
        Ok(waiter)
    }

    /// Forcibly closes the session; a live completion gate resolves `false`
    /// exactly once.
    pub fn shutdown(&self) {
        if let Err(err) = self.engine.shutdown() {
            debug!(%err, "shutdown without live connection");
        }
        self.engine.session().complete_gate.resolve(false);
    }

    /// The task id minted by the most recent `start`.
    pub fn task_id(&self) -> String {
        lock(&self.engine.session().task_id).clone()
    }
}
