//! Event-to-handler mapping for one session instance.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::Engine;

/// One dispatched frame as seen by a handler.
///
/// `payload` carries the raw frame bytes; classic/streaming envelopes are
/// left to the handler to re-parse if it needs more than the routing already
/// extracted.
#[derive(Debug, Clone, Copy)]
pub struct HandlerEvent<'a> {
    pub is_error: bool,
    pub payload: &'a [u8],
}

impl HandlerEvent<'_> {
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.payload)
    }
}

/// A dispatch target. Handlers run synchronously on the receive loop, in
/// strict arrival order; they must not block indefinitely.
pub type Handler<S> = Arc<dyn Fn(&Engine<S>, HandlerEvent<'_>) + Send + Sync>;

/// Immutable mapping from event identifier to handler, built once per
/// session instance.
///
/// Besides the named entries there are three engine-reserved slots
/// (`connected`, `closed`, `raw`) for connection-lifecycle and binary-frame
/// events, plus an optional `fallback` consulted on a lookup miss when the
/// dialect allows it.
pub struct HandlerTable<S> {
    namespace: Option<String>,
    entries: HashMap<String, Handler<S>>,
    connected: Option<Handler<S>>,
    closed: Option<Handler<S>>,
    raw: Option<Handler<S>>,
    fallback: Option<Handler<S>>,
}

impl<S> HandlerTable<S> {
    pub fn new() -> Self {
        Self {
            namespace: None,
            entries: HashMap::new(),
            connected: None,
            closed: None,
            raw: None,
            fallback: None,
        }
    }

    /// A table for a classic-dialect session addressed by `namespace`.
    pub fn for_namespace(namespace: impl Into<String>) -> Self {
        let mut table = Self::new();
        table.namespace = Some(namespace.into());
        table
    }

    pub fn on(
        mut self,
        name: impl Into<String>,
        handler: impl Fn(&Engine<S>, HandlerEvent<'_>) + Send + Sync + 'static,
    ) -> Self {
        self.entries.insert(name.into(), Arc::new(handler));
        self
    }

    /// Invoked synchronously by `connect` once the transport is up; this is
    /// where a session sends its start command.
    pub fn on_connected(
        mut self,
        handler: impl Fn(&Engine<S>, HandlerEvent<'_>) + Send + Sync + 'static,
    ) -> Self {
        self.connected = Some(Arc::new(handler));
        self
    }

    pub fn on_closed(
        mut self,
        handler: impl Fn(&Engine<S>, HandlerEvent<'_>) + Send + Sync + 'static,
    ) -> Self {
        self.closed = Some(Arc::new(handler));
        self
    }

    /// Consumer for binary frames. A dialect that produces binary frames
    /// without this slot registered is a programming error.
    pub fn on_raw(
        mut self,
        handler: impl Fn(&Engine<S>, HandlerEvent<'_>) + Send + Sync + 'static,
    ) -> Self {
        self.raw = Some(Arc::new(handler));
        self
    }

    /// Catch-all for events with no named entry, consulted only when the
    /// dialect enables fallback-on-miss.
    pub fn on_fallback(
        mut self,
        handler: impl Fn(&Engine<S>, HandlerEvent<'_>) + Send + Sync + 'static,
    ) -> Self {
        self.fallback = Some(Arc::new(handler));
        self
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub(crate) fn get(&self, key: &str) -> Option<&Handler<S>> {
        self.entries.get(key)
    }

    pub(crate) fn connected(&self) -> Option<&Handler<S>> {
        self.connected.as_ref()
    }

    pub(crate) fn closed(&self) -> Option<&Handler<S>> {
        self.closed.as_ref()
    }

    pub(crate) fn raw(&self) -> Option<&Handler<S>> {
        self.raw.as_ref()
    }

    pub(crate) fn fallback(&self) -> Option<&Handler<S>> {
        self.fallback.as_ref()
    }
}

impl<S> Default for HandlerTable<S> {
    fn default() -> Self {
        Self::new()
    }
}
