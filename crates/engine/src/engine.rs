//! The protocol engine: binds one transport to a handler table and a dialect
//! decoder, owns the connect/reconnect lifecycle, and dispatches decoded
//! frames.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::ConnectionConfig;
use crate::dialect::{DEFAULT_NAMESPACE, Dialect, EventIdentifier};
use crate::error::EngineError;
use crate::handler::{HandlerEvent, HandlerTable};
use crate::transport::{CloseCallback, Frame, FrameCallback, Transport};

/// Grace period between closing a previous connection and dialing a new one,
/// so in-flight callbacks from the old receive loop drain before the new
/// connection's callbacks can be dispatched.
const RECONNECT_GRACE: Duration = Duration::from_millis(100);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A protocol engine parameterized by the concrete session type `S`.
///
/// Handlers receive `&Engine<S>` and reach their session through
/// [`Engine::session`], so a handler can never observe a session of the
/// wrong type. Cloning is cheap and shares the same underlying connection.
pub struct Engine<S> {
    inner: Arc<EngineInner<S>>,
}

impl<S> Clone for Engine<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct EngineInner<S> {
    config: ConnectionConfig,
    table: HandlerTable<S>,
    dialect: Arc<dyn Dialect>,
    session: S,
    conn: Mutex<Option<Transport>>,
}

impl<S: Send + Sync + 'static> Engine<S> {
    pub fn new(
        config: ConnectionConfig,
        table: HandlerTable<S>,
        dialect: impl Dialect + 'static,
        session: S,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                config,
                table,
                dialect: Arc::new(dialect),
                session,
                conn: Mutex::new(None),
            }),
        }
    }

    pub fn session(&self) -> &S {
        &self.inner.session
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// Opens a connection, replacing any previous one.
    ///
    /// A live connection is closed first and the grace period observed before
    /// the new dial. On success the reserved connected handler is invoked
    /// synchronously before this returns; its absence is logged, not fatal.
    pub async fn connect(&self) -> Result<(), EngineError> {
        let previous = lock(&self.inner.conn).take();
        if let Some(conn) = previous {
            conn.close();
            tokio::time::sleep(RECONNECT_GRACE).await;
        }

        let weak = Arc::downgrade(&self.inner);
        let on_frame: FrameCallback = Arc::new(move |frame| {
            if let Some(inner) = weak.upgrade() {
                Engine { inner }.handle_frame(frame);
            }
        });
        let weak = Arc::downgrade(&self.inner);
        let on_close: CloseCallback = Arc::new(move |code, reason| {
            if let Some(inner) = weak.upgrade() {
                Engine { inner }.handle_close(code, reason);
            }
        });

        let transport = Transport::open(&self.inner.config, on_frame, Some(on_close)).await?;
        *lock(&self.inner.conn) = Some(transport);
        info!(url = %self.inner.config.url, "connect done");

        if let Some(handler) = self.inner.table.connected() {
            handler(
                self,
                HandlerEvent {
                    is_error: false,
                    payload: &[],
                },
            );
        } else {
            debug!("no connected handler registered");
        }
        Ok(())
    }

    /// Sends a text command. Callers must not call this before `connect`
    /// succeeds or after `shutdown`.
    pub fn cmd(&self, command: impl Into<String>) -> Result<(), EngineError> {
        let command = command.into();
        debug!(cmd = %command, "send command");
        let guard = lock(&self.inner.conn);
        let conn = guard.as_ref().ok_or(EngineError::NotConnected)?;
        conn.send_text(command)?;
        Ok(())
    }

    /// Sends a binary frame (audio data, typically).
    pub fn send_raw_data(&self, data: Vec<u8>) -> Result<(), EngineError> {
        let guard = lock(&self.inner.conn);
        let conn = guard.as_ref().ok_or(EngineError::NotConnected)?;
        conn.send_binary(data)?;
        Ok(())
    }

    /// Closes the underlying connection. Reports `NotConnected` if the
    /// engine has no live connection; the close itself is idempotent.
    pub fn shutdown(&self) -> Result<(), EngineError> {
        match lock(&self.inner.conn).take() {
            Some(conn) => {
                conn.close();
                Ok(())
            }
            None => Err(EngineError::NotConnected),
        }
    }

    fn handle_frame(&self, frame: Frame) {
        if let Err(err) = self.dispatch(&frame) {
            error!(%err, "frame dispatch failed, halting session");
            self.halt();
        }
    }

    /// Routes one classified frame to its handler.
    ///
    /// Fatal outcomes (`InvariantViolation`, `NamespaceMismatch`) are
    /// returned so the caller can halt this session; unroutable and
    /// undecodable frames are logged and dropped.
    pub(crate) fn dispatch(&self, frame: &Frame) -> Result<(), EngineError> {
        match frame {
            Frame::Binary(data) => {
                let Some(handler) = self.inner.table.raw() else {
                    return Err(EngineError::InvariantViolation(
                        "binary frame received but no raw handler is registered".into(),
                    ));
                };
                handler(
                    self,
                    HandlerEvent {
                        is_error: false,
                        payload: data,
                    },
                );
                Ok(())
            }
            Frame::Text(text) => {
                debug!(frame = %text, "recv text frame");
                let identifier = match self.inner.dialect.decode(text.as_bytes()) {
                    Ok(identifier) => identifier,
                    Err(err) => {
                        warn!(%err, "dropping undecodable frame");
                        return Ok(());
                    }
                };

                if let EventIdentifier::Classic {
                    namespace: Some(namespace),
                    ..
                } = &identifier
                {
                    if let Some(expected) = self.inner.table.namespace() {
                        if namespace != expected && namespace != DEFAULT_NAMESPACE {
                            return Err(EngineError::NamespaceMismatch {
                                expected: expected.to_string(),
                                got: namespace.clone(),
                            });
                        }
                    }
                }

                let event = HandlerEvent {
                    is_error: false,
                    payload: text.as_bytes(),
                };
                let key = identifier.key();
                if let Some(handler) = self.inner.table.get(key) {
                    handler(self, event);
                } else if self.inner.dialect.fallback_on_miss() {
                    match self.inner.table.fallback() {
                        Some(handler) => handler(self, event),
                        None => debug!(event = key, "no handler for event"),
                    }
                } else {
                    debug!(event = key, "no handler for event");
                }
                Ok(())
            }
        }
    }

    pub(crate) fn handle_close(&self, code: u16, reason: &str) {
        debug!(code, %reason, "transport reported close");
        if let Some(handler) = self.inner.table.closed() {
            handler(
                self,
                HandlerEvent {
                    is_error: true,
                    payload: reason.as_bytes(),
                },
            );
        }
    }

    fn halt(&self) {
        if let Some(conn) = lock(&self.inner.conn).take() {
            conn.close();
        }
    }
}
