//! WebSocket transport: one handshake, a background receive loop, serialized
//! outbound writes, idempotent shutdown. No protocol knowledge lives here.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async_with_config;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::http::{HeaderValue, Request};
use tokio_tungstenite::tungstenite::protocol::{Message, WebSocketConfig};
use tokio_tungstenite::tungstenite::Error as WsError;
use tracing::debug;

use crate::config::{ConnectionConfig, Credential};

/// Dial attempts before a transient handshake failure becomes fatal.
const DIAL_RETRY_BUDGET: u32 = 5;

/// Pause between transient-failure dial attempts.
const DIAL_RETRY_BACKOFF: Duration = Duration::from_millis(10);

/// Header carrying a short-lived token credential.
const TOKEN_HEADER: &str = "x-voicegate-token";

/// Close code reported when the peer sent no status.
const NO_STATUS_CODE: u16 = 1005;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("websocket handshake failed: {0}")]
    Handshake(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("websocket handshake timed out")]
    HandshakeTimeout,
    #[error("invalid connection request: {0}")]
    Request(String),
    #[error("connection closed")]
    Closed,
    #[error("empty binary payload")]
    EmptyPayload,
}

/// One inbound frame, classified by the receive loop.
#[derive(Debug, Clone)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

pub(crate) type FrameCallback = Arc<dyn Fn(Frame) + Send + Sync>;
pub(crate) type CloseCallback = Arc<dyn Fn(u16, &str) + Send + Sync>;

enum Outbound {
    Text(String),
    Binary(Vec<u8>),
    Close,
}

/// One open connection. Never reused: a reconnect always builds a new
/// `Transport`.
pub(crate) struct Transport {
    outbound: mpsc::UnboundedSender<Outbound>,
    reader: JoinHandle<()>,
    closed: Arc<AtomicBool>,
}

impl Transport {
    /// Dials the gateway and starts the receive and write loops.
    ///
    /// Transient handshake failures (the far end dropping the socket before
    /// the upgrade completes) are retried up to the fixed budget with a short
    /// backoff; any other dial error is fatal immediately.
    pub(crate) async fn open(
        config: &ConnectionConfig,
        on_frame: FrameCallback,
        on_close: Option<CloseCallback>,
    ) -> Result<Self, TransportError> {
        let mut failures = 0u32;
        let stream = loop {
            let request = build_request(config)?;
            let dial = connect_async_with_config(request, Some(socket_config(config)), false);
            match tokio::time::timeout(config.handshake_timeout, dial).await {
                Err(_) => return Err(TransportError::HandshakeTimeout),
                Ok(Ok((stream, _response))) => break stream,
                Ok(Err(err)) if is_transient_dial_error(&err) => {
                    failures += 1;
                    debug!(%err, attempt = failures, "transient dial failure");
                    if failures >= DIAL_RETRY_BUDGET {
                        return Err(err.into());
                    }
                    tokio::time::sleep(DIAL_RETRY_BACKOFF).await;
                }
                Ok(Err(err)) => {
                    debug!(%err, "dial failed");
                    return Err(err.into());
                }
            }
        };

        let (mut sink, mut source) = stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel();

        // Write loop: the single owner of the sink half. Everything outbound
        // funnels through here, which serializes writes from any caller task.
        tokio::spawn(async move {
            while let Some(item) = outbound_rx.recv().await {
                let result = match item {
                    Outbound::Text(text) => sink.send(Message::Text(text)).await,
                    Outbound::Binary(data) => sink.send(Message::Binary(data)).await,
                    Outbound::Close => {
                        let _ = sink.close().await;
                        break;
                    }
                };
                if let Err(err) = result {
                    debug!(%err, "outbound write failed, stopping write loop");
                    break;
                }
            }
        });

        // Receive loop: classifies each frame and hands it to the single
        // registered callback. Calls are fully serialized; the callback must
        // not block indefinitely.
        let reader = tokio::spawn(async move {
            while let Some(message) = source.next().await {
                match message {
                    Ok(Message::Text(text)) => on_frame(Frame::Text(text)),
                    Ok(Message::Binary(data)) => on_frame(Frame::Binary(data)),
                    Ok(Message::Close(frame)) => {
                        let (code, reason) = frame
                            .map(|f| (u16::from(f.code), f.reason.into_owned()))
                            .unwrap_or((NO_STATUS_CODE, String::new()));
                        debug!(code, %reason, "connection closed by peer");
                        if let Some(callback) = &on_close {
                            callback(code, &reason);
                        }
                        break;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        debug!(%err, "receive loop terminated");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            outbound,
            reader,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    pub(crate) fn send_text(&self, text: String) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.outbound
            .send(Outbound::Text(text))
            .map_err(|_| TransportError::Closed)
    }

    pub(crate) fn send_binary(&self, data: Vec<u8>) -> Result<(), TransportError> {
        if data.is_empty() {
            return Err(TransportError::EmptyPayload);
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.outbound
            .send(Outbound::Binary(data))
            .map_err(|_| TransportError::Closed)
    }

    /// Initiates the close handshake and stops the receive loop. Idempotent:
    /// closing an already-closed connection is a no-op.
    pub(crate) fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.outbound.send(Outbound::Close);
        self.reader.abort();
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.close();
    }
}

fn socket_config(config: &ConnectionConfig) -> WebSocketConfig {
    let mut ws_config = WebSocketConfig::default();
    ws_config.write_buffer_size = config.write_buffer_size;
    ws_config.max_message_size = Some(config.read_buffer_size);
    ws_config
}

fn build_request(config: &ConnectionConfig) -> Result<Request<()>, TransportError> {
    use secrecy::ExposeSecret;

    let mut request = config.url.as_str().into_client_request()?;
    let (header, value) = match &config.credential {
        Credential::Token(token) => (TOKEN_HEADER, token.expose_secret().to_string()),
        Credential::ApiKey(key) => ("authorization", format!("Bearer {}", key.expose_secret())),
    };
    let value: HeaderValue = value
        .parse()
        .map_err(|_| TransportError::Request("credential is not a valid header value".into()))?;
    request.headers_mut().insert(header, value);
    Ok(request)
}

/// Whether a dial failure looks like the far end dropping the stream before
/// the upgrade completed, which is worth retrying.
fn is_transient_dial_error(err: &WsError) -> bool {
    match err {
        WsError::Io(io_err) => matches!(
            io_err.kind(),
            std::io::ErrorKind::UnexpectedEof
                | std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::BrokenPipe
        ),
        WsError::Protocol(
            ProtocolError::HandshakeIncomplete | ProtocolError::ResetWithoutClosingHandshake,
        ) => true,
        _ => false,
    }
}
