//! Connection configuration shared by every session type.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::EngineError;

/// Environment variable consulted by [`ConnectionConfig::api_key_from_env`].
pub const API_KEY_ENV: &str = "VOICEGATE_API_KEY";

/// Default WebSocket handshake timeout.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default budget for one inbound message, in bytes.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Default outbound write buffer, in bytes.
pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 128 * 1024;

/// How the gateway authenticates the connection.
///
/// A short-lived token obtained out of band goes into the gateway's token
/// header; an API key is sent as a bearer credential.
#[derive(Clone, Debug)]
pub enum Credential {
    Token(SecretString),
    ApiKey(SecretString),
}

/// Immutable connection parameters owned by the session and read by the
/// engine.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    pub url: String,
    pub credential: Credential,
    /// Application key embedded in classic-dialect request headers.
    pub app_key: Option<String>,
    pub read_buffer_size: usize,
    pub write_buffer_size: usize,
    pub handshake_timeout: Duration,
}

impl ConnectionConfig {
    /// Config for the classic dialect: gateway URL, application key and a
    /// short-lived token.
    pub fn with_token(
        url: impl Into<String>,
        app_key: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            credential: Credential::Token(SecretString::from(token.into())),
            app_key: Some(app_key.into()),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    /// Config for the streaming-task dialect, authenticated by API key.
    pub fn with_api_key(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            credential: Credential::ApiKey(SecretString::from(api_key.into())),
            app_key: None,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    /// Like [`ConnectionConfig::with_api_key`], reading the key from the
    /// `VOICEGATE_API_KEY` environment variable.
    pub fn api_key_from_env(url: impl Into<String>) -> Result<Self, EngineError> {
        let api_key = std::env::var(API_KEY_ENV)
            .map_err(|_| EngineError::Config(format!("obtain api key from env {API_KEY_ENV} failed")))?;
        Ok(Self::with_api_key(url, api_key))
    }

    pub fn buffer_sizes(mut self, read: usize, write: usize) -> Self {
        self.read_buffer_size = read;
        self.write_buffer_size = write;
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}
