//! One-shot HTTP exchange of long-lived credentials for a short-lived
//! gateway token. The engine only ever consumes the resulting token; it
//! never performs this exchange itself.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("token service rejected the request: {0}")]
    Rejected(String),
}

/// A short-lived gateway token.
#[derive(Debug, Clone, Deserialize)]
pub struct Token {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "UserId", default)]
    pub user_id: String,
    /// Unix timestamp after which the token is no longer valid.
    #[serde(rename = "ExpireTime")]
    pub expire_time: i64,
}

#[derive(Debug, Deserialize)]
struct TokenEnvelope {
    #[serde(rename = "ErrMsg", default)]
    err_msg: String,
    #[serde(rename = "Token")]
    token: Option<Token>,
}

/// Exchanges an access-key pair for a short-lived token.
pub async fn fetch_token(
    endpoint: &str,
    access_key_id: &str,
    access_key_secret: &SecretString,
) -> Result<Token, TokenError> {
    let client = reqwest::Client::new();
    let response = client
        .post(endpoint)
        .json(&serde_json::json!({
            "AccessKeyId": access_key_id,
            "AccessKeySecret": access_key_secret.expose_secret(),
        }))
        .send()
        .await?
        .error_for_status()?;

    let envelope: TokenEnvelope = response.json().await?;
    if !envelope.err_msg.is_empty() {
        return Err(TokenError::Rejected(envelope.err_msg));
    }
    envelope
        .token
        .ok_or_else(|| TokenError::Rejected("response carried no token".into()))
}
