use crate::error::{GatewayError, Result, ShipmentError};
use reqwest::StatusCode;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Tokens are refreshed this long before the provider says they expire.
const EXPIRY_SKEW: Duration = Duration::from_secs(60);

pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(timeout)
        .build()
        .map_err(|e| ShipmentError::Config(format!("cannot build HTTP client: {e}")))
}

/// Maps a reqwest failure; timeouts are kept distinct from other transport errors.
pub fn transport_error(service: &'static str, err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout { service }
    } else if err.is_decode() {
        GatewayError::Malformed {
            service,
            message: err.to_string(),
        }
    } else {
        GatewayError::Transport {
            service,
            message: err.to_string(),
        }
    }
}

/// Sends the request and returns the status with the body parsed as JSON.
///
/// An empty or non-JSON body becomes `Value::Null` so callers can still inspect the status.
pub async fn send_json(
    service: &'static str,
    request: reqwest::RequestBuilder,
) -> std::result::Result<(StatusCode, serde_json::Value), GatewayError> {
    let response = request
        .send()
        .await
        .map_err(|e| transport_error(service, e))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(service, e))?;
    let value = serde_json::from_str(&body).unwrap_or(serde_json::Value::Null);
    Ok((status, value))
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Option<Instant>,
}

/// Process-local OAuth bearer token. Safe to drop at any time.
#[derive(Debug, Default)]
pub struct TokenCache {
    token: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn current(&self) -> Option<String> {
        let token = self.token.read().await;
        token
            .as_ref()
            .filter(|t| t.expires_at.is_none_or(|at| Instant::now() < at))
            .map(|t| t.value.clone())
    }

    pub async fn store(&self, value: String, expires_in: Option<u64>) {
        // An expiry past what `Instant` can hold is treated as no expiry.
        let expires_at = expires_in.and_then(|secs| {
            Instant::now().checked_add(Duration::from_secs(secs).saturating_sub(EXPIRY_SKEW))
        });
        *self.token.write().await = Some(CachedToken { value, expires_at });
    }

    pub async fn clear(&self) {
        *self.token.write().await = None;
    }
}
