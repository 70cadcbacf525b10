//! PayPal Orders v2 gateway.

mod transformers;

use self::transformers::{
    CaptureResponse, OrderRequest, OrderResponse, SERVICE, TokenResponse, VerifyRequest,
    VerifyResponse, rejection,
};
use crate::config::PaymentSettings;
use crate::domain::payment::{OrderCapture, OrderCreated, PaymentTransaction, WebhookHeaders};
use crate::domain::ports::PaymentGateway;
use crate::error::{GatewayError, GatewayResult, Result, ShipmentError};
use crate::infrastructure::http::{TokenCache, build_http_client, send_json};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct PayPalGateway {
    client: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    webhook_id: String,
    brand_name: String,
    public_url: String,
    tokens: TokenCache,
}

impl PayPalGateway {
    pub fn new(settings: &PaymentSettings, timeout: Duration) -> Result<Self> {
        if settings.client_id.trim().is_empty() || settings.client_secret.trim().is_empty() {
            return Err(ShipmentError::Config(
                "PayPal credentials missing: PAYPAL_CLIENT_ID, PAYPAL_CLIENT_SECRET".to_string(),
            ));
        }
        if settings.webhook_id.trim().is_empty() {
            warn!("PAYPAL_WEBHOOK_ID is not set; every webhook will be rejected");
        }

        Ok(Self {
            client: build_http_client(timeout)?,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            webhook_id: settings.webhook_id.trim().to_string(),
            brand_name: settings.brand_name.clone(),
            public_url: settings.public_url.trim_end_matches('/').to_string(),
            tokens: TokenCache::new(),
        })
    }

    async fn access_token(&self) -> GatewayResult<String> {
        if let Some(token) = self.tokens.current().await {
            return Ok(token);
        }

        debug!("requesting PayPal access token");
        let request = self
            .client
            .post(format!("{}/v1/oauth2/token", self.base_url))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")]);
        let (status, body) = send_json(SERVICE, request).await?;
        if !status.is_success() {
            return Err(GatewayError::Auth {
                service: SERVICE,
                message: format!("token request returned {status}"),
            });
        }

        let token: TokenResponse =
            serde_json::from_value(body).map_err(|e| GatewayError::Malformed {
                service: SERVICE,
                message: e.to_string(),
            })?;
        let value = token
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| GatewayError::Malformed {
                service: SERVICE,
                message: "token response has no access_token".to_string(),
            })?;
        self.tokens.store(value.clone(), token.expires_in).await;
        Ok(value)
    }

    /// Authenticated JSON POST returning the status and body untouched, apart from 401 handling.
    async fn post(&self, path: &str, body: &Value, prefer_representation: bool) -> GatewayResult<(StatusCode, Value)> {
        let token = self.access_token().await?;
        let mut request = self
            .client
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(token)
            .json(body);
        if prefer_representation {
            request = request.header("Prefer", "return=representation");
        }
        let (status, value) = send_json(SERVICE, request).await?;
        if status == StatusCode::UNAUTHORIZED {
            self.tokens.clear().await;
            return Err(GatewayError::Auth {
                service: SERVICE,
                message: format!("{path} rejected the access token"),
            });
        }
        Ok((status, value))
    }
}

fn malformed(e: serde_json::Error) -> GatewayError {
    GatewayError::Malformed {
        service: SERVICE,
        message: e.to_string(),
    }
}

#[async_trait]
impl PaymentGateway for PayPalGateway {
    async fn create_order(&self, tx: &PaymentTransaction) -> GatewayResult<OrderCreated> {
        let request = OrderRequest::new(tx, &self.brand_name, &self.public_url);
        let body = serde_json::to_value(&request).map_err(malformed)?;
        let (status, value) = self.post("/v2/checkout/orders", &body, false).await?;
        if !status.is_success() {
            let err = rejection(&value, "ORDER_CREATION_ERROR");
            warn!(%status, transaction = %tx.id, error = %err, "PayPal order creation failed");
            return Err(err);
        }

        let response: OrderResponse = serde_json::from_value(value.clone()).map_err(malformed)?;
        let order = response.into_order(value)?;
        info!(transaction = %tx.id, order_id = %order.order_id, "PayPal order created");
        Ok(order)
    }

    async fn capture_order(&self, order_id: &str) -> GatewayResult<OrderCapture> {
        let path = format!("/v2/checkout/orders/{order_id}/capture");
        let (status, value) = self.post(&path, &Value::Object(Default::default()), true).await?;
        if !status.is_success() {
            let err = rejection(&value, "ORDER_CAPTURE_ERROR");
            warn!(%status, order_id, error = %err, "PayPal capture failed");
            return Err(err);
        }

        let response: CaptureResponse = serde_json::from_value(value.clone()).map_err(malformed)?;
        let capture = response.into_capture(value)?;
        info!(order_id, capture_id = %capture.capture_id, status = %capture.status, "PayPal order captured");
        Ok(capture)
    }

    async fn verify_webhook_signature(&self, raw_payload: &str, headers: &WebhookHeaders) -> bool {
        let missing = headers.missing();
        if !missing.is_empty() {
            warn!(?missing, "webhook rejected: signature headers missing");
            return false;
        }
        if self.webhook_id.is_empty() {
            warn!("webhook rejected: no webhook id configured");
            return false;
        }
        let event: Value = match serde_json::from_str(raw_payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "webhook rejected: payload is not JSON");
                return false;
            }
        };
        let Some(request) = VerifyRequest::new(headers, &self.webhook_id, event) else {
            return false;
        };
        let body = match serde_json::to_value(&request) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "cannot encode verification request");
                return false;
            }
        };

        match self
            .post("/v1/notifications/verify-webhook-signature", &body, false)
            .await
        {
            Ok((status, value)) if status.is_success() => {
                let verified = serde_json::from_value::<VerifyResponse>(value)
                    .ok()
                    .and_then(|r| r.verification_status)
                    .is_some_and(|s| s == "SUCCESS");
                if !verified {
                    warn!("webhook signature verification failed");
                }
                verified
            }
            Ok((status, _)) => {
                warn!(%status, "webhook verification request rejected");
                false
            }
            Err(e) => {
                warn!(error = %e, "webhook verification request failed");
                false
            }
        }
    }
}
