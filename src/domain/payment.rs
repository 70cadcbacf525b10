use super::ids::{ShipmentId, TransactionId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Approved,
    Completed,
    Failed,
    Cancelled,
    Refunded,
}

impl PaymentStatus {
    /// Whether a capture may still be attempted for this transaction.
    pub fn is_capturable(&self) -> bool {
        matches!(self, Self::Pending | Self::Approved)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPaymentTransaction {
    pub shipment_id: ShipmentId,
    pub amount: Decimal,
    pub currency: String,
    pub custom_id: String,
}

impl NewPaymentTransaction {
    pub fn new(shipment_id: ShipmentId, amount: Decimal, currency: impl Into<String>) -> Self {
        Self {
            shipment_id,
            amount,
            currency: currency.into(),
            custom_id: format!("trans_{}", uuid::Uuid::new_v4().simple()),
        }
    }
}

/// One payment attempt for a shipment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: TransactionId,
    pub shipment_id: ShipmentId,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    /// Correlation id sent to the provider and echoed back in webhooks.
    pub custom_id: String,
    pub order_id: Option<String>,
    pub approval_url: Option<String>,
    pub capture_id: Option<String>,
    pub gateway_response: Option<serde_json::Value>,
    pub error_response: Option<serde_json::Value>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentTransaction {
    pub fn new(id: TransactionId, new: NewPaymentTransaction, now: DateTime<Utc>) -> Self {
        Self {
            id,
            shipment_id: new.shipment_id,
            amount: new.amount,
            currency: new.currency,
            status: PaymentStatus::Pending,
            custom_id: new.custom_id,
            order_id: None,
            approval_url: None,
            capture_id: None,
            gateway_response: None,
            error_response: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Picks the authoritative transaction: the most recent one that did not fail.
pub fn authoritative(transactions: &[PaymentTransaction]) -> Option<&PaymentTransaction> {
    transactions
        .iter()
        .filter(|tx| !matches!(tx.status, PaymentStatus::Failed | PaymentStatus::Cancelled))
        .max_by_key(|tx| (tx.created_at, tx.id))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: String,
    pub approval_url: String,
    pub status: String,
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCapture {
    pub capture_id: String,
    pub status: String,
    pub amount: Decimal,
    pub currency: String,
    pub raw: serde_json::Value,
}

impl OrderCapture {
    pub fn is_completed(&self) -> bool {
        self.status.eq_ignore_ascii_case("COMPLETED")
    }
}

/// The five transmission headers the provider signs webhooks with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebhookHeaders {
    pub auth_algo: Option<String>,
    pub transmission_id: Option<String>,
    pub cert_id: Option<String>,
    pub transmission_sig: Option<String>,
    pub transmission_time: Option<String>,
}

impl WebhookHeaders {
    pub const AUTH_ALGO: &'static str = "PAYPAL-AUTH-ALGO";
    pub const TRANSMISSION_ID: &'static str = "PAYPAL-TRANSMISSION-ID";
    pub const CERT_ID: &'static str = "PAYPAL-CERT-ID";
    pub const TRANSMISSION_SIG: &'static str = "PAYPAL-TRANSMISSION-SIG";
    pub const TRANSMISSION_TIME: &'static str = "PAYPAL-TRANSMISSION-TIME";

    /// Builds from any header lookup; blank values count as absent.
    pub fn from_lookup<'a>(lookup: impl Fn(&str) -> Option<&'a str>) -> Self {
        let get = |name: &str| {
            lookup(name)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        Self {
            auth_algo: get(Self::AUTH_ALGO),
            transmission_id: get(Self::TRANSMISSION_ID),
            cert_id: get(Self::CERT_ID),
            transmission_sig: get(Self::TRANSMISSION_SIG),
            transmission_time: get(Self::TRANSMISSION_TIME),
        }
    }

    /// Names of the required headers that are missing.
    pub fn missing(&self) -> Vec<&'static str> {
        [
            (Self::AUTH_ALGO, &self.auth_algo),
            (Self::TRANSMISSION_ID, &self.transmission_id),
            (Self::CERT_ID, &self.cert_id),
            (Self::TRANSMISSION_SIG, &self.transmission_sig),
            (Self::TRANSMISSION_TIME, &self.transmission_time),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_none())
        .map(|(name, _)| name)
        .collect()
    }
}

/// Inbound webhook envelope.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WebhookEvent {
    pub id: String,
    pub event_type: String,
    #[serde(default)]
    pub resource: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookEventKind {
    CaptureCompleted,
    CaptureDenied,
    CaptureRefunded,
    OrderApproved,
    OrderCompleted,
    Unknown,
}

impl WebhookEventKind {
    pub fn from_event_type(event_type: &str) -> Self {
        match event_type {
            "PAYMENT.CAPTURE.COMPLETED" => Self::CaptureCompleted,
            "PAYMENT.CAPTURE.DENIED" => Self::CaptureDenied,
            "PAYMENT.CAPTURE.REFUNDED" => Self::CaptureRefunded,
            "CHECKOUT.ORDER.APPROVED" => Self::OrderApproved,
            "CHECKOUT.ORDER.COMPLETED" => Self::OrderCompleted,
            _ => Self::Unknown,
        }
    }
}

impl WebhookEvent {
    pub fn kind(&self) -> WebhookEventKind {
        WebhookEventKind::from_event_type(&self.event_type)
    }

    fn resource_str(&self, pointer: &str) -> Option<&str> {
        self.resource
            .pointer(pointer)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    pub fn resource_id(&self) -> Option<&str> {
        self.resource_str("/id")
    }

    pub fn custom_id(&self) -> Option<&str> {
        self.resource_str("/custom_id")
            .or_else(|| self.resource_str("/purchase_units/0/custom_id"))
    }

    /// Order id a capture belongs to, when the provider includes it.
    pub fn related_order_id(&self) -> Option<&str> {
        self.resource_str("/supplementary_data/related_ids/order_id")
    }

    /// Capture id a refund refers to: the last path segment of its `up` link.
    pub fn refunded_capture_id(&self) -> Option<&str> {
        let links = self.resource.get("links")?.as_array()?;
        let href = links
            .iter()
            .find(|l| l.get("rel").and_then(|r| r.as_str()) == Some("up"))
            .or_else(|| links.first())?
            .get("href")?
            .as_str()?;
        href.trim_end_matches('/').rsplit('/').next().filter(|s| !s.is_empty())
    }

    pub fn amount(&self) -> Option<(Decimal, String)> {
        let value = self.resource_str("/amount/value")?.parse().ok()?;
        let currency = self.resource_str("/amount/currency_code").unwrap_or("USD");
        Some((value, currency.to_string()))
    }
}
