use super::orchestrator::{ShipmentOrchestrator, TransactionKey};
use crate::domain::payment::{WebhookEvent, WebhookEventKind, WebhookHeaders};
use crate::domain::ports::ProcessedEventStoreBox;
use crate::error::Result;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

/// What happened to a verified, well-formed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Handled,
    /// Event type we do not act on.
    Ignored,
    /// Already processed within the retention window.
    Duplicate,
    /// No transaction matches; the provider should redeliver.
    Unmatched,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookReply {
    Unauthorized,
    BadRequest(String),
    Accepted(Dispatch),
    Failed(String),
}

pub struct WebhookReceiver {
    orchestrator: Arc<ShipmentOrchestrator>,
    processed: ProcessedEventStoreBox,
    retention: Duration,
}

impl WebhookReceiver {
    pub fn new(
        orchestrator: Arc<ShipmentOrchestrator>,
        processed: ProcessedEventStoreBox,
        retention: Duration,
    ) -> Self {
        Self {
            orchestrator,
            processed,
            retention,
        }
    }

    pub async fn receive(&self, raw_body: &str, headers: &WebhookHeaders) -> WebhookReply {
        if !self.orchestrator.verify_webhook(raw_body, headers).await {
            return WebhookReply::Unauthorized;
        }

        let event: WebhookEvent = match serde_json::from_str(raw_body) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "webhook payload rejected");
                return WebhookReply::BadRequest(format!("Invalid webhook payload: {e}"));
            }
        };

        match self.process(&event).await {
            Ok(Dispatch::Unmatched) => WebhookReply::Failed(format!(
                "No payment transaction matches event {}",
                event.id
            )),
            Ok(dispatch) => WebhookReply::Accepted(dispatch),
            Err(e) => {
                error!(event_id = %event.id, event_type = %event.event_type, error = %e, "webhook processing failed");
                WebhookReply::Failed(e.to_string())
            }
        }
    }

    async fn process(&self, event: &WebhookEvent) -> Result<Dispatch> {
        let now = Utc::now();
        let since = now - self.retention;
        if self.processed.processed_since(&event.id, since).await? {
            info!(event_id = %event.id, "duplicate webhook event skipped");
            return Ok(Dispatch::Duplicate);
        }

        let dispatch = self.dispatch(event).await?;
        if dispatch != Dispatch::Unmatched {
            self.processed.record(&event.id, now).await?;
            let purged = self.processed.purge_before(since).await?;
            if purged > 0 {
                info!(purged, "expired webhook event records dropped");
            }
        }
        Ok(dispatch)
    }

    async fn dispatch(&self, event: &WebhookEvent) -> Result<Dispatch> {
        let kind = event.kind();
        let mut keys = Vec::new();
        match kind {
            WebhookEventKind::CaptureCompleted | WebhookEventKind::CaptureDenied => {
                keys.extend(event.custom_id().map(TransactionKey::CustomId));
                keys.extend(event.resource_id().map(TransactionKey::CaptureId));
                keys.extend(event.related_order_id().map(TransactionKey::OrderId));
            }
            WebhookEventKind::CaptureRefunded => {
                keys.extend(event.refunded_capture_id().map(TransactionKey::CaptureId));
                keys.extend(event.custom_id().map(TransactionKey::CustomId));
            }
            WebhookEventKind::OrderApproved | WebhookEventKind::OrderCompleted => {
                keys.extend(event.resource_id().map(TransactionKey::OrderId));
                keys.extend(event.custom_id().map(TransactionKey::CustomId));
            }
            WebhookEventKind::Unknown => {
                info!(event_type = %event.event_type, "unhandled webhook event type");
                return Ok(Dispatch::Ignored);
            }
        }

        let Some(tx) = self.orchestrator.locate_transaction(&keys).await? else {
            warn!(event_id = %event.id, event_type = %event.event_type, ?keys, "no transaction for webhook event");
            return Ok(Dispatch::Unmatched);
        };
        info!(event_id = %event.id, event_type = %event.event_type, transaction = %tx.id, "webhook event matched");

        let raw = event.resource.clone();
        match kind {
            WebhookEventKind::CaptureCompleted => {
                let capture_id = event.resource_id().map(str::to_string);
                self.orchestrator.record_capture(tx.id, capture_id, raw).await?;
            }
            WebhookEventKind::OrderCompleted => {
                let capture_id = raw
                    .pointer("/purchase_units/0/payments/captures/0/id")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                self.orchestrator.record_capture(tx.id, capture_id, raw).await?;
            }
            WebhookEventKind::CaptureDenied => {
                self.orchestrator.record_capture_denied(tx.id, raw).await?;
            }
            WebhookEventKind::CaptureRefunded => {
                self.orchestrator.record_refund(tx.id, raw).await?;
            }
            WebhookEventKind::OrderApproved => {
                self.orchestrator.record_approval(tx.id).await?;
            }
            WebhookEventKind::Unknown => return Ok(Dispatch::Ignored),
        }
        Ok(Dispatch::Handled)
    }
}
