//! Application layer: the shipment lifecycle and the inbound payment webhooks.
//!
//! `ShipmentOrchestrator` owns the stores and the outbound gateways and is the only place that
//! changes a shipment's status. `WebhookReceiver` turns verified provider events into
//! orchestrator calls.

pub mod locks;
pub mod orchestrator;
pub mod webhooks;

pub use crate::domain::ports::Stores;
pub use orchestrator::{
    CaptureOutcome, PaymentInitiation, QuoteOutcome, ShipmentDetails, ShipmentOrchestrator,
    TrackingReport,
};
pub use webhooks::{Dispatch, WebhookReceiver, WebhookReply};
