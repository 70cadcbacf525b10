use super::carrier::{PickupAvailability, PickupConfirmation, ShipmentConfirmation};
use super::ids::{RateId, ShipmentId, TransactionId};
use super::notification::NotificationKind;
use super::payment::{
    NewPaymentTransaction, OrderCapture, OrderCreated, PaymentTransaction, WebhookHeaders,
};
use super::rate::{Rate, RateQuote};
use super::shipment::{NewShipment, Shipment, ShipmentStatus};
use super::tracking::{TrackingEvent, TrackingInfo};
use crate::error::{GatewayResult, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

#[async_trait]
pub trait ShipmentStore: Send + Sync {
    /// Persists a new shipment in `pending` and assigns its id.
    async fn create(&self, new: NewShipment, now: DateTime<Utc>) -> Result<Shipment>;
    async fn get(&self, id: ShipmentId) -> Result<Option<Shipment>>;
    /// Writes `shipment` only if the stored status still equals `expected`.
    ///
    /// Returns `false` without writing when the stored status has moved on.
    async fn compare_and_swap(&self, expected: ShipmentStatus, shipment: Shipment) -> Result<bool>;
}

#[async_trait]
pub trait RateStore: Send + Sync {
    async fn insert_all(&self, shipment_id: ShipmentId, quotes: Vec<RateQuote>) -> Result<Vec<Rate>>;
    /// Rates for a shipment, cheapest first.
    async fn for_shipment(&self, shipment_id: ShipmentId) -> Result<Vec<Rate>>;
    /// Marks `rate_id` selected and every other rate of the shipment unselected.
    ///
    /// Returns `None` (and changes nothing) when the rate does not belong to the shipment.
    async fn select(&self, shipment_id: ShipmentId, rate_id: RateId) -> Result<Option<Rate>>;
    async fn selected(&self, shipment_id: ShipmentId) -> Result<Option<Rate>>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn create(&self, new: NewPaymentTransaction, now: DateTime<Utc>) -> Result<PaymentTransaction>;
    async fn update(&self, tx: PaymentTransaction) -> Result<()>;
    async fn get(&self, id: TransactionId) -> Result<Option<PaymentTransaction>>;
    async fn find_by_custom_id(&self, custom_id: &str) -> Result<Option<PaymentTransaction>>;
    async fn find_by_order_id(&self, order_id: &str) -> Result<Option<PaymentTransaction>>;
    async fn find_by_capture_id(&self, capture_id: &str) -> Result<Option<PaymentTransaction>>;
    async fn for_shipment(&self, shipment_id: ShipmentId) -> Result<Vec<PaymentTransaction>>;
}

#[async_trait]
pub trait TrackingStore: Send + Sync {
    /// Appends the events not already stored; returns how many were new.
    async fn append(&self, shipment_id: ShipmentId, events: Vec<TrackingEvent>) -> Result<usize>;
    /// Stored events, oldest first.
    async fn for_shipment(&self, shipment_id: ShipmentId) -> Result<Vec<TrackingEvent>>;
}

/// Provider webhook event ids that were already processed.
#[async_trait]
pub trait ProcessedEventStore: Send + Sync {
    async fn processed_since(&self, event_id: &str, since: DateTime<Utc>) -> Result<bool>;
    async fn record(&self, event_id: &str, at: DateTime<Utc>) -> Result<()>;
    /// Drops records older than `before`; returns how many were removed.
    async fn purge_before(&self, before: DateTime<Utc>) -> Result<usize>;
}

/// Carrier API. Business failures come back as `GatewayError` values.
#[async_trait]
pub trait CarrierGateway: Send + Sync {
    async fn get_rates(&self, shipment: &Shipment) -> GatewayResult<Vec<RateQuote>>;
    async fn create_shipment(&self, shipment: &Shipment) -> GatewayResult<ShipmentConfirmation>;
    async fn retrieve_label(&self, confirmation: &ShipmentConfirmation) -> GatewayResult<String>;
    async fn schedule_pickup(&self, shipment: &Shipment, today: NaiveDate) -> GatewayResult<PickupConfirmation>;
    async fn check_pickup_availability(&self, shipment: &Shipment, today: NaiveDate) -> GatewayResult<PickupAvailability>;
    async fn track(&self, tracking_number: &str) -> GatewayResult<TrackingInfo>;
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(&self, tx: &PaymentTransaction) -> GatewayResult<OrderCreated>;
    async fn capture_order(&self, order_id: &str) -> GatewayResult<OrderCapture>;
    /// Fails closed: any missing header or verification error yields `false`.
    async fn verify_webhook_signature(&self, raw_payload: &str, headers: &WebhookHeaders) -> bool;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, shipment: &Shipment, kind: NotificationKind) -> Result<()>;
}

pub type ShipmentStoreBox = Box<dyn ShipmentStore>;
pub type RateStoreBox = Box<dyn RateStore>;
pub type PaymentStoreBox = Box<dyn PaymentStore>;
pub type TrackingStoreBox = Box<dyn TrackingStore>;
pub type ProcessedEventStoreBox = Box<dyn ProcessedEventStore>;
pub type CarrierGatewayBox = Box<dyn CarrierGateway>;
pub type PaymentGatewayBox = Box<dyn PaymentGateway>;
pub type NotifierBox = Box<dyn Notifier>;

/// Persistence handles the orchestrator owns.
pub struct Stores {
    pub shipments: ShipmentStoreBox,
    pub rates: RateStoreBox,
    pub payments: PaymentStoreBox,
    pub tracking: TrackingStoreBox,
}
