use super::locks::ShipmentLocks;
use crate::domain::carrier::{PickupAvailability, ShipmentConfirmation};
use crate::domain::ids::{RateId, ShipmentId, TransactionId};
use crate::domain::notification::NotificationKind;
use crate::domain::payment::{
    NewPaymentTransaction, PaymentStatus, PaymentTransaction, WebhookHeaders, authoritative,
};
use crate::domain::ports::{
    CarrierGatewayBox, NotifierBox, PaymentGatewayBox, PaymentStoreBox, RateStoreBox,
    ShipmentStoreBox, Stores, TrackingStoreBox,
};
use crate::domain::rate::Rate;
use crate::domain::shipment::{NewShipment, PickupState, PickupType, Shipment, ShipmentStatus};
use crate::domain::tracking::{TrackingEvent, TrackingInfo, TrackingStatus};
use crate::error::{GatewayError, PaymentFailure, QuoteFailure, Result, ShipmentError};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum QuoteOutcome {
    Rates {
        shipment: Shipment,
        rates: Vec<Rate>,
    },
    Failed {
        shipment: Shipment,
        failure: QuoteFailure,
        message: String,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PaymentInitiation {
    Redirect {
        approval_url: String,
        transaction: PaymentTransaction,
    },
    Failed {
        failure: PaymentFailure,
        message: String,
        transaction: PaymentTransaction,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CaptureOutcome {
    /// Money captured; the shipment has moved on from `payment_pending`.
    Captured {
        transaction: PaymentTransaction,
        shipment: Shipment,
    },
    /// The provider accepted the capture but has not completed it yet.
    Pending { transaction: PaymentTransaction },
    AlreadyCompleted { transaction: PaymentTransaction },
    Failed {
        failure: PaymentFailure,
        message: String,
        transaction: PaymentTransaction,
    },
}

/// Everything known about one shipment.
#[derive(Debug, Clone, Serialize)]
pub struct ShipmentDetails {
    pub shipment: Shipment,
    pub rates: Vec<Rate>,
    pub transactions: Vec<PaymentTransaction>,
    pub tracking: Vec<TrackingEvent>,
    pub pickup_scheduled: bool,
    pub pickup_confirmation: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackingReport {
    pub shipment: Shipment,
    pub tracking: TrackingInfo,
    pub new_events: usize,
}

/// Keys a payment transaction can be found by, tried in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKey<'a> {
    CustomId(&'a str),
    CaptureId(&'a str),
    OrderId(&'a str),
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn gateway_error_json(err: &GatewayError) -> Value {
    json!({ "code": err.code(), "message": err.to_string() })
}

/// Drives a shipment through quote, payment, carrier creation, label, pickup and tracking.
///
/// Every mutating operation holds the shipment's lock for its whole duration and writes the
/// shipment back with a compare-and-swap on the status it read.
pub struct ShipmentOrchestrator {
    shipments: ShipmentStoreBox,
    rates: RateStoreBox,
    payments: PaymentStoreBox,
    tracking: TrackingStoreBox,
    carrier: CarrierGatewayBox,
    payment_gateway: PaymentGatewayBox,
    notifier: NotifierBox,
    locks: ShipmentLocks,
}

impl ShipmentOrchestrator {
    pub fn new(
        stores: Stores,
        carrier: CarrierGatewayBox,
        payment_gateway: PaymentGatewayBox,
        notifier: NotifierBox,
    ) -> Self {
        Self {
            shipments: stores.shipments,
            rates: stores.rates,
            payments: stores.payments,
            tracking: stores.tracking,
            carrier,
            payment_gateway,
            notifier,
            locks: ShipmentLocks::new(),
        }
    }

    async fn load(&self, id: ShipmentId) -> Result<Shipment> {
        self.shipments
            .get(id)
            .await?
            .ok_or(ShipmentError::ShipmentNotFound(id))
    }

    async fn save(&self, expected: ShipmentStatus, mut shipment: Shipment) -> Result<Shipment> {
        shipment.updated_at = Utc::now();
        if !self
            .shipments
            .compare_and_swap(expected, shipment.clone())
            .await?
        {
            return Err(ShipmentError::ConcurrentModification(shipment.id));
        }
        Ok(shipment)
    }

    async fn transition(&self, mut shipment: Shipment, next: ShipmentStatus) -> Result<Shipment> {
        let from = shipment.status;
        shipment.advance(next)?;
        let shipment = self.save(from, shipment).await?;
        info!(shipment_id = %shipment.id, %from, to = %next, "shipment status changed");
        Ok(shipment)
    }

    async fn notify(&self, shipment: &Shipment, kind: NotificationKind) {
        if let Err(e) = self.notifier.notify(shipment, kind).await {
            warn!(shipment_id = %shipment.id, notification = %kind, error = %e, "notification failed");
        }
    }

    // -----------------------------------------------------------------------
    // Quotes
    // -----------------------------------------------------------------------

    /// Creates a shipment in `pending` and asks the carrier for rates.
    pub async fn request_quote(&self, new: NewShipment) -> Result<QuoteOutcome> {
        new.validate(today())?;
        let shipment = self.shipments.create(new, Utc::now()).await?;
        info!(shipment_id = %shipment.id, "shipment created");

        let _guard = self.locks.lock(shipment.id).await;
        self.quote(shipment).await
    }

    /// Asks the carrier again for a shipment whose previous quote failed.
    pub async fn requote(&self, id: ShipmentId) -> Result<QuoteOutcome> {
        let _guard = self.locks.lock(id).await;
        let shipment = self.load(id).await?;
        if shipment.status != ShipmentStatus::Pending {
            return Err(ShipmentError::InvalidTransition {
                from: shipment.status,
                to: ShipmentStatus::QuoteReceived,
            });
        }
        self.quote(shipment).await
    }

    async fn quote(&self, shipment: Shipment) -> Result<QuoteOutcome> {
        match self.carrier.get_rates(&shipment).await {
            Ok(quotes) => {
                let rates = self.rates.insert_all(shipment.id, quotes).await?;
                let shipment = self.transition(shipment, ShipmentStatus::QuoteReceived).await?;
                info!(shipment_id = %shipment.id, count = rates.len(), "rates stored");
                Ok(QuoteOutcome::Rates { shipment, rates })
            }
            Err(err) => {
                let failure = QuoteFailure::classify(&err);
                warn!(shipment_id = %shipment.id, ?failure, error = %err, "rate quote failed");
                Ok(QuoteOutcome::Failed {
                    shipment,
                    failure,
                    message: failure.message().to_string(),
                })
            }
        }
    }

    /// Marks one rate as chosen and moves the shipment to `payment_pending`.
    pub async fn select_rate(&self, id: ShipmentId, rate_id: RateId) -> Result<Rate> {
        let _guard = self.locks.lock(id).await;
        let shipment = self.load(id).await?;
        if !shipment.status.can_transition_to(ShipmentStatus::PaymentPending) {
            return Err(ShipmentError::InvalidTransition {
                from: shipment.status,
                to: ShipmentStatus::PaymentPending,
            });
        }

        let rate = self
            .rates
            .select(id, rate_id)
            .await?
            .ok_or(ShipmentError::RateNotFound {
                shipment: id,
                rate: rate_id,
            })?;
        self.close_open_orders(id).await?;
        self.transition(shipment, ShipmentStatus::PaymentPending).await?;
        info!(shipment_id = %id, rate_id = %rate_id, total = %rate.total_rate, "rate selected");
        Ok(rate)
    }

    // -----------------------------------------------------------------------
    // Payment
    // -----------------------------------------------------------------------

    /// Opens a new provider order for the selected rate. Orders are never reused.
    pub async fn initiate_payment(&self, id: ShipmentId) -> Result<PaymentInitiation> {
        let _guard = self.locks.lock(id).await;
        let shipment = self.load(id).await?;
        if shipment.status != ShipmentStatus::PaymentPending {
            return Err(ShipmentError::PaymentNotAllowed(shipment.status));
        }
        let rate = self
            .rates
            .selected(id)
            .await?
            .ok_or(ShipmentError::NoRateSelected(id))?;

        self.close_open_orders(id).await?;
        let new = NewPaymentTransaction::new(id, rate.total_rate, rate.currency.clone());
        let mut tx = self.payments.create(new, Utc::now()).await?;

        match self.payment_gateway.create_order(&tx).await {
            Ok(order) => {
                tx.order_id = Some(order.order_id);
                tx.approval_url = Some(order.approval_url.clone());
                tx.gateway_response = Some(order.raw);
                tx.updated_at = Utc::now();
                self.payments.update(tx.clone()).await?;
                info!(shipment_id = %id, transaction = %tx.id, "payment order opened");
                Ok(PaymentInitiation::Redirect {
                    approval_url: order.approval_url,
                    transaction: tx,
                })
            }
            Err(err) => {
                let failure = PaymentFailure::classify(&err);
                tx.status = PaymentStatus::Failed;
                tx.error_response = Some(gateway_error_json(&err));
                tx.updated_at = Utc::now();
                self.payments.update(tx.clone()).await?;
                warn!(shipment_id = %id, transaction = %tx.id, ?failure, error = %err, "payment order failed");
                Ok(PaymentInitiation::Failed {
                    failure,
                    message: failure.message().to_string(),
                    transaction: tx,
                })
            }
        }
    }

    /// Cancels every still-capturable transaction of the shipment. Callers hold the lock.
    async fn close_open_orders(&self, id: ShipmentId) -> Result<()> {
        for mut tx in self.payments.for_shipment(id).await? {
            if tx.status.is_capturable() {
                tx.status = PaymentStatus::Cancelled;
                tx.updated_at = Utc::now();
                self.payments.update(tx.clone()).await?;
                info!(shipment_id = %id, transaction = %tx.id, "superseded payment order cancelled");
            }
        }
        Ok(())
    }

    async fn transaction(&self, id: TransactionId) -> Result<PaymentTransaction> {
        self.payments
            .get(id)
            .await?
            .ok_or_else(|| ShipmentError::TransactionNotFound(id.to_string()))
    }

    async fn transaction_by_order(&self, order_id: &str) -> Result<PaymentTransaction> {
        self.payments
            .find_by_order_id(order_id)
            .await?
            .ok_or_else(|| ShipmentError::TransactionNotFound(order_id.to_string()))
    }

    /// Captures an approved order when the buyer returns from the provider.
    pub async fn complete_payment(&self, order_id: &str, payer_id: Option<&str>) -> Result<CaptureOutcome> {
        let found = self.transaction_by_order(order_id).await?;
        let _guard = self.locks.lock(found.shipment_id).await;
        let mut tx = self.transaction(found.id).await?;

        if tx.status == PaymentStatus::Completed {
            info!(order_id, "payment already completed");
            return Ok(CaptureOutcome::AlreadyCompleted { transaction: tx });
        }
        if !tx.status.is_capturable() {
            return Err(ShipmentError::PaymentClosed {
                order_id: order_id.to_string(),
                status: tx.status,
            });
        }
        let shipment = self.load(tx.shipment_id).await?;
        let transactions = self.payments.for_shipment(tx.shipment_id).await?;
        let current = authoritative(&transactions).map(|t| t.id);
        if shipment.status != ShipmentStatus::PaymentPending || current != Some(tx.id) {
            warn!(
                order_id,
                shipment_id = %shipment.id,
                status = %shipment.status,
                "capture refused for a superseded order"
            );
            return Err(ShipmentError::PaymentClosed {
                order_id: order_id.to_string(),
                status: tx.status,
            });
        }
        if payer_id.is_none_or(|p| p.trim().is_empty()) {
            return Err(ShipmentError::PaymentNotApproved(order_id.to_string()));
        }

        match self.payment_gateway.capture_order(order_id).await {
            Ok(capture) if capture.is_completed() => {
                let (transaction, shipment) = self
                    .settle(tx, Some(capture.capture_id), Some(capture.raw))
                    .await?;
                Ok(CaptureOutcome::Captured {
                    transaction,
                    shipment,
                })
            }
            Ok(capture) => {
                info!(order_id, status = %capture.status, "capture not completed yet");
                tx.status = PaymentStatus::Approved;
                tx.capture_id = Some(capture.capture_id);
                tx.gateway_response = Some(capture.raw);
                tx.updated_at = Utc::now();
                self.payments.update(tx.clone()).await?;
                Ok(CaptureOutcome::Pending { transaction: tx })
            }
            Err(err) => {
                let failure = PaymentFailure::classify(&err);
                error!(order_id, ?failure, error = %err, "payment capture failed");
                tx.status = PaymentStatus::Failed;
                tx.error_response = Some(gateway_error_json(&err));
                tx.updated_at = Utc::now();
                self.payments.update(tx.clone()).await?;
                Ok(CaptureOutcome::Failed {
                    failure,
                    message: failure.message().to_string(),
                    transaction: tx,
                })
            }
        }
    }

    /// Buyer abandoned the checkout. The shipment stays where it is.
    pub async fn cancel_payment(&self, order_id: &str) -> Result<PaymentTransaction> {
        let found = self.transaction_by_order(order_id).await?;
        let _guard = self.locks.lock(found.shipment_id).await;
        let mut tx = self.transaction(found.id).await?;
        if tx.status.is_capturable() {
            tx.status = PaymentStatus::Cancelled;
            tx.updated_at = Utc::now();
            self.payments.update(tx.clone()).await?;
            info!(order_id, transaction = %tx.id, "payment cancelled by buyer");
        }
        Ok(tx)
    }

    /// Records a completed capture reported by the provider.
    pub async fn record_capture(
        &self,
        id: TransactionId,
        capture_id: Option<String>,
        raw: Value,
    ) -> Result<CaptureOutcome> {
        let found = self.transaction(id).await?;
        let _guard = self.locks.lock(found.shipment_id).await;
        let tx = self.transaction(id).await?;
        if tx.status == PaymentStatus::Completed {
            info!(transaction = %id, "capture already recorded");
            return Ok(CaptureOutcome::AlreadyCompleted { transaction: tx });
        }
        // The provider has taken the money, so the capture is recorded whatever we last knew.
        let transactions = self.payments.for_shipment(tx.shipment_id).await?;
        if authoritative(&transactions).map(|t| t.id) != Some(tx.id) {
            warn!(transaction = %id, status = %tx.status, "capture reported for a non-current transaction");
        }
        let (transaction, shipment) = self.settle(tx, capture_id, Some(raw)).await?;
        Ok(CaptureOutcome::Captured {
            transaction,
            shipment,
        })
    }

    /// Marks the transaction paid and, when the shipment is waiting on it, fulfils it.
    /// Callers hold the shipment lock.
    async fn settle(
        &self,
        mut tx: PaymentTransaction,
        capture_id: Option<String>,
        raw: Option<Value>,
    ) -> Result<(PaymentTransaction, Shipment)> {
        let now = Utc::now();
        tx.status = PaymentStatus::Completed;
        if capture_id.is_some() {
            tx.capture_id = capture_id;
        }
        if raw.is_some() {
            tx.gateway_response = raw;
        }
        tx.paid_at = Some(now);
        tx.updated_at = now;
        self.payments.update(tx.clone()).await?;
        info!(transaction = %tx.id, shipment_id = %tx.shipment_id, amount = %tx.amount, "payment completed");

        let shipment = self.load(tx.shipment_id).await?;
        if !matches!(
            shipment.status,
            ShipmentStatus::PaymentPending | ShipmentStatus::PaymentFailed
        ) {
            error!(
                shipment_id = %shipment.id,
                transaction = %tx.id,
                status = %shipment.status,
                "payment captured for a shipment that is not awaiting payment; needs reconciliation"
            );
            return Ok((tx, shipment));
        }

        let shipment = self.transition(shipment, ShipmentStatus::Paid).await?;
        self.notify(&shipment, NotificationKind::PaymentReceived).await;
        let shipment = self.fulfill(shipment).await?;
        Ok((tx, shipment))
    }

    pub async fn record_capture_denied(&self, id: TransactionId, raw: Value) -> Result<()> {
        let found = self.transaction(id).await?;
        let _guard = self.locks.lock(found.shipment_id).await;
        let mut tx = self.transaction(id).await?;
        if tx.status == PaymentStatus::Completed {
            warn!(transaction = %id, "denial received for a completed capture; ignored");
            return Ok(());
        }
        tx.status = PaymentStatus::Failed;
        tx.error_response = Some(raw);
        tx.updated_at = Utc::now();
        self.payments.update(tx.clone()).await?;

        let shipment = self.load(tx.shipment_id).await?;
        if shipment.status.can_transition_to(ShipmentStatus::PaymentFailed) {
            self.transition(shipment, ShipmentStatus::PaymentFailed).await?;
        }
        warn!(transaction = %id, shipment_id = %tx.shipment_id, "payment capture denied");
        Ok(())
    }

    pub async fn record_refund(&self, id: TransactionId, raw: Value) -> Result<()> {
        let found = self.transaction(id).await?;
        let _guard = self.locks.lock(found.shipment_id).await;
        let mut tx = self.transaction(id).await?;
        tx.status = PaymentStatus::Refunded;
        tx.gateway_response = Some(raw);
        tx.updated_at = Utc::now();
        self.payments.update(tx.clone()).await?;

        let shipment = self.load(tx.shipment_id).await?;
        if shipment.status.can_transition_to(ShipmentStatus::Refunded) {
            self.transition(shipment, ShipmentStatus::Refunded).await?;
        } else {
            warn!(shipment_id = %shipment.id, status = %shipment.status, "refund recorded without status change");
        }
        Ok(())
    }

    pub async fn record_approval(&self, id: TransactionId) -> Result<()> {
        let found = self.transaction(id).await?;
        let _guard = self.locks.lock(found.shipment_id).await;
        let mut tx = self.transaction(id).await?;
        if tx.status == PaymentStatus::Pending {
            tx.status = PaymentStatus::Approved;
            tx.updated_at = Utc::now();
            self.payments.update(tx).await?;
            info!(transaction = %id, "payment approved by buyer");
        }
        Ok(())
    }

    /// First transaction matching any of `keys`, in order.
    pub async fn locate_transaction(&self, keys: &[TransactionKey<'_>]) -> Result<Option<PaymentTransaction>> {
        for key in keys {
            let found = match key {
                TransactionKey::CustomId(v) => self.payments.find_by_custom_id(v).await?,
                TransactionKey::CaptureId(v) => self.payments.find_by_capture_id(v).await?,
                TransactionKey::OrderId(v) => self.payments.find_by_order_id(v).await?,
            };
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(None)
    }

    pub async fn verify_webhook(&self, raw_payload: &str, headers: &WebhookHeaders) -> bool {
        self.payment_gateway
            .verify_webhook_signature(raw_payload, headers)
            .await
    }

    // -----------------------------------------------------------------------
    // Fulfilment
    // -----------------------------------------------------------------------

    /// Re-runs carrier creation for a paid shipment whose first attempt failed.
    pub async fn retry_fulfillment(&self, id: ShipmentId) -> Result<Shipment> {
        let _guard = self.locks.lock(id).await;
        let shipment = self.load(id).await?;
        if !matches!(
            shipment.status,
            ShipmentStatus::Paid | ShipmentStatus::PaymentCompletedShipmentPending
        ) {
            return Err(ShipmentError::InvalidTransition {
                from: shipment.status,
                to: ShipmentStatus::ShipmentCreated,
            });
        }
        self.fulfill(shipment).await
    }

    async fn fulfill(&self, mut shipment: Shipment) -> Result<Shipment> {
        let confirmation = match self.carrier.create_shipment(&shipment).await {
            Ok(confirmation) => confirmation,
            Err(err) => {
                error!(shipment_id = %shipment.id, error = %err, "carrier shipment creation failed after payment");
                let expected = shipment.status;
                shipment.carrier_response = Some(json!({
                    "error": err.to_string(),
                    "code": err.code(),
                    "failed_at": Utc::now(),
                }));
                if expected == ShipmentStatus::Paid {
                    shipment.advance(ShipmentStatus::PaymentCompletedShipmentPending)?;
                }
                let shipment = self.save(expected, shipment).await?;
                self.notify(&shipment, NotificationKind::ShippingException).await;
                return Ok(shipment);
            }
        };

        shipment.tracking_number = Some(confirmation.tracking_number.clone());
        shipment.carrier_response = Some(serde_json::to_value(&confirmation)?);
        let shipment = self.transition(shipment, ShipmentStatus::ShipmentCreated).await?;
        self.notify(&shipment, NotificationKind::ShipmentConfirmed).await;

        let shipment = self.attach_label(shipment, &confirmation).await?;
        if shipment.pickup_type == PickupType::Pickup && !shipment.pickup.is_scheduled() {
            return self.auto_pickup(shipment).await;
        }
        Ok(shipment)
    }

    async fn attach_label(&self, mut shipment: Shipment, confirmation: &ShipmentConfirmation) -> Result<Shipment> {
        if confirmation.label_url.is_some() {
            self.notify(&shipment, NotificationKind::LabelReady).await;
            return Ok(shipment);
        }
        match self.carrier.retrieve_label(confirmation).await {
            Ok(url) => {
                shipment.set_label_url(&url);
                let shipment = self.transition(shipment, ShipmentStatus::LabelGenerated).await?;
                self.notify(&shipment, NotificationKind::LabelReady).await;
                Ok(shipment)
            }
            Err(err) => {
                warn!(shipment_id = %shipment.id, error = %err, "label not available yet");
                Ok(shipment)
            }
        }
    }

    async fn auto_pickup(&self, mut shipment: Shipment) -> Result<Shipment> {
        match self.carrier.schedule_pickup(&shipment, today()).await {
            Ok(pickup) => {
                shipment.pickup = PickupState::Scheduled {
                    confirmation: pickup.confirmation_number,
                    date: pickup.scheduled_date,
                };
                let shipment = self.transition(shipment, ShipmentStatus::PickupScheduled).await?;
                self.notify(&shipment, NotificationKind::PickupScheduled).await;
                Ok(shipment)
            }
            Err(err) => {
                warn!(shipment_id = %shipment.id, error = %err, "automatic pickup scheduling failed");
                let status = shipment.status;
                shipment.pickup = PickupState::failed(Utc::now(), err.to_string());
                self.save(status, shipment).await
            }
        }
    }

    // -----------------------------------------------------------------------
    // Pickup, label, tracking
    // -----------------------------------------------------------------------

    pub async fn pickup_availability(&self, id: ShipmentId) -> Result<PickupAvailability> {
        let shipment = self.load(id).await?;
        if !shipment.status.allows_pickup() {
            return Err(ShipmentError::PickupNotAllowed(shipment.status));
        }
        Ok(self
            .carrier
            .check_pickup_availability(&shipment, today())
            .await?)
    }

    pub async fn schedule_pickup(&self, id: ShipmentId) -> Result<Shipment> {
        let _guard = self.locks.lock(id).await;
        let mut shipment = self.load(id).await?;
        if !shipment.status.allows_pickup() {
            return Err(ShipmentError::PickupNotAllowed(shipment.status));
        }
        if shipment.pickup.is_scheduled() {
            return Err(ShipmentError::PickupAlreadyScheduled(id));
        }

        let today = today();
        let availability = self.carrier.check_pickup_availability(&shipment, today).await?;
        if !availability.available {
            return Err(ShipmentError::PickupUnavailable(id));
        }

        let status = shipment.status;
        match self.carrier.schedule_pickup(&shipment, today).await {
            Ok(pickup) => {
                shipment.pickup = PickupState::Scheduled {
                    confirmation: pickup.confirmation_number,
                    date: pickup.scheduled_date,
                };
                let shipment = if status.can_transition_to(ShipmentStatus::PickupScheduled) {
                    self.transition(shipment, ShipmentStatus::PickupScheduled).await?
                } else {
                    self.save(status, shipment).await?
                };
                self.notify(&shipment, NotificationKind::PickupScheduled).await;
                Ok(shipment)
            }
            Err(err) => {
                shipment.pickup = PickupState::failed(Utc::now(), err.to_string());
                self.save(status, shipment).await?;
                Err(err.into())
            }
        }
    }

    pub async fn label_url(&self, id: ShipmentId) -> Result<String> {
        let shipment = self.load(id).await?;
        shipment
            .label_url()
            .map(str::to_string)
            .ok_or(ShipmentError::LabelUnavailable(id))
    }

    /// Pulls carrier tracking, stores unseen scans and advances the status when it moved.
    pub async fn track_shipment(&self, id: ShipmentId) -> Result<TrackingReport> {
        let _guard = self.locks.lock(id).await;
        let mut shipment = self.load(id).await?;
        let tracking_number = shipment
            .tracking_number
            .clone()
            .ok_or(ShipmentError::TrackingUnavailable(id))?;

        let info = self.carrier.track(&tracking_number).await?;
        let events: Vec<TrackingEvent> = info
            .events
            .iter()
            .map(|scan| TrackingEvent::from_scan(id, &info, scan))
            .collect();
        let new_events = self.tracking.append(id, events).await?;

        let next = match info.status {
            TrackingStatus::Delivered => Some((ShipmentStatus::Delivered, NotificationKind::Delivered)),
            TrackingStatus::InTransit => Some((ShipmentStatus::InTransit, NotificationKind::Shipped)),
            _ => None,
        };
        if let Some((status, kind)) = next
            && shipment.status.can_transition_to(status)
        {
            shipment = self.transition(shipment, status).await?;
            self.notify(&shipment, kind).await;
        }

        Ok(TrackingReport {
            shipment,
            tracking: info,
            new_events,
        })
    }

    pub async fn track_number(&self, tracking_number: &str) -> Result<TrackingInfo> {
        Ok(self.carrier.track(tracking_number).await?)
    }

    pub async fn shipment(&self, id: ShipmentId) -> Result<Shipment> {
        self.load(id).await
    }

    pub async fn details(&self, id: ShipmentId) -> Result<ShipmentDetails> {
        let shipment = self.load(id).await?;
        Ok(ShipmentDetails {
            rates: self.rates.for_shipment(id).await?,
            transactions: self.payments.for_shipment(id).await?,
            tracking: self.tracking.for_shipment(id).await?,
            pickup_scheduled: shipment.pickup_scheduled(),
            pickup_confirmation: shipment.pickup_confirmation().map(str::to_string),
            shipment,
        })
    }
}
