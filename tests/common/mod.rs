#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{Value, json};
use shipflow::application::{PaymentInitiation, QuoteOutcome, ShipmentOrchestrator, Stores};
use shipflow::domain::carrier::{PickupAvailability, PickupConfirmation, ShipmentConfirmation};
use shipflow::domain::ids::ShipmentId;
use shipflow::domain::notification::NotificationKind;
use shipflow::domain::payment::{OrderCapture, OrderCreated, PaymentTransaction, WebhookHeaders};
use shipflow::domain::ports::{CarrierGateway, Notifier, PaymentGateway};
use shipflow::domain::rate::{Rate, RateQuote};
use shipflow::domain::shipment::{
    DeliveryType, DimensionUnit, NewShipment, Package, Party, PickupType, Shipment, WeightUnit,
};
use shipflow::domain::tracking::{TrackingInfo, TrackingStatus};
use shipflow::error::{GatewayError, GatewayResult, Result};
use std::sync::{Arc, Mutex};

pub fn ship_date() -> NaiveDate {
    Utc::now().date_naive() + Days::new(3)
}

/// 5lb, 10x10x10in, Los Angeles to New York.
pub fn new_shipment(pickup_type: PickupType) -> NewShipment {
    NewShipment {
        sender: Party {
            name: "Ada Sender".into(),
            email: "ada@example.com".into(),
            phone: "(310) 555-0100".into(),
            address: "1 Main St".into(),
            city: "Los Angeles".into(),
            state: "CA".into(),
            zip: "90001".into(),
        },
        recipient: Party {
            name: "Rob Recipient".into(),
            email: String::new(),
            phone: "212-555-0199".into(),
            address: "2 Broad St".into(),
            city: "New York".into(),
            state: "NY".into(),
            zip: "10004".into(),
        },
        package: Package {
            length: dec!(10),
            width: dec!(10),
            height: dec!(10),
            weight: dec!(5),
            weight_unit: WeightUnit::Lb,
            dimension_unit: DimensionUnit::In,
            description: "Books".into(),
            declared_value: dec!(100),
            currency: "USD".into(),
        },
        delivery_type: DeliveryType::Standard,
        pickup_type,
        preferred_ship_date: ship_date(),
    }
}

pub fn quote(service: &str, base: Decimal, days: u32) -> RateQuote {
    RateQuote::new(service, base, "USD", Some(days), Value::Null)
}

#[derive(Clone)]
pub struct StubCarrier {
    pub rates: GatewayResult<Vec<RateQuote>>,
    pub confirmation: GatewayResult<ShipmentConfirmation>,
    pub pickup: GatewayResult<String>,
    pub pickup_available: bool,
    pub tracking_status: TrackingStatus,
    pub calls: Arc<Mutex<Vec<&'static str>>>,
}

impl Default for StubCarrier {
    fn default() -> Self {
        Self {
            rates: Ok(vec![
                quote("PRIORITY_OVERNIGHT", dec!(61.40), 1),
                quote("FEDEX_GROUND", dec!(15.10), 4),
                quote("FEDEX_2_DAY", dec!(33.75), 2),
            ]),
            confirmation: Ok(ShipmentConfirmation {
                tracking_number: "794644790138".into(),
                master_tracking_number: "794644790138".into(),
                service_type: "FEDEX_GROUND".into(),
                label_url: Some("https://labels.example/794644790138.pdf".into()),
                job_id: None,
            }),
            pickup: Ok("CXL-123".into()),
            pickup_available: true,
            tracking_status: TrackingStatus::InTransit,
            calls: Arc::default(),
        }
    }
}

impl StubCarrier {
    pub fn calls(&self, name: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == name).count()
    }

    fn record(&self, name: &'static str) {
        self.calls.lock().unwrap().push(name);
    }
}

#[async_trait]
impl CarrierGateway for StubCarrier {
    async fn get_rates(&self, _: &Shipment) -> GatewayResult<Vec<RateQuote>> {
        self.record("get_rates");
        let mut rates = self.rates.clone()?;
        shipflow::domain::rate::sort_by_total(&mut rates);
        Ok(rates)
    }

    async fn create_shipment(&self, _: &Shipment) -> GatewayResult<ShipmentConfirmation> {
        self.record("create_shipment");
        self.confirmation.clone()
    }

    async fn retrieve_label(&self, confirmation: &ShipmentConfirmation) -> GatewayResult<String> {
        self.record("retrieve_label");
        confirmation
            .label_url
            .clone()
            .ok_or_else(|| GatewayError::rejected("LABEL.UNAVAILABLE", "label not ready"))
    }

    async fn schedule_pickup(&self, _: &Shipment, today: NaiveDate) -> GatewayResult<PickupConfirmation> {
        self.record("schedule_pickup");
        let confirmation_number = self.pickup.clone()?;
        Ok(PickupConfirmation {
            confirmation_number,
            scheduled_date: today + Days::new(1),
            carrier_code: "FDXG".into(),
            location: None,
        })
    }

    async fn check_pickup_availability(&self, _: &Shipment, today: NaiveDate) -> GatewayResult<PickupAvailability> {
        self.record("check_pickup_availability");
        Ok(PickupAvailability {
            available: self.pickup_available,
            pickup_date: today,
            cutoff_time: Some("16:00".into()),
            access_time: None,
        })
    }

    async fn track(&self, tracking_number: &str) -> GatewayResult<TrackingInfo> {
        self.record("track");
        Ok(TrackingInfo {
            tracking_number: tracking_number.into(),
            status: self.tracking_status,
            status_description: "In transit".into(),
            estimated_delivery: None,
            events: vec![shipflow::domain::tracking::ScanEvent {
                occurred_at: Some(Utc::now()),
                description: "Picked up".into(),
                location: Some("LOS ANGELES".into()),
            }],
        })
    }
}

#[derive(Clone)]
pub struct StubPayments {
    pub create: GatewayResult<()>,
    pub capture_status: GatewayResult<String>,
    pub verified: bool,
    pub calls: Arc<Mutex<Vec<&'static str>>>,
}

impl Default for StubPayments {
    fn default() -> Self {
        Self {
            create: Ok(()),
            capture_status: Ok("COMPLETED".into()),
            verified: true,
            calls: Arc::default(),
        }
    }
}

impl StubPayments {
    pub fn calls(&self, name: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == name).count()
    }
}

#[async_trait]
impl PaymentGateway for StubPayments {
    async fn create_order(&self, tx: &PaymentTransaction) -> GatewayResult<OrderCreated> {
        self.calls.lock().unwrap().push("create_order");
        self.create.clone()?;
        Ok(OrderCreated {
            order_id: format!("ORDER-{}", tx.id),
            approval_url: format!("https://paypal.example/checkoutnow?token=ORDER-{}", tx.id),
            status: "CREATED".into(),
            raw: json!({ "id": format!("ORDER-{}", tx.id) }),
        })
    }

    async fn capture_order(&self, order_id: &str) -> GatewayResult<OrderCapture> {
        self.calls.lock().unwrap().push("capture_order");
        let status = self.capture_status.clone()?;
        Ok(OrderCapture {
            capture_id: format!("CAP-{order_id}"),
            status,
            amount: dec!(16.61),
            currency: "USD".into(),
            raw: json!({ "id": order_id }),
        })
    }

    async fn verify_webhook_signature(&self, _: &str, headers: &WebhookHeaders) -> bool {
        self.calls.lock().unwrap().push("verify");
        self.verified && headers.missing().is_empty()
    }
}

#[derive(Clone, Default)]
pub struct RecordingNotifier {
    pub sent: Arc<Mutex<Vec<(ShipmentId, NotificationKind)>>>,
}

impl RecordingNotifier {
    pub fn count(&self, kind: NotificationKind) -> usize {
        self.sent.lock().unwrap().iter().filter(|(_, k)| *k == kind).count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, shipment: &Shipment, kind: NotificationKind) -> Result<()> {
        self.sent.lock().unwrap().push((shipment.id, kind));
        Ok(())
    }
}

pub fn orchestrator(
    carrier: &StubCarrier,
    payments: &StubPayments,
    notifier: &RecordingNotifier,
) -> ShipmentOrchestrator {
    ShipmentOrchestrator::new(
        Stores::in_memory(),
        Box::new(carrier.clone()),
        Box::new(payments.clone()),
        Box::new(notifier.clone()),
    )
}

/// Quotes, selects the cheapest rate and opens a payment order.
pub async fn checkout(
    orchestrator: &ShipmentOrchestrator,
    pickup_type: PickupType,
) -> (Shipment, Rate, PaymentTransaction) {
    let QuoteOutcome::Rates { shipment, rates } = orchestrator
        .request_quote(new_shipment(pickup_type))
        .await
        .unwrap()
    else {
        panic!("expected rates");
    };
    let rate = orchestrator.select_rate(shipment.id, rates[0].id).await.unwrap();
    let PaymentInitiation::Redirect { transaction, .. } =
        orchestrator.initiate_payment(shipment.id).await.unwrap()
    else {
        panic!("expected approval redirect");
    };
    (shipment, rate, transaction)
}

pub fn signed_headers() -> Vec<(&'static str, &'static str)> {
    vec![
        ("PAYPAL-AUTH-ALGO", "SHA256withRSA"),
        ("PAYPAL-TRANSMISSION-ID", "69cd13f0-d67a-11e5-baa3-778b53f4ae55"),
        ("PAYPAL-CERT-ID", "CERT-360caa42"),
        ("PAYPAL-TRANSMISSION-SIG", "lmI95Jx3Y9nhR5SJWlHVIWpg4AgFk7n9bCHSRxbrd8A9zrhdu2rMyFrmz"),
        ("PAYPAL-TRANSMISSION-TIME", "2025-07-07T10:00:00Z"),
    ]
}

pub fn capture_completed_event(event_id: &str, tx: &PaymentTransaction) -> Value {
    json!({
        "id": event_id,
        "event_type": "PAYMENT.CAPTURE.COMPLETED",
        "resource": {
            "id": format!("CAP-{event_id}"),
            "status": "COMPLETED",
            "custom_id": tx.custom_id,
            "amount": { "currency_code": "USD", "value": tx.amount.to_string() },
            "supplementary_data": { "related_ids": { "order_id": tx.order_id } }
        }
    })
}
