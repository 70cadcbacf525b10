use super::ids::ShipmentId;
use crate::error::{Result, ShipmentError};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One side of a shipment (sender or recipient).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Party {
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum WeightUnit {
    #[default]
    #[serde(rename = "LB", alias = "lb")]
    Lb,
    #[serde(rename = "KG", alias = "kg")]
    Kg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DimensionUnit {
    #[default]
    #[serde(rename = "IN", alias = "in")]
    In,
    #[serde(rename = "CM", alias = "cm")]
    Cm,
}

impl WeightUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lb => "LB",
            Self::Kg => "KG",
        }
    }
}

impl DimensionUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::In => "IN",
            Self::Cm => "CM",
        }
    }
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_declared_value() -> Decimal {
    Decimal::ONE_HUNDRED
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub length: Decimal,
    pub width: Decimal,
    pub height: Decimal,
    pub weight: Decimal,
    #[serde(default)]
    pub weight_unit: WeightUnit,
    #[serde(default)]
    pub dimension_unit: DimensionUnit,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_declared_value")]
    pub declared_value: Decimal,
    #[serde(default = "default_currency")]
    pub currency: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryType {
    #[default]
    Standard,
    Express,
    Overnight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum PickupType {
    Pickup,
    #[default]
    Dropoff,
}

/// Lifecycle state of a shipment. The persisted value is the single source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    Pending,
    QuoteReceived,
    PaymentPending,
    PaymentFailed,
    Paid,
    PaymentCompletedShipmentPending,
    ShipmentCreated,
    LabelGenerated,
    PickupScheduled,
    InTransit,
    Delivered,
    Refunded,
}

impl ShipmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::QuoteReceived => "quote_received",
            Self::PaymentPending => "payment_pending",
            Self::PaymentFailed => "payment_failed",
            Self::Paid => "paid",
            Self::PaymentCompletedShipmentPending => "payment_completed_shipment_pending",
            Self::ShipmentCreated => "shipment_created",
            Self::LabelGenerated => "label_generated",
            Self::PickupScheduled => "pickup_scheduled",
            Self::InTransit => "in_transit",
            Self::Delivered => "delivered",
            Self::Refunded => "refunded",
        }
    }

    /// The transition table. Anything not listed here is rejected.
    pub fn can_transition_to(&self, next: ShipmentStatus) -> bool {
        use ShipmentStatus::*;
        match self {
            Pending => matches!(next, QuoteReceived),
            QuoteReceived => matches!(next, PaymentPending),
            PaymentPending => matches!(next, PaymentPending | Paid | PaymentFailed),
            // A capture can still complete after a denial was reported.
            PaymentFailed => matches!(next, PaymentPending | Paid),
            Paid => matches!(
                next,
                ShipmentCreated | PaymentCompletedShipmentPending | Refunded
            ),
            PaymentCompletedShipmentPending => matches!(next, ShipmentCreated | Refunded),
            ShipmentCreated => matches!(
                next,
                LabelGenerated | PickupScheduled | InTransit | Delivered | Refunded
            ),
            LabelGenerated => matches!(next, PickupScheduled | InTransit | Delivered | Refunded),
            PickupScheduled => matches!(next, InTransit | Delivered | Refunded),
            InTransit => matches!(next, Delivered | Refunded),
            Delivered | Refunded => false,
        }
    }

    /// States in which a carrier shipment exists and a pickup may be arranged.
    pub fn allows_pickup(&self) -> bool {
        matches!(
            self,
            Self::ShipmentCreated | Self::LabelGenerated | Self::PickupScheduled
        )
    }
}

impl fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pickup progress for a shipment.
///
/// `ScheduleFailed` still carries a `FAILED-<timestamp>` confirmation so that readers of the
/// legacy `pickup_scheduled`/`pickup_confirmation` pair see the historical shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PickupState {
    #[default]
    NotRequested,
    Scheduled {
        confirmation: String,
        date: NaiveDate,
    },
    ScheduleFailed {
        confirmation: String,
        reason: String,
    },
}

impl PickupState {
    pub fn failed(at: DateTime<Utc>, reason: impl Into<String>) -> Self {
        Self::ScheduleFailed {
            confirmation: format!("FAILED-{}", at.timestamp()),
            reason: reason.into(),
        }
    }

    pub fn is_scheduled(&self) -> bool {
        matches!(self, Self::Scheduled { .. })
    }
}

/// Input for a new shipping request, before persistence assigns an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewShipment {
    pub sender: Party,
    pub recipient: Party,
    pub package: Package,
    #[serde(default)]
    pub delivery_type: DeliveryType,
    #[serde(default)]
    pub pickup_type: PickupType,
    pub preferred_ship_date: NaiveDate,
}

impl NewShipment {
    /// Checks the request before anything is persisted or sent to a carrier.
    pub fn validate(&self, today: NaiveDate) -> Result<()> {
        let mut errors = Vec::new();
        let pkg = &self.package;
        for (field, value) in [
            ("length", pkg.length),
            ("width", pkg.width),
            ("height", pkg.height),
            ("weight", pkg.weight),
        ] {
            if value <= Decimal::ZERO {
                errors.push(format!("Package {field} must be greater than zero"));
            }
        }
        if pkg.declared_value < Decimal::ZERO {
            errors.push("Declared value cannot be negative".to_string());
        }
        if self.sender.zip.trim().is_empty() {
            errors.push("Origin ZIP code is required".to_string());
        }
        if self.recipient.zip.trim().is_empty() {
            errors.push("Destination ZIP code is required".to_string());
        }
        if self.preferred_ship_date < today {
            errors.push("Preferred ship date cannot be in the past".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ShipmentError::Validation(errors))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shipment {
    pub id: ShipmentId,
    pub sender: Party,
    pub recipient: Party,
    pub package: Package,
    pub delivery_type: DeliveryType,
    pub pickup_type: PickupType,
    pub preferred_ship_date: NaiveDate,
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub pickup: PickupState,
    pub carrier_response: Option<serde_json::Value>,
    pub status: ShipmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Shipment {
    pub fn new(id: ShipmentId, new: NewShipment, now: DateTime<Utc>) -> Self {
        Self {
            id,
            sender: new.sender,
            recipient: new.recipient,
            package: new.package,
            delivery_type: new.delivery_type,
            pickup_type: new.pickup_type,
            preferred_ship_date: new.preferred_ship_date,
            tracking_number: None,
            pickup: PickupState::NotRequested,
            carrier_response: None,
            status: ShipmentStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves to `next` if the transition table allows it.
    pub fn advance(&mut self, next: ShipmentStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(ShipmentError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn label_url(&self) -> Option<&str> {
        self.carrier_response
            .as_ref()?
            .get("label_url")?
            .as_str()
            .filter(|url| !url.is_empty())
    }

    /// Stores `url` in the carrier response blob.
    pub fn set_label_url(&mut self, url: &str) {
        let mut blob = match self.carrier_response.take() {
            Some(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        blob.insert("label_url".to_string(), serde_json::Value::from(url));
        self.carrier_response = Some(serde_json::Value::Object(blob));
    }

    /// Legacy flag: true once scheduling was attempted, whether or not it succeeded.
    pub fn pickup_scheduled(&self) -> bool {
        !matches!(self.pickup, PickupState::NotRequested)
    }

    pub fn pickup_confirmation(&self) -> Option<&str> {
        match &self.pickup {
            PickupState::NotRequested => None,
            PickupState::Scheduled { confirmation, .. }
            | PickupState::ScheduleFailed { confirmation, .. } => Some(confirmation),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    pub(crate) fn sample_new_shipment(ship_date: NaiveDate) -> NewShipment {
        NewShipment {
            sender: Party {
                name: "Ada Sender".to_string(),
                email: "ada@example.com".to_string(),
                phone: "(310) 555-0100".to_string(),
                address: "100 Main St".to_string(),
                city: "Los Angeles".to_string(),
                state: "CA".to_string(),
                zip: "90001".to_string(),
            },
            recipient: Party {
                name: "Rob Recipient".to_string(),
                email: String::new(),
                phone: "212-555-0199".to_string(),
                address: "5 Broadway".to_string(),
                city: "New York".to_string(),
                state: "NY".to_string(),
                zip: "10004".to_string(),
            },
            package: Package {
                length: dec!(10),
                width: dec!(10),
                height: dec!(10),
                weight: dec!(5),
                weight_unit: WeightUnit::Lb,
                dimension_unit: DimensionUnit::In,
                description: "Books".to_string(),
                declared_value: dec!(100),
                currency: "USD".to_string(),
            },
            delivery_type: DeliveryType::Standard,
            pickup_type: PickupType::Dropoff,
            preferred_ship_date: ship_date,
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_transition_table_is_forward_only() {
        use ShipmentStatus::*;
        assert!(Pending.can_transition_to(QuoteReceived));
        assert!(!QuoteReceived.can_transition_to(Pending));
        assert!(PaymentPending.can_transition_to(Paid));
        assert!(PaymentFailed.can_transition_to(Paid));
        assert!(!Paid.can_transition_to(PaymentPending));
        assert!(!Paid.can_transition_to(PaymentFailed));
        assert!(Paid.can_transition_to(PaymentCompletedShipmentPending));
        assert!(PaymentCompletedShipmentPending.can_transition_to(ShipmentCreated));
        assert!(ShipmentCreated.can_transition_to(PickupScheduled));
        assert!(LabelGenerated.can_transition_to(PickupScheduled));
        assert!(!PickupScheduled.can_transition_to(LabelGenerated));
        assert!(!Delivered.can_transition_to(InTransit));
    }

    #[test]
    fn test_advance_rejects_skipping_payment() {
        let mut shipment = Shipment::new(
            ShipmentId(1),
            sample_new_shipment(day(2030, 1, 7)),
            Utc::now(),
        );
        shipment.status = ShipmentStatus::QuoteReceived;

        let err = shipment.advance(ShipmentStatus::Paid).unwrap_err();
        assert!(matches!(
            err,
            ShipmentError::InvalidTransition {
                from: ShipmentStatus::QuoteReceived,
                to: ShipmentStatus::Paid
            }
        ));
        assert_eq!(shipment.status, ShipmentStatus::QuoteReceived);
    }

    #[test]
    fn test_validate_rejects_past_date_and_zero_weight() {
        let mut new = sample_new_shipment(day(2024, 1, 1));
        new.package.weight = Decimal::ZERO;

        match new.validate(day(2024, 6, 1)) {
            Err(ShipmentError::Validation(errors)) => {
                assert_eq!(errors.len(), 2);
                assert!(errors.iter().any(|e| e.contains("weight")));
                assert!(errors.iter().any(|e| e.contains("past")));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_label_url_roundtrip_through_blob() {
        let mut shipment = Shipment::new(
            ShipmentId(1),
            sample_new_shipment(day(2030, 1, 7)),
            Utc::now(),
        );
        assert_eq!(shipment.label_url(), None);

        shipment.carrier_response = Some(serde_json::json!({"tracking_number": "794"}));
        shipment.set_label_url("https://labels.example/1.pdf");

        assert_eq!(shipment.label_url(), Some("https://labels.example/1.pdf"));
        assert_eq!(
            shipment.carrier_response.as_ref().unwrap()["tracking_number"],
            "794"
        );
    }

    #[test]
    fn test_failed_pickup_keeps_legacy_flag() {
        let mut shipment = Shipment::new(
            ShipmentId(1),
            sample_new_shipment(day(2030, 1, 7)),
            Utc::now(),
        );
        assert!(!shipment.pickup_scheduled());

        shipment.pickup = PickupState::failed(Utc::now(), "no couriers");
        assert!(shipment.pickup_scheduled());
        assert!(!shipment.pickup.is_scheduled());
        assert!(shipment.pickup_confirmation().unwrap().starts_with("FAILED-"));
    }
}
