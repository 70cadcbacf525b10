use serde::{Deserialize, Serialize};
use std::fmt;

/// Customer-facing messages sent at state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PaymentReceived,
    ShipmentConfirmed,
    LabelReady,
    PickupScheduled,
    Shipped,
    Delivered,
    ShippingException,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PaymentReceived => "payment_received",
            Self::ShipmentConfirmed => "shipment_confirmed",
            Self::LabelReady => "label_ready",
            Self::PickupScheduled => "pickup_scheduled",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::ShippingException => "shipping_exception",
        };
        f.write_str(s)
    }
}
