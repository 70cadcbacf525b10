use crate::domain::ids::{RateId, ShipmentId};
use crate::domain::payment::PaymentStatus;
use crate::domain::shipment::ShipmentStatus;
use thiserror::Error;

/// Failure reported by one of the outbound gateways (carrier or payment provider).
///
/// Business rejections are ordinary values of this type. Gateways never panic on them,
/// callers classify them instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("Shipment validation failed: {}", .0.join(", "))]
    Validation(Vec<String>),
    #[error("{code}: {message}")]
    Rejected { code: String, message: String },
    #[error("{service} authentication failed: {message}")]
    Auth {
        service: &'static str,
        message: String,
    },
    #[error("{service} request timed out")]
    Timeout { service: &'static str },
    #[error("{service} transport error: {message}")]
    Transport {
        service: &'static str,
        message: String,
    },
    #[error("unexpected {service} response: {message}")]
    Malformed {
        service: &'static str,
        message: String,
    },
}

impl GatewayError {
    pub fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            code: code.into(),
            message: message.into(),
        }
    }

    /// True for infrastructure-level failures (network, timeout, credentials, garbage replies).
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Auth { .. } | Self::Timeout { .. } | Self::Transport { .. } | Self::Malformed { .. }
        )
    }

    /// Machine-readable code for this failure.
    pub fn code(&self) -> &str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Rejected { code, .. } => code,
            Self::Auth { .. } => "INVALID_CLIENT",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Transport { .. } => "TRANSPORT_ERROR",
            Self::Malformed { .. } => "MALFORMED_RESPONSE",
        }
    }
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

#[derive(Error, Debug)]
pub enum ShipmentError {
    #[error("Invalid shipment: {}", .0.join(", "))]
    Validation(Vec<String>),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("Shipment {0} not found")]
    ShipmentNotFound(ShipmentId),
    #[error("Rate {rate} not found for shipment {shipment}")]
    RateNotFound { shipment: ShipmentId, rate: RateId },
    #[error("Shipment {0} has no selected rate")]
    NoRateSelected(ShipmentId),
    #[error("Payment transaction not found: {0}")]
    TransactionNotFound(String),
    #[error("Payment for order {0} has not been approved by the payer")]
    PaymentNotApproved(String),
    #[error("Payment cannot start while shipment is {0}")]
    PaymentNotAllowed(ShipmentStatus),
    #[error("Payment for order {order_id} is already {status}")]
    PaymentClosed {
        order_id: String,
        status: PaymentStatus,
    },
    #[error("Cannot move shipment from {from} to {to}")]
    InvalidTransition {
        from: ShipmentStatus,
        to: ShipmentStatus,
    },
    #[error("Shipment {0} was modified concurrently")]
    ConcurrentModification(ShipmentId),
    #[error("Pickup cannot be scheduled while shipment is {0}")]
    PickupNotAllowed(ShipmentStatus),
    #[error("No pickup is available for shipment {0}")]
    PickupUnavailable(ShipmentId),
    #[error("Pickup already scheduled for shipment {0}")]
    PickupAlreadyScheduled(ShipmentId),
    #[error("No shipping label is available for shipment {0}")]
    LabelUnavailable(ShipmentId),
    #[error("Shipment {0} has no tracking number yet")]
    TrackingUnavailable(ShipmentId),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),
}

pub type Result<T> = std::result::Result<T, ShipmentError>;

/// User-facing category for a failed rate quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteFailure {
    DimensionsExceeded,
    MalformedRequest,
    CarrierUnavailable,
    Other,
}

impl QuoteFailure {
    /// Classifies by the carrier's embedded error code/message.
    pub fn classify(err: &GatewayError) -> Self {
        let text = err.to_string();
        if text.contains("PACKAGE.DIMENSIONS.EXCEEDED") {
            Self::DimensionsExceeded
        } else if text.contains("RATEREQUESTTYPE.REQUIRED")
            || matches!(err, GatewayError::Validation(_))
        {
            Self::MalformedRequest
        } else if err.is_transport() {
            Self::CarrierUnavailable
        } else {
            Self::Other
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::DimensionsExceeded => {
                "Package dimensions or weight exceed carrier limits. Please reduce the size or weight of your package."
            }
            Self::MalformedRequest => {
                "There was an issue with the shipping rate request. Please try again."
            }
            Self::CarrierUnavailable => {
                "The shipping service is temporarily unavailable. Please try again later."
            }
            Self::Other => "Unable to get shipping rates",
        }
    }
}

/// User-facing category for a failed payment initiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentFailure {
    Authentication,
    OrderCreation,
    Processing,
}

impl PaymentFailure {
    pub fn classify(err: &GatewayError) -> Self {
        match err {
            GatewayError::Auth { .. } => Self::Authentication,
            GatewayError::Rejected { code, .. } if code == "INVALID_CLIENT" => {
                Self::Authentication
            }
            GatewayError::Rejected { code, .. }
                if code == "ORDER_CREATION_ERROR" || code == "APPROVAL_URL_MISSING" =>
            {
                Self::OrderCreation
            }
            _ => Self::Processing,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::Authentication => {
                "Payment service authentication failed. Please contact support."
            }
            Self::OrderCreation => "Unable to create payment order. Please try again later.",
            Self::Processing => {
                "Payment processing error. Please try again or use a different payment method."
            }
        }
    }
}
