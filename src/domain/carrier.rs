use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Result of a successful carrier shipment creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentConfirmation {
    pub tracking_number: String,
    pub master_tracking_number: String,
    pub service_type: String,
    pub label_url: Option<String>,
    /// Set when the label is produced asynchronously and must be fetched later.
    pub job_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickupConfirmation {
    pub confirmation_number: String,
    pub scheduled_date: NaiveDate,
    pub carrier_code: String,
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickupAvailability {
    pub available: bool,
    pub pickup_date: NaiveDate,
    pub cutoff_time: Option<String>,
    pub access_time: Option<String>,
}
