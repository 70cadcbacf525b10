use super::ids::ShipmentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse delivery progress derived from the carrier's status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingStatus {
    LabelCreated,
    InTransit,
    Delivered,
    Exception,
    Unknown,
}

impl TrackingStatus {
    pub fn from_carrier_code(code: &str) -> Self {
        match code {
            "OC" | "LC" => Self::LabelCreated,
            "IT" | "PU" | "DP" | "AR" | "OD" | "AF" => Self::InTransit,
            "DL" => Self::Delivered,
            "DE" | "SE" | "CA" => Self::Exception,
            _ => Self::Unknown,
        }
    }
}

/// A single carrier scan as returned by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanEvent {
    pub occurred_at: Option<DateTime<Utc>>,
    pub description: String,
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingInfo {
    pub tracking_number: String,
    pub status: TrackingStatus,
    pub status_description: String,
    pub estimated_delivery: Option<String>,
    /// Oldest first.
    pub events: Vec<ScanEvent>,
}

/// Persisted scan event. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub shipment_id: ShipmentId,
    pub tracking_number: String,
    pub status: TrackingStatus,
    pub description: String,
    pub location: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
}

impl TrackingEvent {
    pub fn from_scan(shipment_id: ShipmentId, info: &TrackingInfo, scan: &ScanEvent) -> Self {
        Self {
            shipment_id,
            tracking_number: info.tracking_number.clone(),
            status: info.status,
            description: scan.description.clone(),
            location: scan.location.clone(),
            occurred_at: scan.occurred_at,
        }
    }

    /// Two records describe the same scan.
    pub fn same_scan(&self, other: &TrackingEvent) -> bool {
        self.occurred_at == other.occurred_at && self.description == other.description
    }
}

/// Orders scans oldest first; undated scans go last.
pub fn sort_scans(events: &mut [ScanEvent]) {
    events.sort_by(|a, b| match (a.occurred_at, b.occurred_at) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
}
