//! FedEx wire types and the mapping between them and the domain.

use super::normalize::{
    ClampedPackage, clamp_package, format_address, format_description, normalize_phone,
};
use crate::domain::carrier::{PickupAvailability, PickupConfirmation, ShipmentConfirmation};
use crate::domain::rate::RateQuote;
use crate::domain::shipment::{DeliveryType, Party, PickupType, Shipment};
use crate::domain::tracking::{ScanEvent, TrackingInfo, TrackingStatus, sort_scans};
use crate::error::GatewayError;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const SERVICE: &str = "FedEx";

/// Carrier service level for a delivery type.
pub fn service_type_for(delivery: DeliveryType) -> &'static str {
    match delivery {
        DeliveryType::Standard => "FEDEX_GROUND",
        DeliveryType::Express => "FEDEX_2_DAY",
        DeliveryType::Overnight => "PRIORITY_OVERNIGHT",
    }
}

/// Carrier pickup enumeration for a pickup type.
pub fn pickup_type_for(pickup: PickupType) -> &'static str {
    match pickup {
        PickupType::Pickup => "CONTACT_FEDEX_TO_SCHEDULE",
        PickupType::Dropoff => "DROPOFF_AT_FEDEX_LOCATION",
    }
}

pub fn carrier_code_for(service_type: &str) -> &'static str {
    if service_type.starts_with("FEDEX_GROUND") {
        "FDXG"
    } else {
        "FDXE"
    }
}

#[derive(Debug, Serialize)]
pub struct AccountNumber {
    pub value: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub street_lines: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    pub state_or_province_code: String,
    pub postal_code: String,
    pub country_code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub residential: Option<bool>,
}

impl Address {
    fn postal(party: &Party) -> Self {
        Self {
            street_lines: Vec::new(),
            city: None,
            state_or_province_code: party.state.trim().to_uppercase(),
            postal_code: party.zip.trim().to_string(),
            country_code: "US",
            residential: None,
        }
    }

    fn full(party: &Party, residential: bool) -> Self {
        Self {
            street_lines: vec![format_address(&party.address)],
            city: Some(party.city.trim().to_string()),
            residential: Some(residential),
            ..Self::postal(party)
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub person_name: String,
    pub phone_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_address: Option<String>,
}

impl Contact {
    fn from_party(party: &Party) -> Self {
        let email = party.email.trim().to_lowercase();
        Self {
            person_name: party.name.trim().to_string(),
            phone_number: normalize_phone(&party.phone),
            email_address: (!email.is_empty()).then_some(email),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyDetail {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<Contact>,
    pub address: Address,
}

#[derive(Debug, Serialize)]
pub struct Weight {
    pub units: &'static str,
    #[serde(with = "rust_decimal::serde::float")]
    pub value: Decimal,
}

#[derive(Debug, Serialize)]
pub struct Dimensions {
    #[serde(with = "rust_decimal::serde::float")]
    pub length: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub width: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub height: Decimal,
    pub units: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Money {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub currency: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerReference {
    pub customer_reference_type: &'static str,
    pub value: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageLineItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<u32>,
    pub weight: Weight,
    pub dimensions: Dimensions,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub customer_references: Vec<CustomerReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_value: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_description: Option<String>,
}

impl PackageLineItem {
    fn measured(shipment: &Shipment, clamped: &ClampedPackage) -> Self {
        Self {
            sequence_number: None,
            weight: Weight {
                units: shipment.package.weight_unit.as_str(),
                value: clamped.weight,
            },
            dimensions: Dimensions {
                length: clamped.length,
                width: clamped.width,
                height: clamped.height,
                units: shipment.package.dimension_unit.as_str(),
            },
            customer_references: Vec::new(),
            declared_value: None,
            item_description: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Rates
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateRequest {
    pub account_number: AccountNumber,
    pub requested_shipment: RateRequestedShipment,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateRequestedShipment {
    pub shipper: PartyDetail,
    pub recipient: PartyDetail,
    pub pickup_type: &'static str,
    pub packaging_type: &'static str,
    pub rate_request_type: Vec<&'static str>,
    pub requested_package_line_items: Vec<PackageLineItem>,
}

impl RateRequest {
    pub fn new(account_number: &str, shipment: &Shipment) -> Self {
        let clamped = clamp_package(&shipment.package);
        Self {
            account_number: AccountNumber {
                value: account_number.to_string(),
            },
            requested_shipment: RateRequestedShipment {
                shipper: PartyDetail {
                    contact: None,
                    address: Address::postal(&shipment.sender),
                },
                recipient: PartyDetail {
                    contact: None,
                    address: Address::postal(&shipment.recipient),
                },
                pickup_type: pickup_type_for(shipment.pickup_type),
                packaging_type: "YOUR_PACKAGING",
                rate_request_type: vec!["LIST", "ACCOUNT"],
                requested_package_line_items: vec![PackageLineItem::measured(shipment, &clamped)],
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateResponse {
    pub output: Option<RateOutput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateOutput {
    #[serde(default)]
    pub rate_reply_details: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RateReplyDetail {
    service_type: Option<String>,
    #[serde(default)]
    rated_shipment_details: Vec<RatedShipmentDetail>,
    operational_detail: Option<OperationalDetail>,
    commit: Option<Commit>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RatedShipmentDetail {
    total_net_charge: Option<Decimal>,
    currency: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationalDetail {
    transit_time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Commit {
    transit_days: Option<Value>,
}

/// Leading number of strings like `"3 days"` or `"THREE_DAYS"` spelled out.
fn transit_days(raw: &str) -> Option<u32> {
    let digits: String = raw.chars().take_while(char::is_ascii_digit).collect();
    if !digits.is_empty() {
        return digits.parse().ok();
    }
    let word = raw.split('_').next()?;
    let n = match word {
        "ONE" => 1,
        "TWO" => 2,
        "THREE" => 3,
        "FOUR" => 4,
        "FIVE" => 5,
        "SIX" => 6,
        "SEVEN" => 7,
        _ => return None,
    };
    Some(n)
}

impl RateResponse {
    /// One quote per service; the cheapest net charge of its tiers is the base.
    pub fn into_quotes(self) -> Vec<RateQuote> {
        let Some(output) = self.output else {
            return Vec::new();
        };
        output
            .rate_reply_details
            .into_iter()
            .filter_map(|raw| {
                let detail: RateReplyDetail = serde_json::from_value(raw.clone()).ok()?;
                let service_type = detail.service_type?;
                let base_rate = detail
                    .rated_shipment_details
                    .iter()
                    .filter_map(|d| d.total_net_charge)
                    .min()?;
                let currency = detail
                    .rated_shipment_details
                    .first()
                    .and_then(|d| d.currency.clone())
                    .unwrap_or_else(|| "USD".to_string());
                let days = detail
                    .operational_detail
                    .and_then(|o| o.transit_time)
                    .and_then(|t| transit_days(&t))
                    .or_else(|| {
                        let commit = detail.commit?.transit_days?;
                        match commit {
                            Value::String(s) => transit_days(&s),
                            Value::Object(map) => {
                                map.get("minimumTransitTime")?.as_str().and_then(transit_days)
                            }
                            _ => None,
                        }
                    });
                Some(RateQuote::new(service_type, base_rate, currency, days, raw))
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Ship
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipRequest {
    pub label_response_options: &'static str,
    pub merge_label_doc_option: &'static str,
    pub processing_option_type: &'static str,
    pub account_number: AccountNumber,
    pub requested_shipment: ShipRequestedShipment,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipRequestedShipment {
    pub shipper: PartyDetail,
    pub recipients: Vec<PartyDetail>,
    pub ship_datestamp: NaiveDate,
    pub service_type: &'static str,
    pub packaging_type: &'static str,
    pub pickup_type: &'static str,
    pub shipping_charges_payment: ShippingChargesPayment,
    pub label_specification: LabelSpecification,
    pub requested_package_line_items: Vec<PackageLineItem>,
    pub total_package_count: u32,
    pub preferred_currency: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingChargesPayment {
    pub payment_type: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSpecification {
    pub image_type: &'static str,
    pub label_stock_type: &'static str,
}

impl ShipRequest {
    pub fn new(account_number: &str, shipment: &Shipment) -> Self {
        let clamped = clamp_package(&shipment.package);
        let pkg = &shipment.package;
        let mut line_item = PackageLineItem::measured(shipment, &clamped);
        line_item.sequence_number = Some(1);
        line_item.customer_references = vec![CustomerReference {
            customer_reference_type: "CUSTOMER_REFERENCE",
            value: format!("Shipment ID: {}", shipment.id),
        }];
        line_item.declared_value = Some(Money {
            amount: pkg.declared_value,
            currency: pkg.currency.clone(),
        });
        line_item.item_description = Some(format_description(&pkg.description));

        Self {
            label_response_options: "URL_ONLY",
            merge_label_doc_option: "LABELS_ONLY",
            processing_option_type: "ALLOW_ASYNCHRONOUS",
            account_number: AccountNumber {
                value: account_number.to_string(),
            },
            requested_shipment: ShipRequestedShipment {
                shipper: PartyDetail {
                    contact: Some(Contact::from_party(&shipment.sender)),
                    address: Address::full(&shipment.sender, true),
                },
                recipients: vec![PartyDetail {
                    contact: Some(Contact::from_party(&shipment.recipient)),
                    address: Address::full(&shipment.recipient, true),
                }],
                ship_datestamp: shipment.preferred_ship_date,
                service_type: service_type_for(shipment.delivery_type),
                packaging_type: "YOUR_PACKAGING",
                pickup_type: pickup_type_for(shipment.pickup_type),
                shipping_charges_payment: ShippingChargesPayment {
                    payment_type: "SENDER",
                },
                label_specification: LabelSpecification {
                    image_type: "PDF",
                    label_stock_type: "PAPER_85X11_TOP_HALF_LABEL",
                },
                requested_package_line_items: vec![line_item],
                total_package_count: 1,
                preferred_currency: pkg.currency.clone(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipResponse {
    pub output: Option<ShipOutput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipOutput {
    #[serde(default)]
    pub transaction_shipments: Vec<TransactionShipment>,
    pub job_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionShipment {
    pub master_tracking_number: Option<String>,
    pub service_type: Option<String>,
    #[serde(default)]
    pub piece_responses: Vec<PieceResponse>,
    #[serde(default)]
    pub shipment_documents: Vec<PackageDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PieceResponse {
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub package_documents: Vec<PackageDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageDocument {
    pub url: Option<String>,
}

impl TransactionShipment {
    fn label_url(&self) -> Option<String> {
        self.piece_responses
            .iter()
            .flat_map(|p| p.package_documents.iter())
            .chain(self.shipment_documents.iter())
            .find_map(|d| d.url.clone().filter(|u| !u.is_empty()))
    }
}

impl ShipResponse {
    pub fn into_confirmation(self, fallback_service: &str) -> Result<ShipmentConfirmation, GatewayError> {
        let output = self.output.ok_or_else(|| GatewayError::Malformed {
            service: SERVICE,
            message: "ship response has no output".to_string(),
        })?;
        let job_id = output.job_id;
        let shipment = output.transaction_shipments.into_iter().next().ok_or_else(|| {
            GatewayError::Malformed {
                service: SERVICE,
                message: "ship response has no transactionShipments".to_string(),
            }
        })?;
        let tracking_number = shipment
            .piece_responses
            .iter()
            .find_map(|p| p.tracking_number.clone())
            .or_else(|| shipment.master_tracking_number.clone())
            .ok_or_else(|| GatewayError::Malformed {
                service: SERVICE,
                message: "ship response has no tracking number".to_string(),
            })?;
        let label_url = shipment.label_url();
        Ok(ShipmentConfirmation {
            master_tracking_number: shipment
                .master_tracking_number
                .clone()
                .unwrap_or_else(|| tracking_number.clone()),
            service_type: shipment
                .service_type
                .clone()
                .unwrap_or_else(|| fallback_service.to_string()),
            job_id: if label_url.is_none() { job_id } else { None },
            label_url,
            tracking_number,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipResultsRequest {
    pub account_number: AccountNumber,
    pub job_id: String,
}

impl ShipResponse {
    /// First document URL in a results response.
    pub fn into_label_url(self) -> Option<String> {
        self.output?
            .transaction_shipments
            .iter()
            .find_map(TransactionShipment::label_url)
    }
}

// ---------------------------------------------------------------------------
// Pickup
// ---------------------------------------------------------------------------

fn pickup_date_type(date: NaiveDate, today: NaiveDate) -> &'static str {
    if date == today { "SAME_DAY" } else { "FUTURE_DAY" }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PickupRequest {
    pub associated_account_number: AccountNumber,
    pub origin_detail: OriginDetail,
    pub total_weight: Weight,
    pub package_count: u32,
    pub carrier_code: &'static str,
    pub country_relationships: &'static str,
    pub remarks: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginDetail {
    pub pickup_location: PartyDetail,
    pub package_location: &'static str,
    pub ready_date_timestamp: String,
    pub customer_close_time: &'static str,
    pub pickup_date_type: &'static str,
}

impl PickupRequest {
    pub fn new(account_number: &str, shipment: &Shipment, date: NaiveDate, today: NaiveDate) -> Self {
        let clamped = clamp_package(&shipment.package);
        let service = service_type_for(shipment.delivery_type);
        Self {
            associated_account_number: AccountNumber {
                value: account_number.to_string(),
            },
            origin_detail: OriginDetail {
                pickup_location: PartyDetail {
                    contact: Some(Contact::from_party(&shipment.sender)),
                    address: Address::full(&shipment.sender, false),
                },
                package_location: "FRONT",
                ready_date_timestamp: format!("{date}T09:00:00"),
                customer_close_time: "17:00:00",
                pickup_date_type: pickup_date_type(date, today),
            },
            total_weight: Weight {
                units: shipment.package.weight_unit.as_str(),
                value: clamped.weight,
            },
            package_count: 1,
            carrier_code: carrier_code_for(service),
            country_relationships: "DOMESTIC",
            remarks: format!(
                "Shipment ID: {} - {}",
                shipment.id,
                format_description(&shipment.package.description)
            ),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickupResponse {
    pub output: Option<PickupOutput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickupOutput {
    pub pickup_confirmation_code: Option<String>,
    pub location: Option<String>,
}

impl PickupResponse {
    pub fn into_confirmation(self, date: NaiveDate, carrier_code: &str) -> Result<PickupConfirmation, GatewayError> {
        let output = self.output.unwrap_or(PickupOutput {
            pickup_confirmation_code: None,
            location: None,
        });
        let confirmation_number = output
            .pickup_confirmation_code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| GatewayError::Malformed {
                service: SERVICE,
                message: "pickup response has no confirmation code".to_string(),
            })?;
        Ok(PickupConfirmation {
            confirmation_number,
            scheduled_date: date,
            carrier_code: carrier_code.to_string(),
            location: output.location,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityRequest {
    pub pickup_address: Address,
    pub dispatch_date: NaiveDate,
    pub pickup_request_type: Vec<&'static str>,
    pub carriers: Vec<&'static str>,
    pub country_relationship: &'static str,
    pub number_of_business_days: u32,
}

impl AvailabilityRequest {
    pub fn new(shipment: &Shipment, date: NaiveDate, today: NaiveDate) -> Self {
        Self {
            pickup_address: Address::full(&shipment.sender, false),
            dispatch_date: date,
            pickup_request_type: vec![pickup_date_type(date, today)],
            carriers: vec![carrier_code_for(service_type_for(shipment.delivery_type))],
            country_relationship: "DOMESTIC",
            number_of_business_days: 1,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityResponse {
    pub output: Option<AvailabilityOutput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityOutput {
    #[serde(default)]
    pub options: Vec<AvailabilityOption>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityOption {
    pub available: Option<bool>,
    pub cut_off_time: Option<String>,
    pub access_time: Option<Value>,
}

impl AvailabilityResponse {
    pub fn into_availability(self, date: NaiveDate) -> PickupAvailability {
        let options = self.output.map(|o| o.options).unwrap_or_default();
        let first = options.first();
        PickupAvailability {
            available: first.is_some_and(|o| o.available != Some(false)),
            pickup_date: date,
            cutoff_time: first.and_then(|o| o.cut_off_time.clone()),
            access_time: first.and_then(|o| match &o.access_time {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Object(map)) => {
                    let hours = map.get("hours").and_then(Value::as_i64).unwrap_or(0);
                    let minutes = map.get("minutes").and_then(Value::as_i64).unwrap_or(0);
                    Some(format!("{hours}h{minutes:02}m"))
                }
                _ => None,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tracking
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackRequest {
    pub include_detailed_scans: bool,
    pub tracking_info: Vec<TrackingInfoItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingInfoItem {
    pub tracking_number_info: TrackingNumberInfo,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingNumberInfo {
    pub tracking_number: String,
}

impl TrackRequest {
    pub fn new(tracking_number: &str) -> Self {
        Self {
            include_detailed_scans: true,
            tracking_info: vec![TrackingInfoItem {
                tracking_number_info: TrackingNumberInfo {
                    tracking_number: tracking_number.to_string(),
                },
            }],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackResponse {
    pub output: Option<TrackOutput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackOutput {
    #[serde(default)]
    pub complete_track_results: Vec<CompleteTrackResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteTrackResult {
    #[serde(default)]
    pub track_results: Vec<TrackResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackResult {
    pub latest_status_detail: Option<StatusDetail>,
    pub estimated_delivery_time_window: Option<DeliveryWindow>,
    #[serde(default)]
    pub date_and_times: Vec<DateAndTime>,
    #[serde(default)]
    pub scan_events: Vec<ScanEventDetail>,
    pub error: Option<TrackError>,
}

#[derive(Debug, Deserialize)]
pub struct StatusDetail {
    pub code: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeliveryWindow {
    pub window: Option<Window>,
}

#[derive(Debug, Deserialize)]
pub struct Window {
    pub ends: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DateAndTime {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(rename = "dateTime")]
    pub date_time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanEventDetail {
    pub date: Option<String>,
    pub event_description: Option<String>,
    pub scan_location: Option<ScanLocation>,
}

#[derive(Debug, Deserialize)]
pub struct ScanLocation {
    pub city: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TrackError {
    pub code: Option<String>,
    pub message: Option<String>,
}

fn parse_event_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

impl TrackResponse {
    pub fn into_tracking(self, tracking_number: &str) -> Result<TrackingInfo, GatewayError> {
        let result = self
            .output
            .and_then(|o| o.complete_track_results.into_iter().next())
            .and_then(|c| c.track_results.into_iter().next())
            .ok_or_else(|| GatewayError::Malformed {
                service: SERVICE,
                message: "tracking response has no results".to_string(),
            })?;

        if let Some(err) = result.error {
            return Err(GatewayError::rejected(
                err.code.unwrap_or_else(|| "TRACKING.ERROR".to_string()),
                err.message.unwrap_or_else(|| "Tracking information unavailable".to_string()),
            ));
        }

        let (code, description) = result
            .latest_status_detail
            .map(|s| (s.code.unwrap_or_default(), s.description.unwrap_or_default()))
            .unwrap_or_default();
        let estimated_delivery = result
            .estimated_delivery_time_window
            .and_then(|w| w.window)
            .and_then(|w| w.ends)
            .or_else(|| {
                result
                    .date_and_times
                    .iter()
                    .find(|d| d.kind.as_deref() == Some("ESTIMATED_DELIVERY"))
                    .and_then(|d| d.date_time.clone())
            });
        let mut events: Vec<ScanEvent> = result
            .scan_events
            .into_iter()
            .map(|e| ScanEvent {
                occurred_at: e.date.as_deref().and_then(parse_event_time),
                description: e.event_description.unwrap_or_default(),
                location: e.scan_location.and_then(|l| l.city),
            })
            .collect();
        sort_scans(&mut events);

        Ok(TrackingInfo {
            tracking_number: tracking_number.to_string(),
            status: TrackingStatus::from_carrier_code(&code),
            status_description: description,
            estimated_delivery,
            events,
        })
    }
}

// ---------------------------------------------------------------------------
// Errors & auth
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorDetail {
    pub code: Option<String>,
    pub message: Option<String>,
}

/// First carrier-reported error, or a generic one built from `fallback_code`.
pub fn rejection(body: &Value, fallback_code: &str, context: &str) -> GatewayError {
    let first = serde_json::from_value::<ErrorResponse>(body.clone())
        .ok()
        .and_then(|r| r.errors.into_iter().next());
    match first {
        Some(detail) => GatewayError::rejected(
            detail.code.unwrap_or_else(|| fallback_code.to_string()),
            format!("{context}: {}", detail.message.unwrap_or_else(|| "Unknown error".to_string())),
        ),
        None => GatewayError::rejected(fallback_code, format!("{context}: Unknown error")),
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: Option<String>,
    pub expires_in: Option<u64>,
}
