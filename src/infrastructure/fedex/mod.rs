//! FedEx REST gateway.

mod normalize;
mod transformers;

pub use normalize::{
    PackageLimits, clamp_package, format_address, format_description, normalize_phone,
    pickup_date, shipping_field_errors,
};
pub use transformers::{carrier_code_for, pickup_type_for, service_type_for};

use self::transformers::{
    AvailabilityRequest, AvailabilityResponse, PickupRequest, PickupResponse, RateRequest,
    RateResponse, SERVICE, ShipRequest, ShipResponse, ShipResultsRequest, TokenResponse,
    TrackRequest, TrackResponse, rejection,
};
use crate::config::CarrierSettings;
use crate::domain::carrier::{PickupAvailability, PickupConfirmation, ShipmentConfirmation};
use crate::domain::ports::CarrierGateway;
use crate::domain::rate::{RateQuote, sort_by_total};
use crate::domain::shipment::Shipment;
use crate::domain::tracking::TrackingInfo;
use crate::error::{GatewayError, GatewayResult, Result, ShipmentError};
use crate::infrastructure::http::{TokenCache, build_http_client, send_json};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct FedExGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    secret_key: String,
    account_number: String,
    tokens: TokenCache,
}

fn parse<T: DeserializeOwned>(body: Value) -> GatewayResult<T> {
    serde_json::from_value(body).map_err(|e| GatewayError::Malformed {
        service: SERVICE,
        message: e.to_string(),
    })
}

impl FedExGateway {
    pub fn new(settings: &CarrierSettings, timeout: Duration) -> Result<Self> {
        let missing: Vec<&str> = [
            ("FEDEX_API_KEY", &settings.api_key),
            ("FEDEX_SECRET_KEY", &settings.secret_key),
            ("FEDEX_ACCOUNT_NUMBER", &settings.account_number),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();
        if !missing.is_empty() {
            return Err(ShipmentError::Config(format!(
                "FedEx credentials missing: {}",
                missing.join(", ")
            )));
        }

        Ok(Self {
            client: build_http_client(timeout)?,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            secret_key: settings.secret_key.clone(),
            account_number: settings.account_number.clone(),
            tokens: TokenCache::new(),
        })
    }

    async fn access_token(&self) -> GatewayResult<String> {
        if let Some(token) = self.tokens.current().await {
            return Ok(token);
        }

        debug!("requesting FedEx access token");
        let request = self
            .client
            .post(format!("{}/oauth/token", self.base_url))
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.api_key.as_str()),
                ("client_secret", self.secret_key.as_str()),
            ]);
        let (status, body) = send_json(SERVICE, request).await?;
        if !status.is_success() {
            return Err(GatewayError::Auth {
                service: SERVICE,
                message: format!("token request returned {status}"),
            });
        }

        let token: TokenResponse = parse(body)?;
        let value = token
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| GatewayError::Malformed {
                service: SERVICE,
                message: "token response has no access_token".to_string(),
            })?;
        self.tokens.store(value.clone(), token.expires_in).await;
        Ok(value)
    }

    /// Authenticated JSON POST. Non-2xx replies become `Rejected` from the carrier's error body.
    async fn post<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
        error_code: &str,
        context: &str,
    ) -> GatewayResult<Value> {
        let token = self.access_token().await?;
        let request = self
            .client
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(token)
            .header("X-locale", "en_US")
            .json(body);
        let (status, value) = send_json(SERVICE, request).await?;

        if status == StatusCode::UNAUTHORIZED {
            self.tokens.clear().await;
            return Err(GatewayError::Auth {
                service: SERVICE,
                message: format!("{path} rejected the access token"),
            });
        }
        if !status.is_success() {
            let err = rejection(&value, error_code, context);
            warn!(%status, path, error = %err, "FedEx request failed");
            return Err(err);
        }
        Ok(value)
    }
}

#[async_trait]
impl CarrierGateway for FedExGateway {
    async fn get_rates(&self, shipment: &Shipment) -> GatewayResult<Vec<RateQuote>> {
        let request = RateRequest::new(&self.account_number, shipment);
        let body = self
            .post("/rate/v1/rates/quotes", &request, "RATE_ERROR", "Failed to get rates")
            .await?;
        let mut quotes = parse::<RateResponse>(body)?.into_quotes();
        sort_by_total(&mut quotes);
        info!(shipment_id = %shipment.id, count = quotes.len(), "FedEx rates received");
        Ok(quotes)
    }

    async fn create_shipment(&self, shipment: &Shipment) -> GatewayResult<ShipmentConfirmation> {
        let errors = shipping_field_errors(&shipment.sender, &shipment.recipient, &shipment.package);
        if !errors.is_empty() {
            return Err(GatewayError::Validation(errors));
        }

        let request = ShipRequest::new(&self.account_number, shipment);
        let body = self
            .post("/ship/v1/shipments", &request, "SHIPMENT_ERROR", "Failed to create shipment")
            .await?;
        let confirmation = parse::<ShipResponse>(body)?
            .into_confirmation(service_type_for(shipment.delivery_type))?;
        info!(
            shipment_id = %shipment.id,
            tracking_number = %confirmation.tracking_number,
            label_ready = confirmation.label_url.is_some(),
            "FedEx shipment created"
        );
        Ok(confirmation)
    }

    async fn retrieve_label(&self, confirmation: &ShipmentConfirmation) -> GatewayResult<String> {
        if let Some(url) = &confirmation.label_url {
            return Ok(url.clone());
        }
        let Some(job_id) = &confirmation.job_id else {
            return Err(GatewayError::rejected(
                "LABEL.UNAVAILABLE",
                format!("No label or job id for {}", confirmation.tracking_number),
            ));
        };

        let request = ShipResultsRequest {
            account_number: transformers::AccountNumber {
                value: self.account_number.clone(),
            },
            job_id: job_id.clone(),
        };
        let body = self
            .post("/ship/v1/shipments/results", &request, "LABEL_ERROR", "Failed to retrieve label")
            .await?;
        parse::<ShipResponse>(body)?.into_label_url().ok_or_else(|| {
            GatewayError::rejected(
                "LABEL.UNAVAILABLE",
                format!("Label for job {job_id} is not ready"),
            )
        })
    }

    async fn schedule_pickup(&self, shipment: &Shipment, today: NaiveDate) -> GatewayResult<PickupConfirmation> {
        let date = pickup_date(shipment.preferred_ship_date, today);
        let carrier_code = carrier_code_for(service_type_for(shipment.delivery_type));
        let request = PickupRequest::new(&self.account_number, shipment, date, today);
        let body = self
            .post("/pickup/v1/pickups", &request, "PICKUP_ERROR", "Failed to schedule pickup")
            .await?;
        let confirmation = parse::<PickupResponse>(body)?.into_confirmation(date, carrier_code)?;
        info!(
            shipment_id = %shipment.id,
            confirmation = %confirmation.confirmation_number,
            date = %date,
            "FedEx pickup scheduled"
        );
        Ok(confirmation)
    }

    async fn check_pickup_availability(
        &self,
        shipment: &Shipment,
        today: NaiveDate,
    ) -> GatewayResult<PickupAvailability> {
        let date = pickup_date(shipment.preferred_ship_date, today);
        let request = AvailabilityRequest::new(shipment, date, today);
        let body = self
            .post(
                "/pickup/v1/pickups/availabilities",
                &request,
                "PICKUP_AVAILABILITY_ERROR",
                "Failed to check pickup availability",
            )
            .await?;
        Ok(parse::<AvailabilityResponse>(body)?.into_availability(date))
    }

    async fn track(&self, tracking_number: &str) -> GatewayResult<TrackingInfo> {
        let request = TrackRequest::new(tracking_number);
        let body = self
            .post("/track/v1/trackingnumbers", &request, "TRACKING_ERROR", "Failed to track shipment")
            .await?;
        parse::<TrackResponse>(body)?.into_tracking(tracking_number)
    }
}
