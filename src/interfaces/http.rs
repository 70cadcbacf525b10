//! JSON HTTP API over the orchestrator, plus the payment provider's webhook endpoint.

use crate::application::{
    CaptureOutcome, PaymentInitiation, QuoteOutcome, ShipmentDetails, ShipmentOrchestrator,
    TrackingReport, WebhookReceiver, WebhookReply,
};
use crate::domain::carrier::PickupAvailability;
use crate::domain::ids::{RateId, ShipmentId};
use crate::domain::payment::{PaymentTransaction, WebhookHeaders};
use crate::domain::rate::Rate;
use crate::domain::shipment::{NewShipment, Shipment};
use crate::domain::tracking::TrackingInfo;
use crate::error::{GatewayError, QuoteFailure, ShipmentError};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub struct AppState {
    pub orchestrator: Arc<ShipmentOrchestrator>,
    pub webhooks: WebhookReceiver,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ShipmentError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ShipmentError::Validation(_) | ShipmentError::PaymentNotApproved(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            ShipmentError::Gateway(GatewayError::Validation(_)) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            ShipmentError::Gateway(GatewayError::Rejected { .. }) => {
                (StatusCode::UNPROCESSABLE_ENTITY, self.to_string())
            }
            ShipmentError::Gateway(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Service unavailable, try again".to_string(),
            ),
            ShipmentError::ShipmentNotFound(_)
            | ShipmentError::RateNotFound { .. }
            | ShipmentError::TransactionNotFound(_)
            | ShipmentError::LabelUnavailable(_)
            | ShipmentError::TrackingUnavailable(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ShipmentError::InvalidTransition { .. }
            | ShipmentError::ConcurrentModification(_)
            | ShipmentError::NoRateSelected(_)
            | ShipmentError::PaymentNotAllowed(_)
            | ShipmentError::PaymentClosed { .. }
            | ShipmentError::PickupNotAllowed(_)
            | ShipmentError::PickupUnavailable(_)
            | ShipmentError::PickupAlreadyScheduled(_) => (StatusCode::CONFLICT, self.to_string()),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        tracing::error!(%status, error = %self, "request failed");

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

type ApiResult<T> = Result<T, ShipmentError>;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/shipments", post(create_shipment))
        .route("/shipments/{id}", get(shipment_details))
        .route("/shipments/{id}/quote", post(requote))
        .route("/shipments/{id}/checkout", post(select_rate))
        .route("/shipments/{id}/payment", post(initiate_payment))
        .route("/shipments/{id}/fulfillment", post(retry_fulfillment))
        .route(
            "/shipments/{id}/pickup",
            get(pickup_availability).post(schedule_pickup),
        )
        .route("/shipments/{id}/label", get(label_url))
        .route("/shipments/{id}/tracking", get(track_shipment))
        .route("/track/{tracking_number}", get(track_number))
        .route("/payment/success", get(payment_success))
        .route("/payment/cancel", get(payment_cancel))
        .route("/webhook/paypal", post(handle_webhook))
        .route("/webhook/status", get(webhook_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn quote_response(outcome: QuoteOutcome) -> Response {
    let status = match &outcome {
        QuoteOutcome::Rates { .. } => StatusCode::CREATED,
        QuoteOutcome::Failed {
            failure: QuoteFailure::CarrierUnavailable,
            ..
        } => StatusCode::SERVICE_UNAVAILABLE,
        QuoteOutcome::Failed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
    };
    (status, Json(outcome)).into_response()
}

// ---------------------------------------------------------------------------
// Shipments
// ---------------------------------------------------------------------------

async fn create_shipment(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewShipment>,
) -> ApiResult<Response> {
    Ok(quote_response(state.orchestrator.request_quote(body).await?))
}

async fn requote(State(state): State<Arc<AppState>>, Path(id): Path<u64>) -> ApiResult<Response> {
    Ok(quote_response(state.orchestrator.requote(ShipmentId(id)).await?))
}

async fn shipment_details(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> ApiResult<Json<ShipmentDetails>> {
    Ok(Json(state.orchestrator.details(ShipmentId(id)).await?))
}

#[derive(Debug, Deserialize)]
struct CheckoutRequest {
    rate_id: u64,
}

async fn select_rate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    Json(body): Json<CheckoutRequest>,
) -> ApiResult<Json<Rate>> {
    let rate = state
        .orchestrator
        .select_rate(ShipmentId(id), RateId(body.rate_id))
        .await?;
    Ok(Json(rate))
}

async fn initiate_payment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> ApiResult<Response> {
    let outcome = state.orchestrator.initiate_payment(ShipmentId(id)).await?;
    let status = match &outcome {
        PaymentInitiation::Redirect { .. } => StatusCode::OK,
        PaymentInitiation::Failed { .. } => StatusCode::PAYMENT_REQUIRED,
    };
    Ok((status, Json(outcome)).into_response())
}

async fn retry_fulfillment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> ApiResult<Json<Shipment>> {
    Ok(Json(state.orchestrator.retry_fulfillment(ShipmentId(id)).await?))
}

async fn pickup_availability(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> ApiResult<Json<PickupAvailability>> {
    Ok(Json(state.orchestrator.pickup_availability(ShipmentId(id)).await?))
}

async fn schedule_pickup(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> ApiResult<Json<Shipment>> {
    Ok(Json(state.orchestrator.schedule_pickup(ShipmentId(id)).await?))
}

async fn label_url(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> ApiResult<Json<serde_json::Value>> {
    let url = state.orchestrator.label_url(ShipmentId(id)).await?;
    Ok(Json(json!({ "shipment_id": id, "label_url": url })))
}

async fn track_shipment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> ApiResult<Json<TrackingReport>> {
    Ok(Json(state.orchestrator.track_shipment(ShipmentId(id)).await?))
}

async fn track_number(
    State(state): State<Arc<AppState>>,
    Path(tracking_number): Path<String>,
) -> ApiResult<Json<TrackingInfo>> {
    Ok(Json(state.orchestrator.track_number(&tracking_number).await?))
}

// ---------------------------------------------------------------------------
// Buyer return from the payment provider
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ReturnQuery {
    token: String,
    #[serde(rename = "PayerID")]
    payer_id: Option<String>,
}

async fn payment_success(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReturnQuery>,
) -> ApiResult<Response> {
    let outcome = state
        .orchestrator
        .complete_payment(&query.token, query.payer_id.as_deref())
        .await?;
    let status = match &outcome {
        CaptureOutcome::Failed { .. } => StatusCode::PAYMENT_REQUIRED,
        _ => StatusCode::OK,
    };
    Ok((status, Json(outcome)).into_response())
}

async fn payment_cancel(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReturnQuery>,
) -> ApiResult<Json<PaymentTransaction>> {
    Ok(Json(state.orchestrator.cancel_payment(&query.token).await?))
}

// ---------------------------------------------------------------------------
// POST /webhook/paypal
// ---------------------------------------------------------------------------

async fn handle_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let signature_headers =
        WebhookHeaders::from_lookup(|name| headers.get(name).and_then(|v| v.to_str().ok()));

    match state.webhooks.receive(&body, &signature_headers).await {
        WebhookReply::Accepted(_) => {
            (StatusCode::OK, Json(json!({ "status": "success" }))).into_response()
        }
        WebhookReply::Unauthorized => (
            StatusCode::UNAUTHORIZED,
            Json(ErrorBody {
                error: "Invalid webhook signature".to_string(),
            }),
        )
            .into_response(),
        WebhookReply::BadRequest(error) => {
            (StatusCode::BAD_REQUEST, Json(ErrorBody { error })).into_response()
        }
        WebhookReply::Failed(error) => {
            (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody { error })).into_response()
        }
    }
}

async fn webhook_status() -> Json<serde_json::Value> {
    Json(json!({
        "status": "operational",
        "timestamp": Utc::now(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::shipment::ShipmentStatus;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (ShipmentError::Validation(vec!["x".into()]), StatusCode::BAD_REQUEST),
            (ShipmentError::ShipmentNotFound(ShipmentId(1)), StatusCode::NOT_FOUND),
            (ShipmentError::LabelUnavailable(ShipmentId(1)), StatusCode::NOT_FOUND),
            (
                ShipmentError::PickupNotAllowed(ShipmentStatus::Paid),
                StatusCode::CONFLICT,
            ),
            (
                ShipmentError::Gateway(GatewayError::Timeout { service: "FedEx" }),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ShipmentError::Gateway(GatewayError::rejected("X", "y")),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                ShipmentError::Config("missing".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
