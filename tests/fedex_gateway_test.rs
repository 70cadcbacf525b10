mod common;

use chrono::Utc;
use common::new_shipment;
use rust_decimal_macros::dec;
use serde_json::json;
use shipflow::config::CarrierSettings;
use shipflow::domain::carrier::ShipmentConfirmation;
use shipflow::domain::ids::ShipmentId;
use shipflow::domain::ports::CarrierGateway;
use shipflow::domain::shipment::{PickupType, Shipment};
use shipflow::domain::tracking::TrackingStatus;
use shipflow::error::{GatewayError, QuoteFailure};
use shipflow::infrastructure::fedex::FedExGateway;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn gateway(server: &MockServer) -> FedExGateway {
    gateway_with_timeout(server, Duration::from_secs(5))
}

fn gateway_with_timeout(server: &MockServer, timeout: Duration) -> FedExGateway {
    let settings = CarrierSettings {
        base_url: server.uri(),
        api_key: "api-key".into(),
        secret_key: "secret".into(),
        account_number: "740561073".into(),
    };
    FedExGateway::new(&settings, timeout).unwrap()
}

fn shipment() -> Shipment {
    Shipment::new(ShipmentId(1), new_shipment(PickupType::Dropoff), Utc::now())
}

async fn mount_token(server: &MockServer, times: u64) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("client_id=api-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "token-abc",
            "token_type": "bearer",
            "expires_in": 3599
        })))
        .expect(times)
        .mount(server)
        .await;
}

fn rate_body() -> serde_json::Value {
    json!({
        "output": {
            "rateReplyDetails": [
                {
                    "serviceType": "PRIORITY_OVERNIGHT",
                    "ratedShipmentDetails": [
                        { "rateType": "ACCOUNT", "totalNetCharge": 61.40, "currency": "USD" },
                        { "rateType": "LIST", "totalNetCharge": 72.10, "currency": "USD" }
                    ],
                    "commit": { "transitDays": { "minimumTransitTime": "ONE_DAY" } }
                },
                {
                    "serviceType": "FEDEX_GROUND",
                    "ratedShipmentDetails": [
                        { "rateType": "ACCOUNT", "totalNetCharge": 15.10, "currency": "USD" }
                    ],
                    "operationalDetail": { "transitTime": "FOUR_DAYS" }
                },
                { "serviceType": "FEDEX_2_DAY", "ratedShipmentDetails": [] }
            ]
        }
    })
}

#[tokio::test]
async fn test_rates_are_cheapest_first_and_token_is_cached() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/rate/v1/rates/quotes"))
        .and(header("authorization", "Bearer token-abc"))
        .and(body_partial_json(json!({ "accountNumber": { "value": "740561073" } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(rate_body()))
        .expect(2)
        .mount(&server)
        .await;

    let gateway = gateway(&server);
    let rates = gateway.get_rates(&shipment()).await.unwrap();
    gateway.get_rates(&shipment()).await.unwrap();

    let services: Vec<_> = rates.iter().map(|r| r.service_type.as_str()).collect();
    assert_eq!(services, ["FEDEX_GROUND", "PRIORITY_OVERNIGHT"]);
    assert_eq!(rates[0].transit_days, Some(4));
    assert_eq!(rates[1].transit_days, Some(1));
    assert_eq!(rates[1].base_rate, dec!(61.40));
}

#[tokio::test]
async fn test_unauthorized_reply_drops_the_cached_token() {
    let server = MockServer::start().await;
    mount_token(&server, 2).await;
    Mock::given(method("POST"))
        .and(path("/rate/v1/rates/quotes"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "errors": [{ "code": "NOT.AUTHORIZED.ERROR", "message": "Bearer token expired" }]
        })))
        .expect(2)
        .mount(&server)
        .await;

    let gateway = gateway(&server);
    let first = gateway.get_rates(&shipment()).await.unwrap_err();
    assert!(matches!(first, GatewayError::Auth { .. }));
    let second = gateway.get_rates(&shipment()).await.unwrap_err();
    assert!(matches!(second, GatewayError::Auth { .. }));
}

#[tokio::test]
async fn test_carrier_rejection_keeps_its_code() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/rate/v1/rates/quotes"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "transactionId": "abc",
            "errors": [{ "code": "PACKAGE.DIMENSIONS.EXCEEDED", "message": "Length too long" }]
        })))
        .mount(&server)
        .await;

    let err = gateway(&server).get_rates(&shipment()).await.unwrap_err();
    assert_eq!(err.code(), "PACKAGE.DIMENSIONS.EXCEEDED");
    assert!(err.to_string().contains("Length too long"));
}

#[tokio::test]
async fn test_slow_carrier_is_a_timeout() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/rate/v1/rates/quotes"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(rate_body())
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let err = gateway_with_timeout(&server, Duration::from_millis(300))
        .get_rates(&shipment())
        .await
        .unwrap_err();
    assert_eq!(err, GatewayError::Timeout { service: "FedEx" });
    assert!(err.is_transport());
    assert_eq!(QuoteFailure::classify(&err), QuoteFailure::CarrierUnavailable);
}

#[tokio::test]
async fn test_incomplete_shipment_is_rejected_before_any_call() {
    let server = MockServer::start().await;
    mount_token(&server, 0).await;
    Mock::given(method("POST"))
        .and(path("/ship/v1/shipments"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut incomplete = shipment();
    incomplete.sender.email = String::new();
    incomplete.recipient.phone = "  ".into();

    let err = gateway(&server).create_shipment(&incomplete).await.unwrap_err();
    let GatewayError::Validation(errors) = err else {
        panic!("expected validation errors, got {err:?}");
    };
    assert!(errors.contains(&"Sender email is required".to_string()));
    assert!(errors.contains(&"Recipient phone is required".to_string()));
}

#[tokio::test]
async fn test_asynchronous_label_is_fetched_by_job_id() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/ship/v1/shipments"))
        .and(body_partial_json(json!({ "labelResponseOptions": "URL_ONLY" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "output": {
                "jobId": "job-77",
                "transactionShipments": [{
                    "masterTrackingNumber": "794644790138",
                    "serviceType": "FEDEX_GROUND",
                    "pieceResponses": [{ "trackingNumber": "794644790138", "packageDocuments": [] }]
                }]
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/ship/v1/shipments/results"))
        .and(body_partial_json(json!({ "jobId": "job-77" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "output": {
                "transactionShipments": [{
                    "pieceResponses": [{
                        "packageDocuments": [{ "url": "https://labels.example/job-77.pdf" }]
                    }]
                }]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway(&server);
    let confirmation = gateway.create_shipment(&shipment()).await.unwrap();
    assert_eq!(confirmation.tracking_number, "794644790138");
    assert_eq!(confirmation.label_url, None);
    assert_eq!(confirmation.job_id.as_deref(), Some("job-77"));

    let url = gateway.retrieve_label(&confirmation).await.unwrap();
    assert_eq!(url, "https://labels.example/job-77.pdf");
}

#[tokio::test]
async fn test_label_without_job_id_is_unavailable() {
    let server = MockServer::start().await;
    mount_token(&server, 0).await;

    let confirmation = ShipmentConfirmation {
        tracking_number: "1".into(),
        master_tracking_number: "1".into(),
        service_type: "FEDEX_GROUND".into(),
        label_url: None,
        job_id: None,
    };
    let err = gateway(&server).retrieve_label(&confirmation).await.unwrap_err();
    assert_eq!(err.code(), "LABEL.UNAVAILABLE");
}

#[tokio::test]
async fn test_tracking_events_oldest_first() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/track/v1/trackingnumbers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "output": {
                "completeTrackResults": [{
                    "trackResults": [{
                        "latestStatusDetail": { "code": "IT", "description": "In transit" },
                        "scanEvents": [
                            {
                                "date": "2025-07-09T08:00:00+00:00",
                                "eventDescription": "Departed FedEx hub",
                                "scanLocation": { "city": "MEMPHIS" }
                            },
                            {
                                "date": "2025-07-08T17:30:00+00:00",
                                "eventDescription": "Picked up",
                                "scanLocation": { "city": "LOS ANGELES" }
                            }
                        ]
                    }]
                }]
            }
        })))
        .mount(&server)
        .await;

    let info = gateway(&server).track("794644790138").await.unwrap();
    assert_eq!(info.status, TrackingStatus::InTransit);
    let descriptions: Vec<_> = info.events.iter().map(|e| e.description.as_str()).collect();
    assert_eq!(descriptions, ["Picked up", "Departed FedEx hub"]);
    assert_eq!(info.events[0].location.as_deref(), Some("LOS ANGELES"));
}

#[tokio::test]
async fn test_pickup_confirmation() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/pickup/v1/pickups"))
        .and(body_partial_json(json!({ "carrierCode": "FDXG" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "output": { "pickupConfirmationCode": "CXL-42", "location": "NQAA" }
        })))
        .mount(&server)
        .await;

    let today = Utc::now().date_naive();
    let pickup = gateway(&server).schedule_pickup(&shipment(), today).await.unwrap();
    assert_eq!(pickup.confirmation_number, "CXL-42");
    assert_eq!(pickup.carrier_code, "FDXG");
    assert!(pickup.scheduled_date >= today);
}
