use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use serde_json::json;
use std::process::Command;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn fedex() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access_token": "t", "expires_in": 3600 })),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rate/v1/rates/quotes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "output": {
                "rateReplyDetails": [
                    {
                        "serviceType": "FEDEX_2_DAY",
                        "ratedShipmentDetails": [{ "totalNetCharge": 33.75, "currency": "USD" }],
                        "operationalDetail": { "transitTime": "TWO_DAYS" }
                    },
                    {
                        "serviceType": "FEDEX_GROUND",
                        "ratedShipmentDetails": [{ "totalNetCharge": 25.5, "currency": "USD" }],
                        "operationalDetail": { "transitTime": "FOUR_DAYS" }
                    }
                ]
            }
        })))
        .mount(&server)
        .await;
    server
}

fn quote_command(base_url: &str) -> Command {
    let mut cmd = Command::new(cargo_bin!());
    cmd.env_clear()
        .env("FEDEX_BASE_URL", base_url)
        .env("FEDEX_API_KEY", "key")
        .env("FEDEX_SECRET_KEY", "secret")
        .env("FEDEX_ACCOUNT_NUMBER", "740561073")
        .env("PAYPAL_CLIENT_ID", "client")
        .env("PAYPAL_CLIENT_SECRET", "secret")
        .env("RUST_LOG", "warn")
        .arg("quote")
        .arg("tests/fixtures/requests.csv");
    cmd
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cli_quotes_every_row() {
    let server = fedex().await;
    let mut cmd = quote_command(&server.uri());

    tokio::task::spawn_blocking(move || {
        cmd.assert()
            .success()
            .stdout(predicate::str::contains(
                "shipment,service_type,base_rate,handling_fee,total_rate,currency,transit_days",
            ))
            .stdout(predicate::str::contains("1,FEDEX_GROUND,25.50,2.55,28.05,USD,4"))
            .stdout(predicate::str::contains("1,FEDEX_2_DAY,33.75,3.38,37.13,USD,2"))
            .stderr(predicate::str::contains("Error quoting row 2"));
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cli_reports_carrier_outage_per_row() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let mut cmd = quote_command(&server.uri());

    tokio::task::spawn_blocking(move || {
        cmd.assert()
            .success()
            .stderr(predicate::str::contains("Quote failed for shipment 1"))
            .stdout(predicate::str::contains("FEDEX_GROUND").not());
    })
    .await
    .unwrap();
}

#[test]
fn test_cli_requires_carrier_credentials() {
    let mut cmd = Command::new(cargo_bin!());
    cmd.env_clear()
        .arg("quote")
        .arg("tests/fixtures/requests.csv");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("FEDEX_API_KEY"));
}
