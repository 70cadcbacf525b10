use crate::domain::payment::{OrderCapture, OrderCreated, PaymentTransaction, WebhookHeaders};
use crate::error::GatewayError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const SERVICE: &str = "PayPal";

#[derive(Debug, Serialize)]
pub struct OrderRequest {
    pub intent: &'static str,
    pub purchase_units: Vec<PurchaseUnitRequest>,
    pub application_context: ApplicationContext,
}

#[derive(Debug, Serialize)]
pub struct PurchaseUnitRequest {
    pub reference_id: String,
    pub custom_id: String,
    pub description: String,
    pub amount: Amount,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Amount {
    pub currency_code: String,
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct ApplicationContext {
    pub brand_name: String,
    pub shipping_preference: &'static str,
    pub user_action: &'static str,
    pub return_url: String,
    pub cancel_url: String,
}

impl OrderRequest {
    pub fn new(tx: &PaymentTransaction, brand_name: &str, public_url: &str) -> Self {
        let shipment = tx.shipment_id;
        Self {
            intent: "CAPTURE",
            purchase_units: vec![PurchaseUnitRequest {
                reference_id: format!("shipment_{shipment}"),
                custom_id: tx.custom_id.clone(),
                description: format!("Shipping for shipment #{shipment}"),
                amount: Amount {
                    currency_code: tx.currency.clone(),
                    value: format!("{:.2}", tx.amount.round_dp(2)),
                },
            }],
            application_context: ApplicationContext {
                brand_name: brand_name.to_string(),
                shipping_preference: "NO_SHIPPING",
                user_action: "PAY_NOW",
                return_url: format!("{public_url}/payment/success?shipment={shipment}"),
                cancel_url: format!("{public_url}/payment/cancel?shipment={shipment}"),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Link {
    pub href: String,
    pub rel: String,
}

#[derive(Debug, Deserialize)]
pub struct OrderResponse {
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub links: Vec<Link>,
}

impl OrderResponse {
    pub fn into_order(self, raw: Value) -> Result<OrderCreated, GatewayError> {
        let approval_url = self
            .links
            .into_iter()
            .find(|l| l.rel == "approve")
            .map(|l| l.href)
            .ok_or_else(|| {
                GatewayError::rejected("APPROVAL_URL_MISSING", "No approval URL returned by PayPal")
            })?;
        Ok(OrderCreated {
            order_id: self.id,
            approval_url,
            status: self.status,
            raw,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CaptureResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub purchase_units: Vec<CapturedUnit>,
}

#[derive(Debug, Deserialize)]
pub struct CapturedUnit {
    pub payments: Option<Payments>,
}

#[derive(Debug, Deserialize)]
pub struct Payments {
    #[serde(default)]
    pub captures: Vec<Capture>,
}

#[derive(Debug, Deserialize)]
pub struct Capture {
    pub id: String,
    pub status: Option<String>,
    pub amount: Option<Amount>,
}

impl CaptureResponse {
    pub fn into_capture(self, raw: Value) -> Result<OrderCapture, GatewayError> {
        let order_status = self.status;
        let capture = self
            .purchase_units
            .into_iter()
            .filter_map(|u| u.payments)
            .flat_map(|p| p.captures)
            .next()
            .ok_or_else(|| GatewayError::Malformed {
                service: SERVICE,
                message: "capture response has no captures".to_string(),
            })?;
        let (amount, currency) = match capture.amount {
            Some(a) => (
                a.value.parse::<Decimal>().map_err(|e| GatewayError::Malformed {
                    service: SERVICE,
                    message: format!("capture amount '{}': {e}", a.value),
                })?,
                a.currency_code,
            ),
            None => (Decimal::ZERO, String::new()),
        };
        Ok(OrderCapture {
            capture_id: capture.id,
            status: capture.status.unwrap_or(order_status),
            amount,
            currency,
            raw,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ErrorResponse {
    pub name: Option<String>,
    pub message: Option<String>,
    #[serde(default)]
    pub details: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorDetail {
    pub issue: Option<String>,
    pub description: Option<String>,
}

/// Provider error body mapped to `Rejected` under `code`.
pub fn rejection(body: &Value, code: &str) -> GatewayError {
    let err: ErrorResponse = serde_json::from_value(body.clone()).unwrap_or_default();
    let message = err
        .details
        .into_iter()
        .find_map(|d| d.description.or(d.issue))
        .or(err.message)
        .or(err.name)
        .unwrap_or_else(|| "Unknown error".to_string());
    GatewayError::rejected(code, message)
}

#[derive(Debug, Serialize)]
pub struct VerifyRequest<'a> {
    pub auth_algo: &'a str,
    pub cert_id: &'a str,
    pub transmission_id: &'a str,
    pub transmission_sig: &'a str,
    pub transmission_time: &'a str,
    pub webhook_id: &'a str,
    pub webhook_event: Value,
}

impl<'a> VerifyRequest<'a> {
    /// `None` when any header is absent.
    pub fn new(headers: &'a WebhookHeaders, webhook_id: &'a str, webhook_event: Value) -> Option<Self> {
        Some(Self {
            auth_algo: headers.auth_algo.as_deref()?,
            cert_id: headers.cert_id.as_deref()?,
            transmission_id: headers.transmission_id.as_deref()?,
            transmission_sig: headers.transmission_sig.as_deref()?,
            transmission_time: headers.transmission_time.as_deref()?,
            webhook_id,
            webhook_event,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct VerifyResponse {
    pub verification_status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: Option<String>,
    pub expires_in: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::{ShipmentId, TransactionId};
    use crate::domain::payment::NewPaymentTransaction;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_order_request_shape() {
        let tx = PaymentTransaction::new(
            TransactionId(1),
            NewPaymentTransaction::new(ShipmentId(7), dec!(27.5), "USD"),
            Utc::now(),
        );
        let body = serde_json::to_value(OrderRequest::new(&tx, "Shipflow", "https://ship.example")).unwrap();
        assert_eq!(body["intent"], "CAPTURE");
        let unit = &body["purchase_units"][0];
        assert_eq!(unit["reference_id"], "shipment_7");
        assert_eq!(unit["amount"]["value"], "27.50");
        assert_eq!(unit["custom_id"], json!(tx.custom_id));
        assert_eq!(
            body["application_context"]["return_url"],
            "https://ship.example/payment/success?shipment=7"
        );
        assert_eq!(body["application_context"]["shipping_preference"], "NO_SHIPPING");
    }

    #[test]
    fn test_missing_approve_link() {
        let response: OrderResponse = serde_json::from_value(json!({
            "id": "5O190127TN364715T",
            "status": "CREATED",
            "links": [{"href": "https://api/self", "rel": "self"}]
        }))
        .unwrap();
        let err = response.into_order(Value::Null).unwrap_err();
        assert_eq!(err.code(), "APPROVAL_URL_MISSING");
    }

    #[test]
    fn test_capture_parsing() {
        let raw = json!({
            "id": "ORDER-1",
            "status": "COMPLETED",
            "purchase_units": [{"payments": {"captures": [
                {"id": "CAP-9", "status": "COMPLETED", "amount": {"currency_code": "USD", "value": "27.50"}}
            ]}}]
        });
        let response: CaptureResponse = serde_json::from_value(raw.clone()).unwrap();
        let capture = response.into_capture(raw).unwrap();
        assert_eq!(capture.capture_id, "CAP-9");
        assert!(capture.is_completed());
        assert_eq!(capture.amount, dec!(27.50));
    }

    #[test]
    fn test_rejection_prefers_detail_description() {
        let body = json!({
            "name": "UNPROCESSABLE_ENTITY",
            "message": "The requested action could not be performed",
            "details": [{"issue": "INSTRUMENT_DECLINED", "description": "The instrument was declined"}]
        });
        let err = rejection(&body, "ORDER_CAPTURE_ERROR");
        assert_eq!(err.to_string(), "ORDER_CAPTURE_ERROR: The instrument was declined");

        let err = rejection(&json!({"message": "bad"}), "ORDER_CREATION_ERROR");
        assert_eq!(err.to_string(), "ORDER_CREATION_ERROR: bad");
    }

    #[test]
    fn test_verify_request_requires_every_header() {
        let mut headers = WebhookHeaders {
            auth_algo: Some("SHA256withRSA".into()),
            transmission_id: Some("t-1".into()),
            cert_id: Some("c-1".into()),
            transmission_sig: Some("sig".into()),
            transmission_time: Some("2025-07-01T00:00:00Z".into()),
        };
        assert!(VerifyRequest::new(&headers, "WH-1", Value::Null).is_some());
        headers.transmission_sig = None;
        assert!(VerifyRequest::new(&headers, "WH-1", Value::Null).is_none());
    }
}
