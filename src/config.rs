//! Runtime configuration. Every flag can also be supplied through the environment.

use clap::Args;
use std::time::Duration;

#[derive(Debug, Clone, Args)]
pub struct CarrierSettings {
    #[arg(id = "fedex_base_url", long = "fedex-base-url", env = "FEDEX_BASE_URL", default_value = "https://apis-sandbox.fedex.com")]
    pub base_url: String,
    #[arg(long = "fedex-api-key", env = "FEDEX_API_KEY", default_value = "", hide_env_values = true)]
    pub api_key: String,
    #[arg(long = "fedex-secret-key", env = "FEDEX_SECRET_KEY", default_value = "", hide_env_values = true)]
    pub secret_key: String,
    #[arg(long = "fedex-account-number", env = "FEDEX_ACCOUNT_NUMBER", default_value = "")]
    pub account_number: String,
}

#[derive(Debug, Clone, Args)]
pub struct PaymentSettings {
    #[arg(id = "paypal_base_url", long = "paypal-base-url", env = "PAYPAL_BASE_URL", default_value = "https://api-m.sandbox.paypal.com")]
    pub base_url: String,
    #[arg(long = "paypal-client-id", env = "PAYPAL_CLIENT_ID", default_value = "", hide_env_values = true)]
    pub client_id: String,
    #[arg(long = "paypal-client-secret", env = "PAYPAL_CLIENT_SECRET", default_value = "", hide_env_values = true)]
    pub client_secret: String,
    /// Webhook id registered with the provider; signature checks fail closed without it.
    #[arg(long = "paypal-webhook-id", env = "PAYPAL_WEBHOOK_ID", default_value = "")]
    pub webhook_id: String,
    #[arg(long = "paypal-brand-name", env = "PAYPAL_BRAND_NAME", default_value = "Shipflow")]
    pub brand_name: String,
    /// Base for the buyer return and cancel URLs.
    #[arg(long = "public-url", env = "APP_PUBLIC_URL", default_value = "http://localhost:8080")]
    pub public_url: String,
}

#[derive(Debug, Clone, Args)]
pub struct Settings {
    #[command(flatten)]
    pub carrier: CarrierSettings,
    #[command(flatten)]
    pub payment: PaymentSettings,
    #[arg(long = "http-timeout-secs", env = "HTTP_TIMEOUT_SECS", default_value_t = 30)]
    pub http_timeout_secs: u64,
    #[arg(long = "webhook-event-ttl-hours", env = "WEBHOOK_EVENT_TTL_HOURS", default_value_t = 72)]
    pub webhook_event_ttl_hours: i64,
}

impl Settings {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn webhook_event_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.webhook_event_ttl_hours)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        settings: Settings,
    }

    #[test]
    fn test_defaults_and_overrides() {
        let cli = Cli::parse_from([
            "shipflow",
            "--fedex-api-key",
            "key",
            "--http-timeout-secs",
            "5",
        ]);
        assert_eq!(cli.settings.carrier.api_key, "key");
        assert_eq!(cli.settings.http_timeout(), Duration::from_secs(5));
        assert_eq!(cli.settings.webhook_event_ttl(), chrono::Duration::hours(72));
        assert_eq!(cli.settings.payment.base_url, "https://api-m.sandbox.paypal.com");
    }
}
