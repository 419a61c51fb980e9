//! Application configuration loaded from environment variables.

use std::time::Duration;

use common::Money;
use orders::PricingRules;
use saga::RetryPolicy;

/// Server and domain configuration with sensible defaults.
///
/// Built once at startup and passed by reference; there is no hidden
/// process-wide mutable configuration. Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `TAX_RATE_BPS` — tax rate in basis points (default: `800`)
/// - `SHIPPING_FEE_CENTS` — flat shipping fee (default: `599`)
/// - `FREE_SHIPPING_THRESHOLD_CENTS` — free shipping floor (default: `5000`)
/// - `GATEWAY_TIMEOUT_MS` — payment gateway timeout (default: `3000`)
/// - `RETRY_MAX_ATTEMPTS` — downstream retry ceiling (default: `3`)
/// - `RETRY_INITIAL_DELAY_MS` — first retry delay (default: `50`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub tax_rate_bps: u32,
    pub shipping_fee_cents: i64,
    pub free_shipping_threshold_cents: i64,
    pub gateway_timeout_ms: u64,
    pub retry_max_attempts: u32,
    pub retry_initial_delay_ms: u64,
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Loads configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parsed("PORT", 3000),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            tax_rate_bps: env_parsed("TAX_RATE_BPS", 800),
            shipping_fee_cents: env_parsed("SHIPPING_FEE_CENTS", 599),
            free_shipping_threshold_cents: env_parsed("FREE_SHIPPING_THRESHOLD_CENTS", 5_000),
            gateway_timeout_ms: env_parsed("GATEWAY_TIMEOUT_MS", 3_000),
            retry_max_attempts: env_parsed("RETRY_MAX_ATTEMPTS", 3),
            retry_initial_delay_ms: env_parsed("RETRY_INITIAL_DELAY_MS", 50),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Pricing rules derived from this configuration.
    pub fn pricing_rules(&self) -> PricingRules {
        PricingRules {
            tax_rate_bps: self.tax_rate_bps,
            shipping_fee: Money::from_cents(self.shipping_fee_cents),
            free_shipping_threshold: Money::from_cents(self.free_shipping_threshold_cents),
            discount: Money::zero(),
        }
    }

    /// Retry policy for transient downstream failures.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts,
            initial_delay: Duration::from_millis(self.retry_initial_delay_ms),
            ..RetryPolicy::default()
        }
    }

    /// Bounded timeout for payment gateway calls.
    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_millis(self.gateway_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            tax_rate_bps: 800,
            shipping_fee_cents: 599,
            free_shipping_threshold_cents: 5_000,
            gateway_timeout_ms: 3_000,
            retry_max_attempts: 3,
            retry_initial_delay_ms: 50,
        }
    }
}
