//! Configuration management for the checkout.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Unlike a missing variable, a present but malformed one is an error.

use crate::orders::HttpOrderService;
use crate::payment::{HostedGatewayConfig, HostedPaymentGateway};
use crate::pricing::ShippingRule;
use crate::storage::{FileStorage, StorageError};
use crate::types::Money;
use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use storefront_runtime::retry::RetryPolicy;
use thiserror::Error;

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A variable is set to something that does not parse
    #[error("Invalid value '{value}' for {key}: {reason}")]
    Invalid {
        /// Variable name
        key: &'static str,
        /// Raw value
        value: String,
        /// Parse error
        reason: String,
    },
}

/// Order backend configuration
#[derive(Debug, Clone)]
pub struct OrderServiceConfig {
    /// Base URL; orders are posted to `{url}/orders`
    pub url: String,
}

/// Hosted payment provider configuration
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    /// API base URL
    pub gateway_url: String,
    /// Client id
    pub app_id: String,
    /// Client secret
    pub secret_key: String,
    /// API version header
    pub api_version: String,
    /// Checkout route the provider returns to
    pub return_url: String,
}

/// Outbound HTTP behaviour
#[derive(Debug, Clone, Copy)]
pub struct HttpConfig {
    /// Timeout per attempt in milliseconds
    pub timeout_ms: u64,
    /// Retries after the first attempt, transient failures only
    pub max_retries: usize,
}

/// Checkout configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    /// Order backend
    pub orders: OrderServiceConfig,
    /// Payment provider
    pub payment: PaymentConfig,
    /// Directory of the durable storage
    pub storage_dir: PathBuf,
    /// Shipping fees
    pub shipping: ShippingRule,
    /// HTTP client behaviour
    pub http: HttpConfig,
}

fn parsed<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}

fn text(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    lookup(key).unwrap_or_else(|| default.to_string())
}

impl CheckoutConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a numeric or amount variable is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key → value source.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a numeric or amount variable is malformed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = ShippingRule::default();
        Ok(Self {
            orders: OrderServiceConfig {
                url: text(&lookup, "ORDER_SERVICE_URL", "http://localhost:8080/api"),
            },
            payment: PaymentConfig {
                gateway_url: text(&lookup, "PAYMENT_GATEWAY_URL", "https://sandbox.cashfree.com"),
                app_id: text(&lookup, "PAYMENT_APP_ID", "test-app-id"),
                secret_key: text(&lookup, "PAYMENT_SECRET_KEY", "test-secret-key"),
                api_version: text(&lookup, "PAYMENT_API_VERSION", "2022-09-01"),
                return_url: text(&lookup, "CHECKOUT_RETURN_URL", "http://localhost:5173/#/checkout"),
            },
            storage_dir: PathBuf::from(text(&lookup, "CHECKOUT_STORAGE_DIR", ".storefront")),
            shipping: ShippingRule {
                standard_fee: parsed::<Money>(&lookup, "SHIPPING_STANDARD_FEE", defaults.standard_fee)?,
                express_fee: parsed::<Money>(&lookup, "SHIPPING_EXPRESS_FEE", defaults.express_fee)?,
                free_shipping_threshold: parsed::<Money>(
                    &lookup,
                    "FREE_SHIPPING_THRESHOLD",
                    defaults.free_shipping_threshold,
                )?,
            },
            http: HttpConfig {
                timeout_ms: parsed(&lookup, "HTTP_TIMEOUT_MS", 10_000)?,
                max_retries: parsed(&lookup, "HTTP_MAX_RETRIES", 2)?,
            },
        })
    }

    /// Retry policy for outbound calls
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(self.http.max_retries)
            .attempt_timeout(Duration::from_millis(self.http.timeout_ms))
            .jitter(true)
            .build()
    }

    /// HTTP order service client
    #[must_use]
    pub fn order_service(&self) -> HttpOrderService {
        HttpOrderService::new(&self.orders.url, self.retry_policy())
    }

    /// Hosted payment provider client
    #[must_use]
    pub fn payment_gateway(&self) -> HostedPaymentGateway {
        HostedPaymentGateway::new(HostedGatewayConfig {
            base_url: self.payment.gateway_url.clone(),
            app_id: self.payment.app_id.clone(),
            secret_key: self.payment.secret_key.clone(),
            api_version: self.payment.api_version.clone(),
            return_url: self.payment.return_url.clone(),
            retry: self.retry_policy(),
        })
    }

    /// File storage in the configured directory
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the directory cannot be created.
    pub fn storage(&self) -> Result<FileStorage, StorageError> {
        FileStorage::open(&self.storage_dir)
    }
}
