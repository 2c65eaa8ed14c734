//! Payment gateway boundary.
//!
//! Redirect-based methods are paid on the provider's hosted page:
//! `initialize` registers a payment and returns where to send the customer,
//! and `verify` later asks the provider whether that payment settled. The
//! HTTP adapter speaks the hosted-checkout order API (`/pg/orders`).

use crate::location::{self, RETURN_PARAM};
use crate::types::{ExternalPaymentId, Money, Payer};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use storefront_runtime::retry::{self, RetryPolicy, RetryableError};
use thiserror::Error;

/// Payment gateway result
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Boxed future returned by gateway calls
pub type GatewayFuture<T> = Pin<Box<dyn Future<Output = GatewayResult<T>> + Send>>;

/// Payment gateway error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The provider refused the request (4xx)
    #[error("Payment provider rejected the request ({status}): {message}")]
    Rejected {
        /// HTTP status
        status: u16,
        /// Response body
        message: String,
    },

    /// The provider is failing or throttling (5xx, 429)
    #[error("Payment provider unavailable ({status})")]
    Unavailable {
        /// HTTP status
        status: u16,
    },

    /// The request never got a response
    #[error("Payment provider unreachable: {0}")]
    Transport(String),

    /// An attempt exceeded its deadline
    #[error("Payment provider timed out after {0:?}")]
    Timeout(Duration),

    /// The response could not be understood
    #[error("Unexpected payment provider response: {0}")]
    InvalidResponse(String),
}

impl RetryableError for GatewayError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Unavailable { .. } | Self::Transport(_) | Self::Timeout(_)
        )
    }

    fn timed_out(after: Duration) -> Self {
        Self::Timeout(after)
    }
}

/// A registered hosted payment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentSession {
    /// Identifier the provider echoes back on return
    pub payment_id: ExternalPaymentId,
    /// Hosted page to send the customer to
    pub redirect_url: String,
}

/// Payment gateway trait
///
/// Abstraction over a hosted payment provider.
pub trait PaymentGateway: Send + Sync {
    /// Registers a payment of `amount` for `payer`
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] if the provider cannot register the payment.
    fn initialize(&self, amount: Money, payer: Payer) -> GatewayFuture<PaymentSession>;

    /// `true` when the provider confirms `payment_id` was paid
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] if the provider cannot be asked.
    fn verify(&self, payment_id: ExternalPaymentId) -> GatewayFuture<bool>;
}

// ============================================================================
// Hosted checkout HTTP adapter
// ============================================================================

/// Connection settings for [`HostedPaymentGateway`]
#[derive(Debug, Clone)]
pub struct HostedGatewayConfig {
    /// API base, e.g. `https://sandbox.cashfree.com`
    pub base_url: String,
    /// `x-client-id`
    pub app_id: String,
    /// `x-client-secret`
    pub secret_key: String,
    /// `x-api-version`
    pub api_version: String,
    /// Checkout route the provider sends the customer back to
    pub return_url: String,
    /// Retry and timeout policy per call
    pub retry: RetryPolicy,
}

#[derive(Serialize)]
struct CreateOrderRequest<'a> {
    order_id: &'a str,
    order_amount: f64,
    order_currency: &'static str,
    customer_details: CustomerDetails<'a>,
    order_meta: OrderMeta,
}

#[derive(Serialize)]
struct CustomerDetails<'a> {
    customer_id: String,
    customer_name: &'a str,
    customer_email: &'a str,
    customer_phone: &'a str,
}

#[derive(Serialize)]
struct OrderMeta {
    return_url: String,
}

#[derive(Deserialize)]
struct CreateOrderResponse {
    order_id: String,
    payment_link: Option<String>,
}

#[derive(Deserialize)]
struct OrderStatusResponse {
    order_status: String,
}

/// Hosted payment page provider over HTTP
#[derive(Clone)]
pub struct HostedPaymentGateway {
    client: Client,
    config: Arc<HostedGatewayConfig>,
}

impl HostedPaymentGateway {
    /// Creates a gateway with its own HTTP client
    #[must_use]
    pub fn new(config: HostedGatewayConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    /// Creates a gateway sharing an HTTP client
    #[must_use]
    pub fn with_client(client: Client, mut config: HostedGatewayConfig) -> Self {
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        Self {
            client,
            config: Arc::new(config),
        }
    }

    /// Creates an Arc-wrapped instance for sharing
    #[must_use]
    pub fn shared(config: HostedGatewayConfig) -> Arc<dyn PaymentGateway> {
        Arc::new(Self::new(config))
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("x-client-id", &self.config.app_id)
            .header("x-client-secret", &self.config.secret_key)
            .header("x-api-version", &self.config.api_version)
    }

    async fn create_order(
        &self,
        order_id: &str,
        amount: Money,
        payer: &Payer,
    ) -> GatewayResult<PaymentSession> {
        #[allow(clippy::cast_precision_loss)]
        let order_amount = amount.minor() as f64 / 100.0;
        let body = CreateOrderRequest {
            order_id,
            order_amount,
            order_currency: "INR",
            customer_details: CustomerDetails {
                customer_id: payer
                    .id
                    .clone()
                    .unwrap_or_else(|| format!("guest_{order_id}")),
                customer_name: &payer.name,
                customer_email: &payer.email,
                customer_phone: &payer.phone,
            },
            order_meta: OrderMeta {
                return_url: location::with_query_param(
                    &self.config.return_url,
                    RETURN_PARAM,
                    order_id,
                ),
            },
        };

        let response = self
            .request(self.client.post(format!("{}/pg/orders", self.config.base_url)))
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                let created: CreateOrderResponse = response
                    .json()
                    .await
                    .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
                let redirect_url = created.payment_link.ok_or_else(|| {
                    GatewayError::InvalidResponse("missing payment_link".to_string())
                })?;
                Ok(PaymentSession {
                    payment_id: ExternalPaymentId::new(created.order_id),
                    redirect_url,
                })
            },
            status => Err(status_error(status, response).await),
        }
    }

    async fn order_paid(&self, payment_id: &ExternalPaymentId) -> GatewayResult<bool> {
        let response = self
            .request(self.client.get(format!(
                "{}/pg/orders/{}",
                self.config.base_url,
                payment_id.as_str()
            )))
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                let order: OrderStatusResponse = response
                    .json()
                    .await
                    .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
                Ok(order.order_status == "PAID")
            },
            // An identifier the provider never issued was not paid
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(status_error(status, response).await),
        }
    }
}

async fn status_error(status: StatusCode, response: reqwest::Response) -> GatewayError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        GatewayError::Unavailable {
            status: status.as_u16(),
        }
    } else {
        GatewayError::Rejected {
            status: status.as_u16(),
            message: response.text().await.unwrap_or_default(),
        }
    }
}

impl PaymentGateway for HostedPaymentGateway {
    fn initialize(&self, amount: Money, payer: Payer) -> GatewayFuture<PaymentSession> {
        let gateway = self.clone();
        Box::pin(async move {
            let order_id = format!("order_{}", uuid::Uuid::new_v4().simple());
            tracing::info!(
                payment_id = %order_id,
                amount = amount.minor(),
                "Initializing hosted payment"
            );
            let policy = gateway.config.retry.clone();
            retry::retry_transient(policy, "payment.initialize", || {
                gateway.create_order(&order_id, amount, &payer)
            })
            .await
        })
    }

    fn verify(&self, payment_id: ExternalPaymentId) -> GatewayFuture<bool> {
        let gateway = self.clone();
        Box::pin(async move {
            let policy = gateway.config.retry.clone();
            let paid = retry::retry_transient(policy, "payment.verify", || {
                gateway.order_paid(&payment_id)
            })
            .await?;
            tracing::info!(payment_id = %payment_id, paid, "Payment verified");
            Ok(paid)
        })
    }
}

impl std::fmt::Debug for HostedPaymentGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostedPaymentGateway")
            .field("base_url", &self.config.base_url)
            .field("app_id", &self.config.app_id)
            .finish_non_exhaustive()
    }
}
