//! Order service boundary.

use crate::types::{Order, OrderDraft};
use reqwest::{Client, StatusCode};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use storefront_runtime::retry::{self, RetryPolicy, RetryableError};
use thiserror::Error;

/// Header the backend deduplicates order creation on
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Boxed future returned by [`OrderService::create`]
pub type OrderFuture = Pin<Box<dyn Future<Output = Result<Order, OrderServiceError>> + Send>>;

/// Order service error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderServiceError {
    /// The backend refused the draft (4xx); retrying the same draft will not help
    #[error("Order rejected ({status}): {message}")]
    Rejected {
        /// HTTP status
        status: u16,
        /// Response body
        message: String,
    },

    /// The backend is failing or throttling (5xx, 429)
    #[error("Order service unavailable ({status})")]
    Unavailable {
        /// HTTP status
        status: u16,
    },

    /// The request never got a response
    #[error("Order service unreachable: {0}")]
    Transport(String),

    /// An attempt exceeded its deadline
    #[error("Order service timed out after {0:?}")]
    Timeout(Duration),

    /// The response body was not an order
    #[error("Unexpected order service response: {0}")]
    InvalidResponse(String),
}

impl RetryableError for OrderServiceError {
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

/// Remote order backend
pub trait OrderService: Send + Sync {
    /// Creates an order from `draft`
    ///
    /// # Errors
    ///
    /// Returns [`OrderServiceError`] if the order was not created.
    fn create(&self, draft: OrderDraft) -> OrderFuture;
}

/// Order backend over HTTP: `POST {base}/orders`
#[derive(Clone)]
pub struct HttpOrderService {
    client: Client,
    base_url: Arc<str>,
    retry: RetryPolicy,
}

impl HttpOrderService {
    /// Creates a service client with its own HTTP client
    #[must_use]
    pub fn new(base_url: impl Into<String>, retry: RetryPolicy) -> Self {
        Self::with_client(Client::new(), base_url, retry)
    }

    /// Creates a service client sharing an HTTP client
    #[must_use]
    pub fn with_client(client: Client, base_url: impl Into<String>, retry: RetryPolicy) -> Self {
        let base_url: String = base_url.into();
        Self {
            client,
            base_url: Arc::from(base_url.trim_end_matches('/')),
            retry,
        }
    }

    /// Creates an Arc-wrapped instance for sharing
    #[must_use]
    pub fn shared(base_url: impl Into<String>, retry: RetryPolicy) -> Arc<dyn OrderService> {
        Arc::new(Self::new(base_url, retry))
    }

    async fn post_order(&self, draft: &OrderDraft, key: &str) -> Result<Order, OrderServiceError> {
        let response = self
            .client
            .post(format!("{}/orders", self.base_url))
            .header(IDEMPOTENCY_HEADER, key)
            .json(draft)
            .send()
            .await
            .map_err(|e| OrderServiceError::Transport(e.to_string()))?;

        match response.status() {
            status if status.is_success() => response
                .json::<Order>()
                .await
                .map_err(|e| OrderServiceError::InvalidResponse(e.to_string())),
            status if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() => {
                Err(OrderServiceError::Unavailable {
                    status: status.as_u16(),
                })
            },
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(OrderServiceError::Rejected {
                    status: status.as_u16(),
                    message: body,
                })
            },
        }
    }
}

impl OrderService for HttpOrderService {
    fn create(&self, draft: OrderDraft) -> OrderFuture {
        let service = self.clone();
        Box::pin(async move {
            // One key per create call, shared by its retries; a verified
            // payment keys every call made for it
            let key = draft.external_payment_id.as_ref().map_or_else(
                || uuid::Uuid::new_v4().to_string(),
                |id| id.as_str().to_string(),
            );
            tracing::info!(
                idempotency_key = %key,
                total = draft.total.minor(),
                items = draft.items.len(),
                "Creating order"
            );

            let policy = service.retry.clone();
            let order = retry::retry_transient(policy, "orders.create", || {
                service.post_order(&draft, &key)
            })
            .await?;

            tracing::info!(order_id = %order.id, "Order created");
            Ok(order)
        })
    }
}

impl std::fmt::Debug for HttpOrderService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpOrderService")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}
