//! In-memory implementations of the checkout boundaries.
//!
//! Used by the tests and the demo binary. Every mock is cheap to clone and
//! clones share state, so a test can keep a handle while the environment
//! owns another, and a second store built over the same handles sees what
//! the first one wrote.

use crate::location::{self, Location};
use crate::orders::{OrderFuture, OrderService, OrderServiceError};
use crate::payment::{GatewayError, GatewayFuture, PaymentGateway, PaymentSession};
use crate::storage::{KeyValueStorage, StorageError};
use crate::types::{ExternalPaymentId, Money, Order, OrderDraft, OrderId, OrderStatus, Payer};
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Storage
// ============================================================================

/// Key/value storage held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    values: Arc<Mutex<HashMap<String, String>>>,
    writes: Arc<Mutex<HashMap<String, usize>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryStorage {
    /// Empty storage
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `set` calls for `key`
    #[must_use]
    pub fn writes(&self, key: &str) -> usize {
        lock(&self.writes).get(key).copied().unwrap_or(0)
    }

    /// `true` when `key` currently holds a value
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        lock(&self.values).contains_key(key)
    }

    /// Makes every following `set` fail with an I/O error
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(lock(&self.values).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Io {
                key: key.to_string(),
                source: io::Error::other("storage quota exceeded"),
            });
        }
        lock(&self.values).insert(key.to_string(), value.to_string());
        *lock(&self.writes).entry(key.to_string()).or_default() += 1;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        lock(&self.values).remove(key);
        Ok(())
    }
}

// ============================================================================
// Location
// ============================================================================

/// Address bar held in memory; navigation is recorded, not performed
#[derive(Debug, Clone, Default)]
pub struct MemoryLocation {
    href: Arc<Mutex<String>>,
    navigations: Arc<Mutex<Vec<String>>>,
}

impl MemoryLocation {
    /// Location showing `href`
    #[must_use]
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: Arc::new(Mutex::new(href.into())),
            navigations: Arc::default(),
        }
    }

    /// Replaces the current URL, as when the provider redirects back
    pub fn land_on(&self, href: impl Into<String>) {
        *lock(&self.href) = href.into();
    }

    /// URLs navigated to, oldest first
    #[must_use]
    pub fn navigations(&self) -> Vec<String> {
        lock(&self.navigations).clone()
    }
}

impl Location for MemoryLocation {
    fn href(&self) -> String {
        lock(&self.href).clone()
    }

    fn strip_query_param(&self, name: &str) {
        let mut href = lock(&self.href);
        *href = location::without_query_param(&href, name);
    }

    fn navigate(&self, url: &str) {
        tracing::info!(url, "Navigating away");
        lock(&self.navigations).push(url.to_string());
    }
}

// ============================================================================
// Payment gateway
// ============================================================================

type Hook = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct GatewayScript {
    initialize_error: Option<GatewayError>,
    verify_outcome: Option<Result<bool, GatewayError>>,
    initialized: Vec<(Money, Payer)>,
    verified: Vec<ExternalPaymentId>,
    on_initialize: Option<Hook>,
}

/// Scriptable payment gateway
///
/// Payments are numbered `pay_1`, `pay_2`, ... and verify as paid unless
/// scripted otherwise.
#[derive(Clone, Default)]
pub struct MockPaymentGateway {
    script: Arc<Mutex<GatewayScript>>,
    sequence: Arc<AtomicUsize>,
}

impl MockPaymentGateway {
    /// Gateway that accepts and confirms every payment
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an Arc-wrapped handle sharing this gateway's script
    #[must_use]
    pub fn shared(&self) -> Arc<dyn PaymentGateway> {
        Arc::new(self.clone())
    }

    /// Makes `initialize` fail with `error`
    pub fn fail_initialize(&self, error: GatewayError) {
        lock(&self.script).initialize_error = Some(error);
    }

    /// Sets what `verify` answers from now on
    pub fn verify_returns(&self, outcome: Result<bool, GatewayError>) {
        lock(&self.script).verify_outcome = Some(outcome);
    }

    /// Runs `hook` at the moment `initialize` is invoked
    pub fn on_initialize(&self, hook: impl Fn() + Send + Sync + 'static) {
        lock(&self.script).on_initialize = Some(Arc::new(hook));
    }

    /// Amounts and payers passed to `initialize`
    #[must_use]
    pub fn initialized(&self) -> Vec<(Money, Payer)> {
        lock(&self.script).initialized.clone()
    }

    /// Identifiers passed to `verify`
    #[must_use]
    pub fn verified(&self) -> Vec<ExternalPaymentId> {
        lock(&self.script).verified.clone()
    }
}

impl PaymentGateway for MockPaymentGateway {
    fn initialize(&self, amount: Money, payer: Payer) -> GatewayFuture<PaymentSession> {
        let (hook, outcome) = {
            let mut script = lock(&self.script);
            script.initialized.push((amount, payer));
            let outcome = match &script.initialize_error {
                Some(error) => Err(error.clone()),
                None => {
                    let n = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
                    Ok(PaymentSession {
                        payment_id: ExternalPaymentId::new(format!("pay_{n}")),
                        redirect_url: format!("https://pay.example/checkout/pay_{n}"),
                    })
                },
            };
            (script.on_initialize.clone(), outcome)
        };
        if let Some(hook) = hook {
            hook();
        }
        Box::pin(async move { outcome })
    }

    fn verify(&self, payment_id: ExternalPaymentId) -> GatewayFuture<bool> {
        let outcome = {
            let mut script = lock(&self.script);
            script.verified.push(payment_id);
            script.verify_outcome.clone().unwrap_or(Ok(true))
        };
        Box::pin(async move { outcome })
    }
}

impl std::fmt::Debug for MockPaymentGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockPaymentGateway")
            .field("issued", &self.sequence.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Order service
// ============================================================================

#[derive(Debug, Default)]
struct OrderScript {
    failures: VecDeque<OrderServiceError>,
    drafts: Vec<OrderDraft>,
    latency: Option<Duration>,
}

/// Scriptable order service
///
/// Orders are numbered `ord_1`, `ord_2`, ...; queued failures are returned
/// first, one per call.
#[derive(Debug, Clone, Default)]
pub struct MockOrderService {
    script: Arc<Mutex<OrderScript>>,
}

impl MockOrderService {
    /// Service that creates every order
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an Arc-wrapped handle sharing this service's script
    #[must_use]
    pub fn shared(&self) -> Arc<dyn OrderService> {
        Arc::new(self.clone())
    }

    /// Queues an error for the next call
    pub fn fail_next(&self, error: OrderServiceError) {
        lock(&self.script).failures.push_back(error);
    }

    /// Delays every response
    pub fn with_latency(&self, latency: Duration) {
        lock(&self.script).latency = Some(latency);
    }

    /// Drafts received, including failed calls
    #[must_use]
    pub fn drafts(&self) -> Vec<OrderDraft> {
        lock(&self.script).drafts.clone()
    }

    /// Number of `create` calls
    #[must_use]
    pub fn calls(&self) -> usize {
        lock(&self.script).drafts.len()
    }
}

impl OrderService for MockOrderService {
    fn create(&self, draft: OrderDraft) -> OrderFuture {
        let (outcome, latency) = {
            let mut script = lock(&self.script);
            script.drafts.push(draft.clone());
            let outcome = match script.failures.pop_front() {
                Some(error) => Err(error),
                None => Ok(Order {
                    id: OrderId::new(format!("ord_{}", script.drafts.len())),
                    items: draft.items,
                    total: draft.total,
                    status: OrderStatus::Processing,
                    shipping_address: draft.shipping_address,
                    billing_address: draft.billing_address,
                    payment_method: draft.payment_method,
                    external_payment_id: draft.external_payment_id,
                    created_at: Utc::now(),
                }),
            };
            (outcome, script.latency)
        };
        Box::pin(async move {
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            outcome
        })
    }
}
