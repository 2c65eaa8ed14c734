//! # Storefront Runtime
//!
//! Runtime for the storefront checkout reducers.
//!
//! This crate provides the [`Store`](store::Store) that coordinates reducer
//! execution and effect handling, plus bounded retry helpers used by the
//! network adapters.
//!
//! ## Core Components
//!
//! - **Store**: Owns state, runs the reducer, executes effects
//! - **Effect Executor**: Executes effect descriptions and feeds actions back to the reducer
//! - **Retry**: Exponential backoff with per-attempt timeouts for transient failures
//!
//! ## Example
//!
//! ```ignore
//! use storefront_runtime::Store;
//!
//! let store = Store::new(CheckoutState::default(), CheckoutReducer::new(), environment);
//!
//! // Send an action and wait for every effect it cascades into
//! let mut handle = store.send(CheckoutAction::PageMounted).await?;
//! handle.wait().await;
//!
//! // Read state
//! let phase = store.state(|s| s.phase.clone()).await;
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use storefront_core::{effect::Effect, reducer::Reducer};
use tokio::sync::{RwLock, watch};

/// Retry logic with exponential backoff
pub mod retry;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        ///
        /// Returned when `send()` is called after shutdown was initiated.
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),
    }
}

pub use error::StoreError;
pub use store::Store;

/// Handle for tracking effect completion
///
/// Returned by [`Store::send()`]. Effects are tracked transitively: actions
/// produced by effects are reduced under the same handle, so waiting on it
/// covers the whole cascade started by one action.
///
/// # Example
///
/// ```ignore
/// let mut handle = store.send(Action::SubmitRequested).await?;
/// handle.wait_with_timeout(Duration::from_secs(5)).await?;
/// // Every effect triggered by the submit has finished
/// ```
#[derive(Clone)]
pub struct EffectHandle {
    effects: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl EffectHandle {
    fn new() -> (Self, EffectTracking) {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(());

        let handle = Self {
            effects: Arc::clone(&counter),
            completion: rx,
        };
        let tracking = EffectTracking {
            counter,
            notifier: Arc::new(tx),
        };

        (handle, tracking)
    }

    /// Create a handle that's already complete
    #[must_use]
    pub fn completed() -> Self {
        let (tx, rx) = watch::channel(());
        let _ = tx.send(());

        Self {
            effects: Arc::new(AtomicUsize::new(0)),
            completion: rx,
        }
    }

    /// Number of effects still running under this handle
    #[must_use]
    pub fn pending(&self) -> usize {
        self.effects.load(Ordering::SeqCst)
    }

    /// Wait for all effects to complete
    pub async fn wait(&mut self) {
        while self.effects.load(Ordering::SeqCst) > 0 {
            if self.completion.changed().await.is_err() {
                // Every tracker is gone, so nothing can still be running
                break;
            }
        }
    }

    /// Wait for all effects to complete with a timeout
    ///
    /// # Errors
    ///
    /// Returns `Err(())` if the timeout expires before all effects complete.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), ()> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| ())
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending_effects", &self.effects.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Internal: effect tracking context passed through effect execution
#[derive(Clone)]
struct EffectTracking {
    counter: Arc<AtomicUsize>,
    notifier: Arc<watch::Sender<()>>,
}

impl EffectTracking {
    fn increment(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement(&self) {
        if self.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _ = self.notifier.send(());
        }
    }
}

/// Internal: RAII guard that decrements the effect counter on drop
///
/// Keeps the counter correct even if the effect panics.
struct DecrementGuard(EffectTracking);

impl Drop for DecrementGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

/// Guard that decrements an atomic counter on drop (for shutdown tracking)
struct AtomicCounterGuard(Arc<AtomicUsize>);

impl Drop for AtomicCounterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Store runtime for coordinating reducer execution and effect handling.
pub mod store {
    use super::{
        Arc, AtomicBool, AtomicCounterGuard, AtomicUsize, DecrementGuard, Duration, Effect,
        EffectHandle, EffectTracking, Ordering, Reducer, RwLock, StoreError,
    };
    use std::future::Future;
    use std::pin::Pin;

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock` for concurrent access)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop)
    ///
    /// A checkout page lifetime maps to one `Store`. Leaving the page is
    /// [`Store::shutdown`]; coming back is a new `Store` over the same
    /// durable environment.
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: Arc<R>,
        environment: Arc<E>,
        shutdown: Arc<AtomicBool>,
        pending_effects: Arc<AtomicUsize>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer: Arc::new(reducer),
                environment: Arc::new(environment),
                shutdown: Arc::new(AtomicBool::new(false)),
                pending_effects: Arc::new(AtomicUsize::new(0)),
            }
        }

        /// Injected dependencies of this store
        #[must_use]
        pub fn environment(&self) -> &E {
            &self.environment
        }

        /// Send an action to the store
        ///
        /// 1. Acquires write lock on state
        /// 2. Calls reducer with (state, action, environment)
        /// 3. Starts the returned effects
        /// 4. Actions produced by effects are fed back under the same handle
        ///
        /// `send()` returns once the effects are started. Use the returned
        /// [`EffectHandle`] to wait for them and everything they cascade into.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError> {
            if self.shutdown.load(Ordering::Acquire) {
                tracing::warn!("Rejected action: store is shutting down");
                metrics::counter!("store.shutdown.rejected_actions").increment(1);
                return Err(StoreError::ShutdownInProgress);
            }

            let (handle, tracking) = EffectHandle::new();
            self.dispatch(action, &tracking).await;
            Ok(handle)
        }

        /// Send an action and wait until its whole effect cascade finished
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        pub async fn send_and_settle(&self, action: A) -> Result<(), StoreError> {
            let mut handle = self.send(action).await?;
            handle.wait().await;
            Ok(())
        }

        /// Read current state via a closure
        ///
        /// ```ignore
        /// let banner = store.state(|s| s.banner.clone()).await;
        /// ```
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&*state)
        }

        /// Initiate graceful shutdown of the store
        ///
        /// Rejects new actions, then waits for in-flight effects.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if the timeout expires before all
        /// pending effects complete.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Initiating graceful shutdown");
            self.shutdown.store(true, Ordering::Release);

            let start = std::time::Instant::now();
            let poll_interval = Duration::from_millis(10);

            loop {
                let pending = self.pending_effects.load(Ordering::Acquire);
                if pending == 0 {
                    tracing::info!("All effects completed, shutdown successful");
                    return Ok(());
                }
                if start.elapsed() >= timeout {
                    tracing::error!(pending_effects = pending, "Shutdown timeout");
                    return Err(StoreError::ShutdownTimeout(pending));
                }
                tokio::time::sleep(poll_interval).await;
            }
        }

        /// Reduce one action and start its effects under `tracking`
        fn dispatch<'a>(
            &'a self,
            action: A,
            tracking: &'a EffectTracking,
        ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
            Box::pin(async move {
                metrics::counter!("store.commands.total").increment(1);

                let effects = {
                    let mut state = self.state.write().await;
                    let effects = self.reducer.reduce(&mut *state, action, &self.environment);
                    tracing::trace!("Reducer completed, returned {} effects", effects.len());
                    effects
                };

                for effect in effects {
                    self.execute_effect(effect, tracking);
                }
            })
        }

        /// Execute an effect, tracking it on `tracking`
        ///
        /// - `None`: No-op
        /// - `Future`: Executes async computation, sends resulting action if `Some`
        /// - `Delay`: Waits for duration, then sends action
        /// - `Parallel`: Executes effects concurrently
        /// - `Sequential`: Executes effects in order, waiting for each to complete
        fn execute_effect(&self, effect: Effect<A>, tracking: &EffectTracking) {
            match effect {
                Effect::None => {
                    metrics::counter!("store.effects.executed", "type" => "none").increment(1);
                },
                Effect::Future(fut) => {
                    metrics::counter!("store.effects.executed", "type" => "future").increment(1);
                    let guards = self.track(tracking);
                    let store = self.clone();
                    let tracking = tracking.clone();

                    tokio::spawn(async move {
                        let _guards = guards;
                        if let Some(action) = fut.await {
                            tracing::trace!("Effect::Future produced an action, sending to store");
                            store.dispatch(action, &tracking).await;
                        }
                    });
                },
                Effect::Delay { duration, action } => {
                    metrics::counter!("store.effects.executed", "type" => "delay").increment(1);
                    let guards = self.track(tracking);
                    let store = self.clone();
                    let tracking = tracking.clone();

                    tokio::spawn(async move {
                        let _guards = guards;
                        tokio::time::sleep(duration).await;
                        store.dispatch(*action, &tracking).await;
                    });
                },
                Effect::Parallel(effects) => {
                    metrics::counter!("store.effects.executed", "type" => "parallel").increment(1);
                    for effect in effects {
                        self.execute_effect(effect, tracking);
                    }
                },
                Effect::Sequential(effects) => {
                    metrics::counter!("store.effects.executed", "type" => "sequential")
                        .increment(1);
                    let guards = self.track(tracking);
                    let store = self.clone();

                    tokio::spawn(async move {
                        let _guards = guards;
                        for effect in effects {
                            let (mut step, step_tracking) = EffectHandle::new();
                            store.execute_effect(effect, &step_tracking);
                            drop(step_tracking);
                            step.wait().await;
                        }
                    });
                },
            }
        }

        fn track(&self, tracking: &EffectTracking) -> (DecrementGuard, AtomicCounterGuard) {
            tracking.increment();
            self.pending_effects.fetch_add(1, Ordering::SeqCst);
            (
                DecrementGuard(tracking.clone()),
                AtomicCounterGuard(Arc::clone(&self.pending_effects)),
            )
        }
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: Arc::clone(&self.reducer),
                environment: Arc::clone(&self.environment),
                shutdown: Arc::clone(&self.shutdown),
                pending_effects: Arc::clone(&self.pending_effects),
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use storefront_core::{SmallVec, smallvec};

    #[derive(Debug, Clone, PartialEq)]
    enum PaymentAction {
        Start,
        Authorized { attempt: u32 },
        Settled,
        Ping,
    }

    #[derive(Debug, Default)]
    struct PaymentState {
        log: Vec<String>,
        attempts: u32,
    }

    struct PaymentReducer;

    impl Reducer for PaymentReducer {
        type State = PaymentState;
        type Action = PaymentAction;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut PaymentState,
            action: PaymentAction,
            _env: &(),
        ) -> SmallVec<[Effect<PaymentAction>; 4]> {
            match action {
                PaymentAction::Start => {
                    state.log.push("start".into());
                    smallvec![Effect::future(async {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        Some(PaymentAction::Authorized { attempt: 1 })
                    })]
                },
                PaymentAction::Authorized { attempt } => {
                    state.attempts = attempt;
                    state.log.push(format!("authorized:{attempt}"));
                    smallvec![Effect::Delay {
                        duration: Duration::from_millis(5),
                        action: Box::new(PaymentAction::Settled),
                    }]
                },
                PaymentAction::Settled => {
                    state.log.push("settled".into());
                    smallvec![Effect::None]
                },
                PaymentAction::Ping => {
                    state.log.push("ping".into());
                    smallvec![Effect::chain(vec![
                        Effect::future(async { None }),
                        Effect::future(async { Some(PaymentAction::Settled) }),
                    ])]
                },
            }
        }
    }

    #[tokio::test]
    async fn handle_waits_for_cascading_effects() {
        let store = Store::new(PaymentState::default(), PaymentReducer, ());

        let mut handle = store.send(PaymentAction::Start).await.unwrap();
        handle.wait().await;

        let log = store.state(|s| s.log.clone()).await;
        assert_eq!(log, vec!["start", "authorized:1", "settled"]);
        assert_eq!(handle.pending(), 0);
    }

    #[tokio::test]
    async fn sequential_effects_run_to_completion() {
        let store = Store::new(PaymentState::default(), PaymentReducer, ());

        store.send_and_settle(PaymentAction::Ping).await.unwrap();

        let log = store.state(|s| s.log.clone()).await;
        assert_eq!(log, vec!["ping", "settled"]);
    }

    #[tokio::test]
    async fn shutdown_rejects_new_actions() {
        let store = Store::new(PaymentState::default(), PaymentReducer, ());

        tokio_test::assert_ok!(store.shutdown(Duration::from_secs(1)).await);

        let result = store.send(PaymentAction::Start).await;
        assert!(matches!(result, Err(StoreError::ShutdownInProgress)));
        assert_eq!(store.state(|s| s.attempts).await, 0);
    }

    #[tokio::test]
    async fn completed_handle_does_not_block() {
        let mut handle = EffectHandle::completed();
        assert!(handle.wait_with_timeout(Duration::from_millis(50)).await.is_ok());
    }
}
