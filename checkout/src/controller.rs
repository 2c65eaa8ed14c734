//! Checkout controller.
//!
//! The checkout is a state machine that has to survive the page going away.
//! Cash on delivery is placed directly. Hosted payments save a
//! [`CheckoutSnapshot`] first, then hand the customer to the provider; when
//! the provider sends them back, a fresh store rebuilds everything it needs
//! from the return URL, the saved snapshot and the cart, verifies the
//! payment and only then creates the order.
//!
//! ```text
//! Editing ──submit──▶ Submitting ──cash on delivery──────────────▶ Confirmed
//!                          │                                          ▲
//!                          └─snapshot + initialize─▶ AwaitingExternalPayment
//!                                                         │ (page reload)
//!                                     mount with order_id ▼
//!                                                    Reconciling ──verify + create
//! ```
//!
//! Every failure lands back in `Editing` with a banner; the snapshot is only
//! removed once an order exists or the customer abandons.

use crate::cart::{CartContents, CartStore};
use crate::delivery::{self, SlotSelection, TimeWindow, WindowOption};
use crate::location::{Location, RETURN_PARAM};
use crate::orders::{OrderService, OrderServiceError};
use crate::payment::{GatewayError, PaymentGateway, PaymentSession};
use crate::pricing::{PriceBreakdown, ShippingRule};
use crate::storage::{KeyValueStorage, SnapshotStore};
use crate::types::{
    AddressKind, CheckoutSnapshot, CustomerSession, DeliveryMethod, DraftLineItem,
    ExternalPaymentId, Money, Order, OrderDraft, Payer, PaymentMethod,
};
use crate::validation::{self, CheckoutForm, Field, SubmissionContext, ValidationErrors};
use chrono::NaiveDate;
use std::sync::Arc;
use storefront_core::environment::Clock;
use storefront_core::{SmallVec, effect::Effect, reducer::Reducer, smallvec};
use thiserror::Error;

// ============================================================================
// State
// ============================================================================

/// Where the checkout is in its lifecycle
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum CheckoutPhase {
    /// The customer is filling in the form (also the recovery state)
    #[default]
    Editing,
    /// An order or a hosted payment is being set up
    Submitting,
    /// The customer was sent to the hosted payment page
    AwaitingExternalPayment {
        /// Payment the provider registered
        payment_id: ExternalPaymentId,
    },
    /// Back from the provider; verifying and creating the order
    Reconciling {
        /// Payment named by the return URL
        payment_id: ExternalPaymentId,
    },
    /// The order exists
    Confirmed,
}

/// Category of a user-visible error
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BannerKind {
    /// A network call failed; submitting again may help
    Network,
    /// The payment could not be started or was not confirmed
    PaymentFailed,
    /// Paid, but the order could not be finished yet
    Reconciliation,
    /// The amount changed between payment and return
    AmountMismatch,
    /// Back from the provider without saved checkout details
    MissingSnapshot,
}

/// Error shown above the checkout form
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutBanner {
    /// Category
    pub kind: BannerKind,
    /// Text for the customer
    pub message: String,
    /// Payment the error refers to, quoted to support
    pub payment_id: Option<ExternalPaymentId>,
    /// Whether the customer may close it
    pub dismissible: bool,
}

impl CheckoutBanner {
    fn network(message: impl Into<String>) -> Self {
        Self {
            kind: BannerKind::Network,
            message: message.into(),
            payment_id: None,
            dismissible: true,
        }
    }
}

/// Checkout page state
#[derive(Clone, Debug, Default)]
pub struct CheckoutState {
    /// What the customer entered
    pub form: CheckoutForm,
    /// Field errors currently shown
    pub errors: ValidationErrors,
    /// Lifecycle phase
    pub phase: CheckoutPhase,
    /// Error banner, if any
    pub banner: Option<CheckoutBanner>,
    /// Cart as last read from storage
    pub cart: CartContents,
    /// Price of `cart` for the chosen delivery method
    pub pricing: PriceBreakdown,
    /// Identifier from the return URL, kept for retrying reconciliation
    pub return_payment_id: Option<ExternalPaymentId>,
    /// Hosted page the customer was sent to
    pub redirect_url: Option<String>,
    /// The confirmed order
    pub order: Option<Order>,
    /// Cart and snapshot are being read
    pub loading: bool,
}

impl CheckoutState {
    /// `true` while a submission or reconciliation is in flight
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        self.loading || matches!(self.phase, CheckoutPhase::Submitting | CheckoutPhase::Reconciling { .. })
    }

    /// Windows offered for the selected date
    #[must_use]
    pub fn windows(&self) -> Vec<WindowOption> {
        self.form.slot.date.map(delivery::windows_for).unwrap_or_default()
    }

    fn accepts_edits(&self) -> bool {
        !self.is_busy() && self.phase != CheckoutPhase::Confirmed
    }

    fn reprice(&mut self, shipping: &ShippingRule) {
        self.pricing = self.cart.price(shipping, self.form.delivery_method);
    }
}

// ============================================================================
// Actions
// ============================================================================

/// Why a return from the hosted payment page did not produce an order
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ReconcileFailure {
    /// The provider says the payment was not completed
    #[error("payment was not confirmed by the provider")]
    Unverified,
    /// The provider could not be asked
    #[error("payment verification failed: {0}")]
    Verification(GatewayError),
    /// Nothing was saved before the redirect
    #[error("no saved checkout found")]
    MissingSnapshot,
    /// The cart no longer prices to what was paid
    #[error("order total changed from {authorized} to {current}")]
    AmountMismatch {
        /// Total handed to the provider
        authorized: Money,
        /// Total of the cart now
        current: Money,
    },
    /// The saved checkout lacks a required choice
    #[error("saved checkout has no {0}")]
    IncompleteSnapshot(&'static str),
    /// Storage could not be read
    #[error("storage failed: {0}")]
    Storage(String),
    /// The order service did not create the order
    #[error("order creation failed: {0}")]
    OrderCreation(OrderServiceError),
}

impl ReconcileFailure {
    fn banner(&self, payment_id: &ExternalPaymentId) -> CheckoutBanner {
        let (kind, message, dismissible) = match self {
            Self::Unverified => (
                BannerKind::PaymentFailed,
                "Your payment could not be verified. No order was placed.".to_string(),
                true,
            ),
            Self::Verification(_) | Self::Storage(_) => (
                BannerKind::Reconciliation,
                format!("We couldn't confirm your payment yet. Please retry (reference {payment_id})."),
                false,
            ),
            Self::OrderCreation(_) | Self::IncompleteSnapshot(_) => (
                BannerKind::Reconciliation,
                format!(
                    "Your payment was received but the order could not be created. \
                     Please retry (reference {payment_id})."
                ),
                false,
            ),
            Self::AmountMismatch { authorized, current } => (
                BannerKind::AmountMismatch,
                format!(
                    "Your cart changed after payment: {authorized} was paid but the order now \
                     totals {current}. Please contact support with reference {payment_id}."
                ),
                false,
            ),
            Self::MissingSnapshot => (
                BannerKind::MissingSnapshot,
                format!(
                    "We couldn't find your checkout details for payment {payment_id}. \
                     Please contact support."
                ),
                false,
            ),
        };
        CheckoutBanner {
            kind,
            message,
            payment_id: Some(payment_id.clone()),
            dismissible,
        }
    }
}

/// Everything that can happen on the checkout page
#[derive(Clone, Debug, PartialEq)]
pub enum CheckoutAction {
    // ========== Customer ==========
    /// The checkout page was opened (first visit or return from the provider)
    PageMounted,
    /// A text field changed
    FieldChanged {
        /// Field
        field: Field,
        /// New text
        value: String,
    },
    /// A text field lost focus
    FieldBlurred {
        /// Field
        field: Field,
    },
    /// "Billing address same as shipping" was toggled
    SameAddressToggled {
        /// New value
        same: bool,
    },
    /// Delivery speed chosen
    DeliveryMethodSelected {
        /// Method
        method: DeliveryMethod,
    },
    /// Delivery date chosen
    DeliveryDateSelected {
        /// Date
        date: NaiveDate,
    },
    /// Delivery window chosen
    DeliveryTimeSelected {
        /// Window
        window: TimeWindow,
    },
    /// Payment method chosen
    PaymentMethodSelected {
        /// Method
        method: PaymentMethod,
    },
    /// "Place order" pressed
    SubmitRequested,
    /// Retry finishing the order for the payment in the URL
    RetryReconciliation,
    /// Give up on this checkout
    AbandonCheckout,
    /// Banner closed
    BannerDismissed,

    // ========== Effect feedback ==========
    /// Cart and snapshot were read
    PageLoaded {
        /// Stored cart
        cart: CartContents,
        /// Stored snapshot
        snapshot: Option<CheckoutSnapshot>,
        /// Identifier from the return URL
        return_payment_id: Option<ExternalPaymentId>,
    },
    /// Cart or snapshot could not be read
    PageLoadFailed {
        /// Identifier from the return URL
        return_payment_id: Option<ExternalPaymentId>,
        /// Storage error
        message: String,
    },
    /// Cash on delivery order created
    OrderCreated {
        /// The order
        order: Order,
    },
    /// Cash on delivery order not created
    OrderCreationFailed {
        /// Cause
        error: OrderServiceError,
    },
    /// The snapshot could not be written; nothing was sent to the provider
    SnapshotSaveFailed {
        /// Storage error
        message: String,
    },
    /// The provider registered the payment and the customer was redirected
    PaymentInitialized {
        /// Registered payment
        session: PaymentSession,
    },
    /// The provider did not register the payment
    PaymentInitializationFailed {
        /// Cause
        error: GatewayError,
    },
    /// Order created for a verified hosted payment
    ReconciliationSucceeded {
        /// The order
        order: Order,
    },
    /// Return from the provider did not produce an order
    ReconciliationFailed {
        /// Payment from the return URL
        payment_id: ExternalPaymentId,
        /// Cause
        failure: ReconcileFailure,
    },
    /// Snapshot and return identifier were discarded
    CheckoutAbandoned,
    /// Abandon could not remove the snapshot
    AbandonFailed {
        /// Storage error
        message: String,
    },
}

// ============================================================================
// Environment
// ============================================================================

/// Dependencies of the checkout
#[derive(Clone)]
pub struct CheckoutEnvironment {
    /// Clock, for the delivery booking window
    pub clock: Arc<dyn Clock>,
    /// Cart
    pub cart: CartStore,
    /// Saved checkout
    pub snapshots: SnapshotStore,
    /// Address bar
    pub location: Arc<dyn Location>,
    /// Hosted payment provider
    pub payments: Arc<dyn PaymentGateway>,
    /// Order backend
    pub orders: Arc<dyn OrderService>,
    /// Signed-in customer
    pub session: Option<CustomerSession>,
    /// Shipping fees
    pub shipping: ShippingRule,
}

impl CheckoutEnvironment {
    /// Creates an environment for a guest with the default shipping rule
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        storage: Arc<dyn KeyValueStorage>,
        location: Arc<dyn Location>,
        payments: Arc<dyn PaymentGateway>,
        orders: Arc<dyn OrderService>,
    ) -> Self {
        Self {
            clock,
            cart: CartStore::new(Arc::clone(&storage)),
            snapshots: SnapshotStore::new(storage),
            location,
            payments,
            orders,
            session: None,
            shipping: ShippingRule::default(),
        }
    }

    /// Checks out as a signed-in customer
    #[must_use]
    pub fn with_session(mut self, session: CustomerSession) -> Self {
        self.session = Some(session);
        self
    }

    /// Uses `shipping` instead of the default fees
    #[must_use]
    pub const fn with_shipping_rule(mut self, shipping: ShippingRule) -> Self {
        self.shipping = shipping;
        self
    }

    fn customer_id(&self) -> Option<String> {
        self.session.as_ref().map(|session| session.user_id.clone())
    }
}

impl std::fmt::Debug for CheckoutEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutEnvironment")
            .field("session", &self.session)
            .field("shipping", &self.shipping)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Snapshot and draft assembly
// ============================================================================

/// Captures the form as a snapshot; guest contact only for guests.
#[must_use]
pub fn snapshot_of(form: &CheckoutForm, authenticated: bool, authorized_total: Money) -> CheckoutSnapshot {
    let guest = |value: &str| (!authenticated).then(|| value.trim().to_string());
    CheckoutSnapshot {
        shipping_address: form.shipping_address.clone(),
        billing_address: form.billing_address.clone(),
        use_same_address: form.use_same_address,
        guest_email: guest(&form.contact.email),
        guest_phone: guest(&form.contact.phone),
        selected_date: form.slot.date,
        selected_time: form.slot.time,
        payment_method: form.payment_method.clone(),
        delivery_method: form.delivery_method,
        authorized_total,
    }
}

fn restore_form(form: &mut CheckoutForm, snapshot: &CheckoutSnapshot) {
    form.shipping_address = snapshot.shipping_address.clone();
    form.billing_address = snapshot.billing_address.clone();
    form.use_same_address = snapshot.use_same_address;
    if let Some(email) = &snapshot.guest_email {
        form.contact.email.clone_from(email);
    }
    if let Some(phone) = &snapshot.guest_phone {
        form.contact.phone.clone_from(phone);
    }
    form.slot = SlotSelection {
        date: snapshot.selected_date,
        time: snapshot.selected_time,
    };
    form.delivery_method = snapshot.delivery_method;
    form.payment_method = snapshot.payment_method.clone();
}

/// Field to flag when a direct order cannot be drafted from the form
fn missing_choice(failure: &ReconcileFailure) -> (Field, &'static str) {
    match failure {
        ReconcileFailure::IncompleteSnapshot("payment method") => {
            (Field::PaymentMethod, "Please select a payment method")
        },
        _ => (Field::DeliveryTime, "Please select a delivery time"),
    }
}

/// Builds the order draft from saved inputs and freshly computed totals.
///
/// # Errors
///
/// Returns [`ReconcileFailure::IncompleteSnapshot`] when the delivery slot
/// or the payment method is missing.
pub fn build_draft(
    snapshot: &CheckoutSnapshot,
    cart: &CartContents,
    pricing: &PriceBreakdown,
    customer_id: Option<String>,
    external_payment_id: Option<ExternalPaymentId>,
) -> Result<OrderDraft, ReconcileFailure> {
    let delivery_slot = snapshot
        .slot()
        .ok_or(ReconcileFailure::IncompleteSnapshot("delivery slot"))?;
    let payment_method = snapshot
        .payment_method
        .clone()
        .ok_or(ReconcileFailure::IncompleteSnapshot("payment method"))?;
    let guest_contact = if customer_id.is_none() {
        snapshot.guest_contact()
    } else {
        None
    };

    Ok(OrderDraft {
        items: cart.items.iter().map(DraftLineItem::from).collect(),
        subtotal: pricing.subtotal,
        discount: pricing.discount,
        shipping_cost: pricing.shipping,
        tax: pricing.tax,
        total: pricing.total,
        shipping_address: snapshot.shipping_address.retagged(AddressKind::Shipping),
        billing_address: snapshot.effective_billing(),
        delivery_method: snapshot.delivery_method,
        delivery_slot,
        payment_method,
        customer_id,
        guest_contact,
        external_payment_id,
    })
}

fn payer_for(session: Option<&CustomerSession>, form: &CheckoutForm) -> Payer {
    match session {
        Some(session) => Payer {
            id: Some(session.user_id.clone()),
            name: session.name.clone(),
            email: session.email.clone(),
            phone: session.phone.clone(),
        },
        None => Payer {
            id: None,
            name: "Guest".to_string(),
            email: form.contact.email.trim().to_string(),
            phone: form.contact.phone.trim().to_string(),
        },
    }
}

/// Everything reconciliation needs, detached from the environment
struct Finalizer {
    payments: Arc<dyn PaymentGateway>,
    orders: Arc<dyn OrderService>,
    cart: CartStore,
    snapshots: SnapshotStore,
    shipping: ShippingRule,
    customer_id: Option<String>,
}

impl Finalizer {
    fn new(env: &CheckoutEnvironment) -> Self {
        Self {
            payments: Arc::clone(&env.payments),
            orders: Arc::clone(&env.orders),
            cart: env.cart.clone(),
            snapshots: env.snapshots.clone(),
            shipping: env.shipping,
            customer_id: env.customer_id(),
        }
    }

    async fn finalize(self, payment_id: &ExternalPaymentId) -> Result<Order, ReconcileFailure> {
        let storage = |error: crate::storage::StorageError| ReconcileFailure::Storage(error.to_string());

        let snapshot = self
            .snapshots
            .load()
            .map_err(storage)?
            .ok_or(ReconcileFailure::MissingSnapshot)?;
        let cart = self.cart.contents().map_err(storage)?;
        let pricing = cart.price(&self.shipping, snapshot.delivery_method);

        let paid = self
            .payments
            .verify(payment_id.clone())
            .await
            .map_err(ReconcileFailure::Verification)?;
        if !paid {
            return Err(ReconcileFailure::Unverified);
        }

        if pricing.total != snapshot.authorized_total {
            return Err(ReconcileFailure::AmountMismatch {
                authorized: snapshot.authorized_total,
                current: pricing.total,
            });
        }

        let draft = build_draft(
            &snapshot,
            &cart,
            &pricing,
            self.customer_id,
            Some(payment_id.clone()),
        )?;
        self.orders
            .create(draft)
            .await
            .map_err(ReconcileFailure::OrderCreation)
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for the checkout page
#[derive(Clone, Debug, Default)]
pub struct CheckoutReducer;

impl CheckoutReducer {
    /// Creates a new `CheckoutReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn load_page(env: &CheckoutEnvironment) -> Effect<CheckoutAction> {
        let location = Arc::clone(&env.location);
        let cart = env.cart.clone();
        let snapshots = env.snapshots.clone();
        Effect::future(async move {
            let return_payment_id = location.query_param(RETURN_PARAM).map(ExternalPaymentId::new);
            let loaded = cart
                .contents()
                .and_then(|cart| Ok((cart, snapshots.load()?)));
            Some(match loaded {
                Ok((cart, snapshot)) => CheckoutAction::PageLoaded {
                    cart,
                    snapshot,
                    return_payment_id,
                },
                Err(error) => CheckoutAction::PageLoadFailed {
                    return_payment_id,
                    message: error.to_string(),
                },
            })
        })
    }

    fn reconcile(env: &CheckoutEnvironment, payment_id: ExternalPaymentId) -> Effect<CheckoutAction> {
        let finalizer = Finalizer::new(env);
        Effect::future(async move {
            Some(match finalizer.finalize(&payment_id).await {
                Ok(order) => CheckoutAction::ReconciliationSucceeded { order },
                Err(failure) => CheckoutAction::ReconciliationFailed { payment_id, failure },
            })
        })
    }

    fn place_direct(draft: OrderDraft, env: &CheckoutEnvironment) -> Effect<CheckoutAction> {
        let orders = Arc::clone(&env.orders);
        Effect::future(async move {
            Some(match orders.create(draft).await {
                Ok(order) => CheckoutAction::OrderCreated { order },
                Err(error) => CheckoutAction::OrderCreationFailed { error },
            })
        })
    }

    fn start_hosted_payment(
        snapshot: CheckoutSnapshot,
        payer: Payer,
        env: &CheckoutEnvironment,
    ) -> Effect<CheckoutAction> {
        let snapshots = env.snapshots.clone();
        let payments = Arc::clone(&env.payments);
        let location = Arc::clone(&env.location);
        Effect::future(async move {
            // The snapshot must be durable before the provider can take over
            if let Err(error) = snapshots.save(&snapshot) {
                return Some(CheckoutAction::SnapshotSaveFailed {
                    message: error.to_string(),
                });
            }
            Some(match payments.initialize(snapshot.authorized_total, payer).await {
                Ok(session) => {
                    location.navigate(&session.redirect_url);
                    CheckoutAction::PaymentInitialized { session }
                },
                Err(error) => CheckoutAction::PaymentInitializationFailed { error },
            })
        })
    }

    fn clear_cart(env: &CheckoutEnvironment) -> Effect<CheckoutAction> {
        let cart = env.cart.clone();
        Effect::future(async move {
            if let Err(error) = cart.clear() {
                tracing::error!(error = %error, "Failed to clear cart after order");
            }
            None
        })
    }

    /// Snapshot, cart, then the return identifier, strictly in that order
    fn finish_hosted_order(env: &CheckoutEnvironment) -> Effect<CheckoutAction> {
        let snapshots = env.snapshots.clone();
        let location = Arc::clone(&env.location);
        Effect::chain(vec![
            Effect::future(async move {
                if let Err(error) = snapshots.clear() {
                    tracing::error!(error = %error, "Failed to clear checkout snapshot");
                }
                None
            }),
            Self::clear_cart(env),
            Effect::future(async move {
                location.strip_query_param(RETURN_PARAM);
                None
            }),
        ])
    }

    fn abandon(env: &CheckoutEnvironment) -> Effect<CheckoutAction> {
        let snapshots = env.snapshots.clone();
        let location = Arc::clone(&env.location);
        Effect::future(async move {
            Some(match snapshots.clear() {
                Ok(()) => {
                    location.strip_query_param(RETURN_PARAM);
                    CheckoutAction::CheckoutAbandoned
                },
                Err(error) => CheckoutAction::AbandonFailed {
                    message: error.to_string(),
                },
            })
        })
    }

    fn submit(
        state: &mut CheckoutState,
        env: &CheckoutEnvironment,
    ) -> SmallVec<[Effect<CheckoutAction>; 4]> {
        let authenticated = env.session.is_some();
        let context = SubmissionContext {
            authenticated,
            cart_lines: state.cart.items.len(),
            today: env.clock.now().date_naive(),
        };
        state.errors = validation::validate_submission(&state.form, &context);
        if !state.errors.is_empty() {
            tracing::debug!(errors = state.errors.len(), "Submission blocked by validation");
            return SmallVec::new();
        }
        let Some(method) = state.form.payment_method.clone() else {
            return SmallVec::new();
        };

        state.reprice(&env.shipping);
        let snapshot = snapshot_of(&state.form, authenticated, state.pricing.total);
        state.phase = CheckoutPhase::Submitting;
        state.banner = None;

        if method.requires_redirect() {
            tracing::info!(
                method = method.label(),
                amount = state.pricing.total.minor(),
                "Starting hosted payment"
            );
            let payer = payer_for(env.session.as_ref(), &state.form);
            return smallvec![Self::start_hosted_payment(snapshot, payer, env)];
        }

        match build_draft(&snapshot, &state.cart, &state.pricing, env.customer_id(), None) {
            Ok(draft) => {
                tracing::info!(amount = draft.total.minor(), "Placing cash on delivery order");
                smallvec![Self::place_direct(draft, env)]
            },
            Err(failure) => {
                let (field, message) = missing_choice(&failure);
                state.phase = CheckoutPhase::Editing;
                state.errors.set(field, Some(message.to_string()));
                SmallVec::new()
            },
        }
    }

    fn edit(state: &mut CheckoutState, field: Field, value: String, authenticated: bool) {
        if state.form.set_text(field, value) && state.errors.contains(field) {
            // Re-check a field already flagged so the message clears once fixed
            let outcome = validation::validate_field(field, &state.form, authenticated);
            state.errors.set(field, outcome);
        }
    }
}

impl Reducer for CheckoutReducer {
    type State = CheckoutState;
    type Action = CheckoutAction;
    type Environment = CheckoutEnvironment;

    #[allow(clippy::too_many_lines)] // One arm per action
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            // ========== Mount ==========
            CheckoutAction::PageMounted => {
                if state.is_busy() {
                    tracing::debug!("Ignoring mount while checkout is busy");
                    return SmallVec::new();
                }
                if state.phase == CheckoutPhase::Confirmed {
                    // Cleanup of the confirmed order may still be running
                    tracing::debug!("Ignoring mount after confirmation");
                    return SmallVec::new();
                }
                state.loading = true;
                smallvec![Self::load_page(env)]
            },

            CheckoutAction::PageLoaded {
                cart,
                snapshot,
                return_payment_id,
            } => {
                if !state.loading {
                    tracing::debug!("Ignoring page load that was not requested");
                    return SmallVec::new();
                }
                state.loading = false;
                state.cart = cart;
                if let Some(snapshot) = &snapshot {
                    restore_form(&mut state.form, snapshot);
                }
                state.reprice(&env.shipping);
                state.return_payment_id.clone_from(&return_payment_id);

                match (return_payment_id, snapshot) {
                    (Some(payment_id), Some(_)) => {
                        tracing::info!(payment_id = %payment_id, "Returned from hosted payment");
                        state.phase = CheckoutPhase::Reconciling {
                            payment_id: payment_id.clone(),
                        };
                        state.banner = None;
                        smallvec![Self::reconcile(env, payment_id)]
                    },
                    (Some(payment_id), None) => {
                        tracing::warn!(payment_id = %payment_id, "Returned without a saved checkout");
                        state.phase = CheckoutPhase::Editing;
                        state.banner = Some(ReconcileFailure::MissingSnapshot.banner(&payment_id));
                        SmallVec::new()
                    },
                    (None, _) => {
                        state.phase = CheckoutPhase::Editing;
                        SmallVec::new()
                    },
                }
            },

            CheckoutAction::PageLoadFailed {
                return_payment_id,
                message,
            } => {
                if !state.loading {
                    return SmallVec::new();
                }
                tracing::error!(error = %message, "Failed to read checkout storage");
                state.loading = false;
                state.phase = CheckoutPhase::Editing;
                state.banner = Some(match &return_payment_id {
                    Some(payment_id) => ReconcileFailure::Storage(message).banner(payment_id),
                    None => CheckoutBanner::network("We couldn't load your checkout. Please reload the page."),
                });
                state.return_payment_id = return_payment_id;
                SmallVec::new()
            },

            // ========== Form ==========
            CheckoutAction::FieldChanged { field, value } => {
                if state.accepts_edits() {
                    Self::edit(state, field, value, env.session.is_some());
                }
                SmallVec::new()
            },

            CheckoutAction::FieldBlurred { field } => {
                if state.accepts_edits() {
                    let outcome = validation::validate_field(field, &state.form, env.session.is_some());
                    state.errors.set(field, outcome);
                }
                SmallVec::new()
            },

            CheckoutAction::SameAddressToggled { same } => {
                if state.accepts_edits() {
                    state.form.use_same_address = same;
                    if same {
                        for line in validation::AddressField::ALL {
                            state.errors.set(Field::Billing(line), None);
                        }
                    }
                }
                SmallVec::new()
            },

            CheckoutAction::DeliveryMethodSelected { method } => {
                if state.accepts_edits() {
                    state.form.delivery_method = method;
                    state.reprice(&env.shipping);
                }
                SmallVec::new()
            },

            CheckoutAction::DeliveryDateSelected { date } => {
                if !state.accepts_edits() {
                    return SmallVec::new();
                }
                let today = env.clock.now().date_naive();
                if delivery::booking_days(today).iter().any(|day| day.date == date) {
                    state.form.slot.select_date(date);
                    state.errors.set(Field::DeliveryDate, None);
                    state.errors.set(Field::DeliveryTime, None);
                } else {
                    state.errors.set(
                        Field::DeliveryDate,
                        Some(format!(
                            "Please select a delivery date within the next {} days",
                            delivery::BOOKING_DAYS
                        )),
                    );
                }
                SmallVec::new()
            },

            CheckoutAction::DeliveryTimeSelected { window } => {
                if !state.accepts_edits() {
                    return SmallVec::new();
                }
                let offered = state
                    .windows()
                    .iter()
                    .any(|option| option.window == window && option.available);
                if state.form.slot.date.is_none() {
                    state
                        .errors
                        .set(Field::DeliveryDate, Some("Please select a delivery date".to_string()));
                } else if offered {
                    state.form.slot.select_time(window);
                    state.errors.set(Field::DeliveryTime, None);
                } else {
                    state.errors.set(
                        Field::DeliveryTime,
                        Some("The selected delivery slot is not available".to_string()),
                    );
                }
                SmallVec::new()
            },

            CheckoutAction::PaymentMethodSelected { method } => {
                if state.accepts_edits() {
                    state.form.payment_method = Some(method);
                    state.errors.set(Field::PaymentMethod, None);
                    state.errors.set(Field::Vpa, None);
                }
                SmallVec::new()
            },

            // ========== Submit ==========
            CheckoutAction::SubmitRequested => {
                if !state.accepts_edits() {
                    tracing::debug!(phase = ?state.phase, "Ignoring duplicate submit");
                    return SmallVec::new();
                }
                Self::submit(state, env)
            },

            CheckoutAction::OrderCreated { order } => {
                tracing::info!(order_id = %order.id, "Order confirmed");
                metrics::counter!("checkout.orders.created", "flow" => "direct").increment(1);
                state.phase = CheckoutPhase::Confirmed;
                state.order = Some(order);
                smallvec![Self::clear_cart(env)]
            },

            CheckoutAction::OrderCreationFailed { error } => {
                tracing::warn!(error = %error, "Order creation failed");
                state.phase = CheckoutPhase::Editing;
                state.banner = Some(CheckoutBanner::network(match error {
                    OrderServiceError::Rejected { message, .. } if !message.is_empty() => {
                        format!("We couldn't place your order: {message}")
                    },
                    _ => "We couldn't place your order. Please try again.".to_string(),
                }));
                SmallVec::new()
            },

            CheckoutAction::SnapshotSaveFailed { message } => {
                tracing::error!(error = %message, "Checkout snapshot not saved; payment not started");
                state.phase = CheckoutPhase::Editing;
                state.banner = Some(CheckoutBanner::network(
                    "We couldn't save your checkout details. Please try again.",
                ));
                SmallVec::new()
            },

            CheckoutAction::PaymentInitialized { session } => {
                tracing::info!(payment_id = %session.payment_id, "Awaiting hosted payment");
                state.phase = CheckoutPhase::AwaitingExternalPayment {
                    payment_id: session.payment_id,
                };
                state.redirect_url = Some(session.redirect_url);
                SmallVec::new()
            },

            CheckoutAction::PaymentInitializationFailed { error } => {
                tracing::warn!(error = %error, "Hosted payment not started");
                state.phase = CheckoutPhase::Editing;
                state.banner = Some(CheckoutBanner {
                    kind: BannerKind::PaymentFailed,
                    message: "We couldn't start the payment. Please try again.".to_string(),
                    payment_id: None,
                    dismissible: true,
                });
                SmallVec::new()
            },

            // ========== Reconciliation ==========
            CheckoutAction::RetryReconciliation => {
                let Some(payment_id) = state.return_payment_id.clone() else {
                    return SmallVec::new();
                };
                if !state.accepts_edits() {
                    return SmallVec::new();
                }
                tracing::info!(payment_id = %payment_id, "Retrying reconciliation");
                state.phase = CheckoutPhase::Reconciling {
                    payment_id: payment_id.clone(),
                };
                state.banner = None;
                smallvec![Self::reconcile(env, payment_id)]
            },

            CheckoutAction::ReconciliationSucceeded { order } => {
                tracing::info!(
                    order_id = %order.id,
                    payment_id = ?order.external_payment_id,
                    "Order confirmed after hosted payment"
                );
                metrics::counter!("checkout.orders.created", "flow" => "hosted").increment(1);
                state.phase = CheckoutPhase::Confirmed;
                state.order = Some(order);
                state.return_payment_id = None;
                state.banner = None;
                smallvec![Self::finish_hosted_order(env)]
            },

            CheckoutAction::ReconciliationFailed { payment_id, failure } => {
                tracing::warn!(payment_id = %payment_id, failure = %failure, "Reconciliation failed");
                state.phase = CheckoutPhase::Editing;
                state.banner = Some(failure.banner(&payment_id));
                SmallVec::new()
            },

            // ========== Abandon and banners ==========
            CheckoutAction::AbandonCheckout => {
                if !state.accepts_edits() {
                    return SmallVec::new();
                }
                smallvec![Self::abandon(env)]
            },

            CheckoutAction::CheckoutAbandoned => {
                tracing::info!("Checkout abandoned");
                let cart = std::mem::take(&mut state.cart);
                *state = CheckoutState {
                    cart,
                    ..CheckoutState::default()
                };
                state.reprice(&env.shipping);
                SmallVec::new()
            },

            CheckoutAction::AbandonFailed { message } => {
                tracing::error!(error = %message, "Failed to discard checkout snapshot");
                state.banner = Some(CheckoutBanner::network(
                    "We couldn't discard your checkout. Please try again.",
                ));
                SmallVec::new()
            },

            CheckoutAction::BannerDismissed => {
                if state.banner.as_ref().is_some_and(|banner| banner.dismissible) {
                    state.banner = None;
                }
                SmallVec::new()
            },
        }
    }
}
