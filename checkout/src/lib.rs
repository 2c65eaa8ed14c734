//! # Storefront Checkout
//!
//! Checkout finalization for the storefront: turns a cart plus the
//! customer's shipping, delivery and payment choices into exactly one
//! confirmed order, including when payment happens on a hosted page that
//! takes the customer away and sends them back later.
//!
//! ## Modules
//!
//! - [`pricing`]: subtotal, shipping, tax and total
//! - [`validation`]: the checkout form and its field rules
//! - [`delivery`]: bookable days and delivery windows
//! - [`storage`]: durable key/value storage and the checkout snapshot
//! - [`cart`]: the persisted cart
//! - [`payment`] / [`orders`]: the external boundaries
//! - [`controller`]: the checkout state machine
//!
//! ## Example
//!
//! ```ignore
//! use storefront_checkout::controller::{CheckoutAction, CheckoutReducer, CheckoutState};
//! use storefront_runtime::Store;
//!
//! let store = Store::new(CheckoutState::default(), CheckoutReducer::new(), environment);
//! store.send_and_settle(CheckoutAction::PageMounted).await?;
//! ```

pub mod cart;
pub mod config;
pub mod controller;
pub mod delivery;
pub mod location;
pub mod mocks;
pub mod orders;
pub mod payment;
pub mod pricing;
pub mod storage;
pub mod types;
pub mod validation;

pub use cart::{CartContents, CartStore};
pub use config::{CheckoutConfig, ConfigError};
pub use controller::{
    BannerKind, CheckoutAction, CheckoutBanner, CheckoutEnvironment, CheckoutPhase,
    CheckoutReducer, CheckoutState, ReconcileFailure,
};
pub use location::{Location, RETURN_PARAM};
pub use orders::{HttpOrderService, OrderService, OrderServiceError};
pub use payment::{GatewayError, HostedPaymentGateway, PaymentGateway, PaymentSession};
pub use pricing::{PriceBreakdown, ShippingRule};
pub use storage::{FileStorage, KeyValueStorage, SnapshotStore, StorageError};
pub use types::*;
