//! Shared fixtures for the checkout integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use chrono::NaiveDate;
use std::sync::Arc;
use storefront_checkout::controller::{CheckoutAction, CheckoutReducer, CheckoutState};
use storefront_checkout::delivery::TimeWindow;
use storefront_checkout::location::{self, RETURN_PARAM};
use storefront_checkout::mocks::{MemoryLocation, MemoryStorage, MockOrderService, MockPaymentGateway};
use storefront_checkout::validation::{AddressField, Field};
use storefront_checkout::{
    CartItem, CartStore, CheckoutEnvironment, CheckoutSnapshot, Money, PaymentMethod, SnapshotStore,
};
use storefront_core::environment::Clock;
use storefront_runtime::Store;
use storefront_testing::test_clock;

pub type CheckoutStore = Store<CheckoutState, CheckoutAction, CheckoutEnvironment, CheckoutReducer>;

pub const CHECKOUT_URL: &str = "https://shop.example/#/checkout";

/// Everything that outlives a single page: storage, address bar and backends
pub struct Harness {
    pub storage: MemoryStorage,
    pub location: MemoryLocation,
    pub payments: MockPaymentGateway,
    pub orders: MockOrderService,
    pub env: CheckoutEnvironment,
}

impl Harness {
    pub fn new() -> Self {
        let storage = MemoryStorage::new();
        let location = MemoryLocation::new(CHECKOUT_URL);
        let payments = MockPaymentGateway::new();
        let orders = MockOrderService::new();
        let env = CheckoutEnvironment::new(
            Arc::new(test_clock()),
            Arc::new(storage.clone()),
            Arc::new(location.clone()),
            payments.shared(),
            orders.shared(),
        );
        Self {
            storage,
            location,
            payments,
            orders,
            env,
        }
    }

    /// A new page: fresh state over the same storage and URL
    pub fn open_page(&self) -> CheckoutStore {
        Store::new(CheckoutState::default(), CheckoutReducer::new(), self.env.clone())
    }

    pub fn cart(&self) -> CartStore {
        CartStore::new(Arc::new(self.storage.clone()))
    }

    pub fn snapshots(&self) -> SnapshotStore {
        SnapshotStore::new(Arc::new(self.storage.clone()))
    }

    pub fn saved_snapshot(&self) -> Option<CheckoutSnapshot> {
        self.snapshots().load().unwrap()
    }

    /// Subtotal 1000, discount 100: total 972 with free shipping
    pub fn fill_cart(&self) {
        let cart = self.cart();
        cart.add_item(CartItem::new("saffron", "Kashmiri Saffron", Money::from_major(450), 1))
            .unwrap();
        cart.add_item(CartItem::new("chai", "Masala Chai", Money::from_major(275), 2).with_variant("250g"))
            .unwrap();
        cart.apply_discount("WELCOME10", Money::from_major(100)).unwrap();
    }

    /// The provider sends the customer back with `payment_id`
    pub fn return_from_provider(&self, payment_id: &str) {
        self.location
            .land_on(location::with_query_param(CHECKOUT_URL, RETURN_PARAM, payment_id));
    }
}

pub fn today() -> NaiveDate {
    test_clock().now().date_naive()
}

/// Fills a valid guest form and picks `method`
pub async fn fill_form(store: &CheckoutStore, method: PaymentMethod) {
    let entries = [
        (Field::Shipping(AddressField::Street), "12 MG Road"),
        (Field::Shipping(AddressField::City), "Bengaluru"),
        (Field::Shipping(AddressField::State), "Karnataka"),
        (Field::Shipping(AddressField::PostalCode), "560001"),
        (Field::Email, "asha@example.in"),
        (Field::Phone, "+91 98765 43210"),
    ];
    for (field, value) in entries {
        store
            .send_and_settle(CheckoutAction::FieldChanged {
                field,
                value: value.to_string(),
            })
            .await
            .unwrap();
    }
    // 2025-01-01 is a Wednesday: odd-day windows, 10-12 open
    store
        .send_and_settle(CheckoutAction::DeliveryDateSelected { date: today() })
        .await
        .unwrap();
    store
        .send_and_settle(CheckoutAction::DeliveryTimeSelected {
            window: TimeWindow::new(10, 12).unwrap(),
        })
        .await
        .unwrap();
    store
        .send_and_settle(CheckoutAction::PaymentMethodSelected { method })
        .await
        .unwrap();
}

/// Mounts, fills the form and submits
pub async fn checkout(store: &CheckoutStore, method: PaymentMethod) {
    store.send_and_settle(CheckoutAction::PageMounted).await.unwrap();
    fill_form(store, method).await;
    store.send_and_settle(CheckoutAction::SubmitRequested).await.unwrap();
}

pub fn upi() -> PaymentMethod {
    PaymentMethod::Upi {
        vpa: "asha@okbank".to_string(),
    }
}
