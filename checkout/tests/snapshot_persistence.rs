//! Snapshot persistence on disk, across storage handles and page reloads.

#![allow(clippy::unwrap_used)]

use chrono::NaiveDate;
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use storefront_checkout::controller::{
    BannerKind, CheckoutAction, CheckoutPhase, CheckoutReducer, CheckoutState,
};
use storefront_checkout::delivery::TimeWindow;
use storefront_checkout::location::{self, RETURN_PARAM};
use storefront_checkout::mocks::{MemoryLocation, MockOrderService, MockPaymentGateway};
use storefront_checkout::storage::SNAPSHOT_KEY;
use storefront_checkout::validation::{AddressField, Field};
use storefront_checkout::{
    Address, AddressKind, CartItem, CartStore, CheckoutEnvironment, CheckoutSnapshot,
    DeliveryMethod, FileStorage, KeyValueStorage, Money, PaymentMethod, SnapshotStore,
    StorageError,
};
use storefront_runtime::Store;
use storefront_testing::test_clock;

const CHECKOUT_URL: &str = "https://shop.example/#/checkout";

fn address_strategy(kind: AddressKind) -> impl Strategy<Value = Address> {
    (
        "[A-Za-z0-9 ,./-]{0,40}",
        "[A-Za-z ]{0,20}",
        "[A-Za-z ]{0,20}",
        "[0-9]{6}",
        any::<bool>(),
    )
        .prop_map(move |(street, city, state, postal_code, is_default)| Address {
            street,
            city,
            state,
            postal_code,
            country: "India".to_string(),
            kind,
            is_default,
        })
}

fn payment_strategy() -> impl Strategy<Value = Option<PaymentMethod>> {
    prop_oneof![
        Just(None),
        Just(Some(PaymentMethod::CashOnDelivery)),
        Just(Some(PaymentMethod::HostedCard)),
        "[a-z]{3,10}@[a-z]{3,8}".prop_map(|vpa| Some(PaymentMethod::Upi { vpa })),
    ]
}

fn snapshot_strategy() -> impl Strategy<Value = CheckoutSnapshot> {
    (
        address_strategy(AddressKind::Shipping),
        address_strategy(AddressKind::Billing),
        any::<bool>(),
        proptest::option::of("[a-z]{1,10}@[a-z]{1,10}\\.in"),
        proptest::option::of("[0-9]{10}"),
        proptest::option::of(0u32..365),
        proptest::option::of((0u8..23).prop_flat_map(|start| (Just(start), start + 1..=24))),
        payment_strategy(),
        any::<bool>(),
        0i64..10_000_000,
    )
        .prop_map(
            |(shipping, billing, same, email, phone, day, window, method, express, total)| {
                CheckoutSnapshot {
                    shipping_address: shipping,
                    billing_address: billing,
                    use_same_address: same,
                    guest_email: email,
                    guest_phone: phone,
                    selected_date: day.map(|offset| {
                        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap() + chrono::Days::new(u64::from(offset))
                    }),
                    selected_time: window.and_then(|(start, end)| TimeWindow::new(start, end)),
                    payment_method: method,
                    delivery_method: if express {
                        DeliveryMethod::Express
                    } else {
                        DeliveryMethod::Standard
                    },
                    authorized_total: Money::from_minor(total),
                }
            },
        )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn snapshot_reads_back_from_a_fresh_handle(snapshot in snapshot_strategy()) {
        let dir = tempfile::tempdir().unwrap();
        SnapshotStore::new(Arc::new(FileStorage::open(dir.path()).unwrap()))
            .save(&snapshot)
            .unwrap();

        let reopened = SnapshotStore::new(Arc::new(FileStorage::open(dir.path()).unwrap()));
        prop_assert_eq!(reopened.load().unwrap(), Some(snapshot));
    }
}

#[test]
fn corrupt_snapshot_is_reported_not_ignored() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(format!("{SNAPSHOT_KEY}.json")), "{\"shippingAddress\":").unwrap();

    let snapshots = SnapshotStore::new(Arc::new(FileStorage::open(dir.path()).unwrap()));
    let err = snapshots.load().unwrap_err();
    assert!(matches!(err, StorageError::Corrupt { .. }));
}

fn environment(
    storage: FileStorage,
    location: &MemoryLocation,
    payments: &MockPaymentGateway,
    orders: &MockOrderService,
) -> CheckoutEnvironment {
    CheckoutEnvironment::new(
        Arc::new(test_clock()),
        Arc::new(storage),
        Arc::new(location.clone()),
        payments.shared(),
        orders.shared(),
    )
}

#[tokio::test]
async fn hosted_checkout_finishes_after_reload_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let location = MemoryLocation::new(CHECKOUT_URL);
    let payments = MockPaymentGateway::new();
    let orders = MockOrderService::new();

    let cart = CartStore::new(Arc::new(FileStorage::open(dir.path()).unwrap()));
    cart.add_item(CartItem::new("saffron", "Kashmiri Saffron", Money::from_major(450), 2))
        .unwrap();

    // ========== Before the redirect ==========
    let env = environment(FileStorage::open(dir.path()).unwrap(), &location, &payments, &orders);
    let page = Store::new(CheckoutState::default(), CheckoutReducer::new(), env);
    page.send_and_settle(CheckoutAction::PageMounted).await.unwrap();
    for (field, value) in [
        (Field::Shipping(AddressField::Street), "7 Park Street"),
        (Field::Shipping(AddressField::City), "Kolkata"),
        (Field::Shipping(AddressField::State), "West Bengal"),
        (Field::Shipping(AddressField::PostalCode), "700016"),
        (Field::Email, "ravi@example.in"),
        (Field::Phone, "9830012345"),
    ] {
        page.send(CheckoutAction::FieldChanged {
            field,
            value: value.to_string(),
        })
        .await
        .unwrap();
    }
    let today = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
    page.send(CheckoutAction::DeliveryDateSelected { date: today }).await.unwrap();
    page.send(CheckoutAction::DeliveryTimeSelected {
        window: TimeWindow::new(10, 12).unwrap(),
    })
    .await
    .unwrap();
    page.send(CheckoutAction::PaymentMethodSelected {
        method: PaymentMethod::HostedCard,
    })
    .await
    .unwrap();
    page.send_and_settle(CheckoutAction::SubmitRequested).await.unwrap();
    assert!(matches!(
        page.state(|s| s.phase.clone()).await,
        CheckoutPhase::AwaitingExternalPayment { .. }
    ));
    page.shutdown(Duration::from_secs(1)).await.unwrap();
    drop(page);

    assert!(dir.path().join(format!("{SNAPSHOT_KEY}.json")).exists());
    location.land_on(location::with_query_param(CHECKOUT_URL, RETURN_PARAM, "pay_1"));

    // ========== After the reload ==========
    let env = environment(FileStorage::open(dir.path()).unwrap(), &location, &payments, &orders);
    let page = Store::new(CheckoutState::default(), CheckoutReducer::new(), env);
    page.send_and_settle(CheckoutAction::PageMounted).await.unwrap();

    let (phase, banner) = page.state(|s| (s.phase.clone(), s.banner.clone())).await;
    assert_eq!(phase, CheckoutPhase::Confirmed, "{banner:?}");
    let draft = orders.drafts().remove(0);
    assert_eq!(draft.shipping_address.city, "Kolkata");
    assert_eq!(draft.payment_method, PaymentMethod::HostedCard);

    let storage = FileStorage::open(dir.path()).unwrap();
    assert_eq!(storage.get(SNAPSHOT_KEY).unwrap(), None);
    assert!(CartStore::new(Arc::new(storage)).contents().unwrap().is_empty());
}

#[tokio::test]
async fn unreadable_snapshot_on_return_keeps_identifier_visible() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(format!("{SNAPSHOT_KEY}.json")), "not json").unwrap();
    let location = MemoryLocation::new(location::with_query_param(CHECKOUT_URL, RETURN_PARAM, "pay_9"));
    let payments = MockPaymentGateway::new();
    let orders = MockOrderService::new();

    let env = environment(FileStorage::open(dir.path()).unwrap(), &location, &payments, &orders);
    let page = Store::new(CheckoutState::default(), CheckoutReducer::new(), env);
    page.send_and_settle(CheckoutAction::PageMounted).await.unwrap();

    let banner = page.state(|s| s.banner.clone()).await.unwrap();
    assert_eq!(banner.kind, BannerKind::Reconciliation);
    assert_eq!(banner.payment_id.unwrap().as_str(), "pay_9");
    assert!(payments.verified().is_empty());
    assert_eq!(orders.calls(), 0);
}
