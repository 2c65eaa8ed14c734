//! Checkout walkthrough.
//!
//! Fills a cart, pays on the hosted page, "reloads" by throwing the store
//! away, and lets a brand new store finish the order from what was saved.
//! Uses in-memory payment and order backends unless `CHECKOUT_DEMO_LIVE` is
//! set, in which case the HTTP adapters are built from the environment.

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use storefront_checkout::controller::{CheckoutAction, CheckoutPhase, CheckoutReducer, CheckoutState};
use storefront_checkout::location::{self, Location, RETURN_PARAM};
use storefront_checkout::mocks::{MemoryLocation, MockOrderService, MockPaymentGateway};
use storefront_checkout::validation::{AddressField, Field};
use storefront_checkout::{
    CartItem, CartStore, CheckoutConfig, CheckoutEnvironment, KeyValueStorage, Money, OrderService,
    PaymentGateway, PaymentMethod, delivery,
};
use storefront_core::environment::{Clock, SystemClock};
use storefront_runtime::Store;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type CheckoutStore = Store<CheckoutState, CheckoutAction, CheckoutEnvironment, CheckoutReducer>;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

fn form_entries() -> Vec<(Field, &'static str)> {
    vec![
        (Field::Shipping(AddressField::Street), "12 MG Road"),
        (Field::Shipping(AddressField::City), "Bengaluru"),
        (Field::Shipping(AddressField::State), "Karnataka"),
        (Field::Shipping(AddressField::PostalCode), "560001"),
        (Field::Email, "asha@example.in"),
        (Field::Phone, "+91 98765 43210"),
    ]
}

async fn fill_and_submit(store: &CheckoutStore, clock: &dyn Clock) -> anyhow::Result<()> {
    for (field, value) in form_entries() {
        store
            .send(CheckoutAction::FieldChanged {
                field,
                value: value.to_string(),
            })
            .await?;
    }

    let today = clock.now().date_naive();
    let day = delivery::booking_days(today)
        .into_iter()
        .nth(1)
        .context("no bookable delivery day")?;
    let window = delivery::windows_for(day.date)
        .into_iter()
        .find(|option| option.available)
        .context("no open delivery window")?
        .window;
    info!(date = %day.date, weekday = %day.weekday, window = %window, "Booking delivery");

    store.send(CheckoutAction::DeliveryDateSelected { date: day.date }).await?;
    store.send(CheckoutAction::DeliveryTimeSelected { window }).await?;
    store
        .send(CheckoutAction::PaymentMethodSelected {
            method: PaymentMethod::Upi {
                vpa: "asha@okbank".to_string(),
            },
        })
        .await?;
    store.send_and_settle(CheckoutAction::SubmitRequested).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storefront_checkout=info,checkout_demo=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = CheckoutConfig::from_env()?;
    info!(
        storage_dir = %config.storage_dir.display(),
        orders_url = %config.orders.url,
        "Configuration loaded"
    );

    let storage: Arc<dyn KeyValueStorage> = Arc::new(config.storage()?);
    let (payments, orders): (Arc<dyn PaymentGateway>, Arc<dyn OrderService>) =
        if std::env::var("CHECKOUT_DEMO_LIVE").is_ok() {
            (Arc::new(config.payment_gateway()), Arc::new(config.order_service()))
        } else {
            (MockPaymentGateway::new().shared(), MockOrderService::new().shared())
        };
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let address_bar = MemoryLocation::new(config.payment.return_url.clone());

    let cart = CartStore::new(Arc::clone(&storage));
    cart.clear()?;
    cart.add_item(CartItem::new("kashmiri-saffron", "Kashmiri Saffron", Money::from_major(450), 1).with_variant("2g"))?;
    cart.add_item(CartItem::new("masala-chai", "Masala Chai", Money::from_major(275), 2).with_variant("250g"))?;
    cart.apply_discount("WELCOME10", Money::from_major(100))?;

    let environment = CheckoutEnvironment::new(
        Arc::clone(&clock),
        Arc::clone(&storage),
        Arc::new(address_bar.clone()),
        payments,
        orders,
    )
    .with_shipping_rule(config.shipping);

    // ========== First visit: pay on the hosted page ==========
    let store = Store::new(CheckoutState::default(), CheckoutReducer::new(), environment.clone());
    store.send_and_settle(CheckoutAction::PageMounted).await?;
    let total = store.state(|s| s.pricing.total).await;
    info!(total = %total, "Cart priced");

    fill_and_submit(&store, clock.as_ref()).await?;
    let (phase, banner) = store.state(|s| (s.phase.clone(), s.banner.clone())).await;
    let CheckoutPhase::AwaitingExternalPayment { payment_id } = phase else {
        anyhow::bail!("hosted payment did not start: {banner:?}");
    };
    info!(payment_id = %payment_id, redirects = ?address_bar.navigations(), "Left for the hosted payment page");

    // The page goes away; only storage and the URL survive
    store.shutdown(SHUTDOWN_TIMEOUT).await?;
    drop(store);
    address_bar.land_on(location::with_query_param(
        &config.payment.return_url,
        RETURN_PARAM,
        payment_id.as_str(),
    ));

    // ========== Return: a fresh store finishes the order ==========
    let store = Store::new(CheckoutState::default(), CheckoutReducer::new(), environment);
    store.send_and_settle(CheckoutAction::PageMounted).await?;
    let (phase, order, banner) = store
        .state(|s| (s.phase.clone(), s.order.clone(), s.banner.clone()))
        .await;

    match (phase, order) {
        (CheckoutPhase::Confirmed, Some(order)) => info!(
            order_id = %order.id,
            total = %order.total,
            url = %address_bar.href(),
            "Order confirmed"
        ),
        (phase, _) => anyhow::bail!("checkout ended in {phase:?}: {banner:?}"),
    }

    store.shutdown(SHUTDOWN_TIMEOUT).await?;
    Ok(())
}
