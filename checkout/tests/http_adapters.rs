//! HTTP adapters against a mock server.

#![allow(clippy::unwrap_used)]

use chrono::{NaiveDate, TimeZone, Utc};
use serde_json::json;
use std::time::Duration;
use storefront_checkout::delivery::{DeliverySlot, TimeWindow};
use storefront_checkout::orders::IDEMPOTENCY_HEADER;
use storefront_checkout::payment::HostedGatewayConfig;
use storefront_checkout::{
    Address, AddressKind, CartItem, DeliveryMethod, DraftLineItem, ExternalPaymentId,
    GatewayError, HostedPaymentGateway, HttpOrderService, Money, Order, OrderDraft, OrderId,
    OrderService, OrderServiceError, OrderStatus, Payer, PaymentGateway, PaymentMethod,
};
use storefront_runtime::retry::RetryPolicy;
use wiremock::matchers::{body_partial_json, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_retry() -> RetryPolicy {
    RetryPolicy::builder()
        .max_retries(2)
        .initial_delay(Duration::from_millis(5))
        .max_delay(Duration::from_millis(20))
        .attempt_timeout(Duration::from_secs(2))
        .build()
}

fn address(kind: AddressKind) -> Address {
    Address {
        street: "12 MG Road".into(),
        city: "Bengaluru".into(),
        state: "Karnataka".into(),
        postal_code: "560001".into(),
        country: "India".into(),
        kind,
        is_default: false,
    }
}

fn draft(external_payment_id: Option<&str>) -> OrderDraft {
    let item = CartItem::new("saffron", "Kashmiri Saffron", Money::from_major(450), 2);
    OrderDraft {
        items: vec![DraftLineItem::from(&item)],
        subtotal: Money::from_major(900),
        discount: Money::ZERO,
        shipping_cost: Money::ZERO,
        tax: Money::from_major(72),
        total: Money::from_major(972),
        shipping_address: address(AddressKind::Shipping),
        billing_address: address(AddressKind::Billing),
        delivery_method: DeliveryMethod::Standard,
        delivery_slot: DeliverySlot {
            date: NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
            window: TimeWindow::new(9, 11).unwrap(),
        },
        payment_method: PaymentMethod::HostedCard,
        customer_id: None,
        guest_contact: None,
        external_payment_id: external_payment_id.map(ExternalPaymentId::new),
    }
}

fn order_for(draft: &OrderDraft) -> Order {
    Order {
        id: OrderId::new("ord_9001"),
        items: draft.items.clone(),
        total: draft.total,
        status: OrderStatus::Processing,
        shipping_address: draft.shipping_address.clone(),
        billing_address: draft.billing_address.clone(),
        payment_method: draft.payment_method.clone(),
        external_payment_id: draft.external_payment_id.clone(),
        created_at: Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap(),
    }
}

fn gateway(server: &MockServer) -> HostedPaymentGateway {
    HostedPaymentGateway::new(HostedGatewayConfig {
        base_url: server.uri(),
        app_id: "app_123".into(),
        secret_key: "secret_456".into(),
        api_version: "2022-09-01".into(),
        return_url: "https://shop.example/#/checkout".into(),
        retry: fast_retry(),
    })
}

fn guest() -> Payer {
    Payer {
        id: None,
        name: "Guest".into(),
        email: "asha@example.in".into(),
        phone: "9876543210".into(),
    }
}

async fn idempotency_keys(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|request| {
            request.headers.get(IDEMPOTENCY_HEADER).unwrap().to_str().unwrap().to_string()
        })
        .collect()
}

// ============================================================================
// Order service
// ============================================================================

#[tokio::test]
async fn order_service_creates_order() {
    let server = MockServer::start().await;
    let draft = draft(Some("pay_1"));
    let expected = order_for(&draft);

    Mock::given(method("POST"))
        .and(path("/api/orders"))
        .and(header(IDEMPOTENCY_HEADER, "pay_1"))
        .and(body_partial_json(json!({
            "total": 97_200,
            "externalPaymentId": "pay_1",
            "deliverySlot": { "date": "2025-01-02", "window": "09:00 AM - 11:00 AM" },
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(&expected))
        .expect(1)
        .mount(&server)
        .await;

    let service = HttpOrderService::new(format!("{}/api/", server.uri()), fast_retry());
    let order = service.create(draft).await.unwrap();
    assert_eq!(order, expected);
}

#[tokio::test]
async fn order_rejection_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(422).set_body_string("out of stock"))
        .expect(1)
        .mount(&server)
        .await;

    let service = HttpOrderService::new(server.uri(), fast_retry());
    let err = service.create(draft(None)).await.unwrap_err();
    assert_eq!(
        err,
        OrderServiceError::Rejected {
            status: 422,
            message: "out of stock".into()
        }
    );
}

#[tokio::test]
async fn order_outage_is_retried_with_same_key() {
    let server = MockServer::start().await;
    let draft = draft(None);

    Mock::given(method("POST"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/orders"))
        .and(header_exists(IDEMPOTENCY_HEADER))
        .respond_with(ResponseTemplate::new(200).set_body_json(order_for(&draft)))
        .mount(&server)
        .await;

    let service = HttpOrderService::new(server.uri(), fast_retry());
    let order = service.create(draft).await.unwrap();
    assert_eq!(order.id, OrderId::new("ord_9001"));

    let keys = idempotency_keys(&server).await;
    assert_eq!(keys.len(), 2);
    assert_eq!(keys[0], keys[1]);
}

#[tokio::test]
async fn order_outage_gives_up_after_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&server)
        .await;

    let service = HttpOrderService::new(server.uri(), fast_retry());
    let err = service.create(draft(Some("pay_1"))).await.unwrap_err();
    assert_eq!(err, OrderServiceError::Unavailable { status: 502 });
}

#[tokio::test]
async fn separate_direct_orders_use_distinct_keys() {
    let server = MockServer::start().await;
    let first = draft(None);
    Mock::given(method("POST"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(201).set_body_json(order_for(&first)))
        .mount(&server)
        .await;

    let service = HttpOrderService::new(server.uri(), fast_retry());
    service.create(first.clone()).await.unwrap();
    service.create(first).await.unwrap();

    let keys = idempotency_keys(&server).await;
    assert_eq!(keys.len(), 2);
    assert_ne!(keys[0], keys[1]);
}

#[tokio::test]
async fn malformed_order_body_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;

    let service = HttpOrderService::new(server.uri(), fast_retry());
    let err = service.create(draft(None)).await.unwrap_err();
    assert!(matches!(err, OrderServiceError::InvalidResponse(_)));
}

// ============================================================================
// Hosted payment gateway
// ============================================================================

#[tokio::test]
async fn initialize_registers_payment_with_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/pg/orders"))
        .and(header("x-client-id", "app_123"))
        .and(header("x-client-secret", "secret_456"))
        .and(header("x-api-version", "2022-09-01"))
        .and(body_partial_json(json!({
            "order_amount": 972.0,
            "order_currency": "INR",
            "customer_details": { "customer_email": "asha@example.in" },
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "order_id": "order_abc",
            "payment_link": "https://payments.example/pay/order_abc",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = gateway(&server)
        .initialize(Money::from_major(972), guest())
        .await
        .unwrap();
    assert_eq!(session.payment_id, ExternalPaymentId::new("order_abc"));
    assert_eq!(session.redirect_url, "https://payments.example/pay/order_abc");

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let sent_id = body["order_id"].as_str().unwrap();
    assert!(sent_id.starts_with("order_"));
    assert_eq!(body["customer_details"]["customer_id"], format!("guest_{sent_id}"));
    assert_eq!(
        body["order_meta"]["return_url"],
        format!("https://shop.example/#/checkout?order_id={sent_id}")
    );
}

#[tokio::test]
async fn initialize_without_payment_link_is_invalid() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/pg/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "order_id": "order_abc" })))
        .mount(&server)
        .await;

    let err = gateway(&server)
        .initialize(Money::from_major(972), guest())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::InvalidResponse(_)));
}

#[tokio::test]
async fn initialize_rejection_keeps_provider_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/pg/orders"))
        .respond_with(ResponseTemplate::new(400).set_body_string("customer_phone is invalid"))
        .expect(1)
        .mount(&server)
        .await;

    let err = gateway(&server)
        .initialize(Money::from_major(972), guest())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        GatewayError::Rejected {
            status: 400,
            message: "customer_phone is invalid".into()
        }
    );
}

#[tokio::test]
async fn verify_reports_paid_orders_only() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pg/orders/order_paid"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "order_status": "PAID" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/pg/orders/order_open"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "order_status": "ACTIVE" })))
        .mount(&server)
        .await;

    let gateway = gateway(&server);
    assert!(gateway.verify(ExternalPaymentId::new("order_paid")).await.unwrap());
    assert!(!gateway.verify(ExternalPaymentId::new("order_open")).await.unwrap());
}

#[tokio::test]
async fn verify_unknown_payment_is_unpaid() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pg/orders/order_forged"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let paid = gateway(&server)
        .verify(ExternalPaymentId::new("order_forged"))
        .await
        .unwrap();
    assert!(!paid);
}

#[tokio::test]
async fn gateway_url_with_trailing_slash_reaches_provider() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pg/orders/order_paid"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "order_status": "PAID" })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = HostedPaymentGateway::new(HostedGatewayConfig {
        base_url: format!("{}/", server.uri()),
        app_id: "app_123".into(),
        secret_key: "secret_456".into(),
        api_version: "2022-09-01".into(),
        return_url: "https://shop.example/#/checkout".into(),
        retry: fast_retry(),
    });
    assert!(gateway.verify(ExternalPaymentId::new("order_paid")).await.unwrap());
}

#[tokio::test]
async fn verify_retries_throttling() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pg/orders/order_paid"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/pg/orders/order_paid"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "order_status": "PAID" })))
        .mount(&server)
        .await;

    assert!(gateway(&server).verify(ExternalPaymentId::new("order_paid")).await.unwrap());
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn unreachable_provider_is_transport_error() {
    // A port that was just released has nothing listening on it
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let uri = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let gateway = HostedPaymentGateway::new(HostedGatewayConfig {
        base_url: uri,
        app_id: "app_123".into(),
        secret_key: "secret_456".into(),
        api_version: "2022-09-01".into(),
        return_url: "https://shop.example/#/checkout".into(),
        retry: RetryPolicy::no_retry(Duration::from_secs(2)),
    });
    let err = gateway.verify(ExternalPaymentId::new("order_x")).await.unwrap_err();
    assert!(matches!(err, GatewayError::Transport(_)));
}
