//! Checkout, payment execution and order history against the mock backend.

#![allow(clippy::unwrap_used)]

use axum::http::{Method, StatusCode};
use secrecy::SecretString;
use storefront_client::{ClientError, Storefront};
use storefront_core::{Email, OrderId, OrderStatus, PaymentMethod, Price, ProductId, UserRole};
use storefront_integration_tests::MockBackend;

async fn login(backend: &MockBackend, email: &str) -> Storefront {
    let (storefront, _store) = backend.storefront();
    storefront.restore().await.unwrap();
    storefront
        .session()
        .login(&Email::parse(email).unwrap(), &SecretString::from("pw"))
        .await
        .unwrap();
    storefront
}

// =============================================================================
// Checkout
// =============================================================================

#[tokio::test]
async fn test_full_purchase_flow() {
    let backend = MockBackend::start().await;
    backend.add_user("a@b.com", "ann", "pw", UserRole::Customer);
    let mug = ProductId::new(backend.add_product("Mug", 12.5, 10, "kitchen", None));
    let storefront = login(&backend, "a@b.com").await;
    assert_eq!(
        storefront.session().current_user().unwrap().role,
        UserRole::Customer
    );

    storefront.cart().add_to_cart(mug, 2).await.unwrap();
    let items = storefront.cart().items().await;
    assert_eq!(items.len(), 1);
    assert_eq!(items.first().unwrap().quantity, 2);

    let receipt = storefront
        .checkout()
        .checkout(&PaymentMethod::card())
        .await
        .unwrap();
    assert_eq!(receipt.status, OrderStatus::Created);
    assert_eq!(receipt.total_amount, Some("25.00".parse::<Price>().unwrap()));
    assert!(receipt.payment_intent_id.is_some());

    // Checkout does not touch the local cart; the caller clears it.
    assert_eq!(storefront.cart().item_count().await, 2);
    storefront.cart().clear_cart().await;
    assert_eq!(storefront.cart().item_count().await, 0);

    let orders = storefront.orders().refresh().await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders.first().unwrap().id, receipt.order_id);
    assert_eq!(orders.first().unwrap().item_count(), 2);
}

#[tokio::test]
async fn test_checkout_with_empty_cart_makes_no_request() {
    let backend = MockBackend::start().await;
    backend.add_user("a@b.com", "ann", "pw", UserRole::Customer);
    let storefront = login(&backend, "a@b.com").await;
    backend.clear_requests();

    let err = storefront
        .checkout()
        .checkout(&PaymentMethod::default())
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::EmptyCart));
    assert_eq!(backend.request_count(), 0);
}

#[tokio::test]
async fn test_checkout_rejection_carries_server_detail() {
    let backend = MockBackend::start().await;
    backend.add_user("a@b.com", "ann", "pw", UserRole::Customer);
    let mug = ProductId::new(backend.add_product("Mug", 12.5, 10, "kitchen", None));
    let storefront = login(&backend, "a@b.com").await;
    storefront.cart().add_to_cart(mug, 1).await.unwrap();
    backend.fail_next(
        Method::POST,
        "/checkout",
        StatusCode::PAYMENT_REQUIRED,
        "Card declined",
    );

    let err = storefront
        .checkout()
        .checkout(&PaymentMethod::card())
        .await
        .unwrap_err();

    assert!(matches!(&err, ClientError::Checkout(d) if d == "Card declined"));
    assert_eq!(err.to_string(), "checkout failed: Card declined");
}

#[tokio::test]
async fn test_checkout_after_session_expiry() {
    let backend = MockBackend::start().await;
    backend.add_user("a@b.com", "ann", "pw", UserRole::Customer);
    let mug = ProductId::new(backend.add_product("Mug", 12.5, 10, "kitchen", None));
    let storefront = login(&backend, "a@b.com").await;
    storefront.cart().add_to_cart(mug, 1).await.unwrap();
    backend.revoke_all_tokens();

    let err = storefront
        .checkout()
        .checkout(&PaymentMethod::card())
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::SessionExpired));
    assert!(!storefront.session().is_authenticated());
}

#[tokio::test]
async fn test_paypal_payment_execution() {
    let backend = MockBackend::start().await;
    backend.add_user("a@b.com", "ann", "pw", UserRole::Customer);
    let mug = ProductId::new(backend.add_product("Mug", 12.5, 10, "kitchen", None));
    let storefront = login(&backend, "a@b.com").await;
    storefront.cart().add_to_cart(mug, 1).await.unwrap();
    let receipt = storefront
        .checkout()
        .checkout(&PaymentMethod::paypal())
        .await
        .unwrap();
    let payment_id = receipt.payment_intent_id.unwrap();

    let confirmation = storefront
        .checkout()
        .execute_payment(&payment_id, "PAYER-1")
        .await
        .unwrap();

    assert_eq!(confirmation.order_id, receipt.order_id);
    assert_eq!(confirmation.payment_id, payment_id);
    assert_eq!(
        backend.order_status(receipt.order_id.as_i64()).as_deref(),
        Some("confirmed")
    );

    let err = storefront
        .checkout()
        .execute_payment("PAY-unknown", "PAYER-1")
        .await
        .unwrap_err();
    assert!(matches!(&err, ClientError::Checkout(d) if d == "Payment not found"));
}

// =============================================================================
// Order history
// =============================================================================

async fn placed_order(backend: &MockBackend) -> (Storefront, OrderId) {
    backend.add_user("a@b.com", "ann", "pw", UserRole::Customer);
    let mug = ProductId::new(backend.add_product("Mug", 12.5, 10, "kitchen", None));
    let storefront = login(backend, "a@b.com").await;
    storefront.cart().add_to_cart(mug, 1).await.unwrap();
    let receipt = storefront
        .checkout()
        .checkout(&PaymentMethod::card())
        .await
        .unwrap();
    (storefront, receipt.order_id)
}

#[tokio::test]
async fn test_order_details() {
    let backend = MockBackend::start().await;
    let (storefront, order_id) = placed_order(&backend).await;

    let order = storefront.orders().order(order_id).await.unwrap();
    assert_eq!(order.id, order_id);
    assert_eq!(order.items.len(), 1);
    assert_eq!(order.items.first().unwrap().product_name, "Mug");

    let err = storefront
        .orders()
        .order(OrderId::new(424_242))
        .await
        .unwrap_err();
    assert!(matches!(&err, ClientError::NotFound(d) if d == "Order not found"));
}

#[tokio::test]
async fn test_cancel_order_refreshes_history() {
    let backend = MockBackend::start().await;
    let (storefront, order_id) = placed_order(&backend).await;
    storefront.orders().refresh().await.unwrap();
    backend.clear_requests();

    storefront.orders().cancel_order(order_id).await.unwrap();

    assert_eq!(backend.count(&Method::GET, "/orders"), 1);
    let cached = storefront.orders().orders().await;
    assert_eq!(cached.first().unwrap().status, OrderStatus::Cancelled);
}

#[tokio::test]
async fn test_cancel_succeeds_even_if_reload_fails() {
    let backend = MockBackend::start().await;
    let (storefront, order_id) = placed_order(&backend).await;
    backend.fail_next(
        Method::GET,
        "/orders",
        StatusCode::INTERNAL_SERVER_ERROR,
        "database unavailable",
    );

    storefront.orders().cancel_order(order_id).await.unwrap();

    assert_eq!(backend.order_status(order_id.as_i64()).as_deref(), Some("cancelled"));
    assert!(storefront.session().is_authenticated());
}

#[tokio::test]
async fn test_cancel_shipped_order_is_refused_by_server() {
    let backend = MockBackend::start().await;
    let (storefront, order_id) = placed_order(&backend).await;
    backend.set_order_status(order_id.as_i64(), "shipped");

    let err = storefront
        .orders()
        .cancel_order(order_id)
        .await
        .unwrap_err();

    assert!(matches!(
        &err,
        ClientError::Validation { status: StatusCode::BAD_REQUEST, detail }
            if detail == "Cannot cancel order that is not in created status"
    ));
    assert_eq!(backend.order_status(order_id.as_i64()).as_deref(), Some("shipped"));
}

#[tokio::test]
async fn test_order_status_updates_require_capability() {
    let backend = MockBackend::start().await;
    let (customer, order_id) = placed_order(&backend).await;
    backend.clear_requests();

    let err = customer
        .orders()
        .update_status(order_id, OrderStatus::Shipped)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Forbidden(_)));
    assert_eq!(backend.request_count(), 0);

    backend.add_user("v@b.com", "vic", "pw", UserRole::Vendor);
    let vendor = login(&backend, "v@b.com").await;
    vendor
        .orders()
        .update_status(order_id, OrderStatus::Shipped)
        .await
        .unwrap();
    assert_eq!(backend.order_status(order_id.as_i64()).as_deref(), Some("shipped"));
}
