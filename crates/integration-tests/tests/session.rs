//! Session lifecycle against the mock backend: login, signup, restore,
//! refresh-on-401 and logout.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use secrecy::SecretString;
use storefront_client::{
    ClientError, MemoryTokenStore, SessionState, Storefront, TokenStore,
};
use storefront_core::{Capability, Email, ProfileUpdate, TokenPair, UserRole};
use storefront_integration_tests::MockBackend;

fn email(s: &str) -> Email {
    Email::parse(s).unwrap()
}

fn password(s: &str) -> SecretString {
    SecretString::from(s)
}

/// An unsigned JWT-shaped token whose `exp` claim is in the past.
fn expired_jwt() -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let claims = URL_SAFE_NO_PAD.encode(br#"{"sub":"a@b.com","exp":1000000000}"#);
    format!("{header}.{claims}.signature")
}

async fn logged_in_customer(backend: &MockBackend) -> (Storefront, Arc<MemoryTokenStore>) {
    backend.add_user("a@b.com", "ann", "pw", UserRole::Customer);
    let (storefront, store) = backend.storefront();
    storefront.restore().await.unwrap();
    storefront
        .session()
        .login(&email("a@b.com"), &password("pw"))
        .await
        .unwrap();
    (storefront, store)
}

// =============================================================================
// Login & signup
// =============================================================================

#[tokio::test]
async fn test_login_stores_tokens_and_resolves_user() {
    let backend = MockBackend::start().await;
    let (storefront, store) = logged_in_customer(&backend).await;

    let user = storefront.session().current_user().unwrap();
    assert_eq!(user.username, "ann");
    assert_eq!(user.role, UserRole::Customer);
    assert!(storefront.session().can(Capability::Shop));
    assert!(!storefront.session().can(Capability::ManageProducts));

    let tokens = store.read().unwrap().unwrap();
    assert!(tokens.access.expose().starts_with("access-"));
    assert!(tokens.refresh.is_some());

    // The token returned by login is the one presented to /auth/me.
    let me = backend
        .requests()
        .into_iter()
        .find(|r| r.path == "/auth/me")
        .unwrap();
    assert_eq!(me.bearer.as_deref(), Some(tokens.access.expose()));
}

#[tokio::test]
async fn test_login_with_wrong_password_surfaces_server_detail() {
    let backend = MockBackend::start().await;
    backend.add_user("a@b.com", "ann", "pw", UserRole::Customer);
    let (storefront, store) = backend.storefront();
    storefront.restore().await.unwrap();

    let err = storefront
        .session()
        .login(&email("a@b.com"), &password("wrong"))
        .await
        .unwrap_err();

    assert!(matches!(&err, ClientError::Authentication(d) if d == "Incorrect email or password"));
    assert_eq!(storefront.session().state(), SessionState::Anonymous);
    assert!(store.read().unwrap().is_none());
}

#[tokio::test]
async fn test_signup_then_logs_in() {
    let backend = MockBackend::start().await;
    let (storefront, _store) = backend.storefront();

    let user = storefront
        .session()
        .signup(&email("v@shop.com"), "vic", &password("pw"), UserRole::Vendor)
        .await
        .unwrap();

    assert_eq!(user.role, UserRole::Vendor);
    assert!(storefront.session().is_authenticated());
    assert!(storefront.session().can(Capability::ManageProducts));
    assert_eq!(backend.count(&Method::POST, "/auth/signup"), 1);
    assert_eq!(backend.count(&Method::POST, "/auth/token"), 1);
}

#[tokio::test]
async fn test_signup_duplicate_email_is_registration_error() {
    let backend = MockBackend::start().await;
    backend.add_user("a@b.com", "ann", "pw", UserRole::Customer);
    let (storefront, _store) = backend.storefront();

    let err = storefront
        .session()
        .signup(&email("a@b.com"), "other", &password("pw"), UserRole::Customer)
        .await
        .unwrap_err();

    assert!(matches!(&err, ClientError::Registration(d) if d == "Email already registered"));
    assert_eq!(backend.count(&Method::POST, "/auth/token"), 0);
}

// =============================================================================
// Restore
// =============================================================================

#[tokio::test]
async fn test_restore_without_credential_is_anonymous() {
    let backend = MockBackend::start().await;
    let (storefront, _store) = backend.storefront();

    assert_eq!(storefront.session().state(), SessionState::Loading);
    assert!(storefront.restore().await.unwrap().is_none());
    assert_eq!(storefront.session().state(), SessionState::Anonymous);
    assert_eq!(backend.request_count(), 0);
}

#[tokio::test]
async fn test_restore_with_stored_credential() {
    let backend = MockBackend::start().await;
    let user_id = backend.add_user("a@b.com", "ann", "pw", UserRole::Customer);
    let (access, refresh) = backend.issue_tokens(user_id);
    let store = Arc::new(MemoryTokenStore::with_tokens(&TokenPair::new(
        access,
        Some(refresh),
    )));
    let storefront = backend.storefront_with_store(store);

    let user = storefront.restore().await.unwrap().unwrap();
    assert_eq!(user.username, "ann");
    assert!(storefront.session().is_authenticated());
}

#[tokio::test]
async fn test_restore_with_rejected_credential_clears_it_silently() {
    let backend = MockBackend::start().await;
    let store = Arc::new(MemoryTokenStore::with_tokens(&TokenPair::new(
        "stale",
        None,
    )));
    let storefront = backend.storefront_with_store(store.clone());

    assert!(storefront.restore().await.unwrap().is_none());
    assert_eq!(storefront.session().state(), SessionState::Anonymous);
    assert!(store.read().unwrap().is_none());
}

#[tokio::test]
async fn test_restore_server_error_keeps_credential() {
    let backend = MockBackend::start().await;
    let user_id = backend.add_user("a@b.com", "ann", "pw", UserRole::Customer);
    let (access, _) = backend.issue_tokens(user_id);
    let store = Arc::new(MemoryTokenStore::with_tokens(&TokenPair::new(access, None)));
    backend.fail_next(
        Method::GET,
        "/auth/me",
        StatusCode::INTERNAL_SERVER_ERROR,
        "database unavailable",
    );
    let storefront = backend.storefront_with_store(store.clone());

    assert!(storefront.restore().await.is_err());
    assert_eq!(storefront.session().state(), SessionState::Anonymous);
    assert!(store.read().unwrap().is_some());
}

#[tokio::test]
async fn test_restore_with_unreadable_account_ends_anonymous() {
    let backend = MockBackend::start().await;
    let user_id = backend.add_user("a@b.com", "ann", "pw", UserRole::Customer);
    let (access, _) = backend.issue_tokens(user_id);
    let store = Arc::new(MemoryTokenStore::with_tokens(&TokenPair::new(access, None)));
    backend.fail_next(Method::GET, "/auth/me", StatusCode::OK, "not a user");
    let storefront = backend.storefront_with_store(store.clone());

    let err = storefront.restore().await.unwrap_err();

    assert!(matches!(err, ClientError::Decode(_)));
    assert_eq!(storefront.session().state(), SessionState::Anonymous);
    assert!(store.read().unwrap().is_some());
}

#[tokio::test]
async fn test_login_with_unreadable_account_ends_anonymous() {
    let backend = MockBackend::start().await;
    backend.add_user("a@b.com", "ann", "pw", UserRole::Customer);
    let (storefront, _store) = backend.storefront();
    storefront.restore().await.unwrap();
    backend.fail_next(Method::GET, "/auth/me", StatusCode::OK, "not a user");

    let err = storefront
        .session()
        .login(&email("a@b.com"), &password("pw"))
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Decode(_)));
    assert_eq!(storefront.session().state(), SessionState::Anonymous);
}

#[tokio::test]
async fn test_restore_refreshes_expired_access_token_first() {
    let backend = MockBackend::start().await;
    let user_id = backend.add_user("a@b.com", "ann", "pw", UserRole::Customer);
    let (_, refresh) = backend.issue_tokens(user_id);
    let expired = expired_jwt();
    let store = Arc::new(MemoryTokenStore::with_tokens(&TokenPair::new(
        expired.clone(),
        Some(refresh),
    )));
    let storefront = backend.storefront_with_store(store.clone());

    assert!(storefront.restore().await.unwrap().is_some());
    assert_eq!(backend.count(&Method::POST, "/auth/refresh"), 1);
    assert!(
        backend
            .requests()
            .iter()
            .all(|r| r.bearer.as_deref() != Some(expired.as_str()))
    );
    assert_ne!(store.read().unwrap().unwrap().access.expose(), expired);
}

// =============================================================================
// 401 handling
// =============================================================================

#[tokio::test]
async fn test_unauthorized_refreshes_and_replays_once() {
    let backend = MockBackend::start().await;
    let (storefront, store) = logged_in_customer(&backend).await;
    let before = store.read().unwrap().unwrap().access.expose().to_owned();
    backend.expire_access_tokens();

    storefront.cart().fetch_cart().await.unwrap();

    assert!(storefront.session().is_authenticated());
    assert_eq!(backend.count(&Method::POST, "/auth/refresh"), 1);
    assert_eq!(backend.count(&Method::GET, "/cart"), 2);
    assert_ne!(store.read().unwrap().unwrap().access.expose(), before);
}

#[tokio::test]
async fn test_unauthorized_without_usable_refresh_logs_out() {
    let backend = MockBackend::start().await;
    let (storefront, store) = logged_in_customer(&backend).await;
    backend.revoke_all_tokens();

    let err = storefront.cart().fetch_cart().await.unwrap_err();
    assert!(matches!(err, ClientError::SessionExpired));
    assert!(err.requires_login());
    assert_eq!(storefront.session().state(), SessionState::Anonymous);
    assert!(store.read().unwrap().is_none());

    // Subsequent calls short-circuit without touching the network.
    backend.clear_requests();
    assert!(matches!(
        storefront.cart().fetch_cart().await,
        Err(ClientError::NotAuthenticated)
    ));
    assert_eq!(backend.request_count(), 0);
}

#[tokio::test]
async fn test_unauthorized_with_refresh_disabled_logs_out_immediately() {
    let backend = MockBackend::start().await;
    backend.add_user("a@b.com", "ann", "pw", UserRole::Customer);
    let mut config = backend.config();
    config.refresh_on_unauthorized = false;
    let store = Arc::new(MemoryTokenStore::new());
    let storefront = Storefront::new(&config, store.clone()).unwrap();
    storefront
        .session()
        .login(&email("a@b.com"), &password("pw"))
        .await
        .unwrap();
    backend.expire_access_tokens();

    assert!(matches!(
        storefront.orders().refresh().await,
        Err(ClientError::SessionExpired)
    ));
    assert_eq!(backend.count(&Method::POST, "/auth/refresh"), 0);
    assert!(store.read().unwrap().is_none());
}

#[tokio::test]
async fn test_concurrent_unauthorized_calls_share_one_refresh() {
    let backend = MockBackend::start().await;
    let (storefront, _store) = logged_in_customer(&backend).await;
    backend.expire_access_tokens();

    let orders = storefront.orders().clone();
    let cart = storefront.cart().clone();
    let (a, b) = tokio::join!(orders.refresh(), cart.fetch_cart());

    assert!(a.is_ok());
    assert!(b.is_ok());
    assert_eq!(backend.count(&Method::POST, "/auth/refresh"), 1);
    assert!(storefront.session().is_authenticated());
}

// =============================================================================
// Logout, transport & account
// =============================================================================

#[tokio::test]
async fn test_logout_then_fetch_makes_no_request() {
    let backend = MockBackend::start().await;
    let (storefront, store) = logged_in_customer(&backend).await;
    let product = backend.add_product("Mug", 12.5, 10, "kitchen", None);
    storefront
        .cart()
        .add_to_cart(product.into(), 1)
        .await
        .unwrap();

    storefront.logout().await;
    backend.clear_requests();

    assert!(matches!(
        storefront.cart().fetch_cart().await,
        Err(ClientError::NotAuthenticated)
    ));
    assert!(storefront.cart().is_empty().await);
    assert!(store.read().unwrap().is_none());
    assert_eq!(backend.request_count(), 0);
}

#[tokio::test]
async fn test_state_changes_are_published() {
    let backend = MockBackend::start().await;
    backend.add_user("a@b.com", "ann", "pw", UserRole::Customer);
    let (storefront, _store) = backend.storefront();
    let mut updates = storefront.session().subscribe();

    storefront.restore().await.unwrap();
    assert!(updates.has_changed().unwrap());
    assert_eq!(*updates.borrow_and_update(), SessionState::Anonymous);

    storefront
        .session()
        .login(&email("a@b.com"), &password("pw"))
        .await
        .unwrap();
    assert!(updates.borrow_and_update().is_authenticated());
}

#[tokio::test]
async fn test_every_request_carries_unique_request_id() {
    let backend = MockBackend::start().await;
    let _ = logged_in_customer(&backend).await;

    let ids: Vec<String> = backend
        .requests()
        .into_iter()
        .map(|r| r.request_id.unwrap())
        .collect();
    assert_eq!(ids.len(), 2);
    assert_ne!(ids.first(), ids.get(1));
}

#[tokio::test]
async fn test_update_profile_and_password() {
    let backend = MockBackend::start().await;
    let (storefront, _store) = logged_in_customer(&backend).await;

    let user = storefront
        .session()
        .update_profile(&ProfileUpdate {
            username: Some("annie".into()),
            email: None,
        })
        .await
        .unwrap();
    assert_eq!(user.username, "annie");
    assert_eq!(storefront.session().current_user().unwrap().username, "annie");

    let err = storefront
        .session()
        .change_password(&password("nope"), &password("new"), &password("new"))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Incorrect current password");

    storefront
        .session()
        .change_password(&password("pw"), &password("new"), &password("new"))
        .await
        .unwrap();
    storefront.logout().await;
    storefront
        .session()
        .login(&email("a@b.com"), &password("new"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_empty_profile_update_makes_no_request() {
    let backend = MockBackend::start().await;
    let (storefront, _store) = logged_in_customer(&backend).await;
    backend.clear_requests();

    let user = storefront
        .session()
        .update_profile(&ProfileUpdate::default())
        .await
        .unwrap();
    assert_eq!(user.username, "ann");
    assert_eq!(backend.request_count(), 0);
}
