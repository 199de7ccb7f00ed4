//! Catalog browsing and vendor product management against the mock backend.

#![allow(clippy::unwrap_used)]

use axum::http::Method;
use secrecy::SecretString;
use storefront_client::{ClientError, Storefront};
use storefront_core::{Email, NewProduct, Price, ProductChanges, ProductId, ProductQuery, UserRole};
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

fn new_product(name: &str) -> NewProduct {
    NewProduct {
        name: name.to_owned(),
        description: "Stoneware".to_owned(),
        price: "18.00".parse().unwrap(),
        stock: 12,
        category: "kitchen".to_owned(),
        image_url: None,
    }
}

// =============================================================================
// Browsing
// =============================================================================

#[tokio::test]
async fn test_search_needs_no_login_and_filters() {
    let backend = MockBackend::start().await;
    backend.add_product("Blue Mug", 12.5, 10, "kitchen", None);
    backend.add_product("Red Mug", 11.0, 0, "kitchen", None);
    backend.add_product("Green Tea", 4.25, 5, "pantry", None);
    let (storefront, _store) = backend.storefront();

    let page = storefront
        .catalog()
        .search(&ProductQuery {
            search: Some("mug".into()),
            ..ProductQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(page.total, 2);
    assert!(page.products.iter().all(|p| p.name.contains("Mug")));

    let page = storefront
        .catalog()
        .search(&ProductQuery {
            category: Some("pantry".into()),
            ..ProductQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(page.products.len(), 1);
    assert_eq!(page.products.first().unwrap().name, "Green Tea");

    assert!(
        backend
            .requests()
            .iter()
            .all(|r| r.bearer.is_none())
    );
}

#[tokio::test]
async fn test_all_category_is_not_sent() {
    let backend = MockBackend::start().await;
    backend.add_product("Blue Mug", 12.5, 10, "kitchen", None);
    backend.add_product("Green Tea", 4.25, 5, "pantry", None);
    let (storefront, _store) = backend.storefront();

    let page = storefront
        .catalog()
        .search(&ProductQuery {
            category: Some("all".into()),
            ..ProductQuery::default()
        })
        .await
        .unwrap();

    assert_eq!(page.total, 2);
    let query = backend.requests().first().unwrap().query.clone().unwrap();
    assert!(!query.contains("category"));
}

#[tokio::test]
async fn test_product_lookup() {
    let backend = MockBackend::start().await;
    let id = ProductId::new(backend.add_product("Blue Mug", 12.5, 0, "kitchen", None));
    let (storefront, _store) = backend.storefront();

    let product = storefront.catalog().product(id).await.unwrap();
    assert_eq!(product.name, "Blue Mug");
    assert_eq!(product.price, "12.50".parse::<Price>().unwrap());
    assert!(!product.in_stock());

    let err = storefront
        .catalog()
        .product(ProductId::new(9999))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::NotFound(_)));
}

// =============================================================================
// Vendor management
// =============================================================================

#[tokio::test]
async fn test_customer_cannot_manage_products_locally() {
    let backend = MockBackend::start().await;
    backend.add_user("a@b.com", "ann", "pw", UserRole::Customer);
    let product = ProductId::new(backend.add_product("Blue Mug", 12.5, 10, "kitchen", None));
    let storefront = login(&backend, "a@b.com").await;
    backend.clear_requests();

    let catalog = storefront.catalog();
    assert!(matches!(
        catalog.create_product(&new_product("Mug")).await,
        Err(ClientError::Forbidden(_))
    ));
    assert!(matches!(
        catalog
            .update_product(
                product,
                &ProductChanges {
                    stock: Some(1),
                    ..ProductChanges::default()
                }
            )
            .await,
        Err(ClientError::Forbidden(_))
    ));
    assert!(matches!(
        catalog.delete_product(product).await,
        Err(ClientError::Forbidden(_))
    ));
    assert!(matches!(
        catalog.vendor_products().await,
        Err(ClientError::Forbidden(_))
    ));
    assert_eq!(backend.request_count(), 0);
}

#[tokio::test]
async fn test_vendor_product_lifecycle() {
    let backend = MockBackend::start().await;
    backend.add_user("v@b.com", "vic", "pw", UserRole::Vendor);
    let storefront = login(&backend, "v@b.com").await;
    let catalog = storefront.catalog();

    let created = catalog.create_product(&new_product("Mug")).await.unwrap();
    assert_eq!(
        created.vendor_id,
        storefront.session().current_user().map(|u| u.id)
    );

    let updated = catalog
        .update_product(
            created.id,
            &ProductChanges {
                price: Some("15.00".parse().unwrap()),
                ..ProductChanges::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.price, "15".parse::<Price>().unwrap());
    assert_eq!(updated.stock, 12);

    catalog.delete_product(created.id).await.unwrap();
    assert!(backend.product_snapshot(created.id.as_i64()).is_none());
}

#[tokio::test]
async fn test_vendor_products_lists_only_own_products() {
    let backend = MockBackend::start().await;
    let vic = backend.add_user("v@b.com", "vic", "pw", UserRole::Vendor);
    let other = backend.add_user("o@b.com", "olga", "pw", UserRole::Vendor);
    for i in 0..120 {
        let owner = if i % 3 == 0 { vic } else { other };
        backend.add_product(&format!("Item {i}"), 1.0, 1, "misc", Some(owner));
    }
    let storefront = login(&backend, "v@b.com").await;

    let products = storefront.catalog().vendor_products().await.unwrap();

    assert_eq!(products.len(), 40);
    assert!(products.iter().all(|p| p.vendor_id.map(|v| v.as_i64()) == Some(vic)));
    // 120 products at 100 per page.
    assert_eq!(backend.count(&Method::GET, "/products"), 2);
}

#[tokio::test]
async fn test_admin_sees_every_product() {
    let backend = MockBackend::start().await;
    let vic = backend.add_user("v@b.com", "vic", "pw", UserRole::Vendor);
    backend.add_user("root@b.com", "root", "pw", UserRole::Admin);
    backend.add_product("Vic's", 1.0, 1, "misc", Some(vic));
    backend.add_product("House", 1.0, 1, "misc", None);
    let storefront = login(&backend, "root@b.com").await;

    assert_eq!(storefront.catalog().vendor_products().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_vendor_cannot_touch_another_vendors_product() {
    let backend = MockBackend::start().await;
    let other = backend.add_user("o@b.com", "olga", "pw", UserRole::Vendor);
    backend.add_user("v@b.com", "vic", "pw", UserRole::Vendor);
    let theirs = ProductId::new(backend.add_product("Olga's", 9.0, 3, "misc", Some(other)));
    let storefront = login(&backend, "v@b.com").await;

    let err = storefront
        .catalog()
        .delete_product(theirs)
        .await
        .unwrap_err();

    assert!(matches!(&err, ClientError::Forbidden(d) if d == "Not authorized to delete this product"));
    assert!(backend.product_snapshot(theirs.as_i64()).is_some());
}
