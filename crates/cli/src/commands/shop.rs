//! Catalog browsing and cart commands.

use storefront_client::{ClientError, Storefront};
use storefront_core::{CartItemId, ProductId, ProductQuery};

use crate::output;

pub async fn list_products(
    storefront: &Storefront,
    search: Option<String>,
    category: Option<String>,
    skip: u64,
    limit: u64,
) -> Result<(), ClientError> {
    let query = ProductQuery {
        search,
        category,
        skip,
        limit,
    };
    let page = storefront.catalog().search(&query).await?;
    output::products(&page.products, Some(page.total));
    Ok(())
}

pub async fn show_product(storefront: &Storefront, id: ProductId) -> Result<(), ClientError> {
    let product = storefront.catalog().product(id).await?;
    output::product(&product);
    Ok(())
}

pub async fn show_cart(storefront: &Storefront) -> Result<(), ClientError> {
    let cart = storefront.cart();
    cart.fetch_cart().await?;
    output::cart(&cart.items().await, cart.item_count().await, cart.total().await);
    Ok(())
}

pub async fn add_to_cart(
    storefront: &Storefront,
    product_id: ProductId,
    quantity: u32,
) -> Result<(), ClientError> {
    storefront.cart().add_to_cart(product_id, quantity).await?;
    output::message("Added to cart.");
    show_local_cart(storefront).await;
    Ok(())
}

pub async fn update_quantity(
    storefront: &Storefront,
    item_id: CartItemId,
    quantity: i64,
) -> Result<(), ClientError> {
    storefront.cart().update_quantity(item_id, quantity).await?;
    show_local_cart(storefront).await;
    Ok(())
}

pub async fn remove_from_cart(
    storefront: &Storefront,
    item_id: CartItemId,
) -> Result<(), ClientError> {
    storefront.cart().remove_from_cart(item_id).await?;
    output::message("Removed from cart.");
    show_local_cart(storefront).await;
    Ok(())
}

/// Mutations already resynchronized the cart; print what is held locally.
async fn show_local_cart(storefront: &Storefront) {
    let cart = storefront.cart();
    output::cart(&cart.items().await, cart.item_count().await, cart.total().await);
}
