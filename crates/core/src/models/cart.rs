//! Cart models.
//!
//! The server owns the cart. These types mirror `GET /cart`; the aggregate
//! figures the server also sends (`total`, `item_count`) are ignored and
//! recomputed from the lines by [`item_count`] and [`subtotal`].

use serde::{Deserialize, Serialize};

use crate::types::{CartItemId, Price, ProductId};

/// Product snapshot embedded in a cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartProduct {
    pub id: ProductId,
    pub name: String,
    pub price: Price,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// One line of the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub product: CartProduct,
}

impl CartItem {
    /// `price * quantity` for this line.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.product.price.times(self.quantity)
    }
}

/// Response of `GET /cart`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CartResponse {
    #[serde(default)]
    pub items: Vec<CartItem>,
}

/// Body of `POST /cart/items`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AddCartItem {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Body of `PUT /cart/items/{id}`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct UpdateCartItem {
    pub quantity: u32,
}

/// Total number of units across `items`.
#[must_use]
pub fn item_count(items: &[CartItem]) -> u64 {
    items.iter().map(|item| u64::from(item.quantity)).sum()
}

/// Sum of `price * quantity` across `items`.
#[must_use]
pub fn subtotal(items: &[CartItem]) -> Price {
    items.iter().map(CartItem::line_total).sum()
}
