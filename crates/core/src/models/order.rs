//! Order, checkout and payment models.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::types::{OrderId, OrderItemId, OrderStatus, Price, ProductId};

/// A placed order as returned by `GET /orders` and `GET /orders/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub total_amount: Price,
    pub status: OrderStatus,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub payment_intent_id: Option<String>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
}

impl Order {
    /// Units across all lines of the order.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.quantity)).sum()
    }
}

/// One line of an order, priced at the time of checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub price: Price,
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Payment method requested at checkout (`card` unless told otherwise).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentMethod(String);

impl PaymentMethod {
    /// Create a payment method from its wire name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into().trim().to_ascii_lowercase())
    }

    /// Card payment.
    #[must_use]
    pub fn card() -> Self {
        Self::new("card")
    }

    /// `PayPal` approval flow (completed with `POST /payment/execute`).
    #[must_use]
    pub fn paypal() -> Self {
        Self::new("paypal")
    }

    /// Wire name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PaymentMethod {
    fn default() -> Self {
        Self::card()
    }
}

impl From<&str> for PaymentMethod {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl core::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Body of `POST /checkout`.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutRequest<'a> {
    pub payment_method: &'a PaymentMethod,
}

/// Response of `POST /checkout`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CheckoutReceipt {
    pub order_id: OrderId,
    #[serde(default)]
    pub total_amount: Option<Price>,
    #[serde(default)]
    pub payment_intent_id: Option<String>,
    #[serde(default)]
    pub status: OrderStatus,
}

/// Body of `POST /payment/execute`.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentExecution<'a> {
    pub payment_id: &'a str,
    pub payer_id: &'a str,
}

/// Response of `POST /payment/execute`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentConfirmation {
    pub order_id: OrderId,
    pub payment_id: String,
}

/// Accepts RFC 3339 timestamps and naive `YYYY-MM-DDTHH:MM:SS[.f]` (taken as UTC).
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(aware) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(aware.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}
