//! Catalog models: public listings and vendor product management bodies.

use serde::{Deserialize, Serialize};

use crate::types::{Price, ProductId, UserId};

/// A catalog product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Price,
    #[serde(default)]
    pub stock: i64,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub vendor_id: Option<UserId>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl Product {
    /// At least one unit can be added to a cart.
    #[must_use]
    pub const fn in_stock(&self) -> bool {
        self.stock > 0
    }
}

const fn default_true() -> bool {
    true
}

/// Response of `GET /products`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductPage {
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub skip: u64,
    #[serde(default)]
    pub limit: u64,
}

/// Filters for `GET /products`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductQuery {
    /// Case-insensitive substring match on the product name.
    pub search: Option<String>,
    /// Exact category; `"all"` means no filter.
    pub category: Option<String>,
    pub skip: u64,
    pub limit: u64,
}

impl ProductQuery {
    /// Default page size used by the backend.
    pub const DEFAULT_LIMIT: u64 = 20;

    /// Query-string pairs, omitting blank filters and the `"all"` category.
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::with_capacity(4);
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            pairs.push(("search", search.to_owned()));
        }
        if let Some(category) = self
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case("all"))
        {
            pairs.push(("category", category.to_owned()));
        }
        pairs.push(("skip", self.skip.to_string()));
        pairs.push(("limit", self.limit.to_string()));
        pairs
    }
}

impl Default for ProductQuery {
    fn default() -> Self {
        Self {
            search: None,
            category: None,
            skip: 0,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

/// Body of `POST /vendor/products`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub price: Price,
    pub stock: i64,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Body of `PUT /vendor/products/{id}`. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProductChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Price>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl ProductChanges {
    /// Nothing would change.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.price.is_none()
            && self.stock.is_none()
            && self.category.is_none()
            && self.image_url.is_none()
    }
}
