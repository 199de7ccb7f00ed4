//! Product catalog: public browsing and vendor product management.

use storefront_core::{
    Capability, NewProduct, Product, ProductChanges, ProductId, ProductPage, ProductQuery,
};
use tracing::instrument;

use crate::api::ApiRequest;
use crate::error::{ClientError, Result};
use crate::session::SessionManager;

/// Page size used when walking the whole catalog.
const SCAN_PAGE_SIZE: u64 = 100;

#[derive(Clone, Debug)]
pub struct Catalog {
    session: SessionManager,
}

impl Catalog {
    #[must_use]
    pub const fn new(session: SessionManager) -> Self {
        Self { session }
    }

    /// One page of active products. No login needed.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Network` if the backend is unreachable and the
    /// mapped server error if the query is rejected.
    #[instrument(skip(self))]
    pub async fn search(&self, query: &ProductQuery) -> Result<ProductPage> {
        let request = ApiRequest::get("products").query(query.to_pairs());
        let response = self.session.api().send(&request, None).await?;
        if !response.is_success() {
            return Err(response.into_error("Failed to fetch products"));
        }
        response.json()
    }

    /// A single product.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` for unknown IDs.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn product(&self, product_id: ProductId) -> Result<Product> {
        let request = ApiRequest::get(format!("products/{product_id}"));
        let response = self.session.api().send(&request, None).await?;
        if !response.is_success() {
            return Err(response.into_error("Product not found"));
        }
        response.json()
    }

    /// Products the signed-in vendor owns.
    ///
    /// Admins hold [`Capability::ManageAllProducts`] and get the whole
    /// catalog instead of only the products listing them as vendor, so the
    /// console can manage products that have no vendor at all.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Forbidden` without a request for customers.
    #[instrument(skip(self))]
    pub async fn vendor_products(&self) -> Result<Vec<Product>> {
        let user = self.session.require(Capability::ManageProducts)?;
        let see_all = user.role.can(Capability::ManageAllProducts);

        let mut owned = Vec::new();
        let mut query = ProductQuery {
            limit: SCAN_PAGE_SIZE,
            ..ProductQuery::default()
        };
        loop {
            let page = self.search(&query).await?;
            let fetched = u64::try_from(page.products.len()).unwrap_or(u64::MAX);
            owned.extend(
                page.products
                    .into_iter()
                    .filter(|product| see_all || product.vendor_id == Some(user.id)),
            );
            query.skip += fetched;
            if fetched < query.limit || query.skip >= page.total {
                break;
            }
        }

        tracing::debug!(count = owned.len(), "vendor products loaded");
        Ok(owned)
    }

    /// List a new product under the signed-in vendor.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Forbidden` without a request for customers and
    /// `ClientError::Validation` if the server rejects the product.
    #[instrument(skip(self, product), fields(name = %product.name))]
    pub async fn create_product(&self, product: &NewProduct) -> Result<Product> {
        self.session.require(Capability::ManageProducts)?;
        if product.name.trim().is_empty() {
            return Err(ClientError::InvalidInput("product name cannot be empty".to_string()));
        }
        if product.stock < 0 {
            return Err(ClientError::InvalidInput("stock cannot be negative".to_string()));
        }

        let request = ApiRequest::post("vendor/products").json(product)?;
        let response = self.session.send_authorized(&request).await?;
        if !response.is_success() {
            return Err(response.into_error("Failed to create product"));
        }

        let created: Product = response.json()?;
        tracing::info!(product_id = %created.id, "product created");
        Ok(created)
    }

    /// Apply `changes` to a product the vendor owns.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Forbidden` for customers (no request) and for
    /// products owned by another vendor (server 403).
    #[instrument(skip(self, changes), fields(product_id = %product_id))]
    pub async fn update_product(
        &self,
        product_id: ProductId,
        changes: &ProductChanges,
    ) -> Result<Product> {
        self.session.require(Capability::ManageProducts)?;
        if changes.is_empty() {
            return self.product(product_id).await;
        }

        let request = ApiRequest::put(format!("vendor/products/{product_id}")).json(changes)?;
        let response = self.session.send_authorized(&request).await?;
        if !response.is_success() {
            return Err(response.into_error("Failed to update product"));
        }
        response.json()
    }

    /// Remove a product from the catalog.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Forbidden` for customers (no request) and for
    /// products owned by another vendor (server 403).
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn delete_product(&self, product_id: ProductId) -> Result<()> {
        self.session.require(Capability::ManageProducts)?;

        let request = ApiRequest::delete(format!("vendor/products/{product_id}"));
        let response = self.session.send_authorized(&request).await?;
        if !response.is_success() {
            return Err(response.into_error("Failed to delete product"));
        }
        tracing::info!("product deleted");
        Ok(())
    }
}
