//! Product management for vendors and admins.

use storefront_client::{ClientError, Storefront};
use storefront_core::{NewProduct, ProductChanges, ProductId};

use crate::output;

pub async fn list(storefront: &Storefront) -> Result<(), ClientError> {
    let products = storefront.catalog().vendor_products().await?;
    output::products(&products, None);
    Ok(())
}

pub async fn create(storefront: &Storefront, product: &NewProduct) -> Result<(), ClientError> {
    let created = storefront.catalog().create_product(product).await?;
    output::message("Product created.");
    output::product(&created);
    Ok(())
}

pub async fn update(
    storefront: &Storefront,
    id: ProductId,
    changes: &ProductChanges,
) -> Result<(), ClientError> {
    if changes.is_empty() {
        return Err(ClientError::InvalidInput(
            "nothing to update; pass at least one field".to_string(),
        ));
    }
    let updated = storefront.catalog().update_product(id, changes).await?;
    output::message("Product updated.");
    output::product(&updated);
    Ok(())
}

pub async fn delete(storefront: &Storefront, id: ProductId) -> Result<(), ClientError> {
    storefront.catalog().delete_product(id).await?;
    output::message(&format!("Product #{id} deleted."));
    Ok(())
}
