//! Checkout, payment and order history commands.

use storefront_client::{ClientError, Storefront};
use storefront_core::{OrderId, OrderStatus, PaymentMethod};

use crate::output;

pub async fn checkout(
    storefront: &Storefront,
    payment_method: &str,
    keep_cart: bool,
) -> Result<(), ClientError> {
    let receipt = storefront
        .checkout()
        .checkout(&PaymentMethod::new(payment_method))
        .await?;
    if !keep_cart {
        storefront.cart().clear_cart().await;
    }
    output::receipt(&receipt);
    Ok(())
}

pub async fn execute_payment(
    storefront: &Storefront,
    payment_id: &str,
    payer_id: &str,
) -> Result<(), ClientError> {
    let confirmation = storefront
        .checkout()
        .execute_payment(payment_id, payer_id)
        .await?;
    output::message(&format!(
        "Payment {} confirmed for order #{}",
        confirmation.payment_id, confirmation.order_id
    ));
    Ok(())
}

pub async fn list(storefront: &Storefront) -> Result<(), ClientError> {
    let orders = storefront.orders().refresh().await?;
    output::orders(&orders);
    Ok(())
}

pub async fn show(storefront: &Storefront, id: OrderId) -> Result<(), ClientError> {
    let order = storefront.orders().order(id).await?;
    output::order(&order);
    Ok(())
}

pub async fn cancel(storefront: &Storefront, id: OrderId) -> Result<(), ClientError> {
    storefront.orders().cancel_order(id).await?;
    output::message(&format!("Order #{id} cancelled."));
    output::orders(&storefront.orders().orders().await);
    Ok(())
}

pub async fn update_status(
    storefront: &Storefront,
    id: OrderId,
    status: OrderStatus,
) -> Result<(), ClientError> {
    storefront.orders().update_status(id, status).await?;
    output::message(&format!("Order #{id} is now {status}."));
    Ok(())
}
