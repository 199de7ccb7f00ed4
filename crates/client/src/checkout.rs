//! Checkout, payment completion and order history.

use std::sync::Arc;

use storefront_core::{
    Acknowledgement, Capability, CheckoutReceipt, CheckoutRequest, Order, OrderId, OrderStatus,
    PaymentConfirmation, PaymentExecution, PaymentMethod,
};
use tokio::sync::RwLock;
use tracing::instrument;

use crate::api::ApiRequest;
use crate::cart::CartSynchronizer;
use crate::error::{ClientError, Result};
use crate::session::SessionManager;

/// Turns the current cart into an order.
#[derive(Clone, Debug)]
pub struct CheckoutInitiator {
    session: SessionManager,
    cart: CartSynchronizer,
}

impl CheckoutInitiator {
    #[must_use]
    pub const fn new(session: SessionManager, cart: CartSynchronizer) -> Self {
        Self { session, cart }
    }

    /// Place an order for everything in the cart.
    ///
    /// The local cart is left as is; call
    /// [`CartSynchronizer::clear_cart`] once the receipt has been shown.
    ///
    /// # Errors
    ///
    /// - `ClientError::EmptyCart` if there is nothing to buy (no request)
    /// - `ClientError::NotAuthenticated` while anonymous (no request)
    /// - `ClientError::SessionExpired` if the credential was rejected
    /// - `ClientError::Checkout` with the server's detail otherwise
    #[instrument(skip(self), fields(payment_method = %payment_method))]
    pub async fn checkout(&self, payment_method: &PaymentMethod) -> Result<CheckoutReceipt> {
        if self.cart.is_empty().await {
            return Err(ClientError::EmptyCart);
        }
        if !self.session.is_authenticated() {
            return Err(ClientError::NotAuthenticated);
        }

        let request = ApiRequest::post("checkout").json(&CheckoutRequest { payment_method })?;
        let response = self.session.send_authorized(&request).await?;
        if !response.is_success() {
            let detail = response.detail_or("Failed to create checkout");
            tracing::warn!(status = %response.status(), %detail, "checkout rejected");
            return Err(ClientError::Checkout(detail));
        }

        let receipt: CheckoutReceipt = response.json()?;
        tracing::info!(order_id = %receipt.order_id, status = %receipt.status, "order placed");
        Ok(receipt)
    }

    /// Confirm an externally approved payment (`PayPal` return URL).
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Checkout` with the server's detail if the
    /// payment cannot be executed.
    #[instrument(skip(self, payer_id))]
    pub async fn execute_payment(
        &self,
        payment_id: &str,
        payer_id: &str,
    ) -> Result<PaymentConfirmation> {
        if payment_id.trim().is_empty() || payer_id.trim().is_empty() {
            return Err(ClientError::InvalidInput(
                "payment ID and payer ID are required".to_string(),
            ));
        }

        let request = ApiRequest::post("payment/execute").json(&PaymentExecution {
            payment_id,
            payer_id,
        })?;
        let response = self.session.send_authorized(&request).await?;
        if !response.is_success() {
            return Err(ClientError::Checkout(
                response.detail_or("Payment execution failed"),
            ));
        }

        let confirmation: PaymentConfirmation = response.json()?;
        tracing::info!(order_id = %confirmation.order_id, "payment executed");
        Ok(confirmation)
    }
}

/// The signed-in user's orders, newest first.
#[derive(Clone, Debug)]
pub struct OrderHistory {
    session: SessionManager,
    orders: Arc<RwLock<Vec<Order>>>,
}

impl OrderHistory {
    #[must_use]
    pub fn new(session: SessionManager) -> Self {
        Self {
            session,
            orders: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Orders loaded by the last [`refresh`](Self::refresh).
    pub async fn orders(&self) -> Vec<Order> {
        self.orders.read().await.clone()
    }

    /// Forget the cached list.
    pub async fn clear(&self) {
        self.orders.write().await.clear();
    }

    /// Reload the order list.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotAuthenticated` while anonymous and the mapped
    /// server error on failure; the cached list is kept on failure.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<Vec<Order>> {
        let response = self.session.send_authorized(&ApiRequest::get("orders")).await?;
        if !response.is_success() {
            return Err(response.into_error("Failed to fetch orders"));
        }

        let orders: Vec<Order> = response.json()?;
        tracing::debug!(count = orders.len(), "orders loaded");
        (*self.orders.write().await).clone_from(&orders);
        Ok(orders)
    }

    /// One order with its lines.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` if the order does not exist or belongs
    /// to someone else.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn order(&self, order_id: OrderId) -> Result<Order> {
        let response = self
            .session
            .send_authorized(&ApiRequest::get(format!("orders/{order_id}")))
            .await?;
        if !response.is_success() {
            return Err(response.into_error("Failed to fetch order details"));
        }
        response.json()
    }

    /// Cancel an order, then reload the list.
    ///
    /// Whether the order is still cancellable is decided by the server. A
    /// failed reload is logged; the cancellation itself already succeeded.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` carrying the server's reason when
    /// the order cannot be cancelled.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn cancel_order(&self, order_id: OrderId) -> Result<()> {
        let request = ApiRequest::put(format!("orders/{order_id}/cancel"));
        let response = self.session.send_authorized(&request).await?;
        if !response.is_success() {
            return Err(response.into_error("Failed to cancel order"));
        }
        match response.json::<Acknowledgement>() {
            Ok(Acknowledgement {
                message: Some(detail),
            }) => tracing::info!(%detail, "order cancelled"),
            _ => tracing::info!("order cancelled"),
        }

        if let Err(e) = self.refresh().await {
            tracing::warn!(error = %e, "order cancelled but the list could not be reloaded");
        }
        Ok(())
    }

    /// Move an order to `status`. Vendors and admins only.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Forbidden` without a request if the role lacks
    /// [`Capability::ManageOrderStatus`].
    #[instrument(skip(self), fields(order_id = %order_id, status = %status))]
    pub async fn update_status(&self, order_id: OrderId, status: OrderStatus) -> Result<()> {
        self.session.require(Capability::ManageOrderStatus)?;

        let request = ApiRequest::put(format!("orders/{order_id}/status"))
            .json(&serde_json::json!({ "status": status }))?;
        let response = self.session.send_authorized(&request).await?;
        if !response.is_success() {
            return Err(response.into_error("Failed to update order status"));
        }

        let mut orders = self.orders.write().await;
        if let Some(order) = orders.iter_mut().find(|order| order.id == order_id) {
            order.status = status;
        }
        Ok(())
    }
}
