//! Server-backed shopping cart.
//!
//! The backend owns the cart. [`CartSynchronizer`] keeps a local copy that is
//! only ever replaced wholesale by `GET /cart`; every mutation is followed by
//! a full refetch, so the local view never drifts from the server's.

use std::sync::Arc;

use storefront_core::{
    AddCartItem, CartItem, CartItemId, CartResponse, Price, ProductId, UpdateCartItem, UserId,
};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::instrument;

use crate::api::{ApiRequest, ApiResponse};
use crate::error::{ClientError, Result};
use crate::session::{SessionManager, SessionState};

/// Local mirror of the signed-in user's cart.
///
/// Cheap to clone; clones share the same items.
#[derive(Clone)]
pub struct CartSynchronizer {
    session: SessionManager,
    items: Arc<RwLock<Vec<CartItem>>>,
}

impl CartSynchronizer {
    #[must_use]
    pub fn new(session: SessionManager) -> Self {
        Self {
            session,
            items: Arc::new(RwLock::new(Vec::new())),
        }
    }

    // =========================================================================
    // Derived views
    // =========================================================================

    /// Snapshot of the cart lines.
    pub async fn items(&self) -> Vec<CartItem> {
        self.items.read().await.clone()
    }

    /// Total units across all lines.
    pub async fn item_count(&self) -> u64 {
        storefront_core::item_count(&self.items.read().await)
    }

    /// Sum of `price * quantity` across all lines.
    pub async fn total(&self) -> Price {
        storefront_core::subtotal(&self.items.read().await)
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    /// Drop every local line without contacting the server.
    pub async fn clear_cart(&self) {
        self.items.write().await.clear();
    }

    // =========================================================================
    // Server operations
    // =========================================================================

    /// Replace the local lines with the server's cart.
    ///
    /// # Errors
    ///
    /// - `ClientError::NotAuthenticated` while anonymous (the local cart is
    ///   emptied and no request is made)
    /// - `ClientError::SessionExpired` if the credential was rejected
    /// - `ClientError::CartFetch` for other failures; existing lines are kept
    #[instrument(skip(self))]
    pub async fn fetch_cart(&self) -> Result<()> {
        if !self.session.is_authenticated() {
            self.clear_cart().await;
            return Err(ClientError::NotAuthenticated);
        }

        let response = match self.session.send_authorized(&ApiRequest::get("cart")).await {
            Ok(response) => response,
            Err(ClientError::SessionExpired) => {
                self.clear_cart().await;
                return Err(ClientError::SessionExpired);
            }
            Err(ClientError::Network(e)) => return Err(ClientError::CartFetch(e.to_string())),
            Err(e) => return Err(e),
        };

        if !response.is_success() {
            let detail = response.detail_or("Failed to fetch cart");
            tracing::warn!(status = %response.status(), %detail, "cart fetch rejected");
            return Err(ClientError::CartFetch(detail));
        }

        let cart: CartResponse = response.json()?;
        tracing::debug!(lines = cart.items.len(), "cart synchronized");
        *self.items.write().await = cart.items;
        Ok(())
    }

    /// Add `quantity` units of a product, then resynchronize.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InvalidQuantity` for a zero quantity (no request
    /// is made) and `ClientError::CartMutation` with the server's detail when
    /// the server refuses, e.g. for insufficient stock.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn add_to_cart(&self, product_id: ProductId, quantity: u32) -> Result<()> {
        self.ensure_authenticated()?;
        if quantity == 0 {
            return Err(ClientError::InvalidQuantity(0));
        }

        let request = ApiRequest::post("cart/items").json(&AddCartItem {
            product_id,
            quantity,
        })?;
        let response = self.send_mutation(&request).await?;
        self.resync_after(response, "Failed to add to cart").await
    }

    /// Set a line's quantity. Anything below one removes the line instead.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::CartMutation` with the server's detail when the
    /// update is refused.
    #[instrument(skip(self), fields(item_id = %item_id))]
    pub async fn update_quantity(&self, item_id: CartItemId, quantity: i64) -> Result<()> {
        self.ensure_authenticated()?;
        if quantity < 1 {
            return self.remove_from_cart(item_id).await;
        }
        let quantity =
            u32::try_from(quantity).map_err(|_| ClientError::InvalidQuantity(quantity))?;

        let request =
            ApiRequest::put(format!("cart/items/{item_id}")).json(&UpdateCartItem { quantity })?;
        let response = self.send_mutation(&request).await?;
        self.resync_after(response, "Failed to update cart").await
    }

    /// Delete a line, then resynchronize.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::CartMutation` with the server's detail when the
    /// removal is refused.
    #[instrument(skip(self), fields(item_id = %item_id))]
    pub async fn remove_from_cart(&self, item_id: CartItemId) -> Result<()> {
        self.ensure_authenticated()?;
        let request = ApiRequest::delete(format!("cart/items/{item_id}"));
        let response = self.send_mutation(&request).await?;
        self.resync_after(response, "Failed to remove from cart")
            .await
    }

    fn ensure_authenticated(&self) -> Result<()> {
        if self.session.is_authenticated() {
            Ok(())
        } else {
            Err(ClientError::NotAuthenticated)
        }
    }

    /// Send a cart mutation. A rejected credential ends the session, so the
    /// lines of the previous user are dropped right away.
    async fn send_mutation(&self, request: &ApiRequest) -> Result<ApiResponse> {
        match self.session.send_authorized(request).await {
            Err(ClientError::SessionExpired) => {
                self.clear_cart().await;
                Err(ClientError::SessionExpired)
            }
            other => other,
        }
    }

    async fn resync_after(&self, response: ApiResponse, fallback: &str) -> Result<()> {
        if !response.is_success() {
            let detail = response.detail_or(fallback);
            tracing::info!(status = %response.status(), %detail, "cart mutation rejected");
            return Err(ClientError::CartMutation(detail));
        }
        self.fetch_cart().await
    }

    // =========================================================================
    // Session tracking
    // =========================================================================

    /// Keep the cart in step with the session.
    ///
    /// The spawned task fetches the cart whenever a different user becomes
    /// authenticated and clears it when the session turns anonymous. It ends
    /// when every [`SessionManager`] handle has been dropped.
    #[must_use = "dropping the handle detaches the task; abort it to stop following"]
    pub fn follow_session(&self) -> JoinHandle<()> {
        let cart = self.clone();
        let mut updates = self.session.subscribe();
        tokio::spawn(async move {
            let mut last_user: Option<UserId> = None;
            loop {
                let state = updates.borrow_and_update().clone();
                match state {
                    SessionState::Authenticated(user) if last_user != Some(user.id) => {
                        last_user = Some(user.id);
                        if let Err(e) = cart.fetch_cart().await {
                            tracing::warn!(error = %e, "cart fetch after login failed");
                        }
                    }
                    SessionState::Anonymous => {
                        last_user = None;
                        cart.clear_cart().await;
                    }
                    SessionState::Authenticated(_) | SessionState::Loading => {}
                }
                if updates.changed().await.is_err() {
                    break;
                }
            }
        })
    }
}

impl std::fmt::Debug for CartSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartSynchronizer")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}
