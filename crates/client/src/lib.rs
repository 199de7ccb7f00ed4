//! Storefront Client - session, cart and checkout client for the storefront
//! REST backend.
//!
//! # Architecture
//!
//! ```text
//! Storefront
//!   ├── SessionManager ── TokenStore (access_token / refresh_token)
//!   │         │
//!   │         └── ApiClient (reqwest, bearer auth, X-Request-Id)
//!   ├── CartSynchronizer ── follows SessionState over a watch channel
//!   ├── CheckoutInitiator / OrderHistory
//!   └── Catalog
//! ```
//!
//! The session is the only component that reads the token store or reacts to
//! a 401; everything else sends through [`SessionManager::send_authorized`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use secrecy::SecretString;
//! use storefront_client::{ClientConfig, FileTokenStore, Storefront};
//! use storefront_core::{Email, PaymentMethod, ProductId};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::from_env()?;
//! let store = Arc::new(FileTokenStore::new(&config.token_file));
//! let storefront = Storefront::new(&config, store)?;
//! storefront.restore().await?;
//!
//! let email = Email::parse("ann@example.com")?;
//! storefront.session().login(&email, &SecretString::from("hunter2")).await?;
//! storefront.cart().add_to_cart(ProductId::new(42), 2).await?;
//! let receipt = storefront.checkout().checkout(&PaymentMethod::card()).await?;
//! storefront.cart().clear_cart().await;
//! println!("order {} placed", receipt.order_id);
//! # Ok(())
//! # }
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod error;
pub mod session;
pub mod token_store;

use std::sync::Arc;

use storefront_core::User;

pub use api::{ApiClient, ApiRequest, ApiResponse};
pub use cart::CartSynchronizer;
pub use catalog::Catalog;
pub use checkout::{CheckoutInitiator, OrderHistory};
pub use config::{ClientConfig, ConfigError};
pub use error::{ClientError, Result};
pub use session::{SessionManager, SessionState};
pub use token_store::{FileTokenStore, MemoryTokenStore, TokenStore, TokenStoreError};

/// Explicit context object wiring every component to one session.
#[derive(Clone, Debug)]
pub struct Storefront {
    session: SessionManager,
    cart: CartSynchronizer,
    checkout: CheckoutInitiator,
    orders: OrderHistory,
    catalog: Catalog,
}

impl Storefront {
    /// Build the components. The session starts in `Loading`; call
    /// [`restore`](Self::restore) next.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Network` if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig, store: Arc<dyn TokenStore>) -> Result<Self> {
        let api = ApiClient::new(config)?;
        let session = SessionManager::new(api, store, config.refresh_on_unauthorized);
        let cart = CartSynchronizer::new(session.clone());
        Ok(Self {
            checkout: CheckoutInitiator::new(session.clone(), cart.clone()),
            orders: OrderHistory::new(session.clone()),
            catalog: Catalog::new(session.clone()),
            session,
            cart,
        })
    }

    /// Resolve the stored credential and, when signed in, load the cart.
    ///
    /// A failed cart load is logged rather than returned; the session is
    /// still usable.
    ///
    /// # Errors
    ///
    /// Returns the session error if the credential could not be resolved.
    pub async fn restore(&self) -> Result<Option<User>> {
        let user = self.session.restore().await?;
        if user.is_some() {
            if let Err(e) = self.cart.fetch_cart().await {
                tracing::warn!(error = %e, "could not load cart after restoring session");
            }
        }
        Ok(user)
    }

    /// End the session and drop local cart and order state.
    pub async fn logout(&self) {
        self.session.logout();
        self.cart.clear_cart().await;
        self.orders.clear().await;
    }

    #[must_use]
    pub const fn session(&self) -> &SessionManager {
        &self.session
    }

    #[must_use]
    pub const fn cart(&self) -> &CartSynchronizer {
        &self.cart
    }

    #[must_use]
    pub const fn checkout(&self) -> &CheckoutInitiator {
        &self.checkout
    }

    #[must_use]
    pub const fn orders(&self) -> &OrderHistory {
        &self.orders
    }

    #[must_use]
    pub const fn catalog(&self) -> &Catalog {
        &self.catalog
    }
}
