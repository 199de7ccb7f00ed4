//! Client error types.
//!
//! Every component converts transport and server failures into a
//! [`ClientError`] at its boundary, carrying the server's `detail` message
//! where one was sent, so callers only ever display `err.to_string()`.

use reqwest::StatusCode;
use thiserror::Error;

use crate::token_store::TokenStoreError;

/// Message shown whenever an operation needs a signed-in user.
pub const LOGIN_REQUIRED: &str = "please login to continue";

/// Errors returned by the storefront client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The token-exchange endpoint rejected the credentials.
    #[error("login failed: {0}")]
    Authentication(String),

    /// The signup endpoint rejected the registration.
    #[error("signup failed: {0}")]
    Registration(String),

    /// An authenticated call was answered with 401; the session has been ended.
    #[error("session expired, please login again")]
    SessionExpired,

    /// The operation requires a signed-in user.
    #[error("{LOGIN_REQUIRED}")]
    NotAuthenticated,

    /// The signed-in user's role lacks the required capability.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The server rejected the request (4xx) with a detail message.
    #[error("{detail}")]
    Validation {
        /// HTTP status returned by the server.
        status: StatusCode,
        /// Server-provided explanation.
        detail: String,
    },

    /// The requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Fetching the cart failed; previously loaded items were kept.
    #[error("failed to load cart: {0}")]
    CartFetch(String),

    /// Adding, updating or removing a cart line failed.
    #[error("{0}")]
    CartMutation(String),

    /// Checkout was refused by the server.
    #[error("checkout failed: {0}")]
    Checkout(String),

    /// Checkout was attempted with no items in the cart.
    #[error("cart is empty")]
    EmptyCart,

    /// A quantity below one was supplied where a positive one is required.
    #[error("quantity must be at least 1 (got {0})")]
    InvalidQuantity(i64),

    /// Invalid input rejected before any request was made.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Transport failure (connection refused, timeout, TLS...).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The server answered with a body that could not be decoded.
    #[error("unexpected response from server: {0}")]
    Decode(#[from] serde_json::Error),

    /// Reading or writing the token store failed.
    #[error("token storage error: {0}")]
    TokenStore(#[from] TokenStoreError),

    /// An endpoint path could not be joined onto the base URL.
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ClientError {
    /// Whether the caller should send the user back to the login screen.
    #[must_use]
    pub const fn requires_login(&self) -> bool {
        matches!(self, Self::SessionExpired | Self::NotAuthenticated)
    }
}

/// Convenience result alias.
pub type Result<T, E = ClientError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_authenticated_message() {
        assert_eq!(
            ClientError::NotAuthenticated.to_string(),
            "please login to continue"
        );
    }

    #[test]
    fn test_validation_displays_server_detail() {
        let err = ClientError::Validation {
            status: StatusCode::BAD_REQUEST,
            detail: "Insufficient stock".to_string(),
        };
        assert_eq!(err.to_string(), "Insufficient stock");
    }

    #[test]
    fn test_requires_login() {
        assert!(ClientError::SessionExpired.requires_login());
        assert!(ClientError::NotAuthenticated.requires_login());
        assert!(!ClientError::EmptyCart.requires_login());
    }

    #[test]
    fn test_authentication_failed_message() {
        let err = ClientError::Authentication("Incorrect email or password".to_string());
        assert_eq!(err.to_string(), "login failed: Incorrect email or password");
    }
}
