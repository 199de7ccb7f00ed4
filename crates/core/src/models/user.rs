//! Account models: the current user and the auth request/response bodies.

use serde::{Deserialize, Serialize};

use crate::types::{Email, TokenPair, UserId, UserRole};

/// The signed-in user as returned by `GET /auth/me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: Email,
    pub username: String,
    pub role: UserRole,
}

/// Body of `POST /auth/token`.
#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a Email,
    pub password: &'a str,
}

/// Body of `POST /auth/signup`.
#[derive(Debug, Serialize)]
pub struct SignupRequest<'a> {
    pub email: &'a Email,
    pub username: &'a str,
    pub password: &'a str,
    pub role: UserRole,
}

/// Response of `POST /auth/token` and `POST /auth/refresh`.
#[derive(Debug, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl From<TokenGrant> for TokenPair {
    fn from(grant: TokenGrant) -> Self {
        Self::new(grant.access_token, grant.refresh_token)
    }
}

/// Response of `POST /auth/signup`.
#[derive(Debug, Clone, Deserialize)]
pub struct SignupReceipt {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub user_id: Option<UserId>,
}

/// Body of `PUT /auth/profile`. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<Email>,
}

impl ProfileUpdate {
    /// Nothing would change.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.username.is_none() && self.email.is_none()
    }
}

/// Body of `PUT /auth/password`.
#[derive(Debug, Serialize)]
pub struct PasswordChange<'a> {
    pub current_password: &'a str,
    pub new_password: &'a str,
}

/// Generic `{"message": ...}` acknowledgement.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Acknowledgement {
    #[serde(default)]
    pub message: Option<String>,
}
