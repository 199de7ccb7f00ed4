//! Session management.
//!
//! [`SessionManager`] owns the authenticated-or-not state of the client. It
//! exchanges credentials for tokens, resolves the current user, and is the
//! single place where a 401 turns into a logout. Every transition is
//! published on a [`tokio::sync::watch`] channel so the cart can follow
//! logins and logouts.
//!
//! ```text
//!             restore()
//! Loading ───────────────┬──► Authenticated(user) ──logout()/401──┐
//!                        │          ▲                               │
//!                        └──► Anonymous ◄───────────────────────────┘
//!                                   └────── login()/signup() ──────►
//! ```

use std::sync::Arc;

use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use storefront_core::{
    AccessToken, Capability, Email, LoginRequest, PasswordChange, ProfileUpdate, SignupReceipt,
    SignupRequest, TokenGrant, TokenPair, User, UserRole,
};
use tokio::sync::{Mutex, watch};
use tracing::instrument;

use crate::api::{ApiClient, ApiRequest, ApiResponse};
use crate::error::{ClientError, Result};
use crate::token_store::TokenStore;

/// Authentication state of the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// A stored credential is still being resolved.
    Loading,
    /// No user is signed in.
    Anonymous,
    /// `GET /auth/me` confirmed the stored credential.
    Authenticated(User),
}

impl SessionState {
    /// A user is signed in.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    /// The signed-in user, if any.
    #[must_use]
    pub const fn user(&self) -> Option<&User> {
        match self {
            Self::Authenticated(user) => Some(user),
            Self::Loading | Self::Anonymous => None,
        }
    }
}

/// Owner of the session state and the only consumer of the token store.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    api: ApiClient,
    store: Arc<dyn TokenStore>,
    state: watch::Sender<SessionState>,
    refresh_on_unauthorized: bool,
    /// Serializes refresh exchanges so concurrent 401s trigger one refresh.
    refresh_lock: Mutex<()>,
}

impl SessionManager {
    /// Create a manager in the `Loading` state. Call [`restore`](Self::restore)
    /// to resolve any stored credential.
    #[must_use]
    pub fn new(api: ApiClient, store: Arc<dyn TokenStore>, refresh_on_unauthorized: bool) -> Self {
        let (state, _) = watch::channel(SessionState::Loading);
        Self {
            inner: Arc::new(SessionInner {
                api,
                store,
                state,
                refresh_on_unauthorized,
                refresh_lock: Mutex::new(()),
            }),
        }
    }

    /// The transport shared with the other components.
    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    // =========================================================================
    // State
    // =========================================================================

    /// Snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    /// Receiver notified on every state transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// The signed-in user, if any.
    #[must_use]
    pub fn current_user(&self) -> Option<User> {
        self.inner.state.borrow().user().cloned()
    }

    /// A user is signed in.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated()
    }

    /// Whether the signed-in user's role grants `capability`.
    ///
    /// Always `false` while anonymous.
    #[must_use]
    pub fn can(&self, capability: Capability) -> bool {
        self.inner
            .state
            .borrow()
            .user()
            .is_some_and(|user| user.role.can(capability))
    }

    /// The signed-in user, provided their role grants `capability`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotAuthenticated` while anonymous and
    /// `ClientError::Forbidden` if the role lacks the capability.
    pub fn require(&self, capability: Capability) -> Result<User> {
        let user = self.current_user().ok_or(ClientError::NotAuthenticated)?;
        if user.role.can(capability) {
            Ok(user)
        } else {
            Err(ClientError::Forbidden(format!(
                "a {} account cannot {capability}",
                user.role
            )))
        }
    }

    fn transition(&self, next: SessionState) {
        self.inner.state.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            tracing::debug!(from = ?state_name(state), to = ?state_name(&next), "session transition");
            *state = next;
            true
        });
    }

    fn clear_tokens(&self) {
        if let Err(e) = self.inner.store.clear() {
            tracing::warn!(error = %e, "failed to clear stored credentials");
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Resolve a previously stored credential.
    ///
    /// An access token whose `exp` claim has passed is refreshed first when a
    /// refresh token is available.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::TokenStore` if the store cannot be read and
    /// `ClientError::Network` if the backend is unreachable. In both cases the
    /// state becomes `Anonymous`.
    #[instrument(skip(self))]
    pub async fn restore(&self) -> Result<Option<User>> {
        let tokens = match self.inner.store.read() {
            Ok(Some(tokens)) => tokens,
            Ok(None) => {
                self.transition(SessionState::Anonymous);
                return Ok(None);
            }
            Err(e) => {
                self.transition(SessionState::Anonymous);
                return Err(e.into());
            }
        };

        let tokens = if tokens.access.is_expired_at(Utc::now())
            && tokens.refresh.is_some()
            && self.inner.refresh_on_unauthorized
        {
            tracing::info!("stored access token has expired, refreshing");
            self.refresh().await.unwrap_or(tokens)
        } else {
            tokens
        };

        self.resolve_current_user(&tokens.access).await
    }

    /// Exchange email and password for tokens, then resolve the user.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Authentication` with the server's detail message
    /// when the credentials are rejected.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn login(&self, email: &Email, password: &SecretString) -> Result<User> {
        let request = ApiRequest::post("auth/token").json(&LoginRequest {
            email,
            password: password.expose_secret(),
        })?;
        let response = self.inner.api.send(&request, None).await?;
        if !response.is_success() {
            return Err(ClientError::Authentication(response.detail_or("Login failed")));
        }

        let tokens = TokenPair::from(response.json::<TokenGrant>()?);
        self.inner.store.save(&tokens)?;

        match self.resolve_current_user(&tokens.access).await? {
            Some(user) => {
                tracing::info!(user_id = %user.id, role = %user.role, "logged in");
                Ok(user)
            }
            None => Err(ClientError::Authentication(
                "the server rejected the issued token".to_string(),
            )),
        }
    }

    /// Register a new account and log straight into it.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Registration` with the server's detail message
    /// (duplicate email, taken username...) when signup is rejected.
    #[instrument(skip(self, password), fields(email = %email, role = %role))]
    pub async fn signup(
        &self,
        email: &Email,
        username: &str,
        password: &SecretString,
        role: UserRole,
    ) -> Result<User> {
        let username = username.trim();
        if username.is_empty() {
            return Err(ClientError::InvalidInput("username cannot be empty".to_string()));
        }

        let request = ApiRequest::post("auth/signup").json(&SignupRequest {
            email,
            username,
            password: password.expose_secret(),
            role,
        })?;
        let response = self.inner.api.send(&request, None).await?;
        if !response.is_success() {
            return Err(ClientError::Registration(response.detail_or("Signup failed")));
        }
        match response.json::<SignupReceipt>() {
            Ok(SignupReceipt {
                user_id: Some(user_id),
                ..
            }) => tracing::info!(%user_id, "account created"),
            _ => tracing::info!("account created"),
        }

        self.login(email, password).await
    }

    /// Present `token` to `GET /auth/me`.
    ///
    /// A 401 or 403 means the credential is dead: the store is cleared and the
    /// state becomes `Anonymous` without an error, since this is expiry rather
    /// than a user mistake.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Network` or the mapped server error for other
    /// failures. The stored credential is kept so a later retry can succeed.
    #[instrument(skip(self, token))]
    pub async fn resolve_current_user(&self, token: &AccessToken) -> Result<Option<User>> {
        let response = match self
            .inner
            .api
            .send(&ApiRequest::get("auth/me"), Some(token))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                self.transition(SessionState::Anonymous);
                return Err(e);
            }
        };

        if response.is_success() {
            let user: User = match response.json() {
                Ok(user) => user,
                Err(e) => {
                    tracing::warn!(error = %e, "unreadable account response");
                    self.transition(SessionState::Anonymous);
                    return Err(e);
                }
            };
            self.transition(SessionState::Authenticated(user.clone()));
            return Ok(Some(user));
        }

        if response.is_unauthorized() || response.status() == reqwest::StatusCode::FORBIDDEN {
            tracing::info!("stored credential rejected, signing out");
            self.clear_tokens();
            self.transition(SessionState::Anonymous);
            return Ok(None);
        }

        self.transition(SessionState::Anonymous);
        Err(response.into_error("Failed to load account"))
    }

    /// Forget the credential and the user. No network call is made.
    pub fn logout(&self) {
        self.clear_tokens();
        self.transition(SessionState::Anonymous);
        tracing::info!("logged out");
    }

    // =========================================================================
    // Authorized requests
    // =========================================================================

    /// Exchange the stored refresh token for a new token pair.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::SessionExpired` if no refresh token is stored or
    /// the backend rejects it.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<TokenPair> {
        let _guard = self.inner.refresh_lock.lock().await;
        let tokens = self
            .inner
            .store
            .read()?
            .ok_or(ClientError::SessionExpired)?;
        self.exchange_refresh_token(&tokens).await
    }

    async fn exchange_refresh_token(&self, tokens: &TokenPair) -> Result<TokenPair> {
        let refresh = tokens.refresh.as_ref().ok_or(ClientError::SessionExpired)?;
        let request = ApiRequest::post("auth/refresh")
            .query([("refresh_token", refresh.expose().to_owned())]);
        let response = self.inner.api.send(&request, None).await?;
        if !response.is_success() {
            tracing::info!(status = %response.status(), "refresh token rejected");
            return Err(ClientError::SessionExpired);
        }

        let renewed = TokenPair::from(response.json::<TokenGrant>()?);
        self.inner.store.save(&renewed)?;
        tracing::info!("access token refreshed");
        Ok(renewed)
    }

    /// Refresh after `failed` was answered with 401, unless a concurrent
    /// caller already replaced it.
    async fn renew_after_unauthorized(&self, failed: &TokenPair) -> Result<TokenPair> {
        let _guard = self.inner.refresh_lock.lock().await;
        let current = self
            .inner
            .store
            .read()?
            .ok_or(ClientError::SessionExpired)?;
        if current.access.expose() != failed.access.expose() {
            return Ok(current);
        }
        self.exchange_refresh_token(&current).await
    }

    /// Send `request` with the stored bearer token.
    ///
    /// On 401 the refresh token is tried once (when enabled) and the request
    /// replayed. If that is impossible or the replay is also rejected, the
    /// session is logged out.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotAuthenticated` without a network call while
    /// anonymous, `ClientError::SessionExpired` after an unrecoverable 401,
    /// and `ClientError::Network` on transport failures. Other statuses are
    /// returned as `Ok` for the caller to interpret.
    pub async fn send_authorized(&self, request: &ApiRequest) -> Result<ApiResponse> {
        if !self.is_authenticated() {
            return Err(ClientError::NotAuthenticated);
        }
        let Some(tokens) = self.inner.store.read()? else {
            tracing::warn!("session was authenticated but no credential is stored");
            self.logout();
            return Err(ClientError::SessionExpired);
        };

        let response = self.inner.api.send(request, Some(&tokens.access)).await?;
        if !response.is_unauthorized() {
            return Ok(response);
        }

        if self.inner.refresh_on_unauthorized && tokens.refresh.is_some() {
            match self.renew_after_unauthorized(&tokens).await {
                Ok(renewed) => {
                    let replay = self.inner.api.send(request, Some(&renewed.access)).await?;
                    if !replay.is_unauthorized() {
                        return Ok(replay);
                    }
                }
                Err(e) => tracing::debug!(error = %e, "token refresh failed"),
            }
        }

        tracing::warn!(path = request.path(), "session expired");
        self.logout();
        Err(ClientError::SessionExpired)
    }

    // =========================================================================
    // Account management
    // =========================================================================

    /// Change username and/or email.
    ///
    /// An empty update returns the current user without a request.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` when the server rejects the change
    /// (for example "Email already registered").
    #[instrument(skip(self, update))]
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User> {
        let current = self.current_user().ok_or(ClientError::NotAuthenticated)?;
        if update.is_empty() {
            return Ok(current);
        }

        let request = ApiRequest::put("auth/profile").json(update)?;
        let response = self.send_authorized(&request).await?;
        if !response.is_success() {
            return Err(response.into_error("Failed to update profile"));
        }

        let user: User = response.json()?;
        self.transition(SessionState::Authenticated(user.clone()));
        Ok(user)
    }

    /// Change the account password.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InvalidInput` if `new_password` and `confirmation`
    /// differ (checked before any request) and `ClientError::Validation` if
    /// the server rejects the current password.
    #[instrument(skip_all)]
    pub async fn change_password(
        &self,
        current_password: &SecretString,
        new_password: &SecretString,
        confirmation: &SecretString,
    ) -> Result<()> {
        if !self.is_authenticated() {
            return Err(ClientError::NotAuthenticated);
        }
        if new_password.expose_secret() != confirmation.expose_secret() {
            return Err(ClientError::InvalidInput(
                "new passwords don't match".to_string(),
            ));
        }
        if new_password.expose_secret().is_empty() {
            return Err(ClientError::InvalidInput(
                "new password cannot be empty".to_string(),
            ));
        }

        let request = ApiRequest::put("auth/password").json(&PasswordChange {
            current_password: current_password.expose_secret(),
            new_password: new_password.expose_secret(),
        })?;
        let response = self.send_authorized(&request).await?;
        if !response.is_success() {
            return Err(response.into_error("Failed to update password"));
        }
        tracing::info!("password changed");
        Ok(())
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &*self.inner.state.borrow())
            .field("refresh_on_unauthorized", &self.inner.refresh_on_unauthorized)
            .finish_non_exhaustive()
    }
}

const fn state_name(state: &SessionState) -> &'static str {
    match state {
        SessionState::Loading => "loading",
        SessionState::Anonymous => "anonymous",
        SessionState::Authenticated(_) => "authenticated",
    }
}
