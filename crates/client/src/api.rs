//! HTTP transport for the storefront REST backend.
//!
//! [`ApiClient`] is the only type in the crate that touches the network. It
//! sends an [`ApiRequest`], optionally with a bearer token, and hands back the
//! raw status and body as an [`ApiResponse`]; deciding what a 401 or a 400
//! means is left to the session, cart and checkout components.

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use storefront_core::AccessToken;
use tracing::instrument;
use url::Url;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// Header carrying a per-request correlation ID.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Client for the storefront backend.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    client: reqwest::Client,
    base_url: Url,
}

/// A request to be sent (and possibly replayed after a token refresh).
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(&'static str, String)>,
    body: Option<serde_json::Value>,
}

/// Status and body of a completed exchange.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    body: String,
}

impl ApiClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Network` if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("storefront-client/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            inner: Arc::new(ApiClientInner {
                client,
                base_url: config.api_url.clone(),
            }),
        })
    }

    /// Backend base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Send `request`, attaching `Authorization: Bearer <token>` when given.
    ///
    /// Any HTTP status is returned as `Ok`; only transport failures are errors.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Network` on connection failures or timeouts, and
    /// `ClientError::InvalidUrl` if the path cannot be joined to the base URL.
    #[instrument(
        skip(self, request, bearer),
        fields(method = %request.method, path = %request.path, request_id = tracing::field::Empty)
    )]
    pub async fn send(
        &self,
        request: &ApiRequest,
        bearer: Option<&AccessToken>,
    ) -> Result<ApiResponse> {
        let url = self.inner.base_url.join(&request.path)?;
        let request_id = uuid::Uuid::new_v4().to_string();
        tracing::Span::current().record("request_id", request_id.as_str());

        let mut builder = self
            .inner
            .client
            .request(request.method.clone(), url)
            .header(REQUEST_ID_HEADER, &request_id);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token.expose());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.inspect_err(|e| {
            tracing::warn!(error = %e, "request failed before a response arrived");
        })?;
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            tracing::debug!(%status, "backend responded");
        } else {
            tracing::info!(%status, "backend rejected request");
        }

        Ok(ApiResponse { status, body })
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.base_url.as_str())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Requests
// =============================================================================

impl ApiRequest {
    fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into().trim_start_matches('/').to_owned(),
            query: Vec::new(),
            body: None,
        }
    }

    /// `GET path`.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// `POST path`.
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// `PUT path`.
    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// `DELETE path`.
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Decode` if `body` cannot be serialized.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Append query-string pairs.
    #[must_use]
    pub fn query(mut self, pairs: impl IntoIterator<Item = (&'static str, String)>) -> Self {
        self.query.extend(pairs);
        self
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Path relative to the base URL.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

// =============================================================================
// Responses
// =============================================================================

impl ApiResponse {
    /// HTTP status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// 2xx status.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// 401 status.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED
    }

    /// Decode the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Decode` if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Server-provided explanation of a failure, if the body carries one.
    ///
    /// Understands `{"detail": "..."}`, validation lists of the form
    /// `{"detail": [{"msg": "..."}]}` and `{"message": "..."}`.
    #[must_use]
    pub fn detail(&self) -> Option<String> {
        let value: serde_json::Value = serde_json::from_str(&self.body).ok()?;
        let detail = value.get("detail").or_else(|| value.get("message"))?;
        match detail {
            serde_json::Value::String(message) => Some(message.clone()),
            serde_json::Value::Array(entries) => {
                let messages: Vec<&str> = entries
                    .iter()
                    .filter_map(|entry| entry.get("msg").and_then(serde_json::Value::as_str))
                    .collect();
                (!messages.is_empty()).then(|| messages.join("; "))
            }
            _ => None,
        }
    }

    /// [`detail`](Self::detail), or `fallback` when the body has none.
    #[must_use]
    pub fn detail_or(&self, fallback: &str) -> String {
        self.detail().unwrap_or_else(|| fallback.to_owned())
    }

    /// Map a non-success response to the generic error for its status.
    #[must_use]
    pub fn into_error(self, fallback: &str) -> ClientError {
        let detail = self.detail_or(fallback);
        match self.status {
            StatusCode::UNAUTHORIZED => ClientError::SessionExpired,
            StatusCode::FORBIDDEN => ClientError::Forbidden(detail),
            StatusCode::NOT_FOUND => ClientError::NotFound(detail),
            status => ClientError::Validation { status, detail },
        }
    }
}

#[cfg(test)]
impl ApiResponse {
    pub(crate) fn for_test(status: StatusCode, body: &str) -> Self {
        Self {
            status,
            body: body.to_owned(),
        }
    }
}
