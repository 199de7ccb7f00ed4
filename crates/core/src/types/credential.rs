//! Bearer credential types.
//!
//! Tokens are wrapped in [`SecretString`] so they are redacted from `Debug`
//! output and never end up in logs by accident. Code that needs the raw value
//! (the `Authorization` header, the token file) calls `expose()` explicitly.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};

/// Access token presented as `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct AccessToken(SecretString);

/// Refresh token exchanged for a new [`TokenPair`] once the access token expires.
#[derive(Debug, Clone)]
pub struct RefreshToken(SecretString);

/// The credential pair handed out by the token-exchange endpoint.
#[derive(Debug, Clone)]
pub struct TokenPair {
    /// Short-lived bearer token.
    pub access: AccessToken,
    /// Longer-lived token for obtaining a new pair.
    pub refresh: Option<RefreshToken>,
}

impl AccessToken {
    /// Wrap a raw token string. No validation of its structure is performed.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    /// Expose the raw token string.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// Expiry time read from the token's `exp` claim, if it is a JWT.
    ///
    /// The signature is not checked; this is only a hint for refreshing
    /// before the server starts answering 401.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let payload = self.expose().split('.').nth(1)?;
        let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
        let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
        DateTime::from_timestamp(claims.get("exp")?.as_i64()?, 0)
    }

    /// Whether the token is known to have expired at `now`.
    ///
    /// Opaque (non-JWT) tokens are never considered expired.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|exp| now >= exp)
    }
}

impl RefreshToken {
    /// Wrap a raw refresh token string.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    /// Expose the raw token string.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl TokenPair {
    /// Create a pair from raw token strings.
    #[must_use]
    pub fn new(access: impl Into<String>, refresh: Option<String>) -> Self {
        Self {
            access: AccessToken::new(access),
            refresh: refresh.map(RefreshToken::new),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn jwt_with_exp(exp: i64) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let claims = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"a@b.com","exp":{exp}}}"#));
        format!("{header}.{claims}.signature")
    }

    #[test]
    fn test_debug_redacts_token() {
        let pair = TokenPair::new("super-secret-access", Some("super-secret-refresh".into()));
        let debug = format!("{pair:?}");
        assert!(!debug.contains("super-secret-access"));
        assert!(!debug.contains("super-secret-refresh"));
    }

    #[test]
    fn test_expires_at_reads_exp_claim() {
        let token = AccessToken::new(jwt_with_exp(1_700_000_000));
        assert_eq!(token.expires_at().unwrap().timestamp(), 1_700_000_000);

        let before = DateTime::from_timestamp(1_699_999_999, 0).unwrap();
        let after = DateTime::from_timestamp(1_700_000_001, 0).unwrap();
        assert!(!token.is_expired_at(before));
        assert!(token.is_expired_at(after));
    }

    #[test]
    fn test_opaque_token_never_expires() {
        let token = AccessToken::new("opaque-token");
        assert!(token.expires_at().is_none());
        assert!(!token.is_expired_at(Utc::now()));
    }
}
