//! # Identity Verification
//!
//! The tracker never issues credentials of its own. Clients present a
//! bearer token minted by an external identity provider, and the only
//! thing this module does with it is ask that provider "whose token is
//! this?". The answer, a [`UserId`], is the sole key into the record
//! store.
//!
//! The provider is abstracted behind the [`IdentityVerifier`] trait so
//! the sync service can be exercised in tests without a network. The
//! production implementation, [`HttpIdentityVerifier`], calls the
//! provider's user endpoint over HTTPS.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config;

// ---------------------------------------------------------------------------
// UserId
// ---------------------------------------------------------------------------

/// Opaque identifier for an authenticated user.
///
/// The identity provider issues UUID subjects, so this wraps one. It is
/// deliberately not constructible from arbitrary strings in normal flow:
/// the only way to obtain a `UserId` at runtime is through a successful
/// [`IdentityVerifier::verify`] call.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    /// Wraps an existing UUID. Intended for stores and tests; request
    /// handling should always go through a verifier.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Returns the 16 raw bytes of the identifier, used as the record
    /// store key.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while verifying a bearer token.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The provider examined the token and rejected it.
    #[error("invalid user")]
    InvalidToken,

    /// The provider could not be reached or answered with a transport
    /// level failure.
    #[error("identity provider unreachable: {0}")]
    Transport(String),

    /// The provider answered, but the response body was not in the
    /// expected shape.
    #[error("malformed identity response: {0}")]
    MalformedResponse(String),
}

// ---------------------------------------------------------------------------
// IdentityVerifier
// ---------------------------------------------------------------------------

/// Opaque "verify token, get user id" collaborator.
///
/// Implementations must be cheap to call repeatedly; the sync service
/// invokes this once per request with no caching of its own.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Resolves a bearer token to the user it belongs to.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidToken`] when the provider rejects the
    /// token, and a transport/shape error when the provider itself
    /// misbehaves.
    async fn verify(&self, token: &str) -> Result<UserId, AuthError>;
}

// ---------------------------------------------------------------------------
// HttpIdentityVerifier
// ---------------------------------------------------------------------------

/// Shape of the identity provider's user endpoint response. Only the
/// subject id is read; everything else in the body is ignored.
#[derive(Debug, Deserialize)]
struct UserEndpointResponse {
    id: Uuid,
}

/// Verifier that calls the identity provider's `/user` endpoint over
/// HTTP, forwarding the client's bearer token unchanged.
pub struct HttpIdentityVerifier {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpIdentityVerifier {
    /// Builds a verifier for the given provider base URL.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying HTTP client cannot be
    /// constructed.
    pub fn new(base_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config::IDENTITY_REQUEST_TIMEOUT)
            .build()?;

        let base = base_url.into();
        Ok(Self {
            endpoint: format!("{}/user", base.trim_end_matches('/')),
            client,
        })
    }

    fn parse_user(body: &[u8]) -> Result<UserId, AuthError> {
        let parsed: UserEndpointResponse = serde_json::from_slice(body)
            .map_err(|e| AuthError::MalformedResponse(e.to_string()))?;
        Ok(UserId::from_uuid(parsed.id))
    }
}

#[async_trait]
impl IdentityVerifier for HttpIdentityVerifier {
    async fn verify(&self, token: &str) -> Result<UserId, AuthError> {
        let response = self
            .client
            .get(&self.endpoint)
            .header(reqwest::header::AUTHORIZATION, token)
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(AuthError::InvalidToken);
        }
        if !status.is_success() {
            return Err(AuthError::Transport(format!(
                "identity endpoint returned {}",
                status
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;
        Self::parse_user(&body)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_display_matches_uuid() {
        let raw = Uuid::new_v4();
        let id = UserId::from_uuid(raw);
        assert_eq!(id.to_string(), raw.to_string());
    }

    #[test]
    fn user_id_serializes_transparently() {
        let raw = Uuid::new_v4();
        let id = UserId::from_uuid(raw);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", raw));

        let recovered: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(recovered, id);
    }

    #[test]
    fn parse_user_accepts_extra_fields() {
        let raw = Uuid::new_v4();
        let body = format!(
            "{{\"id\":\"{}\",\"email\":\"scholar@example.com\",\"role\":\"authenticated\"}}",
            raw
        );
        let id = HttpIdentityVerifier::parse_user(body.as_bytes()).unwrap();
        assert_eq!(id, UserId::from_uuid(raw));
    }

    #[test]
    fn parse_user_rejects_missing_id() {
        let err = HttpIdentityVerifier::parse_user(b"{\"email\":\"x@example.com\"}").unwrap_err();
        assert!(matches!(err, AuthError::MalformedResponse(_)));
    }

    #[test]
    fn parse_user_rejects_non_uuid_id() {
        let err = HttpIdentityVerifier::parse_user(b"{\"id\":\"not-a-uuid\"}").unwrap_err();
        assert!(matches!(err, AuthError::MalformedResponse(_)));
    }

    #[test]
    fn verifier_endpoint_strips_trailing_slash() {
        let v = HttpIdentityVerifier::new("https://auth.example.com/").unwrap();
        assert_eq!(v.endpoint, "https://auth.example.com/user");
    }
}
