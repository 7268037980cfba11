//! Bearer token claim decoding.
//!
//! Reads the payload segment of a `header.payload.signature` token without
//! verifying the signature. Decoded claims drive UI branching only; the
//! backend remains the authority on what a token may access.

#[cfg(test)]
#[path = "token_test.rs"]
mod token_test;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::session::Role;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token is empty")]
    Empty,
    #[error("token has {segments} segments, expected 3")]
    Malformed { segments: usize },
    #[error("token payload is not base64url: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("token payload is not a JSON claims object: {0}")]
    Json(#[from] serde_json::Error),
}

/// Claims carried in a token payload.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub user_id: Option<i64>,
    /// Raw role claim; see [`Claims::role`] for the typed view.
    #[serde(default, rename = "user_role", alias = "role")]
    pub role_name: Option<String>,
    /// Expiry as unix seconds.
    #[serde(default)]
    pub exp: Option<i64>,
    /// Any other issuer-defined fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    /// Typed role, or `None` when absent or not a role this client knows.
    #[must_use]
    pub fn role(&self) -> Option<Role> {
        self.role_name.as_deref().and_then(|name| name.parse().ok())
    }

    /// True when `exp` is present and not after `now_unix`.
    #[must_use]
    pub fn is_expired(&self, now_unix: i64) -> bool {
        self.exp.is_some_and(|exp| exp <= now_unix)
    }
}

/// Decode the claims of a three-segment bearer token.
///
/// # Errors
///
/// Returns a [`TokenError`] if the token is empty, does not have exactly three
/// dot-separated segments, or its payload is not base64url-encoded JSON.
pub fn decode_claims(token: &str) -> Result<Claims, TokenError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(TokenError::Empty);
    }
    let segments: Vec<&str> = token.split('.').collect();
    let [_, payload, _] = segments.as_slice() else {
        return Err(TokenError::Malformed { segments: segments.len() });
    };
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
    Ok(serde_json::from_slice(&bytes)?)
}
