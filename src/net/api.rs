//! REST client for the backend auth and user endpoints.
//!
//! ERROR HANDLING
//! ==============
//! Transport failures and non-success statuses come back as distinct
//! [`ApiError`] variants. Deciding what a failure means for the session is
//! left to `AuthContext`; this layer only reports what the server said.

#[cfg(test)]
#[path = "api_test.rs"]
mod api_test;

use std::time::Duration;

use reqwest::StatusCode;
use tracing::debug;

use super::types::{Envelope, RegisterOutcome, Registration, User};
use crate::session::Role;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {}", .message.as_deref().unwrap_or("no detail"))]
    Status { status: u16, message: Option<String> },
    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl ApiError {
    /// HTTP status for server-side rejections.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when the server rejected the credential itself.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED.as_u16())
    }
}

pub(crate) fn role_check_endpoint(role: Role) -> &'static str {
    match role {
        Role::Administrator => "/auth/admin",
        Role::User => "/auth/user",
    }
}

pub(crate) fn user_endpoint(user_id: i64) -> String {
    format!("/user/{user_id}")
}

/// Backend operations the auth layer depends on. Enables mocking in tests.
#[async_trait::async_trait]
pub trait AuthApi: Send + Sync {
    /// `POST /auth/login`; returns the issued token.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] on transport failure, a non-success status, or
    /// a response without `data.user_token`.
    async fn login(&self, email: &str, password: &str) -> Result<String, ApiError>;

    /// `GET /auth/refresh`; returns a freshly issued token.
    ///
    /// # Errors
    ///
    /// Same as [`AuthApi::login`].
    async fn refresh(&self, token: &str) -> Result<String, ApiError>;

    /// `GET /auth/admin` or `GET /auth/user`; `Ok` only on a success status.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] on transport failure or a non-success status.
    async fn check_role(&self, token: &str, role: Role) -> Result<(), ApiError>;

    /// `GET /user/{id}`.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] on transport failure, a non-success status, or
    /// a body without `data.user`.
    async fn fetch_user(&self, token: &str, user_id: i64) -> Result<User, ApiError>;

    /// `POST /user/register`. Every HTTP status is an outcome, not an error.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] only on transport failure.
    async fn register(&self, registration: &Registration) -> Result<RegisterOutcome, ApiError>;
}

/// [`AuthApi`] over HTTP with `reqwest`.
#[derive(Clone, Debug)]
pub struct HttpAuthApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAuthApi {
    /// Build a client rooted at `base_url` (e.g. `"http://127.0.0.1:5000/api"`).
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] if the underlying HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_owned() })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn envelope(resp: reqwest::Response) -> Result<Envelope, ApiError> {
        let status = resp.status();
        let body = resp.text().await?;
        let envelope = if body.trim().is_empty() {
            Envelope::default()
        } else {
            serde_json::from_str::<Envelope>(&body).map_err(|e| {
                if status.is_success() {
                    ApiError::Decode(e.to_string())
                } else {
                    ApiError::Status { status: status.as_u16(), message: None }
                }
            })?
        };
        if !status.is_success() {
            return Err(ApiError::Status { status: status.as_u16(), message: envelope.error_detail() });
        }
        Ok(envelope)
    }

    fn token_from(envelope: &Envelope) -> Result<String, ApiError> {
        envelope
            .data_str("user_token")
            .filter(|t| !t.is_empty())
            .map(str::to_owned)
            .ok_or_else(|| ApiError::Decode("missing data.user_token".to_owned()))
    }
}

#[async_trait::async_trait]
impl AuthApi for HttpAuthApi {
    async fn login(&self, email: &str, password: &str) -> Result<String, ApiError> {
        let resp = self
            .client
            .post(self.url("/auth/login"))
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;
        let envelope = Self::envelope(resp).await?;
        Self::token_from(&envelope)
    }

    async fn refresh(&self, token: &str) -> Result<String, ApiError> {
        let resp = self.client.get(self.url("/auth/refresh")).bearer_auth(token).send().await?;
        let envelope = Self::envelope(resp).await?;
        Self::token_from(&envelope)
    }

    async fn check_role(&self, token: &str, role: Role) -> Result<(), ApiError> {
        let endpoint = role_check_endpoint(role);
        let resp = self.client.get(self.url(endpoint)).bearer_auth(token).send().await?;
        let status = resp.status();
        debug!(%role, status = status.as_u16(), "role check answered");
        if status.is_success() {
            return Ok(());
        }
        let message = resp
            .json::<Envelope>()
            .await
            .ok()
            .and_then(|env| env.error_detail());
        Err(ApiError::Status { status: status.as_u16(), message })
    }

    async fn fetch_user(&self, token: &str, user_id: i64) -> Result<User, ApiError> {
        let resp = self
            .client
            .get(self.url(&user_endpoint(user_id)))
            .bearer_auth(token)
            .send()
            .await?;
        let envelope = Self::envelope(resp).await?;
        let user = envelope
            .data
            .and_then(|mut data| data.get_mut("user").map(serde_json::Value::take))
            .ok_or_else(|| ApiError::Decode("missing data.user".to_owned()))?;
        serde_json::from_value(user).map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn register(&self, registration: &Registration) -> Result<RegisterOutcome, ApiError> {
        let resp = self.client.post(self.url("/user/register")).json(registration).send().await?;
        Ok(RegisterOutcome::from_status(resp.status().as_u16()))
    }
}
