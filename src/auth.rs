//! Shared authority for who the current user is and whether their session
//! still holds.
//!
//! SYSTEM CONTEXT
//! ==============
//! Built once at startup and handed to route guards and commands as an
//! `Arc<AuthContext>`. All session reads go through the injected
//! [`SessionStore`]; this type never keeps a private copy.
//!
//! TRUST MODEL
//! ===========
//! Locally decoded role claims are used for UI branching only
//! ([`AuthContext::role`], [`AuthContext::has_role`]). Authorization answers
//! come from [`AuthContext::is_authenticated`], which re-validates with the
//! server on every call and is never cached.
//!
//! ERROR HANDLING
//! ==============
//! Validation and refresh failures are logged and folded into `false` /
//! logged-out outcomes. A 401 means the credential is dead and clears the
//! session. A 403 or a network failure answers `false` but keeps the session.
//!
//! STALE RESPONSES
//! ===============
//! Any write that follows a server round trip goes through
//! [`SessionStore::replace_if`] keyed on the token that was sent. A logout or
//! a newer login that lands while the request is in flight wins; the late
//! answer is dropped.

#[cfg(test)]
#[path = "auth_test.rs"]
mod auth_test;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::net::api::{ApiError, AuthApi};
use crate::net::types::{RegisterOutcome, Registration, User};
use crate::session::{Role, Session, SessionError, SessionStore};
use crate::token::{self, TokenError};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("email and password are required")]
    MissingCredentials,
    #[error("not logged in")]
    NotLoggedIn,
    #[error("session has no user id")]
    MissingUserId,
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("issued token is unusable: {0}")]
    Token(#[from] TokenError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// What the mount-time refresh did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// No token stored, or a refresh was already attempted.
    Skipped,
    /// Session replaced with the newly issued token.
    Refreshed,
    /// Refresh failed; the session was cleared.
    LoggedOut,
    /// The session changed while the refresh was in flight and was left alone.
    Superseded,
}

pub struct AuthContext {
    store: Arc<dyn SessionStore>,
    api: Arc<dyn AuthApi>,
    refresh_attempted: AtomicBool,
}

impl AuthContext {
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, api: Arc<dyn AuthApi>) -> Self {
        Self { store, api, refresh_attempted: AtomicBool::new(false) }
    }

    /// Current session as held by the store.
    #[must_use]
    pub fn session(&self) -> Session {
        self.store.get()
    }

    /// Client-held role, for UI branching only.
    #[must_use]
    pub fn role(&self) -> Option<Role> {
        self.store.get().role()
    }

    /// Compare the client-held role. Never use for authorization.
    #[must_use]
    pub fn has_role(&self, role: Role) -> bool {
        self.role() == Some(role)
    }

    /// Record a session the caller has already validated with the server.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Session`] if the store cannot persist it.
    pub fn login(&self, token: &str, user_id: Option<i64>, role: Option<Role>) -> Result<(), AuthError> {
        self.store.set(&Session::new(token, user_id, role))?;
        info!(?user_id, ?role, "session stored");
        Ok(())
    }

    /// Drop the current session.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Session`] if the store cannot persist the cleared record.
    pub fn logout(&self) -> Result<(), AuthError> {
        self.store.clear()?;
        info!("session cleared");
        Ok(())
    }

    /// Exchange credentials for a token and store the resulting session.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] if the credentials are blank, the server
    /// rejects them, the issued token cannot be decoded, or the store fails.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        let token = self.api.login(email, password).await?;
        let claims = token::decode_claims(&token)?;
        self.login(&token, claims.user_id, claims.role())?;
        Ok(self.store.get())
    }

    /// Ask the server whether the stored token carries `required`.
    ///
    /// Returns `false` without a request when no token is stored. Every call
    /// goes to the server.
    pub async fn is_authenticated(&self, required: Role) -> bool {
        let session = self.store.get();
        if !session.is_authenticated() {
            return false;
        }
        match self.api.check_role(&session.token, required).await {
            Ok(()) => true,
            Err(e) if e.is_unauthorized() => {
                warn!(%required, error = %e, "token rejected; clearing session");
                self.invalidate(&session.token);
                false
            }
            Err(e) => {
                warn!(%required, error = %e, "role check failed");
                false
            }
        }
    }

    /// Mount-time token refresh, attempted at most once per context.
    pub async fn refresh_on_mount(&self) -> RefreshOutcome {
        let session = self.store.get();
        if !session.is_authenticated() {
            return RefreshOutcome::Skipped;
        }
        if self.refresh_attempted.swap(true, Ordering::SeqCst) {
            return RefreshOutcome::Skipped;
        }

        let token = match self.api.refresh(&session.token).await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "token refresh failed; logging out");
                return self.invalidate(&session.token);
            }
        };
        let claims = match token::decode_claims(&token) {
            Ok(claims) => claims,
            Err(e) => {
                warn!(error = %e, "refreshed token undecodable; logging out");
                return self.invalidate(&session.token);
            }
        };
        let next = Session::new(token, claims.user_id, claims.role());
        match self.store.replace_if(&session.token, &next) {
            Ok(true) => {
                info!(user_id = ?next.user_id, role = ?next.role, "session refreshed");
                RefreshOutcome::Refreshed
            }
            Ok(false) => {
                debug!("session changed during refresh; discarding issued token");
                RefreshOutcome::Superseded
            }
            Err(e) => {
                warn!(error = %e, "refreshed session not persisted; logging out");
                self.invalidate(&session.token)
            }
        }
    }

    /// Profile of the logged-in user.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] when logged out, when the session has no user
    /// id, or when the request fails.
    pub async fn fetch_profile(&self) -> Result<User, AuthError> {
        let session = self.store.get();
        if !session.is_authenticated() {
            return Err(AuthError::NotLoggedIn);
        }
        let user_id = session.user_id().ok_or(AuthError::MissingUserId)?;
        Ok(self.api.fetch_user(&session.token, user_id).await?)
    }

    /// Submit a registration. Not retried whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Api`] only when the request could not be made.
    pub async fn register(&self, registration: &Registration) -> Result<RegisterOutcome, AuthError> {
        let outcome = self.api.register(registration).await?;
        if !outcome.is_success() {
            warn!(?outcome, "registration rejected");
        }
        Ok(outcome)
    }

    /// Clear the session if it still holds `checked`.
    fn invalidate(&self, checked: &str) -> RefreshOutcome {
        match self.store.replace_if(checked, &Session::default()) {
            Ok(true) => RefreshOutcome::LoggedOut,
            Ok(false) => {
                debug!("session changed while request was in flight; keeping it");
                RefreshOutcome::Superseded
            }
            Err(e) => {
                warn!(error = %e, "failed to clear session");
                RefreshOutcome::LoggedOut
            }
        }
    }
}
