//! Shared fixtures for unit tests: a scripted `AuthApi` and token builders.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use crate::auth::AuthContext;
use crate::net::api::{ApiError, AuthApi};
use crate::net::types::{RegisterOutcome, Registration, User};
use crate::session::{MemorySessionStore, Role, Session, SessionStore};

/// Unsigned token whose payload carries the issuer's claim names.
#[must_use]
pub fn make_token(user_id: i64, role: Role) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = serde_json::json!({ "user_id": user_id, "user_role": role.as_str(), "exp": 4_102_444_800_i64 });
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{header}.{body}.sig")
}

pub fn status_err(status: u16) -> ApiError {
    ApiError::Status { status, message: None }
}

/// Scripted backend. Each field is the answer for the matching call.
pub struct MockApi {
    pub login: Mutex<Result<String, ApiError>>,
    pub refresh: Mutex<Result<String, ApiError>>,
    /// Status answered by role checks; 200 grants.
    pub role_status: Mutex<u16>,
    pub role_delay: Duration,
    pub refresh_delay: Duration,
    pub register_status: u16,
    pub user: Option<User>,
    pub login_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub role_calls: AtomicUsize,
    pub register_calls: AtomicUsize,
    pub seen_tokens: Mutex<Vec<String>>,
}

impl Default for MockApi {
    fn default() -> Self {
        Self {
            login: Mutex::new(Err(status_err(401))),
            refresh: Mutex::new(Err(status_err(401))),
            role_status: Mutex::new(200),
            role_delay: Duration::ZERO,
            refresh_delay: Duration::ZERO,
            register_status: 201,
            user: None,
            login_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            role_calls: AtomicUsize::new(0),
            register_calls: AtomicUsize::new(0),
            seen_tokens: Mutex::new(Vec::new()),
        }
    }
}

impl MockApi {
    pub fn granting(status: u16) -> Self {
        Self { role_status: Mutex::new(status), ..Self::default() }
    }

    pub fn set_role_status(&self, status: u16) {
        *self.role_status.lock().unwrap() = status;
    }

    pub fn role_calls(&self) -> usize {
        self.role_calls.load(Ordering::SeqCst)
    }

    fn take(slot: &Mutex<Result<String, ApiError>>) -> Result<String, ApiError> {
        match &*slot.lock().unwrap() {
            Ok(token) => Ok(token.clone()),
            Err(ApiError::Status { status, message }) => Err(ApiError::Status { status: *status, message: message.clone() }),
            Err(other) => Err(ApiError::Decode(other.to_string())),
        }
    }
}

#[async_trait::async_trait]
impl AuthApi for MockApi {
    async fn login(&self, _email: &str, _password: &str) -> Result<String, ApiError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        Self::take(&self.login)
    }

    async fn refresh(&self, token: &str) -> Result<String, ApiError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.seen_tokens.lock().unwrap().push(token.to_owned());
        if !self.refresh_delay.is_zero() {
            tokio::time::sleep(self.refresh_delay).await;
        }
        Self::take(&self.refresh)
    }

    async fn check_role(&self, token: &str, _role: Role) -> Result<(), ApiError> {
        self.role_calls.fetch_add(1, Ordering::SeqCst);
        self.seen_tokens.lock().unwrap().push(token.to_owned());
        if !self.role_delay.is_zero() {
            tokio::time::sleep(self.role_delay).await;
        }
        let status = *self.role_status.lock().unwrap();
        if (200..300).contains(&status) { Ok(()) } else { Err(status_err(status)) }
    }

    async fn fetch_user(&self, _token: &str, user_id: i64) -> Result<User, ApiError> {
        self.user.clone().filter(|u| u.id == user_id).ok_or_else(|| status_err(404))
    }

    async fn register(&self, _registration: &Registration) -> Result<RegisterOutcome, ApiError> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        Ok(RegisterOutcome::from_status(self.register_status))
    }
}

/// Context over an in-memory store, optionally pre-seeded with a session.
pub fn context(api: MockApi, session: Option<Session>) -> (Arc<AuthContext>, Arc<MemorySessionStore>, Arc<MockApi>) {
    let store = Arc::new(MemorySessionStore::new());
    if let Some(session) = session {
        store.set(&session).unwrap();
    }
    let api = Arc::new(api);
    let auth = Arc::new(AuthContext::new(store.clone(), api.clone()));
    (auth, store, api)
}
