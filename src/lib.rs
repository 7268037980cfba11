//! Client-side session and role-gating for the portal web API.
//!
//! ARCHITECTURE
//! ============
//! `token` decodes claims, `session` owns the persisted session, `auth`
//! validates it against the backend through `net`, `guard` gates routes on
//! a role and reports denials through `alert`.

pub mod alert;
pub mod auth;
pub mod config;
pub mod guard;
pub mod net;
pub mod session;
pub mod token;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use alert::{Alert, AlertService, LogNavigator, Navigator, Severity};
pub use auth::{AuthContext, AuthError, RefreshOutcome};
pub use config::Config;
pub use guard::{GuardConfig, GuardStatus, RouteGuard, UnauthorizedAlert};
pub use net::api::{ApiError, AuthApi, HttpAuthApi};
pub use net::types::{RegisterOutcome, Registration, User};
pub use session::{FileSessionStore, MemorySessionStore, Role, Session, SessionError, SessionStore};
pub use token::{Claims, TokenError, decode_claims};
