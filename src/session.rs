//! Session record and the durable store that owns it.
//!
//! DESIGN
//! ======
//! The store is the single owner of the current `Session`. Consumers hold an
//! `Arc<dyn SessionStore>` handle and read through `get()` every time instead
//! of caching a private copy, so a `set`/`clear` from any code path is visible
//! to the next read, including after a process restart for the file store.
//!
//! TRADE-OFFS
//! ==========
//! Concurrent writers from separate processes are last-write-wins. Writes go
//! through a temp file + rename so a reader never observes a torn record.

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::warn;

// =============================================================================
// ROLE
// =============================================================================

/// Closed set of roles the backend issues.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Administrator,
    User,
}

impl Role {
    /// Wire name used in tokens and the persisted session.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Administrator => "Administrator",
            Self::User => "User",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown role `{0}`")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "administrator" | "admin" => Ok(Self::Administrator),
            "user" => Ok(Self::User),
            _ => Err(UnknownRole(s.to_owned())),
        }
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// Client-held record of the current user's credential and identity.
///
/// An empty `token` means logged out, whatever the other fields say.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub role: Option<Role>,
}

impl Session {
    #[must_use]
    pub fn new(token: impl Into<String>, user_id: Option<i64>, role: Option<Role>) -> Self {
        Self { token: token.into(), user_id, role }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        !self.token.is_empty()
    }

    /// Stored role, or `None` when logged out.
    #[must_use]
    pub fn role(&self) -> Option<Role> {
        if self.is_authenticated() { self.role } else { None }
    }

    /// Stored user id, or `None` when logged out.
    #[must_use]
    pub fn user_id(&self) -> Option<i64> {
        if self.is_authenticated() { self.user_id } else { None }
    }
}

// =============================================================================
// STORE
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session storage io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("session serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Owner of the persisted `Session`.
pub trait SessionStore: Send + Sync {
    /// Current session; empty when nothing usable is stored.
    fn get(&self) -> Session;

    /// Replace the stored session wholesale.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] if the record cannot be persisted.
    fn set(&self, session: &Session) -> Result<(), SessionError>;

    /// Replace the stored session only while its token is still `expected`.
    ///
    /// Returns `Ok(false)` and leaves the store untouched when another write
    /// got there first. The compare and the write happen under one lock.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] if the record cannot be persisted.
    fn replace_if(&self, expected: &str, next: &Session) -> Result<bool, SessionError>;

    /// Replace the stored session with an empty one.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] if the record cannot be persisted.
    fn clear(&self) -> Result<(), SessionError> {
        self.set(&Session::default())
    }
}

/// Session persisted as a JSON document on disk.
pub struct FileSessionStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileSessionStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()) }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_else(|| "session".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Caller holds `write_lock`.
    fn write(&self, session: &Session) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_vec_pretty(session)?;
        let tmp = self.temp_path();
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self) -> Session {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Session::default(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "session read failed; treating as logged out");
                return Session::default();
            }
        };
        match serde_json::from_slice::<Session>(&raw) {
            Ok(session) => session,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "session record unreadable; treating as logged out");
                Session::default()
            }
        }
    }

    fn set(&self, session: &Session) -> Result<(), SessionError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.write(session)
    }

    fn replace_if(&self, expected: &str, next: &Session) -> Result<bool, SessionError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.get().token != expected {
            return Ok(false);
        }
        self.write(next)?;
        Ok(true)
    }
}

/// Process-local store; nothing survives a restart.
#[derive(Default)]
pub struct MemorySessionStore {
    session: Mutex<Session>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self) -> Session {
        self.session.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set(&self, session: &Session) -> Result<(), SessionError> {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = session.clone();
        Ok(())
    }

    fn replace_if(&self, expected: &str, next: &Session) -> Result<bool, SessionError> {
        let mut current = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if current.token != expected {
            return Ok(false);
        }
        *current = next.clone();
        Ok(true)
    }
}
