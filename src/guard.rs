//! Role-gated route guard.
//!
//! SYSTEM CONTEXT
//! ==============
//! A page that needs a role mounts a `RouteGuard`. Mounting starts an async
//! server check through `AuthContext::is_authenticated`; until it resolves the
//! guard reports `Loading` and the page is expected to render a placeholder.
//! A denial raises one error alert per mount. Navigation is left to the alert
//! service's timeout.
//!
//! LIFECYCLE
//! =========
//! The check re-runs when the auth handle or required role changes
//! (`update`), never on unrelated re-renders. Dropping the guard counts as
//! unmount: the in-flight check is aborted and any late result is discarded.
//!
//! Every restart and the unmount bump a generation counter. A check publishes
//! its status and alert only while holding that lock and only if its own
//! generation is still current, so a task that outran `abort()` stays silent.

#[cfg(test)]
#[path = "guard_test.rs"]
mod guard_test;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::alert::{AlertService, Severity};
use crate::auth::AuthContext;
use crate::session::Role;

pub const DEFAULT_ALERT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_LOGIN_PATH: &str = "/login";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuardStatus {
    Loading,
    Authorized,
    Denied,
}

impl GuardStatus {
    #[must_use]
    pub fn is_loading(self) -> bool {
        matches!(self, Self::Loading)
    }
}

/// Alert raised when the check fails.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnauthorizedAlert {
    pub title: String,
    pub message: String,
    pub timeout: Duration,
    pub redirect: Option<String>,
}

impl UnauthorizedAlert {
    /// Fixed wording for a role, redirecting to `/login` after 30s.
    #[must_use]
    pub fn for_role(role: Role) -> Self {
        let message = match role {
            Role::Administrator => "Only administrators can access this page",
            Role::User => "You must be logged in to access this page",
        };
        Self {
            title: "Unauthorized".to_owned(),
            message: message.to_owned(),
            timeout: DEFAULT_ALERT_TIMEOUT,
            redirect: Some(DEFAULT_LOGIN_PATH.to_owned()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardConfig {
    pub required_role: Role,
    pub on_unauthorized: UnauthorizedAlert,
}

impl GuardConfig {
    #[must_use]
    pub fn new(required_role: Role) -> Self {
        Self { required_role, on_unauthorized: UnauthorizedAlert::for_role(required_role) }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.on_unauthorized.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_redirect(mut self, redirect: Option<&str>) -> Self {
        self.on_unauthorized.redirect = redirect.map(str::to_owned);
        self
    }
}

/// State a running check reports into.
struct CheckShared {
    alerts: AlertService,
    alerted: AtomicBool,
    generation: Mutex<u64>,
    status: watch::Sender<GuardStatus>,
}

impl CheckShared {
    /// Retire every outstanding check.
    fn retire(&self) {
        let mut generation = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
        *generation = generation.wrapping_add(1);
    }

    /// New generation with the status reset to `Loading` under the same lock.
    fn restart(&self) -> u64 {
        let mut generation = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
        *generation = generation.wrapping_add(1);
        self.status.send_replace(GuardStatus::Loading);
        *generation
    }

    /// Publish a finished check if `generation` is still current.
    fn publish(&self, generation: u64, granted: bool, config: &GuardConfig) {
        let current = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
        if *current != generation {
            debug!(role = %config.required_role, "guard check superseded or unmounted; discarding result");
            return;
        }
        if granted {
            self.status.send_replace(GuardStatus::Authorized);
            return;
        }
        if !self.alerted.swap(true, Ordering::SeqCst) {
            warn!(role = %config.required_role, "access denied");
            let alert = &config.on_unauthorized;
            self.alerts.show_alert(
                alert.title.clone(),
                alert.message.clone(),
                Severity::Error,
                alert.timeout,
                alert.redirect.as_deref(),
            );
        }
        self.status.send_replace(GuardStatus::Denied);
    }
}

pub struct RouteGuard {
    auth: Arc<AuthContext>,
    config: GuardConfig,
    shared: Arc<CheckShared>,
    task: Option<JoinHandle<()>>,
}

impl RouteGuard {
    /// Mount the guard and start the first check. Requires a tokio runtime.
    #[must_use]
    pub fn mount(auth: Arc<AuthContext>, alerts: AlertService, config: GuardConfig) -> Self {
        let (status, _) = watch::channel(GuardStatus::Loading);
        let mut guard = Self {
            auth,
            config,
            shared: Arc::new(CheckShared {
                alerts,
                alerted: AtomicBool::new(false),
                generation: Mutex::new(0),
                status,
            }),
            task: None,
        };
        guard.start_check();
        guard
    }

    #[must_use]
    pub fn status(&self) -> GuardStatus {
        *self.shared.status.borrow()
    }

    #[must_use]
    pub fn loading(&self) -> bool {
        self.status().is_loading()
    }

    #[must_use]
    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<GuardStatus> {
        self.shared.status.subscribe()
    }

    /// Wait for the current check to settle.
    pub async fn resolved(&self) -> GuardStatus {
        let mut rx = self.shared.status.subscribe();
        let settled = rx.wait_for(|s| !s.is_loading()).await.map(|status| *status);
        settled.unwrap_or(GuardStatus::Denied)
    }

    /// Apply new inputs; re-checks only if the auth handle or role changed.
    pub fn update(&mut self, auth: Arc<AuthContext>, config: GuardConfig) {
        let changed = !Arc::ptr_eq(&self.auth, &auth) || self.config.required_role != config.required_role;
        self.auth = auth;
        self.config = config;
        if changed {
            self.start_check();
        }
    }

    fn start_check(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        let generation = self.shared.restart();

        let auth = Arc::clone(&self.auth);
        let config = self.config.clone();
        let shared = Arc::clone(&self.shared);

        self.task = Some(tokio::spawn(async move {
            let granted = auth.is_authenticated(config.required_role).await;
            shared.publish(generation, granted, &config);
        }));
    }
}

impl Drop for RouteGuard {
    fn drop(&mut self) {
        self.shared.retire();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
