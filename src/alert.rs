//! Process-wide transient alert channel.
//!
//! DESIGN
//! ======
//! At most one alert is live. `show_alert` replaces the current one at once;
//! there is no queue. A positive timeout schedules a tokio task that clears
//! the alert and, when a redirect target was given, asks the injected
//! [`Navigator`] to move there.
//!
//! Superseding (`show_alert` again, `hide_alert`, or dropping the service)
//! aborts the pending timer and bumps a generation counter. The timer
//! re-checks the generation under the lock before acting, so a timer that
//! already woke up cannot clear a newer alert or fire a stale redirect.

#[cfg(test)]
#[path = "alert_test.rs"]
mod alert_test;

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Warning,
    Error,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Info => "info",
        })
    }
}

/// A user-visible message. `timeout` of zero persists until dismissed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Alert {
    pub title: String,
    pub message: String,
    pub severity: Severity,
    pub redirect: Option<String>,
    pub timeout: Duration,
}

/// Client-side navigation sink used when an alert times out with a redirect.
pub trait Navigator: Send + Sync {
    fn navigate(&self, target: &str);
}

/// Navigator that only records the move in the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn navigate(&self, target: &str) {
        info!(path = target, "navigating");
    }
}

struct Slot {
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

struct AlertInner {
    navigator: Arc<dyn Navigator>,
    slot: Mutex<Slot>,
    current: watch::Sender<Option<Alert>>,
}

impl Drop for AlertInner {
    fn drop(&mut self) {
        let slot = self.slot.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(timer) = slot.timer.take() {
            timer.abort();
        }
    }
}

/// Shared handle to the alert channel. Clones address the same alert slot.
#[derive(Clone)]
pub struct AlertService {
    inner: Arc<AlertInner>,
}

impl AlertService {
    #[must_use]
    pub fn new(navigator: Arc<dyn Navigator>) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            inner: Arc::new(AlertInner {
                navigator,
                slot: Mutex::new(Slot { generation: 0, timer: None }),
                current,
            }),
        }
    }

    /// Replace any live alert with a new one.
    ///
    /// Must be called from within a tokio runtime when `timeout` is non-zero.
    pub fn show_alert(
        &self,
        title: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
        timeout: Duration,
        redirect: Option<&str>,
    ) {
        let alert = Alert {
            title: title.into(),
            message: message.into(),
            severity,
            redirect: redirect.map(str::to_owned),
            timeout,
        };
        debug!(title = %alert.title, %severity, ?timeout, "alert shown");

        let mut slot = self.lock_slot();
        Self::supersede(&mut slot);
        let generation = slot.generation;
        self.inner.current.send_replace(Some(alert.clone()));

        if !timeout.is_zero() {
            let weak = Arc::downgrade(&self.inner);
            slot.timer = Some(tokio::spawn(expire(weak, generation, timeout, alert.redirect)));
        }
    }

    /// Clear the live alert now. A pending timeout will neither clear nor redirect.
    pub fn hide_alert(&self) {
        let mut slot = self.lock_slot();
        Self::supersede(&mut slot);
        self.inner.current.send_replace(None);
    }

    /// Currently displayed alert, if any.
    #[must_use]
    pub fn current(&self) -> Option<Alert> {
        self.inner.current.borrow().clone()
    }

    /// Receiver that observes every alert change, for renderers.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<Alert>> {
        self.inner.current.subscribe()
    }

    fn lock_slot(&self) -> std::sync::MutexGuard<'_, Slot> {
        self.inner.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn supersede(slot: &mut Slot) {
        slot.generation = slot.generation.wrapping_add(1);
        if let Some(timer) = slot.timer.take() {
            timer.abort();
        }
    }
}

async fn expire(inner: Weak<AlertInner>, generation: u64, timeout: Duration, redirect: Option<String>) {
    tokio::time::sleep(timeout).await;
    let Some(inner) = inner.upgrade() else {
        return;
    };
    {
        let mut slot = inner.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.generation != generation {
            return;
        }
        slot.timer = None;
        inner.current.send_replace(None);
    }
    if let Some(target) = redirect {
        inner.navigator.navigate(&target);
    }
}
