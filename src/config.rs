//! Runtime configuration loaded from environment variables.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use std::path::PathBuf;
use std::time::Duration;

use crate::guard::{DEFAULT_ALERT_TIMEOUT, DEFAULT_LOGIN_PATH};

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:5000/api";
pub const DEFAULT_SESSION_PATH: &str = ".portal/session.json";
const DEFAULT_HTTP_TIMEOUT_MS: u64 = 10_000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Backend base URL, without trailing slash.
    pub api_url: String,
    /// Where the durable session record lives.
    pub session_path: PathBuf,
    /// Per-request HTTP timeout.
    pub http_timeout: Duration,
    /// How long a guard's denial alert stays up before redirecting.
    pub alert_timeout: Duration,
    /// Redirect target for denied guards.
    pub login_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_owned(),
            session_path: PathBuf::from(DEFAULT_SESSION_PATH),
            http_timeout: Duration::from_millis(DEFAULT_HTTP_TIMEOUT_MS),
            alert_timeout: DEFAULT_ALERT_TIMEOUT,
            login_path: DEFAULT_LOGIN_PATH.to_owned(),
        }
    }
}

impl Config {
    /// Load from `PORTAL_*` environment variables with defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup. Empty values count as unset.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let millis = |key: &str, default: Duration| {
            get(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map_or(default, Duration::from_millis)
        };
        let defaults = Self::default();

        Self {
            api_url: get("PORTAL_API_URL")
                .map_or(defaults.api_url, |v| v.trim().trim_end_matches('/').to_owned()),
            session_path: get("PORTAL_SESSION_PATH").map_or(defaults.session_path, PathBuf::from),
            http_timeout: millis("PORTAL_HTTP_TIMEOUT_MS", defaults.http_timeout),
            alert_timeout: millis("PORTAL_ALERT_TIMEOUT_MS", defaults.alert_timeout),
            login_path: get("PORTAL_LOGIN_PATH").unwrap_or(defaults.login_path),
        }
    }
}
