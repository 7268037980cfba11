//! Wire types exchanged with the backend REST API.

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope every backend response is wrapped in.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

impl Envelope {
    /// String field under `data`.
    #[must_use]
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.as_ref()?.get(key)?.as_str()
    }

    /// Best human-readable failure detail: `data.error_info`, then `message`.
    #[must_use]
    pub fn error_detail(&self) -> Option<String> {
        let info = self.data.as_ref().and_then(|d| d.get("error_info"));
        match info {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Array(items)) => Some(
                items
                    .iter()
                    .map(|v| v.as_str().map_or_else(|| v.to_string(), str::to_owned))
                    .collect::<Vec<_>>()
                    .join("; "),
            ),
            Some(other) => Some(other.to_string()),
            None => self.message.clone(),
        }
    }
}

/// User profile as returned by `GET /user/{id}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub role_id: Option<String>,
    #[serde(default)]
    pub role_name: Option<String>,
    #[serde(default)]
    pub created_utc: Option<String>,
    #[serde(default)]
    pub updated_utc: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    })
}

/// Payload for `POST /user/register`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Registration {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

/// Outcome of a registration attempt, keyed off the response status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// 201
    Created,
    /// 409
    EmailExists,
    /// 400
    Invalid,
    /// 500
    ServerError,
    /// Anything else.
    Unexpected(u16),
}

impl RegisterOutcome {
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        match status {
            201 => Self::Created,
            409 => Self::EmailExists,
            400 => Self::Invalid,
            500 => Self::ServerError,
            other => Self::Unexpected(other),
        }
    }

    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Created)
    }

    /// Message to show the person who submitted the form.
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::Created => "Account created. Please log in.",
            Self::EmailExists => "Email already exists.",
            Self::Invalid => "Invalid data provided to create account.",
            Self::ServerError => "Internal Server Error, please contact support.",
            Self::Unexpected(_) => "Registration failed. Please try again.",
        }
    }
}
