// Authentication types

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Field names accepted for the token in a login response, in priority order
pub const TOKEN_FIELDS: [&str; 3] = ["access_token", "token", "jwt"];

/// Canonical scheme used when the server does not say otherwise
pub const DEFAULT_SCHEME: &str = "Bearer";

/// Username/password pair, fixed for the whole run
#[derive(Clone, PartialEq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

// Never print the password
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Token obtained from a successful login
#[derive(Clone, PartialEq)]
pub struct SessionToken {
    pub value: String,
    pub scheme: String,
    pub obtained_at: DateTime<Utc>,
}

impl SessionToken {
    /// Value for the `Authorization` header
    pub fn header_value(&self) -> String {
        format!("{} {}", self.scheme, self.value)
    }

    /// Short prefix of the token, safe for logs
    pub fn preview(&self) -> &str {
        let end = self
            .value
            .char_indices()
            .nth(12)
            .map(|(i, _)| i)
            .unwrap_or(self.value.len());
        &self.value[..end]
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionToken")
            .field("value", &format_args!("{}...", self.preview()))
            .field("scheme", &self.scheme)
            .field("obtained_at", &self.obtained_at)
            .finish()
    }
}

/// Login request body
#[derive(Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

impl<'a> From<&'a Credentials> for LoginRequest<'a> {
    fn from(creds: &'a Credentials) -> Self {
        Self {
            username: &creds.username,
            password: &creds.password,
        }
    }
}
