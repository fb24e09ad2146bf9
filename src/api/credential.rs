//! Bearer credential shared by every outbound API call.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};

/// The current login token, if any.
///
/// Replaced wholesale on a successful login and never mutated in place.
#[derive(Debug, Clone, Default)]
pub struct ApiCredential {
    token: Option<SecretString>,
    acquired_at: Option<DateTime<Utc>>,
}

impl ApiCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(SecretString::from(token.into())),
            acquired_at: Some(Utc::now()),
        }
    }

    pub fn is_present(&self) -> bool {
        self.token.is_some()
    }

    pub fn acquired_at(&self) -> Option<DateTime<Utc>> {
        self.acquired_at
    }

    /// Raw token, for building headers and comparing credentials.
    pub fn token(&self) -> Option<&str> {
        self.token.as_ref().map(|t| t.expose_secret())
    }

    /// `Authorization` header value. An absent token yields `"Bearer "`.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token().unwrap_or_default())
    }
}
