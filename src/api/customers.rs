//! Customer registration against the admin API.

use std::fmt;

use serde::Serialize;
use tracing::{info, warn};

use super::client::ApiClient;

const CUSTOMERS_ROUTE: &str = "/admin/customers";

/// Payload for `POST /admin/customers`.
#[derive(Clone, Serialize)]
pub struct NewCustomer {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: String,
    pub status: String,
}

impl NewCustomer {
    pub fn new(name: impl Into<String>, email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            password: password.into(),
            role: "customer".into(),
            status: String::new(),
        }
    }
}

impl fmt::Debug for NewCustomer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewCustomer")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("role", &self.role)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Registered,
    /// `message` is the server's explanation, when it gave a usable one.
    Failed { message: Option<String> },
}

impl ApiClient {
    /// Create a customer account. Only HTTP 200 counts as success.
    pub async fn register_customer(&self, customer: &NewCustomer) -> RegistrationOutcome {
        let body = match serde_json::to_value(customer) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "Could not encode customer payload");
                return RegistrationOutcome::Failed { message: None };
            }
        };

        let response = self
            .post(
                CUSTOMERS_ROUTE,
                &body,
                &[
                    ("content-type", "application/json"),
                    ("x-requested-with", "XMLHttpRequest"),
                ],
            )
            .await;

        if response.status() == Some(reqwest::StatusCode::OK) {
            info!(email = %customer.email, attempts = response.attempts, "Customer registered");
            RegistrationOutcome::Registered
        } else {
            warn!(
                email = %customer.email,
                status = ?response.status(),
                attempts = response.attempts,
                "Customer registration failed"
            );
            RegistrationOutcome::Failed {
                message: response.error_message(),
            }
        }
    }
}
