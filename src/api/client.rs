//! Authenticated client for the remote admin API.
//!
//! Every call carries the shared bearer credential. Failed calls (a status
//! outside 200..299 or a transport error) are retried within a small budget,
//! and the first 403 of a call triggers one re-authentication before the
//! next attempt. Callers always get an `ApiResponse` value back, never an
//! error.

use reqwest::header::AUTHORIZATION;
use reqwest::{Method, StatusCode};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::config::ApiConfig;
use crate::error::ApiError;

use super::credential::ApiCredential;
use super::retry::RetryPolicy;

const LOGIN_ROUTE: &str = "/login";
/// Statuses that end the retry loop. 299 is still retried.
const SUCCESS_STATUSES: std::ops::Range<u16> = 200..299;

fn is_success_status(status: StatusCode) -> bool {
    SUCCESS_STATUSES.contains(&status.as_u16())
}

/// Final state of one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiOutcome {
    /// The server answered.
    Status { status: StatusCode, body: String },
    /// No response: connection, TLS, timeout or request-building failure.
    Transport { reason: String },
}

impl ApiOutcome {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport { .. } => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status().is_some_and(is_success_status)
    }
}

/// Result of `ApiClient::request`: the last outcome plus retry bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub outcome: ApiOutcome,
    /// Attempts made, including the first.
    pub attempts: u32,
    /// Whether a re-authentication happened during the call.
    pub reauthenticated: bool,
}

impl ApiResponse {
    pub fn status(&self) -> Option<StatusCode> {
        self.outcome.status()
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    pub fn body(&self) -> Option<&str> {
        match &self.outcome {
            ApiOutcome::Status { body, .. } => Some(body),
            ApiOutcome::Transport { .. } => None,
        }
    }

    /// Parse the response body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_str(self.body()?).ok()
    }

    /// Server-provided error text: the body's `message` field, falling back
    /// to `error`. Arrays of strings are joined line by line.
    pub fn error_message(&self) -> Option<String> {
        let body: serde_json::Value = self.json()?;
        ["message", "error"]
            .iter()
            .filter_map(|key| body.get(*key))
            .find_map(|value| match value {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Array(items) => {
                    let parts: Vec<&str> = items.iter().filter_map(|v| v.as_str()).collect();
                    (!parts.is_empty()).then(|| parts.join("\n"))
                }
                _ => None,
            })
            .filter(|message| message.chars().count() > 1)
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: Option<String>,
}

/// Client for the remote admin API.
pub struct ApiClient {
    http: reqwest::Client,
    config: ApiConfig,
    policy: RetryPolicy,
    credential: RwLock<ApiCredential>,
    /// Held while logging in; only its holder writes `credential`.
    refresh: Mutex<()>,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Self {
        Self::with_http_client(config, reqwest::Client::new())
    }

    pub fn with_http_client(config: ApiConfig, http: reqwest::Client) -> Self {
        Self {
            http,
            policy: config.retry.into(),
            config,
            credential: RwLock::new(ApiCredential::default()),
            refresh: Mutex::new(()),
        }
    }

    fn url(&self, route: &str) -> String {
        format!("{}{route}", self.config.base_url)
    }

    /// Snapshot of the current credential.
    pub async fn credential(&self) -> ApiCredential {
        self.credential.read().await.clone()
    }

    async fn current_token(&self) -> Option<String> {
        self.credential.read().await.token().map(str::to_string)
    }

    /// Log in with the configured identity.
    ///
    /// On success the credential is replaced and `true` returned. On failure
    /// the error is logged and the previous credential (possibly none) stays
    /// in place.
    pub async fn authenticate(&self) -> bool {
        let _writer = self.refresh.lock().await;
        self.login().await
    }

    async fn login(&self) -> bool {
        info!("Authenticating...");
        match self.fetch_token().await {
            Ok(token) => {
                *self.credential.write().await = ApiCredential::new(token);
                info!("Authenticated successfully");
                true
            }
            Err(e) => {
                error!(error = %e, "Authentication failed; keeping current credential");
                false
            }
        }
    }

    async fn fetch_token(&self) -> Result<String, ApiError> {
        let body = LoginRequest {
            email: &self.config.email,
            password: self.config.password.expose_secret(),
        };

        let resp = self
            .http
            .post(self.url(LOGIN_ROUTE))
            .json(&body)
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                route: LOGIN_ROUTE.into(),
                source,
            })?;

        let status = resp.status();
        if !is_success_status(status) {
            return Err(ApiError::Status {
                route: LOGIN_ROUTE.into(),
                status,
            });
        }

        let parsed: LoginResponse = resp.json().await.map_err(|source| ApiError::Transport {
            route: LOGIN_ROUTE.into(),
            source,
        })?;

        parsed
            .token
            .filter(|t| !t.is_empty())
            .ok_or(ApiError::MissingToken)
    }

    /// Re-authenticate after `rejected` was refused with a 403.
    ///
    /// If another call already replaced that token while we waited for the
    /// writer lock, its result is reused instead of logging in again.
    async fn refresh_after_rejection(&self, rejected: Option<&str>) {
        let _writer = self.refresh.lock().await;
        if self.current_token().await.as_deref() != rejected {
            info!("Credential already refreshed by a concurrent call");
            return;
        }
        self.login().await;
    }

    /// Send a request with retries and one re-authentication on 403.
    pub async fn request(
        &self,
        method: Method,
        route: &str,
        body: Option<&serde_json::Value>,
        extra_headers: &[(&str, &str)],
    ) -> ApiResponse {
        let url = self.url(route);
        let mut reauthenticated = false;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let credential = self.credential().await;
            let outcome = self
                .send_once(method.clone(), &url, body, extra_headers, &credential)
                .await;

            if outcome.is_success() || !self.policy.allows_retry_after(attempt) {
                if !outcome.is_success() {
                    warn!(%method, route, attempt, ?outcome, "Request failed; retry budget exhausted");
                }
                return ApiResponse {
                    outcome,
                    attempts: attempt,
                    reauthenticated,
                };
            }

            warn!(
                %method,
                route,
                attempt,
                status = ?outcome.status(),
                "Retrying request"
            );

            if outcome.status() == Some(StatusCode::FORBIDDEN) && !reauthenticated {
                reauthenticated = true;
                self.refresh_after_rejection(credential.token()).await;
            }

            tokio::time::sleep(self.policy.delay_after(attempt)).await;
        }
    }

    async fn send_once(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
        extra_headers: &[(&str, &str)],
        credential: &ApiCredential,
    ) -> ApiOutcome {
        let mut builder = self
            .http
            .request(method, url)
            .header(AUTHORIZATION, credential.bearer());
        for (name, value) in extra_headers {
            builder = builder.header(*name, *value);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        match builder.send().await {
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                ApiOutcome::Status { status, body }
            }
            Err(e) => ApiOutcome::Transport {
                reason: e.to_string(),
            },
        }
    }

    pub async fn get(&self, route: &str) -> ApiResponse {
        self.request(Method::GET, route, None, &[]).await
    }

    pub async fn post(
        &self,
        route: &str,
        body: &serde_json::Value,
        extra_headers: &[(&str, &str)],
    ) -> ApiResponse {
        self.request(Method::POST, route, Some(body), extra_headers).await
    }

    pub async fn put(&self, route: &str, body: &serde_json::Value) -> ApiResponse {
        self.request(Method::PUT, route, Some(body), &[]).await
    }

    pub async fn patch(&self, route: &str, body: &serde_json::Value) -> ApiResponse {
        self.request(Method::PATCH, route, Some(body), &[]).await
    }

    pub async fn delete(&self, route: &str) -> ApiResponse {
        self.request(Method::DELETE, route, None, &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn response(status: u16, body: &str) -> ApiResponse {
        ApiResponse {
            outcome: ApiOutcome::Status {
                status: StatusCode::from_u16(status).unwrap(),
                body: body.to_string(),
            },
            attempts: 1,
            reauthenticated: false,
        }
    }

    #[test]
    fn success_window_excludes_299() {
        assert!(response(200, "").is_success());
        assert!(response(201, "").is_success());
        assert!(response(298, "").is_success());
        assert!(!response(299, "").is_success());
        assert!(!response(403, "").is_success());
        let transport = ApiResponse {
            outcome: ApiOutcome::Transport {
                reason: "refused".into(),
            },
            attempts: 3,
            reauthenticated: false,
        };
        assert!(!transport.is_success());
        assert!(transport.body().is_none());
        assert!(transport.error_message().is_none());
    }

    #[test]
    fn error_message_prefers_message_field() {
        let r = response(400, r#"{"message": "E-mail já cadastrado", "error": "Bad Request"}"#);
        assert_eq!(r.error_message().as_deref(), Some("E-mail já cadastrado"));
    }

    #[test]
    fn error_message_falls_back_to_error_field() {
        let r = response(500, r#"{"error": "Internal"}"#);
        assert_eq!(r.error_message().as_deref(), Some("Internal"));
    }

    #[test]
    fn error_message_joins_arrays() {
        let r = response(422, r#"{"message": ["email inválido", "senha curta"]}"#);
        assert_eq!(r.error_message().as_deref(), Some("email inválido\nsenha curta"));
    }

    #[test]
    fn error_message_ignores_trivial_or_non_json_bodies() {
        assert!(response(400, r#"{"message": "x"}"#).error_message().is_none());
        assert!(response(502, "<html>Bad gateway</html>").error_message().is_none());
    }

    #[test]
    fn url_joins_base_and_route() {
        let client = ApiClient::new(ApiConfig::new(
            "https://api.test/",
            "bot@x.test",
            SecretString::from("pw"),
        ));
        assert_eq!(client.url("/login"), "https://api.test/login");
    }

    #[tokio::test]
    async fn starts_without_credential() {
        let client = ApiClient::new(ApiConfig::new("http://127.0.0.1:1", "a", SecretString::from("b")));
        assert!(!client.credential().await.is_present());
    }

    #[tokio::test]
    async fn failed_login_keeps_credential_absent() {
        // Port 1 refuses connections.
        let client = ApiClient::new(ApiConfig::new("http://127.0.0.1:1", "a", SecretString::from("b")));
        assert!(!client.authenticate().await);
        assert!(!client.credential().await.is_present());
    }
}
