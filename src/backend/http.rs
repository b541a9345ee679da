//! REST auth backend over reqwest
//!
//! The client keeps its own cookie jar, so the session cookie set by the
//! login endpoint rides along on every later call, the same way a browser
//! sends it for `withCredentials` requests.
//!
//! Accepted response shapes:
//! - session check: `{ authenticated: true, user }`, `{ status: "success", user }`
//!   or a bare `{ user }`; `{ authenticated: false }`, a null user or a 401/403
//!   mean "no session"
//! - login: 2xx with `{ user }`; failures may carry `message` or `error`

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::AuthBackend;
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::user::{Credentials, PasswordChange, User, UserUpdate};

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Auth backend talking to the dashboard's REST API
///
/// # Example
///
/// ```rust,ignore
/// use verso_session::{HttpBackend, SessionConfig};
///
/// let backend = HttpBackend::new(SessionConfig::new("http://localhost:8080/api"))?;
/// ```
pub struct HttpBackend {
    client: reqwest::Client,
    config: Arc<SessionConfig>,
}

/// Status and decoded body of one call
struct Reply {
    status: u16,
    body: Value,
}

impl Reply {
    fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn is_unauthorized(&self) -> bool {
        self.status == 401 || self.status == 403
    }
}

impl HttpBackend {
    /// Build a backend with its own cookie-keeping client
    pub fn new(config: SessionConfig) -> Result<Self, SessionError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .cookie_store(true)
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SessionError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self::with_client(client, config))
    }

    /// Use an existing client; it must keep cookies for sessions to work
    pub fn with_client(client: reqwest::Client, config: SessionConfig) -> Self {
        Self {
            client,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, self.config.endpoint(path))
            .header(REQUEST_ID_HEADER, Uuid::new_v4().to_string())
    }

    async fn send(&self, op: &'static str, request: RequestBuilder) -> Result<Reply, SessionError> {
        let response = request.send().await.map_err(|e| {
            warn!("{} request failed: {}", op, e);
            if e.is_timeout() {
                SessionError::Timeout(self.config.request_timeout)
            } else {
                SessionError::from(e)
            }
        })?;

        let status = response.status().as_u16();
        let text = response.text().await?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        debug!("{} answered {}", op, status);
        Ok(Reply { status, body })
    }
}

#[async_trait]
impl AuthBackend for HttpBackend {
    async fn session_check(&self) -> Result<Option<User>, SessionError> {
        let reply = self
            .send(
                "session_check",
                self.request(Method::GET, &self.config.session_check_path),
            )
            .await?;

        if reply.is_unauthorized() {
            return Ok(None);
        }
        if !reply.is_success() {
            return Err(rejection(&reply));
        }
        session_user(&reply.body)
    }

    async fn login(&self, credentials: &Credentials) -> Result<User, SessionError> {
        let reply = self
            .send(
                "login",
                self.request(Method::POST, &self.config.login_path)
                    .json(credentials),
            )
            .await?;

        // A 401 here is a bad password, not a lost session: keep the message.
        if !reply.is_success() {
            return Err(SessionError::Rejected {
                status: Some(reply.status),
                message: error_message(&reply.body),
            });
        }
        login_user(&reply.body)
    }

    async fn logout(&self) -> Result<(), SessionError> {
        let reply = self
            .send("logout", self.request(Method::POST, &self.config.logout_path))
            .await?;
        ensure_ok(&reply)
    }

    async fn update_profile(&self, update: &UserUpdate) -> Result<(), SessionError> {
        let reply = self
            .send(
                "update_profile",
                self.request(Method::PUT, &self.config.profile_path)
                    .json(update),
            )
            .await?;
        ensure_ok(&reply)
    }

    async fn change_password(&self, change: &PasswordChange) -> Result<(), SessionError> {
        let reply = self
            .send(
                "change_password",
                self.request(Method::PUT, &self.config.password_path)
                    .json(change),
            )
            .await?;
        ensure_ok(&reply)
    }

    async fn request_password_reset(&self, email: &str) -> Result<(), SessionError> {
        let reply = self
            .send(
                "request_password_reset",
                self.request(Method::POST, &self.config.password_reset_path)
                    .json(&json!({ "email": email })),
            )
            .await?;
        ensure_ok(&reply)
    }
}

/// First non-empty `message` or `error` string in a response body
fn error_message(body: &Value) -> Option<String> {
    ["message", "error"]
        .iter()
        .filter_map(|key| body.get(key).and_then(Value::as_str))
        .map(str::trim)
        .find(|msg| !msg.is_empty())
        .map(str::to_string)
}

fn rejection(reply: &Reply) -> SessionError {
    if reply.is_unauthorized() {
        SessionError::Unauthorized
    } else {
        SessionError::Rejected {
            status: Some(reply.status),
            message: error_message(&reply.body),
        }
    }
}

/// A 2xx reply can still say `{ status: "error" }` or `{ success: false }`
fn ensure_ok(reply: &Reply) -> Result<(), SessionError> {
    if !reply.is_success() {
        return Err(rejection(reply));
    }
    let failed_status = reply
        .body
        .get("status")
        .and_then(Value::as_str)
        .map_or(false, |status| status != "success");
    let failed_flag = reply.body.get("success") == Some(&Value::Bool(false));
    if failed_status || failed_flag {
        return Err(SessionError::Rejected {
            status: Some(reply.status),
            message: error_message(&reply.body),
        });
    }
    Ok(())
}

fn user_field(body: &Value) -> Option<&Value> {
    body.get("user").filter(|user| !user.is_null())
}

fn session_user(body: &Value) -> Result<Option<User>, SessionError> {
    if body.get("authenticated") == Some(&Value::Bool(false)) {
        return Ok(None);
    }
    if let Some(status) = body.get("status").and_then(Value::as_str) {
        if status != "success" {
            return Ok(None);
        }
    }
    match user_field(body) {
        Some(user) => Ok(Some(serde_json::from_value(user.clone())?)),
        None => Ok(None),
    }
}

fn login_user(body: &Value) -> Result<User, SessionError> {
    if let Some(status) = body.get("status").and_then(Value::as_str) {
        if status != "success" {
            return Err(SessionError::Rejected {
                status: None,
                message: error_message(body),
            });
        }
    }
    match user_field(body) {
        Some(user) => Ok(serde_json::from_value(user.clone())?),
        None => Err(SessionError::Decode(
            "login response carries no user".to_string(),
        )),
    }
}
