//! Typed client for the classification service HTTP contract.
//!
//! Failures carry the service's own message (`msg` or `message` field) when
//! the body provides one, so callers can surface it verbatim.

mod auth;
mod models;
pub mod multipart;
mod train;

use serde::Serialize;
use serde_json::Value;

use crate::{config::ClientConfig, http_client};

pub use auth::{LoginResponse, RegisterRequest};
pub use models::{Classification, ModelClasses, ModelSummary};
pub use multipart::MultipartForm;
pub use train::TrainResponse;

const MAX_JSON_RESPONSE_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP {status}: {}", .message.as_deref().unwrap_or("no message"))]
    Service {
        status: u16,
        message: Option<String>,
    },
    #[error("HTTP error: {0}")]
    Transport(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// Message suitable for a notification: the service text when present, else `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            Self::Service {
                message: Some(message),
                ..
            } if !message.trim().is_empty() => message.clone(),
            _ => fallback.to_string(),
        }
    }

    fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Service { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Which body field carries the human-readable error for an endpoint.
#[derive(Clone, Copy, Debug)]
pub(crate) enum MessageKey {
    Msg,
    Message,
}

impl MessageKey {
    fn field(self) -> &'static str {
        match self {
            Self::Msg => "msg",
            Self::Message => "message",
        }
    }
}

#[derive(Clone, Debug)]
pub struct ApiClient {
    base_url: String,
    agent: ureq::Agent,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_agent(base_url, http_client::agent().clone())
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::with_agent(&config.api_url, http_client::build_agent(&config.http))
    }

    pub fn with_agent(base_url: impl Into<String>, agent: ureq::Agent) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, agent }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn get_json(&self, path: &str, key: MessageKey) -> Result<Value, ApiError> {
        http_client::retry_with_backoff(
            http_client::RetryConfig::reads(),
            || {
                let result = self
                    .agent
                    .get(&self.url(path))
                    .set("Accept", "application/json")
                    .call();
                handle_response(result, key)
            },
            ApiError::is_transient,
        )
    }

    fn post_json<T: Serialize>(
        &self,
        path: &str,
        body: &T,
        key: MessageKey,
    ) -> Result<Value, ApiError> {
        let result = self
            .agent
            .post(&self.url(path))
            .set("Accept", "application/json")
            .send_json(body);
        handle_response(result, key)
    }

    fn post_multipart(
        &self,
        path: &str,
        form: &MultipartForm,
        bearer: Option<&str>,
        key: MessageKey,
    ) -> Result<Value, ApiError> {
        let mut request = self
            .agent
            .post(&self.url(path))
            .set("Accept", "application/json")
            .set("Content-Type", &form.content_type());
        if let Some(token) = bearer {
            request = request.set("Authorization", &format!("Bearer {}", token.trim()));
        }
        handle_response(request.send_bytes(&form.to_body()), key)
    }
}

fn handle_response(
    result: Result<ureq::Response, ureq::Error>,
    key: MessageKey,
) -> Result<Value, ApiError> {
    match result {
        Ok(response) => {
            let body = http_client::read_response_text(response, MAX_JSON_RESPONSE_BYTES)?;
            parse_body(&body)
        }
        Err(ureq::Error::Status(status, response)) => {
            let body = http_client::read_response_text(response, MAX_JSON_RESPONSE_BYTES)
                .unwrap_or_default();
            tracing::warn!(status, "Service rejected request");
            Err(ApiError::Service {
                status,
                message: extract_message(&body, key),
            })
        }
        Err(ureq::Error::Transport(err)) => Err(ApiError::Transport(err.to_string())),
    }
}

fn parse_body(body: &str) -> Result<Value, ApiError> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(trimmed).map_err(|err| ApiError::InvalidResponse(format!("{err}: {trimmed}")))
}

fn extract_message(body: &str, key: MessageKey) -> Option<String> {
    let value: Value = serde_json::from_str(body.trim()).ok()?;
    value
        .get(key.field())
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Pull a string field out of a success body, if present.
pub(crate) fn string_field(value: &Value, field: &str) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        _ => value.get(field).and_then(Value::as_str).map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_prefers_service_text() {
        let err = ApiError::Service {
            status: 401,
            message: Some("bad creds".into()),
        };
        assert_eq!(err.user_message("Login failed"), "bad creds");
    }

    #[test]
    fn user_message_falls_back_without_service_text() {
        let err = ApiError::Service {
            status: 500,
            message: None,
        };
        assert_eq!(err.user_message("Login failed"), "Login failed");
        let err = ApiError::Transport("connection refused".into());
        assert_eq!(err.user_message("Training failed"), "Training failed");
    }

    #[test]
    fn extract_message_reads_configured_field() {
        let body = r#"{"msg":"nope","message":"other"}"#;
        assert_eq!(extract_message(body, MessageKey::Msg).as_deref(), Some("nope"));
        assert_eq!(
            extract_message(body, MessageKey::Message).as_deref(),
            Some("other")
        );
        assert_eq!(extract_message("<html>", MessageKey::Msg), None);
    }

    #[test]
    fn empty_success_body_is_null() {
        assert_eq!(parse_body("  ").unwrap(), Value::Null);
        assert!(parse_body("not json").is_err());
    }

    #[test]
    fn transient_errors_are_retried() {
        assert!(ApiError::Transport("reset".into()).is_transient());
        assert!(
            ApiError::Service {
                status: 503,
                message: None
            }
            .is_transient()
        );
        assert!(
            !ApiError::Service {
                status: 404,
                message: None
            }
            .is_transient()
        );
    }
}
