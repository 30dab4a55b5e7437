//! `/auth/*` endpoints.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{ApiClient, ApiError, MessageKey, string_field};

#[derive(Clone, Debug, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl ApiClient {
    /// Exchange credentials for a session token.
    pub fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let body = self.post_json(
            "/auth/login",
            &json!({ "email": email, "password": password }),
            MessageKey::Msg,
        )?;
        match body.get("token").and_then(Value::as_str) {
            Some(token) if !token.trim().is_empty() => Ok(LoginResponse {
                token: token.to_string(),
            }),
            _ => Err(ApiError::InvalidResponse("Missing token in login response".into())),
        }
    }

    pub fn register(&self, request: &RegisterRequest) -> Result<(), ApiError> {
        self.post_json("/auth/register", request, MessageKey::Msg)
            .map(|_| ())
    }

    /// `true` only when the service answers with a literal `true`.
    pub fn check_email_exists(&self, email: &str) -> Result<bool, ApiError> {
        let body = self.post_json(
            "/auth/check-email-exists",
            &json!({ "email": email }),
            MessageKey::Message,
        )?;
        Ok(body == Value::Bool(true))
    }

    /// Ask the service to email a reset PIN; returns its confirmation text.
    pub fn forgot_password(&self, email: &str) -> Result<String, ApiError> {
        let body = self.post_json(
            "/auth/forgot-password",
            &json!({ "email": email }),
            MessageKey::Message,
        )?;
        Ok(string_field(&body, "message").unwrap_or_default())
    }

    pub fn confirm_pin(&self, email: &str, pin: &str) -> Result<bool, ApiError> {
        let body = self.post_json(
            "/auth/confirm-pin",
            &json!({ "email": email, "pin": pin }),
            MessageKey::Message,
        )?;
        Ok(body == Value::Bool(true))
    }

    pub fn reset_password(
        &self,
        email: &str,
        pin: &str,
        password: &str,
    ) -> Result<String, ApiError> {
        let body = self.post_json(
            "/auth/reset-password",
            &json!({ "email": email, "pin": pin, "password": password }),
            MessageKey::Message,
        )?;
        Ok(string_field(&body, "message").unwrap_or_default())
    }
}
