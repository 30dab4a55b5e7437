//! `/classify/train`.

use serde_json::Value;

use super::{ApiClient, ApiError, MessageKey, MultipartForm, string_field};

/// Raw service acknowledgement for a training request.
#[derive(Clone, Debug, PartialEq)]
pub struct TrainResponse {
    /// Message text from the body (`msg` or `message`), passed through untouched.
    pub message: Option<String>,
    pub body: Value,
}

impl ApiClient {
    pub fn train(&self, form: &MultipartForm, token: &str) -> Result<TrainResponse, ApiError> {
        tracing::info!(parts = form.parts().len(), "Submitting training request");
        let body = self.post_multipart("/classify/train", form, Some(token), MessageKey::Msg)?;
        let message = string_field(&body, "msg").or_else(|| string_field(&body, "message"));
        Ok(TrainResponse { message, body })
    }
}
