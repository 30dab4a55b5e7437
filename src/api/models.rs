//! `/classify/models`, `/classify/classes/{id}` and `/classify/classify`.

use std::path::Path;

use serde::Deserialize;

use super::{ApiClient, ApiError, MessageKey, MultipartForm};

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ModelSummary {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub name: String,
    #[serde(rename = "modelDescription", default)]
    pub description: String,
    #[serde(rename = "modelCategory", default)]
    pub category: String,
    #[serde(rename = "featureImage", default)]
    pub feature_image: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ModelClasses {
    pub classes: Vec<String>,
    #[serde(rename = "modelName", default)]
    pub model_name: Option<String>,
    #[serde(rename = "modelDescription", default)]
    pub model_description: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Classification {
    pub result: String,
    #[serde(default)]
    pub confidences: Vec<f64>,
    #[serde(rename = "isOther", default)]
    pub is_other: bool,
}

impl ApiClient {
    pub fn list_models(&self) -> Result<Vec<ModelSummary>, ApiError> {
        let body = self.get_json("/classify/models", MessageKey::Msg)?;
        serde_json::from_value(body).map_err(|err| ApiError::InvalidResponse(err.to_string()))
    }

    pub fn model_classes(&self, model_id: &str) -> Result<ModelClasses, ApiError> {
        let path = format!("/classify/classes/{}", encode_segment(model_id));
        let body = self.get_json(&path, MessageKey::Msg)?;
        serde_json::from_value(body).map_err(|err| ApiError::InvalidResponse(err.to_string()))
    }

    /// Upload `image` as `photo.jpg` and run inference with `model_id`.
    pub fn classify(&self, model_id: &str, image: &Path) -> Result<Classification, ApiError> {
        let bytes = std::fs::read(image)?;
        let mut form = MultipartForm::new();
        form.file("file", "photo.jpg", "image/jpeg", bytes)
            .text("modelId", model_id);
        let body = self.post_multipart("/classify/classify", &form, None, MessageKey::Msg)?;
        serde_json::from_value(body).map_err(|err| ApiError::InvalidResponse(err.to_string()))
    }
}

fn encode_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_summary_uses_service_field_names() {
        let parsed: Vec<ModelSummary> = serde_json::from_str(
            r#"[{"_id":"m1","name":"Roses","modelDescription":"d","modelCategory":"plants"}]"#,
        )
        .unwrap();
        assert_eq!(parsed[0].id, "m1");
        assert_eq!(parsed[0].category, "plants");
        assert_eq!(parsed[0].feature_image, None);
    }

    #[test]
    fn classification_defaults_is_other() {
        let parsed: Classification =
            serde_json::from_str(r#"{"result":"Rose","confidences":[0.9,0.1]}"#).unwrap();
        assert!(!parsed.is_other);
        assert_eq!(parsed.confidences, vec![0.9, 0.1]);
    }

    #[test]
    fn segments_are_percent_encoded() {
        assert_eq!(encode_segment("a b/c"), "a%20b%2Fc");
    }
}
