//! Browsing published models and classifying single images with them.

use std::path::{Path, PathBuf};

use crate::{
    api::{ApiClient, ApiError, Classification, ModelSummary},
    notification::{Notification, NotificationQueue},
};

/// Category filter value that matches every model.
pub const ALL_CATEGORIES: &str = "All";
pub const OTHER_ROW_LABEL: &str = "Other / uncertain";
pub const UNSURE_LABEL: &str = "Model not sure";

/// Models in `category` (or any, for [`ALL_CATEGORIES`]) whose name contains `search`, ignoring case.
pub fn filter_models<'a>(
    models: &'a [ModelSummary],
    category: &str,
    search: &str,
) -> Vec<&'a ModelSummary> {
    let needle = search.trim().to_lowercase();
    models
        .iter()
        .filter(|model| category == ALL_CATEGORIES || model.category == category)
        .filter(|model| model.name.to_lowercase().contains(&needle))
        .collect()
}

/// Model list behind the browse view.
pub struct Catalog {
    api: ApiClient,
    models: Vec<ModelSummary>,
    notifications: NotificationQueue,
}

impl Catalog {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            models: Vec::new(),
            notifications: NotificationQueue::default(),
        }
    }

    pub fn notifications(&mut self) -> &mut NotificationQueue {
        &mut self.notifications
    }

    pub fn models(&self) -> &[ModelSummary] {
        &self.models
    }

    /// Reload the model list; the previous list is kept on failure.
    pub fn refresh(&mut self) -> bool {
        match self.api.list_models() {
            Ok(models) => {
                tracing::info!(count = models.len(), "Loaded model catalog");
                self.models = models;
                true
            }
            Err(err) => {
                tracing::warn!("Loading models failed: {err}");
                self.notifications.push(Notification::error(
                    "Failed to load models. Please try again.",
                ));
                false
            }
        }
    }

    pub fn filtered(&self, category: &str, search: &str) -> Vec<&ModelSummary> {
        filter_models(&self.models, category, search)
    }
}

/// Class labels and descriptive metadata of one model.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelDetails {
    pub name: String,
    pub description: String,
    pub classes: Vec<String>,
}

/// Fetch `model_id`'s classes; `fallback_name` fills in a missing model name.
pub fn load_model_classes(
    api: &ApiClient,
    model_id: &str,
    fallback_name: &str,
) -> Result<ModelDetails, ApiError> {
    let response = api.model_classes(model_id)?;
    Ok(ModelDetails {
        name: response
            .model_name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| fallback_name.to_string()),
        description: response.model_description.unwrap_or_default(),
        classes: response.classes,
    })
}

/// One class row of the classification view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassRow {
    pub label: String,
    pub selected: bool,
    /// Confidence text, present once a result exists.
    pub confidence: Option<String>,
}

/// State of the classify view for a single model.
pub struct ClassificationView {
    api: ApiClient,
    model_id: String,
    details: ModelDetails,
    selected_image: Option<PathBuf>,
    result: Option<Classification>,
    notifications: NotificationQueue,
}

impl ClassificationView {
    pub fn new(api: ApiClient, model_id: impl Into<String>, details: ModelDetails) -> Self {
        Self {
            api,
            model_id: model_id.into(),
            details,
            selected_image: None,
            result: None,
            notifications: NotificationQueue::default(),
        }
    }

    /// Load the model's classes; on failure the view opens without them.
    pub fn open(api: ApiClient, model_id: impl Into<String>, fallback_name: &str) -> Self {
        let model_id = model_id.into();
        let loaded = load_model_classes(&api, &model_id, fallback_name);
        let mut view = Self::new(api, model_id, ModelDetails::default());
        match loaded {
            Ok(details) => view.details = details,
            Err(err) => {
                tracing::warn!("Loading model classes failed: {err}");
                view.details.name = fallback_name.to_string();
                view.notifications
                    .push(Notification::error("Failed to load model classes"));
            }
        }
        view
    }

    pub fn details(&self) -> &ModelDetails {
        &self.details
    }

    pub fn notifications(&mut self) -> &mut NotificationQueue {
        &mut self.notifications
    }

    pub fn selected_image(&self) -> Option<&Path> {
        self.selected_image.as_deref()
    }

    pub fn result(&self) -> Option<&Classification> {
        self.result.as_ref()
    }

    /// Choose a new image; any previous result no longer applies.
    pub fn select_image(&mut self, image: impl Into<PathBuf>) {
        self.selected_image = Some(image.into());
        self.result = None;
    }

    pub fn classify(&mut self) -> bool {
        let Some(image) = self.selected_image.clone() else {
            self.notifications
                .push(Notification::error("Please select an image first"));
            return false;
        };
        self.notifications
            .push(Notification::loading("Classifying image, please wait..."));
        match self.api.classify(&self.model_id, &image) {
            Ok(result) => {
                tracing::info!(model = %self.model_id, label = %result.result, "Image classified");
                self.notifications.push(Notification::success(format!(
                    "Image classified as: {}",
                    result.result
                )));
                self.result = Some(result);
                true
            }
            Err(err) => {
                tracing::warn!("Classification failed: {err}");
                self.notifications
                    .push(Notification::error("Classification failed"));
                false
            }
        }
    }

    /// Rows to display: one per class, plus an "other" row for uncertain results.
    pub fn rows(&self) -> Vec<ClassRow> {
        let mut labels: Vec<&str> = self.details.classes.iter().map(String::as_str).collect();
        if self.result.as_ref().is_some_and(|result| result.is_other) {
            labels.push(OTHER_ROW_LABEL);
        }
        labels
            .into_iter()
            .enumerate()
            .map(|(index, label)| {
                let Some(result) = &self.result else {
                    return ClassRow {
                        label: label.to_string(),
                        selected: false,
                        confidence: None,
                    };
                };
                let selected = result.result == label;
                let confidence = if selected && result.is_other {
                    Some(UNSURE_LABEL.to_string())
                } else {
                    result.confidences.get(index).map(|value| format_confidence(*value))
                };
                ClassRow {
                    label: label.to_string(),
                    selected,
                    confidence,
                }
            })
            .collect()
    }
}

pub fn format_confidence(confidence: f64) -> String {
    format!("{:.1}%", confidence * 100.0)
}
