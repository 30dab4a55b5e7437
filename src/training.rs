//! Controller behind the "train new model" view.

use crate::{
    api::{ApiClient, TrainResponse},
    capture::{CaptureError, CaptureOrchestrator},
    dataset::{ClassEntry, ClassId, DatasetError, DatasetModel, ValidationIssue, validation},
    media::ImageProcessor,
    navigation::Route,
    notification::{Notification, NotificationQueue},
    session::{SessionTokenStore, TokenStore},
    submission::{self, SkippedImage},
};

/// What happened when the user pressed "train".
#[derive(Debug)]
pub enum SubmitOutcome {
    /// Nothing was sent; every problem is listed.
    Invalid(Vec<ValidationIssue>),
    NotLoggedIn,
    Trained {
        response: TrainResponse,
        skipped: Vec<SkippedImage>,
    },
    Failed {
        message: String,
        skipped: Vec<SkippedImage>,
    },
}

/// Owns the dataset being assembled, its capture sessions and the upload.
pub struct TrainingController<S: TokenStore = SessionTokenStore> {
    api: ApiClient,
    tokens: S,
    processor: Box<dyn ImageProcessor>,
    quality: f32,
    dataset: DatasetModel,
    capture: CaptureOrchestrator,
    notifications: NotificationQueue,
}

impl<S: TokenStore> TrainingController<S> {
    pub fn new(
        api: ApiClient,
        tokens: S,
        capture: CaptureOrchestrator,
        processor: Box<dyn ImageProcessor>,
        quality: f32,
    ) -> Self {
        Self {
            api,
            tokens,
            processor,
            quality,
            dataset: DatasetModel::new(),
            capture,
            notifications: NotificationQueue::default(),
        }
    }

    pub fn dataset(&self) -> &DatasetModel {
        &self.dataset
    }

    /// Metadata and class edits go straight to the model.
    pub fn dataset_mut(&mut self) -> &mut DatasetModel {
        &mut self.dataset
    }

    pub fn capture(&self) -> &CaptureOrchestrator {
        &self.capture
    }

    pub fn capture_mut(&mut self) -> &mut CaptureOrchestrator {
        &mut self.capture
    }

    /// Notifications raised by this controller and its capture sessions.
    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        for note in self.capture.notifications().drain() {
            self.notifications.push(note);
        }
        self.notifications.drain()
    }

    pub fn add_class(&mut self) -> ClassId {
        self.dataset.add_class()
    }

    /// Delete a class, closing any capture session aimed at it.
    pub fn remove_class(&mut self, id: ClassId) -> Result<ClassEntry, DatasetError> {
        let removed = self.dataset.remove_class(id)?;
        if self.capture.state().target_class() == Some(id) {
            self.capture.cancel();
        }
        Ok(removed)
    }

    pub fn open_capture(&mut self, class_id: ClassId) -> Result<(), CaptureError> {
        self.capture.open_source_select(&self.dataset, class_id)
    }

    pub fn confirm_capture(&mut self) -> Result<(), CaptureError> {
        self.capture.confirm(&mut self.dataset)
    }

    pub fn finish_multi_capture(&mut self) -> Result<usize, CaptureError> {
        self.capture.finish_multi(&mut self.dataset)
    }

    /// Apply finished capture work; returns `true` when the dataset changed.
    pub fn poll(&mut self) -> bool {
        self.capture.poll(&mut self.dataset)
    }

    /// Drop the dataset and any capture session, as when leaving the view.
    pub fn reset(&mut self) {
        self.capture.cancel();
        self.dataset = DatasetModel::new();
    }

    /// Validate, encode and upload the dataset.
    pub fn submit(&mut self) -> SubmitOutcome {
        let issues = self.dataset.validate_for_submission();
        if !issues.is_empty() {
            for message in validation::summarize(&issues) {
                self.notifications.push(Notification::error(message));
            }
            tracing::info!(issues = issues.len(), "Training blocked by validation");
            return SubmitOutcome::Invalid(issues);
        }

        let token = match self.tokens.get() {
            Ok(Some(token)) => token,
            Ok(None) => {
                self.notifications
                    .push(Notification::error("Please log in to train a model"));
                return SubmitOutcome::NotLoggedIn;
            }
            Err(err) => {
                tracing::warn!("Reading session token failed: {err}");
                self.notifications
                    .push(Notification::error("Please log in to train a model"));
                return SubmitOutcome::NotLoggedIn;
            }
        };

        self.notifications
            .push(Notification::loading("Training model…"));
        let encoded = submission::encode_dataset(&self.dataset, self.processor.as_ref(), self.quality);
        for warning in encoded.warnings() {
            self.notifications.push(warning);
        }

        match self.api.train(&encoded.form, &token) {
            Ok(response) => {
                tracing::info!(uploaded = encoded.uploaded, "Training request accepted");
                self.notifications.push(
                    Notification::success("Model trained!")
                        .with_action("Browse Models", Route::BrowseModels),
                );
                self.reset();
                SubmitOutcome::Trained {
                    response,
                    skipped: encoded.skipped,
                }
            }
            Err(err) => {
                let message = err.user_message("Training failed");
                tracing::warn!("Training request failed: {err}");
                self.notifications.push(Notification::error(message.clone()));
                SubmitOutcome::Failed {
                    message,
                    skipped: encoded.skipped,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureSettings;
    use crate::dataset::ImageRef;
    use crate::device::{DeviceError, RemoteDevice};
    use crate::media::{ImageFormat, MediaPicker, PathListPicker, ProcessError};
    use crate::session::MemoryTokenStore;
    use std::sync::Arc;
    use std::time::Duration;

    struct OfflineDevice;

    impl RemoteDevice for OfflineDevice {
        fn capture(&self) -> Result<Vec<u8>, DeviceError> {
            Err(DeviceError::Transport("offline".into()))
        }

        fn preview(&self) -> Result<Vec<u8>, DeviceError> {
            Err(DeviceError::Transport("offline".into()))
        }

        fn fetch_dataset(&self) -> Result<Vec<u8>, DeviceError> {
            Err(DeviceError::Transport("offline".into()))
        }
    }

    struct PassThrough;

    impl ImageProcessor for PassThrough {
        fn reencode(
            &self,
            _image: &ImageRef,
            _format: ImageFormat,
            _quality: f32,
        ) -> Result<Vec<u8>, ProcessError> {
            Ok(vec![0xFF, 0xD8])
        }
    }

    fn controller(tokens: MemoryTokenStore) -> TrainingController<MemoryTokenStore> {
        let picker: Arc<dyn MediaPicker> = Arc::new(PathListPicker::default());
        let capture = CaptureOrchestrator::new(
            picker,
            Arc::new(OfflineDevice),
            CaptureSettings {
                preview_interval: Duration::from_millis(50),
                batch_timeout: Duration::from_secs(1),
                cache_dir: std::env::temp_dir(),
            },
        );
        TrainingController::new(
            ApiClient::new("http://127.0.0.1:9"),
            tokens,
            capture,
            Box::new(PassThrough),
            0.9,
        )
    }

    fn fill(controller: &mut TrainingController<MemoryTokenStore>, names: [&str; 2]) {
        let dataset = controller.dataset_mut();
        dataset.name = "Pets".into();
        dataset.description = "Cats vs dogs".into();
        for (id, name) in [1, 2].into_iter().zip(names) {
            dataset.rename_class(id, name).unwrap();
            dataset
                .append_images(id, [ImageRef::new(format!("{name}.jpg"))])
                .unwrap();
        }
    }

    #[test]
    fn duplicate_names_block_training() {
        let mut controller = controller(MemoryTokenStore::default());
        fill(&mut controller, ["cat", "cat"]);
        let outcome = controller.submit();
        assert!(matches!(
            outcome,
            SubmitOutcome::Invalid(ref issues)
                if matches!(issues.as_slice(), [ValidationIssue::DuplicateName { .. }])
        ));
        let notes = controller.drain_notifications();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].message, "each class should have a unique name");
        assert_eq!(controller.dataset().total_images(), 2);
    }

    #[test]
    fn every_validation_problem_is_reported() {
        let mut controller = controller(MemoryTokenStore::default());
        controller.submit();
        let messages: Vec<_> = controller
            .drain_notifications()
            .into_iter()
            .map(|note| note.message)
            .collect();
        assert_eq!(
            messages,
            vec![
                "Please fill all fields",
                "Class names cannot be empty",
                "Add images for all classes"
            ]
        );
    }

    #[test]
    fn missing_token_stops_before_upload() {
        let mut controller = controller(MemoryTokenStore::default());
        fill(&mut controller, ["cat", "dog"]);
        assert!(matches!(controller.submit(), SubmitOutcome::NotLoggedIn));
        let notes = controller.drain_notifications();
        assert_eq!(notes[0].message, "Please log in to train a model");
    }

    #[test]
    fn service_failure_keeps_dataset() {
        let tokens = MemoryTokenStore::default();
        tokens.set("T").unwrap();
        let mut controller = controller(tokens);
        fill(&mut controller, ["cat", "dog"]);
        let outcome = controller.submit();
        assert!(matches!(outcome, SubmitOutcome::Failed { ref message, .. } if message == "Training failed"));
        assert_eq!(controller.dataset().total_images(), 2);
    }

    #[test]
    fn removing_the_capture_target_closes_the_session() {
        let mut controller = controller(MemoryTokenStore::default());
        let extra = controller.add_class();
        controller.open_capture(extra).unwrap();
        controller.remove_class(extra).unwrap();
        assert!(controller.capture().is_idle());
        assert!(matches!(
            controller.remove_class(1),
            Err(DatasetError::InvariantViolation { classes: 2 })
        ));
    }
}
