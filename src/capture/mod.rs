//! Image acquisition for one class at a time.
//!
//! A single [`CaptureState`] value describes the active capture session.
//! Blocking collaborator calls (picker, camera, remote device) run on worker
//! threads and report back through a channel drained by
//! [`CaptureOrchestrator::poll`], which is the only place results touch the
//! dataset. Each session has a generation number; results tagged with an
//! older generation are discarded, so cancelling never races a late commit.

mod jobs;
mod preview;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::{
    config::ClientConfig,
    dataset::{ClassId, DatasetError, DatasetModel, ImageRef},
    device::{DeviceError, RemoteDevice, archive::ArchiveError},
    media::{MediaPicker, PickerError},
    notification::{Notification, NotificationQueue},
};

use jobs::{CaptureJobs, CaptureMessage};
pub use preview::{PreviewFrame, PreviewPoller};

/// Nominal number of images the device returns per batch.
pub const BATCH_SIZE: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("{0}")]
    Device(#[from] DeviceError),
    #[error("{0}")]
    Archive(#[from] ArchiveError),
    #[error("{0}")]
    Picker(#[from] PickerError),
    #[error("{0}")]
    Dataset(#[from] DatasetError),
    #[error("Timed out reading images from Raspberry Pi")]
    TimedOut,
    #[error("Cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },
}

/// Where a pending single image came from; decides what "retake" does.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfirmOrigin {
    Camera,
    Remote,
}

/// Coarse capture mode of the current session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureMode {
    None,
    SingleRemote,
    BatchRemote,
    MultiLocalCamera,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    SourceSelect {
        class_id: ClassId,
    },
    GalleryPick {
        class_id: ClassId,
    },
    CameraSingle {
        class_id: ClassId,
    },
    CameraMulti {
        class_id: ClassId,
        buffer: Vec<ImageRef>,
        shooting: bool,
    },
    RemoteOptions {
        class_id: ClassId,
    },
    RemoteSingleLivePreview {
        class_id: ClassId,
        capturing: bool,
    },
    RemoteBatchPreview {
        class_id: ClassId,
    },
    RemoteBatchCapturing {
        class_id: ClassId,
        deadline: Instant,
    },
    Confirm {
        class_id: ClassId,
        pending: ImageRef,
        origin: ConfirmOrigin,
    },
}

impl CaptureState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::SourceSelect { .. } => "choosing a source",
            Self::GalleryPick { .. } => "picking from the gallery",
            Self::CameraSingle { .. } => "taking a photo",
            Self::CameraMulti { .. } => "taking photos",
            Self::RemoteOptions { .. } => "choosing a remote capture mode",
            Self::RemoteSingleLivePreview { .. } => "previewing the remote camera",
            Self::RemoteBatchPreview { .. } => "previewing a batch capture",
            Self::RemoteBatchCapturing { .. } => "capturing a batch",
            Self::Confirm { .. } => "confirming a capture",
        }
    }

    /// Class that receives accepted images, if a session is active.
    pub fn target_class(&self) -> Option<ClassId> {
        match self {
            Self::Idle => None,
            Self::SourceSelect { class_id }
            | Self::GalleryPick { class_id }
            | Self::CameraSingle { class_id }
            | Self::CameraMulti { class_id, .. }
            | Self::RemoteOptions { class_id }
            | Self::RemoteSingleLivePreview { class_id, .. }
            | Self::RemoteBatchPreview { class_id }
            | Self::RemoteBatchCapturing { class_id, .. }
            | Self::Confirm { class_id, .. } => Some(*class_id),
        }
    }

    pub fn mode(&self) -> CaptureMode {
        match self {
            Self::CameraMulti { .. } => CaptureMode::MultiLocalCamera,
            Self::RemoteSingleLivePreview { .. }
            | Self::Confirm {
                origin: ConfirmOrigin::Remote,
                ..
            } => CaptureMode::SingleRemote,
            Self::RemoteBatchPreview { .. } | Self::RemoteBatchCapturing { .. } => {
                CaptureMode::BatchRemote
            }
            _ => CaptureMode::None,
        }
    }

    /// Images captured but not yet committed to the dataset.
    pub fn pending_images(&self) -> &[ImageRef] {
        match self {
            Self::CameraMulti { buffer, .. } => buffer,
            Self::Confirm { pending, .. } => std::slice::from_ref(pending),
            _ => &[],
        }
    }
}

#[derive(Clone, Debug)]
pub struct CaptureSettings {
    pub preview_interval: Duration,
    pub batch_timeout: Duration,
    /// Directory receiving captured stills and unpacked batch archives.
    pub cache_dir: PathBuf,
}

impl CaptureSettings {
    pub fn from_config(config: &ClientConfig, cache_dir: PathBuf) -> Self {
        Self {
            preview_interval: config.preview_interval(),
            batch_timeout: config.batch_timeout(),
            cache_dir,
        }
    }
}

pub struct CaptureOrchestrator {
    picker: Arc<dyn MediaPicker>,
    device: Arc<dyn RemoteDevice>,
    settings: CaptureSettings,
    state: CaptureState,
    session: u64,
    jobs: CaptureJobs,
    preview: Option<PreviewPoller>,
    notifications: NotificationQueue,
}

impl CaptureOrchestrator {
    pub fn new(
        picker: Arc<dyn MediaPicker>,
        device: Arc<dyn RemoteDevice>,
        settings: CaptureSettings,
    ) -> Self {
        Self {
            picker,
            device,
            settings,
            state: CaptureState::Idle,
            session: 0,
            jobs: CaptureJobs::new(),
            preview: None,
            notifications: NotificationQueue::default(),
        }
    }

    pub fn state(&self) -> &CaptureState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == CaptureState::Idle
    }

    pub fn notifications(&mut self) -> &mut NotificationQueue {
        &mut self.notifications
    }

    pub fn preview_active(&self) -> bool {
        self.preview.as_ref().is_some_and(PreviewPoller::is_running)
    }

    /// Latest live-preview frame, while a preview is open.
    pub fn preview_frame(&self) -> Option<PreviewFrame> {
        self.preview.as_ref().and_then(PreviewPoller::latest_frame)
    }

    /// Open the source chooser for `class_id`, replacing any active session.
    pub fn open_source_select(
        &mut self,
        dataset: &DatasetModel,
        class_id: ClassId,
    ) -> Result<(), CaptureError> {
        if !dataset.contains_class(class_id) {
            return Err(DatasetError::UnknownClass(class_id).into());
        }
        self.end_session();
        self.session += 1;
        tracing::debug!(class_id, session = self.session, "Capture session opened");
        self.state = CaptureState::SourceSelect { class_id };
        Ok(())
    }

    pub fn choose_gallery(&mut self) -> Result<(), CaptureError> {
        let class_id = self.source_select_target("pick from the gallery")?;
        self.state = CaptureState::GalleryPick { class_id };
        self.jobs
            .spawn_gallery_pick(self.session, Arc::clone(&self.picker));
        Ok(())
    }

    pub fn choose_camera_single(&mut self) -> Result<(), CaptureError> {
        let class_id = self.source_select_target("take a single photo")?;
        self.state = CaptureState::CameraSingle { class_id };
        self.jobs
            .spawn_take_photo(self.session, Arc::clone(&self.picker));
        Ok(())
    }

    pub fn choose_camera_multi(&mut self) -> Result<(), CaptureError> {
        let class_id = self.source_select_target("take photos")?;
        self.state = CaptureState::CameraMulti {
            class_id,
            buffer: Vec::new(),
            shooting: false,
        };
        Ok(())
    }

    /// Take one more photo into the multi-capture buffer.
    pub fn take_photo(&mut self) -> Result<(), CaptureError> {
        match &mut self.state {
            CaptureState::CameraMulti { shooting, .. } => {
                if *shooting {
                    return Ok(());
                }
                *shooting = true;
            }
            other => return Err(invalid("take a photo", other)),
        }
        self.jobs
            .spawn_take_photo(self.session, Arc::clone(&self.picker));
        Ok(())
    }

    /// Commit every buffered photo at once and close the session.
    pub fn finish_multi(&mut self, dataset: &mut DatasetModel) -> Result<usize, CaptureError> {
        let CaptureState::CameraMulti {
            class_id, buffer, ..
        } = &self.state
        else {
            return Err(invalid("finish taking photos", &self.state));
        };
        let class_id = *class_id;
        let buffer = buffer.clone();
        let committed = buffer.len();
        let result = dataset.append_images(class_id, buffer);
        self.end_session();
        result?;
        tracing::info!(class_id, committed, "Committed camera photos");
        Ok(committed)
    }

    pub fn choose_remote(&mut self) -> Result<(), CaptureError> {
        let class_id = self.source_select_target("use the remote camera")?;
        self.state = CaptureState::RemoteOptions { class_id };
        Ok(())
    }

    pub fn choose_remote_single(&mut self) -> Result<(), CaptureError> {
        let class_id = self.remote_options_target("open the live preview")?;
        self.enter_live_preview(class_id);
        Ok(())
    }

    pub fn choose_remote_batch(&mut self) -> Result<(), CaptureError> {
        let class_id = self.remote_options_target("prepare a batch capture")?;
        self.start_preview();
        self.state = CaptureState::RemoteBatchPreview { class_id };
        Ok(())
    }

    /// Request one authoritative still from the remote camera.
    pub fn capture_remote(&mut self) -> Result<(), CaptureError> {
        match &mut self.state {
            CaptureState::RemoteSingleLivePreview { capturing, .. } => {
                if *capturing {
                    return Ok(());
                }
                *capturing = true;
            }
            other => return Err(invalid("capture from the remote camera", other)),
        }
        self.notifications
            .push(Notification::loading("Capturing image from Raspberry Pi..."));
        self.jobs.spawn_remote_capture(
            self.session,
            Arc::clone(&self.device),
            self.settings.cache_dir.clone(),
        );
        Ok(())
    }

    pub fn start_batch(&mut self) -> Result<(), CaptureError> {
        let CaptureState::RemoteBatchPreview { class_id } = self.state else {
            return Err(invalid("start a batch capture", &self.state));
        };
        self.stop_preview();
        self.notifications.push(Notification::loading(format!(
            "Capturing {BATCH_SIZE} images from Raspberry Pi..."
        )));
        self.state = CaptureState::RemoteBatchCapturing {
            class_id,
            deadline: Instant::now() + self.settings.batch_timeout,
        };
        self.jobs.spawn_batch_capture(
            self.session,
            Arc::clone(&self.device),
            self.settings.cache_dir.clone(),
        );
        Ok(())
    }

    /// Discard the pending image and capture again.
    pub fn retake(&mut self) -> Result<(), CaptureError> {
        let CaptureState::Confirm {
            class_id, origin, ..
        } = self.state
        else {
            return Err(invalid("retake", &self.state));
        };
        match origin {
            ConfirmOrigin::Remote => self.enter_live_preview(class_id),
            ConfirmOrigin::Camera => {
                self.state = CaptureState::CameraSingle { class_id };
                self.jobs
                    .spawn_take_photo(self.session, Arc::clone(&self.picker));
            }
        }
        Ok(())
    }

    /// Append the pending image to its class and close the session.
    pub fn confirm(&mut self, dataset: &mut DatasetModel) -> Result<(), CaptureError> {
        let CaptureState::Confirm {
            class_id, pending, ..
        } = &self.state
        else {
            return Err(invalid("confirm", &self.state));
        };
        let class_id = *class_id;
        let pending = pending.clone();
        self.end_session();
        match dataset.append_images(class_id, [pending]) {
            Ok(_) => {
                self.notifications
                    .push(Notification::success("Image added to class"));
                Ok(())
            }
            Err(err) => {
                self.notifications
                    .push(Notification::error(format!("Failed: {err}")));
                Err(err.into())
            }
        }
    }

    /// Close the active session without touching the dataset.
    pub fn cancel(&mut self) {
        if !self.is_idle() {
            tracing::debug!(state = self.state.name(), "Capture session cancelled");
        }
        self.end_session();
    }

    /// Apply finished worker results and expire the batch timeout.
    ///
    /// Returns `true` when the dataset changed.
    pub fn poll(&mut self, dataset: &mut DatasetModel) -> bool {
        let mut changed = false;
        loop {
            let message = match self.jobs.try_recv_message() {
                Ok(message) => message,
                Err(
                    std::sync::mpsc::TryRecvError::Empty
                    | std::sync::mpsc::TryRecvError::Disconnected,
                ) => break,
            };
            if message.session() != self.session {
                tracing::debug!(
                    stale = message.session(),
                    current = self.session,
                    "Dropping stale capture result"
                );
                continue;
            }
            changed |= self.apply(message, dataset);
        }
        if let CaptureState::RemoteBatchCapturing { deadline, .. } = self.state
            && Instant::now() >= deadline
        {
            tracing::warn!("Batch capture timed out");
            self.notifications
                .push(Notification::error(CaptureError::TimedOut.to_string()));
            self.end_session();
        }
        changed
    }

    fn apply(&mut self, message: CaptureMessage, dataset: &mut DatasetModel) -> bool {
        match message {
            CaptureMessage::GalleryPicked { result, .. } => {
                let CaptureState::GalleryPick { class_id } = self.state else {
                    return false;
                };
                self.end_session();
                match result {
                    Ok(Some(images)) => self.commit(dataset, class_id, images),
                    Ok(None) => false,
                    Err(err) => {
                        tracing::warn!("Gallery pick failed: {err}");
                        self.notifications
                            .push(Notification::error("Failed to pick images"));
                        false
                    }
                }
            }
            CaptureMessage::PhotoTaken { result, .. } => self.apply_photo(result),
            CaptureMessage::RemoteCaptured { result, .. } => {
                let CaptureState::RemoteSingleLivePreview { class_id, .. } = self.state else {
                    return false;
                };
                match result {
                    Ok(pending) => {
                        self.stop_preview();
                        self.state = CaptureState::Confirm {
                            class_id,
                            pending,
                            origin: ConfirmOrigin::Remote,
                        };
                        self.notifications.push(Notification::success(
                            "Image captured. Confirm to add to class.",
                        ));
                    }
                    Err(err) => {
                        tracing::warn!("Remote capture failed: {err}");
                        self.state = CaptureState::RemoteSingleLivePreview {
                            class_id,
                            capturing: false,
                        };
                        self.notifications
                            .push(Notification::error(format!("Failed: {err}")));
                    }
                }
                false
            }
            CaptureMessage::BatchUnpacked {
                result,
                finished_at,
                ..
            } => {
                let CaptureState::RemoteBatchCapturing { class_id, deadline } = self.state else {
                    return false;
                };
                self.end_session();
                if finished_at >= deadline {
                    tracing::warn!("Batch capture finished after its deadline");
                    self.notifications
                        .push(Notification::error(CaptureError::TimedOut.to_string()));
                    return false;
                }
                match result {
                    Ok(images) => {
                        let count = images.len();
                        let changed = self.commit(dataset, class_id, images);
                        if changed {
                            self.notifications.push(Notification::success(format!(
                                "Captured {count} images from Raspberry Pi"
                            )));
                        }
                        changed
                    }
                    Err(CaptureError::Archive(ArchiveError::NoImages)) => {
                        self.notifications
                            .push(Notification::error(ArchiveError::NoImages.to_string()));
                        false
                    }
                    Err(err) => {
                        tracing::warn!("Batch capture failed: {err}");
                        self.notifications
                            .push(Notification::error(format!("Failed: {err}")));
                        false
                    }
                }
            }
        }
    }

    fn apply_photo(&mut self, result: Result<Option<ImageRef>, PickerError>) -> bool {
        match &mut self.state {
            CaptureState::CameraMulti {
                buffer, shooting, ..
            } => {
                *shooting = false;
                match result {
                    Ok(Some(image)) => buffer.push(image),
                    Ok(None) => {}
                    Err(err) => {
                        tracing::warn!("Camera capture failed: {err}");
                        self.notifications
                            .push(Notification::error("Failed to take photo"));
                    }
                }
            }
            CaptureState::CameraSingle { class_id } => {
                let class_id = *class_id;
                match result {
                    Ok(Some(pending)) => {
                        self.state = CaptureState::Confirm {
                            class_id,
                            pending,
                            origin: ConfirmOrigin::Camera,
                        };
                    }
                    Ok(None) => self.end_session(),
                    Err(err) => {
                        tracing::warn!("Camera capture failed: {err}");
                        self.end_session();
                        self.notifications
                            .push(Notification::error("Failed to take photo"));
                    }
                }
            }
            _ => {}
        }
        false
    }

    fn commit(&mut self, dataset: &mut DatasetModel, class_id: ClassId, images: Vec<ImageRef>) -> bool {
        let count = images.len();
        match dataset.append_images(class_id, images) {
            Ok(_) => {
                tracing::info!(class_id, count, "Images added to class");
                count > 0
            }
            Err(err) => {
                self.notifications
                    .push(Notification::error(format!("Failed: {err}")));
                false
            }
        }
    }

    fn source_select_target(&self, action: &'static str) -> Result<ClassId, CaptureError> {
        match self.state {
            CaptureState::SourceSelect { class_id } => Ok(class_id),
            ref other => Err(invalid(action, other)),
        }
    }

    fn remote_options_target(&self, action: &'static str) -> Result<ClassId, CaptureError> {
        match self.state {
            CaptureState::RemoteOptions { class_id } => Ok(class_id),
            ref other => Err(invalid(action, other)),
        }
    }

    fn enter_live_preview(&mut self, class_id: ClassId) {
        self.start_preview();
        self.state = CaptureState::RemoteSingleLivePreview {
            class_id,
            capturing: false,
        };
    }

    fn start_preview(&mut self) {
        self.stop_preview();
        self.preview = Some(PreviewPoller::start(
            Arc::clone(&self.device),
            self.settings.preview_interval,
        ));
    }

    fn stop_preview(&mut self) {
        if let Some(mut poller) = self.preview.take() {
            poller.stop();
        }
    }

    /// Stop background work and return to `Idle`; in-flight results become stale.
    fn end_session(&mut self) {
        self.stop_preview();
        if !self.is_idle() {
            self.session += 1;
        }
        self.state = CaptureState::Idle;
    }
}

fn invalid(action: &'static str, state: &CaptureState) -> CaptureError {
    CaptureError::InvalidTransition {
        action,
        state: state.name(),
    }
}
