use std::path::PathBuf;
use std::sync::{
    Arc,
    mpsc::{Receiver, Sender},
};
use std::thread;
use std::time::Instant;

use super::CaptureError;
use crate::{
    dataset::ImageRef,
    device::{self, RemoteDevice, archive},
    media::{MediaPicker, PickerError},
};

type TryRecvError = std::sync::mpsc::TryRecvError;

/// Results coming back from capture workers.
///
/// Every message carries the session it was started for; the orchestrator
/// drops messages whose session is no longer current.
#[derive(Debug)]
pub(crate) enum CaptureMessage {
    GalleryPicked {
        session: u64,
        result: Result<Option<Vec<ImageRef>>, PickerError>,
    },
    PhotoTaken {
        session: u64,
        result: Result<Option<ImageRef>, PickerError>,
    },
    RemoteCaptured {
        session: u64,
        result: Result<ImageRef, CaptureError>,
    },
    BatchUnpacked {
        session: u64,
        result: Result<Vec<ImageRef>, CaptureError>,
        /// When the worker finished; compared against the batch deadline.
        finished_at: Instant,
    },
}

impl CaptureMessage {
    pub(crate) fn session(&self) -> u64 {
        match self {
            Self::GalleryPicked { session, .. }
            | Self::PhotoTaken { session, .. }
            | Self::RemoteCaptured { session, .. }
            | Self::BatchUnpacked { session, .. } => *session,
        }
    }
}

pub(crate) struct CaptureJobs {
    message_tx: Sender<CaptureMessage>,
    message_rx: Receiver<CaptureMessage>,
}

impl CaptureJobs {
    pub(crate) fn new() -> Self {
        let (message_tx, message_rx) = std::sync::mpsc::channel::<CaptureMessage>();
        Self {
            message_tx,
            message_rx,
        }
    }

    pub(crate) fn try_recv_message(&self) -> Result<CaptureMessage, TryRecvError> {
        self.message_rx.try_recv()
    }

    pub(crate) fn spawn_gallery_pick(&self, session: u64, picker: Arc<dyn MediaPicker>) {
        let tx = self.message_tx.clone();
        thread::spawn(move || {
            let result = picker.pick_gallery();
            let _ = tx.send(CaptureMessage::GalleryPicked { session, result });
        });
    }

    pub(crate) fn spawn_take_photo(&self, session: u64, picker: Arc<dyn MediaPicker>) {
        let tx = self.message_tx.clone();
        thread::spawn(move || {
            let result = picker.take_photo();
            let _ = tx.send(CaptureMessage::PhotoTaken { session, result });
        });
    }

    pub(crate) fn spawn_remote_capture(
        &self,
        session: u64,
        device: Arc<dyn RemoteDevice>,
        cache_dir: PathBuf,
    ) {
        let tx = self.message_tx.clone();
        thread::spawn(move || {
            let result = device
                .capture()
                .and_then(|bytes| device::save_captured_image(&bytes, &cache_dir))
                .map_err(CaptureError::from);
            let _ = tx.send(CaptureMessage::RemoteCaptured { session, result });
        });
    }

    pub(crate) fn spawn_batch_capture(
        &self,
        session: u64,
        device: Arc<dyn RemoteDevice>,
        cache_dir: PathBuf,
    ) {
        let tx = self.message_tx.clone();
        thread::spawn(move || {
            let result = device
                .fetch_dataset()
                .map_err(CaptureError::from)
                .and_then(|bytes| {
                    archive::unpack_batch(&bytes, &cache_dir).map_err(CaptureError::from)
                });
            let _ = tx.send(CaptureMessage::BatchUnpacked {
                session,
                result,
                finished_at: Instant::now(),
            });
        });
    }
}
