//! Local image sources and the re-encode step applied before upload.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use image::codecs::{jpeg::JpegEncoder, png::PngEncoder};

use crate::dataset::ImageRef;

#[derive(Debug, thiserror::Error)]
pub enum PickerError {
    #[error("Image not found: {0}")]
    Missing(PathBuf),
    #[error("Picker unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to decode {path}: {message}")]
    Decode { path: PathBuf, message: String },
    #[error("Failed to encode {path}: {message}")]
    Encode { path: PathBuf, message: String },
}

/// Gallery and device-camera access.
///
/// `Ok(None)` means the user dismissed the picker; nothing should change.
pub trait MediaPicker: Send + Sync {
    /// Multi-select pick from the media library.
    fn pick_gallery(&self) -> Result<Option<Vec<ImageRef>>, PickerError>;
    /// One photo from the device camera.
    fn take_photo(&self) -> Result<Option<ImageRef>, PickerError>;
}

/// Picker backed by paths supplied up front, used by the CLI and tests.
///
/// Each camera call consumes the next queued shot; an empty queue behaves
/// like the user closing the camera.
#[derive(Debug, Default)]
pub struct PathListPicker {
    gallery: Vec<PathBuf>,
    camera_shots: Mutex<VecDeque<PathBuf>>,
}

impl PathListPicker {
    pub fn new(gallery: Vec<PathBuf>) -> Self {
        Self {
            gallery,
            camera_shots: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_camera_shots(mut self, shots: Vec<PathBuf>) -> Self {
        self.camera_shots = Mutex::new(shots.into());
        self
    }
}

impl MediaPicker for PathListPicker {
    fn pick_gallery(&self) -> Result<Option<Vec<ImageRef>>, PickerError> {
        if self.gallery.is_empty() {
            return Ok(None);
        }
        self.gallery
            .iter()
            .map(|path| existing(path).map(ImageRef::new))
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    fn take_photo(&self) -> Result<Option<ImageRef>, PickerError> {
        let next = self
            .camera_shots
            .lock()
            .map_err(|_| PickerError::Unavailable("camera queue poisoned".into()))?
            .pop_front();
        next.map(|path| existing(&path).map(ImageRef::new))
            .transpose()
    }
}

fn existing(path: &Path) -> Result<PathBuf, PickerError> {
    if path.is_file() {
        Ok(path.to_path_buf())
    } else {
        Err(PickerError::Missing(path.to_path_buf()))
    }
}

/// Upload encoding, chosen from the image's extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    /// `.png` maps to PNG; every other extension is sent as JPEG.
    pub fn for_image(image: &ImageRef) -> Self {
        if image.is_png() { Self::Png } else { Self::Jpeg }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }
}

/// Normalizes image bytes before they are attached to an upload.
pub trait ImageProcessor: Send + Sync {
    fn reencode(
        &self,
        image: &ImageRef,
        format: ImageFormat,
        quality: f32,
    ) -> Result<Vec<u8>, ProcessError>;
}

/// [`ImageProcessor`] built on the `image` crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageReencoder;

impl ImageProcessor for ImageReencoder {
    fn reencode(
        &self,
        image: &ImageRef,
        format: ImageFormat,
        quality: f32,
    ) -> Result<Vec<u8>, ProcessError> {
        let path = image.location();
        let bytes = std::fs::read(path).map_err(|source| ProcessError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let decoded = image::load_from_memory(&bytes).map_err(|err| ProcessError::Decode {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        let mut out = Vec::with_capacity(bytes.len());
        let encoded = match format {
            ImageFormat::Jpeg => decoded
                .to_rgb8()
                .write_with_encoder(JpegEncoder::new_with_quality(&mut out, jpeg_quality(quality))),
            ImageFormat::Png => decoded.write_with_encoder(PngEncoder::new(&mut out)),
        };
        encoded.map_err(|err| ProcessError::Encode {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        Ok(out)
    }
}

fn jpeg_quality(quality: f32) -> u8 {
    (quality.clamp(0.01, 1.0) * 100.0).round() as u8
}
