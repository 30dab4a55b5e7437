//! Networked camera peripheral reached over plain HTTP.

pub mod archive;

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::{app_dirs, config::ClientConfig, dataset::ImageRef, http_client};

const MAX_IMAGE_BYTES: usize = 32 * 1024 * 1024;
const MAX_ARCHIVE_BYTES: usize = 256 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Device returned HTTP {status} for {path}")]
    Status { status: u16, path: &'static str },
    #[error("Device unreachable: {0}")]
    Transport(String),
    #[error("Device sent an unreadable image: {0}")]
    Decode(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Capture endpoints of the remote camera.
///
/// Implementations block; callers run them on worker threads.
pub trait RemoteDevice: Send + Sync {
    /// One authoritative still image.
    fn capture(&self) -> Result<Vec<u8>, DeviceError>;
    /// A fresh frame for the live preview.
    fn preview(&self) -> Result<Vec<u8>, DeviceError>;
    /// Zip archive holding a batch of captured images.
    fn fetch_dataset(&self) -> Result<Vec<u8>, DeviceError>;
}

#[derive(Clone, Debug)]
pub struct HttpRemoteDevice {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpRemoteDevice {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_agent(base_url, http_client::agent().clone())
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::with_agent(&config.device_url, http_client::build_agent(&config.http))
    }

    pub fn with_agent(base_url: impl Into<String>, agent: ureq::Agent) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, agent }
    }

    /// MJPEG stream for viewers that can render it directly.
    pub fn stream_url(&self) -> String {
        format!("{}/video_stream", self.base_url)
    }

    fn get_bytes(
        &self,
        path: &'static str,
        query: Option<(&str, String)>,
        max_bytes: usize,
    ) -> Result<Vec<u8>, DeviceError> {
        let mut request = self.agent.get(&format!("{}{path}", self.base_url));
        if let Some((key, value)) = &query {
            request = request.query(key, value);
        }
        let response = match request.call() {
            Ok(response) => response,
            Err(ureq::Error::Status(status, _)) => {
                return Err(DeviceError::Status { status, path });
            }
            Err(err) => return Err(DeviceError::Transport(err.to_string())),
        };
        Ok(http_client::read_response_bytes(response, max_bytes)?)
    }
}

impl RemoteDevice for HttpRemoteDevice {
    fn capture(&self) -> Result<Vec<u8>, DeviceError> {
        tracing::debug!("Requesting capture from {}", self.base_url);
        self.get_bytes("/capture", None, MAX_IMAGE_BYTES)
    }

    fn preview(&self) -> Result<Vec<u8>, DeviceError> {
        // Unique per request so no cached frame is returned.
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or(0);
        self.get_bytes("/capture", Some(("t", stamp.to_string())), MAX_IMAGE_BYTES)
    }

    fn fetch_dataset(&self) -> Result<Vec<u8>, DeviceError> {
        tracing::debug!("Requesting batch dataset from {}", self.base_url);
        self.get_bytes("/dataset", None, MAX_ARCHIVE_BYTES)
    }
}

/// Check that `bytes` hold a JPEG or PNG and write them to a uniquely named file in `dir`.
pub fn save_captured_image(bytes: &[u8], dir: &Path) -> Result<ImageRef, DeviceError> {
    let extension = match image::guess_format(bytes) {
        Ok(image::ImageFormat::Png) => "png",
        Ok(image::ImageFormat::Jpeg) => "jpg",
        Ok(other) => {
            return Err(DeviceError::Decode(format!("unsupported format {other:?}")));
        }
        Err(err) => return Err(DeviceError::Decode(err.to_string())),
    };
    std::fs::create_dir_all(dir)?;
    let path = dir.join(app_dirs::unique_name("capture", extension));
    std::fs::write(&path, bytes)?;
    Ok(ImageRef::new(path))
}
