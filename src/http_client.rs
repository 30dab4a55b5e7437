//! The `ureq` agent shared by the service client and the camera device.
//!
//! Bodies are always read through a byte cap: JSON replies from the service
//! are small, while captured stills and batch archives get their own limits.

use std::io::{self, Read};
use std::sync::OnceLock;
use std::time::Duration;

use crate::config::HttpSettings;

/// Training uploads can be large; give them longer than reads.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// How often, and how patiently, an idempotent GET is retried.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RetryConfig {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryConfig {
    /// Model list and class lookups: three tries, 250ms doubling to 2s.
    pub(crate) const fn reads() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
        }
    }

    fn delay_before(&self, attempt: usize) -> Duration {
        let doublings = u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        let factor = 1u32.checked_shl(doublings).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

/// Agent with default timeouts, for clients built without a config.
pub(crate) fn agent() -> &'static ureq::Agent {
    static AGENT: OnceLock<ureq::Agent> = OnceLock::new();
    AGENT.get_or_init(|| build_agent(&HttpSettings::default()))
}

pub(crate) fn build_agent(settings: &HttpSettings) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(settings.connect_timeout_secs))
        .timeout_read(Duration::from_secs(settings.read_timeout_secs))
        .timeout_write(UPLOAD_TIMEOUT)
        .build()
}

/// Run `request` until it succeeds, `retryable` rejects the error, or attempts run out.
pub(crate) fn retry_with_backoff<T, E>(
    config: RetryConfig,
    mut request: impl FnMut() -> Result<T, E>,
    mut retryable: impl FnMut(&E) -> bool,
) -> Result<T, E> {
    let mut attempt = 1;
    loop {
        let err = match request() {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if attempt >= config.max_attempts || !retryable(&err) {
            return Err(err);
        }
        tracing::debug!(attempt, "Retrying request");
        std::thread::sleep(config.delay_before(attempt));
        attempt += 1;
    }
}

/// Whole body as bytes; more than `limit` bytes is an `InvalidData` error.
pub(crate) fn read_response_bytes(
    response: ureq::Response,
    limit: usize,
) -> Result<Vec<u8>, io::Error> {
    let declared = response
        .header("Content-Length")
        .and_then(|value| value.parse::<u64>().ok());
    if declared.is_some_and(|length| length > limit as u64) {
        return Err(too_large(limit));
    }
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(limit as u64 + 1)
        .read_to_end(&mut bytes)?;
    if bytes.len() > limit {
        return Err(too_large(limit));
    }
    Ok(bytes)
}

pub(crate) fn read_response_text(
    response: ureq::Response,
    limit: usize,
) -> Result<String, io::Error> {
    String::from_utf8(read_response_bytes(response, limit)?)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
}

fn too_large(limit: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("Response body larger than {limit} bytes"),
    )
}
