//! Pseudo-live preview: the remote camera is polled for stills at a fixed cadence.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
    mpsc::{self, RecvTimeoutError, Sender},
};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::device::RemoteDevice;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreviewFrame {
    /// Monotonic request number; a higher value is always a newer frame.
    pub sequence: u64,
    pub bytes: Vec<u8>,
}

/// Background preview loop with exactly one request in flight at a time.
///
/// Dropping the poller stops it. A request already in flight when stopped
/// finishes on its own but its frame is discarded, and no new request starts.
pub struct PreviewPoller {
    cancel: Arc<AtomicBool>,
    wake_tx: Option<Sender<()>>,
    latest: Arc<Mutex<Option<PreviewFrame>>>,
    handle: Option<JoinHandle<()>>,
}

impl PreviewPoller {
    pub fn start(device: Arc<dyn RemoteDevice>, interval: Duration) -> Self {
        let cancel = Arc::new(AtomicBool::new(false));
        let latest = Arc::new(Mutex::new(None));
        let (wake_tx, wake_rx) = mpsc::channel::<()>();
        let thread_cancel = Arc::clone(&cancel);
        let thread_latest = Arc::clone(&latest);
        let handle = thread::spawn(move || {
            let mut sequence = 0u64;
            while !thread_cancel.load(Ordering::Acquire) {
                sequence += 1;
                let started = Instant::now();
                let result = device.preview();
                if thread_cancel.load(Ordering::Acquire) {
                    break;
                }
                match result {
                    Ok(bytes) => publish(&thread_latest, PreviewFrame { sequence, bytes }),
                    Err(err) => tracing::debug!("Preview refresh failed: {err}"),
                }
                // Request time counts toward the interval so the cadence stays fixed.
                match wake_rx.recv_timeout(interval.saturating_sub(started.elapsed())) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            tracing::debug!("Preview poller exited after {sequence} requests");
        });
        Self {
            cancel,
            wake_tx: Some(wake_tx),
            latest,
            handle: Some(handle),
        }
    }

    /// Newest frame received so far.
    pub fn latest_frame(&self) -> Option<PreviewFrame> {
        self.latest.lock().ok().and_then(|frame| frame.clone())
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.load(Ordering::Acquire)
    }

    /// Signal the loop to exit without waiting for it.
    pub fn stop(&mut self) {
        self.cancel.store(true, Ordering::Release);
        self.wake_tx.take();
    }

    /// Stop and block until the loop thread has exited.
    pub fn stop_and_join(mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PreviewPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

fn publish(latest: &Mutex<Option<PreviewFrame>>, frame: PreviewFrame) {
    let Ok(mut slot) = latest.lock() else {
        return;
    };
    if slot
        .as_ref()
        .is_none_or(|current| current.sequence < frame.sequence)
    {
        *slot = Some(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceError;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    #[derive(Default)]
    struct CountingDevice {
        requests: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl RemoteDevice for CountingDevice {
        fn capture(&self) -> Result<Vec<u8>, DeviceError> {
            Ok(Vec::new())
        }

        fn preview(&self) -> Result<Vec<u8>, DeviceError> {
            let count = self.requests.fetch_add(1, Ordering::SeqCst) + 1;
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(5));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(count.to_le_bytes().to_vec())
        }

        fn fetch_dataset(&self) -> Result<Vec<u8>, DeviceError> {
            Ok(Vec::new())
        }
    }

    fn wait_for(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not met in time");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn polls_one_request_at_a_time_and_keeps_newest() {
        let device = Arc::new(CountingDevice::default());
        let poller = PreviewPoller::start(device.clone(), Duration::from_millis(1));
        wait_for(|| device.requests.load(Ordering::SeqCst) >= 5);
        wait_for(|| poller.latest_frame().is_some_and(|frame| frame.sequence >= 3));
        poller.stop_and_join();
        assert_eq!(device.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn no_requests_after_stop() {
        let device = Arc::new(CountingDevice::default());
        let poller = PreviewPoller::start(device.clone(), Duration::from_millis(1));
        wait_for(|| device.requests.load(Ordering::SeqCst) >= 2);
        poller.stop_and_join();
        let after_stop = device.requests.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(device.requests.load(Ordering::SeqCst), after_stop);
        assert_eq!(device.in_flight.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn stop_interrupts_the_wait_between_refreshes() {
        let device = Arc::new(CountingDevice::default());
        let poller = PreviewPoller::start(device.clone(), Duration::from_secs(60));
        wait_for(|| device.requests.load(Ordering::SeqCst) == 1);
        let started = Instant::now();
        poller.stop_and_join();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(device.requests.load(Ordering::SeqCst), 1);
    }

    struct SlowDevice {
        latency: Duration,
        starts: Mutex<Vec<Instant>>,
    }

    impl RemoteDevice for SlowDevice {
        fn capture(&self) -> Result<Vec<u8>, DeviceError> {
            Ok(Vec::new())
        }

        fn preview(&self) -> Result<Vec<u8>, DeviceError> {
            self.starts.lock().unwrap().push(Instant::now());
            thread::sleep(self.latency);
            Ok(vec![1])
        }

        fn fetch_dataset(&self) -> Result<Vec<u8>, DeviceError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn cadence_includes_request_latency() {
        let device = Arc::new(SlowDevice {
            latency: Duration::from_millis(80),
            starts: Mutex::new(Vec::new()),
        });
        let poller = PreviewPoller::start(device.clone(), Duration::from_millis(100));
        wait_for(|| device.starts.lock().unwrap().len() >= 5);
        poller.stop_and_join();
        let starts = device.starts.lock().unwrap();
        let span = starts[4].duration_since(starts[0]);
        // Four gaps of the 100ms interval; waiting a full interval after each reply would take 720ms.
        assert!(span < Duration::from_millis(600), "refreshes drifted: {span:?}");
    }

    #[test]
    fn stale_frames_never_replace_newer_ones() {
        let latest = Mutex::new(None);
        publish(&latest, PreviewFrame { sequence: 4, bytes: vec![4] });
        publish(&latest, PreviewFrame { sequence: 3, bytes: vec![3] });
        assert_eq!(latest.lock().unwrap().as_ref().unwrap().sequence, 4);
    }
}
