// SPDX-License-Identifier: GPL-3.0-only

//! Camera capture
//!
//! [`CaptureSource`] owns a [`SensorDevice`] and a dedicated capture thread.
//! The thread opens and configures the device, then repeatedly acquires the
//! latest sensor frame, converts it to NV21, releases the native frame and
//! hands the converted buffer to the registered callback.
//!
//! ```text
//! Idle → Opening → Streaming → (Error | Stopped)
//! ```
//!
//! Open and configure failures move the source to `Error` without retrying;
//! another `start()` is needed. `stop()` joins the thread and is idempotent.

pub mod gst_sensor;
pub mod synthetic;
pub mod types;
pub mod v4l2_utils;

pub use gst_sensor::GstSensor;
pub use synthetic::SyntheticSensor;
pub use types::{CaptureConfig, CaptureState, RawSensorFrame, SourceKind};

use crate::constants::{capture, timing};
use crate::errors::{CaptureError, CaptureResult};
use crate::media::{ConvertedFrame, convert_frame};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// A camera that delivers planar YUV frames on demand
///
/// All methods are called from the capture thread only.
pub trait SensorDevice: Send + 'static {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Open the device node / stream
    fn open(&mut self) -> CaptureResult<()>;

    /// Apply the sink configuration and start streaming
    fn configure(&mut self, config: &CaptureConfig) -> CaptureResult<()>;

    /// Wait up to `timeout` for a frame and return the newest one available.
    ///
    /// Older undelivered frames are discarded. `Ok(None)` means nothing
    /// arrived within the timeout.
    fn acquire_latest(&mut self, timeout: Duration) -> CaptureResult<Option<RawSensorFrame>>;

    /// Stop streaming and release the device
    fn close(&mut self);
}

/// Per-frame callback, run synchronously on the capture thread
pub type FrameCallback = Arc<dyn Fn(ConvertedFrame) + Send + Sync>;

/// State shared between the owner and the capture thread
struct CaptureShared {
    state: AtomicU8,
    stop: AtomicBool,
    sensor: Mutex<Option<Box<dyn SensorDevice>>>,
    last_error: Mutex<Option<CaptureError>>,
    frames_captured: AtomicU64,
    frames_failed: AtomicU64,
}

impl CaptureShared {
    fn state(&self) -> CaptureState {
        CaptureState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: CaptureState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn fail(&self, err: CaptureError) {
        error!(error = %err, "Capture session failed");
        if let Ok(mut last) = self.last_error.lock() {
            *last = Some(err);
        }
        self.set_state(CaptureState::Error);
    }

    fn return_sensor(&self, sensor: Box<dyn SensorDevice>) {
        if let Ok(mut slot) = self.sensor.lock() {
            *slot = Some(sensor);
        }
    }
}

/// Camera device plus its capture thread
pub struct CaptureSource {
    config: CaptureConfig,
    on_frame: FrameCallback,
    shared: Arc<CaptureShared>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureSource {
    pub fn new(sensor: Box<dyn SensorDevice>, config: CaptureConfig, on_frame: FrameCallback) -> Self {
        Self {
            config,
            on_frame,
            shared: Arc::new(CaptureShared {
                state: AtomicU8::new(CaptureState::Idle as u8),
                stop: AtomicBool::new(false),
                sensor: Mutex::new(Some(sensor)),
                last_error: Mutex::new(None),
                frames_captured: AtomicU64::new(0),
                frames_failed: AtomicU64::new(0),
            }),
            thread: None,
        }
    }

    /// Spawn the capture thread, which opens the device asynchronously.
    ///
    /// Returns once the thread is running; open/configure failures show up
    /// later as [`CaptureState::Error`] and in [`CaptureSource::last_error`].
    pub fn start(&mut self) -> CaptureResult<()> {
        if self.shared.state().is_active() {
            return Err(CaptureError::AlreadyRunning);
        }

        // A previous session that ended in Error still has a finished thread
        self.join_thread();

        let has_sensor = self
            .shared
            .sensor
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(false);
        if !has_sensor {
            return Err(CaptureError::DeviceOpenFailed(
                "sensor was lost by a previous capture thread".into(),
            ));
        }

        self.shared.stop.store(false, Ordering::Release);
        if let Ok(mut last) = self.shared.last_error.lock() {
            *last = None;
        }
        self.shared.set_state(CaptureState::Opening);

        let shared = Arc::clone(&self.shared);
        let config = self.config.clone();
        let on_frame = Arc::clone(&self.on_frame);

        let handle = std::thread::Builder::new()
            .name(capture::THREAD_NAME.to_string())
            .spawn(move || capture_loop(shared, config, on_frame))
            .map_err(|e| {
                let err = CaptureError::ThreadSpawn(e.to_string());
                self.shared.fail(err.clone());
                err
            })?;

        self.thread = Some(handle);
        info!(config = %self.config, "Capture thread started");
        Ok(())
    }

    /// Stop streaming, close the device and join the capture thread
    pub fn stop(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        if self.thread.is_none() {
            return;
        }

        self.join_thread();
        if self.shared.state().is_active() {
            self.shared.set_state(CaptureState::Stopped);
        }
        info!(
            state = %self.shared.state(),
            frames = self.frames_captured(),
            "Capture stopped"
        );
    }

    pub fn state(&self) -> CaptureState {
        self.shared.state()
    }

    /// Error that ended the most recent session, if any
    pub fn last_error(&self) -> Option<CaptureError> {
        self.shared.last_error.lock().ok().and_then(|e| e.clone())
    }

    /// Frames converted and delivered to the callback since creation
    pub fn frames_captured(&self) -> u64 {
        self.shared.frames_captured.load(Ordering::Relaxed)
    }

    /// Frames lost to transient acquisition errors
    pub fn frames_failed(&self) -> u64 {
        self.shared.frames_failed.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    fn join_thread(&mut self) {
        let Some(handle) = self.thread.take() else {
            return;
        };
        if handle.join().is_err() {
            self.shared
                .fail(CaptureError::StreamFailed("capture thread panicked".into()));
        }
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_loop(shared: Arc<CaptureShared>, config: CaptureConfig, on_frame: FrameCallback) {
    let Some(mut sensor) = shared.sensor.lock().ok().and_then(|mut s| s.take()) else {
        shared.fail(CaptureError::DeviceOpenFailed("no sensor available".into()));
        return;
    };

    info!(sensor = sensor.name(), "Opening camera device");
    if let Err(e) = sensor.open() {
        shared.fail(e);
        shared.return_sensor(sensor);
        return;
    }

    if let Err(e) = sensor.configure(&config) {
        sensor.close();
        shared.fail(e);
        shared.return_sensor(sensor);
        return;
    }

    // stop() may have raced with open/configure
    if shared.stop.load(Ordering::Acquire) {
        sensor.close();
        shared.set_state(CaptureState::Stopped);
        shared.return_sensor(sensor);
        return;
    }

    shared.set_state(CaptureState::Streaming);
    info!(sensor = sensor.name(), config = %config, "Camera streaming");

    let timeout = Duration::from_millis(timing::ACQUIRE_TIMEOUT_MS);
    let mut sequence: u64 = 0;

    while !shared.stop.load(Ordering::Acquire) {
        match sensor.acquire_latest(timeout) {
            Ok(Some(raw)) => {
                sequence += 1;
                let frame = convert_frame(&raw, sequence);
                // Release the native buffer before running the callback
                drop(raw);

                let count = shared.frames_captured.fetch_add(1, Ordering::Relaxed) + 1;
                if count % timing::FRAME_LOG_INTERVAL == 0 {
                    debug!(
                        frame = count,
                        sequence,
                        width = frame.width,
                        height = frame.height,
                        "Frame captured"
                    );
                }

                on_frame(frame);
            }
            Ok(None) => continue,
            Err(e) if e.is_transient() => {
                let failed = shared.frames_failed.fetch_add(1, Ordering::Relaxed) + 1;
                if failed % timing::FRAME_LOG_INTERVAL == 1 {
                    warn!(error = %e, failed, "Dropped sensor frame");
                }
            }
            Err(e) => {
                sensor.close();
                shared.fail(e);
                shared.return_sensor(sensor);
                return;
            }
        }
    }

    sensor.close();
    shared.set_state(CaptureState::Stopped);
    shared.return_sensor(sensor);
    debug!(frames = sequence, "Capture loop exited");
}
