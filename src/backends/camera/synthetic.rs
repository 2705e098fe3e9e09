// SPDX-License-Identifier: GPL-3.0-only

//! In-process sensor producing a moving test pattern
//!
//! Behaves like a live sensor with a fixed frame period: frames that come due
//! while nobody is acquiring are lost, and `acquire_latest` always returns the
//! most recent one. Open and configure failures can be injected to exercise
//! the capture state machine.

use super::SensorDevice;
use super::types::{CaptureConfig, RawSensorFrame};
use crate::errors::{CaptureError, CaptureResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Side length of the bright square drawn into the pattern
const SQUARE_SIZE: u32 = 48;

/// Moving-square test pattern sensor
pub struct SyntheticSensor {
    frame_interval: Duration,
    fail_open: Option<String>,
    fail_configure: Option<String>,
    config: Option<CaptureConfig>,
    next_due: Option<Instant>,
    tick: u64,
    produced: Arc<AtomicU64>,
    skipped: Arc<AtomicU64>,
}

impl SyntheticSensor {
    /// Sensor running at the configured framerate
    pub fn new() -> Self {
        Self {
            frame_interval: Duration::ZERO,
            fail_open: None,
            fail_configure: None,
            config: None,
            next_due: None,
            tick: 0,
            produced: Arc::new(AtomicU64::new(0)),
            skipped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Override the frame period (zero delivers a frame on every acquire)
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Make `open` fail, as if the device were busy or missing
    pub fn failing_open(mut self, reason: impl Into<String>) -> Self {
        self.fail_open = Some(reason.into());
        self
    }

    /// Make `configure` fail, as if the requested format were rejected
    pub fn failing_configure(mut self, reason: impl Into<String>) -> Self {
        self.fail_configure = Some(reason.into());
        self
    }

    /// Counter of frames handed to the capture thread
    pub fn frames_produced(&self) -> Arc<AtomicU64> {
        self.produced.clone()
    }

    /// Counter of frames that came due but were superseded before acquisition
    pub fn frames_skipped(&self) -> Arc<AtomicU64> {
        self.skipped.clone()
    }

    fn render(&self, config: &CaptureConfig) -> CaptureResult<RawSensorFrame> {
        let (width, height) = (config.width, config.height);
        let (cw, ch) = crate::media::chroma_dimensions(width, height);

        let span_x = width.saturating_sub(SQUARE_SIZE).max(1) as u64;
        let span_y = height.saturating_sub(SQUARE_SIZE).max(1) as u64;
        let square_x = ((self.tick * 7) % span_x) as u32;
        let square_y = ((self.tick * 3) % span_y) as u32;

        let mut y = Vec::with_capacity(width as usize * height as usize);
        for row in 0..height {
            for col in 0..width {
                let inside = col >= square_x
                    && col < square_x + SQUARE_SIZE
                    && row >= square_y
                    && row < square_y + SQUARE_SIZE;
                let value = if inside {
                    235
                } else {
                    (16 + (col + row) / 8 % 64) as u8
                };
                y.push(value);
            }
        }

        let u = vec![(128 + (self.tick % 32) as u8).min(240); cw * ch];
        let v = vec![(128u8).saturating_sub((self.tick % 32) as u8); cw * ch];

        RawSensorFrame::from_packed(width, height, y, u, v)
    }
}

impl Default for SyntheticSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorDevice for SyntheticSensor {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn open(&mut self) -> CaptureResult<()> {
        if let Some(reason) = &self.fail_open {
            return Err(CaptureError::DeviceOpenFailed(reason.clone()));
        }
        debug!("Synthetic sensor opened");
        Ok(())
    }

    fn configure(&mut self, config: &CaptureConfig) -> CaptureResult<()> {
        if let Some(reason) = &self.fail_configure {
            return Err(CaptureError::ConfigurationFailed(reason.clone()));
        }
        if config.width == 0 || config.height == 0 {
            return Err(CaptureError::ConfigurationFailed(format!(
                "unsupported size {}x{}",
                config.width, config.height
            )));
        }
        if self.frame_interval.is_zero() && config.framerate > 0 {
            self.frame_interval = Duration::from_secs(1) / config.framerate;
        }
        self.config = Some(config.clone());
        self.next_due = Some(Instant::now());
        Ok(())
    }

    fn acquire_latest(&mut self, timeout: Duration) -> CaptureResult<Option<RawSensorFrame>> {
        let Some(config) = self.config.clone() else {
            return Err(CaptureError::StreamFailed("sensor not configured".into()));
        };
        let due = self.next_due.unwrap_or_else(Instant::now);

        let now = Instant::now();
        if due > now {
            let wait = due - now;
            if wait > timeout {
                std::thread::sleep(timeout);
                return Ok(None);
            }
            std::thread::sleep(wait);
        }

        // Frames that came due while nobody was reading are gone
        let now = Instant::now();
        if !self.frame_interval.is_zero() {
            let behind = (now - due).as_nanos() / self.frame_interval.as_nanos();
            if behind > 0 {
                self.skipped.fetch_add(behind as u64, Ordering::Relaxed);
                self.tick += behind as u64;
            }
        }
        self.next_due = Some(now + self.frame_interval);

        let frame = self.render(&config)?;
        self.tick += 1;
        self.produced.fetch_add(1, Ordering::Relaxed);
        Ok(Some(frame))
    }

    fn close(&mut self) {
        self.config = None;
        self.next_due = None;
        debug!("Synthetic sensor closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> CaptureConfig {
        CaptureConfig {
            width: 64,
            height: 48,
            framerate: 0,
            backlog: 2,
        }
    }

    #[test]
    fn produces_frames_of_configured_size() {
        let mut sensor = SyntheticSensor::new();
        sensor.open().unwrap();
        sensor.configure(&small_config()).unwrap();

        let frame = sensor
            .acquire_latest(Duration::from_millis(10))
            .unwrap()
            .expect("zero interval always has a frame");
        assert_eq!((frame.width, frame.height), (64, 48));
        assert_eq!(frame.luma().sample_count(), 64 * 48);
        assert_eq!(frame.chroma_u().sample_count(), 32 * 24);
    }

    #[test]
    fn returns_none_before_next_frame_is_due() {
        let mut sensor = SyntheticSensor::new().with_frame_interval(Duration::from_secs(5));
        sensor.open().unwrap();
        sensor.configure(&small_config()).unwrap();

        assert!(sensor.acquire_latest(Duration::from_millis(5)).unwrap().is_some());
        assert!(sensor.acquire_latest(Duration::from_millis(5)).unwrap().is_none());
    }

    #[test]
    fn frames_due_while_idle_are_skipped() {
        let mut sensor = SyntheticSensor::new().with_frame_interval(Duration::from_millis(10));
        let produced = sensor.frames_produced();
        let skipped = sensor.frames_skipped();
        sensor.open().unwrap();
        sensor.configure(&small_config()).unwrap();

        assert!(sensor.acquire_latest(Duration::from_millis(50)).unwrap().is_some());
        std::thread::sleep(Duration::from_millis(45));
        assert!(sensor.acquire_latest(Duration::from_millis(50)).unwrap().is_some());

        assert_eq!(produced.load(Ordering::Relaxed), 2);
        assert!(skipped.load(Ordering::Relaxed) >= 3);
    }

    #[test]
    fn injected_failures_surface_as_session_errors() {
        let mut sensor = SyntheticSensor::new().failing_open("busy");
        assert_eq!(
            sensor.open(),
            Err(CaptureError::DeviceOpenFailed("busy".into()))
        );

        let mut sensor = SyntheticSensor::new().failing_configure("no I420");
        sensor.open().unwrap();
        assert!(matches!(
            sensor.configure(&small_config()),
            Err(CaptureError::ConfigurationFailed(_))
        ));
    }

    #[test]
    fn acquire_without_configure_fails() {
        let mut sensor = SyntheticSensor::new();
        assert!(sensor.acquire_latest(Duration::from_millis(1)).is_err());
    }
}
