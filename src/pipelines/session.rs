// SPDX-License-Identifier: GPL-3.0-only

//! Capture → processing → slot wiring for one pipeline
//!
//! The pipeline owns the capture source, the processing stage with its worker
//! runtime, and the frame slot the renderer drains. `start` opens a slot
//! session and starts capture; `stop` joins the capture thread and closes the
//! slot. Workers still running after `stop` finish on their own and their
//! results are ignored by the closed slot.

use super::processing::{FrameProcessingStage, ProcessingStats};
use super::processors::FrameProcessor;
use super::slot::{FrameSlot, SlotStats};
use crate::backends::camera::{CaptureConfig, CaptureSource, CaptureState, FrameCallback, SensorDevice};
use crate::constants::processing;
use crate::errors::{AppError, AppResult, CaptureError};
use crate::media::ConvertedFrame;
use std::sync::Arc;
use tracing::info;

/// Everything needed to assemble a [`FramePipeline`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    pub capture: CaptureConfig,
    /// Frames processed concurrently before new ones are dropped
    pub max_in_flight: usize,
    /// Reject processed frames older than the newest published one
    pub enforce_capture_order: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            max_in_flight: processing::DEFAULT_MAX_IN_FLIGHT,
            enforce_capture_order: true,
        }
    }
}

/// Counters from every stage, taken at one point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
    pub capture_state: CaptureState,
    pub frames_captured: u64,
    pub capture_failures: u64,
    pub processing: ProcessingStats,
    pub slot: SlotStats,
}

impl std::fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "capture {} ({} frames, {} failed), processing {} submitted / {} busy / {} failed, \
             slot {} published / {} overwritten / {} consumed",
            self.capture_state,
            self.frames_captured,
            self.capture_failures,
            self.processing.submitted,
            self.processing.dropped_busy,
            self.processing.failed,
            self.slot.published,
            self.slot.overwritten,
            self.slot.consumed
        )
    }
}

/// A running (or startable) capture-to-slot pipeline
pub struct FramePipeline {
    runtime: Option<tokio::runtime::Runtime>,
    stage: Arc<FrameProcessingStage>,
    slot: Arc<FrameSlot>,
    capture: CaptureSource,
}

impl FramePipeline {
    pub fn new(
        sensor: Box<dyn SensorDevice>,
        processor: Arc<dyn FrameProcessor>,
        options: PipelineOptions,
    ) -> AppResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(options.max_in_flight.max(1))
            .thread_name(processing::THREAD_NAME)
            .enable_all()
            .build()
            .map_err(|e| AppError::Other(format!("failed to start processing runtime: {}", e)))?;

        let slot = Arc::new(FrameSlot::new(options.enforce_capture_order));
        let stage = Arc::new(FrameProcessingStage::new(
            processor,
            Arc::clone(&slot),
            runtime.handle().clone(),
            options.max_in_flight,
        ));

        let submit_stage = Arc::clone(&stage);
        let on_frame: FrameCallback = Arc::new(move |frame: ConvertedFrame| {
            submit_stage.submit(frame);
        });
        let capture = CaptureSource::new(sensor, options.capture, on_frame);

        Ok(Self {
            runtime: Some(runtime),
            stage,
            slot,
            capture,
        })
    }

    /// Open a fresh slot session and start capturing
    pub fn start(&mut self) -> AppResult<()> {
        // The running session keeps its slot
        if self.capture.state().is_active() {
            return Err(AppError::Capture(CaptureError::AlreadyRunning));
        }
        let session = self.slot.begin_session();
        if let Err(e) = self.capture.start() {
            self.slot.end_session();
            return Err(AppError::Capture(e));
        }
        info!(
            session,
            processor = self.stage.processor_name(),
            workers = self.stage.max_in_flight(),
            "Pipeline started"
        );
        Ok(())
    }

    /// Join the capture thread and close the slot. Idempotent.
    pub fn stop(&mut self) {
        self.capture.stop();
        if self.slot.session() != super::slot::NO_SESSION {
            self.slot.end_session();
            info!(stats = %self.stats(), "Pipeline stopped");
        }
    }

    /// The slot the renderer drains
    pub fn slot(&self) -> Arc<FrameSlot> {
        Arc::clone(&self.slot)
    }

    pub fn capture_state(&self) -> CaptureState {
        self.capture.state()
    }

    /// Error that ended the capture session, if it ended in `Error`
    pub fn capture_error(&self) -> Option<CaptureError> {
        self.capture.last_error()
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            capture_state: self.capture.state(),
            frames_captured: self.capture.frames_captured(),
            capture_failures: self.capture.frames_failed(),
            processing: self.stage.stats(),
            slot: self.slot.stats(),
        }
    }
}

impl Drop for FramePipeline {
    fn drop(&mut self) {
        self.stop();
        // In-flight workers are abandoned; they only touch the closed slot
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
