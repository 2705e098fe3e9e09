// SPDX-License-Identifier: GPL-3.0-only

//! Processing stage between capture and the frame slot
//!
//! `submit` is called on the capture thread. It hands the frame to the
//! blocking pool of a tokio runtime and returns immediately. At most
//! `max_in_flight` frames are processed at once; a frame arriving while every
//! permit is taken is dropped, since only the newest result is ever shown.
//!
//! Each worker runs the processor, validates the RGBA length and publishes
//! into the [`FrameSlot`]. Failures (errors, panics, wrong sizes) drop the one
//! frame and are logged.

use super::processors::FrameProcessor;
use super::slot::{FrameSlot, PublishOutcome};
use crate::constants::timing;
use crate::errors::{ProcessError, ProcessResult};
use crate::media::{ConvertedFrame, ProcessedFrame};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Result of handing a frame to the stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A worker picked the frame up
    Dispatched,
    /// Every worker was busy; the frame was dropped
    Busy,
}

/// Snapshot of the stage counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessingStats {
    pub submitted: u64,
    pub dropped_busy: u64,
    pub processed: u64,
    pub failed: u64,
    pub published: u64,
    /// Valid results the slot turned away (stale or after shutdown)
    pub discarded: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    dropped_busy: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
    published: AtomicU64,
    discarded: AtomicU64,
}

/// Run the processor on one frame and wrap the result.
///
/// Panics inside the processor are caught and reported as
/// [`ProcessError::Panicked`]. The output must be exactly
/// `width * height * 4` bytes with non-zero dimensions.
pub fn process_frame(
    processor: &dyn FrameProcessor,
    frame: &ConvertedFrame,
    session: u64,
) -> ProcessResult<ProcessedFrame> {
    frame.validate()?;

    let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
        processor.process(&frame.data, frame.width, frame.height)
    }))
    .map_err(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        ProcessError::Panicked(message)
    })?;

    ProcessedFrame::new(frame.sequence, session, frame.width, frame.height, result?)
}

/// Bounded worker pool feeding the frame slot
pub struct FrameProcessingStage {
    processor: Arc<dyn FrameProcessor>,
    slot: Arc<FrameSlot>,
    runtime: Handle,
    permits: Arc<Semaphore>,
    max_in_flight: usize,
    counters: Arc<Counters>,
}

impl FrameProcessingStage {
    pub fn new(
        processor: Arc<dyn FrameProcessor>,
        slot: Arc<FrameSlot>,
        runtime: Handle,
        max_in_flight: usize,
    ) -> Self {
        let max_in_flight = max_in_flight.max(1);
        Self {
            processor,
            slot,
            runtime,
            permits: Arc::new(Semaphore::new(max_in_flight)),
            max_in_flight,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Dispatch a frame to a worker, or drop it if all workers are busy.
    ///
    /// Never blocks; safe to call from the capture thread.
    pub fn submit(&self, frame: ConvertedFrame) -> SubmitOutcome {
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);

        let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
            let dropped = self.counters.dropped_busy.fetch_add(1, Ordering::Relaxed) + 1;
            if dropped % timing::FRAME_LOG_INTERVAL == 1 {
                debug!(
                    sequence = frame.sequence,
                    dropped, "All processing workers busy, dropping frame"
                );
            }
            return SubmitOutcome::Busy;
        };

        // Tag with the session at submission so late results land in an inert slot
        let session = self.slot.session();
        let processor = Arc::clone(&self.processor);
        let slot = Arc::clone(&self.slot);
        let counters = Arc::clone(&self.counters);

        self.runtime.spawn_blocking(move || {
            let _permit = permit;
            let started = Instant::now();
            let sequence = frame.sequence;

            match process_frame(processor.as_ref(), &frame, session) {
                Ok(processed) => {
                    let done = counters.processed.fetch_add(1, Ordering::Relaxed) + 1;
                    if done % timing::FRAME_LOG_INTERVAL == 0 {
                        debug!(
                            processor = processor.name(),
                            sequence,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            latency_ms = frame.captured_at.elapsed().as_millis() as u64,
                            "Frame processed"
                        );
                    }
                    match slot.publish(processed) {
                        PublishOutcome::Published => {
                            counters.published.fetch_add(1, Ordering::Relaxed);
                        }
                        PublishOutcome::Stale | PublishOutcome::Inactive => {
                            counters.discarded.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
                Err(e) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        processor = processor.name(),
                        sequence,
                        error = %e,
                        "Frame processing failed, dropping frame"
                    );
                }
            }
        });

        SubmitOutcome::Dispatched
    }

    /// Workers currently running
    pub fn in_flight(&self) -> usize {
        self.max_in_flight - self.permits.available_permits()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    pub fn processor_name(&self) -> &str {
        self.processor.name()
    }

    pub fn stats(&self) -> ProcessingStats {
        let c = &self.counters;
        ProcessingStats {
            submitted: c.submitted.load(Ordering::Relaxed),
            dropped_busy: c.dropped_busy.load(Ordering::Relaxed),
            processed: c.processed.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            published: c.published.load(Ordering::Relaxed),
            discarded: c.discarded.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::converted_len;

    fn converted(sequence: u64, width: u32, height: u32) -> ConvertedFrame {
        ConvertedFrame {
            sequence,
            width,
            height,
            data: vec![16; converted_len(width, height)],
            captured_at: Instant::now(),
        }
    }

    fn solid(_: &[u8], w: u32, h: u32) -> ProcessResult<Vec<u8>> {
        Ok(vec![200; (w * h * 4) as usize])
    }

    #[test]
    fn valid_output_becomes_processed_frame() {
        let frame = process_frame(&solid, &converted(7, 4, 2), 3).unwrap();
        assert_eq!(frame.sequence(), 7);
        assert_eq!(frame.session(), 3);
        assert_eq!(frame.data().len(), 32);
    }

    #[test]
    fn wrong_length_output_is_rejected() {
        let short = |_: &[u8], _: u32, _: u32| -> ProcessResult<Vec<u8>> { Ok(vec![0; 5]) };
        assert_eq!(
            process_frame(&short, &converted(1, 4, 2), 1),
            Err(ProcessError::InvalidOutput {
                expected: 32,
                actual: 5
            })
        );
    }

    #[test]
    fn panicking_processor_is_contained() {
        let boom = |_: &[u8], _: u32, _: u32| -> ProcessResult<Vec<u8>> { panic!("bad frame") };
        assert_eq!(
            process_frame(&boom, &converted(1, 2, 2), 1),
            Err(ProcessError::Panicked("bad frame".into()))
        );
    }

    #[test]
    fn zero_sized_frame_is_rejected() {
        let empty = |_: &[u8], _: u32, _: u32| -> ProcessResult<Vec<u8>> { Ok(Vec::new()) };
        assert_eq!(
            process_frame(&empty, &converted(1, 0, 0), 1),
            Err(ProcessError::EmptyDimensions {
                width: 0,
                height: 0
            })
        );
    }

    #[test]
    fn zero_width_input_never_reaches_processor() {
        let color = crate::pipelines::ColorConverter;
        assert_eq!(
            process_frame(&color, &converted(1, 0, 4), 1),
            Err(ProcessError::EmptyDimensions {
                width: 0,
                height: 4
            })
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn busy_stage_drops_instead_of_queueing() {
        let gate = Arc::new(std::sync::Barrier::new(2));
        let worker_gate = Arc::clone(&gate);
        let slow = move |_: &[u8], w: u32, h: u32| -> ProcessResult<Vec<u8>> {
            worker_gate.wait();
            Ok(vec![0; (w * h * 4) as usize])
        };

        let slot = Arc::new(FrameSlot::new(true));
        slot.begin_session();
        let stage = FrameProcessingStage::new(Arc::new(slow), Arc::clone(&slot), Handle::current(), 1);

        assert_eq!(stage.submit(converted(1, 2, 2)), SubmitOutcome::Dispatched);
        assert_eq!(stage.submit(converted(2, 2, 2)), SubmitOutcome::Busy);
        assert_eq!(stage.in_flight(), 1);

        gate.wait();
        let deadline = Instant::now() + std::time::Duration::from_secs(5);
        while stage.stats().published == 0 && Instant::now() < deadline {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let stats = stage.stats();
        assert_eq!(stats.submitted, 2);
        assert_eq!(stats.dropped_busy, 1);
        assert_eq!(stats.published, 1);
        assert_eq!(slot.consume_if_dirty().unwrap().sequence(), 1);
    }
}
