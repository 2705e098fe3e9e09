// SPDX-License-Identifier: GPL-3.0-only

//! End-to-end tests: synthetic sensor → processor → frame slot

use edgeviewer::backends::camera::{CaptureConfig, SyntheticSensor};
use edgeviewer::errors::{AppError, CaptureError, ProcessError, ProcessResult};
use edgeviewer::pipelines::{EdgeDetector, FramePipeline, FrameProcessor, PipelineOptions};
use edgeviewer::CaptureState;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

fn options(max_in_flight: usize) -> PipelineOptions {
    PipelineOptions {
        capture: CaptureConfig {
            width: 64,
            height: 48,
            framerate: 200,
            backlog: 2,
        },
        max_in_flight,
        enforce_capture_order: true,
    }
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

fn solid(_: &[u8], w: u32, h: u32) -> ProcessResult<Vec<u8>> {
    Ok(vec![255; (w * h * 4) as usize])
}

#[test]
fn test_edges_reach_the_slot() {
    let mut pipeline = FramePipeline::new(
        Box::new(SyntheticSensor::new()),
        Arc::new(EdgeDetector::default()),
        options(2),
    )
    .unwrap();
    let slot = pipeline.slot();
    pipeline.start().unwrap();

    let mut frame = None;
    assert!(wait_until(Duration::from_secs(5), || {
        frame = slot.consume_if_dirty();
        frame.is_some()
    }));
    let frame = frame.unwrap();
    assert_eq!((frame.width(), frame.height()), (64, 48));
    assert_eq!(frame.data().len(), 64 * 48 * 4);
    assert!(frame.data().chunks_exact(4).all(|px| px[3] == 255));

    pipeline.stop();
    let stats = pipeline.stats();
    assert_eq!(stats.capture_state, CaptureState::Stopped);
    assert!(stats.frames_captured >= 1);
    assert!(stats.processing.published >= 1);
}

#[test]
fn test_slow_processor_drops_frames_but_stays_live() {
    let slow = |nv21: &[u8], w: u32, h: u32| -> ProcessResult<Vec<u8>> {
        std::thread::sleep(Duration::from_millis(40));
        solid(nv21, w, h)
    };
    let mut pipeline =
        FramePipeline::new(Box::new(SyntheticSensor::new()), Arc::new(slow), options(1)).unwrap();
    let slot = pipeline.slot();
    pipeline.start().unwrap();

    assert!(wait_until(Duration::from_secs(5), || {
        pipeline.stats().processing.dropped_busy > 0
    }));
    assert!(wait_until(Duration::from_secs(5), || slot.consume_if_dirty().is_some()));

    let stats = pipeline.stats();
    assert!(
        stats.frames_captured > stats.processing.processed,
        "capture must outpace processing: {}",
        stats
    );
    assert_eq!(stats.capture_state, CaptureState::Streaming);
    pipeline.stop();
}

#[test]
fn test_failures_drop_single_frames() {
    let calls = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&calls);
    let flaky = move |nv21: &[u8], w: u32, h: u32| -> ProcessResult<Vec<u8>> {
        match counter.fetch_add(1, Ordering::Relaxed) % 3 {
            0 => Err(ProcessError::Failed("flaky".into())),
            1 => Ok(vec![0; 3]),
            _ => solid(nv21, w, h),
        }
    };
    let mut pipeline =
        FramePipeline::new(Box::new(SyntheticSensor::new()), Arc::new(flaky), options(1)).unwrap();
    pipeline.start().unwrap();

    assert!(wait_until(Duration::from_secs(5), || {
        let stats = pipeline.stats().processing;
        stats.failed >= 2 && stats.published >= 1
    }));
    pipeline.stop();
}

#[test]
fn test_wrong_sized_output_never_reaches_slot() {
    let truncated = |_: &[u8], w: u32, h: u32| -> ProcessResult<Vec<u8>> {
        Ok(vec![0; (w * h * 4 - 1) as usize])
    };
    let processor: Arc<dyn FrameProcessor> = Arc::new(truncated);
    let mut pipeline =
        FramePipeline::new(Box::new(SyntheticSensor::new()), processor, options(2)).unwrap();
    let slot = pipeline.slot();
    pipeline.start().unwrap();

    assert!(wait_until(Duration::from_secs(5), || {
        pipeline.stats().processing.failed >= 3
    }));
    assert!(slot.consume_if_dirty().is_none());
    assert_eq!(pipeline.stats().slot.published, 0);
    pipeline.stop();
}

#[test]
fn test_stop_makes_slot_inert() {
    let mut pipeline = FramePipeline::new(
        Box::new(SyntheticSensor::new()),
        Arc::new(solid),
        options(2),
    )
    .unwrap();
    let slot = pipeline.slot();
    pipeline.start().unwrap();
    assert!(wait_until(Duration::from_secs(5), || slot.is_dirty()));

    pipeline.stop();
    pipeline.stop();
    std::thread::sleep(Duration::from_millis(50));
    assert!(slot.consume_if_dirty().is_none());

    // Restart opens a fresh session
    pipeline.start().unwrap();
    assert!(wait_until(Duration::from_secs(5), || slot.consume_if_dirty().is_some()));
    pipeline.stop();
}

#[test]
fn test_open_failure_is_reported() {
    let mut pipeline = FramePipeline::new(
        Box::new(SyntheticSensor::new().failing_open("permission denied")),
        Arc::new(solid),
        options(1),
    )
    .unwrap();
    pipeline.start().unwrap();

    assert!(wait_until(Duration::from_secs(5), || {
        pipeline.capture_state() == CaptureState::Error
    }));
    assert_eq!(
        pipeline.capture_error(),
        Some(CaptureError::DeviceOpenFailed("permission denied".into()))
    );
    pipeline.stop();
}

#[test]
fn test_second_start_leaves_running_session_alone() {
    let mut pipeline = FramePipeline::new(
        Box::new(SyntheticSensor::new()),
        Arc::new(solid),
        options(2),
    )
    .unwrap();
    let slot = pipeline.slot();
    pipeline.start().unwrap();
    assert!(wait_until(Duration::from_secs(5), || slot.consume_if_dirty().is_some()));
    let session = slot.session();

    let err = pipeline.start().unwrap_err();
    assert!(matches!(err, AppError::Capture(CaptureError::AlreadyRunning)));
    assert_eq!(slot.session(), session);
    assert_eq!(pipeline.capture_state(), CaptureState::Streaming);

    // Frames keep arriving in the original session
    let inactive = pipeline.stats().slot.inactive;
    assert!(wait_until(Duration::from_secs(5), || slot.consume_if_dirty().is_some()));
    assert_eq!(pipeline.stats().slot.inactive, inactive);
    pipeline.stop();
}
