// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for constants module

use edgeviewer::constants::{capture, pipeline, processing, timing};

#[test]
fn test_backlog_is_small() {
    // The sink never queues more than one frame behind the latest
    assert_eq!(pipeline::MAX_BUFFERS, 2);
}

#[test]
fn test_edge_thresholds_ordered() {
    assert!(processing::EDGE_LOW_THRESHOLD < processing::EDGE_HIGH_THRESHOLD);
}

#[test]
fn test_default_session_size_is_even() {
    assert_eq!(capture::DEFAULT_WIDTH % 2, 0);
    assert_eq!(capture::DEFAULT_HEIGHT % 2, 0);
}

#[test]
fn test_acquire_timeout_keeps_stop_responsive() {
    // Stop is noticed within one acquire timeout
    assert!(timing::ACQUIRE_TIMEOUT_MS <= 250);
}
