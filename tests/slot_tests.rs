// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the frame slot

use edgeviewer::media::ProcessedFrame;
use edgeviewer::pipelines::{FrameSlot, PublishOutcome};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

fn frame(sequence: u64, session: u64, width: u32, height: u32) -> ProcessedFrame {
    let len = (width * height * 4) as usize;
    ProcessedFrame::new(sequence, session, width, height, vec![(sequence % 256) as u8; len]).unwrap()
}

#[test]
fn test_only_last_of_many_publishes_is_observable() {
    let slot = FrameSlot::new(true);
    let session = slot.begin_session();

    for seq in 1..=100 {
        slot.publish(frame(seq, session, 3, 2));
    }

    let taken = slot.consume_if_dirty().expect("slot should be dirty");
    assert_eq!(taken.sequence(), 100);
    assert_eq!(taken.data().len(), 24);
    assert!(slot.consume_if_dirty().is_none());
}

#[test]
fn test_consume_returns_the_published_allocation() {
    let slot = FrameSlot::new(true);
    let session = slot.begin_session();
    let published = frame(1, session, 2, 2);
    let ptr = published.data().as_ptr();

    slot.publish(published);
    let taken = slot.consume_if_dirty().unwrap();
    assert_eq!(taken.data().as_ptr(), ptr, "frame bytes should not be copied");
}

#[test]
fn test_dimensions_travel_with_frame() {
    let slot = FrameSlot::new(true);
    let session = slot.begin_session();
    slot.publish(frame(1, session, 7, 3));
    let taken = slot.consume_if_dirty().unwrap();
    assert_eq!((taken.width(), taken.height()), (7, 3));
}

#[test]
fn test_latest_publish_wins_across_sizes() {
    let slot = FrameSlot::new(true);
    let session = slot.begin_session();
    let frame_a = ProcessedFrame::new(1, session, 4, 2, vec![10; 4 * 2 * 4]).unwrap();
    let frame_b = ProcessedFrame::new(2, session, 2, 2, vec![20; 2 * 2 * 4]).unwrap();

    assert_eq!(slot.publish(frame_a), PublishOutcome::Published);
    assert_eq!(slot.publish(frame_b.clone()), PublishOutcome::Published);

    let taken = slot.consume_if_dirty().expect("slot should be dirty");
    assert_eq!((taken.width(), taken.height()), (2, 2));
    assert_eq!(*taken, frame_b);
    assert!(slot.consume_if_dirty().is_none());
}

#[test]
fn test_concurrent_writers_never_go_backwards() {
    const WRITERS: u64 = 4;
    const PER_WRITER: u64 = 2_000;

    let slot = Arc::new(FrameSlot::new(true));
    let session = slot.begin_session();
    let done = Arc::new(AtomicBool::new(false));

    let reader = {
        let slot = Arc::clone(&slot);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut seen = Vec::new();
            while !done.load(Ordering::Acquire) {
                if let Some(f) = slot.consume_if_dirty() {
                    seen.push(f.sequence());
                }
            }
            if let Some(f) = slot.consume_if_dirty() {
                seen.push(f.sequence());
            }
            seen
        })
    };

    let writers: Vec<_> = (0..WRITERS)
        .map(|w| {
            let slot = Arc::clone(&slot);
            thread::spawn(move || {
                for i in 0..PER_WRITER {
                    slot.publish(frame(1 + w + i * WRITERS, session, 1, 1));
                }
            })
        })
        .collect();
    for w in writers {
        w.join().unwrap();
    }
    done.store(true, Ordering::Release);

    let seen = reader.join().unwrap();
    assert!(!seen.is_empty());
    // A publish racing with a take can hand out the same frame twice, never an older one
    assert!(
        seen.windows(2).all(|pair| pair[0] <= pair[1]),
        "consumed sequences must not decrease"
    );
    assert_eq!(*seen.last().unwrap(), WRITERS * PER_WRITER);

    let stats = slot.stats();
    assert_eq!(
        stats.published + stats.stale,
        WRITERS * PER_WRITER,
        "every publish is either accepted or rejected as stale"
    );
}

#[test]
fn test_stale_session_frames_are_ignored() {
    let slot = FrameSlot::new(false);
    let old = slot.begin_session();
    let current = slot.begin_session();

    assert_eq!(slot.publish(frame(9, old, 1, 1)), PublishOutcome::Inactive);
    assert_eq!(slot.publish(frame(1, current, 1, 1)), PublishOutcome::Published);
    assert_eq!(slot.consume_if_dirty().unwrap().session(), current);
}
