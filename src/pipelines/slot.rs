// SPDX-License-Identifier: GPL-3.0-only

//! Single-slot mailbox between processing workers and the renderer
//!
//! Writers overwrite whatever is held, the reader takes the held frame if the
//! dirty flag is set. Neither side waits: the held frame is an atomically
//! swapped `Arc` and the dirty flag is an `AtomicBool`.
//!
//! The slot is scoped to a pipeline session. Frames tagged with another
//! session are ignored, so workers that finish after `end_session` publish
//! into an inert slot. With capture ordering enforced, a frame older than the
//! newest one published in the session is rejected instead of overwriting it.

use crate::media::ProcessedFrame;
use arc_swap::ArcSwapOption;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, trace};

/// Session id of a slot that is not accepting frames
pub const NO_SESSION: u64 = 0;

/// What happened to a published frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The frame is now the held frame
    Published,
    /// A newer frame was already published in this session
    Stale,
    /// The frame belongs to a session that is not active
    Inactive,
}

/// Counters kept by the slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotStats {
    pub published: u64,
    /// Published frames replaced before the reader took them
    pub overwritten: u64,
    pub stale: u64,
    pub inactive: u64,
    pub consumed: u64,
}

#[derive(Default)]
struct SlotCounters {
    published: AtomicU64,
    overwritten: AtomicU64,
    stale: AtomicU64,
    inactive: AtomicU64,
    consumed: AtomicU64,
}

/// Overwrite-on-arrival handoff holding at most one [`ProcessedFrame`]
pub struct FrameSlot {
    latest: ArcSwapOption<ProcessedFrame>,
    dirty: AtomicBool,
    session: AtomicU64,
    next_session: AtomicU64,
    enforce_order: bool,
    counters: SlotCounters,
}

impl FrameSlot {
    /// A closed slot; call [`FrameSlot::begin_session`] before publishing
    pub fn new(enforce_order: bool) -> Self {
        Self {
            latest: ArcSwapOption::empty(),
            dirty: AtomicBool::new(false),
            session: AtomicU64::new(NO_SESSION),
            next_session: AtomicU64::new(NO_SESSION),
            enforce_order,
            counters: SlotCounters::default(),
        }
    }

    /// Clear the slot and start accepting frames for a fresh session id
    pub fn begin_session(&self) -> u64 {
        let id = self.next_session.fetch_add(1, Ordering::AcqRel) + 1;
        self.session.store(NO_SESSION, Ordering::Release);
        self.clear();
        self.session.store(id, Ordering::Release);
        debug!(session = id, "Frame slot opened");
        id
    }

    /// Stop accepting frames and drop the held one
    pub fn end_session(&self) {
        let id = self.session.swap(NO_SESSION, Ordering::AcqRel);
        self.clear();
        if id != NO_SESSION {
            debug!(session = id, "Frame slot closed");
        }
    }

    /// Active session id, or [`NO_SESSION`]
    pub fn session(&self) -> u64 {
        self.session.load(Ordering::Acquire)
    }

    pub fn enforces_order(&self) -> bool {
        self.enforce_order
    }

    /// Replace the held frame and mark the slot dirty. Never blocks.
    pub fn publish(&self, frame: ProcessedFrame) -> PublishOutcome {
        let session = self.session();
        if session == NO_SESSION || frame.session() != session {
            self.counters.inactive.fetch_add(1, Ordering::Relaxed);
            trace!(sequence = frame.sequence(), "Dropped frame for inactive session");
            return PublishOutcome::Inactive;
        }

        let sequence = frame.sequence();
        let frame = Arc::new(frame);

        if self.enforce_order {
            // The held frame stays in place after it is consumed, so within a
            // session its sequence only ever grows
            let previous = self.latest.rcu(|held| match held {
                Some(current) if current.session() == session && current.sequence() > sequence => {
                    Some(Arc::clone(current))
                }
                _ => Some(Arc::clone(&frame)),
            });
            if let Some(current) = previous
                && current.session() == session
                && current.sequence() > sequence
            {
                self.counters.stale.fetch_add(1, Ordering::Relaxed);
                trace!(sequence, held = current.sequence(), "Dropped frame older than the held one");
                return PublishOutcome::Stale;
            }
        } else {
            self.latest.store(Some(frame));
        }

        self.counters.published.fetch_add(1, Ordering::Relaxed);
        if self.dirty.swap(true, Ordering::AcqRel) {
            self.counters.overwritten.fetch_add(1, Ordering::Relaxed);
        }
        PublishOutcome::Published
    }

    /// Take the held frame if a publish happened since the last take.
    ///
    /// Returns a shared reference to the published frame, never a copy of
    /// its pixels. A clear dirty flag returns `None` without touching the
    /// held reference.
    pub fn consume_if_dirty(&self) -> Option<Arc<ProcessedFrame>> {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return None;
        }
        let frame = self.latest.load_full()?;
        if frame.session() != self.session() {
            return None;
        }
        self.counters.consumed.fetch_add(1, Ordering::Relaxed);
        Some(frame)
    }

    /// Whether a frame is waiting for the reader
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> SlotStats {
        SlotStats {
            published: self.counters.published.load(Ordering::Relaxed),
            overwritten: self.counters.overwritten.load(Ordering::Relaxed),
            stale: self.counters.stale.load(Ordering::Relaxed),
            inactive: self.counters.inactive.load(Ordering::Relaxed),
            consumed: self.counters.consumed.load(Ordering::Relaxed),
        }
    }

    fn clear(&self) {
        self.dirty.store(false, Ordering::Release);
        self.latest.store(None);
    }
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(sequence: u64, session: u64) -> ProcessedFrame {
        ProcessedFrame::new(sequence, session, 1, 1, vec![sequence as u8, 0, 0, 255]).unwrap()
    }

    #[test]
    fn closed_slot_ignores_frames() {
        let slot = FrameSlot::new(true);
        assert_eq!(slot.publish(frame(1, 1)), PublishOutcome::Inactive);
        assert!(slot.consume_if_dirty().is_none());
    }

    #[test]
    fn last_publish_wins_and_drain_is_idempotent() {
        let slot = FrameSlot::new(true);
        let session = slot.begin_session();
        for seq in 1..=4 {
            assert_eq!(slot.publish(frame(seq, session)), PublishOutcome::Published);
        }

        let taken = slot.consume_if_dirty().unwrap();
        assert_eq!(taken.sequence(), 4);
        assert!(slot.consume_if_dirty().is_none());

        let stats = slot.stats();
        assert_eq!(stats.published, 4);
        assert_eq!(stats.overwritten, 3);
        assert_eq!(stats.consumed, 1);
    }

    #[test]
    fn older_frame_is_rejected_when_ordering_is_enforced() {
        let slot = FrameSlot::new(true);
        let session = slot.begin_session();
        slot.publish(frame(5, session));
        assert_eq!(slot.publish(frame(3, session)), PublishOutcome::Stale);
        assert_eq!(slot.consume_if_dirty().unwrap().sequence(), 5);

        // Still stale after the newer frame was consumed
        assert_eq!(slot.publish(frame(4, session)), PublishOutcome::Stale);
        assert!(slot.consume_if_dirty().is_none());
    }

    #[test]
    fn unordered_slot_keeps_most_recent_write() {
        let slot = FrameSlot::new(false);
        let session = slot.begin_session();
        slot.publish(frame(5, session));
        assert_eq!(slot.publish(frame(3, session)), PublishOutcome::Published);
        assert_eq!(slot.consume_if_dirty().unwrap().sequence(), 3);
    }

    #[test]
    fn ending_session_makes_late_frames_inert() {
        let slot = FrameSlot::new(true);
        let first = slot.begin_session();
        slot.publish(frame(1, first));
        slot.end_session();
        assert!(slot.consume_if_dirty().is_none());
        assert_eq!(slot.publish(frame(2, first)), PublishOutcome::Inactive);

        let second = slot.begin_session();
        assert_ne!(first, second);
        assert_eq!(slot.publish(frame(2, first)), PublishOutcome::Inactive);
        // Sequence numbering restarts with the session
        assert_eq!(slot.publish(frame(1, second)), PublishOutcome::Published);
    }
}
