// SPDX-License-Identifier: GPL-3.0-only

//! Checks a consumed frame must pass before it is uploaded

use crate::media::ProcessedFrame;

/// Why a frame was not uploaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Larger than the device's maximum 2D texture size
    TooLarge { width: u32, height: u32, max: u32 },
    /// Captured before the frame already on screen
    OutOfOrder { sequence: u64, shown: u64 },
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::TooLarge { width, height, max } => {
                write!(f, "{}x{} exceeds max texture size {}", width, height, max)
            }
            Rejection::OutOfOrder { sequence, shown } => {
                write!(f, "frame {} is older than displayed frame {}", sequence, shown)
            }
        }
    }
}

/// Upload gate tracking what is currently on screen
///
/// Length and zero-size checks are guaranteed by [`ProcessedFrame`] itself;
/// the gate adds the checks that depend on the device and on display history.
#[derive(Debug, Clone, Default)]
pub struct FrameGate {
    enforce_order: bool,
    shown: Option<(u64, u64)>,
}

impl FrameGate {
    pub fn new(enforce_order: bool) -> Self {
        Self {
            enforce_order,
            shown: None,
        }
    }

    /// Decide whether `frame` may replace the displayed texture
    pub fn admit(&mut self, frame: &ProcessedFrame, max_dimension: u32) -> Result<(), Rejection> {
        if frame.width() > max_dimension || frame.height() > max_dimension {
            return Err(Rejection::TooLarge {
                width: frame.width(),
                height: frame.height(),
                max: max_dimension,
            });
        }

        if self.enforce_order
            && let Some((session, shown)) = self.shown
            && session == frame.session()
            && frame.sequence() < shown
        {
            return Err(Rejection::OutOfOrder {
                sequence: frame.sequence(),
                shown,
            });
        }

        self.shown = Some((frame.session(), frame.sequence()));
        Ok(())
    }

    /// Forget display history (new surface)
    pub fn reset(&mut self) {
        self.shown = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(sequence: u64, session: u64, width: u32, height: u32) -> ProcessedFrame {
        let len = (width * height * 4) as usize;
        ProcessedFrame::new(sequence, session, width, height, vec![0; len]).unwrap()
    }

    #[test]
    fn frames_in_capture_order_pass() {
        let mut gate = FrameGate::new(true);
        assert!(gate.admit(&frame(1, 1, 2, 2), 4096).is_ok());
        assert!(gate.admit(&frame(3, 1, 2, 2), 4096).is_ok());
        assert_eq!(
            gate.admit(&frame(2, 1, 2, 2), 4096),
            Err(Rejection::OutOfOrder {
                sequence: 2,
                shown: 3
            })
        );
    }

    #[test]
    fn new_session_restarts_numbering() {
        let mut gate = FrameGate::new(true);
        gate.admit(&frame(50, 1, 2, 2), 4096).unwrap();
        assert!(gate.admit(&frame(1, 2, 2, 2), 4096).is_ok());
    }

    #[test]
    fn order_is_not_checked_when_disabled() {
        let mut gate = FrameGate::new(false);
        gate.admit(&frame(5, 1, 2, 2), 4096).unwrap();
        assert!(gate.admit(&frame(4, 1, 2, 2), 4096).is_ok());
    }

    #[test]
    fn oversized_frame_is_refused() {
        let mut gate = FrameGate::new(true);
        assert_eq!(
            gate.admit(&frame(1, 1, 8, 2), 4),
            Err(Rejection::TooLarge {
                width: 8,
                height: 2,
                max: 4
            })
        );
    }
}
