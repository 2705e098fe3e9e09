// SPDX-License-Identifier: GPL-3.0-only

//! Buffers passed between capture, processing and rendering

use crate::errors::{ProcessError, ProcessResult};
use std::time::Instant;

/// Dimensions of one chroma plane for a 4:2:0 frame (rounded up for odd sizes)
pub fn chroma_dimensions(width: u32, height: u32) -> (usize, usize) {
    (width.div_ceil(2) as usize, height.div_ceil(2) as usize)
}

/// Byte length of an interleaved NV21 frame: `w*h + 2*ceil(w/2)*ceil(h/2)`
pub fn converted_len(width: u32, height: u32) -> usize {
    let (cw, ch) = chroma_dimensions(width, height);
    width as usize * height as usize + 2 * cw * ch
}

/// Byte length of an RGBA frame, or `None` if it does not fit in memory
pub fn rgba_len(width: u32, height: u32) -> Option<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(4))
}

/// One sensor frame after conversion to the interleaved layout the processor expects
///
/// Immutable once produced; ownership moves from the capture thread to a
/// processing worker.
#[derive(Clone)]
pub struct ConvertedFrame {
    /// Monotonic capture sequence number, starting at 1 for each capture session
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    /// Luma plane followed by interleaved V/U pairs
    pub data: Vec<u8>,
    /// When the capture thread converted the frame
    pub captured_at: Instant,
}

impl ConvertedFrame {
    /// Check for non-zero dimensions and a buffer length that matches them
    pub fn validate(&self) -> ProcessResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ProcessError::EmptyDimensions {
                width: self.width,
                height: self.height,
            });
        }
        let expected = converted_len(self.width, self.height);
        if self.data.len() != expected {
            return Err(ProcessError::InvalidInput {
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for ConvertedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConvertedFrame")
            .field("sequence", &self.sequence)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// RGBA output of the processing stage, ready for texture upload
///
/// Can only be built through [`ProcessedFrame::new`], so every instance
/// satisfies `data.len() == width * height * 4` with non-zero dimensions.
#[derive(Clone, PartialEq, Eq)]
pub struct ProcessedFrame {
    sequence: u64,
    session: u64,
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl ProcessedFrame {
    /// Wrap processor output, rejecting buffers that do not match the dimensions
    pub fn new(
        sequence: u64,
        session: u64,
        width: u32,
        height: u32,
        data: Vec<u8>,
    ) -> ProcessResult<Self> {
        validate_rgba(&data, width, height)?;
        Ok(Self {
            sequence,
            session,
            width,
            height,
            data,
        })
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Pipeline session the frame was produced in
    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row-major RGBA bytes, top row first
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Take the pixel buffer out of the frame
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

impl std::fmt::Debug for ProcessedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessedFrame")
            .field("sequence", &self.sequence)
            .field("session", &self.session)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Validate an RGBA buffer against its dimensions
pub fn validate_rgba(data: &[u8], width: u32, height: u32) -> ProcessResult<()> {
    if width == 0 || height == 0 {
        return Err(ProcessError::EmptyDimensions { width, height });
    }
    let expected = rgba_len(width, height).unwrap_or(usize::MAX);
    if data.len() != expected {
        return Err(ProcessError::InvalidOutput {
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}
