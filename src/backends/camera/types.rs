// SPDX-License-Identifier: GPL-3.0-only

//! Shared types for camera capture

use crate::constants;
use crate::errors::{CaptureError, CaptureResult};
use gstreamer::buffer::{MappedBuffer, Readable};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::sync::Arc;

/// Frame data storage - either pre-copied bytes or zero-copy GStreamer buffer
///
/// The `Mapped` variant keeps the GStreamer buffer mapped and alive until all
/// references are dropped, so planes of one sample can share a single mapping.
#[derive(Clone)]
pub enum FrameData {
    /// Pre-copied bytes (synthetic sensor, tests)
    Copied(Arc<[u8]>),
    /// Zero-copy mapped GStreamer buffer - no data copy, just reference counting
    Mapped(Arc<MappedBuffer<Readable>>),
}

impl FrameData {
    /// Create FrameData from a mapped GStreamer buffer (zero-copy)
    pub fn from_mapped_buffer(buffer: MappedBuffer<Readable>) -> Self {
        FrameData::Mapped(Arc::new(buffer))
    }

    /// Get the length of the frame data in bytes
    pub fn len(&self) -> usize {
        match self {
            FrameData::Copied(data) => data.len(),
            FrameData::Mapped(buf) => buf.len(),
        }
    }

    /// Check if the frame data is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<u8>> for FrameData {
    fn from(data: Vec<u8>) -> Self {
        FrameData::Copied(Arc::from(data.into_boxed_slice()))
    }
}

impl std::fmt::Debug for FrameData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameData::Copied(data) => write!(f, "FrameData::Copied({} bytes)", data.len()),
            FrameData::Mapped(buf) => write!(f, "FrameData::Mapped({} bytes)", buf.len()),
        }
    }
}

impl AsRef<[u8]> for FrameData {
    fn as_ref(&self) -> &[u8] {
        match self {
            FrameData::Copied(data) => data.as_ref(),
            FrameData::Mapped(buf) => buf.as_slice(),
        }
    }
}

impl std::ops::Deref for FrameData {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_ref()
    }
}

/// One image plane inside a sensor buffer
///
/// `row_stride` is the distance in bytes between rows, `pixel_stride` the
/// distance between samples of a row (2 when the driver hands out a chroma
/// plane that is a view into an interleaved buffer).
#[derive(Debug, Clone)]
pub struct SensorPlane {
    pub data: FrameData,
    /// Offset of the first sample within `data`
    pub offset: usize,
    pub row_stride: usize,
    pub pixel_stride: usize,
    /// Samples per row
    pub width: usize,
    /// Number of rows
    pub height: usize,
}

impl SensorPlane {
    /// A tightly packed plane owning its bytes
    pub fn packed(data: Vec<u8>, width: usize, height: usize) -> Self {
        Self {
            data: data.into(),
            offset: 0,
            row_stride: width,
            pixel_stride: 1,
            width,
            height,
        }
    }

    /// Number of meaningful samples in the plane
    pub fn sample_count(&self) -> usize {
        self.width * self.height
    }

    /// Bytes covered by the samples of one row
    fn row_span(&self) -> usize {
        match self.width {
            0 => 0,
            w => (w - 1) * self.pixel_stride + 1,
        }
    }

    /// Index one past the last byte the plane reads
    fn end(&self) -> usize {
        if self.width == 0 || self.height == 0 {
            return self.offset;
        }
        self.offset + (self.height - 1) * self.row_stride + self.row_span()
    }

    /// Samples in row-major order without padding.
    ///
    /// Borrows when the plane is already tightly packed.
    pub fn tight_bytes(&self) -> Cow<'_, [u8]> {
        let bytes: &[u8] = &self.data;
        if self.pixel_stride == 1 && self.row_stride == self.width {
            return Cow::Borrowed(&bytes[self.offset..self.offset + self.sample_count()]);
        }

        let mut out = Vec::with_capacity(self.sample_count());
        for row in 0..self.height {
            let start = self.offset + row * self.row_stride;
            if self.pixel_stride == 1 {
                out.extend_from_slice(&bytes[start..start + self.width]);
            } else {
                out.extend(
                    (0..self.width).map(|col| bytes[start + col * self.pixel_stride]),
                );
            }
        }
        Cow::Owned(out)
    }
}

/// A sensor-native planar YUV 4:2:0 frame
///
/// Planes are stored in sensor order: luma, chroma-blue (U), chroma-red (V).
/// Owned by the capture thread only until it has been converted.
#[derive(Debug, Clone)]
pub struct RawSensorFrame {
    pub width: u32,
    pub height: u32,
    planes: [SensorPlane; 3],
}

impl RawSensorFrame {
    /// Build a frame, checking that every plane covers its samples.
    ///
    /// The luma plane must be `width x height`, both chroma planes
    /// `ceil(width/2) x ceil(height/2)`.
    pub fn new(
        width: u32,
        height: u32,
        y: SensorPlane,
        u: SensorPlane,
        v: SensorPlane,
    ) -> CaptureResult<Self> {
        let (cw, ch) = crate::media::chroma_dimensions(width, height);
        let expected = [
            (width as usize, height as usize),
            (cw, ch),
            (cw, ch),
        ];

        for (index, (plane, (w, h))) in [&y, &u, &v].into_iter().zip(expected).enumerate() {
            if plane.width != w || plane.height != h {
                return Err(CaptureError::FrameUnavailable(format!(
                    "plane {} is {}x{}, expected {}x{}",
                    index, plane.width, plane.height, w, h
                )));
            }
            if plane.pixel_stride == 0
                || (plane.height > 1 && plane.row_stride < plane.row_span())
                || plane.end() > plane.data.len()
            {
                return Err(CaptureError::FrameUnavailable(format!(
                    "plane {} does not fit its buffer ({} bytes)",
                    index,
                    plane.data.len()
                )));
            }
        }

        Ok(Self {
            width,
            height,
            planes: [y, u, v],
        })
    }

    /// Build a frame from three tightly packed planes
    pub fn from_packed(
        width: u32,
        height: u32,
        y: Vec<u8>,
        u: Vec<u8>,
        v: Vec<u8>,
    ) -> CaptureResult<Self> {
        let (cw, ch) = crate::media::chroma_dimensions(width, height);
        Self::new(
            width,
            height,
            SensorPlane::packed(y, width as usize, height as usize),
            SensorPlane::packed(u, cw, ch),
            SensorPlane::packed(v, cw, ch),
        )
    }

    pub fn luma(&self) -> &SensorPlane {
        &self.planes[0]
    }

    pub fn chroma_u(&self) -> &SensorPlane {
        &self.planes[1]
    }

    pub fn chroma_v(&self) -> &SensorPlane {
        &self.planes[2]
    }
}

/// Where frames come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// V4L2 device node through GStreamer's v4l2src
    #[default]
    V4l2,
    /// PipeWire camera portal through pipewiresrc
    PipeWire,
    /// GStreamer's videotestsrc (live)
    TestPattern,
    /// In-process moving pattern, no GStreamer involved
    Synthetic,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::V4l2 => write!(f, "V4L2"),
            SourceKind::PipeWire => write!(f, "PipeWire"),
            SourceKind::TestPattern => write!(f, "test pattern"),
            SourceKind::Synthetic => write!(f, "synthetic"),
        }
    }
}

/// Capture sink configuration: fixed size, planar YUV, small backlog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    /// Buffers the sink may hold before the oldest is dropped
    pub backlog: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            width: constants::capture::DEFAULT_WIDTH,
            height: constants::capture::DEFAULT_HEIGHT,
            framerate: constants::capture::DEFAULT_FRAMERATE,
            backlog: constants::pipeline::MAX_BUFFERS,
        }
    }
}

impl std::fmt::Display for CaptureConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{} @ {}fps (backlog {})",
            self.width, self.height, self.framerate, self.backlog
        )
    }
}

/// Capture source lifecycle
///
/// `Idle → Opening → Streaming → (Error | Stopped)`; a new `start()` is
/// accepted from `Idle`, `Error` and `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CaptureState {
    Idle = 0,
    Opening = 1,
    Streaming = 2,
    Error = 3,
    Stopped = 4,
}

impl CaptureState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => CaptureState::Opening,
            2 => CaptureState::Streaming,
            3 => CaptureState::Error,
            4 => CaptureState::Stopped,
            _ => CaptureState::Idle,
        }
    }

    /// Whether a capture thread is (or should be) running
    pub fn is_active(&self) -> bool {
        matches!(self, CaptureState::Opening | CaptureState::Streaming)
    }
}

impl std::fmt::Display for CaptureState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CaptureState::Idle => "idle",
            CaptureState::Opening => "opening",
            CaptureState::Streaming => "streaming",
            CaptureState::Error => "error",
            CaptureState::Stopped => "stopped",
        };
        write!(f, "{}", name)
    }
}
