// SPDX-License-Identifier: GPL-3.0-only

//! Frame buffers and pixel format conversion
//!
//! Sensor frames arrive as planar YUV 4:2:0 (a luma plane plus two
//! quarter-size chroma planes). The processing stage expects a single
//! interleaved buffer: the full luma plane followed by V/U pairs (NV21).
//! The [`nv21_converter`] module performs that relabeling; [`frame`] holds
//! the buffer types that travel between pipeline stages.
//!
//! # Modules
//!
//! - [`frame`]: `ConvertedFrame`, `ProcessedFrame` and size helpers
//! - [`nv21_converter`]: planar YUV to interleaved NV21 conversion

pub mod frame;
pub mod nv21_converter;

// Re-export commonly used types
pub use frame::{ConvertedFrame, ProcessedFrame, chroma_dimensions, converted_len, rgba_len};
pub use nv21_converter::{convert_frame, convert_planes};
