// SPDX-License-Identifier: GPL-3.0-only

//! edgeviewer - live camera frames through a processor onto the GPU
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: camera sensors and the capture thread
//! - [`media`]: frame buffers and NV21 conversion
//! - [`pipelines`]: processing workers, processors and the frame slot
//! - [`render`]: the wgpu renderer drawing the latest frame
//! - [`gpu`]: device creation and the offscreen render target
//! - [`config`]: user configuration handling

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod gpu;
pub mod media;
pub mod pipelines;
pub mod render;

// Re-export commonly used types
pub use backends::camera::{CaptureSource, CaptureState, SensorDevice, SourceKind};
pub use config::Config;
pub use errors::{AppError, AppResult};
pub use pipelines::{FramePipeline, FrameProcessor, FrameSlot, ProcessorKind};
pub use render::{DrawOutcome, Renderer};
