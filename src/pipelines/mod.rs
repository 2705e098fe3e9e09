// SPDX-License-Identifier: GPL-3.0-only

//! Frame pipeline
//!
//! ```text
//! capture thread ──submit──▶ worker pool ──publish──▶ FrameSlot ◀──consume── renderer
//!   (convert)                 (process)               (1 frame)
//! ```
//!
//! The slot is the only object touched by more than one context.

pub mod processing;
pub mod processors;
pub mod session;
pub mod slot;

pub use processing::{FrameProcessingStage, ProcessingStats, SubmitOutcome, process_frame};
pub use processors::{ColorConverter, EdgeDetector, FrameProcessor, ProcessorKind};
pub use session::{FramePipeline, PipelineOptions, PipelineStats};
pub use slot::{FrameSlot, PublishOutcome, SlotStats};
