// SPDX-License-Identifier: GPL-3.0-only

//! Hardware access layer
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              CaptureSource               │
//! │   capture thread · state machine         │
//! └───────────────────┬──────────────────────┘
//!                     │ SensorDevice
//!        ┌────────────┴────────────┐
//!  ┌─────┴──────┐           ┌──────┴──────┐
//!  │ GstSensor  │           │  Synthetic  │
//!  │ v4l2 / pw  │           │  pattern    │
//!  └────────────┘           └─────────────┘
//! ```

pub mod camera;

use crate::backends::camera::{GstSensor, SensorDevice, SourceKind, SyntheticSensor};

/// Build the sensor for a configured source
pub fn create_sensor(source: SourceKind, device_path: Option<String>) -> Box<dyn SensorDevice> {
    match source {
        SourceKind::Synthetic => Box::new(SyntheticSensor::new()),
        other => Box::new(GstSensor::new(other, device_path)),
    }
}
