// SPDX-License-Identifier: GPL-3.0-only

//! Planar YUV 4:2:0 to interleaved NV21 conversion
//!
//! The sensor hands out three planes in Y, U (Cb), V (Cr) order. Downstream
//! expects one contiguous buffer: the luma plane unchanged, then the chroma
//! samples interleaved pair by pair with V first. The converter knows nothing
//! about the camera; it performs this fixed relabeling only.

use crate::backends::camera::types::RawSensorFrame;
use crate::media::frame::ConvertedFrame;
use std::time::Instant;

/// Concatenate the luma plane with V/U-interleaved chroma.
///
/// Output length is `y.len() + u.len() + v.len()`. Both chroma planes must
/// have the same length; passing mismatched planes is a caller bug, not a
/// recoverable condition.
pub fn convert_planes(y: &[u8], u: &[u8], v: &[u8]) -> Vec<u8> {
    debug_assert_eq!(u.len(), v.len(), "chroma planes must be the same size");

    let mut output = Vec::with_capacity(y.len() + u.len() + v.len());
    output.extend_from_slice(y);
    for (&cr, &cb) in v.iter().zip(u) {
        output.push(cr);
        output.push(cb);
    }
    output
}

/// Convert a sensor frame into the buffer handed to the processing stage.
///
/// Row and pixel strides are removed first; planes that are already tightly
/// packed are read in place.
pub fn convert_frame(raw: &RawSensorFrame, sequence: u64) -> ConvertedFrame {
    let y = raw.luma().tight_bytes();
    let u = raw.chroma_u().tight_bytes();
    let v = raw.chroma_v().tight_bytes();

    ConvertedFrame {
        sequence,
        width: raw.width,
        height: raw.height,
        data: convert_planes(&y, &u, &v),
        captured_at: Instant::now(),
    }
}
