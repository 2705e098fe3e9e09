// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

/// Capture session defaults
pub mod capture {
    /// Fixed session width in pixels
    pub const DEFAULT_WIDTH: u32 = 640;

    /// Fixed session height in pixels
    pub const DEFAULT_HEIGHT: u32 = 480;

    /// Requested sensor framerate
    pub const DEFAULT_FRAMERATE: u32 = 30;

    /// Default V4L2 device node
    pub const DEFAULT_DEVICE: &str = "/dev/video0";

    /// Name of the dedicated capture thread
    pub const THREAD_NAME: &str = "edgeviewer-capture";
}

/// GStreamer sink configuration
pub mod pipeline {
    /// Maximum buffer queue size in the capture sink (keep small for low latency)
    pub const MAX_BUFFERS: u32 = 2;

    /// Sensor-native planar format requested from the source
    pub const SENSOR_FORMAT: &str = "I420";

    /// Name given to the appsink element in launch strings
    pub const SINK_NAME: &str = "sink";
}

/// Frame processing defaults
pub mod processing {
    /// Worker permits in the processing pool
    pub const DEFAULT_MAX_IN_FLIGHT: usize = 2;

    /// Lower hysteresis threshold for the edge detector
    pub const EDGE_LOW_THRESHOLD: u16 = 80;

    /// Upper hysteresis threshold for the edge detector
    pub const EDGE_HIGH_THRESHOLD: u16 = 150;

    /// Name prefix for processing runtime threads
    pub const THREAD_NAME: &str = "edgeviewer-process";
}

/// Rendering defaults
pub mod render {
    /// Offscreen surface width when no windowing layer supplies one
    pub const DEFAULT_SURFACE_WIDTH: u32 = 1280;

    /// Offscreen surface height when no windowing layer supplies one
    pub const DEFAULT_SURFACE_HEIGHT: u32 = 720;

    /// Render ticks per second for the offscreen loop
    pub const DEFAULT_RENDER_FPS: u32 = 60;

    /// Uploads slower than one 60Hz frame period get a warning
    pub const SLOW_UPLOAD_MS: u128 = 16;
}

/// Timing constants
pub mod timing {
    /// Frame counter modulo for periodic logging
    pub const FRAME_LOG_INTERVAL: u64 = 30;

    /// How long the capture thread waits for a sample before re-checking the stop flag
    pub const ACQUIRE_TIMEOUT_MS: u64 = 100;

    /// Pipeline playing state timeout on start
    pub const START_TIMEOUT_SECS: u64 = 5;

    /// Pipeline state change timeout on stop
    pub const STOP_TIMEOUT_SECS: u64 = 2;

    /// Upper bound on waiting for the first processed frame in `snapshot`
    pub const SNAPSHOT_TIMEOUT_SECS: u64 = 10;
}
