// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 device enumeration for `edgeviewer list`

use tracing::debug;
use v4l::prelude::*;
use v4l::video::Capture;

/// A `/dev/video*` node and what it reports through QUERYCAP
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V4l2DeviceInfo {
    pub path: String,
    /// Card name, e.g. "Integrated Camera"
    pub card: String,
    pub driver: String,
    pub bus_info: String,
    /// Whether the node advertises single-planar video capture
    pub can_capture: bool,
    /// FourCC codes of the capture formats, e.g. "YUYV", "MJPG"
    pub formats: Vec<String>,
}

/// Whether a `/dev` entry name looks like a video device node
pub fn is_video_node(name: &str) -> bool {
    name.strip_prefix("video")
        .map(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

/// Query one device node; `None` if it cannot be opened
pub fn query_device(path: &str) -> Option<V4l2DeviceInfo> {
    let dev = Device::with_path(path).ok()?;
    let caps = dev.query_caps().ok()?;
    let can_capture = caps
        .capabilities
        .contains(v4l::capability::Flags::VIDEO_CAPTURE);

    let formats = if can_capture {
        dev.enum_formats()
            .map(|descs| descs.iter().map(|d| d.fourcc.to_string()).collect())
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    debug!(path, card = %caps.card, driver = %caps.driver, can_capture, "Queried V4L2 device");
    Some(V4l2DeviceInfo {
        path: path.to_string(),
        card: caps.card,
        driver: caps.driver,
        bus_info: caps.bus,
        can_capture,
        formats,
    })
}

/// All video nodes under `/dev`, sorted by path
pub fn enumerate_devices() -> Vec<V4l2DeviceInfo> {
    let mut paths: Vec<String> = std::fs::read_dir("/dev")
        .into_iter()
        .flatten()
        .flatten()
        .filter(|e| e.file_name().to_str().map(is_video_node).unwrap_or(false))
        .map(|e| e.path().to_string_lossy().to_string())
        .collect();
    paths.sort_by_key(|p| {
        p.trim_start_matches("/dev/video")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });

    paths.iter().filter_map(|p| query_device(p)).collect()
}

/// Capture-capable devices only (metadata nodes are skipped)
pub fn capture_devices() -> Vec<V4l2DeviceInfo> {
    enumerate_devices()
        .into_iter()
        .filter(|d| d.can_capture)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_node_names() {
        assert!(is_video_node("video0"));
        assert!(is_video_node("video12"));
        assert!(!is_video_node("video"));
        assert!(!is_video_node("video-loopback"));
        assert!(!is_video_node("media0"));
    }

    #[test]
    fn missing_device_is_skipped() {
        assert_eq!(query_device("/dev/video-does-not-exist"), None);
    }
}
