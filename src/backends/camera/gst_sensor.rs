// SPDX-License-Identifier: GPL-3.0-only

//! GStreamer-backed sensor
//!
//! Builds `source ! videoconvert ! videoscale ! I420 caps ! appsink` and pulls
//! samples from the appsink on the capture thread. The appsink holds at most
//! `backlog` buffers and drops the oldest when full, and every acquire drains
//! it down to the newest sample, so a slow consumer never sees a backlog.

use super::SensorDevice;
use super::types::{CaptureConfig, FrameData, RawSensorFrame, SensorPlane, SourceKind};
use crate::constants::{pipeline, timing};
use crate::errors::{CaptureError, CaptureResult};
use gstreamer::prelude::*;
use gstreamer_app::AppSink;
use gstreamer_video::{VideoFormat, VideoInfo};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Sensor reading I420 frames through a GStreamer pipeline
pub struct GstSensor {
    source: SourceKind,
    device_path: Option<String>,
    config: Option<CaptureConfig>,
    /// Config whose caps the current pipeline was built with
    launched: Option<CaptureConfig>,
    pipeline: Option<gstreamer::Pipeline>,
    appsink: Option<AppSink>,
    frames_pulled: u64,
    frames_superseded: u64,
}

impl GstSensor {
    /// Create a sensor for the given source; nothing is opened yet
    pub fn new(source: SourceKind, device_path: Option<String>) -> Self {
        Self {
            source,
            device_path,
            config: None,
            launched: None,
            pipeline: None,
            appsink: None,
            frames_pulled: 0,
            frames_superseded: 0,
        }
    }

    /// Launch description for the configured source
    pub fn launch_string(source: SourceKind, device_path: Option<&str>, config: &CaptureConfig) -> String {
        let src = match source {
            SourceKind::V4l2 | SourceKind::Synthetic => format!(
                "v4l2src device=\"{}\"",
                device_path.unwrap_or(crate::constants::capture::DEFAULT_DEVICE)
            ),
            SourceKind::PipeWire => match device_path {
                Some(target) => format!("pipewiresrc target-object=\"{}\"", target),
                None => "pipewiresrc".to_string(),
            },
            SourceKind::TestPattern => format!(
                "videotestsrc is-live=true pattern=ball ! video/x-raw,framerate={}/1",
                config.framerate.max(1)
            ),
        };

        format!(
            "{} ! videoconvert ! videoscale ! \
             video/x-raw,format={},width={},height={} ! \
             appsink name={}",
            src,
            pipeline::SENSOR_FORMAT,
            config.width,
            config.height,
            pipeline::SINK_NAME
        )
    }

    /// First pending error or EOS on the bus, if any
    fn pending_bus_error(&self) -> Option<CaptureError> {
        let bus = self.pipeline.as_ref()?.bus()?;
        let msg = bus.pop_filtered(&[
            gstreamer::MessageType::Error,
            gstreamer::MessageType::Eos,
        ])?;

        match msg.view() {
            gstreamer::MessageView::Error(err) => {
                let debug_info = err.debug().map(|d| d.to_string()).unwrap_or_default();
                error!(error = %err.error(), debug = %debug_info, "GStreamer pipeline error");
                Some(CaptureError::StreamFailed(err.error().to_string()))
            }
            gstreamer::MessageView::Eos(..) => Some(CaptureError::Disconnected),
            _ => None,
        }
    }

    fn sample_to_frame(sample: &gstreamer::Sample) -> CaptureResult<RawSensorFrame> {
        let caps = sample
            .caps()
            .ok_or_else(|| CaptureError::FrameUnavailable("no caps in sample".into()))?;
        let info = VideoInfo::from_caps(caps)
            .map_err(|e| CaptureError::FrameUnavailable(format!("invalid caps: {}", e)))?;

        if info.format() != VideoFormat::I420 {
            return Err(CaptureError::FrameUnavailable(format!(
                "unexpected format {:?}",
                info.format()
            )));
        }

        let buffer = sample
            .buffer_owned()
            .ok_or_else(|| CaptureError::FrameUnavailable("no buffer in sample".into()))?;
        if buffer.flags().contains(gstreamer::BufferFlags::CORRUPTED) {
            return Err(CaptureError::FrameUnavailable("buffer marked corrupted".into()));
        }
        let mapped = buffer
            .into_mapped_buffer_readable()
            .map_err(|_| CaptureError::FrameUnavailable("failed to map buffer".into()))?;
        let data = FrameData::from_mapped_buffer(mapped);

        let (width, height) = (info.width(), info.height());
        let (cw, ch) = crate::media::chroma_dimensions(width, height);
        let plane = |index: usize, plane_width: usize, plane_height: usize| SensorPlane {
            data: data.clone(),
            offset: info.offset()[index],
            row_stride: info.stride()[index] as usize,
            pixel_stride: 1,
            width: plane_width,
            height: plane_height,
        };

        RawSensorFrame::new(
            width,
            height,
            plane(0, width as usize, height as usize),
            plane(1, cw, ch),
            plane(2, cw, ch),
        )
    }
}

impl SensorDevice for GstSensor {
    fn name(&self) -> &str {
        match self.source {
            SourceKind::PipeWire => "pipewire",
            SourceKind::TestPattern => "videotestsrc",
            _ => "v4l2",
        }
    }

    fn open(&mut self) -> CaptureResult<()> {
        gstreamer::init().map_err(|e| CaptureError::DeviceOpenFailed(e.to_string()))?;

        // Caps are part of the launch string, so use the defaults until configure
        let config = self.config.clone().unwrap_or_default();
        let launch = Self::launch_string(self.source, self.device_path.as_deref(), &config);
        info!(source = %self.source, launch = %launch, "Opening camera");

        let pipeline = gstreamer::parse::launch(&launch)
            .map_err(|e| CaptureError::DeviceOpenFailed(format!("failed to build pipeline: {}", e)))?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| CaptureError::DeviceOpenFailed("failed to downcast to Pipeline".into()))?;

        let appsink = pipeline
            .by_name(pipeline::SINK_NAME)
            .ok_or_else(|| CaptureError::DeviceOpenFailed("failed to find appsink".into()))?
            .downcast::<AppSink>()
            .map_err(|_| CaptureError::DeviceOpenFailed("failed to downcast to AppSink".into()))?;

        // NULL -> READY opens the device node
        let ready = pipeline.set_state(gstreamer::State::Ready);
        self.pipeline = Some(pipeline);
        if let Err(e) = ready {
            let reason = self
                .pending_bus_error()
                .map(|err| err.to_string())
                .unwrap_or_else(|| e.to_string());
            self.close();
            return Err(CaptureError::DeviceOpenFailed(reason));
        }

        self.appsink = Some(appsink);
        self.launched = Some(config);
        debug!("Camera device opened");
        Ok(())
    }

    fn configure(&mut self, config: &CaptureConfig) -> CaptureResult<()> {
        self.config = Some(config.clone());

        // Size and rate live in the launch caps; rebuild if they changed since open
        let launched_caps = self
            .launched
            .as_ref()
            .map(|c| (c.width, c.height, c.framerate));
        if launched_caps != Some((config.width, config.height, config.framerate)) {
            debug!(config = %config, "Rebuilding pipeline for new caps");
            self.close();
            self.open()
                .map_err(|e| CaptureError::ConfigurationFailed(e.to_string()))?;
        }

        let (Some(pipeline), Some(appsink)) = (self.pipeline.as_ref(), self.appsink.as_ref()) else {
            return Err(CaptureError::ConfigurationFailed("camera is not open".into()));
        };

        appsink.set_max_buffers(config.backlog);
        appsink.set_drop(true);
        appsink.set_property("sync", false);
        appsink.set_property("enable-last-sample", false);
        debug!(backlog = config.backlog, "Appsink configured");

        if let Err(e) = pipeline.set_state(gstreamer::State::Playing) {
            let reason = self
                .pending_bus_error()
                .map(|err| err.to_string())
                .unwrap_or_else(|| e.to_string());
            return Err(CaptureError::ConfigurationFailed(reason));
        }

        let (result, state, pending) =
            pipeline.state(gstreamer::ClockTime::from_seconds(timing::START_TIMEOUT_SECS));
        debug!(result = ?result, state = ?state, pending = ?pending, "Pipeline state");

        // Caps negotiation failures arrive on the bus, not from set_state
        if let Some(err) = self.pending_bus_error() {
            return Err(CaptureError::ConfigurationFailed(err.to_string()));
        }
        if result.is_err() {
            return Err(CaptureError::ConfigurationFailed(format!(
                "pipeline stuck in {:?}",
                state
            )));
        }
        if state != gstreamer::State::Playing {
            warn!(state = ?state, "Pipeline is not in PLAYING state yet");
        }

        info!(config = %config, "Capture session configured");
        Ok(())
    }

    fn acquire_latest(&mut self, timeout: Duration) -> CaptureResult<Option<RawSensorFrame>> {
        if let Some(err) = self.pending_bus_error() {
            return Err(err);
        }
        let Some(appsink) = self.appsink.as_ref() else {
            return Err(CaptureError::StreamFailed("camera is not open".into()));
        };

        let Some(mut sample) =
            appsink.try_pull_sample(gstreamer::ClockTime::from_mseconds(timeout.as_millis() as u64))
        else {
            if appsink.is_eos() {
                return Err(CaptureError::Disconnected);
            }
            return Ok(None);
        };

        // Serve the freshest frame; older queued ones are dropped unprocessed
        while let Some(newer) = appsink.try_pull_sample(gstreamer::ClockTime::ZERO) {
            sample = newer;
            self.frames_superseded += 1;
        }

        self.frames_pulled += 1;
        if self.frames_pulled % timing::FRAME_LOG_INTERVAL == 0 {
            debug!(
                pulled = self.frames_pulled,
                superseded = self.frames_superseded,
                "Sensor statistics"
            );
        }

        Self::sample_to_frame(&sample).map(Some)
    }

    fn close(&mut self) {
        self.appsink = None;
        self.launched = None;
        let Some(pipeline) = self.pipeline.take() else {
            return;
        };

        if let Err(e) = pipeline.set_state(gstreamer::State::Null) {
            warn!(error = %e, "Failed to stop pipeline");
            return;
        }
        let (result, state, _) =
            pipeline.state(gstreamer::ClockTime::from_seconds(timing::STOP_TIMEOUT_SECS));
        match result {
            Ok(_) => info!(state = ?state, "Camera pipeline stopped"),
            Err(e) => debug!(error = ?e, state = ?state, "Pipeline state change had issues"),
        }
    }
}

impl Drop for GstSensor {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_string_requests_planar_yuv_at_session_size() {
        let config = CaptureConfig::default();
        let launch = GstSensor::launch_string(SourceKind::V4l2, Some("/dev/video2"), &config);
        assert!(launch.starts_with("v4l2src device=\"/dev/video2\""));
        assert!(launch.contains("format=I420,width=640,height=480"));
        assert!(launch.ends_with("appsink name=sink"));
    }

    #[test]
    fn test_pattern_is_live() {
        let config = CaptureConfig {
            framerate: 15,
            ..Default::default()
        };
        let launch = GstSensor::launch_string(SourceKind::TestPattern, None, &config);
        assert!(launch.contains("videotestsrc is-live=true"));
        assert!(launch.contains("framerate=15/1"));
    }

    #[test]
    fn pipewire_target_is_optional() {
        let config = CaptureConfig::default();
        assert!(GstSensor::launch_string(SourceKind::PipeWire, None, &config)
            .starts_with("pipewiresrc !"));
        assert!(GstSensor::launch_string(SourceKind::PipeWire, Some("42"), &config)
            .contains("target-object=\"42\""));
    }
}
