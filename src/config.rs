// SPDX-License-Identifier: GPL-3.0-only

use crate::backends::camera::{CaptureConfig, SourceKind};
use crate::constants::{capture, pipeline, processing, render};
use crate::errors::ConfigError;
use crate::pipelines::{FrameProcessor, PipelineOptions, ProcessorKind};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Application configuration
///
/// Read from JSON; every field is optional in the file and falls back to
/// its default.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Capture width in pixels
    pub width: u32,
    /// Capture height in pixels
    pub height: u32,
    /// Where frames come from
    pub source: SourceKind,
    /// Device node or PipeWire target (source dependent)
    pub device_path: Option<String>,
    /// Requested sensor framerate
    pub framerate: u32,
    /// Buffers the capture sink may hold
    pub backlog: u32,
    /// Processor applied to every frame
    pub processor: ProcessorKind,
    pub edge_low_threshold: u16,
    pub edge_high_threshold: u16,
    /// Frames processed concurrently
    pub max_in_flight: usize,
    /// Never show a frame captured before the one on screen
    pub enforce_capture_order: bool,
    pub surface_width: u32,
    pub surface_height: u32,
    /// Render ticks per second
    pub render_fps: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            width: capture::DEFAULT_WIDTH,
            height: capture::DEFAULT_HEIGHT,
            source: SourceKind::default(),
            device_path: None,
            framerate: capture::DEFAULT_FRAMERATE,
            backlog: pipeline::MAX_BUFFERS,
            processor: ProcessorKind::default(),
            edge_low_threshold: processing::EDGE_LOW_THRESHOLD,
            edge_high_threshold: processing::EDGE_HIGH_THRESHOLD,
            max_in_flight: processing::DEFAULT_MAX_IN_FLIGHT,
            enforce_capture_order: true,
            surface_width: render::DEFAULT_SURFACE_WIDTH,
            surface_height: render::DEFAULT_SURFACE_HEIGHT,
            render_fps: render::DEFAULT_RENDER_FPS,
        }
    }
}

impl Config {
    /// `~/.config/edgeviewer/config.json` (or the platform equivalent)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("edgeviewer").join("config.json"))
    }

    /// Load from an explicit file, or from the default location.
    ///
    /// An explicit path must exist. A missing default file gives defaults.
    /// Values are not validated here; callers apply overrides first and then
    /// call [`Config::validate`].
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match Self::default_path() {
                Some(p) => (p, false),
                None => return Ok(Self::default()),
            },
        };

        if !required && !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_json(&text)?;
        info!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "capture size {}x{} has a zero dimension",
                self.width, self.height
            )));
        }
        if self.backlog == 0 {
            return Err(ConfigError::Invalid("backlog must be at least 1".into()));
        }
        if self.max_in_flight == 0 {
            return Err(ConfigError::Invalid("max_in_flight must be at least 1".into()));
        }
        if self.edge_low_threshold > self.edge_high_threshold {
            return Err(ConfigError::Invalid(format!(
                "edge thresholds out of order: low {} > high {}",
                self.edge_low_threshold, self.edge_high_threshold
            )));
        }
        if self.surface_width == 0 || self.surface_height == 0 {
            return Err(ConfigError::Invalid("surface size has a zero dimension".into()));
        }
        if self.render_fps == 0 {
            return Err(ConfigError::Invalid("render_fps must be at least 1".into()));
        }
        Ok(())
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            width: self.width,
            height: self.height,
            framerate: self.framerate,
            backlog: self.backlog,
        }
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            capture: self.capture_config(),
            max_in_flight: self.max_in_flight,
            enforce_capture_order: self.enforce_capture_order,
        }
    }

    /// Instantiate the configured processor
    pub fn create_processor(&self) -> Arc<dyn FrameProcessor> {
        self.processor
            .create(self.edge_low_threshold, self.edge_high_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = Config::from_json(r#"{ "source": "test-pattern", "max_in_flight": 4 }"#).unwrap();
        assert_eq!(config.source, SourceKind::TestPattern);
        assert_eq!(config.max_in_flight, 4);
        assert_eq!(config.width, 640);
        assert_eq!(config.processor, ProcessorKind::Edges);
    }

    #[test]
    fn zero_backlog_is_invalid() {
        let config = Config::from_json(r#"{ "backlog": 0 }"#).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
