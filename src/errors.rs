// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the capture, processing and render pipeline
//!
//! Each execution context converts failures at its own boundary: the capture
//! thread turns session errors into a state transition, processing workers
//! turn per-frame errors into a dropped frame, and the renderer turns program
//! setup failures into a permanently disabled draw path.

use std::fmt;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Result type for capture operations
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Result type for frame processing
pub type ProcessResult<T> = Result<T, ProcessError>;

/// Result type for renderer operations
pub type RenderResult<T> = Result<T, RenderError>;

/// Main application error type
#[derive(Debug, Clone)]
pub enum AppError {
    /// Camera capture errors
    Capture(CaptureError),
    /// GPU / renderer errors
    Render(RenderError),
    /// Configuration errors
    Config(ConfigError),
    /// Generic error with message
    Other(String),
}

/// Capture-side errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// The camera device could not be opened
    DeviceOpenFailed(String),
    /// The capture session could not be configured (format, caps, sink)
    ConfigurationFailed(String),
    /// `start()` called while a session is opening or streaming
    AlreadyRunning,
    /// A single frame could not be acquired; the next one may succeed
    FrameUnavailable(String),
    /// The running stream reported an error
    StreamFailed(String),
    /// The device went away mid-session
    Disconnected,
    /// The capture thread could not be spawned
    ThreadSpawn(String),
}

impl CaptureError {
    /// Per-frame errors drop one frame; everything else ends the session
    pub fn is_transient(&self) -> bool {
        matches!(self, CaptureError::FrameUnavailable(_))
    }
}

/// Frame processing errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    /// The processor reported a failure
    Failed(String),
    /// The processor panicked; the worker caught it
    Panicked(String),
    /// The processor returned a buffer of the wrong size
    InvalidOutput { expected: usize, actual: usize },
    /// The input frame does not match its declared dimensions
    InvalidInput { expected: usize, actual: usize },
    /// A frame with a zero dimension cannot be displayed
    EmptyDimensions { width: u32, height: u32 },
}

/// Renderer and GPU errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// No usable GPU adapter
    NoAdapter(String),
    /// Device creation failed
    DeviceRequest(String),
    /// A shader stage failed to compile
    ShaderCompilation(String),
    /// The render program failed to link (pipeline creation)
    ProgramLink(String),
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Reading the config file failed
    Io(String),
    /// The config file is not valid JSON for `Config`
    Parse(String),
    /// A value is out of range
    Invalid(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Capture(e) => write!(f, "Capture error: {}", e),
            AppError::Render(e) => write!(f, "Render error: {}", e),
            AppError::Config(e) => write!(f, "Configuration error: {}", e),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::DeviceOpenFailed(msg) => write!(f, "Failed to open camera: {}", msg),
            CaptureError::ConfigurationFailed(msg) => {
                write!(f, "Capture session configuration failed: {}", msg)
            }
            CaptureError::AlreadyRunning => write!(f, "Capture is already running"),
            CaptureError::FrameUnavailable(msg) => write!(f, "Frame unavailable: {}", msg),
            CaptureError::StreamFailed(msg) => write!(f, "Stream failed: {}", msg),
            CaptureError::Disconnected => write!(f, "Camera disconnected"),
            CaptureError::ThreadSpawn(msg) => write!(f, "Failed to spawn capture thread: {}", msg),
        }
    }
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessError::Failed(msg) => write!(f, "Processing failed: {}", msg),
            ProcessError::Panicked(msg) => write!(f, "Processor panicked: {}", msg),
            ProcessError::InvalidOutput { expected, actual } => write!(
                f,
                "Processor returned {} bytes, expected {}",
                actual, expected
            ),
            ProcessError::InvalidInput { expected, actual } => {
                write!(f, "Input frame has {} bytes, expected {}", actual, expected)
            }
            ProcessError::EmptyDimensions { width, height } => {
                write!(f, "Frame has empty dimensions {}x{}", width, height)
            }
        }
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::NoAdapter(msg) => write!(f, "No GPU adapter: {}", msg),
            RenderError::DeviceRequest(msg) => write!(f, "Failed to create GPU device: {}", msg),
            RenderError::ShaderCompilation(msg) => write!(f, "Could not compile shader: {}", msg),
            RenderError::ProgramLink(msg) => write!(f, "Could not link program: {}", msg),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "Failed to read config: {}", msg),
            ConfigError::Parse(msg) => write!(f, "Failed to parse config: {}", msg),
            ConfigError::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for CaptureError {}
impl std::error::Error for ProcessError {}
impl std::error::Error for RenderError {}
impl std::error::Error for ConfigError {}

// Conversions from sub-errors to AppError
impl From<CaptureError> for AppError {
    fn from(err: CaptureError) -> Self {
        AppError::Capture(err)
    }
}

impl From<RenderError> for AppError {
    fn from(err: RenderError) -> Self {
        AppError::Render(err)
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_frame_errors_are_transient() {
        assert!(CaptureError::FrameUnavailable("late".into()).is_transient());
        assert!(!CaptureError::DeviceOpenFailed("busy".into()).is_transient());
        assert!(!CaptureError::ConfigurationFailed("caps".into()).is_transient());
        assert!(!CaptureError::Disconnected.is_transient());
    }

    #[test]
    fn app_error_wraps_sub_errors() {
        let err: AppError = CaptureError::Disconnected.into();
        assert_eq!(err.to_string(), "Capture error: Camera disconnected");

        let err: AppError = ConfigError::Invalid("backlog must be at least 1".into()).into();
        assert_eq!(
            err.to_string(),
            "Configuration error: Invalid config: backlog must be at least 1"
        );
    }
}
