// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! - `list`: V4L2 capture devices
//! - `snapshot`: first processed frame written as PNG
//! - `run`: the live pipeline drawing into an offscreen GPU surface

use chrono::Local;
use edgeviewer::backends::camera::v4l2_utils;
use edgeviewer::backends::create_sensor;
use edgeviewer::constants::timing;
use edgeviewer::gpu::{OffscreenSurface, create_render_device};
use edgeviewer::{CaptureState, Config, DrawOutcome, FramePipeline, Renderer};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// List all available cameras
pub fn list_cameras() -> Result<(), Box<dyn std::error::Error>> {
    let devices = v4l2_utils::capture_devices();

    if devices.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras:");
    println!();
    for device in &devices {
        println!("  {} {}", device.path, device.card);
        println!("      Driver: {} ({})", device.driver, device.bus_info);
        if !device.formats.is_empty() {
            println!("      Formats: {}", device.formats.join(", "));
        }
        println!();
    }

    Ok(())
}

fn build_pipeline(config: &Config) -> Result<FramePipeline, Box<dyn std::error::Error>> {
    let sensor = create_sensor(config.source, config.device_path.clone());
    let pipeline = FramePipeline::new(sensor, config.create_processor(), config.pipeline_options())?;
    Ok(pipeline)
}

/// Capture until the first processed frame arrives and save it as PNG
pub fn snapshot(config: &Config, output: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let output_path = match output {
        Some(path) if path.is_dir() => path.join(default_snapshot_name()),
        Some(path) => path,
        None => get_default_snapshot_dir().join(default_snapshot_name()),
    };
    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    println!("Using source: {} ({})", config.source, config.processor);
    let mut pipeline = build_pipeline(config)?;
    let slot = pipeline.slot();
    pipeline.start()?;

    let start = Instant::now();
    let timeout = Duration::from_secs(timing::SNAPSHOT_TIMEOUT_SECS);
    let frame = loop {
        if let Some(frame) = slot.consume_if_dirty() {
            break frame;
        }
        if pipeline.capture_state() == CaptureState::Error {
            let reason = pipeline
                .capture_error()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown error".to_string());
            return Err(format!("Capture failed: {}", reason).into());
        }
        if start.elapsed() > timeout {
            return Err("Timed out waiting for a processed frame".into());
        }
        std::thread::sleep(Duration::from_millis(16));
    };
    pipeline.stop();

    let (width, height) = (frame.width(), frame.height());
    let frame = Arc::try_unwrap(frame).unwrap_or_else(|shared| (*shared).clone());
    let image = image::RgbaImage::from_raw(width, height, frame.into_data())
        .ok_or("Processed frame does not match its dimensions")?;
    image.save(&output_path)?;

    println!("Snapshot saved: {} ({}x{})", output_path.display(), width, height);
    Ok(())
}

/// Run the live pipeline until Ctrl+C or `duration` seconds
pub fn run(config: &Config, duration: Option<u64>) -> Result<(), Box<dyn std::error::Error>> {
    let (device, queue, gpu_info) = pollster::block_on(create_render_device("edgeviewer"))?;
    println!("Using GPU: {} ({:?})", gpu_info.adapter_name, gpu_info.backend);

    let mut pipeline = build_pipeline(config)?;
    let surface = OffscreenSurface::new(
        &device,
        config.surface_width,
        config.surface_height,
        wgpu::TextureFormat::Rgba8UnormSrgb,
    );
    let mut renderer = Renderer::new(pipeline.slot(), config.width, config.height);
    renderer.on_surface_created(&device, surface.format())?;
    renderer.on_surface_resized(surface.width(), surface.height());

    pipeline.start()?;
    println!(
        "Running {} → {} at {}x{}. Press Ctrl+C to stop.",
        config.source, config.processor, config.width, config.height
    );

    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    let tick = Duration::from_secs(1) / config.render_fps.max(1);
    let deadline = duration.map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut last_report = Instant::now();
    let mut draws: u64 = 0;
    let mut uploads: u64 = 0;

    loop {
        let tick_start = Instant::now();
        if stop_flag.load(Ordering::SeqCst) {
            println!();
            break;
        }
        if deadline.is_some_and(|d| tick_start >= d) {
            break;
        }
        if pipeline.capture_state() == CaptureState::Error {
            warn!(error = ?pipeline.capture_error(), "Capture stopped with an error");
            break;
        }

        match renderer.on_draw_frame(&device, &queue, surface.view()) {
            DrawOutcome::Drawn { uploaded } => {
                draws += 1;
                if uploaded {
                    uploads += 1;
                }
            }
            DrawOutcome::Cleared => draws += 1,
            DrawOutcome::Skipped => {}
        }

        if last_report.elapsed() >= Duration::from_secs(1) {
            let stats = pipeline.stats();
            info!(draws, uploads, stats = %stats, "Pipeline status");
            print!(
                "\rCaptured {} | processed {} | displayed {}   ",
                stats.frames_captured, stats.processing.processed, uploads
            );
            use std::io::Write;
            let _ = std::io::stdout().flush();
            last_report = Instant::now();
        }

        if let Some(remaining) = tick.checked_sub(tick_start.elapsed()) {
            std::thread::sleep(remaining);
        }
    }

    let capture_error = pipeline.capture_error();
    pipeline.stop();
    let stats = pipeline.stats();
    println!("\n{}", stats);
    println!(
        "Renderer: {} uploads, {} rejected, {} draws",
        renderer.uploads(),
        renderer.rejected(),
        draws
    );

    match capture_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn default_snapshot_name() -> String {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    format!("edges_{}.png", timestamp)
}

/// Get default snapshot directory
fn get_default_snapshot_dir() -> PathBuf {
    dirs::picture_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join("edgeviewer")
}
