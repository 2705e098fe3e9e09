// SPDX-License-Identifier: GPL-3.0-only

//! GPU initialization and the offscreen render target
//!
//! Without a windowing layer the renderer draws into an [`OffscreenSurface`]:
//! a plain render-attachment texture that stands in for a swapchain image.

use crate::errors::{RenderError, RenderResult};
use tracing::{debug, info};

/// Information about the created GPU device
#[derive(Debug, Clone)]
pub struct GpuDeviceInfo {
    /// Name of the GPU adapter
    pub adapter_name: String,
    /// Backend being used (Vulkan here)
    pub backend: wgpu::Backend,
    /// Largest 2D texture the device accepts
    pub max_texture_dimension: u32,
}

/// Create a wgpu device and queue for rendering frames.
pub async fn create_render_device(
    label: &str,
) -> RenderResult<(wgpu::Device, wgpu::Queue, GpuDeviceInfo)> {
    info!(label = label, "Creating GPU device for rendering");

    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::VULKAN,
        ..Default::default()
    });

    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::LowPower,
            compatible_surface: None,
            force_fallback_adapter: false,
        })
        .await
        .map_err(|e| RenderError::NoAdapter(e.to_string()))?;

    let adapter_info = adapter.get_info();
    info!(
        adapter = %adapter_info.name,
        backend = ?adapter_info.backend,
        "GPU adapter selected"
    );

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some(label),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
            memory_hints: wgpu::MemoryHints::Performance,
            ..Default::default()
        })
        .await
        .map_err(|e| RenderError::DeviceRequest(e.to_string()))?;

    let max_texture_dimension = device.limits().max_texture_dimension_2d;
    debug!(max_texture_dimension, "GPU device created");

    let info = GpuDeviceInfo {
        adapter_name: adapter_info.name.clone(),
        backend: adapter_info.backend,
        max_texture_dimension,
    };

    Ok((device, queue, info))
}

/// Render target texture standing in for a window surface
pub struct OffscreenSurface {
    // Kept alive for the view
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    format: wgpu::TextureFormat,
    width: u32,
    height: u32,
}

impl OffscreenSurface {
    pub fn new(device: &wgpu::Device, width: u32, height: u32, format: wgpu::TextureFormat) -> Self {
        let (texture, view) = create_target(device, width, height, format);
        Self {
            _texture: texture,
            view,
            format,
            width: width.max(1),
            height: height.max(1),
        }
    }

    /// Recreate the target at a new size; returns whether anything changed
    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) -> bool {
        let (width, height) = (width.max(1), height.max(1));
        if (width, height) == (self.width, self.height) {
            return false;
        }
        let (texture, view) = create_target(device, width, height, self.format);
        self._texture = texture;
        self.view = view;
        self.width = width;
        self.height = height;
        true
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

fn create_target(
    device: &wgpu::Device,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("offscreen_surface"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_render_device() {
        // This test requires a GPU, so it may be skipped in CI
        match create_render_device("test_device").await {
            Ok((device, _queue, info)) => {
                println!("Created device: {:?}", info);
                assert!(!info.adapter_name.is_empty());
                assert!(info.max_texture_dimension >= 2048);

                let mut surface =
                    OffscreenSurface::new(&device, 32, 16, wgpu::TextureFormat::Rgba8Unorm);
                assert!(!surface.resize(&device, 32, 16));
                assert!(surface.resize(&device, 0, 8));
                assert_eq!((surface.width(), surface.height()), (1, 8));
            }
            Err(e) => {
                // Skip if no GPU available
                println!("Skipping test (no GPU): {}", e);
            }
        }
    }
}
