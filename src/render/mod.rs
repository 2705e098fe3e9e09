// SPDX-License-Identifier: GPL-3.0-only

//! Frame renderer
//!
//! Driven by the surface owner through three callbacks, all on the render
//! thread:
//!
//! - [`Renderer::on_surface_created`] builds the program, sampler and quad
//! - [`Renderer::on_surface_resized`] updates the viewport
//! - [`Renderer::on_draw_frame`] drains the frame slot, re-specifies the
//!   texture when a new frame arrived, and draws
//!
//! Once a frame has been uploaded every draw shows a frame; when nothing new
//! arrived the previous texture is drawn again. Program build failures leave
//! the renderer in [`RendererState::Failed`] where draws do nothing.

pub mod gate;
pub mod geometry;

pub use gate::{FrameGate, Rejection};
pub use geometry::{QUAD_VERTICES, Vertex};

use crate::constants::{render, timing};
use crate::errors::{RenderError, RenderResult};
use crate::media::ProcessedFrame;
use crate::pipelines::FrameSlot;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use wgpu::util::DeviceExt;

/// Source of the pass-through program
pub const FRAME_SHADER: &str = include_str!("frame.wgsl");

/// Renderer lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererState {
    /// No surface yet, or the surface was lost
    Uninitialized,
    /// Program built; draws run
    Ready,
    /// Program build failed; draws are no-ops
    Failed,
}

/// What a draw call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawOutcome {
    /// No valid program; nothing was submitted
    Skipped,
    /// Nothing uploaded yet; the target was cleared only
    Cleared,
    /// The quad was drawn, with a freshly uploaded frame or the previous one
    Drawn { uploaded: bool },
}

/// Program objects built for one surface
struct FrameProgram {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    vertex_buffer: wgpu::Buffer,
    texture_format: wgpu::TextureFormat,
    max_dimension: u32,
}

/// Texture holding the displayed frame
struct FrameTexture {
    // Kept alive for the bind group
    _texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
}

/// Draws the latest processed frame onto a full-viewport quad
pub struct Renderer {
    slot: Arc<FrameSlot>,
    shader_source: &'static str,
    state: RendererState,
    program: Option<FrameProgram>,
    texture: Option<FrameTexture>,
    frame_width: u32,
    frame_height: u32,
    viewport: (u32, u32),
    gate: FrameGate,
    uploads: u64,
    rejected: u64,
}

impl Renderer {
    /// `width`/`height` are the expected frame dimensions of the session
    pub fn new(slot: Arc<FrameSlot>, width: u32, height: u32) -> Self {
        let enforce_order = slot.enforces_order();
        Self {
            slot,
            shader_source: FRAME_SHADER,
            state: RendererState::Uninitialized,
            program: None,
            texture: None,
            frame_width: width,
            frame_height: height,
            viewport: (0, 0),
            gate: FrameGate::new(enforce_order),
            uploads: 0,
            rejected: 0,
        }
    }

    pub fn state(&self) -> RendererState {
        self.state
    }

    /// Dimensions of the most recently uploaded frame
    pub fn frame_dimensions(&self) -> (u32, u32) {
        (self.frame_width, self.frame_height)
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn uploads(&self) -> u64 {
        self.uploads
    }

    /// Frames consumed from the slot but refused by the upload gate
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Build the program for a new surface with the given target format.
    ///
    /// Drops everything tied to a previous surface first. A shader or
    /// pipeline error leaves the renderer in [`RendererState::Failed`].
    pub fn on_surface_created(
        &mut self,
        device: &wgpu::Device,
        target_format: wgpu::TextureFormat,
    ) -> RenderResult<()> {
        self.state = RendererState::Uninitialized;
        self.program = None;
        self.texture = None;
        self.gate.reset();

        match build_program(device, target_format, self.shader_source) {
            Ok(program) => {
                info!(
                    format = ?target_format,
                    texture_format = ?program.texture_format,
                    "Frame program ready"
                );
                self.program = Some(program);
                self.state = RendererState::Ready;
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Failed to build frame program, drawing disabled");
                self.state = RendererState::Failed;
                Err(e)
            }
        }
    }

    /// Track the surface size; the quad fills whatever the viewport is
    pub fn on_surface_resized(&mut self, width: u32, height: u32) {
        debug!(width, height, "Viewport resized");
        self.viewport = (width, height);
    }

    /// Per-tick draw: upload a new frame if one is waiting, then draw
    pub fn on_draw_frame(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        target: &wgpu::TextureView,
    ) -> DrawOutcome {
        if self.state != RendererState::Ready {
            return DrawOutcome::Skipped;
        }
        let Some(program) = self.program.as_ref() else {
            return DrawOutcome::Skipped;
        };

        let mut uploaded = false;
        if let Some(frame) = self.slot.consume_if_dirty() {
            match self.gate.admit(&frame, program.max_dimension) {
                Ok(()) => {
                    self.texture = Some(upload_frame(device, queue, program, &frame));
                    self.frame_width = frame.width();
                    self.frame_height = frame.height();
                    self.uploads += 1;
                    uploaded = true;
                    if self.uploads % timing::FRAME_LOG_INTERVAL == 0 {
                        debug!(
                            uploads = self.uploads,
                            sequence = frame.sequence(),
                            width = frame.width(),
                            height = frame.height(),
                            "Frame uploaded"
                        );
                    }
                }
                Err(reason) => {
                    self.rejected += 1;
                    warn!(reason = %reason, "Frame not uploaded");
                }
            }
        }

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("frame_encoder"),
        });

        let drawn = {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("frame_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            let (vw, vh) = self.viewport;
            match self.texture.as_ref() {
                Some(texture) if vw > 0 && vh > 0 => {
                    pass.set_viewport(0.0, 0.0, vw as f32, vh as f32, 0.0, 1.0);
                    pass.set_pipeline(&program.pipeline);
                    pass.set_bind_group(0, &texture.bind_group, &[]);
                    pass.set_vertex_buffer(0, program.vertex_buffer.slice(..));
                    pass.draw(0..QUAD_VERTICES.len() as u32, 0..1);
                    true
                }
                _ => false,
            }
        };

        queue.submit(Some(encoder.finish()));

        if drawn {
            DrawOutcome::Drawn { uploaded }
        } else {
            DrawOutcome::Cleared
        }
    }
}

/// Texture format that round-trips bytes unchanged to the given target
pub fn texture_format_for(target_format: wgpu::TextureFormat) -> wgpu::TextureFormat {
    if target_format.is_srgb() {
        wgpu::TextureFormat::Rgba8UnormSrgb
    } else {
        wgpu::TextureFormat::Rgba8Unorm
    }
}

fn build_program(
    device: &wgpu::Device,
    target_format: wgpu::TextureFormat,
    shader_source: &str,
) -> RenderResult<FrameProgram> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("frame_shader"),
        source: wgpu::ShaderSource::Wgsl(shader_source.into()),
    });
    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        return Err(RenderError::ShaderCompilation(err.to_string()));
    }

    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("frame_bind_group_layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("frame_pipeline_layout"),
        bind_group_layouts: &[&bind_group_layout],
        push_constant_ranges: &[],
    });

    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("frame_pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[Vertex::layout()],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: target_format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleStrip,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    });
    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        return Err(RenderError::ProgramLink(err.to_string()));
    }

    // Nearest filtering and clamped edges: no blending between texels or across the border
    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("frame_sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Nearest,
        min_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    });

    let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("frame_quad"),
        contents: bytemuck::cast_slice(&QUAD_VERTICES),
        usage: wgpu::BufferUsages::VERTEX,
    });

    Ok(FrameProgram {
        pipeline,
        bind_group_layout,
        sampler,
        vertex_buffer,
        texture_format: texture_format_for(target_format),
        max_dimension: device.limits().max_texture_dimension_2d,
    })
}

/// Create a texture sized to the frame and fill it in one write
fn upload_frame(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    program: &FrameProgram,
    frame: &ProcessedFrame,
) -> FrameTexture {
    let upload_start = Instant::now();
    let size = wgpu::Extent3d {
        width: frame.width(),
        height: frame.height(),
        depth_or_array_layers: 1,
    };

    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("frame_texture"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: program.texture_format,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        frame.data(),
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(frame.width() * 4),
            rows_per_image: Some(frame.height()),
        },
        size,
    );

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("frame_bind_group"),
        layout: &program.bind_group_layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&program.sampler),
            },
        ],
    });

    let upload_time = upload_start.elapsed();
    if upload_time.as_millis() > render::SLOW_UPLOAD_MS {
        warn!(
            upload_ms = upload_time.as_millis(),
            width = frame.width(),
            height = frame.height(),
            "Texture upload took longer than a frame period"
        );
    }

    FrameTexture {
        _texture: texture,
        bind_group,
    }
}
