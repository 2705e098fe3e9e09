// SPDX-License-Identifier: GPL-3.0-only

//! Full-screen quad

use bytemuck::{Pod, Zeroable};

/// Interleaved position / texcoord vertex
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 2],
    pub tex_coords: [f32; 2],
}

/// Triangle strip covering normalized device space.
///
/// Texture rows are stored top row first, so the bottom of the screen
/// samples `v = 1` and the top samples `v = 0`.
pub const QUAD_VERTICES: [Vertex; 4] = [
    Vertex {
        position: [-1.0, -1.0],
        tex_coords: [0.0, 1.0],
    },
    Vertex {
        position: [1.0, -1.0],
        tex_coords: [1.0, 1.0],
    },
    Vertex {
        position: [-1.0, 1.0],
        tex_coords: [0.0, 0.0],
    },
    Vertex {
        position: [1.0, 1.0],
        tex_coords: [1.0, 0.0],
    },
];

const ATTRIBUTES: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];

impl Vertex {
    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &ATTRIBUTES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_spans_device_range() {
        for v in QUAD_VERTICES {
            assert!(v.position.iter().all(|c| c.abs() == 1.0));
        }
    }

    #[test]
    fn texcoords_are_flipped_vertically() {
        // Screen top (y = 1) samples the first texture row (v = 0)
        for v in QUAD_VERTICES {
            let expected_v = if v.position[1] > 0.0 { 0.0 } else { 1.0 };
            assert_eq!(v.tex_coords[1], expected_v);
            let expected_u = if v.position[0] > 0.0 { 1.0 } else { 0.0 };
            assert_eq!(v.tex_coords[0], expected_u);
        }
    }

    #[test]
    fn vertices_are_tightly_interleaved() {
        assert_eq!(std::mem::size_of::<Vertex>(), 16);
        assert_eq!(bytemuck::cast_slice::<Vertex, u8>(&QUAD_VERTICES).len(), 64);
        let layout = Vertex::layout();
        assert_eq!(layout.attributes[1].offset, 8);
    }
}
