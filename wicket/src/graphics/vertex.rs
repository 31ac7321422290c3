//! Vertex format definitions
//!
//! Two fixed formats, matching the byte layout the module writes into its
//! vertex blobs. The strides are part of the ABI and checked against
//! `wicket-shared` at compile time.

use bytemuck::{Pod, Zeroable};
use wicket_shared::{SPRITE_VERTEX_STRIDE, TILED_VERTEX_STRIDE};

/// Sprite-pipeline vertex: position, texture min corner (or inverse sample
/// dims for solid fills), texture max corner, flash ratio.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SpriteVertex {
    pub pos: [f32; 2],
    pub tex_lt: [f32; 2],
    pub tex_rb: [f32; 2],
    pub flash: f32,
}

/// Tiled-pipeline vertex: position and texture coordinate.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TiledVertex {
    pub pos: [f32; 2],
    pub tex: [f32; 2],
}

const _: () = assert!(std::mem::size_of::<SpriteVertex>() == SPRITE_VERTEX_STRIDE);
const _: () = assert!(std::mem::size_of::<TiledVertex>() == TILED_VERTEX_STRIDE);

const SPRITE_ATTRIBUTES: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
    0 => Float32x2,
    1 => Float32x2,
    2 => Float32x2,
    3 => Float32,
];

const TILED_ATTRIBUTES: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![
    0 => Float32x2,
    1 => Float32x2,
];

pub fn sprite_vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: SPRITE_VERTEX_STRIDE as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &SPRITE_ATTRIBUTES,
    }
}

pub fn tiled_vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: TILED_VERTEX_STRIDE as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &TILED_ATTRIBUTES,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_offsets_match_field_layout() {
        assert_eq!(SPRITE_ATTRIBUTES[0].offset, 0);
        assert_eq!(SPRITE_ATTRIBUTES[1].offset, 8);
        assert_eq!(SPRITE_ATTRIBUTES[2].offset, 16);
        assert_eq!(SPRITE_ATTRIBUTES[3].offset, 24);
        assert_eq!(TILED_ATTRIBUTES[1].offset, 8);
    }

    #[test]
    fn blob_reinterprets_as_vertices() {
        // A module-produced blob is exactly N vertices back to back.
        let blob: Vec<u8> = bytemuck::cast_slice(&[
            SpriteVertex {
                pos: [1.0, 2.0],
                tex_lt: [0.0, 0.0],
                tex_rb: [1.0, 1.0],
                flash: 0.5,
            },
            SpriteVertex {
                pos: [3.0, 4.0],
                tex_lt: [0.5, 0.5],
                tex_rb: [1.0, 1.0],
                flash: 0.0,
            },
        ])
        .to_vec();
        assert_eq!(blob.len(), 2 * SPRITE_VERTEX_STRIDE);
        let verts: &[SpriteVertex] = bytemuck::cast_slice(&blob);
        assert_eq!(verts[1].pos, [3.0, 4.0]);
    }
}
