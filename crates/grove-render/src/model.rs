// SPDX-License-Identifier: CEPL-1.0
use bytemuck::{Pod, Zeroable};

/// Interleaved vertex as consumed by the scene pipeline (location 0..=2).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub const fn new(position: [f32; 3], color: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            color,
            uv,
        }
    }
}

/// Indexed triangle list.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Model {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl Model {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    /// A model with no indices produces no draw call.
    pub fn is_drawable(&self) -> bool {
        !self.vertices.is_empty() && !self.indices.is_empty()
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// Double-sided quad in the XY plane, spanning ±sx × ±sy.
    pub fn plane(sx: f32, sy: f32) -> Self {
        const W: [f32; 3] = [1.0, 1.0, 1.0];
        let vertices = vec![
            Vertex::new([sx, -sy, 0.0], W, [0.0, 0.0]),
            Vertex::new([sx, sy, 0.0], W, [0.0, 1.0]),
            Vertex::new([-sx, sy, 0.0], W, [1.0, 1.0]),
            Vertex::new([-sx, -sy, 0.0], W, [1.0, 0.0]),
        ];
        #[rustfmt::skip]
        let indices = vec![
            0, 1, 2, 0, 2, 3, // front
            3, 2, 0, 2, 1, 0, // back
        ];
        Self { vertices, indices }
    }

    /// Eight shared corners, untextured (all UVs zero).
    pub fn cube(sx: f32, sy: f32, sz: f32) -> Self {
        const W: [f32; 3] = [1.0, 1.0, 1.0];
        let vertices = vec![
            Vertex::new([sx, sy, sz], W, [0.0, 0.0]),
            Vertex::new([sx, sy, -sz], W, [0.0, 0.0]),
            Vertex::new([-sx, sy, -sz], W, [0.0, 0.0]),
            Vertex::new([-sx, sy, sz], W, [0.0, 0.0]),
            Vertex::new([sx, -sy, sz], W, [0.0, 0.0]),
            Vertex::new([sx, -sy, -sz], W, [0.0, 0.0]),
            Vertex::new([-sx, -sy, -sz], W, [0.0, 0.0]),
            Vertex::new([-sx, -sy, sz], W, [0.0, 0.0]),
        ];
        #[rustfmt::skip]
        let indices = vec![
            0, 1, 2, 0, 2, 3,
            1, 5, 6, 1, 6, 2,
            4, 0, 3, 4, 3, 7,
            4, 5, 1, 4, 1, 0,
            3, 2, 6, 3, 6, 7,
            7, 6, 5, 7, 5, 4,
        ];
        Self { vertices, indices }
    }

    /// Cube with UVs laid out as the usual 4×3 cross unwrap.
    pub fn cube_uv(sx: f32, sy: f32, sz: f32) -> Self {
        const W: [f32; 3] = [1.0, 1.0, 1.0];
        let uv = |u: f32, v: f32| [u / 4.0, v / 3.0];
        let vertices = vec![
            Vertex::new([sx, sy, sz], W, uv(1.0, 1.0)),
            Vertex::new([sx, sy, -sz], W, uv(1.0, 2.0)),
            Vertex::new([-sx, sy, -sz], W, uv(2.0, 2.0)),
            Vertex::new([-sx, sy, sz], W, uv(2.0, 1.0)),
            Vertex::new([sx, -sy, -sz], W, uv(1.0, 3.0)),
            Vertex::new([-sx, -sy, -sz], W, uv(2.0, 3.0)),
            Vertex::new([sx, -sy, sz], W, uv(0.0, 1.0)),
            Vertex::new([sx, -sy, -sz], W, uv(0.0, 2.0)),
            Vertex::new([-sx, -sy, -sz], W, uv(3.0, 2.0)),
            Vertex::new([-sx, -sy, sz], W, uv(3.0, 1.0)),
            Vertex::new([sx, -sy, sz], W, uv(1.0, 0.0)),
            Vertex::new([-sx, -sy, sz], W, uv(2.0, 0.0)),
            Vertex::new([sx, -sy, sz], W, uv(4.0, 1.0)),
            Vertex::new([sx, -sy, -sz], W, uv(4.0, 2.0)),
        ];
        #[rustfmt::skip]
        let indices = vec![
            0, 1, 2, 0, 2, 3,
            1, 4, 5, 1, 5, 2,
            10, 0, 3, 10, 3, 11,
            6, 7, 1, 6, 1, 0,
            3, 2, 8, 3, 8, 9,
            9, 8, 13, 9, 13, 12,
        ];
        Self { vertices, indices }
    }
}
