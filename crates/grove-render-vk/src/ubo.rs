// SPDX-License-Identifier: CEPL-1.0
use bytemuck::{Pod, Zeroable};
use grove_math::Mat4;

/// Per-object, per-frame uniform block (set 0, binding 0). std140 compatible.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Mvp {
    pub model: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
}

impl Mvp {
    pub fn new(model: Mat4, view: Mat4, projection: Mat4) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            view: view.to_cols_array_2d(),
            projection: projection.to_cols_array_2d(),
        }
    }

    pub const SIZE: u64 = std::mem::size_of::<Mvp>() as u64;
}

#[cfg(test)]
mod tests {
    use super::*;
    use grove_math::Vec3;

    #[test]
    fn matrices_are_column_major() {
        let m = Mvp::new(
            Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)),
            Mat4::IDENTITY,
            Mat4::IDENTITY,
        );
        assert_eq!(m.model[3], [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(Mvp::SIZE, 192);
    }
}
