//! Light-space matrices for directional and omnidirectional shadow maps.
//!
//! Shadow maps use conventional depth (clear to 1.0, `Less` compare) rather
//! than the reverse-Z used by the main camera, so these projections map the
//! near plane to 0 and the far plane to 1.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// Orthographic box covering the scene as seen from a directional light.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DirectionalShadowVolume {
    /// Half-width and half-height of the ortho box.
    pub extent: f32,
    pub near: f32,
    pub far: f32,
    /// How far back along the light direction the virtual eye sits.
    pub distance: f32,
    /// Point the light looks at.
    pub focus: Vec3,
}

impl Default for DirectionalShadowVolume {
    fn default() -> Self {
        Self {
            extent: 10.0,
            near: 1.0,
            far: 7.5,
            distance: 4.0,
            focus: Vec3::ZERO,
        }
    }
}

/// World → light clip space for a directional light travelling along `direction`.
pub fn directional_light_space_matrix(direction: Vec3, volume: &DirectionalShadowVolume) -> Mat4 {
    let dir = direction.try_normalize().unwrap_or(Vec3::NEG_Y);
    let eye = volume.focus - dir * volume.distance;
    // look_at degenerates when the light points straight up or down.
    let up = if dir.abs().dot(Vec3::Y) > 0.99 {
        Vec3::Z
    } else {
        Vec3::Y
    };
    let view = Mat4::look_at_rh(eye, volume.focus, up);
    let e = volume.extent;
    let proj = Mat4::orthographic_rh(-e, e, -e, e, volume.near, volume.far);
    proj * view
}

/// The six faces of a cubemap, in array-layer order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    /// Texture array layer of this face.
    pub fn layer(self) -> u32 {
        self as u32
    }

    /// Direction from the cube center through the face center.
    pub fn direction(self) -> Vec3 {
        match self {
            CubeFace::PositiveX => Vec3::X,
            CubeFace::NegativeX => Vec3::NEG_X,
            CubeFace::PositiveY => Vec3::Y,
            CubeFace::NegativeY => Vec3::NEG_Y,
            CubeFace::PositiveZ => Vec3::Z,
            CubeFace::NegativeZ => Vec3::NEG_Z,
        }
    }

    /// Camera up vector that lines texel rows up with cube sampling.
    pub fn up(self) -> Vec3 {
        match self {
            CubeFace::PositiveY => Vec3::Z,
            CubeFace::NegativeY => Vec3::NEG_Z,
            _ => Vec3::NEG_Y,
        }
    }
}

/// View matrix looking from `center` through `face`.
pub fn cube_face_view(center: Vec3, face: CubeFace) -> Mat4 {
    Mat4::look_at_rh(center, center + face.direction(), face.up())
}

/// 90° square projection for rendering one cube face.
///
/// Flips Y so that memory row 0 of each rendered face is the row cube
/// sampling reads as `t = 0`. The flip mirrors the image, so pipelines
/// drawing through this projection must treat clockwise triangles as front.
pub fn cube_face_projection(near: f32, far: f32) -> Mat4 {
    Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0))
        * Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, near, far)
}

/// View-projection for all six faces around a point light.
pub fn point_shadow_matrices(position: Vec3, near: f32, far: f32) -> [Mat4; 6] {
    let proj = cube_face_projection(near, far);
    CubeFace::ALL.map(|face| proj * cube_face_view(position, face))
}

/// Shadow parameters read by the lighting pass.
///
/// Total size: 64 + 16 + 16 = 96 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ShadowUniform {
    /// Directional light-space matrix.
    pub light_space: [f32; 16],
    /// xyz = shadow-casting point light position, w = far plane.
    pub point_position_far: [f32; 4],
    /// x = directional shadows on, y = point shadows on, z = PCF on, w = depth bias.
    pub params: [f32; 4],
}

impl ShadowUniform {
    pub fn new(
        light_space: Option<Mat4>,
        point: Option<(Vec3, f32)>,
        pcf: bool,
        bias: f32,
    ) -> Self {
        let flag = |b: bool| if b { 1.0 } else { 0.0 };
        let (position, far) = point.unwrap_or((Vec3::ZERO, 1.0));
        Self {
            light_space: light_space.unwrap_or(Mat4::IDENTITY).to_cols_array(),
            point_position_far: position.extend(far).to_array(),
            params: [
                flag(light_space.is_some()),
                flag(point.is_some()),
                flag(pcf),
                bias,
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    fn to_ndc(m: Mat4, p: Vec3) -> Vec3 {
        let clip = m * Vec4::from((p, 1.0));
        clip.truncate() / clip.w
    }

    #[test]
    fn test_uniform_size() {
        assert_eq!(std::mem::size_of::<ShadowUniform>(), 96);
    }

    #[test]
    fn test_directional_focus_projects_to_center() {
        let volume = DirectionalShadowVolume::default();
        let m = directional_light_space_matrix(Vec3::new(2.0, -4.0, 1.0), &volume);
        let ndc = to_ndc(m, volume.focus);
        assert!(ndc.x.abs() < 1e-5 && ndc.y.abs() < 1e-5);
        // distance 4 in a [1, 7.5] range
        let expected = (4.0 - 1.0) / (7.5 - 1.0);
        assert!((ndc.z - expected).abs() < 1e-5, "depth {}", ndc.z);
    }

    #[test]
    fn test_directional_volume_bounds() {
        let volume = DirectionalShadowVolume::default();
        let m = directional_light_space_matrix(Vec3::NEG_Y, &volume);
        // Light straight down: world x/z spans the ortho box.
        let inside = to_ndc(m, Vec3::new(9.9, 0.0, -9.9));
        assert!(inside.x.abs() <= 1.0 && inside.y.abs() <= 1.0);
        let outside = to_ndc(m, Vec3::new(10.5, 0.0, 0.0));
        assert!(outside.x.abs() > 1.0 || outside.y.abs() > 1.0);
        // Beyond the far plane.
        let below = to_ndc(m, Vec3::new(0.0, -4.0, 0.0));
        assert!(below.z > 1.0);
    }

    #[test]
    fn test_cube_faces_look_at_their_direction() {
        let center = Vec3::new(0.0, 2.0, 1.0);
        let matrices = point_shadow_matrices(center, 1.0, 25.0);
        for (face, m) in CubeFace::ALL.iter().zip(matrices) {
            let ndc = to_ndc(m, center + face.direction() * 5.0);
            assert!(ndc.x.abs() < 1e-4 && ndc.y.abs() < 1e-4, "{face:?}: {ndc}");
            assert!(ndc.z > 0.0 && ndc.z < 1.0);
        }
    }

    #[test]
    fn test_cube_face_orientation_matches_sampling() {
        // +X face: row 0 holds +Y, column 0 holds +Z.
        let m = cube_face_projection(0.1, 10.0) * cube_face_view(Vec3::ZERO, CubeFace::PositiveX);
        let ndc = to_ndc(m, Vec3::new(1.0, 0.5, 0.5));
        assert!(ndc.y > 0.0, "row 0 is ndc y = +1");
        assert!(ndc.x < 0.0, "column 0 is ndc x = -1");

        // -Y face: row 0 holds +Z, column 0 holds -X.
        let m = cube_face_projection(0.1, 10.0) * cube_face_view(Vec3::ZERO, CubeFace::NegativeY);
        let ndc = to_ndc(m, Vec3::new(-0.5, -1.0, 0.5));
        assert!(ndc.y > 0.0);
        assert!(ndc.x < 0.0);
    }

    #[test]
    fn test_straight_down_light_is_finite() {
        let m = directional_light_space_matrix(Vec3::NEG_Y, &DirectionalShadowVolume::default());
        assert!(m.is_finite());
    }

    #[test]
    fn test_shadow_uniform_flags() {
        let u = ShadowUniform::new(None, Some((Vec3::ONE, 25.0)), true, 0.005);
        assert_eq!(u.params, [0.0, 1.0, 1.0, 0.005]);
        assert_eq!(u.point_position_far, [1.0, 1.0, 1.0, 25.0]);
    }
}
