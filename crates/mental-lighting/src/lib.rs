//! Light types, shadow matrices, SSAO sampling, and reference BRDFs.
//!
//! Everything in this crate is plain CPU math with no GPU dependency. The
//! renderer uploads the `*Gpu` / `*Uniform` structs as-is, and tests use the
//! reference functions to check what the shaders compute.

pub mod brdf;
mod light;
mod shadow;
pub mod ssao;

pub use light::{
    Attenuation, DirectionalLight, DirectionalLightGpu, FalloffModel, LightError, LightSet,
    LightsUniform, MAX_POINT_LIGHTS, MIN_LIGHT_FRACTION, NO_SHADOW_CASTER, PointLight,
    PointLightGpu,
};
pub use shadow::{
    CubeFace, DirectionalShadowVolume, ShadowUniform, cube_face_projection, cube_face_view,
    directional_light_space_matrix, point_shadow_matrices,
};
pub use ssao::{MAX_KERNEL_SIZE, SsaoKernel, SsaoKernelUniform, SsaoParams};
