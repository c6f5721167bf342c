//! Screen-space ambient occlusion sample kernel and noise.
//!
//! The kernel is a set of view-space offsets inside a unit hemisphere around
//! +Z, denser near the origin. The noise tile holds random rotation vectors
//! in the XY plane that the shader tiles across the screen to decorrelate
//! neighbouring pixels. [`occlusion`] is the CPU reference of the per-pixel
//! estimate the SSAO shader computes.

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Vec3};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Size of the kernel array in the SSAO shader.
pub const MAX_KERNEL_SIZE: usize = 64;

const KERNEL_SEED: u64 = 0x55A0;

/// Tunables of the occlusion estimate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SsaoParams {
    pub kernel_size: usize,
    /// Side of the square noise tile in texels.
    pub noise_size: u32,
    /// Sampling hemisphere radius in view-space units.
    pub radius: f32,
    /// Depth bias against self-occlusion.
    pub bias: f32,
    /// Exponent applied to the final factor.
    pub power: f32,
}

impl Default for SsaoParams {
    fn default() -> Self {
        Self {
            kernel_size: MAX_KERNEL_SIZE,
            noise_size: 4,
            radius: 0.5,
            bias: 0.025,
            power: 1.0,
        }
    }
}

/// Generated sample kernel and rotation noise.
#[derive(Clone, Debug)]
pub struct SsaoKernel {
    pub samples: Vec<Vec3>,
    /// `noise_size²` rotation vectors, row-major.
    pub noise: Vec<Vec3>,
    pub noise_size: u32,
}

impl SsaoKernel {
    /// Generate with the fixed seed so every run produces the same pattern.
    pub fn generate(params: &SsaoParams) -> Self {
        Self::generate_seeded(params, KERNEL_SEED)
    }

    pub fn generate_seeded(params: &SsaoParams, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let count = params.kernel_size.clamp(1, MAX_KERNEL_SIZE);
        if count != params.kernel_size {
            log::warn!(
                "SSAO kernel size {} clamped to {count}",
                params.kernel_size
            );
        }

        let samples = (0..count)
            .map(|i| {
                let dir = Vec3::new(
                    rng.random::<f32>() * 2.0 - 1.0,
                    rng.random::<f32>() * 2.0 - 1.0,
                    rng.random::<f32>(),
                )
                .try_normalize()
                .unwrap_or(Vec3::Z);
                let length = rng.random::<f32>();
                // Bias samples toward the center.
                let t = i as f32 / count as f32;
                let scale = 0.1 + (1.0 - 0.1) * t * t;
                dir * length * scale
            })
            .collect();

        let noise_size = params.noise_size.max(1);
        let noise = (0..noise_size * noise_size)
            .map(|_| {
                Vec3::new(
                    rng.random::<f32>() * 2.0 - 1.0,
                    rng.random::<f32>() * 2.0 - 1.0,
                    0.0,
                )
            })
            .collect();

        Self {
            samples,
            noise,
            noise_size,
        }
    }

    /// Noise tile as RGBA32F texel data (alpha unused).
    pub fn noise_texels(&self) -> Vec<[f32; 4]> {
        self.noise.iter().map(|v| [v.x, v.y, v.z, 0.0]).collect()
    }

    pub fn to_uniform(&self, params: &SsaoParams, screen_size: (u32, u32)) -> SsaoKernelUniform {
        let mut uniform = SsaoKernelUniform::zeroed();
        for (slot, s) in uniform.samples.iter_mut().zip(&self.samples) {
            *slot = s.extend(0.0).to_array();
        }
        uniform.params = [
            params.radius,
            params.bias,
            params.power,
            self.samples.len() as f32,
        ];
        let n = self.noise_size as f32;
        uniform.noise_scale = [screen_size.0 as f32 / n, screen_size.1 as f32 / n, 0.0, 0.0];
        uniform
    }
}

/// GPU-side SSAO parameters.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct SsaoKernelUniform {
    pub samples: [[f32; 4]; MAX_KERNEL_SIZE],
    /// x = radius, y = bias, z = power, w = sample count.
    pub params: [f32; 4],
    /// xy = screen size / noise tile size.
    pub noise_scale: [f32; 4],
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Ambient factor at one view-space fragment, 1.0 meaning unoccluded.
///
/// `depth_at` returns the view-space Z of the visible surface under a
/// view-space point, or `None` where nothing was drawn.
pub fn occlusion(
    frag_pos: Vec3,
    normal: Vec3,
    random: Vec3,
    samples: &[Vec3],
    params: &SsaoParams,
    depth_at: impl Fn(Vec3) -> Option<f32>,
) -> f32 {
    if samples.is_empty() {
        return 1.0;
    }
    let tangent = (random - normal * random.dot(normal))
        .try_normalize()
        .unwrap_or_else(|| normal.any_orthonormal_vector());
    let bitangent = normal.cross(tangent);
    let tbn = Mat3::from_cols(tangent, bitangent, normal);

    let mut occluded = 0.0;
    for s in samples {
        let sample_pos = frag_pos + tbn * *s * params.radius;
        let Some(sample_depth) = depth_at(sample_pos) else {
            continue;
        };
        let range = smoothstep(0.0, 1.0, params.radius / (frag_pos.z - sample_depth).abs());
        if sample_depth >= sample_pos.z + params.bias {
            occluded += range;
        }
    }
    (1.0 - occluded / samples.len() as f32).powf(params.power)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_size() {
        assert_eq!(
            std::mem::size_of::<SsaoKernelUniform>(),
            16 * MAX_KERNEL_SIZE + 32
        );
    }

    #[test]
    fn test_kernel_in_unit_hemisphere() {
        let kernel = SsaoKernel::generate(&SsaoParams::default());
        assert_eq!(kernel.samples.len(), MAX_KERNEL_SIZE);
        for s in &kernel.samples {
            assert!(s.z >= 0.0, "sample {s} below the surface");
            assert!(s.length() <= 1.0 + 1e-6);
        }
    }

    #[test]
    fn test_kernel_grows_outward() {
        let kernel = SsaoKernel::generate(&SsaoParams::default());
        let quarter = MAX_KERNEL_SIZE / 4;
        let mean = |s: &[Vec3]| s.iter().map(|v| v.length()).sum::<f32>() / s.len() as f32;
        let inner = mean(&kernel.samples[..quarter]);
        let outer = mean(&kernel.samples[MAX_KERNEL_SIZE - quarter..]);
        assert!(outer > inner, "outer {outer} should exceed inner {inner}");
        // First sample is scaled by 0.1.
        assert!(kernel.samples[0].length() <= 0.1 + 1e-6);
    }

    #[test]
    fn test_noise_in_xy_plane() {
        let kernel = SsaoKernel::generate(&SsaoParams::default());
        assert_eq!(kernel.noise.len(), 16);
        for n in &kernel.noise {
            assert_eq!(n.z, 0.0);
            assert!(n.x.abs() <= 1.0 && n.y.abs() <= 1.0);
        }
    }

    #[test]
    fn test_generation_is_deterministic() {
        let params = SsaoParams::default();
        let a = SsaoKernel::generate(&params);
        let b = SsaoKernel::generate(&params);
        assert_eq!(a.samples, b.samples);
        assert_eq!(a.noise, b.noise);
    }

    #[test]
    fn test_oversized_kernel_is_clamped() {
        let params = SsaoParams {
            kernel_size: 500,
            ..Default::default()
        };
        assert_eq!(SsaoKernel::generate(&params).samples.len(), MAX_KERNEL_SIZE);
    }

    #[test]
    fn test_uniform_noise_scale() {
        let params = SsaoParams::default();
        let kernel = SsaoKernel::generate(&params);
        let u = kernel.to_uniform(&params, (800, 600));
        assert_eq!(u.noise_scale[..2], [200.0, 150.0]);
        assert_eq!(u.params[3], MAX_KERNEL_SIZE as f32);
    }

    #[test]
    fn test_flat_plane_is_unoccluded() {
        let params = SsaoParams::default();
        let kernel = SsaoKernel::generate(&params);
        let frag = Vec3::new(0.0, 0.0, -5.0);
        for random in &kernel.noise {
            let factor = occlusion(frag, Vec3::Z, *random, &kernel.samples, &params, |_| {
                Some(-5.0)
            });
            assert!((factor - 1.0).abs() < 1e-6, "factor {factor}");
        }
    }

    /// Plane at z = -5 with a raised block (one unit toward the camera) for x > edge.
    fn step_factor(edge: f32) -> f32 {
        let params = SsaoParams::default();
        let kernel = SsaoKernel::generate(&params);
        let frag = Vec3::new(0.0, 0.0, -5.0);
        occlusion(
            frag,
            Vec3::Z,
            Vec3::new(0.6, 0.8, 0.0),
            &kernel.samples,
            &params,
            |p| Some(if p.x > edge { -4.0 } else { -5.0 }),
        )
    }

    #[test]
    fn test_occlusion_grows_near_wall() {
        let distances = [1.0, 0.4, 0.3, 0.2, 0.1, 0.0];
        let factors: Vec<f32> = distances.iter().map(|d| step_factor(*d)).collect();
        for pair in factors.windows(2) {
            assert!(pair[1] <= pair[0], "not monotonic: {factors:?}");
        }
        assert!(factors[5] < factors[0]);
    }

    #[test]
    fn test_no_occlusion_beyond_radius() {
        let params = SsaoParams::default();
        assert_eq!(step_factor(2.0 * params.radius), 1.0);
    }

    #[test]
    fn test_background_samples_ignored() {
        let params = SsaoParams::default();
        let kernel = SsaoKernel::generate(&params);
        let factor = occlusion(
            Vec3::new(0.0, 0.0, -5.0),
            Vec3::Z,
            Vec3::X,
            &kernel.samples,
            &params,
            |_| None,
        );
        assert_eq!(factor, 1.0);
    }
}
