//! CPU reference of the Cook-Torrance and Blinn-Phong terms used by the
//! lighting and IBL shaders.
//!
//! The shaders are the source of truth at runtime; these functions exist so
//! their math can be unit tested and so the BRDF integration lookup can be
//! checked against known values.

use glam::{Vec2, Vec3};
use std::f32::consts::PI;

/// Reflectance at normal incidence for dielectrics.
pub const DIELECTRIC_F0: f32 = 0.04;

/// GGX/Trowbridge-Reitz normal distribution.
pub fn distribution_ggx(n_dot_h: f32, roughness: f32) -> f32 {
    let a = roughness * roughness;
    let a2 = a * a;
    let denom = n_dot_h * n_dot_h * (a2 - 1.0) + 1.0;
    a2 / (PI * denom * denom).max(1e-7)
}

/// Schlick-GGX geometry term with `k` remapped for direct lighting.
pub fn geometry_schlick_ggx(n_dot: f32, roughness: f32) -> f32 {
    let r = roughness + 1.0;
    let k = (r * r) / 8.0;
    n_dot / (n_dot * (1.0 - k) + k)
}

/// Schlick-GGX geometry term with `k = α²/2`, used when integrating IBL.
pub fn geometry_schlick_ggx_ibl(n_dot: f32, roughness: f32) -> f32 {
    let k = (roughness * roughness) / 2.0;
    n_dot / (n_dot * (1.0 - k) + k)
}

pub fn geometry_smith(n_dot_v: f32, n_dot_l: f32, roughness: f32) -> f32 {
    geometry_schlick_ggx(n_dot_v, roughness) * geometry_schlick_ggx(n_dot_l, roughness)
}

fn geometry_smith_ibl(n_dot_v: f32, n_dot_l: f32, roughness: f32) -> f32 {
    geometry_schlick_ggx_ibl(n_dot_v, roughness) * geometry_schlick_ggx_ibl(n_dot_l, roughness)
}

pub fn fresnel_schlick(cos_theta: f32, f0: Vec3) -> Vec3 {
    f0 + (Vec3::ONE - f0) * (1.0 - cos_theta).clamp(0.0, 1.0).powf(5.0)
}

/// Fresnel with roughness-dampened grazing response, for ambient specular.
pub fn fresnel_schlick_roughness(cos_theta: f32, f0: Vec3, roughness: f32) -> Vec3 {
    let max = Vec3::splat(1.0 - roughness).max(f0);
    f0 + (max - f0) * (1.0 - cos_theta).clamp(0.0, 1.0).powf(5.0)
}

/// Outgoing radiance factor (BRDF × N·L) for one light of unit radiance.
pub fn evaluate_brdf(
    light_dir: Vec3,
    view_dir: Vec3,
    normal: Vec3,
    albedo: Vec3,
    metallic: f32,
    roughness: f32,
) -> Vec3 {
    let half_vec = (view_dir + light_dir).normalize();
    let n_dot_l = normal.dot(light_dir).max(0.0);
    let n_dot_v = normal.dot(view_dir).max(0.0);
    let n_dot_h = normal.dot(half_vec).max(0.0);
    let h_dot_v = half_vec.dot(view_dir).max(0.0);

    let f0 = Vec3::splat(DIELECTRIC_F0).lerp(albedo, metallic);
    let d = distribution_ggx(n_dot_h, roughness);
    let g = geometry_smith(n_dot_v, n_dot_l, roughness);
    let f = fresnel_schlick(h_dot_v, f0);

    let specular = (d * g * f) / (4.0 * n_dot_v * n_dot_l + 0.0001);
    let k_d = (Vec3::ONE - f) * (1.0 - metallic);
    let diffuse = k_d * albedo / PI;

    (diffuse + specular) * n_dot_l
}

/// Blinn-Phong diffuse and specular factors for one light.
pub fn blinn_phong(light_dir: Vec3, view_dir: Vec3, normal: Vec3, shininess: f32) -> (f32, f32) {
    let diffuse = normal.dot(light_dir).max(0.0);
    let half_vec = (light_dir + view_dir).normalize();
    let specular = normal.dot(half_vec).max(0.0).powf(shininess);
    (diffuse, specular)
}

/// Van der Corput radical inverse in base 2.
pub fn radical_inverse(mut bits: u32) -> f32 {
    bits = bits.rotate_right(16);
    bits = ((bits & 0x5555_5555) << 1) | ((bits & 0xAAAA_AAAA) >> 1);
    bits = ((bits & 0x3333_3333) << 2) | ((bits & 0xCCCC_CCCC) >> 2);
    bits = ((bits & 0x0F0F_0F0F) << 4) | ((bits & 0xF0F0_F0F0) >> 4);
    bits = ((bits & 0x00FF_00FF) << 8) | ((bits & 0xFF00_FF00) >> 8);
    bits as f32 * 2.328_306_4e-10
}

/// Point `i` of an `n`-point Hammersley set on the unit square.
pub fn hammersley(i: u32, n: u32) -> Vec2 {
    Vec2::new(i as f32 / n as f32, radical_inverse(i))
}

/// GGX-distributed half vector around `normal` for the square sample `xi`.
pub fn importance_sample_ggx(xi: Vec2, normal: Vec3, roughness: f32) -> Vec3 {
    let a = roughness * roughness;
    let phi = 2.0 * PI * xi.x;
    let cos_theta = ((1.0 - xi.y) / (1.0 + (a * a - 1.0) * xi.y)).sqrt();
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    let h = Vec3::new(phi.cos() * sin_theta, phi.sin() * sin_theta, cos_theta);

    let up = if normal.z.abs() < 0.999 { Vec3::Z } else { Vec3::X };
    let tangent = up.cross(normal).normalize();
    let bitangent = normal.cross(tangent);
    (tangent * h.x + bitangent * h.y + normal * h.z).normalize()
}

/// Split-sum scale and bias on F0 for one (N·V, roughness) pair.
///
/// This is one texel of the BRDF lookup table.
pub fn integrate_brdf(n_dot_v: f32, roughness: f32, sample_count: u32) -> Vec2 {
    let n_dot_v = n_dot_v.max(1e-4);
    let v = Vec3::new((1.0 - n_dot_v * n_dot_v).sqrt(), 0.0, n_dot_v);
    let n = Vec3::Z;
    let mut a = 0.0;
    let mut b = 0.0;
    for i in 0..sample_count {
        let h = importance_sample_ggx(hammersley(i, sample_count), n, roughness);
        let l = (2.0 * v.dot(h) * h - v).normalize();
        let n_dot_l = l.z.max(0.0);
        let n_dot_h = h.z.max(0.0);
        let v_dot_h = v.dot(h).max(0.0);
        if n_dot_l > 0.0 {
            let g = geometry_smith_ibl(n_dot_v, n_dot_l, roughness);
            let g_vis = (g * v_dot_h) / (n_dot_h * n_dot_v);
            let fc = (1.0 - v_dot_h).powf(5.0);
            a += (1.0 - fc) * g_vis;
            b += fc * g_vis;
        }
    }
    Vec2::new(a, b) / sample_count.max(1) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pure_metal_has_no_diffuse() {
        let view = Vec3::new(0.0, 1.0, 1.0).normalize();
        let albedo = Vec3::new(1.0, 0.8, 0.2);
        let metal = evaluate_brdf(Vec3::Y, view, Vec3::Y, albedo, 1.0, 0.5);
        let dielectric = evaluate_brdf(Vec3::Y, view, Vec3::Y, albedo, 0.0, 0.5);
        assert!(dielectric.length() > metal.length());
    }

    #[test]
    fn test_light_behind_surface_contributes_nothing() {
        let result = evaluate_brdf(Vec3::NEG_Y, Vec3::Y, Vec3::Y, Vec3::ONE, 0.0, 0.5);
        assert_eq!(result, Vec3::ZERO);
    }

    #[test]
    fn test_ggx_peaks_at_normal() {
        for roughness in [0.2, 0.5, 0.8] {
            assert!(distribution_ggx(1.0, roughness) > distribution_ggx(0.7, roughness));
        }
    }

    #[test]
    fn test_fresnel_at_normal_incidence_is_f0() {
        let f0 = Vec3::splat(DIELECTRIC_F0);
        assert!((fresnel_schlick(1.0, f0) - f0).length() < 1e-6);
        assert!((fresnel_schlick(0.0, f0) - Vec3::ONE).length() < 1e-6);
    }

    #[test]
    fn test_rough_fresnel_is_dampened() {
        let f0 = Vec3::splat(DIELECTRIC_F0);
        let smooth = fresnel_schlick_roughness(0.0, f0, 0.0);
        let rough = fresnel_schlick_roughness(0.0, f0, 1.0);
        assert!(rough.x < smooth.x);
    }

    #[test]
    fn test_blinn_phong_facing_light() {
        let (d, s) = blinn_phong(Vec3::Y, Vec3::Y, Vec3::Y, 32.0);
        assert!((d - 1.0).abs() < 1e-6);
        assert!((s - 1.0).abs() < 1e-6);
        let (d, _) = blinn_phong(Vec3::NEG_Y, Vec3::Y, Vec3::Y, 32.0);
        assert_eq!(d, 0.0);
    }

    #[test]
    fn test_radical_inverse() {
        assert_eq!(radical_inverse(0), 0.0);
        assert!((radical_inverse(1) - 0.5).abs() < 1e-6);
        assert!((radical_inverse(2) - 0.25).abs() < 1e-6);
        assert!((radical_inverse(3) - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_importance_samples_in_hemisphere() {
        for i in 0..64 {
            let h = importance_sample_ggx(hammersley(i, 64), Vec3::Y, 0.5);
            assert!(h.dot(Vec3::Y) >= 0.0);
            assert!((h.length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_brdf_lut_smooth_head_on() {
        let lut = integrate_brdf(1.0, 0.0, 256);
        assert!((lut.x - 1.0).abs() < 0.02, "scale {}", lut.x);
        assert!(lut.y.abs() < 0.02, "bias {}", lut.y);
    }

    #[test]
    fn test_brdf_lut_in_unit_range() {
        for &(n_dot_v, roughness) in &[(0.1, 0.9), (0.5, 0.5), (0.9, 0.1)] {
            let lut = integrate_brdf(n_dot_v, roughness, 256);
            assert!(lut.x >= 0.0 && lut.y >= 0.0);
            assert!(lut.x + lut.y <= 1.0 + 1e-3, "{lut}");
        }
    }
}
