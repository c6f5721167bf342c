//! Directional and point lights plus the fixed-size light set uploaded each frame.
//!
//! [`LightSet`] mirrors the shader-side arrays: at most one directional light
//! and up to [`MAX_POINT_LIGHTS`] point lights, one of which may own the
//! point shadow cubemap.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// Size of the point light array in the lighting shader.
pub const MAX_POINT_LIGHTS: usize = 8;

/// Sentinel stored in [`LightsUniform::counts`] when no point light casts shadows.
pub const NO_SHADOW_CASTER: u32 = u32::MAX;

/// Fraction of peak brightness below which a point light is treated as dark.
///
/// 5/256 is a bit more than one step of an 8-bit channel.
pub const MIN_LIGHT_FRACTION: f32 = 5.0 / 256.0;

/// Errors raised when editing a [`LightSet`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LightError {
    #[error("point light array is full ({max} lights)")]
    CapacityExceeded { max: usize },

    #[error("no point light at index {index}")]
    NoSuchLight { index: usize },
}

/// How point light intensity falls off with distance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FalloffModel {
    /// `1 / (constant + linear·d + quadratic·d²)`.
    #[default]
    Quadratic,
    /// Physically based `1 / d²`.
    InverseSquare,
}

impl FalloffModel {
    fn as_gpu(self) -> u32 {
        match self {
            FalloffModel::Quadratic => 0,
            FalloffModel::InverseSquare => 1,
        }
    }
}

/// Classic constant/linear/quadratic attenuation coefficients.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Attenuation {
    pub constant: f32,
    pub linear: f32,
    pub quadratic: f32,
}

impl Default for Attenuation {
    /// Coefficients that cover roughly 50 units.
    fn default() -> Self {
        Self {
            constant: 1.0,
            linear: 0.09,
            quadratic: 0.032,
        }
    }
}

impl Attenuation {
    /// Attenuation factor at `distance`.
    pub fn factor(&self, distance: f32) -> f32 {
        1.0 / (self.constant + self.linear * distance + self.quadratic * distance * distance)
    }
}

/// An infinitely distant light with separate ambient/diffuse/specular colors.
///
/// The PBR path uses `diffuse * intensity` as the incoming radiance.
#[derive(Clone, Debug, PartialEq)]
pub struct DirectionalLight {
    /// Normalized direction the light travels (from the light toward the scene).
    pub direction: Vec3,
    pub ambient: Vec3,
    pub diffuse: Vec3,
    pub specular: Vec3,
    pub intensity: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(2.0, -4.0, 1.0).normalize(),
            ambient: Vec3::splat(0.05),
            diffuse: Vec3::splat(0.8),
            specular: Vec3::splat(1.0),
            intensity: 1.0,
        }
    }
}

impl DirectionalLight {
    /// Set the light direction, normalizing the input. Zero vectors are ignored.
    pub fn set_direction(&mut self, direction: Vec3) {
        if let Some(normalized) = direction.try_normalize() {
            self.direction = normalized;
        } else {
            log::warn!("Ignoring zero-length directional light direction");
        }
    }

    /// Radiance used by the Cook-Torrance path.
    pub fn radiance(&self) -> Vec3 {
        self.diffuse * self.intensity
    }

    pub fn to_gpu(&self) -> DirectionalLightGpu {
        DirectionalLightGpu {
            direction_enabled: self.direction.extend(1.0).to_array(),
            ambient: self.ambient.extend(0.0).to_array(),
            diffuse_intensity: self.diffuse.extend(self.intensity).to_array(),
            specular: self.specular.extend(0.0).to_array(),
        }
    }
}

/// A positional light.
#[derive(Clone, Debug, PartialEq)]
pub struct PointLight {
    pub position: Vec3,
    /// Linear RGB color. Also the color of the light's marker cube.
    pub color: Vec3,
    /// Multiplier applied to `color` to get radiance.
    pub intensity: f32,
    /// Used by [`FalloffModel::Quadratic`].
    pub attenuation: Attenuation,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            color: Vec3::ONE,
            intensity: 1.0,
            attenuation: Attenuation::default(),
        }
    }
}

impl PointLight {
    pub fn new(position: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            position,
            color,
            intensity,
            ..Default::default()
        }
    }

    /// Brightest channel of the radiance.
    pub fn peak_brightness(&self) -> f32 {
        (self.color * self.intensity).max_element()
    }

    /// Distance beyond which this light contributes less than
    /// [`MIN_LIGHT_FRACTION`] and the lighting pass skips it entirely.
    pub fn falloff_radius(&self, model: FalloffModel) -> f32 {
        let peak = self.peak_brightness();
        if peak <= 0.0 {
            return 0.0;
        }
        match model {
            FalloffModel::Quadratic => {
                let Attenuation {
                    constant,
                    linear,
                    quadratic,
                } = self.attenuation;
                let target = constant - peak / MIN_LIGHT_FRACTION;
                // Already below the threshold at the light itself.
                if target >= 0.0 {
                    return 0.0;
                }
                if quadratic > 0.0 {
                    (-linear + (linear * linear - 4.0 * quadratic * target).sqrt())
                        / (2.0 * quadratic)
                } else if linear > 0.0 {
                    -target / linear
                } else {
                    f32::INFINITY
                }
            }
            FalloffModel::InverseSquare => (peak / MIN_LIGHT_FRACTION).sqrt(),
        }
    }

    /// Falloff factor at `distance`, zero at or beyond the falloff radius.
    pub fn falloff(&self, distance: f32, model: FalloffModel) -> f32 {
        if distance >= self.falloff_radius(model) {
            return 0.0;
        }
        match model {
            FalloffModel::Quadratic => self.attenuation.factor(distance),
            FalloffModel::InverseSquare => 1.0 / (distance * distance).max(1e-4),
        }
    }

    pub fn to_gpu(&self, model: FalloffModel) -> PointLightGpu {
        let radius = self.falloff_radius(model);
        PointLightGpu {
            position_radius: self.position.extend(radius).to_array(),
            color_intensity: self.color.extend(self.intensity).to_array(),
            attenuation: [
                self.attenuation.constant,
                self.attenuation.linear,
                self.attenuation.quadratic,
                0.0,
            ],
        }
    }
}

/// GPU-side directional light, 64 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct DirectionalLightGpu {
    /// xyz = direction, w = 1.0 when enabled.
    pub direction_enabled: [f32; 4],
    pub ambient: [f32; 4],
    /// xyz = diffuse color, w = intensity.
    pub diffuse_intensity: [f32; 4],
    pub specular: [f32; 4],
}

/// GPU-side point light, 48 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct PointLightGpu {
    /// xyz = world position, w = falloff radius.
    pub position_radius: [f32; 4],
    /// xyz = color, w = intensity.
    pub color_intensity: [f32; 4],
    /// x = constant, y = linear, z = quadratic.
    pub attenuation: [f32; 4],
}

/// Everything the lighting pass knows about lights.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct LightsUniform {
    pub directional: DirectionalLightGpu,
    pub point_lights: [PointLightGpu; MAX_POINT_LIGHTS],
    /// x = point light count, y = shadow caster index or [`NO_SHADOW_CASTER`],
    /// z = falloff model (0 quadratic, 1 inverse square), w = unused.
    pub counts: [u32; 4],
}

/// The scene's lights, sized to the shader arrays.
#[derive(Clone, Debug, Default)]
pub struct LightSet {
    pub directional: Option<DirectionalLight>,
    point_lights: Vec<PointLight>,
    shadow_caster: Option<usize>,
}

impl LightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a point light, returning its index.
    pub fn add_point_light(&mut self, light: PointLight) -> Result<usize, LightError> {
        if self.point_lights.len() >= MAX_POINT_LIGHTS {
            return Err(LightError::CapacityExceeded {
                max: MAX_POINT_LIGHTS,
            });
        }
        self.point_lights.push(light);
        Ok(self.point_lights.len() - 1)
    }

    pub fn point_lights(&self) -> &[PointLight] {
        &self.point_lights
    }

    pub fn point_lights_mut(&mut self) -> &mut [PointLight] {
        &mut self.point_lights
    }

    /// Choose which point light renders into the shadow cubemap.
    pub fn set_shadow_caster(&mut self, index: Option<usize>) -> Result<(), LightError> {
        if let Some(index) = index
            && index >= self.point_lights.len()
        {
            return Err(LightError::NoSuchLight { index });
        }
        self.shadow_caster = index;
        Ok(())
    }

    /// The point light that owns the shadow cubemap, if any.
    pub fn shadow_caster(&self) -> Option<(usize, &PointLight)> {
        self.shadow_caster
            .and_then(|i| self.point_lights.get(i).map(|light| (i, light)))
    }

    /// Pack the set for upload.
    pub fn to_uniform(&self, model: FalloffModel) -> LightsUniform {
        let mut uniform = LightsUniform::zeroed();
        if let Some(directional) = &self.directional {
            uniform.directional = directional.to_gpu();
        }
        for (slot, light) in uniform.point_lights.iter_mut().zip(&self.point_lights) {
            *slot = light.to_gpu(model);
        }
        uniform.counts = [
            self.point_lights.len() as u32,
            self.shadow_caster
                .map(|i| i as u32)
                .unwrap_or(NO_SHADOW_CASTER),
            model.as_gpu(),
            0,
        ];
        uniform
    }
}
