//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const CONFIG_FILE: &str = "config.ron";

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Window settings.
    pub window: WindowConfig,
    /// Rendering settings.
    pub render: RenderConfig,
    /// Fly camera settings.
    pub camera: CameraConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Window configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    /// Window width in logical pixels.
    pub width: u32,
    /// Window height in logical pixels.
    pub height: u32,
    /// Enable vsync (PresentMode::Fifo).
    pub vsync: bool,
    /// Window title.
    pub title: String,
}

/// Which material model the lighting pass evaluates.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum PipelineVariant {
    /// Ambient/diffuse/specular lights with Blinn-Phong shading.
    BlinnPhong,
    /// Cook-Torrance GGX with image-based ambient lighting.
    #[default]
    Pbr,
}

/// Rendering configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    /// Material model used by the lighting pass.
    pub variant: PipelineVariant,
    /// Tone-mapping exposure.
    pub exposure: f32,
    /// Display gamma (ignored when the surface is already sRGB).
    pub gamma: f32,
    /// Constant ambient term used when no IBL maps are bound.
    pub ambient_strength: f32,
    /// Equirectangular `.hdr` file baked into the IBL maps at startup.
    /// Empty selects a uniform environment; a set path that fails to load is fatal.
    pub hdr_environment: PathBuf,
    /// Draw small unlit cubes at every point light.
    pub show_light_markers: bool,
    /// Screen-space ambient occlusion.
    pub ssao: SsaoConfig,
    /// Directional and point shadow maps.
    pub shadows: ShadowConfig,
    /// Image-based lighting bake.
    pub ibl: IblConfig,
    /// Bright-pass bloom.
    pub bloom: BloomConfig,
}

/// SSAO configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SsaoConfig {
    /// Run the occlusion pass. When disabled the lighting pass sees 1.0.
    pub enabled: bool,
    /// Number of hemisphere samples (at most 64).
    pub kernel_size: u32,
    /// Edge length of the tiled rotation-noise texture.
    pub noise_size: u32,
    /// Sample hemisphere radius in view-space units.
    pub radius: f32,
    /// Depth bias against self-occlusion.
    pub bias: f32,
    /// Contrast exponent applied to the occlusion factor.
    pub power: f32,
    /// Half-width of the box blur window.
    pub blur_radius: u32,
}

/// Shadow map configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShadowConfig {
    /// Directional shadow map edge length in texels.
    pub directional_resolution: u32,
    /// Point shadow cubemap face edge length in texels.
    pub point_resolution: u32,
    /// Half-extent of the orthographic light volume.
    pub directional_extent: f32,
    /// Near plane of the directional light volume.
    pub directional_near: f32,
    /// Far plane of the directional light volume.
    pub directional_far: f32,
    /// Distance of the virtual directional light eye from the scene center.
    pub directional_distance: f32,
    /// Near plane of the point light cube projection.
    pub point_near: f32,
    /// Far plane of the point light cube projection. Stored depth is distance / far.
    pub point_far: f32,
    /// Use 3x3 percentage-closer filtering for the directional map.
    pub pcf: bool,
}

/// Image-based lighting bake sizes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IblConfig {
    /// Environment cubemap face size.
    pub environment_size: u32,
    /// Irradiance cubemap face size.
    pub irradiance_size: u32,
    /// Prefiltered specular cubemap base face size.
    pub prefilter_size: u32,
    /// Number of roughness levels in the prefiltered cubemap.
    pub prefilter_mip_levels: u32,
    /// BRDF integration lookup texture size.
    pub brdf_lut_size: u32,
    /// Importance samples per texel for prefilter and BRDF integration.
    pub sample_count: u32,
}

/// Bloom configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BloomConfig {
    /// Composite the blurred bright-pass buffer.
    pub enabled: bool,
    /// Luminance above which a pixel feeds the bright-pass buffer.
    pub threshold: f32,
    /// Horizontal+vertical ping-pong iterations.
    pub blur_passes: u32,
}

/// Fly camera configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
    /// Movement speed in units per second.
    pub move_speed: f32,
    /// Degrees of rotation per pixel of mouse motion.
    pub mouse_sensitivity: f32,
    /// Initial vertical field of view in degrees.
    pub zoom: f32,
    /// Initial camera position.
    pub position: [f32; 3],
}

/// Which intermediate the composite pass shows.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum DebugView {
    #[default]
    Final,
    Albedo,
    Normals,
    Ssao,
    Shadow,
    PointLightsOnly,
}

impl DebugView {
    /// All views in cycling order.
    pub const ALL: [DebugView; 6] = [
        DebugView::Final,
        DebugView::Albedo,
        DebugView::Normals,
        DebugView::Ssao,
        DebugView::Shadow,
        DebugView::PointLightsOnly,
    ];

    /// The view after this one, wrapping around.
    pub fn next(self) -> Self {
        let index = Self::ALL.iter().position(|v| *v == self).unwrap_or(0);
        Self::ALL[(index + 1) % Self::ALL.len()]
    }
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Initial debug view.
    pub view: DebugView,
}

// --- Default implementations ---

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            vsync: true,
            title: "Mental Engine".to_string(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            variant: PipelineVariant::Pbr,
            exposure: 1.0,
            gamma: 2.2,
            ambient_strength: 0.03,
            hdr_environment: PathBuf::new(),
            show_light_markers: true,
            ssao: SsaoConfig::default(),
            shadows: ShadowConfig::default(),
            ibl: IblConfig::default(),
            bloom: BloomConfig::default(),
        }
    }
}

impl Default for SsaoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            kernel_size: 64,
            noise_size: 4,
            radius: 0.5,
            bias: 0.025,
            power: 1.0,
            blur_radius: 2,
        }
    }
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            directional_resolution: 2048,
            point_resolution: 1024,
            directional_extent: 10.0,
            directional_near: 1.0,
            directional_far: 7.5,
            directional_distance: 4.0,
            point_near: 1.0,
            point_far: 25.0,
            pcf: true,
        }
    }
}

impl Default for IblConfig {
    fn default() -> Self {
        Self {
            environment_size: 512,
            irradiance_size: 32,
            prefilter_size: 128,
            prefilter_mip_levels: 5,
            brdf_lut_size: 512,
            sample_count: 1024,
        }
    }
}

impl Default for BloomConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 1.0,
            blur_passes: 5,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            move_speed: 2.5,
            mouse_sensitivity: 0.1,
            zoom: 45.0,
            position: [0.0, 1.0, 6.0],
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            view: DebugView::Final,
        }
    }
}

/// Upper bound of the SSAO sample kernel uploaded to the GPU.
pub const MAX_SSAO_KERNEL: u32 = 64;

fn ensure(ok: bool, field: &'static str, reason: &'static str) -> Result<(), ConfigError> {
    if ok { Ok(()) } else { Err(ConfigError::Invalid { field, reason }) }
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            config.validate()?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join(CONFIG_FILE);
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Reject values that would produce empty targets or degenerate projections.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let render = &self.render;
        ensure(self.window.width > 0 && self.window.height > 0, "window", "size must be non-zero")?;
        ensure(render.exposure > 0.0, "render.exposure", "must be positive")?;
        ensure(render.gamma > 0.0, "render.gamma", "must be positive")?;
        ensure(
            (1..=MAX_SSAO_KERNEL).contains(&render.ssao.kernel_size),
            "render.ssao.kernel_size",
            "must be between 1 and 64",
        )?;
        ensure(render.ssao.noise_size > 0, "render.ssao.noise_size", "must be non-zero")?;
        ensure(render.ssao.radius > 0.0, "render.ssao.radius", "must be positive")?;

        let shadows = &render.shadows;
        ensure(
            shadows.directional_resolution > 0 && shadows.point_resolution > 0,
            "render.shadows",
            "resolutions must be non-zero",
        )?;
        ensure(
            0.0 < shadows.directional_near && shadows.directional_near < shadows.directional_far,
            "render.shadows.directional_near",
            "must satisfy 0 < near < far",
        )?;
        ensure(
            0.0 < shadows.point_near && shadows.point_near < shadows.point_far,
            "render.shadows.point_near",
            "must satisfy 0 < near < far",
        )?;

        let ibl = &render.ibl;
        ensure(
            [ibl.environment_size, ibl.irradiance_size, ibl.prefilter_size, ibl.brdf_lut_size]
                .iter()
                .all(|&size| size > 0),
            "render.ibl",
            "sizes must be non-zero",
        )?;
        ensure(ibl.prefilter_mip_levels > 0, "render.ibl.prefilter_mip_levels", "must be non-zero")?;
        ensure(ibl.sample_count > 0, "render.ibl.sample_count", "must be non-zero")?;
        ensure(
            (1.0..=45.0).contains(&self.camera.zoom),
            "camera.zoom",
            "must be between 1 and 45 degrees",
        )?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
        new_config.validate()?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(3))
                .unwrap();
        assert!(ron_str.contains("width: 1280"));
        assert!(ron_str.contains("kernel_size: 64"));
        assert!(ron_str.contains("variant: Pbr"));
    }

    #[test]
    fn test_missing_section_uses_default() {
        let ron_str = "(window: (width: 640))";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.window.width, 640);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.render.ssao, SsaoConfig::default());
        assert_eq!(config.render.ibl, IblConfig::default());
    }

    #[test]
    fn test_nested_override_keeps_sibling_defaults() {
        let ron_str = "(render: (ssao: (radius: 1.5), variant: BlinnPhong))";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.render.ssao.radius, 1.5);
        assert_eq!(config.render.ssao.bias, 0.025);
        assert_eq!(config.render.variant, PipelineVariant::BlinnPhong);
        assert_eq!(config.render.shadows, ShadowConfig::default());
    }

    #[test]
    fn test_extra_field_ignored() {
        let result: Result<Config, _> = ron::from_str("(future_setting: true)");
        assert!(result.is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.window.width = 1920;
        config.render.exposure = 2.5;
        config.debug.view = DebugView::Ssao;

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_or_create_writes_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join(CONFIG_FILE).exists());
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.render.bloom.enabled = false;
        modified.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert!(!result.unwrap().render.bloom.enabled);
    }

    #[test]
    fn test_reload_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();
        assert!(config.reload(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_invalid_ron_produces_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{{not valid}}").unwrap();
        let result = Config::load_or_create(dir.path());
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_debug_view_cycles_through_all() {
        let mut view = DebugView::Final;
        for _ in 0..DebugView::ALL.len() {
            view = view.next();
        }
        assert_eq!(view, DebugView::Final);
        assert_eq!(DebugView::PointLightsOnly.next(), DebugView::Final);
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range_values() {
        let mut config = Config::default();
        config.render.ssao.kernel_size = 65;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "render.ssao.kernel_size", .. })
        ));

        let mut config = Config::default();
        config.render.shadows.point_near = 30.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "render.shadows.point_near", .. })
        ));

        let mut config = Config::default();
        config.window.height = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "(render: (exposure: 0.0))").unwrap();
        assert!(matches!(
            Config::load_or_create(dir.path()),
            Err(ConfigError::Invalid { field: "render.exposure", .. })
        ));
    }

    #[test]
    fn test_shadow_defaults_match_light_volume() {
        let shadows = ShadowConfig::default();
        assert!(shadows.directional_near < shadows.directional_far);
        assert!(shadows.point_near < shadows.point_far);
        assert!(shadows.point_resolution.is_power_of_two());
    }
}
