//! Frame orchestration.
//!
//! [`Renderer`] owns every stage and records one frame in a fixed order:
//! shadows, geometry, SSAO, lighting, depth blit, forward, bloom, composite
//! and overlays. The scene it draws lives in [`SceneState`], which the
//! caller owns and mutates between frames.

use std::sync::Arc;

use glam::Vec3;
use mental_config::{
    BloomConfig, DebugView, PipelineVariant, RenderConfig, ShadowConfig, SsaoConfig,
};
use mental_lighting::{FalloffModel, LightSet};

use crate::camera::CameraProvider;
use crate::error::RenderError;
use crate::forward::{ForwardPass, TransparentDraw};
use crate::gbuffer::{GBuffer, GeometryPass, MeshDraw};
use crate::ibl::IblMaps;
use crate::lighting::{DEFAULT_SHININESS, LightingInputs, LightingPass, LightingSettings};
use crate::mesh::{InstanceBuffer, InstanceData, MaterialLayout, RenderableMesh};
use crate::post::{OverlayPass, PostProcess, ToneMapping};
use crate::shadow::ShadowPass;
use crate::ssao::SsaoPass;
use crate::target::{DepthBuffer, HdrTarget};
use crate::texture::TextureCache;
use crate::uniforms::MatricesBuffer;

/// A mesh and the instances drawn with it.
pub struct SceneObject {
    pub mesh: Arc<RenderableMesh>,
    pub casts_shadow: bool,
    instances: Vec<InstanceData>,
    buffer: InstanceBuffer,
    dirty: bool,
}

impl SceneObject {
    pub fn new(device: &wgpu::Device, mesh: Arc<RenderableMesh>, instances: Vec<InstanceData>) -> Self {
        Self {
            mesh,
            casts_shadow: true,
            buffer: InstanceBuffer::new(device, instances.len()),
            instances,
            dirty: true,
        }
    }

    pub fn with_shadow(mut self, casts_shadow: bool) -> Self {
        self.casts_shadow = casts_shadow;
        self
    }

    pub fn instances(&self) -> &[InstanceData] {
        &self.instances
    }

    /// Replace the instances; uploaded on the next frame.
    pub fn set_instances(&mut self, instances: Vec<InstanceData>) {
        self.instances = instances;
        self.dirty = true;
    }

    fn sync(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) {
        if self.dirty {
            self.buffer.write(device, queue, &self.instances);
            self.dirty = false;
        }
    }

    fn draw(&self) -> MeshDraw<'_> {
        MeshDraw {
            mesh: &self.mesh,
            instances: &self.buffer,
        }
    }
}

/// Circular motion of one point light around a center, in the XZ plane.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightOrbit {
    pub light: usize,
    pub center: Vec3,
    pub radius: f32,
    /// Radians per second.
    pub speed: f32,
    pub phase: f32,
}

impl LightOrbit {
    pub fn position_at(&self, time: f32) -> Vec3 {
        let angle = self.phase + self.speed * time;
        self.center + Vec3::new(angle.cos(), 0.0, angle.sin()) * self.radius
    }
}

/// Everything drawn in a frame.
#[derive(Default)]
pub struct SceneState {
    pub lights: LightSet,
    pub opaque: Vec<SceneObject>,
    pub transparent: Vec<SceneObject>,
    pub orbits: Vec<LightOrbit>,
    /// Seconds since the scene started.
    pub elapsed: f32,
}

impl SceneState {
    pub fn new(lights: LightSet) -> Self {
        Self {
            lights,
            ..Default::default()
        }
    }

    /// Advance the clock and move the animated lights.
    pub fn advance(&mut self, dt: f32) {
        self.elapsed += dt;
        self.animate_lights(self.elapsed);
    }

    /// Put every orbiting light where it is at `time`.
    pub fn animate_lights(&mut self, time: f32) {
        let lights = self.lights.point_lights_mut();
        for orbit in &self.orbits {
            if let Some(light) = lights.get_mut(orbit.light) {
                light.position = orbit.position_at(time);
            }
        }
    }

    fn sync(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) {
        for object in self.opaque.iter_mut().chain(self.transparent.iter_mut()) {
            object.sync(device, queue);
        }
    }
}

/// One recorded stage of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FramePass {
    Shadow,
    Geometry,
    Ssao,
    SsaoBlur,
    Lighting,
    DepthBlit,
    Forward,
    Bloom,
    Composite,
    Overlay,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RendererSettings {
    pub variant: PipelineVariant,
    pub tone_mapping: ToneMapping,
    pub ambient_strength: f32,
    pub show_light_markers: bool,
    pub debug_view: DebugView,
    pub falloff: FalloffModel,
    pub ssao: SsaoConfig,
    pub shadows: ShadowConfig,
    pub bloom: BloomConfig,
}

impl From<&RenderConfig> for RendererSettings {
    fn from(config: &RenderConfig) -> Self {
        let falloff = match config.variant {
            PipelineVariant::BlinnPhong => FalloffModel::Quadratic,
            PipelineVariant::Pbr => FalloffModel::InverseSquare,
        };
        Self {
            variant: config.variant,
            tone_mapping: ToneMapping {
                exposure: config.exposure,
                gamma: config.gamma,
            },
            ambient_strength: config.ambient_strength,
            show_light_markers: config.show_light_markers,
            debug_view: DebugView::Final,
            falloff,
            ssao: config.ssao.clone(),
            shadows: config.shadows.clone(),
            bloom: config.bloom.clone(),
        }
    }
}

impl RendererSettings {
    pub fn with_debug_view(mut self, view: DebugView) -> Self {
        self.debug_view = view;
        self
    }

    fn lighting(&self) -> LightingSettings {
        LightingSettings {
            variant: self.variant,
            debug_view: self.debug_view,
            falloff: self.falloff,
            ambient_strength: self.ambient_strength,
            shininess: DEFAULT_SHININESS,
            bloom_threshold: self.bloom.threshold,
            force_no_directional_shadow: false,
        }
    }
}

/// Views shown without tone mapping.
fn is_passthrough(view: DebugView) -> bool {
    matches!(
        view,
        DebugView::Albedo | DebugView::Normals | DebugView::Ssao | DebugView::Shadow
    )
}

pub struct Renderer {
    settings: RendererSettings,
    size: (u32, u32),
    matrices: MatricesBuffer,
    materials: MaterialLayout,
    textures: TextureCache,
    ibl: IblMaps,
    shadows: ShadowPass,
    gbuffer: GBuffer,
    geometry: GeometryPass,
    ssao: SsaoPass,
    lighting: LightingPass,
    forward_depth: DepthBuffer,
    forward: ForwardPass,
    post: PostProcess,
    overlays: Vec<Box<dyn OverlayPass>>,
    last_frame: Vec<FramePass>,
}

impl Renderer {
    /// Build every stage. Any failure here is fatal to the caller.
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        settings: RendererSettings,
        output_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
        environment: IblMaps,
    ) -> Result<Self, RenderError> {
        let (width, height) = (width.max(1), height.max(1));
        let matrices = MatricesBuffer::new(device);
        let materials = MaterialLayout::new(device);
        let textures = TextureCache::new(device, queue)?;

        let shadows = ShadowPass::new(device, &settings.shadows)?;
        let gbuffer = GBuffer::new(device, width, height)?;
        let geometry = GeometryPass::new(device, &matrices, &materials)?;
        let mut ssao = SsaoPass::new(device, queue, &matrices, &settings.ssao, &gbuffer)?;
        ssao.set_enabled(settings.ssao.enabled);

        let lighting = LightingPass::new(
            device,
            &matrices,
            &LightingInputs {
                gbuffer: &gbuffer,
                ssao: ssao.output(),
                shadows: &shadows,
                ibl: &environment,
            },
            settings.lighting(),
        )?;
        let forward_depth = DepthBuffer::new(device, "forward-depth", width, height);
        let mut forward = ForwardPass::new(device, &matrices, &materials, &textures, &environment)?;
        forward.set_show_markers(settings.show_light_markers);

        let mut post = PostProcess::new(
            device,
            &matrices,
            &settings.bloom,
            settings.tone_mapping,
            lighting.output(),
            output_format,
        )?;
        post.set_passthrough(is_passthrough(settings.debug_view));

        log::info!(
            "Renderer ready: {width}x{height}, {:?}, SSAO {}, debug view {:?}",
            settings.variant,
            if settings.ssao.enabled { "on" } else { "off" },
            settings.debug_view
        );
        Ok(Self {
            settings,
            size: (width, height),
            matrices,
            materials,
            textures,
            ibl: environment,
            shadows,
            gbuffer,
            geometry,
            ssao,
            lighting,
            forward_depth,
            forward,
            post,
            overlays: Vec::new(),
            last_frame: Vec::new(),
        })
    }

    /// Recreate every screen-sized target. Zero sizes are ignored.
    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) -> Result<(), RenderError> {
        if width == 0 || height == 0 || (width, height) == self.size {
            return Ok(());
        }
        log::debug!("Resizing renderer to {width}x{height}");
        self.gbuffer = GBuffer::new(device, width, height)?;
        self.ssao.resize(device, &self.gbuffer)?;
        self.lighting.resize(
            device,
            &LightingInputs {
                gbuffer: &self.gbuffer,
                ssao: self.ssao.output(),
                shadows: &self.shadows,
                ibl: &self.ibl,
            },
        )?;
        self.forward_depth = DepthBuffer::new(device, "forward-depth", width, height);
        self.post.resize(device, self.lighting.output())?;
        self.size = (width, height);
        Ok(())
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    /// Layout every scene mesh's material bind group must use.
    pub fn material_layout(&self) -> &MaterialLayout {
        &self.materials
    }

    pub fn textures(&self) -> &TextureCache {
        &self.textures
    }

    pub fn textures_mut(&mut self) -> &mut TextureCache {
        &mut self.textures
    }

    pub fn gbuffer(&self) -> &GBuffer {
        &self.gbuffer
    }

    /// Lit HDR color and bright-pass buffers of the last frame.
    pub fn lighting_output(&self) -> &HdrTarget {
        self.lighting.output()
    }

    pub fn matrices(&self) -> &MatricesBuffer {
        &self.matrices
    }

    pub fn debug_view(&self) -> DebugView {
        self.settings.debug_view
    }

    pub fn set_debug_view(&mut self, view: DebugView) {
        self.settings.debug_view = view;
        let lighting = LightingSettings {
            debug_view: view,
            ..*self.lighting.settings()
        };
        self.lighting.set_settings(lighting);
        self.post.set_passthrough(is_passthrough(view));
        log::info!("Debug view: {view:?}");
    }

    pub fn is_bloom_enabled(&self) -> bool {
        self.post.is_bloom_enabled()
    }

    pub fn set_bloom_enabled(&mut self, enabled: bool) {
        self.settings.bloom.enabled = enabled;
        self.post.set_bloom_enabled(enabled);
    }

    pub fn set_tone_mapping(&mut self, tone_mapping: ToneMapping) {
        self.settings.tone_mapping = tone_mapping;
        self.post.set_tone_mapping(tone_mapping);
    }

    /// Treat every sample as unshadowed by the directional light.
    pub fn set_force_no_directional_shadow(&mut self, force: bool) {
        let lighting = LightingSettings {
            force_no_directional_shadow: force,
            ..*self.lighting.settings()
        };
        self.lighting.set_settings(lighting);
    }

    pub fn add_overlay(&mut self, overlay: Box<dyn OverlayPass>) {
        log::debug!("Added overlay '{}'", overlay.label());
        self.overlays.push(overlay);
    }

    /// Stages recorded by the last [`Renderer::render`] call, in order.
    pub fn last_frame_passes(&self) -> &[FramePass] {
        &self.last_frame
    }

    /// Record one frame into `encoder`, ending in `output`.
    pub fn render(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        output: &wgpu::TextureView,
        scene: &mut SceneState,
        camera: &dyn CameraProvider,
    ) {
        self.last_frame.clear();
        let (width, height) = self.size;
        let camera_position = camera.position();
        self.matrices.setup_scene(
            queue,
            camera.view_matrix(),
            camera.projection_matrix(width as f32 / height as f32),
            camera_position,
        );
        scene.sync(device, queue);

        let opaque: Vec<MeshDraw<'_>> = scene.opaque.iter().map(SceneObject::draw).collect();
        let casters: Vec<MeshDraw<'_>> = scene
            .opaque
            .iter()
            .chain(&scene.transparent)
            .filter(|object| object.casts_shadow)
            .map(SceneObject::draw)
            .collect();
        let transparent: Vec<TransparentDraw<'_>> = scene
            .transparent
            .iter()
            .map(|object| TransparentDraw {
                draw: object.draw(),
                instances: object.instances(),
            })
            .collect();

        self.shadows.update(&scene.lights);
        self.shadows.record(queue, encoder, &casters);
        self.last_frame.push(FramePass::Shadow);

        self.geometry
            .record(queue, encoder, &self.gbuffer, &self.matrices, &opaque);
        self.last_frame.push(FramePass::Geometry);

        if self.ssao.is_enabled() {
            self.ssao.record_occlusion(queue, encoder, &self.matrices);
            self.last_frame.push(FramePass::Ssao);
        }
        self.ssao.record_blur(queue, encoder, &self.matrices);
        self.last_frame.push(FramePass::SsaoBlur);

        self.lighting.update(&scene.lights, &self.shadows.uniform());
        self.lighting.record(queue, encoder, &self.matrices);
        self.last_frame.push(FramePass::Lighting);

        self.forward_depth.blit_from(encoder, &self.gbuffer.depth);
        self.last_frame.push(FramePass::DepthBlit);

        self.forward.update(device, queue, &scene.lights);
        self.forward.record(
            queue,
            encoder,
            self.lighting.output(),
            &self.forward_depth,
            &self.matrices,
            camera_position,
            &transparent,
        );
        self.last_frame.push(FramePass::Forward);

        if self.post.is_bloom_enabled() {
            self.post.record_bloom(queue, encoder, &self.matrices);
            self.last_frame.push(FramePass::Bloom);
        }
        self.post
            .record_composite(queue, encoder, &self.matrices, output);
        self.last_frame.push(FramePass::Composite);

        for overlay in &mut self.overlays {
            overlay.record(device, queue, encoder, output, self.size);
        }
        if !self.overlays.is_empty() {
            self.last_frame.push(FramePass::Overlay);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use glam::{Mat4, Vec4};
    use mental_lighting::{DirectionalLight, PointLight};

    use super::*;
    use crate::camera::FlyCamera;
    use crate::gpu::create_test_device_queue;
    use crate::mesh::{Material, MeshData};
    use crate::readback::{read_texture, read_texture_rgba16f};
    use crate::target::ColorTarget;
    use crate::texture::MipmapGenerator;

    const SIZE: u32 = 64;
    const OUTPUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

    fn small_settings() -> RendererSettings {
        let mut settings = RendererSettings::from(&RenderConfig::default());
        settings.ssao.kernel_size = 16;
        settings.shadows.directional_resolution = 256;
        settings.shadows.point_resolution = 64;
        settings.bloom.blur_passes = 1;
        settings.show_light_markers = false;
        settings
    }

    fn renderer(device: &wgpu::Device, queue: &wgpu::Queue, settings: RendererSettings) -> Renderer {
        let mut mipmaps = MipmapGenerator::new(device);
        let environment = IblMaps::constant(device, queue, [0.1, 0.1, 0.1], &mut mipmaps).unwrap();
        Renderer::new(device, queue, settings, OUTPUT_FORMAT, SIZE, SIZE, environment).unwrap()
    }

    fn cube_scene(device: &wgpu::Device, renderer: &Renderer, lights: LightSet) -> SceneState {
        let mesh = RenderableMesh::new(
            device,
            "cube",
            &MeshData::cube(),
            Material {
                albedo_factor: Vec3::new(0.8, 0.6, 0.4),
                ..Default::default()
            },
            renderer.material_layout(),
            renderer.textures(),
        );
        let mut scene = SceneState::new(lights);
        scene.opaque.push(SceneObject::new(
            device,
            Arc::new(mesh),
            vec![InstanceData::new(Mat4::IDENTITY)],
        ));
        scene
    }

    fn camera() -> FlyCamera {
        FlyCamera::looking_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO)
    }

    fn front_light() -> DirectionalLight {
        DirectionalLight {
            direction: Vec3::new(0.0, -0.5, -1.0).normalize(),
            ..Default::default()
        }
    }

    /// Render one frame and return the composited output.
    fn frame(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        renderer: &mut Renderer,
        scene: &mut SceneState,
    ) -> Vec<u8> {
        let output = ColorTarget::new(device, "test-output", SIZE, SIZE, OUTPUT_FORMAT);
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor::default());
        renderer.render(device, queue, &mut encoder, &output.view, scene, &camera());
        queue.submit(std::iter::once(encoder.finish()));
        read_texture(device, queue, &output.texture, 0, 0)
    }

    fn center_luminance(pixels: &[u8]) -> u32 {
        let index = ((SIZE / 2 * SIZE + SIZE / 2) * 4) as usize;
        pixels[index..index + 3].iter().map(|&c| c as u32).sum()
    }

    struct CountingOverlay {
        calls: Rc<Cell<u32>>,
    }

    impl OverlayPass for CountingOverlay {
        fn label(&self) -> &str {
            "counting"
        }

        fn record(
            &mut self,
            _device: &wgpu::Device,
            _queue: &wgpu::Queue,
            _encoder: &mut wgpu::CommandEncoder,
            _view: &wgpu::TextureView,
            size: (u32, u32),
        ) {
            assert_eq!(size, (SIZE, SIZE));
            self.calls.set(self.calls.get() + 1);
        }
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = RenderConfig::default();
        config.variant = PipelineVariant::BlinnPhong;
        config.exposure = 2.0;
        config.bloom.enabled = false;
        let settings = RendererSettings::from(&config);
        assert_eq!(settings.variant, PipelineVariant::BlinnPhong);
        assert_eq!(settings.falloff, FalloffModel::Quadratic);
        assert_eq!(settings.tone_mapping.exposure, 2.0);
        assert!(!settings.bloom.enabled);
        assert_eq!(settings.debug_view, DebugView::Final);
        let pbr = RendererSettings::from(&RenderConfig::default());
        assert_eq!(pbr.falloff, FalloffModel::InverseSquare);
    }

    #[test]
    fn test_passthrough_views() {
        assert!(!is_passthrough(DebugView::Final));
        assert!(!is_passthrough(DebugView::PointLightsOnly));
        assert!(is_passthrough(DebugView::Albedo));
        assert!(is_passthrough(DebugView::Shadow));
    }

    #[test]
    fn test_orbit_positions() {
        let orbit = LightOrbit {
            light: 0,
            center: Vec3::new(0.0, 2.0, 0.0),
            radius: 3.0,
            speed: std::f32::consts::FRAC_PI_2,
            phase: 0.0,
        };
        assert!(orbit.position_at(0.0).abs_diff_eq(Vec3::new(3.0, 2.0, 0.0), 1e-5));
        assert!(orbit.position_at(1.0).abs_diff_eq(Vec3::new(0.0, 2.0, 3.0), 1e-5));
    }

    #[test]
    fn test_animate_lights_moves_orbiting_lights_only() {
        let mut lights = LightSet::new();
        lights
            .add_point_light(PointLight::new(Vec3::ZERO, Vec3::ONE, 1.0))
            .unwrap();
        lights
            .add_point_light(PointLight::new(Vec3::splat(5.0), Vec3::ONE, 1.0))
            .unwrap();
        let mut scene = SceneState::new(lights);
        scene.orbits.push(LightOrbit {
            light: 0,
            center: Vec3::ZERO,
            radius: 2.0,
            speed: 1.0,
            phase: 0.0,
        });
        // An orbit for a light that does not exist is ignored.
        scene.orbits.push(LightOrbit {
            light: 7,
            center: Vec3::ZERO,
            radius: 1.0,
            speed: 1.0,
            phase: 0.0,
        });
        scene.advance(0.5);
        scene.advance(0.5);
        assert!((scene.elapsed - 1.0).abs() < 1e-6);
        let points = scene.lights.point_lights();
        assert!(points[0].position.abs_diff_eq(Vec3::new(1.0f32.cos(), 0.0, 1.0f32.sin()) * 2.0, 1e-5));
        assert_eq!(points[1].position, Vec3::splat(5.0));
    }

    #[test]
    fn test_frame_pass_order() {
        let Some((device, queue)) = create_test_device_queue() else {
            return;
        };
        let mut renderer = renderer(&device, &queue, small_settings());
        let calls = Rc::new(Cell::new(0));
        renderer.add_overlay(Box::new(CountingOverlay {
            calls: calls.clone(),
        }));
        let mut scene = cube_scene(&device, &renderer, LightSet::new());
        frame(&device, &queue, &mut renderer, &mut scene);
        assert_eq!(
            renderer.last_frame_passes(),
            &[
                FramePass::Shadow,
                FramePass::Geometry,
                FramePass::Ssao,
                FramePass::SsaoBlur,
                FramePass::Lighting,
                FramePass::DepthBlit,
                FramePass::Forward,
                FramePass::Bloom,
                FramePass::Composite,
                FramePass::Overlay,
            ]
        );
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_disabled_stages_are_skipped() {
        let Some((device, queue)) = create_test_device_queue() else {
            return;
        };
        let mut settings = small_settings();
        settings.ssao.enabled = false;
        settings.bloom.enabled = false;
        let mut renderer = renderer(&device, &queue, settings);
        let mut scene = cube_scene(&device, &renderer, LightSet::new());
        frame(&device, &queue, &mut renderer, &mut scene);
        assert_eq!(
            renderer.last_frame_passes(),
            &[
                FramePass::Shadow,
                FramePass::Geometry,
                FramePass::SsaoBlur,
                FramePass::Lighting,
                FramePass::DepthBlit,
                FramePass::Forward,
                FramePass::Composite,
            ]
        );
    }

    #[test]
    fn test_directional_light_brightens_lit_cube() {
        let Some((device, queue)) = create_test_device_queue() else {
            return;
        };
        let mut renderer = renderer(&device, &queue, small_settings());

        let mut baseline_scene = cube_scene(&device, &renderer, LightSet::new());
        let baseline = frame(&device, &queue, &mut renderer, &mut baseline_scene);

        let mut lights = LightSet::new();
        lights.directional = Some(front_light());
        let mut lit_scene = cube_scene(&device, &renderer, lights);
        let lit = frame(&device, &queue, &mut renderer, &mut lit_scene);

        let albedo = read_texture(&device, &queue, &renderer.gbuffer().albedo_spec.texture, 0, 0);
        let index = ((SIZE / 2 * SIZE + SIZE / 2) * 4) as usize;
        assert!(albedo[index..index + 3].iter().any(|&c| c > 0));
        assert!(
            center_luminance(&lit) > center_luminance(&baseline),
            "lit {} vs ambient {}",
            center_luminance(&lit),
            center_luminance(&baseline)
        );
    }

    #[test]
    fn test_exposure_change_applies_to_next_frame() {
        let Some((device, queue)) = create_test_device_queue() else {
            return;
        };
        let mut renderer = renderer(&device, &queue, small_settings());
        let mut lights = LightSet::new();
        lights.directional = Some(front_light());
        let mut scene = cube_scene(&device, &renderer, lights);
        let before = center_luminance(&frame(&device, &queue, &mut renderer, &mut scene));

        let dimmed = ToneMapping {
            exposure: renderer.settings().tone_mapping.exposure * 0.25,
            ..renderer.settings().tone_mapping
        };
        renderer.set_tone_mapping(dimmed);
        assert_eq!(renderer.settings().tone_mapping, dimmed);
        let after = center_luminance(&frame(&device, &queue, &mut renderer, &mut scene));
        assert!(after < before, "{after} vs {before}");
    }

    #[test]
    fn test_forced_shadow_matches_empty_shadow_map() {
        let Some((device, queue)) = create_test_device_queue() else {
            return;
        };
        let mut renderer = renderer(&device, &queue, small_settings());
        let mut lights = LightSet::new();
        lights.directional = Some(front_light());
        let mut scene = cube_scene(&device, &renderer, lights);
        // Nothing casts, so the directional map stays at its far clear value.
        scene.opaque[0].casts_shadow = false;

        let sampled = frame(&device, &queue, &mut renderer, &mut scene);
        renderer.set_force_no_directional_shadow(true);
        let forced = frame(&device, &queue, &mut renderer, &mut scene);
        assert_eq!(sampled, forced);
    }

    #[test]
    fn test_point_light_beyond_radius_contributes_nothing() {
        let Some((device, queue)) = create_test_device_queue() else {
            return;
        };
        let settings = small_settings().with_debug_view(DebugView::PointLightsOnly);
        let mut renderer = renderer(&device, &queue, settings);

        let mut lights = LightSet::new();
        lights
            .add_point_light(PointLight::new(Vec3::new(0.0, 0.0, 2.0), Vec3::ONE, 1.0))
            .unwrap();
        let mut scene = cube_scene(&device, &renderer, lights);
        frame(&device, &queue, &mut renderer, &mut scene);
        let near = read_texture_rgba16f(&device, &queue, &renderer.lighting_output().color.texture, 0, 0);
        let center = near[(SIZE / 2 * SIZE + SIZE / 2) as usize];
        assert!(center[0] > 0.0, "nearby light should reach the cube");

        let radius = scene.lights.point_lights()[0].falloff_radius(FalloffModel::InverseSquare);
        scene.lights.point_lights_mut()[0].position = Vec3::new(radius + 10.0, 0.0, 0.0);
        frame(&device, &queue, &mut renderer, &mut scene);
        let far = read_texture_rgba16f(&device, &queue, &renderer.lighting_output().color.texture, 0, 0);
        for texel in far {
            assert!(texel[0].abs() < 1e-3 && texel[1].abs() < 1e-3 && texel[2].abs() < 1e-3);
        }
    }

    #[test]
    fn test_transparent_objects_blend_over_scene() {
        let Some((device, queue)) = create_test_device_queue() else {
            return;
        };
        let mut renderer = renderer(&device, &queue, small_settings());
        let mut lights = LightSet::new();
        lights.directional = Some(front_light());
        let mut scene = cube_scene(&device, &renderer, lights);
        let before = frame(&device, &queue, &mut renderer, &mut scene);

        let glass = RenderableMesh::new(
            &device,
            "glass",
            &MeshData::quad(),
            Material {
                albedo_factor: Vec3::new(1.0, 0.0, 0.0),
                opacity: 0.5,
                ..Default::default()
            },
            renderer.material_layout(),
            renderer.textures(),
        );
        let model = Mat4::from_translation(Vec3::new(0.0, 0.0, 2.0));
        scene.transparent.push(
            SceneObject::new(
                &device,
                Arc::new(glass),
                vec![InstanceData::new(model).with_tint(Vec4::ONE)],
            )
            .with_shadow(false),
        );
        let after = frame(&device, &queue, &mut renderer, &mut scene);
        assert_ne!(before, after);
    }

    #[test]
    fn test_resize_recreates_targets() {
        let Some((device, queue)) = create_test_device_queue() else {
            return;
        };
        let mut renderer = renderer(&device, &queue, small_settings());
        renderer.resize(&device, 32, 16).unwrap();
        assert_eq!(renderer.size(), (32, 16));
        assert_eq!(renderer.gbuffer().size(), (32, 16));
        assert_eq!(renderer.lighting_output().color.size(), (32, 16));
        renderer.resize(&device, 0, 10).unwrap();
        assert_eq!(renderer.size(), (32, 16));
    }
}
