//! Deferred lighting: one fullscreen pass that shades every G-buffer sample.
//!
//! The pass reads the view-space G-buffer, the blurred SSAO factor, both
//! shadow maps and the IBL maps through the [`SamplerSlot`] table, and
//! writes HDR color plus a bright-pass copy for bloom. Background samples
//! (position `w == 0`) are written as zero and left for the skybox.

use mental_config::{DebugView, PipelineVariant};
use mental_lighting::{FalloffModel, LightSet, LightsUniform, MAX_POINT_LIGHTS, ShadowUniform};

use crate::error::RenderError;
use crate::gbuffer::GBuffer;
use crate::ibl::{BRDF_SOURCE, IblMaps};
use crate::pass::{self, FULLSCREEN_VERTEX_SOURCE, PipelineDesc};
use crate::shader::{ProgramDesc, ShaderProgram, TEXTURES_GROUP};
use crate::shadow::{POINT_SHADOW_BIAS, ShadowPass};
use crate::slots::{self, SamplerSlot, SlotResource};
use crate::target::{ColorTarget, HdrTarget};
use crate::uniforms::{MATRICES_BLOCK_SOURCE, MatricesBuffer};

pub const LIGHTING_SLOTS: [SamplerSlot; 12] = [
    SamplerSlot::GBufferPosition,
    SamplerSlot::GBufferNormal,
    SamplerSlot::GBufferAlbedoSpec,
    SamplerSlot::GBufferMaterial,
    SamplerSlot::Ssao,
    SamplerSlot::ShadowDirectional,
    SamplerSlot::ShadowPoint,
    SamplerSlot::Irradiance,
    SamplerSlot::Prefilter,
    SamplerSlot::BrdfLut,
    SamplerSlot::LinearSampler,
    SamplerSlot::ShadowSampler,
];

/// Blinn-Phong exponent.
pub const DEFAULT_SHININESS: f32 = 32.0;

/// WGSL mirror of [`LightsUniform`] and [`ShadowUniform`].
pub(crate) fn light_structs_source() -> String {
    format!(
        r#"
const MAX_POINT_LIGHTS: u32 = {MAX_POINT_LIGHTS}u;

struct DirectionalLight {{
    direction_enabled: vec4<f32>,
    ambient: vec4<f32>,
    diffuse_intensity: vec4<f32>,
    specular: vec4<f32>,
}};

struct PointLight {{
    position_radius: vec4<f32>,
    color_intensity: vec4<f32>,
    attenuation: vec4<f32>,
}};

struct Lights {{
    directional: DirectionalLight,
    point_lights: array<PointLight, MAX_POINT_LIGHTS>,
    // x = point light count, y = shadow caster, z = falloff model
    counts: vec4<u32>,
}};

struct Shadow {{
    light_space: mat4x4<f32>,
    point_position_far: vec4<f32>,
    // x = directional on, y = point on, z = pcf, w = bias
    params: vec4<f32>,
}};
"#
    )
}

const LIGHTING_SHADER: &str = r#"
struct LightingParams {
    lights: Lights,
    shadow: Shadow,
    // x = ambient strength, y = variant (0 Blinn-Phong, 1 PBR), z = debug view, w = max prefilter lod
    settings: vec4<f32>,
    // x = directional shadow forced off, y = shininess, z = bloom threshold, w = point shadow bias
    settings2: vec4<f32>,
};
@group(1) @binding(0) var<uniform> params: LightingParams;

struct LightingOut {
    @location(0) color: vec4<f32>,
    @location(1) bright: vec4<f32>,
};

// 0 final, 1 albedo, 2 normals, 3 SSAO, 4 shadow factor, 5 point lights only
const DEBUG_FINAL: u32 = 0u;

fn directional_shadow(world_pos: vec3<f32>) -> f32 {
    if params.shadow.params.x == 0.0 || params.settings2.x != 0.0 {
        return 1.0;
    }
    let clip = params.shadow.light_space * vec4<f32>(world_pos, 1.0);
    let ndc = clip.xyz / clip.w;
    let uv = vec2<f32>(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5);
    if ndc.z > 1.0 || ndc.z < 0.0 || any(uv < vec2<f32>(0.0)) || any(uv > vec2<f32>(1.0)) {
        return 1.0;
    }
    let reference = ndc.z - params.shadow.params.w;
    if params.shadow.params.z == 0.0 {
        return textureSampleCompareLevel(shadow_map, shadow_sampler, uv, reference);
    }
    let texel = 1.0 / vec2<f32>(textureDimensions(shadow_map));
    var lit = 0.0;
    for (var y = -1; y <= 1; y++) {
        for (var x = -1; x <= 1; x++) {
            let offset = vec2<f32>(f32(x), f32(y)) * texel;
            lit += textureSampleCompareLevel(shadow_map, shadow_sampler, uv + offset, reference);
        }
    }
    return lit / 9.0;
}

fn point_shadow(world_pos: vec3<f32>, index: u32) -> f32 {
    if params.shadow.params.y == 0.0 || params.lights.counts.y != index {
        return 1.0;
    }
    let to_frag = world_pos - params.shadow.point_position_far.xyz;
    let reference = (length(to_frag) - params.settings2.w) / params.shadow.point_position_far.w;
    if reference >= 1.0 {
        return 1.0;
    }
    return textureSampleCompareLevel(shadow_cube, shadow_sampler, to_frag, reference);
}

fn point_falloff(light: PointLight, distance: f32) -> f32 {
    if distance >= light.position_radius.w {
        return 0.0;
    }
    if params.lights.counts.z == 1u {
        return 1.0 / max(distance * distance, 1e-4);
    }
    let a = light.attenuation;
    return 1.0 / (a.x + a.y * distance + a.z * distance * distance);
}

struct Surface {
    position: vec3<f32>,
    normal: vec3<f32>,
    view: vec3<f32>,
    albedo: vec3<f32>,
    specular: f32,
    metallic: f32,
    roughness: f32,
    ao: f32,
};

fn cook_torrance(s: Surface, l: vec3<f32>, radiance: vec3<f32>) -> vec3<f32> {
    let h = normalize(s.view + l);
    let n_dot_l = max(dot(s.normal, l), 0.0);
    let n_dot_v = max(dot(s.normal, s.view), 0.0);
    let n_dot_h = max(dot(s.normal, h), 0.0);
    let h_dot_v = max(dot(h, s.view), 0.0);
    let f0 = mix(vec3<f32>(0.04), s.albedo, s.metallic);
    let d = distribution_ggx(n_dot_h, s.roughness);
    let g = geometry_smith(n_dot_v, n_dot_l, s.roughness);
    let f = fresnel_schlick(h_dot_v, f0);
    let specular = (d * g * f) / (4.0 * n_dot_v * n_dot_l + 0.0001);
    let k_d = (vec3<f32>(1.0) - f) * (1.0 - s.metallic);
    return (k_d * s.albedo / PI + specular) * radiance * n_dot_l;
}

fn blinn_phong(s: Surface, l: vec3<f32>, diffuse: vec3<f32>, specular: vec3<f32>) -> vec3<f32> {
    let d = max(dot(s.normal, l), 0.0);
    let h = normalize(l + s.view);
    let sp = pow(max(dot(s.normal, h), 0.0), params.settings2.y);
    return diffuse * d * s.albedo + specular * sp * s.specular;
}

fn shade(s: Surface, l: vec3<f32>, diffuse: vec3<f32>, specular: vec3<f32>, radiance: vec3<f32>) -> vec3<f32> {
    if params.settings.y == 0.0 {
        return blinn_phong(s, l, diffuse, specular);
    }
    return cook_torrance(s, l, radiance);
}

fn ambient(s: Surface, occlusion: f32) -> vec3<f32> {
    if params.settings.y == 0.0 {
        let dir = params.lights.directional;
        let color = select(vec3<f32>(params.settings.x), dir.ambient.rgb, dir.direction_enabled.w != 0.0);
        return color * s.albedo * s.ao * occlusion;
    }
    let n_dot_v = max(dot(s.normal, s.view), 0.0);
    let f0 = mix(vec3<f32>(0.04), s.albedo, s.metallic);
    let f = fresnel_schlick_roughness(n_dot_v, f0, s.roughness);
    let k_d = (vec3<f32>(1.0) - f) * (1.0 - s.metallic);
    let irradiance = textureSampleLevel(irradiance_map, linear_sampler, s.normal, 0.0).rgb;
    let r = reflect(-s.view, s.normal);
    let prefiltered = textureSampleLevel(prefilter_map, linear_sampler, r, s.roughness * params.settings.w).rgb;
    let brdf = textureSampleLevel(brdf_lut, linear_sampler, vec2<f32>(n_dot_v, s.roughness), 0.0).rg;
    let specular = prefiltered * (f * brdf.x + brdf.y);
    return (k_d * irradiance * s.albedo + specular) * s.ao * occlusion;
}

@fragment
fn fs_lighting(in: FullscreenOut) -> LightingOut {
    var out: LightingOut;
    let pixel = vec2<i32>(in.position.xy);
    let position = textureLoad(g_position, pixel, 0);
    if position.w == 0.0 {
        out.color = vec4<f32>(0.0);
        out.bright = vec4<f32>(0.0);
        return out;
    }
    let albedo_spec = textureLoad(g_albedo_spec, pixel, 0);
    let material = textureLoad(g_material, pixel, 0);
    let view_normal = textureLoad(g_normal, pixel, 0).xyz;

    var s: Surface;
    s.position = (matrices.inverse_view * vec4<f32>(position.xyz, 1.0)).xyz;
    s.normal = normalize((matrices.inverse_view * vec4<f32>(view_normal, 0.0)).xyz);
    s.view = normalize(matrices.camera_position.xyz - s.position);
    s.albedo = albedo_spec.rgb;
    s.specular = albedo_spec.a;
    s.metallic = material.r;
    s.roughness = clamp(material.g, 0.04, 1.0);
    s.ao = material.b;
    let occlusion = textureLoad(ssao_map, pixel, 0).r;

    var direct = vec3<f32>(0.0);
    let shadow = directional_shadow(s.position);
    let dir = params.lights.directional;
    if dir.direction_enabled.w != 0.0 {
        let l = normalize(-dir.direction_enabled.xyz);
        let diffuse = dir.diffuse_intensity.rgb * dir.diffuse_intensity.w;
        direct += shade(s, l, diffuse, dir.specular.rgb, diffuse) * shadow;
    }

    var points = vec3<f32>(0.0);
    let count = min(params.lights.counts.x, MAX_POINT_LIGHTS);
    for (var i = 0u; i < count; i++) {
        let light = params.lights.point_lights[i];
        let to_light = light.position_radius.xyz - s.position;
        let distance = length(to_light);
        let falloff = point_falloff(light, distance);
        if falloff <= 0.0 {
            continue;
        }
        let l = to_light / max(distance, 1e-4);
        let radiance = light.color_intensity.rgb * light.color_intensity.w * falloff;
        points += shade(s, l, radiance, radiance, radiance) * point_shadow(s.position, i);
    }

    let view_mode = u32(params.settings.z);
    var color: vec3<f32>;
    switch view_mode {
        case 1u: {
            color = s.albedo;
        }
        case 2u: {
            color = s.normal * 0.5 + 0.5;
        }
        case 3u: {
            color = vec3<f32>(occlusion);
        }
        case 4u: {
            color = vec3<f32>(shadow);
        }
        case 5u: {
            color = points;
        }
        default: {
            color = ambient(s, occlusion) + direct + points;
        }
    }

    out.color = vec4<f32>(color, 1.0);
    let luminance = dot(color, vec3<f32>(0.2126, 0.7152, 0.0722));
    let bright = select(vec3<f32>(0.0), color, view_mode == DEBUG_FINAL && luminance > params.settings2.z);
    out.bright = vec4<f32>(bright, 1.0);
    return out;
}
"#;

/// Index of a debug view in the shader's `switch`.
pub fn debug_view_index(view: DebugView) -> u32 {
    match view {
        DebugView::Final => 0,
        DebugView::Albedo => 1,
        DebugView::Normals => 2,
        DebugView::Ssao => 3,
        DebugView::Shadow => 4,
        DebugView::PointLightsOnly => 5,
    }
}

/// Per-frame switches of the lighting pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightingSettings {
    pub variant: PipelineVariant,
    pub debug_view: DebugView,
    pub falloff: FalloffModel,
    /// Constant ambient used by the Blinn-Phong variant without a directional light.
    pub ambient_strength: f32,
    pub shininess: f32,
    /// Luminance above which a sample also lands in the bright-pass target.
    pub bloom_threshold: f32,
    /// Treat every sample as fully lit by the directional light.
    pub force_no_directional_shadow: bool,
}

impl Default for LightingSettings {
    fn default() -> Self {
        Self {
            variant: PipelineVariant::Pbr,
            debug_view: DebugView::Final,
            falloff: FalloffModel::Quadratic,
            ambient_strength: 0.03,
            shininess: DEFAULT_SHININESS,
            bloom_threshold: 1.0,
            force_no_directional_shadow: false,
        }
    }
}

impl LightingSettings {
    /// `settings` and `settings2` of the params block.
    fn pack(&self, max_prefilter_lod: f32) -> [[f32; 4]; 2] {
        let variant = match self.variant {
            PipelineVariant::BlinnPhong => 0.0,
            PipelineVariant::Pbr => 1.0,
        };
        [
            [
                self.ambient_strength,
                variant,
                debug_view_index(self.debug_view) as f32,
                max_prefilter_lod,
            ],
            [
                if self.force_no_directional_shadow { 1.0 } else { 0.0 },
                self.shininess,
                self.bloom_threshold,
                POINT_SHADOW_BIAS,
            ],
        ]
    }
}

/// Everything the lighting pass samples.
pub struct LightingInputs<'a> {
    pub gbuffer: &'a GBuffer,
    pub ssao: &'a ColorTarget,
    pub shadows: &'a ShadowPass,
    pub ibl: &'a IblMaps,
}

pub struct LightingPass {
    program: ShaderProgram,
    layout: wgpu::BindGroupLayout,
    pipeline: wgpu::RenderPipeline,
    linear_sampler: wgpu::Sampler,
    bind_group: wgpu::BindGroup,
    output: HdrTarget,
    settings: LightingSettings,
    max_prefilter_lod: f32,
}

impl LightingPass {
    pub fn new(
        device: &wgpu::Device,
        matrices: &MatricesBuffer,
        inputs: &LightingInputs<'_>,
        settings: LightingSettings,
    ) -> Result<Self, RenderError> {
        let structs = light_structs_source();
        let decls = slots::wgsl_declarations(&LIGHTING_SLOTS);
        let program = ShaderProgram::build(
            device,
            &ProgramDesc {
                label: "lighting",
                sources: &[
                    MATRICES_BLOCK_SOURCE,
                    FULLSCREEN_VERTEX_SOURCE,
                    BRDF_SOURCE,
                    structs.as_str(),
                    decls.as_str(),
                    LIGHTING_SHADER,
                ],
                vertex: "vs_fullscreen",
                fragment: Some("fs_lighting"),
            },
        )
        .require()?;

        let layout = slots::bind_group_layout(device, "lighting-bgl", &LIGHTING_SLOTS);
        let targets = HdrTarget::color_targets();
        let pipeline = pass::create_pipeline(
            device,
            &program,
            &PipelineDesc::fullscreen(
                "lighting-pipeline",
                &[matrices.layout(), program.params_layout()?, &layout],
                &targets,
            ),
        )?;
        let linear_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("lighting-linear-sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Linear,
            ..Default::default()
        });

        let bind_group = Self::create_bind_group(device, &layout, &linear_sampler, inputs)?;
        let (width, height) = inputs.gbuffer.size();
        let output = HdrTarget::new(device, width, height)?;
        let mut lighting = Self {
            program,
            layout,
            pipeline,
            linear_sampler,
            bind_group,
            output,
            settings,
            max_prefilter_lod: inputs.ibl.max_prefilter_lod(),
        };
        lighting.set_settings(settings);
        Ok(lighting)
    }

    fn create_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        linear_sampler: &wgpu::Sampler,
        inputs: &LightingInputs<'_>,
    ) -> Result<wgpu::BindGroup, RenderError> {
        let g = inputs.gbuffer;
        slots::bind_group(
            device,
            "lighting-bg",
            layout,
            &LIGHTING_SLOTS,
            &[
                (SamplerSlot::GBufferPosition, SlotResource::View(&g.position.view)),
                (SamplerSlot::GBufferNormal, SlotResource::View(&g.normal.view)),
                (SamplerSlot::GBufferAlbedoSpec, SlotResource::View(&g.albedo_spec.view)),
                (SamplerSlot::GBufferMaterial, SlotResource::View(&g.material.view)),
                (SamplerSlot::Ssao, SlotResource::View(&inputs.ssao.view)),
                (
                    SamplerSlot::ShadowDirectional,
                    SlotResource::View(inputs.shadows.directional_map().sample_view()),
                ),
                (
                    SamplerSlot::ShadowPoint,
                    SlotResource::View(inputs.shadows.point_map().sample_view()),
                ),
                (SamplerSlot::Irradiance, SlotResource::View(&inputs.ibl.irradiance.view)),
                (SamplerSlot::Prefilter, SlotResource::View(&inputs.ibl.prefilter.view)),
                (SamplerSlot::BrdfLut, SlotResource::View(&inputs.ibl.brdf_lut.view)),
                (SamplerSlot::LinearSampler, SlotResource::Sampler(linear_sampler)),
                (
                    SamplerSlot::ShadowSampler,
                    SlotResource::Sampler(inputs.shadows.comparison_sampler()),
                ),
            ],
        )
    }

    /// Rebind the inputs and recreate the output after a resize.
    pub fn resize(&mut self, device: &wgpu::Device, inputs: &LightingInputs<'_>) -> Result<(), RenderError> {
        self.bind_group = Self::create_bind_group(device, &self.layout, &self.linear_sampler, inputs)?;
        let (width, height) = inputs.gbuffer.size();
        self.output = HdrTarget::new(device, width, height)?;
        Ok(())
    }

    pub fn settings(&self) -> &LightingSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: LightingSettings) {
        self.settings = settings;
        let [settings, settings2] = settings.pack(self.max_prefilter_lod);
        self.program.set_uniform("settings", settings);
        self.program.set_uniform("settings2", settings2);
    }

    /// Stage this frame's lights and shadow parameters.
    pub fn update(&mut self, lights: &LightSet, shadow: &ShadowUniform) {
        let uniform: LightsUniform = lights.to_uniform(self.settings.falloff);
        self.program.set_uniform_raw("lights", bytemuck::bytes_of(&uniform));
        self.program.set_uniform_raw("shadow", bytemuck::bytes_of(shadow));
    }

    /// HDR color and bright-pass targets.
    pub fn output(&self) -> &HdrTarget {
        &self.output
    }

    pub fn record(
        &mut self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        matrices: &MatricesBuffer,
    ) {
        self.program.flush(queue);
        let attachments = self.output.clear_attachments();
        let mut rpass = pass::begin_pass(encoder, "lighting-pass", &attachments, None);
        rpass.set_pipeline(&self.pipeline);
        matrices.bind(&mut rpass);
        self.program.bind(&mut rpass);
        rpass.set_bind_group(TEXTURES_GROUP, &self.bind_group, &[]);
        rpass.draw(0..3, 0..1);
    }
}
