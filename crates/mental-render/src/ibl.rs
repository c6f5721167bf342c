//! Image-based lighting bake.
//!
//! Runs once at startup. An equirectangular HDR image is projected onto an
//! environment cubemap, which is then convolved into a diffuse irradiance
//! cubemap and a roughness-mipped specular prefilter cubemap. A split-sum
//! BRDF lookup texture is integrated independently of the environment.
//!
//! Each stage renders one fullscreen triangle per face (and per mip), reading
//! a per-draw capture uniform at a dynamic offset. Stages are submitted and
//! waited on one at a time so the bake log shows per-stage timings.

use std::num::NonZeroU64;
use std::path::Path;
use std::time::Instant;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use mental_config::IblConfig;
use mental_lighting::{CubeFace, cube_face_projection, cube_face_view};

use crate::error::RenderError;
use crate::pass::{self, FULLSCREEN_VERTEX_SOURCE, PipelineDesc};
use crate::shader::{ProgramDesc, ShaderProgram};
use crate::target::{ColorTarget, Cubemap};
use crate::texture::{MipmapGenerator, Texture, TextureData, load_hdr_equirect, mip_level_count};

pub const CUBEMAP_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const BRDF_LUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rg16Float;

/// Angular step of the irradiance convolution, in radians.
pub const IRRADIANCE_SAMPLE_DELTA: f32 = 0.025;

const CAPTURE_STRIDE: u64 = 256;

/// WGSL GGX helpers shared with the lighting pass.
pub(crate) const BRDF_SOURCE: &str = r#"
const PI: f32 = 3.14159265359;

fn distribution_ggx(n_dot_h: f32, roughness: f32) -> f32 {
    let a = roughness * roughness;
    let a2 = a * a;
    let denom = n_dot_h * n_dot_h * (a2 - 1.0) + 1.0;
    return a2 / max(PI * denom * denom, 1e-7);
}

fn geometry_schlick_ggx(n_dot: f32, roughness: f32) -> f32 {
    let r = roughness + 1.0;
    let k = (r * r) / 8.0;
    return n_dot / (n_dot * (1.0 - k) + k);
}

fn geometry_smith(n_dot_v: f32, n_dot_l: f32, roughness: f32) -> f32 {
    return geometry_schlick_ggx(n_dot_v, roughness) * geometry_schlick_ggx(n_dot_l, roughness);
}

fn geometry_schlick_ggx_ibl(n_dot: f32, roughness: f32) -> f32 {
    let k = (roughness * roughness) / 2.0;
    return n_dot / (n_dot * (1.0 - k) + k);
}

fn fresnel_schlick(cos_theta: f32, f0: vec3<f32>) -> vec3<f32> {
    return f0 + (vec3<f32>(1.0) - f0) * pow(clamp(1.0 - cos_theta, 0.0, 1.0), 5.0);
}

fn fresnel_schlick_roughness(cos_theta: f32, f0: vec3<f32>, roughness: f32) -> vec3<f32> {
    return f0 + (max(vec3<f32>(1.0 - roughness), f0) - f0) * pow(clamp(1.0 - cos_theta, 0.0, 1.0), 5.0);
}

fn radical_inverse(bits: u32) -> f32 {
    return f32(reverseBits(bits)) * 2.3283064365386963e-10;
}

fn hammersley(i: u32, n: u32) -> vec2<f32> {
    return vec2<f32>(f32(i) / f32(n), radical_inverse(i));
}

fn importance_sample_ggx(xi: vec2<f32>, normal: vec3<f32>, roughness: f32) -> vec3<f32> {
    let a = roughness * roughness;
    let phi = 2.0 * PI * xi.x;
    let cos_theta = sqrt((1.0 - xi.y) / (1.0 + (a * a - 1.0) * xi.y));
    let sin_theta = sqrt(max(1.0 - cos_theta * cos_theta, 0.0));
    let h = vec3<f32>(cos(phi) * sin_theta, sin(phi) * sin_theta, cos_theta);
    let up = select(vec3<f32>(1.0, 0.0, 0.0), vec3<f32>(0.0, 0.0, 1.0), abs(normal.z) < 0.999);
    let tangent = normalize(cross(up, normal));
    let bitangent = cross(normal, tangent);
    return normalize(tangent * h.x + bitangent * h.y + normal * h.z);
}
"#;

const CAPTURE_SHADER: &str = r#"
struct Capture {
    inverse_view_projection: mat4x4<f32>,
    // x = roughness, y = source face size, z = sample count, w = target size
    params: vec4<f32>,
};
@group(0) @binding(0) var<uniform> capture: Capture;
@group(1) @binding(0) var source_sampler: sampler;

fn capture_direction(uv: vec2<f32>) -> vec3<f32> {
    let ndc = vec2<f32>(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0);
    let far = capture.inverse_view_projection * vec4<f32>(ndc, 1.0, 1.0);
    return normalize(far.xyz / far.w);
}
"#;

const EQUIRECT_SHADER: &str = r#"
@group(1) @binding(1) var equirect: texture_2d<f32>;

@fragment
fn fs_equirect(in: FullscreenOut) -> @location(0) vec4<f32> {
    let d = capture_direction(in.uv);
    let uv = vec2<f32>(atan2(d.z, d.x) * 0.1591 + 0.5, 0.5 - asin(clamp(d.y, -1.0, 1.0)) * 0.3183);
    return vec4<f32>(textureSampleLevel(equirect, source_sampler, uv, 0.0).rgb, 1.0);
}
"#;

const CONVOLUTION_SHADER: &str = r#"
@group(1) @binding(1) var environment: texture_cube<f32>;

const SAMPLE_DELTA: f32 = 0.025;

@fragment
fn fs_irradiance(in: FullscreenOut) -> @location(0) vec4<f32> {
    let n = capture_direction(in.uv);
    let helper = select(vec3<f32>(0.0, 1.0, 0.0), vec3<f32>(0.0, 0.0, 1.0), abs(n.y) > 0.999);
    let right = normalize(cross(helper, n));
    let up = normalize(cross(n, right));

    let phi_steps = u32(ceil(2.0 * PI / SAMPLE_DELTA));
    let theta_steps = u32(ceil(0.5 * PI / SAMPLE_DELTA));
    var irradiance = vec3<f32>(0.0);
    for (var p = 0u; p < phi_steps; p++) {
        let phi = f32(p) * SAMPLE_DELTA;
        for (var t = 0u; t < theta_steps; t++) {
            let theta = f32(t) * SAMPLE_DELTA;
            let local = vec3<f32>(sin(theta) * cos(phi), sin(theta) * sin(phi), cos(theta));
            let dir = local.x * right + local.y * up + local.z * n;
            irradiance += textureSampleLevel(environment, source_sampler, dir, 0.0).rgb
                * cos(theta) * sin(theta);
        }
    }
    irradiance = PI * irradiance / f32(phi_steps * theta_steps);
    return vec4<f32>(irradiance, 1.0);
}

@fragment
fn fs_prefilter(in: FullscreenOut) -> @location(0) vec4<f32> {
    let n = capture_direction(in.uv);
    let v = n;
    let roughness = capture.params.x;
    let resolution = capture.params.y;
    let sample_count = u32(capture.params.z);
    let texel_solid_angle = 4.0 * PI / (6.0 * resolution * resolution);

    var color = vec3<f32>(0.0);
    var weight = 0.0;
    for (var i = 0u; i < sample_count; i++) {
        let h = importance_sample_ggx(hammersley(i, sample_count), n, roughness);
        let l = normalize(2.0 * dot(v, h) * h - v);
        let n_dot_l = max(dot(n, l), 0.0);
        if n_dot_l > 0.0 {
            let n_dot_h = max(dot(n, h), 0.0);
            let h_dot_v = max(dot(h, v), 0.0);
            let pdf = distribution_ggx(n_dot_h, roughness) * n_dot_h / (4.0 * h_dot_v) + 0.0001;
            let sample_solid_angle = 1.0 / (f32(sample_count) * pdf + 0.0001);
            let mip = select(0.5 * log2(sample_solid_angle / texel_solid_angle), 0.0, roughness == 0.0);
            color += textureSampleLevel(environment, source_sampler, l, max(mip, 0.0)).rgb * n_dot_l;
            weight += n_dot_l;
        }
    }
    return vec4<f32>(color / max(weight, 1e-4), 1.0);
}
"#;

const BRDF_LUT_SHADER: &str = r#"
@fragment
fn fs_brdf(in: FullscreenOut) -> @location(0) vec4<f32> {
    let size = capture.params.w;
    let sample_count = u32(capture.params.z);
    let n_dot_v = max(in.position.x / size, 1e-4);
    let roughness = in.position.y / size;
    let v = vec3<f32>(sqrt(1.0 - n_dot_v * n_dot_v), 0.0, n_dot_v);
    let n = vec3<f32>(0.0, 0.0, 1.0);

    var a = 0.0;
    var b = 0.0;
    for (var i = 0u; i < sample_count; i++) {
        let h = importance_sample_ggx(hammersley(i, sample_count), n, roughness);
        let l = normalize(2.0 * dot(v, h) * h - v);
        let n_dot_l = max(l.z, 0.0);
        let n_dot_h = max(h.z, 0.0);
        let v_dot_h = max(dot(v, h), 0.0);
        if n_dot_l > 0.0 {
            let g = geometry_schlick_ggx_ibl(n_dot_v, roughness) * geometry_schlick_ggx_ibl(n_dot_l, roughness);
            let g_vis = (g * v_dot_h) / (n_dot_h * n_dot_v);
            let fc = pow(1.0 - v_dot_h, 5.0);
            a += (1.0 - fc) * g_vis;
            b += fc * g_vis;
        }
    }
    return vec4<f32>(a, b, 0.0, 1.0) / vec4<f32>(f32(max(sample_count, 1u)), f32(max(sample_count, 1u)), 1.0, 1.0);
}
"#;

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct CaptureUniform {
    inverse_view_projection: [f32; 16],
    params: [f32; 4],
}

/// Capture transform of one cube face, as seen from the origin.
fn face_inverse_view_projection(face: CubeFace) -> Mat4 {
    (cube_face_projection(0.1, 10.0) * cube_face_view(Vec3::ZERO, face)).inverse()
}

/// The four maps read by the lighting pass.
pub struct IblMaps {
    /// Mipmapped capture of the HDR source. Also drawn as the skybox.
    pub environment: Cubemap,
    pub irradiance: Cubemap,
    /// Mip `i` is convolved at roughness `i / (levels - 1)`.
    pub prefilter: Cubemap,
    /// x = scale, y = bias on F0; u = N·V, v = roughness.
    pub brdf_lut: ColorTarget,
}

impl IblMaps {
    /// Load an HDR file and bake it. Missing or unreadable files are errors.
    pub fn from_file(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        path: &Path,
        config: &IblConfig,
        mipmaps: &mut MipmapGenerator,
    ) -> Result<Self, RenderError> {
        let equirect = load_hdr_equirect(device, queue, path, false)?;
        Self::bake(device, queue, &equirect, config, mipmaps)
    }

    pub fn bake(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        equirect: &Texture,
        config: &IblConfig,
        mipmaps: &mut MipmapGenerator,
    ) -> Result<Self, RenderError> {
        let baker = IblBaker::new(device)?;
        let started = Instant::now();

        let env_size = config.environment_size.max(1);
        let environment = Cubemap::new(
            device,
            "ibl-environment",
            env_size,
            mip_level_count(env_size, env_size),
            CUBEMAP_FORMAT,
            wgpu::TextureUsages::empty(),
        );
        let stage = Instant::now();
        baker.capture_equirect(device, queue, equirect, &environment);
        mipmaps.generate(device, queue, &environment.texture);
        wait(device);
        log::info!("IBL environment capture ({env_size}px): {:?}", stage.elapsed());

        let irradiance_size = config.irradiance_size.max(1);
        let irradiance = Cubemap::new(
            device,
            "ibl-irradiance",
            irradiance_size,
            1,
            CUBEMAP_FORMAT,
            wgpu::TextureUsages::empty(),
        );
        let stage = Instant::now();
        baker.convolve(device, queue, &environment, &irradiance, Convolution::Irradiance, 0);
        wait(device);
        log::info!("IBL irradiance convolution ({irradiance_size}px): {:?}", stage.elapsed());

        let prefilter_size = config.prefilter_size.max(1);
        let levels = config
            .prefilter_mip_levels
            .clamp(1, mip_level_count(prefilter_size, prefilter_size));
        let prefilter = Cubemap::new(
            device,
            "ibl-prefilter",
            prefilter_size,
            levels,
            CUBEMAP_FORMAT,
            wgpu::TextureUsages::empty(),
        );
        let stage = Instant::now();
        baker.convolve(
            device,
            queue,
            &environment,
            &prefilter,
            Convolution::Prefilter,
            config.sample_count.max(1),
        );
        wait(device);
        log::info!(
            "IBL specular prefilter ({prefilter_size}px, {levels} levels): {:?}",
            stage.elapsed()
        );

        let lut_size = config.brdf_lut_size.max(1);
        let brdf_lut = ColorTarget::new(device, "ibl-brdf-lut", lut_size, lut_size, BRDF_LUT_FORMAT);
        let stage = Instant::now();
        baker.integrate_brdf(device, queue, &brdf_lut, config.sample_count.max(1));
        wait(device);
        log::info!("IBL BRDF integration ({lut_size}px): {:?}", stage.elapsed());

        log::info!("IBL bake finished in {:?}", started.elapsed());
        Ok(Self {
            environment,
            irradiance,
            prefilter,
            brdf_lut,
        })
    }

    /// Bake a uniformly colored environment at minimal sizes.
    ///
    /// Used when no HDR source is configured, so the lighting pass always
    /// has valid maps bound.
    pub fn constant(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        color: [f32; 3],
        mipmaps: &mut MipmapGenerator,
    ) -> Result<Self, RenderError> {
        let texel = [color[0], color[1], color[2], 1.0].map(half::f16::from_f32);
        let texels = [texel; 8];
        let equirect = Texture::from_data(
            device,
            queue,
            &TextureData {
                label: "constant-equirect",
                data: bytemuck::cast_slice(&texels),
                width: 4,
                height: 2,
                format: wgpu::TextureFormat::Rgba16Float,
            },
            None,
            None,
        )?;
        let config = IblConfig {
            environment_size: 8,
            irradiance_size: 4,
            prefilter_size: 8,
            prefilter_mip_levels: 2,
            brdf_lut_size: 32,
            sample_count: 64,
        };
        Self::bake(device, queue, &equirect, &config, mipmaps)
    }

    /// Highest prefilter mip, used to map roughness to a level of detail.
    pub fn max_prefilter_lod(&self) -> f32 {
        (self.prefilter.mip_level_count() - 1) as f32
    }
}

fn wait(device: &wgpu::Device) {
    if let Err(e) = device.poll(wgpu::PollType::Wait {
        submission_index: None,
        timeout: None,
    }) {
        log::warn!("Waiting for IBL stage failed: {e}");
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Convolution {
    Irradiance,
    Prefilter,
}

/// Programs, layouts and the capture buffer layout shared by every stage.
struct IblBaker {
    capture_layout: wgpu::BindGroupLayout,
    equirect_layout: wgpu::BindGroupLayout,
    cube_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    equirect_pipeline: wgpu::RenderPipeline,
    irradiance_pipeline: wgpu::RenderPipeline,
    prefilter_pipeline: wgpu::RenderPipeline,
    brdf_pipeline: wgpu::RenderPipeline,
}

impl IblBaker {
    fn new(device: &wgpu::Device) -> Result<Self, RenderError> {
        let capture_size = std::mem::size_of::<CaptureUniform>() as u64;
        let capture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("ibl-capture-bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(capture_size),
                },
                count: None,
            }],
        });
        let source_layout = |label, view_dimension| {
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(label),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension,
                            multisampled: false,
                        },
                        count: None,
                    },
                ],
            })
        };
        let equirect_layout = source_layout("ibl-equirect-bgl", wgpu::TextureViewDimension::D2);
        let cube_layout = source_layout("ibl-cube-bgl", wgpu::TextureViewDimension::Cube);
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("ibl-sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Linear,
            ..Default::default()
        });

        let build = |label, body, entry| {
            ShaderProgram::build(
                device,
                &ProgramDesc {
                    label,
                    sources: &[BRDF_SOURCE, FULLSCREEN_VERTEX_SOURCE, CAPTURE_SHADER, body],
                    vertex: "vs_fullscreen",
                    fragment: Some(entry),
                },
            )
            .require()
        };
        let equirect_program = build("ibl-equirect", EQUIRECT_SHADER, "fs_equirect")?;
        let irradiance_program = build("ibl-irradiance", CONVOLUTION_SHADER, "fs_irradiance")?;
        let prefilter_program = build("ibl-prefilter", CONVOLUTION_SHADER, "fs_prefilter")?;
        let brdf_program = build("ibl-brdf", BRDF_LUT_SHADER, "fs_brdf")?;

        let cube_targets = [pass::opaque_target(CUBEMAP_FORMAT)];
        let lut_targets = [pass::opaque_target(BRDF_LUT_FORMAT)];
        let equirect_pipeline = pass::create_pipeline(
            device,
            &equirect_program,
            &PipelineDesc::fullscreen("ibl-equirect-pipeline", &[&capture_layout, &equirect_layout], &cube_targets),
        )?;
        let irradiance_pipeline = pass::create_pipeline(
            device,
            &irradiance_program,
            &PipelineDesc::fullscreen("ibl-irradiance-pipeline", &[&capture_layout, &cube_layout], &cube_targets),
        )?;
        let prefilter_pipeline = pass::create_pipeline(
            device,
            &prefilter_program,
            &PipelineDesc::fullscreen("ibl-prefilter-pipeline", &[&capture_layout, &cube_layout], &cube_targets),
        )?;
        let brdf_pipeline = pass::create_pipeline(
            device,
            &brdf_program,
            &PipelineDesc::fullscreen("ibl-brdf-pipeline", &[&capture_layout], &lut_targets),
        )?;

        Ok(Self {
            capture_layout,
            equirect_layout,
            cube_layout,
            sampler,
            equirect_pipeline,
            irradiance_pipeline,
            prefilter_pipeline,
            brdf_pipeline,
        })
    }

    /// Upload one capture uniform per draw and return the buffer's bind group.
    fn capture_bind_group(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        captures: &[CaptureUniform],
    ) -> wgpu::BindGroup {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("ibl-captures"),
            size: CAPTURE_STRIDE * captures.len().max(1) as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        for (i, capture) in captures.iter().enumerate() {
            queue.write_buffer(&buffer, i as u64 * CAPTURE_STRIDE, bytemuck::bytes_of(capture));
        }
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("ibl-capture-bg"),
            layout: &self.capture_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: NonZeroU64::new(std::mem::size_of::<CaptureUniform>() as u64),
                }),
            }],
        })
    }

    fn source_bind_group(
        &self,
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        view: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("ibl-source-bg"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(view),
                },
            ],
        })
    }

    /// Draw each `(view, capture)` pair as its own pass.
    fn draw_faces(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        label: &str,
        pipeline: &wgpu::RenderPipeline,
        source: Option<&wgpu::BindGroup>,
        draws: &[(&wgpu::TextureView, CaptureUniform)],
    ) {
        let captures: Vec<CaptureUniform> = draws.iter().map(|(_, c)| *c).collect();
        let capture_group = self.capture_bind_group(device, queue, &captures);
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(label),
        });
        for (i, (view, _)) in draws.iter().enumerate() {
            let attachment = [pass::clear_attachment(view, wgpu::Color::BLACK)];
            let mut rpass = pass::begin_pass(&mut encoder, label, &attachment, None);
            rpass.set_pipeline(pipeline);
            rpass.set_bind_group(0, &capture_group, &[(i as u64 * CAPTURE_STRIDE) as u32]);
            if let Some(source) = source {
                rpass.set_bind_group(1, source, &[]);
            }
            rpass.draw(0..3, 0..1);
        }
        queue.submit(std::iter::once(encoder.finish()));
    }

    fn capture_equirect(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        equirect: &Texture,
        target: &Cubemap,
    ) {
        let source = self.source_bind_group(device, &self.equirect_layout, &equirect.view);
        let draws: Vec<_> = CubeFace::ALL
            .iter()
            .map(|face| {
                (
                    target.face_view(0, face.layer()),
                    CaptureUniform {
                        inverse_view_projection: face_inverse_view_projection(*face).to_cols_array(),
                        params: [0.0, 0.0, 0.0, target.size as f32],
                    },
                )
            })
            .collect();
        self.draw_faces(device, queue, "ibl-equirect", &self.equirect_pipeline, Some(&source), &draws);
    }

    fn convolve(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        environment: &Cubemap,
        target: &Cubemap,
        kind: Convolution,
        sample_count: u32,
    ) {
        let source = self.source_bind_group(device, &self.cube_layout, &environment.view);
        let levels = target.mip_level_count();
        let mut draws = Vec::with_capacity(6 * levels as usize);
        for mip in 0..levels {
            let roughness = if levels > 1 {
                mip as f32 / (levels - 1) as f32
            } else {
                0.0
            };
            for face in CubeFace::ALL {
                draws.push((
                    target.face_view(mip, face.layer()),
                    CaptureUniform {
                        inverse_view_projection: face_inverse_view_projection(face).to_cols_array(),
                        params: [
                            roughness,
                            environment.size as f32,
                            sample_count as f32,
                            target.mip_size(mip) as f32,
                        ],
                    },
                ));
            }
        }
        let (label, pipeline) = match kind {
            Convolution::Irradiance => ("ibl-irradiance", &self.irradiance_pipeline),
            Convolution::Prefilter => ("ibl-prefilter", &self.prefilter_pipeline),
        };
        self.draw_faces(device, queue, label, pipeline, Some(&source), &draws);
    }

    fn integrate_brdf(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        target: &ColorTarget,
        sample_count: u32,
    ) {
        let (size, _) = target.size();
        let capture = CaptureUniform {
            inverse_view_projection: Mat4::IDENTITY.to_cols_array(),
            params: [0.0, 0.0, sample_count as f32, size as f32],
        };
        self.draw_faces(
            device,
            queue,
            "ibl-brdf",
            &self.brdf_pipeline,
            None,
            &[(&target.view, capture)],
        );
    }
}
