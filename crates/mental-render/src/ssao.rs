//! Screen-space ambient occlusion: estimate from the view-space G-buffer,
//! then box-blur away the noise tile pattern.
//!
//! The output is an ambient factor where 1.0 means unoccluded. When SSAO is
//! disabled the blurred target is cleared to 1.0 so the lighting pass can
//! multiply by it unconditionally.

use mental_config::SsaoConfig;
use mental_lighting::{SsaoKernel, SsaoParams};

use crate::error::RenderError;
use crate::gbuffer::GBuffer;
use crate::pass::{self, FULLSCREEN_VERTEX_SOURCE, PipelineDesc};
use crate::shader::{ProgramDesc, ShaderProgram, TEXTURES_GROUP};
use crate::slots::{self, SamplerSlot, SlotResource};
use crate::target::ColorTarget;
use crate::texture::{Texture, TextureData};
use crate::uniforms::{MATRICES_BLOCK_SOURCE, MatricesBuffer};

pub const SSAO_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R16Float;

const OCCLUSION_SLOTS: [SamplerSlot; 3] = [
    SamplerSlot::GBufferPosition,
    SamplerSlot::GBufferNormal,
    SamplerSlot::SsaoNoise,
];
const BLUR_SLOTS: [SamplerSlot; 1] = [SamplerSlot::SsaoRaw];

const OCCLUSION_SHADER: &str = r#"
struct SsaoParams {
    samples: array<vec4<f32>, 64>,
    // x = radius, y = bias, z = power, w = sample count
    settings: vec4<f32>,
    // xy = screen size / noise size, tiles the noise across the screen
    noise_scale: vec4<f32>,
};
@group(1) @binding(0) var<uniform> params: SsaoParams;

@fragment
fn fs_ssao(in: FullscreenOut) -> @location(0) vec4<f32> {
    let pixel = vec2<i32>(in.position.xy);
    let frag = textureLoad(g_position, pixel, 0);
    if frag.w == 0.0 {
        return vec4<f32>(1.0);
    }
    let normal = normalize(textureLoad(g_normal, pixel, 0).xyz);
    let noise_dims = vec2<i32>(textureDimensions(noise_tex));
    let tile = fract(in.uv * params.noise_scale.xy) * vec2<f32>(noise_dims);
    let texel = clamp(vec2<i32>(tile), vec2<i32>(0), noise_dims - vec2<i32>(1));
    let random = textureLoad(noise_tex, texel, 0).xyz;

    var tangent = random - normal * dot(random, normal);
    if dot(tangent, tangent) < 1e-6 {
        tangent = select(vec3<f32>(1.0, 0.0, 0.0), vec3<f32>(0.0, 1.0, 0.0), abs(normal.x) > 0.9);
        tangent = tangent - normal * dot(tangent, normal);
    }
    tangent = normalize(tangent);
    let tbn = mat3x3<f32>(tangent, cross(normal, tangent), normal);

    let radius = params.settings.x;
    let bias = params.settings.y;
    let count = u32(params.settings.w);
    let size = vec2<f32>(textureDimensions(g_position));
    var occluded = 0.0;
    for (var i = 0u; i < count; i++) {
        let sample_pos = frag.xyz + tbn * params.samples[i].xyz * radius;
        let clip = matrices.projection * vec4<f32>(sample_pos, 1.0);
        let ndc = clip.xy / clip.w;
        let uv = vec2<f32>(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5);
        if any(uv < vec2<f32>(0.0)) || any(uv >= vec2<f32>(1.0)) {
            continue;
        }
        let stored = textureLoad(g_position, vec2<i32>(uv * size), 0);
        if stored.w == 0.0 {
            continue;
        }
        let range = smoothstep(0.0, 1.0, radius / abs(frag.z - stored.z));
        if stored.z >= sample_pos.z + bias {
            occluded += range;
        }
    }
    let ao = pow(max(1.0 - occluded / max(f32(count), 1.0), 0.0), params.settings.z);
    return vec4<f32>(ao, ao, ao, 1.0);
}
"#;

const BLUR_SHADER: &str = r#"
struct BlurParams {
    radius: i32,
};
@group(1) @binding(0) var<uniform> params: BlurParams;

@fragment
fn fs_ssao_blur(in: FullscreenOut) -> @location(0) vec4<f32> {
    let pixel = vec2<i32>(in.position.xy);
    let last = vec2<i32>(textureDimensions(ssao_input)) - vec2<i32>(1);
    var total = 0.0;
    var taps = 0.0;
    for (var y = -params.radius; y <= params.radius; y++) {
        for (var x = -params.radius; x <= params.radius; x++) {
            let coord = clamp(pixel + vec2<i32>(x, y), vec2<i32>(0), last);
            total += textureLoad(ssao_input, coord, 0).r;
            taps += 1.0;
        }
    }
    let ao = total / max(taps, 1.0);
    return vec4<f32>(ao, ao, ao, 1.0);
}
"#;

/// Converts the persisted settings into the kernel generator's parameters.
pub fn ssao_params(config: &SsaoConfig) -> SsaoParams {
    SsaoParams {
        kernel_size: config.kernel_size as usize,
        noise_size: config.noise_size,
        radius: config.radius,
        bias: config.bias,
        power: config.power,
    }
}

struct SsaoTargets {
    raw: ColorTarget,
    blurred: ColorTarget,
    occlusion_bind_group: wgpu::BindGroup,
    blur_bind_group: wgpu::BindGroup,
}

pub struct SsaoPass {
    enabled: bool,
    params: SsaoParams,
    kernel: SsaoKernel,
    noise: Texture,
    occlusion_program: ShaderProgram,
    blur_program: ShaderProgram,
    occlusion_layout: wgpu::BindGroupLayout,
    blur_layout: wgpu::BindGroupLayout,
    occlusion_pipeline: wgpu::RenderPipeline,
    blur_pipeline: wgpu::RenderPipeline,
    targets: SsaoTargets,
}

impl SsaoPass {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        matrices: &MatricesBuffer,
        config: &SsaoConfig,
        gbuffer: &GBuffer,
    ) -> Result<Self, RenderError> {
        let params = ssao_params(config);
        let kernel = SsaoKernel::generate(&params);
        let texels = kernel.noise_texels();
        let noise = Texture::from_data(
            device,
            queue,
            &TextureData {
                label: "ssao-noise",
                data: bytemuck::cast_slice(&texels),
                width: kernel.noise_size,
                height: kernel.noise_size,
                format: wgpu::TextureFormat::Rgba32Float,
            },
            None,
            None,
        )?;

        let occlusion_decls = slots::wgsl_declarations(&OCCLUSION_SLOTS);
        let occlusion_program = ShaderProgram::build(
            device,
            &ProgramDesc {
                label: "ssao",
                sources: &[
                    MATRICES_BLOCK_SOURCE,
                    FULLSCREEN_VERTEX_SOURCE,
                    occlusion_decls.as_str(),
                    OCCLUSION_SHADER,
                ],
                vertex: "vs_fullscreen",
                fragment: Some("fs_ssao"),
            },
        )
        .require()?;
        let blur_decls = slots::wgsl_declarations(&BLUR_SLOTS);
        let mut blur_program = ShaderProgram::build(
            device,
            &ProgramDesc {
                label: "ssao-blur",
                sources: &[
                    MATRICES_BLOCK_SOURCE,
                    FULLSCREEN_VERTEX_SOURCE,
                    blur_decls.as_str(),
                    BLUR_SHADER,
                ],
                vertex: "vs_fullscreen",
                fragment: Some("fs_ssao_blur"),
            },
        )
        .require()?;
        blur_program.set_uniform("radius", config.blur_radius.min(8) as i32);

        let occlusion_layout = slots::bind_group_layout(device, "ssao-bgl", &OCCLUSION_SLOTS);
        let blur_layout = slots::bind_group_layout(device, "ssao-blur-bgl", &BLUR_SLOTS);
        let targets = [pass::opaque_target(SSAO_FORMAT)];
        let occlusion_pipeline = pass::create_pipeline(
            device,
            &occlusion_program,
            &PipelineDesc::fullscreen(
                "ssao-pipeline",
                &[matrices.layout(), occlusion_program.params_layout()?, &occlusion_layout],
                &targets,
            ),
        )?;
        let blur_pipeline = pass::create_pipeline(
            device,
            &blur_program,
            &PipelineDesc::fullscreen(
                "ssao-blur-pipeline",
                &[matrices.layout(), blur_program.params_layout()?, &blur_layout],
                &targets,
            ),
        )?;

        let targets = Self::create_targets(device, &occlusion_layout, &blur_layout, &noise, gbuffer)?;
        let mut ssao = Self {
            enabled: config.enabled,
            params,
            kernel,
            noise,
            occlusion_program,
            blur_program,
            occlusion_layout,
            blur_layout,
            occlusion_pipeline,
            blur_pipeline,
            targets,
        };
        ssao.upload_kernel(gbuffer.size());
        log::info!(
            "SSAO ready: {} samples, {}x{} noise",
            ssao.kernel.samples.len(),
            ssao.kernel.noise_size,
            ssao.kernel.noise_size
        );
        Ok(ssao)
    }

    fn create_targets(
        device: &wgpu::Device,
        occlusion_layout: &wgpu::BindGroupLayout,
        blur_layout: &wgpu::BindGroupLayout,
        noise: &Texture,
        gbuffer: &GBuffer,
    ) -> Result<SsaoTargets, RenderError> {
        let (width, height) = gbuffer.size();
        let raw = ColorTarget::new(device, "ssao-raw", width, height, SSAO_FORMAT);
        let blurred = ColorTarget::new(device, "ssao-blurred", width, height, SSAO_FORMAT);
        let occlusion_bind_group = slots::bind_group(
            device,
            "ssao-bg",
            occlusion_layout,
            &OCCLUSION_SLOTS,
            &[
                (SamplerSlot::GBufferPosition, SlotResource::View(&gbuffer.position.view)),
                (SamplerSlot::GBufferNormal, SlotResource::View(&gbuffer.normal.view)),
                (SamplerSlot::SsaoNoise, SlotResource::View(&noise.view)),
            ],
        )?;
        let blur_bind_group = slots::bind_group(
            device,
            "ssao-blur-bg",
            blur_layout,
            &BLUR_SLOTS,
            &[(SamplerSlot::SsaoRaw, SlotResource::View(&raw.view))],
        )?;
        Ok(SsaoTargets {
            raw,
            blurred,
            occlusion_bind_group,
            blur_bind_group,
        })
    }

    fn upload_kernel(&mut self, screen_size: (u32, u32)) {
        let uniform = self.kernel.to_uniform(&self.params, screen_size);
        self.occlusion_program
            .set_uniform_raw("samples", bytemuck::cast_slice(&uniform.samples));
        self.occlusion_program.set_uniform("settings", uniform.params);
        self.occlusion_program.set_uniform("noise_scale", uniform.noise_scale);
    }

    /// Recreate the targets after the G-buffer was resized.
    pub fn resize(&mut self, device: &wgpu::Device, gbuffer: &GBuffer) -> Result<(), RenderError> {
        self.targets = Self::create_targets(
            device,
            &self.occlusion_layout,
            &self.blur_layout,
            &self.noise,
            gbuffer,
        )?;
        self.upload_kernel(gbuffer.size());
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn kernel(&self) -> &SsaoKernel {
        &self.kernel
    }

    /// Unblurred occlusion.
    pub fn raw(&self) -> &ColorTarget {
        &self.targets.raw
    }

    /// Blurred occlusion read by the lighting pass.
    pub fn output(&self) -> &ColorTarget {
        &self.targets.blurred
    }

    /// Estimate occlusion into the raw target.
    pub fn record_occlusion(
        &mut self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        matrices: &MatricesBuffer,
    ) {
        self.occlusion_program.flush(queue);
        let attachment = [pass::clear_attachment(&self.targets.raw.view, wgpu::Color::WHITE)];
        let mut rpass = pass::begin_pass(encoder, "ssao-pass", &attachment, None);
        rpass.set_pipeline(&self.occlusion_pipeline);
        matrices.bind(&mut rpass);
        self.occlusion_program.bind(&mut rpass);
        rpass.set_bind_group(TEXTURES_GROUP, &self.targets.occlusion_bind_group, &[]);
        rpass.draw(0..3, 0..1);
    }

    /// Blur the raw target into the output, or clear the output to 1.0 when disabled.
    pub fn record_blur(
        &mut self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        matrices: &MatricesBuffer,
    ) {
        let attachment = [pass::clear_attachment(&self.targets.blurred.view, wgpu::Color::WHITE)];
        let mut rpass = pass::begin_pass(encoder, "ssao-blur-pass", &attachment, None);
        if !self.enabled {
            return;
        }
        self.blur_program.flush(queue);
        rpass.set_pipeline(&self.blur_pipeline);
        matrices.bind(&mut rpass);
        self.blur_program.bind(&mut rpass);
        rpass.set_bind_group(TEXTURES_GROUP, &self.targets.blur_bind_group, &[]);
        rpass.draw(0..3, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraProvider, FlyCamera};
    use crate::gbuffer::{GeometryPass, MeshDraw};
    use crate::gpu::create_test_device_queue;
    use crate::mesh::{InstanceBuffer, InstanceData, Material, MaterialLayout, MeshData, RenderableMesh};
    use crate::readback::read_texture_f16_channels;
    use crate::shader::reflect;
    use crate::texture::TextureCache;
    use glam::{Mat4, Vec3};

    #[test]
    fn test_shaders_validate() {
        let occlusion_decls = slots::wgsl_declarations(&OCCLUSION_SLOTS);
        let blur_decls = slots::wgsl_declarations(&BLUR_SLOTS);
        for (decls, body, entry) in [
            (occlusion_decls.as_str(), OCCLUSION_SHADER, "fs_ssao"),
            (blur_decls.as_str(), BLUR_SHADER, "fs_ssao_blur"),
        ] {
            let result = reflect(&ProgramDesc {
                label: "ssao",
                sources: &[MATRICES_BLOCK_SOURCE, FULLSCREEN_VERTEX_SOURCE, decls, body],
                vertex: "vs_fullscreen",
                fragment: Some(entry),
            });
            assert!(result.is_ok(), "{:?}", result.err());
        }
    }

    #[test]
    fn test_params_from_config() {
        let config = SsaoConfig {
            kernel_size: 16,
            radius: 0.75,
            ..Default::default()
        };
        let params = ssao_params(&config);
        assert_eq!(params.kernel_size, 16);
        assert_eq!(params.radius, 0.75);
        assert_eq!(params.noise_size, config.noise_size);
    }

    /// Render a wall facing the camera, optionally with a unit cube resting on
    /// it whose left edge sits `occluder_edge` to the right of the wall origin.
    /// Returns the raw occlusion and view-space position of every wall pixel.
    fn wall_occlusion(occluder_edge: Option<f32>) -> Option<Vec<(f32, [f32; 4])>> {
        let (device, queue) = create_test_device_queue()?;
        let (width, height) = (64u32, 64u32);
        let mut matrices = MatricesBuffer::new(&device);
        let materials = MaterialLayout::new(&device);
        let cache = TextureCache::new(&device, &queue).unwrap();
        let gbuffer = GBuffer::new(&device, width, height).unwrap();
        let mut geometry = GeometryPass::new(&device, &matrices, &materials).unwrap();
        let mut ssao =
            SsaoPass::new(&device, &queue, &matrices, &SsaoConfig::default(), &gbuffer).unwrap();

        let wall = RenderableMesh::new(&device, "wall", &MeshData::quad(), Material::default(), &materials, &cache);
        let cube = RenderableMesh::new(&device, "cube", &MeshData::cube(), Material::default(), &materials, &cache);
        let mut wall_instances = InstanceBuffer::new(&device, 1);
        wall_instances.write(&device, &queue, &[InstanceData::new(Mat4::from_scale(Vec3::splat(10.0)))]);
        let mut cube_instances = InstanceBuffer::new(&device, 1);
        if let Some(edge) = occluder_edge {
            cube_instances.write(
                &device,
                &queue,
                &[InstanceData::new(Mat4::from_translation(Vec3::new(edge + 0.5, 0.0, 0.5)))],
            );
        }

        let camera = FlyCamera::looking_at(Vec3::new(0.0, 0.0, 3.0), Vec3::ZERO);
        matrices.setup_scene(&queue, camera.view_matrix(), camera.projection_matrix(1.0), camera.position());
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor::default());
        geometry.record(
            &queue,
            &mut encoder,
            &gbuffer,
            &matrices,
            &[
                MeshDraw { mesh: &wall, instances: &wall_instances },
                MeshDraw { mesh: &cube, instances: &cube_instances },
            ],
        );
        ssao.record_occlusion(&queue, &mut encoder, &matrices);
        ssao.record_blur(&queue, &mut encoder, &matrices);
        queue.submit(std::iter::once(encoder.finish()));

        let ao = read_texture_f16_channels(&device, &queue, &ssao.raw().texture, 0, 0);
        let positions = crate::readback::read_texture_rgba16f(&device, &queue, &gbuffer.position.texture, 0, 0);
        // Wall pixels sit at view z = -3.
        Some(
            ao.into_iter()
                .zip(positions)
                .filter(|(_, p)| p[3] == 1.0 && (p[2] + 3.0).abs() < 0.05)
                .collect(),
        )
    }

    /// Mean occlusion over the wall just left of the origin.
    fn patch_mean(pixels: &[(f32, [f32; 4])]) -> f32 {
        let patch: Vec<f32> = pixels
            .iter()
            .filter(|(_, p)| (-0.2..=0.0).contains(&p[0]) && p[1].abs() < 0.2)
            .map(|(a, _)| *a)
            .collect();
        assert!(!patch.is_empty());
        patch.iter().sum::<f32>() / patch.len() as f32
    }

    #[test]
    fn test_flat_wall_is_unoccluded() {
        let Some(pixels) = wall_occlusion(None) else {
            return;
        };
        assert!(!pixels.is_empty());
        let min = pixels.iter().map(|(a, _)| *a).fold(1.0, f32::min);
        assert!(min > 0.95, "min {min}");
    }

    #[test]
    fn test_nearby_occluder_darkens_wall() {
        let Some(pixels) = wall_occlusion(Some(0.05)) else {
            return;
        };
        let min = pixels.iter().map(|(a, _)| *a).fold(1.0, f32::min);
        assert!(min < 0.9, "min {min}");
    }

    #[test]
    fn test_occlusion_deepens_as_occluder_approaches() {
        // All edges lie inside the default 0.5 sample radius.
        let mut means = Vec::new();
        for edge in [0.35, 0.2, 0.05] {
            let Some(pixels) = wall_occlusion(Some(edge)) else {
                return;
            };
            means.push(patch_mean(&pixels));
        }
        assert!(means[0] < 1.0, "{means:?}");
        assert!(means[0] > means[1] && means[1] > means[2], "{means:?}");
    }

    #[test]
    fn test_noise_scale_tracks_target_size() {
        let Some((device, queue)) = create_test_device_queue() else {
            return;
        };
        let matrices = MatricesBuffer::new(&device);
        let gbuffer = GBuffer::new(&device, 32, 16).unwrap();
        let mut ssao =
            SsaoPass::new(&device, &queue, &matrices, &SsaoConfig::default(), &gbuffer).unwrap();
        let noise = ssao.kernel().noise_size as f32;
        let read_scale = |ssao: &mut SsaoPass| {
            let location = ssao.occlusion_program.uniform_location("noise_scale").unwrap();
            let bytes = ssao.occlusion_program.uniforms().unwrap().bytes();
            let start = location.offset as usize;
            bytemuck::pod_read_unaligned::<[f32; 2]>(&bytes[start..start + 8])
        };
        assert_eq!(read_scale(&mut ssao), [32.0 / noise, 16.0 / noise]);

        let gbuffer = GBuffer::new(&device, 48, 24).unwrap();
        ssao.resize(&device, &gbuffer).unwrap();
        assert_eq!(read_scale(&mut ssao), [48.0 / noise, 24.0 / noise]);
    }

    #[test]
    fn test_occlusion_shader_reads_noise_scale() {
        let decls = slots::wgsl_declarations(&OCCLUSION_SLOTS);
        let source = [MATRICES_BLOCK_SOURCE, FULLSCREEN_VERTEX_SOURCE, decls.as_str(), OCCLUSION_SHADER].join("\n");
        let module = naga::front::wgsl::parse_str(&source).unwrap();
        let (params, var) = module
            .global_variables
            .iter()
            .find(|(_, var)| var.name.as_deref() == Some("params"))
            .unwrap();
        let naga::TypeInner::Struct { members, .. } = &module.types[var.ty].inner else {
            panic!("params is not a struct");
        };
        let index = members
            .iter()
            .position(|m| m.name.as_deref() == Some("noise_scale"))
            .unwrap() as u32;
        let entry = module.entry_points.iter().find(|e| e.name == "fs_ssao").unwrap();
        let reads = entry.function.expressions.iter().any(|(_, expr)| match expr {
            naga::Expression::AccessIndex { base, index: i } => {
                *i == index
                    && matches!(entry.function.expressions[*base], naga::Expression::GlobalVariable(g) if g == params)
            }
            _ => false,
        });
        assert!(reads, "fs_ssao never reads params.noise_scale");
    }

    #[test]
    fn test_disabled_output_is_white() {
        let Some((device, queue)) = create_test_device_queue() else {
            return;
        };
        let matrices = MatricesBuffer::new(&device);
        let gbuffer = GBuffer::new(&device, 16, 16).unwrap();
        let config = SsaoConfig {
            enabled: false,
            ..Default::default()
        };
        let mut ssao = SsaoPass::new(&device, &queue, &matrices, &config, &gbuffer).unwrap();
        assert!(!ssao.is_enabled());
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor::default());
        ssao.record_blur(&queue, &mut encoder, &matrices);
        queue.submit(std::iter::once(encoder.finish()));
        let ao = read_texture_f16_channels(&device, &queue, &ssao.output().texture, 0, 0);
        assert!(ao.iter().all(|a| *a == 1.0));
    }
}
