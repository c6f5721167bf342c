//! The G-buffer and the geometry pass that fills it.
//!
//! Attachment layout (all view space, 24 bytes per pixel):
//!
//! | location | target        | format        | contents                                  |
//! |----------|---------------|---------------|-------------------------------------------|
//! | 0        | `position`    | `Rgba16Float` | xyz = view position, w = 1 (0 = nothing)  |
//! | 1        | `normal`      | `Rgba16Float` | xyz = view normal                         |
//! | 2        | `albedo_spec` | `Rgba8Unorm`  | rgb = linear albedo, a = specular         |
//! | 3        | `material`    | `Rgba8Unorm`  | r = metallic, g = roughness, b = AO       |
//!
//! Pixels no geometry covers keep the clear value, so `position.w == 0`
//! marks background for SSAO and lighting.

use crate::error::RenderError;
use crate::mesh::{InstanceBuffer, InstanceData, MATERIAL_BLOCK_SOURCE, MESH_INPUT_SOURCE, MaterialLayout, RenderableMesh, Vertex};
use crate::pass::{self, PipelineDesc};
use crate::shader::{ProgramDesc, ShaderProgram, MATRICES_GROUP};
use crate::target::{ColorTarget, DepthBuffer, validate_attachments};
use crate::uniforms::{MATRICES_BLOCK_NAME, MATRICES_BLOCK_SOURCE, MatricesBuffer};

pub const POSITION_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const NORMAL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const ALBEDO_SPEC_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
pub const MATERIAL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Multi-attachment geometry target plus its depth buffer.
pub struct GBuffer {
    pub position: ColorTarget,
    pub normal: ColorTarget,
    pub albedo_spec: ColorTarget,
    pub material: ColorTarget,
    pub depth: DepthBuffer,
}

impl GBuffer {
    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Result<Self, RenderError> {
        let gbuffer = Self {
            position: ColorTarget::new(device, "gbuffer-position", width, height, POSITION_FORMAT),
            normal: ColorTarget::new(device, "gbuffer-normal", width, height, NORMAL_FORMAT),
            albedo_spec: ColorTarget::new(
                device,
                "gbuffer-albedo-spec",
                width,
                height,
                ALBEDO_SPEC_FORMAT,
            ),
            material: ColorTarget::new(device, "gbuffer-material", width, height, MATERIAL_FORMAT),
            depth: DepthBuffer::new(device, "gbuffer-depth", width, height),
        };
        validate_attachments(
            "gbuffer",
            &[
                &gbuffer.position.texture,
                &gbuffer.normal.texture,
                &gbuffer.albedo_spec.texture,
                &gbuffer.material.texture,
                &gbuffer.depth.texture,
            ],
        )?;
        log::info!("Created G-buffer {width}x{height}");
        Ok(gbuffer)
    }

    pub fn size(&self) -> (u32, u32) {
        (self.depth.width(), self.depth.height())
    }

    pub fn color_targets() -> [Option<wgpu::ColorTargetState>; 4] {
        [
            pass::opaque_target(POSITION_FORMAT),
            pass::opaque_target(NORMAL_FORMAT),
            pass::opaque_target(ALBEDO_SPEC_FORMAT),
            pass::opaque_target(MATERIAL_FORMAT),
        ]
    }

    fn clear_attachments(&self) -> [Option<wgpu::RenderPassColorAttachment<'_>>; 4] {
        [
            Some(self.position.attachment(wgpu::Color::TRANSPARENT)),
            Some(self.normal.attachment(wgpu::Color::TRANSPARENT)),
            Some(self.albedo_spec.attachment(wgpu::Color::TRANSPARENT)),
            Some(self.material.attachment(wgpu::Color::TRANSPARENT)),
        ]
    }
}

const GEOMETRY_SHADER: &str = r#"
struct GeometryParams {
    normal_strength: f32,
};
@group(1) @binding(0) var<uniform> params: GeometryParams;

struct GeometryOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) view_position: vec3<f32>,
    @location(1) view_normal: vec3<f32>,
    @location(2) view_tangent: vec4<f32>,
    @location(3) uv: vec2<f32>,
    @location(4) tint: vec4<f32>,
};

@vertex
fn vs_main(v: VertexInput, i: InstanceInput) -> GeometryOut {
    let model = instance_model(i);
    let view3 = mat3x3<f32>(matrices.view[0].xyz, matrices.view[1].xyz, matrices.view[2].xyz);
    let model3 = mat3x3<f32>(model[0].xyz, model[1].xyz, model[2].xyz);
    let view_position = matrices.view * model * vec4<f32>(v.position, 1.0);

    var out: GeometryOut;
    out.clip = matrices.projection * view_position;
    out.view_position = view_position.xyz;
    out.view_normal = view3 * (instance_normal(i) * v.normal);
    out.view_tangent = vec4<f32>(view3 * (model3 * v.tangent.xyz), v.tangent.w);
    out.uv = v.uv;
    out.tint = i.tint;
    return out;
}

struct GBufferOut {
    @location(0) position: vec4<f32>,
    @location(1) normal: vec4<f32>,
    @location(2) albedo_spec: vec4<f32>,
    @location(3) material: vec4<f32>,
};

fn mapped(value: f32, sampled: f32, assigned: u32) -> f32 {
    return value * select(1.0, sampled, assigned != 0u);
}

@fragment
fn fs_main(in: GeometryOut) -> GBufferOut {
    let albedo = textureSample(albedo_map, material_sampler, in.uv).rgb
        * material.albedo_factor.rgb * in.tint.rgb;
    let metallic = mapped(material.params.x, textureSample(metallic_map, material_sampler, in.uv).r, material.flags.x);
    let roughness = mapped(material.params.y, textureSample(roughness_map, material_sampler, in.uv).r, material.flags.y);
    let ao = mapped(material.params.z, textureSample(ao_map, material_sampler, in.uv).r, material.flags.z);
    let specular = mapped(material.params.w, textureSample(specular_map, material_sampler, in.uv).r, material.flags.w);

    let n = normalize(in.view_normal);
    let t = normalize(in.view_tangent.xyz - n * dot(n, in.view_tangent.xyz));
    let b = cross(n, t) * in.view_tangent.w;
    let sampled = textureSample(normal_map, material_sampler, in.uv).xyz * 2.0 - 1.0;
    let tangent_normal = mix(vec3<f32>(0.0, 0.0, 1.0), sampled, params.normal_strength);
    let normal = normalize(mat3x3<f32>(t, b, n) * tangent_normal);

    var out: GBufferOut;
    out.position = vec4<f32>(in.view_position, 1.0);
    out.normal = vec4<f32>(normal, 1.0);
    out.albedo_spec = vec4<f32>(albedo, specular);
    out.material = vec4<f32>(metallic, roughness, ao, 1.0);
    return out;
}
"#;

/// One mesh and the instances to draw it with.
pub struct MeshDraw<'a> {
    pub mesh: &'a RenderableMesh,
    pub instances: &'a InstanceBuffer,
}

/// Renders opaque geometry into the [`GBuffer`].
pub struct GeometryPass {
    program: ShaderProgram,
    pipeline: wgpu::RenderPipeline,
}

impl GeometryPass {
    pub fn new(
        device: &wgpu::Device,
        matrices: &MatricesBuffer,
        materials: &MaterialLayout,
    ) -> Result<Self, RenderError> {
        let mut program = ShaderProgram::build(
            device,
            &ProgramDesc {
                label: "geometry",
                sources: &[
                    MATRICES_BLOCK_SOURCE,
                    MESH_INPUT_SOURCE,
                    MATERIAL_BLOCK_SOURCE,
                    GEOMETRY_SHADER,
                ],
                vertex: "vs_main",
                fragment: Some("fs_main"),
            },
        )
        .require()?;
        program.set_uniform_block_binding(MATRICES_BLOCK_NAME, MATRICES_GROUP)?;
        program.set_uniform("normal_strength", 1.0f32);

        let targets = GBuffer::color_targets();
        let pipeline = pass::create_pipeline(
            device,
            &program,
            &PipelineDesc {
                label: "geometry-pipeline",
                layouts: &[matrices.layout(), program.params_layout()?, materials.layout()],
                vertex_buffers: &[Vertex::layout(), InstanceData::layout()],
                targets: &targets,
                depth_stencil: Some(DepthBuffer::state(true, DepthBuffer::COMPARE_FUNCTION)),
                primitive: wgpu::PrimitiveState {
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: Some(wgpu::Face::Back),
                    ..Default::default()
                },
            },
        )?;
        Ok(Self { program, pipeline })
    }

    /// 0 ignores normal maps, 1 applies them fully.
    pub fn set_normal_strength(&mut self, strength: f32) {
        self.program.set_uniform("normal_strength", strength.clamp(0.0, 1.0));
    }

    /// Clear the G-buffer and draw every opaque mesh into it.
    pub fn record(
        &mut self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        gbuffer: &GBuffer,
        matrices: &MatricesBuffer,
        draws: &[MeshDraw<'_>],
    ) {
        self.program.flush(queue);
        let attachments = gbuffer.clear_attachments();
        let mut rpass = pass::begin_pass(
            encoder,
            "geometry-pass",
            &attachments,
            Some(gbuffer.depth.clear_attachment()),
        );
        rpass.set_pipeline(&self.pipeline);
        matrices.bind(&mut rpass);
        self.program.bind(&mut rpass);
        for draw in draws.iter().filter(|d| !d.instances.is_empty()) {
            draw.mesh.bind(&mut rpass);
            draw.mesh.bind_material(&mut rpass);
            draw.instances.bind(&mut rpass);
            draw.mesh.draw(&mut rpass, 0..draw.instances.len() as u32);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraProvider, FlyCamera};
    use crate::gpu::create_test_device_queue;
    use crate::mesh::{Material, MeshData};
    use crate::readback::{read_texture, read_texture_rgba16f};
    use crate::shader::reflect;
    use crate::texture::TextureCache;
    use glam::{Mat4, Vec3};

    #[test]
    fn test_attachment_bytes_fit_limit() {
        let bytes: u32 = GBuffer::color_targets()
            .iter()
            .flatten()
            .map(|t| t.format.target_pixel_byte_cost().unwrap_or(0))
            .sum();
        assert!(bytes <= wgpu::Limits::default().max_color_attachment_bytes_per_sample);
    }

    #[test]
    fn test_geometry_shader_validates() {
        let reflection = reflect(&ProgramDesc {
            label: "geometry",
            sources: &[
                MATRICES_BLOCK_SOURCE,
                MESH_INPUT_SOURCE,
                MATERIAL_BLOCK_SOURCE,
                GEOMETRY_SHADER,
            ],
            vertex: "vs_main",
            fragment: Some("fs_main"),
        });
        assert!(reflection.is_ok(), "{:?}", reflection.err());
    }

    #[test]
    fn test_view_position_round_trip() {
        let Some((device, queue)) = create_test_device_queue() else {
            return;
        };
        let (width, height) = (64, 64);
        let mut matrices = MatricesBuffer::new(&device);
        let materials = MaterialLayout::new(&device);
        let cache = TextureCache::new(&device, &queue).unwrap();
        let gbuffer = GBuffer::new(&device, width, height).unwrap();
        let mut geometry = GeometryPass::new(&device, &matrices, &materials).unwrap();

        let mesh = RenderableMesh::new(
            &device,
            "cube",
            &MeshData::cube(),
            Material {
                albedo_factor: Vec3::new(0.8, 0.4, 0.2),
                ..Default::default()
            },
            &materials,
            &cache,
        );
        let mut instances = InstanceBuffer::new(&device, 1);
        instances.write(&device, &queue, &[InstanceData::new(Mat4::IDENTITY)]);

        let camera = FlyCamera::looking_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO);
        let view = camera.view_matrix();
        matrices.setup_scene(&queue, view, camera.projection_matrix(1.0), camera.position());

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor::default());
        geometry.record(
            &queue,
            &mut encoder,
            &gbuffer,
            &matrices,
            &[MeshDraw {
                mesh: &mesh,
                instances: &instances,
            }],
        );
        queue.submit(std::iter::once(encoder.finish()));

        let positions = read_texture_rgba16f(&device, &queue, &gbuffer.position.texture, 0, 0);
        let center = positions[(height / 2 * width + width / 2) as usize];
        // Front face of the unit cube is at z = 0.5, 4.5 units in front of the camera.
        let expected = view.transform_point3(Vec3::new(0.0, 0.0, 0.5));
        assert_eq!(center[3], 1.0);
        assert!((center[2] - expected.z).abs() < 0.01, "{center:?}");
        assert!(center[0].abs() < 0.1 && center[1].abs() < 0.1);
        // Corner pixel is background.
        assert_eq!(positions[0][3], 0.0);

        let normals = read_texture_rgba16f(&device, &queue, &gbuffer.normal.texture, 0, 0);
        let normal = normals[(height / 2 * width + width / 2) as usize];
        assert!((normal[2] - 1.0).abs() < 0.01);

        let albedo = read_texture(&device, &queue, &gbuffer.albedo_spec.texture, 0, 0);
        let i = ((height / 2 * width + width / 2) * 4) as usize;
        assert!((i32::from(albedo[i]) - 204).abs() <= 2);
        assert!((i32::from(albedo[i + 1]) - 102).abs() <= 2);
    }
}
