//! Forward pass over the lit HDR target: light markers, the skybox and
//! alpha-blended geometry.
//!
//! Runs after the G-buffer depth has been copied into the forward depth
//! buffer, so everything drawn here is depth-tested against the deferred
//! scene. The skybox sits exactly on the reverse-Z far plane and only fills
//! samples nothing else has covered.

use bytemuck::Zeroable;
use glam::{Mat4, Vec3};
use mental_lighting::{DirectionalLight, LightSet};

use crate::error::RenderError;
use crate::gbuffer::MeshDraw;
use crate::ibl::IblMaps;
use crate::lighting::{DEFAULT_SHININESS, light_structs_source};
use crate::mesh::{
    InstanceBuffer, InstanceData, MATERIAL_BLOCK_SOURCE, MESH_INPUT_SOURCE, Material, MaterialLayout,
    MeshData, RenderableMesh, Vertex,
};
use crate::pass::{self, FULLSCREEN_VERTEX_SOURCE, PipelineDesc};
use crate::shader::{ProgramDesc, ShaderProgram, TEXTURES_GROUP};
use crate::slots::{self, SamplerSlot, SlotResource};
use crate::target::{DepthBuffer, HDR_FORMAT, HdrTarget};
use crate::texture::TextureCache;
use crate::uniforms::{MATRICES_BLOCK_SOURCE, MatricesBuffer};

/// Edge length of a light marker cube.
pub const MARKER_SCALE: f32 = 0.1;

const SKYBOX_SLOTS: [SamplerSlot; 2] = [SamplerSlot::Environment, SamplerSlot::LinearSampler];

const MARKER_SHADER: &str = r#"
struct MarkerOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) color: vec3<f32>,
};

@vertex
fn vs_marker(v: VertexInput, i: InstanceInput) -> MarkerOut {
    var out: MarkerOut;
    out.clip = matrices.view_projection * instance_model(i) * vec4<f32>(v.position, 1.0);
    out.color = i.tint.rgb;
    return out;
}

struct ForwardOut {
    @location(0) color: vec4<f32>,
    @location(1) bright: vec4<f32>,
};

@fragment
fn fs_marker(in: MarkerOut) -> ForwardOut {
    var out: ForwardOut;
    out.color = vec4<f32>(in.color, 1.0);
    out.bright = vec4<f32>(in.color, 1.0);
    return out;
}
"#;

const SKYBOX_SHADER: &str = r#"
struct SkyboxParams {
    lod: f32,
    intensity: f32,
};
@group(1) @binding(0) var<uniform> params: SkyboxParams;

struct SkyboxOut {
    @location(0) color: vec4<f32>,
    @location(1) bright: vec4<f32>,
};

@fragment
fn fs_skybox(in: FullscreenOut) -> SkyboxOut {
    let ndc = vec2<f32>(in.uv.x * 2.0 - 1.0, 1.0 - in.uv.y * 2.0);
    let view = matrices.inverse_projection * vec4<f32>(ndc, 1.0, 1.0);
    let dir = (matrices.inverse_view * vec4<f32>(view.xyz / view.w, 0.0)).xyz;
    let color = textureSampleLevel(environment_map, linear_sampler, normalize(dir), params.lod).rgb;
    var out: SkyboxOut;
    out.color = vec4<f32>(color * params.intensity, 1.0);
    out.bright = vec4<f32>(0.0);
    return out;
}
"#;

const TRANSPARENT_SHADER: &str = r#"
struct TransparentParams {
    directional: DirectionalLight,
    // x = shininess
    settings: vec4<f32>,
};
@group(1) @binding(0) var<uniform> params: TransparentParams;

struct TransparentOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) world_position: vec3<f32>,
    @location(1) world_normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
    @location(3) tint: vec4<f32>,
};

@vertex
fn vs_transparent(v: VertexInput, i: InstanceInput) -> TransparentOut {
    let world = instance_model(i) * vec4<f32>(v.position, 1.0);
    var out: TransparentOut;
    out.clip = matrices.view_projection * world;
    out.world_position = world.xyz;
    out.world_normal = instance_normal(i) * v.normal;
    out.uv = v.uv;
    out.tint = i.tint;
    return out;
}

struct ForwardOut {
    @location(0) color: vec4<f32>,
    @location(1) bright: vec4<f32>,
};

@fragment
fn fs_transparent(in: TransparentOut, @builtin(front_facing) front: bool) -> ForwardOut {
    let texel = textureSample(albedo_map, material_sampler, in.uv);
    let albedo = texel.rgb * material.albedo_factor.rgb * in.tint.rgb;
    let alpha = texel.a * material.albedo_factor.a * in.tint.a;
    var n = normalize(in.world_normal);
    if !front {
        n = -n;
    }
    let v = normalize(matrices.camera_position.xyz - in.world_position);

    let light = params.directional;
    var color = vec3<f32>(0.0);
    if light.direction_enabled.w != 0.0 {
        let l = normalize(-light.direction_enabled.xyz);
        let h = normalize(l + v);
        let diffuse = max(dot(n, l), 0.0) * light.diffuse_intensity.rgb * light.diffuse_intensity.w;
        let specular = pow(max(dot(n, h), 0.0), params.settings.x) * light.specular.rgb * material.params.w;
        color = light.ambient.rgb * albedo + diffuse * albedo + specular;
    } else {
        color = albedo;
    }

    var out: ForwardOut;
    out.color = vec4<f32>(color, alpha);
    out.bright = vec4<f32>(0.0, 0.0, 0.0, alpha);
    return out;
}
"#;

/// Sort `items` so the farthest from `camera` comes first.
pub fn sort_back_to_front<T>(camera: Vec3, items: &mut [T], position: impl Fn(&T) -> Vec3) {
    items.sort_by(|a, b| {
        let da = position(a).distance_squared(camera);
        let db = position(b).distance_squared(camera);
        db.total_cmp(&da)
    });
}

/// A transparent mesh with the CPU copy of its instances, used for sorting.
pub struct TransparentDraw<'a> {
    pub draw: MeshDraw<'a>,
    pub instances: &'a [InstanceData],
}

pub struct ForwardPass {
    marker_mesh: RenderableMesh,
    markers: InstanceBuffer,
    show_markers: bool,
    // Kept alive for its pipeline.
    _marker_program: ShaderProgram,
    marker_pipeline: wgpu::RenderPipeline,
    skybox_program: ShaderProgram,
    skybox_pipeline: wgpu::RenderPipeline,
    skybox_bind_group: wgpu::BindGroup,
    // Kept alive with the bind group.
    _skybox_sampler: wgpu::Sampler,
    transparent_program: ShaderProgram,
    transparent_pipeline: wgpu::RenderPipeline,
}

impl ForwardPass {
    pub fn new(
        device: &wgpu::Device,
        matrices: &MatricesBuffer,
        materials: &MaterialLayout,
        textures: &TextureCache,
        ibl: &IblMaps,
    ) -> Result<Self, RenderError> {
        let targets = HdrTarget::color_targets();
        let depth_test = || Some(DepthBuffer::state(false, DepthBuffer::COMPARE_FUNCTION));

        let marker_program = ShaderProgram::build(
            device,
            &ProgramDesc {
                label: "light-marker",
                sources: &[MATRICES_BLOCK_SOURCE, MESH_INPUT_SOURCE, MARKER_SHADER],
                vertex: "vs_marker",
                fragment: Some("fs_marker"),
            },
        )
        .require()?;
        let marker_pipeline = pass::create_pipeline(
            device,
            &marker_program,
            &PipelineDesc {
                label: "light-marker-pipeline",
                layouts: &[matrices.layout()],
                vertex_buffers: &[Vertex::layout(), InstanceData::layout()],
                targets: &targets,
                depth_stencil: Some(DepthBuffer::state(true, DepthBuffer::COMPARE_FUNCTION)),
                primitive: wgpu::PrimitiveState {
                    cull_mode: Some(wgpu::Face::Back),
                    ..Default::default()
                },
            },
        )?;

        let skybox_decls = slots::wgsl_declarations(&SKYBOX_SLOTS);
        let mut skybox_program = ShaderProgram::build(
            device,
            &ProgramDesc {
                label: "skybox",
                sources: &[
                    MATRICES_BLOCK_SOURCE,
                    FULLSCREEN_VERTEX_SOURCE,
                    skybox_decls.as_str(),
                    SKYBOX_SHADER,
                ],
                vertex: "vs_fullscreen",
                fragment: Some("fs_skybox"),
            },
        )
        .require()?;
        skybox_program.set_uniform("lod", 0.0f32);
        skybox_program.set_uniform("intensity", 1.0f32);
        let skybox_layout = slots::bind_group_layout(device, "skybox-bgl", &SKYBOX_SLOTS);
        let skybox_pipeline = pass::create_pipeline(
            device,
            &skybox_program,
            &PipelineDesc {
                depth_stencil: depth_test(),
                ..PipelineDesc::fullscreen(
                    "skybox-pipeline",
                    &[matrices.layout(), skybox_program.params_layout()?, &skybox_layout],
                    &targets,
                )
            },
        )?;
        let skybox_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("skybox-sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Linear,
            ..Default::default()
        });
        let skybox_bind_group = slots::bind_group(
            device,
            "skybox-bg",
            &skybox_layout,
            &SKYBOX_SLOTS,
            &[
                (SamplerSlot::Environment, SlotResource::View(&ibl.environment.view)),
                (SamplerSlot::LinearSampler, SlotResource::Sampler(&skybox_sampler)),
            ],
        )?;

        let structs = light_structs_source();
        let mut transparent_program = ShaderProgram::build(
            device,
            &ProgramDesc {
                label: "transparent",
                sources: &[
                    MATRICES_BLOCK_SOURCE,
                    MESH_INPUT_SOURCE,
                    MATERIAL_BLOCK_SOURCE,
                    structs.as_str(),
                    TRANSPARENT_SHADER,
                ],
                vertex: "vs_transparent",
                fragment: Some("fs_transparent"),
            },
        )
        .require()?;
        transparent_program.set_uniform("settings", [DEFAULT_SHININESS, 0.0, 0.0, 0.0]);
        let blended = |format| {
            Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })
        };
        let blended_targets = [blended(HDR_FORMAT), blended(HDR_FORMAT)];
        let transparent_pipeline = pass::create_pipeline(
            device,
            &transparent_program,
            &PipelineDesc {
                label: "transparent-pipeline",
                layouts: &[
                    matrices.layout(),
                    transparent_program.params_layout()?,
                    materials.layout(),
                ],
                vertex_buffers: &[Vertex::layout(), InstanceData::layout()],
                targets: &blended_targets,
                depth_stencil: depth_test(),
                primitive: wgpu::PrimitiveState::default(),
            },
        )?;

        let marker_mesh = RenderableMesh::new(
            device,
            "light-marker",
            &MeshData::cube(),
            Material::default(),
            materials,
            textures,
        );
        Ok(Self {
            marker_mesh,
            markers: InstanceBuffer::new(device, mental_lighting::MAX_POINT_LIGHTS),
            show_markers: true,
            _marker_program: marker_program,
            marker_pipeline,
            skybox_program,
            skybox_pipeline,
            skybox_bind_group,
            _skybox_sampler: skybox_sampler,
            transparent_program,
            transparent_pipeline,
        })
    }

    pub fn set_show_markers(&mut self, show: bool) {
        self.show_markers = show;
    }

    /// Sample a blurrier environment mip behind the scene.
    pub fn set_skybox_lod(&mut self, lod: f32) {
        self.skybox_program.set_uniform("lod", lod.max(0.0));
    }

    /// Place one marker at every point light, colored by its radiance.
    pub fn update(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, lights: &LightSet) {
        let markers: Vec<InstanceData> = lights
            .point_lights()
            .iter()
            .map(|light| {
                let model = Mat4::from_translation(light.position) * Mat4::from_scale(Vec3::splat(MARKER_SCALE));
                InstanceData::new(model).with_tint((light.color * light.intensity).extend(1.0))
            })
            .collect();
        self.markers.write(device, queue, &markers);
        self.set_directional(lights.directional.as_ref());
    }

    fn set_directional(&mut self, light: Option<&DirectionalLight>) {
        let gpu = light.map(DirectionalLight::to_gpu).unwrap_or_else(Zeroable::zeroed);
        self.transparent_program
            .set_uniform_raw("directional", bytemuck::bytes_of(&gpu));
    }

    /// Draw markers, then the skybox, then transparent instances back to front.
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &mut self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        hdr: &HdrTarget,
        depth: &DepthBuffer,
        matrices: &MatricesBuffer,
        camera_position: Vec3,
        transparent: &[TransparentDraw<'_>],
    ) {
        self.skybox_program.flush(queue);
        self.transparent_program.flush(queue);

        let mut order: Vec<(usize, u32, Vec3)> = transparent
            .iter()
            .enumerate()
            .flat_map(|(object, t)| {
                t.instances
                    .iter()
                    .take(t.draw.instances.len())
                    .enumerate()
                    .map(move |(i, instance)| (object, i as u32, instance.position()))
            })
            .collect();
        sort_back_to_front(camera_position, &mut order, |(_, _, p)| *p);

        let attachments = hdr.load_attachments();
        let mut rpass = pass::begin_pass(
            encoder,
            "forward-pass",
            &attachments,
            Some(depth.load_attachment()),
        );
        matrices.bind(&mut rpass);

        if self.show_markers && !self.markers.is_empty() {
            rpass.set_pipeline(&self.marker_pipeline);
            self.marker_mesh.bind(&mut rpass);
            self.markers.bind(&mut rpass);
            self.marker_mesh.draw(&mut rpass, 0..self.markers.len() as u32);
        }

        rpass.set_pipeline(&self.skybox_pipeline);
        self.skybox_program.bind(&mut rpass);
        rpass.set_bind_group(TEXTURES_GROUP, &self.skybox_bind_group, &[]);
        rpass.draw(0..3, 0..1);

        if order.is_empty() {
            return;
        }
        rpass.set_pipeline(&self.transparent_pipeline);
        self.transparent_program.bind(&mut rpass);
        for (object, instance, _) in order {
            let draw = &transparent[object].draw;
            draw.mesh.bind(&mut rpass);
            draw.mesh.bind_material(&mut rpass);
            draw.instances.bind(&mut rpass);
            draw.mesh.draw(&mut rpass, instance..instance + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::reflect;
    use crate::slots::wgsl_declarations;

    #[test]
    fn test_shaders_validate() {
        let skybox_decls = wgsl_declarations(&SKYBOX_SLOTS);
        let structs = light_structs_source();
        let programs: [(&[&str], &str, &str); 3] = [
            (&[MATRICES_BLOCK_SOURCE, MESH_INPUT_SOURCE, MARKER_SHADER], "vs_marker", "fs_marker"),
            (
                &[MATRICES_BLOCK_SOURCE, FULLSCREEN_VERTEX_SOURCE, skybox_decls.as_str(), SKYBOX_SHADER],
                "vs_fullscreen",
                "fs_skybox",
            ),
            (
                &[
                    MATRICES_BLOCK_SOURCE,
                    MESH_INPUT_SOURCE,
                    MATERIAL_BLOCK_SOURCE,
                    structs.as_str(),
                    TRANSPARENT_SHADER,
                ],
                "vs_transparent",
                "fs_transparent",
            ),
        ];
        for (sources, vertex, fragment) in programs {
            let result = reflect(&ProgramDesc {
                label: fragment,
                sources,
                vertex,
                fragment: Some(fragment),
            });
            assert!(result.is_ok(), "{fragment}: {:?}", result.err());
        }
    }

    #[test]
    fn test_sort_back_to_front() {
        let camera = Vec3::new(0.0, 0.0, 5.0);
        let mut items = vec![
            Vec3::new(0.0, 0.0, 4.0),
            Vec3::new(0.0, 0.0, -3.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 2.0),
        ];
        sort_back_to_front(camera, &mut items, |p| *p);
        let distances: Vec<f32> = items.iter().map(|p| p.distance_squared(camera)).collect();
        assert!(distances.windows(2).all(|w| w[0] >= w[1]), "{distances:?}");
        assert_eq!(items[0], Vec3::new(0.0, 0.0, -3.0));
        assert_eq!(items[3], Vec3::new(0.0, 0.0, 4.0));
    }

    #[test]
    fn test_sort_is_stable_for_ties() {
        let camera = Vec3::ZERO;
        let mut items = vec![(0, Vec3::X), (1, Vec3::Y), (2, Vec3::Z * 2.0)];
        sort_back_to_front(camera, &mut items, |(_, p)| *p);
        let ids: Vec<i32> = items.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![2, 0, 1]);
    }
}
