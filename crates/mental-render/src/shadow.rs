//! Directional and omnidirectional shadow maps and the depth passes filling them.
//!
//! Shadow maps use conventional depth: cleared to 1.0 and tested with
//! `Less`. The point map stores `distance / far` rather than projected depth,
//! so the lighting pass can compare against the light-to-fragment distance
//! directly.
//!
//! Acne policy: every shadow pipeline culls front faces, so closed meshes
//! write their far side. The directional pipeline adds [`DIRECTIONAL_DEPTH_BIAS`]
//! on top, and the lighting pass subtracts [`DIRECTIONAL_SHADOW_BIAS`] and
//! [`POINT_SHADOW_BIAS`] before comparing.

use std::num::NonZeroU64;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use mental_config::ShadowConfig;
use mental_lighting::{
    DirectionalShadowVolume, LightSet, ShadowUniform, directional_light_space_matrix,
    point_shadow_matrices,
};

use crate::error::RenderError;
use crate::gbuffer::MeshDraw;
use crate::mesh::{InstanceData, MESH_INPUT_SOURCE, Vertex};
use crate::pass::{self, PipelineDesc};
use crate::shader::{ProgramDesc, ShaderProgram};
use crate::target::Cubemap;

pub const SHADOW_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Faces are culled on the side facing the light.
pub const SHADOW_CULL_MODE: wgpu::Face = wgpu::Face::Front;

/// Rasterizer bias of the directional depth pass.
pub const DIRECTIONAL_DEPTH_BIAS: wgpu::DepthBiasState = wgpu::DepthBiasState {
    constant: 2,
    slope_scale: 2.0,
    clamp: 0.0,
};

/// Subtracted from the fragment's light-space depth before comparing.
pub const DIRECTIONAL_SHADOW_BIAS: f32 = 0.002;

/// World-space distance subtracted before the cubemap comparison.
pub const POINT_SHADOW_BIAS: f32 = 0.05;

/// One uniform slot per face: directional, then six cube faces.
const FACE_SLOTS: u64 = 7;
const FACE_STRIDE: u64 = 256;

const SHADOW_SHADER: &str = r#"
struct ShadowFace {
    view_proj: mat4x4<f32>,
    light_position_far: vec4<f32>,
};
@group(0) @binding(0) var<uniform> face: ShadowFace;

struct ShadowOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) world_position: vec3<f32>,
};

@vertex
fn vs_shadow(v: VertexInput, i: InstanceInput) -> ShadowOut {
    let world = instance_model(i) * vec4<f32>(v.position, 1.0);
    var out: ShadowOut;
    out.clip = face.view_proj * world;
    out.world_position = world.xyz;
    return out;
}

@fragment
fn fs_point_shadow(in: ShadowOut) -> @builtin(frag_depth) f32 {
    let distance = length(in.world_position - face.light_position_far.xyz);
    return clamp(distance / face.light_position_far.w, 0.0, 1.0);
}
"#;

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct ShadowFaceUniform {
    view_proj: [f32; 16],
    light_position_far: [f32; 4],
}

/// A shadow map and the light-space transform(s) it was rendered with.
pub enum ShadowMap {
    Directional {
        texture: wgpu::Texture,
        view: wgpu::TextureView,
        light_space: Mat4,
    },
    Point {
        cubemap: Cubemap,
        position: Vec3,
        near: f32,
        far: f32,
        face_matrices: [Mat4; 6],
    },
}

impl ShadowMap {
    pub fn directional(device: &wgpu::Device, resolution: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("shadow-directional"),
            size: wgpu::Extent3d {
                width: resolution,
                height: resolution,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SHADOW_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        ShadowMap::Directional {
            texture,
            view,
            light_space: Mat4::IDENTITY,
        }
    }

    pub fn point(device: &wgpu::Device, resolution: u32, near: f32, far: f32) -> Self {
        ShadowMap::Point {
            cubemap: Cubemap::new(
                device,
                "shadow-point",
                resolution,
                1,
                SHADOW_FORMAT,
                wgpu::TextureUsages::empty(),
            ),
            position: Vec3::ZERO,
            near,
            far,
            face_matrices: point_shadow_matrices(Vec3::ZERO, near, far),
        }
    }

    /// View bound for sampling: a 2D depth view or a cube depth view.
    pub fn sample_view(&self) -> &wgpu::TextureView {
        match self {
            ShadowMap::Directional { view, .. } => view,
            ShadowMap::Point { cubemap, .. } => &cubemap.view,
        }
    }

    pub fn texture(&self) -> &wgpu::Texture {
        match self {
            ShadowMap::Directional { texture, .. } => texture,
            ShadowMap::Point { cubemap, .. } => &cubemap.texture,
        }
    }

    /// Attachment view and view-projection of every face to render.
    fn faces(&self) -> Vec<(&wgpu::TextureView, Mat4)> {
        match self {
            ShadowMap::Directional {
                view, light_space, ..
            } => vec![(view, *light_space)],
            ShadowMap::Point {
                cubemap,
                face_matrices,
                ..
            } => face_matrices
                .iter()
                .enumerate()
                .map(|(face, m)| (cubemap.face_view(0, face as u32), *m))
                .collect(),
        }
    }

    fn light_position_far(&self) -> [f32; 4] {
        match self {
            ShadowMap::Directional { .. } => [0.0, 0.0, 0.0, 1.0],
            ShadowMap::Point { position, far, .. } => position.extend(*far).to_array(),
        }
    }
}

/// Renders the frame's shadow maps.
pub struct ShadowPass {
    directional: ShadowMap,
    point: ShadowMap,
    volume: DirectionalShadowVolume,
    pcf: bool,
    face_buffer: wgpu::Buffer,
    face_bind_group: wgpu::BindGroup,
    // Kept alive for the pipelines.
    _directional_program: ShaderProgram,
    _point_program: ShaderProgram,
    directional_pipeline: wgpu::RenderPipeline,
    point_pipeline: wgpu::RenderPipeline,
    comparison_sampler: wgpu::Sampler,
    directional_active: bool,
    point_active: bool,
}

impl ShadowPass {
    pub fn new(device: &wgpu::Device, config: &ShadowConfig) -> Result<Self, RenderError> {
        let face_size = std::mem::size_of::<ShadowFaceUniform>() as u64;
        let face_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("shadow-faces"),
            size: FACE_SLOTS * FACE_STRIDE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let face_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("shadow-face-bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(face_size),
                },
                count: None,
            }],
        });
        let face_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("shadow-face-bg"),
            layout: &face_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &face_buffer,
                    offset: 0,
                    size: NonZeroU64::new(face_size),
                }),
            }],
        });

        let directional_program = ShaderProgram::build(
            device,
            &ProgramDesc {
                label: "shadow-directional",
                sources: &[MESH_INPUT_SOURCE, SHADOW_SHADER],
                vertex: "vs_shadow",
                fragment: None,
            },
        )
        .require()?;
        let point_program = ShaderProgram::build(
            device,
            &ProgramDesc {
                label: "shadow-point",
                sources: &[MESH_INPUT_SOURCE, SHADOW_SHADER],
                vertex: "vs_shadow",
                fragment: Some("fs_point_shadow"),
            },
        )
        .require()?;

        let depth_state = |bias| wgpu::DepthStencilState {
            format: SHADOW_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias,
        };
        let buffers = [Vertex::layout(), InstanceData::layout()];
        let directional_pipeline = pass::create_pipeline(
            device,
            &directional_program,
            &PipelineDesc {
                label: "shadow-directional-pipeline",
                layouts: &[&face_layout],
                vertex_buffers: &buffers,
                targets: &[],
                depth_stencil: Some(depth_state(DIRECTIONAL_DEPTH_BIAS)),
                primitive: wgpu::PrimitiveState {
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: Some(SHADOW_CULL_MODE),
                    ..Default::default()
                },
            },
        )?;
        // Cube face projections mirror the image, which flips the winding.
        let point_pipeline = pass::create_pipeline(
            device,
            &point_program,
            &PipelineDesc {
                label: "shadow-point-pipeline",
                layouts: &[&face_layout],
                vertex_buffers: &buffers,
                targets: &[],
                depth_stencil: Some(depth_state(wgpu::DepthBiasState::default())),
                primitive: wgpu::PrimitiveState {
                    front_face: wgpu::FrontFace::Cw,
                    cull_mode: Some(SHADOW_CULL_MODE),
                    ..Default::default()
                },
            },
        )?;

        let comparison_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("shadow-comparison-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });

        log::info!(
            "Created shadow maps: directional {0}x{0}, point cube {1}x{1}",
            config.directional_resolution,
            config.point_resolution
        );
        Ok(Self {
            directional: ShadowMap::directional(device, config.directional_resolution.max(1)),
            point: ShadowMap::point(
                device,
                config.point_resolution.max(1),
                config.point_near,
                config.point_far,
            ),
            volume: DirectionalShadowVolume {
                extent: config.directional_extent,
                near: config.directional_near,
                far: config.directional_far,
                distance: config.directional_distance,
                focus: Vec3::ZERO,
            },
            pcf: config.pcf,
            face_buffer,
            face_bind_group,
            _directional_program: directional_program,
            _point_program: point_program,
            directional_pipeline,
            point_pipeline,
            comparison_sampler,
            directional_active: false,
            point_active: false,
        })
    }

    pub fn directional_map(&self) -> &ShadowMap {
        &self.directional
    }

    pub fn point_map(&self) -> &ShadowMap {
        &self.point
    }

    pub fn comparison_sampler(&self) -> &wgpu::Sampler {
        &self.comparison_sampler
    }

    /// Recompute light-space matrices from the current lights.
    pub fn update(&mut self, lights: &LightSet) {
        self.directional_active = false;
        if let (Some(light), ShadowMap::Directional { light_space, .. }) =
            (&lights.directional, &mut self.directional)
        {
            *light_space = directional_light_space_matrix(light.direction, &self.volume);
            self.directional_active = true;
        }

        self.point_active = false;
        if let (
            Some((_, light)),
            ShadowMap::Point {
                position,
                near,
                far,
                face_matrices,
                ..
            },
        ) = (lights.shadow_caster(), &mut self.point)
        {
            *position = light.position;
            *face_matrices = point_shadow_matrices(light.position, *near, *far);
            self.point_active = true;
        }
    }

    /// Shadow block for the lighting pass, reflecting which maps hold data.
    pub fn uniform(&self) -> ShadowUniform {
        let light_space = match &self.directional {
            ShadowMap::Directional { light_space, .. } if self.directional_active => {
                Some(*light_space)
            }
            _ => None,
        };
        let point = match &self.point {
            ShadowMap::Point { position, far, .. } if self.point_active => Some((*position, *far)),
            _ => None,
        };
        ShadowUniform::new(light_space, point, self.pcf, DIRECTIONAL_SHADOW_BIAS)
    }

    /// Clear both maps and draw `casters` into the active ones.
    pub fn record(
        &self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        casters: &[MeshDraw<'_>],
    ) {
        let maps = [
            (&self.directional, &self.directional_pipeline, self.directional_active),
            (&self.point, &self.point_pipeline, self.point_active),
        ];
        let mut slot = 0u64;
        for (map, pipeline, active) in maps {
            let light_position_far = map.light_position_far();
            for (view, view_proj) in map.faces() {
                let offset = slot * FACE_STRIDE;
                slot += 1;
                queue.write_buffer(
                    &self.face_buffer,
                    offset,
                    bytemuck::bytes_of(&ShadowFaceUniform {
                        view_proj: view_proj.to_cols_array(),
                        light_position_far,
                    }),
                );

                let mut rpass = pass::begin_pass(
                    encoder,
                    "shadow-pass",
                    &[],
                    Some(wgpu::RenderPassDepthStencilAttachment {
                        view,
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Clear(1.0),
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }),
                );
                if !active {
                    continue;
                }
                rpass.set_pipeline(pipeline);
                rpass.set_bind_group(0, &self.face_bind_group, &[offset as u32]);
                for draw in casters.iter().filter(|d| !d.instances.is_empty()) {
                    draw.mesh.bind(&mut rpass);
                    draw.instances.bind(&mut rpass);
                    draw.mesh.draw(&mut rpass, 0..draw.instances.len() as u32);
                }
            }
        }
    }
}
