//! Renderable meshes: vertex formats, primitive generators, materials and
//! per-instance data.
//!
//! The model importer is outside this crate; everything here works from a
//! [`MeshData`] plus a [`Material`] whose [`TextureSet`] maps roles to
//! textures. Unassigned roles are bound to the cache's default texture.

use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
use wgpu::util::DeviceExt;

use crate::shader::TEXTURES_GROUP;
use crate::texture::{Texture, TextureCache, TextureRole};

/// WGSL vertex and instance inputs matching [`Vertex`] and [`InstanceData`].
pub const MESH_INPUT_SOURCE: &str = r#"
struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
    @location(3) tangent: vec4<f32>,
};

struct InstanceInput {
    @location(4) model_0: vec4<f32>,
    @location(5) model_1: vec4<f32>,
    @location(6) model_2: vec4<f32>,
    @location(7) model_3: vec4<f32>,
    @location(8) normal_0: vec4<f32>,
    @location(9) normal_1: vec4<f32>,
    @location(10) normal_2: vec4<f32>,
    @location(11) tint: vec4<f32>,
};

fn instance_model(i: InstanceInput) -> mat4x4<f32> {
    return mat4x4<f32>(i.model_0, i.model_1, i.model_2, i.model_3);
}

fn instance_normal(i: InstanceInput) -> mat3x3<f32> {
    return mat3x3<f32>(i.normal_0.xyz, i.normal_1.xyz, i.normal_2.xyz);
}
"#;

/// WGSL declarations of the material bind group.
pub const MATERIAL_BLOCK_SOURCE: &str = r#"
struct Material {
    albedo_factor: vec4<f32>,
    params: vec4<f32>,
    flags: vec4<u32>,
};

@group(2) @binding(0) var<uniform> material: Material;
@group(2) @binding(1) var material_sampler: sampler;
@group(2) @binding(2) var albedo_map: texture_2d<f32>;
@group(2) @binding(3) var specular_map: texture_2d<f32>;
@group(2) @binding(4) var metallic_map: texture_2d<f32>;
@group(2) @binding(5) var roughness_map: texture_2d<f32>;
@group(2) @binding(6) var ao_map: texture_2d<f32>;
@group(2) @binding(7) var normal_map: texture_2d<f32>;
"#;

/// Roles sampled by mesh shaders, in binding order starting at 2.
/// Height maps are loaded but not sampled.
const SAMPLED_ROLES: [TextureRole; 6] = [
    TextureRole::Albedo,
    TextureRole::Specular,
    TextureRole::Metallic,
    TextureRole::Roughness,
    TextureRole::AmbientOcclusion,
    TextureRole::Normal,
];

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    /// xyz = tangent, w = bitangent handedness.
    pub tangent: [f32; 4],
}

impl Vertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
        0 => Float32x3,
        1 => Float32x3,
        2 => Float32x2,
        3 => Float32x4,
    ];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Per-instance transform and tint, 128 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct InstanceData {
    pub model: [[f32; 4]; 4],
    /// Inverse-transpose of the model's upper 3x3, one column per row.
    pub normal_matrix: [[f32; 4]; 3],
    /// Marker color, or a multiplier on the material albedo.
    pub tint: [f32; 4],
}

impl InstanceData {
    const ATTRIBUTES: [wgpu::VertexAttribute; 8] = wgpu::vertex_attr_array![
        4 => Float32x4,
        5 => Float32x4,
        6 => Float32x4,
        7 => Float32x4,
        8 => Float32x4,
        9 => Float32x4,
        10 => Float32x4,
        11 => Float32x4,
    ];

    pub fn new(model: Mat4) -> Self {
        let normal = Mat3::from_mat4(model).inverse().transpose();
        Self {
            model: model.to_cols_array_2d(),
            normal_matrix: [
                normal.x_axis.extend(0.0).to_array(),
                normal.y_axis.extend(0.0).to_array(),
                normal.z_axis.extend(0.0).to_array(),
            ],
            tint: [1.0; 4],
        }
    }

    pub fn with_tint(mut self, tint: Vec4) -> Self {
        self.tint = tint.to_array();
        self
    }

    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.model)
    }

    /// World-space translation of the instance.
    pub fn position(&self) -> Vec3 {
        Vec4::from_array(self.model[3]).truncate()
    }

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<InstanceData>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// CPU mesh: triangle list with counter-clockwise front faces.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Unit cube centered on the origin, 24 vertices.
    pub fn cube() -> Self {
        let faces = [
            (Vec3::X, Vec3::NEG_Z, Vec3::Y),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
        ];
        let mut mesh = Self::default();
        for (normal, u, v) in faces {
            mesh.push_quad(normal * 0.5, normal, u * 0.5, v * 0.5, 1.0);
        }
        mesh.compute_tangents();
        mesh
    }

    /// Square in the XZ plane facing +Y.
    pub fn plane(size: f32, uv_repeat: f32) -> Self {
        let half = size * 0.5;
        let mut mesh = Self::default();
        mesh.push_quad(Vec3::ZERO, Vec3::Y, Vec3::X * half, Vec3::NEG_Z * half, uv_repeat);
        mesh.compute_tangents();
        mesh
    }

    /// Unit square in the XY plane facing +Z.
    pub fn quad() -> Self {
        let mut mesh = Self::default();
        mesh.push_quad(Vec3::ZERO, Vec3::Z, Vec3::X * 0.5, Vec3::Y * 0.5, 1.0);
        mesh.compute_tangents();
        mesh
    }

    /// Unit-radius sphere.
    pub fn uv_sphere(segments: u32, rings: u32) -> Self {
        let segments = segments.max(3);
        let rings = rings.max(2);
        let mut mesh = Self::default();
        for ring in 0..=rings {
            let phi = std::f32::consts::PI * ring as f32 / rings as f32;
            for segment in 0..=segments {
                let theta = std::f32::consts::TAU * segment as f32 / segments as f32;
                let position = Vec3::new(theta.cos() * phi.sin(), phi.cos(), theta.sin() * phi.sin());
                mesh.vertices.push(Vertex {
                    position: position.to_array(),
                    normal: position.to_array(),
                    uv: [segment as f32 / segments as f32, ring as f32 / rings as f32],
                    tangent: [0.0; 4],
                });
            }
        }
        let stride = segments + 1;
        for ring in 0..rings {
            for segment in 0..segments {
                let top = ring * stride + segment;
                let bottom = top + stride;
                mesh.indices
                    .extend_from_slice(&[top, top + 1, bottom, top + 1, bottom + 1, bottom]);
            }
        }
        mesh.compute_tangents();
        mesh
    }

    /// Append a quad spanning `center ± u ± v`; `u × v` must point along `normal`.
    fn push_quad(&mut self, center: Vec3, normal: Vec3, u: Vec3, v: Vec3, uv_scale: f32) {
        let base = self.vertices.len() as u32;
        for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            let position = center + u * su + v * sv;
            let uv = Vec2::new((su + 1.0) * 0.5, 1.0 - (sv + 1.0) * 0.5) * uv_scale;
            self.vertices.push(Vertex {
                position: position.to_array(),
                normal: normal.to_array(),
                uv: uv.to_array(),
                tangent: [0.0; 4],
            });
        }
        self.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    /// Per-vertex tangents from UV gradients, orthogonalized against the normal.
    pub fn compute_tangents(&mut self) {
        let mut tangents = vec![Vec3::ZERO; self.vertices.len()];
        let mut bitangents = vec![Vec3::ZERO; self.vertices.len()];
        for tri in self.indices.chunks_exact(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| i as usize);
            let p = [a, b, c].map(|i| Vec3::from_array(self.vertices[i].position));
            let t = [a, b, c].map(|i| Vec2::from_array(self.vertices[i].uv));
            let (e1, e2) = (p[1] - p[0], p[2] - p[0]);
            let (d1, d2) = (t[1] - t[0], t[2] - t[0]);
            let det = d1.x * d2.y - d2.x * d1.y;
            if det.abs() < 1e-8 {
                continue;
            }
            let r = 1.0 / det;
            let tangent = (e1 * d2.y - e2 * d1.y) * r;
            let bitangent = (e2 * d1.x - e1 * d2.x) * r;
            for i in [a, b, c] {
                tangents[i] += tangent;
                bitangents[i] += bitangent;
            }
        }
        for (i, vertex) in self.vertices.iter_mut().enumerate() {
            let n = Vec3::from_array(vertex.normal);
            let t = (tangents[i] - n * n.dot(tangents[i]))
                .try_normalize()
                .unwrap_or_else(|| n.any_orthonormal_vector());
            let w = if n.cross(t).dot(bitangents[i]) < 0.0 {
                -1.0
            } else {
                1.0
            };
            vertex.tangent = t.extend(w).to_array();
        }
    }
}

/// Role → texture map. At most one texture per role.
#[derive(Clone, Debug, Default)]
pub struct TextureSet {
    textures: HashMap<TextureRole, Arc<Texture>>,
}

impl TextureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign `texture` to `role`, returning the texture it replaces.
    pub fn set(&mut self, role: TextureRole, texture: Arc<Texture>) -> Option<Arc<Texture>> {
        self.textures.insert(role, texture)
    }

    pub fn get(&self, role: TextureRole) -> Option<&Arc<Texture>> {
        self.textures.get(&role)
    }

    pub fn contains(&self, role: TextureRole) -> bool {
        self.textures.contains_key(&role)
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}

/// Surface description of one mesh.
#[derive(Clone, Debug)]
pub struct Material {
    pub texture_set: TextureSet,
    /// Multiplies the albedo texture (linear RGB).
    pub albedo_factor: Vec3,
    pub metallic: f32,
    pub roughness: f32,
    pub ao: f32,
    /// Blinn-Phong specular intensity, stored in the G-buffer albedo alpha.
    pub specular: f32,
    /// 1.0 is opaque. Only the forward transparent pass blends.
    pub opacity: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            texture_set: TextureSet::default(),
            albedo_factor: Vec3::ONE,
            metallic: 0.0,
            roughness: 0.5,
            ao: 1.0,
            specular: 0.5,
            opacity: 1.0,
        }
    }
}

/// GPU layout of the `Material` block, 48 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct MaterialUniform {
    /// rgb = albedo factor, a = opacity.
    pub albedo_factor: [f32; 4],
    /// metallic, roughness, ao, specular.
    pub params: [f32; 4],
    /// Non-zero when the metallic / roughness / AO / specular map is assigned;
    /// unassigned scalars use the factor alone.
    pub flags: [u32; 4],
}

impl Material {
    pub fn to_uniform(&self) -> MaterialUniform {
        let has = |role| u32::from(self.texture_set.contains(role));
        MaterialUniform {
            albedo_factor: self.albedo_factor.extend(self.opacity).to_array(),
            params: [self.metallic, self.roughness, self.ao, self.specular],
            flags: [
                has(TextureRole::Metallic),
                has(TextureRole::Roughness),
                has(TextureRole::AmbientOcclusion),
                has(TextureRole::Specular),
            ],
        }
    }

    pub fn is_transparent(&self) -> bool {
        self.opacity < 1.0
    }
}

/// Bind group layout and sampler shared by every material.
pub struct MaterialLayout {
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
}

impl MaterialLayout {
    pub fn new(device: &wgpu::Device) -> Self {
        let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let mut entries = vec![
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(std::mem::size_of::<MaterialUniform>() as u64),
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ];
        entries.extend((0..SAMPLED_ROLES.len() as u32).map(|i| texture_entry(i + 2)));
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("material-bgl"),
            entries: &entries,
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("material-sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Linear,
            ..Default::default()
        });
        Self { layout, sampler }
    }

    pub fn layout(&self) -> &wgpu::BindGroupLayout {
        &self.layout
    }
}

/// GPU mesh with its material bind group.
pub struct RenderableMesh {
    pub label: String,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    material: Material,
    material_bind_group: wgpu::BindGroup,
}

impl RenderableMesh {
    pub fn new(
        device: &wgpu::Device,
        label: &str,
        data: &MeshData,
        material: Material,
        layout: &MaterialLayout,
        textures: &TextureCache,
    ) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-vertices")),
            contents: bytemuck::cast_slice(&data.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-indices")),
            contents: bytemuck::cast_slice(&data.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-material")),
            contents: bytemuck::bytes_of(&material.to_uniform()),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let bound: Vec<Arc<Texture>> = SAMPLED_ROLES
            .iter()
            .map(|role| {
                material
                    .texture_set
                    .get(*role)
                    .cloned()
                    .unwrap_or_else(|| textures.default_texture(*role))
            })
            .collect();
        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&layout.sampler),
            },
        ];
        entries.extend(bound.iter().enumerate().map(|(i, texture)| wgpu::BindGroupEntry {
            binding: i as u32 + 2,
            resource: wgpu::BindingResource::TextureView(&texture.view),
        }));
        let material_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{label}-material-bg")),
            layout: &layout.layout,
            entries: &entries,
        });

        Self {
            label: label.to_string(),
            vertex_buffer,
            index_buffer,
            index_count: data.indices.len() as u32,
            material,
            material_bind_group,
        }
    }

    pub fn material(&self) -> &Material {
        &self.material
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Set vertex slot 0 and the index buffer.
    pub fn bind(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
    }

    pub fn bind_material(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_bind_group(TEXTURES_GROUP, &self.material_bind_group, &[]);
    }

    /// Draw `instances` from the buffer bound at vertex slot 1.
    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>, instances: std::ops::Range<u32>) {
        pass.draw_indexed(0..self.index_count, 0, instances);
    }
}

/// Growable per-instance vertex buffer.
pub struct InstanceBuffer {
    buffer: wgpu::Buffer,
    capacity: usize,
    len: usize,
}

impl InstanceBuffer {
    pub fn new(device: &wgpu::Device, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: Self::allocate(device, capacity),
            capacity,
            len: 0,
        }
    }

    fn allocate(device: &wgpu::Device, capacity: usize) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("instance-buffer"),
            size: (capacity * std::mem::size_of::<InstanceData>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Replace the contents, reallocating when `instances` does not fit.
    pub fn write(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, instances: &[InstanceData]) {
        if instances.len() > self.capacity {
            self.capacity = instances.len().next_power_of_two();
            self.buffer = Self::allocate(device, self.capacity);
        }
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(instances));
        self.len = instances.len();
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Set vertex slot 1.
    pub fn bind(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_vertex_buffer(1, self.buffer.slice(..));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::create_test_device_queue;

    fn triangle_normals(mesh: &MeshData) -> Vec<(Vec3, Vec3)> {
        mesh.indices
            .chunks_exact(3)
            .map(|tri| {
                let p = [tri[0], tri[1], tri[2]]
                    .map(|i| Vec3::from_array(mesh.vertices[i as usize].position));
                let face = (p[1] - p[0]).cross(p[2] - p[0]);
                (face, Vec3::from_array(mesh.vertices[tri[0] as usize].normal))
            })
            .collect()
    }

    #[test]
    fn test_layout_sizes() {
        assert_eq!(std::mem::size_of::<Vertex>(), 48);
        assert_eq!(std::mem::size_of::<InstanceData>(), 128);
        assert_eq!(std::mem::size_of::<MaterialUniform>(), 48);
    }

    #[test]
    fn test_cube_winding_is_outward() {
        let cube = MeshData::cube();
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.indices.len(), 36);
        for (face, normal) in triangle_normals(&cube) {
            assert!(face.dot(normal) > 0.0);
        }
    }

    #[test]
    fn test_sphere_winding_and_radius() {
        let sphere = MeshData::uv_sphere(16, 8);
        for v in &sphere.vertices {
            assert!((Vec3::from_array(v.position).length() - 1.0).abs() < 1e-5);
        }
        for (face, normal) in triangle_normals(&sphere) {
            // Degenerate pole triangles have zero area.
            assert!(face.dot(normal) >= -1e-6);
        }
    }

    #[test]
    fn test_plane_and_quad_face_up_and_forward() {
        let plane = MeshData::plane(10.0, 4.0);
        for (face, _) in triangle_normals(&plane) {
            assert!(face.normalize().abs_diff_eq(Vec3::Y, 1e-6));
        }
        assert_eq!(plane.vertices[2].uv, [4.0, 0.0]);
        let quad = MeshData::quad();
        for (face, _) in triangle_normals(&quad) {
            assert!(face.normalize().abs_diff_eq(Vec3::Z, 1e-6));
        }
    }

    #[test]
    fn test_tangents_orthonormal() {
        for mesh in [MeshData::cube(), MeshData::uv_sphere(12, 6)] {
            for v in &mesh.vertices {
                let t = Vec4::from_array(v.tangent);
                let n = Vec3::from_array(v.normal);
                assert!((t.truncate().length() - 1.0).abs() < 1e-4);
                assert!(t.truncate().dot(n).abs() < 1e-4);
                assert!(t.w == 1.0 || t.w == -1.0);
            }
        }
    }

    #[test]
    fn test_cube_tangent_follows_u() {
        let cube = MeshData::cube();
        // +Z face: u runs along +X.
        let front = &cube.vertices[16];
        assert_eq!(front.normal, [0.0, 0.0, 1.0]);
        assert!(Vec3::from_slice(&front.tangent[..3]).abs_diff_eq(Vec3::X, 1e-5));
    }

    #[test]
    fn test_instance_normal_matrix_non_uniform_scale() {
        let model = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let instance = InstanceData::new(model);
        assert_eq!(instance.normal_matrix[0][0], 0.5);
        assert_eq!(instance.normal_matrix[1][1], 1.0);
        let moved = InstanceData::new(Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)));
        assert_eq!(moved.position(), Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_material_uniform_flags() {
        let material = Material {
            opacity: 0.4,
            roughness: 0.8,
            ..Default::default()
        };
        let uniform = material.to_uniform();
        assert_eq!(uniform.albedo_factor, [1.0, 1.0, 1.0, 0.4]);
        assert_eq!(uniform.params[1], 0.8);
        assert_eq!(uniform.flags, [0; 4]);
        assert!(material.is_transparent());
    }

    #[test]
    fn test_texture_set_replaces_per_role() {
        let Some((device, queue)) = create_test_device_queue() else {
            return;
        };
        let first = Arc::new(Texture::default_for_role(&device, &queue, TextureRole::Metallic).unwrap());
        let second = Arc::new(Texture::default_for_role(&device, &queue, TextureRole::Metallic).unwrap());
        let mut set = TextureSet::new();
        assert!(set.set(TextureRole::Metallic, Arc::clone(&first)).is_none());
        let replaced = set.set(TextureRole::Metallic, Arc::clone(&second)).unwrap();
        assert!(Arc::ptr_eq(&replaced, &first));
        assert_eq!(set.len(), 1);

        let material = Material {
            texture_set: set,
            ..Default::default()
        };
        assert_eq!(material.to_uniform().flags, [1, 0, 0, 0]);
    }

    #[test]
    fn test_renderable_mesh_uses_defaults() {
        let Some((device, queue)) = create_test_device_queue() else {
            return;
        };
        let cache = TextureCache::new(&device, &queue).unwrap();
        let layout = MaterialLayout::new(&device);
        let mesh = RenderableMesh::new(
            &device,
            "cube",
            &MeshData::cube(),
            Material::default(),
            &layout,
            &cache,
        );
        assert_eq!(mesh.index_count(), 36);

        let mut instances = InstanceBuffer::new(&device, 1);
        instances.write(&device, &queue, &[InstanceData::new(Mat4::IDENTITY); 5]);
        assert_eq!(instances.len(), 5);
        assert_eq!(instances.capacity(), 8);
    }
}
