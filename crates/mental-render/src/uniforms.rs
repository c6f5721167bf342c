//! The `Matrices` uniform block shared by every camera-relative program.
//!
//! One buffer, written once per frame by [`MatricesBuffer::setup_scene`]
//! before any draw is recorded, bound at [`MATRICES_GROUP`] by all readers.

use std::num::NonZeroU64;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::shader::MATRICES_GROUP;

/// WGSL declaration of the block. Prepended to every program that reads it.
pub const MATRICES_BLOCK_SOURCE: &str = r#"
struct Matrices {
    view: mat4x4<f32>,
    projection: mat4x4<f32>,
    view_projection: mat4x4<f32>,
    inverse_view: mat4x4<f32>,
    inverse_projection: mat4x4<f32>,
    camera_position: vec4<f32>,
};

@group(0) @binding(0) var<uniform> matrices: Matrices;
"#;

/// Name of the WGSL struct, as passed to `set_uniform_block_binding`.
pub const MATRICES_BLOCK_NAME: &str = "Matrices";

/// GPU layout of the block, 336 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct MatricesUniform {
    pub view: [f32; 16],
    pub projection: [f32; 16],
    pub view_projection: [f32; 16],
    pub inverse_view: [f32; 16],
    pub inverse_projection: [f32; 16],
    pub camera_position: [f32; 4],
}

impl MatricesUniform {
    pub fn new(view: Mat4, projection: Mat4, camera_position: Vec3) -> Self {
        Self {
            view: view.to_cols_array(),
            projection: projection.to_cols_array(),
            view_projection: (projection * view).to_cols_array(),
            inverse_view: view.inverse().to_cols_array(),
            inverse_projection: projection.inverse().to_cols_array(),
            camera_position: camera_position.extend(1.0).to_array(),
        }
    }
}

/// Owner of the shared matrices buffer and its bind group.
pub struct MatricesBuffer {
    buffer: wgpu::Buffer,
    layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
    current: MatricesUniform,
}

impl MatricesBuffer {
    pub fn new(device: &wgpu::Device) -> Self {
        let size = std::mem::size_of::<MatricesUniform>() as u64;
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("matrices-ubo"),
            size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("matrices-bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(size),
                },
                count: None,
            }],
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("matrices-bg"),
            layout: &layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        });
        Self {
            buffer,
            layout,
            bind_group,
            current: MatricesUniform::new(Mat4::IDENTITY, Mat4::IDENTITY, Vec3::ZERO),
        }
    }

    /// Write this frame's camera matrices. Call before recording any draw.
    pub fn setup_scene(&mut self, queue: &wgpu::Queue, view: Mat4, projection: Mat4, camera_position: Vec3) {
        self.current = MatricesUniform::new(view, projection, camera_position);
        queue.write_buffer(&self.buffer, 0, bytemuck::bytes_of(&self.current));
    }

    /// The values most recently written.
    pub fn current(&self) -> &MatricesUniform {
        &self.current
    }

    pub fn layout(&self) -> &wgpu::BindGroupLayout {
        &self.layout
    }

    pub fn bind(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_bind_group(MATRICES_GROUP, &self.bind_group, &[]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::create_test_device_queue;
    use crate::readback::read_texture_rgba32f;
    use crate::shader::{ProgramDesc, ShaderProgram};

    #[test]
    fn test_uniform_size() {
        assert_eq!(std::mem::size_of::<MatricesUniform>(), 336);
    }

    #[test]
    fn test_inverse_matrices() {
        let view = Mat4::look_at_rh(Vec3::new(1.0, 2.0, 3.0), Vec3::ZERO, Vec3::Y);
        let proj = Mat4::perspective_rh(1.0, 1.5, 100.0, 0.1);
        let u = MatricesUniform::new(view, proj, Vec3::new(1.0, 2.0, 3.0));
        let product = Mat4::from_cols_array(&u.view) * Mat4::from_cols_array(&u.inverse_view);
        assert!(product.abs_diff_eq(Mat4::IDENTITY, 1e-5));
        assert_eq!(u.camera_position, [1.0, 2.0, 3.0, 1.0]);
    }

    const READER_SOURCE: &str = r#"
        @vertex
        fn vs_main(@builtin(vertex_index) idx: u32) -> @builtin(position) vec4<f32> {
            let uv = vec2<f32>(f32((idx << 1u) & 2u), f32(idx & 2u));
            return vec4<f32>(uv * 2.0 - 1.0, 0.0, 1.0);
        }
    "#;

    const VIEW_READER: &str = r#"
        @fragment
        fn fs_main() -> @location(0) vec4<f32> {
            return matrices.view[3];
        }
    "#;

    const PROJECTION_READER: &str = r#"
        @fragment
        fn fs_main() -> @location(0) vec4<f32> {
            return vec4<f32>(matrices.projection[0][0], matrices.projection[1][1],
                             matrices.view[3].x, matrices.view[3].y);
        }
    "#;

    fn draw_into(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        matrices: &MatricesBuffer,
        program: &ShaderProgram,
        target: &wgpu::Texture,
    ) {
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: None,
            bind_group_layouts: &[matrices.layout()],
            immediate_size: 0,
        });
        let targets = [Some(wgpu::ColorTargetState {
            format: wgpu::TextureFormat::Rgba32Float,
            blend: None,
            write_mask: wgpu::ColorWrites::ALL,
        })];
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: None,
            layout: Some(&layout),
            vertex: program.vertex_state(&[]).unwrap(),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: program.fragment_state(&targets).unwrap(),
            multiview_mask: None,
            cache: None,
        });
        let view = target.create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor::default());
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: None,
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                ..Default::default()
            });
            pass.set_pipeline(&pipeline);
            matrices.bind(&mut pass);
            pass.draw(0..3, 0..1);
        }
        queue.submit(std::iter::once(encoder.finish()));
    }

    #[test]
    fn test_programs_sharing_block_see_same_values() {
        let Some((device, queue)) = create_test_device_queue() else {
            return;
        };
        let mut matrices = MatricesBuffer::new(&device);
        let mut programs: Vec<ShaderProgram> = [VIEW_READER, PROJECTION_READER]
            .iter()
            .map(|fragment| {
                ShaderProgram::build(
                    &device,
                    &ProgramDesc {
                        label: "matrices-reader",
                        sources: &[MATRICES_BLOCK_SOURCE, READER_SOURCE, fragment],
                        vertex: "vs_main",
                        fragment: Some("fs_main"),
                    },
                )
            })
            .collect();
        for program in &mut programs {
            program
                .set_uniform_block_binding(MATRICES_BLOCK_NAME, MATRICES_GROUP)
                .unwrap();
        }

        let view = Mat4::from_translation(Vec3::new(3.0, -2.0, 7.0));
        let projection = Mat4::perspective_rh(0.8, 1.0, 100.0, 0.1);
        matrices.setup_scene(&queue, view, projection, Vec3::new(-3.0, 2.0, -7.0));

        let targets: Vec<wgpu::Texture> = (0..2)
            .map(|_| {
                device.create_texture(&wgpu::TextureDescriptor {
                    label: None,
                    size: wgpu::Extent3d {
                        width: 4,
                        height: 4,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: wgpu::TextureFormat::Rgba32Float,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
                    view_formats: &[],
                })
            })
            .collect();
        for (program, target) in programs.iter().zip(&targets) {
            draw_into(&device, &queue, &matrices, program, target);
        }

        let from_view = read_texture_rgba32f(&device, &queue, &targets[0], 0, 0);
        let from_projection = read_texture_rgba32f(&device, &queue, &targets[1], 0, 0);
        assert_eq!(from_view[0], [3.0, -2.0, 7.0, 1.0]);
        assert_eq!(from_projection[0][2..], [3.0, -2.0]);
        assert!((from_projection[0][1] - projection.y_axis.y).abs() < 1e-6);
    }
}
