//! Pipeline and render-pass boilerplate shared by every stage.

use crate::error::RenderError;
use crate::shader::ShaderProgram;

/// Fullscreen triangle generated from the vertex index. `uv` has its
/// origin at the top-left, matching texture rows.
pub const FULLSCREEN_VERTEX_SOURCE: &str = r#"
struct FullscreenOut {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_fullscreen(@builtin(vertex_index) idx: u32) -> FullscreenOut {
    let uv = vec2<f32>(f32((idx << 1u) & 2u), f32(idx & 2u));
    var out: FullscreenOut;
    out.position = vec4<f32>(uv * 2.0 - 1.0, 0.0, 1.0);
    out.uv = vec2<f32>(uv.x, 1.0 - uv.y);
    return out;
}
"#;

/// Everything about a pipeline except the program.
pub struct PipelineDesc<'a> {
    pub label: &'a str,
    /// Bind group layouts in group order.
    pub layouts: &'a [&'a wgpu::BindGroupLayout],
    pub vertex_buffers: &'a [wgpu::VertexBufferLayout<'a>],
    pub targets: &'a [Option<wgpu::ColorTargetState>],
    pub depth_stencil: Option<wgpu::DepthStencilState>,
    pub primitive: wgpu::PrimitiveState,
}

impl<'a> PipelineDesc<'a> {
    /// A fullscreen pass: no vertex buffers, no depth, no culling.
    pub fn fullscreen(
        label: &'a str,
        layouts: &'a [&'a wgpu::BindGroupLayout],
        targets: &'a [Option<wgpu::ColorTargetState>],
    ) -> Self {
        Self {
            label,
            layouts,
            vertex_buffers: &[],
            targets,
            depth_stencil: None,
            primitive: wgpu::PrimitiveState::default(),
        }
    }
}

/// Build a render pipeline from a valid program.
pub fn create_pipeline(
    device: &wgpu::Device,
    program: &ShaderProgram,
    desc: &PipelineDesc<'_>,
) -> Result<wgpu::RenderPipeline, RenderError> {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(desc.label),
        bind_group_layouts: desc.layouts,
        immediate_size: 0,
    });
    Ok(device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(desc.label),
        layout: Some(&layout),
        vertex: program.vertex_state(desc.vertex_buffers)?,
        primitive: desc.primitive,
        depth_stencil: desc.depth_stencil.clone(),
        multisample: wgpu::MultisampleState::default(),
        fragment: program.fragment_state(desc.targets)?,
        multiview_mask: None,
        cache: None,
    }))
}

/// Opaque target state without blending.
pub fn opaque_target(format: wgpu::TextureFormat) -> Option<wgpu::ColorTargetState> {
    Some(wgpu::ColorTargetState {
        format,
        blend: None,
        write_mask: wgpu::ColorWrites::ALL,
    })
}

/// Attachment that clears `view` to `clear` and stores the result.
pub fn clear_attachment(view: &wgpu::TextureView, clear: wgpu::Color) -> Option<wgpu::RenderPassColorAttachment<'_>> {
    Some(wgpu::RenderPassColorAttachment {
        view,
        resolve_target: None,
        ops: wgpu::Operations {
            load: wgpu::LoadOp::Clear(clear),
            store: wgpu::StoreOp::Store,
        },
        depth_slice: None,
    })
}

/// Begin a pass over color attachments and an optional depth attachment.
pub fn begin_pass<'e>(
    encoder: &'e mut wgpu::CommandEncoder,
    label: &str,
    color_attachments: &[Option<wgpu::RenderPassColorAttachment<'_>>],
    depth_stencil_attachment: Option<wgpu::RenderPassDepthStencilAttachment<'_>>,
) -> wgpu::RenderPass<'e> {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments,
        depth_stencil_attachment,
        timestamp_writes: None,
        occlusion_query_set: None,
        multiview_mask: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::{ProgramDesc, reflect};

    #[test]
    fn test_fullscreen_source_validates() {
        let fragment = r#"
            @fragment
            fn fs_main(in: FullscreenOut) -> @location(0) vec4<f32> {
                return vec4<f32>(in.uv, 0.0, 1.0);
            }
        "#;
        let result = reflect(&ProgramDesc {
            label: "fullscreen",
            sources: &[FULLSCREEN_VERTEX_SOURCE, fragment],
            vertex: "vs_fullscreen",
            fragment: Some("fs_main"),
        });
        assert!(result.is_ok());
    }

    #[test]
    fn test_fullscreen_triangle_covers_uv_square() {
        let corners: Vec<(f32, f32)> = (0u32..3)
            .map(|idx| (((idx << 1) & 2) as f32, (idx & 2) as f32))
            .collect();
        assert_eq!(corners, vec![(0.0, 0.0), (2.0, 0.0), (0.0, 2.0)]);
    }
}
