//! Fixed texture and sampler bindings shared by Rust binding code and WGSL.
//!
//! Every sampled resource a fullscreen pass reads has one [`SamplerSlot`]
//! with a binding index that never changes. Passes pick the subset they
//! need, and both the bind group layout and the WGSL declarations for that
//! subset are generated from the same table, so the two cannot drift.

use std::fmt::Write as _;

use crate::error::RenderError;
use crate::shader::TEXTURES_GROUP;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SamplerSlot {
    GBufferPosition,
    GBufferNormal,
    GBufferAlbedoSpec,
    GBufferMaterial,
    Ssao,
    ShadowDirectional,
    ShadowPoint,
    Irradiance,
    Prefilter,
    BrdfLut,
    LinearSampler,
    ShadowSampler,
    SsaoNoise,
    SsaoRaw,
    HdrColor,
    Bloom,
    Environment,
    BlurSource,
}

enum SlotKind {
    Texture2d,
    TextureCube,
    Depth2d,
    DepthCube,
    Filtering,
    Comparison,
}

impl SamplerSlot {
    pub const ALL: [SamplerSlot; 18] = [
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
        SamplerSlot::SsaoNoise,
        SamplerSlot::SsaoRaw,
        SamplerSlot::HdrColor,
        SamplerSlot::Bloom,
        SamplerSlot::Environment,
        SamplerSlot::BlurSource,
    ];

    /// Binding index inside [`TEXTURES_GROUP`].
    pub fn binding(self) -> u32 {
        self as u32
    }

    /// Variable name in generated WGSL.
    pub fn wgsl_name(self) -> &'static str {
        match self {
            SamplerSlot::GBufferPosition => "g_position",
            SamplerSlot::GBufferNormal => "g_normal",
            SamplerSlot::GBufferAlbedoSpec => "g_albedo_spec",
            SamplerSlot::GBufferMaterial => "g_material",
            SamplerSlot::Ssao => "ssao_map",
            SamplerSlot::ShadowDirectional => "shadow_map",
            SamplerSlot::ShadowPoint => "shadow_cube",
            SamplerSlot::Irradiance => "irradiance_map",
            SamplerSlot::Prefilter => "prefilter_map",
            SamplerSlot::BrdfLut => "brdf_lut",
            SamplerSlot::LinearSampler => "linear_sampler",
            SamplerSlot::ShadowSampler => "shadow_sampler",
            SamplerSlot::SsaoNoise => "noise_tex",
            SamplerSlot::SsaoRaw => "ssao_input",
            SamplerSlot::HdrColor => "hdr_color",
            SamplerSlot::Bloom => "bloom_tex",
            SamplerSlot::Environment => "environment_map",
            SamplerSlot::BlurSource => "blur_source",
        }
    }

    fn kind(self) -> SlotKind {
        match self {
            SamplerSlot::ShadowDirectional => SlotKind::Depth2d,
            SamplerSlot::ShadowPoint => SlotKind::DepthCube,
            SamplerSlot::Irradiance | SamplerSlot::Prefilter | SamplerSlot::Environment => {
                SlotKind::TextureCube
            }
            SamplerSlot::LinearSampler => SlotKind::Filtering,
            SamplerSlot::ShadowSampler => SlotKind::Comparison,
            _ => SlotKind::Texture2d,
        }
    }

    fn wgsl_type(self) -> &'static str {
        match self.kind() {
            SlotKind::Texture2d => "texture_2d<f32>",
            SlotKind::TextureCube => "texture_cube<f32>",
            SlotKind::Depth2d => "texture_depth_2d",
            SlotKind::DepthCube => "texture_depth_cube",
            SlotKind::Filtering => "sampler",
            SlotKind::Comparison => "sampler_comparison",
        }
    }

    fn binding_type(self) -> wgpu::BindingType {
        let texture = |sample_type, view_dimension| wgpu::BindingType::Texture {
            sample_type,
            view_dimension,
            multisampled: false,
        };
        // Rgba32Float noise is not filterable without an optional feature.
        let color = if self == SamplerSlot::SsaoNoise {
            wgpu::TextureSampleType::Float { filterable: false }
        } else {
            wgpu::TextureSampleType::Float { filterable: true }
        };
        match self.kind() {
            SlotKind::Texture2d => texture(color, wgpu::TextureViewDimension::D2),
            SlotKind::TextureCube => texture(color, wgpu::TextureViewDimension::Cube),
            SlotKind::Depth2d => texture(
                wgpu::TextureSampleType::Depth,
                wgpu::TextureViewDimension::D2,
            ),
            SlotKind::DepthCube => texture(
                wgpu::TextureSampleType::Depth,
                wgpu::TextureViewDimension::Cube,
            ),
            SlotKind::Filtering => {
                wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering)
            }
            SlotKind::Comparison => {
                wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison)
            }
        }
    }
}

/// WGSL `var` declarations for `slots` at [`TEXTURES_GROUP`].
pub fn wgsl_declarations(slots: &[SamplerSlot]) -> String {
    let mut out = String::new();
    for slot in slots {
        let _ = writeln!(
            out,
            "@group({TEXTURES_GROUP}) @binding({}) var {}: {};",
            slot.binding(),
            slot.wgsl_name(),
            slot.wgsl_type()
        );
    }
    out
}

pub fn bind_group_layout(
    device: &wgpu::Device,
    label: &str,
    slots: &[SamplerSlot],
) -> wgpu::BindGroupLayout {
    let entries: Vec<wgpu::BindGroupLayoutEntry> = slots
        .iter()
        .map(|slot| wgpu::BindGroupLayoutEntry {
            binding: slot.binding(),
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: slot.binding_type(),
            count: None,
        })
        .collect();
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &entries,
    })
}

/// A resource bound to one slot.
pub enum SlotResource<'a> {
    View(&'a wgpu::TextureView),
    Sampler(&'a wgpu::Sampler),
}

/// Build a bind group, checking that every slot of the layout is filled once.
pub fn bind_group(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::BindGroupLayout,
    slots: &[SamplerSlot],
    resources: &[(SamplerSlot, SlotResource<'_>)],
) -> Result<wgpu::BindGroup, RenderError> {
    check_coverage(label, slots, resources.iter().map(|(slot, _)| *slot))?;
    let entries: Vec<wgpu::BindGroupEntry> = resources
        .iter()
        .map(|(slot, resource)| wgpu::BindGroupEntry {
            binding: slot.binding(),
            resource: match resource {
                SlotResource::View(view) => wgpu::BindingResource::TextureView(view),
                SlotResource::Sampler(sampler) => wgpu::BindingResource::Sampler(sampler),
            },
        })
        .collect();
    Ok(device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &entries,
    }))
}

fn check_coverage(
    label: &str,
    slots: &[SamplerSlot],
    provided: impl Iterator<Item = SamplerSlot>,
) -> Result<(), RenderError> {
    let mut seen = Vec::with_capacity(slots.len());
    for slot in provided {
        if !slots.contains(&slot) {
            return Err(RenderError::creation(
                label,
                format!("{slot:?} is not part of this pass"),
            ));
        }
        if seen.contains(&slot) {
            return Err(RenderError::creation(label, format!("{slot:?} bound twice")));
        }
        seen.push(slot);
    }
    if let Some(missing) = slots.iter().find(|slot| !seen.contains(slot)) {
        return Err(RenderError::creation(label, format!("{missing:?} not bound")));
    }
    Ok(())
}
