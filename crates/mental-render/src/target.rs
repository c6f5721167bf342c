//! Off-screen render targets: single color, reverse-Z depth, the HDR MRT
//! pair and cubemaps.
//!
//! A target is "bound" by beginning a render pass with its views. Every
//! multi-attachment target checks its attachments with
//! [`validate_attachments`] when it is created.

use crate::error::RenderError;

/// Format of all HDR intermediates.
pub const HDR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

fn create_2d(
    device: &wgpu::Device,
    label: &str,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
    usage: wgpu::TextureUsages,
) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

/// Check that a set of attachments can be rendered together.
///
/// Fails with [`RenderError::FramebufferIncomplete`] when the list is empty,
/// any attachment has a zero extent, or the extents differ.
pub fn validate_attachments(name: &str, attachments: &[&wgpu::Texture]) -> Result<(), RenderError> {
    let incomplete = |reason: String| {
        log::error!("Render target '{name}' is incomplete: {reason}");
        RenderError::FramebufferIncomplete {
            target: name.to_string(),
            reason,
        }
    };
    let Some(first) = attachments.first() else {
        return Err(incomplete("no attachments".to_string()));
    };
    let size = (first.width(), first.height());
    for texture in attachments {
        let this = (texture.width(), texture.height());
        if this.0 == 0 || this.1 == 0 {
            return Err(incomplete(format!("attachment has zero size {}x{}", this.0, this.1)));
        }
        if this != size {
            return Err(incomplete(format!(
                "attachment sizes differ: {}x{} vs {}x{}",
                size.0, size.1, this.0, this.1
            )));
        }
    }
    Ok(())
}

/// One sampled color attachment.
pub struct ColorTarget {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub format: wgpu::TextureFormat,
}

impl ColorTarget {
    pub fn new(
        device: &wgpu::Device,
        label: &str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
    ) -> Self {
        let (texture, view) = create_2d(
            device,
            label,
            width,
            height,
            format,
            wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
        );
        Self {
            texture,
            view,
            format,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.texture.width(), self.texture.height())
    }

    pub fn attachment(&self, clear: wgpu::Color) -> wgpu::RenderPassColorAttachment<'_> {
        wgpu::RenderPassColorAttachment {
            view: &self.view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(clear),
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        }
    }
}

/// Reverse-Z camera depth buffer: near maps to 1.0, far to 0.0.
pub struct DepthBuffer {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    width: u32,
    height: u32,
}

impl DepthBuffer {
    pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    /// 0.0 is the far plane.
    pub const CLEAR_VALUE: f32 = 0.0;

    /// Closer fragments have higher depth values.
    pub const COMPARE_FUNCTION: wgpu::CompareFunction = wgpu::CompareFunction::GreaterEqual;

    pub fn new(device: &wgpu::Device, label: &str, width: u32, height: u32) -> Self {
        let (texture, view) = create_2d(
            device,
            label,
            width,
            height,
            Self::FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
        );
        Self {
            texture,
            view,
            width,
            height,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Attachment that clears to the far plane.
    pub fn clear_attachment(&self) -> wgpu::RenderPassDepthStencilAttachment<'_> {
        self.attachment(wgpu::LoadOp::Clear(Self::CLEAR_VALUE), wgpu::StoreOp::Store)
    }

    /// Attachment that keeps existing depth (after a blit) and stores nothing new.
    pub fn load_attachment(&self) -> wgpu::RenderPassDepthStencilAttachment<'_> {
        self.attachment(wgpu::LoadOp::Load, wgpu::StoreOp::Store)
    }

    fn attachment(
        &self,
        load: wgpu::LoadOp<f32>,
        store: wgpu::StoreOp,
    ) -> wgpu::RenderPassDepthStencilAttachment<'_> {
        wgpu::RenderPassDepthStencilAttachment {
            view: &self.view,
            depth_ops: Some(wgpu::Operations { load, store }),
            stencil_ops: None,
        }
    }

    /// Depth-stencil state for pipelines drawing against this buffer.
    pub fn state(write: bool, compare: wgpu::CompareFunction) -> wgpu::DepthStencilState {
        wgpu::DepthStencilState {
            format: Self::FORMAT,
            depth_write_enabled: write,
            depth_compare: compare,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }
    }

    /// Copy another buffer's depth into this one. Sizes must match.
    pub fn blit_from(&self, encoder: &mut wgpu::CommandEncoder, source: &DepthBuffer) {
        encoder.copy_texture_to_texture(
            source.texture.as_image_copy(),
            self.texture.as_image_copy(),
            wgpu::Extent3d {
                width: self.width.min(source.width),
                height: self.height.min(source.height),
                depth_or_array_layers: 1,
            },
        );
    }
}

/// Lighting-pass output: HDR color plus the bright-pass buffer feeding bloom.
pub struct HdrTarget {
    pub color: ColorTarget,
    pub bright: ColorTarget,
}

impl HdrTarget {
    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Result<Self, RenderError> {
        let color = ColorTarget::new(device, "hdr-color", width, height, HDR_FORMAT);
        let bright = ColorTarget::new(device, "hdr-bright", width, height, HDR_FORMAT);
        validate_attachments("hdr", &[&color.texture, &bright.texture])?;
        log::debug!("Created HDR target {width}x{height}");
        Ok(Self { color, bright })
    }

    pub fn color_targets() -> [Option<wgpu::ColorTargetState>; 2] {
        [
            Some(wgpu::ColorTargetState {
                format: HDR_FORMAT,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            }),
            Some(wgpu::ColorTargetState {
                format: HDR_FORMAT,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            }),
        ]
    }

    pub fn clear_attachments(&self) -> [Option<wgpu::RenderPassColorAttachment<'_>>; 2] {
        [
            Some(self.color.attachment(wgpu::Color::TRANSPARENT)),
            Some(self.bright.attachment(wgpu::Color::TRANSPARENT)),
        ]
    }

    /// Attachments that keep the lighting result for forward drawing.
    pub fn load_attachments<'a>(&'a self) -> [Option<wgpu::RenderPassColorAttachment<'a>>; 2] {
        let load = |target: &'a ColorTarget| wgpu::RenderPassColorAttachment {
            view: &target.view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Load,
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        };
        [Some(load(&self.color)), Some(load(&self.bright))]
    }
}

/// Six-layer cube texture with per-face, per-mip attachment views.
pub struct Cubemap {
    pub texture: wgpu::Texture,
    /// Cube view over every mip, for sampling.
    pub view: wgpu::TextureView,
    pub size: u32,
    pub format: wgpu::TextureFormat,
    /// `face_views[mip][face]`.
    face_views: Vec<[wgpu::TextureView; 6]>,
}

impl Cubemap {
    pub fn new(
        device: &wgpu::Device,
        label: &str,
        size: u32,
        mip_level_count: u32,
        format: wgpu::TextureFormat,
        extra_usage: wgpu::TextureUsages,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 6,
            },
            mip_level_count,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | extra_usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(label),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            array_layer_count: Some(6),
            ..Default::default()
        });
        let face_views = (0..mip_level_count)
            .map(|mip| {
                std::array::from_fn(|face| {
                    texture.create_view(&wgpu::TextureViewDescriptor {
                        label: Some(label),
                        dimension: Some(wgpu::TextureViewDimension::D2),
                        base_mip_level: mip,
                        mip_level_count: Some(1),
                        base_array_layer: face as u32,
                        array_layer_count: Some(1),
                        ..Default::default()
                    })
                })
            })
            .collect();
        Self {
            texture,
            view,
            size,
            format,
            face_views,
        }
    }

    pub fn mip_level_count(&self) -> u32 {
        self.face_views.len() as u32
    }

    /// Edge length of one face at `mip`.
    pub fn mip_size(&self, mip: u32) -> u32 {
        (self.size >> mip).max(1)
    }

    /// Attachment view of one face at one mip level.
    pub fn face_view(&self, mip: u32, face: u32) -> &wgpu::TextureView {
        &self.face_views[mip as usize][face as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::create_test_device_queue;

    #[test]
    fn test_depth_constants() {
        assert_eq!(DepthBuffer::FORMAT, wgpu::TextureFormat::Depth32Float);
        assert_eq!(DepthBuffer::CLEAR_VALUE, 0.0);
        assert_eq!(
            DepthBuffer::COMPARE_FUNCTION,
            wgpu::CompareFunction::GreaterEqual
        );
    }

    #[test]
    fn test_validate_rejects_mismatched_sizes() {
        let Some((device, _queue)) = create_test_device_queue() else {
            return;
        };
        let a = ColorTarget::new(&device, "a", 64, 32, HDR_FORMAT);
        let b = ColorTarget::new(&device, "b", 64, 32, wgpu::TextureFormat::Rgba8Unorm);
        let c = ColorTarget::new(&device, "c", 32, 32, HDR_FORMAT);
        assert!(validate_attachments("ok", &[&a.texture, &b.texture]).is_ok());
        assert!(matches!(
            validate_attachments("bad", &[&a.texture, &c.texture]),
            Err(RenderError::FramebufferIncomplete { .. })
        ));
        assert!(matches!(
            validate_attachments("empty", &[]),
            Err(RenderError::FramebufferIncomplete { .. })
        ));
    }

    #[test]
    fn test_hdr_target_sizes() {
        let Some((device, _queue)) = create_test_device_queue() else {
            return;
        };
        let hdr = HdrTarget::new(&device, 40, 30).unwrap();
        assert_eq!(hdr.color.size(), (40, 30));
        assert_eq!(hdr.bright.size(), (40, 30));
    }

    #[test]
    fn test_cubemap_mip_views() {
        let Some((device, _queue)) = create_test_device_queue() else {
            return;
        };
        let cube = Cubemap::new(
            &device,
            "cube",
            64,
            3,
            HDR_FORMAT,
            wgpu::TextureUsages::empty(),
        );
        assert_eq!(cube.mip_level_count(), 3);
        assert_eq!(cube.mip_size(2), 16);
        assert_eq!(cube.texture.depth_or_array_layers(), 6);
    }
}
