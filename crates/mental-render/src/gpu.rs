//! GPU device and presentation surface.
//!
//! [`RenderContext`] owns the wgpu instance, device and window surface. The
//! deferred pipeline renders into `Rgba16Float` and `Depth32Float` targets, so
//! adapters that cannot filter, blend or render those formats are rejected
//! up front instead of failing at the first pass.

use std::sync::Arc;

use winit::window::Window;

use crate::target::{DepthBuffer, HDR_FORMAT};

#[derive(Debug, thiserror::Error)]
pub enum RenderContextError {
    #[error("no compatible GPU adapter found")]
    NoAdapter,

    #[error("failed to request GPU device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    #[error("failed to create surface: {0}")]
    SurfaceCreation(#[from] wgpu::CreateSurfaceError),

    #[error("adapter lacks {missing} support for {format:?}")]
    UnsupportedFormat {
        format: wgpu::TextureFormat,
        missing: &'static str,
    },
}

/// Failure to acquire the next frame.
#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    #[error("surface lost")]
    Lost,

    #[error("out of memory")]
    OutOfMemory,

    /// Recoverable: skip the frame.
    #[error("timeout")]
    Timeout,
}

/// Usage and feature flags the renderer needs for one texture format.
#[derive(Debug, Clone, Copy)]
pub struct FormatRequirement {
    pub format: wgpu::TextureFormat,
    pub usages: wgpu::TextureUsages,
    pub flags: wgpu::TextureFormatFeatureFlags,
}

/// HDR targets are sampled with filtering (bloom, IBL) and blended into
/// (transparency); depth is rendered and copied for the forward blit.
pub const REQUIRED_FORMATS: [FormatRequirement; 2] = [
    FormatRequirement {
        format: HDR_FORMAT,
        usages: wgpu::TextureUsages::RENDER_ATTACHMENT.union(wgpu::TextureUsages::TEXTURE_BINDING),
        flags: wgpu::TextureFormatFeatureFlags::FILTERABLE.union(wgpu::TextureFormatFeatureFlags::BLENDABLE),
    },
    FormatRequirement {
        format: DepthBuffer::FORMAT,
        usages: wgpu::TextureUsages::RENDER_ATTACHMENT
            .union(wgpu::TextureUsages::TEXTURE_BINDING)
            .union(wgpu::TextureUsages::COPY_SRC),
        flags: wgpu::TextureFormatFeatureFlags::empty(),
    },
];

impl FormatRequirement {
    /// The first missing capability, if any.
    pub fn check(&self, features: &wgpu::TextureFormatFeatures) -> Result<(), RenderContextError> {
        let missing = if !features.allowed_usages.contains(self.usages) {
            Some("usage")
        } else if !features.flags.contains(self.flags) {
            Some("filtering or blending")
        } else {
            None
        };
        match missing {
            Some(missing) => Err(RenderContextError::UnsupportedFormat {
                format: self.format,
                missing,
            }),
            None => Ok(()),
        }
    }
}

fn check_adapter_formats(adapter: &wgpu::Adapter) -> Result<(), RenderContextError> {
    REQUIRED_FORMATS
        .iter()
        .try_for_each(|req| req.check(&adapter.get_texture_format_features(req.format)))
}

fn device_descriptor(label: &str) -> wgpu::DeviceDescriptor<'_> {
    wgpu::DeviceDescriptor {
        label: Some(label),
        required_features: wgpu::Features::empty(),
        required_limits: wgpu::Limits::default(),
        memory_hints: wgpu::MemoryHints::default(),
        experimental_features: wgpu::ExperimentalFeatures::default(),
        trace: wgpu::Trace::Off,
    }
}

pub struct RenderContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub surface: wgpu::Surface<'static>,
    pub surface_config: wgpu::SurfaceConfiguration,
    pub surface_format: wgpu::TextureFormat,
}

impl RenderContext {
    pub async fn new(window: Arc<Window>, vsync: bool) -> Result<Self, RenderContextError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let size = window.inner_size();
        let surface = instance.create_surface(window)?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| RenderContextError::NoAdapter)?;
        let info = adapter.get_info();
        log::info!("Selected GPU: {} ({:?}, {:?})", info.name, info.backend, info.device_type);
        check_adapter_formats(&adapter)?;

        let (device, queue) = adapter.request_device(&device_descriptor("mental-device")).await?;

        let caps = surface.get_capabilities(&adapter);
        let surface_format = select_preferred_srgb_format(&caps.formats);
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: select_present_mode(&caps.present_modes, vsync),
            alpha_mode: select_alpha_mode(&caps.alpha_modes),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);
        log::info!(
            "Surface {}x{} {:?} {:?}",
            surface_config.width,
            surface_config.height,
            surface_format,
            surface_config.present_mode
        );

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            surface,
            surface_config,
            surface_format,
        })
    }

    /// Reconfigure the surface. Zero sizes are clamped to 1.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.surface_config.width = width.max(1);
        self.surface_config.height = height.max(1);
        self.surface.configure(&self.device, &self.surface_config);
    }

    pub fn size(&self) -> (u32, u32) {
        (self.surface_config.width, self.surface_config.height)
    }

    /// The next frame, reconfiguring once if the surface was lost or outdated.
    pub fn get_current_texture(&self) -> Result<wgpu::SurfaceTexture, SurfaceError> {
        match self.surface.get_current_texture() {
            Ok(texture) => Ok(texture),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("Surface lost or outdated, reconfiguring");
                self.surface.configure(&self.device, &self.surface_config);
                self.surface.get_current_texture().map_err(|_| SurfaceError::Lost)
            }
            Err(wgpu::SurfaceError::OutOfMemory) => Err(SurfaceError::OutOfMemory),
            Err(wgpu::SurfaceError::Timeout) => Err(SurfaceError::Timeout),
            Err(wgpu::SurfaceError::Other) => {
                log::error!("Unknown surface error");
                Err(SurfaceError::Lost)
            }
        }
    }
}

pub fn init_render_context_blocking(
    window: Arc<Window>,
    vsync: bool,
) -> Result<RenderContext, RenderContextError> {
    pollster::block_on(RenderContext::new(window, vsync))
}

/// Composite passes write linear values, so an sRGB surface does the encoding.
fn select_preferred_srgb_format(formats: &[wgpu::TextureFormat]) -> wgpu::TextureFormat {
    [wgpu::TextureFormat::Bgra8UnormSrgb, wgpu::TextureFormat::Rgba8UnormSrgb]
        .into_iter()
        .find(|f| formats.contains(f))
        .or_else(|| formats.iter().copied().find(|f| f.is_srgb()))
        .or_else(|| formats.first().copied())
        .unwrap_or(wgpu::TextureFormat::Bgra8UnormSrgb)
}

fn select_present_mode(modes: &[wgpu::PresentMode], vsync: bool) -> wgpu::PresentMode {
    if vsync {
        return wgpu::PresentMode::Fifo;
    }
    [wgpu::PresentMode::Mailbox, wgpu::PresentMode::Immediate]
        .into_iter()
        .find(|m| modes.contains(m))
        .unwrap_or(wgpu::PresentMode::Fifo)
}

fn select_alpha_mode(modes: &[wgpu::CompositeAlphaMode]) -> wgpu::CompositeAlphaMode {
    if modes.contains(&wgpu::CompositeAlphaMode::Opaque) {
        wgpu::CompositeAlphaMode::Opaque
    } else {
        modes.first().copied().unwrap_or(wgpu::CompositeAlphaMode::Auto)
    }
}

/// Headless device for tests, or `None` without a usable adapter.
#[cfg(test)]
pub(crate) fn create_test_device_queue() -> Option<(wgpu::Device, wgpu::Queue)> {
    pollster::block_on(async {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await
            .ok()?;
        check_adapter_formats(&adapter).ok()?;
        adapter.request_device(&device_descriptor("mental-test-device")).await.ok()
    })
}
