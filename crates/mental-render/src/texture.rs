//! GPU textures: file loading, a path-keyed cache, role defaults and mipmaps.
//!
//! [`TextureCache::load`] decodes an image once per (canonical path, color
//! space, flip) and hands out [`Arc<Texture>`] clones afterwards. Per-model
//! textures go through [`TextureCache::load_or_default`], which logs a
//! failure and substitutes the role's 1x1 default instead of failing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use half::f16;

use crate::error::RenderError;

/// Semantic role of a material texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureRole {
    Albedo,
    Specular,
    Metallic,
    Roughness,
    AmbientOcclusion,
    Normal,
    Height,
}

impl TextureRole {
    pub const ALL: [TextureRole; 7] = [
        TextureRole::Albedo,
        TextureRole::Specular,
        TextureRole::Metallic,
        TextureRole::Roughness,
        TextureRole::AmbientOcclusion,
        TextureRole::Normal,
        TextureRole::Height,
    ];

    /// Texel used when a material leaves this role unassigned.
    pub fn default_texel(self) -> [u8; 4] {
        match self {
            TextureRole::Albedo | TextureRole::Roughness | TextureRole::AmbientOcclusion => {
                [255, 255, 255, 255]
            }
            TextureRole::Specular | TextureRole::Metallic | TextureRole::Height => [0, 0, 0, 255],
            TextureRole::Normal => [128, 128, 255, 255],
        }
    }

    /// Only albedo is authored in sRGB; everything else is linear data.
    pub fn is_color(self) -> bool {
        self == TextureRole::Albedo
    }
}

/// Options for loading a texture from disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureLoadOptions {
    pub flip_vertically: bool,
    pub srgb: bool,
    pub generate_mipmaps: bool,
}

impl Default for TextureLoadOptions {
    fn default() -> Self {
        Self {
            flip_vertically: false,
            srgb: true,
            generate_mipmaps: true,
        }
    }
}

impl TextureLoadOptions {
    /// Defaults appropriate for `role`: sRGB only for color data.
    pub fn for_role(role: TextureRole) -> Self {
        Self {
            srgb: role.is_color(),
            ..Self::default()
        }
    }
}

/// A GPU texture with its default view. Released when dropped.
#[derive(Debug)]
pub struct Texture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    /// Width and height in texels.
    pub size: (u32, u32),
    pub format: wgpu::TextureFormat,
    pub mip_level_count: u32,
    pub role: Option<TextureRole>,
}

/// Raw texel data for a 2D texture.
pub struct TextureData<'a> {
    pub label: &'a str,
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
}

impl Texture {
    /// Upload tightly packed texels. Mipmaps are generated when `mipmaps` is given.
    pub fn from_data(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        source: &TextureData<'_>,
        role: Option<TextureRole>,
        mipmaps: Option<&mut MipmapGenerator>,
    ) -> Result<Self, RenderError> {
        let TextureData {
            label,
            data,
            width,
            height,
            format,
        } = *source;
        validate_dimensions(label, width, height)?;
        validate_data_size(label, data, width, height, format)?;

        let mip_levels = if mipmaps.is_some() {
            mip_level_count(width, height)
        } else {
            1
        };

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: mip_levels,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row(width, format)),
                rows_per_image: None,
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );

        if let Some(generator) = mipmaps
            && mip_levels > 1
        {
            generator.generate(device, queue, &texture);
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        log::debug!("Created texture '{label}' ({width}x{height}, {mip_levels} mips)");
        Ok(Self {
            texture,
            view,
            size: (width, height),
            format,
            mip_level_count: mip_levels,
            role,
        })
    }

    /// A 1x1 texture of the role's default texel.
    pub fn default_for_role(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        role: TextureRole,
    ) -> Result<Self, RenderError> {
        let format = if role.is_color() {
            wgpu::TextureFormat::Rgba8UnormSrgb
        } else {
            wgpu::TextureFormat::Rgba8Unorm
        };
        let texel = role.default_texel();
        Self::from_data(
            device,
            queue,
            &TextureData {
                label: &format!("default-{role:?}"),
                data: &texel,
                width: 1,
                height: 1,
                format,
            },
            Some(role),
            None,
        )
    }
}

/// Calculates the number of mip levels for the given dimensions.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    (width.max(height) as f32).log2().floor() as u32 + 1
}

fn bytes_per_row(width: u32, format: wgpu::TextureFormat) -> u32 {
    width * format.block_copy_size(None).unwrap_or(4)
}

fn validate_dimensions(label: &str, width: u32, height: u32) -> Result<(), RenderError> {
    if width == 0 || height == 0 {
        return Err(RenderError::creation(
            label,
            format!("texture dimensions must be non-zero, got {width}x{height}"),
        ));
    }
    Ok(())
}

fn validate_data_size(
    label: &str,
    data: &[u8],
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
) -> Result<(), RenderError> {
    let expected = (bytes_per_row(width, format) * height) as usize;
    if data.len() != expected {
        return Err(RenderError::creation(
            label,
            format!(
                "texture data size ({}) does not match expected ({expected}) for {width}x{height} {format:?}",
                data.len()
            ),
        ));
    }
    Ok(())
}

/// Decoded 8-bit RGBA pixels.
#[derive(Debug)]
pub struct DecodedImage {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

fn open_image(path: &Path, flip_vertically: bool) -> Result<image::DynamicImage, RenderError> {
    if !path.is_file() {
        return Err(RenderError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let decode_error = |message: String| RenderError::ImageDecode {
        path: path.to_path_buf(),
        message,
    };
    let image = image::ImageReader::open(path)
        .map_err(|e| decode_error(e.to_string()))?
        .with_guessed_format()
        .map_err(|e| decode_error(e.to_string()))?
        .decode()
        .map_err(|e| decode_error(e.to_string()))?;
    Ok(if flip_vertically { image.flipv() } else { image })
}

/// Decode any supported image file to RGBA8.
pub fn decode_rgba8(path: &Path, flip_vertically: bool) -> Result<DecodedImage, RenderError> {
    let rgba = open_image(path, flip_vertically)?.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(DecodedImage {
        pixels: rgba.into_raw(),
        width,
        height,
    })
}

/// Decode a (Radiance HDR) image to half-float RGBA texels.
pub fn decode_rgba16f(path: &Path, flip_vertically: bool) -> Result<(Vec<f16>, u32, u32), RenderError> {
    let rgba = open_image(path, flip_vertically)?.to_rgba32f();
    let (width, height) = rgba.dimensions();
    let halves = rgba.into_raw().into_iter().map(f16::from_f32).collect();
    Ok((halves, width, height))
}

/// Load an equirectangular HDR environment as an `Rgba16Float` texture.
pub fn load_hdr_equirect(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    path: &Path,
    flip_vertically: bool,
) -> Result<Texture, RenderError> {
    let (texels, width, height) = decode_rgba16f(path, flip_vertically)?;
    log::info!("Loaded HDR environment {} ({width}x{height})", path.display());
    Texture::from_data(
        device,
        queue,
        &TextureData {
            label: "hdr-equirect",
            data: bytemuck::cast_slice(&texels),
            width,
            height,
            format: wgpu::TextureFormat::Rgba16Float,
        },
        None,
        None,
    )
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct CacheKey {
    path: PathBuf,
    srgb: bool,
    flip_vertically: bool,
}

/// Path-keyed texture cache with per-role defaults.
pub struct TextureCache {
    textures: HashMap<CacheKey, Arc<Texture>>,
    defaults: HashMap<TextureRole, Arc<Texture>>,
    mipmaps: MipmapGenerator,
}

impl TextureCache {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Result<Self, RenderError> {
        let defaults = TextureRole::ALL
            .into_iter()
            .map(|role| Ok((role, Arc::new(Texture::default_for_role(device, queue, role)?))))
            .collect::<Result<_, RenderError>>()?;
        Ok(Self {
            textures: HashMap::new(),
            defaults,
            mipmaps: MipmapGenerator::new(device),
        })
    }

    /// Load `path`, or return the cached texture for the same canonical path.
    pub fn load(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        path: &Path,
        role: TextureRole,
        options: TextureLoadOptions,
    ) -> Result<Arc<Texture>, RenderError> {
        let canonical = path.canonicalize().map_err(|_| RenderError::FileNotFound {
            path: path.to_path_buf(),
        })?;
        let key = CacheKey {
            path: canonical,
            srgb: options.srgb,
            flip_vertically: options.flip_vertically,
        };
        if let Some(existing) = self.textures.get(&key) {
            log::debug!("Texture cache hit: {}", path.display());
            return Ok(Arc::clone(existing));
        }
        log::debug!("Texture cache miss: {}", path.display());

        let decoded = decode_rgba8(&key.path, options.flip_vertically)?;
        let format = if options.srgb {
            wgpu::TextureFormat::Rgba8UnormSrgb
        } else {
            wgpu::TextureFormat::Rgba8Unorm
        };
        let label = path.display().to_string();
        let texture = Texture::from_data(
            device,
            queue,
            &TextureData {
                label: &label,
                data: &decoded.pixels,
                width: decoded.width,
                height: decoded.height,
                format,
            },
            Some(role),
            options.generate_mipmaps.then_some(&mut self.mipmaps),
        )?;
        let texture = Arc::new(texture);
        self.textures.insert(key, Arc::clone(&texture));
        Ok(texture)
    }

    /// Like [`load`](Self::load), but a missing or undecodable file yields the role default.
    pub fn load_or_default(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        path: &Path,
        role: TextureRole,
        options: TextureLoadOptions,
    ) -> Arc<Texture> {
        match self.load(device, queue, path, role, options) {
            Ok(texture) => texture,
            Err(e) => {
                log::warn!("{e}; using default {role:?} texture");
                self.default_texture(role)
            }
        }
    }

    pub fn default_texture(&self, role: TextureRole) -> Arc<Texture> {
        // Every role is inserted in `new`.
        Arc::clone(&self.defaults[&role])
    }

    pub fn mipmaps(&mut self) -> &mut MipmapGenerator {
        &mut self.mipmaps
    }

    /// Number of distinct textures loaded from disk.
    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}

const BLIT_SHADER_SOURCE: &str = r#"
@group(0) @binding(0) var src_texture: texture_2d<f32>;
@group(0) @binding(1) var src_sampler: sampler;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) idx: u32) -> VertexOutput {
    let uv = vec2<f32>(f32((idx << 1u) & 2u), f32(idx & 2u));
    var out: VertexOutput;
    out.position = vec4<f32>(uv * 2.0 - 1.0, 0.0, 1.0);
    out.uv = vec2<f32>(uv.x, 1.0 - uv.y);
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(src_texture, src_sampler, in.uv);
}
"#;

/// Builds mip chains by blitting each level into the next, per array layer.
pub struct MipmapGenerator {
    shader: wgpu::ShaderModule,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    sampler: wgpu::Sampler,
    pipelines: HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
}

impl MipmapGenerator {
    pub fn new(device: &wgpu::Device) -> Self {
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("blit-bind-group-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("blit-shader"),
            source: wgpu::ShaderSource::Wgsl(BLIT_SHADER_SOURCE.into()),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("blit-pipeline-layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("blit-sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        Self {
            shader,
            bind_group_layout,
            pipeline_layout,
            sampler,
            pipelines: HashMap::new(),
        }
    }

    fn pipeline<'a>(
        pipelines: &'a mut HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
        device: &wgpu::Device,
        shader: &wgpu::ShaderModule,
        layout: &wgpu::PipelineLayout,
        format: wgpu::TextureFormat,
    ) -> &'a wgpu::RenderPipeline {
        pipelines.entry(format).or_insert_with(|| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("mipmap-pipeline"),
                layout: Some(layout),
                vertex: wgpu::VertexState {
                    module: shader,
                    entry_point: Some("vs_main"),
                    buffers: &[],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                multiview_mask: None,
                cache: None,
            })
        })
    }

    /// Fill mips 1.. of every layer from mip 0. Submits its own command buffer.
    pub fn generate(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, texture: &wgpu::Texture) {
        let mip_count = texture.mip_level_count();
        let layers = texture.depth_or_array_layers();
        let format = texture.format();
        let Self {
            shader,
            bind_group_layout,
            pipeline_layout,
            sampler,
            pipelines,
        } = self;
        let pipeline = Self::pipeline(pipelines, device, shader, pipeline_layout, format);

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("mipmap-encoder"),
        });
        for layer in 0..layers {
            for level in 1..mip_count {
                let level_view = |mip: u32| {
                    texture.create_view(&wgpu::TextureViewDescriptor {
                        dimension: Some(wgpu::TextureViewDimension::D2),
                        base_mip_level: mip,
                        mip_level_count: Some(1),
                        base_array_layer: layer,
                        array_layer_count: Some(1),
                        ..Default::default()
                    })
                };
                let src_view = level_view(level - 1);
                let dst_view = level_view(level);

                let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("mipmap-bind-group"),
                    layout: bind_group_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(&src_view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::Sampler(sampler),
                        },
                    ],
                });

                let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("mipmap-pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &dst_view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                            store: wgpu::StoreOp::Store,
                        },
                        depth_slice: None,
                    })],
                    ..Default::default()
                });
                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                pass.draw(0..3, 0..1);
            }
        }
        queue.submit(std::iter::once(encoder.finish()));
    }
}
