//! Post-processing: bloom over the bright-pass buffer, then tone mapping
//! into the presentation target, then any overlays.

use glam::Vec3;
use mental_config::BloomConfig;

use crate::error::RenderError;
use crate::pass::{self, FULLSCREEN_VERTEX_SOURCE, PipelineDesc};
use crate::shader::{ProgramDesc, ShaderProgram, TEXTURES_GROUP};
use crate::slots::{self, SamplerSlot, SlotResource};
use crate::target::{ColorTarget, HDR_FORMAT, HdrTarget};
use crate::uniforms::{MATRICES_BLOCK_SOURCE, MatricesBuffer};

/// Center tap followed by the taps at distance 1..=4 on each side.
pub const GAUSSIAN_WEIGHTS: [f32; 5] = [0.227027, 0.1945946, 0.1216216, 0.054054, 0.016216];

const BLUR_SLOTS: [SamplerSlot; 1] = [SamplerSlot::BlurSource];
const COMPOSITE_SLOTS: [SamplerSlot; 2] = [SamplerSlot::HdrColor, SamplerSlot::Bloom];

fn blur_shader() -> String {
    let [w0, w1, w2, w3, w4] = GAUSSIAN_WEIGHTS;
    format!(
        r#"
struct BlurParams {{
    direction: vec2<i32>,
}};
@group(1) @binding(0) var<uniform> params: BlurParams;

@fragment
fn fs_blur(in: FullscreenOut) -> @location(0) vec4<f32> {{
    var weights = array<f32, 5>({w0}, {w1}, {w2}, {w3}, {w4});
    let pixel = vec2<i32>(in.position.xy);
    let last = vec2<i32>(textureDimensions(blur_source)) - vec2<i32>(1);
    var result = textureLoad(blur_source, pixel, 0).rgb * weights[0];
    for (var i = 1; i < 5; i++) {{
        let offset = params.direction * i;
        result += textureLoad(blur_source, clamp(pixel + offset, vec2<i32>(0), last), 0).rgb * weights[i];
        result += textureLoad(blur_source, clamp(pixel - offset, vec2<i32>(0), last), 0).rgb * weights[i];
    }}
    return vec4<f32>(result, 1.0);
}}
"#
    )
}

const COMPOSITE_SHADER: &str = r#"
struct CompositeParams {
    exposure: f32,
    gamma: f32,
    // 1.0 adds the blurred bright-pass buffer
    bloom: f32,
    // 1.0 when the target is not sRGB and gamma must be applied here
    encode_gamma: f32,
    // 1.0 shows debug views without tone mapping
    passthrough: f32,
};
@group(1) @binding(0) var<uniform> params: CompositeParams;

@fragment
fn fs_composite(in: FullscreenOut) -> @location(0) vec4<f32> {
    let pixel = vec2<i32>(in.position.xy);
    var hdr = textureLoad(hdr_color, pixel, 0).rgb;
    var mapped: vec3<f32>;
    if params.passthrough != 0.0 {
        mapped = clamp(hdr, vec3<f32>(0.0), vec3<f32>(1.0));
    } else {
        hdr += textureLoad(bloom_tex, pixel, 0).rgb * params.bloom;
        mapped = vec3<f32>(1.0) - exp(-hdr * params.exposure);
    }
    if params.encode_gamma != 0.0 {
        mapped = pow(mapped, vec3<f32>(1.0 / params.gamma));
    }
    return vec4<f32>(mapped, 1.0);
}
"#;

/// Exposure tone mapping followed by optional gamma encoding.
pub fn tone_map(hdr: Vec3, exposure: f32, gamma: Option<f32>) -> Vec3 {
    let mapped = Vec3::ONE - (-hdr * exposure).exp();
    match gamma {
        Some(gamma) => mapped.powf(1.0 / gamma),
        None => mapped,
    }
}

/// Draws on top of the composited frame, e.g. UI or text.
pub trait OverlayPass {
    fn label(&self) -> &str;

    fn record(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
        size: (u32, u32),
    );
}

/// Tone-mapping controls.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ToneMapping {
    pub exposure: f32,
    pub gamma: f32,
}

impl Default for ToneMapping {
    fn default() -> Self {
        Self {
            exposure: 1.0,
            gamma: 2.2,
        }
    }
}

struct BloomTargets {
    ping: ColorTarget,
    pong: ColorTarget,
    from_bright: wgpu::BindGroup,
    from_ping: wgpu::BindGroup,
    from_pong: wgpu::BindGroup,
    composite: wgpu::BindGroup,
}

pub struct PostProcess {
    bloom_enabled: bool,
    blur_passes: u32,
    horizontal: ShaderProgram,
    vertical: ShaderProgram,
    blur_layout: wgpu::BindGroupLayout,
    horizontal_pipeline: wgpu::RenderPipeline,
    vertical_pipeline: wgpu::RenderPipeline,
    composite_program: ShaderProgram,
    composite_layout: wgpu::BindGroupLayout,
    composite_pipeline: wgpu::RenderPipeline,
    output_format: wgpu::TextureFormat,
    targets: BloomTargets,
}

impl PostProcess {
    pub fn new(
        device: &wgpu::Device,
        matrices: &MatricesBuffer,
        config: &BloomConfig,
        tone_mapping: ToneMapping,
        hdr: &HdrTarget,
        output_format: wgpu::TextureFormat,
    ) -> Result<Self, RenderError> {
        let blur_decls = slots::wgsl_declarations(&BLUR_SLOTS);
        let blur_source = blur_shader();
        let build_blur = |label| {
            ShaderProgram::build(
                device,
                &ProgramDesc {
                    label,
                    sources: &[
                        MATRICES_BLOCK_SOURCE,
                        FULLSCREEN_VERTEX_SOURCE,
                        blur_decls.as_str(),
                        blur_source.as_str(),
                    ],
                    vertex: "vs_fullscreen",
                    fragment: Some("fs_blur"),
                },
            )
            .require()
        };
        let mut horizontal = build_blur("bloom-horizontal")?;
        let mut vertical = build_blur("bloom-vertical")?;
        horizontal.set_uniform("direction", [1i32, 0]);
        vertical.set_uniform("direction", [0i32, 1]);

        let blur_layout = slots::bind_group_layout(device, "bloom-bgl", &BLUR_SLOTS);
        let blur_targets = [pass::opaque_target(HDR_FORMAT)];
        let horizontal_pipeline = pass::create_pipeline(
            device,
            &horizontal,
            &PipelineDesc::fullscreen(
                "bloom-horizontal-pipeline",
                &[matrices.layout(), horizontal.params_layout()?, &blur_layout],
                &blur_targets,
            ),
        )?;
        let vertical_pipeline = pass::create_pipeline(
            device,
            &vertical,
            &PipelineDesc::fullscreen(
                "bloom-vertical-pipeline",
                &[matrices.layout(), vertical.params_layout()?, &blur_layout],
                &blur_targets,
            ),
        )?;

        let composite_decls = slots::wgsl_declarations(&COMPOSITE_SLOTS);
        let composite_program = ShaderProgram::build(
            device,
            &ProgramDesc {
                label: "composite",
                sources: &[
                    MATRICES_BLOCK_SOURCE,
                    FULLSCREEN_VERTEX_SOURCE,
                    composite_decls.as_str(),
                    COMPOSITE_SHADER,
                ],
                vertex: "vs_fullscreen",
                fragment: Some("fs_composite"),
            },
        )
        .require()?;
        let composite_layout = slots::bind_group_layout(device, "composite-bgl", &COMPOSITE_SLOTS);
        let output_targets = [pass::opaque_target(output_format)];
        let composite_pipeline = pass::create_pipeline(
            device,
            &composite_program,
            &PipelineDesc::fullscreen(
                "composite-pipeline",
                &[matrices.layout(), composite_program.params_layout()?, &composite_layout],
                &output_targets,
            ),
        )?;

        let targets = Self::create_targets(device, &blur_layout, &composite_layout, hdr, config.blur_passes)?;
        let mut post = Self {
            bloom_enabled: config.enabled,
            blur_passes: config.blur_passes,
            horizontal,
            vertical,
            blur_layout,
            horizontal_pipeline,
            vertical_pipeline,
            composite_program,
            composite_layout,
            composite_pipeline,
            output_format,
            targets,
        };
        post.set_tone_mapping(tone_mapping);
        post.set_bloom_enabled(config.enabled);
        post.set_passthrough(false);
        post.composite_program
            .set_uniform("encode_gamma", if output_format.is_srgb() { 0.0f32 } else { 1.0 });
        log::info!(
            "Post-process ready: output {output_format:?}, bloom {} ({} passes)",
            if config.enabled { "on" } else { "off" },
            config.blur_passes
        );
        Ok(post)
    }

    fn create_targets(
        device: &wgpu::Device,
        blur_layout: &wgpu::BindGroupLayout,
        composite_layout: &wgpu::BindGroupLayout,
        hdr: &HdrTarget,
        blur_passes: u32,
    ) -> Result<BloomTargets, RenderError> {
        let (width, height) = hdr.color.size();
        let ping = ColorTarget::new(device, "bloom-ping", width, height, HDR_FORMAT);
        let pong = ColorTarget::new(device, "bloom-pong", width, height, HDR_FORMAT);
        let source = |label: &str, view: &wgpu::TextureView| {
            slots::bind_group(
                device,
                label,
                blur_layout,
                &BLUR_SLOTS,
                &[(SamplerSlot::BlurSource, SlotResource::View(view))],
            )
        };
        let from_bright = source("bloom-from-bright", &hdr.bright.view)?;
        let from_ping = source("bloom-from-ping", &ping.view)?;
        let from_pong = source("bloom-from-pong", &pong.view)?;
        let bloom_view = if blur_passes == 0 {
            &hdr.bright.view
        } else {
            &pong.view
        };
        let composite = slots::bind_group(
            device,
            "composite-bg",
            composite_layout,
            &COMPOSITE_SLOTS,
            &[
                (SamplerSlot::HdrColor, SlotResource::View(&hdr.color.view)),
                (SamplerSlot::Bloom, SlotResource::View(bloom_view)),
            ],
        )?;
        Ok(BloomTargets {
            ping,
            pong,
            from_bright,
            from_ping,
            from_pong,
            composite,
        })
    }

    pub fn resize(&mut self, device: &wgpu::Device, hdr: &HdrTarget) -> Result<(), RenderError> {
        self.targets = Self::create_targets(
            device,
            &self.blur_layout,
            &self.composite_layout,
            hdr,
            self.blur_passes,
        )?;
        Ok(())
    }

    pub fn output_format(&self) -> wgpu::TextureFormat {
        self.output_format
    }

    pub fn is_bloom_enabled(&self) -> bool {
        self.bloom_enabled
    }

    pub fn set_bloom_enabled(&mut self, enabled: bool) {
        self.bloom_enabled = enabled;
        self.composite_program
            .set_uniform("bloom", if enabled { 1.0f32 } else { 0.0 });
    }

    pub fn set_tone_mapping(&mut self, tone_mapping: ToneMapping) {
        self.composite_program.set_uniform("exposure", tone_mapping.exposure);
        self.composite_program.set_uniform("gamma", tone_mapping.gamma.max(1e-3));
    }

    /// Show the HDR buffer clamped instead of tone mapped, for debug views.
    pub fn set_passthrough(&mut self, passthrough: bool) {
        self.composite_program
            .set_uniform("passthrough", if passthrough { 1.0f32 } else { 0.0 });
    }

    /// Final blurred bright-pass buffer.
    pub fn bloom(&self) -> &ColorTarget {
        &self.targets.pong
    }

    /// Ping-pong Gaussian blur of the bright-pass buffer.
    pub fn record_bloom(
        &mut self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        matrices: &MatricesBuffer,
    ) {
        if !self.bloom_enabled || self.blur_passes == 0 {
            return;
        }
        self.horizontal.flush(queue);
        self.vertical.flush(queue);
        for iteration in 0..self.blur_passes {
            let source = if iteration == 0 {
                &self.targets.from_bright
            } else {
                &self.targets.from_pong
            };
            let steps = [
                (&self.targets.ping, &self.horizontal_pipeline, &self.horizontal, source),
                (&self.targets.pong, &self.vertical_pipeline, &self.vertical, &self.targets.from_ping),
            ];
            for (target, pipeline, program, bind_group) in steps {
                let attachment = [pass::clear_attachment(&target.view, wgpu::Color::TRANSPARENT)];
                let mut rpass = pass::begin_pass(encoder, "bloom-blur-pass", &attachment, None);
                rpass.set_pipeline(pipeline);
                matrices.bind(&mut rpass);
                program.bind(&mut rpass);
                rpass.set_bind_group(TEXTURES_GROUP, bind_group, &[]);
                rpass.draw(0..3, 0..1);
            }
        }
    }

    /// Tone map the HDR buffer (plus bloom) into `output`.
    pub fn record_composite(
        &mut self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        matrices: &MatricesBuffer,
        output: &wgpu::TextureView,
    ) {
        self.composite_program.flush(queue);
        let attachment = [pass::clear_attachment(output, wgpu::Color::BLACK)];
        let mut rpass = pass::begin_pass(encoder, "composite-pass", &attachment, None);
        rpass.set_pipeline(&self.composite_pipeline);
        matrices.bind(&mut rpass);
        self.composite_program.bind(&mut rpass);
        rpass.set_bind_group(TEXTURES_GROUP, &self.targets.composite, &[]);
        rpass.draw(0..3, 0..1);
    }
}
