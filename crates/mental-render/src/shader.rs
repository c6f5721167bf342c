//! Shader programs: WGSL compilation, entry-point linking and named uniforms.
//!
//! A [`ShaderProgram`] is built from one or more WGSL source chunks that are
//! concatenated, parsed and validated with naga before wgpu ever sees them.
//! Parse and validation failures become [`RenderError::CompileError`], a
//! missing entry point becomes [`RenderError::LinkError`]. A failed build
//! still returns a program, but [`ShaderProgram::is_valid`] is false and no
//! pipeline can be created from it.
//!
//! Each program may declare one `var<uniform> params` block. Its members are
//! reflected at build time into a name → (offset, size) table, and
//! [`ShaderProgram::set_uniform`] writes into a CPU staging copy that
//! [`ShaderProgram::flush`] uploads before the pass runs.

use std::collections::HashMap;
use std::num::NonZeroU64;

use glam::{Mat4, Vec2, Vec3, Vec4};
use wgpu::util::DeviceExt;

use crate::error::RenderError;

/// Bind group holding the shared `Matrices` block in every camera-relative program.
pub const MATRICES_GROUP: u32 = 0;
/// Bind group holding a program's own `params` block.
pub const PARAMS_GROUP: u32 = 1;
/// Bind group holding the sampled textures of a pass or a material.
pub const TEXTURES_GROUP: u32 = 2;

const PARAMS_BLOCK_NAME: &str = "params";

/// What to build: the WGSL chunks and the entry points to link.
pub struct ProgramDesc<'a> {
    pub label: &'a str,
    /// Concatenated in order before compilation.
    pub sources: &'a [&'a str],
    pub vertex: &'a str,
    pub fragment: Option<&'a str>,
}

/// Byte range of a reflected uniform inside the `params` block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UniformLocation {
    pub offset: u32,
    pub size: u32,
}

/// Values that can be written through [`ShaderProgram::set_uniform`].
///
/// The byte layout must match the WGSL type of the member it is written to.
pub trait UniformValue {
    fn uniform_bytes(&self) -> Vec<u8>;
}

macro_rules! impl_uniform_pod {
    ($($ty:ty),*) => {
        $(impl UniformValue for $ty {
            fn uniform_bytes(&self) -> Vec<u8> {
                bytemuck::bytes_of(self).to_vec()
            }
        })*
    };
}

impl_uniform_pod!(f32, u32, i32, [i32; 2], [f32; 2], [f32; 3], [f32; 4], [u32; 4], [f32; 16]);

impl UniformValue for bool {
    fn uniform_bytes(&self) -> Vec<u8> {
        u32::from(*self).uniform_bytes()
    }
}

impl UniformValue for Vec2 {
    fn uniform_bytes(&self) -> Vec<u8> {
        self.to_array().uniform_bytes()
    }
}

impl UniformValue for Vec3 {
    fn uniform_bytes(&self) -> Vec<u8> {
        self.to_array().uniform_bytes()
    }
}

impl UniformValue for Vec4 {
    fn uniform_bytes(&self) -> Vec<u8> {
        self.to_array().uniform_bytes()
    }
}

impl UniformValue for Mat4 {
    fn uniform_bytes(&self) -> Vec<u8> {
        self.to_cols_array().uniform_bytes()
    }
}

/// A resource variable declared at module scope.
#[derive(Clone, Debug, PartialEq, Eq)]
struct GlobalBinding {
    name: String,
    type_name: Option<String>,
    group: u32,
    binding: u32,
}

/// CPU side of a program's `params` block.
#[derive(Debug)]
pub struct UniformBlock {
    program: String,
    group: u32,
    binding: u32,
    members: HashMap<String, UniformLocation>,
    location_cache: HashMap<String, Option<UniformLocation>>,
    staging: Vec<u8>,
    dirty: bool,
}

impl UniformBlock {
    fn reflect(program: &str, module: &naga::Module) -> Option<Self> {
        let (_, var) = module.global_variables.iter().find(|(_, var)| {
            var.space == naga::AddressSpace::Uniform
                && var.name.as_deref() == Some(PARAMS_BLOCK_NAME)
        })?;
        let binding = var.binding.as_ref()?;
        let ty = &module.types[var.ty];
        let naga::TypeInner::Struct { members, span } = &ty.inner else {
            log::warn!("'{PARAMS_BLOCK_NAME}' in program '{program}' is not a struct; ignoring");
            return None;
        };

        let ctx = module.to_ctx();
        let members = members
            .iter()
            .filter_map(|m| {
                let name = m.name.clone()?;
                let size = module.types[m.ty].inner.size(ctx);
                Some((
                    name,
                    UniformLocation {
                        offset: m.offset,
                        size,
                    },
                ))
            })
            .collect();

        let len = (*span as usize).next_multiple_of(16).max(16);
        Some(Self {
            program: program.to_string(),
            group: binding.group,
            binding: binding.binding,
            members,
            location_cache: HashMap::new(),
            staging: vec![0; len],
            dirty: true,
        })
    }

    /// Resolve `name`, consulting the cache first. Unknown names warn once.
    pub fn location(&mut self, name: &str) -> Option<UniformLocation> {
        if let Some(cached) = self.location_cache.get(name) {
            return *cached;
        }
        let found = self.members.get(name).copied();
        if found.is_none() {
            log::warn!(
                "Uniform '{name}' not found in program '{}'; writes will be dropped",
                self.program
            );
        }
        self.location_cache.insert(name.to_string(), found);
        found
    }

    pub fn set<T: UniformValue>(&mut self, name: &str, value: &T) -> Option<UniformLocation> {
        let bytes = value.uniform_bytes();
        let location = self.location(name)?;
        if bytes.len() != location.size as usize {
            log::warn!(
                "Uniform '{name}' in program '{}' is {} bytes, value is {}; dropped",
                self.program,
                location.size,
                bytes.len()
            );
            return None;
        }
        self.write(location, &bytes);
        Some(location)
    }

    /// Write raw bytes, used for arrays. Shorter writes fill a prefix.
    pub fn set_raw(&mut self, name: &str, bytes: &[u8]) -> Option<UniformLocation> {
        let location = self.location(name)?;
        if bytes.len() > location.size as usize {
            log::warn!(
                "Uniform '{name}' in program '{}' holds {} bytes, got {}; dropped",
                self.program,
                location.size,
                bytes.len()
            );
            return None;
        }
        self.write(location, bytes);
        Some(location)
    }

    fn write(&mut self, location: UniformLocation, bytes: &[u8]) {
        let start = location.offset as usize;
        self.staging[start..start + bytes.len()].copy_from_slice(bytes);
        self.dirty = true;
    }

    pub fn bytes(&self) -> &[u8] {
        &self.staging
    }
}

/// Result of compiling and linking WGSL without touching the GPU.
#[derive(Debug)]
pub struct Reflection {
    source: String,
    globals: Vec<GlobalBinding>,
    params: Option<UniformBlock>,
}

impl Reflection {
    /// The reflected `params` block, if the program declares one.
    pub fn into_uniforms(self) -> Option<UniformBlock> {
        self.params
    }
}

/// Parse, validate and link-check a program description.
pub fn reflect(desc: &ProgramDesc<'_>) -> Result<Reflection, RenderError> {
    let source = desc.sources.join("\n");
    let compile_error = |message: String| RenderError::CompileError {
        program: desc.label.to_string(),
        message,
    };

    let module = naga::front::wgsl::parse_str(&source)
        .map_err(|e| compile_error(e.emit_to_string(&source)))?;
    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|e| compile_error(format!("validation error: {e}")))?;

    let stages = std::iter::once((desc.vertex, naga::ShaderStage::Vertex))
        .chain(desc.fragment.map(|f| (f, naga::ShaderStage::Fragment)));
    for (entry, stage) in stages {
        let linked = module
            .entry_points
            .iter()
            .any(|ep| ep.name == entry && ep.stage == stage);
        if !linked {
            return Err(RenderError::LinkError {
                program: desc.label.to_string(),
                message: format!("no {stage:?} entry point named '{entry}'"),
            });
        }
    }

    let globals = module
        .global_variables
        .iter()
        .filter_map(|(_, var)| {
            let binding = var.binding.as_ref()?;
            Some(GlobalBinding {
                name: var.name.clone().unwrap_or_default(),
                type_name: module.types[var.ty].name.clone(),
                group: binding.group,
                binding: binding.binding,
            })
        })
        .collect();
    let params = UniformBlock::reflect(desc.label, &module);

    Ok(Reflection {
        source,
        globals,
        params,
    })
}

fn find_block_binding(
    program: &str,
    globals: &[GlobalBinding],
    block: &str,
    group: u32,
) -> Result<u32, RenderError> {
    let global = globals
        .iter()
        .find(|g| g.type_name.as_deref() == Some(block) || g.name == block)
        .ok_or_else(|| RenderError::LinkError {
            program: program.to_string(),
            message: format!("no uniform block named '{block}'"),
        })?;
    if global.group != group {
        return Err(RenderError::LinkError {
            program: program.to_string(),
            message: format!(
                "uniform block '{block}' is declared at group {}, expected {group}",
                global.group
            ),
        });
    }
    Ok(global.binding)
}

struct ParamsGpu {
    buffer: wgpu::Buffer,
    layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
}

/// A compiled, linked WGSL program with a reflected `params` block.
pub struct ShaderProgram {
    label: String,
    vertex_entry: String,
    fragment_entry: Option<String>,
    module: Option<wgpu::ShaderModule>,
    globals: Vec<GlobalBinding>,
    uniforms: Option<UniformBlock>,
    params_gpu: Option<ParamsGpu>,
    block_bindings: HashMap<String, u32>,
    error: Option<RenderError>,
}

impl ShaderProgram {
    /// Compile and link. Failures are logged and leave the program invalid.
    pub fn build(device: &wgpu::Device, desc: &ProgramDesc<'_>) -> Self {
        let mut program = Self {
            label: desc.label.to_string(),
            vertex_entry: desc.vertex.to_string(),
            fragment_entry: desc.fragment.map(str::to_string),
            module: None,
            globals: Vec::new(),
            uniforms: None,
            params_gpu: None,
            block_bindings: HashMap::new(),
            error: None,
        };

        let reflection = match reflect(desc) {
            Ok(reflection) => reflection,
            Err(e) => {
                log::error!("{e}");
                program.error = Some(e);
                return program;
            }
        };

        program.module = Some(device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(desc.label),
            source: wgpu::ShaderSource::Wgsl(reflection.source.into()),
        }));
        program.params_gpu = reflection
            .params
            .as_ref()
            .map(|block| create_params_gpu(device, desc.label, block));
        program.globals = reflection.globals;
        program.uniforms = reflection.params;

        log::info!(
            "Built shader program '{}' ({} uniforms)",
            desc.label,
            program.uniforms.as_ref().map_or(0, |u| u.members.len())
        );
        program
    }

    /// Turn a failed build into its error.
    pub fn require(mut self) -> Result<Self, RenderError> {
        match self.error.take() {
            Some(e) => Err(e),
            None => Ok(self),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.module.is_some()
    }

    pub fn error(&self) -> Option<&RenderError> {
        self.error.as_ref()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn module(&self) -> Result<&wgpu::ShaderModule, RenderError> {
        self.module.as_ref().ok_or_else(|| self.invalid())
    }

    fn invalid(&self) -> RenderError {
        RenderError::LinkError {
            program: self.label.clone(),
            message: "program is not valid".to_string(),
        }
    }

    pub fn vertex_state<'a>(
        &'a self,
        buffers: &'a [wgpu::VertexBufferLayout<'a>],
    ) -> Result<wgpu::VertexState<'a>, RenderError> {
        Ok(wgpu::VertexState {
            module: self.module()?,
            entry_point: Some(&self.vertex_entry),
            buffers,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        })
    }

    /// `None` for depth-only programs.
    pub fn fragment_state<'a>(
        &'a self,
        targets: &'a [Option<wgpu::ColorTargetState>],
    ) -> Result<Option<wgpu::FragmentState<'a>>, RenderError> {
        let module = self.module()?;
        Ok(self
            .fragment_entry
            .as_deref()
            .map(|entry| wgpu::FragmentState {
                module,
                entry_point: Some(entry),
                targets,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }))
    }

    /// Check that the named uniform block lives at `group` and record it.
    pub fn set_uniform_block_binding(&mut self, block: &str, group: u32) -> Result<(), RenderError> {
        find_block_binding(&self.label, &self.globals, block, group)?;
        self.block_bindings.insert(block.to_string(), group);
        Ok(())
    }

    pub fn block_binding(&self, block: &str) -> Option<u32> {
        self.block_bindings.get(block).copied()
    }

    /// Layout of this program's `params` bind group.
    pub fn params_layout(&self) -> Result<&wgpu::BindGroupLayout, RenderError> {
        self.params_gpu
            .as_ref()
            .map(|p| &p.layout)
            .ok_or_else(|| RenderError::LinkError {
                program: self.label.clone(),
                message: format!("no '{PARAMS_BLOCK_NAME}' uniform block"),
            })
    }

    pub fn uniform_location(&mut self, name: &str) -> Option<UniformLocation> {
        match self.uniforms.as_mut() {
            Some(block) => block.location(name),
            None => None,
        }
    }

    /// Stage a uniform write. Returns `None` when the write was dropped.
    pub fn set_uniform<T: UniformValue>(&mut self, name: &str, value: T) -> Option<UniformLocation> {
        match self.uniforms.as_mut() {
            Some(block) => block.set(name, &value),
            None => {
                log::warn!("Program '{}' has no uniforms; '{name}' dropped", self.label);
                None
            }
        }
    }

    pub fn set_uniform_raw(&mut self, name: &str, bytes: &[u8]) -> Option<UniformLocation> {
        self.uniforms.as_mut()?.set_raw(name, bytes)
    }

    pub fn uniforms(&self) -> Option<&UniformBlock> {
        self.uniforms.as_ref()
    }

    /// Upload staged uniform writes.
    pub fn flush(&mut self, queue: &wgpu::Queue) {
        if let (Some(block), Some(gpu)) = (self.uniforms.as_mut(), self.params_gpu.as_ref())
            && block.dirty
        {
            queue.write_buffer(&gpu.buffer, 0, &block.staging);
            block.dirty = false;
        }
    }

    /// Bind the `params` group on a pass.
    pub fn bind(&self, pass: &mut wgpu::RenderPass<'_>) {
        if let (Some(block), Some(gpu)) = (self.uniforms.as_ref(), self.params_gpu.as_ref()) {
            pass.set_bind_group(block.group, &gpu.bind_group, &[]);
        }
    }
}

fn create_params_gpu(device: &wgpu::Device, label: &str, block: &UniformBlock) -> ParamsGpu {
    let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(&format!("{label}-params")),
        contents: &block.staging,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    });
    let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(&format!("{label}-params-bgl")),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: block.binding,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: NonZeroU64::new(block.staging.len() as u64),
            },
            count: None,
        }],
    });
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(&format!("{label}-params-bg")),
        layout: &layout,
        entries: &[wgpu::BindGroupEntry {
            binding: block.binding,
            resource: buffer.as_entire_binding(),
        }],
    });
    ParamsGpu {
        buffer,
        layout,
        bind_group,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::create_test_device_queue;

    const VALID_SHADER: &str = r#"
        struct Params {
            exposure: f32,
            gamma: f32,
            tint: vec4<f32>,
            model: mat4x4<f32>,
            offset: vec3<f32>,
        };
        @group(1) @binding(0) var<uniform> params: Params;

        @vertex
        fn vs_main(@builtin(vertex_index) idx: u32) -> @builtin(position) vec4<f32> {
            return params.model * vec4<f32>(params.offset, f32(idx));
        }

        @fragment
        fn fs_main() -> @location(0) vec4<f32> {
            return params.tint * params.exposure * params.gamma;
        }
    "#;

    const MATRICES_SHADER: &str = r#"
        struct Matrices { view: mat4x4<f32> };
        @group(0) @binding(0) var<uniform> matrices: Matrices;

        @vertex
        fn vs_main() -> @builtin(position) vec4<f32> {
            return matrices.view[3];
        }
    "#;

    const INVALID_SHADER: &str = r#"
        @vertex
        fn vs_main() -> @builtin(position) vec4<f32> {
            return undeclared_variable;
        }
    "#;

    fn desc<'a>(sources: &'a [&'a str], fragment: Option<&'a str>) -> ProgramDesc<'a> {
        ProgramDesc {
            label: "test",
            sources,
            vertex: "vs_main",
            fragment,
        }
    }

    fn valid_block() -> UniformBlock {
        reflect(&desc(&[VALID_SHADER], Some("fs_main")))
            .unwrap()
            .params
            .unwrap()
    }

    #[test]
    fn test_invalid_source_is_compile_error() {
        let result = reflect(&desc(&[INVALID_SHADER], None));
        assert!(matches!(result, Err(RenderError::CompileError { .. })));
    }

    #[test]
    fn test_missing_entry_point_is_link_error() {
        let result = reflect(&desc(&[VALID_SHADER], Some("fs_missing")));
        assert!(matches!(result, Err(RenderError::LinkError { .. })));
    }

    #[test]
    fn test_wrong_stage_is_link_error() {
        let result = reflect(&ProgramDesc {
            label: "test",
            sources: &[VALID_SHADER],
            vertex: "fs_main",
            fragment: None,
        });
        assert!(matches!(result, Err(RenderError::LinkError { .. })));
    }

    #[test]
    fn test_sources_are_concatenated() {
        let header = "struct Tint { color: vec4<f32> };";
        let body = r#"
            @group(1) @binding(0) var<uniform> params: Tint;
            @vertex
            fn vs_main() -> @builtin(position) vec4<f32> { return params.color; }
        "#;
        let reflection = reflect(&desc(&[header, body], None)).unwrap();
        assert!(reflection.params.is_some());
    }

    #[test]
    fn test_reflected_offsets() {
        let mut block = valid_block();
        assert_eq!(block.group, 1);
        assert_eq!(
            block.location("exposure"),
            Some(UniformLocation { offset: 0, size: 4 })
        );
        assert_eq!(
            block.location("gamma"),
            Some(UniformLocation { offset: 4, size: 4 })
        );
        assert_eq!(
            block.location("tint"),
            Some(UniformLocation { offset: 16, size: 16 })
        );
        assert_eq!(
            block.location("model"),
            Some(UniformLocation { offset: 32, size: 64 })
        );
        assert_eq!(
            block.location("offset"),
            Some(UniformLocation { offset: 96, size: 12 })
        );
        assert_eq!(block.bytes().len(), 112);
    }

    #[test]
    fn test_unknown_uniform_is_cached_miss() {
        let mut block = valid_block();
        assert_eq!(block.set("missing", &1.0f32), None);
        assert_eq!(block.location_cache.get("missing"), Some(&None));
        // Second lookup comes from the cache.
        assert_eq!(block.location("missing"), None);
        assert!(block.bytes().iter().all(|b| *b == 0));
    }

    #[test]
    fn test_write_lands_at_offset() {
        let mut block = valid_block();
        block.set("tint", &Vec4::new(1.0, 2.0, 3.0, 4.0)).unwrap();
        let floats: &[f32] = bytemuck::cast_slice(block.bytes());
        assert_eq!(&floats[4..8], &[1.0, 2.0, 3.0, 4.0]);
        block.set("offset", &Vec3::new(5.0, 6.0, 7.0)).unwrap();
        let floats: &[f32] = bytemuck::cast_slice(block.bytes());
        assert_eq!(&floats[24..27], &[5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_size_mismatch_is_dropped() {
        let mut block = valid_block();
        assert_eq!(block.set("exposure", &Vec4::ONE), None);
        assert!(block.bytes().iter().all(|b| *b == 0));
    }

    #[test]
    fn test_raw_write_fills_prefix() {
        let mut block = valid_block();
        block.set_raw("model", bytemuck::cast_slice(&[9.0f32; 4])).unwrap();
        let floats: &[f32] = bytemuck::cast_slice(block.bytes());
        assert_eq!(&floats[8..12], &[9.0; 4]);
        assert_eq!(floats[12], 0.0);
        assert!(block.set_raw("gamma", &[0u8; 8]).is_none());
    }

    #[test]
    fn test_block_binding_checks_group() {
        let reflection = reflect(&desc(&[MATRICES_SHADER], None)).unwrap();
        assert_eq!(
            find_block_binding("test", &reflection.globals, "Matrices", MATRICES_GROUP).unwrap(),
            0
        );
        assert!(matches!(
            find_block_binding("test", &reflection.globals, "Matrices", 2),
            Err(RenderError::LinkError { .. })
        ));
        assert!(matches!(
            find_block_binding("test", &reflection.globals, "Lights", 0),
            Err(RenderError::LinkError { .. })
        ));
    }

    #[test]
    fn test_build_valid_program() {
        let Some((device, queue)) = create_test_device_queue() else {
            return;
        };
        let mut program = ShaderProgram::build(&device, &desc(&[VALID_SHADER], Some("fs_main")));
        assert!(program.is_valid());
        assert!(program.params_layout().is_ok());
        assert!(program.set_uniform("exposure", 1.5f32).is_some());
        program.flush(&queue);
        assert!(program.require().is_ok());
    }

    #[test]
    fn test_build_invalid_program_is_not_valid() {
        let Some((device, _queue)) = create_test_device_queue() else {
            return;
        };
        let program = ShaderProgram::build(&device, &desc(&[INVALID_SHADER], None));
        assert!(!program.is_valid());
        assert!(matches!(
            program.error(),
            Some(RenderError::CompileError { .. })
        ));
        assert!(program.module().is_err());
        assert!(matches!(
            program.require(),
            Err(RenderError::CompileError { .. })
        ));
    }
}
