//! Deferred wgpu renderer: G-buffer, shadow maps, SSAO, image-based lighting,
//! a forward pass for markers, skybox and transparency, and post-processing.

pub mod camera;
pub mod error;
pub mod forward;
pub mod gbuffer;
pub mod gpu;
pub mod ibl;
pub mod lighting;
pub mod mesh;
pub mod pass;
pub mod post;
pub mod readback;
pub mod renderer;
pub mod shader;
pub mod shadow;
pub mod slots;
pub mod ssao;
pub mod target;
pub mod texture;
pub mod uniforms;

pub use camera::{CameraMovement, CameraProvider, FlyCamera};
pub use error::RenderError;
pub use gbuffer::GBuffer;
pub use gpu::{RenderContext, RenderContextError, SurfaceError, init_render_context_blocking};
pub use ibl::IblMaps;
pub use mesh::{InstanceData, Material, MaterialLayout, MeshData, RenderableMesh, TextureSet};
pub use post::{OverlayPass, ToneMapping, tone_map};
pub use renderer::{FramePass, LightOrbit, Renderer, RendererSettings, SceneObject, SceneState};
pub use shader::{ProgramDesc, ShaderProgram, UniformLocation};
pub use slots::SamplerSlot;
pub use texture::{MipmapGenerator, Texture, TextureCache, TextureLoadOptions, TextureRole};
