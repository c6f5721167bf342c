//! Fatal application errors. Any of these ends the process with status 1.

use mental_config::ConfigError;
use mental_render::{RenderContextError, RenderError};

use crate::platform::PlatformError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),

    #[error("failed to create window: {0}")]
    Window(#[from] winit::error::OsError),

    #[error("GPU initialization failed: {0}")]
    Gpu(#[from] RenderContextError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("failed to build demo scene: {0}")]
    Scene(#[from] mental_lighting::LightError),
}
