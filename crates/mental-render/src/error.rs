//! Error type shared by every render stage.

use std::path::PathBuf;

use mental_lighting::LightError;

/// Failures raised while creating or loading GPU resources.
///
/// Startup code treats every variant as fatal. Per-model texture loads catch
/// `FileNotFound` and `ImageDecode` and fall back to a default texture.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to create {resource}: {reason}")]
    ResourceCreationFailed { resource: String, reason: String },

    #[error("file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("shader program '{program}' failed to compile:\n{message}")]
    CompileError { program: String, message: String },

    #[error("shader program '{program}' failed to link: {message}")]
    LinkError { program: String, message: String },

    #[error("render target '{target}' is incomplete: {reason}")]
    FramebufferIncomplete { target: String, reason: String },

    #[error("failed to decode image {}: {message}", path.display())]
    ImageDecode { path: PathBuf, message: String },

    #[error(transparent)]
    LightCapacity(#[from] LightError),
}

impl RenderError {
    pub(crate) fn creation(resource: impl Into<String>, reason: impl ToString) -> Self {
        RenderError::ResourceCreationFailed {
            resource: resource.into(),
            reason: reason.to_string(),
        }
    }
}
