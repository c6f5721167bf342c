//! Configuration system for the Mental engine.
//!
//! Settings persist to disk as a RON file and can be overridden from the
//! command line. Every section is `#[serde(default)]`, so older or partial
//! config files keep loading as new options appear.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    BloomConfig, CameraConfig, Config, DebugConfig, DebugView, IblConfig, PipelineVariant,
    MAX_SSAO_KERNEL, RenderConfig, ShadowConfig, SsaoConfig, WindowConfig,
};
pub use error::ConfigError;
