//! Windowed demo for the Mental renderer.
//!
//! Owns the winit event loop, input tracking, the frame clock and the demo
//! scene; all rendering goes through [`mental_render::Renderer`].

pub mod clock;
pub mod error;
pub mod input;
pub mod platform;
pub mod scene;
pub mod window;

pub use error::AppError;
