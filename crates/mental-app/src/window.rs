//! Window creation and event handling via winit.
//!
//! [`AppState`] implements winit's [`ApplicationHandler`]; [`run`] drives it
//! until the window closes or a fatal error occurs.

use std::path::PathBuf;
use std::sync::Arc;

use glam::Vec3;
use mental_config::{CameraConfig, Config};
use mental_render::{
    FlyCamera, IblMaps, MipmapGenerator, RenderContext, Renderer, RendererSettings, SceneState,
    SurfaceError, ToneMapping, init_render_context_blocking,
};
use tracing::{error, info, instrument, warn};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::KeyCode;
use winit::window::{Window, WindowAttributes, WindowId};

use crate::AppError;
use crate::clock::FrameClock;
use crate::input::{KeyboardState, MouseState, apply_camera_input};
use crate::scene::build_demo_scene;

/// Color of the uniform environment used when no HDR file is configured.
pub const FALLBACK_ENVIRONMENT: [f32; 3] = [0.15, 0.15, 0.18];

pub fn window_attributes_from_config(config: &Config) -> WindowAttributes {
    WindowAttributes::default()
        .with_title(config.window.title.clone())
        .with_inner_size(winit::dpi::LogicalSize::new(
            config.window.width as f64,
            config.window.height as f64,
        ))
}

pub fn camera_from_config(config: &CameraConfig) -> FlyCamera {
    let mut camera = FlyCamera::new(Vec3::from_array(config.position));
    camera.move_speed = config.move_speed;
    camera.mouse_sensitivity = config.mouse_sensitivity;
    camera.zoom = config.zoom.clamp(FlyCamera::MIN_ZOOM, FlyCamera::MAX_ZOOM);
    camera
}

/// Window title with the last measured frame rate.
pub fn fps_title(title: &str, fps: f32) -> String {
    format!("{title} | {fps:.0} FPS")
}

/// GPU resources that exist once the window does.
struct Graphics {
    window: Arc<Window>,
    gpu: RenderContext,
    renderer: Renderer,
    scene: SceneState,
}

pub struct AppState {
    pub config: Config,
    config_dir: PathBuf,
    pub camera: FlyCamera,
    pub keyboard: KeyboardState,
    pub mouse: MouseState,
    pub clock: FrameClock,
    graphics: Option<Graphics>,
    fatal: Option<AppError>,
}

impl AppState {
    pub fn new(config: Config, config_dir: PathBuf) -> Self {
        Self {
            camera: camera_from_config(&config.camera),
            config,
            config_dir,
            keyboard: KeyboardState::new(),
            mouse: MouseState::new(),
            clock: FrameClock::new(),
            graphics: None,
            fatal: None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.graphics.is_some()
    }

    /// The error that stopped the event loop, if any.
    pub fn take_fatal(&mut self) -> Option<AppError> {
        self.fatal.take()
    }

    /// Re-read the config file and apply the settings that take effect live:
    /// camera speeds, tone mapping, bloom, the debug view and the title.
    /// Returns whether the file differed from the running config.
    pub fn reload_config(&mut self) -> Result<bool, AppError> {
        let Some(config) = self.config.reload(&self.config_dir)? else {
            return Ok(false);
        };
        self.camera.move_speed = config.camera.move_speed;
        self.camera.mouse_sensitivity = config.camera.mouse_sensitivity;
        if let Some(graphics) = &mut self.graphics {
            let renderer = &mut graphics.renderer;
            renderer.set_tone_mapping(ToneMapping {
                exposure: config.render.exposure,
                gamma: config.render.gamma,
            });
            renderer.set_bloom_enabled(config.render.bloom.enabled);
            renderer.set_debug_view(config.debug.view);
            graphics.window.set_title(&config.window.title);
        }
        if config.render.ssao != self.config.render.ssao
            || config.render.shadows != self.config.render.shadows
            || config.render.ibl != self.config.render.ibl
            || config.render.hdr_environment != self.config.render.hdr_environment
        {
            warn!("SSAO, shadow and environment changes apply on restart");
        }
        self.config = config;
        Ok(true)
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, e: AppError) {
        error!("{e}");
        self.fatal = Some(e);
        event_loop.exit();
    }

    fn initialize(&self, event_loop: &ActiveEventLoop) -> Result<Graphics, AppError> {
        let window = Arc::new(event_loop.create_window(window_attributes_from_config(&self.config))?);
        let gpu = init_render_context_blocking(window.clone(), self.config.window.vsync)?;
        let (width, height) = gpu.size();

        let render = &self.config.render;
        let mut mipmaps = MipmapGenerator::new(&gpu.device);
        let environment = if render.hdr_environment.as_os_str().is_empty() {
            info!("No HDR environment configured, using a uniform environment");
            IblMaps::constant(&gpu.device, &gpu.queue, FALLBACK_ENVIRONMENT, &mut mipmaps)?
        } else {
            info!("Baking image-based lighting from {}", render.hdr_environment.display());
            IblMaps::from_file(&gpu.device, &gpu.queue, &render.hdr_environment, &render.ibl, &mut mipmaps)?
        };

        let settings = RendererSettings::from(render).with_debug_view(self.config.debug.view);
        let mut renderer = Renderer::new(
            &gpu.device,
            &gpu.queue,
            settings,
            gpu.surface_format,
            width,
            height,
            environment,
        )?;
        let scene = build_demo_scene(&gpu.device, &gpu.queue, &mut renderer)?;
        info!("Renderer ready at {width}x{height} ({:?})", gpu.surface_format);

        Ok(Graphics {
            window,
            gpu,
            renderer,
            scene,
        })
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), AppError> {
        let Some(graphics) = &mut self.graphics else {
            return Ok(());
        };
        if width == 0 || height == 0 {
            return Ok(());
        }
        graphics.gpu.resize(width, height);
        graphics.renderer.resize(&graphics.gpu.device, width, height)?;
        info!("Window resized to {width}x{height}");
        Ok(())
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        if self.graphics.is_some() && self.keyboard.just_pressed(KeyCode::F5) {
            match self.reload_config() {
                Ok(true) => info!("Config reloaded from {}", self.config_dir.display()),
                Ok(false) => info!("Config unchanged"),
                Err(e) => warn!("Config reload failed, keeping current settings: {e}"),
            }
        }
        let Some(graphics) = &mut self.graphics else {
            return;
        };
        let tick = self.clock.tick();

        if self.keyboard.just_pressed(KeyCode::Escape) {
            info!("Escape pressed, shutting down");
            event_loop.exit();
            return;
        }
        if self.keyboard.just_pressed(KeyCode::F1) {
            let view = graphics.renderer.debug_view().next();
            graphics.renderer.set_debug_view(view);
            info!("Debug view: {view:?}");
        }
        if self.keyboard.just_pressed(KeyCode::KeyB) {
            let enabled = !graphics.renderer.is_bloom_enabled();
            graphics.renderer.set_bloom_enabled(enabled);
            info!("Bloom {}", if enabled { "on" } else { "off" });
        }

        apply_camera_input(&mut self.camera, &self.keyboard, &self.mouse, tick.dt);
        graphics.scene.advance(tick.dt);
        self.keyboard.clear_transients();
        self.mouse.clear_transients();

        let frame = match graphics.gpu.get_current_texture() {
            Ok(frame) => frame,
            Err(SurfaceError::Timeout) => {
                warn!("Surface timeout, skipping frame");
                return;
            }
            Err(e) => {
                error!("Failed to acquire surface texture: {e}");
                event_loop.exit();
                return;
            }
        };
        let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let device = &graphics.gpu.device;
        let queue = &graphics.gpu.queue;
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("frame-encoder"),
        });
        graphics
            .renderer
            .render(device, queue, &mut encoder, &view, &mut graphics.scene, &self.camera);
        queue.submit(std::iter::once(encoder.finish()));
        graphics.window.pre_present_notify();
        frame.present();

        if let Some(fps) = tick.fps_report {
            graphics.window.set_title(&fps_title(&self.config.window.title, fps));
        }
    }
}

impl ApplicationHandler for AppState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.graphics.is_some() {
            return;
        }
        match self.initialize(event_loop) {
            Ok(graphics) => {
                graphics.window.request_redraw();
                self.graphics = Some(graphics);
            }
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Err(e) = self.resize(size.width, size.height) {
                    self.fail(event_loop, e);
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                self.keyboard.process_event(&event);
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.mouse.on_cursor_moved(position.x, position.y);
            }
            WindowEvent::CursorLeft { .. } => {
                self.mouse.on_cursor_left();
            }
            WindowEvent::MouseInput { state, button, .. } => {
                self.mouse.on_button(button, state);
            }
            WindowEvent::MouseWheel { delta, .. } => {
                self.mouse.on_scroll(delta);
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(graphics) = &self.graphics {
            graphics.window.request_redraw();
        }
    }
}

/// Run the demo until the window closes. Blocks the calling thread.
#[instrument(skip_all)]
pub fn run(config: Config, config_dir: PathBuf) -> Result<(), AppError> {
    let event_loop = EventLoop::new()?;
    let mut app = AppState::new(config, config_dir);
    event_loop.run_app(&mut app)?;
    match app.take_fatal() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_starts_uninitialized() {
        let mut state = AppState::new(Config::default(), PathBuf::new());
        assert!(!state.is_initialized());
        assert!(state.take_fatal().is_none());
    }

    #[test]
    fn test_reload_config_applies_camera_settings() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        let mut state = AppState::new(config, dir.path().to_path_buf());
        assert!(!state.reload_config().unwrap());

        let mut edited = state.config.clone();
        edited.camera.move_speed = 12.5;
        edited.render.exposure = 2.0;
        edited.save(dir.path()).unwrap();
        assert!(state.reload_config().unwrap());
        assert_eq!(state.camera.move_speed, 12.5);
        assert_eq!(state.config.render.exposure, 2.0);
        assert!(!state.reload_config().unwrap());
    }

    #[test]
    fn test_failed_reload_keeps_running_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        let mut state = AppState::new(config.clone(), dir.path().to_path_buf());
        std::fs::write(dir.path().join("config.ron"), "(render: (").unwrap();
        assert!(matches!(state.reload_config(), Err(AppError::Config(_))));
        assert_eq!(state.config, config);
    }

    #[test]
    fn test_camera_from_config() {
        let config = CameraConfig {
            move_speed: 7.5,
            mouse_sensitivity: 0.2,
            zoom: 90.0,
            position: [1.0, 2.0, 3.0],
        };
        let camera = camera_from_config(&config);
        assert_eq!(camera.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(camera.move_speed, 7.5);
        assert_eq!(camera.mouse_sensitivity, 0.2);
        assert_eq!(camera.zoom, FlyCamera::MAX_ZOOM);
    }

    #[test]
    fn test_window_attributes_from_config() {
        let mut config = Config::default();
        config.window.title = "Test".to_string();
        let attrs = window_attributes_from_config(&config);
        assert_eq!(attrs.title, "Test");
    }

    #[test]
    fn test_fps_title() {
        assert_eq!(fps_title("Mental Engine", 59.6), "Mental Engine | 60 FPS");
    }
}
