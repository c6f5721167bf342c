//! Frame-coherent keyboard and mouse state, and the fly-camera bindings.
//!
//! Events are accumulated while winit delivers them; the frame reads the
//! state and calls `clear_transients` once it is done.

use std::collections::HashSet;

use glam::Vec2;
use mental_render::{CameraMovement, FlyCamera};
use winit::event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Physical keys that move the camera.
pub const MOVEMENT_BINDINGS: [(KeyCode, CameraMovement); 6] = [
    (KeyCode::KeyW, CameraMovement::Forward),
    (KeyCode::KeyS, CameraMovement::Backward),
    (KeyCode::KeyA, CameraMovement::Left),
    (KeyCode::KeyD, CameraMovement::Right),
    (KeyCode::Space, CameraMovement::Up),
    (KeyCode::ShiftLeft, CameraMovement::Down),
];

/// Pixels of precise scrolling counted as one wheel line.
const PIXELS_PER_LINE: f64 = 40.0;

/// Minimal key event, constructible in tests.
#[derive(Debug, Clone, Copy)]
pub struct RawKeyEvent {
    pub key: PhysicalKey,
    pub state: ElementState,
    pub repeat: bool,
}

/// Held, just-pressed and just-released keys by physical key code.
#[derive(Debug, Clone, Default)]
pub struct KeyboardState {
    pressed: HashSet<PhysicalKey>,
    just_pressed: HashSet<PhysicalKey>,
    just_released: HashSet<PhysicalKey>,
}

impl KeyboardState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process_event(&mut self, event: &KeyEvent) {
        self.process_raw(RawKeyEvent {
            key: event.physical_key,
            state: event.state,
            repeat: event.repeat,
        });
    }

    /// Repeat events are ignored.
    pub fn process_raw(&mut self, event: RawKeyEvent) {
        if event.repeat {
            return;
        }
        match event.state {
            ElementState::Pressed => {
                self.pressed.insert(event.key);
                self.just_pressed.insert(event.key);
            }
            ElementState::Released => {
                self.pressed.remove(&event.key);
                self.just_released.insert(event.key);
            }
        }
    }

    #[must_use]
    pub fn is_pressed(&self, key: KeyCode) -> bool {
        self.pressed.contains(&PhysicalKey::Code(key))
    }

    #[must_use]
    pub fn just_pressed(&self, key: KeyCode) -> bool {
        self.just_pressed.contains(&PhysicalKey::Code(key))
    }

    #[must_use]
    pub fn just_released(&self, key: KeyCode) -> bool {
        self.just_released.contains(&PhysicalKey::Code(key))
    }

    pub fn clear_transients(&mut self) {
        self.just_pressed.clear();
        self.just_released.clear();
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ButtonFrame {
    pressed: bool,
    just_pressed: bool,
}

fn button_index(button: MouseButton) -> Option<usize> {
    match button {
        MouseButton::Left => Some(0),
        MouseButton::Right => Some(1),
        MouseButton::Middle => Some(2),
        _ => None,
    }
}

/// Cursor motion, wheel and the three main buttons.
#[derive(Debug, Clone, Default)]
pub struct MouseState {
    position: Option<Vec2>,
    delta: Vec2,
    scroll: f32,
    buttons: [ButtonFrame; 3],
}

impl MouseState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first event after the cursor enters only sets the position.
    pub fn on_cursor_moved(&mut self, x: f64, y: f64) {
        let position = Vec2::new(x as f32, y as f32);
        if let Some(previous) = self.position {
            self.delta += position - previous;
        }
        self.position = Some(position);
    }

    pub fn on_cursor_left(&mut self) {
        self.position = None;
    }

    pub fn on_button(&mut self, button: MouseButton, state: ElementState) {
        let Some(index) = button_index(button) else {
            return;
        };
        let frame = &mut self.buttons[index];
        match state {
            ElementState::Pressed => {
                frame.pressed = true;
                frame.just_pressed = true;
            }
            ElementState::Released => frame.pressed = false,
        }
    }

    pub fn on_scroll(&mut self, delta: MouseScrollDelta) {
        self.scroll += match delta {
            MouseScrollDelta::LineDelta(_, y) => y,
            MouseScrollDelta::PixelDelta(pos) => (pos.y / PIXELS_PER_LINE) as f32,
        };
    }

    #[must_use]
    pub fn is_pressed(&self, button: MouseButton) -> bool {
        button_index(button).is_some_and(|i| self.buttons[i].pressed)
    }

    #[must_use]
    pub fn just_pressed(&self, button: MouseButton) -> bool {
        button_index(button).is_some_and(|i| self.buttons[i].just_pressed)
    }

    /// Cursor motion this frame in pixels, +y down.
    pub fn delta(&self) -> Vec2 {
        self.delta
    }

    /// Wheel lines this frame, positive away from the user.
    pub fn scroll(&self) -> f32 {
        self.scroll
    }

    pub fn clear_transients(&mut self) {
        self.delta = Vec2::ZERO;
        self.scroll = 0.0;
        for button in &mut self.buttons {
            button.just_pressed = false;
        }
    }
}

/// Move, look and zoom the camera from this frame's input.
///
/// Looking only happens while the right mouse button is held.
pub fn apply_camera_input(camera: &mut FlyCamera, keyboard: &KeyboardState, mouse: &MouseState, dt: f32) {
    for (key, movement) in MOVEMENT_BINDINGS {
        if keyboard.is_pressed(key) {
            camera.process_movement(movement, dt);
        }
    }
    if mouse.is_pressed(MouseButton::Right) {
        let delta = mouse.delta();
        camera.process_mouse(delta.x, -delta.y);
    }
    if mouse.scroll() != 0.0 {
        camera.process_scroll(mouse.scroll());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn raw(code: KeyCode, state: ElementState, repeat: bool) -> RawKeyEvent {
        RawKeyEvent {
            key: PhysicalKey::Code(code),
            state,
            repeat,
        }
    }

    #[test]
    fn test_press_and_release() {
        let mut kb = KeyboardState::new();
        kb.process_raw(raw(KeyCode::KeyW, ElementState::Pressed, false));
        assert!(kb.is_pressed(KeyCode::KeyW));
        assert!(kb.just_pressed(KeyCode::KeyW));
        kb.clear_transients();
        assert!(!kb.just_pressed(KeyCode::KeyW));
        kb.process_raw(raw(KeyCode::KeyW, ElementState::Released, false));
        assert!(!kb.is_pressed(KeyCode::KeyW));
        assert!(kb.just_released(KeyCode::KeyW));
    }

    #[test]
    fn test_repeat_does_not_retrigger() {
        let mut kb = KeyboardState::new();
        kb.process_raw(raw(KeyCode::F1, ElementState::Pressed, false));
        kb.clear_transients();
        kb.process_raw(raw(KeyCode::F1, ElementState::Pressed, true));
        assert!(kb.is_pressed(KeyCode::F1));
        assert!(!kb.just_pressed(KeyCode::F1));
    }

    #[test]
    fn test_first_cursor_event_has_no_delta() {
        let mut mouse = MouseState::new();
        mouse.on_cursor_moved(100.0, 100.0);
        assert_eq!(mouse.delta(), Vec2::ZERO);
        mouse.on_cursor_moved(110.0, 95.0);
        assert_eq!(mouse.delta(), Vec2::new(10.0, -5.0));
        mouse.on_cursor_left();
        mouse.on_cursor_moved(0.0, 0.0);
        assert_eq!(mouse.delta(), Vec2::new(10.0, -5.0));
    }

    #[test]
    fn test_scroll_and_buttons_clear() {
        let mut mouse = MouseState::new();
        mouse.on_scroll(MouseScrollDelta::LineDelta(0.0, 2.0));
        mouse.on_scroll(MouseScrollDelta::PixelDelta(winit::dpi::PhysicalPosition::new(0.0, 40.0)));
        mouse.on_button(MouseButton::Right, ElementState::Pressed);
        assert_eq!(mouse.scroll(), 3.0);
        assert!(mouse.just_pressed(MouseButton::Right));
        mouse.clear_transients();
        assert_eq!(mouse.scroll(), 0.0);
        assert!(!mouse.just_pressed(MouseButton::Right));
        assert!(mouse.is_pressed(MouseButton::Right));
        mouse.on_button(MouseButton::Back, ElementState::Pressed);
        assert!(!mouse.is_pressed(MouseButton::Back));
    }

    #[test]
    fn test_camera_moves_forward_with_w() {
        let mut camera = FlyCamera::new(Vec3::ZERO);
        let mut kb = KeyboardState::new();
        kb.process_raw(raw(KeyCode::KeyW, ElementState::Pressed, false));
        apply_camera_input(&mut camera, &kb, &MouseState::new(), 1.0);
        let expected = FlyCamera::new(Vec3::ZERO).front() * camera.move_speed;
        assert!(camera.position.abs_diff_eq(expected, 1e-5));
    }

    #[test]
    fn test_look_requires_right_button() {
        let mut camera = FlyCamera::new(Vec3::ZERO);
        let kb = KeyboardState::new();
        let mut mouse = MouseState::new();
        mouse.on_cursor_moved(0.0, 0.0);
        mouse.on_cursor_moved(50.0, 0.0);
        let yaw = camera.yaw;
        apply_camera_input(&mut camera, &kb, &mouse, 0.016);
        assert_eq!(camera.yaw, yaw);

        mouse.on_button(MouseButton::Right, ElementState::Pressed);
        apply_camera_input(&mut camera, &kb, &mouse, 0.016);
        assert!(camera.yaw > yaw);
    }

    #[test]
    fn test_scroll_zooms_in() {
        let mut camera = FlyCamera::new(Vec3::ZERO);
        let zoom = camera.zoom;
        let mut mouse = MouseState::new();
        mouse.on_scroll(MouseScrollDelta::LineDelta(0.0, 5.0));
        apply_camera_input(&mut camera, &KeyboardState::new(), &mouse, 0.016);
        assert!(camera.zoom < zoom);
    }
}
