//! Camera providers for the frame orchestrator.

use glam::{Mat4, Vec3};

/// Anything that can hand the renderer a view and a projection.
pub trait CameraProvider {
    fn view_matrix(&self) -> Mat4;

    /// Reverse-Z projection: near maps to depth 1.0, far to 0.0.
    fn projection_matrix(&self, aspect: f32) -> Mat4;

    fn position(&self) -> Vec3;
}

/// Direction of a keyboard-driven camera move.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CameraMovement {
    Forward,
    Backward,
    Left,
    Right,
    Up,
    Down,
}

/// Yaw/pitch camera with a zoomable field of view.
#[derive(Clone, Debug)]
pub struct FlyCamera {
    pub position: Vec3,
    /// Degrees; -90 looks down -Z.
    pub yaw: f32,
    /// Degrees, clamped to ±[`FlyCamera::MAX_PITCH`].
    pub pitch: f32,
    /// Vertical field of view in degrees.
    pub zoom: f32,
    pub move_speed: f32,
    pub mouse_sensitivity: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for FlyCamera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 3.0),
            yaw: -90.0,
            pitch: 0.0,
            zoom: 45.0,
            move_speed: 2.5,
            mouse_sensitivity: 0.1,
            near: 0.1,
            far: 100.0,
        }
    }
}

impl FlyCamera {
    pub const MAX_PITCH: f32 = 89.0;
    pub const MIN_ZOOM: f32 = 1.0;
    pub const MAX_ZOOM: f32 = 45.0;

    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Camera looking from `position` toward `target`.
    pub fn looking_at(position: Vec3, target: Vec3) -> Self {
        let dir = (target - position).normalize_or(Vec3::NEG_Z);
        Self {
            position,
            yaw: dir.z.atan2(dir.x).to_degrees(),
            pitch: dir.y.asin().to_degrees().clamp(-Self::MAX_PITCH, Self::MAX_PITCH),
            ..Default::default()
        }
    }

    pub fn front(&self) -> Vec3 {
        let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
        Vec3::new(yaw.cos() * pitch.cos(), pitch.sin(), yaw.sin() * pitch.cos()).normalize()
    }

    pub fn right(&self) -> Vec3 {
        self.front().cross(Vec3::Y).normalize()
    }

    pub fn up(&self) -> Vec3 {
        self.right().cross(self.front()).normalize()
    }

    /// Move for `dt` seconds at `move_speed`.
    pub fn process_movement(&mut self, movement: CameraMovement, dt: f32) {
        let step = self.move_speed * dt;
        let offset = match movement {
            CameraMovement::Forward => self.front(),
            CameraMovement::Backward => -self.front(),
            CameraMovement::Right => self.right(),
            CameraMovement::Left => -self.right(),
            CameraMovement::Up => Vec3::Y,
            CameraMovement::Down => Vec3::NEG_Y,
        };
        self.position += offset * step;
    }

    /// Apply a mouse delta in pixels. Positive `dy` looks up.
    pub fn process_mouse(&mut self, dx: f32, dy: f32) {
        self.yaw += dx * self.mouse_sensitivity;
        self.pitch =
            (self.pitch + dy * self.mouse_sensitivity).clamp(-Self::MAX_PITCH, Self::MAX_PITCH);
    }

    /// Scroll narrows the field of view.
    pub fn process_scroll(&mut self, delta: f32) {
        self.zoom = (self.zoom - delta).clamp(Self::MIN_ZOOM, Self::MAX_ZOOM);
    }
}

impl CameraProvider for FlyCamera {
    fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.front(), Vec3::Y)
    }

    fn projection_matrix(&self, aspect: f32) -> Mat4 {
        // Swapped planes give reverse-Z.
        Mat4::perspective_rh(self.zoom.to_radians(), aspect.max(1e-4), self.far, self.near)
    }

    fn position(&self) -> Vec3 {
        self.position
    }
}
