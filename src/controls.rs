use bitflags::bitflags;
use glam::{Vec2, Vec3};

use crate::camera::OrthoCamera;

const MIN_POLAR: f32 = 1e-4;
const MAX_POLAR: f32 = std::f32::consts::PI - 1e-4;
const ZOOM_STEP: f32 = 0.95;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct PointerButtons: u8 {
        const PRIMARY = 1 << 0;
        const SECONDARY = 1 << 1;
        const MIDDLE = 1 << 2;
        // Buttons that start an orbit drag.
        const ROTATE = Self::PRIMARY.bits();
        const PAN = Self::SECONDARY.bits() | Self::MIDDLE.bits();
    }
}

/// Pointer-drag camera controls: rotate around `target` with the primary
/// button, pan with the others, zoom the orthographic projection with the wheel.
#[derive(Clone, Debug)]
pub struct OrbitControls {
    pub target: Vec3,
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub pan_speed: f32,
    pub min_zoom: f32,
    pub max_zoom: f32,
    pub enabled: bool,
    buttons: PointerButtons,
    last_pointer: Option<Vec2>,
}

impl Default for OrbitControls {
    fn default() -> Self {
        Self::new(Vec3::ZERO)
    }
}

impl OrbitControls {
    pub fn new(target: Vec3) -> Self {
        Self {
            target,
            rotate_speed: 1.0,
            zoom_speed: 1.0,
            pan_speed: 1.0,
            min_zoom: 0.1,
            max_zoom: 10.0,
            enabled: true,
            buttons: PointerButtons::empty(),
            last_pointer: None,
        }
    }

    /// Points the camera at the controls target.
    pub fn update(&self, camera: &mut OrthoCamera) {
        camera.target = self.target;
        camera.update_view_matrix();
    }

    pub fn is_dragging(&self) -> bool {
        self.buttons.intersects(PointerButtons::ROTATE | PointerButtons::PAN)
    }

    pub fn button(&mut self, button: PointerButtons, pressed: bool, position: Vec2) {
        if pressed {
            self.buttons.insert(button);
            self.last_pointer = Some(position);
        } else {
            self.buttons.remove(button);
            if self.buttons.is_empty() {
                self.last_pointer = None;
            }
        }
    }

    /// Feeds a pointer move in CSS pixels. Returns `true` when the camera moved.
    pub fn pointer_moved(&mut self, position: Vec2, viewport_height: f32, camera: &mut OrthoCamera) -> bool {
        if !self.enabled {
            return false;
        }
        let Some(last) = self.last_pointer else {
            return false;
        };
        self.last_pointer = Some(position);
        let delta = position - last;
        if delta == Vec2::ZERO {
            return false;
        }

        if self.buttons.intersects(PointerButtons::ROTATE) {
            let angle_scale = std::f32::consts::TAU / viewport_height.max(1.0) * self.rotate_speed;
            self.rotate(camera, delta.x * angle_scale, delta.y * angle_scale);
            true
        } else if self.buttons.intersects(PointerButtons::PAN) {
            self.pan(camera, delta, viewport_height);
            true
        } else {
            false
        }
    }

    /// Spherical rotation of the camera offset around the target.
    pub fn rotate(&self, camera: &mut OrthoCamera, angle_left: f32, angle_up: f32) {
        let offset = camera.position - self.target;
        let radius = offset.length();
        if radius <= f32::EPSILON {
            return;
        }

        let theta = offset.x.atan2(offset.z) - angle_left;
        let phi = ((offset.y / radius).clamp(-1.0, 1.0).acos() - angle_up).clamp(MIN_POLAR, MAX_POLAR);

        let (sin_phi, cos_phi) = phi.sin_cos();
        let (sin_theta, cos_theta) = theta.sin_cos();
        camera.position = self.target + Vec3::new(sin_phi * sin_theta, cos_phi, sin_phi * cos_theta) * radius;
        self.update(camera);
    }

    fn pan(&mut self, camera: &mut OrthoCamera, delta: Vec2, viewport_height: f32) {
        // Pixel deltas to world units, vertical extent used for both axes.
        let (_, extent_h) = camera.visible_extent();
        let world_per_pixel = extent_h / viewport_height.max(1.0) * self.pan_speed;

        let forward = camera.forward();
        let right = forward.cross(camera.up).normalize_or_zero();
        let up = right.cross(forward).normalize_or_zero();
        let shift = right * (-delta.x * world_per_pixel) + up * (delta.y * world_per_pixel);

        camera.position += shift;
        self.target += shift;
        self.update(camera);
    }

    /// Wheel input; positive `scroll` zooms in.
    pub fn zoom(&self, camera: &mut OrthoCamera, scroll: f32) {
        if !self.enabled || scroll == 0.0 {
            return;
        }
        let scale = ZOOM_STEP.powf(self.zoom_speed);
        let zoom = if scroll > 0.0 { camera.zoom / scale } else { camera.zoom * scale };
        camera.zoom = zoom.clamp(self.min_zoom, self.max_zoom);
        camera.update_projection_matrix();
    }
}
