use glam::{Mat4, Vec3};

use crate::config::{CAMERA_DISTANCE, CAMERA_FAR, CAMERA_NEAR};

/// Half extents of the orthographic frustum for a given aspect ratio.
///
/// The horizontal half extent is `aspect * scale`, the vertical one half of it.
#[inline]
pub fn frustum_extents(aspect: f32, scale: f32) -> (f32, f32) {
    let half_width = aspect * scale;
    (half_width, half_width / 2.0)
}

/// Orthographic camera looking at `target` from `position`.
#[derive(Clone, Debug)]
pub struct OrthoCamera {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
    pub near: f32,
    pub far: f32,
    pub zoom: f32,
    pub aspect: f32,
    pub frustum_scale: f32,
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    view_matrix: Mat4,
    proj_matrix: Mat4,
    view_proj_matrix: Mat4,
}

impl OrthoCamera {
    pub fn new(aspect: f32, frustum_scale: f32) -> Self {
        let (half_width, half_height) = frustum_extents(aspect, frustum_scale);
        let mut camera = Self {
            left: -half_width,
            right: half_width,
            top: half_height,
            bottom: -half_height,
            near: CAMERA_NEAR,
            far: CAMERA_FAR,
            zoom: 1.0,
            aspect,
            frustum_scale,
            position: Vec3::new(0.0, 0.0, CAMERA_DISTANCE),
            target: Vec3::ZERO,
            up: Vec3::Y,
            view_matrix: Mat4::IDENTITY,
            proj_matrix: Mat4::IDENTITY,
            view_proj_matrix: Mat4::IDENTITY,
        };
        camera.update_matrices();
        camera
    }

    /// Applies a new aspect ratio and recomputes the frustum extents from it.
    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
        let (half_width, half_height) = frustum_extents(aspect, self.frustum_scale);
        self.left = -half_width;
        self.right = half_width;
        self.top = half_height;
        self.bottom = -half_height;
        self.update_projection_matrix();
    }

    pub fn update_projection_matrix(&mut self) {
        let zoom = self.zoom.max(f32::EPSILON);
        let cx = (self.right + self.left) / 2.0;
        let cy = (self.top + self.bottom) / 2.0;
        let dx = (self.right - self.left) / (2.0 * zoom);
        let dy = (self.top - self.bottom) / (2.0 * zoom);

        self.proj_matrix = Mat4::orthographic_rh(cx - dx, cx + dx, cy - dy, cy + dy, self.near, self.far);
        self.view_proj_matrix = self.proj_matrix * self.view_matrix;
    }

    pub fn update_view_matrix(&mut self) {
        self.view_matrix = Mat4::look_at_rh(self.position, self.target, self.up);
        self.view_proj_matrix = self.proj_matrix * self.view_matrix;
    }

    pub fn update_matrices(&mut self) {
        self.view_matrix = Mat4::look_at_rh(self.position, self.target, self.up);
        self.update_projection_matrix();
    }

    pub fn view_matrix(&self) -> Mat4 {
        self.view_matrix
    }

    pub fn proj_matrix(&self) -> Mat4 {
        self.proj_matrix
    }

    pub fn view_proj_matrix(&self) -> Mat4 {
        self.view_proj_matrix
    }

    pub fn forward(&self) -> Vec3 {
        (self.target - self.position).normalize_or_zero()
    }

    /// Maps a point in normalized device coordinates (depth 0 = near plane)
    /// back to world space.
    pub fn unproject(&self, ndc: Vec3) -> Vec3 {
        self.view_proj_matrix.inverse().project_point3(ndc)
    }

    /// Visible width and height of the frustum in world units.
    pub fn visible_extent(&self) -> (f32, f32) {
        let zoom = self.zoom.max(f32::EPSILON);
        ((self.right - self.left) / zoom, (self.top - self.bottom) / zoom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    #[test]
    fn frustum_half_width_scales_with_aspect() {
        for (w, h) in [(1920.0_f32, 1080.0_f32), (800.0, 800.0), (375.0, 812.0), (1.0, 3000.0)] {
            let (half_width, half_height) = frustum_extents(w / h, 4.4);
            assert!((half_width - (w / h) * 4.4).abs() < EPS);
            assert!((half_height - half_width / 2.0).abs() < EPS);
        }
    }

    #[test]
    fn camera_starts_at_z_ten_looking_at_origin() {
        let camera = OrthoCamera::new(16.0 / 9.0, 4.4);
        assert_eq!(camera.position, Vec3::new(0.0, 0.0, 10.0));
        assert!((camera.forward() - Vec3::NEG_Z).length() < EPS);
        assert!((camera.right - 16.0 / 9.0 * 4.4).abs() < EPS);
        assert!((camera.top - 16.0 / 9.0 * 2.2).abs() < EPS);
    }

    #[test]
    fn set_aspect_keeps_scale_constant() {
        let mut camera = OrthoCamera::new(1.0, 4.4);
        camera.set_aspect(2.0);
        assert_eq!(camera.frustum_scale, 4.4);
        assert_eq!(camera.aspect, 2.0);
        assert!((camera.right - 8.8).abs() < EPS);
        assert!((camera.bottom + 4.4).abs() < EPS);
    }

    #[test]
    fn unproject_center_near_plane_lies_in_front_of_camera() {
        let camera = OrthoCamera::new(1.5, 4.4);
        let p = camera.unproject(Vec3::ZERO);
        assert!(p.x.abs() < EPS && p.y.abs() < EPS);
        assert!((p.z - (10.0 - camera.near)).abs() < 1e-4);
    }

    #[test]
    fn unproject_edges_hit_frustum_bounds() {
        let camera = OrthoCamera::new(1.0, 4.4);
        let p = camera.unproject(Vec3::new(1.0, 1.0, 0.0));
        assert!((p.x - camera.right).abs() < 1e-4);
        assert!((p.y - camera.top).abs() < 1e-4);
    }

    #[test]
    fn zoom_shrinks_visible_extent() {
        let mut camera = OrthoCamera::new(1.0, 4.4);
        camera.zoom = 2.0;
        camera.update_projection_matrix();
        let (w, h) = camera.visible_extent();
        assert!((w - 4.4).abs() < EPS);
        assert!((h - 2.2).abs() < EPS);
        let p = camera.unproject(Vec3::new(1.0, 0.0, 0.0));
        assert!((p.x - 2.2).abs() < 1e-4);
    }
}
