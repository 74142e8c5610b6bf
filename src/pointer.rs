use glam::{Vec2, Vec3};

use crate::camera::OrthoCamera;

/// Below this the pick ray is treated as parallel to the z = 0 plane.
const PARALLEL_EPSILON: f32 = 1e-6;

/// Latest pointer position in normalized device coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Pointer {
    pub ndc: Vec2,
}

impl Pointer {
    /// Overwrites the position from client (CSS pixel) coordinates.
    pub fn update(&mut self, client_x: f32, client_y: f32, width: f32, height: f32) -> Vec2 {
        self.ndc = to_ndc(client_x, client_y, width, height);
        self.ndc
    }
}

/// Client coordinates to NDC: x right, y up, both in [-1, 1].
#[inline]
pub fn to_ndc(client_x: f32, client_y: f32, width: f32, height: f32) -> Vec2 {
    Vec2::new(
        (client_x / width) * 2.0 - 1.0,
        -(client_y / height) * 2.0 + 1.0,
    )
}

/// Casts a ray from the camera position through the pointer (unprojected at
/// the near plane) and intersects it with the world z = 0 plane.
///
/// Returns `None` when the ray runs parallel to the plane.
pub fn intersect_z_plane(camera: &OrthoCamera, ndc: Vec2) -> Option<Vec3> {
    let on_near = camera.unproject(Vec3::new(ndc.x, ndc.y, 0.0));
    let direction = (on_near - camera.position).normalize_or_zero();
    if direction.z.abs() < PARALLEL_EPSILON {
        return None;
    }

    let distance = -camera.position.z / direction.z;
    Some(camera.position + direction * distance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_center_maps_to_origin() {
        for (w, h) in [(1920.0_f32, 1080.0_f32), (333.0, 777.0), (1.0, 1.0)] {
            let ndc = to_ndc(w / 2.0, h / 2.0, w, h);
            assert_eq!(ndc, Vec2::ZERO);
        }
    }

    #[test]
    fn corners_map_to_unit_square() {
        assert_eq!(to_ndc(0.0, 0.0, 800.0, 600.0), Vec2::new(-1.0, 1.0));
        assert_eq!(to_ndc(800.0, 600.0, 800.0, 600.0), Vec2::new(1.0, -1.0));
    }

    #[test]
    fn pointer_state_is_overwritten() {
        let mut pointer = Pointer::default();
        pointer.update(0.0, 0.0, 100.0, 100.0);
        let ndc = pointer.update(50.0, 50.0, 100.0, 100.0);
        assert_eq!(ndc, Vec2::ZERO);
        assert_eq!(pointer.ndc, Vec2::ZERO);
    }

    #[test]
    fn intersection_lies_on_z_plane() {
        let mut camera = OrthoCamera::new(16.0 / 9.0, 4.4);
        for z in [10.0_f32, 3.5, -7.0, 250.0] {
            camera.position = Vec3::new(0.3, -0.2, z);
            camera.target = Vec3::new(0.3, -0.2, 0.0);
            camera.update_matrices();
            for ndc in [Vec2::ZERO, Vec2::new(0.5, -0.25), Vec2::new(-1.0, 1.0)] {
                let point = intersect_z_plane(&camera, ndc).expect("ray hits plane");
                assert!(point.z.abs() < 1e-4, "z = {} for camera z {}", point.z, z);
            }
        }
    }

    #[test]
    fn center_ray_hits_origin() {
        let camera = OrthoCamera::new(1.0, 4.4);
        let point = intersect_z_plane(&camera, Vec2::ZERO).expect("ray hits plane");
        assert!(point.length() < 1e-4);
    }

    #[test]
    fn off_center_ray_is_scaled_by_distance_over_near() {
        // Near plane point (4.4, 0, 9) seen from (0, 0, 10) reaches z = 0 at x = 44.
        let camera = OrthoCamera::new(1.0, 4.4);
        let point = intersect_z_plane(&camera, Vec2::new(1.0, 0.0)).expect("ray hits plane");
        assert!((point.x - 44.0).abs() < 1e-2);
        assert!(point.y.abs() < 1e-4);
    }
}
