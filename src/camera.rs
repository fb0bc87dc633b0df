//! Perspective camera.

use glam::{Mat4, Vec3};

/// A free-look perspective camera.
///
/// Orientation is yaw/pitch in radians; yaw 0, pitch 0 looks down -Z.
pub struct Camera {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 2.0, 8.0),
            yaw: 0.0,
            pitch: 0.0,
            fov: 45.0,
            near: 0.1,
            far: 500.0,
        }
    }
}

impl Camera {
    /// Unit vector the camera looks along.
    pub fn forward(&self) -> Vec3 {
        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        let (sin_pitch, cos_pitch) = self.pitch.sin_cos();
        Vec3::new(sin_yaw * cos_pitch, sin_pitch, -cos_yaw * cos_pitch)
    }

    /// Orient the camera toward a world point.
    pub fn look_at(&mut self, target: Vec3) {
        let dir = (target - self.position).normalize_or_zero();
        self.pitch = dir.y.asin();
        self.yaw = dir.x.atan2(-dir.z);
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward(), Vec3::Y)
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov.to_radians(), aspect, self.near, self.far)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_camera_looks_down_negative_z() {
        let camera = Camera::default();
        assert!((camera.forward() - Vec3::NEG_Z).length() < 1e-6);
    }

    #[test]
    fn look_at_centers_the_target() {
        let mut camera = Camera {
            position: Vec3::new(0.0, 0.0, 10.0),
            ..Default::default()
        };
        camera.look_at(Vec3::new(5.0, 0.0, 0.0));
        let view = camera.view_matrix();
        let in_view = view.transform_point3(Vec3::new(5.0, 0.0, 0.0));
        // target lies on the view axis, in front of the camera
        assert!(in_view.x.abs() < 1e-4);
        assert!(in_view.y.abs() < 1e-4);
        assert!(in_view.z < 0.0);
    }

    #[test]
    fn view_matrix_places_the_camera_at_the_origin() {
        let camera = Camera {
            position: Vec3::new(3.0, 4.0, 5.0),
            ..Default::default()
        };
        let at_origin = camera.view_matrix().transform_point3(camera.position);
        assert!(at_origin.length() < 1e-5);
    }
}
