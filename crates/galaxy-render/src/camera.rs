//! Camera state for view/projection matrices and pass isolation.

use galaxy_config::CameraConfig;
use glam::{Mat3, Mat4, Quat, Vec3};

use crate::layers::LayerMask;
use crate::stars::CameraUniform;

/// A camera that generates view and projection matrices for rendering.
///
/// `layers` selects which batches a pass draws. The compositor writes it
/// before each pass; everything else only reads it.
#[derive(Debug, Clone)]
pub struct Camera {
    /// Position in world space.
    pub position: Vec3,
    /// Rotation as a unit quaternion.
    pub rotation: Quat,
    /// Vertical field of view in radians.
    pub fov_y: f32,
    /// Width / height.
    pub aspect_ratio: f32,
    /// Near clip plane distance (always positive).
    pub near: f32,
    /// Far clip plane distance (always positive, > near).
    pub far: f32,
    /// Layers visible to the next draw.
    pub layers: LayerMask,
}

impl Camera {
    /// Perspective camera placed from config, looking at its target with +Z up.
    pub fn from_config(config: &CameraConfig, aspect_ratio: f32) -> Self {
        let mut camera = Self {
            fov_y: config.fov_y_degrees.to_radians(),
            aspect_ratio,
            near: config.near,
            far: config.far,
            ..Self::default()
        };
        camera.look_at(
            Vec3::from_array(config.position),
            Vec3::from_array(config.target),
            Vec3::Z,
        );
        camera
    }

    /// Move to `position` and orient towards `target`.
    ///
    /// Leaves the rotation untouched when `target` coincides with `position`.
    /// If `up` is parallel to the view direction a perpendicular axis is used.
    pub fn look_at(&mut self, position: Vec3, target: Vec3, up: Vec3) {
        self.position = position;
        let Some(forward) = (target - position).try_normalize() else {
            return;
        };
        let right = forward
            .cross(up)
            .try_normalize()
            .unwrap_or_else(|| forward.any_orthonormal_vector());
        let true_up = right.cross(forward);
        self.rotation = Quat::from_mat3(&Mat3::from_cols(right, true_up, -forward)).normalize();
    }

    /// Distance from the camera to a world-space point.
    pub fn distance_to(&self, point: Vec3) -> f32 {
        self.position.distance(point)
    }

    /// Compute the view matrix (inverse of camera transform).
    pub fn view_matrix(&self) -> Mat4 {
        let rotation_matrix = Mat4::from_quat(self.rotation);
        let translation_matrix = Mat4::from_translation(self.position);
        (translation_matrix * rotation_matrix).inverse()
    }

    /// Perspective projection with reverse-Z: near maps to 1, far to 0.
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect_ratio, self.far, self.near)
    }

    /// Compute the combined view-projection matrix.
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// The forward direction vector (-Z in camera space).
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    /// The up direction vector (+Y in camera space).
    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    /// The right direction vector (+X in camera space).
    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    /// Match the projection to a `width` x `height` viewport. A zero height
    /// keeps the previous ratio.
    pub fn set_aspect_ratio(&mut self, width: f32, height: f32) {
        if height > 0.0 {
            self.aspect_ratio = width / height;
        }
    }

    /// Convert the camera to a uniform suitable for GPU upload.
    pub fn to_uniform(&self) -> CameraUniform {
        CameraUniform {
            view_proj: self.view_projection_matrix().to_cols_array_2d(),
            right: self.right().extend(0.0).to_array(),
            up: self.up().extend(0.0).to_array(),
        }
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            fov_y: std::f32::consts::FRAC_PI_3,
            aspect_ratio: 16.0 / 9.0,
            near: 0.1,
            far: 10000.0,
            layers: LayerMask::ALL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_3;

    #[test]
    fn test_identity_camera_looks_down_neg_z() {
        let camera = Camera::default();
        let forward = camera.forward();
        assert!((forward.x).abs() < 1e-6);
        assert!((forward.y).abs() < 1e-6);
        assert!((forward.z + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_aspect_ratio_from_viewport() {
        let mut camera = Camera::default();
        camera.set_aspect_ratio(1920.0, 1080.0);
        assert!((camera.aspect_ratio - 16.0 / 9.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_height_keeps_previous_aspect() {
        let mut camera = Camera::default();
        camera.set_aspect_ratio(800.0, 0.0);
        assert_eq!(camera.aspect_ratio, 16.0 / 9.0);
    }

    #[test]
    fn test_look_at_faces_target() {
        let mut camera = Camera::default();
        camera.look_at(Vec3::new(200.0, 200.0, 0.0), Vec3::ZERO, Vec3::Z);
        let expected = (Vec3::ZERO - camera.position).normalize();
        assert!((camera.forward() - expected).length() < 1e-5);
        // +Z stays up on screen.
        assert!(camera.up().z > 0.99);
        assert!(camera.right().dot(camera.forward()).abs() < 1e-5);
    }

    #[test]
    fn test_look_at_with_parallel_up_stays_orthonormal() {
        let mut camera = Camera::default();
        camera.look_at(Vec3::new(0.0, 0.0, 300.0), Vec3::ZERO, Vec3::Z);
        assert!((camera.forward() - Vec3::NEG_Z).length() < 1e-5);
        assert!(camera.up().dot(camera.forward()).abs() < 1e-5);
        assert!((camera.right().length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_look_at_own_position_keeps_rotation() {
        let mut camera = Camera::default();
        camera.look_at(Vec3::ONE, Vec3::ONE, Vec3::Z);
        assert_eq!(camera.rotation, Quat::IDENTITY);
        assert_eq!(camera.position, Vec3::ONE);
    }

    #[test]
    fn test_from_config_uses_start_position_and_fov() {
        let config = CameraConfig::default();
        let camera = Camera::from_config(&config, 16.0 / 9.0);
        assert_eq!(camera.position, Vec3::new(200.0, 200.0, 0.0));
        assert!((camera.distance_to(Vec3::ZERO) - 200.0 * 2f32.sqrt()).abs() < 1e-3);
        assert!((camera.fov_y - FRAC_PI_3).abs() < 1e-6);
        assert_eq!(camera.layers, LayerMask::ALL);
    }

    #[test]
    fn test_view_matrix_inverse_is_camera_transform() {
        let camera = Camera {
            position: Vec3::new(10.0, 20.0, 30.0),
            rotation: Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
            ..Camera::default()
        };
        let inv_view = camera.view_matrix().inverse();
        let reconstructed_pos = inv_view.col(3).truncate();
        assert!((reconstructed_pos - camera.position).length() < 1e-4);
    }

    #[test]
    fn test_target_projects_to_screen_center() {
        let mut camera = Camera::default();
        camera.look_at(Vec3::new(200.0, 200.0, 0.0), Vec3::ZERO, Vec3::Z);
        let clip = camera.view_projection_matrix() * glam::Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert!((clip.x / clip.w).abs() < 1e-4);
        assert!((clip.y / clip.w).abs() < 1e-4);
        // Reverse-Z keeps visible depth inside [0, 1].
        let depth = clip.z / clip.w;
        assert!((0.0..=1.0).contains(&depth));
    }

    #[test]
    fn test_uniform_carries_billboard_axes() {
        let camera = Camera::default();
        let uniform = camera.to_uniform();
        assert_eq!(uniform.right, [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(uniform.up, [0.0, 1.0, 0.0, 0.0]);
    }
}
