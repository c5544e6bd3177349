use crate::camera::Camera;
use glam::{Mat3, Vec3, vec3};

/// Guard against a zero-length direction before normalizing.
const DIR_EPSILON: f32 = 1e-8;

/// Per-pixel camera rays in world space, row major.
///
/// The origin is the camera position, shared by every pixel; directions are
/// unit length. Built once per resolution and shared read-only across an
/// evaluation run.
#[derive(Debug, Clone)]
pub struct RayField {
    pub width: u32,
    pub height: u32,
    origin: Vec3,
    directions: Vec<Vec3>,
}

impl RayField {
    /// Rays for the canonical identity-pose camera at this resolution.
    pub fn new(width: u32, height: u32) -> Self {
        Self::for_camera(&Camera::canonical(width, height))
    }

    pub fn for_camera(camera: &Camera) -> Self {
        let fx = camera.focal();
        let center = camera.center();
        let rotation = Mat3::from_quat(camera.rotation);

        let mut directions = Vec::with_capacity((camera.width * camera.height) as usize);
        for row in 0..camera.height {
            for col in 0..camera.width {
                // Image plane at z = -1; image rows grow downward while world
                // y grows upward, hence the flipped y.
                let dir = vec3(
                    (col as f32 - center.x) / fx,
                    -(row as f32 - center.y) / fx,
                    -1.0,
                );
                let dir = rotation * dir;
                directions.push(dir / (dir.length() + DIR_EPSILON));
            }
        }

        Self {
            width: camera.width,
            height: camera.height,
            origin: camera.position,
            directions,
        }
    }

    /// The shared origin, conceptually broadcast to every pixel.
    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    /// Unit directions, one per pixel in row-major scan order.
    pub fn directions(&self) -> &[Vec3] {
        &self.directions
    }

    pub fn len(&self) -> usize {
        self.directions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn directions_are_unit_length() {
        for (w, h) in [(4, 4), (17, 9), (256, 256)] {
            let rays = RayField::new(w, h);
            assert_eq!(rays.len(), (w * h) as usize);
            for dir in rays.directions() {
                assert_approx_eq!(dir.length(), 1.0, 1e-5);
            }
        }
    }

    #[test]
    fn canonical_rays_look_down_negative_z() {
        let rays = RayField::new(8, 8);
        assert_eq!(rays.origin(), Vec3::ZERO);
        for dir in rays.directions() {
            assert!(dir.z < 0.0, "canonical camera looks down -z");
        }
    }

    #[test]
    fn y_axis_is_flipped() {
        let rays = RayField::new(4, 4);
        // First scanline is the top of the image, which is +y in the world.
        let top = rays.directions()[0];
        let bottom = rays.directions()[rays.len() - 1];
        assert!(top.y > 0.0);
        assert!(bottom.y < 0.0);
    }
}
