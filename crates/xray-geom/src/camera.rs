/// Horizontal field of view the capture cameras were calibrated with, in
/// radians. Every buffer in the datasets shares this intrinsic.
pub const CAMERA_ANGLE_X: f64 = 0.857_556_045_055_389_4;

/// A pinhole camera. The canonical capture pose sits at the world origin
/// looking down -z.
#[derive(Debug, Clone)]
pub struct Camera {
    pub width: u32,
    pub height: u32,
    pub fovx: f32,
    pub position: glam::Vec3,
    pub rotation: glam::Quat,
}

impl Camera {
    pub fn new(
        position: glam::Vec3,
        rotation: glam::Quat,
        fovx: f32,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            width,
            height,
            fovx,
            position,
            rotation,
        }
    }

    /// The identity-pose camera all buffers are captured from.
    pub fn canonical(width: u32, height: u32) -> Self {
        Self::new(
            glam::Vec3::ZERO,
            glam::Quat::IDENTITY,
            CAMERA_ANGLE_X as f32,
            width,
            height,
        )
    }

    pub fn focal(&self) -> f32 {
        fov_to_focal(self.fovx, self.width)
    }

    pub fn center(&self) -> glam::Vec2 {
        glam::vec2((self.width as f32) / 2.0, (self.height as f32) / 2.0)
    }

    pub fn local_to_world(&self) -> glam::Mat4 {
        glam::Mat4::from_rotation_translation(self.rotation, self.position)
    }
}

// Converts field of view to focal length.
pub fn fov_to_focal(fov: f32, pixels: u32) -> f32 {
    (pixels as f32) / (2.0 * (fov / 2.0).tan())
}

// Converts focal length to field of view.
pub fn focal_to_fov(focal: f32, pixels: u32) -> f32 {
    2.0 * ((pixels as f32) / (2.0 * focal)).atan()
}
