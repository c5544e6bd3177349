pub mod camera;
pub mod chamfer;
pub mod export;
pub mod pointcloud;
pub mod project;
pub mod ray;

pub use camera::{CAMERA_ANGLE_X, Camera};
pub use chamfer::chamfer_distance;
pub use export::pointcloud_to_ply;
pub use pointcloud::PointCloud;
pub use project::project_buffer;
pub use ray::RayField;
