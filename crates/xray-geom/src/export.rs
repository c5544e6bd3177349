use crate::pointcloud::PointCloud;
use serde::Serialize;
use serde_ply::{SerializeError, SerializeOptions};

#[derive(Serialize)]
struct PlyVertex {
    x: f32,
    y: f32,
    z: f32,
    nx: f32,
    ny: f32,
    nz: f32,
    red: u8,
    green: u8,
    blue: u8,
}

#[derive(Serialize)]
struct Ply {
    vertex: Vec<PlyVertex>,
}

/// Serialize a point cloud as a binary little-endian ply file.
pub fn pointcloud_to_ply(cloud: &PointCloud) -> Result<Vec<u8>, SerializeError> {
    let vertex = cloud
        .positions
        .iter()
        .enumerate()
        .map(|(i, position)| {
            let normal = cloud.normals.get(i).copied().unwrap_or_default();
            let color = cloud.colors.get(i).copied().unwrap_or_default();
            let to_u8 = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
            PlyVertex {
                x: position.x,
                y: position.y,
                z: position.z,
                nx: normal.x,
                ny: normal.y,
                nz: normal.z,
                red: to_u8(color.x),
                green: to_u8(color.y),
                blue: to_u8(color.z),
            }
        })
        .collect();
    let ply = Ply { vertex };

    let comments = vec![
        "Exported from xray-eval".to_owned(),
        "Vertical axis: y".to_owned(),
    ];
    serde_ply::to_bytes(&ply, SerializeOptions::binary_le().with_comments(comments))
}
