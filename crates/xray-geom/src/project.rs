use crate::pointcloud::PointCloud;
use crate::ray::RayField;
use glam::vec3;
use tracing::trace_span;
use xray_buffer::XrayBuffer;

use burn::prelude::Backend;

/// Unproject every hit pixel of a post-processed buffer into world space.
///
/// The single ray field is broadcast over all frames. A pixel is a hit iff
/// its depth is strictly positive; zero depth always means "no surface".
/// The result may be empty.
pub fn project_buffer<B: Backend>(buffer: &XrayBuffer<B>, rays: &RayField) -> PointCloud {
    let _span = trace_span!("project_buffer").entered();

    let [frames, _, height, width] = buffer.dims();
    assert_eq!(
        (rays.width as usize, rays.height as usize),
        (width, height),
        "ray field resolution must match the buffer"
    );

    let depth: Vec<f32> = buffer
        .depth()
        .into_data()
        .into_vec()
        .expect("Unreachable");
    let normals: Vec<f32> = buffer
        .normals()
        .into_data()
        .into_vec()
        .expect("Unreachable");
    let colors: Vec<f32> = buffer
        .colors()
        .into_data()
        .into_vec()
        .expect("Unreachable");

    let pixels = height * width;
    let origin = rays.origin();
    let directions = rays.directions();

    let mut cloud = PointCloud::default();
    for frame in 0..frames {
        let depth_base = frame * pixels;
        // Channel-first layout: [F, 3, H, W].
        let channel_base = frame * 3 * pixels;
        for pixel in 0..pixels {
            let d = depth[depth_base + pixel];
            if d <= 0.0 {
                continue;
            }
            cloud.positions.push(origin + directions[pixel] * d);
            cloud.normals.push(vec3(
                normals[channel_base + pixel],
                normals[channel_base + pixels + pixel],
                normals[channel_base + 2 * pixels + pixel],
            ));
            cloud.colors.push(vec3(
                colors[channel_base + pixel],
                colors[channel_base + pixels + pixel],
                colors[channel_base + 2 * pixels + pixel],
            ));
        }
    }

    log::debug!(
        "projected {} points from {frames} frames at {width}x{height}",
        cloud.len()
    );
    cloud
}
