use crate::pointcloud::PointCloud;
use ball_tree::BallTree;
use tracing::trace_span;

#[derive(PartialEq, Clone, Copy, Debug)]
struct BallPoint(glam::Vec3A);

impl ball_tree::Point for BallPoint {
    fn distance(&self, other: &Self) -> f64 {
        self.0.distance(other.0) as f64
    }

    fn move_towards(&self, other: &Self, d: f64) -> Self {
        Self(self.0.lerp(other.0, d as f32 / self.0.distance(other.0)))
    }

    fn midpoint(a: &Self, b: &Self) -> Self {
        Self((a.0 + b.0) / 2.0)
    }
}

/// Mean squared nearest-neighbor distance from every point of `from` to the
/// set `to`. `to` must be non-empty.
fn directed_mean_sq(from: &PointCloud, to: &PointCloud) -> f64 {
    let tree_points: Vec<BallPoint> = to
        .positions
        .iter()
        .map(|p| BallPoint(glam::Vec3A::from(*p)))
        .collect();
    let empty = vec![(); tree_points.len()];
    let tree = BallTree::new(tree_points, empty);
    let mut query = tree.query();

    let sum: f64 = from
        .positions
        .iter()
        .map(|p| {
            let (_, distance, _) = query
                .nn(&BallPoint(glam::Vec3A::from(*p)))
                .next()
                .expect("Tree is non-empty");
            distance * distance
        })
        .sum();
    sum / from.len() as f64
}

/// Symmetric Chamfer distance between two point sets: the sum of the two
/// directional mean squared nearest-neighbor distances.
///
/// Returns NaN when either set is empty so degenerate geometry can be
/// detected and skipped rather than raised.
pub fn chamfer_distance(a: &PointCloud, b: &PointCloud) -> f64 {
    if a.is_empty() || b.is_empty() {
        return f64::NAN;
    }
    let _span = trace_span!("chamfer_distance").entered();
    directed_mean_sq(a, b) + directed_mean_sq(b, a)
}
