use glam::Vec3;

/// An unordered set of oriented, colored points.
///
/// Construction order is deterministic (frame major, then pixel scan order)
/// but carries no meaning; consumers treat the set as unordered.
#[derive(Debug, Clone, Default)]
pub struct PointCloud {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub colors: Vec<Vec3>,
}

impl PointCloud {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn translate(&mut self, offset: Vec3) {
        for position in &mut self.positions {
            *position += offset;
        }
    }

    /// Mean position, `None` for an empty cloud.
    pub fn centroid(&self) -> Option<Vec3> {
        if self.is_empty() {
            return None;
        }
        let sum: Vec3 = self.positions.iter().copied().sum();
        Some(sum / self.positions.len() as f32)
    }

    /// Translate the cloud so its centroid sits at the origin. A no-op for
    /// an empty cloud.
    pub fn center_on_centroid(&mut self) {
        if let Some(centroid) = self.centroid() {
            self.translate(-centroid);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::vec3;

    #[test]
    fn centroid_and_centering() {
        let mut cloud = PointCloud {
            positions: vec![vec3(1.0, 0.0, 0.0), vec3(3.0, 2.0, -4.0)],
            normals: vec![Vec3::Z; 2],
            colors: vec![Vec3::ONE; 2],
        };
        assert_eq!(cloud.centroid(), Some(vec3(2.0, 1.0, -2.0)));
        cloud.center_on_centroid();
        assert_eq!(cloud.centroid(), Some(Vec3::ZERO));
    }

    #[test]
    fn empty_cloud_has_no_centroid() {
        let mut cloud = PointCloud::default();
        assert_eq!(cloud.centroid(), None);
        cloud.center_on_centroid();
        assert!(cloud.is_empty());
    }
}
