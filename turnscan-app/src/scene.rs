//! Synthetic stripe images for dry runs without hardware.

use glam::{DVec2, DVec3};
use turnscan_capture::StripeScene;
use turnscan_data::{LaserSide, Plane, rotate_about_y};
use turnscan_recon::{Calibration, CameraModel};

/// A vertical cylinder standing on the turntable, seen through a calibrated
/// camera and lit by the calibrated laser planes.
pub struct CylinderScene {
    camera: CameraModel,
    planes: [Option<Plane>; 2],
    radius: f64,
    height: f64,
    /// Cylinder axis position on the turntable (x, z).
    offset: DVec2,
}

impl CylinderScene {
    pub fn new(calibration: &Calibration, radius: f64, height: f64, offset: DVec2) -> Self {
        Self {
            camera: calibration.camera_model(),
            planes: [
                calibration.plane(LaserSide::Left),
                calibration.plane(LaserSide::Right),
            ],
            radius,
            height,
            offset,
        }
    }

    /// Point where the laser plane meets the cylinder on image row `row`,
    /// nearest to the camera.
    fn surface_point(&self, plane: &Plane, rotation: f64, row: u32) -> Option<DVec3> {
        let k = &self.camera.intrinsics;
        let pose = &self.camera.pose;

        // Every camera ray through this row lies in one plane.
        let a = -(row as f64 - k.cy) / k.fy;
        let row_normal = pose.orientation * DVec3::new(0.0, 1.0, a);
        let row_offset = row_normal.dot(pose.position);
        let plane_offset = plane.normal.dot(plane.point);

        let direction = row_normal.cross(plane.normal);
        let len2 = direction.length_squared();
        if len2 < 1e-12 {
            return None;
        }
        let origin = (row_offset * plane.normal.cross(direction)
            + plane_offset * direction.cross(row_normal))
            / len2;

        // Intersect the line with the cylinder's circle in the xz plane.
        let center = rotate_about_y(DVec3::new(self.offset.x, 0.0, self.offset.y), rotation);
        let d = DVec2::new(direction.x, direction.z);
        let m = DVec2::new(origin.x - center.x, origin.z - center.z);
        let qa = d.length_squared();
        let qb = 2.0 * d.dot(m);
        let qc = m.length_squared() - self.radius * self.radius;
        let disc = qb * qb - 4.0 * qa * qc;
        if qa < 1e-12 || disc < 0.0 {
            return None;
        }
        let root = disc.sqrt();
        let hits = [(-qb - root) / (2.0 * qa), (-qb + root) / (2.0 * qa)].map(|t| origin + direction * t);
        let nearest = if hits[0].distance(pose.position) <= hits[1].distance(pose.position) {
            hits[0]
        } else {
            hits[1]
        };
        (0.0..=self.height).contains(&nearest.y).then_some(nearest)
    }
}

impl StripeScene for CylinderScene {
    fn stripe_column(&self, side: LaserSide, rotation: f64, row: u32) -> Option<f32> {
        let plane = self.planes[side.index()]?;
        let point = self.surface_point(&plane, rotation, row)?;

        let k = &self.camera.intrinsics;
        let local = self.camera.pose.orientation.inverse() * (point - self.camera.pose.position);
        if local.z >= 0.0 {
            return None;
        }
        let column = k.cx + k.fx * local.x / -local.z;
        (column >= 0.0 && column < k.width as f64).then_some(column as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use turnscan_data::PixelLocation;

    #[test]
    fn test_stripe_reprojects_onto_cylinder() {
        let calibration = Calibration::default();
        let scene = CylinderScene::new(&calibration, 40.0, 100.0, DVec2::new(10.0, 0.0));
        let model = calibration.camera_model();
        let plane = calibration.plane(LaserSide::Right).unwrap();
        let rotation = 0.7;

        let mut rows = 0;
        for row in (0..480).step_by(20) {
            let Some(column) = scene.stripe_column(LaserSide::Right, rotation, row) else {
                continue;
            };
            rows += 1;
            let hit = plane
                .intersect(&model.ray_for_pixel(PixelLocation::new(column, row as f32)))
                .unwrap();
            let center = rotate_about_y(DVec3::new(10.0, 0.0, 0.0), rotation);
            let radial = DVec2::new(hit.x - center.x, hit.z - center.z).length();
            assert!((radial - 40.0).abs() < 1e-2);
        }
        assert!(rows > 5);
    }

    #[test]
    fn test_rows_above_object_are_empty() {
        let calibration = Calibration::default();
        let scene = CylinderScene::new(&calibration, 40.0, 10.0, DVec2::ZERO);
        // Row 0 looks well above a 10mm tall object.
        assert_eq!(scene.stripe_column(LaserSide::Left, 0.0, 0), None);
    }
}
