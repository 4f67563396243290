//! Ray and laser plane intersection.

use crate::calibration::{Calibration, CameraModel};
use crate::error::ScanError;
use tracing::trace;
use turnscan_data::{ColoredPoint, DataPoint, LaserSide, Plane, rotate_about_y};

/// Counts from resolving one batch of samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriangulationStats {
    pub accepted: usize,
    pub rejected: usize,
}

/// Resolves stripe samples to points in the turntable frame.
///
/// Construction fails when an enabled laser has no calibrated plane, so a
/// scan can never start with a side it cannot triangulate.
#[derive(Debug, Clone)]
pub struct TriangulationEngine {
    camera: CameraModel,
    planes: [Option<Plane>; 2],
}

impl TriangulationEngine {
    pub fn new(calibration: &Calibration, sides: &[LaserSide]) -> Result<Self, ScanError> {
        calibration.require(sides)?;
        let mut planes = [None; 2];
        for &side in sides {
            planes[side.index()] = calibration.plane(side);
        }
        Ok(Self {
            camera: calibration.camera_model(),
            planes,
        })
    }

    /// Resolve one sample. `None` when the camera ray is parallel to the
    /// laser plane, meets it behind the camera, or the result overflows.
    pub fn triangulate(&self, sample: &DataPoint) -> Option<ColoredPoint> {
        let plane = self.planes[sample.laser_side.index()]?;
        let ray = self.camera.ray_for_pixel(sample.pixel);
        let hit = plane.intersect(&ray)?;
        // Undo the turntable rotation to land in the object's frame.
        let world = rotate_about_y(hit, -sample.rotation);
        let point = ColoredPoint::new(world, sample.color);
        if !point.is_finite() {
            trace!("Sample {} overflowed at {:?}", sample.index, world);
            return None;
        }
        Some(point)
    }

    /// Resolve every sample in `frame`, keeping only the accepted ones in
    /// input order.
    pub fn resolve(&self, frame: &[DataPoint], out: &mut Vec<DataPoint>) -> TriangulationStats {
        let mut stats = TriangulationStats::default();
        for sample in frame {
            match self.triangulate(sample) {
                Some(point) => {
                    out.push(DataPoint {
                        point: Some(point),
                        ..*sample
                    });
                    stats.accepted += 1;
                }
                None => stats.rejected += 1,
            }
        }
        stats
    }
}
