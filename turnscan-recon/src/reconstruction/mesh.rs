//! Triangle mesh over the capture lattice.
//!
//! Samples of one laser form a grid indexed by turntable step and row bin.
//! Each grid cell with four resolved corners becomes two triangles, split
//! along its shorter diagonal. Laser sides are never bridged.

use super::point_cloud::{GridCoord, PointCloud};
use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;
use turnscan_data::FaceMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    pub enabled: bool,
    /// Triangles with an edge longer than this (mm) are dropped.
    pub max_edge_length: f64,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_edge_length: 5.0,
        }
    }
}

pub struct MeshBuilder {
    config: MeshConfig,
    num_steps: u32,
}

impl MeshBuilder {
    pub fn new(config: MeshConfig, num_steps: u32) -> Self {
        Self {
            config,
            num_steps: num_steps.max(1),
        }
    }

    pub fn build(&self, cloud: &PointCloud) -> FaceMap {
        let start = Instant::now();
        let lattice = cloud.lattice();
        let mut faces = FaceMap::new();
        let mut dropped = 0usize;

        for (i, &coord) in cloud.coords.iter().enumerate() {
            if lattice.get(&coord) != Some(&(i as u32)) {
                continue;
            }
            // Two steps would close the same strip twice.
            let next_step = coord.step + 1;
            if next_step == self.num_steps && self.num_steps <= 2 {
                continue;
            }
            let next_step = next_step % self.num_steps;

            let corner = |step: u32, row_bin: u32| lattice.get(&GridCoord { step, row_bin, ..coord }).copied();
            let (Some(b), Some(c), Some(d)) = (
                corner(coord.step, coord.row_bin + 1),
                corner(next_step, coord.row_bin),
                corner(next_step, coord.row_bin + 1),
            ) else {
                continue;
            };
            let a = i as u32;

            let p = |k: u32| cloud.points[k as usize].position();
            let triangles = if p(a).distance(p(d)) <= p(b).distance(p(c)) {
                [[a, b, d], [a, d, c]]
            } else {
                [[a, b, c], [b, d, c]]
            };
            for triangle in triangles {
                match self.orient(cloud, triangle) {
                    Some([x, y, z]) => faces.push_triangle(x, y, z),
                    None => dropped += 1,
                }
            }
        }

        info!(
            "Meshed {} triangles over {} points in {:.2?} ({} over edge limit)",
            faces.len(),
            cloud.len(),
            start.elapsed(),
            dropped
        );
        faces
    }

    /// Reject triangles with long edges and wind the rest so their face
    /// normal agrees with the vertex normals.
    fn orient(&self, cloud: &PointCloud, [a, b, c]: [u32; 3]) -> Option<[u32; 3]> {
        let point = |k: u32| &cloud.points[k as usize];
        let (pa, pb, pc) = (point(a).position(), point(b).position(), point(c).position());
        let limit = self.config.max_edge_length;
        if pa.distance(pb) > limit || pb.distance(pc) > limit || pc.distance(pa) > limit {
            return None;
        }

        let face_normal = (pb - pa).cross(pc - pa);
        let mut reference = [a, b, c]
            .iter()
            .map(|&k| point(k).normal.as_dvec3())
            .sum::<DVec3>();
        if reference.length_squared() < 1e-12 {
            let centroid = (pa + pb + pc) / 3.0;
            reference = DVec3::new(centroid.x, 0.0, centroid.z);
        }
        if face_normal.dot(reference) < 0.0 {
            Some([a, c, b])
        } else {
            Some([a, b, c])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::RowBinning;
    use crate::reconstruction::point_cloud::{CloudConfig, PointCloudAssembler};
    use turnscan_data::{ColoredPoint, DataPoint, LaserSide, PixelLocation};

    const STEPS: u32 = 8;

    /// A cylinder of radius 50 sampled on `rows` rows at every step.
    fn cylinder(side: LaserSide, rows: u32, first_index: u32) -> Vec<DataPoint> {
        let step_angle = std::f64::consts::TAU / STEPS as f64;
        let mut samples = Vec::new();
        for step in 0..STEPS {
            for row in 0..rows {
                let index = first_index + step * rows + row;
                let angle = step as f64 * step_angle;
                let position = DVec3::new(-50.0 * angle.sin(), -(row as f64), 50.0 * angle.cos());
                let mut sample = DataPoint::detection(
                    PixelLocation::new(0.0, row as f32),
                    [255, 255, 255],
                    angle,
                    step as u16,
                    side,
                    index,
                );
                sample.point = Some(ColoredPoint::new(position, sample.color));
                samples.push(sample);
            }
        }
        samples
    }

    fn cloud(samples: &[DataPoint]) -> PointCloud {
        PointCloudAssembler::new(CloudConfig::default(), RowBinning::new(10, 10), STEPS)
            .assemble(samples)
    }

    fn builder(max_edge_length: f64) -> MeshBuilder {
        MeshBuilder::new(
            MeshConfig {
                enabled: true,
                max_edge_length,
            },
            STEPS,
        )
    }

    #[test]
    fn test_closed_band_triangle_count() {
        let cloud = cloud(&cylinder(LaserSide::Left, 3, 0));
        let faces = builder(100.0).build(&cloud);
        // 8 steps around, 2 row gaps, 2 triangles per quad.
        assert_eq!(faces.len(), 8 * 2 * 2);
        assert!(faces.is_valid_for(cloud.len()));
    }

    #[test]
    fn test_faces_point_outward() {
        let cloud = cloud(&cylinder(LaserSide::Left, 2, 0));
        let faces = builder(100.0).build(&cloud);
        for [a, b, c] in faces.iter() {
            let p = |k: u32| cloud.points[k as usize].position();
            let normal = (p(b) - p(a)).cross(p(c) - p(a));
            let centroid = (p(a) + p(b) + p(c)) / 3.0;
            assert!(normal.dot(DVec3::new(centroid.x, 0.0, centroid.z)) > 0.0);
        }
    }

    #[test]
    fn test_long_edges_are_dropped() {
        let cloud = cloud(&cylinder(LaserSide::Left, 3, 0));
        // Adjacent steps are ~38mm apart.
        assert!(builder(10.0).build(&cloud).is_empty());
    }

    #[test]
    fn test_missing_corner_skips_quad() {
        let mut samples = cylinder(LaserSide::Left, 2, 0);
        samples.remove(0);
        let cloud = cloud(&samples);
        // Step 0 row 0 is gone, so quads (7,0) and (0,1) are incomplete.
        assert_eq!(builder(100.0).build(&cloud).len(), 6 * 2);
    }

    #[test]
    fn test_sides_are_not_bridged() {
        let mut samples = cylinder(LaserSide::Left, 2, 0);
        samples.extend(cylinder(LaserSide::Right, 2, 1000));
        let cloud = cloud(&samples);
        let faces = builder(100.0).build(&cloud);
        assert_eq!(faces.len(), 2 * 8 * 2);
        for triangle in faces.iter() {
            let sides: Vec<LaserSide> = triangle
                .iter()
                .map(|&k| cloud.coords[k as usize].side)
                .collect();
            assert!(sides.iter().all(|&s| s == sides[0]));
        }
    }
}
