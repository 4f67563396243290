//! Point cloud assembly from triangulated samples.

use crate::ingest::RowBinning;
use glam::{DVec3, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::f64::consts::TAU;
use std::time::Instant;
use tracing::{debug, info};
use turnscan_data::{ColoredPoint, DataPoint, LaserSide};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    /// Drop samples of the second laser lying within this distance (mm) of
    /// a sample from the first laser. Disabled when `None`.
    pub overlap_distance: Option<f64>,
}

/// Position of a sample in the capture lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridCoord {
    pub side: LaserSide,
    pub step: u32,
    pub row_bin: u32,
}

/// Final colored cloud. `coords[i]` is the lattice position of `points[i]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    pub points: Vec<ColoredPoint>,
    pub coords: Vec<GridCoord>,
}

impl PointCloud {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Map from lattice position to point index.
    pub fn lattice(&self) -> HashMap<GridCoord, u32> {
        let mut lattice = HashMap::with_capacity(self.coords.len());
        for (i, &coord) in self.coords.iter().enumerate() {
            lattice.entry(coord).or_insert(i as u32);
        }
        lattice
    }
}

/// Merges triangulated samples into one cloud with per point normals.
pub struct PointCloudAssembler {
    config: CloudConfig,
    binning: RowBinning,
    num_steps: u32,
}

impl PointCloudAssembler {
    pub fn new(config: CloudConfig, binning: RowBinning, num_steps: u32) -> Self {
        Self {
            config,
            binning,
            num_steps: num_steps.max(1),
        }
    }

    /// Build the cloud from resolved samples. Unresolved samples are
    /// ignored; output order follows sample `index`.
    pub fn assemble(&self, samples: &[DataPoint]) -> PointCloud {
        let start = Instant::now();
        let mut entries: Vec<(u32, GridCoord, ColoredPoint)> = samples
            .iter()
            .filter_map(|s| Some((s.index, self.grid_coord(s)?, s.point?)))
            .collect();
        entries.sort_by_key(|&(index, _, _)| index);

        if let Some(distance) = self.config.overlap_distance.filter(|d| *d > 0.0) {
            let before = entries.len();
            entries = reduce_overlap(entries, distance);
            debug!("Overlap reduction dropped {} samples", before - entries.len());
        }

        let mut cloud = PointCloud {
            points: entries.iter().map(|&(_, _, p)| p).collect(),
            coords: entries.iter().map(|&(_, c, _)| c).collect(),
        };
        let lattice = cloud.lattice();
        let normals: Vec<Vec3> = (0..cloud.len())
            .map(|i| self.estimate_normal(&cloud, &lattice, i))
            .collect();
        for (point, normal) in cloud.points.iter_mut().zip(normals) {
            point.normal = normal;
        }

        info!(
            "Assembled {} points from {} samples in {:.2?}",
            cloud.len(),
            samples.len(),
            start.elapsed()
        );
        cloud
    }

    fn grid_coord(&self, sample: &DataPoint) -> Option<GridCoord> {
        let step_angle = TAU / self.num_steps as f64;
        let step = (sample.rotation / step_angle).round();
        if !step.is_finite() {
            return None;
        }
        Some(GridCoord {
            side: sample.laser_side,
            step: (step as i64).rem_euclid(self.num_steps as i64) as u32,
            row_bin: self.binning.bin_of(sample.pixel.y)?,
        })
    }

    /// Cross product of the row and turntable neighbor directions, facing
    /// away from the turntable axis. Falls back to the radial direction.
    fn estimate_normal(&self, cloud: &PointCloud, lattice: &HashMap<GridCoord, u32>, i: usize) -> Vec3 {
        let coord = cloud.coords[i];
        let position = cloud.points[i].position();
        let neighbor = |c: GridCoord| {
            lattice
                .get(&c)
                .filter(|&&j| j as usize != i)
                .map(|&j| cloud.points[j as usize].position() - position)
        };

        let along_row = neighbor(GridCoord { row_bin: coord.row_bin + 1, ..coord }).or_else(|| {
            coord
                .row_bin
                .checked_sub(1)
                .and_then(|row_bin| neighbor(GridCoord { row_bin, ..coord }))
        });
        let along_turn = neighbor(GridCoord {
            step: (coord.step + 1) % self.num_steps,
            ..coord
        })
        .or_else(|| {
            neighbor(GridCoord {
                step: (coord.step + self.num_steps - 1) % self.num_steps,
                ..coord
            })
        });

        let outward = match DVec3::new(position.x, 0.0, position.z) {
            radial if radial.length_squared() > 1e-12 => radial,
            _ => position,
        };
        let normal = match (along_row, along_turn) {
            (Some(r), Some(t)) => r.cross(t).try_normalize(),
            _ => None,
        }
        .or_else(|| outward.try_normalize())
        .unwrap_or(DVec3::ZERO);

        if normal.dot(outward) < 0.0 {
            (-normal).as_vec3()
        } else {
            normal.as_vec3()
        }
    }
}

type HashCell = (i64, i64, i64);

fn hash_cell(p: DVec3, size: f64) -> HashCell {
    let c = (p / size).floor();
    (c.x as i64, c.y as i64, c.z as i64)
}

/// Keep every sample of the first laser side present, and only those of
/// later sides that are not within `distance` of it.
fn reduce_overlap(
    entries: Vec<(u32, GridCoord, ColoredPoint)>,
    distance: f64,
) -> Vec<(u32, GridCoord, ColoredPoint)> {
    let Some(primary) = entries.iter().map(|(_, c, _)| c.side).min() else {
        return entries;
    };

    let mut grid: HashMap<HashCell, Vec<DVec3>> = HashMap::new();
    for (_, coord, point) in &entries {
        if coord.side == primary {
            let p = point.position();
            grid.entry(hash_cell(p, distance)).or_default().push(p);
        }
    }

    let mut dropped = HashSet::new();
    for (index, coord, point) in &entries {
        if coord.side == primary {
            continue;
        }
        let p = point.position();
        let (cx, cy, cz) = hash_cell(p, distance);
        let near = (-1..=1).any(|dx| {
            (-1..=1).any(|dy| {
                (-1..=1).any(|dz| {
                    grid.get(&(cx + dx, cy + dy, cz + dz))
                        .is_some_and(|cell| cell.iter().any(|q| q.distance(p) <= distance))
                })
            })
        });
        if near {
            dropped.insert(*index);
        }
    }

    entries
        .into_iter()
        .filter(|(index, _, _)| !dropped.contains(index))
        .collect()
}
