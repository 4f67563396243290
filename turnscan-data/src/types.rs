//! Core data types for scan samples, reconstructed points and mesh topology.
//!
//! The 3D coordinate system is right handed with positive X to the right,
//! positive Y up and negative Z pointing into the scene (the camera look
//! direction), the same convention as OpenGL. The origin is the center of the
//! turntable.
//!
//! Geometry is computed in double precision ([`Vector3`]); reconstructed
//! samples are stored in single precision, matching the exported PLY layout.

use glam::{DVec3, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Real valued 3D vector used for points, directions and normals.
///
/// `normalize`, `dot` and `cross` come from glam.
pub type Vector3 = DVec3;

/// Sub-pixel image location.
///
/// Image coordinates run from 0 to (MAX - 1), top to bottom and left to right.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PixelLocation {
    pub x: f32,
    pub y: f32,
}

impl PixelLocation {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// One of the two line lasers mounted beside the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaserSide {
    Left,
    Right,
}

impl LaserSide {
    pub const ALL: [LaserSide; 2] = [LaserSide::Left, LaserSide::Right];

    /// Zero based index of the laser (0 = left, 1 = right).
    pub fn index(self) -> usize {
        match self {
            LaserSide::Left => 0,
            LaserSide::Right => 1,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(LaserSide::Left),
            1 => Some(LaserSide::Right),
            _ => None,
        }
    }
}

impl fmt::Display for LaserSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaserSide::Left => write!(f, "left"),
            LaserSide::Right => write!(f, "right"),
        }
    }
}

/// A reconstructed surface sample in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ColoredPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Unit surface normal, zero until estimated by the point cloud assembler.
    pub normal: Vec3,
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl ColoredPoint {
    /// Create a point from a double precision position and an RGB color.
    pub fn new(position: DVec3, color: [u8; 3]) -> Self {
        Self {
            x: position.x as f32,
            y: position.y as f32,
            z: position.z as f32,
            normal: Vec3::ZERO,
            r: color[0],
            g: color[1],
            b: color[2],
        }
    }

    /// Position widened back to double precision.
    pub fn position(&self) -> DVec3 {
        DVec3::new(self.x as f64, self.y as f64, self.z as f64)
    }

    pub fn color(&self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// The unit flowing through the reconstruction pipeline.
///
/// Created by the stripe detector with `pixel` and `color` set, tagged by the
/// frame assembler with a `pseudo_frame`, and resolved by the triangulation
/// engine, which fills `point`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataPoint {
    pub pixel: PixelLocation,
    /// Color sampled from the unprocessed image at the detected column.
    pub color: [u8; 3],
    /// Resolved world space sample, `None` until triangulated.
    pub point: Option<ColoredPoint>,
    /// Turntable angle in radians at capture time.
    pub rotation: f64,
    /// Physical camera frame index.
    pub frame: u16,
    pub laser_side: LaserSide,
    /// Logical frame assigned during assembly, `None` until assembled.
    pub pseudo_frame: Option<u16>,
    /// Global sequence id within one scan.
    pub index: u32,
}

impl DataPoint {
    /// Create an unassembled, untriangulated detection.
    pub fn detection(
        pixel: PixelLocation,
        color: [u8; 3],
        rotation: f64,
        frame: u16,
        laser_side: LaserSide,
        index: u32,
    ) -> Self {
        Self {
            pixel,
            color,
            point: None,
            rotation,
            frame,
            laser_side,
            pseudo_frame: None,
            index,
        }
    }

    pub fn is_triangulated(&self) -> bool {
        self.point.is_some()
    }
}

/// Triangle topology over a point cloud's index space.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaceMap {
    /// Vertex indices, three per triangle.
    pub triangles: Vec<u32>,
}

impl FaceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_triangle(&mut self, a: u32, b: u32, c: u32) {
        self.triangles.extend_from_slice(&[a, b, c]);
    }

    /// Number of triangles (not indices).
    pub fn len(&self) -> usize {
        self.triangles.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = [u32; 3]> + '_ {
        self.triangles
            .chunks_exact(3)
            .map(|t| [t[0], t[1], t[2]])
    }

    /// True when every index references a vertex of a cloud with `vertex_count` points.
    pub fn is_valid_for(&self, vertex_count: usize) -> bool {
        self.triangles.len() % 3 == 0
            && self.triangles.iter().all(|&i| (i as usize) < vertex_count)
    }
}
