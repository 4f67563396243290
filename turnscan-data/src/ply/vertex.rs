//! PLY vertex data structures

use crate::types::FaceMap;
use glam::Vec3;

/// Vertex data read back from a PLY file.
#[derive(Debug, Clone, PartialEq)]
pub struct PlyVertex {
    pub position: Vec3,
    pub normal: Option<Vec3>,
    pub color: [u8; 3],
}

/// The contents of a scan PLY file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlyScan {
    pub vertices: Vec<PlyVertex>,
    pub faces: FaceMap,
}
