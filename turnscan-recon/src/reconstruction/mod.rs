//! Geometry reconstruction
//!
//! Resolves filtered stripe samples into a colored point cloud and, when
//! enabled, a triangle mesh over it.

pub mod mesh;
pub mod point_cloud;
pub mod triangulation;

pub use mesh::{MeshBuilder, MeshConfig};
pub use point_cloud::{CloudConfig, GridCoord, PointCloud, PointCloudAssembler};
pub use triangulation::{TriangulationEngine, TriangulationStats};
