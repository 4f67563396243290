//! Turnscan Data Crate
//!
//! Core value types shared by every stage of the turntable scanner: image
//! detections, reconstructed points, mesh topology, laser planes and rays.
//! Also owns unit conversion and PLY import/export. This crate knows nothing
//! about hardware.

pub mod color;
pub mod geometry;
pub mod ply;
pub mod types;
pub mod units;

pub use color::{Hsv, hue_distance, rgb_to_hsv};
pub use geometry::{Plane, Ray, rotate_about_y};
pub use ply::{
    ExportError, PlyDataFormat, PlyError, PlyExporter, PlyScan, PlyVertex, load_ply,
    load_ply_from_path,
};
pub use types::{ColoredPoint, DataPoint, FaceMap, LaserSide, PixelLocation, Vector3};
pub use units::{UnitOfLength, convert_unit_of_length};
