//! PLY import and export.
//!
//! Exported files carry vertex position, normal and color, plus a face list
//! when a mesh was built. Both the ASCII and the binary little endian
//! encodings are written and read back.

mod loader;
mod vertex;
mod writer;

pub use loader::{load_ply, load_ply_from_path};
pub use vertex::{PlyScan, PlyVertex};
pub use writer::{ExportError, PlyExporter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// PLY encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlyDataFormat {
    #[default]
    Ascii,
    Binary,
}

impl std::str::FromStr for PlyDataFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ascii" => Ok(PlyDataFormat::Ascii),
            "binary" => Ok(PlyDataFormat::Binary),
            other => Err(format!("Unknown PLY format: {}", other)),
        }
    }
}

/// Errors that can occur while reading a PLY file.
#[derive(Debug, Error)]
pub enum PlyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PLY parsing error: {0}")]
    Parse(String),

    #[error("Missing '{property}' at vertex {vertex}")]
    MissingProperty { property: &'static str, vertex: usize },

    #[error("Invalid face {face}: {reason}")]
    InvalidFace { face: usize, reason: String },
}
