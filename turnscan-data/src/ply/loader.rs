//! PLY file loading functions

use super::{PlyError, PlyScan, PlyVertex};
use crate::types::FaceMap;
use glam::Vec3;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info, warn};

// Face structure for PLY files
#[derive(Deserialize, Debug)]
struct PlyFace {
    vertex_indices: Vec<i32>,
}

// PLY file structure
#[derive(Deserialize, Debug)]
struct PlyFile {
    #[serde(rename = "vertex")]
    vertex: Vec<HashMap<String, JsonValue>>,
    #[serde(default, rename = "face")]
    face: Vec<PlyFace>,
}

fn get_f32(prop: Option<&JsonValue>) -> Option<f32> {
    prop.and_then(|v| match v {
        JsonValue::Number(n) => n.as_f64().map(|f| f as f32),
        _ => None,
    })
}

fn get_u8(prop: Option<&JsonValue>) -> Option<u8> {
    prop.and_then(|v| match v {
        JsonValue::Number(n) => n
            .as_u64()
            .map(|u| u as u8)
            .or_else(|| n.as_i64().map(|i| i as u8)),
        _ => None,
    })
}

/// Load a scan PLY file from disk.
#[tracing::instrument(skip_all, fields(path = %path.display()))]
pub fn load_ply_from_path(path: &Path) -> Result<PlyScan, PlyError> {
    debug!("Loading PLY scan from: {}", path.display());
    let file = File::open(path)?;
    load_ply(BufReader::new(file))
}

/// Load a scan from any PLY source, ASCII or binary.
///
/// Positions are returned in the units they were written in.
pub fn load_ply<R: BufRead>(reader: R) -> Result<PlyScan, PlyError> {
    let ply_data: PlyFile = serde_ply::from_reader(reader).map_err(|e| {
        warn!("Failed to parse PLY file: {}", e);
        PlyError::Parse(e.to_string())
    })?;

    info!(
        "PLY file parsed: {} vertices, {} faces",
        ply_data.vertex.len(),
        ply_data.face.len()
    );

    let mut vertices = Vec::with_capacity(ply_data.vertex.len());

    for (i, vertex) in ply_data.vertex.iter().enumerate() {
        let coord = |name: &'static str| {
            get_f32(vertex.get(name)).ok_or(PlyError::MissingProperty {
                property: name,
                vertex: i,
            })
        };
        let position = Vec3::new(coord("x")?, coord("y")?, coord("z")?);

        let normal = match (
            get_f32(vertex.get("nx")),
            get_f32(vertex.get("ny")),
            get_f32(vertex.get("nz")),
        ) {
            (Some(x), Some(y), Some(z)) => Some(Vec3::new(x, y, z)),
            _ => None,
        };

        let color = if let (Some(r), Some(g), Some(b)) = (
            get_u8(vertex.get("red")),
            get_u8(vertex.get("green")),
            get_u8(vertex.get("blue")),
        ) {
            [r, g, b]
        } else if let (Some(r), Some(g), Some(b)) = (
            get_u8(vertex.get("r")),
            get_u8(vertex.get("g")),
            get_u8(vertex.get("b")),
        ) {
            [r, g, b]
        } else {
            [204, 204, 204]
        };

        vertices.push(PlyVertex {
            position,
            normal,
            color,
        });
    }

    let mut faces = FaceMap::new();
    for (i, face) in ply_data.face.iter().enumerate() {
        let &[a, b, c] = face.vertex_indices.as_slice() else {
            return Err(PlyError::InvalidFace {
                face: i,
                reason: format!("expected 3 indices, found {}", face.vertex_indices.len()),
            });
        };
        let mut checked = [0u32; 3];
        for (slot, index) in checked.iter_mut().zip([a, b, c]) {
            *slot = u32::try_from(index)
                .ok()
                .filter(|&idx| (idx as usize) < vertices.len())
                .ok_or_else(|| PlyError::InvalidFace {
                    face: i,
                    reason: format!("index {} out of range", index),
                })?;
        }
        faces.push_triangle(checked[0], checked[1], checked[2]);
    }

    debug!("Loaded {} vertices from PLY file", vertices.len());
    Ok(PlyScan { vertices, faces })
}
