//! PLY export of reconstructed point clouds and meshes.

use super::PlyDataFormat;
use crate::types::{ColoredPoint, FaceMap};
use crate::units::{UnitOfLength, convert_unit_of_length};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur while exporting.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Face index {index} out of range for {vertex_count} vertices")]
    InvalidFaceIndex { index: u32, vertex_count: usize },
}

/// Serializes a point cloud, and optionally its faces, as PLY.
///
/// Point positions are millimeters in memory and converted to `unit` on the
/// way out. Normals and colors are written unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlyExporter {
    pub format: PlyDataFormat,
    pub unit: UnitOfLength,
}

impl PlyExporter {
    pub fn new(format: PlyDataFormat, unit: UnitOfLength) -> Self {
        Self { format, unit }
    }

    /// Write the PLY file to `path`.
    #[tracing::instrument(skip_all, fields(path = %path.display()))]
    pub fn write_to_path(
        &self,
        path: &Path,
        points: &[ColoredPoint],
        faces: Option<&FaceMap>,
    ) -> Result<(), ExportError> {
        let file = File::create(path)?;
        self.write(file, points, faces)?;
        info!(
            "Exported {} vertices, {} faces as {:?} ({})",
            points.len(),
            faces.map_or(0, FaceMap::len),
            self.format,
            self.unit
        );
        Ok(())
    }

    /// Write the PLY file to an arbitrary writer.
    pub fn write<W: Write>(
        &self,
        writer: W,
        points: &[ColoredPoint],
        faces: Option<&FaceMap>,
    ) -> Result<(), ExportError> {
        if let Some(faces) = faces {
            if let Some(&index) = faces
                .triangles
                .iter()
                .find(|&&i| i as usize >= points.len())
            {
                return Err(ExportError::InvalidFaceIndex {
                    index,
                    vertex_count: points.len(),
                });
            }
        }

        let mut writer = BufWriter::new(writer);
        self.write_header(&mut writer, points.len(), faces.map(FaceMap::len))?;

        let scale = convert_unit_of_length(1.0, UnitOfLength::Millimeters, self.unit) as f32;

        match self.format {
            PlyDataFormat::Ascii => {
                for p in points {
                    writeln!(
                        writer,
                        "{} {} {} {} {} {} {} {} {}",
                        p.x * scale,
                        p.y * scale,
                        p.z * scale,
                        p.normal.x,
                        p.normal.y,
                        p.normal.z,
                        p.r,
                        p.g,
                        p.b
                    )?;
                }
                for [a, b, c] in faces.into_iter().flat_map(|f| f.iter()) {
                    writeln!(writer, "3 {} {} {}", a, b, c)?;
                }
            }
            PlyDataFormat::Binary => {
                for p in points {
                    for value in [
                        p.x * scale,
                        p.y * scale,
                        p.z * scale,
                        p.normal.x,
                        p.normal.y,
                        p.normal.z,
                    ] {
                        writer.write_all(&value.to_le_bytes())?;
                    }
                    writer.write_all(&[p.r, p.g, p.b])?;
                }
                for triangle in faces.into_iter().flat_map(|f| f.iter()) {
                    writer.write_all(&[3u8])?;
                    for index in triangle {
                        writer.write_all(&(index as i32).to_le_bytes())?;
                    }
                }
            }
        }

        writer.flush()?;
        debug!("Wrote {} vertices", points.len());
        Ok(())
    }

    fn write_header<W: Write>(
        &self,
        writer: &mut W,
        vertex_count: usize,
        face_count: Option<usize>,
    ) -> std::io::Result<()> {
        let format = match self.format {
            PlyDataFormat::Ascii => "ascii",
            PlyDataFormat::Binary => "binary_little_endian",
        };
        writeln!(writer, "ply")?;
        writeln!(writer, "format {} 1.0", format)?;
        writeln!(writer, "comment Generated by turnscan")?;
        writeln!(writer, "comment unit {}", self.unit)?;
        writeln!(writer, "element vertex {}", vertex_count)?;
        for axis in ["x", "y", "z", "nx", "ny", "nz"] {
            writeln!(writer, "property float {}", axis)?;
        }
        for channel in ["red", "green", "blue"] {
            writeln!(writer, "property uchar {}", channel)?;
        }
        if let Some(face_count) = face_count {
            writeln!(writer, "element face {}", face_count)?;
            writeln!(writer, "property list uchar int vertex_indices")?;
        }
        writeln!(writer, "end_header")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{DVec3, Vec3};

    fn sample_points() -> Vec<ColoredPoint> {
        (0..3)
            .map(|i| {
                let mut p = ColoredPoint::new(DVec3::new(i as f64 * 25.4, 1.0, -2.0), [i as u8, 10, 200]);
                p.normal = Vec3::Y;
                p
            })
            .collect()
    }

    #[test]
    fn test_ascii_header_and_rows() {
        let mut faces = FaceMap::new();
        faces.push_triangle(0, 1, 2);

        let mut out = Vec::new();
        PlyExporter::new(PlyDataFormat::Ascii, UnitOfLength::Inches)
            .write(&mut out, &sample_points(), Some(&faces))
            .unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("ply\nformat ascii 1.0\n"));
        assert!(text.contains("element vertex 3\n"));
        assert!(text.contains("element face 1\n"));
        assert!(text.contains("property list uchar int vertex_indices\n"));
        let body: Vec<&str> = text.split("end_header\n").nth(1).unwrap().lines().collect();
        assert_eq!(body.len(), 4);
        let x: f32 = body[1].split_whitespace().next().unwrap().parse().unwrap();
        assert!((x - 1.0).abs() < 1e-5);
        assert_eq!(body[3], "3 0 1 2");
    }

    #[test]
    fn test_point_cloud_only_has_no_face_element() {
        let mut out = Vec::new();
        PlyExporter::new(PlyDataFormat::Ascii, UnitOfLength::Millimeters)
            .write(&mut out, &sample_points(), None)
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(!text.contains("element face"));
    }

    #[test]
    fn test_binary_body_size() {
        let mut faces = FaceMap::new();
        faces.push_triangle(0, 1, 2);

        let mut out = Vec::new();
        PlyExporter::new(PlyDataFormat::Binary, UnitOfLength::Millimeters)
            .write(&mut out, &sample_points(), Some(&faces))
            .unwrap();

        let marker = b"end_header\n";
        let start = out
            .windows(marker.len())
            .position(|w| w == marker)
            .unwrap()
            + marker.len();
        // 6 floats + 3 bytes per vertex, 1 + 3 * 4 bytes per face.
        assert_eq!(out.len() - start, 3 * 27 + 13);
    }

    #[test]
    fn test_out_of_range_face_is_rejected() {
        let mut faces = FaceMap::new();
        faces.push_triangle(0, 1, 7);

        let mut out = Vec::new();
        let result = PlyExporter::new(PlyDataFormat::Ascii, UnitOfLength::Millimeters)
            .write(&mut out, &sample_points(), Some(&faces));
        assert!(matches!(result, Err(ExportError::InvalidFaceIndex { index: 7, .. })));
        assert!(out.is_empty());
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("disk full"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::Error::other("disk full"))
        }
    }

    #[test]
    fn test_write_failure_is_reported() {
        let points = sample_points();
        let result = PlyExporter::new(PlyDataFormat::Binary, UnitOfLength::Millimeters)
            .write(FailingWriter, &points, None);
        assert!(matches!(result, Err(ExportError::Io(_))));
        assert_eq!(points.len(), 3);
    }
}
