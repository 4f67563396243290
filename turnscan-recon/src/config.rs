//! Scan configuration loaded from JSON.

use crate::error::ScanError;
use crate::ingest::{DetectorConfig, FilterConfig};
use crate::reconstruction::{CloudConfig, MeshConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;
use turnscan_capture::SyncConfig;
use turnscan_data::{PlyDataFormat, PlyExporter, UnitOfLength};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub unit: UnitOfLength,
    pub format: PlyDataFormat,
}

impl ExportConfig {
    pub fn exporter(&self) -> PlyExporter {
        PlyExporter::new(self.format, self.unit)
    }
}

/// Everything a scan needs apart from calibration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub capture: SyncConfig,
    pub detector: DetectorConfig,
    pub filter: FilterConfig,
    pub cloud: CloudConfig,
    pub mesh: MeshConfig,
    pub export: ExportConfig,
}

impl ScanConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ScanError> {
        let config: ScanConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    #[tracing::instrument(skip_all, fields(path = %path.display()))]
    pub fn from_json_file(path: &Path) -> Result<Self, ScanError> {
        let config = Self::from_json_str(&std::fs::read_to_string(path)?)?;
        info!(
            "Loaded scan config: {} steps, lasers {:?}",
            config.capture.num_steps, config.capture.laser_sides
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ScanError> {
        let invalid = |message: &str| Err(ScanError::Config(message.to_string()));
        let capture = &self.capture;
        if capture.num_steps == 0 {
            return invalid("capture.num_steps must be at least 1");
        }
        if capture.laser_sides.is_empty() {
            return invalid("capture.laser_sides must name at least one laser");
        }
        let mut sides = capture.laser_sides.clone();
        sides.sort();
        sides.dedup();
        if sides.len() != capture.laser_sides.len() {
            return invalid("capture.laser_sides lists a laser twice");
        }
        if capture.queue_capacity == 0 {
            return invalid("capture.queue_capacity must be at least 1");
        }
        if self.filter.num_row_bins == 0 {
            return invalid("filter.num_row_bins must be at least 1");
        }
        if !(self.mesh.max_edge_length > 0.0) {
            return invalid("mesh.max_edge_length must be positive");
        }
        if !(self.detector.threshold > 0.0) {
            return invalid("detector.threshold must be positive");
        }
        if matches!(self.detector.row_range, Some((first, end)) if first >= end) {
            return invalid("detector.row_range is empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::StripeScoring;
    use turnscan_data::LaserSide;

    #[test]
    fn test_defaults_are_valid() {
        assert!(ScanConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = ScanConfig::from_json_str(
            r#"{
                "capture": { "num_steps": 90, "laser_sides": ["left", "right"] },
                "detector": { "scoring": { "kind": "laser_hue", "hue": 0.0, "hue_tolerance": 25.0 } },
                "export": { "unit": "in", "format": "binary" }
            }"#,
        )
        .unwrap();
        assert_eq!(config.capture.num_steps, 90);
        assert_eq!(config.capture.laser_sides, vec![LaserSide::Left, LaserSide::Right]);
        assert_eq!(config.capture.queue_capacity, SyncConfig::default().queue_capacity);
        assert_eq!(
            config.detector.scoring,
            StripeScoring::LaserHue {
                hue: 0.0,
                hue_tolerance: 25.0
            }
        );
        assert_eq!(config.export.unit, UnitOfLength::Inches);
        assert_eq!(config.export.format, PlyDataFormat::Binary);
        assert_eq!(config.mesh, MeshConfig::default());
    }

    #[test]
    fn test_rejects_zero_steps() {
        let result = ScanConfig::from_json_str(r#"{ "capture": { "num_steps": 0 } }"#);
        assert!(matches!(result, Err(ScanError::Config(_))));
    }

    #[test]
    fn test_rejects_duplicate_lasers() {
        let mut config = ScanConfig::default();
        config.capture.laser_sides = vec![LaserSide::Right, LaserSide::Right];
        assert!(matches!(config.validate(), Err(ScanError::Config(_))));
    }

    #[test]
    fn test_rejects_bad_mesh_and_filter() {
        let mut config = ScanConfig::default();
        config.filter.num_row_bins = 0;
        assert!(config.validate().is_err());

        let mut config = ScanConfig::default();
        config.mesh.max_edge_length = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_json_is_json_error() {
        assert!(matches!(
            ScanConfig::from_json_str("{ not json"),
            Err(ScanError::Json(_))
        ));
    }
}
