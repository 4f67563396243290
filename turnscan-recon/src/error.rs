//! Error types for scan sessions.

use thiserror::Error;
use turnscan_capture::CaptureError;
use turnscan_data::{ExportError, LaserSide};

/// Errors surfaced by a scan session.
///
/// Rays that miss a laser plane are not errors; they are counted as
/// rejected points in the step telemetry.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Hardware fault: {0}")]
    Hardware(#[from] CaptureError),

    #[error("Calibration missing for the {side} laser")]
    CalibrationMissing { side: LaserSide },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Export failed: {0}")]
    Export(#[from] ExportError),
}
