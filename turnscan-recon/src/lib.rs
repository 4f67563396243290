//! Turnscan Reconstruction Crate
//!
//! Turns tagged camera frames from a turntable laser scanner into a colored
//! point cloud and an optional triangle mesh.
//!
//! ## Modules
//!
//! - [`ingest`]: stripe detection, logical frame assembly and row bin filtering
//! - [`reconstruction`]: triangulation, point cloud assembly and meshing
//! - [`session`]: runs a scan end to end on top of a capture thread
//!
//! ## Example
//!
//! ```ignore
//! use turnscan_capture::{FixedColumnScene, SimulatedRig};
//! use turnscan_recon::{Calibration, ScanConfig, ScanSession, StepProgress};
//!
//! let config = ScanConfig::default();
//! let rig = SimulatedRig::new(640, 480, FixedColumnScene::new(320.0));
//! let mut session = ScanSession::new(config.clone(), Calibration::default())?;
//! let output = session.run(rig.synchronizer(config.capture), &mut |p: &StepProgress| {
//!     println!("{:.0}%", p.fraction() * 100.0);
//! })?;
//! output.export(&config.export, "scan.ply".as_ref())?;
//! ```

pub mod calibration;
pub mod config;
pub mod error;
pub mod ingest;
pub mod progress;
pub mod reconstruction;
pub mod session;

pub use calibration::{Calibration, CameraIntrinsics, CameraModel, CameraPose, LaserPlanes};
pub use config::{ExportConfig, ScanConfig};
pub use error::ScanError;
pub use progress::{ProgressObserver, StepProgress};
pub use session::{ScanOutput, ScanSession};
