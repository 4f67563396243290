//! Turnscan Capture - scanner hardware synchronization
//!
//! This crate drives the physical capture loop of a turntable laser scanner:
//! it steps the turntable, strobes the line lasers and triggers the camera,
//! emitting a deterministic sequence of tagged raw frames.
//!
//! - [`HardwareSynchronizer`]: the blocking, pull based capture loop
//! - [`CaptureThread`]: runs a [`FrameSource`] on its own thread behind a
//!   bounded queue
//! - [`SimulatedRig`]: simulated camera, lasers and turntable
//! - Webcams (via nokhwa, requires `webcam` feature)
//!
//! ## Example
//!
//! ```ignore
//! use turnscan_capture::{Capture, FixedColumnScene, FrameSource, SimulatedRig, SyncConfig};
//!
//! let mut sync = SimulatedRig::new(640, 480, FixedColumnScene::new(320.0))
//!     .synchronizer(SyncConfig::default());
//! loop {
//!     match sync.capture_next_frame()? {
//!         Capture::Frame(frame) => { /* Process frame... */ }
//!         Capture::EndOfScan => break,
//!         _ => {}
//!     }
//! }
//! ```

mod simulated;
mod source;
mod synchronizer;
mod worker;

#[cfg(feature = "webcam")]
mod webcam;

pub use simulated::{
    FixedColumnScene, RigState, SimulatedCamera, SimulatedLasers, SimulatedRig,
    SimulatedTurntable, StripeScene,
};
pub use source::{
    Camera, CaptureError, ExposureKind, FrameTag, LaserDriver, RawFrame, Turntable,
};
pub use synchronizer::{Capture, FrameSource, HardwareSynchronizer, SyncConfig};
pub use worker::{CancellationToken, CaptureItem, CaptureThread};

#[cfg(feature = "webcam")]
pub use webcam::WebcamCamera;
