//! Hardware capability traits, raw frames and capture errors.

use image::RgbImage;
use thiserror::Error;
use turnscan_data::LaserSide;

/// Errors that can occur while driving the scanner hardware.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open device: {0}")]
    OpenFailed(String),

    #[error("Failed to capture frame: {0}")]
    CaptureFailed(String),

    #[error("Turntable fault: {0}")]
    Motor(String),

    #[error("Laser fault: {0}")]
    Laser(String),

    #[error("Aborting scan after {consecutive} consecutive capture failures (frame {frame})")]
    TooManyFailures { consecutive: u32, frame: u16 },

    #[error("Frame index overflow after {0} exposures")]
    FrameIndexOverflow(u32),

    #[error("Capture thread panicked")]
    ThreadPanicked,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// What lit the scene during an exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExposureKind {
    /// All lasers off; used as the ambient reference for the step.
    Ambient,
    Laser(LaserSide),
}

/// Identifies one exposure within a scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTag {
    /// Turntable step index.
    pub step: u32,
    /// Turntable angle in radians, an exact multiple of the step angle.
    pub rotation: f64,
    /// Physical camera frame index, strictly increasing within a scan.
    pub frame: u16,
    pub kind: ExposureKind,
}

/// Raw image data read back from the camera.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub image: RgbImage,
    pub tag: FrameTag,
}

impl RawFrame {
    pub fn new(image: RgbImage, tag: FrameTag) -> Self {
        Self { image, tag }
    }

    /// Get image dimensions (width, height).
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// A camera that can be triggered for a single exposure.
pub trait Camera: Send {
    /// Get the resolution (width, height).
    fn resolution(&self) -> (u32, u32);

    /// Trigger one exposure and read back the image.
    fn acquire(&mut self) -> Result<RgbImage, CaptureError>;
}

/// The GPIO lines switching the line lasers.
pub trait LaserDriver: Send {
    fn set_laser(&mut self, side: LaserSide, on: bool) -> Result<(), CaptureError>;

    /// Force every laser off.
    fn all_off(&mut self) -> Result<(), CaptureError> {
        for side in LaserSide::ALL {
            self.set_laser(side, false)?;
        }
        Ok(())
    }
}

/// The stepper driven turntable.
pub trait Turntable: Send {
    /// Rotate by `radians` and block until the move is issued.
    fn rotate(&mut self, radians: f64) -> Result<(), CaptureError>;

    /// Stop the motor and release its coils.
    fn halt(&mut self) -> Result<(), CaptureError>;
}
