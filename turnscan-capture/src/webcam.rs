//! Webcam camera backend using nokhwa.

use crate::source::{Camera, CaptureError};
use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use tracing::{debug, info};

/// A USB webcam used as the scanner camera.
pub struct WebcamCamera {
    camera: nokhwa::Camera,
    frame_count: u64,
    resolution: (u32, u32),
}

impl WebcamCamera {
    /// Open a webcam at its highest available resolution.
    pub fn new(index: u32) -> Result<Self, CaptureError> {
        info!("Opening webcam {}", index);

        let camera_index = CameraIndex::Index(index);
        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution);

        let mut camera = nokhwa::Camera::new(camera_index, requested)
            .map_err(|e| CaptureError::OpenFailed(e.to_string()))?;
        camera
            .open_stream()
            .map_err(|e| CaptureError::OpenFailed(e.to_string()))?;

        let resolution = camera.resolution();
        info!(
            "Webcam opened: {}x{} @ {:?} fps",
            resolution.width(),
            resolution.height(),
            camera.frame_rate()
        );

        Ok(Self {
            camera,
            frame_count: 0,
            resolution: (resolution.width(), resolution.height()),
        })
    }

    /// List available webcam devices.
    pub fn list_devices() -> Result<Vec<String>, CaptureError> {
        let devices = nokhwa::query(nokhwa::utils::ApiBackend::Auto)
            .map_err(|e| CaptureError::DeviceNotFound(e.to_string()))?;

        Ok(devices
            .into_iter()
            .map(|info| format!("{}: {}", info.index(), info.human_name()))
            .collect())
    }
}

impl Camera for WebcamCamera {
    fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    fn acquire(&mut self) -> Result<RgbImage, CaptureError> {
        let frame = self
            .camera
            .frame()
            .map_err(|e| CaptureError::CaptureFailed(e.to_string()))?;

        let decoded = frame
            .decode_image::<RgbFormat>()
            .map_err(|e| CaptureError::CaptureFailed(e.to_string()))?;

        self.frame_count += 1;
        debug!("Captured webcam frame {}", self.frame_count);

        let (width, height) = (decoded.width(), decoded.height());
        RgbImage::from_raw(width, height, decoded.into_raw())
            .ok_or_else(|| CaptureError::CaptureFailed("Failed to create RGB image".to_string()))
    }
}

impl Drop for WebcamCamera {
    fn drop(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            debug!("Failed to stop webcam stream: {}", e);
        }
        info!("Webcam released after {} frames", self.frame_count);
    }
}
