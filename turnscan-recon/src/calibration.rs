//! Camera and laser plane calibration supplied by the calibration component.

use crate::error::ScanError;
use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;
use turnscan_data::{LaserSide, PixelLocation, Plane, Ray};

/// Pinhole intrinsics in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub width: u32,
    pub height: u32,
}

/// Camera placement in the fixed scanner frame (turntable centered, Y up).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraPose {
    /// Optical center in millimeters.
    pub position: DVec3,
    /// Rotation from camera axes (x right, y up, looking down -z) to scanner axes.
    pub orientation: DQuat,
}

/// One calibrated plane per laser side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LaserPlanes {
    pub left: Option<Plane>,
    pub right: Option<Plane>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub intrinsics: CameraIntrinsics,
    pub pose: CameraPose,
    pub planes: LaserPlanes,
}

impl Calibration {
    pub fn from_json_str(json: &str) -> Result<Self, ScanError> {
        let mut calibration: Calibration = serde_json::from_str(json)?;
        calibration.planes.left = calibration.planes.left.map(|p| Plane::new(p.normal, p.point));
        calibration.planes.right = calibration.planes.right.map(|p| Plane::new(p.normal, p.point));
        Ok(calibration)
    }

    #[tracing::instrument(skip_all, fields(path = %path.display()))]
    pub fn from_json_file(path: &Path) -> Result<Self, ScanError> {
        let calibration = Self::from_json_str(&std::fs::read_to_string(path)?)?;
        info!(
            "Loaded calibration: {}x{} camera, left plane {}, right plane {}",
            calibration.intrinsics.width,
            calibration.intrinsics.height,
            calibration.planes.left.is_some(),
            calibration.planes.right.is_some()
        );
        Ok(calibration)
    }

    pub fn plane(&self, side: LaserSide) -> Option<Plane> {
        match side {
            LaserSide::Left => self.planes.left,
            LaserSide::Right => self.planes.right,
        }
    }

    /// Fail unless every enabled laser has a plane and the intrinsics are usable.
    pub fn require(&self, sides: &[LaserSide]) -> Result<(), ScanError> {
        let usable = |plane: Plane| {
            plane.normal.is_finite() && plane.normal.length_squared() > 0.0 && plane.point.is_finite()
        };
        if let Some(&side) = sides
            .iter()
            .find(|&&side| !self.plane(side).is_some_and(usable))
        {
            return Err(ScanError::CalibrationMissing { side });
        }
        let k = &self.intrinsics;
        if !(k.fx > 0.0 && k.fy > 0.0) || k.width == 0 || k.height == 0 {
            return Err(ScanError::Config(format!(
                "Camera intrinsics unusable: fx={} fy={} {}x{}",
                k.fx, k.fy, k.width, k.height
            )));
        }
        Ok(())
    }

    pub fn camera_model(&self) -> CameraModel {
        CameraModel {
            intrinsics: self.intrinsics,
            pose: self.pose,
        }
    }
}

impl Default for Calibration {
    /// A 640x480 camera 300mm in front of the turntable axis and 50mm above
    /// it, with lasers 100mm to either side aimed at the axis.
    fn default() -> Self {
        let camera = DVec3::new(0.0, 50.0, 300.0);
        let laser_plane = |x: f64| {
            let aim = DVec3::new(-x, 0.0, -camera.z);
            Plane::new(DVec3::Y.cross(aim), DVec3::ZERO)
        };
        Self {
            intrinsics: CameraIntrinsics {
                fx: 800.0,
                fy: 800.0,
                cx: 320.0,
                cy: 240.0,
                width: 640,
                height: 480,
            },
            pose: CameraPose {
                position: camera,
                orientation: DQuat::IDENTITY,
            },
            planes: LaserPlanes {
                left: Some(laser_plane(-100.0)),
                right: Some(laser_plane(100.0)),
            },
        }
    }
}

/// Unprojects pixels into rays in the scanner frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraModel {
    pub intrinsics: CameraIntrinsics,
    pub pose: CameraPose,
}

impl CameraModel {
    pub fn ray_for_pixel(&self, pixel: PixelLocation) -> Ray {
        let k = &self.intrinsics;
        let local = DVec3::new(
            (pixel.x as f64 - k.cx) / k.fx,
            -(pixel.y as f64 - k.cy) / k.fy,
            -1.0,
        );
        Ray::new(self.pose.position, self.pose.orientation * local)
    }
}
