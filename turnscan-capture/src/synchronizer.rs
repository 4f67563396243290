//! Turntable stepping and laser strobing synchronized to camera exposures.

use crate::source::{
    Camera, CaptureError, ExposureKind, FrameTag, LaserDriver, RawFrame, Turntable,
};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use std::time::Duration;
use tracing::{debug, info, warn};
use turnscan_data::LaserSide;

/// Capture configuration for one scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Turntable steps per revolution.
    pub num_steps: u32,
    /// Lasers fired at every step, in firing order.
    pub laser_sides: Vec<LaserSide>,
    /// Capture a laser-off reference frame at every step.
    pub ambient_subtraction: bool,
    /// Wait after each turntable move before exposing.
    pub settle_ms: u64,
    /// Camera failures in a row tolerated before the scan aborts.
    pub max_consecutive_failures: u32,
    /// Raw frames buffered between capture and processing.
    pub queue_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            num_steps: 400,
            laser_sides: vec![LaserSide::Right],
            ambient_subtraction: false,
            settle_ms: 100,
            max_consecutive_failures: 3,
            queue_capacity: 8,
        }
    }
}

impl SyncConfig {
    pub fn step_angle(&self) -> f64 {
        TAU / self.num_steps.max(1) as f64
    }

    /// Exposures taken at every step, in order.
    pub fn exposure_plan(&self) -> Vec<ExposureKind> {
        let mut plan = Vec::with_capacity(self.laser_sides.len() + 1);
        if self.ambient_subtraction {
            plan.push(ExposureKind::Ambient);
        }
        plan.extend(self.laser_sides.iter().copied().map(ExposureKind::Laser));
        plan
    }
}

/// One result of [`FrameSource::capture_next_frame`].
#[derive(Debug)]
pub enum Capture {
    Frame(RawFrame),
    /// The camera read failed for this exposure; the scan continues.
    Skipped { tag: FrameTag, error: CaptureError },
    /// Every exposure of `step` has been attempted.
    StepComplete { step: u32 },
    EndOfScan,
}

/// A blocking, pull based source of tagged frames.
pub trait FrameSource: Send {
    fn capture_next_frame(&mut self) -> Result<Capture, CaptureError>;

    /// Force lasers off and stop the motor.
    fn release(&mut self) -> Result<(), CaptureError>;

    fn resolution(&self) -> (u32, u32);
}

/// Drives the physical capture loop for one scan.
///
/// Owns the camera, laser and turntable exclusively. Frames are emitted in
/// strictly increasing `frame` order; `rotation` is always `step * step_angle`
/// (accumulated stepper error is not corrected).
pub struct HardwareSynchronizer<C, L, T> {
    camera: C,
    laser: L,
    turntable: T,
    config: SyncConfig,
    plan: Vec<ExposureKind>,
    step: u32,
    slot: usize,
    exposures: u32,
    consecutive_failures: u32,
    finished: bool,
}

impl<C: Camera, L: LaserDriver, T: Turntable> HardwareSynchronizer<C, L, T> {
    pub fn new(camera: C, laser: L, turntable: T, config: SyncConfig) -> Self {
        let plan = config.exposure_plan();
        info!(
            "Synchronizer ready: {} steps, {} exposures per step",
            config.num_steps,
            plan.len()
        );
        Self {
            camera,
            laser,
            turntable,
            config,
            plan,
            step: 0,
            slot: 0,
            exposures: 0,
            consecutive_failures: 0,
            finished: false,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Position the turntable for the current step.
    fn begin_step(&mut self) -> Result<(), CaptureError> {
        if self.step > 0 {
            self.turntable.rotate(self.config.step_angle())?;
        }
        if self.config.settle_ms > 0 {
            std::thread::sleep(Duration::from_millis(self.config.settle_ms));
        }
        debug!("Step {} positioned", self.step);
        Ok(())
    }

    /// Take one exposure. The outer error is fatal, the inner one is a
    /// per-frame camera failure.
    fn expose(
        &mut self,
        kind: ExposureKind,
    ) -> Result<Result<RgbImage, CaptureError>, CaptureError> {
        match kind {
            ExposureKind::Ambient => Ok(self.camera.acquire()),
            ExposureKind::Laser(side) => {
                self.laser.set_laser(side, true)?;
                let image = self.camera.acquire();
                self.laser.set_laser(side, false)?;
                Ok(image)
            }
        }
    }

    fn fail(&mut self, error: CaptureError) -> Result<Capture, CaptureError> {
        self.finished = true;
        if let Err(release_error) = self.release() {
            warn!("Failed to release hardware: {}", release_error);
        }
        Err(error)
    }

    fn next(&mut self) -> Result<Capture, CaptureError> {
        if self.finished {
            return Ok(Capture::EndOfScan);
        }

        if self.step >= self.config.num_steps {
            self.finished = true;
            self.release()?;
            info!("Scan capture finished after {} exposures", self.exposures);
            return Ok(Capture::EndOfScan);
        }

        if self.slot == self.plan.len() {
            let step = self.step;
            self.step += 1;
            self.slot = 0;
            return Ok(Capture::StepComplete { step });
        }

        if self.slot == 0 {
            self.begin_step()?;
        }

        let kind = self.plan[self.slot];
        self.slot += 1;

        let frame = u16::try_from(self.exposures)
            .map_err(|_| CaptureError::FrameIndexOverflow(self.exposures))?;
        self.exposures += 1;

        let tag = FrameTag {
            step: self.step,
            rotation: self.step as f64 * self.config.step_angle(),
            frame,
            kind,
        };

        match self.expose(kind)? {
            Ok(image) => {
                self.consecutive_failures = 0;
                debug!("Captured frame {} ({:?})", frame, kind);
                Ok(Capture::Frame(RawFrame::new(image, tag)))
            }
            Err(error) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures > self.config.max_consecutive_failures {
                    return Err(CaptureError::TooManyFailures {
                        consecutive: self.consecutive_failures,
                        frame,
                    });
                }
                warn!("Skipping frame {}: {}", frame, error);
                Ok(Capture::Skipped { tag, error })
            }
        }
    }
}

impl<C: Camera, L: LaserDriver, T: Turntable> FrameSource for HardwareSynchronizer<C, L, T> {
    /// Returns the next tagged frame, or `EndOfScan`. Any error is fatal and
    /// leaves the lasers off and the motor stopped.
    fn capture_next_frame(&mut self) -> Result<Capture, CaptureError> {
        match self.next() {
            Ok(capture) => Ok(capture),
            Err(error) => self.fail(error),
        }
    }

    fn release(&mut self) -> Result<(), CaptureError> {
        let lasers = self.laser.all_off();
        let motor = self.turntable.halt();
        lasers.and(motor)
    }

    fn resolution(&self) -> (u32, u32) {
        self.camera.resolution()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::{FixedColumnScene, SimulatedRig};

    fn config(num_steps: u32, sides: Vec<LaserSide>, ambient: bool) -> SyncConfig {
        SyncConfig {
            num_steps,
            laser_sides: sides,
            ambient_subtraction: ambient,
            settle_ms: 0,
            ..SyncConfig::default()
        }
    }

    fn drain<S: FrameSource>(source: &mut S) -> Vec<Capture> {
        let mut out = Vec::new();
        loop {
            let capture = source.capture_next_frame().unwrap();
            let end = matches!(capture, Capture::EndOfScan);
            out.push(capture);
            if end {
                return out;
            }
        }
    }

    #[test]
    fn test_frames_are_ordered_and_rotations_exact() {
        let rig = SimulatedRig::new(20, 20, FixedColumnScene::new(10.0));
        let mut sync = rig.synchronizer(config(4, vec![LaserSide::Left, LaserSide::Right], false));

        let captures = drain(&mut sync);
        let frames: Vec<&RawFrame> = captures
            .iter()
            .filter_map(|c| match c {
                Capture::Frame(f) => Some(f),
                _ => None,
            })
            .collect();

        assert_eq!(frames.len(), 8);
        for pair in frames.windows(2) {
            assert!(pair[1].tag.frame > pair[0].tag.frame);
        }
        for f in &frames {
            let expected = f.tag.step as f64 * TAU / 4.0;
            assert_eq!(f.tag.rotation, expected);
        }
        assert_eq!(frames[0].tag.kind, ExposureKind::Laser(LaserSide::Left));
        assert_eq!(frames[1].tag.kind, ExposureKind::Laser(LaserSide::Right));

        let completed: Vec<u32> = captures
            .iter()
            .filter_map(|c| match c {
                Capture::StepComplete { step } => Some(*step),
                _ => None,
            })
            .collect();
        assert_eq!(completed, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_ambient_frame_precedes_laser_frames() {
        let rig = SimulatedRig::new(20, 20, FixedColumnScene::new(10.0));
        let state = rig.state();
        let mut sync = rig.synchronizer(config(2, vec![LaserSide::Right], true));

        let captures = drain(&mut sync);
        let kinds: Vec<ExposureKind> = captures
            .iter()
            .filter_map(|c| match c {
                Capture::Frame(f) => Some(f.tag.kind),
                _ => None,
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                ExposureKind::Ambient,
                ExposureKind::Laser(LaserSide::Right),
                ExposureKind::Ambient,
                ExposureKind::Laser(LaserSide::Right),
            ]
        );

        let state = state.lock().unwrap();
        assert_eq!(state.rotations, 1);
        assert_eq!(state.lasers_on, [false, false]);
        assert!(state.motor_halted);
    }

    #[test]
    fn test_camera_failure_skips_frame() {
        let rig = SimulatedRig::new(20, 20, FixedColumnScene::new(10.0)).fail_exposures([1]);
        let mut sync = rig.synchronizer(config(3, vec![LaserSide::Right], false));

        let captures = drain(&mut sync);
        let skipped: Vec<u16> = captures
            .iter()
            .filter_map(|c| match c {
                Capture::Skipped { tag, .. } => Some(tag.frame),
                _ => None,
            })
            .collect();
        assert_eq!(skipped, vec![1]);
        let frames = captures
            .iter()
            .filter(|c| matches!(c, Capture::Frame(_)))
            .count();
        assert_eq!(frames, 2);
    }

    #[test]
    fn test_too_many_failures_is_fatal_and_releases_hardware() {
        let rig = SimulatedRig::new(20, 20, FixedColumnScene::new(10.0)).fail_exposures(2..10);
        let state = rig.state();
        let mut sync = rig.synchronizer(SyncConfig {
            max_consecutive_failures: 2,
            ..config(10, vec![LaserSide::Left], false)
        });

        let mut result = Ok(Capture::EndOfScan);
        for _ in 0..20 {
            result = sync.capture_next_frame();
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(
            result,
            Err(CaptureError::TooManyFailures { consecutive: 3, frame: 4 })
        ));

        let state = state.lock().unwrap();
        assert_eq!(state.lasers_on, [false, false]);
        assert!(state.motor_halted);

        drop(state);
        assert!(matches!(sync.capture_next_frame(), Ok(Capture::EndOfScan)));
    }
}
