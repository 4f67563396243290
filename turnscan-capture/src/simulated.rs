//! A simulated scanner rig for tests and dry runs.
//!
//! The rig renders synthetic stripe images from a [`StripeScene`] and records
//! laser and motor state so callers can check what the hardware was left in.

use crate::source::{Camera, CaptureError, LaserDriver, Turntable};
use crate::synchronizer::{HardwareSynchronizer, SyncConfig};
use image::{Rgb, RgbImage};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use turnscan_data::LaserSide;

/// Where the laser stripe falls in the image.
pub trait StripeScene: Send + Sync {
    /// Sub-pixel stripe column for `row`, or `None` when the laser misses the
    /// object on that row.
    fn stripe_column(&self, side: LaserSide, rotation: f64, row: u32) -> Option<f32>;
}

impl<F> StripeScene for F
where
    F: Fn(LaserSide, f64, u32) -> Option<f32> + Send + Sync,
{
    fn stripe_column(&self, side: LaserSide, rotation: f64, row: u32) -> Option<f32> {
        self(side, rotation, row)
    }
}

/// The stripe sits at the same column on every row, for every laser.
#[derive(Debug, Clone, Copy)]
pub struct FixedColumnScene {
    pub column: f32,
    /// Restrict the stripe to these rows (inclusive), all rows when `None`.
    pub rows: Option<(u32, u32)>,
}

impl FixedColumnScene {
    pub fn new(column: f32) -> Self {
        Self { column, rows: None }
    }

    pub fn on_rows(column: f32, first: u32, last: u32) -> Self {
        Self {
            column,
            rows: Some((first, last)),
        }
    }
}

impl StripeScene for FixedColumnScene {
    fn stripe_column(&self, _side: LaserSide, _rotation: f64, row: u32) -> Option<f32> {
        match self.rows {
            Some((first, last)) if row < first || row > last => None,
            _ => Some(self.column),
        }
    }
}

/// Observable hardware state of the simulated rig.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RigState {
    /// Accumulated turntable angle in radians.
    pub angle: f64,
    pub lasers_on: [bool; 2],
    pub motor_halted: bool,
    /// Turntable moves issued.
    pub rotations: u32,
    /// Exposures attempted, failed ones included.
    pub exposures: u32,
}

fn lock(state: &Mutex<RigState>) -> Result<MutexGuard<'_, RigState>, CaptureError> {
    state
        .lock()
        .map_err(|_| CaptureError::CaptureFailed("simulated rig state poisoned".to_string()))
}

/// Builder for the simulated camera, laser driver and turntable.
pub struct SimulatedRig {
    state: Arc<Mutex<RigState>>,
    camera: SimulatedCamera,
}

impl SimulatedRig {
    pub fn new(width: u32, height: u32, scene: impl StripeScene + 'static) -> Self {
        let state = Arc::new(Mutex::new(RigState::default()));
        Self {
            camera: SimulatedCamera {
                state: Arc::clone(&state),
                scene: Arc::new(scene),
                width,
                height,
                ambient_level: 0,
                stripe_color: [255, 255, 255],
                stripe_half_width: 0,
                failing_exposures: HashSet::new(),
            },
            state,
        }
    }

    /// Uniform background brightness present in every exposure.
    pub fn with_ambient_level(mut self, level: u8) -> Self {
        self.camera.ambient_level = level;
        self
    }

    pub fn with_stripe_color(mut self, color: [u8; 3]) -> Self {
        self.camera.stripe_color = color;
        self
    }

    /// Spread the stripe over `2 * half_width + 1` columns with a linear falloff.
    pub fn with_stripe_half_width(mut self, half_width: u32) -> Self {
        self.camera.stripe_half_width = half_width;
        self
    }

    /// Make the camera fail on the given exposure indices.
    pub fn fail_exposures(mut self, exposures: impl IntoIterator<Item = u32>) -> Self {
        self.camera.failing_exposures.extend(exposures);
        self
    }

    /// Shared handle for inspecting hardware state.
    pub fn state(&self) -> Arc<Mutex<RigState>> {
        Arc::clone(&self.state)
    }

    pub fn into_parts(self) -> (SimulatedCamera, SimulatedLasers, SimulatedTurntable) {
        let lasers = SimulatedLasers {
            state: Arc::clone(&self.state),
        };
        let turntable = SimulatedTurntable { state: self.state };
        (self.camera, lasers, turntable)
    }

    pub fn synchronizer(
        self,
        config: SyncConfig,
    ) -> HardwareSynchronizer<SimulatedCamera, SimulatedLasers, SimulatedTurntable> {
        let (camera, lasers, turntable) = self.into_parts();
        HardwareSynchronizer::new(camera, lasers, turntable, config)
    }
}

pub struct SimulatedCamera {
    state: Arc<Mutex<RigState>>,
    scene: Arc<dyn StripeScene>,
    width: u32,
    height: u32,
    ambient_level: u8,
    stripe_color: [u8; 3],
    stripe_half_width: u32,
    failing_exposures: HashSet<u32>,
}

impl SimulatedCamera {
    fn render(&self, angle: f64, lasers_on: [bool; 2]) -> RgbImage {
        let ambient = self.ambient_level;
        let mut image = RgbImage::from_pixel(self.width, self.height, Rgb([ambient; 3]));
        let half = self.stripe_half_width as f32;

        for side in LaserSide::ALL.into_iter().filter(|s| lasers_on[s.index()]) {
            for row in 0..self.height {
                let Some(column) = self.scene.stripe_column(side, angle, row) else {
                    continue;
                };
                let center = column.round() as i64;
                let reach = self.stripe_half_width as i64;
                for x in (center - reach)..=(center + reach) {
                    if x < 0 || x >= self.width as i64 {
                        continue;
                    }
                    let weight = if half == 0.0 {
                        1.0
                    } else {
                        (1.0 - (x as f32 - column).abs() / (half + 1.0)).max(0.0)
                    };
                    let pixel = image.get_pixel_mut(x as u32, row);
                    for (channel, stripe) in pixel.0.iter_mut().zip(self.stripe_color) {
                        let add = (stripe as f32 * weight).round() as u8;
                        *channel = channel.saturating_add(add);
                    }
                }
            }
        }
        image
    }
}

impl Camera for SimulatedCamera {
    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn acquire(&mut self) -> Result<RgbImage, CaptureError> {
        let (exposure, angle, lasers_on) = {
            let mut state = lock(&self.state)?;
            let exposure = state.exposures;
            state.exposures += 1;
            (exposure, state.angle, state.lasers_on)
        };

        if self.failing_exposures.contains(&exposure) {
            return Err(CaptureError::CaptureFailed(format!(
                "simulated read failure on exposure {}",
                exposure
            )));
        }

        debug!("Simulated exposure {} at {:.4} rad", exposure, angle);
        Ok(self.render(angle, lasers_on))
    }
}

pub struct SimulatedLasers {
    state: Arc<Mutex<RigState>>,
}

impl LaserDriver for SimulatedLasers {
    fn set_laser(&mut self, side: LaserSide, on: bool) -> Result<(), CaptureError> {
        lock(&self.state)?.lasers_on[side.index()] = on;
        Ok(())
    }
}

pub struct SimulatedTurntable {
    state: Arc<Mutex<RigState>>,
}

impl Turntable for SimulatedTurntable {
    fn rotate(&mut self, radians: f64) -> Result<(), CaptureError> {
        let mut state = lock(&self.state)?;
        state.angle += radians;
        state.rotations += 1;
        state.motor_halted = false;
        Ok(())
    }

    fn halt(&mut self) -> Result<(), CaptureError> {
        lock(&self.state)?.motor_halted = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_single_pixel_stripe() {
        let rig = SimulatedRig::new(100, 100, FixedColumnScene::on_rows(50.0, 50, 50));
        let (mut camera, mut lasers, _) = rig.into_parts();

        lasers.set_laser(LaserSide::Left, true).unwrap();
        let image = camera.acquire().unwrap();
        assert_eq!(image.get_pixel(50, 50).0, [255, 255, 255]);
        assert_eq!(image.get_pixel(49, 50).0, [0, 0, 0]);
        assert_eq!(image.get_pixel(50, 49).0, [0, 0, 0]);
    }

    #[test]
    fn test_laser_off_renders_ambient_only() {
        let rig = SimulatedRig::new(10, 10, FixedColumnScene::new(5.0)).with_ambient_level(30);
        let (mut camera, _, _) = rig.into_parts();
        let image = camera.acquire().unwrap();
        assert!(image.pixels().all(|p| p.0 == [30, 30, 30]));
    }

    #[test]
    fn test_wide_stripe_is_symmetric() {
        let rig = SimulatedRig::new(20, 4, FixedColumnScene::new(10.0))
            .with_stripe_half_width(2)
            .with_stripe_color([200, 0, 0]);
        let (mut camera, mut lasers, _) = rig.into_parts();
        lasers.set_laser(LaserSide::Right, true).unwrap();
        let image = camera.acquire().unwrap();
        assert_eq!(image.get_pixel(9, 1).0, image.get_pixel(11, 1).0);
        assert!(image.get_pixel(10, 1).0[0] > image.get_pixel(9, 1).0[0]);
        assert_eq!(image.get_pixel(13, 1).0, [0, 0, 0]);
    }

    #[test]
    fn test_failing_exposure() {
        let rig = SimulatedRig::new(4, 4, FixedColumnScene::new(1.0)).fail_exposures([0]);
        let state = rig.state();
        let (mut camera, _, _) = rig.into_parts();
        assert!(camera.acquire().is_err());
        assert!(camera.acquire().is_ok());
        assert_eq!(state.lock().unwrap().exposures, 2);
    }
}
