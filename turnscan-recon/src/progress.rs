//! Per step scan telemetry.

use std::time::Duration;

/// Summary of one committed turntable step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepProgress {
    pub step: u32,
    pub num_steps: u32,
    /// Turntable angle of the step in radians.
    pub rotation: f64,
    /// Samples triangulated and kept.
    pub accepted: usize,
    /// Samples whose ray missed the laser plane.
    pub rejected: usize,
    /// Exposures lost to camera read failures.
    pub skipped_frames: u32,
    /// Time spent detecting, filtering and triangulating the step.
    pub elapsed: Duration,
}

impl StepProgress {
    /// Fraction of the scan completed, in `(0, 1]`.
    pub fn fraction(&self) -> f64 {
        (self.step + 1) as f64 / self.num_steps.max(1) as f64
    }
}

/// Receives a [`StepProgress`] after every committed step.
///
/// Called on the processing thread; slow observers stall the pipeline.
pub trait ProgressObserver {
    fn on_step(&mut self, progress: &StepProgress);
}

impl<F> ProgressObserver for F
where
    F: FnMut(&StepProgress),
{
    fn on_step(&mut self, progress: &StepProgress) {
        self(progress)
    }
}
