//! One scan, from hardware to point cloud.

use crate::calibration::Calibration;
use crate::config::{ExportConfig, ScanConfig};
use crate::error::ScanError;
use crate::ingest::{FrameAssembler, FrameFilter, RowBinning, StripeDetector};
use crate::progress::{ProgressObserver, StepProgress};
use crate::reconstruction::{
    MeshBuilder, PointCloud, PointCloudAssembler, TriangulationEngine, TriangulationStats,
};
use image::RgbImage;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info};
use turnscan_capture::{
    CancellationToken, Capture, CaptureThread, ExposureKind, FrameSource, RawFrame,
};
use turnscan_data::{DataPoint, FaceMap};

/// Result of a scan, complete or not.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanOutput {
    pub cloud: PointCloud,
    /// `None` when meshing is disabled.
    pub faces: Option<FaceMap>,
    pub completed_steps: u32,
    /// Fewer steps were committed than configured.
    pub aborted: bool,
}

impl ScanOutput {
    pub fn export(&self, config: &ExportConfig, path: &Path) -> Result<(), ScanError> {
        config
            .exporter()
            .write_to_path(path, &self.cloud.points, self.faces.as_ref())?;
        Ok(())
    }
}

/// Detections and telemetry for the step being captured.
#[derive(Default)]
struct StepBuffer {
    ambient: Option<RgbImage>,
    detections: Vec<DataPoint>,
    skipped_frames: u32,
}

/// Drives a frame source through detection, filtering and triangulation.
///
/// Capture runs on its own thread; processing runs on the caller's thread.
/// A step's points are committed only once all of its exposures have been
/// processed, so a cancelled or failed scan keeps exactly the completed
/// steps, available from [`ScanSession::output`].
pub struct ScanSession {
    config: ScanConfig,
    calibration: Calibration,
    detector: StripeDetector,
    engine: TriangulationEngine,
    assembler: FrameAssembler,
    committed: Vec<DataPoint>,
    progress: Vec<StepProgress>,
    next_index: u32,
    cancel: CancellationToken,
}

impl ScanSession {
    /// Fails when the configuration is invalid or an enabled laser has no
    /// calibrated plane.
    pub fn new(config: ScanConfig, calibration: Calibration) -> Result<Self, ScanError> {
        config.validate()?;
        let engine = TriangulationEngine::new(&calibration, &config.capture.laser_sides)?;
        Ok(Self {
            detector: StripeDetector::new(config.detector.clone()),
            config,
            calibration,
            engine,
            assembler: FrameAssembler::new(),
            committed: Vec::new(),
            progress: Vec::new(),
            next_index: 0,
            cancel: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Token that stops a running scan from any thread. It is cleared when
    /// the run it stopped returns, so the session can scan again.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Resolved samples of every committed step, in capture order.
    pub fn committed(&self) -> &[DataPoint] {
        &self.committed
    }

    pub fn progress(&self) -> &[StepProgress] {
        &self.progress
    }

    /// Run a full scan. Returns early with the committed steps when
    /// cancelled; hardware faults are returned as errors after the capture
    /// thread has switched the lasers off.
    #[tracing::instrument(skip_all, fields(steps = self.config.capture.num_steps))]
    pub fn run<S, O>(&mut self, source: S, observer: &mut O) -> Result<ScanOutput, ScanError>
    where
        S: FrameSource + 'static,
        O: ProgressObserver + ?Sized,
    {
        let (width, height) = source.resolution();
        let intrinsics = &self.calibration.intrinsics;
        if (width, height) != (intrinsics.width, intrinsics.height) {
            return Err(ScanError::Config(format!(
                "Camera delivers {}x{} but calibration is for {}x{}",
                width, height, intrinsics.width, intrinsics.height
            )));
        }

        self.committed.clear();
        self.progress.clear();
        self.next_index = 0;
        self.assembler = FrameAssembler::new();
        let filter = FrameFilter::new(&self.config.filter, height);

        let start = Instant::now();
        let capture = CaptureThread::spawn(
            source,
            self.config.capture.queue_capacity,
            self.cancel.clone(),
        )?;

        let mut buffer = StepBuffer::default();
        let mut failure = None;
        loop {
            if self.cancel.is_cancelled() {
                info!("Scan cancelled after {} steps", self.progress.len());
                break;
            }
            let Some(item) = capture.recv() else {
                break;
            };
            match item {
                Ok(Capture::Frame(frame)) => self.ingest(&mut buffer, frame),
                Ok(Capture::Skipped { tag, error }) => {
                    debug!("Frame {} skipped: {}", tag.frame, error);
                    buffer.skipped_frames += 1;
                }
                Ok(Capture::StepComplete { step }) => {
                    let progress = self.commit_step(step, std::mem::take(&mut buffer), &filter);
                    observer.on_step(&progress);
                }
                Ok(Capture::EndOfScan) => break,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        let joined = capture.finish();
        // A cancellation ends this run only.
        self.cancel.reset();
        if let Some(e) = failure {
            error!(
                "Scan aborted by hardware fault after {} steps: {}",
                self.progress.len(),
                e
            );
            return Err(e.into());
        }
        joined?;

        info!(
            "Captured {} steps, {} samples in {:.2?}",
            self.progress.len(),
            self.committed.len(),
            start.elapsed()
        );
        Ok(self.output())
    }

    fn ingest(&mut self, buffer: &mut StepBuffer, frame: RawFrame) {
        match frame.tag.kind {
            ExposureKind::Ambient => buffer.ambient = Some(frame.image),
            ExposureKind::Laser(_) => {
                let ambient = if self.config.capture.ambient_subtraction {
                    // Without the step's reference the background reads as stripe.
                    let Some(ambient) = buffer.ambient.as_ref() else {
                        debug!("Frame {} dropped, step has no ambient frame", frame.tag.frame);
                        buffer.skipped_frames += 1;
                        return;
                    };
                    Some(ambient)
                } else {
                    None
                };
                let detections = self.detector.detect(&frame, ambient, &mut self.next_index);
                buffer.detections.extend(detections);
            }
        }
    }

    fn commit_step(&mut self, step: u32, mut buffer: StepBuffer, filter: &FrameFilter) -> StepProgress {
        let start = Instant::now();
        let mut stats = TriangulationStats::default();
        let mut resolved = Vec::new();
        let mut cursor = 0;
        while let Some(range) = self.assembler.read_next_frame(&mut buffer.detections, &mut cursor) {
            let filtered = filter.filter(&mut buffer.detections[range]);
            let frame_stats = self.engine.resolve(&filtered, &mut resolved);
            stats.accepted += frame_stats.accepted;
            stats.rejected += frame_stats.rejected;
        }
        self.committed.append(&mut resolved);

        let progress = StepProgress {
            step,
            num_steps: self.config.capture.num_steps,
            rotation: step as f64 * self.config.capture.step_angle(),
            accepted: stats.accepted,
            rejected: stats.rejected,
            skipped_frames: buffer.skipped_frames,
            elapsed: start.elapsed(),
        };
        info!(
            "Step {}/{}: {} points, {} rejected, {} frames skipped ({:.2?})",
            step + 1,
            progress.num_steps,
            progress.accepted,
            progress.rejected,
            progress.skipped_frames,
            progress.elapsed
        );
        self.progress.push(progress);
        progress
    }

    /// Build the point cloud and mesh from the committed steps.
    pub fn output(&self) -> ScanOutput {
        let num_steps = self.config.capture.num_steps;
        let binning = RowBinning::new(self.calibration.intrinsics.height, self.config.filter.num_row_bins);
        let cloud = PointCloudAssembler::new(self.config.cloud.clone(), binning, num_steps)
            .assemble(&self.committed);
        let faces = self
            .config
            .mesh
            .enabled
            .then(|| MeshBuilder::new(self.config.mesh.clone(), num_steps).build(&cloud));
        let completed_steps = self.progress.len() as u32;
        ScanOutput {
            cloud,
            faces,
            completed_steps,
            aborted: completed_steps < num_steps,
        }
    }
}
