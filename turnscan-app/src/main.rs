//! Turnscan
//!
//! Command line driver for a turntable laser triangulation scanner.
//!
//! Features:
//! - Scan configuration and calibration from JSON files
//! - Dry runs against a simulated rig scanning a synthetic cylinder
//! - Webcam capture (requires `webcam` feature)
//! - PLY export in ASCII or binary, in mm, cm or inches

mod scene;

use clap::Parser;
use glam::DVec2;
use scene::CylinderScene;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};
use turnscan_capture::{FrameSource, SimulatedRig};
use turnscan_data::{PlyDataFormat, UnitOfLength};
use turnscan_recon::{Calibration, ScanConfig, ScanError, ScanSession, StepProgress};

/// Turnscan - Turntable Laser Scanner
#[derive(Parser, Debug)]
#[command(name = "turnscan")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Scan configuration JSON
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Camera and laser plane calibration JSON
    #[arg(long)]
    calibration: Option<PathBuf>,

    /// Output PLY file
    #[arg(short, long, default_value = "scan.ply")]
    output: PathBuf,

    /// PLY encoding (ascii, binary)
    #[arg(long)]
    format: Option<PlyDataFormat>,

    /// Output unit (mm, cm, in)
    #[arg(long)]
    unit: Option<UnitOfLength>,

    /// Turntable steps per revolution
    #[arg(long)]
    steps: Option<u32>,

    /// Export the point cloud without a mesh
    #[arg(long)]
    no_mesh: bool,

    /// Radius of the simulated cylinder in mm
    #[arg(long, default_value_t = 40.0)]
    radius: f64,

    /// Height of the simulated cylinder in mm
    #[arg(long, default_value_t = 100.0)]
    height: f64,

    /// Capture from this webcam instead of the simulated rig
    #[cfg(feature = "webcam")]
    #[arg(long)]
    webcam: Option<u32>,

    /// Log level used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[cfg(feature = "webcam")]
    #[error(transparent)]
    Capture(#[from] turnscan_capture::CaptureError),
}

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .with_target(false)
        .init();

    if let Err(e) = run(args) {
        eprintln!("Scan error: {}", e);
        std::process::exit(1);
    }
}

fn load_config(args: &Args) -> Result<ScanConfig, ScanError> {
    let mut config = match &args.config {
        Some(path) => ScanConfig::from_json_file(path)?,
        None => ScanConfig::default(),
    };
    if let Some(steps) = args.steps {
        config.capture.num_steps = steps;
    }
    if let Some(format) = args.format {
        config.export.format = format;
    }
    if let Some(unit) = args.unit {
        config.export.unit = unit;
    }
    if args.no_mesh {
        config.mesh.enabled = false;
    }
    config.validate()?;
    Ok(config)
}

fn run(args: Args) -> Result<(), AppError> {
    let mut config = load_config(&args)?;
    let calibration = match &args.calibration {
        Some(path) => Calibration::from_json_file(path)?,
        None => {
            warn!("No calibration given, using the built-in reference rig");
            Calibration::default()
        }
    };

    #[cfg(feature = "webcam")]
    if let Some(index) = args.webcam {
        let camera = turnscan_capture::WebcamCamera::new(index)?;
        warn!("Laser and turntable are simulated; only the camera is real");
        let (_, lasers, turntable) =
            SimulatedRig::new(1, 1, turnscan_capture::FixedColumnScene::new(0.0)).into_parts();
        let source = turnscan_capture::HardwareSynchronizer::new(
            camera,
            lasers,
            turntable,
            config.capture.clone(),
        );
        return scan(config, calibration, source, &args);
    }

    let scene = CylinderScene::new(&calibration, args.radius, args.height, DVec2::new(10.0, 0.0));
    let rig = SimulatedRig::new(
        calibration.intrinsics.width,
        calibration.intrinsics.height,
        scene,
    )
    .with_ambient_level(12)
    .with_stripe_color([255, 40, 30])
    .with_stripe_half_width(2);
    // Nothing physical needs to settle.
    config.capture.settle_ms = 0;
    let source = rig.synchronizer(config.capture.clone());
    scan(config, calibration, source, &args)
}

fn scan<S: FrameSource + 'static>(
    config: ScanConfig,
    calibration: Calibration,
    source: S,
    args: &Args,
) -> Result<(), AppError> {
    let mut session = ScanSession::new(config, calibration)?;
    let mut last_reported = 0;
    let output = session.run(source, &mut |p: &StepProgress| {
        let percent = (p.fraction() * 100.0) as u32;
        if percent >= last_reported + 10 {
            last_reported = percent - percent % 10;
            info!("{}% scanned", last_reported);
        }
    })?;

    if output.aborted {
        warn!(
            "Scan incomplete: {} of {} steps",
            output.completed_steps,
            session.config().capture.num_steps
        );
    }
    output.export(&session.config().export, &args.output)?;
    info!(
        "Wrote {} points and {} faces to {}",
        output.cloud.len(),
        output.faces.as_ref().map_or(0, |f| f.len()),
        args.output.display()
    );
    Ok(())
}
