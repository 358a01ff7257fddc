//! measure - calibrate a camera scale and measure detected objects
//!
//! Frames are read from image files (JPEG/PNG) or from text files holding a
//! `data:image/...;base64,` URL. The current calibration is kept as JSON at the
//! configured calibration path; without one, the default scale is used and
//! reported as such.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};

use measurement_kernel::{
    CalibrationEngine, CalibrationState, Frame, MeasureConfig, MeasurementEngine,
    MeasurementMode, DEFAULT_PIXELS_PER_UNIT,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Override the calibration file from the config.
    #[arg(long, global = true)]
    calibration: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Derive a scale from a reference object of known size and store it.
    Calibrate {
        /// Image (or data URL text file) showing the reference object.
        #[arg(long)]
        image: PathBuf,
        /// Known size of the reference object along the image width.
        #[arg(long)]
        reference_size: f64,
    },
    /// Measure objects in a frame with the stored calibration.
    Measure {
        /// Image (or data URL text file) to measure.
        #[arg(long)]
        image: PathBuf,
        /// One of: single, multiple, area, volume, angle.
        #[arg(long, default_value = "single")]
        mode: String,
    },
    /// List measurement modes.
    Modes,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = MeasureConfig::load()?;
    if let Some(path) = args.calibration {
        cfg.calibration_path = path;
    }

    match args.command {
        Command::Modes => {
            for mode in MeasurementMode::ALL {
                println!("{:<10} {}", mode.as_str(), mode.label());
            }
            Ok(())
        }
        Command::Calibrate {
            image,
            reference_size,
        } => {
            let frame = match load_frame(&image) {
                Ok(frame) => frame,
                Err(e) => return fail(&format!("{:#}", e)),
            };
            let detector = cfg.detector.build_backend()?;
            let engine = CalibrationEngine::new(detector);
            match engine.calibrate(&frame, reference_size) {
                Ok(state) => {
                    save_calibration(&cfg.calibration_path, &state)?;
                    log::info!(
                        "calibration written to {}",
                        cfg.calibration_path.display()
                    );
                    print_json(&serde_json::json!({
                        "success": true,
                        "pixels_per_unit": state.scale(),
                        "reference_size": state.reference_size(),
                    }))
                }
                Err(e) => fail(&e.to_string()),
            }
        }
        Command::Measure { image, mode } => {
            // Reject unknown modes before touching the image or the detector.
            let mode: MeasurementMode = match mode.parse() {
                Ok(mode) => mode,
                Err(e) => return fail(&e.to_string()),
            };
            let calibration = load_calibration(&cfg.calibration_path)?;
            let frame = match load_frame(&image) {
                Ok(frame) => frame,
                Err(e) => return fail(&format!("{:#}", e)),
            };
            let detector = cfg.detector.build_backend()?;
            let engine = MeasurementEngine::new(detector);
            match engine.measure_mode(&frame, mode, &calibration) {
                Ok(result) => print_json(&serde_json::json!({
                    "success": true,
                    "calibrated": !calibration.is_default(),
                    "dimensions": result,
                })),
                Err(e) => fail(&e.to_string()),
            }
        }
    }
}

fn load_frame(path: &Path) -> Result<Frame> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let frame = if bytes.starts_with(b"data:") {
        let text = std::str::from_utf8(&bytes)
            .map_err(|_| anyhow!("{} is not a UTF-8 data URL", path.display()))?;
        Frame::decode_data_url(text)
    } else {
        Frame::decode(&bytes)
    };
    frame.with_context(|| format!("invalid image {}", path.display()))
}

fn load_calibration(path: &Path) -> Result<CalibrationState> {
    if !path.exists() {
        log::warn!(
            "no calibration at {}; using default {} px/unit",
            path.display(),
            DEFAULT_PIXELS_PER_UNIT
        );
        return Ok(CalibrationState::uncalibrated());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read calibration {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid calibration {}", path.display()))
}

fn save_calibration(path: &Path, state: &CalibrationState) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(state)?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn fail(message: &str) -> Result<()> {
    print_json(&serde_json::json!({ "success": false, "error": message }))?;
    std::process::exit(1);
}
