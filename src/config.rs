use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::detect::{BackendRegistry, Detection, DetectorBackend, StubBackend};

const DEFAULT_BACKEND: &str = "stub";
const DEFAULT_CALIBRATION_PATH: &str = "calibration.json";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_NMS_IOU: f64 = 0.45;
const KNOWN_BACKENDS: [&str; 2] = ["stub", "tract"];

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct MeasureConfigFile {
    detector: Option<DetectorConfigFile>,
    calibration: Option<CalibrationConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    nms_iou: Option<f64>,
    stub_detections: Option<Vec<Detection>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CalibrationConfigFile {
    path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct MeasureConfig {
    pub detector: DetectorSettings,
    /// Where the CLI keeps the current `CalibrationState` between runs.
    pub calibration_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub input_width: u32,
    pub input_height: u32,
    pub nms_iou: f64,
    /// Detections replayed by the stub backend.
    pub stub_detections: Vec<Detection>,
}

impl MeasureConfig {
    /// Load from `$MEASURE_CONFIG` (TOML, optional), then apply env overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("MEASURE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse TOML text directly, without consulting the environment.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: MeasureConfigFile = toml::from_str(raw).context("invalid measure config")?;
        let mut cfg = Self::from_file(file);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: MeasureConfigFile) -> Self {
        let detector = file.detector.unwrap_or_default();
        let detector = DetectorSettings {
            backend: detector
                .backend
                .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
            model_path: detector.model_path,
            input_width: detector.input_width.unwrap_or(DEFAULT_INPUT_SIZE),
            input_height: detector.input_height.unwrap_or(DEFAULT_INPUT_SIZE),
            nms_iou: detector.nms_iou.unwrap_or(DEFAULT_NMS_IOU),
            stub_detections: detector.stub_detections.unwrap_or_default(),
        };
        let calibration_path = file
            .calibration
            .and_then(|calibration| calibration.path)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CALIBRATION_PATH));
        Self {
            detector,
            calibration_path,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(backend) = std::env::var("MEASURE_DETECTOR_BACKEND") {
            if !backend.trim().is_empty() {
                self.detector.backend = backend.trim().to_lowercase();
            }
        }
        if let Ok(path) = std::env::var("MEASURE_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.detector.model_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(path) = std::env::var("MEASURE_CALIBRATION_PATH") {
            if !path.trim().is_empty() {
                self.calibration_path = PathBuf::from(path);
            }
        }
        if let Ok(iou) = std::env::var("MEASURE_NMS_IOU") {
            self.detector.nms_iou = iou
                .trim()
                .parse()
                .map_err(|_| anyhow!("MEASURE_NMS_IOU must be a number in (0, 1]"))?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.detector.backend = self.detector.backend.to_lowercase();
        if !KNOWN_BACKENDS.contains(&self.detector.backend.as_str()) {
            return Err(anyhow!(
                "unknown detector backend '{}'; expected one of {:?}",
                self.detector.backend,
                KNOWN_BACKENDS
            ));
        }
        if self.detector.backend == "tract" && self.detector.model_path.is_none() {
            return Err(anyhow!("detector backend 'tract' requires model_path"));
        }
        if self.detector.input_width == 0 || self.detector.input_height == 0 {
            return Err(anyhow!("detector input size must be greater than zero"));
        }
        if !(self.detector.nms_iou > 0.0 && self.detector.nms_iou <= 1.0) {
            return Err(anyhow!(
                "nms_iou must be in (0, 1], got {}",
                self.detector.nms_iou
            ));
        }
        if let Some(bad) = self
            .detector
            .stub_detections
            .iter()
            .find(|d| !d.is_well_formed())
        {
            return Err(anyhow!(
                "stub detection {:?} (confidence {}) is malformed",
                bad.bbox.to_bounds(),
                bad.confidence
            ));
        }
        Ok(())
    }
}

impl DetectorSettings {
    /// Build the selected backend.
    ///
    /// Model-backed detectors are only loaded when selected. Called once at
    /// startup; the returned backend is shared by both engines.
    pub fn build_backend(&self) -> Result<Arc<dyn DetectorBackend>> {
        let mut registry = BackendRegistry::new();
        registry.register(StubBackend::new(self.stub_detections.clone()));

        #[cfg(feature = "backend-tract")]
        if let Some(model_path) = self.model_path.as_ref().filter(|_| self.backend == "tract") {
            let options = crate::detect::TractOptions {
                input_width: self.input_width,
                input_height: self.input_height,
                nms_iou: self.nms_iou,
                ..Default::default()
            };
            registry.register(crate::detect::TractBackend::new(model_path, options)?);
        }

        registry.set_default(&self.backend).with_context(|| {
            format!(
                "detector backend '{}' unavailable (registered: {:?})",
                self.backend,
                registry.list()
            )
        })?;
        let backend = registry
            .default_backend()
            .ok_or_else(|| anyhow!("no detector backend registered"))?;
        backend
            .warm_up()
            .with_context(|| format!("warm-up of detector '{}' failed", backend.name()))?;
        log::info!("using detector backend '{}'", backend.name());
        Ok(backend)
    }
}

fn read_config_file(path: &Path) -> Result<MeasureConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
