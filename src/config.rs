use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::control::{AdvancePolicy, AimPolicy, ReferencePoint};
use crate::detect::ModelOptions;
use crate::frame::{CaptureRegion, WorkingResolution};
use crate::ingest::{CaptureBackend, ScreenConfig};
use crate::pilot::SelectionPolicy;

const DEFAULT_REGION: CaptureRegion = CaptureRegion::new(1280, 0, 1920, 510);
const DEFAULT_MIN_DISPLAYS: usize = 2;
const DEFAULT_DETECTOR_BACKEND: &str = "tract";
const DEFAULT_MODEL_PATH: &str = "yolov8n.onnx";
const DEFAULT_MODEL_INPUT: u32 = 640;
const DEFAULT_CONFIDENCE_FLOOR: f32 = 0.25;
const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
const DEFAULT_TARGET_LABEL: &str = "person";
const DEFAULT_DETECT_THRESHOLD: f32 = 0.70;
const DEFAULT_CHROME_OFFSET: u32 = 30;
const DEFAULT_CONTROLLER_INTERVAL_MS: u64 = 100;

#[derive(Debug, Deserialize, Default)]
struct PilotConfigFile {
    capture: Option<CaptureConfigFile>,
    detector: Option<DetectorConfigFile>,
    aim: Option<AimConfigFile>,
    advance: Option<AdvanceConfigFile>,
    controller_interval_ms: Option<u64>,
    overlay: Option<OverlayConfigFile>,
    working: Option<WorkingResolution>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    backend: Option<CaptureBackend>,
    region: Option<CaptureRegion>,
    min_displays: Option<usize>,
    max_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    input_size: Option<u32>,
    confidence_floor: Option<f32>,
    iou_threshold: Option<f32>,
    target_label: Option<String>,
    threshold: Option<f32>,
    selection: Option<SelectionPolicy>,
}

#[derive(Debug, Deserialize, Default)]
struct AimConfigFile {
    threshold: Option<f32>,
    tolerance: Option<i32>,
    chrome_offset: Option<u32>,
    move_duration_ms: Option<u64>,
    idle_move_duration_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct AdvanceConfigFile {
    threshold: Option<f32>,
    key: Option<String>,
    pulse_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct OverlayConfigFile {
    enabled: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct PilotConfig {
    pub capture: CaptureSettings,
    pub detector: DetectorSettings,
    pub aim: AimSettings,
    pub advance: AdvanceSettings,
    pub controller_interval: Duration,
    pub overlay_enabled: bool,
    pub working: WorkingResolution,
}

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub backend: CaptureBackend,
    pub region: CaptureRegion,
    /// Displays required at startup; 0 disables the check.
    pub min_displays: usize,
    pub max_fps: u32,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub backend: String,
    pub model_path: PathBuf,
    pub input_size: u32,
    /// Raw model scores below this never leave the backend.
    pub confidence_floor: f32,
    /// Overlap above which the weaker of two same-class boxes is suppressed.
    pub iou_threshold: f32,
    pub target_label: String,
    pub threshold: f32,
    pub selection: SelectionPolicy,
}

#[derive(Debug, Clone)]
pub struct AimSettings {
    pub threshold: f32,
    pub tolerance: i32,
    pub chrome_offset: u32,
    pub move_duration: Duration,
    pub idle_move_duration: Duration,
}

#[derive(Debug, Clone)]
pub struct AdvanceSettings {
    pub threshold: f32,
    pub key: String,
    pub pulse: Duration,
}

impl PilotConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("PILOT_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Like `load`, but with an explicit config file (e.g. from `--config`).
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PilotConfigFile) -> Self {
        let aim_defaults = AimPolicy::default();
        let advance_defaults = AdvancePolicy::default();

        let capture = file.capture.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let aim = file.aim.unwrap_or_default();
        let advance = file.advance.unwrap_or_default();

        Self {
            capture: CaptureSettings {
                backend: capture.backend.unwrap_or_default(),
                region: capture.region.unwrap_or(DEFAULT_REGION),
                min_displays: capture.min_displays.unwrap_or(DEFAULT_MIN_DISPLAYS),
                max_fps: capture.max_fps.unwrap_or(0),
            },
            detector: DetectorSettings {
                backend: detector
                    .backend
                    .unwrap_or_else(|| DEFAULT_DETECTOR_BACKEND.to_string()),
                model_path: detector
                    .model_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
                input_size: detector.input_size.unwrap_or(DEFAULT_MODEL_INPUT),
                confidence_floor: detector
                    .confidence_floor
                    .unwrap_or(DEFAULT_CONFIDENCE_FLOOR),
                iou_threshold: detector.iou_threshold.unwrap_or(DEFAULT_IOU_THRESHOLD),
                target_label: detector
                    .target_label
                    .unwrap_or_else(|| DEFAULT_TARGET_LABEL.to_string()),
                threshold: detector.threshold.unwrap_or(DEFAULT_DETECT_THRESHOLD),
                selection: detector.selection.unwrap_or_default(),
            },
            aim: AimSettings {
                threshold: aim.threshold.unwrap_or(aim_defaults.threshold),
                tolerance: aim.tolerance.unwrap_or(aim_defaults.tolerance),
                chrome_offset: aim.chrome_offset.unwrap_or(DEFAULT_CHROME_OFFSET),
                move_duration: aim
                    .move_duration_ms
                    .map(Duration::from_millis)
                    .unwrap_or(aim_defaults.move_duration),
                idle_move_duration: aim
                    .idle_move_duration_ms
                    .map(Duration::from_millis)
                    .unwrap_or(aim_defaults.idle_move_duration),
            },
            advance: AdvanceSettings {
                threshold: advance.threshold.unwrap_or(advance_defaults.threshold),
                key: advance
                    .key
                    .unwrap_or_else(|| advance_defaults.key.to_string()),
                pulse: advance
                    .pulse_ms
                    .map(Duration::from_millis)
                    .unwrap_or(advance_defaults.pulse),
            },
            controller_interval: Duration::from_millis(
                file.controller_interval_ms
                    .unwrap_or(DEFAULT_CONTROLLER_INTERVAL_MS),
            ),
            overlay_enabled: file.overlay.and_then(|o| o.enabled).unwrap_or(true),
            working: file.working.unwrap_or_default(),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(region) = std::env::var("PILOT_REGION") {
            if !region.trim().is_empty() {
                self.capture.region = CaptureRegion::parse(&region)
                    .map_err(|e| anyhow!("PILOT_REGION: {}", e))?;
            }
        }
        if let Ok(model) = std::env::var("PILOT_MODEL") {
            if !model.trim().is_empty() {
                self.detector.model_path = PathBuf::from(model);
            }
        }
        if let Ok(label) = std::env::var("PILOT_TARGET_LABEL") {
            if !label.trim().is_empty() {
                self.detector.target_label = label.trim().to_string();
            }
        }
        if let Some(threshold) = env_threshold("PILOT_DETECT_THRESHOLD")? {
            self.detector.threshold = threshold;
        }
        if let Some(threshold) = env_threshold("PILOT_AIM_THRESHOLD")? {
            self.aim.threshold = threshold;
        }
        if let Some(threshold) = env_threshold("PILOT_ADVANCE_THRESHOLD")? {
            self.advance.threshold = threshold;
        }
        if let Ok(backend) = std::env::var("PILOT_CAPTURE_BACKEND") {
            if !backend.trim().is_empty() {
                self.capture.backend = CaptureBackend::parse(&backend).ok_or_else(|| {
                    anyhow!("PILOT_CAPTURE_BACKEND must be 'screen' or 'stub'")
                })?;
            }
        }
        if let Ok(backend) = std::env::var("PILOT_DETECTOR_BACKEND") {
            if !backend.trim().is_empty() {
                self.detector.backend = backend.trim().to_string();
            }
        }
        if let Ok(count) = std::env::var("PILOT_MIN_DISPLAYS") {
            self.capture.min_displays = count
                .trim()
                .parse()
                .map_err(|_| anyhow!("PILOT_MIN_DISPLAYS must be a non-negative integer"))?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.capture.region.is_empty() {
            return Err(anyhow!(
                "capture region {:?} must have a positive width and height",
                self.capture.region
            ));
        }
        if self.working.width == 0 || self.working.height == 0 {
            return Err(anyhow!("working resolution must be non-zero"));
        }
        if self.detector.input_size == 0 {
            return Err(anyhow!("detector input size must be non-zero"));
        }
        for (name, value) in [
            ("detector threshold", self.detector.threshold),
            ("detector confidence floor", self.detector.confidence_floor),
            ("detector IoU threshold", self.detector.iou_threshold),
            ("aim threshold", self.aim.threshold),
            ("advance threshold", self.advance.threshold),
        ] {
            check_unit(name, value)?;
        }
        if self.aim.tolerance < 0 {
            return Err(anyhow!("aim tolerance must not be negative"));
        }
        self.advance_key()?;
        self.detector.target_label = self.detector.target_label.to_lowercase();
        Ok(())
    }

    /// The forward key as a single character.
    pub fn advance_key(&self) -> Result<char> {
        let mut chars = self.advance.key.chars();
        match (chars.next(), chars.next()) {
            (Some(key), None) => Ok(key),
            _ => Err(anyhow!(
                "advance key must be a single character, got {:?}",
                self.advance.key
            )),
        }
    }

    pub fn model_options(&self) -> ModelOptions {
        ModelOptions {
            path: self.detector.model_path.clone(),
            input_size: self.detector.input_size,
            confidence_floor: self.detector.confidence_floor,
            iou_threshold: self.detector.iou_threshold,
        }
    }

    pub fn screen_config(&self) -> ScreenConfig {
        ScreenConfig {
            backend: self.capture.backend,
            region: self.capture.region,
            working: self.working,
        }
    }

    pub fn aim_policy(&self) -> AimPolicy {
        AimPolicy {
            threshold: self.aim.threshold,
            tolerance: self.aim.tolerance,
            reference: ReferencePoint::for_viewport(self.working, self.aim.chrome_offset),
            move_duration: self.aim.move_duration,
            idle_move_duration: self.aim.idle_move_duration,
            ..AimPolicy::default()
        }
    }

    pub fn advance_policy(&self) -> Result<AdvancePolicy> {
        Ok(AdvancePolicy {
            threshold: self.advance.threshold,
            key: self.advance_key()?,
            pulse: self.advance.pulse,
        })
    }
}

fn read_config_file(path: &Path) -> Result<PilotConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn env_threshold(key: &str) -> Result<Option<f32>> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => {
            let parsed = value
                .trim()
                .parse::<f32>()
                .map_err(|_| anyhow!("{} must be a number between 0 and 1", key))?;
            Ok(Some(parsed))
        }
        _ => Ok(None),
    }
}

fn check_unit(name: &str, value: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(anyhow!("{} must be within [0, 1], got {}", name, value));
    }
    Ok(())
}
