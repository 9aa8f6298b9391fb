use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use vision_pilot::config::PilotConfig;
use vision_pilot::control::ReferencePoint;
use vision_pilot::{CaptureBackend, CaptureRegion, SelectionPolicy};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "PILOT_CONFIG",
        "PILOT_REGION",
        "PILOT_MODEL",
        "PILOT_TARGET_LABEL",
        "PILOT_DETECT_THRESHOLD",
        "PILOT_AIM_THRESHOLD",
        "PILOT_ADVANCE_THRESHOLD",
        "PILOT_CAPTURE_BACKEND",
        "PILOT_DETECTOR_BACKEND",
        "PILOT_MIN_DISPLAYS",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_target_dual_display_desktop() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    clear_env();

    let cfg = PilotConfig::load().expect("load defaults");

    assert_eq!(cfg.capture.backend, CaptureBackend::Screen);
    assert_eq!(cfg.capture.region, CaptureRegion::new(1280, 0, 1920, 510));
    assert_eq!(cfg.capture.min_displays, 2);
    assert_eq!(cfg.detector.backend, "tract");
    assert_eq!(cfg.detector.target_label, "person");
    assert_eq!(cfg.detector.threshold, 0.70);
    assert_eq!(cfg.detector.confidence_floor, 0.25);
    assert_eq!(cfg.detector.iou_threshold, 0.45);
    assert_eq!(cfg.detector.selection, SelectionPolicy::HighestConfidence);
    assert_eq!(cfg.controller_interval, Duration::from_millis(100));

    let aim = cfg.aim_policy();
    assert_eq!(aim.threshold, 0.80);
    assert_eq!(aim.tolerance, 100);
    assert_eq!(aim.reference, ReferencePoint { x: 320, y: 255 });
    assert_eq!(aim.move_duration, Duration::from_millis(150));

    let advance = cfg.advance_policy().expect("advance policy");
    assert_eq!(advance.threshold, 0.70);
    assert_eq!(advance.key, 'w');
    assert_eq!(advance.pulse, Duration::from_millis(200));

    clear_env();
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    clear_env();

    let file = write_config(
        r#"{
            "capture": {
                "backend": "stub",
                "region": { "left": 0, "top": 0, "right": 800, "bottom": 630 },
                "min_displays": 1,
                "max_fps": 30
            },
            "detector": {
                "backend": "scripted",
                "model_path": "models/yolov8s.onnx",
                "confidence_floor": 0.3,
                "iou_threshold": 0.5,
                "target_label": "Person",
                "threshold": 0.6,
                "selection": "last-qualifying"
            },
            "aim": { "tolerance": 40, "chrome_offset": 0 },
            "advance": { "key": "d", "pulse_ms": 50 },
            "controller_interval_ms": 20,
            "overlay": { "enabled": false },
            "working": { "width": 800, "height": 600 }
        }"#,
    );

    std::env::set_var("PILOT_CONFIG", file.path());
    std::env::set_var("PILOT_REGION", "10, 20, 810, 650");
    std::env::set_var("PILOT_AIM_THRESHOLD", "0.9");
    std::env::set_var("PILOT_MIN_DISPLAYS", "0");

    let cfg = PilotConfig::load().expect("load config");

    assert_eq!(cfg.capture.backend, CaptureBackend::Stub);
    assert_eq!(cfg.capture.region, CaptureRegion::new(10, 20, 810, 650));
    assert_eq!(cfg.capture.min_displays, 0);
    assert_eq!(cfg.capture.max_fps, 30);
    assert_eq!(cfg.detector.backend, "scripted");
    assert_eq!(cfg.detector.model_path.to_str(), Some("models/yolov8s.onnx"));
    assert_eq!(cfg.detector.target_label, "person");
    assert_eq!(cfg.detector.threshold, 0.6);

    let model = cfg.model_options();
    assert_eq!(model.path.to_str(), Some("models/yolov8s.onnx"));
    assert_eq!(model.input_size, 640);
    assert_eq!(model.confidence_floor, 0.3);
    assert_eq!(model.iou_threshold, 0.5);
    assert_eq!(cfg.detector.selection, SelectionPolicy::LastQualifying);
    assert_eq!(cfg.controller_interval, Duration::from_millis(20));
    assert!(!cfg.overlay_enabled);

    let aim = cfg.aim_policy();
    assert_eq!(aim.threshold, 0.9);
    assert_eq!(aim.tolerance, 40);
    assert_eq!(aim.reference, ReferencePoint { x: 400, y: 300 });

    let advance = cfg.advance_policy().expect("advance policy");
    assert_eq!(advance.key, 'd');
    assert_eq!(advance.pulse, Duration::from_millis(50));

    let screen = cfg.screen_config();
    assert_eq!((screen.working.width, screen.working.height), (800, 600));

    clear_env();
}

#[test]
fn invalid_values_are_rejected() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    clear_env();

    std::env::set_var("PILOT_DETECT_THRESHOLD", "1.5");
    assert!(PilotConfig::load().is_err());
    clear_env();

    std::env::set_var("PILOT_REGION", "100,0,100,480");
    assert!(PilotConfig::load().is_err());
    clear_env();

    std::env::set_var("PILOT_CAPTURE_BACKEND", "rtsp");
    assert!(PilotConfig::load().is_err());
    clear_env();

    let file = write_config(r#"{ "advance": { "key": "shift" } }"#);
    std::env::set_var("PILOT_CONFIG", file.path());
    let err = PilotConfig::load().unwrap_err();
    assert!(err.to_string().contains("single character"));
    clear_env();

    let file = write_config(r#"{ "detector": { "iou_threshold": 1.2 } }"#);
    std::env::set_var("PILOT_CONFIG", file.path());
    let err = PilotConfig::load().unwrap_err();
    assert!(err.to_string().contains("IoU"));
    clear_env();

    let file = write_config("{ not json");
    std::env::set_var("PILOT_CONFIG", file.path());
    assert!(PilotConfig::load().is_err());
    clear_env();
}
