//! pilot_demo - end-to-end synthetic run
//!
//! Drives the real detection loop and both controllers with a synthetic
//! screen, a scripted detector and recording sinks, then prints what each
//! controller would have injected. Needs no display, model or input access.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;

use vision_pilot::action::{ActionCommand, RecordingSink};
use vision_pilot::ui::{Ui, UiMode};
use vision_pilot::{
    spawn_controller, AdvanceController, AdvancePolicy, AimController, AimPolicy, BoundingBox,
    CaptureBackend, DetectionLoop, DetectorBackend, LoopSettings, ScreenConfig, ScreenSource,
    ScriptedBackend, SharedDetection,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Number of detection cycles to run.
    #[arg(long, default_value_t = 12)]
    cycles: u32,
    /// Pause between cycles in milliseconds.
    #[arg(long, default_value_t = 300)]
    cycle_ms: u64,
    /// Startup progress output.
    #[arg(long, value_enum, default_value_t = UiMode::Auto)]
    ui: UiMode,
}

/// A short loop through the interesting cases: centered, off-center,
/// advance-only confidence, another class, and nothing at all.
fn scripted_scene() -> ScriptedBackend {
    ScriptedBackend::coco()
        .then_box("person", BoundingBox::new(300, 200, 340, 240), 0.85)
        .then_box("person", BoundingBox::new(500, 235, 540, 275), 0.92)
        .then_box("person", BoundingBox::new(80, 60, 120, 100), 0.75)
        .then_box("car", BoundingBox::new(300, 200, 340, 240), 0.95)
        .then_nothing()
        .cycling()
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if args.cycles == 0 {
        return Err(anyhow!("cycles must be >= 1"));
    }
    let ui = Ui::for_stderr(args.ui);

    let backend = scripted_scene();
    let target = backend.labels().resolve("person")?;
    let source = ScreenSource::new(ScreenConfig {
        backend: CaptureBackend::Stub,
        ..ScreenConfig::default()
    })?;

    let state = Arc::new(SharedDetection::new());
    let pointer = RecordingSink::new();
    let keyboard = RecordingSink::new();
    let controllers = {
        let _stage = ui.stage("Starting controllers");
        let (pointer, keyboard) = (pointer.clone(), keyboard.clone());
        vec![
            spawn_controller(
                AimController::new(AimPolicy::default()),
                state.clone(),
                move || Ok(pointer),
                Duration::from_millis(10),
            )?,
            spawn_controller(
                AdvanceController::new(AdvancePolicy::default()),
                state.clone(),
                move || Ok(keyboard),
                Duration::from_millis(10),
            )?,
        ]
    };

    let mut pilot = DetectionLoop::new(
        source,
        Box::new(backend),
        state.clone(),
        LoopSettings::new(target),
    );
    {
        let _stage = ui.stage("Running synthetic scene");
        for _ in 0..args.cycles {
            let report = pilot.run_cycle()?;
            log::info!(
                "cycle: {} detections, published {:?}",
                report.detections,
                report.target.map(|t| (t.bbox, t.confidence))
            );
            std::thread::sleep(Duration::from_millis(args.cycle_ms));
            if state.is_shutdown() {
                break;
            }
        }
    }

    let stats = pilot.finish();
    state.shutdown();
    for handle in controllers {
        let name = handle.name();
        let controller_stats = handle.join()?;
        println!("{} controller: {} snapshots", name, controller_stats.snapshots);
    }

    let pointer = pointer.commands();
    let keyboard = keyboard.commands();
    let clicks = pointer
        .iter()
        .filter(|c| matches!(c, ActionCommand::Click { .. }))
        .count();
    let idle = pointer.iter().filter(|c| c.is_idle_move()).count();
    let moves = pointer.len() - clicks - idle;
    let pulses = keyboard
        .iter()
        .filter(|c| matches!(c, ActionCommand::KeyDown { .. }))
        .count();
    let releases = keyboard.len().saturating_sub(pulses * 2);

    println!("Demo complete.");
    println!(
        "  cycles: {} ({} with target)",
        stats.cycles, stats.frames_with_target
    );
    println!("  pointer: {} clicks, {} moves, {} idle", clicks, moves, idle);
    println!("  keyboard: {} pulses, {} releases", pulses, releases);
    Ok(())
}
