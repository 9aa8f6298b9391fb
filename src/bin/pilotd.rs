//! pilotd - screen-driven input pilot
//!
//! This daemon:
//! 1. Loads configuration (defaults, optional JSON file, environment)
//! 2. Checks the display environment and opens the capture region
//! 3. Loads the detector and resolves the target label
//! 4. Starts the aim and advance controllers on their own threads
//! 5. Runs the detection loop on the main thread until quit, Ctrl-C or failure

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use vision_pilot::action::{ActionSink, LogSink, SinkResult};
use vision_pilot::ingest::{require_displays, secondary_display};
use vision_pilot::ui::{Ui, UiMode};
use vision_pilot::{
    spawn_controller, AdvanceController, AimController, BackendRegistry, DebugOverlay,
    DetectionLoop, FrameSource, LoopSettings, PilotConfig, ScreenSource, SharedDetection,
    StopReason,
};

/// Exit status for environment errors detected before the main loop.
const EXIT_ENVIRONMENT: u8 = 2;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON config file.
    #[arg(long, env = "PILOT_CONFIG")]
    config: Option<PathBuf>,
    /// Log actions instead of injecting input.
    #[arg(long)]
    dry_run: bool,
    /// Do not open the debug overlay window.
    #[arg(long)]
    headless: bool,
    /// Startup progress output.
    #[arg(long, value_enum, default_value_t = UiMode::Auto)]
    ui: UiMode,
    /// Debug-level logging (overridden by RUST_LOG).
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
    let ui = Ui::for_stderr(args.ui);

    let cfg = {
        let _stage = ui.stage("Loading config");
        PilotConfig::load_from(args.config.as_deref())?
    };
    if !args.dry_run && !cfg!(feature = "input-enigo") {
        return Err(anyhow!(
            "input injection requires the input-enigo feature; rerun with --dry-run"
        ));
    }

    let stage = ui.stage("Opening capture region");
    let mut source = ScreenSource::new(cfg.screen_config())?;
    let displays = source.displays()?;
    if let Err(e) = require_displays(&displays, cfg.capture.min_displays) {
        stage.fail();
        log::error!("environment check failed: {:#}", e);
        return Ok(ExitCode::from(EXIT_ENVIRONMENT));
    }
    source.connect()?;
    drop(stage);

    let (detector, target) = {
        let _stage = ui.stage("Loading detector");
        let registry = BackendRegistry::builtin(cfg.model_options());
        log::info!("detector backends available: {}", registry.list().join(", "));
        let mut detector = registry.build(&cfg.detector.backend)?;
        let target = detector
            .labels()
            .resolve(&cfg.detector.target_label)
            .with_context(|| format!("{} backend cannot detect the target", detector.name()))?;
        detector.warm_up().context("detector warm-up failed")?;
        (detector, target)
    };
    log::info!(
        "target '{}' (class {}) threshold {:.2}, selection {:?}",
        cfg.detector.target_label,
        target.0,
        cfg.detector.threshold,
        cfg.detector.selection
    );

    let overlay = if args.headless || !cfg.overlay_enabled {
        DebugOverlay::headless()
    } else {
        let position = secondary_display(&displays).map(|d| (d.x, d.y));
        DebugOverlay::open(cfg.working, position)?
    };

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
            .context("failed to install Ctrl-C handler")?;
    }

    let state = Arc::new(SharedDetection::new());
    let controllers = {
        let _stage = ui.stage("Starting controllers");
        let dry_run = args.dry_run;
        vec![
            spawn_controller(
                AimController::new(cfg.aim_policy()),
                state.clone(),
                move || open_sink(dry_run, "pointer"),
                cfg.controller_interval,
            )?,
            spawn_controller(
                AdvanceController::new(cfg.advance_policy()?),
                state.clone(),
                move || open_sink(dry_run, "keyboard"),
                cfg.controller_interval,
            )?,
        ]
    };

    let settings = LoopSettings {
        detect_threshold: cfg.detector.threshold,
        selection: cfg.detector.selection,
        max_fps: cfg.capture.max_fps,
        ..LoopSettings::new(target)
    };
    let mut pilot =
        DetectionLoop::new(source, detector, state.clone(), settings).with_overlay(overlay);

    log::info!(
        "pilotd running: region {:?} -> {}x{}{}",
        cfg.capture.region,
        cfg.working.width,
        cfg.working.height,
        if args.dry_run { " (dry run)" } else { "" }
    );
    let outcome = pilot.run(&running);
    match &outcome {
        Ok(StopReason::Interrupted) => log::info!("interrupted by user"),
        Ok(StopReason::Quit) => log::info!("quit requested from overlay"),
        Ok(StopReason::Shutdown) => log::warn!("controller stopped; shutting down"),
        Err(e) => log::error!("detection loop failed: {:#}", e),
    }

    let source_stats = pilot.source_stats();
    let stats = pilot.finish();
    state.shutdown();
    let mut failure = outcome.err();
    for handle in controllers {
        let name = handle.name();
        if let Err(e) = handle.join() {
            log::error!("{} controller: {:#}", name, e);
            failure.get_or_insert(e);
        }
    }
    log::info!(
        "stopped after {} cycles ({} with target, {} detections), {} frames from {}",
        stats.cycles,
        stats.frames_with_target,
        stats.detections,
        source_stats.frames_captured,
        source_stats.backend
    );

    match failure {
        Some(e) => Err(e),
        None => Ok(ExitCode::SUCCESS),
    }
}

/// One sink per controller thread: OS injection, or logging on dry runs.
fn open_sink(dry_run: bool, channel: &'static str) -> SinkResult<Box<dyn ActionSink>> {
    if dry_run {
        return Ok(Box::new(LogSink::new(channel)));
    }
    #[cfg(feature = "input-enigo")]
    {
        Ok(Box::new(vision_pilot::action::EnigoSink::new()?))
    }
    #[cfg(not(feature = "input-enigo"))]
    {
        Err(vision_pilot::SinkError::Unavailable(
            "input-enigo feature not compiled in".to_string(),
        ))
    }
}
