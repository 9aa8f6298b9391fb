//! The detection loop: sole producer of the shared detection state.
//!
//! Each cycle runs CAPTURING -> DETECTING -> SELECTING -> PUBLISHING:
//! grab one working-resolution frame, run the detector, pick the target
//! detection (if any) and publish it. Capture and inference failures are
//! returned to the caller; the loop never retries them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::detect::{ClassId, Detection, DetectorBackend};
use crate::ingest::{FrameSource, SourceStats};
use crate::overlay::{DebugOverlay, OverlayEvent};
use crate::state::{SharedDetection, Target};

const HEALTH_INTERVAL: Duration = Duration::from_secs(5);

/// How to pick among several qualifying detections in one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionPolicy {
    #[default]
    HighestConfidence,
    /// The last qualifying detection in backend output order.
    LastQualifying,
}

impl SelectionPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "highest-confidence" => Some(Self::HighestConfidence),
            "last-qualifying" => Some(Self::LastQualifying),
            _ => None,
        }
    }
}

/// Keep detections of `class` at or above `threshold`, then choose one.
pub fn select_target(
    detections: &[Detection],
    class: ClassId,
    threshold: f32,
    policy: SelectionPolicy,
) -> Option<Target> {
    let qualifying = detections
        .iter()
        .filter(|d| d.class == class && d.confidence >= threshold);
    let chosen = match policy {
        // Ties keep the earliest detection.
        SelectionPolicy::HighestConfidence => qualifying.fold(None::<&Detection>, |best, d| {
            match best {
                Some(b) if b.confidence >= d.confidence => Some(b),
                _ => Some(d),
            }
        }),
        SelectionPolicy::LastQualifying => qualifying.last(),
    };
    chosen.map(|d| Target {
        bbox: d.bbox,
        confidence: d.confidence,
    })
}

#[derive(Clone, Debug)]
pub struct LoopSettings {
    pub target: ClassId,
    pub detect_threshold: f32,
    pub selection: SelectionPolicy,
    /// Upper bound on cycles per second; 0 disables the cap.
    pub max_fps: u32,
}

impl LoopSettings {
    pub fn new(target: ClassId) -> Self {
        Self {
            target,
            detect_threshold: 0.70,
            selection: SelectionPolicy::default(),
            max_fps: 0,
        }
    }

    fn min_cycle(&self) -> Option<Duration> {
        (self.max_fps > 0).then(|| Duration::from_secs(1) / self.max_fps)
    }
}

/// Running counters for the health log.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoopStats {
    pub cycles: u64,
    pub frames_with_target: u64,
    pub detections: u64,
    pub last_cycle: Duration,
}

/// Outcome of a single cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct CycleReport {
    pub detections: usize,
    pub target: Option<Target>,
    pub generation: u64,
    pub quit_requested: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// Quit requested from the overlay.
    Quit,
    /// The running flag was cleared (Ctrl-C).
    Interrupted,
    /// The shared state was shut down, e.g. by a failing controller.
    Shutdown,
}

pub struct DetectionLoop<S: FrameSource> {
    source: S,
    detector: Box<dyn DetectorBackend>,
    state: Arc<SharedDetection>,
    overlay: Option<DebugOverlay>,
    settings: LoopSettings,
    stats: LoopStats,
}

impl<S: FrameSource> DetectionLoop<S> {
    pub fn new(
        source: S,
        detector: Box<dyn DetectorBackend>,
        state: Arc<SharedDetection>,
        settings: LoopSettings,
    ) -> Self {
        Self {
            source,
            detector,
            state,
            overlay: None,
            settings,
            stats: LoopStats::default(),
        }
    }

    pub fn with_overlay(mut self, overlay: DebugOverlay) -> Self {
        self.overlay = Some(overlay);
        self
    }

    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    pub fn source_stats(&self) -> SourceStats {
        self.source.stats()
    }

    pub fn state(&self) -> &Arc<SharedDetection> {
        &self.state
    }

    /// Capture, detect, select and publish once.
    pub fn run_cycle(&mut self) -> Result<CycleReport> {
        let started = Instant::now();
        let frame = self
            .source
            .next_frame()
            .with_context(|| format!("frame capture failed ({})", self.source.name()))?;
        let detections = self
            .detector
            .detect(&frame)
            .with_context(|| format!("inference failed ({})", self.detector.name()))?;
        for detection in &detections {
            log::debug!(
                "detected {} {:.2} at {:?}",
                detection.label,
                detection.confidence,
                detection.bbox
            );
        }

        self.state.clear();
        let target = select_target(
            &detections,
            self.settings.target,
            self.settings.detect_threshold,
            self.settings.selection,
        );
        let generation = self.state.publish(target);

        let quit_requested = match self.overlay.as_mut() {
            Some(overlay) => {
                overlay.show(&frame, &detections, target.as_ref())? == OverlayEvent::Quit
            }
            None => false,
        };

        self.stats.cycles += 1;
        self.stats.detections += detections.len() as u64;
        if target.is_some() {
            self.stats.frames_with_target += 1;
        }
        self.stats.last_cycle = started.elapsed();

        Ok(CycleReport {
            detections: detections.len(),
            target,
            generation,
            quit_requested,
        })
    }

    /// Run cycles until quit, interrupt, shutdown or a fatal error.
    pub fn run(&mut self, running: &AtomicBool) -> Result<StopReason> {
        let mut last_health = Instant::now();
        let mut last_reported = LoopStats::default();
        loop {
            if !running.load(Ordering::SeqCst) {
                return Ok(StopReason::Interrupted);
            }
            if self.state.is_shutdown() {
                return Ok(StopReason::Shutdown);
            }

            let started = Instant::now();
            let report = self.run_cycle()?;
            if report.quit_requested {
                return Ok(StopReason::Quit);
            }

            if last_health.elapsed() >= HEALTH_INTERVAL {
                let cycles = self.stats.cycles - last_reported.cycles;
                let with_target = self.stats.frames_with_target - last_reported.frames_with_target;
                let source = self.source.stats();
                log::info!(
                    "loop health: {} cycles ({:.1}/s), {} with target, last cycle {:?}, current {:?}, {} frames from {}",
                    cycles,
                    cycles as f64 / last_health.elapsed().as_secs_f64(),
                    with_target,
                    self.stats.last_cycle,
                    report.target,
                    source.frames_captured,
                    source.backend,
                );
                last_reported = self.stats.clone();
                last_health = Instant::now();
            }

            if let Some(min_cycle) = self.settings.min_cycle() {
                let elapsed = started.elapsed();
                if elapsed < min_cycle {
                    thread::sleep(min_cycle - elapsed);
                }
            }
        }
    }

    /// Close the overlay and hand back the final counters.
    pub fn finish(mut self) -> LoopStats {
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.close();
        }
        self.stats
    }
}
