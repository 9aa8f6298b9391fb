//! Pointer controller: steer toward the target, fire when centered.

use std::time::Duration;

use crate::action::{ActionCommand, ActionSink, MouseButton, SinkResult};
use crate::frame::WorkingResolution;
use crate::state::Target;

use super::Controller;

/// Fixed point in working-resolution space the target is steered onto.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReferencePoint {
    pub x: i32,
    pub y: i32,
}

impl ReferencePoint {
    /// Center of the viewport, shifted down by half the window chrome that
    /// sits above the rendered scene inside the capture region.
    pub fn for_viewport(working: WorkingResolution, chrome_offset: u32) -> Self {
        Self {
            x: (working.width / 2) as i32,
            y: ((working.height + chrome_offset) / 2) as i32,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AimPolicy {
    pub threshold: f32,
    /// Per-axis distance in pixels within which the target counts as centered.
    pub tolerance: i32,
    pub reference: ReferencePoint,
    pub move_duration: Duration,
    pub idle_move_duration: Duration,
    pub button: MouseButton,
}

impl Default for AimPolicy {
    fn default() -> Self {
        Self {
            threshold: 0.80,
            tolerance: 100,
            reference: ReferencePoint::for_viewport(WorkingResolution::default(), 30),
            move_duration: Duration::from_millis(150),
            idle_move_duration: Duration::from_millis(100),
            button: MouseButton::Left,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AimDecision {
    Steer { dx: i32, dy: i32 },
    Fire,
    Idle,
}

#[derive(Clone, Debug, Default)]
pub struct AimController {
    policy: AimPolicy,
}

impl AimController {
    pub fn new(policy: AimPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &AimPolicy {
        &self.policy
    }

    pub fn decide(&self, target: &Target) -> AimDecision {
        if target.confidence < self.policy.threshold {
            return AimDecision::Idle;
        }
        let (cx, cy) = target.bbox.center();
        let dx = cx - self.policy.reference.x;
        let dy = cy - self.policy.reference.y;
        if dx.abs() > self.policy.tolerance || dy.abs() > self.policy.tolerance {
            AimDecision::Steer { dx, dy }
        } else {
            AimDecision::Fire
        }
    }

    pub fn command(&self, decision: AimDecision) -> ActionCommand {
        match decision {
            AimDecision::Steer { dx, dy } => ActionCommand::Move {
                dx,
                dy,
                duration: self.policy.move_duration,
            },
            AimDecision::Fire => ActionCommand::Click {
                button: self.policy.button,
            },
            AimDecision::Idle => ActionCommand::Move {
                dx: 0,
                dy: 0,
                duration: self.policy.idle_move_duration,
            },
        }
    }
}

impl Controller for AimController {
    fn name(&self) -> &'static str {
        "aim"
    }

    fn act(&mut self, target: &Target, sink: &mut dyn ActionSink) -> SinkResult<()> {
        let decision = self.decide(target);
        log::debug!("aim: {:?} (confidence {:.2})", decision, target.confidence);
        sink.execute(self.command(decision))
    }
}
