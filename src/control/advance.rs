//! Keyboard controller: pulse the forward key while a target is visible.

use std::thread;
use std::time::Duration;

use crate::action::{ActionSink, SinkResult};
use crate::state::Target;

use super::Controller;

#[derive(Clone, Debug, PartialEq)]
pub struct AdvancePolicy {
    pub threshold: f32,
    pub key: char,
    /// How long the key is held per pulse.
    pub pulse: Duration,
}

impl Default for AdvancePolicy {
    fn default() -> Self {
        Self {
            threshold: 0.70,
            key: 'w',
            pulse: Duration::from_millis(200),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdvanceDecision {
    Pulse,
    Release,
}

#[derive(Clone, Debug, Default)]
pub struct AdvanceController {
    policy: AdvancePolicy,
}

impl AdvanceController {
    pub fn new(policy: AdvancePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &AdvancePolicy {
        &self.policy
    }

    pub fn decide(&self, target: &Target) -> AdvanceDecision {
        if target.confidence >= self.policy.threshold {
            AdvanceDecision::Pulse
        } else {
            AdvanceDecision::Release
        }
    }
}

impl Controller for AdvanceController {
    fn name(&self) -> &'static str {
        "advance"
    }

    fn act(&mut self, target: &Target, sink: &mut dyn ActionSink) -> SinkResult<()> {
        match self.decide(target) {
            AdvanceDecision::Pulse => {
                log::debug!("advance: pulse {:?} for {:?}", self.policy.key, self.policy.pulse);
                sink.key_down(self.policy.key)?;
                thread::sleep(self.policy.pulse);
                sink.key_up(self.policy.key)
            }
            AdvanceDecision::Release => sink.key_up(self.policy.key),
        }
    }
}
